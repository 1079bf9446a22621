//! Terminal outcomes of shipping one entry.

use std::error::Error as _;

use thiserror::Error;

use crate::error::TransportError;

/// Prefix identifying entries synthesised by the shipper itself.
pub const DIAGNOSTIC_PREFIX: &str = "[logship]";

/// Result of shipping one entry, retries included.
#[derive(Debug)]
pub enum SendOutcome {
    Sent,
    Dropped(DropReason),
}

/// Why an entry never reached the collector.
#[derive(Debug, Error)]
pub enum DropReason {
    /// Every allowed attempt failed.
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last_error: TransportError,
    },
    /// Shutdown began while no connection could be established.
    #[error("shutdown began while the collector was unreachable")]
    Shutdown,
}

impl DropReason {
    /// Short failure name shown in parentheses in the diagnostic entry.
    pub fn kind_name(&self) -> String {
        match self {
            DropReason::RetriesExhausted { last_error, .. } => last_error.kind_name(),
            DropReason::Shutdown => "Shutdown".to_owned(),
        }
    }
}

/// Text of the entry shipped in place of a dropped one.
///
/// Shaped as `[logship] Entry dropped because: (<kind>): <message> \n
/// <details>`, where the details list the attempt count and the error's
/// source chain.
pub fn diagnostic_text(reason: &DropReason) -> String {
    let (message, details) = match reason {
        DropReason::RetriesExhausted {
            attempts,
            last_error,
        } => {
            let mut details = format!("attempts: {attempts}");
            let mut source = last_error.source();
            while let Some(err) = source {
                details.push_str("; caused by: ");
                details.push_str(&err.to_string());
                source = err.source();
            }
            (last_error.to_string(), details)
        }
        DropReason::Shutdown => (reason.to_string(), "attempts: 0".to_owned()),
    };
    format!(
        "{DIAGNOSTIC_PREFIX} Entry dropped because: ({}): {message} \n {details}",
        reason.kind_name()
    )
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use rstest::rstest;

    #[rstest]
    fn diagnostic_names_kind_message_and_attempts() {
        let reason = DropReason::RetriesExhausted {
            attempts: 20,
            last_error: TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "peer reset",
            )),
        };
        let text = diagnostic_text(&reason);
        assert!(
            text.starts_with(
                "[logship] Entry dropped because: (ConnectionReset): write to collector failed: peer reset \n "
            ),
            "{text}"
        );
        assert!(text.contains("attempts: 20"));
        assert!(text.contains("caused by: peer reset"));
    }

    #[rstest]
    fn stale_kind_is_reported() {
        let reason = DropReason::RetriesExhausted {
            attempts: 1,
            last_error: TransportError::Stale(std::time::Duration::from_secs(30)),
        };
        assert_eq!(reason.kind_name(), "Stale");
        assert!(diagnostic_text(&reason).contains("(Stale)"));
    }

    #[rstest]
    fn shutdown_drop_has_own_kind() {
        let text = diagnostic_text(&DropReason::Shutdown);
        assert!(text.starts_with("[logship] Entry dropped because: (Shutdown): shutdown began"));
    }
}
