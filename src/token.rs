//! Stream-identifying token prefixed to every record.

use std::{env, fmt, sync::Arc};

use crate::error::ConfigurationError;

/// Opaque byte sequence identifying a log stream to the collector.
///
/// Cloning is cheap; the bytes are shared and never mutated after
/// construction.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Token(Arc<[u8]>);

impl Token {
    /// Build a token from raw bytes. Blank tokens are rejected.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, ConfigurationError> {
        let bytes = bytes.into();
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(ConfigurationError::MissingToken);
        }
        Ok(Self(bytes.into()))
    }

    /// Resolve the token from an explicit value and an optional environment
    /// variable name.
    ///
    /// A non-blank value in the named variable takes precedence over the
    /// explicit value. Fails with [`ConfigurationError::MissingToken`] when no
    /// usable token is found.
    pub fn resolve(explicit: Option<&str>, env_var: Option<&str>) -> Result<Self, ConfigurationError> {
        Self::resolve_with(explicit, env_var, |name| env::var(name).ok())
    }

    /// Same as [`Token::resolve`] with a caller-supplied variable lookup.
    pub fn resolve_with(
        explicit: Option<&str>,
        env_var: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigurationError> {
        let from_env = env_var
            .filter(|name| !name.trim().is_empty())
            .and_then(|name| lookup(name))
            .filter(|value| !value.trim().is_empty());
        match from_env {
            Some(value) => Self::new(value),
            None => match explicit {
                Some(value) if !value.trim().is_empty() => Self::new(value),
                _ => Err(ConfigurationError::MissingToken),
            },
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Tokens are credentials; keep them out of debug output.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(<{} bytes>)", self.0.len())
    }
}
