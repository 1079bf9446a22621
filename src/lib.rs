//! Ship log lines to a remote collector over a persistent TLS connection.
//!
//! Log calls enqueue an entry into a bounded queue and return. Background
//! workers encode each entry as `token + text + '\n'`, coalesce records into
//! a fixed-size buffer and write them to the collector, reconnecting and
//! retrying on failure. A full queue blocks the caller instead of dropping.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use logship::{ShipperBuilder, Token};
//!
//! # fn main() -> Result<(), logship::ConfigurationError> {
//! let token = Token::resolve(None, Some("LOGSHIP_TOKEN"))?;
//! let manager = Arc::new(ShipperBuilder::new().with_max_retries(10).build()?);
//! manager.send(&token, "service started").ok();
//! manager.close();
//! # Ok(())
//! # }
//! ```

mod buffer;
mod builder;
mod config;
mod encoder;
mod entry;
mod error;
mod manager;
mod rate_limited_warner;
mod token;
mod transport;

#[cfg(feature = "log-compat")]
pub mod log_compat;
#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;
#[cfg(feature = "tracing-compat")]
pub mod tracing_compat;

pub use buffer::ShippingBuffer;
pub use builder::{ShipperBuilder, ShipperSettings};
pub use config::{
    BackoffPolicy, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP, DEFAULT_BUFFER_SIZE,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_ADDITIONAL_WORKERS,
    DEFAULT_MAX_RETRIES, DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY, DEFAULT_RECONNECT_PAUSE,
    DEFAULT_SCALE_UP_COOLDOWN, DEFAULT_SEND_BUFFER_SIZE, DEFAULT_SEND_TIMEOUT,
    DEFAULT_STAGING_CHARS, MIN_BUFFER_SIZE, ShipperConfig,
};
pub use encoder::{EntryEncoder, LINE_SEPARATOR, RECORD_DELIMITER, encoded_len, sanitize};
pub use entry::Entry;
pub use error::{ConfigurationError, ConnectError, SendError, TransportError};
pub use manager::{
    ShippingManager,
    retry::{DIAGNOSTIC_PREFIX, DropReason, SendOutcome, diagnostic_text},
};
pub use rate_limited_warner::{DEFAULT_WARN_INTERVAL, RateLimitedWarner};
pub use token::Token;
pub use transport::{
    CollectorEndpoint, Connector, SocketOptions, TcpConnector, TlsConnection, TlsOptions,
    Transport,
};

const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

/// True for `log`/`tracing` targets emitted by this crate.
#[cfg_attr(
    not(any(feature = "log-compat", feature = "tracing-compat")),
    allow(dead_code)
)]
pub(crate) fn is_own_target(target: &str) -> bool {
    target
        .strip_prefix(OWN_TARGET)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}
