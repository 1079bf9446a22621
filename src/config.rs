//! Configuration consumed by the shipping manager.
//!
//! [`ShipperBuilder`](crate::ShipperBuilder) validates user input before it
//! lands in a [`ShipperConfig`]; the defaults mirror the public collector.

use std::time::Duration;

use crate::{
    error::ConfigurationError,
    rate_limited_warner::DEFAULT_WARN_INTERVAL,
    transport::{CollectorEndpoint, TlsOptions},
};

/// Default collector hostname.
pub const DEFAULT_HOST: &str = "api.logentries.com";
/// Default token-over-TLS port.
pub const DEFAULT_PORT: u16 = 20000;
/// Default bounded queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
/// Default number of attempts per entry before it is dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 20;
/// Default pause between reconnection attempts.
pub const DEFAULT_RECONNECT_PAUSE: Duration = Duration::from_secs(1);
/// Default minimum interval between two worker scale-ups.
pub const DEFAULT_SCALE_UP_COOLDOWN: Duration = Duration::from_secs(5);
/// Default maximum number of workers on top of the baseline worker.
pub const DEFAULT_MAX_ADDITIONAL_WORKERS: usize = 4;
/// Default shipping buffer capacity in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;
/// Default encoder staging capacity in characters.
pub const DEFAULT_STAGING_CHARS: usize = 8192;
/// Default `SO_SNDBUF` size in bytes.
pub const DEFAULT_SEND_BUFFER_SIZE: usize = 8192;
/// Default socket send timeout.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);
/// Default connection timeout, also bounding the TLS handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default idle threshold after which a connection is replaced.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
/// Default base delay between retries of the same entry.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(100);
/// Default maximum delay between retries of the same entry.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(2);
/// Smallest shipping buffer accepted; must hold any UTF-8 sequence.
pub const MIN_BUFFER_SIZE: usize = 16;

/// Complete runtime configuration of a shipping pipeline.
#[derive(Clone, Debug)]
pub struct ShipperConfig {
    pub endpoint: CollectorEndpoint,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
    pub send_buffer_size: usize,
    pub idle_timeout: Duration,
    pub queue_capacity: usize,
    pub max_retries: u32,
    pub reconnect_pause: Duration,
    pub backoff: BackoffPolicy,
    pub max_additional_workers: usize,
    pub scale_up_cooldown: Duration,
    pub buffer_size: usize,
    pub staging_chars: usize,
    pub warn_interval: Duration,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            endpoint: CollectorEndpoint {
                host: DEFAULT_HOST.into(),
                port: DEFAULT_PORT,
                tls: Some(TlsOptions {
                    domain: DEFAULT_HOST.into(),
                    insecure_skip_verify: false,
                }),
            },
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            send_buffer_size: DEFAULT_SEND_BUFFER_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_retries: DEFAULT_MAX_RETRIES,
            reconnect_pause: DEFAULT_RECONNECT_PAUSE,
            backoff: BackoffPolicy::default(),
            max_additional_workers: DEFAULT_MAX_ADDITIONAL_WORKERS,
            scale_up_cooldown: DEFAULT_SCALE_UP_COOLDOWN,
            buffer_size: DEFAULT_BUFFER_SIZE,
            staging_chars: DEFAULT_STAGING_CHARS,
            warn_interval: DEFAULT_WARN_INTERVAL,
        }
    }
}

impl ShipperConfig {
    /// Override the collector endpoint.
    pub fn with_endpoint(mut self, endpoint: CollectorEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// True when only the baseline worker may run, so wire order matches
    /// enqueue order.
    pub fn is_strictly_ordered(&self) -> bool {
        self.max_additional_workers == 0
    }

    /// Reject sizes the workers cannot run with. Fields are public, so a
    /// configuration built by hand is checked again when a manager starts.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.queue_capacity == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "queue_capacity must be greater than zero".into(),
            ));
        }
        if self.staging_chars == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "staging_chars must be greater than zero".into(),
            ));
        }
        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(ConfigurationError::InvalidConfig(format!(
                "buffer_size must be at least {MIN_BUFFER_SIZE} bytes"
            )));
        }
        Ok(())
    }
}

/// Linear, capped backoff between retries of one entry.
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            cap: DEFAULT_BACKOFF_CAP,
        }
    }
}
