//! Builder for [`ShippingManager`](crate::ShippingManager) configuration.
//!
//! Exposes endpoint selection, TLS, timeouts, queue sizing, retry and worker
//! scaling knobs. Every override is optional; unset values keep the defaults
//! from [`ShipperConfig`]. [`ShipperSettings`] offers the same surface as a
//! plain `serde` structure so hosts can load it from their own config files.

use std::time::Duration;

use serde::Deserialize;

use crate::{
    config::{MIN_BUFFER_SIZE, ShipperConfig},
    error::ConfigurationError,
    manager::ShippingManager,
    token::Token,
    transport::{CollectorEndpoint, TcpConnector, TlsOptions},
};

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(ConfigurationError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

#[derive(Clone, Debug, Default)]
struct TlsConfig {
    domain: Option<String>,
    insecure: bool,
}

/// Builder for constructing validated [`ShipperConfig`] values.
#[derive(Clone, Debug, Default)]
pub struct ShipperBuilder {
    host: Option<String>,
    port: Option<u16>,
    tls: Option<TlsConfig>,
    plain_tcp: bool,
    connect_timeout_ms: Option<u64>,
    send_timeout_ms: Option<u64>,
    idle_timeout_ms: Option<u64>,
    send_buffer_size: Option<usize>,
    queue_capacity: Option<usize>,
    max_retries: Option<u32>,
    reconnect_pause_ms: Option<u64>,
    backoff_base_ms: Option<u64>,
    backoff_cap_ms: Option<u64>,
    max_additional_workers: Option<usize>,
    scale_up_cooldown_ms: Option<u64>,
    buffer_size: Option<usize>,
    staging_chars: Option<usize>,
    warn_interval_ms: Option<u64>,
}

impl ShipperBuilder {
    /// Create a builder targeting the default collector over TLS.
    pub fn new() -> Self {
        Self::default()
    }

    /// Target a different collector.
    pub fn with_collector(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    /// Configure TLS using the provided domain and validation policy.
    ///
    /// The domain defaults to the collector host.
    pub fn with_tls(mut self, domain: Option<String>, insecure: bool) -> Self {
        self.tls = Some(TlsConfig { domain, insecure });
        self.plain_tcp = false;
        self
    }

    /// Ship without TLS, for local collectors.
    pub fn without_tls(mut self) -> Self {
        self.tls = None;
        self.plain_tcp = true;
        self
    }

    /// Never run more than the baseline worker, so records from one process
    /// reach the collector in enqueue order.
    pub fn with_strict_ordering(mut self) -> Self {
        self.max_additional_workers = Some(0);
        self
    }

    option_setter!(
        #[doc = "Set the bounded queue capacity."]
        with_queue_capacity,
        queue_capacity,
        usize
    );
    option_setter!(
        #[doc = "Set the number of attempts per entry before it is dropped."]
        with_max_retries,
        max_retries,
        u32
    );
    option_setter!(with_connect_timeout_ms, connect_timeout_ms, u64);
    option_setter!(with_send_timeout_ms, send_timeout_ms, u64);
    option_setter!(with_idle_timeout_ms, idle_timeout_ms, u64);
    option_setter!(
        #[doc = "Set `SO_SNDBUF`; zero keeps the operating system default."]
        with_send_buffer_size,
        send_buffer_size,
        usize
    );
    option_setter!(with_reconnect_pause_ms, reconnect_pause_ms, u64);
    option_setter!(with_backoff_base_ms, backoff_base_ms, u64);
    option_setter!(with_backoff_cap_ms, backoff_cap_ms, u64);
    option_setter!(with_max_additional_workers, max_additional_workers, usize);
    option_setter!(with_scale_up_cooldown_ms, scale_up_cooldown_ms, u64);
    option_setter!(
        #[doc = "Set the shipping buffer capacity in bytes."]
        with_buffer_size,
        buffer_size,
        usize
    );
    option_setter!(with_staging_chars, staging_chars, usize);
    option_setter!(with_warn_interval_ms, warn_interval_ms, u64);

    /// Apply every value present in `settings`.
    pub fn with_settings(mut self, settings: &ShipperSettings) -> Self {
        if let Some(host) = &settings.host {
            self.host = Some(host.clone());
        }
        if let Some(port) = settings.port {
            self.port = Some(port);
        }
        match settings.tls {
            Some(false) => self = self.without_tls(),
            Some(true) => {
                self = self.with_tls(settings.tls_domain.clone(), settings.tls_insecure)
            }
            None => {}
        }
        macro_rules! copy {
            ($target:ident, $source:ident; $($field:ident),* $(,)?) => {
                $(if let Some(value) = $source.$field {
                    $target.$field = Some(value);
                })*
            };
        }
        copy!(
            self, settings;
            connect_timeout_ms,
            send_timeout_ms,
            idle_timeout_ms,
            send_buffer_size,
            queue_capacity,
            max_retries,
            reconnect_pause_ms,
            backoff_base_ms,
            backoff_cap_ms,
            max_additional_workers,
            scale_up_cooldown_ms,
            buffer_size,
            staging_chars,
            warn_interval_ms,
        );
        self
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        self.validate_endpoint()?;
        self.validate_sizes()?;
        self.validate_timeouts()?;
        Ok(())
    }

    fn validate_endpoint(&self) -> Result<(), ConfigurationError> {
        if let Some(host) = &self.host
            && host.trim().is_empty()
        {
            return Err(ConfigurationError::InvalidConfig(
                "collector host must not be empty".into(),
            ));
        }
        if let Some(port) = self.port {
            ensure_positive!(port, "port")?;
        }
        Ok(())
    }

    fn validate_sizes(&self) -> Result<(), ConfigurationError> {
        if let Some(capacity) = self.queue_capacity {
            ensure_positive!(capacity, "queue_capacity")?;
        }
        if let Some(retries) = self.max_retries {
            ensure_positive!(retries, "max_retries")?;
        }
        if let Some(chars) = self.staging_chars {
            ensure_positive!(chars, "staging_chars")?;
        }
        if let Some(size) = self.buffer_size
            && size < MIN_BUFFER_SIZE
        {
            return Err(ConfigurationError::InvalidConfig(format!(
                "buffer_size must be at least {MIN_BUFFER_SIZE} bytes"
            )));
        }
        Ok(())
    }

    fn validate_timeouts(&self) -> Result<(), ConfigurationError> {
        if let Some(timeout) = self.connect_timeout_ms {
            ensure_positive!(timeout, "connect_timeout_ms")?;
        }
        if let Some(timeout) = self.send_timeout_ms {
            ensure_positive!(timeout, "send_timeout_ms")?;
        }
        if let Some(timeout) = self.idle_timeout_ms {
            ensure_positive!(timeout, "idle_timeout_ms")?;
        }
        if let (Some(base), Some(cap)) = (self.backoff_base_ms, self.backoff_cap_ms)
            && cap < base
        {
            return Err(ConfigurationError::InvalidConfig(
                "backoff_cap_ms must not be smaller than backoff_base_ms".into(),
            ));
        }
        Ok(())
    }

    /// Validate the overrides and produce the runtime configuration.
    pub fn build_config(&self) -> Result<ShipperConfig, ConfigurationError> {
        self.validate()?;
        let mut config = ShipperConfig::default();
        config.endpoint = self.build_endpoint(&config.endpoint);
        self.apply_optional_fields(&mut config);
        Ok(config)
    }

    /// Build the configuration and start a manager shipping over TCP/TLS.
    pub fn build(&self) -> Result<ShippingManager<TcpConnector>, ConfigurationError> {
        ShippingManager::start(self.build_config()?)
    }

    fn build_endpoint(&self, defaults: &CollectorEndpoint) -> CollectorEndpoint {
        let host = self.host.clone().unwrap_or_else(|| defaults.host.clone());
        let port = self.port.unwrap_or(defaults.port);
        let tls = if self.plain_tcp {
            None
        } else {
            let tls_cfg = self.tls.clone().unwrap_or_default();
            let domain = tls_cfg
                .domain
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| host.clone());
            Some(TlsOptions {
                domain,
                insecure_skip_verify: tls_cfg.insecure,
            })
        };
        CollectorEndpoint { host, port, tls }
    }

    fn apply_optional_fields(&self, config: &mut ShipperConfig) {
        let millis = Duration::from_millis;
        if let Some(timeout) = self.connect_timeout_ms {
            config.connect_timeout = millis(timeout);
        }
        if let Some(timeout) = self.send_timeout_ms {
            config.send_timeout = millis(timeout);
        }
        if let Some(timeout) = self.idle_timeout_ms {
            config.idle_timeout = millis(timeout);
        }
        if let Some(size) = self.send_buffer_size {
            config.send_buffer_size = size;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(pause) = self.reconnect_pause_ms {
            config.reconnect_pause = millis(pause);
        }
        if let Some(base) = self.backoff_base_ms {
            config.backoff.base = millis(base);
        }
        if let Some(cap) = self.backoff_cap_ms {
            config.backoff.cap = millis(cap);
        }
        if config.backoff.cap < config.backoff.base {
            config.backoff.cap = config.backoff.base;
        }
        if let Some(max) = self.max_additional_workers {
            config.max_additional_workers = max;
        }
        if let Some(cooldown) = self.scale_up_cooldown_ms {
            config.scale_up_cooldown = millis(cooldown);
        }
        if let Some(size) = self.buffer_size {
            config.buffer_size = size;
        }
        if let Some(chars) = self.staging_chars {
            config.staging_chars = chars;
        }
        if let Some(interval) = self.warn_interval_ms {
            config.warn_interval = millis(interval);
        }
    }
}

/// Serializable mirror of the builder options plus token sources.
///
/// Durations are expressed in milliseconds. Missing fields keep defaults.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShipperSettings {
    pub token: Option<String>,
    pub token_env_var: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<bool>,
    pub tls_domain: Option<String>,
    pub tls_insecure: bool,
    pub connect_timeout_ms: Option<u64>,
    pub send_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
    pub send_buffer_size: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub max_retries: Option<u32>,
    pub reconnect_pause_ms: Option<u64>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_cap_ms: Option<u64>,
    pub max_additional_workers: Option<usize>,
    pub scale_up_cooldown_ms: Option<u64>,
    pub buffer_size: Option<usize>,
    pub staging_chars: Option<usize>,
    pub warn_interval_ms: Option<u64>,
}

impl ShipperSettings {
    /// Resolve the token these settings describe.
    pub fn resolve_token(&self) -> Result<Token, ConfigurationError> {
        Token::resolve(self.token.as_deref(), self.token_env_var.as_deref())
    }

    /// Validate the settings into a runtime configuration.
    pub fn to_config(&self) -> Result<ShipperConfig, ConfigurationError> {
        ShipperBuilder::new().with_settings(self).build_config()
    }
}
