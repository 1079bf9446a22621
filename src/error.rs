//! Error types shared across the shipping pipeline.
//!
//! Only [`ConfigurationError`] is meant to reach the host at setup time.
//! Connection and transport failures are absorbed by the manager and retried,
//! and [`SendError`] is informational for adapters that care about rejected
//! entries after shutdown.

use std::{io, time::Duration};

use thiserror::Error;

/// Failure to establish a connection to the collector.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// DNS resolution produced an error or no usable address.
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    /// TCP connect or socket configuration failed.
    #[error("tcp connection failed: {0}")]
    Io(#[from] io::Error),
    /// The TLS handshake was rejected or timed out.
    #[error("tls handshake with {domain} failed: {message}")]
    Handshake { domain: String, message: String },
}

/// Failure while writing to an established connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket or TLS stream reported an I/O error.
    #[error("write to collector failed: {0}")]
    Io(#[from] io::Error),
    /// The connection was idle past the threshold and was not written to.
    #[error("connection idle for longer than {0:?}")]
    Stale(Duration),
    /// The shipping buffer cannot hold one encoded character.
    #[error("shipping buffer of {0} bytes cannot hold an encoded character")]
    BufferTooSmall(usize),
}

impl TransportError {
    /// Short name of the failure used in diagnostic entries.
    pub fn kind_name(&self) -> String {
        match self {
            TransportError::Io(err) => format!("{:?}", err.kind()),
            TransportError::Stale(_) => "Stale".to_owned(),
            TransportError::BufferTooSmall(_) => "BufferTooSmall".to_owned(),
        }
    }
}

/// Setup-time misconfiguration. Fatal; surfaced to the caller.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Neither the explicit token nor the named environment variable held a
    /// usable value.
    #[error("the collector token is mandatory")]
    MissingToken,
    /// A configuration value failed validation.
    #[error("invalid shipper configuration: {0}")]
    InvalidConfig(String),
    /// The platform TLS connector could not be created.
    #[error("failed to initialise tls: {0}")]
    Tls(#[from] native_tls::Error),
    /// The baseline worker thread could not be spawned.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reasons an entry was not accepted by the manager.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// Shutdown has begun; the entry was not queued.
    #[error("shipping manager is closed")]
    Closed,
}
