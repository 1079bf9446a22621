//! Transport primitives for shipping records to the collector.
//!
//! [`TlsConnection`] owns one socket plus its encrypted stream and tracks when
//! it last wrote successfully. Workers obtain connections through a
//! [`Connector`], which lets tests substitute scripted transports.

use std::{
    io::{self, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    time::{Duration, Instant},
};

use log::debug;
use native_tls::{TlsConnector, TlsStream};
use socket2::SockRef;

use crate::{
    config::ShipperConfig,
    error::{ConfigurationError, ConnectError, TransportError},
};

/// A live connection the worker writes encoded records to.
pub trait Transport: Send {
    /// Write every byte of `bytes` to the peer.
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// True when the connection has not written anything for longer than its
    /// idle threshold. Performs no I/O.
    fn is_idle_for_too_long(&self) -> bool;

    /// Release the connection. Idempotent and infallible.
    fn close(&mut self);
}

/// Factory for fresh connections, shared by every worker.
pub trait Connector: Send + Sync + 'static {
    type Connection: Transport + 'static;

    /// Open a new connection to the collector.
    fn connect(&self) -> Result<Self::Connection, ConnectError>;
}

/// Collector address and TLS settings.
#[derive(Clone, Debug)]
pub struct CollectorEndpoint {
    /// Hostname or IP address to connect to.
    pub host: String,
    /// TCP port number.
    pub port: u16,
    /// TLS configuration. `None` ships in plain text.
    pub tls: Option<TlsOptions>,
}

impl CollectorEndpoint {
    fn socket_addrs(&self) -> Result<Vec<SocketAddr>, ConnectError> {
        let resolve_error = |source| ConnectError::Resolve {
            host: self.host.clone(),
            port: self.port,
            source,
        };
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(resolve_error)?
            .collect();
        if addrs.is_empty() {
            return Err(resolve_error(io::Error::new(
                io::ErrorKind::NotFound,
                "no addresses returned",
            )));
        }
        Ok(addrs)
    }
}

/// TLS connection options.
#[derive(Clone, Debug)]
pub struct TlsOptions {
    /// Domain name presented during the TLS handshake.
    pub domain: String,
    /// Skip certificate validation when true (intended for tests).
    pub insecure_skip_verify: bool,
}

impl TlsOptions {
    fn connector(&self) -> Result<TlsConnector, native_tls::Error> {
        let mut builder = TlsConnector::builder();
        if self.insecure_skip_verify {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        builder.build()
    }
}

/// Socket-level tuning applied to every connection.
#[derive(Clone, Debug)]
pub struct SocketOptions {
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
    /// `SO_SNDBUF` size in bytes; zero leaves the OS default.
    pub send_buffer_size: usize,
    pub max_idle: Duration,
}

impl From<&ShipperConfig> for SocketOptions {
    fn from(config: &ShipperConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            send_timeout: config.send_timeout,
            send_buffer_size: config.send_buffer_size,
            max_idle: config.idle_timeout,
        }
    }
}

enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Stream {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Stream::Plain(stream) => stream.write_all(buf)?,
            Stream::Tls(stream) => stream.write_all(buf)?,
        }
        self.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(stream) => stream.flush(),
            Stream::Tls(stream) => stream.flush(),
        }
    }

    fn tcp(&self) -> &TcpStream {
        match self {
            Stream::Plain(stream) => stream,
            Stream::Tls(stream) => stream.get_ref(),
        }
    }
}

/// One socket to the collector, optionally wrapped in TLS.
pub struct TlsConnection {
    stream: Option<Stream>,
    last_activity: Instant,
    max_idle: Duration,
}

impl TlsConnection {
    /// Connect, configure the socket, and perform the TLS handshake.
    ///
    /// `tls` must be the connector built from `endpoint.tls`; plain TCP is
    /// used when the endpoint carries no TLS options.
    pub fn open(
        endpoint: &CollectorEndpoint,
        options: &SocketOptions,
        tls: Option<&TlsConnector>,
    ) -> Result<Self, ConnectError> {
        let stream = connect_tcp(endpoint, options.connect_timeout)?;
        configure_socket(&stream, options)?;
        let stream = match (&endpoint.tls, tls) {
            (Some(tls_options), Some(connector)) => {
                Stream::Tls(Box::new(handshake(stream, &tls_options.domain, connector, options)?))
            }
            _ => Stream::Plain(stream),
        };
        Ok(Self {
            stream: Some(stream),
            last_activity: Instant::now(),
            max_idle: options.max_idle,
        })
    }

    /// Time elapsed since the last successful write or the handshake.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

impl Transport for TlsConnection {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed").into());
        };
        stream.write_all(bytes)?;
        self.last_activity = Instant::now();
        Ok(())
    }

    fn is_idle_for_too_long(&self) -> bool {
        self.idle_for() > self.max_idle
    }

    fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        if let Stream::Tls(tls) = &mut stream
            && let Err(err) = tls.shutdown()
        {
            debug!("logship: tls close_notify failed: {err}");
        }
        if let Err(err) = stream.tcp().shutdown(Shutdown::Both) {
            debug!("logship: socket shutdown failed: {err}");
        }
    }
}

impl Drop for TlsConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn connect_tcp(endpoint: &CollectorEndpoint, timeout: Duration) -> Result<TcpStream, ConnectError> {
    let mut last_err = None;
    for addr in endpoint.socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(ConnectError::Io(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::TimedOut,
            format!("unable to connect to {}:{}", endpoint.host, endpoint.port),
        )
    })))
}

// Writes go out immediately and fail fast: bytes parked in a large kernel
// buffer on a dead connection could not be retried.
fn configure_socket(stream: &TcpStream, options: &SocketOptions) -> io::Result<()> {
    stream.set_nodelay(true)?;
    stream.set_write_timeout(Some(options.send_timeout))?;
    let socket = SockRef::from(stream);
    socket.set_keepalive(true)?;
    if options.send_buffer_size > 0 {
        socket.set_send_buffer_size(options.send_buffer_size)?;
    }
    Ok(())
}

fn handshake(
    stream: TcpStream,
    domain: &str,
    connector: &TlsConnector,
    options: &SocketOptions,
) -> Result<TlsStream<TcpStream>, ConnectError> {
    stream.set_read_timeout(Some(options.connect_timeout))?;
    stream.set_write_timeout(Some(options.connect_timeout))?;
    let stream = connector
        .connect(domain, stream)
        .map_err(|err| ConnectError::Handshake {
            domain: domain.to_owned(),
            message: err.to_string(),
        })?;
    let tcp = stream.get_ref();
    tcp.set_read_timeout(None)?;
    tcp.set_write_timeout(Some(options.send_timeout))?;
    Ok(stream)
}

/// Production connector opening [`TlsConnection`]s.
#[derive(Clone)]
pub struct TcpConnector {
    endpoint: CollectorEndpoint,
    options: SocketOptions,
    tls: Option<TlsConnector>,
}

impl TcpConnector {
    /// Build a connector; the TLS context is created once and reused.
    pub fn new(endpoint: CollectorEndpoint, options: SocketOptions) -> Result<Self, ConfigurationError> {
        let tls = endpoint.tls.as_ref().map(TlsOptions::connector).transpose()?;
        Ok(Self {
            endpoint,
            options,
            tls,
        })
    }

    pub fn from_config(config: &ShipperConfig) -> Result<Self, ConfigurationError> {
        Self::new(config.endpoint.clone(), SocketOptions::from(config))
    }

    pub fn endpoint(&self) -> &CollectorEndpoint {
        &self.endpoint
    }
}

impl Connector for TcpConnector {
    type Connection = TlsConnection;

    fn connect(&self) -> Result<TlsConnection, ConnectError> {
        TlsConnection::open(&self.endpoint, &self.options, self.tls.as_ref())
    }
}

impl std::fmt::Debug for TcpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnector")
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .finish()
    }
}
