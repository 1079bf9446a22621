//! Test doubles shared by unit and integration tests.
//!
//! Compiled for unit tests and, through the `test-util` feature, for the
//! integration tests under `tests/`.

pub mod capture_log;

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;

use crate::{
    error::{ConnectError, TransportError},
    transport::{Connector, Transport},
};

/// In-memory transport recording every write.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub writes: Vec<Vec<u8>>,
    pub idle: bool,
    pub closed: bool,
    successes_left: Option<usize>,
}

impl RecordingTransport {
    /// Accept `successes` writes, then fail every following one.
    pub fn failing_after(successes: usize) -> Self {
        Self {
            successes_left: Some(successes),
            ..Self::default()
        }
    }

    /// All written bytes in order.
    pub fn concat(&self) -> Vec<u8> {
        self.writes.concat()
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(io::Error::from(io::ErrorKind::NotConnected).into());
        }
        if let Some(left) = self.successes_left.as_mut() {
            if *left == 0 {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe).into());
            }
            *left -= 1;
        }
        self.writes.push(bytes.to_vec());
        Ok(())
    }

    fn is_idle_for_too_long(&self) -> bool {
        self.idle
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

type WritePredicate = Box<dyn Fn(&[u8]) -> bool + Send + Sync>;

#[derive(Default)]
struct FakeLedger {
    connects: usize,
    closes: usize,
    failed_writes: usize,
    writes: Vec<(usize, Vec<u8>)>,
}

struct FakeShared {
    ledger: Mutex<FakeLedger>,
    refusing: AtomicUsize,
    idle_connections: usize,
    fail_when: Option<WritePredicate>,
    gate: Option<Receiver<()>>,
}

/// Scripted [`Connector`] whose connections record writes in a shared ledger.
///
/// Clones share the ledger, so a test keeps one clone for inspection and
/// hands the other to the manager.
#[derive(Clone)]
pub struct FakeConnector {
    shared: Arc<FakeShared>,
}

/// Builder for [`FakeConnector`].
#[derive(Default)]
pub struct FakeConnectorBuilder {
    refusing: usize,
    idle_connections: usize,
    fail_when: Option<WritePredicate>,
    gate: Option<Receiver<()>>,
}

impl FakeConnectorBuilder {
    /// Refuse the first `count` connection attempts. `usize::MAX` refuses
    /// forever.
    pub fn refusing(mut self, count: usize) -> Self {
        self.refusing = count;
        self
    }

    /// The first `count` connections report themselves idle for too long.
    pub fn idle_connections(mut self, count: usize) -> Self {
        self.idle_connections = count;
        self
    }

    /// Fail every write whose payload matches `predicate`.
    pub fn failing_when(mut self, predicate: impl Fn(&[u8]) -> bool + Send + Sync + 'static) -> Self {
        self.fail_when = Some(Box::new(predicate));
        self
    }

    /// Block every `connect` until the returned sender is used or dropped.
    /// Dropping it opens the gate for good.
    pub fn gated(mut self) -> (Self, Sender<()>) {
        let (tx, rx) = bounded(0);
        self.gate = Some(rx);
        (self, tx)
    }

    pub fn build(self) -> FakeConnector {
        FakeConnector {
            shared: Arc::new(FakeShared {
                ledger: Mutex::new(FakeLedger::default()),
                refusing: AtomicUsize::new(self.refusing),
                idle_connections: self.idle_connections,
                fail_when: self.fail_when,
                gate: self.gate,
            }),
        }
    }
}

impl FakeConnector {
    pub fn builder() -> FakeConnectorBuilder {
        FakeConnectorBuilder::default()
    }

    /// Connector accepting every connection and write.
    pub fn healthy() -> Self {
        Self::builder().build()
    }

    /// Start or stop refusing connection attempts.
    pub fn set_refusing(&self, count: usize) {
        self.shared.refusing.store(count, Ordering::SeqCst);
    }

    /// Successful connections so far.
    pub fn connects(&self) -> usize {
        self.shared.ledger.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.shared.ledger.lock().closes
    }

    pub fn failed_writes(&self) -> usize {
        self.shared.ledger.lock().failed_writes
    }

    /// Successful writes tagged with the 1-based connection number.
    pub fn writes(&self) -> Vec<(usize, Vec<u8>)> {
        self.shared.ledger.lock().writes.clone()
    }

    /// Every successfully written byte in arrival order.
    pub fn wire(&self) -> Vec<u8> {
        self.shared
            .ledger
            .lock()
            .writes
            .iter()
            .flat_map(|(_, bytes)| bytes.iter().copied())
            .collect()
    }

    /// Delivered records without their trailing delimiter.
    pub fn records(&self) -> Vec<String> {
        let wire = self.wire();
        String::from_utf8_lossy(&wire)
            .split_terminator('\n')
            .map(str::to_owned)
            .collect()
    }
}

impl Connector for FakeConnector {
    type Connection = FakeConnection;

    fn connect(&self) -> Result<FakeConnection, ConnectError> {
        if let Some(gate) = &self.shared.gate {
            let _ = gate.recv();
        }
        let refused = self
            .shared
            .refusing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if refused {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
        }
        let mut ledger = self.shared.ledger.lock();
        ledger.connects += 1;
        let id = ledger.connects;
        Ok(FakeConnection {
            id,
            idle: id <= self.shared.idle_connections,
            closed: false,
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Connection handed out by [`FakeConnector`].
pub struct FakeConnection {
    id: usize,
    idle: bool,
    closed: bool,
    shared: Arc<FakeShared>,
}

impl Transport for FakeConnection {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(io::Error::from(io::ErrorKind::NotConnected).into());
        }
        let mut ledger = self.shared.ledger.lock();
        if self.shared.fail_when.as_ref().is_some_and(|fail| fail(bytes)) {
            ledger.failed_writes += 1;
            return Err(io::Error::from(io::ErrorKind::ConnectionReset).into());
        }
        ledger.writes.push((self.id, bytes.to_vec()));
        Ok(())
    }

    fn is_idle_for_too_long(&self) -> bool {
        self.idle
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.ledger.lock().closes += 1;
        }
    }
}
