//! Bounded FIFO shared by producers and sender workers.
//!
//! Shutdown runs in three steps so that no entry is lost or stranded:
//!
//! 1. [`stop`](PendingQueue::stop) rejects new entries and wakes producers
//!    blocked on a full queue, as well as workers sleeping between attempts.
//! 2. [`fence_producers`](PendingQueue::fence_producers) waits for every
//!    producer still inside [`push`](PendingQueue::push) to leave.
//! 3. [`begin_drain`](PendingQueue::begin_drain) lets [`pop`](PendingQueue::pop)
//!    return `None` once the queue is empty.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, select};
use parking_lot::{Mutex, RwLock};

use crate::{entry::Entry, error::SendError};

pub(crate) struct PendingQueue {
    tx: Sender<Entry>,
    rx: Receiver<Entry>,
    admission: RwLock<()>,
    closing: AtomicBool,
    // Never carries a message; dropping the sender is the signal.
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Receiver<()>,
    drain_tx: Mutex<Option<Sender<()>>>,
    drain_rx: Receiver<()>,
}

impl PendingQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        let (stop_tx, stop_rx) = bounded(0);
        let (drain_tx, drain_rx) = bounded(0);
        Self {
            tx,
            rx,
            admission: RwLock::new(()),
            closing: AtomicBool::new(false),
            stop_tx: Mutex::new(Some(stop_tx)),
            stop_rx,
            drain_tx: Mutex::new(Some(drain_tx)),
            drain_rx,
        }
    }

    /// Enqueue `entry`, blocking while the queue is full.
    pub(crate) fn push(&self, entry: Entry) -> Result<(), SendError> {
        let _admitted = self.admission.read();
        if self.is_closing() {
            return Err(SendError::Closed);
        }
        select! {
            send(self.tx, entry) -> sent => sent.map_err(|_| SendError::Closed),
            recv(self.stop_rx) -> _ => Err(SendError::Closed),
        }
    }

    /// Dequeue the next entry, blocking while the queue is empty.
    ///
    /// Returns `None` only after draining began and the queue is empty.
    pub(crate) fn pop(&self) -> Option<Entry> {
        select! {
            recv(self.rx) -> entry => entry.ok(),
            recv(self.drain_rx) -> _ => self.rx.try_recv().ok(),
        }
    }

    /// Dequeue the next entry without blocking.
    pub(crate) fn try_pop(&self) -> Option<Entry> {
        self.rx.try_recv().ok()
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    pub(crate) fn stop(&self) {
        self.closing.store(true, Ordering::Release);
        self.stop_tx.lock().take();
    }

    pub(crate) fn fence_producers(&self) {
        drop(self.admission.write());
    }

    pub(crate) fn begin_drain(&self) {
        self.drain_tx.lock().take();
    }

    /// Sleep for `pause` or until [`stop`](Self::stop) is called. Returns
    /// `true` when stopped.
    pub(crate) fn wait_for_stop(&self, pause: Duration) -> bool {
        if pause.is_zero() {
            return self.is_closing();
        }
        matches!(
            self.stop_rx.recv_timeout(pause),
            Err(RecvTimeoutError::Disconnected)
        )
    }
}
