//! Connection manager: bounded queue, sender workers and shutdown.
//!
//! [`ShippingManager::send`] enqueues an entry and returns; a baseline worker
//! thread drains the queue into one collector connection. When the queue
//! stays congested the baseline worker spawns up to
//! `max_additional_workers` extra senders, each with its own connection,
//! which retire once the burst clears. Wire order across workers is not
//! guaranteed; configure zero additional workers for strict ordering.

mod backoff;
mod pool;
mod queue;
pub mod retry;
mod worker;

use std::{
    cell::Cell,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::{
    config::ShipperConfig,
    entry::Entry,
    error::{ConfigurationError, SendError},
    rate_limited_warner::RateLimitedWarner,
    token::Token,
    transport::{Connector, TcpConnector},
};

use self::{
    pool::{ScalingPolicy, WorkerPool},
    queue::PendingQueue,
    worker::{Role, Worker},
};

thread_local! {
    static SENDER_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// True on threads running a sender worker.
#[cfg_attr(
    not(any(feature = "log-compat", feature = "tracing-compat")),
    allow(dead_code)
)]
pub(crate) fn is_sender_thread() -> bool {
    SENDER_THREAD.with(Cell::get)
}

fn mark_sender_thread() {
    SENDER_THREAD.with(|flag| flag.set(true));
}

pub(crate) struct Shared<C: Connector> {
    config: ShipperConfig,
    connector: C,
    queue: PendingQueue,
    pool: WorkerPool,
    rejected: RateLimitedWarner,
    dropped: RateLimitedWarner,
    connect_failures: RateLimitedWarner,
}

impl<C: Connector> Shared<C> {
    fn new(config: ShipperConfig, connector: C) -> Self {
        let warn_interval = config.warn_interval;
        Self {
            queue: PendingQueue::new(config.queue_capacity),
            pool: WorkerPool::new(ScalingPolicy::from_config(&config)),
            rejected: RateLimitedWarner::new(warn_interval),
            dropped: RateLimitedWarner::new(warn_interval),
            connect_failures: RateLimitedWarner::new(warn_interval),
            config,
            connector,
        }
    }

    fn flush_warnings(&self) {
        self.rejected.flush(|count| {
            warn!("logship: rejected {count} entries after shutdown began");
        });
        self.dropped.flush(|count| {
            warn!("logship: dropped {count} entries after exhausting retries");
        });
        self.connect_failures.flush(|count| {
            warn!("logship: {count} failed connection attempts to the collector");
        });
    }
}

/// Spawn an additional worker when the baseline worker finds the queue
/// congested.
pub(crate) fn upscale_if_needed<C: Connector>(shared: &Arc<Shared<C>>) {
    if shared.queue.is_closing() {
        return;
    }
    let depth = shared.queue.len();
    let Some(slot) = shared.pool.try_reserve(depth, Instant::now()) else {
        return;
    };
    let worker = Worker::new(Arc::clone(shared), Role::Additional(slot));
    match thread::Builder::new()
        .name("logship-sender".into())
        .spawn(move || {
            mark_sender_thread();
            worker.run();
        }) {
        Ok(handle) => {
            debug!(
                "logship: scaled up to {} additional workers at queue depth {depth}",
                shared.pool.active()
            );
            shared.pool.adopt(handle);
        }
        Err(err) => warn!("logship: failed to spawn additional worker: {err}"),
    }
}

/// Owner of the shipping pipeline.
///
/// Cheap to share behind an `Arc`; every method takes `&self` and may be
/// called from any thread. Dropping the manager closes it.
pub struct ShippingManager<C: Connector = TcpConnector> {
    shared: Arc<Shared<C>>,
    baseline: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ShippingManager<TcpConnector> {
    /// Start a pipeline shipping to the configured collector over TCP/TLS.
    pub fn start(config: ShipperConfig) -> Result<Self, ConfigurationError> {
        let connector = TcpConnector::from_config(&config)?;
        Self::with_connector(config, connector)
    }
}

impl<C: Connector> ShippingManager<C> {
    /// Start a pipeline using a custom connector.
    pub fn with_connector(config: ShipperConfig, connector: C) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let shared = Arc::new(Shared::new(config, connector));
        let worker = Worker::new(Arc::clone(&shared), Role::Baseline);
        let handle = thread::Builder::new()
            .name("logship-baseline".into())
            .spawn(move || {
                mark_sender_thread();
                worker.run();
            })?;
        Ok(Self {
            shared,
            baseline: Mutex::new(Some(handle)),
            closed: AtomicBool::new(false),
        })
    }

    /// Queue `text` for shipping under `token`.
    ///
    /// Blocks while the queue is full. Fails only once shutdown has begun;
    /// network trouble is never reported here.
    pub fn send(&self, token: &Token, text: impl Into<String>) -> Result<(), SendError> {
        let result = self.shared.queue.push(Entry::new(token.clone(), text));
        if result.is_err() {
            let warner = &self.shared.rejected;
            warner.record();
            warner.warn_if_due(|count| {
                warn!("logship: rejected {count} entries after shutdown began");
            });
        }
        result
    }

    /// Stop accepting entries, drain the queue and release every connection.
    ///
    /// Blocks until all workers have exited. Only the first call does any
    /// work; later and concurrent calls return immediately.
    pub fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let queue = &self.shared.queue;
        queue.stop();
        queue.fence_producers();
        queue.begin_drain();
        if let Some(handle) = self.baseline.lock().take()
            && handle.join().is_err()
        {
            warn!("logship: baseline worker panicked");
        }
        self.shared.pool.join_all();
        self.shared.flush_warnings();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Entries waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Additional workers currently alive.
    pub fn additional_workers(&self) -> usize {
        self.shared.pool.active()
    }

    pub fn config(&self) -> &ShipperConfig {
        &self.shared.config
    }
}

impl<C: Connector> Drop for ShippingManager<C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C: Connector> std::fmt::Debug for ShippingManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShippingManager")
            .field("queue_len", &self.queue_len())
            .field("additional_workers", &self.additional_workers())
            .field("closed", &self.is_closed())
            .finish()
    }
}
