//! Sender worker: drains the queue into its own collector connection.
//!
//! Each worker owns a transport, an encoder and a shipping buffer, so the
//! send path takes no lock. A worker moves through
//! `Reconnecting -> Ready -> Sending -> (Ready | Reconnecting)` for every
//! entry and ends with `Draining -> Stopped` once shutdown begins.

use std::sync::Arc;

use log::{debug, warn};

use crate::{
    buffer::ShippingBuffer,
    encoder::EntryEncoder,
    entry::Entry,
    error::TransportError,
    transport::{Connector, Transport},
};

use super::{
    Shared,
    backoff::RetryBackoff,
    pool::WorkerSlot,
    retry::{DropReason, SendOutcome, diagnostic_text},
    upscale_if_needed,
};

pub(crate) enum Role {
    /// Runs for the whole life of the manager and decides on scale-ups.
    Baseline,
    /// Temporary extra sender; retires once the queue calms down.
    Additional(WorkerSlot),
}

pub(crate) struct Worker<C: Connector> {
    shared: Arc<Shared<C>>,
    role: Role,
    connection: Option<C::Connection>,
    encoder: EntryEncoder,
    buffer: ShippingBuffer,
    backoff: RetryBackoff,
    abandoned: u64,
}

impl<C: Connector> Worker<C> {
    pub(crate) fn new(shared: Arc<Shared<C>>, role: Role) -> Self {
        let config = &shared.config;
        let encoder = EntryEncoder::new(config.staging_chars);
        let buffer = ShippingBuffer::new(config.buffer_size);
        let backoff = RetryBackoff::new(config.backoff.clone());
        Self {
            shared,
            role,
            connection: None,
            encoder,
            buffer,
            backoff,
            abandoned: 0,
        }
    }

    pub(crate) fn run(mut self) {
        self.reconnect();
        while let Some(entry) = self.next_entry() {
            self.process(&entry);
            match &self.role {
                Role::Baseline => upscale_if_needed(&self.shared),
                Role::Additional(_) => {
                    let policy = self.shared.pool.policy();
                    if policy.should_retire(self.shared.queue.len(), self.shared.queue.is_closing()) {
                        break;
                    }
                }
            }
        }
        self.finish();
    }

    // Buffered records are shipped before blocking on an empty queue; another
    // worker may have taken the entry that would have flushed them.
    fn next_entry(&mut self) -> Option<Entry> {
        if let Some(entry) = self.shared.queue.try_pop() {
            return Some(entry);
        }
        self.flush_pending();
        self.shared.queue.pop()
    }

    fn process(&mut self, entry: &Entry) {
        // The collector was unreachable when shutdown began; stop trying.
        if self.abandoned > 0 {
            self.abandoned += 1;
            return;
        }
        match self.send_with_retry(Some(entry)) {
            SendOutcome::Sent => {}
            SendOutcome::Dropped(DropReason::Shutdown) => self.abandoned += 1,
            SendOutcome::Dropped(reason) => self.report_drop(entry, &reason),
        }
    }

    /// Close the current connection, then open a new one, pausing between
    /// failed attempts. At least one attempt is made even after shutdown
    /// began; returns `false` only when shutdown interrupted the loop.
    fn reconnect(&mut self) -> bool {
        self.disconnect();
        loop {
            match self.shared.connector.connect() {
                Ok(connection) => {
                    self.connection = Some(connection);
                    return true;
                }
                Err(err) => {
                    let warner = &self.shared.connect_failures;
                    warner.record();
                    warner.warn_if_due(|count| {
                        warn!("logship: cannot reach collector: {err}; {count} failed connection attempts");
                    });
                    if self.shared.queue.wait_for_stop(self.shared.config.reconnect_pause) {
                        return false;
                    }
                }
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
    }

    /// Ship `entry` (or only the buffered bytes when `None`), reconnecting
    /// and retrying until it succeeds or `max_retries` attempts failed.
    ///
    /// The record is encoded into the buffer once; later attempts only
    /// retransmit the buffered bytes. When the attempts run out only this
    /// entry's record is cut from the buffer, so records coalesced before it
    /// are retransmitted with the next write.
    fn send_with_retry(&mut self, entry: Option<&Entry>) -> SendOutcome {
        let max_retries = self.shared.config.max_retries.max(1);
        let idle_timeout = self.shared.config.idle_timeout;
        let mut appended = entry.is_none();
        let mut attempts = 0;
        let mut stale_in_a_row = 0;
        loop {
            if self.connection.is_none() && !self.reconnect() {
                let own = usize::from(entry.is_some() && appended);
                let earlier = self.buffer.discard().saturating_sub(own);
                self.abandoned += earlier as u64;
                return SendOutcome::Dropped(DropReason::Shutdown);
            }
            let flush_now = entry.is_none() || self.shared.queue.is_empty();
            let Some(connection) = self.connection.as_mut() else {
                continue;
            };
            let result = attempt(
                connection,
                &mut self.encoder,
                &mut self.buffer,
                entry,
                &mut appended,
                flush_now,
                idle_timeout,
            );
            let err = match result {
                Ok(()) => return SendOutcome::Sent,
                Err(err) => err,
            };
            attempts += 1;
            self.disconnect();
            if attempts >= max_retries {
                if entry.is_some() && appended {
                    self.buffer.drop_last_record();
                }
                return SendOutcome::Dropped(DropReason::RetriesExhausted {
                    attempts,
                    last_error: err,
                });
            }
            debug!("logship: send attempt {attempts}/{max_retries} failed: {err}");
            // A stale connection was never written to and is replaced at once,
            // unless fresh connections keep going stale.
            let pause = if let TransportError::Stale(_) = err {
                stale_in_a_row += 1;
                (stale_in_a_row >= 2).then_some(self.shared.config.reconnect_pause)
            } else {
                stale_in_a_row = 0;
                Some(self.backoff.delay(attempts))
            };
            if let Some(pause) = pause {
                self.shared.queue.wait_for_stop(pause);
            }
        }
    }

    /// Ship whatever the buffer holds. Records that still cannot be
    /// delivered after every attempt are counted as dropped.
    fn flush_pending(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        match self.send_with_retry(None) {
            SendOutcome::Sent | SendOutcome::Dropped(DropReason::Shutdown) => {}
            SendOutcome::Dropped(reason) => {
                let lost = self.buffer.discard();
                self.count_dropped(lost, &reason);
            }
        }
    }

    fn count_dropped(&self, entries: usize, cause: &dyn std::fmt::Display) {
        if entries == 0 {
            return;
        }
        let warner = &self.shared.dropped;
        warner.record_many(entries as u64);
        warner.warn_if_due(|count| {
            warn!("logship: dropped {count} entries; last failure: {cause}");
        });
    }

    /// Count the drop, then ship a diagnostic entry with the same token in
    /// place of the dropped one. The diagnostic gets a single attempt; if it
    /// fails, the records buffered with it are counted as dropped too.
    fn report_drop(&mut self, entry: &Entry, reason: &DropReason) {
        self.count_dropped(1, reason);
        if self.connection.is_none() && !self.reconnect() {
            return;
        }
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        let diagnostic = Entry::new(entry.token.clone(), diagnostic_text(reason));
        let mut appended = false;
        let flush_now = self.shared.queue.is_empty();
        if let Err(err) = attempt(
            connection,
            &mut self.encoder,
            &mut self.buffer,
            Some(&diagnostic),
            &mut appended,
            flush_now,
            self.shared.config.idle_timeout,
        ) {
            debug!("logship: diagnostic entry not delivered: {err}");
            let lost = self.buffer.discard().saturating_sub(usize::from(appended));
            self.disconnect();
            self.count_dropped(lost, &err);
        }
    }

    fn finish(mut self) {
        self.flush_pending();
        if self.abandoned > 0 {
            warn!(
                "logship: shutdown abandoned {} entries; collector unreachable",
                self.abandoned
            );
        }
        self.disconnect();
        if matches!(self.role, Role::Additional(_)) {
            debug!(
                "logship: additional worker retiring at queue depth {}",
                self.shared.queue.len()
            );
        }
    }
}

// One attempt: refuse stale connections, encode the record unless an earlier
// attempt already did, and flush when no more work is queued.
fn attempt<T: Transport + ?Sized>(
    transport: &mut T,
    encoder: &mut EntryEncoder,
    buffer: &mut ShippingBuffer,
    entry: Option<&Entry>,
    appended: &mut bool,
    flush_now: bool,
    idle_timeout: std::time::Duration,
) -> Result<(), TransportError> {
    if transport.is_idle_for_too_long() {
        return Err(TransportError::Stale(idle_timeout));
    }
    if let Some(entry) = entry
        && !*appended
    {
        encoder.encode(entry.token.as_bytes(), &entry.text, buffer, transport)?;
        *appended = true;
    }
    if flush_now {
        buffer.flush(transport)?;
    }
    Ok(())
}
