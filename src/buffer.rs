//! Fixed-capacity send buffer coalescing encoded records into one write.

use crate::{error::TransportError, transport::Transport};

/// Byte region plus a fill cursor; `len <= capacity` at all times.
///
/// A failed [`flush`](Self::flush) keeps the contents so the same bytes can be
/// retransmitted once a new connection is available. The buffer also counts
/// the records whose bytes it holds and remembers where the newest one starts,
/// so a single undeliverable record can be cut out without losing the records
/// coalesced before it.
pub struct ShippingBuffer {
    bytes: Box<[u8]>,
    len: usize,
    records: usize,
    // Start of the record being encoded, reset to 0 when a flush streams it.
    open_record: Option<usize>,
    last_record: Option<usize>,
}

impl ShippingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity].into_boxed_slice(),
            len: 0,
            records: 0,
            open_record: None,
            last_record: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn remaining(&self) -> usize {
        self.capacity() - self.len
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Copy `bytes` in when they fit entirely. Returns `false` otherwise,
    /// leaving the buffer unchanged.
    pub fn append(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.remaining() {
            return false;
        }
        self.bytes[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        true
    }

    /// Copy as much of `bytes` as fits and return how many were taken.
    pub fn fill(&mut self, bytes: &[u8]) -> usize {
        let taken = bytes.len().min(self.remaining());
        self.bytes[self.len..self.len + taken].copy_from_slice(&bytes[..taken]);
        self.len += taken;
        taken
    }

    /// Complete records with bytes still in the buffer. A record streamed
    /// through earlier flushes counts once its delimiter is buffered.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Unused tail of the buffer, for encoders writing in place.
    pub(crate) fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[self.len..]
    }

    /// Mark `written` bytes of [`spare_mut`](Self::spare_mut) as filled.
    /// Clamped to the free space.
    pub(crate) fn advance(&mut self, written: usize) {
        self.len += written.min(self.remaining());
    }

    pub(crate) fn begin_record(&mut self) {
        self.open_record = Some(self.len);
    }

    pub(crate) fn commit_record(&mut self) {
        self.last_record = self.open_record.take();
        self.records += 1;
    }

    /// Discard the bytes of the record being encoded.
    pub(crate) fn abandon_record(&mut self) {
        if let Some(start) = self.open_record.take() {
            self.len = self.len.min(start);
        }
    }

    /// Cut the newest complete record out of the buffer, keeping the records
    /// before it. Returns `false` when the newest record is not known.
    pub(crate) fn drop_last_record(&mut self) -> bool {
        let Some(start) = self.last_record.take() else {
            return false;
        };
        self.len = self.len.min(start);
        self.records = self.records.saturating_sub(1);
        true
    }

    /// Empty the buffer and return how many records it held.
    pub fn discard(&mut self) -> usize {
        let records = self.records;
        self.clear();
        records
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.records = 0;
        self.open_record = None;
        self.last_record = None;
    }

    /// Send the buffered region as one write and reset the cursor.
    pub fn flush<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), TransportError> {
        if self.len == 0 {
            return Ok(());
        }
        transport.send(&self.bytes[..self.len])?;
        self.len = 0;
        self.records = 0;
        self.last_record = None;
        if self.open_record.is_some() {
            self.open_record = Some(0);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ShippingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShippingBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len)
            .field("records", &self.records)
            .finish()
    }
}
