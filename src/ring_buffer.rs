//! Fixed-capacity ring of frame slots with overwrite-oldest eviction.
//!
//! [`RingBuffer`] is the storage core shared by the audio and video receive
//! frames. It is a plain data structure; the owning frame object wraps it in a
//! [`Shared`] lock so that every operation, including [`RingBuffer::read_all`],
//! runs atomically with respect to concurrent writers.
//!
//! Slot payloads live behind an [`Arc`] so a slot can be handed out as a
//! zero-copy view. A slot that is still referenced by a view can not be
//! overwritten; the write fails with [`Error::SlotInUse`] instead.

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard},
    time::Duration,
};

use tracing::trace;

use crate::{Error, Result};

/// Default number of slots for receive buffers.
pub const DEFAULT_MAX_BUFFERS: usize = 4;

/// Sizing options for receive buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvBufferOptions {
    /// Slots in the ring; the oldest is evicted once all are unread.
    pub max_buffers: usize,
}

impl RecvBufferOptions {
    pub fn builder() -> RecvBufferOptionsBuilder {
        RecvBufferOptionsBuilder::default()
    }
}

impl Default for RecvBufferOptions {
    fn default() -> Self {
        Self {
            max_buffers: DEFAULT_MAX_BUFFERS,
        }
    }
}

/// Builder for [`RecvBufferOptions`].
#[derive(Debug, Clone, Default)]
pub struct RecvBufferOptionsBuilder {
    max_buffers: Option<usize>,
}

impl RecvBufferOptionsBuilder {
    /// Set the number of ring slots
    #[must_use]
    pub fn max_buffers(mut self, max_buffers: usize) -> Self {
        self.max_buffers = Some(max_buffers);
        self
    }

    pub fn build(self) -> Result<RecvBufferOptions> {
        let max_buffers = self.max_buffers.unwrap_or(DEFAULT_MAX_BUFFERS);
        if max_buffers == 0 {
            return Err(Error::InvalidConfiguration(
                "max_buffers must be at least 1".into(),
            ));
        }
        Ok(RecvBufferOptions { max_buffers })
    }
}

/// One storage unit inside a [`RingBuffer`].
///
/// The backing allocation grows to the largest payload seen and is reused for
/// every later write.
#[derive(Debug, Clone)]
pub struct FrameSlot<T> {
    data: Arc<Vec<T>>,
    len: usize,
    timestamp: i64,
    valid: bool,
}

impl<T> FrameSlot<T> {
    fn new() -> Self {
        Self {
            data: Arc::new(Vec::new()),
            len: 0,
            timestamp: 0,
            valid: false,
        }
    }

    /// Payload of the last write into this slot.
    pub fn data(&self) -> &[T] {
        &self.data[..self.len]
    }

    /// Number of elements in the payload.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Timestamp in 100 ns units.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Whether the slot holds unread data.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Elements the slot can hold without reallocating.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of views sharing this slot's memory.
    pub fn views(&self) -> usize {
        Arc::strong_count(&self.data) - 1
    }
}

/// What a successful write did to the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Slot that received the payload.
    pub index: usize,
    /// Whether the oldest unread slot was evicted to make room.
    pub evicted: bool,
}

/// Circular buffer of `max_buffers` frame slots.
///
/// Reads are FIFO. Writing into a full ring silently evicts the oldest
/// unread slot, so the writer never blocks; the eviction is counted and
/// reported through [`WriteOutcome`].
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Vec<FrameSlot<T>>,
    write_index: usize,
    depth: usize,
    evicted: u64,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Creates a ring with `max_buffers` empty slots.
    pub fn new(max_buffers: usize) -> Result<Self> {
        if max_buffers == 0 {
            return Err(Error::InvalidConfiguration(
                "max_buffers must be at least 1".into(),
            ));
        }
        Ok(Self {
            slots: (0..max_buffers).map(|_| FrameSlot::new()).collect(),
            write_index: 0,
            depth: 0,
            evicted: 0,
        })
    }

    pub fn max_buffers(&self) -> usize {
        self.slots.len()
    }

    /// Number of unread slots.
    pub fn peek_depth(&self) -> usize {
        self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.depth == 0
    }

    pub fn is_full(&self) -> bool {
        self.depth == self.slots.len()
    }

    /// Total number of slots evicted by overwrite since construction.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Index of the slot the next write will land in.
    pub fn next_write_index(&self) -> usize {
        self.write_index
    }

    fn read_index(&self) -> usize {
        let n = self.slots.len();
        (self.write_index + n - self.depth) % n
    }

    /// Copies `payload` into the next slot.
    pub fn write(&mut self, payload: &[T], timestamp: i64) -> Result<WriteOutcome> {
        self.write_with(payload.len(), timestamp, |dest| dest.copy_from_slice(payload))
    }

    /// Claims the next slot with room for `len` elements and lets `fill`
    /// populate it in place.
    ///
    /// On failure (slot still viewed, or growth impossible) nothing changes:
    /// depth, cursors and every slot's contents stay as they were.
    pub fn write_with<F>(&mut self, len: usize, timestamp: i64, fill: F) -> Result<WriteOutcome>
    where
        F: FnOnce(&mut [T]),
    {
        let index = self.write_index;
        let full = self.is_full();
        let slot = &mut self.slots[index];
        let views = slot.views();
        let buf = Arc::get_mut(&mut slot.data).ok_or(Error::SlotInUse { index, views })?;

        if buf.len() < len {
            buf.try_reserve_exact(len - buf.len()).map_err(|e| {
                Error::AllocationFailure(format!("slot {index} could not grow to {len}: {e}"))
            })?;
            buf.resize(len, T::default());
        }
        fill(&mut buf[..len]);

        slot.len = len;
        slot.timestamp = timestamp;
        slot.valid = true;

        if full {
            self.depth -= 1;
            self.evicted += 1;
            trace!(index, "ring buffer full, evicted oldest slot");
        }
        self.write_index = (index + 1) % self.slots.len();
        self.depth += 1;

        Ok(WriteOutcome {
            index,
            evicted: full,
        })
    }

    /// Oldest unread slot.
    pub fn front(&self) -> Option<&FrameSlot<T>> {
        (self.depth > 0).then(|| &self.slots[self.read_index()])
    }

    /// Newest unread slot.
    pub fn back(&self) -> Option<&FrameSlot<T>> {
        if self.depth == 0 {
            return None;
        }
        let n = self.slots.len();
        Some(&self.slots[(self.write_index + n - 1) % n])
    }

    /// Marks the oldest unread slot as read and returns its index.
    pub fn pop_front(&mut self) -> Option<usize> {
        if self.depth == 0 {
            return None;
        }
        let index = self.read_index();
        self.slots[index].valid = false;
        self.depth -= 1;
        Some(index)
    }

    /// Pops the oldest slot, copying its payload out.
    pub fn read(&mut self) -> Result<(Vec<T>, i64)> {
        let slot = self.front().ok_or(Error::EmptyBuffer)?;
        let out = (slot.data().to_vec(), slot.timestamp);
        self.pop_front();
        Ok(out)
    }

    /// Pops the oldest slot into `dest`, returning the element count and timestamp.
    ///
    /// `dest` must be at least as long as the payload; otherwise the slot
    /// stays unread.
    pub fn read_into(&mut self, dest: &mut [T]) -> Result<(usize, i64)> {
        let slot = self.front().ok_or(Error::EmptyBuffer)?;
        let len = slot.len;
        if dest.len() < len {
            return Err(Error::BufferSizeMismatch {
                expected: len,
                actual: dest.len(),
            });
        }
        dest[..len].copy_from_slice(slot.data());
        let timestamp = slot.timestamp;
        self.pop_front();
        Ok((len, timestamp))
    }

    /// Drains every unread slot oldest-to-newest.
    ///
    /// Returns the payloads concatenated and one timestamp per slot.
    pub fn read_all(&mut self) -> (Vec<T>, Vec<i64>) {
        let mut data = Vec::with_capacity(self.total_len());
        let mut timestamps = Vec::with_capacity(self.depth);
        for slot in self.iter() {
            data.extend_from_slice(slot.data());
            timestamps.push(slot.timestamp);
        }
        self.clear();
        (data, timestamps)
    }

    /// Unread slots, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &FrameSlot<T>> + '_ {
        let n = self.slots.len();
        let start = self.read_index();
        (0..self.depth).map(move |i| &self.slots[(start + i) % n])
    }

    /// Sum of payload lengths over the unread slots.
    pub fn total_len(&self) -> usize {
        self.iter().map(FrameSlot::len).sum()
    }

    /// Discards every unread slot, keeping allocations.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.valid = false;
        }
        self.depth = 0;
    }

    pub fn slot(&self, index: usize) -> Option<&FrameSlot<T>> {
        self.slots.get(index)
    }

    /// Hands out a shared reference to a slot's memory.
    ///
    /// While the returned `Arc` is alive the slot can not be written.
    pub(crate) fn share(&self, index: usize) -> Option<Arc<Vec<T>>> {
        self.slots.get(index).map(|slot| Arc::clone(&slot.data))
    }

    /// Total number of outstanding views across all slots.
    pub fn view_count(&self) -> usize {
        self.slots.iter().map(FrameSlot::views).sum()
    }
}

/// A value guarded by a mutex plus a condition variable for blocking waits.
///
/// Poisoned locks are recovered rather than propagated as panics.
#[derive(Debug, Default)]
pub(crate) struct Shared<S> {
    state: Mutex<S>,
    cond: Condvar,
}

impl<S> Shared<S> {
    pub(crate) fn new(state: S) -> Self {
        Self {
            state: Mutex::new(state),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, S> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wakes every thread blocked in [`Shared::wait_until`].
    pub(crate) fn notify_all(&self) {
        self.cond.notify_all();
    }

    /// Blocks until `ready` holds or `timeout` elapses.
    ///
    /// Returns the re-acquired guard and whether `ready` was satisfied.
    pub(crate) fn wait_until<'a, F>(
        &'a self,
        guard: MutexGuard<'a, S>,
        timeout: Duration,
        mut ready: F,
    ) -> (MutexGuard<'a, S>, bool)
    where
        F: FnMut(&S) -> bool,
    {
        let (guard, result) = self
            .cond
            .wait_timeout_while(guard, timeout, |state| !ready(state))
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (guard, !result.timed_out())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(tag: u8, len: usize) -> Vec<u8> {
        vec![tag; len]
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            RingBuffer::<u8>::new(0),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_options_builder() {
        assert_eq!(RecvBufferOptions::builder().build().unwrap().max_buffers, 4);
        assert_eq!(
            RecvBufferOptions::builder().max_buffers(8).build().unwrap(),
            RecvBufferOptions { max_buffers: 8 }
        );
        assert!(RecvBufferOptions::builder().max_buffers(0).build().is_err());
    }

    #[test]
    fn test_fifo_order() {
        let mut ring = RingBuffer::new(4).unwrap();
        for i in 0..3u8 {
            ring.write(&segment(i, 8), i64::from(i) * 10).unwrap();
        }
        assert_eq!(ring.peek_depth(), 3);
        for i in 0..3u8 {
            let (data, ts) = ring.read().unwrap();
            assert_eq!(data, segment(i, 8));
            assert_eq!(ts, i64::from(i) * 10);
        }
        assert!(matches!(ring.read(), Err(Error::EmptyBuffer)));
    }

    /// Writing A..E into four slots evicts A and read_all returns B..E.
    #[test]
    fn test_overwrite_oldest_then_read_all() {
        let mut ring = RingBuffer::new(4).unwrap();
        let tags = [b'A', b'B', b'C', b'D', b'E'];
        let mut last = None;
        for (i, tag) in tags.iter().enumerate() {
            last = Some(ring.write(&segment(*tag, 2), i as i64).unwrap());
        }
        assert_eq!(ring.peek_depth(), 4);
        assert_eq!(ring.evicted(), 1);
        assert!(last.unwrap().evicted);

        let (data, timestamps) = ring.read_all();
        assert_eq!(data, b"BBCCDDEE".to_vec());
        assert_eq!(timestamps, vec![1, 2, 3, 4]);
        assert_eq!(ring.peek_depth(), 0);
    }

    #[test]
    fn test_slots_grow_and_keep_variable_lengths() {
        let mut ring = RingBuffer::new(2).unwrap();
        ring.write(&segment(1, 4), 0).unwrap();
        ring.write(&segment(2, 16), 1).unwrap();
        ring.write(&segment(3, 2), 2).unwrap();
        assert_eq!(ring.total_len(), 18);
        let slot = ring.front().unwrap();
        assert_eq!(slot.data(), &segment(2, 16)[..]);
        assert_eq!(ring.back().unwrap().data(), &[3, 3]);
        // slot 0 grew to 4 and was reused for the 2-element write
        assert!(ring.slot(0).unwrap().capacity() >= 4);
    }

    #[test]
    fn test_read_into_short_destination_keeps_slot() {
        let mut ring = RingBuffer::new(2).unwrap();
        ring.write(&segment(7, 6), 42).unwrap();
        let mut short = [0u8; 4];
        assert!(matches!(
            ring.read_into(&mut short),
            Err(Error::BufferSizeMismatch {
                expected: 6,
                actual: 4
            })
        ));
        assert_eq!(ring.peek_depth(), 1);

        let mut dest = [0u8; 8];
        assert_eq!(ring.read_into(&mut dest).unwrap(), (6, 42));
        assert_eq!(&dest[..6], &segment(7, 6)[..]);
    }

    #[test]
    fn test_shared_slot_rejects_write_without_side_effects() {
        let mut ring = RingBuffer::new(1).unwrap();
        ring.write(&segment(1, 3), 5).unwrap();
        let view = ring.share(0).unwrap();
        assert_eq!(ring.view_count(), 1);

        let err = ring.write(&segment(2, 3), 6).unwrap_err();
        assert!(matches!(err, Error::SlotInUse { index: 0, views: 1 }));
        assert_eq!(ring.peek_depth(), 1);
        assert_eq!(ring.front().unwrap().timestamp(), 5);

        drop(view);
        assert_eq!(ring.view_count(), 0);
        ring.write(&segment(2, 3), 6).unwrap();
        assert_eq!(ring.read().unwrap(), (segment(2, 3), 6));
    }

    #[test]
    fn test_wait_until_times_out_and_wakes() {
        let shared = Arc::new(Shared::new(0usize));
        let guard = shared.lock();
        let (guard, ready) = shared.wait_until(guard, Duration::from_millis(10), |v| *v > 0);
        assert!(!ready);
        drop(guard);

        let other = Arc::clone(&shared);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            *other.lock() = 1;
            other.notify_all();
        });
        let guard = shared.lock();
        let (_guard, ready) = shared.wait_until(guard, Duration::from_secs(5), |v| *v > 0);
        assert!(ready);
        handle.join().unwrap();
    }
}
