//! Write/read/complete index state machine for send frames.
//!
//! Each send frame owns a small ring of slots. The application writes into
//! `write_index`, which then becomes the pending `read_index` that the
//! transport consumes. The transport (or the sender after a synchronous send)
//! calls [`SendFrameStatus::send_complete`] once it no longer references the
//! slot's memory.
//!
//! ```text
//!           set_sender_status(true)
//!   IDLE ---------------------------> ACTIVE/NO_PENDING
//!    ^                                   |        ^
//!    | set_sender_status(false)   write  |        | send_complete
//!    +-------------------------------  ACTIVE/PENDING
//! ```
//!
//! While idle every write is a no-op that returns `Ok(false)`. A write whose
//! target slot is still the pending one fails with [`Error::SlotPending`]
//! instead of overwriting memory the transport may be reading.

use std::{
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use crate::{waitable_completion::WaitableCompletion, Error, Result};

/// Default number of send slots per frame.
pub const MAX_FRAME_BUFFERS: usize = 4;

#[derive(Debug, Default)]
struct SendSlot<T> {
    data: Vec<T>,
    len: usize,
    timestamp: i64,
}

#[derive(Debug)]
struct StatusState<T> {
    slots: Vec<SendSlot<T>>,
    slot_capacity: usize,
    write_index: usize,
    read_index: Option<usize>,
    active: bool,
}

/// Read access to the pending slot, handed to the transport.
#[derive(Debug, Clone, Copy)]
pub struct PendingSlot<'a, T> {
    pub index: usize,
    pub data: &'a [T],
    pub timestamp: i64,
}

/// Single-pending-slot send state shared by audio and video send frames.
#[derive(Debug)]
pub struct SendFrameStatus<T> {
    state: Mutex<StatusState<T>>,
    completion: WaitableCompletion,
}

fn allocate<T: Copy + Default>(len: usize) -> Result<Vec<T>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|e| Error::AllocationFailure(format!("send slot of {len} elements: {e}")))?;
    data.resize(len, T::default());
    Ok(data)
}

impl<T: Copy + Default> SendFrameStatus<T> {
    /// Creates an idle status with [`MAX_FRAME_BUFFERS`] slots of `slot_capacity` elements.
    pub fn new(slot_capacity: usize) -> Result<Self> {
        Self::with_slots(MAX_FRAME_BUFFERS, slot_capacity)
    }

    /// Creates an idle status with `num_slots` slots.
    ///
    /// With a single slot every write after the first has to wait for
    /// [`Self::send_complete`].
    pub fn with_slots(num_slots: usize, slot_capacity: usize) -> Result<Self> {
        if num_slots == 0 {
            return Err(Error::InvalidConfiguration(
                "a send frame needs at least one slot".into(),
            ));
        }
        let slots = (0..num_slots)
            .map(|_| {
                Ok(SendSlot {
                    data: allocate(slot_capacity)?,
                    len: 0,
                    timestamp: 0,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            state: Mutex::new(StatusState {
                slots,
                slot_capacity,
                write_index: 0,
                read_index: None,
                active: false,
            }),
            completion: WaitableCompletion::new_completed(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, StatusState<T>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn num_slots(&self) -> usize {
        self.lock().slots.len()
    }

    /// Maximum number of elements one write may carry.
    pub fn slot_capacity(&self) -> usize {
        self.lock().slot_capacity
    }

    pub fn write_index(&self) -> usize {
        self.lock().write_index
    }

    /// The pending slot, `None` when nothing awaits the transport.
    pub fn read_index(&self) -> Option<usize> {
        self.lock().read_index
    }

    pub fn is_pending(&self) -> bool {
        self.lock().read_index.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Enables or disables writes.
    pub fn set_sender_status(&self, active: bool) {
        let mut state = self.lock();
        if state.active != active {
            debug!(active, "send frame status changed");
        }
        state.active = active;
    }

    /// Resizes every slot.
    ///
    /// Fails with [`Error::InvalidState`] while a slot is pending.
    pub fn set_slot_capacity(&self, slot_capacity: usize) -> Result<()> {
        let mut state = self.lock();
        if let Some(index) = state.read_index {
            return Err(Error::InvalidState(format!(
                "can not resize send slots while slot {index} is pending"
            )));
        }
        let mut resized = Vec::with_capacity(state.slots.len());
        for _ in 0..state.slots.len() {
            resized.push(SendSlot {
                data: allocate(slot_capacity)?,
                len: 0,
                timestamp: 0,
            });
        }
        state.slots = resized;
        state.slot_capacity = slot_capacity;
        state.write_index = 0;
        Ok(())
    }

    /// Writes `len` elements into the next slot and marks it pending.
    ///
    /// Returns `Ok(false)` without touching anything while the status is idle.
    ///
    /// Only the newest pending slot is protected. A write while a frame is
    /// pending moves `read_index` to the new slot, so an older pending slot
    /// becomes writable again once `write_index` wraps around to it. A write
    /// that targets the protected slot (only possible with a single slot)
    /// fails with [`Error::SlotPending`].
    pub fn write<F>(&self, len: usize, timestamp: i64, fill: F) -> Result<bool>
    where
        F: FnOnce(&mut [T]),
    {
        let mut state = self.lock();
        Self::write_locked(&mut state, &self.completion, len, timestamp, fill)
    }

    /// Like [`Self::write`], but waits up to `timeout` for a pending target
    /// slot to complete instead of failing straight away.
    pub fn write_timeout<F>(&self, len: usize, timestamp: i64, timeout: Duration, fill: F) -> Result<bool>
    where
        F: FnOnce(&mut [T]),
    {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            {
                let mut state = self.lock();
                if !Self::target_is_pending(&state) {
                    return Self::write_locked(&mut state, &self.completion, len, timestamp, fill);
                }
            }
            let remaining =
                deadline.map_or(timeout, |d| d.saturating_duration_since(Instant::now()));
            if remaining.is_zero() || !self.completion.wait_timeout(remaining) {
                let index = self.write_index();
                warn!(index, ?timeout, "send slot still pending after timeout");
                return Err(Error::SlotPending { index });
            }
        }
    }

    fn target_is_pending(state: &StatusState<T>) -> bool {
        state.active && state.read_index == Some(state.write_index)
    }

    fn write_locked<F>(
        state: &mut StatusState<T>,
        completion: &WaitableCompletion,
        len: usize,
        timestamp: i64,
        fill: F,
    ) -> Result<bool>
    where
        F: FnOnce(&mut [T]),
    {
        if !state.active {
            debug!("send frame idle, write ignored");
            return Ok(false);
        }
        if len > state.slot_capacity {
            return Err(Error::BufferSizeMismatch {
                expected: state.slot_capacity,
                actual: len,
            });
        }
        let index = state.write_index;
        if state.read_index == Some(index) {
            warn!(index, "send slot still pending, transport has not kept pace");
            return Err(Error::SlotPending { index });
        }

        let slot = &mut state.slots[index];
        fill(&mut slot.data[..len]);
        slot.len = len;
        slot.timestamp = timestamp;

        state.read_index = Some(index);
        state.write_index = (index + 1) % state.slots.len();
        completion.reset();
        Ok(true)
    }

    /// Runs `f` on the pending slot while holding the status lock.
    ///
    /// Returns `None` when nothing is pending.
    pub fn with_pending<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(PendingSlot<'_, T>) -> R,
    {
        let state = self.lock();
        let index = state.read_index?;
        let slot = &state.slots[index];
        Some(f(PendingSlot {
            index,
            data: &slot.data[..slot.len],
            timestamp: slot.timestamp,
        }))
    }

    /// Copies the pending slot out.
    pub fn read_pending(&self) -> Option<(Vec<T>, i64)> {
        self.with_pending(|slot| (slot.data.to_vec(), slot.timestamp))
    }

    /// The transport no longer references the pending slot.
    pub fn send_complete(&self) {
        let mut state = self.lock();
        state.read_index = None;
        self.completion.signal();
    }

    /// Blocks until nothing is pending or `timeout` elapses.
    pub fn wait_send_complete(&self, timeout: Duration) -> bool {
        self.completion.wait_timeout(timeout)
    }

    /// Resets the cursors and releases slot memory. The status stays in its
    /// current active/idle state.
    pub fn destroy(&self) {
        let mut state = self.lock();
        state.write_index = 0;
        state.read_index = None;
        for slot in &mut state.slots {
            slot.data = Vec::new();
            slot.len = 0;
        }
        state.slot_capacity = 0;
        self.completion.signal();
    }
}
