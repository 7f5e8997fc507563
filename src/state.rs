//! A small finite-state machine shared between threads.
//!
//! [`StateGroup`] holds an ordered list of named states. Any thread may move
//! the group forward, jump to a named state or reset it, and any thread may
//! block until a given state is reached. Producer/consumer tests use it to
//! sequence phases such as `"idle" -> "streaming" -> "draining" -> "done"`.

use std::time::Duration;

use tracing::debug;

use crate::{ring_buffer::Shared, Error, Result};

#[derive(Debug)]
struct Position {
    index: usize,
    transitions: u64,
}

/// Ordered named states behind one lock.
#[derive(Debug)]
pub struct StateGroup {
    names: Vec<String>,
    shared: Shared<Position>,
}

impl StateGroup {
    /// Creates a group positioned on the first state.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if `names` is empty or contains a
    /// duplicate.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(Error::InvalidConfiguration(
                "state group needs at least one state".into(),
            ));
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(Error::InvalidConfiguration(format!(
                    "duplicate state name {name:?}"
                )));
            }
        }
        Ok(Self {
            names,
            shared: Shared::new(Position {
                index: 0,
                transitions: 0,
            }),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn current(&self) -> &str {
        &self.names[self.current_index()]
    }

    pub fn current_index(&self) -> usize {
        self.shared.lock().index
    }

    pub fn is_final(&self) -> bool {
        self.current_index() + 1 == self.names.len()
    }

    /// Number of transitions applied since creation, resets included.
    pub fn transitions(&self) -> u64 {
        self.shared.lock().transitions
    }

    /// Applies `next` to the current index under the lock, then wakes waiters.
    fn transition<F>(&self, next: F) -> Result<&str>
    where
        F: FnOnce(usize) -> Result<usize>,
    {
        let mut position = self.shared.lock();
        let from = position.index;
        let to = next(from)?;
        position.index = to;
        position.transitions += 1;
        drop(position);
        self.shared.notify_all();
        debug!(from = %self.names[from], to = %self.names[to], "state transition");
        Ok(&self.names[to])
    }

    /// Jumps to the named state.
    pub fn set_current(&self, name: &str) -> Result<()> {
        let target = self
            .index_of(name)
            .ok_or_else(|| Error::InvalidState(format!("unknown state {name:?}")))?;
        self.transition(|_| Ok(target)).map(|_| ())
    }

    /// Moves to the next state and returns its name.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] when already on the last state.
    pub fn advance(&self) -> Result<&str> {
        let last = self.names.len() - 1;
        self.transition(|index| {
            if index == last {
                Err(Error::InvalidState(format!(
                    "state {:?} is the last state",
                    self.names[index]
                )))
            } else {
                Ok(index + 1)
            }
        })
    }

    /// Returns to the first state.
    pub fn reset(&self) {
        // the closure never fails
        let _ = self.transition(|_| Ok(0));
    }

    /// Blocks until the group is on `name`.
    ///
    /// Returns `false` on timeout or if `name` is not one of the states.
    pub fn wait_for_state(&self, name: &str, timeout: Duration) -> bool {
        let Some(target) = self.index_of(name) else {
            return false;
        };
        let guard = self.shared.lock();
        let (_guard, reached) = self
            .shared
            .wait_until(guard, timeout, |position| position.index == target);
        reached
    }
}
