//! Run state machine shared by worker units and the worker manager.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Lifecycle state of a unit or manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Loop is live and accepting work.
    Running,
    /// Created or stopped; can be started again.
    Paused,
    /// Torn down. Terminal.
    Destroyed,
}

impl RunState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Paused => 1,
            Self::Destroyed => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::Paused,
            _ => Self::Destroyed,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Destroyed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Destroyed => "destroyed",
        };
        write!(f, "{s}")
    }
}

/// Atomic holder for a [`RunState`].
///
/// Every transition goes through a compare-and-swap, and nothing ever leaves
/// [`RunState::Destroyed`].
#[derive(Debug)]
pub struct StateManager {
    state: AtomicU8,
}

impl StateManager {
    /// Create a manager starting in `initial`.
    pub fn new(initial: RunState) -> Self {
        Self {
            state: AtomicU8::new(initial.as_u8()),
        }
    }

    /// Check whether the current state equals `state`.
    pub fn is(&self, state: RunState) -> bool {
        self.get() == state
    }

    pub fn is_destroyed(&self) -> bool {
        self.is(RunState::Destroyed)
    }

    /// Read the current state.
    pub fn get(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Unconditionally move to `state`, unless already destroyed.
    pub fn change(&self, state: RunState) {
        let target = state.as_u8();
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if RunState::from_u8(current).is_terminal() {
                    None
                } else {
                    Some(target)
                }
            });
    }

    /// Atomically move from `old` to `new`. Returns false on mismatch.
    pub fn compare_and_change(&self, old: RunState, new: RunState) -> bool {
        if old.is_terminal() && new != old {
            return false;
        }
        self.state
            .compare_exchange(old.as_u8(), new.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new(RunState::Paused)
    }
}
