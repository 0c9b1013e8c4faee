use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

/// Session lifecycle
///
/// `Idle → Running → Stopping → Stopped`, or `Idle → Stopped` when stopped
/// before the worker ever started. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Lifecycle state shared by the connection task, the worker task and the
/// blocking recognizer thread. Every transition is a compare-and-set.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<LifecycleState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Idle),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current(&self) -> LifecycleState {
        *self.lock()
    }

    /// Idle → Running. False if any other state.
    pub fn try_start(&self) -> bool {
        let mut state = self.lock();
        if *state != LifecycleState::Idle {
            return false;
        }
        *state = LifecycleState::Running;
        true
    }

    /// Begin stopping and return the state we came from.
    ///
    /// Idle goes straight to Stopped, Running goes to Stopping, anything
    /// else is left alone.
    pub fn begin_stop(&self) -> LifecycleState {
        let mut state = self.lock();
        let previous = *state;
        match previous {
            LifecycleState::Idle => *state = LifecycleState::Stopped,
            LifecycleState::Running => *state = LifecycleState::Stopping,
            LifecycleState::Stopping | LifecycleState::Stopped => {}
        }
        previous
    }

    /// Move to Stopped. Returns false if already there.
    pub fn finish(&self) -> bool {
        let mut state = self.lock();
        if *state == LifecycleState::Stopped {
            return false;
        }
        *state = LifecycleState::Stopped;
        true
    }

    pub fn is_running(&self) -> bool {
        self.current() == LifecycleState::Running
    }
}
