//! Frame loop state machine: Idle → Capturing → Rendering → Transmitting → Idle.
//! Cancelled is terminal and reachable from every other state.

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, warn};

/// All states of one frame loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameState {
    Idle,
    Capturing,
    Rendering,
    Transmitting,
    Cancelled,
}

impl std::fmt::Display for FrameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameState::Idle => write!(f, "Idle"),
            FrameState::Capturing => write!(f, "Capturing"),
            FrameState::Rendering => write!(f, "Rendering"),
            FrameState::Transmitting => write!(f, "Transmitting"),
            FrameState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FrameState {
    /// Returns whether transitioning from `self` to `next` is valid.
    pub fn can_transition_to(self, next: FrameState) -> bool {
        matches!(
            (self, next),
            (FrameState::Idle, FrameState::Capturing)
                | (FrameState::Idle, FrameState::Rendering) // audio disabled
                | (FrameState::Capturing, FrameState::Rendering)
                | (FrameState::Rendering, FrameState::Transmitting)
                | (FrameState::Transmitting, FrameState::Idle)
        ) || (next == FrameState::Cancelled && self != FrameState::Cancelled)
    }
}

/// State holder with a watch channel for observers.
pub struct StateMachine {
    state: RwLock<FrameState>,
    state_tx: watch::Sender<FrameState>,
    state_rx: watch::Receiver<FrameState>,
}

impl StateMachine {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(FrameState::Idle);
        Self {
            state: RwLock::new(FrameState::Idle),
            state_tx,
            state_rx,
        }
    }

    pub fn current(&self) -> FrameState {
        *self.state.read()
    }

    /// Attempt a state transition. Returns Ok(new_state) or Err with reason.
    pub fn transition(&self, next: FrameState) -> Result<FrameState, String> {
        let mut state = self.state.write();
        let current = *state;
        if !current.can_transition_to(next) {
            let msg = format!("invalid transition: {} -> {}", current, next);
            warn!("{}", msg);
            return Err(msg);
        }
        *state = next;
        let _ = self.state_tx.send(next);
        debug!(from = %current, to = %next, "state_transition");
        Ok(next)
    }

    /// Enter the terminal state from wherever the loop is.
    pub fn cancel(&self) {
        let mut state = self.state.write();
        let prev = *state;
        if prev == FrameState::Cancelled {
            return;
        }
        *state = FrameState::Cancelled;
        let _ = self.state_tx.send(FrameState::Cancelled);
        debug!(from = %prev, "cancelled");
    }

    pub fn subscribe(&self) -> watch::Receiver<FrameState> {
        self.state_rx.clone()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
