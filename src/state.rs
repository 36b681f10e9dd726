//! State machine for the scene switch coordinator
//!
//! Defines the phases a trigger goes through:
//! Idle → DelayScheduled → Committing → Cooling → Idle
//!
//! [`SwitchState`] is the bookkeeping the coordinator keeps behind its mutex;
//! [`SwitchPhase`] is the coarse view published to observers.

use std::time::Duration;
use tokio::time::Instant;

/// A trigger that was accepted and waits for its delay to elapse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSwitch {
    /// Identifies the delay timer that owns this entry
    pub id: u64,
    /// Command that resolved to the scene
    pub command: String,
    /// Scene to switch to
    pub scene: String,
    /// Spoken content that produced the command
    pub content: String,
}

/// Coordinator bookkeeping, guarded by a single mutex
#[derive(Debug, Default)]
pub struct SwitchState {
    /// Set on a completed switch, cleared when the revert fires
    pub cooldown_until: Option<Instant>,
    /// Accepted trigger waiting for its delay timer
    pub pending: Option<PendingSwitch>,
    /// True while a commit is talking to the transport
    pub committing: bool,
    /// Scene most recently set through the transport
    pub active_scene: Option<String>,
    next_id: u64,
}

impl SwitchState {
    /// Create an idle state
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for a new timer
    pub fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Remaining cooldown at `now`, if the cooldown is still running
    pub fn remaining_cooldown(&self, now: Instant) -> Option<Duration> {
        self.cooldown_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Check if a cooldown is running at `now`
    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.remaining_cooldown(now).is_some()
    }

    /// Take the pending entry if it still belongs to timer `id`
    pub fn take_pending(&mut self, id: u64) -> Option<PendingSwitch> {
        match self.pending {
            Some(ref pending) if pending.id == id => self.pending.take(),
            _ => None,
        }
    }

    /// Derive the observable phase at `now`
    pub fn phase(&self, now: Instant) -> SwitchPhase {
        if self.committing {
            SwitchPhase::Committing
        } else if self.pending.is_some() {
            SwitchPhase::DelayScheduled
        } else if self.in_cooldown(now) {
            SwitchPhase::Cooling
        } else {
            SwitchPhase::Idle
        }
    }
}

/// Observable coordinator phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwitchPhase {
    /// Ready to accept a trigger
    #[default]
    Idle,

    /// A trigger was accepted and waits for its delay
    DelayScheduled,

    /// The scene change is being sent to OBS
    Committing,

    /// A switched-to scene is on hold until the revert
    Cooling,
}

impl SwitchPhase {
    /// Name written to the state file
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchPhase::Idle => "idle",
            SwitchPhase::DelayScheduled => "pending",
            SwitchPhase::Committing => "switching",
            SwitchPhase::Cooling => "holding",
        }
    }

    /// Parse a state file value
    pub fn from_state_str(s: &str) -> Option<Self> {
        match s.trim() {
            "idle" => Some(SwitchPhase::Idle),
            "pending" => Some(SwitchPhase::DelayScheduled),
            "switching" => Some(SwitchPhase::Committing),
            "holding" => Some(SwitchPhase::Cooling),
            _ => None,
        }
    }
}

impl std::fmt::Display for SwitchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchPhase::Idle => write!(f, "Idle"),
            SwitchPhase::DelayScheduled => write!(f, "Switch pending"),
            SwitchPhase::Committing => write!(f, "Switching"),
            SwitchPhase::Cooling => write!(f, "Holding scene"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(id: u64) -> PendingSwitch {
        PendingSwitch {
            id,
            command: "8".to_string(),
            scene: "Cam8".to_string(),
            content: "看8".to_string(),
        }
    }

    #[test]
    fn test_new_state_is_idle() {
        let state = SwitchState::new();
        assert_eq!(state.phase(Instant::now()), SwitchPhase::Idle);
        assert!(!state.in_cooldown(Instant::now()));
    }

    #[test]
    fn test_cooldown_window() {
        let now = Instant::now();
        let mut state = SwitchState::new();
        state.cooldown_until = Some(now + Duration::from_secs(120));

        assert!(state.in_cooldown(now));
        assert_eq!(state.remaining_cooldown(now), Some(Duration::from_secs(120)));
        assert_eq!(state.phase(now), SwitchPhase::Cooling);

        // Expired cooldown is not meaningful
        let later = now + Duration::from_secs(120);
        assert!(!state.in_cooldown(later));
        assert_eq!(state.remaining_cooldown(later), None);
        assert_eq!(state.phase(later), SwitchPhase::Idle);
    }

    #[test]
    fn test_take_pending_checks_owner() {
        let mut state = SwitchState::new();
        state.pending = Some(pending(3));

        assert_eq!(state.take_pending(2), None);
        assert!(state.pending.is_some());
        assert_eq!(state.take_pending(3), Some(pending(3)));
        assert!(state.pending.is_none());
    }

    #[test]
    fn test_next_id_is_unique() {
        let mut state = SwitchState::new();
        let a = state.next_id();
        let b = state.next_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_phase_priority() {
        let now = Instant::now();
        let mut state = SwitchState::new();
        state.pending = Some(pending(1));
        assert_eq!(state.phase(now), SwitchPhase::DelayScheduled);

        state.committing = true;
        assert_eq!(state.phase(now), SwitchPhase::Committing);
    }

    #[test]
    fn test_phase_state_strings() {
        for phase in [
            SwitchPhase::Idle,
            SwitchPhase::DelayScheduled,
            SwitchPhase::Committing,
            SwitchPhase::Cooling,
        ] {
            assert_eq!(SwitchPhase::from_state_str(phase.as_str()), Some(phase));
        }
        assert_eq!(SwitchPhase::from_state_str("holding\n"), Some(SwitchPhase::Cooling));
        assert_eq!(SwitchPhase::from_state_str("recording"), None);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(format!("{}", SwitchPhase::Idle), "Idle");
        assert_eq!(format!("{}", SwitchPhase::Cooling), "Holding scene");
    }
}
