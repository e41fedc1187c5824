use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SidecarState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
}

impl SidecarState {
    /// `start` is only accepted from these states.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Stopped | Self::Crashed)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(SidecarState, SidecarState),
}

pub struct StateMachine {
    pub state: SidecarState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self { state: SidecarState::Stopped }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_transition(&self, to: &SidecarState) -> bool {
        use SidecarState::*;
        matches!(
            (&self.state, to),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Crashed)
                | (Running, Stopping)
                | (Running, Crashed)
                | (Stopping, Stopped)
                | (Crashed, Starting)
        )
    }

    pub fn transition(&mut self, to: SidecarState) -> Result<(), TransitionError> {
        if self.can_transition(&to) {
            tracing::info!("Sidecar state: {:?} -> {:?}", self.state, to);
            self.state = to;
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition(self.state, to))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SidecarState::*;

    #[test]
    fn valid_transitions() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.state, Stopped);
        assert!(sm.transition(Starting).is_ok());
        assert!(sm.transition(Running).is_ok());
        assert!(sm.transition(Stopping).is_ok());
        assert!(sm.transition(Stopped).is_ok());
    }

    #[test]
    fn crash_and_restart() {
        let mut sm = StateMachine::new();
        sm.transition(Starting).unwrap();
        sm.transition(Crashed).unwrap();
        sm.transition(Starting).unwrap();
        sm.transition(Running).unwrap();
        sm.transition(Crashed).unwrap();
        assert_eq!(sm.state, Crashed);
    }

    #[test]
    fn invalid_transition() {
        let mut sm = StateMachine::new();
        // cannot go directly from Stopped -> Running
        let res = sm.transition(Running);
        assert_eq!(res, Err(TransitionError::InvalidTransition(Stopped, Running)));
        assert_eq!(sm.state, Stopped);
    }

    #[test]
    fn no_duplicate_start_edges() {
        let mut sm = StateMachine::new();
        sm.transition(Starting).unwrap();
        assert!(sm.transition(Starting).is_err());
        sm.transition(Running).unwrap();
        assert!(sm.transition(Starting).is_err());
        assert!(sm.transition(Running).is_err());
    }

    #[test]
    fn stopping_only_ends_in_stopped() {
        let mut sm = StateMachine::new();
        sm.transition(Starting).unwrap();
        sm.transition(Running).unwrap();
        sm.transition(Stopping).unwrap();
        assert!(sm.transition(Crashed).is_err());
        assert!(sm.transition(Stopping).is_err());
        assert!(sm.transition(Stopped).is_ok());
    }

    #[test]
    fn start_guards() {
        assert!(Stopped.can_start());
        assert!(Crashed.can_start());
        assert!(!Starting.can_start());
        assert!(!Running.can_start());
        assert!(!Stopping.can_start());
    }
}
