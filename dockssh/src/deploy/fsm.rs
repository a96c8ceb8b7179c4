//! Finite State Machine for a deployment's lifecycle

use serde::{Deserialize, Serialize};

/// Deployment state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    /// Nothing exists on the host
    Absent,

    /// Manifest installed, stack starting or initializing
    Provisioning,

    /// Routing fragment installed and proxy reloaded
    Routed,

    /// Launch endpoint confirmed
    Live,

    /// A step failed; see [`DeploymentFsm::reached`]
    Failed,
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// Remote directory and stack are being set up
    Provision,

    /// Public route installed
    Route,

    /// Launch endpoint answered
    Launch,

    /// A step failed
    Fail(String),

    /// Route removed and stack torn down
    Destroy,
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentState,
    reached: DeploymentState,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create a new FSM for a deployment that does not exist yet
    pub fn new() -> Self {
        Self::starting_at(DeploymentState::Absent)
    }

    /// Create an FSM for a deployment already in `state`
    pub fn starting_at(state: DeploymentState) -> Self {
        Self {
            state,
            reached: state,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> DeploymentState {
        self.state
    }

    /// Last non-failed state, i.e. how far the deployment got
    pub fn reached(&self) -> DeploymentState {
        self.reached
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether the public hostname routes to the deployment
    pub fn is_routed(&self) -> bool {
        matches!(self.reached, DeploymentState::Routed | DeploymentState::Live)
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (DeploymentState::Absent, DeploymentEvent::Provision) => DeploymentState::Provisioning,
            (DeploymentState::Provisioning, DeploymentEvent::Route) => DeploymentState::Routed,
            (DeploymentState::Routed, DeploymentEvent::Launch) => DeploymentState::Live,

            // Destroy is valid from anything that may have left traces behind
            (
                DeploymentState::Provisioning
                | DeploymentState::Routed
                | DeploymentState::Live
                | DeploymentState::Failed,
                DeploymentEvent::Destroy,
            ) => {
                self.error = None;
                DeploymentState::Absent
            }

            (state, DeploymentEvent::Fail(err)) if *state != DeploymentState::Failed => {
                self.error = Some(err.clone());
                DeploymentState::Failed
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        if new_state != DeploymentState::Failed {
            self.reached = new_state;
        }
        Ok(())
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsm_transitions() {
        let mut fsm = DeploymentFsm::new();
        assert_eq!(fsm.state(), DeploymentState::Absent);

        fsm.process(DeploymentEvent::Provision).unwrap();
        assert_eq!(fsm.state(), DeploymentState::Provisioning);

        fsm.process(DeploymentEvent::Route).unwrap();
        assert_eq!(fsm.state(), DeploymentState::Routed);

        fsm.process(DeploymentEvent::Launch).unwrap();
        assert_eq!(fsm.state(), DeploymentState::Live);

        fsm.process(DeploymentEvent::Destroy).unwrap();
        assert_eq!(fsm.state(), DeploymentState::Absent);
    }

    #[test]
    fn test_fsm_error_handling() {
        let mut fsm = DeploymentFsm::new();

        fsm.process(DeploymentEvent::Provision).unwrap();
        fsm.process(DeploymentEvent::Route).unwrap();
        fsm.process(DeploymentEvent::Fail("test error".to_string()))
            .unwrap();

        assert_eq!(fsm.state(), DeploymentState::Failed);
        assert_eq!(fsm.reached(), DeploymentState::Routed);
        assert!(fsm.is_routed());
        assert_eq!(fsm.error(), Some("test error"));
    }
}
