use thiserror::Error;

/// Lifecycle of one supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Only observable while `start` is building the handle
    Created,
    Running,
    /// Terminal; carries the exit code when the OS reported one
    Exited { code: Option<i32> },
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(ProcessState, ProcessState),
}

pub struct StateMachine {
    pub state: ProcessState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self { state: ProcessState::Created }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_transition(&self, to: &ProcessState) -> bool {
        matches!(
            (&self.state, to),
            (ProcessState::Created, ProcessState::Running)
                | (ProcessState::Running, ProcessState::Exited { .. })
        )
    }

    pub fn transition(&mut self, to: ProcessState) -> Result<(), TransitionError> {
        if self.can_transition(&to) {
            tracing::debug!("Process state transition: {:?} -> {:?}", self.state, to);
            self.state = to;
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition(self.state, to))
        }
    }
}
