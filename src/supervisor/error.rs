//! Process supervisor error types.

/// Failures surfaced to the caller of `ProcessSupervisor::start`.
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid launch configuration: {0}")]
    InvalidConfig(String),
}

impl SupervisorError {
    /// Machine readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Launch { .. } => "LAUNCH_FAILED",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}
