pub mod error;
pub mod launch;
pub mod line_sink;
pub mod managed_process;
pub mod state_machine;

use std::sync::Arc;

pub use error::SupervisorError;
pub use launch::{LaunchOptions, ProcessConfig, StreamMode};
pub use line_sink::{LineSink, LoggingMode, TracingSink};
pub use managed_process::ProcessHandle;
pub use state_machine::ProcessState;

/// Turns launch configurations into running, controllable processes.
///
/// Every process started here routes captured output through the same sink.
pub struct ProcessSupervisor {
    sink: Arc<dyn LineSink>,
}

impl ProcessSupervisor {
    pub fn new(sink: Arc<dyn LineSink>) -> Self {
        Self { sink }
    }

    /// Spawn the configured process. The handle is usable immediately.
    pub async fn start(&self, config: &ProcessConfig) -> Result<ProcessHandle, SupervisorError> {
        tracing::info!(
            "Starting '{}' with {} in {}",
            config.executable(),
            config.launcher(),
            config.working_dir().display()
        );
        ProcessHandle::spawn(config, self.sink.clone()).await
    }

    /// Sink captured lines are routed to.
    pub fn sink(&self) -> Arc<dyn LineSink> {
        self.sink.clone()
    }

    pub fn stop(&self, handle: &ProcessHandle) {
        handle.stop();
    }

    pub async fn send_line(&self, handle: &ProcessHandle, text: &str) {
        handle.send_line(text).await;
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}
