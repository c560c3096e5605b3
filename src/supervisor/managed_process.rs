//! Managed Process - a spawned server with controllable stdio
//!
//! Each handle owns three kinds of background tasks:
//! - a waiter that reaps the child and publishes the exit through a watch channel
//! - an optional stdin writer fed by `send_line()`
//! - optional stdout/stderr readers that route every line through a `LineSink`

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command as TokioCommand};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use super::error::SupervisorError;
use super::launch::{ProcessConfig, StreamMode};
use super::line_sink::{route_line, LineSink, LoggingMode};
use super::state_machine::{ProcessState, StateMachine};

/// Prefix applied to captured stderr lines before routing.
pub const STDERR_PREFIX: &str = "[ERROR] ";

const STDIN_QUEUE: usize = 256;

/// Live reference to one spawned server process.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    /// `None` when stdin is inherited from the parent
    stdin_tx: Option<mpsc::Sender<String>>,
    stop_tx: mpsc::Sender<()>,
    state_rx: watch::Receiver<ProcessState>,
    capture_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ProcessHandle {
    /// Spawn the process described by `config`. Must run inside a tokio runtime.
    pub async fn spawn(config: &ProcessConfig, sink: Arc<dyn LineSink>) -> Result<Self, SupervisorError> {
        let command_line = config.command_line();
        let (program, args) = command_line
            .split_first()
            .ok_or_else(|| SupervisorError::InvalidConfig("empty command line".into()))?;

        let mut cmd = TokioCommand::new(program);
        cmd.args(args).current_dir(config.working_dir()).kill_on_drop(false);

        match config.stream_mode() {
            StreamMode::Inherit => cmd.stdin(Stdio::inherit()),
            StreamMode::DisableInput => cmd.stdin(Stdio::piped()),
        };
        if config.output_capture() {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            // Nothing is shown on a console when output is routed elsewhere
            crate::utils::apply_creation_flags(&mut cmd);
        } else {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        tracing::debug!("Launching {:?} in {}", command_line, config.working_dir().display());

        let mut machine = StateMachine::new();
        let mut child = cmd.spawn().map_err(|source| SupervisorError::Launch {
            program: program.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or(0);
        if let Err(e) = machine.transition(ProcessState::Running) {
            tracing::warn!("{}", e);
        }
        tracing::info!("Process started with PID {}", pid);

        let (state_tx, state_rx) = watch::channel(machine.state);
        let (stop_tx, stop_rx) = mpsc::channel::<()>(1);

        // ── output readers ───────────────────────────────────
        let mut capture_tasks = Vec::new();
        if config.output_capture() {
            let mode = config.logging_mode();
            if let Some(stdout) = child.stdout.take() {
                capture_tasks.push(spawn_reader(BufReader::new(stdout), "stdout", "", mode, sink.clone()));
            }
            if let Some(stderr) = child.stderr.take() {
                capture_tasks.push(spawn_reader(BufReader::new(stderr), "stderr", STDERR_PREFIX, mode, sink));
            }
        }

        // ── stdin writer ─────────────────────────────────────
        let stdin_tx = child.stdin.take().map(|mut stdin| {
            let (tx, mut rx) = mpsc::channel::<String>(STDIN_QUEUE);
            tokio::spawn(async move {
                while let Some(line) = rx.recv().await {
                    let data = format!("{}\n", line);
                    if let Err(e) = stdin.write_all(data.as_bytes()).await {
                        tracing::warn!("Failed to write to process {} stdin: {}", pid, e);
                        break;
                    }
                    if let Err(e) = stdin.flush().await {
                        tracing::warn!("Failed to flush process {} stdin: {}", pid, e);
                        break;
                    }
                }
            });
            tx
        });

        // ── process waiter ───────────────────────────────────
        tokio::spawn(wait_for_child(child, pid, machine, stop_rx, state_tx));

        Ok(Self {
            pid,
            stdin_tx,
            stop_tx,
            state_rx,
            capture_tasks: Mutex::new(capture_tasks),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        *self.state_rx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProcessState::Running
    }

    /// Request termination without waiting for the exit. No-op once exited.
    pub fn stop(&self) {
        if !self.is_running() {
            tracing::debug!("Process {} already exited, nothing to stop", self.pid);
            return;
        }
        tracing::info!("Stopping process {}", self.pid);
        // A full queue means a stop request is already pending; a closed one
        // means the waiter has reaped the child in the meantime.
        let _ = self.stop_tx.try_send(());
    }

    /// Write `text` plus a newline to the process's stdin. Silently ignored
    /// when the process has exited or stdin is not piped.
    pub async fn send_line(&self, text: &str) {
        if !self.is_running() {
            tracing::debug!("Process {} exited, dropping input line", self.pid);
            return;
        }
        let Some(tx) = &self.stdin_tx else {
            tracing::debug!("Process {} reads the parent's stdin, dropping input line", self.pid);
            return;
        };
        if tx.send(text.to_string()).await.is_err() {
            tracing::debug!("Process {} stdin is closed", self.pid);
        }
    }

    /// Wait for the process to exit and for captured output to be drained.
    /// Returns the exit code if the OS reported one.
    pub async fn wait(&self) -> Option<i32> {
        let mut rx = self.state_rx.clone();
        let exited = rx
            .wait_for(|s| matches!(s, ProcessState::Exited { .. }))
            .await
            .map(|state| *state);
        let state = match exited {
            Ok(state) => state,
            Err(_) => *rx.borrow(),
        };

        let tasks = std::mem::take(&mut *self.capture_tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!("Output reader for process {} failed: {}", self.pid, e);
            }
        }

        match state {
            ProcessState::Exited { code } => code,
            _ => None,
        }
    }
}

fn spawn_reader<R>(
    mut reader: R,
    stream: &'static str,
    prefix: &'static str,
    mode: LoggingMode,
    sink: Arc<dyn LineSink>,
) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    let line = text.trim_end_matches(['\n', '\r']);
                    route_line(sink.as_ref(), mode, &format!("{}{}", prefix, line));
                }
                Err(e) => {
                    tracing::warn!("Failed to read process {}: {}", stream, e);
                    break;
                }
            }
        }
    })
}

async fn wait_for_child(
    mut child: Child,
    pid: u32,
    mut machine: StateMachine,
    mut stop_rx: mpsc::Receiver<()>,
    state_tx: watch::Sender<ProcessState>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        Some(()) = stop_rx.recv() => {
            terminate(&mut child);
            let status = child.wait().await;
            tracing::info!("Process {} stopped.", pid);
            status
        }
    };

    let code = match status {
        Ok(status) => {
            tracing::info!("Process {} exited with {}", pid, status);
            status.code()
        }
        Err(e) => {
            tracing::warn!("Failed to wait for process {}: {}", pid, e);
            None
        }
    };

    if let Err(e) = machine.transition(ProcessState::Exited { code }) {
        tracing::warn!("{}", e);
    }
    let _ = state_tx.send(machine.state);
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        tracing::warn!("Failed to signal process {}: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::warn!("Failed to kill process {:?}: {}", child.id(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        lines: StdMutex<Vec<String>>,
    }

    impl LineSink for Recorder {
        fn install(&self, line: &str) {
            self.lines.lock().unwrap().push(format!("install:{}", line));
        }
        fn info(&self, line: &str) {
            self.lines.lock().unwrap().push(format!("info:{}", line));
        }
        fn plain(&self, line: &str) {
            self.lines.lock().unwrap().push(format!("plain:{}", line));
        }
    }

    #[tokio::test]
    async fn test_reader_routes_lines_until_eof() {
        let recorder = Arc::new(Recorder::default());
        let input: &[u8] = b"first\r\nsecond\nno newline";
        spawn_reader(input, "stdout", "", LoggingMode::Install, recorder.clone())
            .await
            .unwrap();

        let lines = recorder.lines.lock().unwrap();
        assert_eq!(*lines, vec!["install:first", "install:second", "install:no newline"]);
    }

    #[tokio::test]
    async fn test_reader_prefixes_stderr() {
        let recorder = Arc::new(Recorder::default());
        let input: &[u8] = b"boom\n";
        spawn_reader(input, "stderr", STDERR_PREFIX, LoggingMode::Info, recorder.clone())
            .await
            .unwrap();

        assert_eq!(*recorder.lines.lock().unwrap(), vec!["info:[ERROR] boom"]);
    }

    #[tokio::test]
    async fn test_reader_tolerates_invalid_utf8() {
        let recorder = Arc::new(Recorder::default());
        let input: &[u8] = b"caf\xe9\n";
        spawn_reader(input, "stdout", "", LoggingMode::Default, recorder.clone())
            .await
            .unwrap();

        assert_eq!(*recorder.lines.lock().unwrap(), vec!["plain:caf\u{fffd}"]);
    }
}
