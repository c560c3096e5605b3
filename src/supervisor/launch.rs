//! Launch configuration: the structured options a caller fills in and the
//! validated, immutable record the supervisor consumes.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::error::SupervisorError;
use super::line_sink::LoggingMode;
use crate::config::AppConfig;

/// Runtime flags whose value is glued to the flag itself (`-Xmx2G`).
const PREFIX_KEYED_FLAGS: &[&str] = &["-Xmx", "-Xms", "-Xss"];

/// How the child's standard streams are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Child shares the parent's stdin/stdout/stderr
    #[default]
    Inherit,
    /// stdin is a pipe only reachable through `ProcessHandle::send_line`
    DisableInput,
}

/// Per-launch options. Unset fields fall back to the application config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LaunchOptions {
    /// Server artifact passed after `-jar`
    pub executable: String,
    /// Overrides/extensions of the seeded runtime arguments
    pub runtime_args: Vec<String>,
    /// Arguments appended after the executable
    pub server_args: Vec<String>,
    /// Relative paths resolve against the root directory
    pub working_dir: Option<PathBuf>,
    pub stream_mode: StreamMode,
    /// Capture stdout/stderr and route them through the line sink
    pub output_capture: bool,
    pub logging_mode: LoggingMode,
}

/// Validated launch record. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessConfig {
    launcher: String,
    executable: String,
    runtime_args: Vec<String>,
    server_args: Vec<String>,
    working_dir: PathBuf,
    stream_mode: StreamMode,
    output_capture: bool,
    logging_mode: LoggingMode,
}

impl ProcessConfig {
    /// Seed runtime arguments from `config`, merge `options` on top and validate.
    pub fn new(options: LaunchOptions, config: &AppConfig) -> Result<Self, SupervisorError> {
        let launcher = config.runtime.launcher.trim().to_string();
        if launcher.is_empty() {
            return Err(SupervisorError::InvalidConfig("runtime launcher is empty".into()));
        }
        let executable = options.executable.trim().to_string();
        if executable.is_empty() {
            return Err(SupervisorError::InvalidConfig("executable path is empty".into()));
        }

        let working_dir = match options.working_dir {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => config.root_dir.join(dir),
            None => config.root_dir.clone(),
        };

        Ok(Self {
            launcher,
            executable,
            runtime_args: merge_runtime_args(&config.runtime.args, &options.runtime_args),
            server_args: options.server_args,
            working_dir,
            stream_mode: options.stream_mode,
            output_capture: options.output_capture,
            logging_mode: options.logging_mode,
        })
    }

    /// `[launcher] ++ runtime_args ++ ["-jar", executable] ++ server_args`
    pub fn command_line(&self) -> Vec<String> {
        let mut command = Vec::with_capacity(3 + self.runtime_args.len() + self.server_args.len());
        command.push(self.launcher.clone());
        command.extend(self.runtime_args.iter().cloned());
        command.push("-jar".to_string());
        command.push(self.executable.clone());
        command.extend(self.server_args.iter().cloned());
        command
    }

    pub fn launcher(&self) -> &str {
        &self.launcher
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn runtime_args(&self) -> &[String] {
        &self.runtime_args
    }

    pub fn server_args(&self) -> &[String] {
        &self.server_args
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn stream_mode(&self) -> StreamMode {
        self.stream_mode
    }

    pub fn output_capture(&self) -> bool {
        self.output_capture
    }

    pub fn logging_mode(&self) -> LoggingMode {
        self.logging_mode
    }
}

/// Identity of a runtime flag for override purposes.
fn runtime_arg_key(arg: &str) -> &str {
    if let Some(prefix) = PREFIX_KEYED_FLAGS.iter().find(|p| arg.starts_with(**p)) {
        return prefix;
    }
    arg.split_once('=').map(|(key, _)| key).unwrap_or(arg)
}

/// Later arguments replace earlier ones with the same key in place; new keys append.
pub fn merge_runtime_args(seed: &[String], overrides: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(seed.len() + overrides.len());
    for arg in seed.iter().chain(overrides) {
        let key = runtime_arg_key(arg);
        match merged.iter_mut().find(|existing| runtime_arg_key(existing) == key) {
            Some(existing) => *existing = arg.clone(),
            None => merged.push(arg.clone()),
        }
    }
    merged
}
