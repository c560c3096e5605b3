//! Destinations for captured server output.

use std::str::FromStr;

use serde::Deserialize;

/// Tracing target used for install progress lines.
pub const INSTALL_TARGET: &str = "install";

/// Routing selector applied to every captured output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum LoggingMode {
    /// Plain output stream
    #[default]
    Default,
    /// Install-progress sink
    Install,
    /// General log at info severity
    Info,
    /// Discard
    Void,
}

impl FromStr for LoggingMode {
    type Err = std::convert::Infallible;

    /// Case-insensitive; anything unrecognised falls back to `Default`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "install" => Self::Install,
            "info" => Self::Info,
            "void" => Self::Void,
            _ => Self::Default,
        })
    }
}

impl From<String> for LoggingMode {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl From<&str> for LoggingMode {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

/// Receives routed text lines. Implementations must tolerate concurrent
/// calls from the stdout and stderr readers.
pub trait LineSink: Send + Sync {
    fn install(&self, line: &str);
    fn info(&self, line: &str);
    fn plain(&self, line: &str);
}

/// Deliver `line` to `sink` according to `mode`.
pub fn route_line(sink: &dyn LineSink, mode: LoggingMode, line: &str) {
    match mode {
        LoggingMode::Install => sink.install(line),
        LoggingMode::Info => sink.info(line),
        LoggingMode::Void => {}
        LoggingMode::Default => sink.plain(line),
    }
}

/// Sink backed by `tracing` and stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LineSink for TracingSink {
    fn install(&self, line: &str) {
        tracing::info!(target: INSTALL_TARGET, "{}", line);
    }

    fn info(&self, line: &str) {
        tracing::info!("{}", line);
    }

    fn plain(&self, line: &str) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<(&'static str, String)>>,
    }

    impl LineSink for Recorder {
        fn install(&self, line: &str) {
            self.lines.lock().unwrap().push(("install", line.to_string()));
        }
        fn info(&self, line: &str) {
            self.lines.lock().unwrap().push(("info", line.to_string()));
        }
        fn plain(&self, line: &str) {
            self.lines.lock().unwrap().push(("plain", line.to_string()));
        }
    }

    #[test]
    fn test_logging_mode_is_case_insensitive() {
        assert_eq!(LoggingMode::from("INSTALL"), LoggingMode::Install);
        assert_eq!(LoggingMode::from("Info"), LoggingMode::Info);
        assert_eq!(LoggingMode::from("vOiD"), LoggingMode::Void);
        assert_eq!(LoggingMode::from("default"), LoggingMode::Default);
        assert_eq!(LoggingMode::from("verbose"), LoggingMode::Default);
        assert_eq!(LoggingMode::from(""), LoggingMode::Default);
    }

    #[test]
    fn test_route_line() {
        let sink = Recorder::default();
        route_line(&sink, LoggingMode::Install, "downloading");
        route_line(&sink, LoggingMode::Info, "Done (5.1s)!");
        route_line(&sink, LoggingMode::Void, "dropped");
        route_line(&sink, LoggingMode::Default, "raw");

        let lines = sink.lines.lock().unwrap();
        assert_eq!(
            *lines,
            vec![
                ("install", "downloading".to_string()),
                ("info", "Done (5.1s)!".to_string()),
                ("plain", "raw".to_string()),
            ]
        );
    }

    #[test]
    fn test_logging_mode_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: LoggingMode,
        }
        let w: Wrapper = toml::from_str(r#"mode = "Install""#).unwrap();
        assert_eq!(w.mode, LoggingMode::Install);
    }
}
