use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/cube-server-tool.toml";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Settings shared by the module registry and the process supervisor.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// Directory servers are installed into and started from
    pub root_dir: PathBuf,
    /// Directory scanned for external plugin packages
    pub plugins_dir: PathBuf,
    pub selected_version: Option<String>,
    pub selected_sub_version: Option<String>,
    pub runtime: RuntimeConfig,
}

/// Hosting runtime used to launch server artifacts.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Launcher executable (e.g. `java`)
    pub launcher: String,
    /// Arguments every launch is seeded with before per-launch overrides
    pub args: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./server"),
            plugins_dir: PathBuf::from("./modules"),
            selected_version: None,
            selected_sub_version: None,
            runtime: RuntimeConfig::default(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            launcher: "java".to_string(),
            args: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load from `CST_CONFIG` or the default path, then apply env overrides.
    /// A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CST_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut cfg = Self::load_from(Path::new(&path))?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("CST_ROOT_DIR") {
            self.root_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("CST_PLUGINS_DIR") {
            self.plugins_dir = PathBuf::from(dir);
        }
        if let Ok(java) = std::env::var("CST_JAVA") {
            self.runtime.launcher = java;
        }
    }

    pub fn selected_version(&self) -> Option<&str> {
        self.selected_version.as_deref()
    }

    pub fn selected_sub_version(&self) -> Option<&str> {
        self.selected_sub_version.as_deref()
    }
}
