//! Installer module contract
//!
//! A module describes how to install and start one server flavor. Bundled
//! modules register an `InternalModule` descriptor through `inventory`;
//! external ones arrive as plugin packages (see `package`).

pub mod error;
pub mod package;
pub mod registry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;

use crate::config::AppConfig;
use crate::supervisor::{ProcessHandle, ProcessSupervisor};
pub use error::{MergeStatus, PackageOutcome, SkipReason};
pub use registry::ModuleRegistry;

/// Reserved namespace every admitted module id must live under.
pub const MODULE_NAMESPACE: &str = "cube_server_tool::modules";

/// Manifest handshake version external packages must declare.
pub const MODULE_CONTRACT_VERSION: u32 = 1;

/// What a module gets to work with during its lifecycle hooks.
#[derive(Clone)]
pub struct ModuleContext {
    pub config: Arc<AppConfig>,
    pub supervisor: Arc<ProcessSupervisor>,
}

impl ModuleContext {
    pub fn new(config: Arc<AppConfig>, supervisor: Arc<ProcessSupervisor>) -> Self {
        Self { config, supervisor }
    }
}

#[async_trait]
pub trait Module: Send + Sync {
    /// Stable identity used for overrides, e.g. `cube_server_tool::modules::forge::Forge`
    fn qualified_id(&self) -> &str;

    /// Human readable installer name; not unique
    fn name(&self) -> &str;

    fn available_types(&self) -> Vec<String>;

    fn available_versions(&self) -> Vec<String>;

    /// Sub-versions for the given base version. Empty means none apply.
    fn available_sub_versions(&self, selected_version: Option<&str>) -> Vec<String>;

    /// Pattern identifying the runnable server file after install
    fn start_file(&self) -> Option<&Regex>;

    async fn init(&self, ctx: &ModuleContext) -> Result<()>;

    async fn install(&self, ctx: &ModuleContext) -> Result<()>;

    /// Launch the server. Returns the handle when a process was spawned.
    async fn start(&self, ctx: &ModuleContext) -> Result<Option<ProcessHandle>>;

    fn type_name(&self) -> &str {
        simple_type_name(self.qualified_id())
    }
}

impl std::fmt::Debug for dyn Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module").field("qualified_id", &self.qualified_id()).finish()
    }
}

/// Registration descriptor for a bundled module.
pub struct InternalModule {
    /// Sub-entry under the module namespace
    pub entry: &'static str,
    /// Type expected one level under `entry`
    pub type_name: &'static str,
    pub visible: bool,
    pub create: fn() -> Arc<dyn Module>,
}

inventory::collect!(InternalModule);

impl InternalModule {
    pub fn qualified_id(&self) -> String {
        format!("{}::{}::{}", MODULE_NAMESPACE, self.entry, self.type_name)
    }
}

/// Register a bundled module type (must implement `Default`).
#[macro_export]
macro_rules! internal_module {
    ($entry:expr, $module_type:ident, visible = $visible:expr) => {
        inventory::submit! {
            $crate::module::InternalModule {
                entry: $entry,
                type_name: stringify!($module_type),
                visible: $visible,
                create: || std::sync::Arc::new(<$module_type>::default()),
            }
        }
    };
}

/// Last path segment of a qualified id.
pub fn simple_type_name(qualified_id: &str) -> &str {
    qualified_id.rsplit("::").next().unwrap_or(qualified_id)
}

/// Whether `qualified_id` lies strictly inside the reserved namespace.
pub fn in_module_namespace(qualified_id: &str) -> bool {
    qualified_id
        .strip_prefix(MODULE_NAMESPACE)
        .and_then(|rest| rest.strip_prefix("::"))
        .is_some_and(|rest| !rest.is_empty())
}

/// Minimal capability checks every module must pass before admission.
pub fn validate_contract(module: &dyn Module) -> Result<(), SkipReason> {
    if module.name().trim().is_empty() {
        return Err(SkipReason::ContractMismatch("installer name is empty".into()));
    }
    if module.available_types().is_empty() {
        return Err(SkipReason::ContractMismatch("no release types offered".into()));
    }
    if module.available_versions().is_empty() {
        return Err(SkipReason::ContractMismatch("no versions offered".into()));
    }
    Ok(())
}

/// Name of the first file directly inside `dir` matching `pattern`, by name order.
///
/// The result is relative to `dir`, which is also the launched process's cwd.
pub fn find_start_file(dir: &Path, pattern: &Regex) -> std::io::Result<Option<PathBuf>> {
    let mut matches = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if pattern.is_match(&name.to_string_lossy()) {
            matches.push(PathBuf::from(name));
        }
    }
    matches.sort();
    Ok(matches.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_check() {
        assert!(in_module_namespace("cube_server_tool::modules::forge::Forge"));
        assert!(!in_module_namespace("cube_server_tool::modules"));
        assert!(!in_module_namespace("cube_server_tool::modules::"));
        assert!(!in_module_namespace("cube_server_tool::modules_evil::forge::Forge"));
        assert!(!in_module_namespace("evil::cube_server_tool::modules::forge::Forge"));
    }

    #[test]
    fn test_simple_type_name() {
        assert_eq!(simple_type_name("cube_server_tool::modules::forge::Forge"), "Forge");
        assert_eq!(simple_type_name("Forge"), "Forge");
    }

    #[test]
    fn test_find_start_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("eula.txt"), "eula=true").unwrap();
        std::fs::write(dir.path().join("forge-1.20.2-48.1.0.jar"), "").unwrap();
        std::fs::write(dir.path().join("forge-1.19.4-45.0.0.jar"), "").unwrap();
        std::fs::create_dir(dir.path().join("forge-dir.jar")).unwrap();

        let pattern = Regex::new(r"^forge-.*\.jar$").unwrap();
        let found = find_start_file(dir.path(), &pattern).unwrap().unwrap();
        assert_eq!(found, Path::new("forge-1.19.4-45.0.0.jar"));

        let none = Regex::new(r"^paper-.*\.jar$").unwrap();
        assert!(find_start_file(dir.path(), &none).unwrap().is_none());
    }
}
