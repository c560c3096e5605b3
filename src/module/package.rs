//! Plugin packages: ZIP archives carrying a `module.toml` manifest.
//!
//! The manifest is the capability handshake. It names the entry point
//! (`main_class`), declares the contract version and everything the
//! `Module` trait exposes; lifecycle hooks run as subprocesses inside the
//! extracted package directory.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::process::Command;
use zip::ZipArchive;

use super::{
    find_start_file, in_module_namespace, validate_contract, Module, ModuleContext, SkipReason,
    MODULE_CONTRACT_VERSION,
};
use crate::supervisor::line_sink::{route_line, LoggingMode};
use crate::supervisor::managed_process::STDERR_PREFIX;
use crate::supervisor::{LaunchOptions, ProcessConfig, ProcessHandle};
use crate::utils::{apply_creation_flags, sanitize_dir_name};

/// File extension of plugin packages.
pub const PACKAGE_EXTENSION: &str = "zip";

/// Manifest file looked up inside a package.
pub const MANIFEST_FILE: &str = "module.toml";

/// Directory under the plugins dir that accepted packages are unpacked into.
pub const EXTRACT_DIR: &str = ".extracted";

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleManifest {
    pub module: ModuleSection,
    #[serde(default)]
    pub lifecycle: LifecycleSection,
    pub launch: Option<LaunchOptions>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleSection {
    /// Fully qualified entry point ("Main-Class")
    pub main_class: String,
    pub contract_version: u32,
    pub name: String,
    pub types: Vec<String>,
    pub versions: Vec<String>,
    #[serde(default)]
    pub sub_versions: BTreeMap<String, Vec<String>>,
    pub start_file: Option<String>,
    #[serde(default)]
    pub visible: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LifecycleSection {
    pub init: Option<Vec<String>>,
    pub install: Option<Vec<String>>,
}

/// A package that passed entry point, contract and namespace checks.
#[derive(Debug)]
pub struct PackageDescriptor {
    pub visible: bool,
    pub module: PackagedModule,
}

/// Module backed by an external plugin package.
#[derive(Debug)]
pub struct PackagedModule {
    archive: PathBuf,
    /// Where the archive is unpacked
    extract_dir: PathBuf,
    /// Directory holding the manifest once unpacked; hooks run here
    package_dir: PathBuf,
    manifest: ModuleManifest,
    start_file: Option<Regex>,
}

/// Open `archive`, read its manifest and validate it.
///
/// Visibility is reported, not enforced; the caller decides before extraction.
pub fn load_from_package(archive: &Path, extract_root: &Path) -> Result<PackageDescriptor, SkipReason> {
    let file = fs::File::open(archive).map_err(|e| SkipReason::LoadError(e.to_string()))?;
    let mut zip = ZipArchive::new(file).map_err(|e| SkipReason::LoadError(e.to_string()))?;

    let (manifest_path, content) = read_manifest_entry(&mut zip)?;
    let raw: toml::Value = toml::from_str(&content)
        .map_err(|e| SkipReason::LoadError(format!("invalid {}: {}", MANIFEST_FILE, e)))?;

    let has_entry_point = raw
        .get("module")
        .and_then(|m| m.get("main_class"))
        .and_then(|v| v.as_str())
        .is_some_and(|s| !s.trim().is_empty());
    if !has_entry_point {
        return Err(SkipReason::MissingEntryPoint);
    }

    let manifest: ModuleManifest = raw
        .try_into::<ModuleManifest>()
        .map_err(|e| SkipReason::ContractMismatch(e.to_string()))?;

    if manifest.module.contract_version != MODULE_CONTRACT_VERSION {
        return Err(SkipReason::ContractMismatch(format!(
            "contract version {} (expected {})",
            manifest.module.contract_version, MODULE_CONTRACT_VERSION
        )));
    }

    let start_file = manifest
        .module
        .start_file
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| SkipReason::ContractMismatch(format!("invalid start_file pattern: {}", e)))?;

    let extract_dir = extract_root.join(sanitize_dir_name(&manifest.module.main_class));
    let package_dir = match Path::new(&manifest_path).parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => extract_dir.join(parent),
        None => extract_dir.clone(),
    };

    let module = PackagedModule {
        archive: archive.to_path_buf(),
        extract_dir,
        package_dir,
        start_file,
        manifest,
    };
    validate_contract(&module)?;

    if !in_module_namespace(module.qualified_id()) {
        return Err(SkipReason::NamespaceViolation(module.qualified_id().to_string()));
    }

    Ok(PackageDescriptor {
        visible: module.manifest.module.visible,
        module,
    })
}

fn read_manifest_entry(zip: &mut ZipArchive<fs::File>) -> Result<(String, String), SkipReason> {
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| SkipReason::LoadError(e.to_string()))?;
        let name = entry.name().to_string();
        if !entry.is_dir() && (name == MANIFEST_FILE || name.ends_with(&format!("/{}", MANIFEST_FILE))) {
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .map_err(|e| SkipReason::LoadError(e.to_string()))?;
            return Ok((name, content));
        }
    }
    Err(SkipReason::MissingEntryPoint)
}

impl PackagedModule {
    pub fn package_dir(&self) -> &Path {
        &self.package_dir
    }

    /// Unpack the archive, replacing any earlier extraction.
    pub fn extract(&self) -> Result<(), SkipReason> {
        let unpack = || -> Result<()> {
            if self.extract_dir.exists() {
                fs::remove_dir_all(&self.extract_dir)?;
            }
            fs::create_dir_all(&self.extract_dir)?;
            let mut zip = ZipArchive::new(fs::File::open(&self.archive)?)?;
            zip.extract(&self.extract_dir)?;
            Ok(())
        };
        unpack().map_err(|e| SkipReason::LoadError(format!("extraction failed: {}", e)))
    }

    async fn run_hook(&self, hook: &str, command: &[String], mode: LoggingMode, ctx: &ModuleContext) -> Result<()> {
        let (program, args) = command
            .split_first()
            .with_context(|| format!("{} hook of '{}' is empty", hook, self.name()))?;

        tracing::info!("Running {} hook of '{}': {:?}", hook, self.name(), command);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.package_dir)
            .env("CST_ROOT_DIR", &ctx.config.root_dir)
            .env("CST_VERSION", ctx.config.selected_version().unwrap_or_default())
            .env("CST_SUB_VERSION", ctx.config.selected_sub_version().unwrap_or_default())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        apply_creation_flags(&mut cmd);

        let output = cmd
            .output()
            .await
            .with_context(|| format!("failed to run {} hook of '{}'", hook, self.name()))?;

        let sink = ctx.supervisor.sink();
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            route_line(sink.as_ref(), mode, line);
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            route_line(sink.as_ref(), mode, &format!("{}{}", STDERR_PREFIX, line));
        }

        if !output.status.success() {
            anyhow::bail!("{} hook of '{}' failed with {}", hook, self.name(), output.status);
        }
        Ok(())
    }
}

#[async_trait]
impl Module for PackagedModule {
    fn qualified_id(&self) -> &str {
        &self.manifest.module.main_class
    }

    fn name(&self) -> &str {
        &self.manifest.module.name
    }

    fn available_types(&self) -> Vec<String> {
        self.manifest.module.types.clone()
    }

    fn available_versions(&self) -> Vec<String> {
        self.manifest.module.versions.clone()
    }

    fn available_sub_versions(&self, selected_version: Option<&str>) -> Vec<String> {
        selected_version
            .and_then(|v| self.manifest.module.sub_versions.get(v))
            .cloned()
            .unwrap_or_default()
    }

    fn start_file(&self) -> Option<&Regex> {
        self.start_file.as_ref()
    }

    async fn init(&self, ctx: &ModuleContext) -> Result<()> {
        match &self.manifest.lifecycle.init {
            Some(command) => self.run_hook("init", command, LoggingMode::Info, ctx).await,
            None => Ok(()),
        }
    }

    async fn install(&self, ctx: &ModuleContext) -> Result<()> {
        let Some(command) = &self.manifest.lifecycle.install else {
            tracing::info!("'{}' declares no install hook", self.name());
            return Ok(());
        };
        fs::create_dir_all(&ctx.config.root_dir)
            .with_context(|| format!("failed to create {}", ctx.config.root_dir.display()))?;
        self.run_hook("install", command, LoggingMode::Install, ctx).await
    }

    async fn start(&self, ctx: &ModuleContext) -> Result<Option<ProcessHandle>> {
        let Some(mut options) = self.manifest.launch.clone() else {
            tracing::info!("'{}' declares no launch configuration", self.name());
            return Ok(None);
        };

        if options.executable.trim().is_empty() {
            let pattern = self
                .start_file
                .as_ref()
                .with_context(|| format!("'{}' has neither an executable nor a start_file pattern", self.name()))?;
            let search_dir = match &options.working_dir {
                Some(dir) => ctx.config.root_dir.join(dir),
                None => ctx.config.root_dir.clone(),
            };
            let found = find_start_file(&search_dir, pattern)?.with_context(|| {
                format!("no file matching '{}' in {}", pattern.as_str(), search_dir.display())
            })?;
            options.executable = found.to_string_lossy().into_owned();
        }

        let config = ProcessConfig::new(options, &ctx.config)?;
        let handle = ctx.supervisor.start(&config).await?;
        Ok(Some(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn write_package(dir: &Path, file_name: &str, entries: &[(&str, &str)]) -> PathBuf {
        let path = dir.join(file_name);
        let mut writer = zip::ZipWriter::new(fs::File::create(&path).unwrap());
        for (name, content) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    const FORGE_MANIFEST: &str = r#"
        [module]
        main_class = "cube_server_tool::modules::forge::Forge"
        contract_version = 1
        name = "Forge (community build)"
        types = ["Release"]
        versions = ["1.20.2"]
        start_file = "^forge-.*\\.jar$"
        visible = true

        [module.sub_versions]
        "1.20.2" = ["48.1.0"]
    "#;

    #[test]
    fn test_load_valid_package() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = write_package(dir.path(), "forge.zip", &[("module.toml", FORGE_MANIFEST)]);

        let descriptor = load_from_package(&pkg, &dir.path().join(EXTRACT_DIR)).unwrap();
        assert!(descriptor.visible);
        let module = descriptor.module;
        assert_eq!(module.qualified_id(), "cube_server_tool::modules::forge::Forge");
        assert_eq!(module.type_name(), "Forge");
        assert_eq!(module.available_sub_versions(Some("1.20.2")), vec!["48.1.0".to_string()]);
        assert!(module.available_sub_versions(Some("1.19.4")).is_empty());
        assert!(module.available_sub_versions(None).is_empty());
        assert!(module.start_file().unwrap().is_match("forge-1.20.2.jar"));
    }

    #[test]
    fn test_nested_manifest_sets_package_dir() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = write_package(dir.path(), "forge.zip", &[("forge/module.toml", FORGE_MANIFEST)]);
        let root = dir.path().join(EXTRACT_DIR);

        let module = load_from_package(&pkg, &root).unwrap().module;
        module.extract().unwrap();
        assert_eq!(
            module.package_dir(),
            root.join("cube_server_tool__modules__forge__Forge").join("forge")
        );
        assert!(module.package_dir().join(MANIFEST_FILE).is_file());
    }

    #[test]
    fn test_missing_manifest_is_missing_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = write_package(dir.path(), "empty.zip", &[("readme.txt", "hello")]);
        let err = load_from_package(&pkg, dir.path()).unwrap_err();
        assert_eq!(err, SkipReason::MissingEntryPoint);
    }

    #[test]
    fn test_missing_main_class_is_missing_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = FORGE_MANIFEST.replace("main_class = \"cube_server_tool::modules::forge::Forge\"", "");
        let pkg = write_package(dir.path(), "forge.zip", &[("module.toml", &manifest)]);
        let err = load_from_package(&pkg, dir.path()).unwrap_err();
        assert_eq!(err, SkipReason::MissingEntryPoint);
    }

    #[test]
    fn test_not_a_zip_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("broken.zip");
        fs::write(&pkg, "definitely not a zip").unwrap();
        let err = load_from_package(&pkg, dir.path()).unwrap_err();
        assert_eq!(err.code(), "LOAD_ERROR");
    }

    #[test]
    fn test_contract_mismatches() {
        let dir = tempfile::tempdir().unwrap();

        let no_versions = FORGE_MANIFEST.replace("versions = [\"1.20.2\"]", "");
        let pkg = write_package(dir.path(), "a.zip", &[("module.toml", &no_versions)]);
        assert_eq!(load_from_package(&pkg, dir.path()).unwrap_err().code(), "CONTRACT_MISMATCH");

        let wrong_version = FORGE_MANIFEST.replace("contract_version = 1", "contract_version = 7");
        let pkg = write_package(dir.path(), "b.zip", &[("module.toml", &wrong_version)]);
        assert_eq!(load_from_package(&pkg, dir.path()).unwrap_err().code(), "CONTRACT_MISMATCH");

        let bad_regex = FORGE_MANIFEST.replace("^forge-.*\\\\.jar$", "forge-(");
        let pkg = write_package(dir.path(), "c.zip", &[("module.toml", &bad_regex)]);
        assert_eq!(load_from_package(&pkg, dir.path()).unwrap_err().code(), "CONTRACT_MISMATCH");

        let empty_types = FORGE_MANIFEST.replace("types = [\"Release\"]", "types = []");
        let pkg = write_package(dir.path(), "d.zip", &[("module.toml", &empty_types)]);
        assert_eq!(load_from_package(&pkg, dir.path()).unwrap_err().code(), "CONTRACT_MISMATCH");
    }

    #[test]
    fn test_foreign_namespace_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = FORGE_MANIFEST.replace("cube_server_tool::modules::forge::Forge", "evil::Forge");
        let pkg = write_package(dir.path(), "evil.zip", &[("module.toml", &manifest)]);
        let err = load_from_package(&pkg, dir.path()).unwrap_err();
        assert_eq!(err, SkipReason::NamespaceViolation("evil::Forge".into()));
    }
}
