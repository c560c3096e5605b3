use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::package::{load_from_package, EXTRACT_DIR, PACKAGE_EXTENSION};
use super::{validate_contract, InternalModule, MergeStatus, Module, PackageOutcome, SkipReason};

/// The active module set: bundled modules plus admitted external packages.
///
/// Built once; read-only afterwards.
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn Module>>,
}

impl ModuleRegistry {
    /// Discover bundled modules, then merge plugin packages from `plugins_dir`.
    pub fn discover(plugins_dir: &Path) -> Self {
        let mut modules = discover_internal();
        tracing::info!("Loaded {} internal modules", modules.len());

        for (file, candidate) in discover_external(plugins_dir) {
            let status = merge_override(&mut modules, candidate);
            tracing::info!("Found external package: {} - {}", file, PackageOutcome::Merged(status));
        }

        tracing::info!("{} modules active", modules.len());
        for module in &modules {
            tracing::info!("  - {} ({})", module.name(), module.qualified_id());
        }
        Self { modules }
    }

    pub fn from_modules(modules: Vec<Arc<dyn Module>>) -> Self {
        Self { modules }
    }

    pub fn modules(&self) -> &[Arc<dyn Module>] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Look up by qualified id, or by installer name ignoring case.
    pub fn find(&self, key: &str) -> Option<Arc<dyn Module>> {
        self.modules
            .iter()
            .find(|m| m.qualified_id() == key)
            .or_else(|| self.modules.iter().find(|m| m.name().eq_ignore_ascii_case(key)))
            .cloned()
    }
}

/// Bundled modules from the registration table.
pub fn discover_internal() -> Vec<Arc<dyn Module>> {
    resolve_internal(inventory::iter::<InternalModule>())
}

/// Instantiate every registration that is visible and honours the contract.
pub fn resolve_internal<'a>(registrations: impl IntoIterator<Item = &'a InternalModule>) -> Vec<Arc<dyn Module>> {
    let mut modules = Vec::new();
    for registration in registrations {
        let id = registration.qualified_id();
        match admit_internal(registration) {
            Ok(module) => {
                tracing::info!("Loaded internal installer: {}", id);
                modules.push(module);
            }
            Err(reason) => tracing::info!("Skipped internal installer: {} ({})", id, reason),
        }
    }
    modules
}

fn admit_internal(registration: &InternalModule) -> Result<Arc<dyn Module>, SkipReason> {
    if !registration.visible {
        return Err(SkipReason::NotVisible);
    }
    let module = (registration.create)();
    let expected = registration.qualified_id();
    if module.qualified_id() != expected {
        return Err(SkipReason::ContractMismatch(format!(
            "no type '{}' under entry '{}' (instance reports '{}')",
            registration.type_name,
            registration.entry,
            module.qualified_id()
        )));
    }
    validate_contract(module.as_ref())?;
    Ok(module)
}

/// Load one package and apply the visibility gate; extracts it when admitted.
pub fn admit_external(archive: &Path, extract_root: &Path) -> Result<Arc<dyn Module>, SkipReason> {
    let descriptor = load_from_package(archive, extract_root)?;
    if !descriptor.visible {
        return Err(SkipReason::NotVisible);
    }
    descriptor.module.extract()?;
    Ok(Arc::new(descriptor.module))
}

/// Admitted plugin packages directly inside `dir`, paired with their file
/// names, in directory listing order. Never fails: problems are logged and
/// the affected package (or the whole directory) yields nothing.
pub fn discover_external(dir: &Path) -> Vec<(String, Arc<dyn Module>)> {
    tracing::info!("Scanning plugin directory: \"{}\" ...", dir.display());
    let mut found = Vec::new();

    if !dir.is_dir() {
        tracing::warn!("Plugin directory does not exist or is not a directory: \"{}\"", dir.display());
        return found;
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!("Error reading plugin directory \"{}\": {}", dir.display(), e);
            return found;
        }
    };

    let extract_root = dir.join(EXTRACT_DIR);
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Error reading entry in \"{}\": {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        let is_package = path.is_file()
            && path
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(PACKAGE_EXTENSION));
        if !is_package {
            continue;
        }

        let file = entry.file_name().to_string_lossy().into_owned();
        match admit_external(&path, &extract_root) {
            Ok(module) => found.push((file, module)),
            Err(reason) => {
                if let SkipReason::LoadError(_) = reason {
                    tracing::error!("Error loading module from package: {}", file);
                }
                tracing::info!("Found external package: {} - {}", file, PackageOutcome::Skipped(reason));
            }
        }
    }
    found
}

/// Replace the entry sharing `candidate`'s qualified id in place, or append.
pub fn merge_override(modules: &mut Vec<Arc<dyn Module>>, candidate: Arc<dyn Module>) -> MergeStatus {
    match modules.iter_mut().find(|m| m.qualified_id() == candidate.qualified_id()) {
        Some(slot) => {
            let replaced = slot.type_name().to_string();
            *slot = candidate;
            MergeStatus::Overwrite(replaced)
        }
        None => {
            modules.push(candidate);
            MergeStatus::Loaded
        }
    }
}
