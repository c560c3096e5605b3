//! Bundled installer modules. Every module here lives under the reserved
//! `cube_server_tool::modules` namespace and registers itself with
//! `internal_module!`.

pub mod example;
pub mod forge;

/// Base versions the bundled installers offer.
pub(crate) const MINECRAFT_VERSIONS: &[&str] = &["1.20.2", "1.19.4"];

pub(crate) const RELEASE_TYPES: &[&str] = &["Release", "Snapshot", "All"];

/// Forge builds available for a base version; none for anything else.
pub(crate) fn forge_builds(selected_version: Option<&str>) -> Vec<String> {
    match selected_version {
        Some("1.20.2") => vec!["36.1.0".to_string(), "36.1.1".to_string()],
        _ => Vec::new(),
    }
}

pub(crate) fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
