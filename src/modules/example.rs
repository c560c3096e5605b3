use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;

use super::{forge_builds, to_strings, MINECRAFT_VERSIONS, RELEASE_TYPES};
use crate::internal_module;
use crate::module::{Module, ModuleContext};
use crate::supervisor::line_sink::INSTALL_TARGET;
use crate::supervisor::ProcessHandle;

pub const EXAMPLE_ID: &str = "cube_server_tool::modules::example::Example";

/// Reference installer for module authors. Ships hidden.
#[derive(Debug, Default)]
pub struct Example;

internal_module!("example", Example, visible = false);

#[async_trait]
impl Module for Example {
    fn qualified_id(&self) -> &str {
        EXAMPLE_ID
    }

    fn name(&self) -> &str {
        "Example-Installer"
    }

    fn available_types(&self) -> Vec<String> {
        to_strings(RELEASE_TYPES)
    }

    fn available_versions(&self) -> Vec<String> {
        to_strings(MINECRAFT_VERSIONS)
    }

    fn available_sub_versions(&self, selected_version: Option<&str>) -> Vec<String> {
        forge_builds(selected_version)
    }

    fn start_file(&self) -> Option<&Regex> {
        None
    }

    async fn init(&self, _ctx: &ModuleContext) -> Result<()> {
        tracing::info!("Example Minecraft installer initialized.");
        Ok(())
    }

    async fn install(&self, ctx: &ModuleContext) -> Result<()> {
        tracing::info!(
            target: INSTALL_TARGET,
            "Installing example Minecraft version: {}, sub-version: {}",
            ctx.config.selected_version().unwrap_or("none"),
            ctx.config.selected_sub_version().unwrap_or("none")
        );
        Ok(())
    }

    async fn start(&self, _ctx: &ModuleContext) -> Result<Option<ProcessHandle>> {
        Ok(None)
    }
}
