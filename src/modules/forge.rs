use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;

use super::{forge_builds, to_strings, MINECRAFT_VERSIONS, RELEASE_TYPES};
use crate::internal_module;
use crate::module::{find_start_file, Module, ModuleContext};
use crate::supervisor::line_sink::INSTALL_TARGET;
use crate::supervisor::{LaunchOptions, LoggingMode, ProcessConfig, ProcessHandle, StreamMode};

pub const FORGE_ID: &str = "cube_server_tool::modules::forge::Forge";

const START_FILE_PATTERN: &str = r"^forge-.*\.jar$";

/// Minecraft Forge server installer.
#[derive(Debug)]
pub struct Forge {
    start_file: Option<Regex>,
}

impl Default for Forge {
    fn default() -> Self {
        Self {
            start_file: Regex::new(START_FILE_PATTERN).ok(),
        }
    }
}

internal_module!("forge", Forge, visible = true);

#[async_trait]
impl Module for Forge {
    fn qualified_id(&self) -> &str {
        FORGE_ID
    }

    fn name(&self) -> &str {
        "Minecraft-FORGE"
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
        self.start_file.as_ref()
    }

    async fn init(&self, _ctx: &ModuleContext) -> Result<()> {
        tracing::info!("Forge Minecraft installer initialized.");
        Ok(())
    }

    async fn install(&self, ctx: &ModuleContext) -> Result<()> {
        let version = ctx
            .config
            .selected_version()
            .context("no Minecraft version selected")?;
        let build = ctx.config.selected_sub_version().unwrap_or("latest");
        std::fs::create_dir_all(&ctx.config.root_dir)
            .with_context(|| format!("failed to create {}", ctx.config.root_dir.display()))?;
        tracing::info!(
            target: INSTALL_TARGET,
            "Installing Forge Minecraft version: {}, Forge version: {} into {}",
            version,
            build,
            ctx.config.root_dir.display()
        );
        Ok(())
    }

    async fn start(&self, ctx: &ModuleContext) -> Result<Option<ProcessHandle>> {
        let pattern = self.start_file.as_ref().context("Forge start file pattern unavailable")?;
        let jar = find_start_file(&ctx.config.root_dir, pattern)
            .with_context(|| format!("failed to scan {}", ctx.config.root_dir.display()))?
            .with_context(|| {
                format!("no server jar matching '{}' in {}", pattern.as_str(), ctx.config.root_dir.display())
            })?;

        // jar is relative to root_dir, which is also the working directory
        let options = LaunchOptions {
            executable: jar.to_string_lossy().into_owned(),
            server_args: vec!["nogui".to_string()],
            stream_mode: StreamMode::DisableInput,
            output_capture: true,
            logging_mode: LoggingMode::Info,
            ..Default::default()
        };
        let config = ProcessConfig::new(options, &ctx.config)?;
        let handle = ctx.supervisor.start(&config).await?;
        Ok(Some(handle))
    }
}
