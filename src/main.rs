use std::sync::Arc;

use anyhow::Context;
use cube_server_tool::config::AppConfig;
use cube_server_tool::module::{ModuleContext, ModuleRegistry};
use cube_server_tool::supervisor::ProcessSupervisor;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: cube-server-tool [list [--json] | install <module> | start <module>]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("Cube server tool starting");

    let config = Arc::new(AppConfig::load()?);
    let registry = ModuleRegistry::discover(&config.plugins_dir);
    let ctx = ModuleContext::new(config.clone(), Arc::new(ProcessSupervisor::default()));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        [] | ["list"] => {
            for module in registry.modules() {
                println!("{:<24} {}", module.name(), module.qualified_id());
            }
        }
        ["list", "--json"] => {
            let listing: Vec<_> = registry
                .modules()
                .iter()
                .map(|m| {
                    serde_json::json!({
                        "id": m.qualified_id(),
                        "name": m.name(),
                        "types": m.available_types(),
                        "versions": m.available_versions(),
                        "sub_versions": m.available_sub_versions(config.selected_version()),
                        "start_file": m.start_file().map(|r| r.as_str()),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        ["install", name] => {
            let module = registry.find(name).with_context(|| format!("Module '{}' not found", name))?;
            module.init(&ctx).await?;
            module.install(&ctx).await?;
            tracing::info!("Install of '{}' finished", module.name());
        }
        ["start", name] => {
            let module = registry.find(name).with_context(|| format!("Module '{}' not found", name))?;
            module.init(&ctx).await?;
            match module.start(&ctx).await? {
                Some(handle) => {
                    tracing::info!("'{}' running as PID {}, waiting for exit", module.name(), handle.pid());
                    let code = handle.wait().await;
                    tracing::info!("Server exited with code {:?}", code);
                }
                None => tracing::info!("'{}' did not launch a process", module.name()),
            }
        }
        _ => anyhow::bail!(USAGE),
    }

    Ok(())
}
