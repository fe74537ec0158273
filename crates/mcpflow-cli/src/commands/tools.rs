//! Tools command: list the merged catalog.

use std::sync::Arc;

use mcpflow_core::ServerConfig;
use mcpflow_engine::EngineSettings;
use mcpflow_mcp::{HttpConnector, ToolRegistry};

use crate::AppContext;

pub async fn run(urls: &[String], json: bool, ctx: &AppContext) -> anyhow::Result<()> {
    let mut servers = ctx.config.servers.clone();
    servers.extend(urls.iter().map(ServerConfig::new));
    if servers.is_empty() {
        anyhow::bail!("No tool servers given. Pass --server URL or add [[servers]] to the config.");
    }

    let settings = EngineSettings::from(&ctx.config).session;
    let connector = HttpConnector::new(settings.protocol_version.clone(), settings.request_timeout);
    let mut registry = ToolRegistry::new(Arc::new(connector), settings);

    let report = registry.initialize_all(&servers).await;
    let catalog = registry.catalog().await;
    registry.close_all().await;

    if json {
        let tools: Vec<_> = catalog.iter().map(|t| t.to_function_tool()).collect();
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(());
    }

    for (url, reason) in &report.failed {
        eprintln!("unavailable: {} ({})", url, reason);
    }

    if catalog.is_empty() {
        println!("No tools available.");
        return Ok(());
    }

    println!("{} tools from {} servers:", catalog.len(), report.ready.len());
    for tool in &catalog {
        if tool.description.is_empty() {
            println!("  {}", tool.qualified_name);
        } else {
            println!("  {}  {}", tool.qualified_name, tool.description);
        }
    }

    Ok(())
}
