//! Configuration management commands.

use mcpflow_core::Config;

use crate::{AppContext, ConfigAction};

pub fn handle(action: ConfigAction, ctx: &AppContext) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", render(&ctx.config)?);
        }
        ConfigAction::Validate => {
            let result = ctx.config.validate();
            for issue in result.warnings() {
                println!("warning: {}: {}", issue.field, issue.message);
            }
            for issue in result.errors() {
                println!("error: {}: {}", issue.field, issue.message);
            }
            if !result.is_ok() {
                return Err(mcpflow_core::Error::Validation(format!(
                    "configuration has {} error(s)",
                    result.errors().len()
                ))
                .into());
            }
            println!("Configuration is valid.");
        }
        ConfigAction::Path => {
            println!("{}", Config::config_dir().join("config.toml").display());
        }
    }
    Ok(())
}

/// Render the configuration as TOML with the API key masked.
fn render(config: &Config) -> anyhow::Result<String> {
    let mut shown = config.clone();
    if shown.model.api_key.is_some() {
        shown.model.api_key = Some("***".to_string());
    }
    for server in &mut shown.servers {
        if server.api_key.is_some() {
            server.api_key = Some("***".to_string());
        }
    }
    Ok(toml::to_string_pretty(&shown)?)
}
