//! `foreman doctor`: Check configuration and every external collaborator.

use std::path::Path;
use std::sync::Arc;

use foreman_agent::{ContextClient, ContextSource};
use foreman_mcp::{GatewayStatus, ToolAcquirer};
use foreman_providers::load_model;
use foreman_tools::local_tools;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Foreman Doctor: System Diagnostics");
    println!("===================================\n");

    let mut issues = 0;

    let file = super::config_file(config_path);
    if file.exists() {
        println!("  ✅ Config file found at {}", file.display());
    } else {
        println!("  ⚠️  No config file at {}, using defaults", file.display());
    }

    let config = match super::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ {e}");
            println!("\n  ⚠️  Cannot continue without a valid configuration.");
            return Ok(());
        }
    };

    // Model
    if config.model.api_key.is_none() && config.model.provider != "ollama" {
        println!("  ⚠️  No API key: set FOREMAN_API_KEY or OPENAI_API_KEY");
        issues += 1;
    }
    let model = load_model(&config.model);
    match model.provider.health_check().await {
        Ok(true) => println!("  ✅ Model provider reachable ({})", config.model.provider),
        Ok(false) => {
            println!("  ❌ Model provider rejected the health check ({})", config.model.provider);
            issues += 1;
        }
        Err(e) => {
            println!("  ❌ Model provider unreachable: {e}");
            issues += 1;
        }
    }

    // Gateway
    let local = local_tools(&config.knowledge_base);
    let acquisition = ToolAcquirer::from_config(&config.gateway).acquire(&local).await;
    match &acquisition.status {
        GatewayStatus::Connected => println!(
            "  ✅ Gateway connected, {} tool(s) offered",
            acquisition.tools.len() - local.len()
        ),
        GatewayStatus::NotConfigured => {
            println!("  ⚠️  No gateway configured: set MCP_SERVER_URL for live plant data");
        }
        GatewayStatus::Unavailable { reason } => {
            println!("  ❌ Gateway unavailable: {reason}");
            issues += 1;
        }
    }

    // Fallback context
    let context: Arc<dyn ContextSource> = Arc::new(ContextClient::from_config(&config.context));
    match context.fetch().await {
        Ok(_) => println!("  ✅ Fallback context reachable at {}", config.context.base_url),
        Err(e) => {
            println!("  ❌ Fallback context unavailable: {e}");
            issues += 1;
        }
    }

    // Knowledge base
    if config.knowledge_base.id.is_some() {
        println!("  ✅ Knowledge base configured");
    } else {
        println!("  ⚠️  No knowledge base id: the retrieve tool will report it is not configured");
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
