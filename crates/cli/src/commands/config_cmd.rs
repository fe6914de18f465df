//! `foreman config`: Configuration management commands.

use std::path::Path;

use foreman_config::AppConfig;

pub fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match super::read_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Provider:  {}", config.model.provider);
    println!("   Model:     {}", config.model.model_id);
    println!(
        "   Gateway:   {}",
        if config.gateway.is_configured() { config.gateway.url.as_str() } else { "(none)" }
    );
    println!("   Auth:      {}", config.gateway.auth_mode.as_str());
    println!("   Context:   {}", config.context.base_url);
    println!("   Server:    {}:{}", config.server.host, config.server.port);

    Ok(())
}

/// Non-fatal problems worth pointing out.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();

    if config.model.api_key.is_none() && config.model.provider != "ollama" {
        warnings.push("No API key set (set FOREMAN_API_KEY or OPENAI_API_KEY)");
    }
    if !config.gateway.is_configured() {
        warnings.push("No gateway URL; every invocation will use the fallback context");
    }
    if config.knowledge_base.id.is_none() {
        warnings.push("No knowledge base id; the retrieve tool is unusable");
    }
    if let Some(path) = &config.agent.system_prompt_file {
        if !path.exists() {
            warnings.push("agent.system_prompt_file does not exist");
        }
    }

    warnings
}

pub fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::read_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", config.to_toml());
    Ok(())
}

pub fn path(config_path: Option<&Path>) {
    println!("{}", super::config_file(config_path).display());
}
