//! `foreman serve`: Start the HTTP invocation endpoint.

use foreman_config::AppConfig;

pub async fn run(
    mut config: AppConfig,
    port_override: Option<u16>,
    host_override: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port_override {
        config.server.port = port;
    }
    if let Some(host) = host_override {
        config.server.host = host;
    }

    let gateway = if config.gateway.is_configured() {
        format!("{} ({})", config.gateway.url, config.gateway.auth_mode.as_str())
    } else {
        "not configured".to_string()
    };

    println!("Foreman");
    println!("   Listening: {}:{}", config.server.host, config.server.port);
    println!("   Model:     {} via {}", config.model.model_id, config.model.provider);
    println!("   Gateway:   {gateway}");
    println!("   Context:   {}", config.context.base_url);

    foreman_server::start(config).await?;

    Ok(())
}
