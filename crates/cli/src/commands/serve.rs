//! `ragline serve`: Start the HTTP gateway.

use ragline_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Ragline Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.llm.model);
    println!("   Index:     {}", config.retrieval.index_path.display());

    ragline_gateway::start(config).await?;

    Ok(())
}
