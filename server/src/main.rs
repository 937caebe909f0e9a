use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network;

/// Parses the configuration and serves until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();
    info!(
        "Starting live poll server (max {} connections, default timer {}s)",
        config.max_connections, config.default_timer
    );

    network::run(&config, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    })
    .await?;

    Ok(())
}
