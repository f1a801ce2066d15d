use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use nexiad::Config;
use nexiad::Engine;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(version, about = "Nexia thermostat sensor daemon")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "nexiad.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.targets())
        .init();

    tracing::info!("nexiad starting");
    tracing::info!("Loaded config from: {}", args.config.display());

    let mut engine = Engine::new();
    engine.register_integrations_from_config(&config);
    let engine = Arc::new(engine);

    let (api_shutdown_tx, api_shutdown_rx) = tokio::sync::oneshot::channel();
    let api_handle = config.api.as_ref().map(|api| {
        let listen = api.listen.clone();
        let port = api.port;
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = nexiad::api::serve(listen, port, engine, api_shutdown_rx).await {
                tracing::error!("HTTP API server failed: {}", e);
            }
        })
    });

    tracing::info!("Press Ctrl+C to exit");

    tokio::select! {
        res = engine.run() => {
            if let Err(e) = res {
                tracing::error!("Engine stopped with error: {}", e);
            }
        }
        res = tokio::signal::ctrl_c() => {
            match res {
                Ok(()) => tracing::info!("Received shutdown signal"),
                Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
            }
        }
    }

    if let Some(handle) = api_handle {
        let _ = api_shutdown_tx.send(());
        if let Err(e) = handle.await {
            tracing::error!("HTTP API task ended abnormally: {}", e);
        }
    }

    tracing::info!("Shutting down integrations...");
    engine.shutdown().await;

    tracing::info!("nexiad shutdown complete");

    Ok(())
}
