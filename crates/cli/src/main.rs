use clap::{Parser, Subcommand};
use ironmaker_core::ConfigLoader;
use ironmaker_engine::Engine;
use ironmaker_web_api::ApiServer;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "ironmaker")]
#[command(about = "Market maker for the Blocky item exchange", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the market maker with the monitoring API
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Log every order instead of sending it
        #[arg(long)]
        dry_run: bool,
    },
    /// Load and validate the configuration, then exit
    CheckConfig {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, dry_run } => {
            run_market_maker(&config, dry_run).await?;
        }
        Commands::CheckConfig { config } => {
            check_config(&config)?;
        }
    }

    Ok(())
}

async fn run_market_maker(config_path: &str, dry_run: bool) -> anyhow::Result<()> {
    let mut config = ConfigLoader::load(config_path)?;
    if dry_run {
        config.trading.dry_run = true;
    }
    if config.trading.dry_run {
        tracing::warn!("dry-run mode, orders are logged and never sent");
    }

    let engine = Engine::connect(config).await?;
    let ctx = engine.context();

    let api_handle = if ctx.config.health.enabled {
        let server = ApiServer::new(ctx.clone());
        let addr = ctx.config.health.addr.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = server.serve(&addr).await {
                tracing::error!("monitoring API failed: {e:#}");
            }
        }))
    } else {
        None
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received Ctrl+C, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let result = engine.run(shutdown_rx).await;

    if let Some(handle) = api_handle {
        handle.abort();
    }

    result
}

fn check_config(config_path: &str) -> anyhow::Result<()> {
    let config = ConfigLoader::load(config_path)?;
    tracing::info!(
        endpoint = %config.api.endpoint,
        dry_run = config.trading.dry_run,
        base_prices = config.price_model.base_prices.len(),
        refresh_interval = config.trading.refresh_interval,
        "configuration is valid"
    );
    Ok(())
}
