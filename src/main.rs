#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use gamedock_server::config;
use gamedock_server::logging;
use gamedock_server::server::PlatformServer;
use std::net::{IpAddr, SocketAddr};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// GameDock -- game distribution and matchmaking platform server
#[derive(Parser, Debug)]
#[command(name = "gamedock-server")]
#[command(about = "A multi-tenant game distribution and matchmaking platform server")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines and pre-deployment checks.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    /// Useful for debugging configuration loading from multiple sources.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration from config.json / env if present, else defaults.
    let cfg = config::load();

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = cfg.validate();

    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Listen: {}:{}", cfg.host, cfg.port);
                println!("  Catalog dir: {}", cfg.server.db_dir);
                println!("  Storage dir: {}", cfg.server.storage_dir);
                println!("  Chunk size: {}", cfg.server.chunk_size);
                println!("  Game ports from: {}", cfg.server.base_game_port);
                println!("  Interpreter: {}", cfg.runtime.interpreter);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    validation_result?;

    logging::init_with_config(&cfg.logging);

    let ip: IpAddr = cfg
        .host
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid host '{}': {e}", cfg.host))?;
    let addr = SocketAddr::from((ip, cfg.port));

    tracing::info!(%addr, "starting GameDock server");

    let server = PlatformServer::new(cfg).await?;
    let listener = TcpListener::bind(addr).await?;

    let shutdown = CancellationToken::new();
    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, shutting down");
            ctrl_c_token.cancel();
        }
    });

    server.run(listener, shutdown).await
}
