use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::app::{app, AppState};
use crate::config::AppConfig;
use crate::database::{manager, PgStore};

#[derive(Parser)]
#[command(name = "backoffice-api")]
#[command(about = "Back-office REST API server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Listen on this port instead of PORT")]
        port: Option<u16>,
    },

    #[command(about = "Apply database migrations and exit")]
    Migrate,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::from_env()?;
    info!("Loaded {:?} configuration", config.environment);

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Commands::Migrate => {
            let pool = manager::connect(&config.database).await?;
            manager::migrate(&pool).await?;
            pool.close().await;
            Ok(())
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    // Migrations need a live connection; otherwise start even if the database is down
    let pool = if config.database.run_migrations {
        let pool = manager::connect(&config.database).await?;
        manager::migrate(&pool).await?;
        pool
    } else {
        manager::connect_lazy(&config.database)?
    };

    let bind_addr = config.bind_addr();
    let store = Arc::new(PgStore::new(pool.clone()));
    let router = app(AppState::new(config, store));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", bind_addr, e))?;
    info!("Backoffice API listening on http://{}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down, closing database pool");
    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
