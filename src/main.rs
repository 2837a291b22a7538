#![cfg_attr(not(test), deny(clippy::panic))]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use impostor_server::config;
use impostor_server::logging;
use impostor_server::notify::InMemoryNotifier;
use impostor_server::service::{GameService, RoomService};
use impostor_server::store::{self, StoreBackend};
use impostor_server::transport::{self, AppState};

/// Impostor -- realtime game engine for the Impostor social-deduction party game
#[derive(Parser, Debug)]
#[command(name = "impostor-server")]
#[command(about = "Realtime WebSocket/HTTP game engine for Impostor")]
#[command(version)]
struct Cli {
    /// Print the loaded configuration to stdout (as JSON) and exit.
    /// Useful for debugging configuration loading from multiple sources.
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration from config.yaml if present; otherwise use code defaults.
    let cfg = config::load();

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    logging::init_with_config(&cfg.logging);

    let port = cfg.port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "Starting Impostor server");

    // `REDIS_URL` selects the production store backend; unset falls back to
    // the in-memory reference store used by tests, per `spec.md` §6.
    let backend = match std::env::var("REDIS_URL") {
        Ok(url) if !url.is_empty() => StoreBackend::Redis { url },
        _ => StoreBackend::InMemory,
    };
    let store = store::create_store(backend, cfg.redis_room_store.settings).await?;

    let notifier = Arc::new(InMemoryNotifier::new());
    let room_service = Arc::new(RoomService::new(store.clone(), notifier.clone()));
    let game_service = Arc::new(GameService::new(
        store,
        notifier.clone(),
        Duration::from_secs(cfg.timer_tick_seconds),
    )?);

    let router = transport::create_router(AppState { room_service, game_service, notifier });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, router.into_make_service()).await?;

    Ok(())
}

#[cfg(test)]
mod cli_tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn test_cli_default_no_flags() {
        let cli = Cli::try_parse_from(["impostor-server"]).unwrap();
        assert!(!cli.print_config);
    }

    #[test]
    fn test_cli_print_config() {
        let cli = Cli::try_parse_from(["impostor-server", "--print-config"]).unwrap();
        assert!(cli.print_config);
    }

    #[test]
    fn test_cli_help_contains_flags() {
        let result = Cli::try_parse_from(["impostor-server", "--help"]);
        assert!(result.is_err());
        let help_text = result.unwrap_err().to_string();
        assert!(help_text.contains("--print-config"));
    }

    #[test]
    fn test_cli_version() {
        let result = Cli::try_parse_from(["impostor-server", "--version"]);
        assert!(result.is_err());
    }
}
