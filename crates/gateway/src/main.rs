//! `serialagent` — the meta-tool gateway binary.
//!
//! Boots the persistent store, rebuilds the live tool catalog, bootstraps
//! the feature managers and hook bus, then serves `list_tools`/`call_tool`
//! as line-framed JSON-RPC 2.0 over stdio until EOF or `Ctrl-C`.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sa_domain::config::GatewayConfig;
use sa_features::FeatureCoordinator;
use sa_gateway::providers::ProviderManager;
use sa_gateway::rpc::GatewayRpc;
use sa_registry::ToolRegistry;
use sa_store::Store;

/// `serialagent` — an in-process meta-tool gateway.
#[derive(Debug, Parser)]
#[command(name = "serialagent", version, about)]
struct Cli {
    /// Print version information and exit.
    #[arg(long)]
    version: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("serialagent {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    init_tracing();
    tracing::info!("serialagent gateway starting");

    let config = GatewayConfig::from_env();

    // ── Persistent store ─────────────────────────────────────────────
    // §6: exit code 2 is reserved for a DB-open failure at startup.
    let store = match Store::open(&config.store) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, path = %config.store.db_path.display(), "failed to open database");
            std::process::exit(2);
        }
    };
    tracing::info!(path = %config.store.db_path.display(), "persistent store ready");

    // ── Tool Loader / live catalog ───────────────────────────────────
    let registry = Arc::new(ToolRegistry::load(store.clone(), config.loader.max_layer2, config.loader.score_floor)?);
    tracing::info!(tools = registry.available_total(), "tool catalog rebuilt from store");

    // ── Feature managers + hook bus ──────────────────────────────────
    let coordinator = Arc::new(FeatureCoordinator::bootstrap(store.clone())?);
    for tool in coordinator.tool_definitions() {
        registry.register_tool(tool)?;
    }
    tracing::info!("feature managers bootstrapped");

    // ── Provider Manager (external MCP servers) ──────────────────────
    let providers = Arc::new(ProviderManager::new(store.clone(), registry.clone()));
    tracing::info!("provider manager ready (no providers connected at startup)");

    // ── Gateway RPC ───────────────────────────────────────────────────
    let rpc = Arc::new(GatewayRpc::new(
        store.clone(),
        registry.clone(),
        coordinator.clone(),
        providers.clone(),
        Duration::from_millis(config.call_timeout_ms),
    ));

    // ── Context-snapshot janitor ──────────────────────────────────────
    let janitor_store = store.clone();
    let janitor_handle = tokio::spawn(async move {
        sa_gateway::janitor::run(janitor_store, Duration::from_secs(300)).await;
    });

    // ── Serve until EOF or Ctrl-C ─────────────────────────────────────
    tokio::select! {
        _ = sa_gateway::rpc::serve_stdio(rpc) => {
            tracing::info!("RPC loop ended (stdin closed)");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    // ── Graceful shutdown: drain, disconnect, close ──────────────────
    janitor_handle.abort();
    providers.disconnect_all().await;
    tracing::info!("serialagent gateway stopped");

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sa_gateway=debug")))
        .init();
}
