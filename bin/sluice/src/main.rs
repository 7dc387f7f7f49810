//! Sluice - batch processors for Substrate chains.
//!
//! # Usage
//!
//! ```bash
//! # Kusama transfers and identities
//! BUNDLES=balances,identity WS_URL=wss://kusama-rpc.polkadot.io sluice
//!
//! # Apply migrations only
//! DATABASE_URL=postgres://localhost/sluice sluice --migrate-only
//! ```

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_subscriber::{EnvFilter, fmt};

use async_graphql::MergedObject;
use sluice_core::error::ProcessorError;
use sluice_core::metrics::init_metrics;
use sluice_core::models::{BlockHash, Ss58Codec};
use sluice_core::ports::{BatchSource, CursorRepository};
use sluice_core::services::{BatchProcessor, ProcessorConfig};
use sluice_graphql::{
    CoreQuery, HealthCheck, MAX_QUERY_COMPLEXITY, MAX_QUERY_DEPTH, ServerConfig, schema_builder, serve_with_shutdown,
};
use sluice_handlers::{BUNDLE_NAMES, BundleQuery, BundleRegistry, bundle_by_name, with_bundle_storages};
use sluice_storage::{Database, DatabaseConfig, PgCursorRepository, PgRepositories};
use sluice_substrate::{SubstrateClient, SubstrateClientConfig};

/// Sluice CLI.
#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(about = "Sluice - batch processors for Substrate chains")]
#[command(version)]
struct Cli {
    /// Archive node WebSocket URL.
    #[arg(long, env = "WS_URL", default_value = "ws://127.0.0.1:9944")]
    ws_url: String,

    /// PostgreSQL database URL.
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://localhost/sluice")]
    database_url: String,

    /// GraphQL server port.
    #[arg(long, env = "GRAPHQL_PORT", default_value = "4350")]
    graphql_port: u16,

    /// Prometheus metrics port.
    #[arg(long, env = "METRICS_PORT", default_value = "9090")]
    metrics_port: u16,

    /// Comma-separated bundles to run.
    #[arg(long, env = "BUNDLES", value_delimiter = ',', default_value = "balances")]
    bundles: Vec<String>,

    /// Cursor key. Defaults to the bundle names joined by `-`.
    #[arg(long, env = "PROCESSOR_NAME")]
    processor_name: Option<String>,

    /// First block when no cursor exists. Defaults to the earliest bundle start.
    #[arg(long, env = "FROM_BLOCK")]
    from_block: Option<u64>,

    /// Last block to process (inclusive). Follows the finalized head when unset.
    #[arg(long, env = "TO_BLOCK")]
    to_block: Option<u64>,

    /// Maximum blocks per batch.
    #[arg(long, env = "BATCH_SIZE", default_value = "500")]
    batch_size: u64,

    /// Address format for account ids (kusama, polkadot, astar, moonriver, ...).
    /// Defaults to the network of the selected bundles.
    #[arg(long, env = "SS58_NETWORK")]
    ss58_network: Option<String>,

    /// Genesis hash the node must report.
    #[arg(long, env = "GENESIS_HASH")]
    genesis_hash: Option<String>,

    /// Wait between finalized head polls once caught up.
    #[arg(long, env = "POLL_INTERVAL_MS", default_value = "6000")]
    poll_interval_ms: u64,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Run database migrations and exit.
    #[arg(long)]
    migrate_only: bool,

    /// Truncate the selected bundles' tables and reset cursors, then exit.
    ///
    /// Schema and applied migrations are preserved.
    #[arg(long)]
    purge: bool,

    /// Skip confirmation prompt for destructive operations (like --purge).
    #[arg(long, short = 'y')]
    yes: bool,
}

impl Cli {
    fn processor_name(&self) -> String {
        self.processor_name
            .clone()
            .unwrap_or_else(|| self.bundles.join("-"))
    }
}

#[derive(MergedObject, Default)]
struct Query(CoreQuery, BundleQuery);

/// `/health` reports on the GraphQL pool.
struct DatabaseHealth(Arc<Database>);

#[async_trait]
impl HealthCheck for DatabaseHealth {
    async fn is_healthy(&self) -> bool {
        self.0.is_healthy().await
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    // Le processeur tourne même sans exporteur
    let metrics_enabled = match format!("0.0.0.0:{}", cli.metrics_port).parse::<std::net::SocketAddr>() {
        Ok(metrics_addr) => match PrometheusBuilder::new().with_http_listener(metrics_addr).install() {
            Ok(()) => {
                init_metrics();
                true
            }
            Err(e) => {
                warn!("⚠️  Failed to start metrics exporter: {}. Continuing without metrics.", e);
                false
            }
        },
        Err(e) => {
            warn!("⚠️  Invalid metrics address: {}. Continuing without metrics.", e);
            false
        }
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 🚀 STARTUP
    // ─────────────────────────────────────────────────────────────────────────
    let processor_name = cli.processor_name();
    let expected_genesis = cli
        .genesis_hash
        .as_deref()
        .map(BlockHash::from_hex)
        .transpose()
        .context("Invalid GENESIS_HASH")?;

    info!(processor = %processor_name, bundles = ?cli.bundles, "🚀 Starting Sluice");
    debug!(ws_url = %cli.ws_url, "Node endpoint");
    debug!(database_url = %mask_password(&cli.database_url), "Database endpoint");

    // ─────────────────────────────────────────────────────────────────────────
    // 🗄️ DATABASE
    // ─────────────────────────────────────────────────────────────────────────
    info!("🗄️  Connecting to database...");
    let db = Database::connect(&DatabaseConfig::for_processor(&cli.database_url))
        .await
        .context("Failed to connect to database")?;

    db.migrate().await.context("Failed to run migrations")?;

    // ─────────────────────────────────────────────────────────────────────────
    // 📦 BUNDLES
    // ─────────────────────────────────────────────────────────────────────────
    let mut bundle_registry = BundleRegistry::new();
    for name in &cli.bundles {
        let Some(bundle) = bundle_by_name(name.trim(), db.pool().clone()) else {
            bail!("Unknown bundle '{}'. Known bundles: {}", name, BUNDLE_NAMES.join(", "));
        };
        bundle_registry.register(bundle);
    }

    let applied = bundle_registry
        .run_migrations(db.pool())
        .await
        .context("Failed to run bundle migrations")?;
    info!(applied, "🗄️  Database ready (migrations applied)");

    if cli.migrate_only {
        info!("🛑 --migrate-only flag set, exiting");
        return Ok(());
    }

    if cli.purge {
        return handle_purge(&db, &bundle_registry, cli.yes).await;
    }

    let network = ss58_network(cli.ss58_network.as_deref(), bundle_registry.default_ss58_network())?;
    let ss58 = Ss58Codec::for_network(network).context("Invalid SS58_NETWORK")?;
    info!(network, prefix = ss58.prefix(), "🏷️  Address format");

    let graphql_db = Database::connect(&DatabaseConfig::for_graphql(&cli.database_url))
        .await
        .context("Failed to create GraphQL database pool")?;

    let db = Arc::new(db);
    let graphql_db = Arc::new(graphql_db);
    let repositories = Arc::new(PgRepositories::new(db.clone(), bundle_registry.writers()));

    // ─────────────────────────────────────────────────────────────────────────
    // 📡 NODE CONNECTION
    // ─────────────────────────────────────────────────────────────────────────
    info!("📡 Connecting to archive node...");
    let client = SubstrateClient::connect(SubstrateClientConfig {
        ws_url: cli.ws_url.clone(),
        ..Default::default()
    })
    .await
    .context("Failed to connect to node")?;
    let client = Arc::new(client);

    let genesis = client.genesis_hash().await?;
    let finalized = client.finalized_head().await?;
    info!(genesis = %genesis, head = finalized.number, "🔗 Chain connected");

    let processor_config = ProcessorConfig {
        name: processor_name.clone(),
        from_block: cli.from_block.unwrap_or_else(|| bundle_registry.start_block()),
        to_block: cli.to_block,
        batch_size: cli.batch_size.max(1),
        poll_interval: Duration::from_millis(cli.poll_interval_ms),
        expected_genesis,
        ss58,
        ..Default::default()
    };
    let processor = BatchProcessor::new(
        processor_config,
        client,
        repositories,
        Arc::new(bundle_registry.handler_registry()),
    );

    // ─────────────────────────────────────────────────────────────────────────
    // ⚡ SERVICES START
    // ─────────────────────────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut graphql_shutdown_rx = shutdown_tx.subscribe();

    let graphql_config = ServerConfig {
        port: cli.graphql_port,
        ..Default::default()
    };
    let health: Arc<dyn HealthCheck> = Arc::new(DatabaseHealth(graphql_db.clone()));

    let cursors: Arc<dyn CursorRepository> = Arc::new(PgCursorRepository::new(&graphql_db));
    let schema = with_bundle_storages(
        schema_builder(Query::default(), cursors, &processor_name),
        graphql_db.pool(),
    )
    .limit_depth(MAX_QUERY_DEPTH)
    .limit_complexity(MAX_QUERY_COMPLEXITY)
    .finish();

    let graphql_handle = tokio::spawn(
        async move {
            let shutdown_signal = async move {
                while !*graphql_shutdown_rx.borrow() {
                    if graphql_shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            };

            if let Err(e) = serve_with_shutdown(schema, health, graphql_config, shutdown_signal).await {
                error!(error = %e, "❌ Server error");
            }
            debug!("Server stopped");
        }
        .instrument(info_span!("graphql")),
    );

    // Le processeur s'arrête sur erreur : on coupe aussi le serveur
    let processor_shutdown_tx = shutdown_tx.clone();
    let mut processor_handle = tokio::spawn(
        async move {
            let result = processor.run(shutdown_rx).await;
            match &result {
                Ok(()) => info!("🏁 Processor finished its range"),
                Err(ProcessorError::ShutdownRequested) => {}
                Err(e) if e.is_unknown_schema() => {
                    error!(error = %e, "❌ Unknown schema version, the processor needs a new decoder");
                }
                Err(e) => error!(error = %e, "❌ Processor error"),
            }
            let _ = processor_shutdown_tx.send(true);
            result
        }
        .instrument(info_span!("processor")),
    );

    // ─────────────────────────────────────────────────────────────────────────
    // ✅ READY
    // ─────────────────────────────────────────────────────────────────────────
    info!("✅ Sluice ready");
    info!("   ⚡ GraphQL:  http://localhost:{}/graphql", cli.graphql_port);
    if metrics_enabled {
        info!("   📊 Metrics:  http://localhost:{}/metrics", cli.metrics_port);
    } else {
        info!("   📊 Metrics:  disabled");
    }
    info!("   Press Ctrl+C to stop");

    let mut stop_rx = shutdown_tx.subscribe();
    let processor_result = tokio::select! {
        _ = shutdown_signal() => None,
        _ = stop_rx.wait_for(|stop| *stop) => None,
        result = &mut processor_handle => Some(result),
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 🛑 SHUTDOWN
    // ─────────────────────────────────────────────────────────────────────────
    info!("🛑 Shutting down...");
    let _ = shutdown_tx.send(true);

    let processor_result = match processor_result {
        Some(result) => Some(result),
        None => match tokio::time::timeout(Duration::from_secs(30), processor_handle).await {
            Ok(result) => Some(result),
            Err(_) => {
                warn!("⚠️  Processor shutdown timed out");
                None
            }
        },
    };

    match tokio::time::timeout(Duration::from_secs(10), graphql_handle).await {
        Ok(_) => debug!("GraphQL stopped"),
        Err(_) => warn!("⚠️  GraphQL shutdown timed out"),
    }

    db.close().await;
    graphql_db.close().await;

    info!("🛑 Shutdown complete");
    match processor_result {
        Some(Ok(Err(e))) if !matches!(e, ProcessorError::ShutdownRequested) => Err(e.into()),
        Some(Err(e)) => Err(anyhow!("processor task failed: {}", e)),
        _ => Ok(()),
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Mask password in database URL for logging.
/// Network given on the command line, else the one the bundles agree on.
fn ss58_network<'a>(flag: Option<&'a str>, bundles: Option<&'a str>) -> Result<&'a str> {
    flag.or(bundles)
        .ok_or_else(|| anyhow!("Selected bundles read chains with different address formats, set SS58_NETWORK"))
}

fn mask_password(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Handle the --purge command.
async fn handle_purge(db: &Database, bundle_registry: &BundleRegistry, skip_confirmation: bool) -> Result<()> {
    let bundle_tables = bundle_registry.tables_to_purge();

    warn!("⚠️  PURGE MODE: This will delete processed data!");
    if !bundle_tables.is_empty() {
        warn!("   - Bundle tables: {}", bundle_tables.join(", "));
    }
    warn!("   - Every processor cursor will be reset");
    warn!("   - Schema and migrations will be preserved");

    if !skip_confirmation {
        print!("\n🔴 Are you sure you want to purge all data? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            info!("❌ Purge cancelled");
            return Ok(());
        }
    }

    info!("🗑️  Purging database...");

    let bundle_tables_purged = bundle_registry
        .purge_tables(db.pool())
        .await
        .context("Failed to purge bundle tables")?;
    if bundle_tables_purged > 0 {
        info!("   🧹 Purged {} bundle table(s)", bundle_tables_purged);
    }

    let stats = db.purge().await.context("Failed to purge database")?;

    info!("✅ Database purged successfully");
    info!("   🔁 Cursors removed: {}", stats.cursors_removed);
    info!("   Processors will start from their first block on next run");

    Ok(())
}
