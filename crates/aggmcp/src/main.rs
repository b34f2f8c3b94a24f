//! Entry point: assembles the Backend Pool, Profile Engine, Context
//! Injector factory and feature side-channels, starts the Config
//! Watcher, and serves the HTTP/SSE surface until shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use aggmcp_config::event_bus::BroadcastEventBus;
use aggmcp_config::{backends, paths};
use aggmcp_domain::error::Result;
use aggmcp_domain::events::DomainEvent;
use aggmcp_features::{Analytics, CostTracker, PromptLibrary, ResultCache, SecuritySandbox};
use aggmcp_pool::pool::BackendPool;
use aggmcp_profiles::ProfileStore;
use aggmcp_server::router::SessionRouter;
use aggmcp_server::sse::SseClients;
use chrono::Utc;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aggmcp", version, about = "Aggregating proxy for the Model Context Protocol")]
struct Cli {
    /// Path to an `aggmcp.toml` configuration file. Defaults to the
    /// well-known candidate locations (spec §10.3).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the proxy's HTTP/SSE server (the default if no subcommand is given).
    Serve,
    /// Load and validate the backend-definition file, then exit.
    CheckConfig,
    /// Load and validate the profile document, then exit.
    ValidateProfiles,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = aggmcp_config::load(paths::resolve_config_path(cli.config.clone()).as_deref())?;
    init_tracing(&config.log_level);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(serve(config))?;
        }
        Command::CheckConfig => {
            backends::ensure_backend_definitions_file(&config.paths.backends_file)?;
            let defs = backends::load_backend_definitions(&config.paths.backends_file)?;
            println!("{} backend definition(s) enabled at {}:", defs.len(), config.paths.backends_file.display());
            for def in defs {
                println!("  - {}", def.id);
            }
        }
        Command::ValidateProfiles => {
            let store = ProfileStore::load(&config.paths.profiles_file)?;
            let document = store.document();
            println!("{} profile(s) declared at {}:", document.profiles.len(), config.paths.profiles_file.display());
            for profile in &document.profiles {
                println!("  - {} ({} pattern(s), {} backend(s))", profile.name, profile.match_patterns.len(), profile.backend_ids.len());
            }
            println!("default profile: {}", document.default_profile);
        }
    }

    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(config: aggmcp_config::AppConfig) -> Result<()> {
    let config = Arc::new(config);
    paths::ensure_data_dir(&config)?;
    backends::ensure_backend_definitions_file(&config.paths.backends_file)?;

    let pool = Arc::new(BackendPool::new(
        Duration::from_secs(config.pool.request_timeout_secs),
        Duration::from_millis(config.pool.startup_grace_ms),
    ));
    pool.set_definitions(backends::load_backend_definitions(&config.paths.backends_file)?);

    let profiles = Arc::new(ProfileStore::load(&config.paths.profiles_file)?);
    let prompts = Arc::new(PromptLibrary::new(config.paths.prompts_dir.clone()));
    let cache = Arc::new(ResultCache::new(config.cache.max_entries, Duration::from_secs(config.cache.default_ttl_secs)));
    let analytics = Arc::new(Analytics::new());
    let cost = Arc::new(CostTracker::new());
    let security = Arc::new(SecuritySandbox::new(config.security.enabled));
    let event_bus = Arc::new(BroadcastEventBus::new());
    let sse_clients: Arc<SseClients> = Arc::new(SseClients::new());

    restore_persisted_usage(&config, &cost);

    let router = Arc::new(SessionRouter::new(
        Arc::clone(&pool),
        Arc::clone(&profiles),
        prompts,
        Arc::clone(&cache),
        config.cache.enabled,
        Duration::from_secs(config.session.idle_ttl_secs),
    ));

    let _backends_watcher = watch_backend_definitions(Arc::clone(&config), Arc::clone(&pool), Arc::clone(&event_bus), Arc::clone(&router)).await?;
    let _profiles_watcher = watch_profile_document(Arc::clone(&profiles), Arc::clone(&event_bus), Arc::clone(&router)).await?;

    tokio::spawn(Arc::clone(&router).run_sweeper(Duration::from_secs(config.session.sweep_interval_secs)));
    tokio::spawn(run_cache_sweeper(Arc::clone(&cache), Duration::from_secs(config.cache.sweep_interval_secs)));
    tokio::spawn(run_telemetry_persistence(Arc::clone(&config), Arc::clone(&cost), Arc::clone(&analytics)));

    let serve_result = tokio::select! {
        result = aggmcp_server::serve(Arc::clone(&config), router, sse_clients, event_bus, security, analytics, Arc::clone(&cost), cache) => result,
        () = shutdown_signal() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    };

    if let Some(content) = cost.flush_if_dirty() {
        let _ = tokio::fs::write(usage_file(&config), content).await;
    }
    pool.dispose().await;
    serve_result
}

/// Wait for either Ctrl-C or, on Unix, SIGTERM — the lifecycle the
/// process that manages the core itself is expected to send (spec §7:
/// subprocess restart-on-crash is supervised outside the Pool's request
/// path; this is the analogous signal for the core's own shutdown).
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            std::future::pending::<()>().await;
            return;
        };
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

async fn watch_backend_definitions(
    config: Arc<aggmcp_config::AppConfig>,
    pool: Arc<BackendPool>,
    event_bus: Arc<BroadcastEventBus>,
    router: Arc<SessionRouter>,
) -> Result<aggmcp_config::FileChangeWatcher> {
    let path = config.paths.backends_file.clone();
    aggmcp_config::FileChangeWatcher::watch(path, aggmcp_config::watcher::DEBOUNCE, move |content| {
        match backends::parse_backend_definitions(&content) {
            Ok(defs) => {
                pool.set_definitions(defs);
                event_bus.publish_sync(DomainEvent::BackendConfigChanged { at: Utc::now() });
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    for workspace_id in router.active_sessions().into_iter().map(|s| s.workspace_id) {
                        router.refresh(&workspace_id).await;
                    }
                });
            }
            Err(err) => tracing::warn!(error = %err, "ignoring unparseable backend definition reload"),
        }
    })
    .await
}

async fn watch_profile_document(
    profiles: Arc<ProfileStore>,
    event_bus: Arc<BroadcastEventBus>,
    router: Arc<SessionRouter>,
) -> Result<aggmcp_config::FileChangeWatcher> {
    aggmcp_profiles::watch_with(profiles, move || {
        event_bus.publish_sync(DomainEvent::ProfilesChanged { at: Utc::now() });
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            for workspace_id in router.active_sessions().into_iter().map(|s| s.workspace_id) {
                router.refresh(&workspace_id).await;
            }
        });
    })
    .await
}

async fn run_cache_sweeper(cache: Arc<ResultCache>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        cache.sweep();
    }
}

fn usage_file(config: &aggmcp_config::AppConfig) -> PathBuf {
    config.paths.data_dir.join("usage.json")
}

fn analytics_file(config: &aggmcp_config::AppConfig) -> PathBuf {
    config.paths.data_dir.join("analytics.json")
}

fn restore_persisted_usage(config: &aggmcp_config::AppConfig, cost: &CostTracker) {
    let Ok(content) = std::fs::read_to_string(usage_file(config)) else {
        return;
    };
    if let Err(err) = cost.restore(&content) {
        tracing::warn!(error = %err, "ignoring unreadable persisted usage snapshot");
    }
}

/// Periodically flush the Cost Tracker (if dirty) and a snapshot of
/// Analytics to the data directory (spec §4.8, §6: "Persisted state").
async fn run_telemetry_persistence(config: Arc<aggmcp_config::AppConfig>, cost: Arc<CostTracker>, analytics: Arc<Analytics>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.telemetry.persist_interval_secs));
    loop {
        ticker.tick().await;
        if let Some(content) = cost.flush_if_dirty() {
            if let Err(err) = tokio::fs::write(usage_file(&config), content).await {
                tracing::warn!(error = %err, "failed to persist usage snapshot");
            }
        }
        match serde_json::to_string_pretty(&analytics.all_tools()) {
            Ok(content) => {
                if let Err(err) = tokio::fs::write(analytics_file(&config), content).await {
                    tracing::warn!(error = %err, "failed to persist analytics snapshot");
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to serialize analytics snapshot"),
        }
    }
}
