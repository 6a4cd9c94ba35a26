use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use intake_funnel::config::{BackendConfig, FunnelConfig};
use intake_funnel::local::FileStateStore;
use intake_funnel::questionnaire::{
    ManagerDeps, QuestionnaireRouteState, RegistryLimits, SessionRegistry, questionnaire_routes,
    spawn_sweep_task,
};
use intake_funnel::store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = FunnelConfig::from_env().context("invalid configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing(&config);

    let backend = match &config.backend {
        BackendConfig::Memory => "memory".to_string(),
        BackendConfig::LibSql { path } => format!("libsql ({})", path.display()),
        BackendConfig::Rest { url, .. } => format!("rest ({url})"),
    };
    eprintln!("📝 Intake funnel v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Store: {backend}");
    eprintln!("   Local state: {}", config.state_dir.display());
    eprintln!("   API: http://0.0.0.0:{}/api/questionnaire/sessions\n", config.http_port);

    let gateway = store::connect(&config)
        .await
        .context("failed to open the questionnaire store")?;

    let local = FileStateStore::new(config.state_dir.clone());
    local
        .ensure_dirs()
        .await
        .context("failed to create the local state directory")?;

    let limits = RegistryLimits {
        idle_ttl: config.session_idle,
        max_sessions: config.max_sessions,
    };
    let registry = Arc::new(SessionRegistry::with_limits(
        ManagerDeps::new(gateway, Arc::new(local)),
        limits,
    ));
    let _sweep_handle = spawn_sweep_task(registry.clone());

    let app = questionnaire_routes(QuestionnaireRouteState { registry }).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port))
        .await
        .with_context(|| format!("failed to bind port {}", config.http_port))?;
    tracing::info!(port = config.http_port, "Questionnaire API started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

/// Stderr logging filtered by `RUST_LOG` (default `info`), plus a daily
/// rolling file when a log directory is configured.
fn init_tracing(config: &FunnelConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "intake-funnel.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file_layer)
        .init();
    guard
}
