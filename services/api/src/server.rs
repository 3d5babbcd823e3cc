use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryDemandeRepository, InMemoryUserRepository};
use crate::routes::with_demande_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use sejour::config::AppConfig;
use sejour::error::AppError;
use sejour::telemetry;
use sejour::workflows::demande::{DemandeWorkflowService, HeaderIdentityProvider};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let users = InMemoryUserRepository::with_users(config.store.seed_users.iter().cloned())
        .map_err(|err| AppError::Workflow(err.into()))?;
    info!(seeded = config.store.seed_users.len(), "user store ready");

    let service = Arc::new(DemandeWorkflowService::new(
        Arc::new(InMemoryDemandeRepository::default()),
        Arc::new(users),
    ));
    let identity = Arc::new(HeaderIdentityProvider::new(&config.auth));

    let app = with_demande_routes(service, identity)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, login_header = %config.auth.login_header, "demande workflow service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
