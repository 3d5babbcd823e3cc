use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::domain::{Caller, DemandeCount, DemandeId, StatutDemande};
use super::identity::{IdentityError, IdentityProvider};
use super::lifecycle::LifecycleError;
use super::mapping::DemandeDto;
use super::repository::{DemandeRepository, UserRepository};
use super::service::{DemandeServiceError, DemandeWorkflowService};

pub const ALERT_HEADER: &str = "x-sejour-alert";
pub const PARAMS_HEADER: &str = "x-sejour-params";

/// Shared handler state: the workflow service and the caller resolver.
pub struct DemandeRouterState<D, U> {
    pub service: Arc<DemandeWorkflowService<D, U>>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl<D, U> Clone for DemandeRouterState<D, U> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            identity: Arc::clone(&self.identity),
        }
    }
}

/// Router builder exposing the demande lifecycle under `/api`.
pub fn demande_router<D, U>(
    service: Arc<DemandeWorkflowService<D, U>>,
    identity: Arc<dyn IdentityProvider>,
) -> Router
where
    D: DemandeRepository + 'static,
    U: UserRepository + 'static,
{
    Router::new()
        .route("/api/demande/init", put(init_handler::<D, U>))
        .route("/api/demandes", get(list_handler::<D, U>))
        .route("/api/demande", get(by_email_and_statut_handler::<D, U>))
        .route("/api/demande/statut", get(by_statut_handler::<D, U>))
        .route("/api/demande/count", get(count_handler::<D, U>))
        .route("/api/demande/:id", get(get_handler::<D, U>))
        .route("/api/demande/update", put(update_handler::<D, U>))
        .route("/api/demande/validate", put(validate_handler::<D, U>))
        .route("/api/demande/prepaid", put(prepaid_handler::<D, U>))
        .route("/api/demande/verify", put(verify_handler::<D, U>))
        .route("/api/demande/rdv", put(rdv_handler::<D, U>))
        .route(
            "/api/demande/identification",
            put(identification_handler::<D, U>),
        )
        .route(
            "/api/demande/finalDecision",
            put(final_decision_handler::<D, U>),
        )
        .with_state(DemandeRouterState { service, identity })
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmailStatutQuery {
    pub(crate) email: String,
    pub(crate) statut: StatutDemande,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatutQuery {
    pub(crate) statut: StatutDemande,
}

/// Error payload returned by every handler.
#[derive(Debug)]
pub(crate) struct ApiFailure {
    status: StatusCode,
    message: String,
}

impl ApiFailure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// `validate` reports an owner mismatch as a server-side failure.
    fn from_validation(error: DemandeServiceError) -> Self {
        match error {
            DemandeServiceError::Lifecycle(LifecycleError::IdentityMismatch { .. }) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
            }
            other => Self::from(other),
        }
    }
}

impl From<DemandeServiceError> for ApiFailure {
    fn from(error: DemandeServiceError) -> Self {
        let status = match &error {
            DemandeServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            DemandeServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            DemandeServiceError::Lifecycle(LifecycleError::InvalidTransition { .. })
            | DemandeServiceError::DuplicateActiveRequest { .. } => StatusCode::CONFLICT,
            DemandeServiceError::Lifecycle(LifecycleError::IdentityMismatch { .. }) => {
                StatusCode::FORBIDDEN
            }
            DemandeServiceError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, error.to_string())
    }
}

impl From<IdentityError> for ApiFailure {
    fn from(error: IdentityError) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error.to_string())
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type HandlerResult<T> = Result<T, ApiFailure>;

fn caller<D, U>(state: &DemandeRouterState<D, U>, headers: &HeaderMap) -> HandlerResult<Caller> {
    let caller = state.identity.current_caller(headers)?;
    debug!(caller = %caller.login, authorities = ?caller.authorities, "caller resolved");
    Ok(caller)
}

pub(crate) async fn init_handler<D, U>(
    State(state): State<DemandeRouterState<D, U>>,
    headers: HeaderMap,
) -> HandlerResult<StatusCode>
where
    D: DemandeRepository + 'static,
    U: UserRepository + 'static,
{
    debug!("REST request to init demande");
    let caller = caller(&state, &headers)?;
    state.service.init_with_campus(&caller)?;
    Ok(StatusCode::OK)
}

pub(crate) async fn list_handler<D, U>(
    State(state): State<DemandeRouterState<D, U>>,
    headers: HeaderMap,
) -> HandlerResult<Json<Vec<DemandeDto>>>
where
    D: DemandeRepository + 'static,
    U: UserRepository + 'static,
{
    let caller = caller(&state, &headers)?;
    let demandes = state.service.user_demandes(&caller)?;
    Ok(Json(demandes.into_iter().map(DemandeDto::from).collect()))
}

pub(crate) async fn get_handler<D, U>(
    State(state): State<DemandeRouterState<D, U>>,
    Path(id): Path<String>,
) -> HandlerResult<Json<DemandeDto>>
where
    D: DemandeRepository + 'static,
    U: UserRepository + 'static,
{
    debug!(demande_id = %id, "REST request to get demande");
    let demande = state.service.get(&DemandeId(id))?;
    Ok(Json(demande.into()))
}

pub(crate) async fn by_email_and_statut_handler<D, U>(
    State(state): State<DemandeRouterState<D, U>>,
    Query(query): Query<EmailStatutQuery>,
) -> HandlerResult<Json<DemandeDto>>
where
    D: DemandeRepository + 'static,
    U: UserRepository + 'static,
{
    state
        .service
        .find_by_email_and_status(&query.email, query.statut)?
        .map(|demande| Json(demande.into()))
        .ok_or_else(|| {
            ApiFailure::new(
                StatusCode::NOT_FOUND,
                format!("no {} demande for {}", query.statut, query.email),
            )
        })
}

pub(crate) async fn by_statut_handler<D, U>(
    State(state): State<DemandeRouterState<D, U>>,
    Query(query): Query<StatutQuery>,
) -> HandlerResult<Json<Vec<DemandeDto>>>
where
    D: DemandeRepository + 'static,
    U: UserRepository + 'static,
{
    let demandes = state.service.find_by_status(query.statut)?;
    Ok(Json(demandes.into_iter().map(DemandeDto::from).collect()))
}

pub(crate) async fn count_handler<D, U>(
    State(state): State<DemandeRouterState<D, U>>,
) -> HandlerResult<Json<DemandeCount>>
where
    D: DemandeRepository + 'static,
    U: UserRepository + 'static,
{
    Ok(Json(state.service.counts()?))
}

pub(crate) async fn update_handler<D, U>(
    State(state): State<DemandeRouterState<D, U>>,
    headers: HeaderMap,
    Json(submitted): Json<DemandeDto>,
) -> HandlerResult<Response>
where
    D: DemandeRepository + 'static,
    U: UserRepository + 'static,
{
    let caller = caller(&state, &headers)?;
    let updated = state.service.update(&caller, submitted)?;

    let mut response = Json(DemandeDto::from(updated.clone())).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(
        ALERT_HEADER,
        HeaderValue::from_static("sejour.demande.updated"),
    );
    if let Ok(value) = HeaderValue::from_str(&updated.id.0) {
        response_headers.insert(PARAMS_HEADER, value);
    }
    Ok(response)
}

pub(crate) async fn validate_handler<D, U>(
    State(state): State<DemandeRouterState<D, U>>,
    headers: HeaderMap,
    Json(submitted): Json<DemandeDto>,
) -> HandlerResult<StatusCode>
where
    D: DemandeRepository + 'static,
    U: UserRepository + 'static,
{
    let caller = caller(&state, &headers)?;
    state
        .service
        .validate(&caller, submitted)
        .map_err(ApiFailure::from_validation)?;
    Ok(StatusCode::OK)
}

pub(crate) async fn prepaid_handler<D, U>(
    State(state): State<DemandeRouterState<D, U>>,
    headers: HeaderMap,
) -> HandlerResult<StatusCode>
where
    D: DemandeRepository + 'static,
    U: UserRepository + 'static,
{
    let caller = caller(&state, &headers)?;
    state.service.prepaid(&caller)?;
    Ok(StatusCode::OK)
}

pub(crate) async fn verify_handler<D, U>(
    State(state): State<DemandeRouterState<D, U>>,
    headers: HeaderMap,
    Json(submitted): Json<DemandeDto>,
) -> HandlerResult<StatusCode>
where
    D: DemandeRepository + 'static,
    U: UserRepository + 'static,
{
    let caller = caller(&state, &headers)?;
    state.service.verify(&caller, submitted)?;
    Ok(StatusCode::OK)
}

pub(crate) async fn rdv_handler<D, U>(
    State(state): State<DemandeRouterState<D, U>>,
    headers: HeaderMap,
    Json(submitted): Json<DemandeDto>,
) -> HandlerResult<StatusCode>
where
    D: DemandeRepository + 'static,
    U: UserRepository + 'static,
{
    let caller = caller(&state, &headers)?;
    state.service.rdv(&caller, submitted)?;
    Ok(StatusCode::OK)
}

pub(crate) async fn identification_handler<D, U>(
    State(state): State<DemandeRouterState<D, U>>,
    headers: HeaderMap,
    Json(submitted): Json<DemandeDto>,
) -> HandlerResult<StatusCode>
where
    D: DemandeRepository + 'static,
    U: UserRepository + 'static,
{
    let caller = caller(&state, &headers)?;
    state.service.identification(&caller, submitted)?;
    Ok(StatusCode::OK)
}

pub(crate) async fn final_decision_handler<D, U>(
    State(state): State<DemandeRouterState<D, U>>,
    headers: HeaderMap,
    Json(submitted): Json<DemandeDto>,
) -> HandlerResult<StatusCode>
where
    D: DemandeRepository + 'static,
    U: UserRepository + 'static,
{
    let caller = caller(&state, &headers)?;
    state.service.final_decision(&caller, submitted)?;
    Ok(StatusCode::OK)
}
