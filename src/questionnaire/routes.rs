//! REST endpoints for driving a questionnaire session.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use tracing::warn;

use super::answers::{AnswerParseError, Answers};
use super::manager::QuestionnaireManager;
use super::model::{CONTACT_STEP, ContactInfo};
use super::registry::SessionRegistry;
use crate::error::{LocalStateError, SubmitError};

/// Shared state for questionnaire routes.
#[derive(Clone)]
pub struct QuestionnaireRouteState {
    pub registry: Arc<SessionRegistry>,
}

/// Errors a handler can answer with.
#[derive(Debug)]
pub enum ApiError {
    NotFound,
    Unprocessable(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound => (StatusCode::NOT_FOUND, "Session not found".to_string()),
            Self::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m),
            Self::Conflict(m) => (StatusCode::CONFLICT, m),
            Self::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<LocalStateError> for ApiError {
    fn from(e: LocalStateError) -> Self {
        match e {
            // Not a key we could ever have issued.
            LocalStateError::InvalidScope(_) => Self::NotFound,
            other => {
                warn!(error = %other, "Local state failure");
                Self::Internal(other.to_string())
            }
        }
    }
}

impl From<AnswerParseError> for ApiError {
    fn from(e: AnswerParseError) -> Self {
        Self::Unprocessable(e.to_string())
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        Self::Conflict(e.to_string())
    }
}

/// Build the questionnaire REST routes.
pub fn questionnaire_routes(state: QuestionnaireRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/questionnaire/sessions", post(create_session))
        .route(
            "/api/questionnaire/sessions/{id}",
            get(get_session).delete(reset_session),
        )
        .route("/api/questionnaire/sessions/{id}/steps/{step}", put(submit_step))
        .route("/api/questionnaire/sessions/{id}/contact", put(update_contact))
        .route("/api/questionnaire/sessions/{id}/advance", post(advance))
        .route("/api/questionnaire/sessions/{id}/retreat", post(retreat))
        .route("/api/questionnaire/sessions/{id}/submit", post(submit))
        .with_state(state)
}

async fn lookup(state: &QuestionnaireRouteState, id: &str) -> Result<Arc<QuestionnaireManager>, ApiError> {
    state.registry.get(id).await?.ok_or(ApiError::NotFound)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "intake-funnel"
    }))
}

// ── Sessions ────────────────────────────────────────────────────────────

async fn create_session(State(state): State<QuestionnaireRouteState>) -> Result<impl IntoResponse, ApiError> {
    let manager = state.registry.create().await?;
    Ok((StatusCode::CREATED, Json(manager.status().await)))
}

async fn get_session(
    State(state): State<QuestionnaireRouteState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let manager = lookup(&state, &id).await?;
    Ok(Json(manager.status().await))
}

/// DELETE clears the visitor's data and restarts the questionnaire.
async fn reset_session(
    State(state): State<QuestionnaireRouteState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let manager = lookup(&state, &id).await?;
    Ok(Json(manager.reset().await?))
}

// ── Answers ─────────────────────────────────────────────────────────────

async fn submit_step(
    State(state): State<QuestionnaireRouteState>,
    Path((id, step)): Path<(String, u8)>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    if !(1..CONTACT_STEP).contains(&step) {
        return Err(ApiError::Unprocessable(format!(
            "Step {step} does not take answers; use steps 1-{} or the contact endpoint",
            CONTACT_STEP - 1
        )));
    }
    let answers = Answers::from_json(&body)?;
    let manager = lookup(&state, &id).await?;
    Ok(Json(manager.submit_step(step, answers).await))
}

async fn update_contact(
    State(state): State<QuestionnaireRouteState>,
    Path(id): Path<String>,
    Json(info): Json<ContactInfo>,
) -> Result<impl IntoResponse, ApiError> {
    let manager = lookup(&state, &id).await?;
    Ok(Json(manager.update_contact_info(info).await))
}

// ── Navigation ──────────────────────────────────────────────────────────

async fn advance(
    State(state): State<QuestionnaireRouteState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let manager = lookup(&state, &id).await?;
    Ok(Json(manager.advance().await?))
}

async fn retreat(
    State(state): State<QuestionnaireRouteState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let manager = lookup(&state, &id).await?;
    Ok(Json(manager.retreat().await))
}

async fn submit(
    State(state): State<QuestionnaireRouteState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let manager = lookup(&state, &id).await?;
    Ok(Json(manager.finalize().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::local::MemoryStateStore;
    use crate::questionnaire::manager::ManagerDeps;
    use crate::store::MemoryGateway;

    fn app() -> Router {
        let deps = ManagerDeps::new(Arc::new(MemoryGateway::new()), Arc::new(MemoryStateStore::new()));
        questionnaire_routes(QuestionnaireRouteState {
            registry: Arc::new(SessionRegistry::new(deps)),
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                req = req.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_ok() {
        let (status, body) = send(&app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn unknown_session_is_404() {
        let app = app();
        let (status, _) = send(&app, "GET", "/api/questionnaire/sessions/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "POST", "/api/questionnaire/sessions/a.b/advance", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_then_submit_step() {
        let app = app();
        let (status, created) = send(&app, "POST", "/api/questionnaire/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["currentStep"], 1);
        assert_eq!(created["viewPath"], "/questionnaire/1");
        let id = created["scope"].as_str().unwrap().to_string();

        let (status, outcome) = send(
            &app,
            "PUT",
            &format!("/api/questionnaire/sessions/{id}/steps/1"),
            Some(serde_json::json!({"yearsExperience": "3-5", "cloudPlatforms": ["aws", "gcp"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["savedRemotely"], true);
        assert!(outcome["warnings"].as_array().unwrap().is_empty());

        let (_, fetched) = send(&app, "GET", &format!("/api/questionnaire/sessions/{id}"), None).await;
        assert_eq!(fetched["answers"]["yearsExperience"], "3-5");
    }

    #[tokio::test]
    async fn unknown_answer_key_is_422() {
        let app = app();
        let (_, created) = send(&app, "POST", "/api/questionnaire/sessions", None).await;
        let id = created["scope"].as_str().unwrap();

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/api/questionnaire/sessions/{id}/steps/1"),
            Some(serde_json::json!({"yearsExperiense": "3-5"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("yearsExperiense"));
    }

    #[tokio::test]
    async fn contact_step_is_not_an_answer_step() {
        let app = app();
        let (_, created) = send(&app, "POST", "/api/questionnaire/sessions", None).await;
        let id = created["scope"].as_str().unwrap();

        let (status, _) = send(
            &app,
            "PUT",
            &format!("/api/questionnaire/sessions/{id}/steps/4"),
            Some(serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn navigation_and_reset() {
        let app = app();
        let (_, created) = send(&app, "POST", "/api/questionnaire/sessions", None).await;
        let id = created["scope"].as_str().unwrap().to_string();
        let base = format!("/api/questionnaire/sessions/{id}");

        let (_, nav) = send(&app, "POST", &format!("{base}/advance"), None).await;
        assert_eq!(nav["moved"], true);
        assert_eq!(nav["status"]["currentStep"], 2);

        let (_, nav) = send(&app, "POST", &format!("{base}/retreat"), None).await;
        assert_eq!(nav["status"]["currentStep"], 1);

        let (status, reset) = send(&app, "DELETE", &base, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(reset["sessionId"], created["sessionId"]);
        assert_eq!(reset["scope"], id.as_str());
    }

    #[tokio::test]
    async fn submit_returns_report_notifications_and_status() {
        let app = app();
        let (_, created) = send(&app, "POST", "/api/questionnaire/sessions", None).await;
        let id = created["scope"].as_str().unwrap();

        let (status, body) = send(&app, "POST", &format!("/api/questionnaire/sessions/{id}/submit"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["report"]["writtenSteps"], serde_json::json!([1, 2, 3, 4]));
        assert!(body["notifications"].as_array().unwrap().is_empty());
        assert_eq!(body["status"]["submitted"], true);
        assert_eq!(body["status"]["viewPath"], "/thank-you");
    }
}
