use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use rcm_core::{AgentRequest, ExecutionMode};
use rcm_db::queries::agent_runs;

use crate::runtime::Runtime;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.into(),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// State and response types
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    runtime: Arc<Runtime>,
    /// Present when runs are stored durably.
    pool: Option<PgPool>,
}

impl AppState {
    pub fn new(runtime: Runtime, pool: Option<PgPool>) -> Self {
        Self {
            runtime: Arc::new(runtime),
            pool,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub mode: ExecutionMode,
    pub run_store: bool,
}

#[derive(Debug, Serialize)]
pub struct AgentsResponse {
    pub mode: ExecutionMode,
    pub agents: Vec<String>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/agents", get(list_agents))
        .route("/api/agents/{name}/invoke", post(invoke_agent))
        .route("/api/runs/{id}", get(get_run))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("rcm serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("rcm serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl+C; shutting down");
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        mode: state.runtime.mode(),
        run_store: state.pool.is_some(),
    })
}

async fn list_agents(State(state): State<AppState>) -> Json<AgentsResponse> {
    Json(AgentsResponse {
        mode: state.runtime.mode(),
        agents: state
            .runtime
            .agents()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}

async fn invoke_agent(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Result<axum::response::Response, AppError> {
    let harness = state
        .runtime
        .harness(&name)
        .ok_or_else(|| AppError::not_found(format!("agent {name} not found")))?;
    let request = AgentRequest::try_from(body).map_err(|e| AppError::bad_request(e.to_string()))?;

    let envelope = harness.handle(request).await;
    let status =
        StatusCode::from_u16(envelope.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((status, Json(envelope)).into_response())
}

async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    let pool = state
        .pool
        .as_ref()
        .ok_or_else(|| AppError::unavailable("run store is not configured"))?;
    let run = agent_runs::get_run(pool, id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("run {id} not found")))?;
    Ok(Json(run).into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use sqlx::PgPool;
    use tower::ServiceExt;

    use rcm_core::recorder::{LogRunRecorder, PgRunRecorder};
    use rcm_core::{AgentRegistry, Dispatch};
    use rcm_test_utils::{create_test_db, drop_test_db};

    use super::{AppState, build_router};
    use crate::runtime::Runtime;

    // -----------------------------------------------------------------------
    // HTTP helpers
    // -----------------------------------------------------------------------

    fn dev_state() -> AppState {
        let runtime = Runtime::new(
            AgentRegistry::standard(),
            Arc::new(LogRunRecorder),
            Dispatch::Development,
        );
        AppState::new(runtime, None)
    }

    fn pg_state(pool: &PgPool) -> AppState {
        let runtime = Runtime::new(
            AgentRegistry::standard(),
            Arc::new(PgRunRecorder::new(pool.clone())),
            Dispatch::Development,
        );
        AppState::new(runtime, Some(pool.clone()))
    }

    async fn get(state: AppState, uri: &str) -> axum::response::Response {
        build_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn post_json(state: AppState, uri: &str, body: serde_json::Value) -> axum::response::Response {
        build_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn health_reports_mode() {
        let resp = get(dev_state(), "/health").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["mode"], "development");
        assert_eq!(json["run_store"], false);
    }

    #[tokio::test]
    async fn list_agents_returns_all_five() {
        let resp = get(dev_state(), "/api/agents").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(
            json["agents"],
            json!([
                "appeal_letter",
                "coding",
                "denial_classifier",
                "eligibility",
                "submit_claim"
            ])
        );
    }

    #[tokio::test]
    async fn invoke_success_returns_200_envelope() {
        let resp = post_json(
            dev_state(),
            "/api/agents/denial_classifier/invoke",
            json!({"denialData": {"claimId": "CLM-1", "denialReason": "Invalid modifier"}}),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["agent_name"], "denial_classifier");
        assert_eq!(json["result"]["denial_category"], "coding_error");
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn invoke_rejection_returns_400_envelope() {
        let resp = post_json(dev_state(), "/api/agents/coding/invoke", json!({})).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Missing required field: patientData");
        assert!(json["run_id"].is_string());
    }

    #[tokio::test]
    async fn invoke_non_object_body_is_bad_request() {
        let resp = post_json(dev_state(), "/api/agents/coding/invoke", json!([1, 2])).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains("JSON object"));
    }

    #[tokio::test]
    async fn invoke_unknown_agent_is_404() {
        let resp = post_json(dev_state(), "/api/agents/triage/invoke", json!({})).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_run_without_store_is_503() {
        let id = uuid::Uuid::new_v4();
        let resp = get(dev_state(), &format!("/api/runs/{id}")).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn invoked_run_can_be_fetched() {
        let (pool, db_name) = create_test_db().await;

        let resp = post_json(
            pg_state(&pool),
            "/api/agents/submit_claim/invoke",
            json!({"claimData": {
                "claimId": "CLM-5",
                "patientId": "P-5",
                "providerId": "PRV-5",
                "serviceDate": "2024-07-01",
                "services": [{"procedureCode": "99213"}]
            }}),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let envelope = body_json(resp).await;
        let run_id = envelope["run_id"].as_str().unwrap().to_string();

        let resp = get(pg_state(&pool), &format!("/api/runs/{run_id}")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let run = body_json(resp).await;
        assert_eq!(run["status"], "completed");
        assert_eq!(run["agent_name"], "submit_claim");
        assert_eq!(run["output_data"], envelope["result"]);

        let missing = uuid::Uuid::new_v4();
        let resp = get(pg_state(&pool), &format!("/api/runs/{missing}")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        pool.close().await;
        drop_test_db(&db_name).await;
    }
}
