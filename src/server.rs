//! HTTP API.
//!
//! Exposes the catalog views, the payload builder and the job runner as a
//! JSON API for browser-based assignment forms.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/models/{key}/families` | Sorted family names |
//! | `GET`  | `/models/{key}/types?family=` | Sorted type names of a family |
//! | `POST` | `/models/{key}/options` | Form option lists (never fails) |
//! | `POST` | `/models/{key}/colors` | External-id → color map |
//! | `POST` | `/models/{key}/invalidate` | Drop the caller's cached catalog |
//! | `POST` | `/payload` | Build the job request document |
//! | `POST` | `/jobs` | Run a job to completion |
//!
//! # Credentials
//!
//! The bearer token comes from the request's `Authorization` header, or the
//! configured environment variable when the header is absent. The data
//! region comes from the `x-ads-region` header, or `[query].region`.
//!
//! The catalog cache is shared by all requests but partitioned by token, so
//! a cached model is only served to the credential that fetched it. Any
//! other token goes upstream and is checked there.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "validation_error", "message": "at least one assignment with a parameter is required" } }
//! ```
//!
//! `validation_error` (400), `unauthorized` (401), `unsupported_version` (422),
//! `transport_error` / `remote_query_error` / `invalid_response` (502),
//! `job_execution_error` / `output_error` (500).

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::cache::CatalogCache;
use crate::config::Config;
use crate::engine::WorkItem;
use crate::error::Error;
use crate::job::{JobOrchestrator, JobSummary, PollPolicy, TokioClock};
use crate::models::{AssignmentRow, JobRequest, ParameterRow, RawAssignmentRow};
use crate::options::parameter_options;
use crate::payload::build_validated_job_request;
use crate::progress::NoProgress;
use crate::query::REGION_HEADER;
use crate::session::{new_cache, Session};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    /// One catalog cache for every request, partitioned by token.
    cache: Arc<CatalogCache>,
}

/// Starts the HTTP server on `[server].bind`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let cache = new_cache(config)?;
    let app = router(Arc::new(config.clone()), cache);

    tracing::info!(%bind_addr, "server listening");
    println!("Listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the API router over a shared catalog cache.
pub fn router(config: Arc<Config>, cache: Arc<CatalogCache>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/models/{key}/families", get(handle_families))
        .route("/models/{key}/types", get(handle_types))
        .route("/models/{key}/options", post(handle_options))
        .route("/models/{key}/colors", post(handle_colors))
        .route("/models/{key}/invalidate", post(handle_invalidate))
        .route("/payload", post(handle_payload))
        .route("/jobs", post(handle_job))
        .layer(cors)
        .with_state(AppState { config, cache })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::UnsupportedVersion { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Transport(_) | Error::RemoteQuery(_) | Error::InvalidResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
            Error::JobExecution { .. } | Error::Output(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!(code = err.code(), error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: message.into(),
    }
}

/// Builds the per-request session from the request headers.
fn session(state: &AppState, headers: &HeaderMap) -> Result<Session, AppError> {
    let header_token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    let token = match header_token {
        Some(token) => token,
        None => state
            .config
            .auth
            .token()
            .map_err(|e| unauthorized(e.to_string()))?,
    };

    let region = headers
        .get(REGION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|r| !r.is_empty())
        .unwrap_or(state.config.query.region.as_str())
        .to_string();

    Ok(Session::new(
        state.config.clone(),
        token,
        region,
        state.cache.clone(),
    ))
}

fn parse_rows(rows: Vec<RawAssignmentRow>) -> Result<Vec<AssignmentRow>, AppError> {
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            AssignmentRow::parse(row).map_err(|e| {
                AppError::from(Error::Validation(format!("assignments[{}]: {}", i, e)))
            })
        })
        .collect()
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Catalog views ============

#[derive(Serialize)]
struct FamiliesResponse {
    families: Vec<String>,
}

async fn handle_families(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Result<Json<FamiliesResponse>, AppError> {
    let session = session(&state, &headers)?;
    let catalog = session.catalog(&key).await?;
    Ok(Json(FamiliesResponse {
        families: catalog.distinct_families(),
    }))
}

#[derive(Deserialize)]
struct TypesQuery {
    family: String,
}

#[derive(Serialize)]
struct TypesResponse {
    family: String,
    types: Vec<String>,
}

async fn handle_types(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Query(query): Query<TypesQuery>,
) -> Result<Json<TypesResponse>, AppError> {
    let session = session(&state, &headers)?;
    let catalog = session.catalog(&key).await?;
    Ok(Json(TypesResponse {
        types: catalog.distinct_types(&query.family),
        family: query.family,
    }))
}

#[derive(Deserialize)]
struct SheetBody {
    #[serde(default)]
    parameters: Vec<ParameterRow>,
    #[serde(default)]
    assignments: Vec<RawAssignmentRow>,
}

#[derive(Serialize)]
struct OptionsResponse {
    families: Vec<String>,
    /// Type options per assignment row, in row order.
    types: Vec<Vec<String>>,
    parameters: Vec<String>,
}

/// Option lists for redrawing a form. Catalog failures degrade to empty
/// lists instead of an error response.
async fn handle_options(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Json(body): Json<SheetBody>,
) -> Result<Json<OptionsResponse>, AppError> {
    let session = session(&state, &headers)?;
    let rows = parse_rows(body.assignments)?;
    Ok(Json(OptionsResponse {
        families: session.family_options(&key).await,
        types: session.type_options(&key, &rows).await,
        parameters: parameter_options(&body.parameters),
    }))
}

async fn handle_colors(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Json(body): Json<SheetBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = session(&state, &headers)?;
    let rows = parse_rows(body.assignments)?;
    let map = session.color_map(&key, &rows, &body.parameters).await?;
    Ok(Json(serde_json::json!({
        "colors": map.to_viewer_json(),
        "unmatched_types": map.unmatched_types,
    })))
}

/// Drops the caller's own cached catalog. Other callers' entries stay.
async fn handle_invalidate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = session(&state, &headers)?;
    let removed = session.invalidate(&key).await;
    Ok(Json(serde_json::json!({ "invalidated": removed })))
}

// ============ POST /payload ============

async fn handle_payload(Json(body): Json<SheetBody>) -> Result<Json<JobRequest>, AppError> {
    let rows = parse_rows(body.assignments)?;
    Ok(Json(build_validated_job_request(&rows)?))
}

// ============ POST /jobs ============

#[derive(Deserialize)]
struct JobBody {
    /// Display name of the source model, e.g. `Tower.rvt`.
    display_name: String,
    input_url: String,
    output_destination: String,
    #[serde(default)]
    version: Option<String>,
    /// Model-derivative manifest used to detect the version.
    #[serde(default)]
    manifest: Option<serde_json::Value>,
    /// Model URN; its manifest is fetched when no version or manifest is given.
    #[serde(default)]
    urn: Option<String>,
    #[serde(default)]
    assignments: Vec<RawAssignmentRow>,
}

/// Submits a job and holds the request open until it finishes.
async fn handle_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<JobBody>,
) -> Result<Json<JobSummary>, AppError> {
    let session = session(&state, &headers)?;
    let rows = parse_rows(body.assignments)?;
    let request = build_validated_job_request(&rows)?;

    let activity = session
        .resolve_activity(
            body.version.as_deref(),
            body.manifest.as_ref(),
            body.urn.as_deref(),
        )
        .await?;

    let work = WorkItem::new(
        activity,
        request,
        &body.input_url,
        &body.display_name,
        &body.output_destination,
    );
    let engine = session.engine()?;
    let clock = TokioClock::new();
    let orchestrator = JobOrchestrator::new(
        &engine,
        &clock,
        &NoProgress,
        PollPolicy::from_config(&session.config().automation),
    );

    Ok(Json(orchestrator.run(&work).await?))
}
