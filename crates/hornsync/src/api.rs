use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::horn::HornState;
use crate::probe;
use crate::probe::ProbeResult;
use crate::store::StoreError;
use crate::store::TwinDocument;
use crate::store::TwinStore;
use crate::sync::Side;
use crate::sync::SyncError;
use crate::sync::SyncMode;
use crate::sync::SyncOutcome;
use crate::sync::Synchronizer;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
    thing_id: String,
    store: &'static str,
}

/// Response for the /v1/health endpoint
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    store: ProbeResult,
    mode: SyncMode,
}

#[derive(Deserialize)]
struct StateRequest {
    state: HornState,
}

#[derive(Deserialize)]
struct AutoSyncRequest {
    enabled: bool,
}

#[derive(Serialize)]
struct AutoSyncResponse {
    mode: SyncMode,
}

/// Body of every synchronizer operation response
#[derive(Debug, Serialize)]
struct OutcomeResponse {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<HornState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pushed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    store_ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hardware_ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stale: Option<Side>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// An error rendered as `{"error": "..."}` with a status code
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorResponse { error: self.1 })).into_response()
    }
}

fn store_error_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::AlreadyExists(_) => StatusCode::CONFLICT,
        StoreError::InvalidDocument(_) => StatusCode::BAD_REQUEST,
        StoreError::Io { .. } | StoreError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        StoreError::Http(_) => StatusCode::BAD_GATEWAY,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError(store_error_status(&e), e.to_string())
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        ApiError(sync_error_status(&e), e.to_string())
    }
}

fn sync_error_status(e: &SyncError) -> StatusCode {
    match e {
        SyncError::NotConnected | SyncError::AlreadyConnected | SyncError::UnknownHardwareState => {
            StatusCode::CONFLICT
        }
        SyncError::UnknownTwinState { .. } => StatusCode::NOT_FOUND,
        SyncError::Connection(_) | SyncError::Channel(_) => StatusCode::BAD_GATEWAY,
        SyncError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
        SyncError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn outcome_response(outcome: SyncOutcome) -> (StatusCode, Json<OutcomeResponse>) {
    let empty = OutcomeResponse {
        outcome: "",
        state: None,
        pushed: None,
        store_ok: None,
        hardware_ok: None,
        stale: None,
        error: None,
    };

    match outcome {
        SyncOutcome::InSync { state, pushed } => (
            StatusCode::OK,
            Json(OutcomeResponse {
                outcome: "in_sync",
                state: Some(state),
                pushed: Some(pushed),
                ..empty
            }),
        ),
        SyncOutcome::Partial(partial) => (
            StatusCode::MULTI_STATUS,
            Json(OutcomeResponse {
                outcome: "partial",
                state: Some(partial.state),
                store_ok: Some(partial.store_ok()),
                hardware_ok: Some(partial.hardware_ok()),
                stale: Some(partial.stale),
                error: Some(partial.cause.to_string()),
                ..empty
            }),
        ),
        SyncOutcome::Failed(e) => (
            sync_error_status(&e),
            Json(OutcomeResponse {
                outcome: "failed",
                error: Some(e.to_string()),
                ..empty
            }),
        ),
    }
}

/// Shared application state
pub struct AppState {
    version: &'static str,
    store: Arc<dyn TwinStore>,
    sync: Arc<Synchronizer>,
}

impl AppState {
    pub fn new(store: Arc<dyn TwinStore>, sync: Arc<Synchronizer>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            store,
            sync,
        }
    }
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
            thing_id: state.sync.thing_id().to_string(),
            store: state.store.kind(),
        }),
    )
}

/// Handler for GET /v1/health
#[tracing::instrument(skip(state))]
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = probe::probe_store(state.store.as_ref(), std::time::Duration::from_secs(5)).await;
    let mode = state.sync.mode().await;
    let (code, status) = if store.is_failed() {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    } else {
        (StatusCode::OK, "ok")
    };
    (code, Json(HealthResponse { status, store, mode }))
}

/// Handler for GET /v1/things
#[tracing::instrument(skip(state))]
async fn list_things(State(state): State<Arc<AppState>>) -> Result<Json<Vec<TwinDocument>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

/// Handler for POST /v1/things
#[tracing::instrument(skip(state, body))]
async fn create_thing(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let doc = TwinDocument::from_value(body)?;
    let doc = state.store.insert(doc).await?;
    tracing::info!("Created thing {}", doc.thing_id());
    Ok((StatusCode::CREATED, Json(doc)))
}

/// Handler for GET /v1/things/:thing_id
#[tracing::instrument(skip(state))]
async fn get_thing(
    State(state): State<Arc<AppState>>,
    Path(thing_id): Path<String>,
) -> Result<Json<TwinDocument>, ApiError> {
    state
        .store
        .get(&thing_id)
        .await?
        .map(Json)
        .ok_or_else(|| StoreError::NotFound(thing_id).into())
}

/// Handler for PUT /v1/things/:thing_id
#[tracing::instrument(skip(state, body))]
async fn replace_thing(
    State(state): State<Arc<AppState>>,
    Path(thing_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<TwinDocument>, ApiError> {
    let doc = TwinDocument::from_value(body)?;
    Ok(Json(state.store.replace(&thing_id, doc).await?))
}

/// Handler for PATCH /v1/things/:thing_id
#[tracing::instrument(skip(state, patch))]
async fn merge_thing(
    State(state): State<Arc<AppState>>,
    Path(thing_id): Path<String>,
    Json(patch): Json<Value>,
) -> Result<Json<TwinDocument>, ApiError> {
    Ok(Json(state.store.merge(&thing_id, patch).await?))
}

/// Handler for DELETE /v1/things/:thing_id
#[tracing::instrument(skip(state))]
async fn delete_thing(
    State(state): State<Arc<AppState>>,
    Path(thing_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete(&thing_id).await?;
    tracing::info!("Deleted thing {}", thing_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for PUT /v1/things/:thing_id/horn
///
/// Store-only write; the hardware is left to the synchronizer.
#[tracing::instrument(skip(state, body))]
async fn set_thing_horn(
    State(state): State<Arc<AppState>>,
    Path(thing_id): Path<String>,
    Json(body): Json<StateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.store.set_horn_state(&thing_id, body.state).await?;
    Ok(Json(status))
}

/// Handler for GET /v1/horn
#[tracing::instrument(skip(state))]
async fn horn_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.sync.status().await)
}

/// Handler for POST /v1/horn/twin
#[tracing::instrument(skip(state, body))]
async fn set_twin(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StateRequest>,
) -> impl IntoResponse {
    outcome_response(state.sync.set_twin_and_push(body.state).await)
}

/// Handler for POST /v1/horn/hardware
#[tracing::instrument(skip(state, body))]
async fn set_hardware(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StateRequest>,
) -> impl IntoResponse {
    outcome_response(state.sync.set_hardware_and_pull(body.state).await)
}

/// Handler for POST /v1/horn/reconcile
#[tracing::instrument(skip(state))]
async fn reconcile(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    outcome_response(state.sync.reconcile().await)
}

/// Handler for POST /v1/horn/adopt
#[tracing::instrument(skip(state))]
async fn adopt(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    outcome_response(state.sync.adopt_hardware_state().await)
}

/// Handler for POST /v1/connection
#[tracing::instrument(skip(state))]
async fn connect(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    outcome_response(state.sync.connect().await)
}

/// Handler for DELETE /v1/connection
#[tracing::instrument(skip(state))]
async fn disconnect(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.sync.disconnect().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for PUT /v1/auto-sync
#[tracing::instrument(skip(state, body))]
async fn auto_sync(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AutoSyncRequest>,
) -> Result<Json<AutoSyncResponse>, ApiError> {
    if body.enabled {
        state.sync.enable_auto_sync().await?;
    } else {
        state.sync.disable_auto_sync().await;
    }
    Ok(Json(AutoSyncResponse {
        mode: state.sync.mode().await,
    }))
}

/// Create the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/health", get(health))
        .route("/v1/things", get(list_things).post(create_thing))
        .route(
            "/v1/things/:thing_id",
            get(get_thing)
                .put(replace_thing)
                .patch(merge_thing)
                .delete(delete_thing),
        )
        .route("/v1/things/:thing_id/horn", put(set_thing_horn))
        .route("/v1/horn", get(horn_status))
        .route("/v1/horn/twin", post(set_twin))
        .route("/v1/horn/hardware", post(set_hardware))
        .route("/v1/horn/reconcile", post(reconcile))
        .route("/v1/horn/adopt", post(adopt))
        .route("/v1/connection", post(connect).delete(disconnect))
        .route("/v1/auto-sync", put(auto_sync))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// Binds to `listen:port` and serves until `shutdown_rx` fires.
pub async fn serve(
    listen: &str,
    port: u16,
    state: AppState,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(Arc::new(state));

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
