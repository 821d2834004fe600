//! HTTP surface: mock dispatch and the project management API.

use crate::config::{Endpoint, Project, Settings};
use crate::dispatcher::{Dispatcher, MockResponse, ProjectSnapshot};
use crate::error::ApiError;
use crate::store::{ProjectStore, ProjectUpdate};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, delete, get};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

/// URL prefix under which project mocks are served.
pub const MOCK_PREFIX: &str = "/mock/projects";

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub store: Arc<dyn ProjectStore>,
    pub dispatcher: Dispatcher,
    pub settings: Settings,
}

impl AppState {
    pub fn new(store: Arc<dyn ProjectStore>, settings: Settings) -> Self {
        Self {
            dispatcher: Dispatcher::new(&settings),
            store,
            settings,
        }
    }

    /// Public URL of an endpoint path within a project.
    pub fn public_url(&self, project_id: Uuid, path: &str) -> String {
        let base = self.settings.public_base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}{MOCK_PREFIX}/{project_id}/{path}")
    }
}

/// Build the application router.
pub fn build_app(state: SharedState) -> Router {
    let settings = state.settings.clone();

    let router = Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/stats", get(stats))
        .route("/api/v1/projects", get(list_projects).post(create_project))
        .route(
            "/api/v1/projects/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route(
            "/api/v1/projects/{id}/endpoints",
            get(list_endpoints).post(create_endpoint),
        )
        .route(
            "/api/v1/projects/{id}/endpoints/{endpoint_id}",
            get(get_endpoint).put(update_endpoint).delete(delete_endpoint),
        )
        .route(
            "/api/v1/projects/{id}/resources",
            get(list_resources).post(put_resource).put(put_resource),
        )
        .route(
            "/api/v1/projects/{id}/resources/{name}",
            delete(delete_resource),
        )
        .route("/mock/projects/{project_id}", any(handle_mock))
        .route("/mock/projects/{project_id}/", any(handle_mock))
        .route("/mock/projects/{project_id}/{*path}", any(handle_mock))
        .with_state(state);

    apply_layers(router, &settings)
}

/// Wrap a router in CORS, access tracing, and panic-to-500 handling.
pub fn apply_layers(router: Router, settings: &Settings) -> Router {
    router
        .layer(cors_layer(&settings.cors_origins))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

fn panic_response(_err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    ApiError::Internal("request handler panicked".to_string()).into_response()
}

fn success(status: StatusCode, message: &str, data: impl Serialize) -> Response {
    (
        status,
        Json(json!({ "status": "success", "message": message, "data": data })),
    )
        .into_response()
}

// ── Mock dispatch ───────────────────────────────────────────────

/// Split `/mock/projects/{id}/rest` into the project id and the relative path.
pub fn split_mock_path(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix(MOCK_PREFIX)?.strip_prefix('/')?;
    match rest.split_once('/') {
        Some((id, relative)) => Some((id, relative)),
        None => Some((rest, "")),
    }
}

async fn handle_mock(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
) -> Result<Response, ApiError> {
    let (project_id, path) = split_mock_path(uri.path()).ok_or(ApiError::MissingProjectContext)?;
    let project_id: Uuid = project_id
        .parse()
        .map_err(|_| ApiError::MissingProjectContext)?;

    let snapshot = load_project(&state, project_id).await?;
    let response = state
        .dispatcher
        .respond(&snapshot, method.as_str(), path)
        .await;

    Ok(mock_response(response))
}

fn mock_response(response: MockResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    match response.body {
        Some(body) => (status, Json(body)).into_response(),
        None => (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            axum::body::Body::empty(),
        )
            .into_response(),
    }
}

async fn load_project(state: &AppState, id: Uuid) -> Result<Arc<ProjectSnapshot>, ApiError> {
    state
        .store
        .get_project(id)
        .await
        .ok_or_else(|| ApiError::NotFound("No projects found.".to_string()))
}

// ── Health & stats ──────────────────────────────────────────────

async fn health() -> &'static str {
    "ok"
}

async fn stats(State(state): State<SharedState>) -> Response {
    success(StatusCode::OK, "Dispatch statistics", state.dispatcher.stats())
}

// ── Projects ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListQuery {
    owner: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectBody {
    project: Project,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectPatch {
    #[serde(default, rename = "projectName")]
    name: Option<String>,
    /// Absent leaves the body unchanged; `null` restores the default.
    #[serde(default, deserialize_with = "present")]
    not_found_response: Option<Option<Value>>,
}

/// Distinguish an explicit `null` from a missing field.
fn present<'de, D>(deserializer: D) -> Result<Option<Option<Value>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<Value>::deserialize(deserializer).map(Some)
}

async fn list_projects(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let projects: Vec<Project> = state
        .store
        .list_projects(query.owner.as_deref())
        .await
        .iter()
        .map(|snapshot| snapshot.project().clone())
        .collect();

    success(StatusCode::OK, "Projects found", json!({ "projects": projects }))
}

async fn create_project(
    State(state): State<SharedState>,
    Json(body): Json<ProjectBody>,
) -> Result<Response, ApiError> {
    let snapshot = state.store.create_project(body.project).await?;
    let project = snapshot.project();

    let endpoints: Vec<String> = project
        .endpoints
        .iter()
        .map(|endpoint| state.public_url(project.id, &endpoint.path))
        .collect();

    Ok(success(
        StatusCode::CREATED,
        "Mock api created",
        json!({
            "projectId": project.id,
            "projectName": project.name,
            "endpoints": endpoints,
        }),
    ))
}

async fn get_project(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let snapshot = load_project(&state, id).await?;
    Ok(success(StatusCode::OK, "Project found", snapshot.project()))
}

async fn update_project(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<ProjectPatch>,
) -> Result<Response, ApiError> {
    let update = ProjectUpdate {
        name: patch.name,
        not_found_response: patch.not_found_response,
    };
    let snapshot = state.store.update_project(id, update).await?;
    Ok(success(StatusCode::OK, "Project updated", snapshot.project()))
}

async fn delete_project(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    state.store.delete_project(id).await?;
    Ok(success(StatusCode::OK, "Project deleted", json!({})))
}

// ── Endpoints ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EndpointBody {
    endpoint: Endpoint,
}

async fn list_endpoints(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let snapshot = load_project(&state, id).await?;
    Ok(success(
        StatusCode::OK,
        "All API Endpoints found",
        json!({ "endpoints": snapshot.project().endpoints }),
    ))
}

async fn get_endpoint(
    State(state): State<SharedState>,
    Path((id, endpoint_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ApiError> {
    let snapshot = load_project(&state, id).await?;
    let endpoint = snapshot
        .project()
        .endpoints
        .iter()
        .find(|e| e.id == endpoint_id)
        .ok_or_else(|| ApiError::NotFound("No projects or endpoints found.".to_string()))?;
    Ok(success(StatusCode::OK, "Endpoint found", endpoint))
}

async fn create_endpoint(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(body): Json<EndpointBody>,
) -> Result<Response, ApiError> {
    let endpoint = state.store.create_endpoint(id, body.endpoint).await?;
    Ok(success(
        StatusCode::CREATED,
        "New Endpoint created",
        json!({ "endpoint": endpoint }),
    ))
}

async fn update_endpoint(
    State(state): State<SharedState>,
    Path((id, endpoint_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<EndpointBody>,
) -> Result<Response, ApiError> {
    let endpoint = state
        .store
        .update_endpoint(id, endpoint_id, body.endpoint)
        .await?;
    Ok(success(
        StatusCode::OK,
        "Endpoint updated",
        json!({ "endpoint": endpoint }),
    ))
}

async fn delete_endpoint(
    State(state): State<SharedState>,
    Path((id, endpoint_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ApiError> {
    state.store.delete_endpoint(id, endpoint_id).await?;
    Ok(success(StatusCode::OK, "Endpoint deleted", json!({})))
}

// ── Resources ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ResourceBody {
    resource: NamedResource,
}

#[derive(Debug, Deserialize)]
struct NamedResource {
    name: String,
    data: Vec<Value>,
}

async fn list_resources(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let snapshot = load_project(&state, id).await?;
    Ok(success(
        StatusCode::OK,
        "Resources found",
        json!({ "resources": snapshot.project().resources }),
    ))
}

async fn put_resource(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ResourceBody>,
) -> Result<Response, ApiError> {
    let resources = state
        .store
        .put_resource(id, &body.resource.name, body.resource.data)
        .await?;
    Ok(success(
        StatusCode::CREATED,
        "Resource saved",
        json!({ "resources": resources }),
    ))
}

async fn delete_resource(
    State(state): State<SharedState>,
    Path((id, name)): Path<(Uuid, String)>,
) -> Result<Response, ApiError> {
    let resources = state.store.delete_resource(id, &name).await?;
    Ok(success(
        StatusCode::OK,
        "Resource deleted successfully",
        json!({ "resources": resources }),
    ))
}
