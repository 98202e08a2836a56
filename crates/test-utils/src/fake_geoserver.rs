//! In-process fake of the GeoServer REST surface.
//!
//! Implements just enough catalog behaviour to drive the client and the
//! publication workflow end to end:
//!
//! - workspaces and coverage stores, with 409 on duplicates
//! - granule harvesting from init zips, uploads and external `file://` paths
//! - the granule index as GeoJSON
//! - time dimension and GeoWebCache layer descriptors
//! - basic-auth checking and a log of every request received
//!
//! All state is in memory and lives as long as the [`FakeGeoServer`].

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Path as UrlPath, Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const FAKE_USERNAME: &str = "admin";
pub const FAKE_PASSWORD: &str = "geoserver";

/// `Basic base64("admin:geoserver")`
const FAKE_AUTHORIZATION: &str = "Basic YWRtaW46Z2Vvc2VydmVy";

/// One request as seen by the fake server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
}

impl RecordedRequest {
    pub fn is_write(&self) -> bool {
        self.method != "GET" && self.method != "HEAD"
    }
}

#[derive(Debug, Default)]
struct StoreState {
    layer_id: String,
    granules: BTreeMap<String, String>,
    next_granule: u32,
    time_dimension: Option<String>,
    time_dimension_updates: u32,
    time_cache: Option<String>,
    time_cache_updates: u32,
}

impl StoreState {
    fn add_granule(&mut self, store: &str, location: String) {
        if self.granules.values().any(|l| *l == location) {
            return;
        }
        self.next_granule += 1;
        self.granules
            .insert(format!("{}.{}", store, self.next_granule), location);
    }
}

#[derive(Debug, Default)]
struct WorkspaceState {
    stores: BTreeMap<String, StoreState>,
}

#[derive(Debug, Default)]
struct CatalogState {
    workspaces: BTreeMap<String, WorkspaceState>,
    requests: Vec<RecordedRequest>,
    next_layer: u32,
    resets: u32,
    reloads: u32,
    /// Answer duplicate workspaces with 401 like older catalog releases.
    legacy_duplicate_status: bool,
    /// Coverage updates still to be answered with 500.
    failing_coverage_updates: u32,
    /// Another publisher wins every create: the resource is created and the
    /// caller gets the duplicate answer.
    rival_creates: bool,
}

impl CatalogState {
    fn store_mut(&mut self, ws: &str, store: &str) -> Option<&mut StoreState> {
        self.workspaces.get_mut(ws)?.stores.get_mut(store)
    }

    fn create_store(&mut self, ws: &str, store: &str) -> Option<&mut StoreState> {
        self.next_layer += 1;
        let layer_id = format!("LayerInfoImpl--fake:{:04}", self.next_layer);
        let workspace = self.workspaces.get_mut(ws)?;
        Some(workspace.stores.entry(store.to_string()).or_insert_with(|| StoreState {
            layer_id,
            ..StoreState::default()
        }))
    }
}

type Shared = Arc<Mutex<CatalogState>>;

fn lock(state: &Shared) -> MutexGuard<'_, CatalogState> {
    state.lock().expect("fake catalog state poisoned")
}

/// A running fake catalog bound to an ephemeral localhost port.
pub struct FakeGeoServer {
    base_url: String,
    state: Shared,
    handle: JoinHandle<()>,
}

impl FakeGeoServer {
    /// Bind to `127.0.0.1:0` and serve on the current runtime.
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(CatalogState::default()));
        let app = router(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake catalog");
        let addr = listener.local_addr().expect("fake catalog address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            base_url: format!("http://{}/geoserver", addr),
            state,
            handle,
        }
    }

    /// Service URL including the `/geoserver` context path.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state).requests.clone()
    }

    /// Requests that could have changed catalog state.
    pub fn write_requests(&self) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.is_write()).collect()
    }

    pub fn clear_requests(&self) {
        lock(&self.state).requests.clear();
    }

    pub fn workspace_names(&self) -> Vec<String> {
        lock(&self.state).workspaces.keys().cloned().collect()
    }

    pub fn store_names(&self, ws: &str) -> Vec<String> {
        lock(&self.state)
            .workspaces
            .get(ws)
            .map(|w| w.stores.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn granule_locations(&self, ws: &str, store: &str) -> Vec<String> {
        lock(&self.state)
            .store_mut(ws, store)
            .map(|s| s.granules.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn time_dimension_updates(&self, ws: &str, store: &str) -> u32 {
        lock(&self.state)
            .store_mut(ws, store)
            .map(|s| s.time_dimension_updates)
            .unwrap_or(0)
    }

    pub fn time_dimension(&self, ws: &str, store: &str) -> Option<String> {
        lock(&self.state)
            .store_mut(ws, store)
            .and_then(|s| s.time_dimension.clone())
    }

    pub fn time_cache_updates(&self, ws: &str, store: &str) -> u32 {
        lock(&self.state)
            .store_mut(ws, store)
            .map(|s| s.time_cache_updates)
            .unwrap_or(0)
    }

    pub fn time_cache(&self, ws: &str, store: &str) -> Option<String> {
        lock(&self.state)
            .store_mut(ws, store)
            .and_then(|s| s.time_cache.clone())
    }

    pub fn resets(&self) -> u32 {
        lock(&self.state).resets
    }

    pub fn reloads(&self) -> u32 {
        lock(&self.state).reloads
    }

    /// Seed a workspace without going through the REST API.
    pub fn add_workspace(&self, ws: &str) {
        lock(&self.state)
            .workspaces
            .entry(ws.to_string())
            .or_default();
    }

    /// Seed a store (creating its workspace if needed).
    pub fn add_store(&self, ws: &str, store: &str) {
        let mut state = lock(&self.state);
        state.workspaces.entry(ws.to_string()).or_default();
        state.create_store(ws, store);
    }

    /// Seed a granule into an existing store.
    pub fn add_granule(&self, ws: &str, store: &str, location: &str) {
        if let Some(s) = lock(&self.state).store_mut(ws, store) {
            s.add_granule(store, location.to_string());
        }
    }

    pub fn set_legacy_duplicate_status(&self, enabled: bool) {
        lock(&self.state).legacy_duplicate_status = enabled;
    }

    /// Answer the next `count` coverage (time dimension) updates with 500.
    pub fn fail_coverage_updates(&self, count: u32) {
        lock(&self.state).failing_coverage_updates = count;
    }

    /// Make every workspace and store create lose a race: the resource
    /// appears as if another publisher created it and the request gets the
    /// duplicate answer.
    pub fn set_rival_creates(&self, enabled: bool) {
        lock(&self.state).rival_creates = enabled;
    }
}

impl Drop for FakeGeoServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn router(state: Shared) -> Router {
    let store = "/rest/workspaces/:ws/coveragestores/:store";
    let coverage = "/rest/workspaces/:ws/coveragestores/:store/coverages/:coverage";

    let api = Router::new()
        .route("/rest/reset", post(reset))
        .route("/rest/reload", post(reload))
        .route("/rest/workspaces", get(list_workspaces).post(create_workspace))
        .route("/rest/workspaces/:ws", delete(delete_workspace))
        .route("/rest/layers", get(list_all_layers))
        .route("/rest/workspaces/:ws/layers", get(list_workspace_layers))
        .route("/rest/workspaces/:ws/coveragestores", get(list_stores))
        .route(store, delete(delete_store))
        .route("/rest/coveragestores/:store", delete(delete_store_anywhere))
        .route(
            &format!("{}/file.imagemosaic", store),
            put(create_store).post(harvest_file),
        )
        .route(
            &format!("{}/external.imagemosaic", store),
            post(harvest_external),
        )
        .route(coverage, put(configure_coverage).delete(delete_coverage))
        .route(
            &format!("{}/index/granules.json", coverage),
            get(list_granules),
        )
        .route(
            &format!("{}/index/granules/:granule", coverage),
            delete(delete_granule),
        )
        .route(
            "/gwc/rest/layers/:layer",
            get(cached_layer).put(replace_cached_layer),
        )
        .with_state(state.clone());

    Router::new()
        .nest("/geoserver", api)
        .layer(middleware::from_fn_with_state(state, guard))
}

async fn guard(State(state): State<Shared>, request: Request, next: Next) -> Response {
    lock(&state).requests.push(RecordedRequest {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
    });

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(FAKE_AUTHORIZATION);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "HTTP 401 Unauthorized").into_response();
    }

    next.run(request).await
}

fn not_found(what: &str) -> Response {
    (StatusCode::NOT_FOUND, format!("No such {}", what)).into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, message.into()).into_response()
}

/// GeoServer renders empty collections as `""`.
fn listing(outer: &str, inner: &str, names: &[String]) -> Value {
    let mut envelope = Map::new();
    if names.is_empty() {
        envelope.insert(outer.to_string(), Value::String(String::new()));
    } else {
        let items: Vec<Value> = names
            .iter()
            .map(|name| json!({ "name": name, "href": format!("{}.json", name) }))
            .collect();
        let mut list = Map::new();
        list.insert(inner.to_string(), Value::Array(items));
        envelope.insert(outer.to_string(), Value::Object(list));
    }
    Value::Object(envelope)
}

fn is_raster(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".tif") || lower.ends_with(".tiff")
}

fn zip_rasters(body: &[u8]) -> Result<Vec<String>, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(body)).map_err(|e| e.to_string())?;
    let mut names = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| e.to_string())?;
        let mut sink = Vec::new();
        entry.read_to_end(&mut sink).map_err(|e| e.to_string())?;
        if is_raster(entry.name()) {
            names.push(entry.name().to_string());
        }
    }
    Ok(names)
}

// ============================================================================
// Handlers
// ============================================================================

async fn reset(State(state): State<Shared>) -> Response {
    lock(&state).resets += 1;
    StatusCode::OK.into_response()
}

async fn reload(State(state): State<Shared>) -> Response {
    lock(&state).reloads += 1;
    StatusCode::OK.into_response()
}

async fn list_workspaces(State(state): State<Shared>) -> Response {
    let names: Vec<String> = lock(&state).workspaces.keys().cloned().collect();
    Json(listing("workspaces", "workspace", &names)).into_response()
}

async fn create_workspace(State(state): State<Shared>, body: String) -> Response {
    let name = body
        .split_once("<name>")
        .and_then(|(_, rest)| rest.split_once("</name>"))
        .map(|(name, _)| name.trim().to_string());
    let Some(name) = name.filter(|n| !n.is_empty()) else {
        return bad_request("workspace name missing");
    };

    let mut state = lock(&state);
    if state.rival_creates {
        state.workspaces.entry(name.clone()).or_default();
    }
    if state.workspaces.contains_key(&name) {
        let status = if state.legacy_duplicate_status {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::CONFLICT
        };
        return (status, format!("Workspace '{}' already exists", name)).into_response();
    }
    state.workspaces.insert(name.clone(), WorkspaceState::default());
    (StatusCode::CREATED, name).into_response()
}

async fn delete_workspace(State(state): State<Shared>, UrlPath(ws): UrlPath<String>) -> Response {
    match lock(&state).workspaces.remove(&ws) {
        Some(_) => StatusCode::OK.into_response(),
        None => not_found("workspace"),
    }
}

async fn list_all_layers(State(state): State<Shared>) -> Response {
    let state = lock(&state);
    let names: Vec<String> = state
        .workspaces
        .iter()
        .flat_map(|(ws, w)| w.stores.keys().map(move |s| format!("{}:{}", ws, s)))
        .collect();
    Json(listing("layers", "layer", &names)).into_response()
}

async fn list_workspace_layers(
    State(state): State<Shared>,
    UrlPath(ws): UrlPath<String>,
) -> Response {
    let state = lock(&state);
    let Some(workspace) = state.workspaces.get(&ws) else {
        return not_found("workspace");
    };
    let names: Vec<String> = workspace.stores.keys().cloned().collect();
    Json(listing("layers", "layer", &names)).into_response()
}

async fn list_stores(State(state): State<Shared>, UrlPath(ws): UrlPath<String>) -> Response {
    let state = lock(&state);
    let Some(workspace) = state.workspaces.get(&ws) else {
        return not_found("workspace");
    };
    let names: Vec<String> = workspace.stores.keys().cloned().collect();
    Json(listing("coverageStores", "coverageStore", &names)).into_response()
}

async fn delete_store(
    State(state): State<Shared>,
    UrlPath((ws, store)): UrlPath<(String, String)>,
) -> Response {
    let mut state = lock(&state);
    match state.workspaces.get_mut(&ws).and_then(|w| w.stores.remove(&store)) {
        Some(_) => StatusCode::OK.into_response(),
        None => not_found("coverage store"),
    }
}

async fn delete_store_anywhere(
    State(state): State<Shared>,
    UrlPath(store): UrlPath<String>,
) -> Response {
    let mut state = lock(&state);
    let removed = state
        .workspaces
        .values_mut()
        .any(|w| w.stores.remove(&store).is_some());
    if removed {
        StatusCode::OK.into_response()
    } else {
        not_found("coverage store")
    }
}

async fn create_store(
    State(state): State<Shared>,
    UrlPath((ws, store)): UrlPath<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    if params.get("coverageName").map(String::as_str) != Some(store.as_str()) {
        return bad_request("coverageName must match the store name");
    }
    let rasters = match zip_rasters(&body) {
        Ok(rasters) => rasters,
        Err(e) => return bad_request(format!("invalid zip: {}", e)),
    };

    let mut state = lock(&state);
    let Some(workspace) = state.workspaces.get(&ws) else {
        return not_found("workspace");
    };
    if workspace.stores.contains_key(&store) {
        return (
            StatusCode::CONFLICT,
            format!("Store '{}' already exists", store),
        )
            .into_response();
    }
    let rival = state.rival_creates;
    let Some(created) = state.create_store(&ws, &store) else {
        return not_found("workspace");
    };
    for raster in rasters {
        created.add_granule(&store, format!("{}/{}/{}", ws, store, raster));
    }
    if rival {
        return (
            StatusCode::CONFLICT,
            format!("Store '{}' already exists", store),
        )
            .into_response();
    }
    StatusCode::CREATED.into_response()
}

async fn harvest_file(
    State(state): State<Shared>,
    UrlPath((ws, store)): UrlPath<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let rasters = if content_type.starts_with("application/zip") {
        match zip_rasters(&body) {
            Ok(rasters) => rasters,
            Err(e) => return bad_request(format!("invalid zip: {}", e)),
        }
    } else {
        match params.get("filename") {
            Some(name) if !body.is_empty() => vec![name.clone()],
            _ => return bad_request("upload needs a filename and a body"),
        }
    };

    let mut state = lock(&state);
    let Some(target) = state.store_mut(&ws, &store) else {
        return not_found("coverage store");
    };
    for raster in rasters {
        target.add_granule(&store, format!("{}/{}/{}", ws, store, raster));
    }
    StatusCode::ACCEPTED.into_response()
}

async fn harvest_external(
    State(state): State<Shared>,
    UrlPath((ws, store)): UrlPath<(String, String)>,
    body: String,
) -> Response {
    let Some(location) = body.trim().strip_prefix("file://") else {
        return bad_request("external publication needs a file:// url");
    };
    let path = Path::new(location);
    if !path.exists() {
        return bad_request(format!("file not found: {}", location));
    }

    let mut locations = Vec::new();
    if path.is_dir() {
        if let Ok(entries) = std::fs::read_dir(path) {
            for entry in entries.flatten() {
                let p = entry.path();
                if is_raster(&p.to_string_lossy()) {
                    locations.push(p.to_string_lossy().into_owned());
                }
            }
        }
    } else {
        locations.push(location.to_string());
    }

    let mut state = lock(&state);
    let Some(target) = state.store_mut(&ws, &store) else {
        return not_found("coverage store");
    };
    for location in locations {
        target.add_granule(&store, location);
    }
    StatusCode::ACCEPTED.into_response()
}

async fn configure_coverage(
    State(state): State<Shared>,
    UrlPath((ws, store, coverage)): UrlPath<(String, String, String)>,
    body: String,
) -> Response {
    if coverage != store {
        return not_found("coverage");
    }
    if !body.contains("<dimensionInfo>") {
        return bad_request("coverage update without dimensionInfo");
    }
    let mut state = lock(&state);
    if state.failing_coverage_updates > 0 {
        state.failing_coverage_updates -= 1;
        return (StatusCode::INTERNAL_SERVER_ERROR, "coverage update failed").into_response();
    }
    let Some(target) = state.store_mut(&ws, &store) else {
        return not_found("coverage store");
    };
    target.time_dimension = Some(body);
    target.time_dimension_updates += 1;
    StatusCode::OK.into_response()
}

async fn delete_coverage(
    State(state): State<Shared>,
    UrlPath((ws, store, coverage)): UrlPath<(String, String, String)>,
) -> Response {
    if coverage.trim_end_matches(".xml") != store {
        return not_found("coverage");
    }
    let mut state = lock(&state);
    let Some(target) = state.store_mut(&ws, &store) else {
        return not_found("coverage store");
    };
    target.granules.clear();
    target.time_dimension = None;
    StatusCode::OK.into_response()
}

async fn list_granules(
    State(state): State<Shared>,
    UrlPath((ws, store, coverage)): UrlPath<(String, String, String)>,
) -> Response {
    if coverage != store {
        return not_found("coverage");
    }
    let mut state = lock(&state);
    let Some(target) = state.store_mut(&ws, &store) else {
        return not_found("coverage store");
    };

    let features: Vec<Value> = target
        .granules
        .iter()
        .map(|(id, location)| {
            json!({
                "type": "Feature",
                "id": id,
                "geometry": null,
                "properties": { "location": location }
            })
        })
        .collect();
    Json(json!({ "type": "FeatureCollection", "features": features })).into_response()
}

async fn delete_granule(
    State(state): State<Shared>,
    UrlPath((ws, store, _coverage, granule)): UrlPath<(String, String, String, String)>,
) -> Response {
    let id = granule.trim_end_matches(".xml");
    let mut state = lock(&state);
    let Some(target) = state.store_mut(&ws, &store) else {
        return not_found("coverage store");
    };
    match target.granules.remove(id) {
        Some(_) => StatusCode::OK.into_response(),
        None => not_found("granule"),
    }
}

fn split_layer(layer: &str) -> Option<(&str, &str)> {
    layer.trim_end_matches(".xml").split_once(':')
}

async fn cached_layer(State(state): State<Shared>, UrlPath(layer): UrlPath<String>) -> Response {
    let Some((ws, store)) = split_layer(&layer) else {
        return not_found("layer");
    };
    let mut state = lock(&state);
    let Some(target) = state.store_mut(ws, store) else {
        return not_found("layer");
    };
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<GeoServerLayer><id>{}</id><enabled>true</enabled><name>{}:{}</name></GeoServerLayer>",
        target.layer_id, ws, store
    );
    ([(header::CONTENT_TYPE, "application/xml")], xml).into_response()
}

async fn replace_cached_layer(
    State(state): State<Shared>,
    UrlPath(layer): UrlPath<String>,
    body: String,
) -> Response {
    let Some((ws, store)) = split_layer(&layer) else {
        return not_found("layer");
    };
    let mut state = lock(&state);
    let Some(target) = state.store_mut(ws, store) else {
        return not_found("layer");
    };
    if !body.contains(&format!("<id>{}</id>", target.layer_id)) {
        return bad_request("layer id does not match");
    }
    target.time_cache = Some(body);
    target.time_cache_updates += 1;
    StatusCode::OK.into_response()
}
