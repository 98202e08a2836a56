//! REST client for the catalog.
//!
//! Every method maps to exactly one HTTP request (two for
//! [`GeoServerClient::configure_time_cache`], which has to read the cached
//! layer id first). Coverage names are always derived from the store name;
//! see [`coverage_path`].

use std::path::Path;

use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, info, instrument, warn};

use crate::config::CatalogConfig;
use crate::error::{CatalogError, CatalogResult};
use crate::payload::{TimeCacheSettings, TimeDimension, WorkspacePayload};
use crate::response::{
    self, CachedLayer, CoverageStore, GranuleIndex, LayerRef, Workspace,
};

const XML_CONTENT_TYPE: &str = "application/xml; charset=UTF-8";
const ZIP_CONTENT_TYPE: &str = "application/zip";
const TIFF_CONTENT_TYPE: &str = "image/tiff";

/// Workspace the catalog falls back to when none is named.
pub const DEFAULT_WORKSPACE: &str = "default";

/// How a local raster reaches a coverage store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicationMode {
    /// Send the file bytes; the catalog keeps its own copy.
    Upload,
    /// Send a `file://` reference; the catalog reads the file in place.
    External,
    /// Send a zip archive of granules and recompute the store's bounds.
    Zip,
}

impl PublicationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::External => "external",
            Self::Zip => "zip",
        }
    }
}

/// `/rest/workspaces/{ws}/coveragestores/{store}`
fn store_path(workspace: &str, store: &str) -> String {
    format!("/rest/workspaces/{}/coveragestores/{}", workspace, store)
}

/// Coverage (layer) resource of a store.
///
/// Products publish exactly one coverage per store and the coverage carries
/// the store's name. All coverage-level paths go through here so the
/// invariant lives in one place.
fn coverage_path(workspace: &str, store: &str) -> String {
    format!("{}/coverages/{}", store_path(workspace, store), store)
}

/// Client for one catalog instance.
pub struct GeoServerClient {
    client: Client,
    config: CatalogConfig,
}

impl GeoServerClient {
    /// Create a client from explicit connection settings.
    pub fn new(config: CatalogConfig) -> CatalogResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|source| CatalogError::Transport {
                operation: "build_client",
                source,
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url(), path);
        self.client
            .request(method, url)
            .basic_auth(&self.config.username, Some(&self.config.password))
    }

    /// Send a request and turn non-2xx responses into classified errors.
    ///
    /// `name` identifies the resource for "already exists" reporting.
    async fn send(
        &self,
        operation: &'static str,
        name: &str,
        request: RequestBuilder,
    ) -> CatalogResult<Response> {
        let response = Self::dispatch(operation, request).await?;
        Self::check(operation, name, response).await
    }

    async fn dispatch(operation: &'static str, request: RequestBuilder) -> CatalogResult<Response> {
        request
            .send()
            .await
            .map_err(|source| CatalogError::Transport { operation, source })
    }

    async fn check(
        operation: &'static str,
        name: &str,
        response: Response,
    ) -> CatalogResult<Response> {
        let status = response.status();
        if status.is_success() {
            debug!(operation, status = status.as_u16(), "Catalog request succeeded");
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            operation,
            status = status.as_u16(),
            body = %truncate(&body, 200),
            "Catalog request rejected"
        );
        Err(CatalogError::from_status(operation, status.as_u16(), name, body))
    }

    async fn text(operation: &'static str, response: Response) -> CatalogResult<String> {
        response
            .text()
            .await
            .map_err(|source| CatalogError::Transport { operation, source })
    }

    async fn read_local(operation: &'static str, path: &Path) -> CatalogResult<Vec<u8>> {
        ensure_local(operation, path)?;
        tokio::fs::read(path)
            .await
            .map_err(|source| CatalogError::LocalRead {
                operation,
                path: path.to_path_buf(),
                source,
            })
    }

    // ========================================================================
    // Server maintenance
    // ========================================================================

    /// Drop all store, raster and schema caches.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> CatalogResult<()> {
        self.send("reset", "", self.request(Method::POST, "/rest/reset"))
            .await?;
        info!("Catalog caches reset");
        Ok(())
    }

    /// Reload catalog and configuration from the server's data directory.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> CatalogResult<()> {
        self.send("reload", "", self.request(Method::POST, "/rest/reload"))
            .await?;
        info!("Catalog configuration reloaded");
        Ok(())
    }

    // ========================================================================
    // Workspaces
    // ========================================================================

    #[instrument(skip(self))]
    pub async fn list_workspaces(&self) -> CatalogResult<Vec<Workspace>> {
        const OP: &str = "list_workspaces";
        let response = self
            .send(OP, "", self.json(Method::GET, "/rest/workspaces"))
            .await?;
        let body = Self::text(OP, response).await?;
        response::parse_workspaces(&body).map_err(|message| malformed(OP, message))
    }

    /// Create a workspace.
    ///
    /// A duplicate name yields [`CatalogError::AlreadyExists`]. Older catalog
    /// versions answer a duplicate with 401 and an explanatory body; that
    /// case is recognized by the body text so that real credential failures
    /// stay [`CatalogError::Unauthorized`].
    #[instrument(skip(self))]
    pub async fn create_workspace(&self, workspace: &str) -> CatalogResult<()> {
        const OP: &str = "create_workspace";
        let body = WorkspacePayload { name: workspace }
            .to_xml()
            .map_err(|message| encode_error(OP, message))?;

        let request = self
            .request(Method::POST, "/rest/workspaces")
            .header(header::CONTENT_TYPE, "text/xml")
            .body(body);

        let response = Self::dispatch(OP, request).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            if body_says_exists(&body) {
                return Err(CatalogError::AlreadyExists {
                    operation: OP,
                    name: workspace.to_string(),
                    status,
                });
            }
            return Err(CatalogError::Unauthorized {
                operation: OP,
                status,
            });
        }

        Self::check(OP, workspace, response).await?;
        info!(workspace, "Workspace created");
        Ok(())
    }

    /// Delete a workspace together with everything it contains.
    #[instrument(skip(self))]
    pub async fn delete_workspace(&self, workspace: &str) -> CatalogResult<()> {
        let request = self
            .request(Method::DELETE, &format!("/rest/workspaces/{}", workspace))
            .query(&[("recurse", "true")]);
        self.send("delete_workspace", workspace, request).await?;
        info!(workspace, "Workspace deleted");
        Ok(())
    }

    // ========================================================================
    // Layers
    // ========================================================================

    /// List layers of one workspace, or of the whole catalog.
    #[instrument(skip(self))]
    pub async fn list_layers(&self, workspace: Option<&str>) -> CatalogResult<Vec<LayerRef>> {
        const OP: &str = "list_layers";
        let path = match workspace {
            Some(ws) => format!("/rest/workspaces/{}/layers", ws),
            None => "/rest/layers".to_string(),
        };
        let response = self.send(OP, "", self.json(Method::GET, &path)).await?;
        let body = Self::text(OP, response).await?;
        response::parse_layers(&body).map_err(|message| malformed(OP, message))
    }

    /// Delete the coverage layer of a store.
    #[instrument(skip(self))]
    pub async fn delete_layer(&self, workspace: &str, store: &str) -> CatalogResult<()> {
        let request = self
            .request(
                Method::DELETE,
                &format!("{}.xml", coverage_path(workspace, store)),
            )
            .query(&[("recurse", "true")]);
        self.send("delete_layer", store, request).await?;
        info!(workspace, store, "Layer deleted");
        Ok(())
    }

    // ========================================================================
    // Coverage stores
    // ========================================================================

    /// List coverage stores of a workspace (the catalog default when `None`).
    ///
    /// A workspace without stores yields an empty list.
    #[instrument(skip(self))]
    pub async fn list_stores(&self, workspace: Option<&str>) -> CatalogResult<Vec<CoverageStore>> {
        const OP: &str = "list_stores";
        let workspace = workspace.unwrap_or(DEFAULT_WORKSPACE);
        let path = format!("/rest/workspaces/{}/coveragestores", workspace);
        let response = self.send(OP, "", self.json(Method::GET, &path)).await?;
        let body = Self::text(OP, response).await?;
        response::parse_coverage_stores(&body).map_err(|message| malformed(OP, message))
    }

    /// Create (or re-harvest) a store from a zip archive of its init directory.
    #[instrument(skip(self, zip_path), fields(zip = %zip_path.display()))]
    pub async fn create_store_from_zip(
        &self,
        workspace: &str,
        store: &str,
        zip_path: &Path,
    ) -> CatalogResult<()> {
        const OP: &str = "create_store";
        let data = Self::read_local(OP, zip_path).await?;
        let size = data.len();

        let request = self
            .request(
                Method::PUT,
                &format!("{}/file.{}", store_path(workspace, store), self.config.file_type),
            )
            .query(&[("coverageName", store)])
            .header(header::CONTENT_TYPE, ZIP_CONTENT_TYPE)
            .body(data);

        self.send(OP, store, request).await?;
        info!(workspace, store, bytes = size, "Coverage store created");
        Ok(())
    }

    /// Delete a store and its layers; without a workspace the catalog
    /// searches all workspaces.
    #[instrument(skip(self))]
    pub async fn delete_store(&self, workspace: Option<&str>, store: &str) -> CatalogResult<()> {
        let path = match workspace {
            Some(ws) => store_path(ws, store),
            None => format!("/rest/coveragestores/{}", store),
        };
        let request = self
            .request(Method::DELETE, &path)
            .query(&[("recurse", "true")]);
        self.send("delete_store", store, request).await?;
        info!(store, "Coverage store deleted");
        Ok(())
    }

    // ========================================================================
    // Granules
    // ========================================================================

    #[instrument(skip(self))]
    pub async fn list_granules(&self, workspace: &str, store: &str) -> CatalogResult<GranuleIndex> {
        const OP: &str = "list_granules";
        let path = format!("{}/index/granules.json", coverage_path(workspace, store));
        let response = self.send(OP, "", self.json(Method::GET, &path)).await?;
        let body = Self::text(OP, response).await?;
        let index = response::parse_granules(&body).map_err(|message| malformed(OP, message))?;
        debug!(count = index.len(), "Listed granules");
        Ok(index)
    }

    #[instrument(skip(self))]
    pub async fn delete_granule(
        &self,
        workspace: &str,
        store: &str,
        granule_id: &str,
    ) -> CatalogResult<()> {
        let path = format!(
            "{}/index/granules/{}.xml",
            coverage_path(workspace, store),
            granule_id
        );
        self.send("delete_granule", granule_id, self.request(Method::DELETE, &path))
            .await?;
        info!(workspace, store, granule_id, "Granule deleted");
        Ok(())
    }

    /// Publish a local file (or, for external references, a directory) into
    /// an existing store.
    #[instrument(skip(self, path, mode), fields(path = %path.display(), mode = mode.as_str()))]
    pub async fn publish(
        &self,
        workspace: &str,
        store: &str,
        path: &Path,
        mode: PublicationMode,
    ) -> CatalogResult<()> {
        const OP: &str = "publish";
        let base = store_path(workspace, store);
        let file_type = &self.config.file_type;

        let request = match mode {
            PublicationMode::External => {
                ensure_local(OP, path)?;
                let content_type = if path.is_dir() {
                    "text/plain"
                } else {
                    TIFF_CONTENT_TYPE
                };
                self.request(Method::POST, &format!("{}/external.{}", base, file_type))
                    .header(header::CONTENT_TYPE, content_type)
                    .body(format!("file://{}", path.display()))
            }
            PublicationMode::Upload => {
                let data = Self::read_local(OP, path).await?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.request(Method::POST, &format!("{}/file.{}", base, file_type))
                    .query(&[("filename", file_name.as_str())])
                    .header(header::CONTENT_TYPE, TIFF_CONTENT_TYPE)
                    .body(data)
            }
            PublicationMode::Zip => {
                let data = Self::read_local(OP, path).await?;
                self.request(Method::POST, &format!("{}/file.{}", base, file_type))
                    .query(&[("recalculate", "nativebbox,latlonbbox")])
                    .header(header::CONTENT_TYPE, ZIP_CONTENT_TYPE)
                    .body(data)
            }
        };

        self.send(OP, store, request).await?;
        info!(workspace, store, "File published to coverage store");
        Ok(())
    }

    // ========================================================================
    // Time configuration
    // ========================================================================

    /// Enable the time dimension on a store's coverage.
    #[instrument(skip(self, dimension))]
    pub async fn configure_time_dimension(
        &self,
        workspace: &str,
        store: &str,
        dimension: &TimeDimension,
    ) -> CatalogResult<()> {
        const OP: &str = "configure_time_dimension";
        let body = dimension
            .to_xml()
            .map_err(|message| encode_error(OP, message))?;
        let request = self
            .request(Method::PUT, &coverage_path(workspace, store))
            .header(header::CONTENT_TYPE, XML_CONTENT_TYPE)
            .body(body);

        self.send(OP, store, request).await?;
        info!(
            workspace,
            store,
            presentation = dimension.presentation.as_str(),
            strategy = dimension.default_value.as_str(),
            "Time dimension configured"
        );
        Ok(())
    }

    /// Fetch the tile-cache descriptor of a store's layer.
    #[instrument(skip(self))]
    pub async fn layer_description(&self, workspace: &str, store: &str) -> CatalogResult<CachedLayer> {
        const OP: &str = "layer_description";
        let request = self
            .request(Method::GET, &format!("/gwc/rest/layers/{}:{}", workspace, store))
            .header(header::ACCEPT, XML_CONTENT_TYPE);
        let response = self.send(OP, "", request).await?;
        let body = Self::text(OP, response).await?;
        response::parse_cached_layer(&body).map_err(|message| malformed(OP, message))
    }

    /// Replace a layer's tile-cache descriptor with a time-aware one.
    #[instrument(skip(self, settings))]
    pub async fn configure_time_cache(
        &self,
        workspace: &str,
        store: &str,
        settings: &TimeCacheSettings,
    ) -> CatalogResult<()> {
        const OP: &str = "configure_time_cache";
        let layer = self.layer_description(workspace, store).await?;
        let body = settings
            .to_xml(&layer.id, workspace, store)
            .map_err(|message| encode_error(OP, message))?;

        let request = self
            .request(
                Method::PUT,
                &format!("/gwc/rest/layers/{}:{}.xml", workspace, store),
            )
            .header(header::CONTENT_TYPE, XML_CONTENT_TYPE)
            .body(body);

        self.send(OP, store, request).await?;
        info!(
            workspace,
            store,
            layer_id = %layer.id,
            default_time = %settings.default_time,
            "Time cache configured"
        );
        Ok(())
    }

    fn json(&self, method: Method, path: &str) -> RequestBuilder {
        self.request(method, path)
            .header(header::ACCEPT, "application/json")
    }
}

fn ensure_local(operation: &'static str, path: &Path) -> CatalogResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(CatalogError::LocalFileMissing {
            operation,
            path: path.to_path_buf(),
        })
    }
}

fn malformed(operation: &'static str, message: String) -> CatalogError {
    CatalogError::MalformedResponse { operation, message }
}

fn encode_error(operation: &'static str, message: String) -> CatalogError {
    CatalogError::Encode { operation, message }
}

fn body_says_exists(body: &str) -> bool {
    body.to_ascii_lowercase().contains("already exist")
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_coverage_paths() {
        assert_eq!(
            store_path("electro", "ELECTRO"),
            "/rest/workspaces/electro/coveragestores/ELECTRO"
        );
        assert_eq!(
            coverage_path("electro", "ELECTRO"),
            "/rest/workspaces/electro/coveragestores/ELECTRO/coverages/ELECTRO"
        );
    }

    #[test]
    fn test_body_says_exists() {
        assert!(body_says_exists("Workspace 'electro' already exists"));
        assert!(body_says_exists("The workspace already exist"));
        assert!(!body_says_exists("Unauthorized"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 3), "ab");
        assert_eq!(truncate("äöü", 2), "äö");
    }
}
