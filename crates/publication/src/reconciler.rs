//! Reconciliation of one product key against the file system and catalog.
//!
//! Every run starts by assessing the key's [`ProductState`] from scratch and
//! then performs only the side effects that move it towards
//! [`ProductState::GranulePresent`]. Failures are logged and folded into a
//! [`WorkflowOutcome`]; the workflow itself never returns an error.

use std::fmt;

use geoserver_client::{CatalogError, GeoServerClient, GranuleIndex, PublicationMode};
use tracing::{error, info, instrument, warn};

use crate::config::{ProductConfig, PublisherConfig};
use crate::error::{PublishError, Result};
use crate::key::ProductKey;
use crate::layout::{self, ProductLayout};
use crate::poll::VisibilityPolicy;
use crate::satellite::Satellite;

/// Where a key stands relative to "granule published".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductState {
    /// The source raster does not exist.
    SourceMissing,
    /// No product directory, or no coverage store for it in the catalog.
    ProductUnprovisioned,
    /// The store exists but has no granule for this key.
    GranuleMissing,
    GranulePresent,
}

impl ProductState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductState::SourceMissing => "source missing",
            ProductState::ProductUnprovisioned => "product unprovisioned",
            ProductState::GranuleMissing => "granule missing",
            ProductState::GranulePresent => "granule present",
        }
    }
}

impl fmt::Display for ProductState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of [`Publisher::workflow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Done,
    SourceMissing,
    /// Provisioning ran but the granule never showed up.
    InitialFileCreationError,
    /// Granule publication ran but the granule never showed up.
    FileCreationError,
    /// The catalog could not be queried to determine the state.
    AssessmentError,
    /// The key names a different product than the publisher serves.
    ProductMismatch,
}

impl WorkflowOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowOutcome::Done => "done",
            WorkflowOutcome::SourceMissing => "source file existence error",
            WorkflowOutcome::InitialFileCreationError => "initial file creation error",
            WorkflowOutcome::FileCreationError => "file creation error",
            WorkflowOutcome::AssessmentError => "state assessment error",
            WorkflowOutcome::ProductMismatch => "product mismatch error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, WorkflowOutcome::Done)
    }
}

impl fmt::Display for WorkflowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publishes keys of one product into its workspace and coverage store.
pub struct Publisher {
    product: String,
    config: ProductConfig,
    layout: ProductLayout,
    client: GeoServerClient,
    visibility: VisibilityPolicy,
}

impl Publisher {
    /// Build a publisher for a configured product.
    pub fn new(config: &PublisherConfig, product: &str) -> Result<Self> {
        let product_config = config.product(product)?.clone();
        let client = GeoServerClient::new(config.geoserver.clone())?;
        Ok(Self {
            layout: ProductLayout::new(&config.storage, product, &product_config),
            product: product.to_string(),
            config: product_config,
            client,
            visibility: config.visibility,
        })
    }

    /// Build the publisher for a satellite identifier such as `electro_l2`.
    pub fn for_satellite(config: &PublisherConfig, satellite: &str) -> Result<Self> {
        let satellite: Satellite = satellite.parse()?;
        Self::new(config, satellite.product_name())
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn workspace(&self) -> &str {
        &self.config.workspace
    }

    pub fn store(&self) -> &str {
        &self.config.store
    }

    pub fn layout(&self) -> &ProductLayout {
        &self.layout
    }

    pub fn client(&self) -> &GeoServerClient {
        &self.client
    }

    /// Build a key for this publisher's product.
    pub fn key(&self, year: &str, month: &str, day: &str, slot: &str) -> Result<ProductKey> {
        ProductKey::new(self.product.clone(), year, month, day, slot)
    }

    // ========================================================================
    // Assessment
    // ========================================================================

    /// Determine the key's state without side effects.
    #[instrument(skip(self, key), fields(product = %self.product, key = %key))]
    pub async fn assess(&self, key: &ProductKey) -> Result<ProductState> {
        if key.product() != self.product {
            return Err(PublishError::ProductMismatch {
                publisher: self.product.clone(),
                key: key.product().to_string(),
            });
        }

        let source = self.layout.source_file(key);
        if !staging::exists(&source) {
            return Ok(ProductState::SourceMissing);
        }

        if !staging::exists(&self.layout.product_dir()) || !self.store_exists().await? {
            return Ok(ProductState::ProductUnprovisioned);
        }

        if self.granule_present(key).await? {
            Ok(ProductState::GranulePresent)
        } else {
            Ok(ProductState::GranuleMissing)
        }
    }

    async fn workspace_exists(&self) -> Result<bool> {
        let workspaces = self.client.list_workspaces().await?;
        Ok(workspaces.iter().any(|w| w.name == self.config.workspace))
    }

    async fn store_exists(&self) -> Result<bool> {
        match self.client.list_stores(Some(&self.config.workspace)).await {
            Ok(stores) => Ok(stores.iter().any(|s| s.name == self.config.store)),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn granule_present(&self, key: &ProductKey) -> Result<bool> {
        let file_name = self.layout.file_name(key);
        match self.list_granules().await {
            Ok(index) => Ok(index.contains_file(&file_name)),
            Err(PublishError::Catalog(e)) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Granules of the product's store.
    pub async fn list_granules(&self) -> Result<GranuleIndex> {
        Ok(self
            .client
            .list_granules(&self.config.workspace, &self.config.store)
            .await?)
    }

    /// Remove one granule from the product's store.
    pub async fn delete_granule(&self, granule_id: &str) -> Result<()> {
        Ok(self
            .client
            .delete_granule(&self.config.workspace, &self.config.store, granule_id)
            .await?)
    }

    // ========================================================================
    // Workflow
    // ========================================================================

    /// Converge the key to "granule present" and report how that went.
    #[instrument(skip(self, key), fields(product = %self.product, key = %key))]
    pub async fn workflow(&self, key: &ProductKey) -> WorkflowOutcome {
        let state = match self.assess(key).await {
            Ok(state) => state,
            Err(e @ PublishError::ProductMismatch { .. }) => {
                error!(error = %e, "Refusing key");
                return WorkflowOutcome::ProductMismatch;
            }
            Err(e) => {
                error!(error = %e, "Failed to assess product state");
                return WorkflowOutcome::AssessmentError;
            }
        };
        info!(state = state.as_str(), "Assessed product state");

        match state {
            ProductState::SourceMissing => {
                error!(
                    path = %self.layout.source_file(key).display(),
                    "Source file does not exist"
                );
                WorkflowOutcome::SourceMissing
            }
            ProductState::ProductUnprovisioned => {
                let failure = WorkflowOutcome::InitialFileCreationError;
                match self.provision(key).await {
                    Ok(()) => self.confirm(key, failure).await,
                    Err(e) => {
                        error!(error = %e, "Provisioning failed");
                        failure
                    }
                }
            }
            ProductState::GranuleMissing => {
                let failure = WorkflowOutcome::FileCreationError;
                match self.publish_granule(key).await {
                    Ok(()) => self.confirm(key, failure).await,
                    Err(e) => {
                        error!(error = %e, "Granule publication failed");
                        failure
                    }
                }
            }
            ProductState::GranulePresent => {
                info!(granule = %self.layout.file_name(key), "Granule already published");
                WorkflowOutcome::Done
            }
        }
    }

    /// Wait for the key's granule to appear in the store index.
    async fn confirm(&self, key: &ProductKey, failure: WorkflowOutcome) -> WorkflowOutcome {
        let granule = self.layout.file_name(key);
        let this = self;
        let visible = self
            .visibility
            .wait_until("granule", move || async move {
                match this.granule_present(key).await {
                    Ok(present) => present,
                    Err(e) => {
                        warn!(error = %e, "Granule check failed");
                        false
                    }
                }
            })
            .await;

        if visible {
            info!(granule = %granule, "Granule published");
            WorkflowOutcome::Done
        } else {
            error!(
                granule = %granule,
                attempts = self.visibility.max_attempts,
                "Granule not visible in catalog"
            );
            failure
        }
    }

    /// Stage the product tree, then create the workspace and store.
    async fn provision(&self, key: &ProductKey) -> Result<()> {
        let tree = self.layout.clone();
        let staged_key = key.clone();
        let archive =
            tokio::task::spawn_blocking(move || tree.stage_product(&staged_key)).await??;

        let probe = archive.clone();
        if !self
            .visibility
            .wait_until("init archive", move || {
                let visible = layout::visible(&probe);
                async move { visible }
            })
            .await
        {
            warn!(path = %archive.display(), "Init archive not visible, trying anyway");
        }

        self.ensure_workspace().await?;
        if self.ensure_store(&archive).await? {
            if let Err(e) = self.configure_time(key).await {
                self.roll_back_store().await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Delete a store whose time configuration failed, leaving the product
    /// unprovisioned for the next run.
    async fn roll_back_store(&self) {
        let (workspace, store) = (&self.config.workspace, &self.config.store);
        match self.client.delete_store(Some(workspace), store).await {
            Ok(()) => warn!(store = %store, "Removed store left without time configuration"),
            Err(e) => error!(
                store = %store,
                error = %e,
                "Failed to remove store left without time configuration"
            ),
        }
    }

    async fn ensure_workspace(&self) -> Result<()> {
        let workspace = &self.config.workspace;
        if self.workspace_exists().await? {
            info!(workspace = %workspace, "Workspace already exists");
            return Ok(());
        }

        match self.client.create_workspace(workspace).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_already_exists() => {
                info!(workspace = %workspace, "Workspace created concurrently");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create the store from the init archive if absent.
    ///
    /// Returns true only when this call created it.
    async fn ensure_store(&self, archive: &std::path::Path) -> Result<bool> {
        let (workspace, store) = (&self.config.workspace, &self.config.store);
        if self.store_exists().await? {
            info!(workspace = %workspace, store = %store, "Coverage store already exists");
            return Ok(false);
        }

        match self
            .client
            .create_store_from_zip(workspace, store, archive)
            .await
        {
            Ok(()) => {}
            Err(CatalogError::AlreadyExists { .. }) => {
                info!(store = %store, "Coverage store created concurrently");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        let this = self;
        let visible = self
            .visibility
            .wait_until("coverage store", move || async move {
                this.store_exists().await.unwrap_or(false)
            })
            .await;
        if !visible {
            warn!(store = %store, "Coverage store not listed yet, configuring anyway");
        }
        Ok(true)
    }

    async fn configure_time(&self, key: &ProductKey) -> Result<()> {
        let (workspace, store) = (&self.config.workspace, &self.config.store);
        self.client
            .configure_time_dimension(workspace, store, &self.config.time_dimension)
            .await?;
        self.client
            .configure_time_cache(workspace, store, &self.config.time_cache.settings(key))
            .await?;
        Ok(())
    }

    /// Stage the key's raster in the tiff directory and publish it in place.
    async fn publish_granule(&self, key: &ProductKey) -> Result<()> {
        let tree = self.layout.clone();
        let staged_key = key.clone();
        let staged =
            tokio::task::spawn_blocking(move || tree.stage_granule(&staged_key)).await??;

        let probe = staged.clone();
        if !self
            .visibility
            .wait_until("staged granule", move || {
                let visible = layout::visible(&probe);
                async move { visible }
            })
            .await
        {
            warn!(path = %staged.display(), "Staged granule not visible, trying anyway");
        }

        self.client
            .publish(
                &self.config.workspace,
                &self.config.store,
                &staged,
                PublicationMode::External,
            )
            .await?;
        Ok(())
    }
}
