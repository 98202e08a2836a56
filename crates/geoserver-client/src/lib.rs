//! Typed client for the GeoServer catalog.
//!
//! Wraps the REST endpoints needed to publish time-enabled raster mosaics:
//!
//! - Workspace and coverage store management
//! - Granule publication (upload, external reference, zip) and index queries
//! - Time dimension and GeoWebCache time-cache configuration
//!
//! Failures come back as [`CatalogError`] values classified by HTTP status;
//! nothing in here panics on an unexpected response.

pub mod client;
pub mod config;
pub mod error;
pub mod payload;
pub mod response;

pub use client::{GeoServerClient, PublicationMode, DEFAULT_WORKSPACE};
pub use config::CatalogConfig;
pub use error::{CatalogError, CatalogResult};
pub use payload::{
    DefaultValueStrategy, Presentation, TimeCacheSettings, TimeDimension, TIME_PARAMETER_REGEX,
};
pub use response::{CachedLayer, CoverageStore, GranuleIndex, LayerRef, Workspace};
