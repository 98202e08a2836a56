//! Satellite product publication.
//!
//! Turns a `(product, year, month, day, slot)` key into a granule of a
//! time-enabled GeoServer image mosaic:
//!
//! - Stages source rasters into the product's public directory tree
//! - Provisions the workspace and coverage store on first use, including
//!   the time dimension and tile-cache time filter
//! - Publishes later rasters as granules of the existing store
//!
//! Each run is idempotent: state is assessed from the file system and the
//! catalog before anything is written.

pub mod config;
pub mod error;
pub mod key;
pub mod layout;
pub mod poll;
pub mod reconciler;
pub mod satellite;

// Re-exports
pub use config::{load_config, parse_config, ProductConfig, PublisherConfig, StorageConfig};
pub use error::{PublishError, Result};
pub use key::ProductKey;
pub use layout::ProductLayout;
pub use poll::VisibilityPolicy;
pub use reconciler::{ProductState, Publisher, WorkflowOutcome};
pub use satellite::Satellite;
