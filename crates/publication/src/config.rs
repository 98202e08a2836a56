//! Publisher configuration.
//!
//! Loaded from a single YAML file with four sections:
//! - `storage`: where source rasters and published products live
//! - `geoserver`: catalog connection settings
//! - `visibility`: polling policy for asynchronously visible state
//! - `products`: per-product naming and catalog targets
//!
//! Supports environment variable substitution using `${VAR}` and
//! `${VAR:-default}` syntax.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use geoserver_client::{CatalogConfig, TimeCacheSettings, TimeDimension};
use serde::{Deserialize, Serialize};

use crate::error::PublishError;
use crate::key::ProductKey;
use crate::poll::VisibilityPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    pub storage: StorageConfig,
    pub geoserver: CatalogConfig,
    #[serde(default)]
    pub visibility: VisibilityPolicy,
    pub products: BTreeMap<String, ProductConfig>,
}

impl PublisherConfig {
    pub fn product(&self, name: &str) -> std::result::Result<&ProductConfig, PublishError> {
        self.products
            .get(name)
            .ok_or_else(|| PublishError::UnknownProduct(name.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Satellite data root
    pub sat_root: PathBuf,
    /// Source rasters, relative to `sat_root`
    #[serde(default = "default_rgb_dir")]
    pub rgb_dir: String,
    /// Published products, relative to `sat_root`
    #[serde(default = "default_public_dir")]
    pub public_dir: String,
}

fn default_rgb_dir() -> String {
    "rgb".to_string()
}

fn default_public_dir() -> String {
    "public".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    /// Directory under `rgb_dir` holding this product's sources; also the
    /// file name prefix
    pub source_dir: String,
    #[serde(default = "default_init_dir")]
    pub init_dir: String,
    #[serde(default = "default_tiff_dir")]
    pub tiff_dir: String,
    /// Template product whose init directory seeds new products
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
    /// File name part after the time slot, e.g. `RGB_1024pxs_EPSG4326`
    pub sample: String,
    #[serde(default = "default_extension")]
    pub extension: String,
    pub workspace: String,
    pub store: String,
    #[serde(default)]
    pub time_dimension: TimeDimension,
    #[serde(default)]
    pub time_cache: TimeCacheConfig,
}

fn default_init_dir() -> String {
    "init".to_string()
}

fn default_tiff_dir() -> String {
    "tiff".to_string()
}

fn default_base_dir() -> String {
    "base".to_string()
}

fn default_extension() -> String {
    ".tiff".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeCacheConfig {
    #[serde(default)]
    pub blob_store_id: Option<String>,
    /// TIME value for requests without one; defaults to the timestamp of
    /// the key that provisioned the store
    #[serde(default)]
    pub default_time: Option<String>,
}

impl TimeCacheConfig {
    pub fn settings(&self, key: &ProductKey) -> TimeCacheSettings {
        let default_time = self
            .default_time
            .clone()
            .unwrap_or_else(|| key.cache_time());
        let mut settings = TimeCacheSettings::new(default_time);
        if let Some(blob_store_id) = &self.blob_store_id {
            settings.blob_store_id = blob_store_id.clone();
        }
        settings
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Load, expand and validate a configuration file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PublisherConfig> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read publisher config from {:?}", path.as_ref()))?;

    parse_config(&content)
        .with_context(|| format!("Invalid publisher config {:?}", path.as_ref()))
}

/// Expand and validate configuration YAML.
pub fn parse_config(content: &str) -> Result<PublisherConfig> {
    let expanded = expand_env_vars(content)?;

    let config: PublisherConfig =
        serde_yaml::from_str(&expanded).with_context(|| "Failed to parse publisher config YAML")?;

    validate_config(&config)?;

    Ok(config)
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand `${VAR}` and `${VAR:-default}` references.
///
/// Comment lines are copied untouched. Errors name the line and the YAML
/// key the reference sits under.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut expanded = String::with_capacity(content.len());

    for (index, line) in content.split_inclusive('\n').enumerate() {
        if line.trim_start().starts_with('#') {
            expanded.push_str(line);
            continue;
        }
        let value = expand_line(line).with_context(|| {
            let key = line.split_once(':').map_or("", |(key, _)| key.trim());
            format!("Failed to expand `{}` on line {}", key, index + 1)
        })?;
        expanded.push_str(&value);
    }

    Ok(expanded)
}

fn expand_line(line: &str) -> Result<String> {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let reference = &rest[start + 2..];
        let end = reference.find('}').with_context(|| {
            format!("Unclosed variable substitution: ${{{}", reference.trim_end())
        })?;
        out.push_str(&resolve_var_expr(&reference[..end])?);
        rest = &reference[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

/// `VAR` must be set; `VAR:-default` falls back when unset or empty.
fn resolve_var_expr(expr: &str) -> Result<String> {
    let (name, default) = match expr.split_once(":-") {
        Some((name, default)) => (name.trim(), Some(default)),
        None => (expr.trim(), None),
    };
    anyhow::ensure!(!name.is_empty(), "Empty variable name in ${{{}}}", expr);

    match (std::env::var(name), default) {
        (Ok(value), None) => Ok(value),
        (Ok(value), Some(_)) if !value.is_empty() => Ok(value),
        (_, Some(default)) => Ok(default.to_string()),
        (Err(_), None) => anyhow::bail!("Environment variable {} not set", name),
    }
}

// ============================================================================
// Validation
// ============================================================================

fn validate_config(config: &PublisherConfig) -> Result<()> {
    anyhow::ensure!(
        !config.storage.sat_root.as_os_str().is_empty(),
        "Storage sat_root cannot be empty"
    );

    let url = &config.geoserver.service_url;
    anyhow::ensure!(
        url.starts_with("http://") || url.starts_with("https://"),
        "GeoServer service_url must be an http(s) URL, got {:?}",
        url
    );
    anyhow::ensure!(
        !config.geoserver.username.is_empty(),
        "GeoServer username cannot be empty"
    );
    anyhow::ensure!(
        !config.geoserver.file_type.is_empty(),
        "GeoServer file_type cannot be empty"
    );

    anyhow::ensure!(
        config.visibility.max_attempts > 0,
        "visibility.max_attempts must be greater than 0"
    );
    anyhow::ensure!(
        config.visibility.initial_delay_ms <= config.visibility.max_delay_ms,
        "visibility.initial_delay_ms cannot exceed max_delay_ms"
    );

    anyhow::ensure!(!config.products.is_empty(), "No products configured");
    for (name, product) in &config.products {
        validate_product(name, product)?;
    }

    Ok(())
}

fn validate_product(name: &str, product: &ProductConfig) -> Result<()> {
    let fields = [
        ("source_dir", &product.source_dir),
        ("init_dir", &product.init_dir),
        ("tiff_dir", &product.tiff_dir),
        ("base_dir", &product.base_dir),
        ("sample", &product.sample),
        ("workspace", &product.workspace),
        ("store", &product.store),
    ];
    for (field, value) in fields {
        anyhow::ensure!(
            !value.trim().is_empty(),
            "Product {}: {} cannot be empty",
            name,
            field
        );
        anyhow::ensure!(
            !value.contains('/') && !value.contains('\\'),
            "Product {}: {} must be a single path component",
            name,
            field
        );
    }
    anyhow::ensure!(
        product.init_dir != product.tiff_dir,
        "Product {}: init_dir and tiff_dir must differ",
        name
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoserver_client::{DefaultValueStrategy, Presentation};

    const MINIMAL: &str = r#"
storage:
  sat_root: /data/sat
geoserver:
  service_url: http://localhost:8080/geoserver
  username: admin
  password: geoserver
products:
  ELECTRO_L_2_RGB_GEOSERVER:
    source_dir: ELECTRO_L_2_RGB
    sample: RGB_1024pxs_EPSG4326
    workspace: electro
    store: ELECTRO_L_2_RGB_GEOSERVER
"#;

    #[test]
    fn test_parse_minimal_config_with_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.storage.rgb_dir, "rgb");
        assert_eq!(config.storage.public_dir, "public");
        assert_eq!(config.geoserver.file_type, "imagemosaic");
        assert_eq!(config.visibility, VisibilityPolicy::default());

        let product = config.product("ELECTRO_L_2_RGB_GEOSERVER").unwrap();
        assert_eq!(product.init_dir, "init");
        assert_eq!(product.tiff_dir, "tiff");
        assert_eq!(product.base_dir, "base");
        assert_eq!(product.extension, ".tiff");
        assert_eq!(product.time_dimension, TimeDimension::default());
        assert!(product.time_cache.default_time.is_none());
    }

    #[test]
    fn test_unknown_product() {
        let config = parse_config(MINIMAL).unwrap();
        assert!(matches!(
            config.product("AHI_L2_RGB_GEOSERVER"),
            Err(PublishError::UnknownProduct(_))
        ));
    }

    #[test]
    fn test_time_settings_from_yaml() {
        let yaml = format!(
            "{}    time_dimension:\n      presentation: CONTINUOUS_INTERVAL\n      default_value: MAXIMUM\n    time_cache:\n      blob_store_id: tiles\n",
            MINIMAL
        );
        let config = parse_config(&yaml).unwrap();
        let product = config.product("ELECTRO_L_2_RGB_GEOSERVER").unwrap();
        assert_eq!(
            product.time_dimension.presentation,
            Presentation::ContinuousInterval
        );
        assert_eq!(
            product.time_dimension.default_value,
            DefaultValueStrategy::Maximum
        );

        let key = ProductKey::new("ELECTRO_L_2_RGB_GEOSERVER", "2021", "07", "19", "2030").unwrap();
        let settings = product.time_cache.settings(&key);
        assert_eq!(settings.blob_store_id, "tiles");
        assert_eq!(settings.default_time, "2021-07-19T20:30:00.000Z");
    }

    #[test]
    fn test_fixed_default_time() {
        let cache = TimeCacheConfig {
            blob_store_id: None,
            default_time: Some("2021-07-09T00:00:00.000Z".to_string()),
        };
        let key = ProductKey::new("P", "2021", "07", "19", "2030").unwrap();
        let settings = cache.settings(&key);
        assert_eq!(settings.default_time, "2021-07-09T00:00:00.000Z");
        assert_eq!(settings.blob_store_id, "RAM");
    }

    #[test]
    fn test_env_expansion() {
        std::env::set_var("PUBLISHER_TEST_GS_PASSWORD", "s3cret");
        std::env::remove_var("PUBLISHER_TEST_GS_USER");
        let yaml = MINIMAL
            .replace("password: geoserver", "password: ${PUBLISHER_TEST_GS_PASSWORD}")
            .replace("username: admin", "username: ${PUBLISHER_TEST_GS_USER:-operator}");

        let config = parse_config(&yaml).unwrap();
        assert_eq!(config.geoserver.password, "s3cret");
        assert_eq!(config.geoserver.username, "operator");
    }

    #[test]
    fn test_missing_env_var_is_error() {
        std::env::remove_var("PUBLISHER_TEST_UNSET_ROOT");
        let yaml = MINIMAL.replace("/data/sat", "${PUBLISHER_TEST_UNSET_ROOT}");
        let err = format!("{:#}", parse_config(&yaml).unwrap_err());
        assert!(err.contains("PUBLISHER_TEST_UNSET_ROOT"));
        assert!(err.contains("`sat_root` on line 3"));
    }

    #[test]
    fn test_comment_lines_are_not_expanded() {
        std::env::remove_var("PUBLISHER_TEST_COMMENTED");
        let yaml = format!("# set ${{PUBLISHER_TEST_COMMENTED}} first\n{}", MINIMAL);
        assert!(parse_config(&yaml).is_ok());
    }

    #[test]
    fn test_several_references_on_one_line() {
        std::env::set_var("PUBLISHER_TEST_HOST", "catalog");
        std::env::remove_var("PUBLISHER_TEST_PORT");
        let line =
            expand_line("url: http://${PUBLISHER_TEST_HOST}:${PUBLISHER_TEST_PORT:-8080}/x")
                .unwrap();
        assert_eq!(line, "url: http://catalog:8080/x");
        assert!(expand_line("url: ${}").is_err());
    }

    #[test]
    fn test_shipped_config_parses() {
        std::env::set_var("GEOSERVER_PASSWORD", "geoserver");
        let config = parse_config(include_str!("../../../config/publisher.yaml")).unwrap();
        for satellite in crate::Satellite::ALL {
            assert!(config.product(satellite.product_name()).is_ok());
        }
    }

    #[test]
    fn test_unclosed_substitution() {
        assert!(expand_env_vars("password: ${OOPS").is_err());
    }

    #[test]
    fn test_validation_failures() {
        let bad_url = MINIMAL.replace("http://localhost:8080/geoserver", "localhost:8080");
        assert!(parse_config(&bad_url).is_err());

        let empty_store = MINIMAL.replace(
            "store: ELECTRO_L_2_RGB_GEOSERVER",
            "store: \"\"",
        );
        assert!(parse_config(&empty_store).is_err());

        let nested = MINIMAL.replace("workspace: electro", "workspace: a/b");
        assert!(parse_config(&nested).is_err());

        let no_attempts = format!("{}visibility:\n  max_attempts: 0\n", MINIMAL);
        assert!(parse_config(&no_attempts).is_err());
    }
}
