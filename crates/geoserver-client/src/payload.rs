//! XML request bodies.
//!
//! Each payload is a plain struct serialized through quick-xml's serde
//! support, so a missing field is a compile error rather than a silently
//! malformed document.

use serde::{Deserialize, Serialize};

/// Regex the tile cache uses to normalize the TIME request parameter.
pub const TIME_PARAMETER_REGEX: &str =
    "[0-9]{4}-[0-9]{2}-[0-9]{2}T([0-9]{2}:){2}[0-9]{2}[.][0-9]{3}Z";

pub(crate) fn to_xml<T: Serialize>(root: &str, value: &T) -> Result<String, String> {
    quick_xml::se::to_string_with_root(root, value).map_err(|e| e.to_string())
}

// ============================================================================
// Workspace
// ============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct WorkspacePayload<'a> {
    pub name: &'a str,
}

impl WorkspacePayload<'_> {
    pub fn to_xml(&self) -> Result<String, String> {
        to_xml("workspace", self)
    }
}

// ============================================================================
// Time dimension
// ============================================================================

/// How the time dimension is advertised in capabilities documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Presentation {
    #[default]
    List,
    ContinuousInterval,
    DiscreteInterval,
}

impl Presentation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "LIST",
            Self::ContinuousInterval => "CONTINUOUS_INTERVAL",
            Self::DiscreteInterval => "DISCRETE_INTERVAL",
        }
    }
}

/// Which time a request without a TIME parameter resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DefaultValueStrategy {
    #[default]
    Minimum,
    Maximum,
    Nearest,
    Fixed,
}

impl DefaultValueStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimum => "MINIMUM",
            Self::Maximum => "MAXIMUM",
            Self::Nearest => "NEAREST",
            Self::Fixed => "FIXED",
        }
    }
}

/// Time dimension settings for a coverage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeDimension {
    #[serde(default)]
    pub presentation: Presentation,
    #[serde(default = "default_units")]
    pub units: String,
    #[serde(default)]
    pub default_value: DefaultValueStrategy,
}

fn default_units() -> String {
    "ISO8601".to_string()
}

impl Default for TimeDimension {
    fn default() -> Self {
        Self {
            presentation: Presentation::default(),
            units: default_units(),
            default_value: DefaultValueStrategy::default(),
        }
    }
}

#[derive(Serialize)]
struct CoveragePayload<'a> {
    enabled: bool,
    metadata: CoverageMetadata<'a>,
}

#[derive(Serialize)]
struct CoverageMetadata<'a> {
    entry: MetadataEntry<'a>,
}

#[derive(Serialize)]
struct MetadataEntry<'a> {
    #[serde(rename = "@key")]
    key: &'a str,
    #[serde(rename = "dimensionInfo")]
    dimension_info: DimensionInfo<'a>,
}

#[derive(Serialize)]
struct DimensionInfo<'a> {
    enabled: bool,
    presentation: &'a str,
    units: &'a str,
    #[serde(rename = "defaultValue")]
    default_value: DefaultValue<'a>,
}

#[derive(Serialize)]
struct DefaultValue<'a> {
    strategy: &'a str,
}

impl TimeDimension {
    pub fn to_xml(&self) -> Result<String, String> {
        let payload = CoveragePayload {
            enabled: true,
            metadata: CoverageMetadata {
                entry: MetadataEntry {
                    key: "time",
                    dimension_info: DimensionInfo {
                        enabled: true,
                        presentation: self.presentation.as_str(),
                        units: &self.units,
                        default_value: DefaultValue {
                            strategy: self.default_value.as_str(),
                        },
                    },
                },
            },
        };
        to_xml("coverage", &payload)
    }
}

// ============================================================================
// Time cache (GeoWebCache layer)
// ============================================================================

/// Tile cache settings for a time-enabled layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeCacheSettings {
    /// Blob store holding cached tiles
    #[serde(default = "default_blob_store")]
    pub blob_store_id: String,
    /// Value used for requests without a TIME parameter
    pub default_time: String,
    #[serde(default = "default_mime_formats")]
    pub mime_formats: Vec<String>,
    #[serde(default = "default_grid_sets")]
    pub grid_sets: Vec<String>,
    #[serde(default = "default_meta_tiles")]
    pub meta_tiles: [u32; 2],
    #[serde(default = "default_time_regex")]
    pub time_regex: String,
}

fn default_blob_store() -> String {
    "RAM".to_string()
}

fn default_mime_formats() -> Vec<String> {
    vec!["image/png".to_string(), "image/jpeg".to_string()]
}

fn default_grid_sets() -> Vec<String> {
    vec!["EPSG:4326".to_string(), "EPSG:900913".to_string()]
}

fn default_meta_tiles() -> [u32; 2] {
    [4, 4]
}

fn default_time_regex() -> String {
    TIME_PARAMETER_REGEX.to_string()
}

impl TimeCacheSettings {
    pub fn new(default_time: impl Into<String>) -> Self {
        Self {
            blob_store_id: default_blob_store(),
            default_time: default_time.into(),
            mime_formats: default_mime_formats(),
            grid_sets: default_grid_sets(),
            meta_tiles: default_meta_tiles(),
            time_regex: default_time_regex(),
        }
    }

    /// Render the full cached-layer descriptor that replaces the existing one.
    pub fn to_xml(&self, layer_id: &str, workspace: &str, layer: &str) -> Result<String, String> {
        let payload = CachedLayerPayload {
            id: layer_id,
            enabled: true,
            in_memory_cached: true,
            name: format!("{}:{}", workspace, layer),
            blob_store_id: &self.blob_store_id,
            mime_formats: StringList {
                string: self.mime_formats.iter().map(String::as_str).collect(),
            },
            grid_subsets: GridSubsets {
                grid_subset: self
                    .grid_sets
                    .iter()
                    .map(|name| GridSubset {
                        grid_set_name: name,
                    })
                    .collect(),
            },
            meta_width_height: IntList {
                int: self.meta_tiles.to_vec(),
            },
            expire_cache: 0,
            expire_clients: 0,
            parameter_filters: ParameterFilters {
                regex_parameter_filter: RegexParameterFilter {
                    key: "TIME",
                    default_value: &self.default_time,
                    normalize: Normalize { locale: "" },
                    regex: &self.time_regex,
                },
                style_parameter_filter: StyleParameterFilter {
                    key: "STYLES",
                    default_value: "",
                },
            },
            gutter: 0,
        };
        to_xml("GeoServerLayer", &payload)
    }
}

#[derive(Serialize)]
struct CachedLayerPayload<'a> {
    id: &'a str,
    enabled: bool,
    #[serde(rename = "inMemoryCached")]
    in_memory_cached: bool,
    name: String,
    #[serde(rename = "blobStoreId")]
    blob_store_id: &'a str,
    #[serde(rename = "mimeFormats")]
    mime_formats: StringList<'a>,
    #[serde(rename = "gridSubsets")]
    grid_subsets: GridSubsets<'a>,
    #[serde(rename = "metaWidthHeight")]
    meta_width_height: IntList,
    #[serde(rename = "expireCache")]
    expire_cache: u32,
    #[serde(rename = "expireClients")]
    expire_clients: u32,
    #[serde(rename = "parameterFilters")]
    parameter_filters: ParameterFilters<'a>,
    gutter: u32,
}

#[derive(Serialize)]
struct StringList<'a> {
    string: Vec<&'a str>,
}

#[derive(Serialize)]
struct GridSubsets<'a> {
    #[serde(rename = "gridSubset")]
    grid_subset: Vec<GridSubset<'a>>,
}

#[derive(Serialize)]
struct GridSubset<'a> {
    #[serde(rename = "gridSetName")]
    grid_set_name: &'a str,
}

#[derive(Serialize)]
struct IntList {
    int: Vec<u32>,
}

#[derive(Serialize)]
struct ParameterFilters<'a> {
    #[serde(rename = "regexParameterFilter")]
    regex_parameter_filter: RegexParameterFilter<'a>,
    #[serde(rename = "styleParameterFilter")]
    style_parameter_filter: StyleParameterFilter<'a>,
}

#[derive(Serialize)]
struct RegexParameterFilter<'a> {
    key: &'a str,
    #[serde(rename = "defaultValue")]
    default_value: &'a str,
    normalize: Normalize<'a>,
    regex: &'a str,
}

#[derive(Serialize)]
struct Normalize<'a> {
    locale: &'a str,
}

#[derive(Serialize)]
struct StyleParameterFilter<'a> {
    key: &'a str,
    #[serde(rename = "defaultValue")]
    default_value: &'a str,
}
