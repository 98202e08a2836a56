//! Typed response schemas for the catalog's listing endpoints.
//!
//! GeoServer renders an empty collection as an empty string instead of an
//! object (`{"coverageStores": ""}`), so every envelope goes through
//! [`Listing`], which turns that into an empty list and anything else that
//! does not match the schema into a parse error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Items(T),
    Empty(String),
}

impl<T> Listing<T> {
    fn into_option(self, what: &str) -> Result<Option<T>, String> {
        match self {
            Listing::Items(items) => Ok(Some(items)),
            Listing::Empty(s) if s.trim().is_empty() => Ok(None),
            Listing::Empty(s) => Err(format!("unexpected {} listing value {:?}", what, s)),
        }
    }
}

/// A workspace entry from `GET /rest/workspaces`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub name: String,
    #[serde(default)]
    pub href: Option<String>,
}

/// A coverage store entry from `GET /rest/workspaces/{ws}/coveragestores`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageStore {
    pub name: String,
    #[serde(default)]
    pub href: Option<String>,
}

/// A layer entry from `GET /rest/layers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRef {
    pub name: String,
    #[serde(default)]
    pub href: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkspacesEnvelope {
    workspaces: Listing<WorkspaceList>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceList {
    #[serde(default)]
    workspace: Vec<Workspace>,
}

#[derive(Debug, Deserialize)]
struct CoverageStoresEnvelope {
    #[serde(rename = "coverageStores")]
    coverage_stores: Listing<CoverageStoreList>,
}

#[derive(Debug, Deserialize)]
struct CoverageStoreList {
    #[serde(rename = "coverageStore", default)]
    coverage_store: Vec<CoverageStore>,
}

#[derive(Debug, Deserialize)]
struct LayersEnvelope {
    layers: Listing<LayerList>,
}

#[derive(Debug, Deserialize)]
struct LayerList {
    #[serde(default)]
    layer: Vec<LayerRef>,
}

pub(crate) fn parse_workspaces(body: &str) -> Result<Vec<Workspace>, String> {
    let envelope: WorkspacesEnvelope = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let items = envelope
        .workspaces
        .into_option("workspace")?
        .map(|list| list.workspace)
        .unwrap_or_default();
    ensure_named(items.iter().map(|w| w.name.as_str()), "workspace")?;
    Ok(items)
}

pub(crate) fn parse_coverage_stores(body: &str) -> Result<Vec<CoverageStore>, String> {
    let envelope: CoverageStoresEnvelope =
        serde_json::from_str(body).map_err(|e| e.to_string())?;
    let items = envelope
        .coverage_stores
        .into_option("coverage store")?
        .map(|list| list.coverage_store)
        .unwrap_or_default();
    ensure_named(items.iter().map(|s| s.name.as_str()), "coverage store")?;
    Ok(items)
}

pub(crate) fn parse_layers(body: &str) -> Result<Vec<LayerRef>, String> {
    let envelope: LayersEnvelope = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let items = envelope
        .layers
        .into_option("layer")?
        .map(|list| list.layer)
        .unwrap_or_default();
    ensure_named(items.iter().map(|l| l.name.as_str()), "layer")?;
    Ok(items)
}

fn ensure_named<'a>(mut names: impl Iterator<Item = &'a str>, what: &str) -> Result<(), String> {
    if names.any(|n| n.trim().is_empty()) {
        return Err(format!("{} entry with empty name", what));
    }
    Ok(())
}

// ============================================================================
// Granule index
// ============================================================================

#[derive(Debug, Deserialize)]
struct GranuleCollection {
    #[serde(default)]
    features: Vec<GranuleFeature>,
}

#[derive(Debug, Deserialize)]
struct GranuleFeature {
    id: String,
    properties: GranuleProperties,
}

#[derive(Debug, Deserialize)]
struct GranuleProperties {
    location: String,
}

/// Granules registered in a store's index, keyed by catalog-assigned id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GranuleIndex {
    locations: BTreeMap<String, String>,
}

impl GranuleIndex {
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// File location of a granule, as recorded by the catalog.
    pub fn location(&self, id: &str) -> Option<&str> {
        self.locations.get(id).map(String::as_str)
    }

    /// Iterate `(id, location)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.locations
            .iter()
            .map(|(id, loc)| (id.as_str(), loc.as_str()))
    }

    /// Id of the granule whose location ends in `file_name`.
    ///
    /// The bare file name is the only key shared between the local staging
    /// tree and the catalog's index.
    pub fn find_by_file_name(&self, file_name: &str) -> Option<&str> {
        self.locations
            .iter()
            .find(|(_, location)| location_file_name(location) == file_name)
            .map(|(id, _)| id.as_str())
    }

    pub fn contains_file(&self, file_name: &str) -> bool {
        self.find_by_file_name(file_name).is_some()
    }

    /// Bare file names of all granules.
    pub fn file_names(&self) -> Vec<&str> {
        self.locations.values().map(|l| location_file_name(l)).collect()
    }
}

impl FromIterator<(String, String)> for GranuleIndex {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            locations: iter.into_iter().collect(),
        }
    }
}

fn location_file_name(location: &str) -> &str {
    location
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(location)
}

pub(crate) fn parse_granules(body: &str) -> Result<GranuleIndex, String> {
    let collection: GranuleCollection = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let mut locations = BTreeMap::new();
    for feature in collection.features {
        if feature.id.trim().is_empty() {
            return Err("granule feature with empty id".to_string());
        }
        if feature.properties.location.trim().is_empty() {
            return Err(format!("granule {} has no location", feature.id));
        }
        if locations
            .insert(feature.id.clone(), feature.properties.location)
            .is_some()
        {
            return Err(format!("duplicate granule id {}", feature.id));
        }
    }
    Ok(GranuleIndex { locations })
}

// ============================================================================
// GeoWebCache layer description
// ============================================================================

/// Cached-layer descriptor from `GET /gwc/rest/layers/{ws}:{layer}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CachedLayer {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub(crate) fn parse_cached_layer(body: &str) -> Result<CachedLayer, String> {
    let layer: CachedLayer = quick_xml::de::from_str(body).map_err(|e| e.to_string())?;
    if layer.id.trim().is_empty() {
        return Err("cached layer without id".to_string());
    }
    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workspaces() {
        let body = r#"{"workspaces":{"workspace":[
            {"name":"electro","href":"http://localhost/geoserver/rest/workspaces/electro.json"},
            {"name":"himawari","href":"http://localhost/geoserver/rest/workspaces/himawari.json"}
        ]}}"#;
        let workspaces = parse_workspaces(body).unwrap();
        assert_eq!(workspaces.len(), 2);
        assert_eq!(workspaces[0].name, "electro");
    }

    #[test]
    fn test_empty_listing_is_empty_vec() {
        assert!(parse_workspaces(r#"{"workspaces":""}"#).unwrap().is_empty());
        assert!(parse_coverage_stores(r#"{"coverageStores":""}"#)
            .unwrap()
            .is_empty());
        assert!(parse_layers(r#"{"layers":""}"#).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_listing_is_error() {
        assert!(parse_workspaces(r#"{"workspaces":"unexpected"}"#).is_err());
        assert!(parse_workspaces(r#"{"other":{}}"#).is_err());
        assert!(parse_coverage_stores("<html>login</html>").is_err());
        assert!(parse_coverage_stores(r#"{"coverageStores":{"coverageStore":[{"name":""}]}}"#).is_err());
    }

    #[test]
    fn test_parse_granules() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "id": "ELECTRO.1",
                    "geometry": {"type": "Polygon", "coordinates": []},
                    "properties": {
                        "location": "/data/public/ELECTRO/tiff/ELECTRO_20210719_2030_RGB.tiff",
                        "time": "2021-07-19T20:30:00Z"
                    }
                },
                {
                    "type": "Feature",
                    "id": "ELECTRO.2",
                    "properties": {"location": "ELECTRO_20210719_2000_RGB.tiff"}
                }
            ]
        }"#;
        let index = parse_granules(body).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(
            index.find_by_file_name("ELECTRO_20210719_2030_RGB.tiff"),
            Some("ELECTRO.1")
        );
        assert!(index.contains_file("ELECTRO_20210719_2000_RGB.tiff"));
        assert!(!index.contains_file("ELECTRO_20210719_2100_RGB.tiff"));
    }

    #[test]
    fn test_parse_granules_rejects_duplicates() {
        let body = r#"{"features": [
            {"id": "a.1", "properties": {"location": "x.tiff"}},
            {"id": "a.1", "properties": {"location": "y.tiff"}}
        ]}"#;
        assert!(parse_granules(body).is_err());
        assert!(parse_granules(r#"{"features": [{"id": "a.1", "properties": {}}]}"#).is_err());
    }

    #[test]
    fn test_location_file_name() {
        assert_eq!(location_file_name("/a/b/c.tiff"), "c.tiff");
        assert_eq!(location_file_name("C:\\data\\c.tiff"), "c.tiff");
        assert_eq!(location_file_name("c.tiff"), "c.tiff");
    }

    #[test]
    fn test_parse_cached_layer() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<GeoServerLayer>
  <id>LayerInfoImpl--570ae188:124761b8d78:-7fd0</id>
  <enabled>true</enabled>
  <name>electro:ELECTRO_L_2_RGB_GEOSERVER</name>
  <mimeFormats>
    <string>image/png</string>
  </mimeFormats>
</GeoServerLayer>"#;
        let layer = parse_cached_layer(body).unwrap();
        assert_eq!(layer.id, "LayerInfoImpl--570ae188:124761b8d78:-7fd0");
        assert_eq!(
            layer.name.as_deref(),
            Some("electro:ELECTRO_L_2_RGB_GEOSERVER")
        );
    }
}
