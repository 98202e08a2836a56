//! Satellite directory-tree fixtures.
//!
//! Lays out the storage convention the publisher works against inside a
//! temporary directory:
//!
//! ```text
//! <root>/rgb/<source_dir>/<yyyy>/<mm>/<dd>/<slot>/<source_dir>_<yyyymmdd>_<slot>_<sample><ext>
//! <root>/public/base/init/{indexer,timeregex}.properties
//! <root>/public/<product>/{init,tiff}
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Directory names used by the fixture tree.
pub mod layout {
    pub const RGB_DIR: &str = "rgb";
    pub const PUBLIC_DIR: &str = "public";
    pub const BASE_DIR: &str = "base";
    pub const INIT_DIR: &str = "init";
    pub const TIFF_DIR: &str = "tiff";
}

/// A product configured the way the ELECTRO-L2 RGB product is in production.
pub mod electro {
    pub const PRODUCT: &str = "ELECTRO_L_2_RGB_GEOSERVER";
    pub const SOURCE_DIR: &str = "ELECTRO_L_2_RGB";
    pub const SAMPLE: &str = "RGB_1024pxs_EPSG4326";
    pub const EXTENSION: &str = ".tiff";
    pub const WORKSPACE: &str = "electro";
    pub const STORE: &str = "ELECTRO_L_2_RGB_GEOSERVER";
}

/// Contents of the mosaic template every product's init directory starts from.
pub const INDEXER_PROPERTIES: &str = "\
TimeAttribute=ingestion
Schema=*the_geom:Polygon,location:String,ingestion:java.util.Date
PropertyCollectors=TimestampFileNameExtractorSPI[timeregex](ingestion)
";

pub const TIMEREGEX_PROPERTIES: &str = "regex=[0-9]{8}_[0-9]{4},format=yyyyMMdd_HHmm\n";

/// Bytes standing in for a GeoTIFF; starts with the little-endian TIFF magic.
pub fn fake_tiff_bytes(label: &str) -> Vec<u8> {
    let mut bytes = b"II*\0".to_vec();
    bytes.extend_from_slice(label.as_bytes());
    bytes
}

/// Temporary satellite storage root.
pub struct SatelliteTree {
    root: TempDir,
}

impl SatelliteTree {
    /// Create the tree with the `rgb/` and `public/` roots and the base
    /// mosaic template.
    pub fn new() -> Self {
        let root = TempDir::new().expect("failed to create temp dir");
        let tree = Self { root };

        fs::create_dir_all(tree.root().join(layout::RGB_DIR)).expect("create rgb dir");
        let base_init = tree.base_init_dir();
        fs::create_dir_all(&base_init).expect("create base init dir");
        fs::write(base_init.join("indexer.properties"), INDEXER_PROPERTIES)
            .expect("write indexer.properties");
        fs::write(base_init.join("timeregex.properties"), TIMEREGEX_PROPERTIES)
            .expect("write timeregex.properties");
        tree
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn public_dir(&self) -> PathBuf {
        self.root().join(layout::PUBLIC_DIR)
    }

    pub fn base_init_dir(&self) -> PathBuf {
        self.public_dir().join(layout::BASE_DIR).join(layout::INIT_DIR)
    }

    pub fn product_dir(&self, product: &str) -> PathBuf {
        self.public_dir().join(product)
    }

    /// File name of a source raster under the naming convention.
    pub fn source_file_name(
        source_dir: &str,
        (year, month, day, slot): (&str, &str, &str, &str),
        sample: &str,
        extension: &str,
    ) -> String {
        format!(
            "{}_{}{}{}_{}_{}{}",
            source_dir, year, month, day, slot, sample, extension
        )
    }

    /// Write a source raster for the ELECTRO fixture product and return its path.
    pub fn add_electro_source(&self, date: (&str, &str, &str, &str)) -> PathBuf {
        self.add_source(electro::SOURCE_DIR, date, electro::SAMPLE, electro::EXTENSION)
    }

    /// Write a source raster and return its path.
    pub fn add_source(
        &self,
        source_dir: &str,
        date: (&str, &str, &str, &str),
        sample: &str,
        extension: &str,
    ) -> PathBuf {
        let (year, month, day, slot) = date;
        let dir = self
            .root()
            .join(layout::RGB_DIR)
            .join(source_dir)
            .join(year)
            .join(month)
            .join(day)
            .join(slot);
        fs::create_dir_all(&dir).expect("create source dir");

        let name = Self::source_file_name(source_dir, date, sample, extension);
        let path = dir.join(&name);
        fs::write(&path, fake_tiff_bytes(&name)).expect("write source raster");
        path
    }
}

impl Default for SatelliteTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_layout() {
        let tree = SatelliteTree::new();
        assert!(tree.base_init_dir().join("indexer.properties").is_file());
        assert!(tree.root().join("rgb").is_dir());
        assert!(!tree.product_dir(electro::PRODUCT).exists());
    }

    #[test]
    fn test_add_source() {
        let tree = SatelliteTree::new();
        let path = tree.add_electro_source(("2021", "07", "19", "2030"));

        assert!(path.ends_with(
            "rgb/ELECTRO_L_2_RGB/2021/07/19/2030/ELECTRO_L_2_RGB_20210719_2030_RGB_1024pxs_EPSG4326.tiff"
        ));
        assert!(fs::read(&path).unwrap().starts_with(b"II*\0"));
    }
}
