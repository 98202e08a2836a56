//! Storage layout of one product and the staging steps that populate it.
//!
//! ```text
//! <sat_root>/<rgb>/<source_dir>/<yyyy>/<mm>/<dd>/<slot>/<file>
//! <sat_root>/<public>/<base_dir>/<init_dir>/          template
//! <sat_root>/<public>/<product>/<init_dir>/            seeds the store
//! <sat_root>/<public>/<product>/<init_dir>.zip
//! <sat_root>/<public>/<product>/<tiff_dir>/<file>     published granules
//! ```
//!
//! `<file>` is `<source_dir>_<yyyymmdd>_<slot>_<sample><extension>` and is
//! the same in every location, which is what ties a staged file to its
//! catalog granule.

use std::path::{Path, PathBuf};

use staging::StagingError;
use tracing::{info, warn};

use crate::config::{ProductConfig, StorageConfig};
use crate::key::ProductKey;

#[derive(Debug, Clone)]
pub struct ProductLayout {
    rgb_root: PathBuf,
    public_root: PathBuf,
    product: String,
    source_dir: String,
    init_dir: String,
    tiff_dir: String,
    base_dir: String,
    sample: String,
    extension: String,
}

impl ProductLayout {
    pub fn new(storage: &StorageConfig, product_name: &str, product: &ProductConfig) -> Self {
        Self {
            rgb_root: storage.sat_root.join(&storage.rgb_dir),
            public_root: storage.sat_root.join(&storage.public_dir),
            product: product_name.to_string(),
            source_dir: product.source_dir.clone(),
            init_dir: product.init_dir.clone(),
            tiff_dir: product.tiff_dir.clone(),
            base_dir: product.base_dir.clone(),
            sample: product.sample.clone(),
            extension: product.extension.clone(),
        }
    }

    /// Canonical file name of the key's raster.
    pub fn file_name(&self, key: &ProductKey) -> String {
        format!(
            "{}_{}_{}_{}{}",
            self.source_dir,
            key.date_tag(),
            key.slot(),
            self.sample,
            self.extension
        )
    }

    pub fn source_file(&self, key: &ProductKey) -> PathBuf {
        self.rgb_root
            .join(&self.source_dir)
            .join(key.year())
            .join(key.month())
            .join(key.day())
            .join(key.slot())
            .join(self.file_name(key))
    }

    pub fn product_dir(&self) -> PathBuf {
        self.public_root.join(&self.product)
    }

    pub fn init_dir(&self) -> PathBuf {
        self.product_dir().join(&self.init_dir)
    }

    pub fn tiff_dir(&self) -> PathBuf {
        self.product_dir().join(&self.tiff_dir)
    }

    pub fn base_init_dir(&self) -> PathBuf {
        self.public_root.join(&self.base_dir).join(&self.init_dir)
    }

    pub fn init_archive(&self) -> PathBuf {
        staging::zip_path(&self.init_dir())
    }

    /// Where the key's raster is staged for publication as a granule.
    pub fn staged_file(&self, key: &ProductKey) -> PathBuf {
        self.tiff_dir().join(self.file_name(key))
    }

    /// Build the product tree and its init archive.
    ///
    /// Creates the product and tiff directories, seeds the init directory
    /// from the base template, adds the key's raster to it and zips it.
    /// An existing archive is kept unless the key's raster was new to the
    /// init directory. Safe to rerun over a partially built tree. Returns
    /// the archive path.
    pub fn stage_product(&self, key: &ProductKey) -> Result<PathBuf, StagingError> {
        let init_dir = self.init_dir();

        staging::make_dir(&self.product_dir())?;
        staging::make_dir(&self.tiff_dir())?;

        let base = self.base_init_dir();
        if !staging::copy_dir_recursively(&base, &init_dir)? && !staging::exists(&init_dir) {
            warn!(
                template = %base.display(),
                "Base init template missing, starting with an empty init directory"
            );
            staging::make_dir(&init_dir)?;
        }

        let archive = self.init_archive();
        if staging::copy_file(&self.source_file(key), &init_dir.join(self.file_name(key)))?
            && staging::remove_file(&archive)?
        {
            info!(path = %archive.display(), "Init directory changed, rebuilding archive");
        }
        staging::zip_dir(&init_dir)?;

        info!(product = %self.product, path = %self.product_dir().display(), "Product staged");
        Ok(archive)
    }

    /// Copy the key's raster into the tiff directory. Returns the staged path.
    pub fn stage_granule(&self, key: &ProductKey) -> Result<PathBuf, StagingError> {
        let target = self.staged_file(key);
        staging::make_dir(&self.tiff_dir())?;
        if !staging::copy_file(&self.source_file(key), &target)? {
            info!(path = %target.display(), "Granule file already staged");
        }
        Ok(target)
    }
}

/// True once `path` is visible on the file system.
pub(crate) fn visible(path: &Path) -> bool {
    staging::exists(path)
}
