//! Per-run output directory management

use crate::config::RunConfig;
use crate::error::Result;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Output directory for one named run.
///
/// Creation is idempotent: an existing directory short-circuits the config
/// snapshot write, while artifacts written later are always overwritten.
#[derive(Debug, Clone)]
pub struct RunDir {
    path: PathBuf,
}

impl RunDir {
    /// Create the run directory (with a `config.json` snapshot) if it does
    /// not already exist.
    pub fn create(config: &RunConfig) -> Result<Self> {
        let path = config.output_folder.join(&config.run_name);

        if path.exists() {
            debug!(path = %path.display(), "run directory already exists");
        } else {
            std::fs::create_dir_all(&path)?;
            let file = File::create(path.join("config.json"))?;
            serde_json::to_writer_pretty(file, config)?;
        }

        Ok(Self { path })
    }

    /// Root of the run directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a named artifact inside the run directory
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}
