//! Locating bundled audio assets on disk

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use impulse_core::{ImpulseError, Result};
use tracing::debug;

/// Name of the directory searched for when no explicit asset directory is configured
pub const ASSETS_DIR_NAME: &str = "Assets";

/// How many parent directories to climb looking for an `Assets` folder
const MAX_PARENT_DEPTH: usize = 8;

/// Resolves asset names against an ordered list of directories
#[derive(Debug, Clone, Default)]
pub struct AssetLocator {
    search_dirs: Vec<PathBuf>,
}

impl AssetLocator {
    /// Search only the given directories, in order
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    /// Search `extra_dirs` first, then any `Assets` directory found above the
    /// executable or the working directory.
    pub fn with_default_dirs(extra_dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut search_dirs: Vec<PathBuf> = extra_dirs.into_iter().collect();

        let starts = [
            std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)),
            std::env::current_dir().ok(),
        ];
        for start in starts.into_iter().flatten() {
            if let Some(dir) = find_assets_dir(&start) {
                if !search_dirs.contains(&dir) {
                    search_dirs.push(dir);
                }
            }
        }

        debug!(dirs = ?search_dirs, "Asset search path");
        Self { search_dirs }
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Full path of the first directory containing `name`
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        self.search_dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Open `name` for reading
    pub fn open(&self, name: &str) -> Result<BufReader<File>> {
        let path = self
            .locate(name)
            .ok_or_else(|| ImpulseError::AssetNotFound(name.to_string()))?;
        Ok(BufReader::new(File::open(path)?))
    }
}

/// Walk up from `start` looking for a directory named `Assets`
fn find_assets_dir(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .take(MAX_PARENT_DEPTH)
        .map(|dir| dir.join(ASSETS_DIR_NAME))
        .find(|candidate| candidate.is_dir())
}
