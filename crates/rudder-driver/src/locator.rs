//! Seam for driver binary resolution.
//!
//! Locating a driver executable (platform/arch detection, search paths,
//! bundled fallbacks) is the caller's concern; the supervisor only
//! consumes the result. This trait is the boundary.

use std::path::{Path, PathBuf};

/// Resolves the driver executable to launch.
pub trait BinaryLocator {
    /// The executable path, or `None` when no binary could be found.
    fn resolve(&self) -> Option<PathBuf>;
}

/// Locator for an already-known path. Resolves only if the file exists.
pub struct FixedPath(pub PathBuf);

impl FixedPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }
}

impl BinaryLocator for FixedPath {
    fn resolve(&self) -> Option<PathBuf> {
        let path: &Path = &self.0;
        path.is_file().then(|| self.0.clone())
    }
}
