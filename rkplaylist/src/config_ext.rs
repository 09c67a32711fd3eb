//! rkconfig extension for the library tree

use std::time::Duration;

use crate::library::LibraryPaths;

/// Extension trait for rkconfig::Config
pub trait LibraryConfigExt {
    /// Library directories, created if they don't exist
    fn library_paths(&self) -> anyhow::Result<LibraryPaths>;

    /// Quiet time after the last playlist write before the library is reparsed
    fn library_settle_delay(&self) -> Duration;
}

impl LibraryConfigExt for rkconfig::Config {
    fn library_paths(&self) -> anyhow::Result<LibraryPaths> {
        Ok(LibraryPaths {
            playlists_dir: self.get_managed_dir(&["library", "playlists_dir"], "playlists")?,
            media_dir: self.get_managed_dir(&["library", "media_dir"], "media")?,
            roms_dir: self.get_managed_dir(&["library", "roms_dir"], "roms")?,
        })
    }

    fn library_settle_delay(&self) -> Duration {
        Duration::from_millis(self.get_u64_or(&["library", "settle_ms"], 500))
    }
}
