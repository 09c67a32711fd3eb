//! Library : every playlist found in the playlists directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::playlist::{read_playlist_file, Playlist};
use crate::resolve::PathResolver;
use crate::{Error, Result};

/// Directories of the library tree shared with the content-management UI.
#[derive(Debug, Clone, Default)]
pub struct LibraryPaths {
    pub playlists_dir: PathBuf,
    pub media_dir: PathBuf,
    pub roms_dir: PathBuf,
}

impl LibraryPaths {
    /// Resolver for items of `playlist`, searching the library tree.
    pub fn resolver_for(&self, playlist: &Playlist) -> PathResolver {
        PathResolver::new()
            .with_playlist_dir(playlist.base_dir())
            .with_media_dir(&self.media_dir)
            .with_extra_dir(&self.roms_dir)
    }
}

/// Read-only snapshot of all playlists, in file-name order.
#[derive(Debug, Clone, Default)]
pub struct Library {
    pub playlists: Vec<Playlist>,
}

impl Library {
    pub fn new(playlists: Vec<Playlist>) -> Self {
        Self { playlists }
    }

    /// Loads every `*.json` file of `dir`. A file that fails to parse is
    /// logged and skipped; the others still load.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let entries = fs::read_dir(dir)
            .map_err(|e| Error::LibraryUnavailable(format!("{}: {}", dir.display(), e)))?;

        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| is_playlist_file(p))
            .collect();
        files.sort();

        let mut playlists = Vec::with_capacity(files.len());
        for file in files {
            match read_playlist_file(&file) {
                Ok(playlist) => playlists.push(playlist),
                Err(err) => warn!(path = %file.display(), error = %err, "Skipping playlist"),
            }
        }

        info!(dir = %dir.display(), playlists = playlists.len(), "Library loaded");
        Ok(Self { playlists })
    }

    pub fn len(&self) -> usize {
        self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Playlist> {
        self.playlists.get(index)
    }

    /// Index of the playlist whose key (file stem) or title matches `name`,
    /// case-insensitively.
    pub fn find(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        self.playlists.iter().position(|p| {
            p.key().eq_ignore_ascii_case(name) || p.title.eq_ignore_ascii_case(name)
        })
    }
}

pub(crate) fn is_playlist_file(path: &Path) -> bool {
    path.is_file() && has_playlist_extension(path)
}

/// Extension check only; the file may already be gone.
pub(crate) fn has_playlist_extension(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
