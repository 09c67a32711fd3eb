//! Media path resolution.
//!
//! Playlist files are written by people and by the content-management UI,
//! so paths come in every flavour: absolute, relative to the playlist,
//! relative to the kiosk's working directory, or just a file name sitting in
//! the media tree. Each base is tried in turn, then a fuzzy match on the
//! file name prefix.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::item::is_remote;

/// Outcome of a resolution. `Missing` keeps the original string so the
/// caller can report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Found(PathBuf),
    Remote(String),
    Missing(String),
}

impl Resolved {
    pub fn is_found(&self) -> bool {
        !matches!(self, Resolved::Missing(_))
    }

    /// Resolved path, or the original string when nothing matched.
    pub fn as_string(&self) -> String {
        match self {
            Resolved::Found(path) => path.to_string_lossy().into_owned(),
            Resolved::Remote(url) | Resolved::Missing(url) => url.clone(),
        }
    }
}

/// Search bases for relative paths, in priority order.
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    playlist_dir: Option<PathBuf>,
    working_dir: Option<PathBuf>,
    media_dir: Option<PathBuf>,
    extra_dirs: Vec<PathBuf>,
}

impl PathResolver {
    pub fn new() -> Self {
        Self {
            working_dir: std::env::current_dir().ok(),
            ..Self::default()
        }
    }

    pub fn with_playlist_dir(mut self, dir: Option<&Path>) -> Self {
        self.playlist_dir = dir.map(Path::to_path_buf);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Media directory configured for the library.
    pub fn with_media_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.media_dir = Some(dir.into());
        self
    }

    /// Additional directories searched after the standard bases (ROM trees).
    pub fn with_extra_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extra_dirs.push(dir.into());
        self
    }

    /// Ordered list of base directories used for relative lookups.
    fn bases(&self) -> Vec<PathBuf> {
        let mut bases = Vec::new();
        if let Some(dir) = &self.playlist_dir {
            bases.push(dir.clone());
        }
        if let Some(dir) = &self.working_dir {
            bases.push(dir.clone());
        }
        // Répertoire "media" voisin de celui de la playlist
        if let Some(parent) = self.playlist_dir.as_deref().and_then(Path::parent) {
            bases.push(parent.join("media"));
        }
        if let Some(dir) = &self.media_dir {
            bases.push(dir.clone());
        }
        bases.extend(self.extra_dirs.iter().cloned());
        bases.dedup();
        bases
    }

    /// Resolves `raw`. Never fails: unresolvable paths come back as
    /// [`Resolved::Missing`] with a warning logged.
    pub fn resolve(&self, raw: &str) -> Resolved {
        let raw_trimmed = raw.trim();
        if is_remote(raw_trimmed) {
            return Resolved::Remote(raw_trimmed.to_string());
        }

        let requested = Path::new(raw_trimmed);

        if requested.is_absolute() {
            if requested.is_file() {
                return Resolved::Found(requested.to_path_buf());
            }
        } else {
            for base in self.bases() {
                let candidate = base.join(requested);
                if candidate.is_file() {
                    debug!(raw, resolved = %candidate.display(), "Path resolved under base");
                    return Resolved::Found(candidate);
                }
            }
        }

        // Plain file name anywhere in the media bases
        if let Some(file_name) = requested.file_name() {
            for base in self.bases() {
                let candidate = base.join(file_name);
                if candidate.is_file() {
                    debug!(raw, resolved = %candidate.display(), "Path resolved by file name");
                    return Resolved::Found(candidate);
                }
            }
        }

        if let Some(found) = self.fuzzy_match(requested) {
            debug!(raw, resolved = %found.display(), "Path resolved by fuzzy prefix match");
            return Resolved::Found(found);
        }

        warn!(raw, "Could not resolve media path under any search base");
        Resolved::Missing(raw.to_string())
    }

    /// Looks for a file with the same extension whose stem starts with the
    /// requested stem, in the requested directory under every base.
    fn fuzzy_match(&self, requested: &Path) -> Option<PathBuf> {
        let stem = requested.file_stem()?.to_string_lossy().to_lowercase();
        if stem.is_empty() {
            return None;
        }
        let extension = requested
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());
        let sub_dir = requested.parent().filter(|p| !p.as_os_str().is_empty());

        let mut dirs = Vec::new();
        if requested.is_absolute() {
            if let Some(parent) = requested.parent() {
                dirs.push(parent.to_path_buf());
            }
        } else {
            for base in self.bases() {
                if let Some(sub) = sub_dir {
                    dirs.push(base.join(sub));
                }
                dirs.push(base);
            }
        }

        for dir in dirs {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            let mut names: Vec<PathBuf> = entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect();
            names.sort();

            let hit = names.into_iter().find(|candidate| {
                let same_ext = candidate
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    == extension;
                let prefix = candidate
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_lowercase().starts_with(&stem))
                    .unwrap_or(false);
                same_ext && prefix
            });
            if hit.is_some() {
                return hit;
            }
        }
        None
    }
}
