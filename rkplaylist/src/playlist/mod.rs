//! Playlist : ordered items plus title and curator.

mod file;

pub use file::{parse_playlist_str, read_playlist_file};

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::item::{ItemKind, PlaylistItem};

/// An ordered, read-only list of items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Playlist {
    pub title: String,
    pub curator: String,
    pub items: Vec<PlaylistItem>,
    /// File the playlist was read from; also its identity.
    pub source: Option<PathBuf>,
}

impl Playlist {
    pub fn new(title: impl Into<String>, items: Vec<PlaylistItem>) -> Self {
        Self {
            title: title.into(),
            curator: String::new(),
            items,
            source: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PlaylistItem> {
        self.items.get(index)
    }

    /// True when the playlist is non-empty and only holds games.
    pub fn is_game_playlist(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|i| i.kind == ItemKind::EmulatedGame)
    }

    /// True when any item is decoded by the playback pipeline.
    pub fn is_media_playlist(&self) -> bool {
        self.items.iter().any(PlaylistItem::is_media)
    }

    /// Directory used as the first relative resolution base.
    pub fn base_dir(&self) -> Option<&Path> {
        self.source.as_deref().and_then(Path::parent)
    }

    /// Stable identity: the source file when known, the title otherwise.
    pub fn identity(&self) -> String {
        match &self.source {
            Some(path) => path.to_string_lossy().into_owned(),
            None => self.title.clone(),
        }
    }

    /// File stem of the source, used to designate playlists in configuration.
    pub fn key(&self) -> String {
        self.source
            .as_deref()
            .and_then(Path::file_stem)
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.title.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(path: &str) -> PlaylistItem {
        let mut item = PlaylistItem::from_path(path);
        item.kind = ItemKind::EmulatedGame;
        item
    }

    #[test]
    fn test_predicates() {
        let games = Playlist::new("games", vec![game("roms/nes/a.nes"), game("roms/nes/b.nes")]);
        assert!(games.is_game_playlist());
        assert!(!games.is_media_playlist());

        let mixed = Playlist::new(
            "mixed",
            vec![game("roms/nes/a.nes"), PlaylistItem::from_path("a.mp4")],
        );
        assert!(!mixed.is_game_playlist());
        assert!(mixed.is_media_playlist());

        let empty = Playlist::new("empty", Vec::new());
        assert!(!empty.is_game_playlist());
        assert!(!empty.is_media_playlist());
    }

    #[test]
    fn test_identity_prefers_source() {
        let mut playlist = Playlist::new("Evening", Vec::new());
        assert_eq!(playlist.identity(), "Evening");
        playlist.source = Some(PathBuf::from("/lib/playlists/evening.json"));
        assert_eq!(playlist.identity(), "/lib/playlists/evening.json");
        assert_eq!(playlist.key(), "evening");
    }
}
