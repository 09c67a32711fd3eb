//! PlaylistItem : one entry of a playlist, immutable once parsed.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Core alias resolved per system by the emulator session.
pub const AUTO_CORE: &str = "auto";

/// What kind of content an item points to, and therefore which subsystem
/// plays it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    /// A file decoded by the playback pipeline.
    LocalMedia,
    /// A network URL decoded by the playback pipeline.
    RemoteStream,
    /// A ROM handed to the external emulator.
    EmulatedGame,
}

impl ItemKind {
    /// Kind inferred from a bare path: URLs are streams, everything else is
    /// local media.
    pub fn infer(path: &str) -> Self {
        if is_remote(path) {
            ItemKind::RemoteStream
        } else {
            ItemKind::LocalMedia
        }
    }

    pub fn is_media(self) -> bool {
        matches!(self, ItemKind::LocalMedia | ItemKind::RemoteStream)
    }
}

impl FromStr for ItemKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "local" | "localmedia" | "media" | "video" | "audio" | "file" => {
                Ok(ItemKind::LocalMedia)
            }
            "stream" | "remote" | "remotestream" | "url" => Ok(ItemKind::RemoteStream),
            "game" | "emulatedgame" | "rom" | "emulator" => Ok(ItemKind::EmulatedGame),
            _ => Err(Error::UnsupportedKind(s.to_string())),
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemKind::LocalMedia => "local",
            ItemKind::RemoteStream => "stream",
            ItemKind::EmulatedGame => "game",
        };
        f.write_str(name)
    }
}

/// True for paths that name a network resource rather than a file.
pub fn is_remote(path: &str) -> bool {
    let lower = path.trim_start().to_lowercase();
    ["http://", "https://", "rtsp://", "rtmp://", "udp://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// One playlist entry.
///
/// A malformed entry is kept at its position with `defect` set, so that a
/// broken line in a playlist file fails only that item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistItem {
    pub path: String,
    pub kind: ItemKind,
    pub title: String,
    pub artist: String,
    pub emulator_core: String,
    pub emulator_system: String,
    pub trim_start: Option<f64>,
    pub trim_end: Option<f64>,
    pub looped: bool,
    pub defect: Option<String>,
}

impl PlaylistItem {
    /// Item built from a bare path, with every optional field defaulted.
    pub fn from_path(path: &str) -> Self {
        let kind = ItemKind::infer(path);
        Self {
            path: path.to_string(),
            kind,
            title: title_from_path(path),
            artist: String::new(),
            emulator_core: AUTO_CORE.to_string(),
            emulator_system: system_from_path(path),
            trim_start: None,
            trim_end: None,
            looped: false,
            defect: None,
        }
    }

    /// Placeholder for an entry that could not be parsed.
    pub fn malformed(raw: &str, reason: impl Into<String>) -> Self {
        let mut item = Self::from_path(raw);
        item.defect = Some(reason.into());
        item
    }

    pub fn is_game(&self) -> bool {
        self.kind == ItemKind::EmulatedGame
    }

    pub fn is_media(&self) -> bool {
        self.kind.is_media()
    }

    pub fn is_malformed(&self) -> bool {
        self.defect.is_some()
    }
}

/// Display title derived from a file name: stem, with `_` turned to spaces.
pub fn title_from_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if is_remote(trimmed) {
        return trimmed
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(trimmed)
            .to_string();
    }
    Path::new(trimmed)
        .file_stem()
        .map(|s| s.to_string_lossy().replace('_', " "))
        .unwrap_or_else(|| trimmed.to_string())
}

/// Console system taken from the ROM's parent directory
/// (`roms/snes/game.sfc` → `snes`).
pub fn system_from_path(path: &str) -> String {
    if is_remote(path) {
        return String::new();
    }
    Path::new(path)
        .parent()
        .and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing_accepts_aliases() {
        assert_eq!("LocalMedia".parse::<ItemKind>().unwrap(), ItemKind::LocalMedia);
        assert_eq!("remote_stream".parse::<ItemKind>().unwrap(), ItemKind::RemoteStream);
        assert_eq!("Game".parse::<ItemKind>().unwrap(), ItemKind::EmulatedGame);
        assert!("hologram".parse::<ItemKind>().is_err());
    }

    #[test]
    fn test_bare_path_defaults() {
        let item = PlaylistItem::from_path("media/Big_Buck_Bunny.mp4");
        assert_eq!(item.kind, ItemKind::LocalMedia);
        assert_eq!(item.title, "Big Buck Bunny");
        assert_eq!(item.artist, "");
        assert_eq!(item.emulator_core, AUTO_CORE);
        assert!(!item.is_malformed());
    }

    #[test]
    fn test_url_is_a_stream() {
        let item = PlaylistItem::from_path("https://example.org/live/stream.m3u8");
        assert_eq!(item.kind, ItemKind::RemoteStream);
        assert_eq!(item.title, "stream.m3u8");
        assert_eq!(item.emulator_system, "");
    }

    #[test]
    fn test_system_from_rom_directory() {
        assert_eq!(system_from_path("roms/SNES/zelda.sfc"), "snes");
        assert_eq!(system_from_path("zelda.sfc"), "");
    }
}
