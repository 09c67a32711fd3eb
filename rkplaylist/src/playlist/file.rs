//! Playlist file parsing.
//!
//! Accepted layouts:
//!
//! ```json
//! ["intro.mp4", {"path": "roms/snes/zelda.sfc", "kind": "game"}]
//! ```
//!
//! ```json
//! {"title": "Evening", "curator": "ops", "items": ["intro.mp4"]}
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::item::{ItemKind, PlaylistItem, AUTO_CORE, system_from_path, title_from_path};
use crate::playlist::Playlist;
use crate::{Error, Result};

/// Object form of an entry. Only `path` is required.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    path: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default, alias = "core")]
    emulator_core: Option<String>,
    #[serde(default, alias = "system")]
    emulator_system: Option<String>,
    #[serde(default)]
    trim_start: Option<f64>,
    #[serde(default)]
    trim_end: Option<f64>,
    #[serde(default, rename = "loop")]
    looped: Option<bool>,
}

/// Reads and parses one playlist file. The title defaults to the file stem.
pub fn read_playlist_file(path: &Path) -> Result<Playlist> {
    if !path.exists() {
        return Err(Error::PlaylistNotFound(path.display().to_string()));
    }
    let text = fs::read_to_string(path)?;
    let fallback_title = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut playlist = parse_playlist_str(&text, &fallback_title).map_err(|e| match e {
        Error::MalformedPlaylist { reason, .. } => Error::MalformedPlaylist {
            path: path.display().to_string(),
            reason,
        },
        other => other,
    })?;
    playlist.source = Some(path.to_path_buf());

    debug!(
        path = %path.display(),
        title = playlist.title.as_str(),
        items = playlist.len(),
        "Playlist file parsed"
    );
    Ok(playlist)
}

/// Parses playlist JSON. Only a broken document fails as a whole; a broken
/// entry becomes a malformed item at its position.
pub fn parse_playlist_str(text: &str, fallback_title: &str) -> Result<Playlist> {
    let document: Value = serde_json::from_str(text).map_err(|e| Error::MalformedPlaylist {
        path: String::new(),
        reason: e.to_string(),
    })?;

    let (title, curator, entries) = match document {
        Value::Array(entries) => (None, None, entries),
        Value::Object(mut map) => {
            let entries = match map.remove("items") {
                Some(Value::Array(entries)) => entries,
                Some(_) => {
                    return Err(Error::MalformedPlaylist {
                        path: String::new(),
                        reason: "'items' is not an array".to_string(),
                    });
                }
                None => Vec::new(),
            };
            let title = map.get("title").and_then(Value::as_str).map(str::to_string);
            let curator = map.get("curator").and_then(Value::as_str).map(str::to_string);
            (title, curator, entries)
        }
        _ => {
            return Err(Error::MalformedPlaylist {
                path: String::new(),
                reason: "expected an array or an object".to_string(),
            });
        }
    };

    let items = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| match parse_entry(index, entry) {
            Ok(item) => item,
            Err((raw, err)) => {
                warn!(index, error = %err, "Malformed playlist entry kept as a failing item");
                PlaylistItem::malformed(&raw, err.to_string())
            }
        })
        .collect();

    Ok(Playlist {
        title: title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| fallback_title.to_string()),
        curator: curator.unwrap_or_default(),
        items,
        source: None,
    })
}

fn parse_entry(index: usize, entry: Value) -> std::result::Result<PlaylistItem, (String, Error)> {
    match entry {
        Value::String(path) if !path.trim().is_empty() => Ok(PlaylistItem::from_path(&path)),
        Value::Object(_) => {
            let raw_text = entry.to_string();
            let raw: RawEntry = serde_json::from_value(entry).map_err(|e| {
                (
                    raw_text.clone(),
                    Error::MalformedEntry {
                        index,
                        reason: e.to_string(),
                    },
                )
            })?;
            build_item(index, raw).map_err(|e| (raw_text, e))
        }
        other => Err((
            other.to_string(),
            Error::MalformedEntry {
                index,
                reason: "entry must be a non-empty path or an object".to_string(),
            },
        )),
    }
}

fn build_item(index: usize, raw: RawEntry) -> Result<PlaylistItem> {
    let path = raw.path.trim().to_string();
    if path.is_empty() {
        return Err(Error::MalformedEntry {
            index,
            reason: "empty path".to_string(),
        });
    }

    let kind = match raw.kind.as_deref().map(str::trim) {
        Some(k) if !k.is_empty() => k.parse::<ItemKind>()?,
        _ => ItemKind::infer(&path),
    };

    let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    Ok(PlaylistItem {
        kind,
        title: non_empty(raw.title).unwrap_or_else(|| title_from_path(&path)),
        artist: non_empty(raw.artist).unwrap_or_default(),
        emulator_core: non_empty(raw.emulator_core).unwrap_or_else(|| AUTO_CORE.to_string()),
        emulator_system: non_empty(raw.emulator_system)
            .map(|s| s.to_lowercase())
            .unwrap_or_else(|| system_from_path(&path)),
        trim_start: raw.trim_start.filter(|t| *t > 0.0),
        trim_end: raw.trim_end.filter(|t| *t > 0.0),
        looped: raw.looped.unwrap_or(false),
        defect: None,
        path,
    })
}
