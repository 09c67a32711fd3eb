//! Error types for rkplaylist

/// Playlist and library errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Playlist file not found: {0}")]
    PlaylistNotFound(String),

    #[error("Malformed playlist file {path}: {reason}")]
    MalformedPlaylist { path: String, reason: String },

    #[error("Malformed playlist entry #{index}: {reason}")]
    MalformedEntry { index: usize, reason: String },

    #[error("Unsupported item kind: {0}")]
    UnsupportedKind(String),

    #[error("Library directory unavailable: {0}")]
    LibraryUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type specialised for rkplaylist
pub type Result<T> = std::result::Result<T, Error>;
