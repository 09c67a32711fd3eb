//! # rkplaylist - Playlists and library for RetroKiosk
//!
//! This crate reads what the content-management UI writes:
//! - playlist files (JSON), parsed into [`Playlist`]s of [`PlaylistItem`]s
//! - the library tree, loaded as a [`Library`] snapshot
//! - media paths, resolved against several search bases by [`PathResolver`]
//!
//! Everything here is read-only for the kiosk. A [`LibraryScanner`] can
//! watch the playlists directory from a background thread and publish fresh
//! snapshots.
//!
//! # Example
//!
//! ```no_run
//! use rkplaylist::{Library, PathResolver};
//!
//! # fn main() -> rkplaylist::Result<()> {
//! let library = Library::load_dir(std::path::Path::new("/srv/kiosk/playlists"))?;
//! for playlist in &library.playlists {
//!     let resolver = PathResolver::new().with_playlist_dir(playlist.base_dir());
//!     for item in &playlist.items {
//!         println!("{} -> {:?}", item.title, resolver.resolve(&item.path));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod item;
mod library;
mod playlist;
mod resolve;
mod scanner;

#[cfg(feature = "rkconfig")]
mod config_ext;

pub use error::{Error, Result};
pub use item::{is_remote, ItemKind, PlaylistItem, AUTO_CORE};
pub use library::{Library, LibraryPaths};
pub use playlist::{parse_playlist_str, read_playlist_file, Playlist};
pub use resolve::{PathResolver, Resolved};
pub use scanner::LibraryScanner;

#[cfg(feature = "rkconfig")]
pub use config_ext::LibraryConfigExt;
