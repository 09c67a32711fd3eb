//! Background library scanner.
//!
//! A filesystem watcher marks the playlists directory dirty whenever a
//! playlist file is created, modified or removed. The scanner thread waits
//! for the writes to settle, then parses the whole library off the main
//! loop. The result is parked in a lock-guarded slot; the main loop picks it
//! up with [`LibraryScanner::take_update`] whenever it is ready to swap
//! libraries. Nothing is ever called back into the main loop.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::library::{has_playlist_extension, Library};
use crate::{Error, Result};

/// Granularity at which the thread checks its flags.
const FLAG_POLL: Duration = Duration::from_millis(50);

pub struct LibraryScanner {
    pending: Arc<Mutex<Option<Library>>>,
    stop_flag: Arc<AtomicBool>,
    rescan_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for LibraryScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryScanner")
            .field("is_running", &self.handle.is_some())
            .field("has_update", &self.has_update())
            .finish()
    }
}

impl LibraryScanner {
    /// Watches `dir` and republishes the library once changes have been
    /// quiet for `settle`. The directory is created if missing, so playlists
    /// dropped in later are still seen.
    pub fn start(dir: PathBuf, settle: Duration) -> Result<Self> {
        fs::create_dir_all(&dir)?;

        let pending = Arc::new(Mutex::new(None));
        let stop_flag = Arc::new(AtomicBool::new(false));
        let rescan_flag = Arc::new(AtomicBool::new(false));
        let dirty = Arc::new(AtomicBool::new(false));

        let dirty_flag = Arc::clone(&dirty);
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) if touches_playlists(&event) => {
                    dirty_flag.store(true, Ordering::SeqCst);
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "Library watcher error"),
            }
        })
        .map_err(watch_error)?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;

        let thread_pending = Arc::clone(&pending);
        let thread_stop = Arc::clone(&stop_flag);
        let thread_rescan = Arc::clone(&rescan_flag);

        let handle = thread::Builder::new()
            .name("library-scanner".to_string())
            .spawn(move || {
                scanner_loop(&dir, settle, thread_pending, thread_stop, thread_rescan, dirty);
            })
            .map_err(|e| Error::Other(anyhow::anyhow!("Failed to spawn library scanner: {e}")))?;

        Ok(Self {
            pending,
            stop_flag,
            rescan_flag,
            handle: Some(handle),
            _watcher: watcher,
        })
    }

    /// Asks the thread to rebuild the library right away, even if nothing
    /// changed on disk.
    pub fn request_rescan(&self) {
        self.rescan_flag.store(true, Ordering::SeqCst);
    }

    pub fn has_update(&self) -> bool {
        self.pending.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Takes the most recent library snapshot, if one was published.
    pub fn take_update(&self) -> Option<Library> {
        self.pending.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Stops the thread and waits for it. Idempotent.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Library scanner thread panicked");
            }
        }
    }
}

impl Drop for LibraryScanner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_error(err: notify::Error) -> Error {
    Error::LibraryUnavailable(format!("cannot watch playlists: {err}"))
}

fn touches_playlists(event: &Event) -> bool {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return false;
    }
    // Certains backends n'indiquent pas le chemin
    event.paths.is_empty() || event.paths.iter().any(|p| has_playlist_extension(p))
}

fn scanner_loop(
    dir: &Path,
    settle: Duration,
    pending: Arc<Mutex<Option<Library>>>,
    stop_flag: Arc<AtomicBool>,
    rescan_flag: Arc<AtomicBool>,
    dirty: Arc<AtomicBool>,
) {
    // Échéance repoussée tant que les écritures continuent
    let mut due: Option<Instant> = None;

    while !stop_flag.load(Ordering::SeqCst) {
        thread::sleep(FLAG_POLL);

        if dirty.swap(false, Ordering::SeqCst) {
            due = Some(Instant::now() + settle);
        }
        let forced = rescan_flag.swap(false, Ordering::SeqCst);
        let settled = due.is_some_and(|at| Instant::now() >= at);
        if !forced && !settled {
            continue;
        }
        due = None;

        match Library::load_dir(dir) {
            Ok(library) => {
                debug!(playlists = library.len(), forced, "Publishing library snapshot");
                if let Ok(mut slot) = pending.lock() {
                    *slot = Some(library);
                }
            }
            Err(err) => warn!(error = %err, "Library rescan failed"),
        }
    }

    debug!("Library scanner exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind};

    fn wait_for_update(scanner: &LibraryScanner) -> Option<Library> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(library) = scanner.take_update() {
                return Some(library);
            }
            thread::sleep(Duration::from_millis(20));
        }
        None
    }

    #[test]
    fn test_new_playlist_is_published() {
        let dir = tempfile::tempdir().unwrap();
        let mut scanner =
            LibraryScanner::start(dir.path().to_path_buf(), Duration::from_millis(100)).unwrap();
        assert!(!scanner.has_update());

        fs::write(dir.path().join("new.json"), r#"["a.mp4"]"#).unwrap();

        let library = wait_for_update(&scanner).expect("no snapshot published");
        assert_eq!(library.len(), 1);
        scanner.stop();
    }

    #[test]
    fn test_edited_playlist_is_republished() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clips.json");
        fs::write(&file, r#"["a.mp4"]"#).unwrap();
        let mut scanner =
            LibraryScanner::start(dir.path().to_path_buf(), Duration::from_millis(100)).unwrap();

        fs::write(&file, r#"["a.mp4", "b.mp4"]"#).unwrap();

        let library = wait_for_update(&scanner).expect("no snapshot published");
        assert_eq!(library.get(0).map(|p| p.len()), Some(2));
        scanner.stop();
    }

    #[test]
    fn test_forced_rescan_publishes_without_change() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), r#"["a.mp4"]"#).unwrap();
        let mut scanner =
            LibraryScanner::start(dir.path().to_path_buf(), Duration::from_secs(3600)).unwrap();

        scanner.request_rescan();
        let library = wait_for_update(&scanner).expect("no snapshot published");
        assert_eq!(library.len(), 1);
        scanner.stop();
        scanner.stop();
    }

    #[test]
    fn test_missing_dir_is_created_and_watched() {
        let dir = tempfile::tempdir().unwrap();
        let playlists = dir.path().join("later");
        let mut scanner =
            LibraryScanner::start(playlists.clone(), Duration::from_millis(50)).unwrap();
        assert!(playlists.is_dir());
        scanner.stop();
    }

    #[test]
    fn test_only_playlist_changes_count() {
        let json = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/lib/new.json"));
        let cover = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/lib/cover.png"));
        let read = Event::new(EventKind::Access(AccessKind::Read))
            .add_path(PathBuf::from("/lib/new.json"));
        let unknown = Event::new(EventKind::Modify(notify::event::ModifyKind::Any));

        assert!(touches_playlists(&json));
        assert!(!touches_playlists(&cover));
        assert!(!touches_playlists(&read));
        assert!(touches_playlists(&unknown));
    }
}
