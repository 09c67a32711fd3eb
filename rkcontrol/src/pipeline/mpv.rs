//! mpv driven over its JSON IPC socket.
//!
//! One `mpv --idle` process per pipeline. Commands are written as JSON
//! lines; a reader thread observes property changes and publishes them in
//! the [`SharedPlayback`] snapshot.
//!
//! Video goes straight to the kiosk's card and connector (`--vo=drm`)
//! while the display owner has lent it scanout. The kiosk overlay is drawn
//! by mpv's OSD on top of the video.

use std::fs;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, info, trace, warn};

use super::{PlaybackPipeline, PlaybackSnapshot, SharedPlayback};
use crate::display::ModeInfo;
use crate::errors::{KioskError, Result};
use crate::retry::{RetryPolicy, retry};

const OBSERVED: [&str; 5] = ["time-pos", "duration", "pause", "idle-active", "eof-reached"];
const READ_TIMEOUT: Duration = Duration::from_millis(200);
const OVERLAY_ID: u64 = 1;

#[derive(Debug, Clone)]
pub struct MpvSettings {
    pub binary: String,
    pub socket_path: PathBuf,
    /// mpv video output; `drm` renders on the kiosk's own output.
    pub video_output: String,
    pub drm_device: Option<PathBuf>,
    pub drm_connector: Option<String>,
    pub drm_mode: Option<String>,
    pub extra_args: Vec<String>,
    pub initial_volume: u8,
    /// Waiting for the IPC socket to appear.
    pub connect: RetryPolicy,
}

impl Default for MpvSettings {
    fn default() -> Self {
        Self {
            binary: "mpv".to_string(),
            socket_path: PathBuf::from("/tmp/retrokiosk-mpv.sock"),
            video_output: "drm".to_string(),
            drm_device: None,
            drm_connector: None,
            drm_mode: None,
            extra_args: Vec::new(),
            initial_volume: 80,
            connect: RetryPolicy::from_millis(50, 20),
        }
    }
}

impl MpvSettings {
    /// Points the drm output at the card, connector and mode the display
    /// owner selected.
    pub fn with_scanout(mut self, device: Option<&Path>, connector: &str, mode: Option<&ModeInfo>) -> Self {
        self.drm_device = device.map(Path::to_path_buf);
        self.drm_connector = Some(connector.to_string());
        self.drm_mode = mode.map(ToString::to_string);
        self
    }

    /// Command line of the player, program excluded.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--idle=yes".to_string(),
            "--keep-open=yes".to_string(),
            "--no-terminal".to_string(),
            format!("--input-ipc-server={}", self.socket_path.display()),
            format!("--volume={}", self.initial_volume.min(100)),
        ];
        if !self.video_output.is_empty() {
            args.push(format!("--vo={}", self.video_output));
        }
        if self.video_output == "drm" {
            if let Some(device) = &self.drm_device {
                args.push(format!("--drm-device={}", device.display()));
            }
            if let Some(connector) = &self.drm_connector {
                args.push(format!("--drm-connector={connector}"));
            }
            if let Some(mode) = &self.drm_mode {
                args.push(format!("--drm-mode={mode}"));
            }
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

pub struct MpvPipeline {
    child: Child,
    writer: UnixStream,
    socket_path: PathBuf,
    shared: SharedPlayback,
    stop_flag: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    request_id: u64,
}

impl std::fmt::Debug for MpvPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpvPipeline")
            .field("pid", &self.child.id())
            .field("socket", &self.socket_path)
            .field("state", &self.shared.read())
            .finish()
    }
}

impl MpvPipeline {
    /// Starts mpv and connects to its IPC socket.
    pub fn spawn(settings: &MpvSettings) -> Result<Self> {
        remove_socket(&settings.socket_path);

        let mut child = Command::new(&settings.binary)
            .args(settings.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| KioskError::pipeline(format!("cannot start {}: {}", settings.binary, e)))?;

        let stream = match retry(settings.connect, "mpv ipc connect", || {
            UnixStream::connect(&settings.socket_path).map_err(KioskError::from)
        }) {
            Ok(stream) => stream,
            Err(attempt) => {
                reap(&mut child);
                return Err(attempt.into_error("mpv ipc connect"));
            }
        };

        let reader_stream = stream.try_clone()?;
        reader_stream.set_read_timeout(Some(READ_TIMEOUT))?;

        let shared = SharedPlayback::new();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let thread_shared = shared.clone();
        let thread_stop = Arc::clone(&stop_flag);
        let reader = thread::Builder::new()
            .name("mpv-ipc-reader".to_string())
            .spawn(move || reader_loop(reader_stream, thread_shared, thread_stop))?;

        info!(pid = child.id(), socket = %settings.socket_path.display(), "mpv started");

        let mut pipeline = Self {
            child,
            writer: stream,
            socket_path: settings.socket_path.clone(),
            shared,
            stop_flag,
            reader: Some(reader),
            request_id: 0,
        };
        for (id, name) in OBSERVED.iter().enumerate() {
            pipeline.command(json!(["observe_property", id + 1, name]))?;
        }
        Ok(pipeline)
    }

    fn command(&mut self, args: Value) -> Result<()> {
        self.request_id += 1;
        let message = json!({ "command": args, "request_id": self.request_id });
        let mut line = message.to_string();
        line.push('\n');
        trace!(request = %line.trim_end(), "mpv command");
        self.writer
            .write_all(line.as_bytes())
            .map_err(|e| KioskError::pipeline(format!("mpv ipc write failed: {e}")))
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        self.command(json!(["set_property", name, value]))
    }
}

/// OSD overlay command: ASS text over the video, or removal of it.
fn overlay_command(text: Option<&str>) -> Value {
    match text {
        Some(text) => json!({
            "name": "osd-overlay",
            "id": OVERLAY_ID,
            "format": "ass-events",
            "data": ass_escape(text),
        }),
        None => json!({
            "name": "osd-overlay",
            "id": OVERLAY_ID,
            "format": "none",
            "data": "",
        }),
    }
}

/// Keeps kiosk text from being read as ASS override tags; newlines become
/// ASS line breaks.
fn ass_escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('{', "\\{")
        .replace('}', "\\}")
        .replace('\n', "\\N")
}

fn remove_socket(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(socket = %path.display(), "Stale mpv socket removed"),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => debug!(socket = %path.display(), error = %err, "Cannot remove mpv socket"),
    }
}

fn reap(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!(pid = child.id(), error = %err, "mpv kill failed");
    }
    if let Err(err) = child.wait() {
        debug!(pid = child.id(), error = %err, "mpv wait failed");
    }
}

impl PlaybackPipeline for MpvPipeline {
    fn load(&mut self, path: &str, trim_start: Option<f64>, trim_end: Option<f64>, looped: bool) -> Result<()> {
        self.shared.reset();
        // Options par fichier : réinitialisées à chaque chargement
        let start = trim_start.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string());
        let end = trim_end.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string());
        self.set_property("start", json!(start))?;
        self.set_property("end", json!(end))?;
        self.set_property("loop-file", json!(if looped { "inf" } else { "no" }))?;
        self.command(json!(["loadfile", path, "replace"]))?;
        self.set_property("pause", json!(false))?;
        debug!(path, ?trim_start, ?trim_end, looped, "mpv loadfile");
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.set_property("pause", json!(false))
    }

    fn pause(&mut self) -> Result<()> {
        self.set_property("pause", json!(true))
    }

    fn stop(&mut self) -> Result<()> {
        self.command(json!(["stop"]))
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        self.command(json!(["seek", seconds.max(0.0), "absolute"]))
    }

    fn set_volume(&mut self, percent: u8) -> Result<()> {
        self.set_property("volume", json!(percent.min(100)))
    }

    fn position(&self) -> f64 {
        self.shared.read().position
    }

    fn duration(&self) -> f64 {
        self.shared.read().duration
    }

    fn is_playing(&self) -> bool {
        self.shared.read().playing
    }

    fn snapshot(&self) -> PlaybackSnapshot {
        self.shared.read()
    }

    fn show_overlay(&mut self, text: Option<&str>) -> Result<()> {
        self.command(overlay_command(text))
    }
}

impl Drop for MpvPipeline {
    fn drop(&mut self) {
        if let Err(err) = self.command(json!(["quit"])) {
            debug!(error = %err, "mpv quit not sent");
        }
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Err(err) = self.writer.shutdown(std::net::Shutdown::Both) {
            debug!(error = %err, "mpv ipc shutdown failed");
        }
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                warn!("mpv ipc reader panicked");
            }
        }

        let mut exited = false;
        for _ in 0..10 {
            if let Ok(Some(_)) = self.child.try_wait() {
                exited = true;
                break;
            }
            thread::sleep(Duration::from_millis(50));
        }
        if !exited {
            warn!(pid = self.child.id(), "mpv did not quit, killing it");
            reap(&mut self.child);
        }
        remove_socket(&self.socket_path);
        debug!("mpv pipeline torn down");
    }
}

/// Player state that is not part of the snapshot.
#[derive(Debug, Default)]
struct ReaderState {
    paused: bool,
    idle: bool,
}

fn reader_loop(stream: UnixStream, shared: SharedPlayback, stop_flag: Arc<AtomicBool>) {
    let mut reader = BufReader::new(stream);
    let mut state = ReaderState {
        paused: false,
        idle: true,
    };
    let mut line = String::new();

    while !stop_flag.load(Ordering::SeqCst) {
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) if line.ends_with('\n') => {
                if let Ok(message) = serde_json::from_str::<Value>(&line) {
                    apply_message(&mut state, &message, &shared);
                }
                line.clear();
            }
            Ok(_) => {}
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(err) => {
                debug!(error = %err, "mpv ipc read failed");
                break;
            }
        }
    }
    shared.update(|s| s.playing = false);
    debug!("mpv ipc reader exiting");
}

fn apply_message(state: &mut ReaderState, message: &Value, shared: &SharedPlayback) {
    let Some(event) = message.get("event").and_then(Value::as_str) else {
        if let Some(error) = message.get("error").and_then(Value::as_str) {
            if error != "success" {
                debug!(error, "mpv command rejected");
            }
        }
        return;
    };

    match event {
        "property-change" => {
            let name = message.get("name").and_then(Value::as_str).unwrap_or("");
            let data = message.get("data");
            match name {
                "time-pos" => {
                    let position = data.and_then(Value::as_f64).unwrap_or(0.0);
                    shared.update(|s| s.position = position);
                }
                "duration" => {
                    let duration = data.and_then(Value::as_f64).unwrap_or(0.0);
                    shared.update(|s| s.duration = duration);
                }
                "pause" => state.paused = data.and_then(Value::as_bool).unwrap_or(false),
                "idle-active" => state.idle = data.and_then(Value::as_bool).unwrap_or(false),
                "eof-reached" => {
                    let ended = data.and_then(Value::as_bool).unwrap_or(false);
                    shared.update(|s| s.ended = ended);
                }
                _ => {}
            }
        }
        "start-file" => {
            state.idle = false;
            shared.update(|s| s.ended = false);
        }
        "end-file" => {
            let reason = message.get("reason").and_then(Value::as_str).unwrap_or("");
            if reason == "eof" {
                shared.update(|s| s.ended = true);
            }
        }
        _ => {}
    }

    let playing = !state.paused && !state.idle;
    shared.update(|s| s.playing = playing);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(state: &mut ReaderState, shared: &SharedPlayback, messages: &[&str]) {
        for text in messages {
            let value: Value = serde_json::from_str(text).unwrap();
            apply_message(state, &value, shared);
        }
    }

    #[test]
    fn test_property_changes_update_snapshot() {
        let shared = SharedPlayback::new();
        let mut state = ReaderState {
            paused: false,
            idle: true,
        };
        feed(
            &mut state,
            &shared,
            &[
                r#"{"event":"start-file"}"#,
                r#"{"event":"property-change","id":2,"name":"duration","data":120.5}"#,
                r#"{"event":"property-change","id":1,"name":"time-pos","data":3.25}"#,
            ],
        );
        let snapshot = shared.read();
        assert_eq!(snapshot.duration, 120.5);
        assert_eq!(snapshot.position, 3.25);
        assert!(snapshot.playing);
        assert!(!snapshot.ended);

        feed(
            &mut state,
            &shared,
            &[r#"{"event":"property-change","id":3,"name":"pause","data":true}"#],
        );
        assert!(!shared.read().playing);
    }

    #[test]
    fn test_args_target_the_kiosk_output() {
        let mode = ModeInfo::new(1920, 1080, 60);
        let settings = MpvSettings::default().with_scanout(
            Some(Path::new("/dev/dri/card1")),
            "HDMI-A-1",
            Some(&mode),
        );
        let args = settings.args();
        assert!(args.contains(&"--vo=drm".to_string()));
        assert!(args.contains(&"--drm-device=/dev/dri/card1".to_string()));
        assert!(args.contains(&"--drm-connector=HDMI-A-1".to_string()));
        assert!(args.contains(&"--drm-mode=1920x1080@60".to_string()));
        assert!(args.contains(&"--input-ipc-server=/tmp/retrokiosk-mpv.sock".to_string()));

        let windowed = MpvSettings {
            video_output: "gpu".to_string(),
            ..settings
        };
        let args = windowed.args();
        assert!(args.contains(&"--vo=gpu".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--drm-")));
    }

    #[test]
    fn test_overlay_command() {
        let shown = overlay_command(Some("Intro {HD}\nLoad failure: x"));
        assert_eq!(shown["name"], "osd-overlay");
        assert_eq!(shown["format"], "ass-events");
        assert_eq!(shown["data"], "Intro \\{HD\\}\\NLoad failure: x");

        let hidden = overlay_command(None);
        assert_eq!(hidden["format"], "none");
        assert_eq!(hidden["id"], shown["id"]);
    }

    #[test]
    fn test_teardown_tolerates_missing_socket_and_dead_child() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("mpv.sock");
        fs::write(&socket, b"").unwrap();
        remove_socket(&socket);
        assert!(!socket.exists());
        remove_socket(&socket);

        let mut child = std::process::Command::new("true").spawn().unwrap();
        child.wait().unwrap();
        // Déjà récolté : reap ne doit pas paniquer
        reap(&mut child);
    }

    #[test]
    fn test_end_and_idle() {
        let shared = SharedPlayback::new();
        let mut state = ReaderState::default();
        feed(
            &mut state,
            &shared,
            &[
                r#"{"event":"end-file","reason":"eof"}"#,
                r#"{"event":"property-change","id":4,"name":"idle-active","data":true}"#,
                r#"{"event":"property-change","id":1,"name":"time-pos","data":null}"#,
                r#"{"request_id":3,"error":"success","data":null}"#,
            ],
        );
        let snapshot = shared.read();
        assert!(snapshot.ended);
        assert!(!snapshot.playing);
        assert_eq!(snapshot.position, 0.0);
    }
}
