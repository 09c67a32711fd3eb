//! Test doubles for the kiosk subsystems, sharing one call log so tests
//! can check the order of operations across devices.

#![allow(dead_code)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rkcontrol::display::{DisplayDevice, ModeInfo, OutputInfo, ScanoutConfig, SurfaceId};
use rkcontrol::emulator::{AudioSink, ProcessRunner};
use rkcontrol::input::{
    Capabilities, GpioLine, InputBackend, RawEvent, RawInputDevice, codes,
};
use rkcontrol::{
    ControllerSettings, Devices, DisplayOwner, DisplayPolicy, EmulatorSession, EmulatorSettings,
    InputSettings, InputSource, KioskError, ModeRequest, PipelineSlot, PlaybackPipeline, PlaybackSnapshot,
    PlaylistController, Result, RetryPolicy,
};
use rkplaylist::{ItemKind, Library, LibraryPaths, Playlist, PlaylistItem};

pub type CallLog = Arc<Mutex<Vec<String>>>;

fn record(log: &CallLog, call: impl Into<String>) {
    log.lock().unwrap().push(call.into());
}

/// Position of the first call starting with `prefix`.
pub fn position_of(log: &CallLog, prefix: &str) -> Option<usize> {
    log.lock().unwrap().iter().position(|c| c.starts_with(prefix))
}

/// Position of the first call starting with `prefix` after index `from`.
pub fn position_after(log: &CallLog, prefix: &str, from: usize) -> Option<usize> {
    log.lock()
        .unwrap()
        .iter()
        .enumerate()
        .skip(from + 1)
        .find(|(_, c)| c.starts_with(prefix))
        .map(|(i, _)| i)
}

pub fn count_of(log: &CallLog, prefix: &str) -> usize {
    log.lock().unwrap().iter().filter(|c| c.starts_with(prefix)).count()
}

// ---------------------------------------------------------------- display

pub struct FakeCard {
    log: CallLog,
    /// Remaining `set_master` calls that fail.
    pub master_failures: Arc<Mutex<u32>>,
    next_surface: u32,
}

impl DisplayDevice for FakeCard {
    fn name(&self) -> String {
        "fake-card".to_string()
    }

    fn outputs(&mut self) -> Result<Vec<OutputInfo>> {
        Ok(vec![OutputInfo {
            id: 0,
            name: "HDMI-A-1".to_string(),
            connected: true,
            modes: vec![
                ModeInfo::new(1920, 1080, 60).preferred(),
                ModeInfo::new(1280, 720, 60),
            ],
        }])
    }

    fn save_scanout(&mut self, output: &OutputInfo) -> Result<Option<ScanoutConfig>> {
        Ok(Some(ScanoutConfig {
            output: output.id,
            mode: output.modes.first().cloned(),
        }))
    }

    fn restore_scanout(&mut self, _: &OutputInfo, _: &ScanoutConfig) -> Result<()> {
        record(&self.log, "display:restore");
        Ok(())
    }

    fn disable_scanout(&mut self, _: &OutputInfo) -> Result<()> {
        record(&self.log, "display:disable");
        Ok(())
    }

    fn create_surface(&mut self, _: u32, _: u32) -> Result<SurfaceId> {
        self.next_surface += 1;
        Ok(SurfaceId(self.next_surface))
    }

    fn destroy_surface(&mut self, _: SurfaceId) {}

    fn modeset(&mut self, _: &OutputInfo, mode: &ModeInfo, _: SurfaceId) -> Result<()> {
        record(&self.log, format!("display:modeset {mode}"));
        Ok(())
    }

    fn flip(&mut self, _: &OutputInfo, surface: SurfaceId) -> Result<bool> {
        record(&self.log, format!("display:flip {}", surface.0));
        Ok(true)
    }

    fn set_master(&mut self) -> Result<()> {
        let mut failures = self.master_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(KioskError::resource_unavailable("master busy"));
        }
        record(&self.log, "display:set_master");
        Ok(())
    }

    fn drop_master(&mut self) -> Result<()> {
        record(&self.log, "display:drop_master");
        Ok(())
    }
}

// ---------------------------------------------------------------- input

struct FakePad {
    log: CallLog,
}

impl RawInputDevice for FakePad {
    fn name(&self) -> String {
        "fake pad".to_string()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            keys: vec![codes::BTN_SOUTH, codes::BTN_EAST, codes::BTN_START],
            ..Default::default()
        }
    }

    fn grab(&mut self) -> io::Result<()> {
        record(&self.log, "input:grab");
        Ok(())
    }

    fn ungrab(&mut self) -> io::Result<()> {
        record(&self.log, "input:ungrab");
        Ok(())
    }

    fn read_events(&mut self) -> io::Result<Vec<RawEvent>> {
        Ok(Vec::new())
    }
}

struct FakeInputBackend {
    log: CallLog,
}

impl InputBackend for FakeInputBackend {
    fn open_devices(&mut self) -> Result<Vec<Box<dyn RawInputDevice>>> {
        record(&self.log, "input:open");
        Ok(vec![Box::new(FakePad {
            log: Arc::clone(&self.log),
        })])
    }

    fn open_gpio_line(&mut self, offset: u32) -> Result<Box<dyn GpioLine>> {
        Err(KioskError::resource_unavailable(format!("no line {offset}")))
    }
}

// ---------------------------------------------------------------- pipeline

#[derive(Debug, Default)]
pub struct PipelineState {
    pub snapshot: PlaybackSnapshot,
    pub loaded: Vec<String>,
    pub volume: u8,
    /// Duration reported right after a load.
    pub default_duration: f64,
    /// Paths containing this marker fail to load.
    pub fail_marker: Option<String>,
    /// A load keeps the previous snapshot instead of resetting it.
    pub sticky: bool,
}

pub type SharedPipeline = Arc<Mutex<PipelineState>>;

pub struct FakePipeline {
    state: SharedPipeline,
    log: CallLog,
}

impl PlaybackPipeline for FakePipeline {
    fn load(&mut self, path: &str, _: Option<f64>, _: Option<f64>, _: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(marker) = &state.fail_marker {
            if path.contains(marker.as_str()) {
                return Err(KioskError::load_failure(format!("cannot decode {path}")));
            }
        }
        record(&self.log, format!("pipeline:load {path}"));
        state.loaded.push(path.to_string());
        if !state.sticky {
            state.snapshot = PlaybackSnapshot {
                position: 0.0,
                duration: state.default_duration,
                playing: false,
                ended: false,
            };
        }
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.state.lock().unwrap().snapshot.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        record(&self.log, "pipeline:pause");
        self.state.lock().unwrap().snapshot.playing = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        record(&self.log, "pipeline:stop");
        self.state.lock().unwrap().snapshot = PlaybackSnapshot::default();
        Ok(())
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        self.state.lock().unwrap().snapshot.position = seconds;
        Ok(())
    }

    fn set_volume(&mut self, percent: u8) -> Result<()> {
        self.state.lock().unwrap().volume = percent;
        Ok(())
    }

    fn position(&self) -> f64 {
        self.state.lock().unwrap().snapshot.position
    }

    fn duration(&self) -> f64 {
        self.state.lock().unwrap().snapshot.duration
    }

    fn is_playing(&self) -> bool {
        self.state.lock().unwrap().snapshot.playing
    }

    fn snapshot(&self) -> PlaybackSnapshot {
        self.state.lock().unwrap().snapshot
    }
}

// ---------------------------------------------------------------- emulator

struct FakeRunner {
    log: CallLog,
    /// Remaining runs that fail as if the binary were missing.
    run_failures: Arc<Mutex<u32>>,
}

impl ProcessRunner for FakeRunner {
    fn run(&mut self, program: &str, _args: &[String]) -> io::Result<Option<i32>> {
        record(&self.log, format!("emulator:run {program}"));
        let mut failures = self.run_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such binary"));
        }
        Ok(Some(0))
    }

    fn terminate_strays(&mut self, _name: &str) -> usize {
        record(&self.log, "emulator:strays");
        0
    }
}

fn no_sinks() -> Vec<AudioSink> {
    Vec::new()
}

// ---------------------------------------------------------------- rig

/// Every subsystem wired to fakes, plus a scratch library tree.
pub struct Rig {
    pub dir: tempfile::TempDir,
    pub paths: LibraryPaths,
    pub log: CallLog,
    pub pipeline_state: SharedPipeline,
    pub master_failures: Arc<Mutex<u32>>,
    pub run_failures: Arc<Mutex<u32>>,
    pub display: DisplayOwner,
    pub input: InputSource,
    pub pipeline: PipelineSlot,
    pub emulator: EmulatorSession,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_policy(test_policy())
    }

    pub fn with_policy(policy: DisplayPolicy) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = LibraryPaths {
            playlists_dir: dir.path().join("playlists"),
            media_dir: dir.path().join("media"),
            roms_dir: dir.path().join("roms"),
        };
        for d in [&paths.playlists_dir, &paths.media_dir, &paths.roms_dir] {
            fs::create_dir_all(d).unwrap();
        }
        let cores = dir.path().join("cores");
        fs::create_dir_all(&cores).unwrap();
        fs::write(cores.join("mgba_libretro.so"), b"").unwrap();

        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let master_failures = Arc::new(Mutex::new(0));
        let run_failures = Arc::new(Mutex::new(0));

        let card = FakeCard {
            log: Arc::clone(&log),
            master_failures: Arc::clone(&master_failures),
            next_surface: 0,
        };
        let mut display = DisplayOwner::from_devices(vec![Box::new(card)], policy).unwrap();
        display.set_mode(ModeRequest::Auto).unwrap();

        let mut input = InputSource::new(
            Box::new(FakeInputBackend {
                log: Arc::clone(&log),
            }),
            InputSettings {
                reinit: RetryPolicy::new(2, Duration::ZERO),
                sysfs_root: dir.path().join("sys"),
                ..InputSettings::default()
            },
        );
        input.initialize().unwrap();

        let pipeline_state: SharedPipeline = Arc::new(Mutex::new(PipelineState {
            default_duration: 10.0,
            ..PipelineState::default()
        }));
        let factory_state = Arc::clone(&pipeline_state);
        let factory_log = Arc::clone(&log);
        let pipeline = PipelineSlot::new(Box::new(move || -> Result<Box<dyn PlaybackPipeline>> {
            record(&factory_log, "pipeline:create");
            Ok(Box::new(FakePipeline {
                state: Arc::clone(&factory_state),
                log: Arc::clone(&factory_log),
            }))
        }));

        let emulator = EmulatorSession::new(
            EmulatorSettings {
                cores_dir: cores,
                settle_delay: Duration::ZERO,
                config_root: Some(dir.path().to_path_buf()),
                ..EmulatorSettings::default()
            },
            Box::new(FakeRunner {
                log: Arc::clone(&log),
                run_failures: Arc::clone(&run_failures),
            }),
        )
        .with_sink_probe(no_sinks);

        Self {
            dir,
            paths,
            log,
            pipeline_state,
            master_failures,
            run_failures,
            display,
            input,
            pipeline,
            emulator,
        }
    }

    pub fn devices(&mut self) -> Devices<'_> {
        Devices {
            display: &mut self.display,
            input: &mut self.input,
            pipeline: &mut self.pipeline,
            emulator: &mut self.emulator,
        }
    }

    /// Media item whose file exists in the media directory.
    pub fn media(&self, name: &str) -> PlaylistItem {
        fs::write(self.paths.media_dir.join(name), b"media").unwrap();
        PlaylistItem::from_path(name)
    }

    /// Game item whose ROM exists under `roms/gba`.
    pub fn game(&self, name: &str) -> PlaylistItem {
        let rom = self.paths.roms_dir.join("gba").join(name);
        fs::create_dir_all(rom.parent().unwrap()).unwrap();
        fs::write(&rom, b"rom").unwrap();
        let mut item = PlaylistItem::from_path(&rom.to_string_lossy());
        item.kind = ItemKind::EmulatedGame;
        item
    }

    pub fn controller(&self, library: Library, settings: ControllerSettings) -> PlaylistController {
        PlaylistController::with_rng(library, self.paths.clone(), settings, StdRng::seed_from_u64(42))
    }

    /// Sets what the pipeline reports on the next read.
    pub fn report(&self, position: f64, duration: f64) {
        let mut state = self.pipeline_state.lock().unwrap();
        state.snapshot.position = position;
        state.snapshot.duration = duration;
    }

    pub fn loaded(&self) -> Vec<String> {
        self.pipeline_state.lock().unwrap().loaded.clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

pub fn test_policy() -> DisplayPolicy {
    DisplayPolicy {
        master_retry: RetryPolicy::new(3, Duration::ZERO),
        ..DisplayPolicy::default()
    }
}

pub fn settings(playlist_loop: bool) -> ControllerSettings {
    ControllerSettings {
        playlist_loop,
        stop_wait: RetryPolicy::new(3, Duration::ZERO),
        ..ControllerSettings::default()
    }
}

pub fn library(playlists: Vec<Playlist>) -> Library {
    Library::new(playlists)
}

pub fn file_name(path: &str) -> String {
    PathBuf::from(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
