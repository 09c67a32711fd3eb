//! External emulator sessions.
//!
//! [`EmulatorSession::launch`] builds an isolated run configuration for one
//! title, runs the emulator and blocks until it exits. The configuration
//! lives in a per-session temporary directory removed afterwards.

pub mod audio;
pub mod cores;
mod run_config;

pub use audio::{AudioSink, ResolvedSink, SinkRank, probe_sinks, resolve_sink, volume_to_db};
pub use cores::{CoreFamily, Directions, InputProfile, default_core_for, resolve_core};
pub use run_config::RunConfig;

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::errors::{KioskError, Result};

const RUN_CONFIG_FILE: &str = "retroarch.cfg";

#[derive(Debug, Clone)]
pub struct EmulatorSettings {
    pub binary: String,
    /// Name searched for stray processes after a session.
    pub process_name: String,
    pub cores_dir: PathBuf,
    /// `auto`, a sink name, or a card/device spec.
    pub audio_sink: String,
    pub settle_delay: Duration,
    /// Parent of the per-session temporary directory; system temp if unset.
    pub config_root: Option<PathBuf>,
}

impl Default for EmulatorSettings {
    fn default() -> Self {
        Self {
            binary: "retroarch".to_string(),
            process_name: "retroarch".to_string(),
            cores_dir: PathBuf::from("/usr/lib/libretro"),
            audio_sink: "auto".to_string(),
            settle_delay: Duration::from_millis(1000),
            config_root: None,
        }
    }
}

/// What the session boundary reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

/// Runs external processes. Tests substitute a fake.
pub trait ProcessRunner: Send {
    /// Runs `program` to completion and returns its exit code.
    fn run(&mut self, program: &str, args: &[String]) -> io::Result<Option<i32>>;

    /// Kills leftover processes named `name`; returns how many.
    fn terminate_strays(&mut self, name: &str) -> usize;
}

#[derive(Debug, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&mut self, program: &str, args: &[String]) -> io::Result<Option<i32>> {
        let status = Command::new(program).args(args).status()?;
        Ok(status.code())
    }

    fn terminate_strays(&mut self, name: &str) -> usize {
        rkutils::terminate_processes_by_name(name)
    }
}

pub type SinkProbe = fn() -> Vec<AudioSink>;

pub struct EmulatorSession {
    settings: EmulatorSettings,
    runner: Box<dyn ProcessRunner>,
    sink_probe: SinkProbe,
    resolution: (u32, u32),
    volume: u8,
    last_outcome: Option<SessionOutcome>,
}

impl std::fmt::Debug for EmulatorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmulatorSession")
            .field("binary", &self.settings.binary)
            .field("resolution", &self.resolution)
            .field("volume", &self.volume)
            .field("last_outcome", &self.last_outcome)
            .finish()
    }
}

impl EmulatorSession {
    pub fn new(settings: EmulatorSettings, runner: Box<dyn ProcessRunner>) -> Self {
        Self {
            settings,
            runner,
            sink_probe: probe_sinks,
            resolution: (1920, 1080),
            volume: 100,
            last_outcome: None,
        }
    }

    /// Session running real processes.
    pub fn system(settings: EmulatorSettings) -> Self {
        Self::new(settings, Box::new(SystemRunner))
    }

    pub fn with_sink_probe(mut self, probe: SinkProbe) -> Self {
        self.sink_probe = probe;
        self
    }

    /// Physical resolution the emulator video is sized to.
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.resolution = (width, height);
    }

    pub fn set_volume(&mut self, percent: u8) {
        self.volume = percent.min(100);
    }

    pub fn settings(&self) -> &EmulatorSettings {
        &self.settings
    }

    pub fn last_outcome(&self) -> Option<SessionOutcome> {
        self.last_outcome
    }

    pub fn core_path(&self, core: &str) -> PathBuf {
        self.settings.cores_dir.join(format!("{core}_libretro.so"))
    }

    /// Run configuration for `core`, without touching the filesystem.
    pub fn build_run_config(&self, core: &str) -> RunConfig {
        let (width, height) = self.resolution;
        let sink = resolve_sink(&self.settings.audio_sink, &(self.sink_probe)());
        debug!(device = %sink.device, rank = ?sink.rank, "Audio sink selected");

        let mut config = RunConfig::new();
        config
            .set_bool("video_fullscreen", true)
            .set("video_fullscreen_x", width)
            .set("video_fullscreen_y", height)
            .set_bool("video_windowed_fullscreen", false)
            .set("audio_driver", "alsa")
            .set("audio_device", &sink.device)
            .set("audio_volume", format!("{:.1}", volume_to_db(self.volume)))
            .set("input_driver", "udev")
            .set("input_joypad_driver", "udev")
            .set_bool("config_save_on_exit", false)
            .set_bool("menu_show_online_updater", false)
            .set("libretro_directory", self.settings.cores_dir.display());
        config.extend(InputProfile::for_core(core).entries());
        config
    }

    /// Resolves `core` (or the default core of `system` for `auto`) and
    /// checks it is installed. Returns the core name and its library path.
    ///
    /// Nothing is released or started, so a badly configured item can be
    /// skipped before the devices are handed over.
    pub fn prepare(&self, core: &str, system: &str) -> Result<(String, PathBuf)> {
        let core = resolve_core(core, system)?;
        let core_path = self.core_path(&core);
        if !core_path.is_file() {
            return Err(KioskError::configuration(format!(
                "core '{}' not installed in {}",
                core,
                self.settings.cores_dir.display()
            )));
        }
        Ok((core, core_path))
    }

    /// Launches `content` with `core` (or the default core of `system` for
    /// `auto`) and blocks until the emulator exits.
    pub fn launch(&mut self, content: &Path, core: &str, system: &str) -> Result<SessionOutcome> {
        if !content.is_file() {
            return Err(KioskError::load_failure(format!(
                "missing file: {}",
                content.display()
            )));
        }

        let (core, core_path) = self.prepare(core, system)?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("retrokiosk-");
        let workdir = match &self.settings.config_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        let config_path = workdir.path().join(RUN_CONFIG_FILE);
        let config = self.build_run_config(&core);
        config.write_to(&config_path)?;

        let args = vec![
            "-L".to_string(),
            core_path.to_string_lossy().into_owned(),
            "--config".to_string(),
            config_path.to_string_lossy().into_owned(),
            content.to_string_lossy().into_owned(),
        ];

        info!(
            content = %content.display(),
            core = %core,
            system,
            "Launching emulator"
        );
        let started = Instant::now();
        let result = self.runner.run(&self.settings.binary, &args);
        let elapsed = started.elapsed();

        if let Err(err) = workdir.close() {
            warn!(error = %err, "Could not remove run configuration");
        }

        let exit_code = result.map_err(|e| {
            KioskError::load_failure(format!("cannot run {}: {}", self.settings.binary, e))
        })?;
        let outcome = SessionOutcome { exit_code, elapsed };
        info!(?exit_code, elapsed_ms = elapsed.as_millis() as u64, "Emulator exited");
        self.last_outcome = Some(outcome);
        Ok(outcome)
    }

    /// Kills any emulator process left behind by the session.
    pub fn terminate_strays(&mut self) -> usize {
        let killed = self.runner.terminate_strays(&self.settings.process_name);
        if killed > 0 {
            warn!(killed, name = %self.settings.process_name, "Stray emulator processes killed");
        }
        killed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Seen {
        program: String,
        args: Vec<String>,
        config: Option<String>,
        config_path: Option<PathBuf>,
    }

    struct FakeRunner {
        seen: Arc<Mutex<Seen>>,
        exit_code: Option<i32>,
    }

    impl ProcessRunner for FakeRunner {
        fn run(&mut self, program: &str, args: &[String]) -> io::Result<Option<i32>> {
            let mut seen = self.seen.lock().unwrap();
            seen.program = program.to_string();
            seen.args = args.to_vec();
            let path = PathBuf::from(&args[3]);
            seen.config = fs::read_to_string(&path).ok();
            seen.config_path = Some(path);
            Ok(self.exit_code)
        }

        fn terminate_strays(&mut self, _name: &str) -> usize {
            2
        }
    }

    fn hdmi_only() -> Vec<AudioSink> {
        vec![AudioSink {
            card: 1,
            device: 0,
            id: "HDMI".to_string(),
            name: "vc4-hdmi".to_string(),
        }]
    }

    struct Fixture {
        dir: tempfile::TempDir,
        rom: PathBuf,
        session: EmulatorSession,
        seen: Arc<Mutex<Seen>>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let cores = dir.path().join("cores");
        fs::create_dir_all(&cores).unwrap();
        fs::write(cores.join("mgba_libretro.so"), b"").unwrap();
        let rom = dir.path().join("roms/gba/Game.gba");
        fs::create_dir_all(rom.parent().unwrap()).unwrap();
        fs::write(&rom, b"rom").unwrap();

        let seen = Arc::new(Mutex::new(Seen::default()));
        let settings = EmulatorSettings {
            cores_dir: cores,
            config_root: Some(dir.path().to_path_buf()),
            ..EmulatorSettings::default()
        };
        let mut session = EmulatorSession::new(
            settings,
            Box::new(FakeRunner {
                seen: Arc::clone(&seen),
                exit_code: Some(0),
            }),
        )
        .with_sink_probe(hdmi_only);
        session.set_resolution(1280, 720);
        session.set_volume(0);
        Fixture {
            dir,
            rom,
            session,
            seen,
        }
    }

    #[test]
    fn test_launch_builds_config_and_cleans_up() {
        let mut f = fixture();
        let outcome = f.session.launch(&f.rom, "auto", "gba").unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(f.session.last_outcome(), Some(outcome));

        let seen = f.seen.lock().unwrap();
        assert_eq!(seen.program, "retroarch");
        assert_eq!(seen.args[0], "-L");
        assert!(seen.args[1].ends_with("mgba_libretro.so"));
        assert_eq!(seen.args[4], f.rom.to_string_lossy());

        let config = seen.config.as_deref().unwrap();
        assert!(config.contains("video_fullscreen_x = \"1280\""));
        assert!(config.contains("video_fullscreen_y = \"720\""));
        assert!(config.contains("audio_device = \"hw:1,0\""));
        assert!(config.contains("audio_volume = \"-60.0\""));
        assert!(config.contains("input_player1_a_btn"));

        // Le répertoire temporaire a disparu
        let config_path = seen.config_path.clone().unwrap();
        assert!(!config_path.exists());
        assert!(!config_path.parent().unwrap().exists());
        assert!(f.dir.path().exists());
    }

    #[test]
    fn test_missing_content_is_load_failure() {
        let mut f = fixture();
        let missing = f.dir.path().join("nope.gba");
        assert!(matches!(
            f.session.launch(&missing, "auto", "gba"),
            Err(KioskError::LoadFailure(_))
        ));
        assert!(f.seen.lock().unwrap().args.is_empty());
    }

    #[test]
    fn test_unknown_core_is_configuration_error() {
        let mut f = fixture();
        let rom = f.rom.clone();
        assert!(matches!(
            f.session.launch(&rom, "auto", "vectrex"),
            Err(KioskError::ConfigurationError(_))
        ));
        assert!(matches!(
            f.session.launch(&rom, "snes9x", "snes"),
            Err(KioskError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_prepare_checks_core_without_running() {
        let f = fixture();
        let (core, path) = f.session.prepare("auto", "gba").unwrap();
        assert_eq!(core, "mgba");
        assert!(path.ends_with("mgba_libretro.so"));

        assert!(matches!(
            f.session.prepare("snes9x", "snes"),
            Err(KioskError::ConfigurationError(_))
        ));
        assert!(matches!(
            f.session.prepare("auto", "vectrex"),
            Err(KioskError::ConfigurationError(_))
        ));
        assert!(f.seen.lock().unwrap().args.is_empty());
    }

    #[test]
    fn test_terminate_strays_uses_runner() {
        let mut f = fixture();
        assert_eq!(f.session.terminate_strays(), 2);
    }
}
