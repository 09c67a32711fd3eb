//! The application object: owns every subsystem and steps the controller
//! once per frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rkconfig::Config;
use rkcontrol::{
    ControlConfigExt, ControllerState, Devices, DisplayLease, DisplayOwner, EmulatorSession,
    FrameView, InputSource, MpvPipeline, PipelineSlot, PlaybackPipeline, PlaylistController,
};
use rkplaylist::{Library, LibraryConfigExt, LibraryScanner};
use tracing::{debug, error, info, warn};

const FRAME: Duration = Duration::from_millis(16);

/// Everything the controller borrows for one call.
struct Subsystems {
    display: DisplayOwner,
    input: InputSource,
    pipeline: PipelineSlot,
    emulator: EmulatorSession,
}

impl Subsystems {
    fn devices(&mut self) -> Devices<'_> {
        Devices {
            display: &mut self.display,
            input: &mut self.input,
            pipeline: &mut self.pipeline,
            emulator: &mut self.emulator,
        }
    }
}

pub struct App {
    subsystems: Subsystems,
    controller: PlaylistController,
    scanner: Option<LibraryScanner>,
    restore_mode: bool,
    last_state: ControllerState,
    last_status: Option<String>,
    /// Overlay last sent to the player.
    last_overlay: Option<String>,
    present_failed: bool,
}

impl App {
    /// Brings every subsystem up. Only a missing display is fatal.
    pub fn new(config: &Config) -> Result<Self> {
        let policy = config.display_policy();
        let restore_mode = policy.restore_mode_on_exit;
        let hint = config.display_device_hint();
        let mut display = DisplayOwner::initialize(hint.as_deref(), policy)
            .context("No usable display device")?;
        let mode = display
            .set_mode(config.display_mode()?)
            .context("Cannot set display mode")?;
        let output_name = &display.output().name;
        info!(output = %output_name, mode = %mode, "Display ready");

        let mut input = InputSource::linux(config.input_settings(), config.gpio_chip());
        match input.initialize() {
            Ok(count) => info!(inputs = count, "Input ready"),
            // Le kiosque reste utilisable sans manette
            Err(err) => warn!(error = %err, "No input device available"),
        }

        // mpv rend la vidéo sur la même sortie que le kiosque
        let mpv = config.mpv_settings().with_scanout(
            display.device_path(),
            &display.output().name,
            display.current_mode(),
        );
        let pipeline = PipelineSlot::new(Box::new(move || {
            MpvPipeline::spawn(&mpv).map(|p| Box::new(p) as Box<dyn PlaybackPipeline>)
        }));

        let emulator = EmulatorSession::system(config.emulator_settings());

        let paths = config.library_paths()?;
        let library = match Library::load_dir(&paths.playlists_dir) {
            Ok(library) => library,
            Err(err) => {
                warn!(error = %err, "Starting with an empty library");
                Library::default()
            }
        };
        info!(
            playlists = library.len(),
            dir = %paths.playlists_dir.display(),
            "Library loaded"
        );

        let scanner = match LibraryScanner::start(
            paths.playlists_dir.clone(),
            config.library_settle_delay(),
        ) {
            Ok(scanner) => Some(scanner),
            Err(err) => {
                warn!(error = %err, "Library scanner disabled");
                None
            }
        };

        let controller = PlaylistController::new(library, paths, config.controller_settings());

        Ok(Self {
            subsystems: Subsystems {
                display,
                input,
                pipeline,
                emulator,
            },
            last_state: controller.state(),
            controller,
            scanner,
            restore_mode,
            last_status: None,
            last_overlay: None,
            present_failed: false,
        })
    }

    /// Runs the frame loop until `running` goes false.
    pub fn run(&mut self, running: &AtomicBool, start_playlist: Option<usize>) {
        if let Some(index) = start_playlist {
            let mut devices = self.subsystems.devices();
            if let Err(err) = self.controller.select_playlist(index, &mut devices) {
                warn!(playlist = index, error = %err, "Cannot start playlist");
            }
        }

        while running.load(Ordering::SeqCst) {
            let started = Instant::now();

            let events = self.subsystems.input.poll();
            let view = {
                let mut devices = self.subsystems.devices();
                self.controller.tick(&mut devices, &events)
            };
            self.present(&view);
            self.pick_up_library();

            if let Some(rest) = FRAME.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }
        info!("Frame loop stopped");
    }

    /// Stops playback and gives every device back.
    pub fn shutdown(mut self) {
        if let Some(mut scanner) = self.scanner.take() {
            scanner.stop();
        }
        {
            let mut devices = self.subsystems.devices();
            self.controller.stop(&mut devices);
        }
        self.subsystems.pipeline.discard();
        self.subsystems.input.cleanup();
        self.subsystems.display.cleanup(self.restore_mode);
        info!("RetroKiosk stopped");
    }

    fn present(&mut self, view: &FrameView) {
        if view.state != self.last_state {
            debug!(from = %self.last_state, to = %view.state, mode = ?view.mode, "Controller state");
            self.last_state = view.state;
        }
        if view.status != self.last_status {
            if let Some(status) = &view.status {
                warn!(status = %status, "Status");
            }
            self.last_status = view.status.clone();
        }

        match self.subsystems.display.lease() {
            DisplayLease::OwnedByKiosk => {
                self.last_overlay = None;
                self.swap(view);
            }
            DisplayLease::LentToPlayer => self.update_overlay(view),
            DisplayLease::ReleasedForEmulator | DisplayLease::Reacquiring => {}
        }
    }

    /// The player draws the kiosk text over the video; only changes are sent.
    fn update_overlay(&mut self, view: &FrameView) {
        let text = view.overlay_text();
        if text == self.last_overlay {
            return;
        }
        let Some(pipeline) = self.subsystems.pipeline.current() else {
            return;
        };
        match pipeline.show_overlay(text.as_deref()) {
            Ok(()) => self.last_overlay = text,
            Err(err) => debug!(error = %err, "Overlay not shown"),
        }
    }

    fn swap(&mut self, view: &FrameView) {
        match self.subsystems.display.swap_surface() {
            Ok(_) => self.present_failed = false,
            Err(err) => {
                if !self.present_failed {
                    error!(error = %err, degraded = view.degraded, "Cannot present frame");
                }
                self.present_failed = true;
            }
        }
    }

    fn pick_up_library(&mut self) {
        let Some(library) = self.scanner.as_ref().and_then(|s| s.take_update()) else {
            return;
        };
        info!(playlists = library.len(), "Library changed");
        let mut devices = self.subsystems.devices();
        self.controller.reload(library, &mut devices);
    }
}
