//! Playlist controller: the playback state machine of the kiosk.
//!
//! The controller is stepped once per frame by [`PlaylistController::tick`].
//! Each tick consumes input events, advances the playback pipeline and, when
//! the selected item is a game, drives the handoff of the devices to the
//! emulator and back. Subsystems are not owned here: the application passes
//! them in a [`Devices`] bundle on every call.
//!
//! Launching a game spans three ticks. The first one only enters
//! [`ControllerState::LaunchingEmulator`] so the renderer can draw its
//! loading frame; the second releases the devices and blocks in the
//! emulator; the third reclaims the devices and returns to `Idle`.

mod commands;
mod handoff;
mod sequencer;
mod session;

pub use commands::{Command, command_for};
pub use handoff::{LaunchRequest, ReclaimReport};
pub use sequencer::{MasterShuffleQueue, PlayHistory, PlayMode, ShuffleQueue};
pub use session::{AutoAdvance, PlaybackSession};

use std::fmt;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rkplaylist::{Library, LibraryPaths, Resolved};
use tracing::{debug, info, warn};

use crate::display::{DisplayLease, DisplayOwner};
use crate::emulator::{EmulatorSession, SessionOutcome};
use crate::errors::{KioskError, Result};
use crate::input::{InputEvent, InputSource};
use crate::pipeline::PipelineSlot;
use crate::pipeline::time_utils::format_progress;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    PlayingMedia,
    SwitchingItem,
    /// A game is selected; the next tick blocks in the emulator.
    LaunchingEmulator,
    /// The emulator exited; the next tick reclaims the devices.
    AwaitingEmulatorExit,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::Idle => "idle",
            ControllerState::PlayingMedia => "playing",
            ControllerState::SwitchingItem => "switching",
            ControllerState::LaunchingEmulator => "launching",
            ControllerState::AwaitingEmulatorExit => "awaiting-exit",
        };
        f.write_str(name)
    }
}

/// Non-owning access to the subsystems for one controller call.
pub struct Devices<'a> {
    pub display: &'a mut DisplayOwner,
    pub input: &'a mut InputSource,
    pub pipeline: &'a mut PipelineSlot,
    pub emulator: &'a mut EmulatorSession,
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub playlist_loop: bool,
    pub shuffle: bool,
    /// Initial volume, percent.
    pub volume: u8,
    pub volume_step: u8,
    /// Window before the end of a file in which auto-advance fires.
    pub end_tolerance: Duration,
    /// Bound on the wait for the pipeline to stop before a handoff.
    pub stop_wait: RetryPolicy,
    /// Key or title of the playlist whose designated entry starts the
    /// library-wide shuffle.
    pub master_shuffle_playlist: Option<String>,
    pub master_shuffle_entry: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            playlist_loop: true,
            shuffle: false,
            volume: 80,
            volume_step: 5,
            end_tolerance: Duration::from_millis(500),
            stop_wait: RetryPolicy::from_millis(20, 50),
            master_shuffle_playlist: None,
            master_shuffle_entry: 0,
        }
    }
}

/// What the renderer needs to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameView {
    pub state: ControllerState,
    pub mode: PlayMode,
    pub lease: DisplayLease,
    pub degraded: bool,
    pub playlist_title: Option<String>,
    pub item_title: Option<String>,
    pub artist: Option<String>,
    pub position: f64,
    pub duration: f64,
    /// `position / duration` as `HH:MM:SS / HH:MM:SS`.
    pub progress: String,
    pub video_active: bool,
    pub volume: u8,
    pub status: Option<String>,
}

impl FrameView {
    /// The renderer draws only the minimal loading frame.
    pub fn is_loading(&self) -> bool {
        matches!(
            self.state,
            ControllerState::LaunchingEmulator | ControllerState::AwaitingEmulatorExit
        )
    }

    /// Overlay drawn over the video while the player holds the screen:
    /// title line, then the status line if any.
    pub fn overlay_text(&self) -> Option<String> {
        let title = self.item_title.as_ref().map(|title| match &self.artist {
            Some(artist) => format!("{title} - {artist}"),
            None => title.clone(),
        });
        let lines: Vec<String> = title.into_iter().chain(self.status.clone()).collect();
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

type Target = (usize, usize);

pub struct PlaylistController {
    library: Library,
    paths: LibraryPaths,
    settings: ControllerSettings,
    state: ControllerState,
    session: PlaybackSession,
    auto_advance: AutoAdvance,
    shuffle: bool,
    master_shuffle: bool,
    volume: u8,
    pending_launch: Option<LaunchRequest>,
    /// Game whose emulator could not be run; skipped after the reclaim.
    failed_launch: Option<Target>,
    /// The pending launch is already the skip after a failed one.
    launch_skipped: bool,
    last_outcome: Option<SessionOutcome>,
    last_reclaim: Option<ReclaimReport>,
    status: Option<String>,
    rng: StdRng,
}

impl fmt::Debug for PlaylistController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaylistController")
            .field("state", &self.state)
            .field("mode", &self.mode())
            .field("playlists", &self.library.len())
            .field("current_playlist", &self.session.current_playlist)
            .field("current_item", &self.session.current_item)
            .field("status", &self.status)
            .finish()
    }
}

impl PlaylistController {
    pub fn new(library: Library, paths: LibraryPaths, settings: ControllerSettings) -> Self {
        Self::with_rng(library, paths, settings, StdRng::from_os_rng())
    }

    /// Controller with a given random source, for reproducible shuffles.
    pub fn with_rng(
        library: Library,
        paths: LibraryPaths,
        settings: ControllerSettings,
        rng: StdRng,
    ) -> Self {
        Self {
            auto_advance: AutoAdvance::new(settings.end_tolerance.as_secs_f64()),
            shuffle: settings.shuffle,
            volume: settings.volume.min(100),
            library,
            paths,
            settings,
            state: ControllerState::Idle,
            session: PlaybackSession::new(),
            master_shuffle: false,
            pending_launch: None,
            failed_launch: None,
            launch_skipped: false,
            last_outcome: None,
            last_reclaim: None,
            status: None,
            rng,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn mode(&self) -> PlayMode {
        if self.master_shuffle {
            PlayMode::MasterShuffle
        } else if self.shuffle {
            PlayMode::Shuffle
        } else {
            PlayMode::Sequential
        }
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn pending_launch(&self) -> Option<&LaunchRequest> {
        self.pending_launch.as_ref()
    }

    pub fn last_outcome(&self) -> Option<SessionOutcome> {
        self.last_outcome
    }

    pub fn last_reclaim(&self) -> Option<&ReclaimReport> {
        self.last_reclaim.as_ref()
    }

    /// One frame: input, pipeline, handoff steps. Returns the view to draw.
    pub fn tick(&mut self, devices: &mut Devices<'_>, events: &[InputEvent]) -> FrameView {
        match self.state {
            ControllerState::LaunchingEmulator => self.run_emulator(devices),
            ControllerState::AwaitingEmulatorExit => self.finish_handoff(devices),
            _ => {
                for event in events {
                    if let Some(command) = command_for(event) {
                        self.handle(command, devices);
                        if self.state == ControllerState::LaunchingEmulator {
                            break;
                        }
                    }
                }
                self.observe_pipeline(devices);
            }
        }
        self.frame_view(devices.display)
    }

    /// Runs one command. Failures end up on the status line.
    pub fn handle(&mut self, command: Command, devices: &mut Devices<'_>) {
        debug!(?command, state = %self.state, "Command");
        let result = match command {
            Command::TogglePause => self.toggle_pause(devices),
            Command::Next => self.next(devices),
            Command::Previous => self.previous(devices),
            Command::NextPlaylist => self.step_playlist(1, devices),
            Command::PreviousPlaylist => self.step_playlist(-1, devices),
            Command::Volume(steps) => self.adjust_volume(steps, devices),
            Command::ToggleShuffle => {
                self.toggle_shuffle();
                Ok(())
            }
            Command::Stop => {
                self.stop(devices);
                Ok(())
            }
        };
        if let Err(err) = result {
            warn!(?command, error = %err, "Command failed");
            self.status = Some(err.to_string());
        }
    }

    /// Starts playlist `index` at the item it was left on, or its first one.
    pub fn select_playlist(&mut self, index: usize, devices: &mut Devices<'_>) -> Result<()> {
        let playlist = self
            .library
            .get(index)
            .ok_or_else(|| KioskError::configuration(format!("no playlist at index {index}")))?;
        if playlist.is_empty() {
            let err = KioskError::load_failure(format!("playlist '{}' is empty", playlist.title));
            self.status = Some(err.to_string());
            return Err(err);
        }
        let len = playlist.len();
        info!(playlist = %playlist.title, index, "Playlist selected");

        if self.master_shuffle && self.trigger_playlist() != Some(index) {
            debug!("Leaving master shuffle");
            self.master_shuffle = false;
        }
        let item = self
            .session
            .remembered_items
            .get(&index)
            .copied()
            .filter(|i| *i < len)
            .unwrap_or(0);
        self.switch_to((index, item), true, devices)
    }

    /// Next item according to the play mode.
    pub fn next(&mut self, devices: &mut Devices<'_>) -> Result<()> {
        match self.current() {
            Some(from) if self.state != ControllerState::Idle => self.advance_from(from, devices),
            _ => self.resume(devices),
        }
    }

    /// Previous item: one step back in sequential mode, the previously
    /// played item in shuffle modes.
    pub fn previous(&mut self, devices: &mut Devices<'_>) -> Result<()> {
        let from = match self.current() {
            Some(from) if self.state != ControllerState::Idle => from,
            _ => return self.resume(devices),
        };
        let target = match self.mode() {
            PlayMode::Sequential => {
                let len = self.library.get(from.0).map(|p| p.len()).unwrap_or(0);
                if from.1 > 0 {
                    (from.0, from.1 - 1)
                } else if len > 0 {
                    (from.0, len - 1)
                } else {
                    from
                }
            }
            PlayMode::Shuffle | PlayMode::MasterShuffle => {
                self.session.history.step_back().unwrap_or(from)
            }
        };
        self.switch_to(target, false, devices)
    }

    pub fn toggle_pause(&mut self, devices: &mut Devices<'_>) -> Result<()> {
        match self.state {
            ControllerState::PlayingMedia => match devices.pipeline.current() {
                Some(pipeline) => {
                    if pipeline.is_playing() {
                        pipeline.pause()
                    } else {
                        pipeline.play()
                    }
                }
                None => self.resume(devices),
            },
            ControllerState::Idle => self.resume(devices),
            _ => Ok(()),
        }
    }

    /// Stops playback; indices are kept so playback can resume.
    pub fn stop(&mut self, devices: &mut Devices<'_>) {
        match self.state {
            ControllerState::AwaitingEmulatorExit => return,
            ControllerState::LaunchingEmulator => {
                if let Some(request) = self.pending_launch.take() {
                    info!(title = %request.title, "Emulator launch cancelled");
                }
            }
            _ => {}
        }
        self.launch_skipped = false;
        Self::stop_player(devices);
        self.session.clear_playback();
        self.state = ControllerState::Idle;
    }

    pub fn adjust_volume(&mut self, steps: i32, devices: &mut Devices<'_>) -> Result<()> {
        let step = i32::from(self.settings.volume_step);
        let volume = (i32::from(self.volume) + steps * step).clamp(0, 100) as u8;
        if volume == self.volume {
            return Ok(());
        }
        self.volume = volume;
        debug!(volume, "Volume");
        devices.emulator.set_volume(volume);
        match devices.pipeline.current() {
            Some(pipeline) => pipeline.set_volume(volume),
            None => Ok(()),
        }
    }

    pub fn toggle_shuffle(&mut self) {
        self.master_shuffle = false;
        self.shuffle = !self.shuffle;
        self.session.reset_sequencing();
        info!(mode = ?self.mode(), "Play mode changed");
    }

    /// Swaps in a new library snapshot. Playlists are matched by identity,
    /// so what is playing keeps playing if its playlist survived.
    pub fn reload(&mut self, library: Library, devices: &mut Devices<'_>) {
        let current = self
            .session
            .current_playlist
            .and_then(|p| self.library.get(p))
            .map(|p| p.identity());
        let remembered: Vec<(String, usize)> = self
            .session
            .remembered_items
            .iter()
            .filter_map(|(p, i)| self.library.get(*p).map(|pl| (pl.identity(), *i)))
            .collect();

        self.library = library;
        self.session.reset_sequencing();

        let position_of = |library: &Library, identity: &str| {
            library.playlists.iter().position(|p| p.identity() == identity)
        };
        self.session.remembered_items = remembered
            .into_iter()
            .filter_map(|(identity, item)| position_of(&self.library, &identity).map(|p| (p, item)))
            .collect();

        if self.master_shuffle && self.trigger_playlist().is_none() {
            self.master_shuffle = false;
        }

        if let Some(identity) = current {
            let moved = position_of(&self.library, &identity);
            let item_still_there = match (moved, self.session.current_item) {
                (Some(p), Some(i)) => self.library.get(p).map(|pl| i < pl.len()).unwrap_or(false),
                (Some(_), None) => true,
                (None, _) => false,
            };
            if item_still_there {
                self.session.current_playlist = moved;
            } else if self.state != ControllerState::AwaitingEmulatorExit {
                warn!(playlist = %identity, "Current playlist changed under playback, stopping");
                self.stop(devices);
                self.session.clear_current();
            }
        }
        info!(playlists = self.library.len(), "Library reloaded");
    }

    /// View of the current state for the renderer.
    pub fn frame_view(&self, display: &DisplayOwner) -> FrameView {
        let playlist = self.session.current_playlist.and_then(|p| self.library.get(p));
        let item = playlist
            .zip(self.session.current_item)
            .and_then(|(p, i)| p.get(i));
        FrameView {
            state: self.state,
            mode: self.mode(),
            lease: display.lease(),
            degraded: display.is_degraded(),
            playlist_title: playlist.map(|p| p.title.clone()),
            item_title: item.map(|i| i.title.clone()),
            artist: item.map(|i| i.artist.clone()).filter(|a| !a.is_empty()),
            position: self.session.position,
            duration: self.session.duration,
            progress: format_progress(self.session.position, self.session.duration),
            video_active: self.session.video_active(),
            volume: self.volume,
            status: self.status.clone(),
        }
    }

    fn current(&self) -> Option<Target> {
        Some((self.session.current_playlist?, self.session.current_item?))
    }

    /// Restarts the playlist last played, or the first one.
    fn resume(&mut self, devices: &mut Devices<'_>) -> Result<()> {
        if self.library.is_empty() {
            return Err(KioskError::configuration("library is empty"));
        }
        let index = self
            .session
            .current_playlist
            .filter(|p| *p < self.library.len())
            .unwrap_or(0);
        self.select_playlist(index, devices)
    }

    fn step_playlist(&mut self, delta: i64, devices: &mut Devices<'_>) -> Result<()> {
        let count = self.library.len();
        if count == 0 {
            return Err(KioskError::configuration("library is empty"));
        }
        let index = match self.session.current_playlist {
            Some(current) => (current as i64 + delta).rem_euclid(count as i64) as usize,
            None => 0,
        };
        self.select_playlist(index, devices)
    }

    fn trigger_playlist(&self) -> Option<usize> {
        self.settings
            .master_shuffle_playlist
            .as_deref()
            .and_then(|name| self.library.find(name))
    }

    fn is_master_trigger(&self, target: Target) -> bool {
        self.trigger_playlist() == Some(target.0) && target.1 == self.settings.master_shuffle_entry
    }

    fn successor(&mut self, from: Target) -> Option<Target> {
        match self.mode() {
            PlayMode::MasterShuffle => self.take_master(),
            PlayMode::Shuffle => {
                let playlist = self.library.get(from.0)?;
                let identity = playlist.identity();
                self.session
                    .shuffle_queue
                    .take(&identity, playlist.len(), &mut self.rng)
                    .map(|item| (from.0, item))
            }
            PlayMode::Sequential => {
                let len = self.library.get(from.0)?.len();
                let next = from.1 + 1;
                if next < len {
                    Some((from.0, next))
                } else if self.settings.playlist_loop && len > 0 {
                    Some((from.0, 0))
                } else {
                    None
                }
            }
        }
    }

    fn take_master(&mut self) -> Option<Target> {
        let trigger = self.trigger_playlist();
        let library = &self.library;
        let size: usize = library
            .playlists
            .iter()
            .enumerate()
            .filter(|(p, _)| Some(*p) != trigger)
            .map(|(_, playlist)| playlist.len())
            .sum();
        self.session
            .master_shuffle_queue
            .take_with("library", size, &mut self.rng, || {
                library
                    .playlists
                    .iter()
                    .enumerate()
                    .filter(|(p, _)| Some(*p) != trigger)
                    .flat_map(|(p, playlist)| (0..playlist.len()).map(move |i| (p, i)))
                    .collect()
            })
    }

    fn advance_from(&mut self, from: Target, devices: &mut Devices<'_>) -> Result<()> {
        match self.successor(from) {
            Some(target) => self.switch_to(target, true, devices),
            None => {
                self.park(from.0, devices);
                Ok(())
            }
        }
    }

    /// End of a non-looping playlist: stopped, parked on the first item.
    fn park(&mut self, playlist: usize, devices: &mut Devices<'_>) {
        info!(playlist, "End of playlist");
        self.stop(devices);
        self.session.set_current(playlist, 0);
    }

    /// Loads `target`; on an item failure skips forward once, and gives up
    /// for this cycle if that fails too.
    fn switch_to(&mut self, target: Target, record: bool, devices: &mut Devices<'_>) -> Result<()> {
        self.state = ControllerState::SwitchingItem;
        let err = match self.start_item(target, record, devices) {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        if !err.is_item_failure() {
            return Err(self.halt(err, devices));
        }
        warn!(playlist = target.0, item = target.1, error = %err, "Item failed, skipping");

        match self.successor(target) {
            Some(skip) if skip != target => match self.start_item(skip, true, devices) {
                Ok(()) => Ok(()),
                Err(err) => Err(self.halt(err, devices)),
            },
            _ => Err(self.halt(err, devices)),
        }
    }

    /// Stops the pipeline and takes the screen back for the kiosk frame.
    fn stop_player(devices: &mut Devices<'_>) {
        if let Some(pipeline) = devices.pipeline.current() {
            if let Err(err) = pipeline.stop() {
                warn!(error = %err, "Pipeline stop failed");
            }
        }
        if let Err(err) = devices.display.reclaim_from_player() {
            warn!(error = %err, "Display not reclaimed from player");
        }
    }

    fn halt(&mut self, err: KioskError, devices: &mut Devices<'_>) -> KioskError {
        warn!(error = %err, "Playback halted");
        self.stop(devices);
        self.status = Some(err.to_string());
        err
    }

    fn start_item(&mut self, target: Target, record: bool, devices: &mut Devices<'_>) -> Result<()> {
        if self.is_master_trigger(target) {
            return self.enter_master_shuffle(devices);
        }
        let (index, position) = target;
        let playlist = self
            .library
            .get(index)
            .ok_or_else(|| KioskError::configuration(format!("no playlist at index {index}")))?;
        let item = playlist.get(position).cloned().ok_or_else(|| {
            KioskError::load_failure(format!("no item {position} in '{}'", playlist.title))
        })?;
        let resolver = self.paths.resolver_for(playlist);

        self.session.set_current(index, position);
        if record {
            self.session.history.push(target);
        }
        self.session.clear_playback();

        if let Some(defect) = &item.defect {
            return Err(KioskError::load_failure(format!(
                "malformed entry '{}': {}",
                item.path, defect
            )));
        }
        let resolved = resolver.resolve(&item.path);
        if let Resolved::Missing(raw) = &resolved {
            return Err(KioskError::load_failure(format!("missing file: {raw}")));
        }

        if item.is_game() {
            let Resolved::Found(content) = resolved else {
                return Err(KioskError::load_failure(format!("not a local file: {}", item.path)));
            };
            // Un core absent ne doit pas coûter un transfert d'écran
            let (core, _) = devices
                .emulator
                .prepare(&item.emulator_core, &item.emulator_system)?;
            // L'écran de chargement est dessiné par le kiosque
            Self::stop_player(devices);
            info!(title = %item.title, system = %item.emulator_system, core = %core, "Emulator launch scheduled");
            self.pending_launch = Some(LaunchRequest {
                playlist: index,
                item: position,
                title: item.title.clone(),
                content,
                core: item.emulator_core.clone(),
                system: item.emulator_system.clone(),
            });
            self.state = ControllerState::LaunchingEmulator;
            return Ok(());
        }

        let location = resolved.as_string();
        if let Err(err) = self.load_pipeline(&location, &item, devices) {
            if matches!(err, KioskError::PipelineError(_) | KioskError::Io(_)) {
                devices.pipeline.discard();
            }
            return Err(err);
        }
        self.auto_advance.reset();
        self.status = None;
        self.launch_skipped = false;
        self.state = ControllerState::PlayingMedia;
        info!(playlist = index, item = position, title = %item.title, "Playing");
        Ok(())
    }

    fn load_pipeline(
        &mut self,
        location: &str,
        item: &rkplaylist::PlaylistItem,
        devices: &mut Devices<'_>,
    ) -> Result<()> {
        if let Err(err) = devices.display.lend_to_player() {
            warn!(error = %err, "Display not lent to player");
        }
        let pipeline = devices.pipeline.get_or_create()?;
        pipeline.set_volume(self.volume)?;
        pipeline.load(location, item.trim_start, item.trim_end, item.looped)?;
        pipeline.play()
    }

    fn enter_master_shuffle(&mut self, devices: &mut Devices<'_>) -> Result<()> {
        info!("Entering master shuffle");
        self.master_shuffle = true;
        self.session.master_shuffle_queue.reset();
        match self.take_master() {
            Some(target) => self.start_item(target, true, devices),
            None => {
                self.master_shuffle = false;
                Err(KioskError::load_failure("nothing to shuffle"))
            }
        }
    }

    fn observe_pipeline(&mut self, devices: &mut Devices<'_>) {
        if self.state != ControllerState::PlayingMedia {
            return;
        }
        let snapshot = devices.pipeline.snapshot();
        self.session.observe(&snapshot);

        let Some(from) = self.current() else {
            return;
        };
        let looped = self
            .library
            .get(from.0)
            .and_then(|p| p.get(from.1))
            .map(|i| i.looped)
            .unwrap_or(false);
        if looped || !self.auto_advance.check(from.1, &snapshot) {
            return;
        }
        debug!(playlist = from.0, item = from.1, duration = snapshot.duration, "Auto-advance");
        if let Err(err) = self.advance_from(from, devices) {
            warn!(error = %err, "Auto-advance failed");
        }
    }

    fn run_emulator(&mut self, devices: &mut Devices<'_>) {
        let Some(request) = self.pending_launch.take() else {
            self.state = ControllerState::Idle;
            return;
        };
        let result =
            handoff::release_and_launch(devices, &request, &self.settings.stop_wait, self.volume);
        self.state = ControllerState::AwaitingEmulatorExit;
        match result {
            Ok(outcome) => {
                self.status = None;
                self.launch_skipped = false;
                self.last_outcome = Some(outcome);
            }
            Err(err) => {
                warn!(title = %request.title, error = %err, "Emulator session failed");
                self.status = Some(format!("{}: {}", request.title, err));
                if err.is_item_failure() {
                    self.failed_launch = Some((request.playlist, request.item));
                }
            }
        }
    }

    fn finish_handoff(&mut self, devices: &mut Devices<'_>) {
        let report = handoff::reclaim(devices);
        if let Some(status) = report.status() {
            self.status = Some(status);
        }
        self.last_reclaim = Some(report);
        self.session.clear_current();
        self.auto_advance.reset();
        self.state = ControllerState::Idle;

        if let Some(failed) = self.failed_launch.take() {
            self.skip_failed_launch(failed, devices);
        }
    }

    /// After a game could not be run: move on once, like any failed item.
    /// A second failure in a row leaves the kiosk idle with the status shown.
    fn skip_failed_launch(&mut self, failed: Target, devices: &mut Devices<'_>) {
        if std::mem::take(&mut self.launch_skipped) {
            warn!(playlist = failed.0, item = failed.1, "Emulator failed again, playback stopped");
            return;
        }
        let Some(next) = self.successor(failed).filter(|next| *next != failed) else {
            return;
        };
        info!(playlist = next.0, item = next.1, "Skipping game that failed to launch");
        self.launch_skipped = true;
        if let Err(err) = self.switch_to(next, true, devices) {
            warn!(error = %err, "Skip after failed launch failed");
        }
        if self.state != ControllerState::LaunchingEmulator {
            self.launch_skipped = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ControllerSettings::default();
        assert!(settings.playlist_loop);
        assert_eq!(settings.end_tolerance, Duration::from_millis(500));
    }

    fn view(item_title: Option<&str>, artist: Option<&str>, status: Option<&str>) -> FrameView {
        FrameView {
            state: ControllerState::PlayingMedia,
            mode: PlayMode::Sequential,
            lease: DisplayLease::LentToPlayer,
            degraded: false,
            playlist_title: Some("clips".to_string()),
            item_title: item_title.map(str::to_string),
            artist: artist.map(str::to_string),
            position: 0.0,
            duration: 0.0,
            progress: String::new(),
            video_active: true,
            volume: 80,
            status: status.map(str::to_string),
        }
    }

    #[test]
    fn test_overlay_text() {
        assert_eq!(view(None, None, None).overlay_text(), None);
        assert_eq!(
            view(Some("Intro"), Some("Studio"), None).overlay_text().as_deref(),
            Some("Intro - Studio")
        );
        assert_eq!(
            view(Some("Intro"), None, Some("Load failure: x")).overlay_text().as_deref(),
            Some("Intro\nLoad failure: x")
        );
        assert_eq!(
            view(None, None, Some("Input unavailable")).overlay_text().as_deref(),
            Some("Input unavailable")
        );
    }

    #[test]
    fn test_mode_follows_flags() {
        let mut controller = PlaylistController::with_rng(
            Library::default(),
            LibraryPaths::default(),
            ControllerSettings::default(),
            StdRng::seed_from_u64(0),
        );
        assert_eq!(controller.mode(), PlayMode::Sequential);
        controller.toggle_shuffle();
        assert_eq!(controller.mode(), PlayMode::Shuffle);
        controller.toggle_shuffle();
        assert_eq!(controller.mode(), PlayMode::Sequential);
        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(controller.state().to_string(), "idle");
    }
}
