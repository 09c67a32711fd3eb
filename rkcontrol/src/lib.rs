//! # rkcontrol - Display ownership and playback handoff for RetroKiosk
//!
//! The kiosk owns one display. It renders its own UI and video on it, and
//! from time to time hands the whole device over to an external emulator:
//!
//! - [`display::DisplayOwner`] sets modes, holds and drops DRM master and
//!   swaps the render surface
//! - [`input::InputSource`] turns evdev devices and GPIO lines into a small
//!   action vocabulary
//! - [`pipeline::PlaybackPipeline`] is the decode/render engine contract
//!   (shipped engine: mpv over JSON IPC)
//! - [`emulator::EmulatorSession`] configures and runs one emulator title
//! - [`controller::PlaylistController`] steps the playback state machine and
//!   drives the handoff between all of the above
//!
//! The application owns every subsystem and lends them to the controller
//! once per frame through [`controller::Devices`].

pub mod controller;
pub mod display;
pub mod emulator;
pub mod errors;
pub mod input;
pub mod pipeline;
pub mod retry;

mod config_ext;

pub use config_ext::ControlConfigExt;
pub use controller::{
    Command, ControllerSettings, ControllerState, Devices, FrameView, PlayMode, PlaylistController,
};
pub use display::{DisplayLease, DisplayOwner, DisplayPolicy, ModeRequest};
pub use emulator::{EmulatorSession, EmulatorSettings, SessionOutcome};
pub use errors::{KioskError, Result};
pub use input::{Action, InputEvent, InputSettings, InputSource};
pub use pipeline::{MpvPipeline, MpvSettings, PipelineSlot, PlaybackPipeline, PlaybackSnapshot};
pub use retry::{HandoffAttempt, RetryPolicy};
