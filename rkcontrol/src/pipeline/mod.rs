//! Playback pipeline contract.
//!
//! The controller only needs load/play/pause/stop/seek, a volume, and a
//! pollable position and duration. Engines write their state from their
//! own thread into a [`SharedPlayback`] snapshot; the main loop reads it.

mod mpv;
pub mod time_utils;

pub use mpv::{MpvPipeline, MpvSettings};

use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::errors::{KioskError, Result};

/// State of the pipeline as last reported by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackSnapshot {
    pub position: f64,
    pub duration: f64,
    pub playing: bool,
    /// End of file reached (and not looping).
    pub ended: bool,
}

/// Snapshot shared between an engine thread and the main loop.
#[derive(Debug, Clone, Default)]
pub struct SharedPlayback {
    inner: Arc<RwLock<PlaybackSnapshot>>,
}

impl SharedPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> PlaybackSnapshot {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut PlaybackSnapshot)) {
        match self.inner.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Forgets the previous file so stale values never leak into the next
    /// one.
    pub fn reset(&self) {
        self.update(|s| *s = PlaybackSnapshot::default());
    }
}

/// A decode/render engine for local media and streams.
pub trait PlaybackPipeline: Send {
    fn load(&mut self, path: &str, trim_start: Option<f64>, trim_end: Option<f64>, looped: bool) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn seek(&mut self, seconds: f64) -> Result<()>;

    /// 0..=100.
    fn set_volume(&mut self, percent: u8) -> Result<()>;

    fn position(&self) -> f64;

    fn duration(&self) -> f64;

    fn is_playing(&self) -> bool;

    fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            position: self.position(),
            duration: self.duration(),
            playing: self.is_playing(),
            ended: false,
        }
    }

    /// Text drawn over the video, `None` to clear it. Engines without an
    /// on-screen display ignore it.
    fn show_overlay(&mut self, _text: Option<&str>) -> Result<()> {
        Ok(())
    }
}

/// Builds pipelines. Closures returning a pipeline are factories too.
pub trait PipelineFactory: Send {
    fn create(&mut self) -> Result<Box<dyn PlaybackPipeline>>;
}

impl<F> PipelineFactory for F
where
    F: FnMut() -> Result<Box<dyn PlaybackPipeline>> + Send,
{
    fn create(&mut self) -> Result<Box<dyn PlaybackPipeline>> {
        self()
    }
}

/// The current pipeline instance, built lazily from a factory.
///
/// After an emulator session the instance is discarded, never resumed:
/// its engine lost the display and its state can no longer be trusted.
pub struct PipelineSlot {
    factory: Box<dyn PipelineFactory>,
    current: Option<Box<dyn PlaybackPipeline>>,
    generation: u64,
}

impl fmt::Debug for PipelineSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineSlot")
            .field("active", &self.current.is_some())
            .field("generation", &self.generation)
            .finish()
    }
}

impl PipelineSlot {
    pub fn new(factory: Box<dyn PipelineFactory>) -> Self {
        Self {
            factory,
            current: None,
            generation: 0,
        }
    }

    /// The live pipeline, building one if needed.
    pub fn get_or_create(&mut self) -> Result<&mut Box<dyn PlaybackPipeline>> {
        if self.current.is_none() {
            let pipeline = self.factory.create()?;
            self.generation += 1;
            debug!(generation = self.generation, "Playback pipeline created");
            self.current = Some(pipeline);
        }
        self.current
            .as_mut()
            .ok_or_else(|| KioskError::pipeline("no pipeline"))
    }

    /// The live pipeline, if any. Never builds one.
    pub fn current(&mut self) -> Option<&mut Box<dyn PlaybackPipeline>> {
        self.current.as_mut()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.current
            .as_deref()
            .map(|p| p.snapshot())
            .unwrap_or_default()
    }

    /// Drops the live instance; the next `get_or_create` builds a new one.
    pub fn discard(&mut self) {
        if self.current.take().is_some() {
            debug!(generation = self.generation, "Playback pipeline discarded");
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Number of pipelines built so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
