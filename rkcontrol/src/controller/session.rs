//! Mutable playback state stepped by the controller on every tick.

use std::collections::HashMap;

use crate::pipeline::PlaybackSnapshot;

use super::sequencer::{MasterShuffleQueue, PlayHistory, ShuffleQueue};

const HISTORY_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub current_playlist: Option<usize>,
    pub current_item: Option<usize>,
    pub position: f64,
    pub duration: f64,
    pub is_playing: bool,
    pub shuffle_queue: ShuffleQueue,
    pub master_shuffle_queue: MasterShuffleQueue,
    /// Item each playlist was left on, so selecting it again resumes there.
    pub remembered_items: HashMap<usize, usize>,
    pub history: PlayHistory,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self {
            current_playlist: None,
            current_item: None,
            position: 0.0,
            duration: 0.0,
            is_playing: false,
            shuffle_queue: ShuffleQueue::new(),
            master_shuffle_queue: MasterShuffleQueue::new(),
            remembered_items: HashMap::new(),
            history: PlayHistory::new(HISTORY_LEN),
        }
    }
}

impl PlaybackSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A file is loaded and either playing or paused past its start.
    pub fn video_active(&self) -> bool {
        self.duration > 0.0 && (self.is_playing || self.position > 0.0)
    }

    pub fn observe(&mut self, snapshot: &PlaybackSnapshot) {
        self.position = snapshot.position;
        self.duration = snapshot.duration;
        self.is_playing = snapshot.playing;
    }

    pub fn set_current(&mut self, playlist: usize, item: usize) {
        self.current_playlist = Some(playlist);
        self.current_item = Some(item);
        self.remembered_items.insert(playlist, item);
    }

    /// Forgets position and duration; indices are kept.
    pub fn clear_playback(&mut self) {
        self.position = 0.0;
        self.duration = 0.0;
        self.is_playing = false;
    }

    /// Nothing playing: indices and playback cleared, memory kept.
    pub fn clear_current(&mut self) {
        self.current_playlist = None;
        self.current_item = None;
        self.clear_playback();
    }

    pub fn reset_sequencing(&mut self) {
        self.shuffle_queue.reset();
        self.master_shuffle_queue.reset();
        self.history.clear();
    }
}

/// Guard making auto-advance fire once per loaded item.
///
/// The record of the last advance is written before the next load is
/// issued and cleared on every fresh load. Advance is armed once the
/// position has been seen before the end window, so that a stale end
/// position left by the previous file never triggers it.
#[derive(Debug, Clone)]
pub struct AutoAdvance {
    last_item: Option<usize>,
    last_duration: f64,
    armed: bool,
    tolerance: f64,
}

impl AutoAdvance {
    pub fn new(tolerance_secs: f64) -> Self {
        Self {
            last_item: None,
            last_duration: 0.0,
            armed: false,
            tolerance: tolerance_secs.max(0.0),
        }
    }

    pub fn reset(&mut self) {
        self.last_item = None;
        self.last_duration = 0.0;
        self.armed = false;
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// True when `item` should be advanced from. A true result records the
    /// advance, so the same item never fires twice.
    pub fn check(&mut self, item: usize, snapshot: &PlaybackSnapshot) -> bool {
        if snapshot.duration <= 0.0 {
            return snapshot.ended && self.record(item, snapshot.duration);
        }
        let near_end = snapshot.position >= snapshot.duration - self.tolerance;
        if !near_end {
            self.armed = true;
            return false;
        }
        if self.armed || snapshot.ended {
            return self.record(item, snapshot.duration);
        }
        false
    }

    fn record(&mut self, item: usize, duration: f64) -> bool {
        if self.last_item == Some(item) && self.last_duration == duration {
            return false;
        }
        self.last_item = Some(item);
        self.last_duration = duration;
        true
    }
}
