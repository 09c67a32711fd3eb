//! Hardware seam of the display owner.

use std::fmt;
use std::path::PathBuf;

use crate::errors::Result;

/// One mode an output can scan out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub refresh: u32,
    pub preferred: bool,
}

impl ModeInfo {
    pub fn new(width: u32, height: u32, refresh: u32) -> Self {
        Self {
            name: format!("{width}x{height}"),
            width,
            height,
            refresh,
            preferred: false,
        }
    }

    pub fn preferred(mut self) -> Self {
        self.preferred = true;
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl fmt::Display for ModeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.refresh)
    }
}

/// A physical connector (HDMI-A-1, DSI-1, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    /// Backend-specific handle.
    pub id: u32,
    pub name: String,
    pub connected: bool,
    /// Modes in the order the hardware reports them.
    pub modes: Vec<ModeInfo>,
}

impl OutputInfo {
    pub fn preferred_mode(&self) -> Option<&ModeInfo> {
        self.modes
            .iter()
            .find(|m| m.preferred)
            .or_else(|| self.modes.first())
    }

    pub fn find_mode(&self, width: u32, height: u32) -> Option<&ModeInfo> {
        let matching: Vec<&ModeInfo> = self
            .modes
            .iter()
            .filter(|m| m.width == width && m.height == height)
            .collect();
        // À taille égale, on préfère le mode marqué préféré
        matching
            .iter()
            .find(|m| m.preferred)
            .or_else(|| matching.first())
            .copied()
    }
}

/// Scanout configuration found on an output before the kiosk touched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanoutConfig {
    pub output: u32,
    pub mode: Option<ModeInfo>,
}

/// Opaque handle on a render surface allocated by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u32);

/// What the display owner needs from a display device. The DRM backend
/// implements it for real cards; tests implement it with doubles.
pub trait DisplayDevice: Send {
    fn name(&self) -> String;

    /// Device node, for players that open the same card themselves.
    fn path(&self) -> Option<PathBuf> {
        None
    }

    /// Every output of the device. Fails for devices without scanout
    /// capability (render nodes, compute-only GPUs).
    fn outputs(&mut self) -> Result<Vec<OutputInfo>>;

    /// Captures the current scanout of `output` so it can be restored.
    fn save_scanout(&mut self, output: &OutputInfo) -> Result<Option<ScanoutConfig>>;

    fn restore_scanout(&mut self, output: &OutputInfo, saved: &ScanoutConfig) -> Result<()>;

    /// Turns the scanout of `output` off.
    fn disable_scanout(&mut self, output: &OutputInfo) -> Result<()>;

    fn create_surface(&mut self, width: u32, height: u32) -> Result<SurfaceId>;

    fn destroy_surface(&mut self, surface: SurfaceId);

    /// Full modeset: programs `mode` on `output` and scans `surface` out.
    fn modeset(&mut self, output: &OutputInfo, mode: &ModeInfo, surface: SurfaceId) -> Result<()>;

    /// Queues `surface` for scanout at the next vblank, keeping the mode.
    /// Returns false when the previous flip is still pending.
    fn flip(&mut self, output: &OutputInfo, surface: SurfaceId) -> Result<bool>;

    fn set_master(&mut self) -> Result<()>;

    /// Drops master without closing the device.
    fn drop_master(&mut self) -> Result<()>;
}
