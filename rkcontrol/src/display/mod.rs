//! Display ownership.
//!
//! [`DisplayOwner`] is the only component that talks to the display device.
//! It picks the output, sets the mode, owns the double-buffered render
//! surface, and hands exclusive (master) access over to the external
//! emulator and back. Lease transitions are driven by the playlist
//! controller only.
//!
//! While media plays, scanout is lent to the player, which renders the
//! video and the kiosk overlay on the same card and connector. The owner's
//! own surfaces are shown whenever nothing is playing.

mod device;
mod drm_card;

pub use device::{DisplayDevice, ModeInfo, OutputInfo, ScanoutConfig, SurfaceId};
pub use drm_card::DrmCard;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, error, info, warn};

use crate::errors::{KioskError, Result};
use crate::retry::{HandoffAttempt, RetryPolicy, retry};

/// Who currently holds exclusive access to the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayLease {
    OwnedByKiosk,
    /// The media player renders to the output.
    LentToPlayer,
    ReleasedForEmulator,
    Reacquiring,
}

impl fmt::Display for DisplayLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DisplayLease::OwnedByKiosk => "owned",
            DisplayLease::LentToPlayer => "lent",
            DisplayLease::ReleasedForEmulator => "released",
            DisplayLease::Reacquiring => "reacquiring",
        };
        f.write_str(label)
    }
}

/// Mode requested by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeRequest {
    /// Preferred mode of the output, or its first one.
    #[default]
    Auto,
    Exact { width: u32, height: u32 },
}

impl FromStr for ModeRequest {
    type Err = KioskError;

    /// Parses `auto` or `WIDTHxHEIGHT`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("auto") {
            return Ok(ModeRequest::Auto);
        }
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| KioskError::configuration(format!("Invalid display mode '{s}'")))?;
        let width = w.trim().parse::<u32>();
        let height = h.trim().parse::<u32>();
        match (width, height) {
            (Ok(width), Ok(height)) if width > 0 && height > 0 => {
                Ok(ModeRequest::Exact { width, height })
            }
            _ => Err(KioskError::configuration(format!("Invalid display mode '{s}'"))),
        }
    }
}

/// Hardware-dependent choices, all coming from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayPolicy {
    /// Turn scanout off before dropping master. Some hardware corrupts the
    /// next frame otherwise; other hardware fails to restart if we do.
    pub disable_output_on_release: bool,
    /// Put back the configuration found at startup when the kiosk exits.
    pub restore_mode_on_exit: bool,
    pub master_retry: RetryPolicy,
}

impl Default for DisplayPolicy {
    fn default() -> Self {
        Self {
            disable_output_on_release: false,
            restore_mode_on_exit: true,
            master_retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SurfacePair {
    front: SurfaceId,
    back: SurfaceId,
    width: u32,
    height: u32,
}

pub struct DisplayOwner {
    device: Option<Box<dyn DisplayDevice>>,
    device_name: String,
    device_path: Option<PathBuf>,
    output: OutputInfo,
    saved: Option<ScanoutConfig>,
    request: ModeRequest,
    mode: Option<ModeInfo>,
    surfaces: Option<SurfacePair>,
    lease: DisplayLease,
    degraded: bool,
    last_attempt: Option<HandoffAttempt>,
    policy: DisplayPolicy,
}

impl fmt::Debug for DisplayOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayOwner")
            .field("device", &self.device_name)
            .field("output", &self.output.name)
            .field("mode", &self.mode)
            .field("lease", &self.lease)
            .field("degraded", &self.degraded)
            .finish()
    }
}

impl DisplayOwner {
    /// Opens the DRM cards (only `device_hint` when given) and selects the
    /// first connected output.
    pub fn initialize(device_hint: Option<&Path>, policy: DisplayPolicy) -> Result<Self> {
        let devices = DrmCard::enumerate(device_hint)
            .into_iter()
            .map(|card| Box::new(card) as Box<dyn DisplayDevice>)
            .collect();
        Self::from_devices(devices, policy)
    }

    /// Selects the first connected output among `devices`, in order.
    pub fn from_devices(devices: Vec<Box<dyn DisplayDevice>>, policy: DisplayPolicy) -> Result<Self> {
        for mut device in devices {
            let name = device.name();
            let path = device.path();
            let outputs = match device.outputs() {
                Ok(outputs) if !outputs.is_empty() => outputs,
                Ok(_) => {
                    debug!(device = %name, "Skipping device without outputs");
                    continue;
                }
                Err(err) => {
                    debug!(device = %name, error = %err, "Skipping non-scanout device");
                    continue;
                }
            };

            let Some(output) = outputs.into_iter().find(|o| o.connected) else {
                debug!(device = %name, "No connected output");
                continue;
            };

            let saved = device.save_scanout(&output).unwrap_or_else(|err| {
                warn!(device = %name, error = %err, "Could not save current scanout");
                None
            });

            info!(
                device = %name,
                output = %output.name,
                modes = output.modes.len(),
                "Display output selected"
            );

            return Ok(Self {
                device: Some(device),
                device_name: name,
                device_path: path,
                output,
                saved,
                request: ModeRequest::Auto,
                mode: None,
                surfaces: None,
                lease: DisplayLease::OwnedByKiosk,
                degraded: false,
                last_attempt: None,
                policy,
            });
        }

        Err(KioskError::resource_unavailable("no connected display output"))
    }

    /// Applies `request` and (re)allocates the render surfaces at its size.
    pub fn set_mode(&mut self, request: ModeRequest) -> Result<ModeInfo> {
        if self.lease != DisplayLease::OwnedByKiosk {
            return Err(KioskError::resource_unavailable(format!(
                "cannot set mode while display is {}",
                self.lease
            )));
        }

        let mode = match request {
            ModeRequest::Auto => self.output.preferred_mode(),
            ModeRequest::Exact { width, height } => self.output.find_mode(width, height),
        }
        .cloned()
        .ok_or_else(|| {
            KioskError::configuration(format!(
                "no mode matching {request:?} on {}",
                self.output.name
            ))
        })?;

        let device = self
            .device
            .as_mut()
            .ok_or_else(|| KioskError::resource_unavailable("display closed"))?;

        let surfaces = match self.surfaces {
            Some(pair) if pair.width == mode.width && pair.height == mode.height => pair,
            previous => {
                if let Some(pair) = previous {
                    device.destroy_surface(pair.front);
                    device.destroy_surface(pair.back);
                    self.surfaces = None;
                }
                let front = device.create_surface(mode.width, mode.height)?;
                let back = match device.create_surface(mode.width, mode.height) {
                    Ok(back) => back,
                    Err(err) => {
                        device.destroy_surface(front);
                        return Err(err);
                    }
                };
                SurfacePair {
                    front,
                    back,
                    width: mode.width,
                    height: mode.height,
                }
            }
        };
        self.surfaces = Some(surfaces);

        device.modeset(&self.output, &mode, surfaces.front)?;

        info!(output = %self.output.name, mode = %mode, "Display mode set");
        self.request = request;
        self.mode = Some(mode.clone());
        Ok(mode)
    }

    /// Applies the last requested mode again.
    pub fn reset_mode(&mut self) -> Result<ModeInfo> {
        self.set_mode(self.request)
    }

    /// Lets the media player take the output: drops master and leaves the
    /// picture up. When the owner is degraded it never got master back, so
    /// only the lease changes.
    pub fn lend_to_player(&mut self) -> Result<()> {
        match self.lease {
            DisplayLease::LentToPlayer => Ok(()),
            DisplayLease::ReleasedForEmulator => Err(KioskError::resource_unavailable(
                "cannot lend display while it is released",
            )),
            DisplayLease::Reacquiring => {
                self.lease = DisplayLease::LentToPlayer;
                Ok(())
            }
            DisplayLease::OwnedByKiosk => {
                let device = self
                    .device
                    .as_mut()
                    .ok_or_else(|| KioskError::resource_unavailable("display closed"))?;
                device.drop_master()?;
                self.lease = DisplayLease::LentToPlayer;
                debug!(output = %self.output.name, "Display lent to player");
                Ok(())
            }
        }
    }

    /// Takes the output back from the player and programs our mode again,
    /// the player having left its own framebuffer on the CRTC. No-op unless
    /// the display is lent.
    pub fn reclaim_from_player(&mut self) -> Result<()> {
        if self.lease != DisplayLease::LentToPlayer {
            return Ok(());
        }
        self.acquire_master()?;
        self.reset_mode()?;
        debug!(output = %self.output.name, "Display reclaimed from player");
        Ok(())
    }

    /// Drops master without closing the device, optionally turning the
    /// scanout off first.
    pub fn release_master(&mut self, disable_output: bool) -> Result<()> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| KioskError::resource_unavailable("display closed"))?;

        if disable_output {
            if let Err(err) = device.disable_scanout(&self.output) {
                warn!(output = %self.output.name, error = %err, "Failed to disable scanout");
            }
        }

        self.lease = DisplayLease::ReleasedForEmulator;
        device.drop_master()?;
        info!(output = %self.output.name, disable_output, "Display master released");
        Ok(())
    }

    /// Takes master back, retrying with fixed delays. When every attempt
    /// fails the owner stays alive in degraded state.
    pub fn acquire_master(&mut self) -> Result<()> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| KioskError::resource_unavailable("display closed"))?;

        self.lease = DisplayLease::Reacquiring;
        match retry(self.policy.master_retry, "display master", || device.set_master()) {
            Ok(()) => {
                self.lease = DisplayLease::OwnedByKiosk;
                self.degraded = false;
                self.last_attempt = None;
                info!(output = %self.output.name, "Display master acquired");
                Ok(())
            }
            Err(attempt) => {
                self.degraded = true;
                error!(
                    output = %self.output.name,
                    retries = attempt.retry_count,
                    error = attempt.last_error.as_deref().unwrap_or(""),
                    "Display reacquisition exhausted, running degraded"
                );
                self.last_attempt = Some(attempt.clone());
                Err(attempt.into_error("display master"))
            }
        }
    }

    /// Flips to the back surface and swaps. Returns the back surface the
    /// renderer draws the next frame into; it is unchanged when the previous
    /// flip was still pending.
    pub fn swap_surface(&mut self) -> Result<SurfaceId> {
        if self.lease != DisplayLease::OwnedByKiosk {
            return Err(KioskError::resource_unavailable(format!(
                "cannot present while display is {}",
                self.lease
            )));
        }
        let (Some(device), Some(_), Some(pair)) =
            (self.device.as_mut(), self.mode.as_ref(), self.surfaces.as_mut())
        else {
            return Err(KioskError::resource_unavailable("no mode set"));
        };

        if device.flip(&self.output, pair.back)? {
            std::mem::swap(&mut pair.front, &mut pair.back);
        }
        Ok(pair.back)
    }

    /// Frees the surfaces and closes the device. With `restore_mode` the
    /// scanout found at startup is put back; otherwise the output keeps
    /// whatever the last user set.
    pub fn cleanup(&mut self, restore_mode: bool) {
        let Some(mut device) = self.device.take() else {
            return;
        };

        if restore_mode {
            match &self.saved {
                Some(saved) => match device.restore_scanout(&self.output, saved) {
                    Ok(()) => debug!(output = %self.output.name, "Saved scanout restored"),
                    Err(err) => warn!(output = %self.output.name, error = %err, "Could not restore scanout"),
                },
                None => debug!("No saved scanout to restore"),
            }
        }

        if let Some(pair) = self.surfaces.take() {
            device.destroy_surface(pair.front);
            device.destroy_surface(pair.back);
        }

        info!(device = %self.device_name, restore_mode, "Display closed");
    }

    pub fn lease(&self) -> DisplayLease {
        self.lease
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Record of the last exhausted reacquisition, if the owner is degraded.
    pub fn last_attempt(&self) -> Option<&HandoffAttempt> {
        self.last_attempt.as_ref()
    }

    pub fn policy(&self) -> &DisplayPolicy {
        &self.policy
    }

    pub fn output(&self) -> &OutputInfo {
        &self.output
    }

    /// Node of the selected device, when the backend has one.
    pub fn device_path(&self) -> Option<&Path> {
        self.device_path.as_deref()
    }

    pub fn current_mode(&self) -> Option<&ModeInfo> {
        self.mode.as_ref()
    }

    /// Physical resolution: the current mode, or the preferred one before
    /// any mode was set.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.mode
            .as_ref()
            .or_else(|| self.output.preferred_mode())
            .map(ModeInfo::size)
    }

    pub fn back_surface(&self) -> Option<SurfaceId> {
        self.surfaces.map(|pair| pair.back)
    }
}

impl Drop for DisplayOwner {
    fn drop(&mut self) {
        self.cleanup(self.policy.restore_mode_on_exit);
    }
}
