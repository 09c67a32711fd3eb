//! Cross-process handoff of the display and input devices.
//!
//! Release order: stop the pipeline, wait for it to go quiet and drop it so
//! the player lets go of the card and the audio device, release the display
//! lease, release input grabs, nudge the input devices, then
//! run the emulator. Reclaim order: kill stray emulator processes, settle,
//! reacquire the display, reset its mode, reopen input, and throw the old
//! pipeline away.

use std::path::PathBuf;
use std::thread;

use tracing::{debug, info, warn};

use crate::emulator::SessionOutcome;
use crate::errors::{KioskError, Result};
use crate::retry::{RetryPolicy, retry};

use super::Devices;

/// What to hand to the emulator once the devices are released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub playlist: usize,
    pub item: usize,
    pub title: String,
    pub content: PathBuf,
    pub core: String,
    pub system: String,
}

/// Result of the reclaim half of a handoff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    pub strays_killed: usize,
    pub display_degraded: bool,
    pub input_error: Option<String>,
}

impl ReclaimReport {
    /// Message for the status line, if anything persistent went wrong.
    pub fn status(&self) -> Option<String> {
        match (self.display_degraded, &self.input_error) {
            (true, _) => Some("Display could not be reacquired".to_string()),
            (false, Some(err)) => Some(format!("Input unavailable: {err}")),
            (false, None) => None,
        }
    }
}

/// Releases everything the kiosk holds, then runs the emulator to
/// completion.
pub(crate) fn release_and_launch(
    devices: &mut Devices<'_>,
    request: &LaunchRequest,
    stop_wait: &RetryPolicy,
    volume: u8,
) -> Result<SessionOutcome> {
    stop_pipeline(devices, stop_wait);
    devices.pipeline.discard();

    let disable_output = devices.display.policy().disable_output_on_release;
    if let Err(err) = devices.display.release_master(disable_output) {
        warn!(error = %err, "Display release failed, launching anyway");
    }

    devices.input.release_grabs();
    let nudged = devices.input.wake_devices();
    debug!(nudged, "Input devices nudged");

    if let Some((width, height)) = devices.display.resolution() {
        devices.emulator.set_resolution(width, height);
    }
    devices.emulator.set_volume(volume);

    info!(
        playlist = request.playlist,
        item = request.item,
        title = %request.title,
        "Handing devices to emulator"
    );
    devices
        .emulator
        .launch(&request.content, &request.core, &request.system)
}

/// Takes the devices back after the emulator exited. Never fails: what
/// cannot be recovered is reported and the kiosk keeps running degraded.
pub(crate) fn reclaim(devices: &mut Devices<'_>) -> ReclaimReport {
    let mut report = ReclaimReport {
        strays_killed: devices.emulator.terminate_strays(),
        ..ReclaimReport::default()
    };

    let settle = devices.emulator.settings().settle_delay;
    if !settle.is_zero() {
        thread::sleep(settle);
    }

    match devices.display.acquire_master() {
        Ok(()) => {
            if let Err(err) = devices.display.reset_mode() {
                warn!(error = %err, "Display mode reset failed");
            }
        }
        Err(err) => {
            warn!(error = %err, "Display degraded after handoff");
            report.display_degraded = true;
        }
    }

    if let Err(err) = devices.input.reinitialize() {
        warn!(error = %err, "Input reinitialization failed");
        report.input_error = Some(err.to_string());
    }

    // Jamais de reprise de l'ancienne instance
    devices.pipeline.discard();

    info!(
        strays = report.strays_killed,
        degraded = report.display_degraded,
        "Devices reclaimed"
    );
    report
}

/// Stops the live pipeline and waits, bounded, for it to report stopped.
fn stop_pipeline(devices: &mut Devices<'_>, stop_wait: &RetryPolicy) {
    let Some(pipeline) = devices.pipeline.current() else {
        return;
    };
    if let Err(err) = pipeline.stop() {
        warn!(error = %err, "Pipeline stop failed");
    }
    let waited = retry(*stop_wait, "pipeline stop", || {
        if pipeline.is_playing() {
            Err(KioskError::pipeline("still playing"))
        } else {
            Ok(())
        }
    });
    if let Err(attempt) = waited {
        warn!(retries = attempt.retry_count, "Pipeline still playing, continuing handoff");
    }
}
