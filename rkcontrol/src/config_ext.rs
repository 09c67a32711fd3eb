//! rkconfig extension for the kiosk subsystems
//!
//! Every subsystem takes a plain settings value; this trait builds them
//! from the `display`, `playback`, `emulator` and `input` sections of
//! [`rkconfig::Config`]. Missing or mistyped values fall back to the
//! embedded defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::warn;

use crate::controller::ControllerSettings;
use crate::display::{DisplayPolicy, ModeRequest};
use crate::emulator::EmulatorSettings;
use crate::input::{GpioLineConfig, InputSettings};
use crate::pipeline::MpvSettings;
use crate::retry::RetryPolicy;

/// Extension trait for rkconfig::Config
pub trait ControlConfigExt {
    fn display_policy(&self) -> DisplayPolicy;

    /// Display device to open; `None` enumerates every card.
    fn display_device_hint(&self) -> Option<PathBuf>;

    fn display_mode(&self) -> Result<ModeRequest>;

    fn input_settings(&self) -> InputSettings;

    fn gpio_chip(&self) -> PathBuf;

    fn mpv_settings(&self) -> MpvSettings;

    fn emulator_settings(&self) -> EmulatorSettings;

    fn controller_settings(&self) -> ControllerSettings;
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

impl ControlConfigExt for rkconfig::Config {
    fn display_policy(&self) -> DisplayPolicy {
        DisplayPolicy {
            disable_output_on_release: self
                .get_bool_or(&["display", "disable_output_on_release"], false),
            restore_mode_on_exit: self.get_bool_or(&["display", "restore_mode_on_exit"], true),
            master_retry: RetryPolicy::from_millis(
                self.get_u64_or(&["display", "master_retries"], 10) as u32,
                self.get_u64_or(&["display", "master_retry_delay_ms"], 100),
            ),
        }
    }

    fn display_device_hint(&self) -> Option<PathBuf> {
        let device = self.get_string_or(&["display", "device"], "auto");
        let device = device.trim();
        if device.is_empty() || device.eq_ignore_ascii_case("auto") {
            None
        } else {
            Some(PathBuf::from(device))
        }
    }

    fn display_mode(&self) -> Result<ModeRequest> {
        let mode = self.get_string_or(&["display", "mode"], "auto");
        mode.parse()
            .map_err(|e| anyhow!("Invalid display.mode '{}': {}", mode, e))
    }

    fn input_settings(&self) -> InputSettings {
        let defaults = InputSettings::default();
        let gpio_lines = match self.get_typed::<Vec<GpioLineConfig>>(&["input", "gpio_lines"]) {
            Ok(lines) => lines,
            Err(err) => {
                warn!(error = %err, "Ignoring input.gpio_lines");
                Vec::new()
            }
        };
        InputSettings {
            grab: self.get_bool_or(&["input", "grab"], defaults.grab),
            axis_deadzone: self.get_u64_or(&["input", "axis_deadzone"], 8000).min(32767) as i32,
            encoder_threshold: self.get_u64_or(&["input", "encoder_threshold"], 4).max(1) as i32,
            debounce: millis(self.get_u64_or(&["input", "debounce_ms"], 30)),
            reinit: RetryPolicy::from_millis(
                self.get_u64_or(&["input", "reinit_retries"], 5) as u32,
                self.get_u64_or(&["input", "reinit_delay_ms"], 250),
            ),
            wake_subsystem: self.get_string_or(&["input", "wake_subsystem"], "input"),
            sysfs_root: defaults.sysfs_root,
            gpio_lines,
        }
    }

    fn gpio_chip(&self) -> PathBuf {
        PathBuf::from(self.get_string_or(&["input", "gpio_chip"], "/dev/gpiochip0"))
    }

    fn mpv_settings(&self) -> MpvSettings {
        let defaults = MpvSettings::default();
        MpvSettings {
            binary: self.get_string_or(&["playback", "player_binary"], &defaults.binary),
            socket_path: PathBuf::from(self.get_string_or(
                &["playback", "ipc_socket"],
                &defaults.socket_path.to_string_lossy(),
            )),
            video_output: self.get_string_or(&["playback", "video_output"], &defaults.video_output),
            initial_volume: self.get_u64_or(&["playback", "volume"], 80).min(100) as u8,
            ..defaults
        }
    }

    fn emulator_settings(&self) -> EmulatorSettings {
        let defaults = EmulatorSettings::default();
        EmulatorSettings {
            binary: self.get_string_or(&["emulator", "binary"], &defaults.binary),
            process_name: self.get_string_or(&["emulator", "process_name"], &defaults.process_name),
            cores_dir: PathBuf::from(self.get_string_or(
                &["emulator", "cores_dir"],
                &defaults.cores_dir.to_string_lossy(),
            )),
            audio_sink: self.get_string_or(&["emulator", "audio_sink"], &defaults.audio_sink),
            settle_delay: millis(self.get_u64_or(&["emulator", "settle_delay_ms"], 1000)),
            config_root: None,
        }
    }

    fn controller_settings(&self) -> ControllerSettings {
        let trigger = self.get_string_or(&["playback", "master_shuffle_playlist"], "");
        let trigger = trigger.trim();
        ControllerSettings {
            playlist_loop: self.get_bool_or(&["playback", "playlist_loop"], true),
            shuffle: self.get_bool_or(&["playback", "shuffle"], false),
            volume: self.get_u64_or(&["playback", "volume"], 80).min(100) as u8,
            volume_step: self.get_u64_or(&["playback", "volume_step"], 5).clamp(1, 100) as u8,
            end_tolerance: millis(self.get_u64_or(&["playback", "end_tolerance_ms"], 500)),
            stop_wait: RetryPolicy::from_millis(
                self.get_u64_or(&["playback", "stop_wait_retries"], 20) as u32,
                self.get_u64_or(&["playback", "stop_wait_delay_ms"], 50),
            ),
            master_shuffle_playlist: (!trigger.is_empty()).then(|| trigger.to_string()),
            master_shuffle_entry: self.get_usize_or(&["playback", "master_shuffle_entry"], 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Action;
    use std::fs;

    fn load_in(dir: &std::path::Path) -> rkconfig::Config {
        rkconfig::Config::load_config(&dir.to_string_lossy()).unwrap()
    }

    #[test]
    fn test_defaults_build_settings() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_in(dir.path());

        let policy = config.display_policy();
        assert!(!policy.disable_output_on_release);
        assert!(policy.restore_mode_on_exit);
        assert_eq!(policy.master_retry, RetryPolicy::from_millis(10, 100));
        assert_eq!(config.display_device_hint(), None);
        assert_eq!(config.display_mode().unwrap(), ModeRequest::Auto);

        let controller = config.controller_settings();
        assert!(controller.playlist_loop);
        assert_eq!(controller.master_shuffle_playlist, None);
        assert_eq!(controller.end_tolerance, Duration::from_millis(500));

        let emulator = config.emulator_settings();
        assert_eq!(emulator.cores_dir, PathBuf::from("/usr/lib/libretro"));
        assert!(config.input_settings().gpio_lines.is_empty());
        assert_eq!(config.mpv_settings().video_output, "drm");
    }

    #[test]
    fn test_overrides_from_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.yaml"),
            "display:\n  device: /dev/dri/card1\n  mode: 1280x720\n  disable_output_on_release: true\n\
             playback:\n  master_shuffle_playlist: everything\n  playlist_loop: false\n\
             input:\n  gpio_lines:\n    - line: 17\n      action: confirm\n      active_low: true\n",
        )
        .unwrap();
        let config = load_in(dir.path());

        assert!(config.display_policy().disable_output_on_release);
        assert_eq!(config.display_device_hint(), Some(PathBuf::from("/dev/dri/card1")));
        assert_eq!(
            config.display_mode().unwrap(),
            ModeRequest::Exact {
                width: 1280,
                height: 720
            }
        );
        let controller = config.controller_settings();
        assert!(!controller.playlist_loop);
        assert_eq!(controller.master_shuffle_playlist.as_deref(), Some("everything"));

        let lines = config.input_settings().gpio_lines;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].line, 17);
        assert_eq!(lines[0].action, Action::Confirm);
        assert!(lines[0].active_low);
    }

    #[test]
    fn test_bad_mode_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.yaml"), "display:\n  mode: huge\n").unwrap();
        let config = load_in(dir.path());
        assert!(config.display_mode().is_err());
    }
}
