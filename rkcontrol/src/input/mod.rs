//! Input devices, reduced to a small action vocabulary.
//!
//! [`InputSource`] opens every device the backend offers, keeps those it
//! can classify, grabs them for exclusive use and translates their raw
//! events on each [`poll`](InputSource::poll). GPIO lines configured in
//! `input.gpio_lines` are sampled and debounced.
//!
//! During an emulator session the grabs are released, and the whole set
//! is reopened afterwards with [`reinitialize`](InputSource::reinitialize)
//! because devices may have been re-enumerated meanwhile.

mod debounce;
mod device;
mod linux;
mod translate;

pub use debounce::Debouncer;
pub use device::{
    AxisRange, Capabilities, GpioLine, InputBackend, RawEvent, RawInputDevice, codes,
};
pub use linux::{CdevLine, EvdevDevice, LinuxInputBackend};
pub use translate::{DeviceClass, RotaryAccumulator, Translator, classify, key_action};

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{KioskError, Result};
use crate::retry::{RetryPolicy, retry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Confirm,
    Cancel,
    Menu,
    Up,
    Down,
    Left,
    Right,
    ShoulderLeft,
    ShoulderRight,
    Rotate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub action: Action,
    /// Signed step for `Rotate`, 0 otherwise.
    pub delta: i32,
    pub pressed: bool,
}

impl InputEvent {
    pub fn button(action: Action, pressed: bool) -> Self {
        Self {
            action,
            delta: 0,
            pressed,
        }
    }

    pub fn rotate(delta: i32) -> Self {
        Self {
            action: Action::Rotate,
            delta,
            pressed: true,
        }
    }
}

/// One GPIO line wired to a button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpioLineConfig {
    pub line: u32,
    pub action: Action,
    #[serde(default)]
    pub active_low: bool,
}

#[derive(Debug, Clone)]
pub struct InputSettings {
    pub grab: bool,
    pub axis_deadzone: i32,
    pub encoder_threshold: i32,
    pub debounce: Duration,
    pub reinit: RetryPolicy,
    pub wake_subsystem: String,
    pub sysfs_root: PathBuf,
    pub gpio_lines: Vec<GpioLineConfig>,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            grab: true,
            axis_deadzone: 8000,
            encoder_threshold: 4,
            debounce: Duration::from_millis(30),
            reinit: RetryPolicy::from_millis(5, 250),
            wake_subsystem: "input".to_string(),
            sysfs_root: PathBuf::from(rkutils::DEFAULT_SYSFS_CLASS_ROOT),
            gpio_lines: Vec::new(),
        }
    }
}

struct TrackedDevice {
    name: String,
    device: Box<dyn RawInputDevice>,
    translator: Translator,
    grabbed: bool,
}

struct GpioButton {
    line: Box<dyn GpioLine>,
    action: Action,
    active_low: bool,
    debouncer: Debouncer,
}

pub struct InputSource {
    backend: Box<dyn InputBackend>,
    settings: InputSettings,
    devices: Vec<TrackedDevice>,
    buttons: Vec<GpioButton>,
}

impl std::fmt::Debug for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputSource")
            .field("devices", &self.devices.iter().map(|d| &d.name).collect::<Vec<_>>())
            .field("gpio_lines", &self.buttons.len())
            .finish()
    }
}

impl InputSource {
    pub fn new(backend: Box<dyn InputBackend>, settings: InputSettings) -> Self {
        Self {
            backend,
            settings,
            devices: Vec::new(),
            buttons: Vec::new(),
        }
    }

    /// Source reading evdev devices and the configured GPIO chip.
    pub fn linux(settings: InputSettings, gpio_chip: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(LinuxInputBackend::new(gpio_chip)), settings)
    }

    /// Opens and grabs every usable device. Returns the number of inputs
    /// (devices and GPIO lines); zero is `ResourceUnavailable`.
    pub fn initialize(&mut self) -> Result<usize> {
        self.cleanup();

        for mut device in self.backend.open_devices()? {
            let name = device.name();
            let caps = device.capabilities();
            let Some(class) = classify(&caps) else {
                debug!(device = %name, "Ignoring input device");
                continue;
            };

            let grabbed = if self.settings.grab {
                match device.grab() {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(device = %name, error = %err, "Exclusive grab failed");
                        false
                    }
                }
            } else {
                false
            };

            debug!(device = %name, ?class, grabbed, "Input device opened");
            self.devices.push(TrackedDevice {
                name,
                translator: Translator::new(
                    class,
                    &caps,
                    self.settings.axis_deadzone,
                    self.settings.encoder_threshold,
                ),
                device,
                grabbed,
            });
        }

        for config in &self.settings.gpio_lines {
            match self.backend.open_gpio_line(config.line) {
                Ok(line) => self.buttons.push(GpioButton {
                    line,
                    action: config.action,
                    active_low: config.active_low,
                    debouncer: Debouncer::new(self.settings.debounce, false),
                }),
                Err(err) => warn!(line = config.line, error = %err, "GPIO line unavailable"),
            }
        }

        let total = self.devices.len() + self.buttons.len();
        if total == 0 {
            return Err(KioskError::resource_unavailable("no input devices"));
        }
        info!(
            devices = self.devices.len(),
            gpio_lines = self.buttons.len(),
            "Input initialized"
        );
        Ok(total)
    }

    /// Releases grabs and closes everything.
    pub fn cleanup(&mut self) {
        self.release_grabs();
        self.devices.clear();
        self.buttons.clear();
    }

    /// Releases exclusive grabs but keeps devices open.
    pub fn release_grabs(&mut self) {
        for tracked in self.devices.iter_mut().filter(|d| d.grabbed) {
            if let Err(err) = tracked.device.ungrab() {
                debug!(device = %tracked.name, error = %err, "Ungrab failed");
            }
            tracked.grabbed = false;
        }
    }

    /// Best-effort hot-plug re-scan of the input subsystem.
    pub fn wake_devices(&self) -> usize {
        rkutils::nudge_device_rescan(&self.settings.sysfs_root, &self.settings.wake_subsystem)
    }

    /// Reopens everything with the configured bounded retries.
    pub fn reinitialize(&mut self) -> Result<usize> {
        let policy = self.settings.reinit;
        retry(policy, "input reinitialize", || self.initialize())
            .map_err(|attempt| attempt.into_error("input reinitialize"))
    }

    pub fn poll(&mut self) -> Vec<InputEvent> {
        self.poll_at(Instant::now())
    }

    /// Like [`poll`](Self::poll), with an explicit sampling time for the
    /// GPIO debouncers.
    pub fn poll_at(&mut self, now: Instant) -> Vec<InputEvent> {
        let mut events = Vec::new();

        self.devices.retain_mut(|tracked| match tracked.device.read_events() {
            Ok(raw) => {
                for event in raw {
                    tracked.translator.translate(event, &mut events);
                }
                true
            }
            Err(err) => {
                warn!(device = %tracked.name, error = %err, "Input device lost");
                false
            }
        });

        for button in &mut self.buttons {
            match button.line.read() {
                Ok(level) => {
                    let pressed = level != button.active_low;
                    if let Some(state) = button.debouncer.update(pressed, now) {
                        events.push(InputEvent::button(button.action, state));
                    }
                }
                Err(err) => debug!(line = button.line.offset(), error = %err, "GPIO read failed"),
            }
        }

        events
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn grabbed_count(&self) -> usize {
        self.devices.iter().filter(|d| d.grabbed).count()
    }

    pub fn settings(&self) -> &InputSettings {
        &self.settings
    }
}

impl Drop for InputSource {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Shared {
        queued: VecDeque<RawEvent>,
        grabs: i32,
        gpio_level: bool,
        open_failures: u32,
        refuse_grab: bool,
    }

    struct FakeDevice {
        caps: Capabilities,
        shared: Arc<Mutex<Shared>>,
    }

    impl RawInputDevice for FakeDevice {
        fn name(&self) -> String {
            "fake pad".to_string()
        }

        fn capabilities(&self) -> Capabilities {
            self.caps.clone()
        }

        fn grab(&mut self) -> io::Result<()> {
            let mut shared = self.shared.lock().unwrap();
            if shared.refuse_grab {
                return Err(io::Error::other("busy"));
            }
            shared.grabs += 1;
            Ok(())
        }

        fn ungrab(&mut self) -> io::Result<()> {
            self.shared.lock().unwrap().grabs -= 1;
            Ok(())
        }

        fn read_events(&mut self) -> io::Result<Vec<RawEvent>> {
            Ok(self.shared.lock().unwrap().queued.drain(..).collect())
        }
    }

    struct FakeLine {
        shared: Arc<Mutex<Shared>>,
    }

    impl GpioLine for FakeLine {
        fn offset(&self) -> u32 {
            17
        }

        fn read(&mut self) -> Result<bool> {
            Ok(self.shared.lock().unwrap().gpio_level)
        }
    }

    struct FakeBackend {
        shared: Arc<Mutex<Shared>>,
        with_pad: bool,
    }

    impl InputBackend for FakeBackend {
        fn open_devices(&mut self) -> Result<Vec<Box<dyn RawInputDevice>>> {
            {
                let mut shared = self.shared.lock().unwrap();
                if shared.open_failures > 0 {
                    shared.open_failures -= 1;
                    return Err(KioskError::resource_unavailable("enumerating"));
                }
            }
            let mut devices: Vec<Box<dyn RawInputDevice>> = vec![Box::new(FakeDevice {
                caps: Capabilities::default(),
                shared: Arc::clone(&self.shared),
            })];
            if self.with_pad {
                devices.push(Box::new(FakeDevice {
                    caps: Capabilities {
                        keys: vec![codes::BTN_SOUTH],
                        ..Default::default()
                    },
                    shared: Arc::clone(&self.shared),
                }));
            }
            Ok(devices)
        }

        fn open_gpio_line(&mut self, _offset: u32) -> Result<Box<dyn GpioLine>> {
            Ok(Box::new(FakeLine {
                shared: Arc::clone(&self.shared),
            }))
        }
    }

    fn source(shared: &Arc<Mutex<Shared>>, with_pad: bool, settings: InputSettings) -> InputSource {
        InputSource::new(
            Box::new(FakeBackend {
                shared: Arc::clone(shared),
                with_pad,
            }),
            settings,
        )
    }

    #[test]
    fn test_initialize_keeps_classified_devices_and_grabs() {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let mut input = source(&shared, true, InputSettings::default());

        assert_eq!(input.initialize().unwrap(), 1);
        assert_eq!(input.grabbed_count(), 1);
        assert_eq!(shared.lock().unwrap().grabs, 1);

        input.release_grabs();
        assert_eq!(input.grabbed_count(), 0);
        assert_eq!(input.device_count(), 1);
        assert_eq!(shared.lock().unwrap().grabs, 0);
    }

    #[test]
    fn test_failed_grab_is_not_fatal() {
        let shared = Arc::new(Mutex::new(Shared {
            refuse_grab: true,
            ..Default::default()
        }));
        let mut input = source(&shared, true, InputSettings::default());
        assert_eq!(input.initialize().unwrap(), 1);
        assert_eq!(input.grabbed_count(), 0);
    }

    #[test]
    fn test_no_usable_device_is_resource_unavailable() {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let mut input = source(&shared, false, InputSettings::default());
        assert!(matches!(
            input.initialize(),
            Err(KioskError::ResourceUnavailable(_))
        ));
    }

    #[test]
    fn test_poll_translates_device_events() {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let mut input = source(&shared, true, InputSettings::default());
        input.initialize().unwrap();

        shared
            .lock()
            .unwrap()
            .queued
            .extend([RawEvent::key(codes::BTN_SOUTH, 1), RawEvent::key(codes::BTN_SOUTH, 0)]);
        // Les deux appareils lisent la même file ; seul le pad est ouvert
        let events = input.poll();
        assert_eq!(
            events,
            vec![
                InputEvent::button(Action::Confirm, true),
                InputEvent::button(Action::Confirm, false)
            ]
        );
    }

    #[test]
    fn test_gpio_lines_are_debounced() {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let settings = InputSettings {
            gpio_lines: vec![GpioLineConfig {
                line: 17,
                action: Action::Menu,
                active_low: true,
            }],
            ..InputSettings::default()
        };
        let mut input = source(&shared, false, settings);
        assert_eq!(input.initialize().unwrap(), 1);

        let t0 = Instant::now();
        let ms = Duration::from_millis;

        // Ligne au niveau bas = bouton pressé (active_low)
        shared.lock().unwrap().gpio_level = false;
        assert!(input.poll_at(t0).is_empty());
        shared.lock().unwrap().gpio_level = true;
        assert!(input.poll_at(t0 + ms(10)).is_empty());
        shared.lock().unwrap().gpio_level = false;
        assert!(input.poll_at(t0 + ms(20)).is_empty());
        assert!(input.poll_at(t0 + ms(40)).is_empty());
        assert_eq!(
            input.poll_at(t0 + ms(50)),
            vec![InputEvent::button(Action::Menu, true)]
        );
    }

    #[test]
    fn test_reinitialize_retries() {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let settings = InputSettings {
            reinit: RetryPolicy::new(3, Duration::ZERO),
            ..InputSettings::default()
        };
        let mut input = source(&shared, true, settings);
        input.initialize().unwrap();

        shared.lock().unwrap().open_failures = 2;
        assert_eq!(input.reinitialize().unwrap(), 1);

        shared.lock().unwrap().open_failures = 5;
        assert!(matches!(
            input.reinitialize(),
            Err(KioskError::HandoffFailure(_))
        ));
    }

    #[test]
    fn test_gpio_config_from_yaml_shape() {
        let json = r#"[{"line": 5, "action": "shoulder_left"}]"#;
        let lines: Vec<GpioLineConfig> = serde_json::from_str(json).unwrap();
        assert_eq!(lines[0].action, Action::ShoulderLeft);
        assert!(!lines[0].active_low);
    }
}
