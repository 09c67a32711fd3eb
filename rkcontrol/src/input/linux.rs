//! evdev devices and gpio-cdev lines.

use std::io;
use std::os::fd::AsRawFd;
use std::path::PathBuf;

use evdev::{AbsoluteAxisType, Device, EventType};
use gpio_cdev::{Chip, LineHandle, LineRequestFlags};
use tracing::{debug, warn};

use super::device::{AxisRange, Capabilities, GpioLine, InputBackend, RawEvent, RawInputDevice};
use crate::errors::{KioskError, Result};

const CONSUMER: &str = "retrokiosk";

pub struct EvdevDevice {
    path: PathBuf,
    device: Device,
}

impl EvdevDevice {
    fn new(path: PathBuf, device: Device) -> io::Result<Self> {
        set_nonblocking(&device)?;
        Ok(Self { path, device })
    }
}

fn set_nonblocking(device: &Device) -> io::Result<()> {
    let fd = device.as_raw_fd();
    // SAFETY: fd appartient à `device`, vivant pendant l'appel
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: idem
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl RawInputDevice for EvdevDevice {
    fn name(&self) -> String {
        match self.device.name() {
            Some(name) => format!("{} ({})", name, self.path.display()),
            None => self.path.display().to_string(),
        }
    }

    fn capabilities(&self) -> Capabilities {
        let keys = self
            .device
            .supported_keys()
            .map(|keys| keys.iter().map(|k| k.code()).collect())
            .unwrap_or_default();

        let rel_axes = self
            .device
            .supported_relative_axes()
            .map(|axes| axes.iter().map(|a| a.0).collect())
            .unwrap_or_default();

        let abs_state = self.device.get_abs_state().ok();
        let abs_axes = self
            .device
            .supported_absolute_axes()
            .map(|axes| {
                axes.iter()
                    .map(|axis: AbsoluteAxisType| {
                        let range = abs_state
                            .as_ref()
                            .and_then(|state| state.get(axis.0 as usize))
                            .map(|info| AxisRange {
                                min: info.minimum,
                                max: info.maximum,
                            })
                            .unwrap_or(AxisRange { min: -32768, max: 32767 });
                        (axis.0, range)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Capabilities {
            keys,
            abs_axes,
            rel_axes,
        }
    }

    fn grab(&mut self) -> io::Result<()> {
        self.device.grab()
    }

    fn ungrab(&mut self) -> io::Result<()> {
        self.device.ungrab()
    }

    fn read_events(&mut self) -> io::Result<Vec<RawEvent>> {
        match self.device.fetch_events() {
            Ok(events) => Ok(events
                .filter(|e| {
                    let kind = e.event_type();
                    kind == EventType::KEY
                        || kind == EventType::ABSOLUTE
                        || kind == EventType::RELATIVE
                })
                .map(|e| RawEvent {
                    kind: e.event_type().0,
                    code: e.code(),
                    value: e.value(),
                })
                .collect()),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }
}

pub struct CdevLine {
    offset: u32,
    handle: LineHandle,
}

impl GpioLine for CdevLine {
    fn offset(&self) -> u32 {
        self.offset
    }

    fn read(&mut self) -> Result<bool> {
        self.handle
            .get_value()
            .map(|value| value != 0)
            .map_err(|e| KioskError::resource_unavailable(format!("GPIO line {}: {}", self.offset, e)))
    }
}

/// evdev for input devices, gpio-cdev for discrete lines.
pub struct LinuxInputBackend {
    gpio_chip: PathBuf,
    chip: Option<Chip>,
}

impl LinuxInputBackend {
    pub fn new(gpio_chip: impl Into<PathBuf>) -> Self {
        Self {
            gpio_chip: gpio_chip.into(),
            chip: None,
        }
    }
}

impl InputBackend for LinuxInputBackend {
    fn open_devices(&mut self) -> Result<Vec<Box<dyn RawInputDevice>>> {
        let mut devices: Vec<Box<dyn RawInputDevice>> = Vec::new();
        for (path, device) in evdev::enumerate() {
            match EvdevDevice::new(path.clone(), device) {
                Ok(device) => devices.push(Box::new(device)),
                Err(err) => warn!(path = %path.display(), error = %err, "Cannot use input device"),
            }
        }
        debug!(count = devices.len(), "evdev devices enumerated");
        Ok(devices)
    }

    fn open_gpio_line(&mut self, offset: u32) -> Result<Box<dyn GpioLine>> {
        if self.chip.is_none() {
            let chip = Chip::new(&self.gpio_chip).map_err(|e| {
                KioskError::resource_unavailable(format!("{}: {}", self.gpio_chip.display(), e))
            })?;
            self.chip = Some(chip);
        }
        let Some(chip) = self.chip.as_mut() else {
            return Err(KioskError::resource_unavailable("GPIO chip not open"));
        };

        let handle = chip
            .get_line(offset)
            .and_then(|line| line.request(LineRequestFlags::INPUT, 0, CONSUMER))
            .map_err(|e| KioskError::resource_unavailable(format!("GPIO line {offset}: {e}")))?;
        Ok(Box::new(CdevLine { offset, handle }))
    }
}
