//! Raw input seams and the Linux event codes the kiosk understands.

use std::io;

use crate::errors::Result;

pub mod codes {
    pub const EV_KEY: u16 = 0x01;
    pub const EV_REL: u16 = 0x02;
    pub const EV_ABS: u16 = 0x03;

    pub const KEY_ESC: u16 = 1;
    pub const KEY_BACKSPACE: u16 = 14;
    pub const KEY_ENTER: u16 = 28;
    pub const KEY_M: u16 = 50;
    pub const KEY_SPACE: u16 = 57;
    pub const KEY_UP: u16 = 103;
    pub const KEY_PAGEUP: u16 = 104;
    pub const KEY_LEFT: u16 = 105;
    pub const KEY_RIGHT: u16 = 106;
    pub const KEY_DOWN: u16 = 108;
    pub const KEY_PAGEDOWN: u16 = 109;

    pub const BTN_LEFT: u16 = 0x110;
    pub const BTN_TRIGGER: u16 = 0x120;
    pub const BTN_THUMB: u16 = 0x121;
    pub const BTN_SOUTH: u16 = 0x130;
    pub const BTN_EAST: u16 = 0x131;
    pub const BTN_TL: u16 = 0x136;
    pub const BTN_TR: u16 = 0x137;
    pub const BTN_SELECT: u16 = 0x13a;
    pub const BTN_START: u16 = 0x13b;
    pub const BTN_MODE: u16 = 0x13c;
    pub const BTN_DPAD_UP: u16 = 0x220;
    pub const BTN_DPAD_DOWN: u16 = 0x221;
    pub const BTN_DPAD_LEFT: u16 = 0x222;
    pub const BTN_DPAD_RIGHT: u16 = 0x223;

    pub const REL_X: u16 = 0x00;
    pub const REL_Y: u16 = 0x01;
    pub const REL_DIAL: u16 = 0x07;
    pub const REL_WHEEL: u16 = 0x08;

    pub const ABS_X: u16 = 0x00;
    pub const ABS_Y: u16 = 0x01;
    pub const ABS_HAT0X: u16 = 0x10;
    pub const ABS_HAT0Y: u16 = 0x11;
}

/// One kernel input event, decoupled from the evdev crate types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    pub fn key(code: u16, value: i32) -> Self {
        Self { kind: codes::EV_KEY, code, value }
    }

    pub fn rel(code: u16, value: i32) -> Self {
        Self { kind: codes::EV_REL, code, value }
    }

    pub fn abs(code: u16, value: i32) -> Self {
        Self { kind: codes::EV_ABS, code, value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    pub min: i32,
    pub max: i32,
}

/// Declared capabilities of a device.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub keys: Vec<u16>,
    pub abs_axes: Vec<(u16, AxisRange)>,
    pub rel_axes: Vec<u16>,
}

impl Capabilities {
    pub fn has_key(&self, code: u16) -> bool {
        self.keys.contains(&code)
    }

    pub fn has_abs(&self, code: u16) -> bool {
        self.abs_axes.iter().any(|(c, _)| *c == code)
    }

    pub fn has_rel(&self, code: u16) -> bool {
        self.rel_axes.contains(&code)
    }
}

/// An opened input device.
pub trait RawInputDevice: Send {
    fn name(&self) -> String;

    fn capabilities(&self) -> Capabilities;

    fn grab(&mut self) -> io::Result<()>;

    fn ungrab(&mut self) -> io::Result<()>;

    /// Pending events; empty when nothing is queued. Never blocks.
    fn read_events(&mut self) -> io::Result<Vec<RawEvent>>;
}

/// A discrete GPIO input line.
pub trait GpioLine: Send {
    fn offset(&self) -> u32;

    /// Electrical level, before any active-low inversion.
    fn read(&mut self) -> Result<bool>;
}

/// Opens the devices an [`InputSource`](super::InputSource) reads from.
pub trait InputBackend: Send {
    fn open_devices(&mut self) -> Result<Vec<Box<dyn RawInputDevice>>>;

    fn open_gpio_line(&mut self, offset: u32) -> Result<Box<dyn GpioLine>>;
}
