//! Per-device translation of raw events into actions.

use std::collections::HashMap;

use super::device::{AxisRange, Capabilities, RawEvent, codes};
use super::{Action, InputEvent};

/// Axis values are normalised to this half-range before the deadzone
/// applies.
pub const AXIS_SCALE: i64 = 32767;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// Sticks and hats, usually with buttons.
    Joystick,
    /// Keyboards, button boards, IR remotes.
    Keys,
    /// Relative rotary encoders.
    Encoder,
}

/// Class of a device from its declared capabilities. `None` for devices
/// the kiosk has no use for.
pub fn classify(caps: &Capabilities) -> Option<DeviceClass> {
    let axes = [codes::ABS_X, codes::ABS_Y, codes::ABS_HAT0X, codes::ABS_HAT0Y];
    if axes.iter().any(|a| caps.has_abs(*a)) {
        return Some(DeviceClass::Joystick);
    }

    let dials = [codes::REL_DIAL, codes::REL_WHEEL, codes::REL_X, codes::REL_Y];
    // Une souris a des axes relatifs et BTN_LEFT : on l'ignore
    if dials.iter().any(|r| caps.has_rel(*r)) && !caps.has_key(codes::BTN_LEFT) {
        return Some(DeviceClass::Encoder);
    }

    if caps.keys.iter().any(|k| key_action(*k).is_some()) {
        return Some(DeviceClass::Keys);
    }
    None
}

/// Action bound to a key or button code.
pub fn key_action(code: u16) -> Option<Action> {
    use codes::*;
    let action = match code {
        KEY_ENTER | KEY_SPACE | BTN_SOUTH | BTN_TRIGGER => Action::Confirm,
        KEY_ESC | KEY_BACKSPACE | BTN_EAST | BTN_THUMB => Action::Cancel,
        KEY_M | BTN_START | BTN_SELECT | BTN_MODE => Action::Menu,
        KEY_UP | BTN_DPAD_UP => Action::Up,
        KEY_DOWN | BTN_DPAD_DOWN => Action::Down,
        KEY_LEFT | BTN_DPAD_LEFT => Action::Left,
        KEY_RIGHT | BTN_DPAD_RIGHT => Action::Right,
        KEY_PAGEUP | BTN_TL => Action::ShoulderLeft,
        KEY_PAGEDOWN | BTN_TR => Action::ShoulderRight,
        _ => return None,
    };
    Some(action)
}

/// Software accumulator for relative encoders: one step is emitted once
/// the accumulated magnitude reaches the threshold, then it restarts.
#[derive(Debug, Clone)]
pub struct RotaryAccumulator {
    threshold: i32,
    accumulated: i32,
}

impl RotaryAccumulator {
    pub fn new(threshold: i32) -> Self {
        Self {
            threshold: threshold.max(1),
            accumulated: 0,
        }
    }

    /// Returns `Some(±1)` when a step completes.
    pub fn add(&mut self, delta: i32) -> Option<i32> {
        if delta == 0 {
            return None;
        }
        // Changement de sens : on repart de zéro
        if self.accumulated != 0 && self.accumulated.signum() != delta.signum() {
            self.accumulated = 0;
        }
        self.accumulated = self.accumulated.saturating_add(delta);
        if self.accumulated.abs() >= self.threshold {
            let step = self.accumulated.signum();
            self.accumulated = 0;
            Some(step)
        } else {
            None
        }
    }
}

/// Translation state of one device.
#[derive(Debug, Clone)]
pub struct Translator {
    class: DeviceClass,
    deadzone: i64,
    ranges: HashMap<u16, AxisRange>,
    directions: HashMap<u16, i32>,
    encoder: RotaryAccumulator,
}

impl Translator {
    pub fn new(class: DeviceClass, caps: &Capabilities, deadzone: i32, encoder_threshold: i32) -> Self {
        Self {
            class,
            deadzone: i64::from(deadzone.max(0)),
            ranges: caps.abs_axes.iter().copied().collect(),
            directions: HashMap::new(),
            encoder: RotaryAccumulator::new(encoder_threshold),
        }
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    /// Appends the actions produced by `event` to `out`.
    pub fn translate(&mut self, event: RawEvent, out: &mut Vec<InputEvent>) {
        match event.kind {
            codes::EV_KEY => {
                // 2 = répétition automatique
                if event.value == 2 {
                    return;
                }
                if let Some(action) = key_action(event.code) {
                    out.push(InputEvent::button(action, event.value != 0));
                }
            }
            codes::EV_ABS => match event.code {
                codes::ABS_HAT0X | codes::ABS_HAT0Y => {
                    self.set_direction(event.code, event.value.signum(), out);
                }
                codes::ABS_X | codes::ABS_Y => {
                    let direction = self.axis_direction(event.code, event.value);
                    self.set_direction(event.code, direction, out);
                }
                _ => {}
            },
            codes::EV_REL if self.class == DeviceClass::Encoder => {
                if let Some(step) = self.encoder.add(event.value) {
                    out.push(InputEvent::rotate(step));
                }
            }
            _ => {}
        }
    }

    fn axis_direction(&self, code: u16, raw: i32) -> i32 {
        let normalized = match self.ranges.get(&code) {
            Some(range) if range.max > range.min => {
                let min = i64::from(range.min);
                let max = i64::from(range.max);
                let center = (min + max) / 2;
                let half = ((max - min) / 2).max(1);
                (i64::from(raw) - center) * AXIS_SCALE / half
            }
            _ => i64::from(raw),
        };
        if normalized <= -self.deadzone && normalized != 0 {
            -1
        } else if normalized >= self.deadzone && normalized != 0 {
            1
        } else {
            0
        }
    }

    /// Emits release/press edges when the direction of `code` changes.
    fn set_direction(&mut self, code: u16, direction: i32, out: &mut Vec<InputEvent>) {
        let previous = self.directions.insert(code, direction).unwrap_or(0);
        if previous == direction {
            return;
        }
        let vertical = matches!(code, codes::ABS_Y | codes::ABS_HAT0Y);
        let action_for = |dir: i32| match (vertical, dir < 0) {
            (false, true) => Action::Left,
            (false, false) => Action::Right,
            (true, true) => Action::Up,
            (true, false) => Action::Down,
        };
        if previous != 0 {
            out.push(InputEvent::button(action_for(previous), false));
        }
        if direction != 0 {
            out.push(InputEvent::button(action_for(direction), true));
        }
    }
}
