//! Controller commands and their mapping from input actions.

use crate::input::{Action, InputEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TogglePause,
    Next,
    Previous,
    NextPlaylist,
    PreviousPlaylist,
    /// Volume change in steps, signed.
    Volume(i32),
    ToggleShuffle,
    Stop,
}

/// Command triggered by `event`. Buttons act on press only.
pub fn command_for(event: &InputEvent) -> Option<Command> {
    if event.action == Action::Rotate {
        return (event.delta != 0).then_some(Command::Volume(event.delta.signum()));
    }
    if !event.pressed {
        return None;
    }
    match event.action {
        Action::Confirm => Some(Command::TogglePause),
        Action::Right | Action::ShoulderRight => Some(Command::Next),
        Action::Left | Action::ShoulderLeft => Some(Command::Previous),
        Action::Up => Some(Command::NextPlaylist),
        Action::Down => Some(Command::PreviousPlaylist),
        Action::Menu => Some(Command::ToggleShuffle),
        Action::Cancel => Some(Command::Stop),
        Action::Rotate => None,
    }
}
