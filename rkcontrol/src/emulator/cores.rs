//! Core resolution and per-family input profiles.

use rkplaylist::AUTO_CORE;

use crate::errors::{KioskError, Result};

/// Default core per system name. Several names map to the same system
/// because ROM folders are named by people.
const DEFAULT_CORES: &[(&[&str], &str)] = &[
    (&["nes", "famicom", "fds"], "fceumm"),
    (&["snes", "sfc", "superfamicom"], "snes9x"),
    (&["n64"], "mupen64plus_next"),
    (&["gb", "gameboy"], "gambatte"),
    (&["gbc", "gameboycolor"], "gambatte"),
    (&["gba", "gameboyadvance"], "mgba"),
    (&["nds"], "desmume"),
    (&["sms", "mastersystem"], "genesis_plus_gx"),
    (&["gg", "gamegear"], "genesis_plus_gx"),
    (&["genesis", "megadrive", "md"], "genesis_plus_gx"),
    (&["segacd", "megacd"], "genesis_plus_gx"),
    (&["psx", "ps1", "playstation"], "pcsx_rearmed"),
    (&["pce", "pcengine", "tg16"], "mednafen_pce_fast"),
    (&["arcade", "fbneo", "neogeo"], "fbneo"),
    (&["mame"], "mame2003_plus"),
    (&["atari2600", "a26"], "stella"),
    (&["atari7800", "a78"], "prosystem"),
    (&["lynx"], "handy"),
    (&["ngp", "ngpc"], "mednafen_ngp"),
    (&["ws", "wsc", "wonderswan"], "mednafen_wswan"),
];

pub fn default_core_for(system: &str) -> Option<&'static str> {
    let system = system.trim().to_lowercase();
    DEFAULT_CORES
        .iter()
        .find(|(names, _)| names.contains(&system.as_str()))
        .map(|(_, core)| *core)
}

/// Concrete core name for an item: the table default for `auto`, the
/// given name otherwise (without any `_libretro.so` suffix).
pub fn resolve_core(core: &str, system: &str) -> Result<String> {
    let core = core.trim();
    if core.is_empty() || core.eq_ignore_ascii_case(AUTO_CORE) {
        return default_core_for(system)
            .map(str::to_string)
            .ok_or_else(|| KioskError::configuration(format!("no default core for system '{system}'")));
    }
    Ok(core
        .trim_end_matches(".so")
        .trim_end_matches("_libretro")
        .to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreFamily {
    /// NES, Master System, Game Boy, PC Engine.
    TwoButton,
    /// SNES layout, also the generic RetroPad.
    FourButton,
    /// Mega Drive 6-button pad.
    SixButton,
    Arcade,
    PlayStation,
    N64,
}

impl CoreFamily {
    pub fn for_core(core: &str) -> Self {
        let core = core.to_lowercase();
        let starts = |prefixes: &[&str]| prefixes.iter().any(|p| core.starts_with(p));
        if starts(&["fceumm", "nestopia", "mesen", "quicknes", "gambatte", "sameboy", "mednafen_pce", "beetle_pce", "stella", "prosystem", "handy"]) {
            CoreFamily::TwoButton
        } else if starts(&["genesis_plus_gx", "picodrive", "blastem"]) {
            CoreFamily::SixButton
        } else if starts(&["fbneo", "fbalpha", "mame"]) {
            CoreFamily::Arcade
        } else if starts(&["pcsx", "beetle_psx", "mednafen_psx", "swanstation", "duckstation"]) {
            CoreFamily::PlayStation
        } else if starts(&["mupen64", "parallel_n64"]) {
            CoreFamily::N64
        } else {
            CoreFamily::FourButton
        }
    }
}

/// How the emulator reads the directional pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directions {
    /// Hat 0 (`h0up`, ...).
    Hat,
    Buttons { up: u8, down: u8, left: u8, right: u8 },
}

/// Physical button index for each logical action, for one core family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputProfile {
    pub family: CoreFamily,
    pub confirm: u8,
    pub cancel: u8,
    pub start: u8,
    pub select: u8,
    /// Pressed with `select` as hotkey.
    pub menu_toggle: u8,
    pub shoulder_left: u8,
    pub shoulder_right: u8,
    /// Remaining face buttons: (RetroPad name, physical index).
    pub extra: &'static [(&'static str, u8)],
    pub directions: Directions,
    /// Controllers that report the pad as an analog stick.
    pub analog_dpad: bool,
}

const PROFILES: &[InputProfile] = &[
    InputProfile {
        family: CoreFamily::TwoButton,
        confirm: 1,
        cancel: 0,
        start: 9,
        select: 8,
        menu_toggle: 3,
        shoulder_left: 4,
        shoulder_right: 5,
        extra: &[],
        directions: Directions::Hat,
        analog_dpad: false,
    },
    InputProfile {
        family: CoreFamily::FourButton,
        confirm: 1,
        cancel: 0,
        start: 9,
        select: 8,
        menu_toggle: 3,
        shoulder_left: 4,
        shoulder_right: 5,
        extra: &[("x", 3), ("y", 2)],
        directions: Directions::Hat,
        analog_dpad: false,
    },
    InputProfile {
        family: CoreFamily::SixButton,
        // A B C en bas, X Y Z en haut
        confirm: 2,
        cancel: 1,
        start: 9,
        select: 8,
        menu_toggle: 3,
        shoulder_left: 3,
        shoulder_right: 5,
        extra: &[("y", 0), ("x", 4)],
        directions: Directions::Hat,
        analog_dpad: false,
    },
    InputProfile {
        family: CoreFamily::Arcade,
        confirm: 0,
        cancel: 1,
        start: 9,
        select: 8,
        menu_toggle: 3,
        shoulder_left: 4,
        shoulder_right: 5,
        extra: &[("x", 2), ("y", 3)],
        directions: Directions::Hat,
        analog_dpad: false,
    },
    InputProfile {
        family: CoreFamily::PlayStation,
        confirm: 1,
        cancel: 2,
        start: 9,
        select: 8,
        menu_toggle: 3,
        shoulder_left: 4,
        shoulder_right: 5,
        extra: &[("x", 3), ("y", 0)],
        directions: Directions::Hat,
        analog_dpad: true,
    },
    InputProfile {
        family: CoreFamily::N64,
        confirm: 1,
        cancel: 0,
        start: 9,
        select: 8,
        menu_toggle: 3,
        shoulder_left: 4,
        shoulder_right: 5,
        extra: &[],
        directions: Directions::Buttons {
            up: 12,
            down: 13,
            left: 14,
            right: 15,
        },
        analog_dpad: true,
    },
];

impl InputProfile {
    pub fn for_family(family: CoreFamily) -> &'static InputProfile {
        PROFILES
            .iter()
            .find(|p| p.family == family)
            .unwrap_or(&PROFILES[1])
    }

    pub fn for_core(core: &str) -> &'static InputProfile {
        Self::for_family(CoreFamily::for_core(core))
    }

    /// Run-configuration entries for player 1.
    pub fn entries(&self) -> Vec<(String, String)> {
        let player = |name: &str| format!("input_player1_{name}");
        let mut entries = vec![
            (player("a_btn"), self.confirm.to_string()),
            (player("b_btn"), self.cancel.to_string()),
            (player("start_btn"), self.start.to_string()),
            (player("select_btn"), self.select.to_string()),
            (player("l_btn"), self.shoulder_left.to_string()),
            (player("r_btn"), self.shoulder_right.to_string()),
            ("input_enable_hotkey_btn".to_string(), self.select.to_string()),
            ("input_menu_toggle_btn".to_string(), self.menu_toggle.to_string()),
            ("input_exit_emulator_btn".to_string(), self.start.to_string()),
        ];
        for (name, index) in self.extra {
            entries.push((player(&format!("{name}_btn")), index.to_string()));
        }

        match self.directions {
            Directions::Hat => {
                for dir in ["up", "down", "left", "right"] {
                    entries.push((player(&format!("{dir}_btn")), format!("h0{dir}")));
                }
            }
            Directions::Buttons { up, down, left, right } => {
                for (dir, index) in [("up", up), ("down", down), ("left", left), ("right", right)] {
                    entries.push((player(&format!("{dir}_btn")), index.to_string()));
                }
            }
        }

        if self.analog_dpad {
            entries.push((player("analog_dpad_mode"), "1".to_string()));
            entries.push((player("up_axis"), "-1".to_string()));
            entries.push((player("down_axis"), "+1".to_string()));
            entries.push((player("left_axis"), "-0".to_string()));
            entries.push((player("right_axis"), "+0".to_string()));
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_core_resolution() {
        assert_eq!(resolve_core("auto", "gba").unwrap(), "mgba");
        assert_eq!(resolve_core("AUTO", "MegaDrive").unwrap(), "genesis_plus_gx");
        assert_eq!(resolve_core("", "nes").unwrap(), "fceumm");
        assert!(matches!(
            resolve_core("auto", "vectrex"),
            Err(KioskError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_explicit_core_is_normalized() {
        assert_eq!(resolve_core("snes9x_libretro.so", "nes").unwrap(), "snes9x");
        assert_eq!(resolve_core("fbneo", "whatever").unwrap(), "fbneo");
    }

    #[test]
    fn test_every_family_has_a_profile() {
        for family in [
            CoreFamily::TwoButton,
            CoreFamily::FourButton,
            CoreFamily::SixButton,
            CoreFamily::Arcade,
            CoreFamily::PlayStation,
            CoreFamily::N64,
        ] {
            assert_eq!(InputProfile::for_family(family).family, family);
        }
    }

    #[test]
    fn test_profile_entries() {
        let genesis = InputProfile::for_core("genesis_plus_gx");
        assert_eq!(genesis.family, CoreFamily::SixButton);
        let entries = genesis.entries();
        assert!(entries.contains(&("input_player1_a_btn".to_string(), "2".to_string())));
        assert!(entries.contains(&("input_player1_b_btn".to_string(), "1".to_string())));
        assert!(entries.contains(&("input_player1_up_btn".to_string(), "h0up".to_string())));
        assert!(!entries.iter().any(|(k, _)| k == "input_player1_analog_dpad_mode"));

        let psx = InputProfile::for_core("pcsx_rearmed");
        assert!(psx
            .entries()
            .contains(&("input_player1_analog_dpad_mode".to_string(), "1".to_string())));
    }
}
