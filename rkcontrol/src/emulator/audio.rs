//! Audio sink selection and volume translation for the emulator.

use std::fs;

use tracing::debug;

/// ALSA playback devices as listed by the kernel.
pub const PCM_LIST: &str = "/proc/asound/pcm";

/// Used when nothing could be probed: first card, first device.
pub const FALLBACK_SINK: &str = "hw:0,0";

/// Floor of the volume translation, in dB.
pub const MIN_DB: f32 = -60.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSink {
    pub card: u32,
    pub device: u32,
    pub id: String,
    pub name: String,
}

impl AudioSink {
    pub fn alsa_name(&self) -> String {
        format!("hw:{},{}", self.card, self.device)
    }
}

/// How a sink was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkRank {
    ExactName,
    CardDevice,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSink {
    pub device: String,
    pub rank: SinkRank,
}

/// Parses `/proc/asound/pcm` lines such as
/// `00-00: bcm2835 Headphones : bcm2835 Headphones : playback 8`.
pub fn parse_pcm_list(text: &str) -> Vec<AudioSink> {
    text.lines()
        .filter_map(|line| {
            let (numbers, rest) = line.split_once(':')?;
            let (card, device) = numbers.trim().split_once('-')?;
            let card = card.parse::<u32>().ok()?;
            let device = device.parse::<u32>().ok()?;

            let fields: Vec<&str> = rest.split(" : ").map(str::trim).collect();
            if !fields.iter().any(|f| f.starts_with("playback")) {
                return None;
            }
            Some(AudioSink {
                card,
                device,
                id: fields.first().copied().unwrap_or_default().to_string(),
                name: fields.get(1).copied().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

/// Playback sinks of the running system.
pub fn probe_sinks() -> Vec<AudioSink> {
    match fs::read_to_string(PCM_LIST) {
        Ok(text) => parse_pcm_list(&text),
        Err(err) => {
            debug!(error = %err, "Cannot read ALSA device list");
            Vec::new()
        }
    }
}

/// Parses `hw:1,0`, `1,0`, `card1` or `1`.
fn card_device(preferred: &str) -> Option<(u32, Option<u32>)> {
    let spec = preferred
        .trim()
        .trim_start_matches("plughw:")
        .trim_start_matches("hw:")
        .trim_start_matches("card");
    match spec.split_once(',') {
        Some((card, device)) => Some((card.trim().parse().ok()?, Some(device.trim().parse().ok()?))),
        None => Some((spec.trim().parse().ok()?, None)),
    }
}

/// Ranked choice: exact name, then card/device number, then the
/// fallback. With `auto`, the heuristic prefers HDMI sinks, then the
/// lowest card and device numbers.
pub fn resolve_sink(preferred: &str, sinks: &[AudioSink]) -> ResolvedSink {
    let preferred = preferred.trim();
    let auto = preferred.is_empty() || preferred.eq_ignore_ascii_case("auto");

    if !auto {
        if let Some(sink) = sinks.iter().find(|s| {
            s.id.eq_ignore_ascii_case(preferred)
                || s.name.eq_ignore_ascii_case(preferred)
                || s.alsa_name() == preferred
        }) {
            return ResolvedSink {
                device: sink.alsa_name(),
                rank: SinkRank::ExactName,
            };
        }
    }

    let heuristic = if auto {
        let is_hdmi = |s: &&AudioSink| {
            s.id.to_lowercase().contains("hdmi") || s.name.to_lowercase().contains("hdmi")
        };
        sinks
            .iter()
            .filter(is_hdmi)
            .min_by_key(|s| (s.card, s.device))
            .or_else(|| sinks.iter().min_by_key(|s| (s.card, s.device)))
    } else {
        card_device(preferred).and_then(|(card, device)| {
            sinks
                .iter()
                .filter(|s| s.card == card && device.is_none_or(|d| s.device == d))
                .min_by_key(|s| s.device)
        })
    };

    match heuristic {
        Some(sink) => ResolvedSink {
            device: sink.alsa_name(),
            rank: SinkRank::CardDevice,
        },
        None => ResolvedSink {
            device: FALLBACK_SINK.to_string(),
            rank: SinkRank::Fallback,
        },
    }
}

/// `20·log10(p/100)` clamped to `[MIN_DB, 0]`; 0 % is the floor.
pub fn volume_to_db(percent: u8) -> f32 {
    let percent = percent.min(100);
    if percent == 0 {
        return MIN_DB;
    }
    let db = 20.0 * (f32::from(percent) / 100.0).log10();
    db.clamp(MIN_DB, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PCM: &str = "\
00-00: bcm2835 Headphones : bcm2835 Headphones : playback 8
01-00: MAI PCM i2s-hifi-0 : MAI PCM i2s-hifi-0 : playback 1
02-00: USB Audio : USB Audio : playback 1 : capture 1
03-00: USB Mic : USB Mic : capture 1
04-03: HDMI 0 : vc4-hdmi-0 : playback 1
";

    #[test]
    fn test_parse_pcm_list_keeps_playback_only() {
        let sinks = parse_pcm_list(PCM);
        assert_eq!(sinks.len(), 4);
        assert_eq!(sinks[0].id, "bcm2835 Headphones");
        assert_eq!(sinks[3].alsa_name(), "hw:4,3");
        assert!(sinks.iter().all(|s| s.card != 3));
    }

    #[test]
    fn test_exact_name_wins() {
        let sinks = parse_pcm_list(PCM);
        let resolved = resolve_sink("usb audio", &sinks);
        assert_eq!(resolved.device, "hw:2,0");
        assert_eq!(resolved.rank, SinkRank::ExactName);
    }

    #[test]
    fn test_card_device_heuristic() {
        let sinks = parse_pcm_list(PCM);
        let resolved = resolve_sink("hw:1", &sinks);
        assert_eq!(resolved.device, "hw:1,0");
        assert_eq!(resolved.rank, SinkRank::CardDevice);

        // Auto : HDMI d'abord
        let resolved = resolve_sink("auto", &sinks);
        assert_eq!(resolved.device, "hw:4,3");
        assert_eq!(resolved.rank, SinkRank::CardDevice);
    }

    #[test]
    fn test_fallback() {
        let resolved = resolve_sink("auto", &[]);
        assert_eq!(resolved.device, FALLBACK_SINK);
        assert_eq!(resolved.rank, SinkRank::Fallback);

        let sinks = parse_pcm_list(PCM);
        assert_eq!(resolve_sink("hw:9,0", &sinks).rank, SinkRank::Fallback);
    }

    #[test]
    fn test_volume_to_db() {
        assert_eq!(volume_to_db(0), -60.0);
        assert_eq!(volume_to_db(100), 0.0);
        assert_eq!(volume_to_db(200), 0.0);
        assert!((volume_to_db(50) - (-6.0206)).abs() < 0.001);
        assert!((volume_to_db(1) - (-40.0)).abs() < 0.001);
        assert!(volume_to_db(0).is_finite());
    }
}
