/*
 *  mixer.rs
 *
 *  Muspi - now playing on a tiny screen
 *	(c) 2020-26 Stuart Hunter
 *
 *	System volume and mute through ALSA's amixer
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */

use std::process::Command;

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::config::MixerBackend;

/// Floor of the PCM range in dB
pub const MIN_DB: f32 = -102.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeDirection {
    Up,
    Down,
}

#[derive(Debug, Error)]
pub enum MixerError {
    #[error("failed to run amixer: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("amixer {args} exited with {status}")]
    Status { args: String, status: std::process::ExitStatus },
}

/// System volume control used by the engine's volume and mute keys.
///
/// Every call is best effort: None means the mixer could not answer and
/// the caller should log and carry on.
pub trait Mixer {
    /// Current volume as a percentage
    fn volume(&mut self) -> Option<u8>;

    /// Step the volume and return the new percentage
    fn adjust(&mut self, direction: VolumeDirection) -> Option<u8>;

    fn is_muted(&mut self) -> Option<bool>;

    /// Returns the mute state after the change
    fn set_muted(&mut self, muted: bool) -> Option<bool>;

    /// Returns the mute state after the change
    fn toggle_mute(&mut self) -> Option<bool>;
}

/// Map a dB reading onto 0..=100
pub fn db_to_percent(db: f32) -> u8 {
    let pct = (db - MIN_DB) * 100.0 / (0.0 - MIN_DB + 4.0);
    pct.clamp(0.0, 100.0) as u8
}

/// `'Name',index` pairs from `amixer scontrols`
pub fn parse_controls(out: &str) -> Vec<(String, u32)> {
    let mut found = Vec::new();
    for line in out.lines() {
        let Some(open) = line.find('\'') else { continue };
        let rest = &line[open + 1..];
        let Some(close) = rest.find('\'') else { continue };
        let name = &rest[..close];
        let Some(index) = rest[close + 1..].strip_prefix(',') else { continue };
        let digits: String = index.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(index) = digits.parse() {
            found.push((name.to_string(), index));
        }
    }
    found
}

/// First `[-12.50dB]` style reading in amixer output
pub fn parse_db(out: &str) -> Option<f32> {
    out.split('[')
        .skip(1)
        .filter_map(|seg| seg.find("dB]").map(|end| &seg[..end]))
        .find_map(|v| v.parse::<f32>().ok())
}

/// Mute state from the `[on]` / `[off]` switch marker
pub fn parse_muted(out: &str) -> Option<bool> {
    if out.contains("[off]") {
        Some(true)
    } else if out.contains("[on]") {
        Some(false)
    } else {
        None
    }
}

/// Drives every PCM playback control on a card through `amixer`
pub struct AmixerMixer {
    card: String,
    step: String,
    controls: Vec<String>,
}

impl AmixerMixer {
    /// Scan the card for PCM controls that have playback limits
    pub fn detect(card: &str, step_db: f32) -> Self {
        let mut mixer = Self {
            card: card.to_string(),
            step: format!("{:.1}dB", step_db),
            controls: Vec::new(),
        };
        match mixer.amixer(&["scontrols"]) {
            Ok(out) => {
                for (name, index) in parse_controls(&out) {
                    if !name.contains("PCM") {
                        continue;
                    }
                    let control = format!("{},{}", name, index);
                    match mixer.amixer(&["sget", &control]) {
                        Ok(info) if info.contains("Limits: Playback") => {
                            info!("found PCM control: {}", control);
                            mixer.controls.push(control);
                        }
                        Ok(_) => debug!("skipping {}, no playback limits", control),
                        Err(e) => warn!("probing {} failed: {}", control, e),
                    }
                }
            }
            Err(e) => error!("detect PCM controls failed: {}", e),
        }
        if mixer.controls.is_empty() {
            warn!("no PCM playback control on card '{}', volume keys will be ignored", card);
        }
        mixer
    }

    pub fn controls(&self) -> &[String] {
        &self.controls
    }

    fn amixer(&self, args: &[&str]) -> Result<String, MixerError> {
        let mut cmd = Command::new("amixer");
        if self.card != "default" {
            cmd.args(["-c", self.card.as_str()]);
        }
        let output = cmd.args(args).output()?;
        if !output.status.success() {
            return Err(MixerError::Status { args: args.join(" "), status: output.status });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn current_db(&self, control: &str) -> Option<f32> {
        match self.amixer(&["get", control]) {
            Ok(out) => parse_db(&out),
            Err(e) => {
                error!("reading {} failed: {}", control, e);
                None
            }
        }
    }

    fn set_all(&self, value: &str) -> Option<bool> {
        let mut state = None;
        for control in &self.controls {
            match self.amixer(&["set", control, value]) {
                Ok(out) => state = state.or(parse_muted(&out)),
                Err(e) => {
                    error!("setting {} on {} failed: {}", value, control, e);
                    return None;
                }
            }
        }
        state
    }
}

impl Mixer for AmixerMixer {
    fn volume(&mut self) -> Option<u8> {
        let control = self.controls.first()?;
        let db = self.current_db(control)?;
        let pct = db_to_percent(db);
        debug!("[{}] volume: {}% ({}dB)", control, pct, db);
        Some(pct)
    }

    fn adjust(&mut self, direction: VolumeDirection) -> Option<u8> {
        if self.controls.is_empty() {
            return None;
        }
        let delta = match direction {
            VolumeDirection::Up => format!("{}+", self.step),
            VolumeDirection::Down => format!("{}-", self.step),
        };
        for control in &self.controls {
            let db = self.current_db(control)?;
            if direction == VolumeDirection::Down && db <= MIN_DB {
                info!("already at minimum {}dB", MIN_DB);
                return Some(db_to_percent(db));
            }
            if let Err(e) = self.amixer(&["set", control, &delta]) {
                error!("set {} volume failed: {}", control, e);
                return None;
            }
        }
        self.volume()
    }

    fn is_muted(&mut self) -> Option<bool> {
        let control = self.controls.first()?;
        match self.amixer(&["get", control]) {
            Ok(out) => parse_muted(&out),
            Err(e) => {
                error!("reading mute state of {} failed: {}", control, e);
                None
            }
        }
    }

    fn set_muted(&mut self, muted: bool) -> Option<bool> {
        self.set_all(if muted { "mute" } else { "unmute" })
    }

    fn toggle_mute(&mut self) -> Option<bool> {
        if self.controls.is_empty() {
            warn!("no PCM controls detected");
            return None;
        }
        let state = self.set_all("toggle");
        if let Some(muted) = state {
            info!("mute: {}", muted);
        }
        state
    }
}

/// Volume kept in memory, for panels without a sound card and for tests
#[derive(Debug, Clone)]
pub struct SoftMixer {
    volume: u8,
    muted: bool,
    step: u8,
}

impl SoftMixer {
    pub fn new(volume: u8, step: u8) -> Self {
        Self { volume: volume.min(100), muted: false, step: step.max(1) }
    }
}

impl Default for SoftMixer {
    fn default() -> Self {
        Self::new(50, 2)
    }
}

impl Mixer for SoftMixer {
    fn volume(&mut self) -> Option<u8> {
        Some(self.volume)
    }

    fn adjust(&mut self, direction: VolumeDirection) -> Option<u8> {
        self.volume = match direction {
            VolumeDirection::Up => self.volume.saturating_add(self.step).min(100),
            VolumeDirection::Down => self.volume.saturating_sub(self.step),
        };
        Some(self.volume)
    }

    fn is_muted(&mut self) -> Option<bool> {
        Some(self.muted)
    }

    fn set_muted(&mut self, muted: bool) -> Option<bool> {
        self.muted = muted;
        Some(muted)
    }

    fn toggle_mute(&mut self) -> Option<bool> {
        self.muted = !self.muted;
        Some(self.muted)
    }
}

/// No volume control at all
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMixer;

impl Mixer for NullMixer {
    fn volume(&mut self) -> Option<u8> {
        None
    }

    fn adjust(&mut self, _direction: VolumeDirection) -> Option<u8> {
        None
    }

    fn is_muted(&mut self) -> Option<bool> {
        None
    }

    fn set_muted(&mut self, _muted: bool) -> Option<bool> {
        None
    }

    fn toggle_mute(&mut self) -> Option<bool> {
        None
    }
}

/// Build the configured mixer
pub fn open(backend: MixerBackend, card: &str, step_db: f32) -> Box<dyn Mixer> {
    match backend {
        MixerBackend::Alsa => Box::new(AmixerMixer::detect(card, step_db)),
        MixerBackend::Soft => Box::new(SoftMixer::default()),
        MixerBackend::None => Box::new(NullMixer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCONTROLS: &str = "Simple mixer control 'Master',0\n\
                             Simple mixer control 'PCM',0\n\
                             Simple mixer control 'Digital PCM',1\n";

    const GET_PCM: &str = "Simple mixer control 'PCM',0\n  \
                           Capabilities: pvolume pswitch\n  \
                           Limits: Playback -10239 - 400\n  \
                           Mono: Playback -2047 [78%] [-20.47dB] [on]\n";

    #[test]
    fn test_parse_controls() {
        let controls = parse_controls(SCONTROLS);
        assert_eq!(controls.len(), 3);
        assert_eq!(controls[1], ("PCM".to_string(), 0));
        assert_eq!(controls[2], ("Digital PCM".to_string(), 1));
    }

    #[test]
    fn test_parse_db_and_switch() {
        assert_eq!(parse_db(GET_PCM), Some(-20.47));
        assert_eq!(parse_muted(GET_PCM), Some(false));
        assert_eq!(parse_muted("Mono: Playback [off]"), Some(true));
        assert_eq!(parse_db("no reading"), None);
    }

    #[test]
    fn test_db_to_percent() {
        assert_eq!(db_to_percent(MIN_DB), 0);
        assert_eq!(db_to_percent(0.0), 96);
        assert_eq!(db_to_percent(-200.0), 0);
        assert_eq!(db_to_percent(4.0), 100);
    }

    #[test]
    fn test_soft_mixer_clamps() {
        let mut m = SoftMixer::new(99, 2);
        assert_eq!(m.adjust(VolumeDirection::Up), Some(100));
        assert_eq!(m.toggle_mute(), Some(true));
        assert_eq!(m.set_muted(false), Some(false));
        let mut m = SoftMixer::new(1, 2);
        assert_eq!(m.adjust(VolumeDirection::Down), Some(0));
    }

    #[test]
    fn test_null_mixer_answers_nothing() {
        let mut m = NullMixer;
        assert_eq!(m.volume(), None);
        assert_eq!(m.toggle_mute(), None);
    }
}
