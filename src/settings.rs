//! Transmission settings as handed over by the application shell.
//!
//! Keys are camelCase to match the shell's JSON. Every field has a default,
//! so a partial object (or `{}`) is valid input. Out-of-range values are
//! rejected by [`TransmissionSettings::validate`], never clamped.

use serde::{Deserialize, Serialize};

use crate::error::{StationError, ValidationError};
use crate::voice_pack::DEFAULT_PACK;

pub const WPM_RANGE: (f64, f64) = (5.0, 60.0);
pub const FREQUENCY_RANGE: (f64, f64) = (300.0, 3000.0);
pub const PLAYBACK_SPEED_RANGE: (f64, f64) = (0.5, 2.0);
pub const PITCH_SHIFT_RANGE: (f64, f64) = (-12.0, 12.0);
/// Resampling rates reachable from valid speed and pitch settings.
pub const PLAYBACK_RATE_RANGE: (f64, f64) = (0.25, 4.0);
pub const UNIT_RANGE: (f64, f64) = (0.0, 1.0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransmissionSettings {
    /// Voice pack id.
    pub voice_pack: String,
    /// Gap after each digit inside a group, in milliseconds.
    pub digit_gap: u32,
    /// Gap after the last digit of a group, in milliseconds.
    pub group_gap: u32,
    /// Gap after the prelude and separator words, in milliseconds.
    pub prelude_gap: u32,
    /// Transmit every group twice.
    pub repeat_groups: bool,
    /// Mix looping background noise under the transmission.
    pub add_noise: bool,
    pub noise_volume: f64,
    /// CW tone frequency in Hz.
    pub frequency: f64,
    /// CW speed in words per minute.
    pub wpm: f64,
    pub volume: f64,
    /// Voice playback speed multiplier.
    pub playback_speed: f64,
    /// Voice pitch shift in semitones, applied by resampling.
    pub pitch_shift: f64,
}

impl Default for TransmissionSettings {
    fn default() -> Self {
        TransmissionSettings {
            voice_pack: DEFAULT_PACK.to_string(),
            digit_gap: 800,
            group_gap: 1500,
            prelude_gap: 2000,
            repeat_groups: false,
            add_noise: false,
            noise_volume: 0.1,
            frequency: 800.0,
            wpm: 20.0,
            volume: 0.7,
            playback_speed: 1.0,
            pitch_shift: 0.0,
        }
    }
}

impl TransmissionSettings {
    /// Parse and validate settings JSON.
    pub fn from_json(json: &str) -> Result<Self, StationError> {
        let settings: TransmissionSettings = serde_json::from_str(json)
            .map_err(|e| ValidationError::InvalidSettings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_range("noiseVolume", self.noise_volume, UNIT_RANGE)?;
        check_range("frequency", self.frequency, FREQUENCY_RANGE)?;
        check_range("wpm", self.wpm, WPM_RANGE)?;
        check_range("volume", self.volume, UNIT_RANGE)?;
        check_range("playbackSpeed", self.playback_speed, PLAYBACK_SPEED_RANGE)?;
        check_range("pitchShift", self.pitch_shift, PITCH_SHIFT_RANGE)?;
        if self.voice_pack.trim().is_empty() {
            return Err(ValidationError::Empty { field: "voicePack" });
        }
        Ok(())
    }

    /// Resampling rate for voice clips: speed times the pitch ratio.
    pub fn playback_rate(&self) -> f64 {
        self.playback_speed * 2.0_f64.powf(self.pitch_shift / 12.0)
    }
}

pub(crate) fn ms_to_secs(ms: u32) -> f64 {
    ms as f64 / 1000.0
}

/// Inclusive range check. NaN never passes.
pub fn check_range(
    setting: &'static str,
    value: f64,
    (min, max): (f64, f64),
) -> Result<(), ValidationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            setting,
            value,
            min,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = TransmissionSettings::default();
        assert_eq!(s.voice_pack, "default");
        assert_eq!((s.digit_gap, s.group_gap, s.prelude_gap), (800, 1500, 2000));
        assert!(!s.repeat_groups && !s.add_noise);
        assert_eq!(s.noise_volume, 0.1);
        assert_eq!(s.frequency, 800.0);
        assert_eq!(s.wpm, 20.0);
        assert_eq!(s.volume, 0.7);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s = TransmissionSettings::from_json(r#"{"digitGap": 500, "repeatGroups": true}"#).unwrap();
        assert_eq!(s.digit_gap, 500);
        assert!(s.repeat_groups);
        assert_eq!(s.group_gap, 1500);

        let empty = TransmissionSettings::from_json("{}").unwrap();
        assert_eq!(empty, TransmissionSettings::default());
    }

    #[test]
    fn out_of_range_is_rejected_not_clamped() {
        let err = TransmissionSettings::from_json(r#"{"wpm": 61}"#).unwrap_err();
        assert_eq!(
            err,
            ValidationError::OutOfRange { setting: "wpm", value: 61.0, min: 5.0, max: 60.0 }.into()
        );

        let s = TransmissionSettings { frequency: 299.0, ..Default::default() };
        assert!(matches!(
            s.validate(),
            Err(ValidationError::OutOfRange { setting: "frequency", .. })
        ));

        let s = TransmissionSettings { volume: f64::NAN, ..Default::default() };
        assert!(s.validate().is_err(), "NaN must not pass range checks");
    }

    #[test]
    fn boundaries_are_inclusive() {
        let s = TransmissionSettings {
            wpm: 5.0,
            frequency: 3000.0,
            playback_speed: 0.5,
            pitch_shift: -12.0,
            noise_volume: 1.0,
            ..Default::default()
        };
        assert!(s.validate().is_ok());
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        assert!(matches!(
            TransmissionSettings::from_json(r#"{"digitGap": -5}"#),
            Err(StationError::Validation(ValidationError::InvalidSettings(_)))
        ));
    }

    #[test]
    fn playback_rate_combines_speed_and_pitch() {
        let s = TransmissionSettings { playback_speed: 1.5, pitch_shift: 12.0, ..Default::default() };
        assert!((s.playback_rate() - 3.0).abs() < 1e-9);

        let s = TransmissionSettings { pitch_shift: -12.0, ..Default::default() };
        assert!((s.playback_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn gaps_in_seconds() {
        assert_eq!(ms_to_secs(800), 0.8);
        assert_eq!(ms_to_secs(0), 0.0);
    }
}
