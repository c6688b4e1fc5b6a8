//! Transmission sequences: what is played, when, and for how long.
//!
//! Voice transmissions are built in two steps. A [`VoiceScript`] lists the
//! clips to play and the gap after each one, independent of any voice pack.
//! [`VoiceScript::schedule`] then resolves clip lengths against a loaded
//! pack and produces a [`TransmissionSequence`] with absolute offsets.
//!
//! Offsets start at zero and never decrease. The trailing gap of the last
//! sounding event is dropped, so the total duration ends when the last clip
//! or tone ends.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::encoder::{EncodedMessage, random_digit};
use crate::error::{FormatError, ResourceError, StationError, ValidationError};
use crate::settings::{PLAYBACK_RATE_RANGE, TransmissionSettings, check_range, ms_to_secs};
use crate::voice_pack::{SoundKey, VoicePack};

/// Digits in the random message identifier.
pub const MESSAGE_ID_LEN: usize = 5;

// ── Events ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// CW tone.
    Tone,
    /// Spoken digit clip.
    Digit,
    /// Spoken control word clip.
    Word,
    /// Silence.
    Pause,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum EventPayload {
    Sound(SoundKey),
    /// Tone frequency in Hz.
    Frequency(f64),
    Silence,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmissionEvent {
    pub kind: EventKind,
    pub payload: EventPayload,
    /// Seconds.
    pub duration: f64,
    /// Seconds from the start of the transmission.
    pub start_offset: f64,
}

impl TransmissionEvent {
    pub fn end(&self) -> f64 {
        self.start_offset + self.duration
    }

    pub fn sound(&self) -> Option<SoundKey> {
        match self.payload {
            EventPayload::Sound(key) => Some(key),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmissionSequence {
    events: Vec<TransmissionEvent>,
    total_duration: f64,
}

impl TransmissionSequence {
    pub fn events(&self) -> &[TransmissionEvent] {
        &self.events
    }

    /// Seconds from the first event's start to the last event's end.
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    /// Every event except pauses.
    pub fn sounding(&self) -> impl Iterator<Item = &TransmissionEvent> {
        self.events.iter().filter(|e| e.kind != EventKind::Pause)
    }

    pub fn is_monotonic(&self) -> bool {
        self.events
            .windows(2)
            .all(|w| w[1].start_offset >= w[0].start_offset)
    }
}

/// Appends events back to back from offset zero.
#[derive(Debug, Default)]
pub struct SequenceBuilder {
    events: Vec<TransmissionEvent>,
    cursor: f64,
}

impl SequenceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current offset in seconds.
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn push(&mut self, kind: EventKind, payload: EventPayload, duration: f64) {
        self.events.push(TransmissionEvent {
            kind,
            payload,
            duration,
            start_offset: self.cursor,
        });
        self.cursor += duration;
    }

    /// Add silence. Consecutive gaps merge into one pause; empty gaps are
    /// skipped.
    pub fn gap(&mut self, seconds: f64) {
        if seconds <= 0.0 {
            return;
        }
        match self.events.last_mut() {
            Some(last) if last.kind == EventKind::Pause => {
                last.duration += seconds;
                self.cursor += seconds;
            }
            _ => self.push(EventKind::Pause, EventPayload::Silence, seconds),
        }
    }

    /// Drop trailing silence and close the sequence.
    pub fn finish(mut self) -> TransmissionSequence {
        while self.events.last().is_some_and(|e| e.kind == EventKind::Pause) {
            self.events.pop();
        }
        let total_duration = self.events.last().map_or(0.0, TransmissionEvent::end);
        TransmissionSequence {
            events: self.events,
            total_duration,
        }
    }
}

// ── Voice script ────────────────────────────────────────────

/// One clip (or a bare pause) followed by a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptStep {
    pub sound: Option<SoundKey>,
    /// Gap after the clip, in milliseconds.
    pub gap_ms: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceScript {
    pub steps: Vec<ScriptStep>,
}

impl VoiceScript {
    fn sound(&mut self, key: SoundKey, gap_ms: u32) {
        self.steps.push(ScriptStep {
            sound: Some(key),
            gap_ms,
        });
    }

    fn pause(&mut self, gap_ms: u32) {
        self.steps.push(ScriptStep { sound: None, gap_ms });
    }

    fn digits(&mut self, digits: &str, gap_ms: u32) {
        for key in digits.chars().filter_map(SoundKey::from_digit) {
            self.sound(key, gap_ms);
        }
    }

    /// Full voice transmission for an encoded message:
    ///
    /// achtung, 5-digit message id, trennung, 2-digit group count,
    /// trennung, the groups, ende.
    pub fn for_message<R: Rng>(
        message: &EncodedMessage,
        settings: &TransmissionSettings,
        rng: &mut R,
    ) -> Result<VoiceScript, StationError> {
        let message_id: String = (0..MESSAGE_ID_LEN).map(|_| random_digit(rng)).collect();
        let body = VoiceScript::for_groups(&message.groups, settings)?;

        let mut script = VoiceScript::default();
        script.sound(SoundKey::Achtung, settings.prelude_gap);
        script.digits(&message_id, settings.digit_gap);
        script.sound(SoundKey::Trennung, settings.prelude_gap);
        script.digits(&format!("{:02}", message.count), settings.digit_gap);
        script.sound(SoundKey::Trennung, settings.prelude_gap);
        script.steps.extend(body.steps);
        script.sound(SoundKey::Ende, 0);
        Ok(script)
    }

    /// Group body only: digits separated by the digit gap, the last digit of
    /// each group followed by the group gap. With `repeat_groups` every
    /// group is sent twice in a row.
    pub fn for_groups(groups: &[String], settings: &TransmissionSettings) -> Result<VoiceScript, StationError> {
        let mut script = VoiceScript::default();
        for group in groups {
            if let Some((position, ch)) = group.chars().enumerate().find(|(_, c)| !c.is_ascii_digit()) {
                return Err(FormatError::NonDigit { position, ch }.into());
            }
            let passes = if settings.repeat_groups { 2 } else { 1 };
            for _ in 0..passes {
                let last = group.len().saturating_sub(1);
                for (i, key) in group.chars().filter_map(SoundKey::from_digit).enumerate() {
                    let gap = if i == last { settings.group_gap } else { settings.digit_gap };
                    script.sound(key, gap);
                }
            }
        }
        Ok(script)
    }

    /// Script typed directly by the user.
    ///
    /// Digits play their clip followed by the digit gap. `*` and `#` play
    /// achtung, `/` trennung and `+` ende, each followed by the prelude gap.
    /// A space adds a digit gap, `_` adds a prelude gap. Anything else is
    /// ignored.
    pub fn from_text(text: &str, settings: &TransmissionSettings) -> VoiceScript {
        let mut script = VoiceScript::default();
        for ch in text.chars() {
            match ch {
                '0'..='9' => script.digits(ch.encode_utf8(&mut [0; 4]), settings.digit_gap),
                '*' | '#' => script.sound(SoundKey::Achtung, settings.prelude_gap),
                '/' => script.sound(SoundKey::Trennung, settings.prelude_gap),
                '+' => script.sound(SoundKey::Ende, settings.prelude_gap),
                ' ' => script.pause(settings.digit_gap),
                '_' => script.pause(settings.prelude_gap),
                _ => {}
            }
        }
        script
    }

    /// A single clip with no gap.
    pub fn single(key: SoundKey) -> VoiceScript {
        let mut script = VoiceScript::default();
        script.sound(key, 0);
        script
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of steps that play a clip.
    pub fn sound_count(&self) -> usize {
        self.steps.iter().filter(|s| s.sound.is_some()).count()
    }

    /// Resolve clip lengths against `pack`.
    ///
    /// Clip durations are divided by `playback_rate`, since faster playback
    /// shortens every clip. A clip missing from the pack is an error rather
    /// than a silent skip.
    pub fn schedule(&self, pack: &VoicePack, playback_rate: f64) -> Result<TransmissionSequence, StationError> {
        check_range("playbackRate", playback_rate, PLAYBACK_RATE_RANGE)?;

        let mut builder = SequenceBuilder::new();
        for step in &self.steps {
            if let Some(key) = step.sound {
                let duration = pack.clip_duration(key, playback_rate).ok_or_else(|| ResourceError::MissingSound {
                    pack: pack.id.clone(),
                    sound: key.to_string(),
                })?;
                let kind = if key.is_digit() { EventKind::Digit } else { EventKind::Word };
                builder.push(kind, EventPayload::Sound(key), duration);
            }
            builder.gap(ms_to_secs(step.gap_ms));
        }

        let sequence = builder.finish();
        tracing::debug!(
            pack = %pack.id,
            events = sequence.len(),
            total = sequence.total_duration(),
            "scheduled voice sequence"
        );
        Ok(sequence)
    }
}

/// Make sure a script has something to play.
pub(crate) fn require_sound(script: &VoiceScript) -> Result<(), ValidationError> {
    if script.sound_count() == 0 {
        return Err(ValidationError::Empty { field: "transmission" });
    }
    Ok(())
}
