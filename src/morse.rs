//! Morse (CW) timing engine.
//!
//! Timing follows the PARIS standard: one unit is `1200 / wpm` milliseconds.
//! A dit is one unit, a dah three. Elements inside a character are one unit
//! apart, characters three, words seven. Groups in a numbers transmission
//! are ten units apart so group boundaries stay audible.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::encoder::{EncodedMessage, random_digit};
use crate::error::{FormatError, StationError, ValidationError};
use crate::sequence::{EventKind, EventPayload, MESSAGE_ID_LEN, SequenceBuilder, TransmissionSequence};
use crate::settings::{FREQUENCY_RANGE, TransmissionSettings, WPM_RANGE, check_range};
use crate::voice_pack::SoundKey;

const MORSE_TABLE: [(char, &str); 38] = [
    ('0', "-----"),
    ('1', ".----"),
    ('2', "..---"),
    ('3', "...--"),
    ('4', "....-"),
    ('5', "....."),
    ('6', "-...."),
    ('7', "--..."),
    ('8', "---.."),
    ('9', "----."),
    ('A', ".-"),
    ('B', "-..."),
    ('C', "-.-."),
    ('D', "-.."),
    ('E', "."),
    ('F', "..-."),
    ('G', "--."),
    ('H', "...."),
    ('I', ".."),
    ('J', ".---"),
    ('K', "-.-"),
    ('L', ".-.."),
    ('M', "--"),
    ('N', "-."),
    ('O', "---"),
    ('P', ".--."),
    ('Q', "--.-"),
    ('R', ".-."),
    ('S', "..."),
    ('T', "-"),
    ('U', "..-"),
    ('V', "...-"),
    ('W', ".--"),
    ('X', "-..-"),
    ('Y', "-.--"),
    ('Z', "--.."),
    ('/', "-..-."),
    ('+', ".-.-."),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MorseElement {
    Dit,
    Dah,
    ElementGap,
    LetterGap,
    WordGap,
    GroupGap,
}

impl MorseElement {
    /// Length in timing units.
    pub fn units(self) -> u32 {
        match self {
            MorseElement::Dit | MorseElement::ElementGap => 1,
            MorseElement::Dah | MorseElement::LetterGap => 3,
            MorseElement::WordGap => 7,
            MorseElement::GroupGap => 10,
        }
    }

    pub fn is_tone(self) -> bool {
        matches!(self, MorseElement::Dit | MorseElement::Dah)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MorseTiming {
    wpm: f64,
}

impl MorseTiming {
    pub fn new(wpm: f64) -> Result<Self, ValidationError> {
        validate_wpm(wpm)?;
        Ok(MorseTiming { wpm })
    }

    pub fn wpm(&self) -> f64 {
        self.wpm
    }

    pub fn unit_ms(&self) -> f64 {
        1200.0 / self.wpm
    }

    pub fn unit_seconds(&self) -> f64 {
        self.unit_ms() / 1000.0
    }

    pub fn element_duration(&self, element: MorseElement) -> f64 {
        element.units() as f64 * self.unit_seconds()
    }
}

pub fn validate_wpm(wpm: f64) -> Result<(), ValidationError> {
    check_range("wpm", wpm, WPM_RANGE)
}

pub fn validate_frequency(frequency: f64) -> Result<(), ValidationError> {
    check_range("frequency", frequency, FREQUENCY_RANGE)
}

/// Dot/dash code for a character, case-insensitive.
pub fn code_for(ch: char) -> Option<&'static str> {
    let ch = ch.to_ascii_uppercase();
    MORSE_TABLE
        .iter()
        .find(|(c, _)| *c == ch)
        .map(|(_, code)| *code)
}

/// A control word spelled letter by letter, letters joined with `/`.
///
/// `None` when the key is a digit or a letter has no code.
pub fn control_word_code(key: SoundKey) -> Option<String> {
    let word = key.word()?;
    let codes: Option<Vec<&str>> = word.chars().map(code_for).collect();
    codes.map(|c| c.join("/"))
}

/// `(character, code)` for every encodable character of `text`, in order.
pub fn symbol_pairs(text: &str) -> Vec<(char, &'static str)> {
    text.chars()
        .filter_map(|ch| code_for(ch).map(|code| (ch.to_ascii_uppercase(), code)))
        .collect()
}

/// Elements of one character code, element gaps in between.
pub fn char_elements(code: &str) -> Vec<MorseElement> {
    let mut elements = Vec::with_capacity(code.len() * 2);
    for (i, symbol) in code.chars().enumerate() {
        if i > 0 {
            elements.push(MorseElement::ElementGap);
        }
        elements.push(if symbol == '-' { MorseElement::Dah } else { MorseElement::Dit });
    }
    elements
}

/// Elements for free text. Whitespace separates words; characters without
/// a code are skipped. No gap is emitted before the first or after the last
/// character.
pub fn text_to_elements(text: &str) -> Vec<MorseElement> {
    let mut elements = Vec::new();
    for word in text.split_whitespace() {
        let codes: Vec<&str> = word.chars().filter_map(code_for).collect();
        if codes.is_empty() {
            continue;
        }
        if !elements.is_empty() {
            elements.push(MorseElement::WordGap);
        }
        for (i, code) in codes.iter().enumerate() {
            if i > 0 {
                elements.push(MorseElement::LetterGap);
            }
            elements.extend(char_elements(code));
        }
    }
    elements
}

fn push_elements(builder: &mut SequenceBuilder, elements: &[MorseElement], timing: &MorseTiming, frequency: f64) {
    for &element in elements {
        let duration = timing.element_duration(element);
        if element.is_tone() {
            builder.push(EventKind::Tone, EventPayload::Frequency(frequency), duration);
        } else {
            builder.gap(duration);
        }
    }
}

fn check_cw_settings(settings: &TransmissionSettings) -> Result<MorseTiming, ValidationError> {
    validate_frequency(settings.frequency)?;
    MorseTiming::new(settings.wpm)
}

/// Full CW transmission for an encoded message.
///
/// Parts are sent in the same order as a voice transmission: achtung, a
/// random 5-digit id, trennung, the 2-digit group count, trennung, the
/// groups, ende. Parts are a word gap apart, except after a group, which is
/// followed by a group gap.
pub fn build_cw_sequence<R: Rng>(
    message: &EncodedMessage,
    settings: &TransmissionSettings,
    rng: &mut R,
) -> Result<TransmissionSequence, StationError> {
    let timing = check_cw_settings(settings)?;
    for group in &message.groups {
        if let Some((position, ch)) = group.chars().enumerate().find(|(_, c)| !c.is_ascii_digit()) {
            return Err(FormatError::NonDigit { position, ch }.into());
        }
    }

    let message_id: String = (0..MESSAGE_ID_LEN).map(|_| random_digit(rng)).collect();
    let word = |key: SoundKey| (key.word().unwrap_or_default().to_string(), false);
    let mut parts = vec![
        word(SoundKey::Achtung),
        (message_id, false),
        word(SoundKey::Trennung),
        (format!("{:02}", message.count), false),
        word(SoundKey::Trennung),
    ];
    parts.extend(message.groups.iter().map(|g| (g.clone(), true)));
    parts.push(word(SoundKey::Ende));

    let mut builder = SequenceBuilder::new();
    let last = parts.len() - 1;
    for (i, (text, is_group)) in parts.iter().enumerate() {
        push_elements(&mut builder, &text_to_elements(text), &timing, settings.frequency);
        if i < last {
            let gap = if *is_group { MorseElement::GroupGap } else { MorseElement::WordGap };
            builder.gap(timing.element_duration(gap));
        }
    }

    let sequence = builder.finish();
    tracing::debug!(
        wpm = timing.wpm(),
        tones = sequence.count(EventKind::Tone),
        total = sequence.total_duration(),
        "built CW sequence"
    );
    Ok(sequence)
}

/// CW sequence for text typed directly by the user.
pub fn build_cw_text_sequence(text: &str, settings: &TransmissionSettings) -> Result<TransmissionSequence, StationError> {
    let timing = check_cw_settings(settings)?;
    let elements = text_to_elements(text);
    if !elements.iter().any(|e| e.is_tone()) {
        return Err(ValidationError::Empty { field: "transmission" }.into());
    }
    let mut builder = SequenceBuilder::new();
    push_elements(&mut builder, &elements, &timing, settings.frequency);
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{EncodingMethod, encode_message_with};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn unit_time_from_wpm() {
        let timing = MorseTiming::new(20.0).unwrap();
        assert!(approx(timing.unit_ms(), 60.0));
        assert!(approx(timing.element_duration(MorseElement::Dah), 0.18));
        assert!(approx(timing.element_duration(MorseElement::WordGap), 0.42));
        assert!(approx(timing.element_duration(MorseElement::GroupGap), 0.6));
    }

    #[test]
    fn settings_outside_range_are_rejected() {
        assert!(MorseTiming::new(4.0).is_err());
        assert!(MorseTiming::new(60.0).is_ok());
        assert!(validate_frequency(299.0).is_err());
        assert!(validate_frequency(3000.0).is_ok());
        assert!(validate_wpm(f64::NAN).is_err());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(code_for('a'), Some(".-"));
        assert_eq!(code_for('0'), Some("-----"));
        assert_eq!(code_for('+'), Some(".-.-."));
        assert_eq!(code_for('?'), None);
    }

    #[test]
    fn control_words_are_spelled_out() {
        assert_eq!(
            control_word_code(SoundKey::Achtung).as_deref(),
            Some(".-/-.-./..../-/..-/-./--.")
        );
        assert_eq!(control_word_code(SoundKey::Ende).as_deref(), Some("./-./-../."));
        assert_eq!(control_word_code(SoundKey::Digit(3)), None);
    }

    #[test]
    fn symbol_pairs_skip_unknown_characters() {
        assert_eq!(symbol_pairs("s?o"), vec![('S', "..."), ('O', "---")]);
    }

    #[test]
    fn element_layout_of_text() {
        use MorseElement::*;
        assert_eq!(text_to_elements("A"), vec![Dit, ElementGap, Dah]);
        assert_eq!(text_to_elements("EE"), vec![Dit, LetterGap, Dit]);
        assert_eq!(text_to_elements(" E  ? T "), vec![Dit, WordGap, Dah]);
        assert!(text_to_elements("?!").is_empty());
    }

    #[test]
    fn text_sequence_durations() {
        let settings = TransmissionSettings::default();
        // E, word gap, E: 1 + 7 + 1 units of 60 ms.
        let seq = build_cw_text_sequence("E E", &settings).unwrap();
        assert_eq!(seq.count(EventKind::Tone), 2);
        assert_eq!(seq.count(EventKind::Pause), 1);
        assert!(approx(seq.total_duration(), 0.54));

        // Zero: five dahs and four element gaps.
        let seq = build_cw_text_sequence("0", &settings).unwrap();
        assert!(approx(seq.total_duration(), 19.0 * 0.06));
        assert!(seq.is_monotonic());
        assert!(seq.sounding().all(|e| e.payload == EventPayload::Frequency(800.0)));
    }

    #[test]
    fn text_without_codes_is_rejected() {
        let settings = TransmissionSettings::default();
        assert!(matches!(
            build_cw_text_sequence("??", &settings),
            Err(StationError::Validation(ValidationError::Empty { .. }))
        ));
        let fast = TransmissionSettings { wpm: 100.0, ..Default::default() };
        assert!(build_cw_text_sequence("E", &fast).is_err());
    }

    #[test]
    fn full_transmission_layout() {
        let mut rng = StdRng::seed_from_u64(3);
        let message = encode_message_with("HI", EncodingMethod::A1z26, &mut rng).unwrap();
        assert_eq!(message.count, 1);
        let settings = TransmissionSettings::default();
        let seq = build_cw_sequence(&message, &settings, &mut rng).unwrap();

        // Every digit has five symbols. achtung 19, trennung 17, ende 7.
        assert_eq!(seq.count(EventKind::Tone), 19 + 25 + 17 + 10 + 17 + 25 + 7);

        let pauses_of = |units: f64| {
            seq.events()
                .iter()
                .filter(|e| e.kind == EventKind::Pause && approx(e.duration, units * 0.06))
                .count()
        };
        assert_eq!(pauses_of(10.0), 1, "one group gap before ende");
        assert_eq!(pauses_of(7.0), 5, "word gaps between the preamble parts");
        assert!(seq.is_monotonic());
    }

    #[test]
    fn each_group_is_followed_by_a_group_gap() {
        let message = EncodedMessage {
            groups: vec!["12345".into(), "67890".into()],
            count: 2,
            encoded: "1234567890".into(),
            original: String::new(),
            method: EncodingMethod::A1z26,
            unpadded_len: 10,
        };
        let seq = build_cw_sequence(&message, &TransmissionSettings::default(), &mut StdRng::seed_from_u64(0)).unwrap();
        let group_gaps = seq
            .events()
            .iter()
            .filter(|e| e.kind == EventKind::Pause && approx(e.duration, 0.6))
            .count();
        assert_eq!(group_gaps, 2);
    }

    #[test]
    fn groups_must_be_digits() {
        let message = EncodedMessage {
            groups: vec!["12a45".into()],
            count: 1,
            encoded: "12a45".into(),
            original: String::new(),
            method: EncodingMethod::A1z26,
            unpadded_len: 5,
        };
        assert_eq!(
            build_cw_sequence(&message, &TransmissionSettings::default(), &mut StdRng::seed_from_u64(0)),
            Err(FormatError::NonDigit { position: 2, ch: 'a' }.into())
        );
    }
}
