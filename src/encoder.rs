//! Text ⇄ digit encoders and 5-digit group formatting.
//!
//! Two encodings are supported: A1Z26 (every character becomes a two-digit
//! pair) and a fixed straddling checkerboard. Both produce a plain digit
//! string, which [`format_into_groups`] pads with random digits and cuts
//! into transmission groups.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{FormatError, StationError, ValidationError};

/// Width of one transmitted group.
pub const GROUP_WIDTH: usize = 5;

/// Longest accepted input after cleaning.
pub const MAX_INPUT_LEN: usize = 1000;

// ── Checkerboard ────────────────────────────────────────────

/// The fixed checkerboard table: ten one-digit codes for the most common
/// letters, two-digit codes led by 2 or 7, three-digit codes for digits and
/// `77` for a space.
///
/// The table is not prefix-free (`2` and `7` are both letter codes and lead
/// digits), so greedy decoding never reaches the two- and three-digit codes.
const CHECKERBOARD: [(char, &str); 37] = [
    ('E', "0"), ('T', "1"), ('A', "2"), ('O', "3"), ('I', "4"),
    ('N', "5"), ('R', "6"), ('S', "7"), ('H', "8"), ('D', "9"),
    ('L', "20"), ('U', "21"), ('C', "22"), ('M', "23"), ('F', "24"),
    ('W', "25"), ('Y', "26"), ('P', "27"), ('V', "28"), ('B', "29"),
    ('G', "70"), ('J', "71"), ('K', "72"), ('Q', "73"), ('X', "74"),
    ('Z', "75"),
    ('0', "760"), ('1', "761"), ('2', "762"), ('3', "763"), ('4', "764"),
    ('5', "765"), ('6', "766"), ('7', "767"), ('8', "768"), ('9', "769"),
    (' ', "77"),
];

fn checkerboard_code(ch: char) -> Option<&'static str> {
    CHECKERBOARD.iter().find(|(c, _)| *c == ch).map(|(_, code)| *code)
}

fn checkerboard_char(code: &str) -> Option<char> {
    CHECKERBOARD.iter().find(|(_, c)| *c == code).map(|(ch, _)| *ch)
}

// ── Encoding method ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMethod {
    A1z26,
    Checkerboard,
}

impl FromStr for EncodingMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a1z26" => Ok(EncodingMethod::A1z26),
            "checkerboard" => Ok(EncodingMethod::Checkerboard),
            _ => Err(ValidationError::UnknownMethod(s.to_string())),
        }
    }
}

impl fmt::Display for EncodingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingMethod::A1z26 => write!(f, "a1z26"),
            EncodingMethod::Checkerboard => write!(f, "checkerboard"),
        }
    }
}

/// Cipher selection as handed over by the application shell.
///
/// `checkerboard_key` is accepted for compatibility but the checkerboard
/// table is fixed; a supplied key is logged and ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherConfig {
    pub cipher: EncodingMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkerboard_key: Option<String>,
}

impl Default for CipherConfig {
    fn default() -> Self {
        CipherConfig {
            cipher: EncodingMethod::A1z26,
            checkerboard_key: None,
        }
    }
}

// ── Encoded message ─────────────────────────────────────────

/// Output of [`encode_message`]: the padded digit string and its groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedMessage {
    pub groups: Vec<String>,
    pub count: usize,
    /// Full padded digit string (`groups.concat()`).
    pub encoded: String,
    /// Cleaned source text.
    pub original: String,
    pub method: EncodingMethod,
    /// Digits before random padding was appended.
    pub unpadded_len: usize,
}

impl EncodedMessage {
    /// Build a message from already-formed groups (e.g. after encryption).
    pub fn with_groups(&self, groups: Vec<String>) -> EncodedMessage {
        EncodedMessage {
            count: groups.len(),
            encoded: groups.concat(),
            groups,
            original: self.original.clone(),
            method: self.method,
            unpadded_len: self.unpadded_len,
        }
    }
}

/// Groups produced by [`format_into_groups`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedDigits {
    pub groups: Vec<String>,
    pub count: usize,
    pub padded: String,
}

// ── A1Z26 ───────────────────────────────────────────────────

/// Encode text as A1Z26 pairs. Letters map to `01`–`26`, digits are
/// zero-padded to two characters, everything else is dropped.
pub fn encode_a1z26(text: &str) -> String {
    let mut out = String::new();
    for ch in text.chars().map(|c| c.to_ascii_uppercase()) {
        match ch {
            'A'..='Z' => out.push_str(&format!("{:02}", ch as u8 - b'A' + 1)),
            '0'..='9' => {
                out.push('0');
                out.push(ch);
            }
            _ => {}
        }
    }
    out
}

/// Decode fixed-width A1Z26 pairs.
///
/// `01`–`26` decode to letters and `00` to the digit `0`. Digits `1`–`9`
/// encode to `01`–`09` and therefore come back as `A`–`I`; the pair format
/// cannot tell them apart. Anything else is rejected instead of guessed.
pub fn decode_a1z26(encoded: &str) -> Result<String, StationError> {
    let digits = digits_only(encoded, "encoded text")?;
    if digits.len() % 2 != 0 {
        return Err(FormatError::OddLengthPairs { len: digits.len() }.into());
    }

    let mut out = String::with_capacity(digits.len() / 2);
    for (i, pair) in digits.as_bytes().chunks(2).enumerate() {
        let value = (pair[0] - b'0') * 10 + (pair[1] - b'0');
        match value {
            1..=26 => out.push((b'A' + value - 1) as char),
            0 => out.push('0'),
            _ => {
                return Err(FormatError::InvalidPair {
                    position: i * 2,
                    pair: String::from_utf8_lossy(pair).into_owned(),
                }
                .into());
            }
        }
    }
    Ok(out)
}

// ── Checkerboard ────────────────────────────────────────────

/// Encode text with the fixed checkerboard. Characters without an entry
/// fall back to their A1Z26 pair when they are letters and are dropped
/// otherwise.
pub fn encode_checkerboard(text: &str) -> String {
    let mut out = String::new();
    for ch in text.chars().map(|c| c.to_ascii_uppercase()) {
        if let Some(code) = checkerboard_code(ch) {
            out.push_str(code);
        } else if ch.is_ascii_uppercase() {
            out.push_str(&encode_a1z26(&ch.to_string()));
        }
    }
    out
}

/// Greedy checkerboard decoding: one digit, then two, then three. A digit
/// that starts no known code is skipped.
pub fn decode_checkerboard(encoded: &str) -> String {
    let digits: Vec<char> = encoded.chars().filter(|c| c.is_ascii_digit()).collect();
    let mut out = String::new();
    let mut i = 0;

    while i < digits.len() {
        let mut matched = false;
        for width in 1..=3 {
            if i + width > digits.len() {
                break;
            }
            let code: String = digits[i..i + width].iter().collect();
            if let Some(ch) = checkerboard_char(&code) {
                out.push(ch);
                i += width;
                matched = true;
                break;
            }
        }
        if !matched {
            i += 1;
        }
    }
    out
}

// ── Groups ──────────────────────────────────────────────────

/// Pad `digits` with random digits up to a multiple of [`GROUP_WIDTH`] and
/// split it into groups. Padding differs on every call.
pub fn format_into_groups(digits: &str) -> Result<GroupedDigits, StationError> {
    format_into_groups_with(digits, &mut rand::thread_rng())
}

/// [`format_into_groups`] with a caller-provided random source.
pub fn format_into_groups_with<R: Rng>(
    digits: &str,
    rng: &mut R,
) -> Result<GroupedDigits, StationError> {
    if let Some((position, ch)) = digits.chars().enumerate().find(|(_, c)| !c.is_ascii_digit()) {
        return Err(FormatError::NonDigit { position, ch }.into());
    }

    let mut padded = digits.to_string();
    let remainder = padded.len() % GROUP_WIDTH;
    if remainder != 0 {
        for _ in 0..GROUP_WIDTH - remainder {
            padded.push(random_digit(rng));
        }
    }

    let groups: Vec<String> = padded
        .as_bytes()
        .chunks(GROUP_WIDTH)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect();

    Ok(GroupedDigits {
        count: groups.len(),
        groups,
        padded,
    })
}

/// Random digit string of the given length.
pub fn generate_random_digits(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length).map(|_| random_digit(&mut rng)).collect()
}

pub(crate) fn random_digit<R: Rng>(rng: &mut R) -> char {
    char::from(b'0' + rng.gen_range(0..10u8))
}

// ── Validation & top-level API ──────────────────────────────

/// Normalise input text: uppercase, keep `[A-Z0-9 ]`.
///
/// Input over [`MAX_INPUT_LEN`] characters is rejected; the error carries the
/// truncated text so the caller can offer it back to the user.
pub fn validate_input(text: &str) -> Result<String, ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyInput);
    }

    let cleaned: String = text
        .chars()
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == ' ')
        .collect();

    if cleaned.trim().is_empty() {
        return Err(ValidationError::NoEncodableCharacters);
    }
    if cleaned.len() > MAX_INPUT_LEN {
        return Err(ValidationError::InputTooLong {
            max: MAX_INPUT_LEN,
            truncated: cleaned[..MAX_INPUT_LEN].to_string(),
        });
    }
    Ok(cleaned)
}

/// Validate, encode and group a message.
pub fn encode_message(text: &str, method: EncodingMethod) -> Result<EncodedMessage, StationError> {
    encode_message_with(text, method, &mut rand::thread_rng())
}

/// [`encode_message`] with a caller-provided random source for padding.
pub fn encode_message_with<R: Rng>(
    text: &str,
    method: EncodingMethod,
    rng: &mut R,
) -> Result<EncodedMessage, StationError> {
    let cleaned = validate_input(text)?;
    let digits = match method {
        EncodingMethod::A1z26 => encode_a1z26(&cleaned),
        EncodingMethod::Checkerboard => encode_checkerboard(&cleaned),
    };
    let grouped = format_into_groups_with(&digits, rng)?;

    Ok(EncodedMessage {
        groups: grouped.groups,
        count: grouped.count,
        encoded: grouped.padded,
        original: cleaned,
        method,
        unpadded_len: digits.len(),
    })
}

/// Encode with a [`CipherConfig`]. A checkerboard key is not supported and
/// only produces a warning.
pub fn encode_with_config(text: &str, config: &CipherConfig) -> Result<EncodedMessage, StationError> {
    if config.checkerboard_key.as_deref().is_some_and(|k| !k.is_empty()) {
        tracing::warn!("checkerboard key supplied but the checkerboard table is fixed; ignoring key");
    }
    encode_message(text, config.cipher)
}

/// Join groups and decode them. When `unpadded_len` is known the random
/// padding is cut off first.
pub fn decode_message(
    groups: &[String],
    method: EncodingMethod,
    unpadded_len: Option<usize>,
) -> Result<String, StationError> {
    if groups.is_empty() {
        return Err(ValidationError::NoGroups.into());
    }

    let joined = digits_only(&groups.concat(), "groups")?;
    let encoded = match unpadded_len {
        Some(len) if len > joined.len() => {
            return Err(FormatError::LengthMismatch {
                len,
                available: joined.len(),
            }
            .into());
        }
        Some(len) => &joined[..len],
        None => joined.as_str(),
    };

    match method {
        EncodingMethod::A1z26 => decode_a1z26(encoded),
        EncodingMethod::Checkerboard => Ok(decode_checkerboard(encoded)),
    }
}

/// Strip whitespace and require the rest to be ASCII digits.
pub(crate) fn digits_only(input: &str, field: &'static str) -> Result<String, FormatError> {
    let mut out = String::with_capacity(input.len());
    for (position, ch) in input.chars().enumerate() {
        if ch.is_ascii_digit() {
            out.push(ch);
        } else if !ch.is_whitespace() {
            return Err(FormatError::NonDigit { position, ch });
        }
    }
    if out.is_empty() {
        return Err(FormatError::NoDigits { field });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn a1z26_encodes_letters_and_digits() {
        assert_eq!(encode_a1z26("ABZ"), "010226");
        assert_eq!(encode_a1z26("a1"), "0101");
        assert_eq!(encode_a1z26("HI THERE!"), "08092008051805");
    }

    #[test]
    fn a1z26_round_trip_letters() {
        assert_eq!(decode_a1z26(&encode_a1z26("HELLO")).unwrap(), "HELLO");
        assert_eq!(decode_a1z26(&encode_a1z26("zulu")).unwrap(), "ZULU");
    }

    #[test]
    fn a1z26_zero_survives_but_other_digits_read_as_letters() {
        assert_eq!(decode_a1z26(&encode_a1z26("A0")).unwrap(), "A0");
        // 1, 2, 3 → 01, 02, 03 → A, B, C
        assert_eq!(decode_a1z26(&encode_a1z26("ABC123")).unwrap(), "ABCABC");
    }

    #[test]
    fn a1z26_rejects_malformed_input() {
        assert_eq!(
            decode_a1z26("123"),
            Err(FormatError::OddLengthPairs { len: 3 }.into())
        );
        assert_eq!(
            decode_a1z26("0127"),
            Err(FormatError::InvalidPair { position: 2, pair: "27".to_string() }.into())
        );
        assert!(matches!(
            decode_a1z26("01a2"),
            Err(StationError::Format(FormatError::NonDigit { position: 2, ch: 'a' }))
        ));
    }

    #[test]
    fn checkerboard_encodes_with_table() {
        assert_eq!(encode_checkerboard("ET"), "01");
        assert_eq!(encode_checkerboard("LATE"), "20210");
        assert_eq!(encode_checkerboard("A 1"), "277761");
    }

    #[test]
    fn checkerboard_decodes_single_digit_codes() {
        assert_eq!(decode_checkerboard("01"), "ET");
        assert_eq!(decode_checkerboard(&encode_checkerboard("SEND")), "SEND");
        assert_eq!(decode_checkerboard(&encode_checkerboard("THE RAIN")), "THESSRAIN");
    }

    #[test]
    fn checkerboard_greedy_decode_shadows_long_codes() {
        // "20" (L) reads as "2" (A) then "0" (E)
        assert_eq!(decode_checkerboard("20210"), "AEATE");
    }

    #[test]
    fn groups_are_padded_to_width() {
        let mut rng = StdRng::seed_from_u64(7);
        let grouped = format_into_groups_with("1234567", &mut rng).unwrap();
        assert_eq!(grouped.count, 2);
        assert_eq!(grouped.groups.len(), 2);
        assert_eq!(grouped.padded.len(), 10);
        assert!(grouped.padded.starts_with("1234567"));
        assert_eq!(grouped.groups.concat(), grouped.padded);
        assert!(grouped.padded.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn groups_of_exact_width_are_not_padded() {
        let grouped = format_into_groups("1234567890").unwrap();
        assert_eq!(grouped.groups, vec!["12345", "67890"]);
    }

    #[test]
    fn empty_digits_give_no_groups() {
        let grouped = format_into_groups("").unwrap();
        assert_eq!(grouped.count, 0);
        assert!(grouped.padded.is_empty());
    }

    #[test]
    fn groups_reject_non_digits() {
        assert!(format_into_groups("12a").is_err());
    }

    #[test]
    fn validate_cleans_and_uppercases() {
        assert_eq!(validate_input("Hello, World 42!").unwrap(), "HELLO WORLD 42");
    }

    #[test]
    fn validate_rejects_empty_and_symbol_only() {
        assert_eq!(validate_input("   "), Err(ValidationError::EmptyInput));
        assert_eq!(validate_input("!!!"), Err(ValidationError::NoEncodableCharacters));
    }

    #[test]
    fn validate_reports_truncation() {
        let long = "A".repeat(1200);
        match validate_input(&long) {
            Err(ValidationError::InputTooLong { max, truncated }) => {
                assert_eq!(max, 1000);
                assert_eq!(truncated.len(), 1000);
            }
            other => panic!("expected InputTooLong, got {other:?}"),
        }
    }

    #[test]
    fn encode_message_invariants() {
        let msg = encode_message("Attack at dawn", EncodingMethod::A1z26).unwrap();
        assert_eq!(msg.original, "ATTACK AT DAWN");
        assert_eq!(msg.encoded.len() % GROUP_WIDTH, 0);
        assert_eq!(msg.groups.concat(), msg.encoded);
        assert_eq!(msg.count, msg.groups.len());
        assert_eq!(msg.unpadded_len, 24);
    }

    #[test]
    fn decode_message_strips_padding() {
        let msg = encode_message("HELLO", EncodingMethod::A1z26).unwrap();
        let decoded = decode_message(&msg.groups, msg.method, Some(msg.unpadded_len)).unwrap();
        assert_eq!(decoded, "HELLO");
    }

    #[test]
    fn decode_message_checkerboard() {
        let msg = encode_message("send", EncodingMethod::Checkerboard).unwrap();
        let decoded = decode_message(&msg.groups, msg.method, Some(msg.unpadded_len)).unwrap();
        assert_eq!(decoded, "SEND");
    }

    #[test]
    fn decode_message_requires_groups() {
        assert_eq!(
            decode_message(&[], EncodingMethod::A1z26, None),
            Err(ValidationError::NoGroups.into())
        );
        let groups = vec!["12345".to_string()];
        assert!(decode_message(&groups, EncodingMethod::A1z26, Some(6)).is_err());
    }

    #[test]
    fn decode_message_rejects_non_digit_groups() {
        let groups = vec!["é1234".to_string()];
        assert_eq!(
            decode_message(&groups, EncodingMethod::A1z26, Some(1)),
            Err(FormatError::NonDigit { position: 0, ch: 'é' }.into())
        );
        let groups = vec!["08051".to_string(), "2x".to_string()];
        assert_eq!(
            decode_message(&groups, EncodingMethod::Checkerboard, None),
            Err(FormatError::NonDigit { position: 6, ch: 'x' }.into())
        );
    }

    #[test]
    fn method_parsing() {
        assert_eq!("A1Z26".parse::<EncodingMethod>(), Ok(EncodingMethod::A1z26));
        assert_eq!("checkerboard".parse::<EncodingMethod>(), Ok(EncodingMethod::Checkerboard));
        assert!("vigenere".parse::<EncodingMethod>().is_err());
    }

    #[test]
    fn cipher_config_from_json() {
        let config: CipherConfig =
            serde_json::from_str(r#"{"cipher":"checkerboard","checkerboardKey":"SECRET"}"#).unwrap();
        assert_eq!(config.cipher, EncodingMethod::Checkerboard);
        let msg = encode_with_config("test", &config).unwrap();
        assert_eq!(&msg.encoded[..4], "1071");
    }
}
