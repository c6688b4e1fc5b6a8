//! Repeating-key XOR over ASCII text or hex-encoded bytes.
//!
//! XOR is its own inverse: applying the same key twice gives back the input.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{FormatError, StationError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XorMode {
    Ascii,
    Hex,
}

impl FromStr for XorMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ascii" => Ok(XorMode::Ascii),
            "hex" => Ok(XorMode::Hex),
            _ => Err(ValidationError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for XorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XorMode::Ascii => write!(f, "ascii"),
            XorMode::Hex => write!(f, "hex"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XorResult {
    /// ASCII text in ASCII mode, uppercase hex in hex mode.
    pub result: String,
    /// Uppercase hex of the result bytes.
    pub result_hex: String,
    /// Result bytes as printable ASCII, `.` for anything outside 32..=126.
    pub result_ascii: String,
    /// Validated input (hex is normalised to uppercase without spaces).
    pub original: String,
    pub key_used: String,
    pub mode: XorMode,
}

/// Check that every character is 7-bit ASCII.
pub fn validate_ascii_input(text: &str) -> Result<(), ValidationError> {
    match text.chars().enumerate().find(|(_, c)| !c.is_ascii()) {
        Some((position, ch)) => Err(ValidationError::NonAscii { position, ch }),
        None => Ok(()),
    }
}

/// Strip whitespace, uppercase, and require an even number of hex digits.
pub fn validate_hex_input(hex: &str) -> Result<String, StationError> {
    let cleaned: String = hex
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if cleaned.is_empty() {
        return Err(ValidationError::Empty { field: "hex input" }.into());
    }
    if let Some((position, ch)) = cleaned.chars().enumerate().find(|(_, c)| !c.is_ascii_hexdigit()) {
        return Err(FormatError::InvalidHexCharacter { position, ch }.into());
    }
    if cleaned.len() % 2 != 0 {
        return Err(FormatError::OddLengthHex { len: cleaned.len() }.into());
    }
    Ok(cleaned)
}

pub fn ascii_to_hex(ascii: &str) -> String {
    bytes_to_hex(ascii.as_bytes())
}

/// Decode a validated hex string into text. Bytes outside ASCII are
/// replaced, so only feed this the output of [`validate_hex_input`] for
/// ASCII payloads.
pub fn hex_to_ascii(hex: &str) -> Result<String, StationError> {
    let bytes = hex_to_bytes(&validate_hex_input(hex)?);
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

// Input is already validated, so every pair parses.
fn hex_to_bytes(hex: &str) -> Vec<u8> {
    hex.as_bytes()
        .chunks(2)
        .filter_map(|pair| std::str::from_utf8(pair).ok())
        .filter_map(|pair| u8::from_str_radix(pair, 16).ok())
        .collect()
}

fn printable(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if (32..=126).contains(&b) { b as char } else { '.' })
        .collect()
}

fn xor_bytes(data: &[u8], key: &[u8]) -> Vec<u8> {
    data.iter()
        .zip(key.iter().cycle())
        .map(|(d, k)| d ^ k)
        .collect()
}

/// XOR ASCII text with an ASCII key.
pub fn xor_ascii(text: &str, key: &str) -> Result<XorResult, StationError> {
    validate_ascii_input(text)?;
    validate_ascii_input(key)?;
    if key.is_empty() {
        return Err(ValidationError::Empty { field: "key" }.into());
    }

    let bytes = xor_bytes(text.as_bytes(), key.as_bytes());
    // ASCII ^ ASCII stays below 0x80.
    let result: String = bytes.iter().map(|&b| b as char).collect();

    Ok(XorResult {
        result,
        result_hex: bytes_to_hex(&bytes),
        result_ascii: printable(&bytes),
        original: text.to_string(),
        key_used: key.to_string(),
        mode: XorMode::Ascii,
    })
}

/// XOR hex data with a hex key.
pub fn xor_hex(data: &str, key: &str) -> Result<XorResult, StationError> {
    let data = validate_hex_input(data)?;
    let key = validate_hex_input(key)?;

    let bytes = xor_bytes(&hex_to_bytes(&data), &hex_to_bytes(&key));
    let result_hex = bytes_to_hex(&bytes);

    Ok(XorResult {
        result: result_hex.clone(),
        result_hex,
        result_ascii: printable(&bytes),
        original: data,
        key_used: key,
        mode: XorMode::Hex,
    })
}

pub fn perform_xor(input: &str, key: &str, mode: XorMode) -> Result<XorResult, StationError> {
    if input.is_empty() {
        return Err(ValidationError::Empty { field: "input" }.into());
    }
    match mode {
        XorMode::Ascii => xor_ascii(input, key),
        XorMode::Hex => xor_hex(input, key),
    }
}

/// Random key. ASCII keys use printable characters 33..=126; hex keys are
/// rounded down to an even length of at least two digits.
pub fn generate_xor_key(length: usize, mode: XorMode) -> String {
    generate_xor_key_with(length, mode, &mut rand::thread_rng())
}

pub fn generate_xor_key_with<R: Rng>(length: usize, mode: XorMode, rng: &mut R) -> String {
    if length == 0 {
        return String::new();
    }
    match mode {
        XorMode::Hex => {
            let len = (length / 2 * 2).max(2);
            (0..len)
                .filter_map(|_| char::from_digit(rng.gen_range(0..16), 16))
                .map(|c| c.to_ascii_uppercase())
                .collect()
        }
        XorMode::Ascii => (0..length).map(|_| char::from(rng.gen_range(33..=126u8))).collect(),
    }
}

/// Hex data split into space-separated byte pairs; ASCII passes through.
pub fn format_for_display(data: &str, mode: XorMode) -> String {
    match mode {
        XorMode::Ascii => data.to_string(),
        XorMode::Hex => data
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect::<Vec<_>>()
            .join(" "),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XorAnalysis {
    pub original_len: usize,
    pub key_len: usize,
    pub result_len: usize,
    /// Times the key is laid over the input.
    pub key_repeats: usize,
    /// NUL bytes in an ASCII result, which usually means a plaintext
    /// character equalled the key character above it.
    pub null_bytes: Option<usize>,
    pub mode: XorMode,
}

impl XorAnalysis {
    pub fn has_null_bytes(&self) -> bool {
        self.null_bytes.is_some_and(|n| n > 0)
    }
}

pub fn analyze_xor_result(original: &str, key: &str, result: &str, mode: XorMode) -> XorAnalysis {
    let key_repeats = if key.is_empty() {
        0
    } else {
        original.len().div_ceil(key.len())
    };
    let null_bytes = match mode {
        XorMode::Ascii => Some(result.bytes().filter(|&b| b == 0).count()),
        XorMode::Hex => None,
    };

    XorAnalysis {
        original_len: original.len(),
        key_len: key.len(),
        result_len: result.len(),
        key_repeats,
        null_bytes,
        mode,
    }
}
