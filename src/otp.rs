//! Mod-10 one-time-pad arithmetic over digit strings.
//!
//! `C[i] = (P[i] + K[i]) mod 10` and `P[i] = (C[i] - K[i] + 10) mod 10`.
//!
//! A key shorter than the message is doubled until it covers the message and
//! then truncated. That repeats key material, which breaks the one-time-pad
//! guarantee: the output is only as strong as a repeating-key cipher. The
//! behaviour is kept for compatibility with existing message books and is
//! logged every time it happens.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::encoder::{GROUP_WIDTH, digits_only, random_digit};
use crate::error::{StationError, ValidationError};

/// Longest accepted key, in digits.
pub const MAX_KEY_LEN: usize = 10_000;

/// Result of an OTP operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherResult {
    /// Ciphertext after encryption, plaintext after decryption.
    pub output: String,
    /// Key expanded or truncated to the input length.
    pub key_used: String,
}

/// Result of [`apply_otp_to_groups`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpGroups {
    pub groups: Vec<String>,
    pub key_used: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// Clean a key: whitespace is ignored, anything else must be a digit.
pub fn validate_otp_key(key: &str) -> Result<String, StationError> {
    if key.trim().is_empty() {
        return Err(ValidationError::Empty { field: "key" }.into());
    }
    let cleaned = digits_only(key, "key")?;
    if cleaned.len() > MAX_KEY_LEN {
        return Err(ValidationError::TooLong {
            field: "key",
            max: MAX_KEY_LEN,
        }
        .into());
    }
    Ok(cleaned)
}

fn validate_digits(text: &str, field: &'static str) -> Result<String, StationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::Empty { field }.into());
    }
    Ok(digits_only(text, field)?)
}

/// Double `key` until it is at least `len` digits long, then cut it to `len`.
pub fn expand_key(key: &str, len: usize) -> String {
    let mut expanded = key.to_string();
    if expanded.len() < len {
        tracing::warn!(
            key_len = key.len(),
            message_len = len,
            "OTP key shorter than message; repeating key material"
        );
        while expanded.len() < len {
            expanded.push_str(&expanded.clone());
        }
    }
    expanded.truncate(len);
    expanded
}

fn combine(text: &str, key: &str, direction: Direction) -> String {
    text.bytes()
        .zip(key.bytes())
        .map(|(t, k)| {
            let (t, k) = (t - b'0', k - b'0');
            let digit = match direction {
                Direction::Encrypt => (t + k) % 10,
                Direction::Decrypt => (t + 10 - k) % 10,
            };
            char::from(b'0' + digit)
        })
        .collect()
}

fn apply(text: &str, key: &str, direction: Direction) -> Result<CipherResult, StationError> {
    let field = match direction {
        Direction::Encrypt => "plaintext",
        Direction::Decrypt => "ciphertext",
    };
    let text = validate_digits(text, field)?;
    let key = validate_otp_key(key)?;
    if key.is_empty() {
        return Err(ValidationError::Empty { field: "key" }.into());
    }
    let key_used = expand_key(&key, text.len());

    Ok(CipherResult {
        output: combine(&text, &key_used, direction),
        key_used,
    })
}

/// Encrypt a digit string.
pub fn encrypt_otp(plaintext: &str, key: &str) -> Result<CipherResult, StationError> {
    apply(plaintext, key, Direction::Encrypt)
}

/// Decrypt a digit string.
pub fn decrypt_otp(ciphertext: &str, key: &str) -> Result<CipherResult, StationError> {
    apply(ciphertext, key, Direction::Decrypt)
}

/// Run the pad over a whole message and re-split the result into groups.
pub fn apply_otp_to_groups(
    groups: &[String],
    key: &str,
    direction: Direction,
) -> Result<OtpGroups, StationError> {
    if groups.is_empty() {
        return Err(ValidationError::NoGroups.into());
    }
    let result = apply(&groups.concat(), key, direction)?;
    let groups = result
        .output
        .as_bytes()
        .chunks(GROUP_WIDTH)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect();

    Ok(OtpGroups {
        groups,
        key_used: result.key_used,
    })
}

/// Random key of `length` digits.
pub fn generate_otp_key(length: usize) -> String {
    generate_otp_key_with(length, &mut rand::thread_rng())
}

pub fn generate_otp_key_with<R: Rng>(length: usize, rng: &mut R) -> String {
    (0..length).map(|_| random_digit(rng)).collect()
}

/// Key as long as the digits contained in `message`.
pub fn generate_key_for_message(message: &str) -> String {
    let len = message.chars().filter(|c| c.is_ascii_digit()).count();
    generate_otp_key(len)
}

/// Print a key as space-separated 5-digit groups.
pub fn format_otp_key(key: &str) -> String {
    let digits: Vec<u8> = key.bytes().filter(u8::is_ascii_digit).collect();
    digits
        .chunks(GROUP_WIDTH)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Comparison of message and key length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyLengthReport {
    pub message_len: usize,
    pub key_len: usize,
    pub equal: bool,
    pub difference: usize,
    pub recommendation: &'static str,
}

pub fn check_otp_lengths(message: &str, key: &str) -> KeyLengthReport {
    let message_len = message.chars().filter(|c| c.is_ascii_digit()).count();
    let key_len = key.chars().filter(|c| c.is_ascii_digit()).count();
    let recommendation = if message_len == key_len {
        "Lengths match - ready for OTP"
    } else if message_len < key_len {
        "Key is longer than message"
    } else {
        "Key is shorter than message (will be repeated)"
    };

    KeyLengthReport {
        message_len,
        key_len,
        equal: message_len == key_len,
        difference: message_len.abs_diff(key_len),
        recommendation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormatError;

    #[test]
    fn encrypt_adds_mod_ten() {
        let result = encrypt_otp("12345", "99999").unwrap();
        assert_eq!(result.output, "01234");
        assert_eq!(result.key_used, "99999");
    }

    #[test]
    fn decrypt_subtracts_mod_ten() {
        let result = decrypt_otp("01234", "99999").unwrap();
        assert_eq!(result.output, "12345");
    }

    #[test]
    fn round_trip() {
        let plain = "3141592653589793";
        let key = "2718281828459045";
        let cipher = encrypt_otp(plain, key).unwrap();
        assert_ne!(cipher.output, plain);
        assert_eq!(decrypt_otp(&cipher.output, key).unwrap().output, plain);
    }

    #[test]
    fn short_key_is_doubled_and_truncated() {
        let result = encrypt_otp("0000000", "123").unwrap();
        assert_eq!(result.key_used, "1231231");
        assert_eq!(result.output, "1231231");
    }

    #[test]
    fn long_key_is_truncated() {
        let result = encrypt_otp("000", "98765").unwrap();
        assert_eq!(result.key_used, "987");
    }

    #[test]
    fn whitespace_between_groups_is_ignored() {
        let result = encrypt_otp("12345 67890", "11111 11111").unwrap();
        assert_eq!(result.output, "2345678901");
    }

    #[test]
    fn non_digits_are_rejected_with_position() {
        assert_eq!(
            encrypt_otp("12a45", "11111"),
            Err(FormatError::NonDigit { position: 2, ch: 'a' }.into())
        );
        assert!(matches!(
            decrypt_otp("12345", "1-1"),
            Err(StationError::Format(FormatError::NonDigit { position: 1, .. }))
        ));
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert_eq!(
            encrypt_otp("", "123"),
            Err(ValidationError::Empty { field: "plaintext" }.into())
        );
        assert_eq!(
            encrypt_otp("123", "  "),
            Err(ValidationError::Empty { field: "key" }.into())
        );
    }

    #[test]
    fn oversized_key_is_rejected() {
        let key = "1".repeat(MAX_KEY_LEN + 1);
        assert!(matches!(
            validate_otp_key(&key),
            Err(StationError::Validation(ValidationError::TooLong { .. }))
        ));
    }

    #[test]
    fn groups_are_resplit() {
        let groups = vec!["12345".to_string(), "67890".to_string()];
        let encrypted = apply_otp_to_groups(&groups, "5", Direction::Encrypt).unwrap();
        assert_eq!(encrypted.groups, vec!["67890", "12345"]);
        let decrypted = apply_otp_to_groups(&encrypted.groups, "5", Direction::Decrypt).unwrap();
        assert_eq!(decrypted.groups, groups);
    }

    #[test]
    fn generated_keys_have_requested_length() {
        let key = generate_otp_key(25);
        assert_eq!(key.len(), 25);
        assert!(key.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(generate_key_for_message("12345 678").len(), 8);
        assert!(generate_otp_key(0).is_empty());
    }

    #[test]
    fn key_formatting() {
        assert_eq!(format_otp_key("123456789012"), "12345 67890 12");
        assert_eq!(format_otp_key(""), "");
    }

    #[test]
    fn length_report() {
        let report = check_otp_lengths("12345", "123");
        assert!(!report.equal);
        assert_eq!(report.difference, 2);
        assert_eq!(report.recommendation, "Key is shorter than message (will be repeated)");
        assert!(check_otp_lengths("123", "456").equal);
    }
}
