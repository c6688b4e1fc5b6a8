//! Error taxonomy shared by every engine in the crate.
//!
//! Four families: validation (bad input or out-of-range settings), format
//! (malformed cipher material), resource (voice packs, rendering) and state
//! (transmission lifecycle). All of them fold into [`StationError`].

use ariadne::{Config, Label, Report, ReportKind, Source};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StationError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("format error: {0}")]
    Format(#[from] FormatError),
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),
    #[error("state error: {0}")]
    State(#[from] StateError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("input text cannot be empty")]
    EmptyInput,
    #[error("input must contain at least one letter or digit")]
    NoEncodableCharacters,
    #[error("input text is too long (max {max} characters)")]
    InputTooLong { max: usize, truncated: String },
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },
    #[error("{field} is too long (max {max})")]
    TooLong { field: &'static str, max: usize },
    #[error("non-ASCII character found at position {position}: '{ch}'")]
    NonAscii { position: usize, ch: char },
    #[error("{setting} must be between {min} and {max}, got {value}")]
    OutOfRange {
        setting: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("unknown encoding method: {0}")]
    UnknownMethod(String),
    #[error("unknown XOR mode: {0} (use 'ascii' or 'hex')")]
    UnknownMode(String),
    #[error("no groups provided")]
    NoGroups,
    #[error("unknown sound key: {0}")]
    UnknownSound(String),
    #[error("unknown voice pack: {0}")]
    UnknownVoicePack(String),
    #[error("voice pack '{pack}' does not match the voicePack setting '{setting}'")]
    PackMismatch { setting: String, pack: String },
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error("non-digit character at position {position}: '{ch}'")]
    NonDigit { position: usize, ch: char },
    #[error("{field} must contain at least one digit")]
    NoDigits { field: &'static str },
    #[error("invalid HEX character at position {position}: '{ch}' (only 0-9 and A-F are allowed)")]
    InvalidHexCharacter { position: usize, ch: char },
    #[error("HEX string must have even length (pairs of digits), got {len}")]
    OddLengthHex { len: usize },
    #[error("A1Z26 input must be made of digit pairs, got {len} digits")]
    OddLengthPairs { len: usize },
    #[error("A1Z26 pair '{pair}' at position {position} is neither a letter (01-26) nor a digit (00)")]
    InvalidPair { position: usize, pair: String },
    #[error("unpadded length {len} exceeds the {available} digits received")]
    LengthMismatch { len: usize, available: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    #[error("no audio files could be loaded for voice pack '{0}'")]
    EmptyPack(String),
    #[error("failed to fetch '{location}': {reason}")]
    Fetch { location: String, reason: String },
    #[error("failed to decode '{location}': {reason}")]
    Decode { location: String, reason: String },
    #[error("checksum mismatch for '{location}'")]
    Checksum { location: String },
    #[error("voice pack '{pack}' has no clip for '{sound}'")]
    MissingSound { pack: String, sound: String },
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("render did not complete within {seconds:.1}s")]
    RenderTimedOut { seconds: f64 },
    #[error("failed to load voice pack '{pack}': {reason}")]
    PackUnavailable { pack: String, reason: String },
    #[error("audio runtime unavailable: transmissions need a running Tokio runtime")]
    NoRuntime,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("render was cancelled")]
    Cancelled,
    #[error("nothing to render")]
    Empty,
    #[error("node {node} produced a non-finite sample at frame {frame}")]
    NodeFailed { node: usize, frame: usize },
    #[error("node {node} has an unusable buffer: {reason}")]
    InvalidNode { node: usize, reason: String },
    #[error("channel {channel} has {len} frames, expected {expected}")]
    ChannelMismatch { channel: usize, len: usize, expected: usize },
    #[error("{frames} frames of {channels} channels at {sample_rate} Hz do not fit in a WAV file")]
    TooLarge { frames: usize, channels: usize, sample_rate: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("transmission already in progress")]
    Busy,
    #[error("transmission was stopped")]
    Stopped,
    #[error("transmission {0} is no longer current")]
    Stale(u64),
}

impl StationError {
    /// Character index of the offending input, when the error carries one.
    pub fn position(&self) -> Option<usize> {
        match self {
            StationError::Validation(ValidationError::NonAscii { position, .. })
            | StationError::Format(FormatError::NonDigit { position, .. })
            | StationError::Format(FormatError::InvalidHexCharacter { position, .. }) => {
                Some(*position)
            }
            _ => None,
        }
    }
}

/// Render an error against the input it came from.
///
/// Errors that point at a character get an annotated source excerpt; all
/// others fall back to their `Display` text.
pub fn render_diagnostic(source: &str, err: &StationError) -> String {
    let Some(position) = err.position() else {
        return err.to_string();
    };

    let span = position..position + 1;
    let mut out = Vec::new();
    let written = Report::build(ReportKind::Error, ("input", span.clone()))
        .with_config(Config::default().with_color(false))
        .with_message(err.to_string())
        .with_label(Label::new(("input", span)).with_message("here"))
        .finish()
        .write(("input", Source::from(source)), &mut out);

    match written {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => err.to_string(),
    }
}
