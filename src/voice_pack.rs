//! Voice packs: named sets of thirteen spoken clips.
//!
//! A pack descriptor ([`VoicePackConfig`]) says where the clips live; a
//! loaded [`VoicePack`] holds the decoded buffers. Descriptors map directly
//! to the JSON manifest format, so hosts can ship extra packs without
//! recompiling.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dsp::sampler::SampleBuffer;
use crate::error::{StationError, ValidationError};

/// Id of the built-in pack every other pack falls back to.
pub const DEFAULT_PACK: &str = "default";

/// Directory of the built-in pack, relative to the host's asset root.
pub const DEFAULT_PACK_PATH: &str = "assets/sounds";

// ── Sound keys ──────────────────────────────────────────────

/// One clip in a pack: a digit or one of the three control words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SoundKey {
    Digit(u8),
    /// Prelude ("attention").
    Achtung,
    /// Separator.
    Trennung,
    /// End of transmission.
    Ende,
}

impl SoundKey {
    /// All thirteen keys in file order.
    pub const ALL: [SoundKey; 13] = [
        SoundKey::Digit(0),
        SoundKey::Digit(1),
        SoundKey::Digit(2),
        SoundKey::Digit(3),
        SoundKey::Digit(4),
        SoundKey::Digit(5),
        SoundKey::Digit(6),
        SoundKey::Digit(7),
        SoundKey::Digit(8),
        SoundKey::Digit(9),
        SoundKey::Achtung,
        SoundKey::Trennung,
        SoundKey::Ende,
    ];

    pub fn from_digit(ch: char) -> Option<SoundKey> {
        ch.to_digit(10).map(|d| SoundKey::Digit(d as u8))
    }

    pub fn is_digit(self) -> bool {
        matches!(self, SoundKey::Digit(_))
    }

    /// Spelling of a control word; `None` for digits.
    pub fn word(self) -> Option<&'static str> {
        match self {
            SoundKey::Digit(_) => None,
            SoundKey::Achtung => Some("achtung"),
            SoundKey::Trennung => Some("trennung"),
            SoundKey::Ende => Some("ende"),
        }
    }
}

impl fmt::Display for SoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoundKey::Digit(d) => write!(f, "{d}"),
            other => f.write_str(other.word().unwrap_or_default()),
        }
    }
}

impl FromStr for SoundKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "achtung" => Ok(SoundKey::Achtung),
            "trennung" => Ok(SoundKey::Trennung),
            "ende" => Ok(SoundKey::Ende),
            _ => {
                let mut chars = lower.chars();
                match (chars.next().and_then(SoundKey::from_digit), chars.next()) {
                    (Some(key), None) => Ok(key),
                    _ => Err(ValidationError::UnknownSound(s.to_string())),
                }
            }
        }
    }
}

impl From<SoundKey> for String {
    fn from(key: SoundKey) -> String {
        key.to_string()
    }
}

impl TryFrom<String> for SoundKey {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ── Descriptors ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    #[default]
    Wav,
    Mp3,
}

impl AudioCodec {
    pub fn extension(self) -> &'static str {
        match self {
            AudioCodec::Wav => "wav",
            AudioCodec::Mp3 => "mp3",
        }
    }
}

/// An embedded clip, base64 encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineClip {
    pub data: String,
    #[serde(default)]
    pub codec: AudioCodec,
}

/// Where a pack's clips come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClipSource {
    /// Local directory holding `<key>.<ext>` files.
    Directory { path: PathBuf },
    /// Base URL; clips are fetched from `<base_url>/<key>.<ext>`.
    Http {
        #[serde(rename = "baseUrl")]
        base_url: String,
    },
    /// Clips embedded in the descriptor, keyed by sound.
    Inline { clips: BTreeMap<SoundKey, InlineClip> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoicePackConfig {
    /// Unique identifier (e.g., "default").
    pub id: String,
    /// Human-readable name.
    pub name: String,
    pub source: ClipSource,
    /// Codec of directory and HTTP clips.
    #[serde(default)]
    pub codec: AudioCodec,
    /// Expected SHA-256 (hex) per clip. Clips without an entry are not checked.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub checksums: BTreeMap<SoundKey, String>,
}

impl VoicePackConfig {
    pub fn directory(id: &str, name: &str, path: impl Into<PathBuf>) -> Self {
        VoicePackConfig {
            id: id.to_string(),
            name: name.to_string(),
            source: ClipSource::Directory { path: path.into() },
            codec: AudioCodec::Wav,
            checksums: BTreeMap::new(),
        }
    }

    pub fn http(id: &str, name: &str, base_url: &str) -> Self {
        VoicePackConfig {
            id: id.to_string(),
            name: name.to_string(),
            source: ClipSource::Http {
                base_url: base_url.trim_end_matches('/').to_string(),
            },
            codec: AudioCodec::Wav,
            checksums: BTreeMap::new(),
        }
    }

    /// File name of a clip, e.g. `achtung.wav`.
    pub fn file_name(&self, key: SoundKey) -> String {
        format!("{key}.{}", self.codec.extension())
    }

    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_PACK
    }
}

/// JSON manifest listing several packs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoicePackManifest {
    pub packs: Vec<VoicePackConfig>,
}

impl VoicePackManifest {
    pub fn from_json(json: &str) -> Result<Self, StationError> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::InvalidSettings(format!("voice pack manifest: {e}")).into())
    }
}

// ── Registry ────────────────────────────────────────────────

/// Summary for pack pickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackSummary {
    pub id: String,
    pub name: String,
}

/// Known pack descriptors by id. Always contains the default pack.
#[derive(Debug, Clone)]
pub struct VoicePackRegistry {
    packs: BTreeMap<String, VoicePackConfig>,
}

impl Default for VoicePackRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl VoicePackRegistry {
    /// Registry holding only the built-in default pack.
    pub fn builtin() -> Self {
        let default = VoicePackConfig::directory(DEFAULT_PACK, "Default Voice Pack", DEFAULT_PACK_PATH);
        let mut packs = BTreeMap::new();
        packs.insert(default.id.clone(), default);
        VoicePackRegistry { packs }
    }

    /// Add or replace a pack.
    pub fn register(&mut self, config: VoicePackConfig) {
        self.packs.insert(config.id.clone(), config);
    }

    /// Register every pack in a manifest.
    pub fn extend(&mut self, manifest: VoicePackManifest) {
        for pack in manifest.packs {
            self.register(pack);
        }
    }

    pub fn get(&self, id: &str) -> Result<&VoicePackConfig, ValidationError> {
        self.packs
            .get(id)
            .ok_or_else(|| ValidationError::UnknownVoicePack(id.to_string()))
    }

    pub fn default_pack(&self) -> Option<&VoicePackConfig> {
        self.packs.get(DEFAULT_PACK)
    }

    pub fn list(&self) -> Vec<PackSummary> {
        self.packs
            .values()
            .map(|p| PackSummary {
                id: p.id.clone(),
                name: p.name.clone(),
            })
            .collect()
    }
}

// ── Loaded pack ─────────────────────────────────────────────

/// Decoded clips of one pack. Immutable once built; shared behind `Arc`.
#[derive(Debug, Clone, Default)]
pub struct VoicePack {
    pub id: String,
    pub name: String,
    buffers: HashMap<SoundKey, Arc<SampleBuffer>>,
    /// Keys whose clip came from the default pack.
    fallbacks: Vec<SoundKey>,
}

impl VoicePack {
    pub fn new(id: &str, name: &str) -> Self {
        VoicePack {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn insert(&mut self, key: SoundKey, buffer: SampleBuffer) {
        self.buffers.insert(key, Arc::new(buffer));
    }

    /// Insert a clip borrowed from the fallback pack.
    pub fn insert_fallback(&mut self, key: SoundKey, buffer: Arc<SampleBuffer>) {
        self.buffers.insert(key, buffer);
        self.fallbacks.push(key);
    }

    pub fn get(&self, key: SoundKey) -> Option<&Arc<SampleBuffer>> {
        self.buffers.get(&key)
    }

    /// Length of a clip in seconds when played at `playback_rate`.
    pub fn clip_duration(&self, key: SoundKey, playback_rate: f64) -> Option<f64> {
        self.get(key).map(|b| b.duration_at(playback_rate))
    }

    /// Number of clips, fallbacks included.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Clips loaded from this pack's own source.
    pub fn loaded_count(&self) -> usize {
        self.buffers.len() - self.fallbacks.len()
    }

    pub fn fallbacks(&self) -> &[SoundKey] {
        &self.fallbacks
    }

    pub fn missing(&self) -> Vec<SoundKey> {
        SoundKey::ALL
            .into_iter()
            .filter(|k| !self.buffers.contains_key(k))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}
