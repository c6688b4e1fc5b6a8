//! Voice pack loading: fetch, verify, decode and cache.
//!
//! Each pack is loaded at most once per loader. Concurrent requests for the
//! same pack wait on the same in-flight load, and a failed load leaves the
//! slot empty so the next request retries.
//!
//! Clips that a pack cannot provide are borrowed from the default pack, one
//! warning per clip. A pack that yields no clips of its own fails with
//! [`ResourceError::EmptyPack`].

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::dsp::sampler::SampleBuffer;
use crate::error::{ResourceError, StationError};
use crate::voice_pack::{
    AudioCodec, ClipSource, DEFAULT_PACK, SoundKey, VoicePack, VoicePackConfig, VoicePackRegistry,
};

type PackSlot = Arc<OnceCell<Arc<VoicePack>>>;

pub struct VoicePackLoader {
    registry: VoicePackRegistry,
    client: reqwest::Client,
    cache_dir: Option<PathBuf>,
    slots: Mutex<HashMap<String, PackSlot>>,
}

impl VoicePackLoader {
    /// Loader over `registry`, caching HTTP clips in the platform cache
    /// directory when one exists.
    pub fn new(registry: VoicePackRegistry) -> Self {
        VoicePackLoader {
            registry,
            client: reqwest::Client::new(),
            cache_dir: default_cache_dir(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache_dir = None;
        self
    }

    pub fn registry(&self) -> &VoicePackRegistry {
        &self.registry
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .is_some_and(|slot| slot.initialized())
    }

    fn slot(&self, id: &str) -> PackSlot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(id.to_string()).or_default().clone()
    }

    /// Load a pack by id, filling gaps from the default pack.
    pub async fn load(&self, id: &str) -> Result<Arc<VoicePack>, StationError> {
        if id == DEFAULT_PACK {
            return self.load_default().await;
        }
        let config = self.registry.get(id)?;
        let slot = self.slot(id);
        let pack = slot
            .get_or_try_init(|| async {
                let mut pack = self.fetch_pack(config).await?;
                let missing = pack.missing();
                if !missing.is_empty() {
                    self.fill_from_default(&mut pack, &missing).await;
                }
                Ok::<_, StationError>(Arc::new(pack))
            })
            .await?;
        Ok(pack.clone())
    }

    async fn load_default(&self) -> Result<Arc<VoicePack>, StationError> {
        let config = self.registry.get(DEFAULT_PACK)?;
        let slot = self.slot(DEFAULT_PACK);
        let pack = slot
            .get_or_try_init(|| async { Ok::<_, StationError>(Arc::new(self.fetch_pack(config).await?)) })
            .await?;
        Ok(pack.clone())
    }

    async fn fill_from_default(&self, pack: &mut VoicePack, missing: &[SoundKey]) {
        let fallback = match self.load_default().await {
            Ok(fallback) => fallback,
            Err(err) => {
                warn!(pack = %pack.id, error = %err, "default pack unavailable, clips stay missing");
                return;
            }
        };
        for &key in missing {
            if let Some(buffer) = fallback.get(key) {
                warn!(pack = %pack.id, sound = %key, "clip missing, using default pack");
                pack.insert_fallback(key, buffer.clone());
            }
        }
    }

    /// Fetch and decode every clip the pack itself provides.
    async fn fetch_pack(&self, config: &VoicePackConfig) -> Result<VoicePack, ResourceError> {
        let mut pack = VoicePack::new(&config.id, &config.name);
        for key in SoundKey::ALL {
            match self.fetch_clip(config, key).await {
                Ok(buffer) => pack.insert(key, buffer),
                Err(err) => warn!(pack = %config.id, sound = %key, error = %err, "failed to load clip"),
            }
        }
        if pack.loaded_count() == 0 {
            return Err(ResourceError::EmptyPack(config.id.clone()));
        }
        info!(pack = %config.id, loaded = pack.loaded_count(), "voice pack loaded");
        Ok(pack)
    }

    async fn fetch_clip(&self, config: &VoicePackConfig, key: SoundKey) -> Result<SampleBuffer, ResourceError> {
        let (bytes, codec, location) = match &config.source {
            ClipSource::Directory { path } => {
                let file = path.join(config.file_name(key));
                let location = file.display().to_string();
                let bytes = tokio::fs::read(&file).await.map_err(|e| ResourceError::Fetch {
                    location: location.clone(),
                    reason: e.to_string(),
                })?;
                (bytes, config.codec, location)
            }
            ClipSource::Http { base_url } => {
                let url = format!("{}/{}", base_url.trim_end_matches('/'), config.file_name(key));
                let bytes = self.fetch_http(&url, config.checksums.get(&key).map(String::as_str)).await?;
                (bytes, config.codec, url)
            }
            ClipSource::Inline { clips } => {
                let location = format!("{}#{key}", config.id);
                let clip = clips.get(&key).ok_or_else(|| ResourceError::MissingSound {
                    pack: config.id.clone(),
                    sound: key.to_string(),
                })?;
                let bytes = STANDARD.decode(clip.data.trim()).map_err(|e| ResourceError::Decode {
                    location: location.clone(),
                    reason: e.to_string(),
                })?;
                (bytes, clip.codec, location)
            }
        };

        if let Some(expected) = config.checksums.get(&key) {
            verify_checksum(&bytes, expected, &location)?;
        }
        decode_clip(&bytes, codec, &location)
    }

    /// Download a clip, going through the on-disk cache. Only bytes that
    /// match `checksum` are served from or written to the cache.
    async fn fetch_http(&self, url: &str, checksum: Option<&str>) -> Result<Vec<u8>, ResourceError> {
        let cached = self.cache_dir.as_ref().map(|dir| dir.join(sha256_hex(url.as_bytes())));
        if let Some(path) = &cached {
            if let Ok(bytes) = tokio::fs::read(path).await {
                if checksum.is_none_or(|expected| verify_checksum(&bytes, expected, url).is_ok()) {
                    debug!(url, path = %path.display(), "clip cache hit");
                    return Ok(bytes);
                }
                warn!(url, path = %path.display(), "cached clip failed checksum, fetching again");
            }
        }

        let fetch_err = |reason: String| ResourceError::Fetch {
            location: url.to_string(),
            reason,
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| fetch_err(e.to_string()))?;
        let bytes = response.bytes().await.map_err(|e| fetch_err(e.to_string()))?.to_vec();
        if let Some(expected) = checksum {
            verify_checksum(&bytes, expected, url)?;
        }

        if let Some(path) = &cached {
            if let Err(err) = write_cache(path, &bytes).await {
                warn!(url, error = %err, "could not cache clip");
            }
        }
        Ok(bytes)
    }
}

async fn write_cache(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}

fn default_cache_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "numbers-station").map(|dirs| dirs.cache_dir().join("voice-packs"))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn verify_checksum(bytes: &[u8], expected: &str, location: &str) -> Result<(), ResourceError> {
    if sha256_hex(bytes).eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(ResourceError::Checksum {
            location: location.to_string(),
        })
    }
}

pub fn decode_clip(bytes: &[u8], codec: AudioCodec, location: &str) -> Result<SampleBuffer, ResourceError> {
    match codec {
        AudioCodec::Wav => decode_wav(bytes, location),
        AudioCodec::Mp3 => decode_mp3(bytes, location),
    }
}

/// Decode a WAV file to a mono buffer at its own sample rate.
pub fn decode_wav(bytes: &[u8], location: &str) -> Result<SampleBuffer, ResourceError> {
    let decode_err = |reason: String| ResourceError::Decode {
        location: location.to_string(),
        reason,
    };
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).map_err(|e| decode_err(e.to_string()))?;
    let spec = reader.spec();

    let samples: Vec<f64> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<Result<_, _>>()
            .map_err(|e| decode_err(e.to_string()))?,
        hound::SampleFormat::Int => {
            let max_value = 1i64
                .checked_shl(u32::from(spec.bits_per_sample.saturating_sub(1)))
                .filter(|_| spec.bits_per_sample > 0 && spec.bits_per_sample <= 32)
                .ok_or_else(|| decode_err(format!("unsupported bits per sample: {}", spec.bits_per_sample)))?
                as f64;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f64 / max_value))
                .collect::<Result<_, _>>()
                .map_err(|e| decode_err(e.to_string()))?
        }
    };

    if samples.is_empty() {
        return Err(decode_err("no samples".to_string()));
    }
    Ok(SampleBuffer::downmix(&samples, spec.channels as usize, spec.sample_rate))
}

/// Decode an MP3 file to a mono buffer.
pub fn decode_mp3(bytes: &[u8], location: &str) -> Result<SampleBuffer, ResourceError> {
    let decode_err = |reason: String| ResourceError::Decode {
        location: location.to_string(),
        reason,
    };
    let mut decoder = minimp3::Decoder::new(Cursor::new(bytes));
    let mut samples = Vec::new();
    let mut format: Option<(usize, u32)> = None;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                format.get_or_insert((frame.channels, frame.sample_rate as u32));
                samples.extend(frame.data.iter().map(|&s| s as f64 / 32768.0));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(decode_err(format!("{e:?}"))),
        }
    }

    match format {
        Some((channels, sample_rate)) if !samples.is_empty() => {
            Ok(SampleBuffer::downmix(&samples, channels, sample_rate))
        }
        _ => Err(decode_err("no audio frames".to_string())),
    }
}
