//! Offline renderer: turns a [`TransmissionSequence`] into a render graph,
//! and rendered audio into 16-bit PCM WAV bytes.

use std::sync::Arc;

use super::buffer::RenderedBuffer;
use super::graph::RenderGraph;
use super::noise::noise_loop;
use super::sampler::SampleBuffer;
use crate::error::{RenderError, ResourceError, StationError, ValidationError};
use crate::morse::build_cw_text_sequence;
use crate::sequence::{EventPayload, TransmissionSequence};
use crate::settings::TransmissionSettings;
use crate::voice_pack::VoicePack;

/// Silence before the first event, in seconds.
pub const LEAD_IN: f64 = 0.1;

/// Float sample to signed 16-bit PCM. Input is clamped to [-1, 1]; negative
/// values scale by 32768 and positive ones by 32767, truncating toward zero.
pub fn float_to_pcm16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0) as f64;
    if s < 0.0 { (s * 32768.0) as i16 } else { (s * 32767.0) as i16 }
}

/// Encode a rendered buffer as a 44-byte-header PCM WAV file, channels
/// interleaved per frame. Fails when a header field would overflow.
pub fn encode_wav(buffer: &RenderedBuffer) -> Result<Vec<u8>, RenderError> {
    let sample_rate = buffer.sample_rate();
    let too_large = || RenderError::TooLarge {
        frames: buffer.frames(),
        channels: buffer.channel_count(),
        sample_rate,
    };
    let bits_per_sample: u16 = 16;
    let channels = u16::try_from(buffer.channel_count()).map_err(|_| too_large())?;
    let block_align = channels.checked_mul(bits_per_sample / 8).ok_or_else(too_large)?;
    let byte_rate = sample_rate.checked_mul(u32::from(block_align)).ok_or_else(too_large)?;
    let data_size = buffer
        .frames()
        .checked_mul(usize::from(block_align))
        .and_then(|n| u32::try_from(n).ok())
        .filter(|&n| n <= u32::MAX - 36)
        .ok_or_else(too_large)?;

    let mut wav = Vec::with_capacity(44 + data_size as usize);

    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_size).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());

    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_size.to_le_bytes());
    for sample in buffer.interleaved() {
        wav.extend_from_slice(&float_to_pcm16(sample).to_le_bytes());
    }

    Ok(wav)
}

/// Lays a sequence out on a [`RenderGraph`].
///
/// Tones play at the settings volume, clips at unity gain and the settings'
/// playback rate. With `add_noise` a noise loop runs under the whole
/// timeline at the noise volume.
pub struct GraphBuilder<'a> {
    settings: &'a TransmissionSettings,
    sample_rate: u32,
    pack: Option<&'a VoicePack>,
    noise: Option<Arc<SampleBuffer>>,
    master_gain: f64,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(settings: &'a TransmissionSettings, sample_rate: u32) -> Self {
        GraphBuilder {
            settings,
            sample_rate,
            pack: None,
            noise: None,
            master_gain: 1.0,
        }
    }

    pub fn pack(mut self, pack: &'a VoicePack) -> Self {
        self.pack = Some(pack);
        self
    }

    /// Noise loop to use when the settings ask for noise. Without one a
    /// fresh loop is generated.
    pub fn noise(mut self, noise: Arc<SampleBuffer>) -> Self {
        self.noise = Some(noise);
        self
    }

    pub fn master_gain(mut self, gain: f64) -> Self {
        self.master_gain = gain;
        self
    }

    pub fn build(&self, sequence: &TransmissionSequence) -> Result<RenderGraph, StationError> {
        if sequence.is_empty() {
            return Err(ResourceError::Render(RenderError::Empty).into());
        }
        let length = LEAD_IN + sequence.total_duration();
        let mut graph = RenderGraph::new(self.sample_rate, length);
        graph.set_master_gain(self.master_gain);

        let playback_rate = self.settings.playback_rate();
        for event in sequence.sounding() {
            let at = LEAD_IN + event.start_offset;
            match event.payload {
                EventPayload::Frequency(frequency) => {
                    graph.tone(frequency, at, event.duration, self.settings.volume);
                }
                EventPayload::Sound(key) => {
                    let pack = self.pack.ok_or(ValidationError::Empty { field: "voicePack" })?;
                    let buffer = pack.get(key).ok_or_else(|| ResourceError::MissingSound {
                        pack: pack.id.clone(),
                        sound: key.to_string(),
                    })?;
                    graph.clip(buffer.clone(), at, playback_rate, 1.0);
                }
                EventPayload::Silence => {}
            }
        }

        if self.settings.add_noise {
            let noise = match &self.noise {
                Some(noise) => noise.clone(),
                None => Arc::new(noise_loop(self.sample_rate)),
            };
            graph.looped(noise, 0.0, length, self.settings.noise_volume);
        }

        tracing::debug!(
            nodes = graph.len(),
            length,
            sample_rate = self.sample_rate,
            "built render graph"
        );
        Ok(graph)
    }
}

/// Render free Morse text straight to WAV bytes.
pub fn render_cw_wav(text: &str, settings: &TransmissionSettings, sample_rate: u32) -> Result<Vec<u8>, StationError> {
    settings.validate()?;
    let sequence = build_cw_text_sequence(text, settings)?;
    let graph = GraphBuilder::new(settings, sample_rate).build(&sequence)?;
    let buffer = graph.render().map_err(ResourceError::from)?;
    encode_wav(&buffer).map_err(|e| ResourceError::from(e).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::{EventKind, VoiceScript};
    use crate::voice_pack::SoundKey;

    fn u16_at(wav: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([wav[at], wav[at + 1]])
    }

    fn u32_at(wav: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([wav[at], wav[at + 1], wav[at + 2], wav[at + 3]])
    }

    #[test]
    fn one_second_of_mono_silence() {
        let wav = encode_wav(&RenderedBuffer::mono(vec![0.0; 44100], 44100)).unwrap();
        assert_eq!(wav.len(), 44 + 88200);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32_at(&wav, 4), 36 + 88200);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u32_at(&wav, 16), 16);
        assert_eq!(u16_at(&wav, 20), 1);
        assert_eq!(u16_at(&wav, 22), 1);
        assert_eq!(u32_at(&wav, 24), 44100);
        assert_eq!(u32_at(&wav, 28), 88200);
        assert_eq!(u16_at(&wav, 32), 2);
        assert_eq!(u16_at(&wav, 34), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32_at(&wav, 40), 88200);
        assert!(wav[44..].iter().all(|&b| b == 0));
    }

    #[test]
    fn stereo_header_and_interleaving() {
        let buffer = RenderedBuffer::from_channels(vec![vec![1.0, 0.0], vec![-1.0, 0.5]], 8000).unwrap();
        let wav = encode_wav(&buffer).unwrap();
        assert_eq!(u16_at(&wav, 22), 2);
        assert_eq!(u32_at(&wav, 28), 8000 * 4);
        assert_eq!(u16_at(&wav, 32), 4);
        let samples: Vec<i16> = wav[44..]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, vec![32767, -32768, 0, 16383]);
    }

    #[test]
    fn header_overflow_is_an_error() {
        let buffer = RenderedBuffer::mono(vec![0.0; 4], u32::MAX);
        assert_eq!(
            encode_wav(&buffer),
            Err(RenderError::TooLarge { frames: 4, channels: 1, sample_rate: u32::MAX })
        );
    }

    #[test]
    fn pcm_scaling_is_asymmetric_and_clamped() {
        assert_eq!(float_to_pcm16(1.0), 32767);
        assert_eq!(float_to_pcm16(-1.0), -32768);
        assert_eq!(float_to_pcm16(0.5), 16383);
        assert_eq!(float_to_pcm16(-0.5), -16384);
        assert_eq!(float_to_pcm16(2.0), 32767);
        assert_eq!(float_to_pcm16(-3.0), -32768);
        assert_eq!(float_to_pcm16(f32::NAN), 0);
    }

    fn clip_pack() -> VoicePack {
        let mut pack = VoicePack::new("test", "Test");
        for key in SoundKey::ALL {
            pack.insert(key, SampleBuffer::new(vec![0.5; 100], 1000));
        }
        pack
    }

    #[test]
    fn voice_graph_places_clips_after_lead_in() {
        let settings = TransmissionSettings { digit_gap: 100, ..Default::default() };
        let pack = clip_pack();
        let sequence = VoiceScript::from_text("12", &settings).schedule(&pack, 1.0).unwrap();
        assert!((sequence.total_duration() - 0.3).abs() < 1e-9);

        let graph = GraphBuilder::new(&settings, 1000).pack(&pack).build(&sequence).unwrap();
        assert_eq!(graph.len(), 2);
        assert!((graph.nodes()[1].start - 0.3).abs() < 1e-9);
        assert!((400..=401).contains(&graph.frames()));

        let out = graph.render().unwrap();
        let ch = out.channel(0).unwrap();
        assert_eq!(ch[99], 0.0);
        assert_eq!(ch[100], 0.5);
        assert_eq!(ch[250], 0.0);
        assert_eq!(ch[300], 0.5);
    }

    #[test]
    fn clip_events_need_a_pack() {
        let settings = TransmissionSettings::default();
        let sequence = VoiceScript::single(SoundKey::Ende).schedule(&clip_pack(), 1.0).unwrap();
        assert!(matches!(
            GraphBuilder::new(&settings, 1000).build(&sequence),
            Err(StationError::Validation(ValidationError::Empty { .. }))
        ));
    }

    #[test]
    fn noise_runs_under_the_whole_timeline() {
        let settings = TransmissionSettings { add_noise: true, ..Default::default() };
        let sequence = build_cw_text_sequence("E", &settings).unwrap();
        let noise = Arc::new(SampleBuffer::new(vec![1.0; 50], 1000));
        let graph = GraphBuilder::new(&settings, 1000).noise(noise).build(&sequence).unwrap();
        assert_eq!(graph.len(), 2);
        let looped = &graph.nodes()[1];
        assert_eq!(looped.start, 0.0);
        assert_eq!(looped.stop, Some(graph.length()));
        assert_eq!(looped.gain, settings.noise_volume);
    }

    #[test]
    fn empty_sequence_is_a_render_error() {
        let settings = TransmissionSettings::default();
        assert_eq!(
            GraphBuilder::new(&settings, 8000).build(&TransmissionSequence::default()).err(),
            Some(ResourceError::Render(RenderError::Empty).into())
        );
    }

    #[test]
    fn cw_text_renders_to_audible_wav() {
        let settings = TransmissionSettings::default();
        let wav = render_cw_wav("SOS", &settings, 8000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");

        let sequence = build_cw_text_sequence("SOS", &settings).unwrap();
        let frames = ((LEAD_IN + sequence.total_duration()) * 8000.0).ceil() as usize;
        assert_eq!(wav.len(), 44 + frames * 2);
        assert_eq!(sequence.count(EventKind::Tone), 9);

        let peak = wav[44..]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]).unsigned_abs())
            .max()
            .unwrap_or(0);
        assert!(peak > 10_000, "tones at volume 0.7 should be loud, got {peak}");
        // Lead-in stays silent.
        assert!(wav[44..44 + 2 * 700].iter().all(|&b| b == 0));
    }

    #[test]
    fn invalid_settings_fail_before_rendering() {
        let settings = TransmissionSettings { frequency: 50.0, ..Default::default() };
        assert!(matches!(
            render_cw_wav("E", &settings, 8000),
            Err(StationError::Validation(ValidationError::OutOfRange { setting: "frequency", .. }))
        ));
    }
}
