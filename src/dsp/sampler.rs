//! Clip playback.
//!
//! Plays decoded voice clips with linear-interpolation resampling. The
//! playback rate changes speed and pitch together, the way a tape or a
//! buffer source does; there is no pitch-preserving time stretch.

use std::sync::Arc;

/// A decoded mono clip.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    /// Mono f64 samples.
    pub data: Vec<f64>,
    /// Native sample rate of the audio.
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(data: Vec<f64>, sample_rate: u32) -> Self {
        SampleBuffer { data, sample_rate }
    }

    /// Create from 16-bit signed PCM data.
    pub fn from_i16(pcm: &[i16], sample_rate: u32) -> Self {
        let data = pcm.iter().map(|&s| s as f64 / 32768.0).collect();
        SampleBuffer { data, sample_rate }
    }

    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        let data = samples.iter().map(|&s| s as f64).collect();
        SampleBuffer { data, sample_rate }
    }

    /// Average interleaved frames down to one channel.
    pub fn downmix(interleaved: &[f64], channels: usize, sample_rate: u32) -> Self {
        if channels <= 1 {
            return SampleBuffer::new(interleaved.to_vec(), sample_rate);
        }
        let data = interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f64>() / channels as f64)
            .collect();
        SampleBuffer { data, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Length in seconds at the native rate.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.data.len() as f64 / self.sample_rate as f64
    }

    /// Length in seconds when played at `playback_rate`.
    pub fn duration_at(&self, playback_rate: f64) -> f64 {
        self.duration() / playback_rate
    }

    /// Read a sample with linear interpolation at a fractional position.
    pub fn read_interpolated(&self, position: f64) -> f64 {
        if self.data.is_empty() || position < 0.0 {
            return 0.0;
        }

        let idx = position as usize;
        if idx >= self.data.len() - 1 {
            return if idx < self.data.len() {
                self.data[idx]
            } else {
                0.0
            };
        }

        let frac = position - idx as f64;
        self.data[idx] * (1.0 - frac) + self.data[idx + 1] * frac
    }
}

/// A playing clip: reads its buffer at a fixed step per output sample.
#[derive(Debug, Clone)]
pub struct SamplePlayer {
    buffer: Arc<SampleBuffer>,
    /// Fractional read position in the buffer.
    position: f64,
    /// Buffer samples consumed per output sample.
    step: f64,
    gain: f64,
    looping: bool,
    finished: bool,
}

impl SamplePlayer {
    /// # Arguments
    /// * `buffer` - clip to play
    /// * `playback_rate` - 1.0 plays at the recorded speed and pitch
    /// * `gain` - linear output gain
    /// * `output_sample_rate` - rate of the graph the player feeds
    pub fn new(
        buffer: Arc<SampleBuffer>,
        playback_rate: f64,
        gain: f64,
        output_sample_rate: f64,
    ) -> Self {
        let sr_ratio = buffer.sample_rate as f64 / output_sample_rate;
        SamplePlayer {
            finished: buffer.is_empty(),
            buffer,
            position: 0.0,
            step: playback_rate * sr_ratio,
            gain,
            looping: false,
        }
    }

    /// Wrap around at the end of the buffer instead of finishing.
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    pub fn next_sample(&mut self) -> f64 {
        if self.finished {
            return 0.0;
        }

        let sample = self.buffer.read_interpolated(self.position);
        self.position += self.step;

        let len = self.buffer.len() as f64;
        if self.position >= len {
            if self.looping {
                self.position %= len;
            } else {
                self.finished = true;
            }
        }

        sample * self.gain
    }

    /// Stop immediately.
    pub fn stop(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
