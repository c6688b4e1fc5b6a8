//! Output of a render pass.

use crate::error::RenderError;

/// Planar float buffer at a fixed sample rate. Every channel holds the same
/// number of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl RenderedBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        RenderedBuffer {
            channels: vec![samples],
            sample_rate,
        }
    }

    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, RenderError> {
        let Some(expected) = channels.first().map(Vec::len) else {
            return Err(RenderError::Empty);
        };
        if let Some((channel, len)) = channels
            .iter()
            .map(Vec::len)
            .enumerate()
            .find(|&(_, len)| len != expected)
        {
            return Err(RenderError::ChannelMismatch {
                channel,
                len,
                expected,
            });
        }
        Ok(RenderedBuffer {
            channels,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Samples frame by frame, channels interleaved within each frame.
    pub fn interleaved(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.frames()).flat_map(move |frame| self.channels.iter().map(move |ch| ch[frame]))
    }

    /// Peak absolute sample value over all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flatten()
            .fold(0.0_f32, |peak, &s| peak.max(s.abs()))
    }
}
