//! Background static.

use rand::Rng;

use super::sampler::SampleBuffer;

/// Length of the generated noise loop, in seconds.
pub const NOISE_SECONDS: f64 = 2.0;

/// Uniform white noise in [-1, 1).
pub fn white_noise<R: Rng>(sample_rate: u32, seconds: f64, rng: &mut R) -> SampleBuffer {
    let len = (sample_rate as f64 * seconds) as usize;
    let data = (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect();
    SampleBuffer::new(data, sample_rate)
}

/// The loop buffer used under transmissions.
pub fn noise_loop(sample_rate: u32) -> SampleBuffer {
    white_noise(sample_rate, NOISE_SECONDS, &mut rand::thread_rng())
}
