//! Sine oscillator for CW tones.

use std::f64::consts::PI;

#[derive(Debug, Clone)]
pub struct Oscillator {
    pub frequency: f64,
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(frequency: f64, sample_rate: f64) -> Self {
        Oscillator {
            frequency,
            phase: 0.0,
            sample_rate,
        }
    }

    /// Phase increment per sample.
    fn phase_inc(&self) -> f64 {
        self.frequency / self.sample_rate
    }

    pub fn next_sample(&mut self) -> f64 {
        let sample = (2.0 * PI * self.phase).sin();
        self.phase += self.phase_inc();
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_bounded() {
        let mut osc = Oscillator::new(800.0, 44100.0);
        for _ in 0..44100 {
            let s = osc.next_sample();
            assert!((-1.0..=1.0).contains(&s), "sine out of range: {s}");
        }
    }

    #[test]
    fn starts_at_zero_phase() {
        let mut osc = Oscillator::new(1000.0, 8000.0);
        assert!(osc.next_sample().abs() < 1e-12);
        // quarter period at 1 kHz / 8 kHz is two samples
        osc.next_sample();
        assert!((osc.next_sample() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_crossings_match_frequency() {
        let sr = 44100.0;
        let mut osc = Oscillator::new(441.0, sr);
        let samples: Vec<f64> = (0..sr as usize).map(|_| osc.next_sample()).collect();
        let rising = samples.windows(2).filter(|w| w[0] < 0.0 && w[1] >= 0.0).count();
        assert!((440..=442).contains(&rising), "expected ~441 cycles, got {rising}");
    }
}
