//! Sums node outputs for one block and applies the master gain.
//!
//! There is no limiter here: overs pass through to the WAV serializer,
//! which clamps.

#[derive(Debug, Clone)]
pub struct Mixer {
    pub master_gain: f64,
    buffer: Vec<f64>,
}

impl Mixer {
    pub fn new(master_gain: f64) -> Self {
        Mixer {
            master_gain,
            buffer: Vec::new(),
        }
    }

    /// Prepare a buffer of `num_samples` filled with zeros.
    pub fn clear(&mut self, num_samples: usize) {
        self.buffer.clear();
        self.buffer.resize(num_samples, 0.0);
    }

    /// Add a sample at the given index.
    pub fn add(&mut self, index: usize, sample: f64) {
        if index < self.buffer.len() {
            self.buffer[index] += sample;
        }
    }

    /// Mixed block with master gain applied.
    pub fn output(&self) -> impl Iterator<Item = f64> + '_ {
        self.buffer.iter().map(|&s| s * self.master_gain)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer() {
        let mut m = Mixer::new(1.0);
        m.clear(128);
        assert_eq!(m.len(), 128);
        assert!(m.output().all(|s| s == 0.0));
    }

    #[test]
    fn accumulates_samples() {
        let mut m = Mixer::new(0.5);
        m.clear(4);
        m.add(0, 0.5);
        m.add(0, 0.3);
        m.add(1, 1.0);
        m.add(9, 1.0);
        let out: Vec<f64> = m.output().collect();
        assert!((out[0] - 0.4).abs() < 1e-12);
        assert!((out[1] - 0.5).abs() < 1e-12);
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn clear_resets_previous_block() {
        let mut m = Mixer::new(1.0);
        m.clear(2);
        m.add(0, 1.0);
        m.clear(2);
        assert!(m.output().all(|s| s == 0.0));
    }
}
