//! Keying envelope for CW tones.
//!
//! A tone ramps linearly from silence to full level, holds, and ramps back
//! to silence at its end. Each ramp lasts `min(5 ms, 10% of the tone)`, which
//! keeps short dits from clicking without eating into them.

/// Upper bound on the attack and release ramps, in seconds.
pub const MAX_RAMP: f64 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Attack,
    Hold,
    Release,
    Done,
}

#[derive(Debug, Clone)]
pub struct KeyingEnvelope {
    level: f64,
    ramp_samples: usize,
    total_samples: usize,
    counter: usize,
    stage: Stage,
}

/// Ramp length for a tone of `duration` seconds.
pub fn ramp_time(duration: f64) -> f64 {
    MAX_RAMP.min(duration * 0.1)
}

impl KeyingEnvelope {
    /// Envelope for a tone of `duration` seconds peaking at `level`.
    pub fn new(duration: f64, level: f64, sample_rate: f64) -> Self {
        let total_samples = (duration * sample_rate).round() as usize;
        let ramp_samples = (ramp_time(duration) * sample_rate).round() as usize;
        KeyingEnvelope {
            level,
            ramp_samples: ramp_samples.min(total_samples / 2),
            total_samples,
            counter: 0,
            stage: if total_samples == 0 { Stage::Done } else { Stage::Attack },
        }
    }

    pub fn next_sample(&mut self) -> f64 {
        let n = self.counter;
        let value = match self.stage {
            Stage::Attack => {
                if self.ramp_samples == 0 || n >= self.ramp_samples {
                    self.stage = Stage::Hold;
                    self.level
                } else {
                    self.level * n as f64 / self.ramp_samples as f64
                }
            }
            Stage::Hold => self.level,
            Stage::Release => {
                let remaining = self.total_samples - n;
                self.level * remaining as f64 / self.ramp_samples.max(1) as f64
            }
            Stage::Done => return 0.0,
        };

        self.counter += 1;
        if self.counter >= self.total_samples {
            self.stage = Stage::Done;
        } else if self.counter >= self.total_samples - self.ramp_samples
            && self.stage != Stage::Release
        {
            self.stage = Stage::Release;
        }
        value
    }

    /// Silence the envelope immediately.
    pub fn stop(&mut self) {
        self.stage = Stage::Done;
    }

    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Done
    }
}
