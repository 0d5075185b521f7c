//! Seeded standard-normal sampler.
//!
//! Xorshift64 feeding a Box-Muller transform. Reproducible for a given seed,
//! not suitable for anything security related.

use std::f64::consts::PI;

/// Deterministic source of N(0, 1) samples.
#[derive(Debug, Clone)]
pub struct NormalSampler {
    state: u64,
}

impl NormalSampler {
    /// Create a sampler. A zero seed would make xorshift emit zeros forever,
    /// so it is replaced by 1.
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    fn next_uniform(&mut self) -> f64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state as f64 / u64::MAX as f64
    }

    /// Draw one sample from the standard normal distribution.
    pub fn next_normal(&mut self) -> f32 {
        let u1 = self.next_uniform();
        let u2 = self.next_uniform();
        ((-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()) as f32
    }

    /// Fill a buffer with `len` samples scaled by `scale`.
    pub fn sample_vec(&mut self, len: usize, scale: f32) -> Vec<f32> {
        (0..len).map(|_| self.next_normal() * scale).collect()
    }
}
