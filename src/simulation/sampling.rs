use rand::Rng;

use crate::simulation::types::MAX_BODIES;

/// Random variates used to seed initial conditions.
pub struct Sampler<R> {
    rng: R,
}

impl<R: Rng> Sampler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Uniform variate in `[min, max)`.
    pub fn uniform(&mut self, min: f64, max: f64) -> f64 {
        self.rng.gen_range(0.0..1.0) * (max - min) + min
    }

    /// Inverse-CDF sample of `p(r) ∝ r^slope` over `[min, max]`.
    pub fn power_law(&mut self, min: f64, max: f64, slope: f64) -> f64 {
        let y = self.uniform(0.0, 1.0);
        if slope == -1.0 {
            (y * (max / min).ln() + min.ln()).exp()
        } else {
            let k = slope + 1.0;
            ((max.powf(k) - min.powf(k)) * y + min.powf(k)).powf(1.0 / k)
        }
    }

    /// Gaussian variate with the given variance (polar Box-Muller).
    pub fn normal(&mut self, variance: f64) -> f64 {
        loop {
            let v1 = 2.0 * self.uniform(0.0, 1.0) - 1.0;
            let v2 = 2.0 * self.uniform(0.0, 1.0) - 1.0;
            let rsq = v1 * v1 + v2 * v2;
            if rsq < 1.0 && rsq >= 1.0e-12 {
                // the second variate is dropped
                return v1 * (-2.0 * rsq.ln() / rsq * variance).sqrt();
            }
        }
    }

    /// `lhs + rhs` or `lhs - rhs`, the sign picked by a fair coin.
    pub fn signed_offset(&mut self, lhs: f64, rhs: f64) -> f64 {
        if self.rng.gen_bool(0.5) {
            lhs + rhs
        } else {
            lhs - rhs
        }
    }

    /// `value ± r` with `r` uniform in `[0, 1)`.
    pub fn signed_jitter(&mut self, value: f64) -> f64 {
        let r = self.uniform(0.0, 1.0);
        self.signed_offset(value, r)
    }

    /// A coordinate that is never exactly zero.
    ///
    /// Centred on 0 for index 1 and on 1 for every other index.
    pub fn ensure_nonzero(&mut self, seed: usize) -> f32 {
        let effective = if seed > 0 { seed } else { MAX_BODIES as usize };
        // integer division: 0 at index 1, 1 from index 2 on
        let base = (1 - 1 / effective) as f64;
        let r = self.uniform(0.0, 1.0);
        let value = self.signed_offset(base, r) as f32;
        if value != 0.0 { value } else { 1.0 }
    }
}
