use crate::simulation::distribution::{AxisDistributions, DistributionCode};
use crate::simulation::types::{
    COMPUTE_WORKGROUP_SIZE, ComputeParams, DEFAULT_BODIES, MAX_BODIES, MIN_BODIES,
};

const DEFAULT_BOX_SIZE: f64 = 2.4;

/// Everything the generator and the integration step need to know.
///
/// Owned by the controller and only mutated between ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParameters {
    pub body_count: u32,
    pub timestep: f32,
    pub softening: f32,
    pub gravitational_constant: f32,
    pub position_distribution: AxisDistributions,
    pub velocity_distribution: AxisDistributions,
    pub disc_mass: f64,
    pub box_size: f64,
    pub velocity_strength: f32,
    /// Fraction of the population the disc mass is spread over.
    /// 0.5 reproduces the historical `disc_mass / (N / 2)` per-body mass.
    pub massive_fraction: f64,
    /// Gaussian variance for disc Z offsets; 0 keeps the disc flat.
    pub disc_scale_height: f64,
    pub seed: Option<u64>,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            body_count: DEFAULT_BODIES,
            timestep: 0.00001,
            softening: 0.005,
            gravitational_constant: 1.0,
            position_distribution: AxisDistributions::uniform(DistributionCode::RandomSigned),
            velocity_distribution: AxisDistributions::uniform(DistributionCode::RandomSigned),
            disc_mass: 11e-8,
            box_size: DEFAULT_BOX_SIZE,
            velocity_strength: 64.0,
            massive_fraction: 0.5,
            disc_scale_height: 0.0,
            seed: None,
        }
    }
}

/// Rounds `count` down to a whole number of workgroups inside the allowed range.
pub fn clamp_body_count(count: u32) -> u32 {
    let clamped = count.clamp(MIN_BODIES, MAX_BODIES);
    clamped - clamped % COMPUTE_WORKGROUP_SIZE
}

impl SimulationParameters {
    /// Copy with out-of-range values clamped instead of rejected.
    pub fn sanitized(&self) -> Self {
        let mut params = self.clone();
        params.body_count = clamp_body_count(self.body_count);
        params.softening = sanitize_softening(self.softening);
        if !(params.box_size.is_finite() && params.box_size > 0.0) {
            params.box_size = DEFAULT_BOX_SIZE;
        }
        if !(params.massive_fraction.is_finite() && params.massive_fraction > 0.0) {
            params.massive_fraction = 0.5;
        }
        if !(params.disc_scale_height.is_finite() && params.disc_scale_height >= 0.0) {
            params.disc_scale_height = 0.0;
        }
        params
    }

    /// Mass carried by each body.
    pub fn body_mass(&self) -> f64 {
        self.disc_mass / (self.body_count as f64 * self.massive_fraction)
    }

    pub fn compute_params(&self) -> ComputeParams {
        ComputeParams {
            body_count: self.body_count,
            delta_time: self.timestep,
            softening: self.softening,
            gravitational_constant: self.gravitational_constant,
        }
    }
}

pub fn sanitize_softening(softening: f32) -> f32 {
    if softening.is_finite() && softening > 0.0 {
        softening
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mass_is_halved_normalisation() {
        let params = SimulationParameters::default();
        let expected = params.disc_mass / (params.body_count as f64 / 2.0);
        assert!((params.body_mass() - expected).abs() < 1e-24);
    }

    #[test]
    fn body_counts_clamp_to_workgroups() {
        assert_eq!(clamp_body_count(0), MIN_BODIES);
        assert_eq!(clamp_body_count(u32::MAX), MAX_BODIES);
        assert_eq!(clamp_body_count(100), 64);
        assert_eq!(clamp_body_count(4096), 4096);
        assert_eq!(clamp_body_count(9024 / 2), 4480);
        assert_eq!(clamp_body_count(288768 * 2), MAX_BODIES);
    }

    #[test]
    fn sanitize_repairs_softening() {
        let params = SimulationParameters {
            softening: f32::NAN,
            body_count: 1000,
            ..Default::default()
        };
        let clean = params.sanitized();
        assert_eq!(clean.softening, 0.0);
        assert_eq!(clean.body_count, 960);
    }

    #[test]
    fn sanitize_replaces_degenerate_box_size() {
        for box_size in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let params = SimulationParameters {
                box_size,
                ..Default::default()
            };
            assert_eq!(params.sanitized().box_size, 2.4, "{box_size}");
        }
        let params = SimulationParameters {
            box_size: 5.0,
            ..Default::default()
        };
        assert_eq!(params.sanitized().box_size, 5.0);
    }
}
