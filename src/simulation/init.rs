use std::f64::consts::{FRAC_PI_2, TAU};

use rand::Rng;

use crate::simulation::distribution::DistributionCode;
use crate::simulation::params::SimulationParameters;
use crate::simulation::sampling::Sampler;
use crate::simulation::types::{BodySnapshot, PositionRecord, SPHERE_RADIUS, VelocityRecord};

// Radial slope of the disc surface density
const DISC_SLOPE: f64 = -1.5;
// Empirical factor turning the Keplerian speed into simulation units
const KEPLER_CALIBRATION: f64 = 5625.0;
// Half-width of the region circular flow is normalised against
const CIRCULAR_NORM_RADIUS: f32 = 2.0;

/// Observed X/Y bounds of a generated population.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Extents {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl Extents {
    fn include(&mut self, x: f32, y: f32) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }
}

/// Per-body random draws shared by every axis rule.
struct BodyDraw {
    longitude: f64,
    latitude: f64,
    radius: f64,
    phase: f64,
}

/// Disc geometry derived from the box size.
#[derive(Debug, Copy, Clone)]
struct Disc {
    inner: f64,
    outer: f64,
    mass: f64,
}

impl Disc {
    fn new(params: &SimulationParameters) -> Self {
        Self {
            inner: params.box_size / 10.0,
            outer: params.box_size / 2.0 / 1.2,
            mass: params.disc_mass,
        }
    }

    /// Mass enclosed within `radius`, interpolated between the power-law bounds.
    fn enclosed_mass(&self, radius: f64) -> f64 {
        let k = DISC_SLOPE;
        let ratio = (radius.powf(k) - self.inner.powf(k)) / (self.outer.powf(k) - self.inner.powf(k));
        (self.mass * ratio).max(0.0)
    }

    /// Circular-orbit speed at `radius`.
    fn kepler_speed(&self, radius: f64) -> f64 {
        (self.enclosed_mass(radius) / radius).sqrt()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Axis {
    X,
    Y,
    Z,
}

/// Seeds body positions and velocities from a [`SimulationParameters`].
pub struct InitialConditions<R> {
    sampler: Sampler<R>,
}

impl<R: Rng> InitialConditions<R> {
    pub fn new(rng: R) -> Self {
        Self {
            sampler: Sampler::new(rng),
        }
    }

    /// Generates a fresh population of `params.body_count` bodies.
    pub fn generate(&mut self, params: &SimulationParameters) -> (BodySnapshot, Extents) {
        let count = params.body_count as usize;
        let mut snapshot = BodySnapshot {
            positions: vec![PositionRecord::new(0.0, 0.0, 0.0); count],
            velocities: vec![VelocityRecord::new(0.0, 0.0, 0.0, 0.0); count],
        };
        let extents = self.populate(params, &mut snapshot.positions, &mut snapshot.velocities);
        (snapshot, extents)
    }

    /// Fills every record in `positions` and `velocities`.
    pub fn populate(
        &mut self,
        params: &SimulationParameters,
        positions: &mut [PositionRecord],
        velocities: &mut [VelocityRecord],
    ) -> Extents {
        let disc = Disc::new(params);
        let mass = params.body_mass() as f32;
        let mut extents = Extents::default();

        for (i, (position, velocity)) in positions.iter_mut().zip(velocities.iter_mut()).enumerate() {
            let draw = BodyDraw {
                longitude: TAU * self.sampler.uniform(0.0, 1.0),
                latitude: (2.0 * self.sampler.uniform(0.0, 1.0) - 1.0).acos(),
                radius: self.sampler.power_law(disc.inner, disc.outer, DISC_SLOPE),
                phase: self.sampler.uniform(0.0, TAU),
            };

            let codes = params.position_distribution;
            let x = self.position_axis(Axis::X, codes.x, i, &draw, params);
            let y = self.position_axis(Axis::Y, codes.y, i, &draw, params);
            let z = self.position_axis(Axis::Z, codes.z, i, &draw, params);
            *position = PositionRecord::new(x, y, z);

            // a collapsed disc has no orbital speed
            let v_kep = finite_or_zero(disc.kepler_speed(draw.radius));
            let codes = params.velocity_distribution;
            let vx = self.velocity_axis(Axis::X, codes.x, &draw, [x, y], v_kep, params);
            let vy = self.velocity_axis(Axis::Y, codes.y, &draw, [x, y], v_kep, params);
            let vz = self.velocity_axis(Axis::Z, codes.z, &draw, [x, y], v_kep, params);
            *velocity = VelocityRecord::new(vx, vy, vz, mass);

            extents.include(x, y);
        }

        log::debug!(
            "generated {} bodies, x in [{}, {}], y in [{}, {}]",
            positions.len(),
            extents.min_x,
            extents.max_x,
            extents.min_y,
            extents.max_y
        );
        extents
    }

    fn position_axis(
        &mut self,
        axis: Axis,
        code: DistributionCode,
        index: usize,
        draw: &BodyDraw,
        params: &SimulationParameters,
    ) -> f32 {
        let code = code.for_position();
        let (lat, lon) = (draw.latitude as f32, draw.longitude as f32);
        let value = match code {
            DistributionCode::SphereCos => SPHERE_RADIUS * lat.sin() * lon.cos(),
            DistributionCode::SphereSin => SPHERE_RADIUS * lat.sin() * lon.sin(),
            DistributionCode::SphereCosLat => SPHERE_RADIUS * lat.cos(),
            DistributionCode::RandomSigned => self.sampler.ensure_nonzero(index),
            DistributionCode::Zero => 0.0,
            _ => match axis {
                Axis::X => (draw.radius * draw.phase.cos()) as f32,
                Axis::Y => (draw.radius * draw.phase.sin()) as f32,
                Axis::Z if params.disc_scale_height > 0.0 => {
                    (draw.radius * self.sampler.normal(params.disc_scale_height)) as f32
                }
                Axis::Z => 0.0,
            },
        };

        // degenerate samples get nudged off the origin
        if value.is_nan() || (code != DistributionCode::Zero && value == 0.0) {
            self.sampler.ensure_nonzero(index)
        } else {
            value
        }
    }

    fn velocity_axis(
        &mut self,
        axis: Axis,
        code: DistributionCode,
        draw: &BodyDraw,
        [x, y]: [f32; 2],
        v_kep: f64,
        params: &SimulationParameters,
    ) -> f32 {
        let sin_lat = finite_or_zero(draw.latitude.sin());
        let cos_lat = finite_or_zero(draw.latitude.cos());
        let cos_lon = finite_or_zero(draw.longitude.cos());
        let strength = params.velocity_strength;

        let value = match (code.for_velocity(), axis) {
            (DistributionCode::Zero, _) => 0.0,
            (DistributionCode::SphereCos, _) => {
                let (u1, u2) = (self.sampler.uniform(0.0, 1.0), self.sampler.uniform(0.0, 1.0));
                -100.0 * sin_lat * u1 + 100.0 * cos_lon * u2
            }
            (DistributionCode::SphereSin, Axis::X) => {
                self.sampler.signed_offset(-25.0, -sin_lat) + sin_lat * 100.0
            }
            (DistributionCode::SphereSin, Axis::Y) => {
                self.sampler.signed_offset(-55.0, sin_lat) + sin_lat * 100.0
            }
            (DistributionCode::SphereSin, Axis::Z) => {
                self.sampler.signed_offset(-20.0, sin_lat) + cos_lat * 100.0
            }
            (DistributionCode::RandomSigned, axis) => {
                let base = if axis == Axis::Y { 60.0 } else { 1.0 };
                let scale = self.sampler.signed_offset(base, 100.0);
                scale * self.sampler.uniform(0.0, 1.0)
            }
            // tangential flow: the other in-plane axis picks the direction
            (DistributionCode::Circular, Axis::X) => {
                let n = (x / CIRCULAR_NORM_RADIUS) as f64;
                let v = if y >= 0.0 {
                    (FRAC_PI_2 + n).sin()
                } else {
                    -(FRAC_PI_2 - n).sin()
                };
                v * strength as f64
            }
            (DistributionCode::Circular, Axis::Y) => {
                let n = (y / CIRCULAR_NORM_RADIUS) as f64;
                let v = if x >= 0.0 {
                    -(FRAC_PI_2 - n).cos()
                } else {
                    (FRAC_PI_2 + n).cos()
                };
                v * strength as f64
            }
            (_, Axis::X) => v_kep * draw.phase.sin() * KEPLER_CALIBRATION * strength as f64,
            (_, Axis::Y) => -v_kep * draw.phase.cos() * KEPLER_CALIBRATION * strength as f64,
            // no out-of-plane component for circular or keplerian flow
            (_, Axis::Z) => 0.0,
        };
        value as f32
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
