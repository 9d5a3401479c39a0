//! The per-body update applied once per tick.
//!
//! Each work-item reads the whole `positions_in` snapshot and the mass slots,
//! writes its own velocity slot and its own record in `positions_out`. The
//! WGSL kernel in `backend/shader.wgsl` implements the same rule.

use glam::Vec3;

use crate::simulation::types::{ComputeParams, PositionRecord, VelocityRecord};

/// Softened gravitational acceleration on body `index`.
pub fn acceleration(
    index: usize,
    positions_in: &[PositionRecord],
    masses: &[f32],
    params: &ComputeParams,
) -> Vec3 {
    let pos = Vec3::from_slice(&positions_in[index].position[..3]);
    let softening_sq = params.softening * params.softening;

    let mut acc = Vec3::ZERO;
    for (j, (other, &mass)) in positions_in.iter().zip(masses).enumerate() {
        if j == index {
            continue;
        }
        let d = Vec3::from_slice(&other.position[..3]) - pos;
        let dist_sq = d.length_squared() + softening_sq;
        if dist_sq <= 0.0 {
            continue;
        }
        let inv_dist = dist_sq.sqrt().recip();
        acc += d * (params.gravitational_constant * mass * inv_dist * inv_dist * inv_dist);
    }
    acc
}

/// Advances body `index` by one semi-implicit Euler step.
///
/// The velocity is updated in place; the new position record is returned so
/// the caller can store it in the "next" buffer.
pub fn integrate_body(
    index: usize,
    positions_in: &[PositionRecord],
    masses: &[f32],
    velocity: &mut VelocityRecord,
    params: &ComputeParams,
) -> PositionRecord {
    let acc = acceleration(index, positions_in, masses, params);
    let dt = params.delta_time;

    let v = Vec3::from_slice(&velocity.velocity[..3]) + acc * dt;
    velocity.velocity[..3].copy_from_slice(&v.to_array());

    let current = positions_in[index];
    let p = Vec3::from_slice(&current.position[..3]) + v * dt;
    PositionRecord {
        position: [p.x, p.y, p.z, current.position[3]],
        color: current.color,
    }
}

/// Snapshot of the mass slots taken before a dispatch.
pub fn masses(velocities: &[VelocityRecord]) -> Vec<f32> {
    velocities.iter().map(VelocityRecord::mass).collect()
}

/// Runs one whole tick on the calling thread.
pub fn step_sequential(
    positions_in: &[PositionRecord],
    positions_out: &mut [PositionRecord],
    velocities: &mut [VelocityRecord],
    params: &ComputeParams,
) {
    let masses = masses(velocities);
    for (i, (out, velocity)) in positions_out.iter_mut().zip(velocities.iter_mut()).enumerate() {
        *out = integrate_body(i, positions_in, &masses, velocity, params);
    }
}
