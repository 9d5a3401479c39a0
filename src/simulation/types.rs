use bytemuck::{Pod, Zeroable};

// Constants for simulation
pub const COMPUTE_WORKGROUP_SIZE: u32 = 64;
pub const MIN_BODIES: u32 = 64; // one full workgroup
pub const MAX_BODIES: u32 = 320768;
pub const DEFAULT_BODIES: u32 = 72192;

// Radius of the sphere-surface distributions
pub const SPHERE_RADIUS: f32 = 0.5;

// Placeholder tint written into the colour slots, the presenter owns the real value
pub const DEFAULT_TINT: [f32; 4] = [0.18, 0.19, 0.75, 1.0];

/// One body's position as laid out in the ping-pong buffers.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct PositionRecord {
    pub position: [f32; 4], // xyz = position, w = 1.0
    pub color: [f32; 4],    // rgba, opaque to the simulation
}

impl PositionRecord {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: [x, y, z, 1.0],
            color: DEFAULT_TINT,
        }
    }

    pub fn xyz(&self) -> [f32; 3] {
        [self.position[0], self.position[1], self.position[2]]
    }
}

/// One body's velocity; the mass rides in the fourth slot.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct VelocityRecord {
    pub velocity: [f32; 4], // xyz = velocity, w = mass
}

impl VelocityRecord {
    pub fn new(vx: f32, vy: f32, vz: f32, mass: f32) -> Self {
        Self {
            velocity: [vx, vy, vz, mass],
        }
    }

    pub fn mass(&self) -> f32 {
        self.velocity[3]
    }

    pub fn xyz(&self) -> [f32; 3] {
        [self.velocity[0], self.velocity[1], self.velocity[2]]
    }
}

// Uniform block read by every work-item of a tick
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ComputeParams {
    pub body_count: u32,
    pub delta_time: f32,
    pub softening: f32,
    pub gravitational_constant: f32,
}

/// Host-side copy of a body store's current state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BodySnapshot {
    pub positions: Vec<PositionRecord>,
    pub velocities: Vec<VelocityRecord>,
}

impl BodySnapshot {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Sum of `mass * velocity` over all bodies, accumulated in f64.
    pub fn momentum(&self) -> [f64; 3] {
        self.velocities.iter().fold([0.0; 3], |mut acc, v| {
            let m = v.mass() as f64;
            for (axis, component) in acc.iter_mut().zip(v.xyz()) {
                *axis += m * component as f64;
            }
            acc
        })
    }

    /// True when no position or velocity component is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.positions
            .iter()
            .flat_map(|p| p.position)
            .chain(self.velocities.iter().flat_map(|v| v.velocity))
            .all(f32::is_finite)
    }
}

pub const POSITION_RECORD_SIZE: u64 = std::mem::size_of::<PositionRecord>() as u64;
pub const VELOCITY_RECORD_SIZE: u64 = std::mem::size_of::<VelocityRecord>() as u64;
