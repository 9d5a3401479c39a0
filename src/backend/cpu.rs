use std::collections::HashMap;

use rayon::prelude::*;

use crate::backend::{BackendError, BufferHandle, ComputeBackend, Dispatch, Frame};
use crate::rendering::camera::RenderParams;
use crate::simulation::kernel;
use crate::simulation::types::{COMPUTE_WORKGROUP_SIZE, PositionRecord, VelocityRecord};

/// Host-memory backend running the integration step on the rayon pool.
///
/// Work runs synchronously inside `submit_compute`, so `drain` has nothing
/// to wait for.
pub struct CpuBackend {
    name: String,
    buffers: HashMap<BufferHandle, Vec<f32>>,
    next_id: u64,
    presented: Vec<PositionRecord>,
    render_params: Option<RenderParams>,
    frames_presented: u64,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        let name = format!("CPU ({} threads)", rayon::current_num_threads());
        Self {
            name,
            buffers: HashMap::new(),
            next_id: 0,
            presented: Vec::new(),
            render_params: None,
            frames_presented: 0,
        }
    }

    /// Positions handed over by the last `submit_render`.
    pub fn presented(&self) -> &[PositionRecord] {
        &self.presented
    }

    pub fn render_params(&self) -> Option<&RenderParams> {
        self.render_params.as_ref()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn buffer(&self, handle: BufferHandle) -> Result<&Vec<f32>, BackendError> {
        self.buffers.get(&handle).ok_or(BackendError::UnknownBuffer(handle))
    }

    fn take(&mut self, handle: BufferHandle) -> Result<Vec<f32>, BackendError> {
        self.buffers.remove(&handle).ok_or(BackendError::UnknownBuffer(handle))
    }

    fn run(&self, dispatch: &Dispatch, out: &mut [f32], velocities: &mut [f32]) -> Result<(), BackendError> {
        let count = dispatch.params.body_count as usize;
        let input = records::<PositionRecord>(dispatch.positions_in, self.buffer(dispatch.positions_in)?, count)?;
        let out = records_mut::<PositionRecord>(dispatch.positions_out, out, count)?;
        let velocities = records_mut::<VelocityRecord>(dispatch.velocities, velocities, count)?;

        // masses are read by every work-item, velocities only by their owner
        let masses = kernel::masses(velocities);
        let group = COMPUTE_WORKGROUP_SIZE as usize;
        out.par_chunks_mut(group)
            .zip(velocities.par_chunks_mut(group))
            .enumerate()
            .for_each(|(g, (out, velocities))| {
                for (local, (record, velocity)) in out.iter_mut().zip(velocities).enumerate() {
                    *record = kernel::integrate_body(g * group + local, input, &masses, velocity, &dispatch.params);
                }
            });
        Ok(())
    }
}

fn records<T: bytemuck::Pod>(handle: BufferHandle, words: &[f32], count: usize) -> Result<&[T], BackendError> {
    let mismatch = size_mismatch::<T>(handle, std::mem::size_of_val(words), count);
    let all: &[T] = bytemuck::try_cast_slice(words).map_err(|_| mismatch())?;
    all.get(..count).ok_or_else(mismatch)
}

fn records_mut<T: bytemuck::Pod>(
    handle: BufferHandle,
    words: &mut [f32],
    count: usize,
) -> Result<&mut [T], BackendError> {
    let mismatch = size_mismatch::<T>(handle, std::mem::size_of_val(words), count);
    let all: &mut [T] = bytemuck::try_cast_slice_mut(words).map_err(|_| mismatch())?;
    all.get_mut(..count).ok_or_else(mismatch)
}

fn size_mismatch<T>(buffer: BufferHandle, actual: usize, count: usize) -> impl Fn() -> BackendError {
    let expected = (count * std::mem::size_of::<T>()) as u64;
    move || BackendError::SizeMismatch {
        buffer,
        expected,
        actual: actual as u64,
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn allocate_buffer(&mut self, label: &str, size: u64) -> Result<BufferHandle, BackendError> {
        if size % 4 != 0 {
            return Err(BackendError::Allocation {
                label: label.to_string(),
                size,
            });
        }
        let mut words = Vec::new();
        words
            .try_reserve_exact((size / 4) as usize)
            .map_err(|_| BackendError::Allocation {
                label: label.to_string(),
                size,
            })?;
        words.resize((size / 4) as usize, 0.0);

        let handle = BufferHandle(self.next_id);
        self.next_id += 1;
        self.buffers.insert(handle, words);
        log::trace!("{label}: allocated {size} bytes as {handle}");
        Ok(handle)
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
    }

    fn write_buffer(&mut self, buffer: BufferHandle, bytes: &[u8]) -> Result<(), BackendError> {
        let words = self.buffers.get_mut(&buffer).ok_or(BackendError::UnknownBuffer(buffer))?;
        let target: &mut [u8] = bytemuck::cast_slice_mut(words.as_mut_slice());
        if bytes.len() > target.len() {
            return Err(BackendError::SizeMismatch {
                buffer,
                expected: target.len() as u64,
                actual: bytes.len() as u64,
            });
        }
        target[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read_buffer(&mut self, buffer: BufferHandle) -> Result<Vec<u8>, BackendError> {
        let words = self.buffer(buffer)?;
        Ok(bytemuck::cast_slice(words.as_slice()).to_vec())
    }

    fn submit_compute(&mut self, dispatch: &Dispatch) -> Result<(), BackendError> {
        let Dispatch {
            positions_in,
            positions_out,
            velocities,
            ..
        } = *dispatch;
        if positions_in == positions_out || positions_in == velocities || positions_out == velocities {
            return Err(BackendError::Device(format!(
                "dispatch aliases buffers ({positions_in}, {positions_out}, {velocities})"
            )));
        }

        // out and velocities are moved out so positions_in can stay borrowed
        let mut out = self.take(positions_out)?;
        let mut vel = match self.take(velocities) {
            Ok(vel) => vel,
            Err(err) => {
                self.buffers.insert(positions_out, out);
                return Err(err);
            }
        };
        let result = self.run(dispatch, &mut out, &mut vel);
        self.buffers.insert(positions_out, out);
        self.buffers.insert(velocities, vel);
        result
    }

    fn submit_render(&mut self, frame: &Frame) -> Result<(), BackendError> {
        let count = frame.body_count as usize;
        let presented = records::<PositionRecord>(frame.positions, self.buffer(frame.positions)?, count)?.to_vec();
        self.presented = presented;
        self.render_params = Some(frame.render_params);
        self.frames_presented += 1;
        Ok(())
    }

    fn drain(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::Camera;
    use crate::simulation::BodyStore;
    use crate::simulation::types::{BodySnapshot, ComputeParams, POSITION_RECORD_SIZE, VELOCITY_RECORD_SIZE};

    fn upload(backend: &mut CpuBackend, label: &str, bytes: &[u8]) -> BufferHandle {
        let handle = backend.allocate_buffer(label, bytes.len() as u64).unwrap();
        backend.write_buffer(handle, bytes).unwrap();
        handle
    }

    #[test]
    fn buffers_round_trip_bytes() {
        let mut backend = CpuBackend::new();
        let data: Vec<u8> = (0..64u8).collect();
        let handle = upload(&mut backend, "bytes", &data);
        assert_eq!(backend.read_buffer(handle).unwrap(), data);
        backend.release_buffer(handle);
        assert!(matches!(backend.read_buffer(handle), Err(BackendError::UnknownBuffer(_))));
    }

    #[test]
    fn oversized_write_is_rejected() {
        let mut backend = CpuBackend::new();
        let handle = backend.allocate_buffer("small", 16).unwrap();
        assert!(matches!(
            backend.write_buffer(handle, &[0u8; 32]),
            Err(BackendError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn parallel_dispatch_matches_sequential_step() {
        let count = 128;
        let positions: Vec<PositionRecord> = (0..count)
            .map(|i| {
                let t = i as f32 * 0.37;
                PositionRecord::new(t.cos() * 0.5, t.sin() * 0.4, (t * 0.5).sin() * 0.1)
            })
            .collect();
        let velocities: Vec<VelocityRecord> = (0..count)
            .map(|i| VelocityRecord::new(0.01 * i as f32, 0.0, -0.02, 1.0 / count as f32))
            .collect();
        let params = ComputeParams {
            body_count: count as u32,
            delta_time: 0.001,
            softening: 0.01,
            gravitational_constant: 1.0,
        };

        let mut expected_out = positions.clone();
        let mut expected_vel = velocities.clone();
        kernel::step_sequential(&positions, &mut expected_out, &mut expected_vel, &params);

        let mut backend = CpuBackend::new();
        let input = upload(&mut backend, "in", bytemuck::cast_slice(&positions));
        let output = backend.allocate_buffer("out", count as u64 * POSITION_RECORD_SIZE).unwrap();
        let vel = upload(&mut backend, "vel", bytemuck::cast_slice(&velocities));
        backend
            .submit_compute(&Dispatch {
                positions_in: input,
                positions_out: output,
                velocities: vel,
                params,
            })
            .unwrap();

        let out: Vec<PositionRecord> = bytemuck::pod_collect_to_vec(&backend.read_buffer(output).unwrap());
        let v: Vec<VelocityRecord> = bytemuck::pod_collect_to_vec(&backend.read_buffer(vel).unwrap());
        assert_eq!(out, expected_out);
        assert_eq!(v, expected_vel);
        assert_eq!(backend.read_buffer(input).unwrap(), bytemuck::cast_slice::<_, u8>(&positions));
    }

    #[test]
    fn aliased_dispatch_is_rejected() {
        let mut backend = CpuBackend::new();
        let a = backend.allocate_buffer("a", 64 * POSITION_RECORD_SIZE).unwrap();
        let v = backend.allocate_buffer("v", 64 * VELOCITY_RECORD_SIZE).unwrap();
        let dispatch = Dispatch {
            positions_in: a,
            positions_out: a,
            velocities: v,
            params: ComputeParams {
                body_count: 64,
                delta_time: 0.1,
                softening: 0.1,
                gravitational_constant: 1.0,
            },
        };
        assert!(backend.submit_compute(&dispatch).is_err());
        assert_eq!(backend.buffer_count(), 2);
    }

    #[test]
    fn render_keeps_pre_tick_positions() {
        let mut backend = CpuBackend::new();
        assert!(backend.render_params().is_none());

        let mut store = BodyStore::allocate(&mut backend, 64).unwrap();
        let bodies = BodySnapshot {
            positions: (0..64).map(|i| PositionRecord::new(i as f32 * 0.1, 0.5, -0.25)).collect(),
            velocities: vec![VelocityRecord::new(0.0, 0.0, 0.0, 1e-2); 64],
        };
        store.upload(&mut backend, &bodies).unwrap();

        let params = ComputeParams {
            body_count: 64,
            delta_time: 1e-2,
            softening: 0.05,
            gravitational_constant: 1.0,
        };
        let camera = Camera::default();
        let presented = store.tick(&mut backend, params).unwrap();
        backend
            .submit_render(&Frame {
                positions: presented,
                body_count: 64,
                render_params: camera.render_params(),
            })
            .unwrap();

        assert_eq!(backend.presented(), bodies.positions.as_slice());
        assert_eq!(backend.render_params(), Some(&camera.render_params()));
        assert_eq!(backend.frames_presented(), 1);
        assert_ne!(store.snapshot(&mut backend).unwrap().positions, bodies.positions);
    }
}
