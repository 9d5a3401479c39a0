use crate::backend::{BackendError, BufferHandle, ComputeBackend, Dispatch};
use crate::simulation::types::{
    BodySnapshot, ComputeParams, POSITION_RECORD_SIZE, PositionRecord, VELOCITY_RECORD_SIZE, VelocityRecord,
};

/// Ping-pong position buffers plus the single velocity buffer, all owned by
/// one backend.
///
/// `positions[current]` is read by the next tick and shown by the presenter;
/// the other one is written by that tick. Roles swap after every tick.
#[derive(Debug)]
pub struct BodyStore {
    positions: [BufferHandle; 2], // Ping-pong buffers
    velocities: BufferHandle,
    current: usize,
    body_count: u32,
}

impl BodyStore {
    /// Allocates both position buffers and the velocity buffer for `body_count`
    /// bodies. Nothing is left allocated on failure.
    pub fn allocate(backend: &mut dyn ComputeBackend, body_count: u32) -> Result<Self, BackendError> {
        let position_size = body_count as u64 * POSITION_RECORD_SIZE;
        let velocity_size = body_count as u64 * VELOCITY_RECORD_SIZE;

        let mut allocated = Vec::with_capacity(3);
        for (label, size) in [
            ("Positions Buffer 0", position_size),
            ("Positions Buffer 1", position_size),
            ("Velocities Buffer", velocity_size),
        ] {
            match backend.allocate_buffer(label, size) {
                Ok(handle) => allocated.push(handle),
                Err(err) => {
                    for handle in allocated {
                        backend.release_buffer(handle);
                    }
                    return Err(err);
                }
            }
        }
        let &[a, b, velocities] = allocated.as_slice() else {
            return Err(BackendError::Device("body store allocation incomplete".into()));
        };

        log::debug!("allocated body store for {body_count} bodies on {}", backend.name());
        Ok(Self {
            positions: [a, b],
            velocities,
            current: 0,
            body_count,
        })
    }

    pub fn body_count(&self) -> u32 {
        self.body_count
    }

    /// Buffer read by the next tick.
    pub fn current(&self) -> BufferHandle {
        self.positions[self.current]
    }

    /// Buffer written by the next tick.
    pub fn next(&self) -> BufferHandle {
        self.positions[1 - self.current]
    }

    pub fn velocities(&self) -> BufferHandle {
        self.velocities
    }

    /// Writes a generated population into the current and velocity buffers.
    pub fn upload(&self, backend: &mut dyn ComputeBackend, snapshot: &BodySnapshot) -> Result<(), BackendError> {
        let expected = self.body_count as usize;
        if snapshot.positions.len() != expected || snapshot.velocities.len() != expected {
            return Err(BackendError::SizeMismatch {
                buffer: self.current(),
                expected: expected as u64 * POSITION_RECORD_SIZE,
                actual: snapshot.positions.len() as u64 * POSITION_RECORD_SIZE,
            });
        }
        backend.write_buffer(self.current(), bytemuck::cast_slice(&snapshot.positions))?;
        backend.write_buffer(self.velocities, bytemuck::cast_slice(&snapshot.velocities))
    }

    /// Runs one integration step current -> next and swaps the roles.
    ///
    /// Returns the pre-swap current buffer: the frame shown during this tick.
    pub fn tick(&mut self, backend: &mut dyn ComputeBackend, params: ComputeParams) -> Result<BufferHandle, BackendError> {
        let presented = self.current();
        backend.submit_compute(&Dispatch {
            positions_in: presented,
            positions_out: self.next(),
            velocities: self.velocities,
            params: ComputeParams {
                body_count: self.body_count,
                ..params
            },
        })?;
        self.swap_buffers();
        Ok(presented)
    }

    fn swap_buffers(&mut self) {
        self.current = 1 - self.current;
    }

    /// Drains the backend and copies the current state back to the host.
    pub fn snapshot(&self, backend: &mut dyn ComputeBackend) -> Result<BodySnapshot, BackendError> {
        backend.drain()?;
        let count = self.body_count as usize;

        let mut positions: Vec<PositionRecord> = bytemuck::pod_collect_to_vec(&backend.read_buffer(self.current())?);
        let mut velocities: Vec<VelocityRecord> = bytemuck::pod_collect_to_vec(&backend.read_buffer(self.velocities)?);
        if positions.len() < count || velocities.len() < count {
            return Err(BackendError::SizeMismatch {
                buffer: self.current(),
                expected: count as u64 * POSITION_RECORD_SIZE,
                actual: positions.len() as u64 * POSITION_RECORD_SIZE,
            });
        }
        positions.truncate(count);
        velocities.truncate(count);
        Ok(BodySnapshot { positions, velocities })
    }

    /// Allocates a fresh store of `body_count` bodies on the same backend.
    ///
    /// With `regenerate == false` and an unchanged count the current state is
    /// copied over byte for byte; otherwise the new buffers are left for the
    /// caller to populate. `self` is untouched either way.
    pub fn resized(
        &self,
        backend: &mut dyn ComputeBackend,
        body_count: u32,
        regenerate: bool,
    ) -> Result<BodyStore, BackendError> {
        let copy = if !regenerate && body_count == self.body_count {
            Some(self.snapshot(backend)?)
        } else {
            None
        };

        let store = BodyStore::allocate(backend, body_count)?;
        if let Some(snapshot) = copy {
            if let Err(err) = store.upload(backend, &snapshot) {
                store.release(backend);
                return Err(err);
            }
        }
        Ok(store)
    }

    /// In-place variant of [`BodyStore::resized`]; keeps the old buffers on failure.
    pub fn resize(&mut self, backend: &mut dyn ComputeBackend, body_count: u32, regenerate: bool) -> Result<(), BackendError> {
        let store = self.resized(backend, body_count, regenerate)?;
        std::mem::replace(self, store).release(backend);
        Ok(())
    }

    /// Copies the current state into a new store owned by `to`.
    ///
    /// `from` is drained first so the copy sees every submitted tick. The
    /// store on `from` is left alive; releasing it is up to the caller.
    pub fn transfer(
        &self,
        from: &mut dyn ComputeBackend,
        to: &mut dyn ComputeBackend,
    ) -> Result<BodyStore, BackendError> {
        let snapshot = self.snapshot(from)?;
        let store = BodyStore::allocate(to, self.body_count)?;
        if let Err(err) = store.upload(to, &snapshot) {
            store.release(to);
            return Err(err);
        }
        log::debug!("moved {} bodies from {} to {}", self.body_count, from.name(), to.name());
        Ok(store)
    }

    pub fn release(self, backend: &mut dyn ComputeBackend) {
        for handle in self.positions {
            backend.release_buffer(handle);
        }
        backend.release_buffer(self.velocities);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CpuBackend, Frame};

    /// CPU backend whose allocations start failing once `allocations_left` runs out.
    struct FailingBackend {
        inner: CpuBackend,
        allocations_left: usize,
    }

    impl FailingBackend {
        fn new(allocations_left: usize) -> Self {
            Self {
                inner: CpuBackend::new(),
                allocations_left,
            }
        }
    }

    impl ComputeBackend for FailingBackend {
        fn name(&self) -> &str {
            "failing"
        }

        fn allocate_buffer(&mut self, label: &str, size: u64) -> Result<BufferHandle, BackendError> {
            if self.allocations_left == 0 {
                return Err(BackendError::Allocation {
                    label: label.to_string(),
                    size,
                });
            }
            self.allocations_left -= 1;
            self.inner.allocate_buffer(label, size)
        }

        fn release_buffer(&mut self, buffer: BufferHandle) {
            self.inner.release_buffer(buffer);
        }

        fn write_buffer(&mut self, buffer: BufferHandle, bytes: &[u8]) -> Result<(), BackendError> {
            self.inner.write_buffer(buffer, bytes)
        }

        fn read_buffer(&mut self, buffer: BufferHandle) -> Result<Vec<u8>, BackendError> {
            self.inner.read_buffer(buffer)
        }

        fn submit_compute(&mut self, dispatch: &Dispatch) -> Result<(), BackendError> {
            self.inner.submit_compute(dispatch)
        }

        fn submit_render(&mut self, frame: &Frame) -> Result<(), BackendError> {
            self.inner.submit_render(frame)
        }

        fn drain(&mut self) -> Result<(), BackendError> {
            self.inner.drain()
        }
    }

    fn snapshot(count: usize) -> BodySnapshot {
        BodySnapshot {
            positions: (0..count)
                .map(|i| PositionRecord::new(i as f32 * 0.01, -(i as f32) * 0.02, 0.5))
                .collect(),
            velocities: (0..count)
                .map(|i| VelocityRecord::new(0.0, i as f32 * 0.001, 0.0, 1e-3))
                .collect(),
        }
    }

    fn params() -> ComputeParams {
        ComputeParams {
            body_count: 64,
            delta_time: 1e-3,
            softening: 0.05,
            gravitational_constant: 1.0,
        }
    }

    #[test]
    fn tick_presents_pre_swap_buffer_and_alternates() {
        let mut backend = CpuBackend::new();
        let mut store = BodyStore::allocate(&mut backend, 64).unwrap();
        store.upload(&mut backend, &snapshot(64)).unwrap();

        let (a, b) = (store.current(), store.next());
        assert_ne!(a, b);

        assert_eq!(store.tick(&mut backend, params()).unwrap(), a);
        assert_eq!((store.current(), store.next()), (b, a));
        assert_eq!(store.tick(&mut backend, params()).unwrap(), b);
        assert_eq!((store.current(), store.next()), (a, b));
    }

    #[test]
    fn tick_leaves_input_buffer_untouched() {
        let mut backend = CpuBackend::new();
        let mut store = BodyStore::allocate(&mut backend, 64).unwrap();
        let initial = snapshot(64);
        store.upload(&mut backend, &initial).unwrap();

        let presented = store.tick(&mut backend, params()).unwrap();
        let bytes = backend.read_buffer(presented).unwrap();
        assert_eq!(bytes, bytemuck::cast_slice::<_, u8>(&initial.positions));
        assert_ne!(store.snapshot(&mut backend).unwrap().positions, initial.positions);
    }

    #[test]
    fn resize_without_regenerate_keeps_state() {
        let mut backend = CpuBackend::new();
        let mut store = BodyStore::allocate(&mut backend, 128).unwrap();
        store.upload(&mut backend, &snapshot(128)).unwrap();
        store.tick(&mut backend, params()).unwrap();
        let before = store.snapshot(&mut backend).unwrap();

        store.resize(&mut backend, 128, false).unwrap();
        assert_eq!(store.snapshot(&mut backend).unwrap(), before);
        assert_eq!(backend.buffer_count(), 3);
    }

    #[test]
    fn resize_to_new_count_leaves_buffers_blank() {
        let mut backend = CpuBackend::new();
        let mut store = BodyStore::allocate(&mut backend, 128).unwrap();
        store.upload(&mut backend, &snapshot(128)).unwrap();

        store.resize(&mut backend, 64, false).unwrap();
        assert_eq!(store.body_count(), 64);
        let blank = store.snapshot(&mut backend).unwrap();
        assert!(blank.positions.iter().all(|p| p.position == [0.0; 4]));
        assert_eq!(backend.buffer_count(), 3);
    }

    #[test]
    fn upload_rejects_wrong_length() {
        let mut backend = CpuBackend::new();
        let store = BodyStore::allocate(&mut backend, 64).unwrap();
        assert!(matches!(
            store.upload(&mut backend, &snapshot(128)),
            Err(BackendError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn transfer_copies_bytes_between_backends() {
        let mut from = CpuBackend::new();
        let mut to = CpuBackend::new();
        let mut store = BodyStore::allocate(&mut from, 64).unwrap();
        store.upload(&mut from, &snapshot(64)).unwrap();
        store.tick(&mut from, params()).unwrap();

        let moved = store.transfer(&mut from, &mut to).unwrap();
        assert_eq!(moved.snapshot(&mut to).unwrap(), store.snapshot(&mut from).unwrap());

        store.release(&mut from);
        assert_eq!(from.buffer_count(), 0);
        assert_eq!(to.buffer_count(), 3);
    }

    #[test]
    fn failed_allocation_releases_partial_buffers() {
        for budget in 0..3 {
            let mut backend = FailingBackend::new(budget);
            let result = BodyStore::allocate(&mut backend, 64);
            assert!(matches!(result, Err(BackendError::Allocation { .. })), "budget {budget}");
            assert_eq!(backend.inner.buffer_count(), 0, "budget {budget}");
        }
    }

    #[test]
    fn failed_resize_keeps_old_store() {
        for budget in 0..3 {
            let mut backend = FailingBackend::new(3 + budget);
            let mut store = BodyStore::allocate(&mut backend, 64).unwrap();
            store.upload(&mut backend, &snapshot(64)).unwrap();
            store.tick(&mut backend, params()).unwrap();
            let before = store.snapshot(&mut backend).unwrap();

            assert!(store.resize(&mut backend, 128, true).is_err());
            assert_eq!(store.body_count(), 64);
            assert_eq!(store.snapshot(&mut backend).unwrap(), before);
            assert_eq!(backend.inner.buffer_count(), 3, "budget {budget}");
        }
    }
}
