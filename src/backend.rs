//! Compute backends the controller can hot-swap between.

pub mod cpu;
pub mod gpu;

use std::fmt;

use thiserror::Error;

use crate::rendering::camera::RenderParams;
use crate::simulation::types::ComputeParams;

pub use cpu::CpuBackend;
pub use gpu::GpuBackend;

/// Opaque handle to a buffer owned by a backend.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub(crate) u64);

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no compute backend available: {0}")]
    Unavailable(String),
    #[error("failed to allocate {size} bytes for {label}")]
    Allocation { label: String, size: u64 },
    #[error("unknown {0}")]
    UnknownBuffer(BufferHandle),
    #[error("{buffer} holds {actual} bytes, expected {expected}")]
    SizeMismatch {
        buffer: BufferHandle,
        expected: u64,
        actual: u64,
    },
    #[error("failed to read back {buffer}: {reason}")]
    Readback { buffer: BufferHandle, reason: String },
    #[error("device error: {0}")]
    Device(String),
}

/// One tick of the integration step.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Dispatch {
    pub positions_in: BufferHandle,
    pub positions_out: BufferHandle,
    pub velocities: BufferHandle,
    pub params: ComputeParams,
}

/// The buffer handed to the presenter for display, plus how to look at it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    pub positions: BufferHandle,
    pub body_count: u32,
    pub render_params: RenderParams,
}

/// Capability object the controller drives; swapped at runtime.
///
/// Submissions are ordered: a `submit_compute` or `submit_render` observes
/// every write submitted before it. `read_buffer` and `drain` block until all
/// submitted work has completed.
pub trait ComputeBackend {
    fn name(&self) -> &str;

    fn allocate_buffer(&mut self, label: &str, size: u64) -> Result<BufferHandle, BackendError>;

    fn release_buffer(&mut self, buffer: BufferHandle);

    fn write_buffer(&mut self, buffer: BufferHandle, bytes: &[u8]) -> Result<(), BackendError>;

    /// Drains pending work and returns a host-visible copy of the buffer.
    fn read_buffer(&mut self, buffer: BufferHandle) -> Result<Vec<u8>, BackendError>;

    fn submit_compute(&mut self, dispatch: &Dispatch) -> Result<(), BackendError>;

    /// Hands `frame.positions` to the backend's presentation slot.
    fn submit_render(&mut self, frame: &Frame) -> Result<(), BackendError>;

    fn drain(&mut self) -> Result<(), BackendError>;
}

/// A backend that can be instantiated on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    Cpu,
    Gpu { adapter_index: usize, name: String },
}

impl BackendKind {
    pub fn create(&self) -> Result<Box<dyn ComputeBackend>, BackendError> {
        match self {
            BackendKind::Cpu => Ok(Box::new(CpuBackend::new())),
            BackendKind::Gpu { adapter_index, .. } => Ok(Box::new(GpuBackend::new(*adapter_index)?)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Cpu => f.write_str("cpu"),
            BackendKind::Gpu { name, .. } => write!(f, "gpu ({name})"),
        }
    }
}

/// Every backend on this machine: the CPU first, then each wgpu adapter.
pub fn available_backends() -> Vec<BackendKind> {
    let mut kinds = vec![BackendKind::Cpu];
    kinds.extend(
        gpu::adapter_names()
            .into_iter()
            .enumerate()
            .map(|(adapter_index, name)| BackendKind::Gpu { adapter_index, name }),
    );
    kinds
}

/// Cycles through a list of backends, wrapping around at the end.
#[derive(Debug, Clone)]
pub struct BackendSelector {
    kinds: Vec<BackendKind>,
    index: usize,
}

impl BackendSelector {
    pub fn new(kinds: Vec<BackendKind>) -> Self {
        Self { kinds, index: 0 }
    }

    /// Starts the cycle at the first backend matching `pred`, if any.
    pub fn starting_at(mut self, pred: impl Fn(&BackendKind) -> bool) -> Self {
        if let Some(index) = self.kinds.iter().position(pred) {
            self.index = index;
        }
        self
    }

    pub fn current(&self) -> Option<&BackendKind> {
        self.kinds.get(self.index)
    }

    pub fn advance(&mut self) -> Option<&BackendKind> {
        if self.kinds.is_empty() {
            return None;
        }
        self.index = (self.index + 1) % self.kinds.len();
        self.current()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_wraps_around() {
        let mut selector = BackendSelector::new(vec![
            BackendKind::Cpu,
            BackendKind::Gpu {
                adapter_index: 0,
                name: "test".into(),
            },
        ]);
        assert_eq!(selector.current(), Some(&BackendKind::Cpu));
        assert!(matches!(selector.advance(), Some(BackendKind::Gpu { .. })));
        assert_eq!(selector.advance(), Some(&BackendKind::Cpu));
    }

    #[test]
    fn empty_selector_yields_nothing() {
        let mut selector = BackendSelector::new(Vec::new());
        assert!(selector.current().is_none());
        assert!(selector.advance().is_none());
    }
}
