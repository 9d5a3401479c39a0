pub mod backend;
pub mod error;
pub mod rendering;
pub mod simulation;

pub use backend::{BackendError, BackendKind, BackendSelector, ComputeBackend, CpuBackend, GpuBackend};
pub use error::SimulationError;
pub use simulation::{SimulationController, SimulationParameters};
