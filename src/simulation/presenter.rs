use crate::backend::{BackendError, ComputeBackend, Frame};
use crate::error::SimulationError;

/// The outer collaborator: owns the window, input and telemetry, and is told
/// about everything the controller changes.
pub trait Presenter {
    fn on_backend_selected(&mut self, name: &str);

    fn on_body_count_changed(&mut self, count: u32);

    /// User-edited softening, picked up at startup and on every reconfiguration.
    fn softening_override(&self) -> Option<f32> {
        None
    }

    /// The backend to switch to on a backend-switch request.
    fn next_backend(&mut self) -> Result<Box<dyn ComputeBackend>, BackendError>;

    /// The previous store and backend are still live when this is called.
    fn on_reconfiguration_failed(&mut self, _error: &SimulationError) {}

    /// Called once per tick after the frame has been handed to the backend.
    fn present(&mut self, _frame: &Frame) {}
}
