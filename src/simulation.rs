//! Body state, initial conditions, the integration step and the controller
//! that owns them.

pub mod distribution;
pub mod init;
pub mod kernel;
pub mod manager;
pub mod params;
pub mod presenter;
pub mod resources;
pub mod sampling;
pub mod types;

pub use distribution::{AxisDistributions, DistributionCode};
pub use init::{Extents, InitialConditions};
pub use manager::{ControllerState, Reconfiguration, ResizeDirection, SimulationController};
pub use params::SimulationParameters;
pub use presenter::Presenter;
pub use resources::BodyStore;
pub use types::{BodySnapshot, PositionRecord, VelocityRecord};
