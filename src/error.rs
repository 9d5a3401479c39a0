use thiserror::Error;

use crate::backend::BackendError;
use crate::simulation::manager::Reconfiguration;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// A reconfiguration could not be applied; the previous store and backend
    /// are still in place.
    #[error("{action} failed: {source}")]
    Reconfiguration {
        action: Reconfiguration,
        #[source]
        source: BackendError,
    },
}

impl SimulationError {
    pub(crate) fn reconfiguration(action: Reconfiguration) -> impl FnOnce(BackendError) -> Self {
        move |source| SimulationError::Reconfiguration { action, source }
    }
}
