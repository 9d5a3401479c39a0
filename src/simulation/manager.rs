use std::fmt;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::backend::{BackendError, ComputeBackend, Frame};
use crate::error::SimulationError;
use crate::rendering::Camera;
use crate::simulation::init::InitialConditions;
use crate::simulation::params::{SimulationParameters, clamp_body_count, sanitize_softening};
use crate::simulation::presenter::Presenter;
use crate::simulation::resources::BodyStore;
use crate::simulation::types::BodySnapshot;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Stepping,
    Reconfiguring,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResizeDirection {
    Grow,
    Shrink,
}

/// A queued change, applied before the next tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconfiguration {
    Regenerate(SimulationParameters),
    Resize(u32),
    SwitchBackend,
}

impl fmt::Display for Reconfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reconfiguration::Regenerate(params) => write!(f, "regenerating {} bodies", params.body_count),
            Reconfiguration::Resize(count) => write!(f, "resizing to {count} bodies"),
            Reconfiguration::SwitchBackend => f.write_str("switching backend"),
        }
    }
}

/// Single owner of the parameters, the body store and the backend.
///
/// The presenter sends requests; reconfigurations are queued and applied at
/// the start of the next tick, never while a step is in flight.
pub struct SimulationController<P> {
    presenter: P,
    backend: Box<dyn ComputeBackend>,
    store: BodyStore,
    params: SimulationParameters,
    generator: InitialConditions<StdRng>,
    camera: Camera,
    state: ControllerState,
    pending: Option<Reconfiguration>,
    frame_count: u64,
}

impl<P: Presenter> SimulationController<P> {
    /// Allocates and populates a store for `params` on `backend`.
    pub fn new(
        mut presenter: P,
        mut backend: Box<dyn ComputeBackend>,
        params: SimulationParameters,
    ) -> Result<Self, SimulationError> {
        let mut params = params.sanitized();
        if let Some(softening) = presenter.softening_override() {
            params.softening = sanitize_softening(softening);
        }

        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut generator = InitialConditions::new(rng);

        let store = BodyStore::allocate(backend.as_mut(), params.body_count)?;
        let (bodies, _) = generator.generate(&params);
        if let Err(err) = store.upload(backend.as_mut(), &bodies) {
            store.release(backend.as_mut());
            return Err(err.into());
        }

        log::info!("{} bodies on {}", params.body_count, backend.name());
        presenter.on_backend_selected(backend.name());
        presenter.on_body_count_changed(params.body_count);

        Ok(Self {
            presenter,
            backend,
            store,
            params,
            generator,
            camera: Camera::default(),
            state: ControllerState::Idle,
            pending: None,
            frame_count: 0,
        })
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn parameters(&self) -> &SimulationParameters {
        &self.params
    }

    pub fn pending(&self) -> Option<&Reconfiguration> {
        self.pending.as_ref()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn body_count(&self) -> u32 {
        self.store.body_count()
    }

    /// Pairwise interactions evaluated by one tick.
    pub fn interactions_per_frame(&self) -> u64 {
        let n = self.store.body_count() as u64;
        n * n
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    /// Queues a fresh population for `params`. Takes effect at the start of
    /// the next tick (or [`SimulationController::apply_pending`]); until then
    /// `snapshot` still returns the old bodies.
    pub fn request_regenerate(&mut self, params: SimulationParameters) -> bool {
        self.enqueue(Reconfiguration::Regenerate(params.sanitized()))
    }

    /// Doubles or halves the body count, clamped to the allowed range and
    /// rounded down to whole workgroups. Ignored once the clamp stops it moving.
    pub fn request_resize(&mut self, direction: ResizeDirection) -> bool {
        let count = self.store.body_count();
        let target = match direction {
            ResizeDirection::Grow => clamp_body_count(count.saturating_mul(2)),
            ResizeDirection::Shrink => clamp_body_count(count / 2),
        };
        if target == count {
            log::warn!("ignoring {direction:?} request at {count} bodies");
            return false;
        }
        self.enqueue(Reconfiguration::Resize(target))
    }

    pub fn request_backend_switch(&mut self) -> bool {
        self.enqueue(Reconfiguration::SwitchBackend)
    }

    fn enqueue(&mut self, request: Reconfiguration) -> bool {
        if let Some(pending) = &self.pending {
            log::warn!("ignoring {request}: still {pending}");
            return false;
        }
        log::debug!("queued {request}");
        self.pending = Some(request);
        self.state = ControllerState::Reconfiguring;
        true
    }

    /// Applies the queued reconfiguration, if any, without stepping.
    ///
    /// Returns false when nothing was queued or the change failed; a failure
    /// is reported to the presenter and the previous store stays live.
    pub fn apply_pending(&mut self) -> bool {
        let Some(request) = self.pending.take() else {
            return false;
        };
        match self.reconfigure(request) {
            Ok(()) => true,
            Err(err) => {
                log::error!("{err}");
                self.presenter.on_reconfiguration_failed(&err);
                false
            }
        }
    }

    /// Applies any queued reconfiguration, then advances the simulation by one
    /// tick and hands the pre-step buffer to the presenter.
    pub fn request_tick(&mut self) -> Result<(), SimulationError> {
        self.apply_pending();

        self.state = ControllerState::Stepping;
        let result = self.step();
        self.state = ControllerState::Idle;
        result
    }

    fn step(&mut self) -> Result<(), SimulationError> {
        let presented = self.store.tick(self.backend.as_mut(), self.params.compute_params())?;
        let frame = Frame {
            positions: presented,
            body_count: self.store.body_count(),
            render_params: self.camera.render_params(),
        };
        self.backend.submit_render(&frame)?;
        self.presenter.present(&frame);
        self.frame_count += 1;
        Ok(())
    }

    /// Drains the backend and copies the current bodies to the host.
    pub fn snapshot(&mut self) -> Result<BodySnapshot, SimulationError> {
        Ok(self.store.snapshot(self.backend.as_mut())?)
    }

    fn reconfigure(&mut self, request: Reconfiguration) -> Result<(), SimulationError> {
        let result = match &request {
            Reconfiguration::Regenerate(params) => self.regenerate(params.clone()),
            Reconfiguration::Resize(count) => {
                let mut params = self.params.clone();
                params.body_count = *count;
                self.regenerate(params)
            }
            Reconfiguration::SwitchBackend => self.switch_backend(),
        };
        self.state = ControllerState::Idle;
        result.map_err(SimulationError::reconfiguration(request))
    }

    /// Builds a fresh store for `params` and only then retires the old one.
    fn regenerate(&mut self, mut params: SimulationParameters) -> Result<(), BackendError> {
        if let Some(softening) = self.presenter.softening_override() {
            params.softening = sanitize_softening(softening);
        }
        let backend = self.backend.as_mut();
        backend.drain()?;

        let store = self.store.resized(backend, params.body_count, true)?;
        let (bodies, _) = self.generator.generate(&params);
        if let Err(err) = store.upload(backend, &bodies) {
            store.release(backend);
            return Err(err);
        }
        std::mem::replace(&mut self.store, store).release(backend);

        let count_changed = params.body_count != self.params.body_count;
        self.params = params;
        self.frame_count = 0;
        log::info!("regenerated {} bodies", self.params.body_count);
        if count_changed {
            self.presenter.on_body_count_changed(self.params.body_count);
        }
        Ok(())
    }

    /// Moves the current state onto the presenter's next backend.
    fn switch_backend(&mut self) -> Result<(), BackendError> {
        let mut next = self.presenter.next_backend()?;
        let store = self.store.transfer(self.backend.as_mut(), next.as_mut())?;

        let old_store = std::mem::replace(&mut self.store, store);
        let mut old_backend = std::mem::replace(&mut self.backend, next);
        old_store.release(old_backend.as_mut());

        if let Some(softening) = self.presenter.softening_override() {
            self.params.softening = sanitize_softening(softening);
        }
        log::info!("switched from {} to {}", old_backend.name(), self.backend.name());
        self.presenter.on_backend_selected(self.backend.name());
        Ok(())
    }
}
