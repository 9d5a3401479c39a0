use std::error::Error;
use std::time::Instant;

use clap::Parser;

use nbody_playground::backend::{self, BackendError, BackendKind, BackendSelector, ComputeBackend, CpuBackend};
use nbody_playground::error::SimulationError;
use nbody_playground::simulation::types::DEFAULT_BODIES;
use nbody_playground::simulation::{
    AxisDistributions, DistributionCode, Presenter, ResizeDirection, SimulationController, SimulationParameters,
};

// Flops per pairwise interaction, the usual N-body estimate
const FLOPS_PER_INTERACTION: f64 = 20.0;

#[derive(Parser, Debug)]
#[command(version, about = "All-pairs gravitational N-body simulation")]
struct Args {
    /// Number of bodies, rounded down to a multiple of 64 in [64, 320768]
    #[arg(short = 'n', long, default_value_t = DEFAULT_BODIES)]
    bodies: u32,

    /// Frames to simulate
    #[arg(short, long, default_value_t = 600)]
    steps: u64,

    /// Starting backend: "cpu", "gpu" or part of an adapter name
    #[arg(short, long, default_value = "gpu")]
    backend: String,

    /// Switch to the next backend every N frames (0 = never)
    #[arg(long, default_value_t = 0)]
    switch_every: u64,

    /// Grow (positive) or shrink (negative) the body count once, half way through
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    resize: i32,

    #[arg(long, default_value = "RL")]
    position_x: DistributionCode,
    #[arg(long, default_value = "RL")]
    position_y: DistributionCode,
    #[arg(long, default_value = "RL")]
    position_z: DistributionCode,
    #[arg(long, default_value = "RL")]
    velocity_x: DistributionCode,
    #[arg(long, default_value = "RL")]
    velocity_y: DistributionCode,
    #[arg(long, default_value = "RL")]
    velocity_z: DistributionCode,

    #[arg(long, default_value_t = 1e-5)]
    timestep: f32,

    /// Overrides the softening length on every reconfiguration
    #[arg(long)]
    softening: Option<f32>,

    #[arg(long, default_value_t = 11e-8)]
    disc_mass: f64,

    #[arg(long, default_value_t = 2.4)]
    box_size: f64,

    #[arg(long, default_value_t = 64.0)]
    velocity_strength: f32,

    /// Seed for reproducible initial conditions
    #[arg(long)]
    seed: Option<u64>,

    /// Frames between telemetry lines
    #[arg(long, default_value_t = 60)]
    log_interval: u64,
}

impl Args {
    fn parameters(&self) -> SimulationParameters {
        SimulationParameters {
            body_count: self.bodies,
            timestep: self.timestep,
            position_distribution: AxisDistributions::new(self.position_x, self.position_y, self.position_z),
            velocity_distribution: AxisDistributions::new(self.velocity_x, self.velocity_y, self.velocity_z),
            disc_mass: self.disc_mass,
            box_size: self.box_size,
            velocity_strength: self.velocity_strength,
            seed: self.seed,
            ..SimulationParameters::default()
        }
    }
}

/// Presenter without a window: reports everything through the log.
struct LogPresenter {
    selector: BackendSelector,
    softening: Option<f32>,
    backend_name: String,
    body_count: u32,
}

impl Presenter for LogPresenter {
    fn on_backend_selected(&mut self, name: &str) {
        log::info!("backend: {name}");
        self.backend_name = name.to_string();
    }

    fn on_body_count_changed(&mut self, count: u32) {
        log::info!("bodies: {count}");
        self.body_count = count;
    }

    fn softening_override(&self) -> Option<f32> {
        self.softening
    }

    fn next_backend(&mut self) -> Result<Box<dyn ComputeBackend>, BackendError> {
        let kind = self
            .selector
            .advance()
            .ok_or_else(|| BackendError::Unavailable("no backends".into()))?;
        kind.create()
    }

    fn on_reconfiguration_failed(&mut self, error: &SimulationError) {
        log::warn!("staying on {} with {} bodies: {error}", self.backend_name, self.body_count);
    }
}

/// Picks the starting backend, falling back to the CPU when it cannot be opened.
fn start_backend(requested: &str) -> (BackendSelector, Box<dyn ComputeBackend>) {
    let requested = requested.to_lowercase();
    let mut selector = BackendSelector::new(backend::available_backends()).starting_at(|kind| match kind {
        BackendKind::Cpu => requested == "cpu",
        BackendKind::Gpu { name, .. } => requested == "gpu" || name.to_lowercase().contains(&requested),
    });

    if let Some(kind) = selector.current().cloned() {
        match kind.create() {
            Ok(backend) => return (selector, backend),
            Err(err) => log::warn!("{kind}: {err}, falling back to cpu"),
        }
    }
    selector = selector.starting_at(|kind| *kind == BackendKind::Cpu);
    (selector, Box::new(CpuBackend::new()))
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let (selector, backend) = start_backend(&args.backend);
    let presenter = LogPresenter {
        selector,
        softening: args.softening,
        backend_name: String::new(),
        body_count: 0,
    };

    let mut simulation = SimulationController::new(presenter, backend, args.parameters()).inspect_err(|err| {
        log::error!("failed to start simulation: {err}");
    })?;

    let mut window_start = Instant::now();
    let mut window_frames = 0u64;
    for step in 1..=args.steps {
        if args.switch_every > 0 && step % args.switch_every == 0 {
            simulation.request_backend_switch();
        }
        if args.resize != 0 && step == args.steps / 2 {
            let direction = if args.resize > 0 {
                ResizeDirection::Grow
            } else {
                ResizeDirection::Shrink
            };
            for _ in 0..args.resize.unsigned_abs() {
                if !(simulation.request_resize(direction) && simulation.apply_pending()) {
                    break;
                }
            }
        }

        simulation.request_tick().inspect_err(|err| log::error!("frame {step}: {err}"))?;
        window_frames += 1;

        if args.log_interval > 0 && step % args.log_interval == 0 {
            // readback waits for the backend so the timing covers finished work
            let bodies = simulation.snapshot()?;
            let elapsed = window_start.elapsed().as_secs_f64();
            let fps = window_frames as f64 / elapsed;
            let gflops = simulation.interactions_per_frame() as f64 * FLOPS_PER_INTERACTION * fps / 1e9;
            log::info!(
                "frame {step}: {} bodies on {}, {fps:.1} fps, {gflops:.2} GFLOP/s, finite: {}",
                simulation.body_count(),
                simulation.backend_name(),
                bodies.is_finite()
            );
            window_start = Instant::now();
            window_frames = 0;
        }
    }

    let bodies = simulation.snapshot()?;
    let [px, py, pz] = bodies.momentum();
    log::info!(
        "done after {} frames; momentum ({px:.3e}, {py:.3e}, {pz:.3e})",
        simulation.frame_count()
    );
    Ok(())
}
