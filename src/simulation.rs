// frame driver: host frame delta -> sub-steps of the SPH pipeline
use bevy::log::{debug, error, info};
use bevy::prelude::Resource;
use glam::Vec3;

use crate::cpu::bounds::{BoundsTransform, SimulationBounds};
use crate::cpu::collision::MeshCollider;
use crate::cpu::mesh::MeshProvider;
use crate::cpu::particles::{ParticleSpawner, ParticleState, SpawnData};
use crate::cpu::pipeline::{SphPipeline, StepContext};
use crate::error::FluidError;
use crate::params::FluidParams;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Running,
    Paused,
    SingleStep, // run the next frame, then pause
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepInfo {
    pub frame: u64,
    pub sub_step: u32,
    pub sub_steps_per_frame: u32,
    pub dt: f32,
    pub total_steps: u64, // since the last reset, this one included
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub steps: u32,
    pub dt: f32,
    pub skipped: bool, // paused
}

/// Gets called synchronously after every sub-step.
pub trait StepObserver: Send + Sync {
    fn step_completed(&mut self, info: &StepInfo, particles: &ParticleState);
}

impl<F> StepObserver for F
where
    F: FnMut(&StepInfo, &ParticleState) + Send + Sync,
{
    fn step_completed(&mut self, info: &StepInfo, particles: &ParticleState) {
        self(info, particles)
    }
}

#[derive(Resource)]
pub struct FluidSimulation {
    params: FluidParams,
    spawn: SpawnData,
    particles: ParticleState,
    // state after the last completed sub-step, restored when a sub-step fails
    checkpoint: ParticleState,
    pipeline: SphPipeline,
    collider: MeshCollider,
    bounds: SimulationBounds,
    run_state: RunState,
    frame: u64,
    total_steps: u64,
    observers: Vec<Box<dyn StepObserver>>,
}

impl FluidSimulation {
    // everything is validated here; only a non-finite sub-step can fail later
    pub fn new(
        params: FluidParams,
        spawner: &impl ParticleSpawner,
        mesh: &impl MeshProvider,
    ) -> Result<Self, FluidError> {
        params.validate()?;
        let spawn = spawner.spawn()?;
        let particles = ParticleState::from_spawn(&spawn);
        let pipeline = SphPipeline::new(particles.len(), params.smoothing_radius)?;
        let collider = MeshCollider::new(&mesh.mesh(), params.smoothing_radius)?;
        let bounds = SimulationBounds::new(&params.bounds);

        info!(
            "Fluid simulation ready: {} particles, {} mesh triangles, h = {}",
            particles.len(),
            collider.topology().triangle_count(),
            params.smoothing_radius
        );

        Ok(Self {
            checkpoint: particles.clone(),
            params,
            spawn,
            particles,
            pipeline,
            collider,
            bounds,
            run_state: RunState::Running,
            frame: 0,
            total_steps: 0,
            observers: Vec::new(),
        })
    }

    pub fn params(&self) -> &FluidParams {
        &self.params
    }

    pub fn particles(&self) -> &ParticleState {
        &self.particles
    }

    pub fn bounds(&self) -> &SimulationBounds {
        &self.bounds
    }

    pub fn collider(&self) -> &MeshCollider {
        &self.collider
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn is_paused(&self) -> bool {
        self.run_state == RunState::Paused
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    pub fn add_observer(&mut self, observer: impl StepObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn pause(&mut self) {
        if self.run_state != RunState::Paused {
            info!("Fluid simulation paused at frame {}", self.frame);
        }
        self.run_state = RunState::Paused;
    }

    pub fn resume(&mut self) {
        if self.run_state != RunState::Running {
            info!("Fluid simulation resumed at frame {}", self.frame);
        }
        self.run_state = RunState::Running;
    }

    /// Run exactly one more frame, then pause again.
    pub fn step_once(&mut self) {
        self.run_state = RunState::SingleStep;
    }

    // only while paused
    pub fn reset(&mut self) -> Result<(), FluidError> {
        if self.run_state != RunState::Paused {
            return Err(FluidError::ResetWhileRunning);
        }
        self.particles.reset(&self.spawn)?;
        self.checkpoint.copy_from(&self.particles);
        self.frame = 0;
        self.total_steps = 0;
        info!("Fluid simulation reset ({} particles)", self.particles.len());
        Ok(())
    }

    // a new smoothing radius re-hashes the mesh and resizes the grid cells
    pub fn set_params(&mut self, params: FluidParams) -> Result<(), FluidError> {
        params.validate()?;
        if params.smoothing_radius != self.params.smoothing_radius {
            self.pipeline.set_smoothing_radius(params.smoothing_radius)?;
            self.collider.set_radius(params.smoothing_radius)?;
            debug!(
                "Smoothing radius changed {} -> {}",
                self.params.smoothing_radius, params.smoothing_radius
            );
        }
        self.bounds = SimulationBounds::new(&params.bounds);
        self.params = params;
        info!("Fluid parameters updated");
        Ok(())
    }

    pub fn set_bounds(&mut self, transform: BoundsTransform) -> Result<(), FluidError> {
        transform.validate()?;
        self.params.bounds = transform;
        self.bounds = SimulationBounds::new(&transform);
        Ok(())
    }

    // deforming mesh: same vertex count, same triangles
    pub fn update_mesh_vertices(&mut self, positions: &[Vec3]) -> Result<(), FluidError> {
        self.collider.update_vertices(positions)
    }

    /// Runs `iterations_per_frame` sub-steps, notifying observers after each.
    /// A non-finite sub-step restores the last completed one and drops the
    /// rest of the frame.
    pub fn advance_frame(&mut self, frame_delta: f32) -> Result<FrameReport, FluidError> {
        if self.run_state == RunState::Paused {
            return Ok(FrameReport {
                skipped: true,
                ..FrameReport::default()
            });
        }

        let dt = self.params.sub_step_delta(frame_delta);
        let sub_steps = self.params.iterations_per_frame;
        let ctx = StepContext {
            params: &self.params,
            bounds: &self.bounds,
            collider: &self.collider,
            dt,
        };

        for sub_step in 0..sub_steps {
            self.checkpoint.copy_from(&self.particles);
            if let Err(e) = self.pipeline.step(&mut self.particles, &ctx) {
                self.particles.copy_from(&self.checkpoint);
                error!(
                    "Fluid frame {} aborted at sub-step {}: {}",
                    self.frame, sub_step, e
                );
                if self.run_state == RunState::SingleStep {
                    self.run_state = RunState::Paused;
                }
                return Err(e);
            }
            self.total_steps += 1;

            let info = StepInfo {
                frame: self.frame,
                sub_step,
                sub_steps_per_frame: sub_steps,
                dt,
                total_steps: self.total_steps,
            };
            for observer in &mut self.observers {
                observer.step_completed(&info, &self.particles);
            }
        }

        self.frame += 1;
        if self.run_state == RunState::SingleStep {
            self.run_state = RunState::Paused;
            debug!("Single frame {} done, paused", self.frame);
        }

        Ok(FrameReport {
            steps: sub_steps,
            dt,
            skipped: false,
        })
    }
}
