pub mod error;
pub mod params;
pub mod plugin;
pub mod simulation;

pub mod cpu {
    pub mod bounds;
    pub mod collision;
    pub mod kernels;
    pub mod mesh;
    pub mod particles;
    pub mod pipeline;
    pub mod spatial_hash;
}

pub mod gpu {
    pub mod ffi;
}

pub use cpu::bounds::{BoundsTransform, SimulationBounds};
pub use cpu::mesh::{MeshInput, MeshProvider};
pub use cpu::particles::{BlockSpawner, Particle, ParticleSpawner, ParticleState, SpawnData};
pub use error::FluidError;
pub use params::{FluidParams, TimeStepMode};
pub use plugin::{FluidBounds, FluidPlugin, ParticleUploadBuffer, StepCompleted};
pub use simulation::{FluidSimulation, FrameReport, RunState, StepInfo, StepObserver};
