use bytemuck::{Pod, Zeroable};

use crate::cpu::particles::{Particle, ParticleState};

/// One particle as a renderer reads it from a storage buffer.
///
/// 32 bytes, two 16-byte rows, so it matches a WGSL struct of
/// `vec3<f32>, f32, vec3<f32>, f32` without padding.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuParticle {
    // plain arrays instead of glam types for a fixed layout
    pub position: [f32; 3],
    pub density: f32,
    pub velocity: [f32; 3],
    pub near_density: f32,
}

impl From<Particle> for GpuParticle {
    fn from(p: Particle) -> Self {
        Self {
            position: p.position.to_array(),
            density: p.density.density,
            velocity: p.velocity.to_array(),
            near_density: p.density.near_density,
        }
    }
}

/// Convert the whole particle set.
pub fn gpu_particles(state: &ParticleState) -> Vec<GpuParticle> {
    state.iter().map(GpuParticle::from).collect()
}

/// Refill `out` with `state`, reusing its allocation.
pub fn write_gpu_particles(state: &ParticleState, out: &mut Vec<GpuParticle>) {
    out.clear();
    out.extend(state.iter().map(GpuParticle::from));
}
