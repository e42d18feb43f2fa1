use bevy::prelude::*;

use crate::cpu::bounds::BoundsTransform;
use crate::gpu::ffi::{write_gpu_particles, GpuParticle};
use crate::simulation::FluidSimulation;

// ==================== components / resources / events ================

/// Marks the entity whose `Transform` places the simulation box.
#[derive(Component, Default)]
pub struct FluidBounds;

// one per finished sub-step, including those of an aborted frame
#[derive(Event, Clone, Copy, Debug, PartialEq)]
pub struct StepCompleted {
    pub frame: u64,
    pub sub_step: u32,
    pub dt: f32,
}

/// CPU-side copy of the particles, laid out for a storage buffer.
#[derive(Resource, Default)]
pub struct ParticleUploadBuffer {
    pub particles: Vec<GpuParticle>,
}

impl ParticleUploadBuffer {
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Raw bytes, ready for `RenderQueue::write_buffer`.
    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.particles)
    }
}

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct FluidSet;

// =====================================================================

// ========================== systems ==================================

// bevy's Transform is built on its own glam, so go through arrays
fn bounds_from_transform(transform: &Transform) -> BoundsTransform {
    BoundsTransform {
        position: glam::Vec3::from_array(transform.translation.to_array()),
        scale: glam::Vec3::from_array(transform.scale.to_array()),
        rotation: glam::Quat::from_array(transform.rotation.to_array()),
    }
}

fn sync_bounds(
    sim: Option<ResMut<FluidSimulation>>,
    bounds: Query<&Transform, (With<FluidBounds>, Changed<Transform>)>,
) {
    let (Some(mut sim), Ok(transform)) = (sim, bounds.single()) else {
        return;
    };
    if let Err(e) = sim.set_bounds(bounds_from_transform(transform)) {
        warn!("Ignoring fluid bounds transform: {}", e);
    }
}

fn advance_fluid(
    sim: Option<ResMut<FluidSimulation>>,
    time: Res<Time>,
    mut completed_events: EventWriter<StepCompleted>,
) {
    let Some(mut sim) = sim else {
        return;
    };
    let frame_delta = time.delta_secs();
    let frame = sim.frame();
    let first_step = sim.total_steps();
    let dt = sim.params().sub_step_delta(frame_delta);

    let result = sim.advance_frame(frame_delta);

    // an aborted frame still keeps the sub-steps it completed
    let completed = sim.total_steps().saturating_sub(first_step) as u32;
    for sub_step in 0..completed {
        completed_events.write(StepCompleted { frame, sub_step, dt });
    }
    if let Err(e) = result {
        error!("Fluid step failed: {}", e);
    }
}

fn queue_particle_upload(
    sim: Option<Res<FluidSimulation>>,
    mut upload: ResMut<ParticleUploadBuffer>,
) {
    let Some(sim) = sim else {
        return;
    };
    if !sim.is_changed() && !upload.is_empty() {
        return;
    }
    write_gpu_particles(sim.particles(), &mut upload.particles);
}

// =====================================================================

// Plugin

/// Drives a [`FluidSimulation`] resource from the app's `Time`.
///
/// Insert the simulation yourself; the systems do nothing without it.
pub struct FluidPlugin;

impl Plugin for FluidPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<StepCompleted>()
            .init_resource::<ParticleUploadBuffer>()
            .add_systems(
                Update,
                (sync_bounds, advance_fluid, queue_particle_upload)
                    .chain()
                    .in_set(FluidSet),
            );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::mesh::MeshInput;
    use crate::cpu::particles::{BlockSpawner, ParticleSpawner, SpawnData};
    use crate::params::FluidParams;

    fn app_with_sim() -> App {
        let spawn = BlockSpawner::centered(glam::Vec3::ZERO, [4, 4, 4], 0.1).spawn().unwrap();
        let sim = FluidSimulation::new(FluidParams::default(), &spawn, &MeshInput::floor_quad(-5.0, 0.1))
            .unwrap();
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .add_plugins(FluidPlugin)
            .insert_resource(sim);
        app
    }

    #[test]
    fn advances_and_publishes_particles() {
        let mut app = app_with_sim();
        app.update();

        let sim = app.world().resource::<FluidSimulation>();
        assert_eq!(sim.frame(), 1);
        let steps = sim.params().iterations_per_frame as usize;
        assert_eq!(app.world().resource::<ParticleUploadBuffer>().len(), 64);
        assert_eq!(app.world().resource::<ParticleUploadBuffer>().bytes().len(), 64 * 32);
        assert_eq!(app.world().resource::<Events<StepCompleted>>().len(), steps);
    }

    #[test]
    fn paused_simulation_sends_nothing() {
        let mut app = app_with_sim();
        app.world_mut().resource_mut::<FluidSimulation>().pause();
        app.update();
        assert_eq!(app.world().resource::<FluidSimulation>().frame(), 0);
        assert!(app.world().resource::<Events<StepCompleted>>().is_empty());
    }

    #[test]
    fn failed_frame_sends_only_finished_steps() {
        let spawn = SpawnData::at_rest(vec![glam::Vec3::ZERO, glam::Vec3::splat(0.01)]).unwrap();
        let params = FluidParams {
            pressure_multiplier: 1e36,
            ..FluidParams::default()
        };
        let sim = FluidSimulation::new(params, &spawn, &MeshInput::floor_quad(-5.0, 0.1)).unwrap();
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .add_plugins(FluidPlugin)
            .insert_resource(sim);
        app.update();

        let sim = app.world().resource::<FluidSimulation>();
        assert_eq!(sim.frame(), 0);
        let sent = app.world().resource::<Events<StepCompleted>>().len();
        assert_eq!(sent as u64, sim.total_steps());
        assert_eq!(app.world().resource::<ParticleUploadBuffer>().particles[0].position, [0.0; 3]);
    }

    #[test]
    fn bounds_follow_marked_transform() {
        let mut app = app_with_sim();
        app.world_mut().spawn((
            FluidBounds,
            Transform::from_xyz(1.0, 2.0, 3.0).with_scale(Vec3::splat(6.0)),
        ));
        app.update();

        let bounds = app.world().resource::<FluidSimulation>().params().bounds;
        assert_eq!(bounds.position, glam::Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(bounds.scale, glam::Vec3::splat(6.0));
    }
}
