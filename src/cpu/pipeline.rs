// one SPH sub-step: forces -> hash -> density -> pressure -> viscosity -> integrate
// every stage is a parallel pass that finishes before the next one starts
use glam::Vec3;
use rayon::prelude::*;

use super::bounds::SimulationBounds;
use super::collision::MeshCollider;
use super::kernels::SphKernels;
use super::particles::{DensityPair, ParticleState};
use super::spatial_hash::SpatialHashGrid;
use crate::error::FluidError;
use crate::params::FluidParams;

// densities below this are left out of the pressure divisions
pub const DENSITY_EPSILON: f32 = 1e-6;

pub struct StepContext<'a> {
    pub params: &'a FluidParams,
    pub bounds: &'a SimulationBounds,
    pub collider: &'a MeshCollider,
    pub dt: f32,
}

#[derive(Clone, Debug)]
pub struct SphPipeline {
    grid: SpatialHashGrid,
}

impl SphPipeline {
    pub fn new(num_particles: usize, smoothing_radius: f32) -> Result<Self, FluidError> {
        Ok(Self {
            grid: SpatialHashGrid::new(num_particles, smoothing_radius)?,
        })
    }

    // built on the predicted positions of the last sub-step
    pub fn grid(&self) -> &SpatialHashGrid {
        &self.grid
    }

    pub fn set_smoothing_radius(&mut self, smoothing_radius: f32) -> Result<(), FluidError> {
        self.grid.set_cell_size(smoothing_radius)
    }

    // NaN/inf comes back as NonFiniteState, rollback is up to the caller
    pub fn step(&mut self, particles: &mut ParticleState, ctx: &StepContext) -> Result<(), FluidError> {
        let h = ctx.params.smoothing_radius;
        if self.grid.cell_size() != h {
            self.grid.set_cell_size(h)?;
        }
        let kernels = SphKernels::new(h);

        apply_external_forces(particles, ctx);
        self.grid.rebuild(&particles.predicted)?;
        compute_densities(particles, &self.grid, &kernels);
        apply_pressure_forces(particles, &self.grid, &kernels, ctx.params, ctx.dt);
        apply_viscosity(particles, &self.grid, &kernels, ctx.params, ctx.dt);
        integrate(particles, ctx);

        match particles.first_non_finite() {
            Some(index) => Err(FluidError::NonFiniteState { index }),
            None => Ok(()),
        }
    }
}

fn apply_external_forces(particles: &mut ParticleState, ctx: &StepContext) {
    let params = ctx.params;
    let dt = ctx.dt;
    let gravity = params.gravity;
    let wind = params.wind_direction.normalize_or_zero() * params.wind_strength;
    let (wind_min, wind_max) = (params.wind_area_min, params.wind_area_max);
    let lookahead = params.prediction_lookahead;
    let bounds = ctx.bounds;

    let ParticleState {
        positions,
        predicted,
        velocities,
        ..
    } = particles;

    velocities
        .par_iter_mut()
        .zip(predicted.par_iter_mut())
        .zip(positions.par_iter())
        .for_each(|((vel, predicted), &pos)| {
            *vel += gravity * dt;
            if wind != Vec3::ZERO {
                // wind volume is tested against last sub-step's prediction
                let local = bounds.to_local(*predicted);
                if local.cmpge(wind_min).all() && local.cmple(wind_max).all() {
                    *vel += wind * dt;
                }
            }
            *predicted = pos + *vel * lookahead;
        });
}

fn compute_densities(particles: &mut ParticleState, grid: &SpatialHashGrid, kernels: &SphKernels) {
    let h = kernels.radius();
    let ParticleState {
        predicted,
        densities,
        ..
    } = particles;
    let predicted: &[Vec3] = predicted;

    densities.par_iter_mut().enumerate().for_each(|(i, out)| {
        let pos = predicted[i];
        let mut pair = DensityPair::default();
        grid.for_each_neighbor(pos, |j| {
            let dst = (predicted[j] - pos).length();
            if dst < h {
                pair.density += kernels.poly6(dst);
                pair.near_density += kernels.spiky_pow3(dst);
            }
        });
        *out = pair;
    });
}

// direction for two particles sitting on the same spot; antisymmetric in (i, j)
#[inline]
fn coincident_direction(i: usize, j: usize) -> Vec3 {
    if i < j { Vec3::Y } else { Vec3::NEG_Y }
}

fn apply_pressure_forces(
    particles: &mut ParticleState,
    grid: &SpatialHashGrid,
    kernels: &SphKernels,
    params: &FluidParams,
    dt: f32,
) {
    let h2 = kernels.radius() * kernels.radius();
    let eos = |d: DensityPair| {
        (
            params.pressure_multiplier * (d.density - params.target_density),
            params.near_pressure_multiplier * d.near_density,
        )
    };

    let ParticleState {
        predicted,
        velocities,
        densities,
        ..
    } = particles;
    let predicted: &[Vec3] = predicted;
    let densities: &[DensityPair] = densities;

    velocities.par_iter_mut().enumerate().for_each(|(i, vel)| {
        let own = densities[i];
        if own.density < DENSITY_EPSILON {
            return;
        }
        let (pressure, near_pressure) = eos(own);
        let pos = predicted[i];
        let mut force = Vec3::ZERO;

        grid.for_each_neighbor(pos, |j| {
            if j == i {
                return;
            }
            let offset = predicted[j] - pos;
            let dst2 = offset.length_squared();
            let other = densities[j];
            if dst2 >= h2 || other.density < DENSITY_EPSILON {
                return;
            }
            let dst = dst2.sqrt();
            let dir = if dst > 0.0 {
                offset / dst
            } else {
                coincident_direction(i, j)
            };
            let (other_pressure, other_near) = eos(other);
            let shared = 0.5 * (pressure + other_pressure);
            let shared_near = 0.5 * (near_pressure + other_near);
            // both terms divide by the neighbor's density so the pair force is antisymmetric
            let magnitude = kernels.spiky_pow2_derivative(dst) * shared
                + kernels.spiky_pow3_derivative(dst) * shared_near;
            force += dir * (magnitude / other.density);
        });

        *vel += force / own.density * dt;
    });
}

fn apply_viscosity(
    particles: &mut ParticleState,
    grid: &SpatialHashGrid,
    kernels: &SphKernels,
    params: &FluidParams,
    dt: f32,
) {
    if params.viscosity_strength == 0.0 {
        return;
    }
    let h = kernels.radius();
    let scale = params.viscosity_strength * dt;

    let ParticleState {
        predicted,
        velocities,
        ..
    } = particles;
    let predicted: &[Vec3] = predicted;

    // read from a snapshot of the velocities so the pass is order independent
    let deltas: Vec<Vec3> = {
        let velocities: &[Vec3] = velocities;
        (0..velocities.len())
            .into_par_iter()
            .map(|i| {
                let pos = predicted[i];
                let vel = velocities[i];
                let mut force = Vec3::ZERO;
                grid.for_each_neighbor(pos, |j| {
                    if j == i {
                        return;
                    }
                    let dst = (predicted[j] - pos).length();
                    if dst < h {
                        force += (velocities[j] - vel) * kernels.poly6(dst);
                    }
                });
                force * scale
            })
            .collect()
    };

    velocities
        .par_iter_mut()
        .zip(deltas.par_iter())
        .for_each(|(vel, delta)| *vel += *delta);
}

fn integrate(particles: &mut ParticleState, ctx: &StepContext) {
    let dt = ctx.dt;
    let damping = ctx.params.collision_damping;
    let restitution = 1.0 - damping;
    let collider = ctx.collider;
    let bounds = ctx.bounds;

    let ParticleState {
        positions,
        velocities,
        ..
    } = particles;

    positions
        .par_iter_mut()
        .zip(velocities.par_iter_mut())
        .for_each(|(pos, vel)| {
            *pos += *vel * dt;
            // leave it non-finite for the check after the pass
            if !pos.is_finite() || !vel.is_finite() {
                return;
            }

            if let Some(contact) = collider.query(*pos) {
                *pos += contact.normal * contact.penetration;
                let normal_speed = vel.dot(contact.normal);
                if normal_speed < 0.0 {
                    *vel -= contact.normal * (normal_speed * (1.0 + restitution));
                }
            }
            // box last, so containment holds whatever the mesh did
            bounds.resolve(pos, vel, damping);
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::bounds::BoundsTransform;
    use crate::cpu::mesh::MeshInput;
    use crate::cpu::particles::{BlockSpawner, ParticleSpawner, SpawnData};

    fn far_away_collider(h: f32) -> MeshCollider {
        let input = MeshInput::new(
            vec![Vec3::splat(100.0), Vec3::new(101.0, 100.0, 100.0), Vec3::new(100.0, 100.0, 101.0)],
            vec![0, 1, 2],
        );
        MeshCollider::new(&input, h).unwrap()
    }

    fn still_params(h: f32) -> FluidParams {
        FluidParams {
            gravity: Vec3::ZERO,
            smoothing_radius: h,
            viscosity_strength: 0.0,
            ..FluidParams::default()
        }
    }

    fn densities_for(state: &mut ParticleState, h: f32) -> SpatialHashGrid {
        let mut grid = SpatialHashGrid::new(state.len(), h).unwrap();
        grid.rebuild(&state.predicted).unwrap();
        compute_densities(state, &grid, &SphKernels::new(h));
        grid
    }

    #[test]
    fn density_includes_self_and_neighbors() {
        let h = 0.2;
        let spawn = SpawnData::at_rest(vec![Vec3::ZERO, Vec3::new(0.1, 0.0, 0.0), Vec3::splat(5.0)]).unwrap();
        let mut state = ParticleState::from_spawn(&spawn);
        densities_for(&mut state, h);

        let k = SphKernels::new(h);
        let d0 = state.get(0).unwrap().density;
        assert!((d0.density - (k.poly6(0.0) + k.poly6(0.1))).abs() < 1e-3);
        assert!((d0.near_density - (k.spiky_pow3(0.0) + k.spiky_pow3(0.1))).abs() < 1e-3);

        let lonely = state.get(2).unwrap().density;
        assert!((lonely.density - k.poly6(0.0)).abs() < 1e-3);
    }

    #[test]
    fn pressure_pair_is_antisymmetric() {
        let h = 0.2;
        let params = FluidParams {
            target_density: 0.0,
            pressure_multiplier: 10.0,
            near_pressure_multiplier: 1.0,
            ..still_params(h)
        };
        let spawn = SpawnData::at_rest(vec![Vec3::new(0.01, 0.02, 0.0), Vec3::new(0.09, -0.01, 0.03)]).unwrap();
        let mut state = ParticleState::from_spawn(&spawn);
        let grid = densities_for(&mut state, h);
        apply_pressure_forces(&mut state, &grid, &SphKernels::new(h), &params, 0.01);

        let a = state.get(0).unwrap().velocity;
        let b = state.get(1).unwrap().velocity;
        assert!(a.length() > 0.0);
        assert!((a + b).length() < 1e-5 * a.length());
        // repulsive: a moves away from b
        assert!(a.dot(Vec3::new(0.08, -0.03, 0.03)) < 0.0);
    }

    #[test]
    fn coincident_particles_are_pushed_apart() {
        let h = 0.2;
        let params = FluidParams {
            target_density: 0.0,
            ..still_params(h)
        };
        let spawn = SpawnData::at_rest(vec![Vec3::ZERO, Vec3::ZERO]).unwrap();
        let mut state = ParticleState::from_spawn(&spawn);
        let grid = densities_for(&mut state, h);
        apply_pressure_forces(&mut state, &grid, &SphKernels::new(h), &params, 0.01);
        let a = state.get(0).unwrap().velocity;
        let b = state.get(1).unwrap().velocity;
        assert!(a.is_finite() && b.is_finite());
        assert_eq!(a, -b);
    }

    #[test]
    fn uniform_lattice_at_target_density_is_at_rest() {
        let h = 0.2;
        let spawn = BlockSpawner::centered(Vec3::ZERO, [9, 9, 9], 0.1).spawn().unwrap();
        let mut state = ParticleState::from_spawn(&spawn);
        let grid = densities_for(&mut state, h);

        let center = 4 + 4 * 9 + 4 * 81;
        assert_eq!(state.get(center).unwrap().position, Vec3::ZERO);
        let params = FluidParams {
            target_density: state.get(center).unwrap().density.density,
            ..still_params(h)
        };
        apply_pressure_forces(&mut state, &grid, &SphKernels::new(h), &params, 0.01);

        let kick = state.get(center).unwrap().velocity.length();
        assert!(kick < 1e-3, "interior particle accelerated by {kick}");
    }

    #[test]
    fn viscosity_relaxes_relative_motion() {
        let h = 0.2;
        let params = FluidParams {
            viscosity_strength: 0.5,
            ..still_params(h)
        };
        let spawn = SpawnData::new(
            vec![Vec3::ZERO, Vec3::new(0.05, 0.0, 0.0)],
            vec![Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, -1.0, 0.0)],
        )
        .unwrap();
        let mut state = ParticleState::from_spawn(&spawn);
        let grid = densities_for(&mut state, h);
        apply_viscosity(&mut state, &grid, &SphKernels::new(h), &params, 0.001);

        let a = state.get(0).unwrap().velocity;
        let b = state.get(1).unwrap().velocity;
        assert!(a.y < 1.0 && a.y > 0.0);
        assert!((a + b).length() < 1e-5);
    }

    #[test]
    fn wind_only_blows_inside_its_volume() {
        let h = 0.2;
        let params = FluidParams {
            wind_direction: Vec3::new(2.0, 0.0, 0.0),
            wind_strength: 3.0,
            wind_area_min: Vec3::new(-0.5, -0.5, -0.5),
            wind_area_max: Vec3::new(0.0, 0.5, 0.5),
            prediction_lookahead: 0.5,
            ..still_params(h)
        };
        let bounds = SimulationBounds::new(&BoundsTransform::centered(Vec3::ZERO, Vec3::ONE));
        let collider = far_away_collider(h);
        let ctx = StepContext {
            params: &params,
            bounds: &bounds,
            collider: &collider,
            dt: 0.1,
        };
        // local space is world / 2, so x = -0.4 is inside and x = 0.4 is not
        let spawn = SpawnData::at_rest(vec![Vec3::new(-0.4, 0.0, 0.0), Vec3::new(0.4, 0.0, 0.0)]).unwrap();
        let mut state = ParticleState::from_spawn(&spawn);
        apply_external_forces(&mut state, &ctx);

        let inside = state.get(0).unwrap();
        assert!((inside.velocity - Vec3::new(0.3, 0.0, 0.0)).length() < 1e-6);
        assert!((inside.predicted_position - Vec3::new(-0.25, 0.0, 0.0)).length() < 1e-6);
        assert_eq!(state.get(1).unwrap().velocity, Vec3::ZERO);
    }

    #[test]
    fn integration_stops_on_mesh_surface() {
        let h = 0.1;
        let params = still_params(h);
        let bounds = SimulationBounds::new(&BoundsTransform::centered(Vec3::ZERO, Vec3::splat(2.0)));
        let collider = MeshCollider::new(&MeshInput::floor_quad(0.0, 0.05), h).unwrap();
        let ctx = StepContext {
            params: &params,
            bounds: &bounds,
            collider: &collider,
            dt: 0.01,
        };
        let spawn = SpawnData::new(vec![Vec3::new(0.0, 0.12, 0.0)], vec![Vec3::new(0.0, -5.0, 0.0)]).unwrap();
        let mut state = ParticleState::from_spawn(&spawn);
        integrate(&mut state, &ctx);

        let p = state.get(0).unwrap();
        assert!((p.position.y - h).abs() < 1e-5);
        // normal speed reflected with (1 - damping)
        let expected = 5.0 * (1.0 - params.collision_damping);
        assert!((p.velocity.y - expected).abs() < 1e-4);
    }
}
