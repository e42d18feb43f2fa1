// particle storage as parallel arrays (crate-private), read through `Particle`
use glam::Vec3;

use crate::error::FluidError;

/// Density and near-density of one particle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DensityPair {
    pub density: f32,
    pub near_density: f32,
}

/// Snapshot of one particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    pub predicted_position: Vec3,
    pub velocity: Vec3,
    pub density: DensityPair,
}

/// Initial positions and velocities handed over by a spawner.
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnData {
    points: Vec<Vec3>,
    velocities: Vec<Vec3>,
}

impl SpawnData {
    pub fn new(points: Vec<Vec3>, velocities: Vec<Vec3>) -> Result<Self, FluidError> {
        if points.is_empty() {
            return Err(FluidError::NoParticles);
        }
        if points.len() != velocities.len() {
            return Err(FluidError::LengthMismatch {
                what: "spawn velocities",
                expected: points.len(),
                actual: velocities.len(),
            });
        }
        Ok(Self { points, velocities })
    }

    /// Particles at rest.
    pub fn at_rest(points: Vec<Vec3>) -> Result<Self, FluidError> {
        let velocities = vec![Vec3::ZERO; points.len()];
        Self::new(points, velocities)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    pub fn velocities(&self) -> &[Vec3] {
        &self.velocities
    }
}

/// Anything able to produce the initial particle set.
pub trait ParticleSpawner {
    fn spawn(&self) -> Result<SpawnData, FluidError>;
}

impl ParticleSpawner for SpawnData {
    fn spawn(&self) -> Result<SpawnData, FluidError> {
        Ok(self.clone())
    }
}

/// Fills an axis-aligned block with particles on a regular lattice.
#[derive(Clone, Copy, Debug)]
pub struct BlockSpawner {
    pub origin: Vec3,
    pub counts: [u32; 3],
    pub spacing: f32,
    pub initial_velocity: Vec3,
}

impl BlockSpawner {
    /// Block of `counts` particles centred on `center`.
    pub fn centered(center: Vec3, counts: [u32; 3], spacing: f32) -> Self {
        let extent = Vec3::new(
            counts[0].saturating_sub(1) as f32,
            counts[1].saturating_sub(1) as f32,
            counts[2].saturating_sub(1) as f32,
        ) * spacing;
        Self {
            origin: center - extent * 0.5,
            counts,
            spacing,
            initial_velocity: Vec3::ZERO,
        }
    }
}

impl ParticleSpawner for BlockSpawner {
    fn spawn(&self) -> Result<SpawnData, FluidError> {
        let [nx, ny, nz] = self.counts;
        let total = nx as usize * ny as usize * nz as usize;
        let mut points = Vec::with_capacity(total);
        // x fastest, then y, then z
        for iz in 0..nz {
            for iy in 0..ny {
                for ix in 0..nx {
                    let offset = Vec3::new(ix as f32, iy as f32, iz as f32) * self.spacing;
                    points.push(self.origin + offset);
                }
            }
        }
        let velocities = vec![self.initial_velocity; points.len()];
        SpawnData::new(points, velocities)
    }
}

/// Owner of all per-particle arrays.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleState {
    pub(crate) positions: Vec<Vec3>,
    pub(crate) predicted: Vec<Vec3>,
    pub(crate) velocities: Vec<Vec3>,
    pub(crate) densities: Vec<DensityPair>,
}

impl ParticleState {
    pub fn from_spawn(spawn: &SpawnData) -> Self {
        let n = spawn.len();
        let mut state = Self {
            positions: vec![Vec3::ZERO; n],
            predicted: vec![Vec3::ZERO; n],
            velocities: vec![Vec3::ZERO; n],
            densities: vec![DensityPair::default(); n],
        };
        state.copy_from_spawn(spawn);
        state
    }

    /// Re-seed every particle from `spawn` without reallocating.
    pub fn reset(&mut self, spawn: &SpawnData) -> Result<(), FluidError> {
        if spawn.len() != self.len() {
            return Err(FluidError::LengthMismatch {
                what: "reset spawn data",
                expected: self.len(),
                actual: spawn.len(),
            });
        }
        self.copy_from_spawn(spawn);
        Ok(())
    }

    fn copy_from_spawn(&mut self, spawn: &SpawnData) {
        self.positions.copy_from_slice(spawn.points());
        self.predicted.copy_from_slice(spawn.points());
        self.velocities.copy_from_slice(spawn.velocities());
        self.densities.fill(DensityPair::default());
    }

    /// Overwrite this state with `other` in place. Both must hold the same count.
    pub(crate) fn copy_from(&mut self, other: &ParticleState) {
        self.positions.copy_from_slice(&other.positions);
        self.predicted.copy_from_slice(&other.predicted);
        self.velocities.copy_from_slice(&other.velocities);
        self.densities.copy_from_slice(&other.densities);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Particle> {
        Some(Particle {
            position: *self.positions.get(index)?,
            predicted_position: self.predicted[index],
            velocity: self.velocities[index],
            density: self.densities[index],
        })
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = Particle> + '_ {
        (0..self.len()).map(|i| Particle {
            position: self.positions[i],
            predicted_position: self.predicted[i],
            velocity: self.velocities[i],
            density: self.densities[i],
        })
    }

    /// Sum of all velocities (unit particle mass).
    pub fn total_momentum(&self) -> Vec3 {
        self.velocities.iter().copied().sum()
    }

    /// Index of the first particle holding a NaN or infinite value.
    pub(crate) fn first_non_finite(&self) -> Option<usize> {
        (0..self.len()).find(|&i| !(self.positions[i].is_finite() && self.velocities[i].is_finite()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_spawner_lays_out_lattice() {
        let spawner = BlockSpawner {
            origin: Vec3::ZERO,
            counts: [10, 5, 2],
            spacing: 0.12,
            initial_velocity: Vec3::ZERO,
        };
        let spawn = spawner.spawn().unwrap();
        assert_eq!(spawn.len(), 100);
        assert_eq!(spawn.points()[0], Vec3::ZERO);
        assert_eq!(spawn.points()[1], Vec3::new(0.12, 0.0, 0.0));
        assert_eq!(spawn.points()[10], Vec3::new(0.0, 0.12, 0.0));
        assert_eq!(spawn.points()[50], Vec3::new(0.0, 0.0, 0.12));
    }

    #[test]
    fn centered_block_is_symmetric() {
        let spawn = BlockSpawner::centered(Vec3::ONE, [3, 3, 3], 0.5).spawn().unwrap();
        let mean: Vec3 = spawn.points().iter().copied().sum::<Vec3>() / spawn.len() as f32;
        assert!((mean - Vec3::ONE).length() < 1e-6);
    }

    #[test]
    fn spawn_rejects_bad_input() {
        assert!(matches!(SpawnData::at_rest(vec![]), Err(FluidError::NoParticles)));
        assert!(matches!(
            SpawnData::new(vec![Vec3::ZERO; 3], vec![Vec3::ZERO; 2]),
            Err(FluidError::LengthMismatch { expected: 3, actual: 2, .. })
        ));
    }

    #[test]
    fn reset_restores_spawn() {
        let spawn = SpawnData::new(vec![Vec3::X, Vec3::Y], vec![Vec3::Z, Vec3::ZERO]).unwrap();
        let mut state = ParticleState::from_spawn(&spawn);
        state.positions[0] = Vec3::splat(9.0);
        state.densities[1].density = 3.0;

        state.reset(&spawn).unwrap();
        let p = state.get(0).unwrap();
        assert_eq!(p.position, Vec3::X);
        assert_eq!(p.predicted_position, Vec3::X);
        assert_eq!(p.velocity, Vec3::Z);
        assert_eq!(state.get(1).unwrap().density, DensityPair::default());
        assert!(state.get(2).is_none());
    }
}
