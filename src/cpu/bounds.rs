// box boundary expressed through the bounds object's transform
use glam::{Affine3A, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::FluidError;

/// Half extent of the simulation box in its own local space.
const LOCAL_HALF_EXTENT: f32 = 0.5;

/// Position / scale / rotation of the simulation box.
///
/// In local space the box is the unit cube centred on the origin, so `scale`
/// is the full edge length along each local axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundsTransform {
    pub position: Vec3,
    pub scale: Vec3,
    pub rotation: Quat,
}

impl Default for BoundsTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            scale: Vec3::splat(4.0),
            rotation: Quat::IDENTITY,
        }
    }
}

impl BoundsTransform {
    /// Axis-aligned box centred at `position` with the given half extents.
    pub fn centered(position: Vec3, half_extents: Vec3) -> Self {
        Self {
            position,
            scale: half_extents * 2.0,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), FluidError> {
        let usable_scale = self.scale.is_finite() && self.scale.abs().min_element() > 1e-6;
        if !usable_scale {
            return Err(FluidError::InvalidParameter {
                name: "bounds.scale",
                reason: "must be finite and non-zero on every axis",
            });
        }
        if !self.position.is_finite() || !self.rotation.is_finite() || self.rotation.length() < 1e-6 {
            return Err(FluidError::InvalidParameter {
                name: "bounds",
                reason: "position and rotation must be finite",
            });
        }
        Ok(())
    }
}

/// World <-> local mapping for the simulation box.
#[derive(Clone, Copy, Debug)]
pub struct SimulationBounds {
    local_to_world: Affine3A,
    world_to_local: Affine3A,
}

impl SimulationBounds {
    pub fn new(transform: &BoundsTransform) -> Self {
        let local_to_world = Affine3A::from_scale_rotation_translation(
            transform.scale,
            transform.rotation.normalize(),
            transform.position,
        );
        Self {
            local_to_world,
            world_to_local: local_to_world.inverse(),
        }
    }

    #[inline]
    pub fn to_local(&self, point: Vec3) -> Vec3 {
        self.world_to_local.transform_point3(point)
    }

    #[inline]
    pub fn to_world(&self, point: Vec3) -> Vec3 {
        self.local_to_world.transform_point3(point)
    }

    /// True when `point` lies inside the box, grown by `tolerance` in local units.
    pub fn contains(&self, point: Vec3, tolerance: f32) -> bool {
        let local = self.to_local(point);
        local.abs().max_element() <= LOCAL_HALF_EXTENT + tolerance
    }

    /// Clamp a particle into the box and reflect the velocity components that
    /// push through a face, keeping `1 - damping` of their magnitude.
    pub fn resolve(&self, position: &mut Vec3, velocity: &mut Vec3, damping: f32) {
        let mut local = self.to_local(*position);
        if local.abs().max_element() <= LOCAL_HALF_EXTENT {
            return;
        }
        let mut local_vel = self.world_to_local.transform_vector3(*velocity);
        let restitution = 1.0 - damping;

        for axis in 0..3 {
            if local[axis].abs() > LOCAL_HALF_EXTENT {
                let side = local[axis].signum();
                local[axis] = LOCAL_HALF_EXTENT * side;
                // only flip motion heading out through this face
                if local_vel[axis] * side > 0.0 {
                    local_vel[axis] *= -restitution;
                }
            }
        }

        *position = self.to_world(local);
        *velocity = self.local_to_world.transform_vector3(local_vel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_and_reflects_floor_hit() {
        let bounds = SimulationBounds::new(&BoundsTransform::centered(Vec3::ZERO, Vec3::ONE));
        let mut pos = Vec3::new(0.2, -1.3, 0.0);
        let mut vel = Vec3::new(1.0, -4.0, 0.0);
        bounds.resolve(&mut pos, &mut vel, 0.25);

        assert!((pos.y + 1.0).abs() < 1e-6);
        assert!((pos.x - 0.2).abs() < 1e-6);
        assert!((vel.y - 3.0).abs() < 1e-5);
        assert!((vel.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn inward_motion_is_kept() {
        let bounds = SimulationBounds::new(&BoundsTransform::centered(Vec3::ZERO, Vec3::ONE));
        let mut pos = Vec3::new(1.1, 0.0, 0.0);
        let mut vel = Vec3::new(-2.0, 0.0, 0.0);
        bounds.resolve(&mut pos, &mut vel, 0.5);
        assert!((pos.x - 1.0).abs() < 1e-6);
        assert_eq!(vel.x, -2.0);
    }

    #[test]
    fn rotated_box_uses_local_faces() {
        let t = BoundsTransform::centered(Vec3::new(3.0, 0.0, 0.0), Vec3::ONE)
            .with_rotation(Quat::from_rotation_z(std::f32::consts::FRAC_PI_4));
        let bounds = SimulationBounds::new(&t);

        // corner direction of the unrotated box is outside once rotated by 45 degrees
        let corner = Vec3::new(3.9, 0.9, 0.0);
        assert!(!bounds.contains(corner, 0.0));

        let mut pos = corner;
        let mut vel = Vec3::ZERO;
        bounds.resolve(&mut pos, &mut vel, 0.0);
        assert!(bounds.contains(pos, 1e-5));
    }

    #[test]
    fn zero_scale_is_rejected() {
        let t = BoundsTransform {
            scale: Vec3::new(1.0, 0.0, 1.0),
            ..BoundsTransform::default()
        };
        assert!(t.validate().is_err());
    }
}
