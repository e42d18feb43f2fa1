// tunables, editable at runtime and loadable from JSON
use bevy::prelude::Resource;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::cpu::bounds::BoundsTransform;
use crate::error::{check_smoothing_radius, FluidError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum TimeStepMode {
    #[default]
    Variable, // host frame delta, clamped to max_frame_delta
    Fixed { frame_delta: f32 },
}

#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluidParams {
    pub gravity: Vec3,
    // fraction of normal velocity lost per collision, [0, 1]
    pub collision_damping: f32,
    // kernel support and hash cell size
    pub smoothing_radius: f32,
    pub target_density: f32,
    pub pressure_multiplier: f32,
    pub near_pressure_multiplier: f32,
    pub viscosity_strength: f32,

    pub wind_direction: Vec3,
    pub wind_strength: f32,
    // wind volume, in the bounds' local space
    pub wind_area_min: Vec3,
    pub wind_area_max: Vec3,

    pub bounds: BoundsTransform,

    pub iterations_per_frame: u32,
    pub time_scale: f32,
    pub time_step_mode: TimeStepMode,
    pub max_frame_delta: Option<f32>,
    pub prediction_lookahead: f32,
}

impl Default for FluidParams {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            collision_damping: 0.05,
            smoothing_radius: 0.2,
            target_density: 630.0,
            pressure_multiplier: 288.0,
            near_pressure_multiplier: 2.25,
            viscosity_strength: 0.001,
            wind_direction: Vec3::X,
            wind_strength: 0.0,
            wind_area_min: Vec3::splat(-0.5),
            wind_area_max: Vec3::splat(0.5),
            bounds: BoundsTransform::default(),
            iterations_per_frame: 3,
            time_scale: 1.0,
            time_step_mode: TimeStepMode::Variable,
            max_frame_delta: Some(1.0 / 60.0),
            prediction_lookahead: 1.0 / 120.0,
        }
    }
}

impl FluidParams {
    pub fn water() -> Self {
        Self::default()
    }

    pub fn viscous() -> Self {
        Self {
            viscosity_strength: 0.06,
            pressure_multiplier: 180.0,
            collision_damping: 0.3,
            ..Self::default()
        }
    }

    /// Parse parameters from a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, FluidError> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_json(&self) -> Result<String, FluidError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_smoothing_radius(mut self, smoothing_radius: f32) -> Self {
        self.smoothing_radius = smoothing_radius;
        self
    }

    pub fn with_bounds(mut self, bounds: BoundsTransform) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_iterations_per_frame(mut self, iterations: u32) -> Self {
        self.iterations_per_frame = iterations;
        self
    }

    pub fn with_time_step_mode(mut self, mode: TimeStepMode) -> Self {
        self.time_step_mode = mode;
        self
    }

    /// Sub-step length for a frame that took `frame_delta` seconds on the host.
    pub fn sub_step_delta(&self, frame_delta: f32) -> f32 {
        let frame = match self.time_step_mode {
            TimeStepMode::Variable => match self.max_frame_delta {
                Some(max) => frame_delta.min(max),
                None => frame_delta,
            },
            TimeStepMode::Fixed { frame_delta } => frame_delta,
        };
        frame.max(0.0) / self.iterations_per_frame.max(1) as f32 * self.time_scale
    }

    pub fn validate(&self) -> Result<(), FluidError> {
        check_smoothing_radius(self.smoothing_radius)?;

        if !(0.0..=1.0).contains(&self.collision_damping) {
            return Err(invalid("collision_damping", "must lie in [0, 1]"));
        }
        if self.iterations_per_frame == 0 {
            return Err(invalid("iterations_per_frame", "must be at least 1"));
        }
        if !self.time_scale.is_finite() || self.time_scale < 0.0 {
            return Err(invalid("time_scale", "must be finite and non-negative"));
        }
        if let TimeStepMode::Fixed { frame_delta } = self.time_step_mode {
            if !frame_delta.is_finite() || frame_delta <= 0.0 {
                return Err(invalid("time_step_mode", "fixed frame delta must be positive"));
            }
        }
        if let Some(max) = self.max_frame_delta {
            if !max.is_finite() || max <= 0.0 {
                return Err(invalid("max_frame_delta", "must be positive when set"));
            }
        }
        if !self.prediction_lookahead.is_finite() || self.prediction_lookahead < 0.0 {
            return Err(invalid("prediction_lookahead", "must be finite and non-negative"));
        }
        let scalars = [
            self.target_density,
            self.pressure_multiplier,
            self.near_pressure_multiplier,
            self.viscosity_strength,
            self.wind_strength,
        ];
        if scalars.iter().any(|v| !v.is_finite()) || !self.gravity.is_finite() {
            return Err(invalid("fluid", "pressure, viscosity, wind and gravity must be finite"));
        }
        if self.wind_area_min.cmpgt(self.wind_area_max).any() {
            return Err(invalid("wind_area_min", "must not exceed wind_area_max"));
        }
        self.bounds.validate()?;
        Ok(())
    }
}

fn invalid(name: &'static str, reason: &'static str) -> FluidError {
    FluidError::InvalidParameter { name, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(FluidParams::default().validate().is_ok());
        assert!(FluidParams::viscous().validate().is_ok());
    }

    #[test]
    fn rejects_bad_radius_and_damping() {
        let p = FluidParams::default().with_smoothing_radius(0.0);
        assert!(matches!(p.validate(), Err(FluidError::InvalidSmoothingRadius(_))));

        let p = FluidParams {
            collision_damping: 1.5,
            ..FluidParams::default()
        };
        assert!(matches!(
            p.validate(),
            Err(FluidError::InvalidParameter { name: "collision_damping", .. })
        ));
    }

    #[test]
    fn sub_step_splits_frame() {
        let p = FluidParams {
            iterations_per_frame: 4,
            time_scale: 0.5,
            max_frame_delta: None,
            ..FluidParams::default()
        };
        assert!((p.sub_step_delta(0.04) - 0.005).abs() < 1e-7);

        let fixed = p.with_time_step_mode(TimeStepMode::Fixed { frame_delta: 0.02 });
        assert!((fixed.sub_step_delta(10.0) - 0.0025).abs() < 1e-7);
    }

    #[test]
    fn frame_delta_is_clamped() {
        let p = FluidParams {
            iterations_per_frame: 1,
            max_frame_delta: Some(0.01),
            ..FluidParams::default()
        };
        assert_eq!(p.sub_step_delta(1.0), 0.01);
    }

    #[test]
    fn json_fills_missing_fields() {
        let p = FluidParams::from_json(r#"{ "smoothing_radius": 0.35 }"#).unwrap();
        assert_eq!(p.smoothing_radius, 0.35);
        assert_eq!(p.iterations_per_frame, FluidParams::default().iterations_per_frame);

        let back = FluidParams::from_json(&p.to_json().unwrap()).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn json_errors_are_reported() {
        assert!(matches!(FluidParams::from_json("{ nope"), Err(FluidError::Config(_))));
    }
}
