// smoothing kernels in 3D, all normalized and zero outside the support radius h
use std::f32::consts::PI;

/// Kernel set for one smoothing radius, with the normalization constants
/// computed once.
#[derive(Clone, Copy, Debug)]
pub struct SphKernels {
    h: f32,
    h2: f32,
    poly6: f32,
    poly6_deriv: f32,
    spiky_pow2: f32,
    spiky_pow2_deriv: f32,
    spiky_pow3: f32,
    spiky_pow3_deriv: f32,
}

impl SphKernels {
    pub fn new(h: f32) -> Self {
        Self {
            h,
            h2: h * h,
            poly6: 315.0 / (64.0 * PI * h.powi(9)),
            poly6_deriv: -945.0 / (32.0 * PI * h.powi(9)),
            spiky_pow2: 15.0 / (2.0 * PI * h.powi(5)),
            spiky_pow2_deriv: -15.0 / (PI * h.powi(5)),
            spiky_pow3: 15.0 / (PI * h.powi(6)),
            spiky_pow3_deriv: -45.0 / (PI * h.powi(6)),
        }
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.h
    }

    /// Poly6, used for density and viscosity smoothing.
    #[inline]
    pub fn poly6(&self, r: f32) -> f32 {
        if r >= self.h {
            return 0.0;
        }
        let v = self.h2 - r * r;
        self.poly6 * v * v * v
    }

    #[inline]
    pub fn poly6_derivative(&self, r: f32) -> f32 {
        if r >= self.h {
            return 0.0;
        }
        let v = self.h2 - r * r;
        self.poly6_deriv * r * v * v
    }

    /// (h - r)^2 spike; its derivative drives the pressure force.
    #[inline]
    pub fn spiky_pow2(&self, r: f32) -> f32 {
        if r >= self.h {
            return 0.0;
        }
        let v = self.h - r;
        self.spiky_pow2 * v * v
    }

    #[inline]
    pub fn spiky_pow2_derivative(&self, r: f32) -> f32 {
        if r >= self.h {
            return 0.0;
        }
        self.spiky_pow2_deriv * (self.h - r)
    }

    /// (h - r)^3 spike, used for near-density.
    #[inline]
    pub fn spiky_pow3(&self, r: f32) -> f32 {
        if r >= self.h {
            return 0.0;
        }
        let v = self.h - r;
        self.spiky_pow3 * v * v * v
    }

    #[inline]
    pub fn spiky_pow3_derivative(&self, r: f32) -> f32 {
        if r >= self.h {
            return 0.0;
        }
        let v = self.h - r;
        self.spiky_pow3_deriv * v * v
    }
}
