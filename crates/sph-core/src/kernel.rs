use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::config::Dimensions;

/// Radially symmetric smoothing kernel with compact support.
///
/// `w` and `dw` take the particle distance `r` and the smoothing length `h`; both
/// return exactly `0.0` for `r >= cutoff_radius(h)`. `dw` is the radial derivative
/// `dW/dr`, which is non-positive everywhere.
pub trait SmoothingKernel: Send + Sync + std::fmt::Debug {
    fn dimensions(&self) -> Dimensions;

    /// Support radius as a multiple of the smoothing length.
    fn kernel_size(&self) -> f32;

    #[inline]
    fn cutoff_radius(&self, h: f32) -> f32 {
        self.kernel_size() * h
    }

    fn w(&self, r: f32, h: f32) -> f32;

    fn dw(&self, r: f32, h: f32) -> f32;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelKind {
    #[default]
    WendlandC2,
    CubicSpline,
}

impl KernelKind {
    pub fn build(self, dimensions: Dimensions) -> Box<dyn SmoothingKernel> {
        match self {
            KernelKind::WendlandC2 => Box::new(WendlandC2::new(dimensions)),
            KernelKind::CubicSpline => Box::new(CubicSpline::new(dimensions)),
        }
    }
}

/// Wendland C2 kernel, support `2h`.
///
/// `W(q) = σ (1 - q/2)^4 (1 + 2q)` with `σ = 7 / (4π h²)` in 2D and `21 / (16π h³)` in 3D.
#[derive(Clone, Copy, Debug)]
pub struct WendlandC2 {
    dimensions: Dimensions,
}

impl WendlandC2 {
    pub fn new(dimensions: Dimensions) -> Self {
        Self { dimensions }
    }

    #[inline]
    fn normalization(&self, h: f32) -> f32 {
        match self.dimensions {
            Dimensions::Two => 7.0 / (4.0 * PI * h * h),
            Dimensions::Three => 21.0 / (16.0 * PI * h * h * h),
        }
    }
}

impl SmoothingKernel for WendlandC2 {
    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    fn kernel_size(&self) -> f32 {
        2.0
    }

    #[inline]
    fn w(&self, r: f32, h: f32) -> f32 {
        let q = r / h;
        if q >= 2.0 {
            return 0.0;
        }
        let a = 1.0 - 0.5 * q;
        let a2 = a * a;
        self.normalization(h) * a2 * a2 * (1.0 + 2.0 * q)
    }

    #[inline]
    fn dw(&self, r: f32, h: f32) -> f32 {
        let q = r / h;
        if q >= 2.0 {
            return 0.0;
        }
        let a = 1.0 - 0.5 * q;
        -5.0 * q * a * a * a * self.normalization(h) / h
    }
}

/// Monaghan's cubic B-spline, support `2h`.
#[derive(Clone, Copy, Debug)]
pub struct CubicSpline {
    dimensions: Dimensions,
}

impl CubicSpline {
    pub fn new(dimensions: Dimensions) -> Self {
        Self { dimensions }
    }

    #[inline]
    fn normalization(&self, h: f32) -> f32 {
        match self.dimensions {
            Dimensions::Two => 10.0 / (7.0 * PI * h * h),
            Dimensions::Three => 1.0 / (PI * h * h * h),
        }
    }
}

impl SmoothingKernel for CubicSpline {
    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    fn kernel_size(&self) -> f32 {
        2.0
    }

    #[inline]
    fn w(&self, r: f32, h: f32) -> f32 {
        let q = r / h;
        let shape = if q < 1.0 {
            1.0 - 1.5 * q * q + 0.75 * q * q * q
        } else if q < 2.0 {
            let b = 2.0 - q;
            0.25 * b * b * b
        } else {
            return 0.0;
        };
        self.normalization(h) * shape
    }

    #[inline]
    fn dw(&self, r: f32, h: f32) -> f32 {
        let q = r / h;
        let slope = if q < 1.0 {
            -3.0 * q + 2.25 * q * q
        } else if q < 2.0 {
            let b = 2.0 - q;
            -0.75 * b * b
        } else {
            return 0.0;
        };
        self.normalization(h) * slope / h
    }
}
