//! Scalar and second-order tensor helpers shared by the kernels and materials.

use glam::{Mat3, Vec3};

/// Guard added to denominators that may vanish (coincident-ish particles, zero stress).
pub const TINY: f32 = 1.0e-12;

/// Smooth Hermite interpolation between `edge0` and `edge1`.
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge0 == edge1 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[inline]
pub fn trace(m: &Mat3) -> f32 {
    m.x_axis.x + m.y_axis.y + m.z_axis.z
}

/// `a ⊗ b`, i.e. the matrix with entries `a[r] * b[c]`.
#[inline]
pub fn outer(a: Vec3, b: Vec3) -> Mat3 {
    Mat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// Sum of the element-wise product `a : b`.
#[inline]
pub fn double_dot(a: &Mat3, b: &Mat3) -> f32 {
    a.x_axis.dot(b.x_axis) + a.y_axis.dot(b.y_axis) + a.z_axis.dot(b.z_axis)
}

#[inline]
pub fn symmetric(m: &Mat3) -> Mat3 {
    (*m + m.transpose()) * 0.5
}

#[inline]
pub fn skew(m: &Mat3) -> Mat3 {
    (*m - m.transpose()) * 0.5
}

/// Deviatoric part of a 3x3 tensor (trace removed over all three axes).
#[inline]
pub fn deviatoric(m: &Mat3) -> Mat3 {
    *m - Mat3::from_diagonal(Vec3::splat(trace(m) / 3.0))
}

/// Second invariant `J2 = ½ s:s` of the deviatoric part.
#[inline]
pub fn second_invariant(m: &Mat3) -> f32 {
    let s = deviatoric(m);
    0.5 * double_dot(&s, &s)
}

/// Von Mises equivalent value `√(3 J2)`.
#[inline]
pub fn von_mises(m: &Mat3) -> f32 {
    (3.0 * second_invariant(m)).max(0.0).sqrt()
}

#[inline]
pub fn is_finite_mat(m: &Mat3) -> bool {
    m.x_axis.is_finite() && m.y_axis.is_finite() && m.z_axis.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoothstep_boundaries() {
        assert_eq!(smoothstep(0.0, 1.0, -0.1), 0.0);
        assert_eq!(smoothstep(0.0, 1.0, 1.5), 1.0);
        assert!((smoothstep(0.0, 1.0, 0.5) - 0.5).abs() < 1e-6);
        assert_eq!(smoothstep(1.0, 1.0, 0.5), 0.0);
    }

    #[test]
    fn test_outer_product_entries() {
        let m = outer(Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0));
        // column c, row r holds a[r] * b[c]
        assert_eq!(m.col(0), Vec3::new(4.0, 8.0, 12.0));
        assert_eq!(m.col(2), Vec3::new(6.0, 12.0, 18.0));
    }

    #[test]
    fn test_hydrostatic_tensor_has_no_von_mises() {
        let m = Mat3::from_diagonal(Vec3::splat(-5.0));
        assert!(von_mises(&m) < 1e-5);
        assert!((trace(&deviatoric(&m))).abs() < 1e-5);
    }

    #[test]
    fn test_uniaxial_von_mises_equals_axial_stress() {
        let m = Mat3::from_diagonal(Vec3::new(100.0, 0.0, 0.0));
        assert!((von_mises(&m) - 100.0).abs() < 1e-3);
    }
}
