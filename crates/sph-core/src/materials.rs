//! Constitutive collaborators consumed by the interaction kernels.
//!
//! Stress follows the continuum sign convention: tension positive, so a compressed
//! granular column carries a negative first invariant and `p = -tr(σ)/3`.

use glam::{Mat3, Vec3};

use crate::config::Dimensions;
use crate::error::{Result, SphError};
use crate::math::{deviatoric, double_dot, second_invariant, skew, symmetric, trace, TINY};

/// Equation of state and acoustic properties.
pub trait Material: Send + Sync + std::fmt::Debug {
    fn reference_density(&self) -> f32;

    fn reference_sound_speed(&self) -> f32;

    fn sound_speed(&self, _pressure: f32, _density: f32) -> f32 {
        self.reference_sound_speed()
    }

    /// Linear weakly-compressible EOS `c0² (ρ - ρ0)`.
    fn pressure(&self, density: f32) -> f32 {
        let c0 = self.reference_sound_speed();
        c0 * c0 * (density - self.reference_density())
    }

    fn density_from_pressure(&self, pressure: f32) -> f32 {
        let c0 = self.reference_sound_speed();
        self.reference_density() + pressure / (c0 * c0)
    }

    /// Stiffness `K` used by contact repulsion (`p = ρ_rep K`).
    fn contact_stiffness(&self) -> f32 {
        let c0 = self.reference_sound_speed();
        c0 * c0
    }
}

/// Rate-form constitutive law on top of an equation of state.
pub trait Constitutive: Material {
    fn shear_modulus(&self) -> f32;

    fn bulk_modulus(&self) -> f32;

    /// Objective stress rate from the velocity gradient `l` (entries `∂v_r/∂x_c`) and
    /// the current stress.
    fn stress_rate(&self, velocity_gradient: &Mat3, stress: &Mat3) -> Mat3;

    /// Project `stress` back onto the admissible set.
    fn return_mapping(&self, stress: Mat3) -> Mat3 {
        stress
    }
}

fn positive(name: &str, value: f32) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(SphError::InvalidMaterial(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

fn poisson(nu: f32) -> Result<()> {
    if (0.0..0.5).contains(&nu) {
        Ok(())
    } else {
        Err(SphError::InvalidMaterial(format!(
            "Poisson ratio must lie in [0, 0.5), got {nu}"
        )))
    }
}

#[inline]
fn shear_modulus_of(youngs_modulus: f32, poisson_ratio: f32) -> f32 {
    0.5 * youngs_modulus / (1.0 + poisson_ratio)
}

#[inline]
fn bulk_modulus_of(youngs_modulus: f32, poisson_ratio: f32) -> f32 {
    youngs_modulus / (3.0 * (1.0 - 2.0 * poisson_ratio))
}

/// Jaumann co-rotational term `W σ - σ W` with `W = skew(L)`.
#[inline]
fn jaumann(velocity_gradient: &Mat3, stress: &Mat3) -> Mat3 {
    let spin = skew(velocity_gradient);
    spin * *stress - *stress * spin
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeaklyCompressibleFluid {
    rho0: f32,
    c0: f32,
}

impl WeaklyCompressibleFluid {
    pub fn new(rho0: f32, c0: f32) -> Result<Self> {
        positive("reference density", rho0)?;
        positive("sound speed", c0)?;
        Ok(Self { rho0, c0 })
    }
}

impl Material for WeaklyCompressibleFluid {
    fn reference_density(&self) -> f32 {
        self.rho0
    }

    fn reference_sound_speed(&self) -> f32 {
        self.c0
    }
}

/// Hypoelastic solid, `σ̇ = Wσ - σW + 2G dev(D) + K tr(D) I`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ElasticSolid {
    rho0: f32,
    youngs_modulus: f32,
    poisson_ratio: f32,
    c0: f32,
}

impl ElasticSolid {
    pub fn new(rho0: f32, youngs_modulus: f32, poisson_ratio: f32) -> Result<Self> {
        positive("reference density", rho0)?;
        positive("Young's modulus", youngs_modulus)?;
        poisson(poisson_ratio)?;
        let c0 = (bulk_modulus_of(youngs_modulus, poisson_ratio) / rho0).sqrt();
        Ok(Self {
            rho0,
            youngs_modulus,
            poisson_ratio,
            c0,
        })
    }

    pub fn youngs_modulus(&self) -> f32 {
        self.youngs_modulus
    }

    pub fn poisson_ratio(&self) -> f32 {
        self.poisson_ratio
    }
}

impl Material for ElasticSolid {
    fn reference_density(&self) -> f32 {
        self.rho0
    }

    fn reference_sound_speed(&self) -> f32 {
        self.c0
    }
}

impl Constitutive for ElasticSolid {
    fn shear_modulus(&self) -> f32 {
        shear_modulus_of(self.youngs_modulus, self.poisson_ratio)
    }

    fn bulk_modulus(&self) -> f32 {
        bulk_modulus_of(self.youngs_modulus, self.poisson_ratio)
    }

    fn stress_rate(&self, velocity_gradient: &Mat3, stress: &Mat3) -> Mat3 {
        let strain_rate = symmetric(velocity_gradient);
        jaumann(velocity_gradient, stress)
            + deviatoric(&strain_rate) * (2.0 * self.shear_modulus())
            + Mat3::from_diagonal(Vec3::splat(self.bulk_modulus() * trace(&strain_rate)))
    }
}

/// Continuum with a weakly-compressible pressure and an elastic shear stress.
///
/// The stress rate only covers the shear part; pressure comes from the EOS.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeneralContinuum {
    rho0: f32,
    c0: f32,
    youngs_modulus: f32,
    poisson_ratio: f32,
    dimensions: Dimensions,
}

impl GeneralContinuum {
    pub fn new(
        rho0: f32,
        c0: f32,
        youngs_modulus: f32,
        poisson_ratio: f32,
        dimensions: Dimensions,
    ) -> Result<Self> {
        positive("reference density", rho0)?;
        positive("sound speed", c0)?;
        positive("Young's modulus", youngs_modulus)?;
        poisson(poisson_ratio)?;
        Ok(Self {
            rho0,
            c0,
            youngs_modulus,
            poisson_ratio,
            dimensions,
        })
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }
}

impl Material for GeneralContinuum {
    fn reference_density(&self) -> f32 {
        self.rho0
    }

    fn reference_sound_speed(&self) -> f32 {
        self.c0
    }
}

impl Constitutive for GeneralContinuum {
    fn shear_modulus(&self) -> f32 {
        shear_modulus_of(self.youngs_modulus, self.poisson_ratio)
    }

    fn bulk_modulus(&self) -> f32 {
        bulk_modulus_of(self.youngs_modulus, self.poisson_ratio)
    }

    fn stress_rate(&self, velocity_gradient: &Mat3, stress: &Mat3) -> Mat3 {
        let strain_rate = symmetric(velocity_gradient);
        // trace is removed over the active dimensions only
        let mean = trace(&strain_rate) / self.dimensions.as_f32();
        let mut diagonal = Vec3::splat(mean);
        if self.dimensions == Dimensions::Two {
            diagonal.z = 0.0;
        }
        let deviatoric_rate = strain_rate - Mat3::from_diagonal(diagonal);
        deviatoric_rate * (2.0 * self.shear_modulus()) + jaumann(velocity_gradient, stress)
    }
}

/// Drucker–Prager elastoplastic continuum with non-associated flow.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlasticContinuum {
    continuum: GeneralContinuum,
    cohesion: f32,
    friction_angle: f32,
    dilatancy: f32,
}

/// Drucker–Prager `α` for a friction (or dilatancy) angle.
#[inline]
pub fn drucker_prager_alpha(angle: f32) -> f32 {
    let t = angle.tan();
    t / (9.0 + 12.0 * t * t).sqrt()
}

/// Drucker–Prager `k` for a cohesion and friction angle.
#[inline]
pub fn drucker_prager_k(cohesion: f32, friction_angle: f32) -> f32 {
    let t = friction_angle.tan();
    3.0 * cohesion / (9.0 + 12.0 * t * t).sqrt()
}

impl PlasticContinuum {
    pub fn new(
        continuum: GeneralContinuum,
        cohesion: f32,
        friction_angle: f32,
        dilatancy: f32,
    ) -> Result<Self> {
        if !(cohesion >= 0.0 && cohesion.is_finite()) {
            return Err(SphError::InvalidMaterial(format!(
                "cohesion must be non-negative, got {cohesion}"
            )));
        }
        if !(0.0..std::f32::consts::FRAC_PI_2).contains(&friction_angle) {
            return Err(SphError::InvalidMaterial(format!(
                "friction angle must lie in [0, π/2), got {friction_angle}"
            )));
        }
        if !(0.0..=friction_angle).contains(&dilatancy) {
            return Err(SphError::InvalidMaterial(format!(
                "dilatancy angle must lie in [0, {friction_angle}], got {dilatancy}"
            )));
        }
        Ok(Self {
            continuum,
            cohesion,
            friction_angle,
            dilatancy,
        })
    }

    pub fn cohesion(&self) -> f32 {
        self.cohesion
    }

    pub fn friction_angle(&self) -> f32 {
        self.friction_angle
    }

    pub fn dilatancy(&self) -> f32 {
        self.dilatancy
    }

    /// Value of the yield function `√J2 + α I1 - k`; positive outside the cone.
    pub fn yield_function(&self, stress: &Mat3) -> f32 {
        second_invariant(stress).max(0.0).sqrt()
            + drucker_prager_alpha(self.friction_angle) * trace(stress)
            - drucker_prager_k(self.cohesion, self.friction_angle)
    }
}

impl Material for PlasticContinuum {
    fn reference_density(&self) -> f32 {
        self.continuum.reference_density()
    }

    fn reference_sound_speed(&self) -> f32 {
        self.continuum.reference_sound_speed()
    }
}

impl Constitutive for PlasticContinuum {
    fn shear_modulus(&self) -> f32 {
        self.continuum.shear_modulus()
    }

    fn bulk_modulus(&self) -> f32 {
        self.continuum.bulk_modulus()
    }

    fn stress_rate(&self, velocity_gradient: &Mat3, stress: &Mat3) -> Mat3 {
        let g_mod = self.shear_modulus();
        let k_mod = self.bulk_modulus();
        let alpha_phi = drucker_prager_alpha(self.friction_angle);
        let alpha_psi = drucker_prager_alpha(self.dilatancy);

        let strain_rate = symmetric(velocity_gradient);
        let volumetric_rate = trace(&strain_rate);
        let s = deviatoric(stress);
        let sqrt_j2 = second_invariant(stress).max(0.0).sqrt();

        let mut plastic = Mat3::ZERO;
        if self.yield_function(stress) >= TINY && sqrt_j2 > TINY {
            let lambda_dot = (3.0 * alpha_phi * k_mod * volumetric_rate
                + (g_mod / sqrt_j2) * double_dot(&s, &strain_rate))
                / (9.0 * alpha_phi * alpha_psi * k_mod + g_mod);
            let volumetric = Mat3::from_diagonal(Vec3::splat(3.0 * alpha_psi * k_mod));
            plastic = (volumetric + s * (g_mod / sqrt_j2)) * lambda_dot;
        }

        jaumann(velocity_gradient, stress)
            + deviatoric(&strain_rate) * (2.0 * g_mod)
            + Mat3::from_diagonal(Vec3::splat(k_mod * volumetric_rate))
            - plastic
    }

    /// Tension cut-off on `I1`, then radial scaling of the deviatoric part onto the cone.
    fn return_mapping(&self, stress: Mat3) -> Mat3 {
        let alpha = drucker_prager_alpha(self.friction_angle);
        let k = drucker_prager_k(self.cohesion, self.friction_angle);

        let mut stress = stress;
        let mut i1 = trace(&stress);
        if alpha > 0.0 && -alpha * i1 + k < 0.0 {
            let apex = k / alpha;
            stress -= Mat3::from_diagonal(Vec3::splat((i1 - apex) / 3.0));
            i1 = apex;
        }

        let s = deviatoric(&stress);
        let sqrt_j2 = (0.5 * double_dot(&s, &s)).max(0.0).sqrt();
        let limit = (-alpha * i1 + k).max(0.0);
        if sqrt_j2 > limit {
            let scale = limit / (sqrt_j2 + TINY);
            stress = s * scale + Mat3::from_diagonal(Vec3::splat(i1 / 3.0));
        }
        stress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sand() -> PlasticContinuum {
        let continuum = GeneralContinuum::new(2040.0, 50.0, 5.84e6, 0.3, Dimensions::Two).unwrap();
        PlasticContinuum::new(continuum, 0.0, 30f32.to_radians(), 0.0).unwrap()
    }

    #[test]
    fn test_linear_eos_inverts() {
        let water = WeaklyCompressibleFluid::new(1000.0, 10.0).unwrap();
        let p = water.pressure(1010.0);
        assert_relative_eq!(p, 10_000.0, max_relative = 1e-5);
        assert_relative_eq!(water.density_from_pressure(p), 1010.0, max_relative = 1e-6);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(WeaklyCompressibleFluid::new(0.0, 10.0).is_err());
        assert!(ElasticSolid::new(1000.0, 1.0e6, 0.5).is_err());
        let continuum = GeneralContinuum::new(1000.0, 10.0, 1.0e6, 0.3, Dimensions::Three).unwrap();
        assert!(
            PlasticContinuum::new(continuum, 0.0, 0.5, 0.6).is_err(),
            "dilatancy above friction"
        );
        assert!(PlasticContinuum::new(continuum, -1.0, 0.5, 0.0).is_err());
    }

    #[test]
    fn test_elastic_sound_speed_from_bulk_modulus() {
        let solid = ElasticSolid::new(1000.0, 3.0e6, 0.25).unwrap();
        assert_relative_eq!(solid.reference_sound_speed(), (solid.bulk_modulus() / 1000.0).sqrt());
    }

    #[test]
    fn test_rigid_rotation_produces_only_corotational_rate() {
        let solid = ElasticSolid::new(1000.0, 1.0e6, 0.3).unwrap();
        // pure spin about z
        let l = Mat3::from_cols(Vec3::new(0.0, 1.0, 0.0), Vec3::new(-1.0, 0.0, 0.0), Vec3::ZERO);
        let rate = solid.stress_rate(&l, &Mat3::ZERO);
        assert!(rate.abs_diff_eq(Mat3::ZERO, 1e-6), "unstressed spin must not create stress");
    }

    #[test]
    fn test_elastic_rate_inside_cone_has_no_plastic_part() {
        let material = sand();
        let stress = Mat3::from_diagonal(Vec3::splat(-1000.0));
        let l = Mat3::from_diagonal(Vec3::new(-0.01, 0.0, 0.0));
        let elastic = material.continuum.shear_modulus() * 2.0;
        let rate = material.stress_rate(&l, &stress);
        let expected_xx = elastic * (-0.01 - (-0.01 / 3.0)) + material.bulk_modulus() * -0.01;
        assert_relative_eq!(rate.x_axis.x, expected_xx, max_relative = 1e-4);
    }
}
