use glam::{Mat3, Vec2, Vec3};
use sph_core::body::Body;
use sph_core::config::{AdaptationConfig, Dimensions, SimulationConfig};
use sph_core::dynamics::acceleration::TimeDependentAcceleration;
use sph_core::dynamics::continuum::KernelCorrectionMatrix;
use sph_core::dynamics::plastic::{
    PlasticMomentumRelaxation, PlasticStressRelaxation, StressDiffusion, STRESS_TENSOR,
};
use sph_core::materials::{
    drucker_prager_alpha, drucker_prager_k, Constitutive, GeneralContinuum, Material,
    PlasticContinuum,
};
use sph_core::math::{second_invariant, trace};
use sph_core::particle::ParticleSet;
use sph_core::shapes::primitives::Cuboid;
use sph_core::shapes::{lattice_positions, BoundingBox};
use sph_core::solver::{Solver, StageRate};

const SPACING: f32 = 0.01;
const GRAVITY: f32 = 9.8;

fn sand(cohesion: f32) -> PlasticContinuum {
    let continuum = GeneralContinuum::new(2040.0, 50.0, 5.84e6, 0.3, Dimensions::Two).unwrap();
    PlasticContinuum::new(continuum, cohesion, 30f32.to_radians(), 0.0).unwrap()
}

/// Admissible up to a tolerance relative to the stress magnitude.
fn assert_admissible(material: &PlasticContinuum, stress: &Mat3) {
    let scale = trace(stress).abs().max(second_invariant(stress).sqrt()).max(1.0);
    let f = material.yield_function(stress);
    assert!(f <= 1e-4 * scale, "stress {stress:?} lies outside the cone (f = {f})");
}

#[test]
fn test_return_mapping_lands_on_cone() {
    let material = sand(0.0);
    let stress = Mat3::from_cols(
        Vec3::new(-1000.0, 4000.0, 0.0),
        Vec3::new(4000.0, -1500.0, 0.0),
        Vec3::new(0.0, 0.0, -1000.0),
    );
    assert!(material.yield_function(&stress) > 0.0, "trial stress must be plastic");

    let mapped = material.return_mapping(stress);
    assert_admissible(&material, &mapped);
    assert!(
        material.yield_function(&mapped).abs() < 1e-2,
        "radial return should end on the surface"
    );
    assert!(
        (trace(&mapped) - trace(&stress)).abs() < 1e-2,
        "compressive return keeps the mean stress"
    );
}

#[test]
fn test_tension_is_cut_off_at_apex() {
    let material = sand(0.0);
    let mapped = material.return_mapping(Mat3::from_diagonal(Vec3::new(500.0, 200.0, 100.0)));
    assert!(
        mapped.abs_diff_eq(Mat3::ZERO, 1e-3),
        "cohesionless soil carries no tension: {mapped:?}"
    );

    let cohesive = sand(1000.0);
    let phi = 30f32.to_radians();
    let apex = drucker_prager_k(1000.0, phi) / drucker_prager_alpha(phi);
    let mapped = cohesive.return_mapping(Mat3::from_diagonal(Vec3::splat(10.0 * apex)));
    assert!((trace(&mapped) - apex).abs() < 1e-3 * apex);
    assert_admissible(&cohesive, &mapped);
}

#[test]
fn test_admissible_stress_is_unchanged() {
    let material = sand(0.0);
    let stress = Mat3::from_cols(
        Vec3::new(-1000.0, 50.0, 0.0),
        Vec3::new(50.0, -1200.0, 0.0),
        Vec3::new(0.0, 0.0, -1100.0),
    );
    assert!(material.yield_function(&stress) < 0.0);
    assert_eq!(material.return_mapping(stress), stress);
}

#[test]
fn test_plastic_rate_does_not_push_further_out() {
    let material = sand(0.0);
    let stress = Mat3::from_cols(
        Vec3::new(-1000.0, 2000.0, 0.0),
        Vec3::new(2000.0, -1000.0, 0.0),
        Vec3::new(0.0, 0.0, -1000.0),
    );
    assert!(material.yield_function(&stress) > 0.0);
    // pure shear in the direction of the existing shear stress
    let l = Mat3::from_cols(Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO);
    let dt = 1e-7;
    let plastic = stress + material.stress_rate(&l, &stress) * dt;
    let elastic = stress + l * (2.0 * material.shear_modulus() * dt);
    assert!(
        material.yield_function(&plastic) < material.yield_function(&elastic),
        "plastic correction must reduce the overshoot"
    );
}

/// Geostatic column: `σ_yy = ρ g (y - H)`, lateral stress scaled by `1 - sin φ`.
fn geostatic(positions: &[Vec3], material: &PlasticContinuum, top: f32) -> Vec<Mat3> {
    let lateral = 1.0 - material.friction_angle().sin();
    positions
        .iter()
        .map(|p| {
            let vertical = material.reference_density() * GRAVITY * (p.y - top);
            Mat3::from_diagonal(Vec3::new(lateral * vertical, vertical, lateral * vertical))
        })
        .collect()
}

#[test]
fn test_granular_column_stays_finite_and_admissible() {
    let material = sand(0.0);
    let config = SimulationConfig {
        dimensions: Dimensions::Two,
        system_spacing: SPACING,
        domain: BoundingBox::new(Vec3::new(-0.2, -0.2, -0.01), Vec3::new(0.2, 0.2, 0.01)),
        ..Default::default()
    };

    let column = Cuboid::planar(Vec2::new(0.0, 0.05), Vec2::new(0.03, 0.05));
    let positions = lattice_positions(&column, SPACING, Dimensions::Two).unwrap();
    let rho = material.reference_density();
    let mut particles =
        ParticleSet::from_positions(positions, SPACING, rho, Dimensions::Two).unwrap();
    let initial = geostatic(&particles.position, &material, 0.1);
    particles.fields.register_from(STRESS_TENSOR, initial).unwrap();

    let mut solver = Solver::new(config.clone()).unwrap();
    let adaptation = AdaptationConfig::default();
    let body =
        Body::new("soil", particles, &adaptation, Box::new(material), &config).unwrap();
    let h = body.adaptation.reference_smoothing_length();
    let soil = solver.add_body(body);

    let particles = &mut solver.body_mut(soil).unwrap().particles;
    let gravity = TimeDependentAcceleration::constant(particles, Vec3::new(0.0, -GRAVITY, 0.0));
    let correction = KernelCorrectionMatrix::new(particles, Dimensions::Two);
    let momentum = PlasticMomentumRelaxation::new(particles, material);
    let diffusion = StressDiffusion::new(particles, &material, h);
    let stress = PlasticStressRelaxation::new(particles, material)
        .with_kernel_correction(particles)
        .with_stress_diffusion(particles);
    let stress_field = particles.fields.handle::<Mat3>(STRESS_TENSOR).unwrap();

    solver.add_dynamics(soil, StageRate::Advection, gravity).unwrap();
    solver.add_dynamics(soil, StageRate::Advection, correction).unwrap();
    solver.add_dynamics(soil, StageRate::Acoustic, momentum).unwrap();
    solver.add_dynamics(soil, StageRate::Acoustic, diffusion).unwrap();
    solver.add_dynamics(soil, StageRate::Acoustic, stress).unwrap();
    assert_eq!(
        solver.stage_names(),
        vec![
            "TimeDependentAcceleration",
            "KernelCorrectionMatrix",
            "PlasticMomentumRelaxation",
            "StressDiffusion",
            "PlasticStressRelaxation",
        ]
    );

    solver.integrate_to(2.0e-3).unwrap();
    assert!((solver.time().physical_time - 2.0e-3).abs() < 1e-6);
    assert!(solver.time().steps > 1, "acoustic sub-cycling should take several steps");

    let soil = solver.body(soil).unwrap();
    for stress in soil.particles.fields.get(stress_field) {
        assert_admissible(&material, stress);
    }
    for (i, p) in soil.particles.pressure.iter().enumerate() {
        assert!(p.is_finite(), "pressure of particle {i} is {p}");
    }
    let mean_vy: f32 = soil.particles.velocity.iter().map(|v| v.y).sum::<f32>() / soil.len() as f32;
    assert!(mean_vy < 0.0, "column must start falling, mean v_y = {mean_vy}");
}
