use glam::{Vec2, Vec3};
use sph_core::body::{Body, ContactLink};
use sph_core::config::{AdaptationConfig, Dimensions, SimulationConfig};
use sph_core::dynamics::fluid::{
    AcousticRiemannSolver, DensityRelaxation, FluidState, NoRiemannSolver, PressureRelaxation,
    RiemannSolver, DENSITY_CHANGE_RATE,
};
use sph_core::dynamics::{exec, exec_with_buffer};
use sph_core::dynamics::NeighborSource;
use sph_core::materials::{Material, WeaklyCompressibleFluid};
use sph_core::particle::ParticleSet;
use sph_core::shapes::primitives::Cuboid;
use sph_core::shapes::{lattice_positions, BoundingBox};
use sph_core::time_step::TimeContext;
use sph_core::SphError;

const SPACING: f32 = 0.01;

fn water() -> WeaklyCompressibleFluid {
    WeaklyCompressibleFluid::new(1000.0, 10.0).unwrap()
}

fn config() -> SimulationConfig {
    SimulationConfig {
        dimensions: Dimensions::Two,
        system_spacing: SPACING,
        domain: BoundingBox::new(Vec3::new(-0.1, -0.1, -0.01), Vec3::new(0.1, 0.1, 0.01)),
        ..Default::default()
    }
}

fn fluid_block() -> Body {
    let rect = Cuboid::planar(Vec2::ZERO, Vec2::splat(0.04));
    let positions = lattice_positions(&rect, SPACING, Dimensions::Two).unwrap();
    let particles =
        ParticleSet::from_positions(positions, SPACING, 1000.0, Dimensions::Two).unwrap();
    Body::new("water", particles, &AdaptationConfig::default(), Box::new(water()), &config())
        .unwrap()
}

fn state(rho: f32, vel: Vec3, p: f32) -> FluidState {
    FluidState { rho, vel, p, c: 10.0 }
}

#[test]
fn test_acoustic_solver_is_symmetric() {
    let solver = AcousticRiemannSolver::default();
    let a = state(1001.0, Vec3::new(-0.3, 0.1, 0.0), 100.0);
    let b = state(999.0, Vec3::new(0.2, -0.4, 0.0), -50.0);
    let e = Vec3::new(0.6, 0.8, 0.0);

    let ab = solver.interface_state(&a, &b, e);
    let ba = solver.interface_state(&b, &a, -e);
    assert!((ab.p - ba.p).abs() < 1e-3, "{} vs {}", ab.p, ba.p);
    assert!(ab.vel.abs_diff_eq(ba.vel, 1e-6), "{:?} vs {:?}", ab.vel, ba.vel);
}

#[test]
fn test_dissipation_only_under_compression() {
    let solver = AcousticRiemannSolver::default();
    let e = Vec3::X; // j sits to the left of i
    let average = 0.5 * (100.0 + 40.0);

    // i moves towards j
    let approaching = solver.interface_state(
        &state(1000.0, Vec3::new(-0.1, 0.0, 0.0), 100.0),
        &state(1000.0, Vec3::ZERO, 40.0),
        e,
    );
    assert!(
        approaching.p > average + 1.0,
        "compression must add dissipation, got {}",
        approaching.p
    );

    // i moves away from j
    let separating = solver.interface_state(
        &state(1000.0, Vec3::new(0.1, 0.0, 0.0), 100.0),
        &state(1000.0, Vec3::ZERO, 40.0),
        e,
    );
    assert!((separating.p - average).abs() < 1e-3, "expansion must not add dissipation");
}

#[test]
fn test_dissipation_saturates() {
    let solver = AcousticRiemannSolver::default();
    let slow = solver.interface_state(
        &state(1000.0, Vec3::new(-10.0 / 15.0, 0.0, 0.0), 0.0),
        &state(1000.0, Vec3::ZERO, 0.0),
        Vec3::X,
    );
    let fast = solver.interface_state(
        &state(1000.0, Vec3::new(-2.0 * 10.0 / 15.0, 0.0, 0.0), 0.0),
        &state(1000.0, Vec3::ZERO, 0.0),
        Vec3::X,
    );
    // past the limiter the dissipation grows linearly with the jump
    assert!((fast.p / slow.p - 2.0).abs() < 1e-3, "{} vs {}", fast.p, slow.p);
}

#[test]
fn test_plain_averages_without_riemann_solver() {
    let star = NoRiemannSolver.interface_state(
        &state(1000.0, Vec3::new(1.0, 0.0, 0.0), 10.0),
        &state(1000.0, Vec3::new(-1.0, 0.0, 0.0), 30.0),
        Vec3::X,
    );
    assert!((star.p - 20.0).abs() < 1e-4);
    assert!(star.vel.abs_diff_eq(Vec3::ZERO, 1e-6));
}

#[test]
fn test_rest_state_stays_at_rest() {
    let mut bodies = vec![fluid_block()];
    let time = TimeContext::default();
    let mut pressure = PressureRelaxation::new(
        &mut bodies[0].particles,
        water(),
        AcousticRiemannSolver::default(),
        NeighborSource::Inner,
    );
    let mut density = DensityRelaxation::new(
        &mut bodies[0].particles,
        water(),
        AcousticRiemannSolver::default(),
        NeighborSource::Inner,
    );
    let start = bodies[0].particles.position.clone();

    for _ in 0..5 {
        bodies[0].update_configuration().unwrap();
        exec(&mut pressure, &mut bodies, &[], 0, &time, 1e-4).unwrap();
        exec(&mut density, &mut bodies, &[], 0, &time, 1e-4).unwrap();
    }

    let particles = &bodies[0].particles;
    assert!(particles.velocity.iter().all(|v| *v == Vec3::ZERO));
    assert!(particles.density.iter().all(|&rho| rho == 1000.0));
    assert_eq!(particles.position, start);
}

#[test]
fn test_converging_flow_raises_density() {
    let mut bodies = vec![fluid_block()];
    let p = &mut bodies[0].particles;
    for (v, x) in p.velocity.iter_mut().zip(&p.position) {
        *v = -0.5 * *x;
    }
    bodies[0].update_configuration().unwrap();
    let mut density = DensityRelaxation::new(
        &mut bodies[0].particles,
        water(),
        NoRiemannSolver,
        NeighborSource::Inner,
    );
    exec(&mut density, &mut bodies, &[], 0, &TimeContext::default(), 1e-5).unwrap();

    let particles = &bodies[0].particles;
    let handle = particles.fields.handle::<f32>(DENSITY_CHANGE_RATE).unwrap();
    for (i, &rate) in particles.fields.get(handle).iter().enumerate() {
        assert!(rate > 0.0, "particle {i}: drho/dt = {rate}");
        assert!(particles.density[i] > 1000.0);
    }
}

#[test]
fn test_overpressure_pushes_neighbors_away() {
    let mut bodies = vec![fluid_block()];
    let centre = bodies[0]
        .particles
        .position
        .iter()
        .position(|p| p.distance(Vec3::new(0.005, 0.005, 0.0)) < 1e-4)
        .unwrap();
    bodies[0].particles.density[centre] = 1010.0;
    bodies[0].update_configuration().unwrap();

    let mut pressure = PressureRelaxation::new(
        &mut bodies[0].particles,
        water(),
        AcousticRiemannSolver::default(),
        NeighborSource::Inner,
    );
    exec(&mut pressure, &mut bodies, &[], 0, &TimeContext::default(), 1e-4).unwrap();

    let particles = &bodies[0].particles;
    assert!(particles.pressure[centre] > 0.0);
    let x_c = particles.position[centre];
    for pair in bodies[0].inner[centre].iter() {
        let outward = particles.position[pair.j] - x_c;
        assert!(
            particles.velocity[pair.j].dot(outward) > 0.0,
            "neighbor {} must move away from the overpressure",
            pair.j
        );
    }
}

#[test]
fn test_wall_supports_fluid_under_gravity() {
    let g = 9.8;
    let drop = vec![Vec3::new(0.0, 0.006, 0.0)];
    let fluid = ParticleSet::from_positions(drop, SPACING, 1000.0, Dimensions::Two).unwrap();
    let wall = ParticleSet::from_positions(
        (0..7).map(|k| Vec3::new((k as f32 - 3.0) * SPACING, -0.005, 0.0)).collect(),
        SPACING,
        1000.0,
        Dimensions::Two,
    )
    .unwrap();
    let adaptation = AdaptationConfig::default();
    let mut bodies = vec![
        Body::new("water", fluid, &adaptation, Box::new(water()), &config()).unwrap(),
        Body::static_wall("wall", wall, &adaptation, Box::new(water()), &config()).unwrap(),
    ];
    for body in &mut bodies {
        body.update_configuration().unwrap();
    }
    let mass = bodies[0].particles.mass[0];
    bodies[0].particles.force_prior[0] = Vec3::new(0.0, -g * mass, 0.0);
    let mut link = ContactLink::new(0, 1);
    link.update(&bodies).unwrap();
    assert!(!link.relation[0].is_empty());
    let contacts = vec![link];

    let dt = 1e-4;
    let mut pressure = PressureRelaxation::new(
        &mut bodies[0].particles,
        water(),
        AcousticRiemannSolver::default(),
        NeighborSource::Wall,
    );
    exec(&mut pressure, &mut bodies, &contacts, 0, &TimeContext::default(), dt).unwrap();

    let v = bodies[0].particles.velocity[0];
    assert!(v.y > -g * dt, "wall pressure must oppose gravity, v = {v:?}");
    assert!(v.x.abs() < 1e-3 * v.y.abs().max(1e-9) + 1e-9);
}

/// A single water particle rising from a wall row towards a second body hovering above it.
/// Link 0 looks into the wall, link 1 into the second fluid.
fn wall_and_fluid_scene() -> (Vec<Body>, Vec<ContactLink>) {
    let single = |y: f32| {
        ParticleSet::from_positions(vec![Vec3::new(0.0, y, 0.0)], SPACING, 1000.0, Dimensions::Two)
            .unwrap()
    };
    let wall = ParticleSet::from_positions(
        (0..7).map(|k| Vec3::new((k as f32 - 3.0) * SPACING, -0.005, 0.0)).collect(),
        SPACING,
        1000.0,
        Dimensions::Two,
    )
    .unwrap();
    let adaptation = AdaptationConfig::default();
    let mut bodies = vec![
        Body::new("water", single(0.006), &adaptation, Box::new(water()), &config()).unwrap(),
        Body::static_wall("wall", wall, &adaptation, Box::new(water()), &config()).unwrap(),
        Body::new("spray", single(0.016), &adaptation, Box::new(water()), &config()).unwrap(),
    ];
    bodies[0].particles.velocity[0] = Vec3::new(0.0, 0.1, 0.0);
    for body in &mut bodies {
        body.update_configuration().unwrap();
    }
    let mut contacts = vec![ContactLink::new(0, 1), ContactLink::new(0, 2)];
    for link in &mut contacts {
        link.update(&bodies).unwrap();
        assert!(!link.relation[0].is_empty());
    }
    (bodies, contacts)
}

#[test]
fn test_wall_stage_reads_only_its_own_links() {
    let dt = 1e-4;
    let time = TimeContext::default();
    let run = |links: &[usize]| {
        let (mut bodies, contacts) = wall_and_fluid_scene();
        let mut pressure = PressureRelaxation::new(
            &mut bodies[0].particles,
            water(),
            AcousticRiemannSolver::default(),
            NeighborSource::Wall,
        );
        let mut buffer = Vec::new();
        exec_with_buffer(&mut pressure, &mut bodies, &contacts, links, 0, &time, dt, &mut buffer)
            .unwrap();
        bodies[0].particles.velocity[0]
    };

    let wall_only = run(&[0]);
    let (mut bodies, contacts) = wall_and_fluid_scene();
    let mut pressure = PressureRelaxation::new(
        &mut bodies[0].particles,
        water(),
        AcousticRiemannSolver::default(),
        NeighborSource::Wall,
    );
    exec(&mut pressure, &mut bodies, &contacts[..1], 0, &time, dt).unwrap();
    assert_eq!(wall_only, bodies[0].particles.velocity[0]);

    // the body above resists the approach once its link is read too
    let both = run(&[0, 1]);
    assert!(both.y < wall_only.y, "{both:?} vs {wall_only:?}");
}

#[test]
fn test_links_of_other_bodies_are_rejected() {
    let (mut bodies, mut contacts) = wall_and_fluid_scene();
    contacts.push(ContactLink::new(2, 0));
    let mut pressure = PressureRelaxation::new(
        &mut bodies[0].particles,
        water(),
        AcousticRiemannSolver::default(),
        NeighborSource::Contact,
    );
    let time = TimeContext::default();
    let err = exec(&mut pressure, &mut bodies, &contacts, 0, &time, 1e-4).unwrap_err();
    assert!(matches!(err, SphError::InvalidConfig(_)), "{err:?}");

    let mut buffer = Vec::new();
    let err =
        exec_with_buffer(&mut pressure, &mut bodies, &contacts, &[7], 0, &time, 1e-4, &mut buffer)
            .unwrap_err();
    assert_eq!(err, SphError::UnknownContact(7));
}

#[test]
fn test_eos_round_trip_matches_material() {
    let material = water();
    let p = material.pressure(1002.0);
    assert!((p - 200.0).abs() < 1e-2);
    assert!((material.density_from_pressure(p) - 1002.0).abs() < 1e-3);
}
