use glam::{Vec2, Vec3};
use sph_core::body::{Body, ContactLink};
use sph_core::config::{AdaptationConfig, Dimensions, SimulationConfig};
use sph_core::dynamics::{exec, exec_with_buffer};
use sph_core::dynamics::repulsion::{
    RepulsionDensitySummation, RepulsionForce, RepulsionVariant,
};
use sph_core::dynamics::NeighborSource;
use sph_core::materials::ElasticSolid;
use sph_core::particle::ParticleSet;
use sph_core::shapes::primitives::Cuboid;
use sph_core::shapes::{lattice_positions, BoundingBox};
use sph_core::time_step::TimeContext;

const SPACING: f32 = 0.01;

fn config() -> SimulationConfig {
    SimulationConfig {
        dimensions: Dimensions::Two,
        system_spacing: SPACING,
        domain: BoundingBox::new(Vec3::new(-0.1, -0.1, -0.01), Vec3::new(0.1, 0.1, 0.01)),
        ..Default::default()
    }
}

fn rubber() -> ElasticSolid {
    ElasticSolid::new(1100.0, 1.0e5, 0.45).unwrap()
}

fn solid(name: &str, positions: Vec<Vec3>) -> Body {
    let particles =
        ParticleSet::from_positions(positions, SPACING, 1100.0, Dimensions::Two).unwrap();
    Body::new(name, particles, &AdaptationConfig::default(), Box::new(rubber()), &config())
        .unwrap()
}

/// Self-contact force on every particle of a single body.
fn self_contact_forces(body: Body) -> Vec<Vec3> {
    let mut bodies = vec![body];
    bodies[0].update_configuration().unwrap();
    let time = TimeContext::default();

    let mut density =
        RepulsionDensitySummation::new(&mut bodies[0].particles, NeighborSource::Inner);
    exec(&mut density, &mut bodies, &[], 0, &time, 0.0).unwrap();
    let mut force = RepulsionForce::new(&mut bodies[0].particles, RepulsionVariant::SelfContact);
    exec(&mut force, &mut bodies, &[], 0, &time, 0.0).unwrap();

    bodies[0].particles.fields.get(force.force_field()).to_vec()
}

fn pair_force(distance: f32) -> Vec3 {
    let body = solid(
        "pair",
        vec![Vec3::new(-0.5 * distance, 0.0, 0.0), Vec3::new(0.5 * distance, 0.0, 0.0)],
    );
    let forces = self_contact_forces(body);
    assert!(
        (forces[0] + forces[1]).length() <= 1e-6 * forces[0].length().max(1e-20),
        "pair forces must cancel: {forces:?}"
    );
    forces[0]
}

#[test]
fn test_pair_repels_and_weakens_with_distance() {
    let body = solid("single", vec![Vec3::ZERO]);
    let cutoff = body.adaptation.maximum_cutoff_radius();

    let near = pair_force(0.4 * cutoff);
    let far = pair_force(0.8 * cutoff);

    assert!(near.x < 0.0, "left particle must be pushed to the left, got {near:?}");
    assert!(far.x < 0.0, "left particle must be pushed to the left, got {far:?}");
    assert!(near.y.abs() < 1e-9 * near.x.abs().max(1.0));
    assert!(
        near.length() > far.length(),
        "repulsion must weaken with distance: {near:?} vs {far:?}"
    );
}

#[test]
fn test_no_force_beyond_cutoff() {
    let body = solid("single", vec![Vec3::ZERO]);
    let cutoff = body.adaptation.maximum_cutoff_radius();
    assert_eq!(pair_force(1.1 * cutoff), Vec3::ZERO);
}

#[test]
fn test_self_contact_is_momentum_conserving() {
    let rect = Cuboid::planar(Vec2::ZERO, Vec2::new(0.04, 0.03));
    let mut positions = lattice_positions(&rect, SPACING, Dimensions::Two).unwrap();
    for (k, p) in positions.iter_mut().enumerate() {
        let phase = k as f32 * 0.7;
        *p += Vec3::new(phase.sin(), phase.cos(), 0.0) * 0.2 * SPACING;
    }
    let mut body = solid("block", positions);
    for (k, v) in body.particles.velocity.iter_mut().enumerate() {
        let phase = k as f32 * 1.3;
        *v = Vec3::new(phase.cos(), -phase.sin(), 0.0) * 0.5;
    }

    let forces = self_contact_forces(body);
    let net: Vec3 = forces.iter().copied().sum();
    let scale: f32 = forces.iter().map(|f| f.length()).sum();
    assert!(scale > 0.0);
    assert!(
        net.length() <= 1e-4 * scale,
        "net self-contact force {net:?} should vanish (scale {scale})"
    );
}

#[test]
fn test_force_prior_receives_only_the_change() {
    let mut bodies = vec![solid(
        "pair",
        vec![Vec3::new(-0.006, 0.0, 0.0), Vec3::new(0.006, 0.0, 0.0)],
    )];
    bodies[0].particles.force_prior[0] = Vec3::new(0.0, -3.0, 0.0);
    bodies[0].update_configuration().unwrap();
    let time = TimeContext::default();

    let mut density =
        RepulsionDensitySummation::new(&mut bodies[0].particles, NeighborSource::Inner);
    let mut force = RepulsionForce::new(&mut bodies[0].particles, RepulsionVariant::SelfContact);
    exec(&mut density, &mut bodies, &[], 0, &time, 0.0).unwrap();
    exec(&mut force, &mut bodies, &[], 0, &time, 0.0).unwrap();
    let once = bodies[0].particles.force_prior[0];
    exec(&mut force, &mut bodies, &[], 0, &time, 0.0).unwrap();
    let twice = bodies[0].particles.force_prior[0];

    assert_eq!(once, twice, "re-running the same force must not accumulate");
    let repulsion = bodies[0].particles.fields.get(force.force_field())[0];
    assert_eq!(once, Vec3::new(0.0, -3.0, 0.0) + repulsion);
}

fn wall_row() -> ParticleSet {
    ParticleSet::from_positions(
        (0..9).map(|k| Vec3::new((k as f32 - 4.0) * SPACING, -0.005, 0.0)).collect(),
        SPACING,
        1100.0,
        Dimensions::Two,
    )
    .unwrap()
}

/// A solid particle above a wall row. Link 0 looks from the solid into the wall, link 1
/// from the wall into the solid.
fn wall_scene() -> (Vec<Body>, Vec<ContactLink>) {
    let adaptation = AdaptationConfig::default();
    let wall =
        Body::static_wall("wall", wall_row(), &adaptation, Box::new(rubber()), &config()).unwrap();
    let ball = solid("solid", vec![Vec3::new(0.0, 0.007, 0.0)]);

    let mut bodies = vec![ball, wall];
    for body in &mut bodies {
        body.update_configuration().unwrap();
    }
    let mut contacts = vec![ContactLink::new(0, 1), ContactLink::new(1, 0)];
    for link in &mut contacts {
        link.update(&bodies).unwrap();
    }
    (bodies, contacts)
}

#[test]
fn test_wall_pushes_solid_away() {
    let (mut bodies, contacts) = wall_scene();
    let time = TimeContext::default();

    let mut density =
        RepulsionDensitySummation::new(&mut bodies[0].particles, NeighborSource::Wall);
    exec(&mut density, &mut bodies, &contacts[..1], 0, &time, 0.0).unwrap();
    let rho_rep = bodies[0].particles.fields.get(density.density_field())[0];
    assert!(rho_rep > 0.0, "solid near a wall must see a repulsion density");

    let mut force = RepulsionForce::new(&mut bodies[0].particles, RepulsionVariant::Wall);
    exec(&mut force, &mut bodies, &contacts[..1], 0, &time, 0.0).unwrap();
    let f = bodies[0].particles.force_prior[0];
    assert!(f.y > 0.0, "wall must push the solid upwards, got {f:?}");
    assert!(f.x.abs() < 1e-3 * f.y, "symmetric wall gives no tangential force, got {f:?}");
}

#[test]
fn test_wall_side_feels_the_opposite_force() {
    let (mut bodies, contacts) = wall_scene();
    let time = TimeContext::default();

    let mut density =
        RepulsionDensitySummation::for_variant(&mut bodies[0].particles, RepulsionVariant::Wall);
    exec(&mut density, &mut bodies, &contacts[..1], 0, &time, 0.0).unwrap();
    let mut on_solid = RepulsionForce::new(&mut bodies[0].particles, RepulsionVariant::Wall);
    exec(&mut on_solid, &mut bodies, &contacts[..1], 0, &time, 0.0).unwrap();

    let mut on_wall = RepulsionForce::new(&mut bodies[1].particles, RepulsionVariant::WallContact);
    exec(&mut on_wall, &mut bodies, &contacts[1..], 1, &time, 0.0).unwrap();

    let solid_force = bodies[0].particles.force_prior[0];
    let wall_force: Vec3 = bodies[1].particles.force_prior.iter().copied().sum();
    assert!(wall_force.y < 0.0, "the solid presses the wall down, got {wall_force:?}");
    assert!(
        (solid_force + wall_force).length() <= 1e-4 * solid_force.length(),
        "{solid_force:?} vs {wall_force:?}"
    );
}

#[test]
fn test_two_solids_push_each_other_apart() {
    let mut bodies = vec![
        solid("left", vec![Vec3::new(-0.006, 0.001, 0.0)]),
        solid("right", vec![Vec3::new(0.006, -0.001, 0.0)]),
    ];
    for body in &mut bodies {
        body.update_configuration().unwrap();
    }
    let mut contacts = vec![ContactLink::new(0, 1), ContactLink::new(1, 0)];
    for link in &mut contacts {
        link.update(&bodies).unwrap();
    }
    let time = TimeContext::default();

    for (b, link) in [(0, 0..1), (1, 1..2)] {
        let particles = &mut bodies[b].particles;
        let mut density =
            RepulsionDensitySummation::for_variant(particles, RepulsionVariant::Contact);
        exec(&mut density, &mut bodies, &contacts[link], b, &time, 0.0).unwrap();
    }
    for (b, link) in [(0, 0..1), (1, 1..2)] {
        let mut force = RepulsionForce::new(&mut bodies[b].particles, RepulsionVariant::Contact);
        exec(&mut force, &mut bodies, &contacts[link], b, &time, 0.0).unwrap();
    }

    let left = bodies[0].particles.force_prior[0];
    let right = bodies[1].particles.force_prior[0];
    assert!(left.x < 0.0 && right.x > 0.0, "{left:?} {right:?}");
    assert!((left + right).length() <= 1e-5 * left.length(), "{left:?} vs {right:?}");
}

#[test]
fn test_contact_and_wall_stages_keep_separate_forces() {
    let (mut bodies, mut contacts) = wall_scene();
    bodies.push(solid("lid", vec![Vec3::new(0.0, 0.019, 0.0)]));
    bodies[2].update_configuration().unwrap();
    let mut to_lid = ContactLink::new(0, 2);
    let mut from_lid = ContactLink::new(2, 0);
    to_lid.update(&bodies).unwrap();
    from_lid.update(&bodies).unwrap();
    assert!(!to_lid.relation[0].is_empty());
    // 0: solid -> wall, 1: wall -> solid, 2: solid -> lid, 3: lid -> solid
    contacts.push(to_lid);
    contacts.push(from_lid);
    let time = TimeContext::default();

    let mut solid_density =
        RepulsionDensitySummation::new(&mut bodies[0].particles, NeighborSource::Contact);
    let mut buffer = Vec::new();
    let solid_links = [0, 2];
    exec_with_buffer(
        &mut solid_density,
        &mut bodies,
        &contacts,
        &solid_links,
        0,
        &time,
        0.0,
        &mut buffer,
    )
    .unwrap();
    let mut lid_density =
        RepulsionDensitySummation::new(&mut bodies[2].particles, NeighborSource::Contact);
    exec(&mut lid_density, &mut bodies, &contacts[3..], 2, &time, 0.0).unwrap();

    let mut contact = RepulsionForce::new(&mut bodies[0].particles, RepulsionVariant::Contact);
    let mut wall = RepulsionForce::new(&mut bodies[0].particles, RepulsionVariant::Wall);
    assert_ne!(contact.force_field(), wall.force_field());

    for _ in 0..2 {
        exec(&mut contact, &mut bodies, &contacts[2..3], 0, &time, 0.0).unwrap();
        exec(&mut wall, &mut bodies, &contacts[..1], 0, &time, 0.0).unwrap();
    }

    let fields = &bodies[0].particles.fields;
    let from_lid = fields.get(contact.force_field())[0];
    let from_wall = fields.get(wall.force_field())[0];
    assert!(from_lid.y < 0.0, "the lid pushes down, got {from_lid:?}");
    assert!(from_wall.y > 0.0, "the wall pushes up, got {from_wall:?}");
    assert_eq!(bodies[0].particles.force_prior[0], from_lid + from_wall);
}

#[test]
fn test_resolution_scale_scales_the_force() {
    let (mut bodies, contacts) = wall_scene();
    let time = TimeContext::default();

    let mut density =
        RepulsionDensitySummation::for_variant(&mut bodies[0].particles, RepulsionVariant::Wall);
    exec(&mut density, &mut bodies, &contacts[..1], 0, &time, 0.0).unwrap();

    let particles = &mut bodies[0].particles;
    let mut full = RepulsionForce::new(particles, RepulsionVariant::Wall);
    let mut half =
        RepulsionForce::new(particles, RepulsionVariant::Wall).with_resolution_scale(0.5);
    exec(&mut full, &mut bodies, &contacts[..1], 0, &time, 0.0).unwrap();
    exec(&mut half, &mut bodies, &contacts[..1], 0, &time, 0.0).unwrap();

    let fields = &bodies[0].particles.fields;
    let full = fields.get(full.force_field())[0];
    let half = fields.get(half.force_field())[0];
    assert!(full.y > 0.0);
    assert!((half - 0.5 * full).length() <= 1e-6 * full.length(), "{half:?} vs {full:?}");
}
