use glam::Vec3;

use super::{InteractionContext, ParticleDynamics};
use crate::fields::FieldHandle;
use crate::particle::ParticleSet;
use crate::time_step::TimeContext;

pub const GRAVITY_FORCE: &str = "GravityForce";

/// Uniform body acceleration ramped linearly from zero to full over `ramp_time`.
///
/// The resulting force `m a(t)` is kept in "GravityForce" and its change is added to
/// `force_prior`, so other prior forces are left untouched.
#[derive(Debug)]
pub struct TimeDependentAcceleration {
    acceleration: Vec3,
    ramp_time: f32,
    current: Vec3,
    force: FieldHandle<Vec3>,
}

impl TimeDependentAcceleration {
    pub fn new(particles: &mut ParticleSet, acceleration: Vec3, ramp_time: f32) -> Self {
        Self {
            acceleration,
            ramp_time,
            current: Vec3::ZERO,
            force: particles.fields.register(GRAVITY_FORCE, Vec3::ZERO),
        }
    }

    /// Full acceleration from the first step.
    pub fn constant(particles: &mut ParticleSet, acceleration: Vec3) -> Self {
        Self::new(particles, acceleration, 0.0)
    }

    pub fn acceleration_at(&self, physical_time: f32) -> Vec3 {
        if self.ramp_time <= 0.0 {
            return self.acceleration;
        }
        self.acceleration * (physical_time / self.ramp_time).clamp(0.0, 1.0)
    }
}

impl ParticleDynamics for TimeDependentAcceleration {
    type Accumulation = ();

    fn name(&self) -> &'static str {
        "TimeDependentAcceleration"
    }

    fn setup(&mut self, _particles: &mut ParticleSet, time: &TimeContext, _dt: f32) {
        self.current = self.acceleration_at(time.physical_time);
    }

    fn interaction(&self, _ctx: &InteractionContext<'_>, _i: usize, _dt: f32) {}

    fn update(&self, particles: &mut ParticleSet, i: usize, _: (), _dt: f32) {
        let force = particles.mass[i] * self.current;
        let stored = &mut particles.fields.get_mut(self.force)[i];
        let delta = force - *stored;
        *stored = force;
        particles.force_prior[i] += delta;
    }
}
