use crate::body::{Body, ContactLink};
use crate::config::SimulationConfig;
use crate::dynamics::{exec_with_buffer, ParticleDynamics};
use crate::error::{Result, SphError};
use crate::time_step::{AcousticTimeStep, AdvectionTimeStep, TimeContext};

/// How often a registered stage runs inside [`Solver::integrate_to`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageRate {
    /// Once per advection step, before the acoustic sub-cycles.
    Advection,
    /// Once per acoustic sub-step.
    Acoustic,
}

trait Stage: Send + Sync {
    fn name(&self) -> &'static str;
    fn rate(&self) -> StageRate;
    fn run(
        &mut self,
        bodies: &mut [Body],
        contacts: &[ContactLink],
        time: &TimeContext,
        dt: f32,
    ) -> Result<()>;
}

struct DynamicsStage<D: ParticleDynamics> {
    dynamics: D,
    body: usize,
    /// Contact links this stage reads.
    links: Vec<usize>,
    rate: StageRate,
    buffer: Vec<D::Accumulation>,
}

impl<D: ParticleDynamics> Stage for DynamicsStage<D> {
    fn name(&self) -> &'static str {
        self.dynamics.name()
    }

    fn rate(&self) -> StageRate {
        self.rate
    }

    fn run(
        &mut self,
        bodies: &mut [Body],
        contacts: &[ContactLink],
        time: &TimeContext,
        dt: f32,
    ) -> Result<()> {
        exec_with_buffer(
            &mut self.dynamics,
            bodies,
            contacts,
            &self.links,
            self.body,
            time,
            dt,
            &mut self.buffer,
        )
    }
}

/// Dual-rate time integrator over a set of bodies.
///
/// Stages run in registration order. Spatial indices and neighborhoods are refreshed
/// once per advection step, before any stage reads them.
pub struct Solver {
    pub config: SimulationConfig,
    bodies: Vec<Body>,
    contacts: Vec<ContactLink>,
    stages: Vec<Box<dyn Stage>>,
    time: TimeContext,
    acoustic: AcousticTimeStep,
    advection: AdvectionTimeStep,
}

impl Solver {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let acoustic = AcousticTimeStep::new(config.acoustic_cfl);
        let advection = AdvectionTimeStep::new(config.advection_cfl, config.reference_speed);
        Ok(Self {
            config,
            bodies: Vec::new(),
            contacts: Vec::new(),
            stages: Vec::new(),
            time: TimeContext::default(),
            acoustic,
            advection,
        })
    }

    pub fn add_body(&mut self, body: Body) -> usize {
        self.bodies.push(body);
        self.bodies.len() - 1
    }

    /// Let `body` see the particles of `target`. Returns the link id.
    pub fn add_contact(&mut self, body: usize, target: usize) -> Result<usize> {
        ContactLink::validate(&self.bodies, body, target)?;
        self.contacts.push(ContactLink::new(body, target));
        Ok(self.contacts.len() - 1)
    }

    /// Register a kernel that only reads the inner neighborhoods of `body`.
    pub fn add_dynamics<D>(&mut self, body: usize, rate: StageRate, dynamics: D) -> Result<()>
    where
        D: ParticleDynamics + 'static,
        D::Accumulation: 'static,
    {
        self.add_contact_dynamics(body, rate, dynamics, &[])
    }

    /// Register a kernel that also reads the contact links `links`, as returned by
    /// [`Solver::add_contact`]. Every link must start at `body`.
    pub fn add_contact_dynamics<D>(
        &mut self,
        body: usize,
        rate: StageRate,
        dynamics: D,
        links: &[usize],
    ) -> Result<()>
    where
        D: ParticleDynamics + 'static,
        D::Accumulation: 'static,
    {
        if body >= self.bodies.len() {
            return Err(SphError::UnknownBody(body));
        }
        for &l in links {
            let link = self.contacts.get(l).ok_or(SphError::UnknownContact(l))?;
            if link.body != body {
                return Err(SphError::InvalidConfig(format!(
                    "stage `{}` on body {body} cannot read contact link {l} of body {}",
                    dynamics.name(),
                    link.body
                )));
            }
        }
        self.stages.push(Box::new(DynamicsStage {
            dynamics,
            body,
            links: links.to_vec(),
            rate,
            buffer: Vec::new(),
        }));
        Ok(())
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn body(&self, i: usize) -> Option<&Body> {
        self.bodies.get(i)
    }

    pub fn body_mut(&mut self, i: usize) -> Option<&mut Body> {
        self.bodies.get_mut(i)
    }

    pub fn contacts(&self) -> &[ContactLink] {
        &self.contacts
    }

    pub fn time(&self) -> TimeContext {
        self.time
    }

    /// Names of the registered stages, in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Refresh spatial indices, inner neighborhoods and contact neighborhoods.
    pub fn update_configuration(&mut self) -> Result<()> {
        for body in &mut self.bodies {
            body.update_configuration()?;
        }
        for link in &mut self.contacts {
            link.update(&self.bodies)?;
        }
        Ok(())
    }

    fn run_stages(&mut self, rate: StageRate, dt: f32) -> Result<()> {
        for stage in self.stages.iter_mut().filter(|s| s.rate() == rate) {
            stage.run(&mut self.bodies, &self.contacts, &self.time, dt)?;
        }
        Ok(())
    }

    fn check_finite(&self) -> Result<()> {
        for body in &self.bodies {
            if let Err(err) = body.particles.check_finite(self.time.physical_time) {
                log::error!("body `{}` diverged: {err}", body.name);
                return Err(err);
            }
        }
        Ok(())
    }

    /// One step where every stage runs once with the same `dt`.
    pub fn step(&mut self, dt: f32) -> Result<()> {
        self.update_configuration()?;
        self.run_stages(StageRate::Advection, dt)?;
        self.run_stages(StageRate::Acoustic, dt)?;
        self.check_finite()?;
        self.time.advance(dt);
        Ok(())
    }

    /// Smallest acoustic CFL bound over the moving bodies.
    pub fn acoustic_time_step(&self) -> f32 {
        self.bodies
            .iter()
            .filter(|b| !b.is_static)
            .map(|b| self.acoustic.compute(&b.particles, b.material.as_ref(), &b.adaptation))
            .fold(f32::INFINITY, f32::min)
    }

    /// Smallest advection CFL bound over the moving bodies.
    pub fn advection_time_step(&self) -> f32 {
        self.bodies
            .iter()
            .filter(|b| !b.is_static)
            .map(|b| self.advection.compute(&b.particles, &b.adaptation))
            .fold(f32::INFINITY, f32::min)
    }

    /// Advance to `end_time` with advection steps, each sub-cycled by acoustic steps.
    pub fn integrate_to(&mut self, end_time: f32) -> Result<()> {
        let tolerance = f32::EPSILON * end_time.abs().max(1.0);
        while end_time - self.time.physical_time > tolerance {
            self.update_configuration()?;
            let dt_advection = self
                .advection_time_step()
                .min(end_time - self.time.physical_time);
            self.run_stages(StageRate::Advection, dt_advection)?;

            let mut elapsed = 0.0;
            let mut substeps = 0;
            while dt_advection - elapsed > dt_advection * 1.0e-6 {
                if substeps >= self.config.max_acoustic_substeps {
                    log::warn!(
                        "acoustic sub-cycling stopped after {substeps} steps at t = {}",
                        self.time.physical_time
                    );
                    break;
                }
                let dt = self.acoustic_time_step().min(dt_advection - elapsed);
                self.run_stages(StageRate::Acoustic, dt)?;
                self.check_finite()?;
                self.time.advance(dt);
                elapsed += dt;
                substeps += 1;
            }
        }
        Ok(())
    }
}
