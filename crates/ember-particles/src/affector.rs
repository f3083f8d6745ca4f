//! Affectors: per-frame mutation of live particles
//!
//! An affector never touches the system directly. It mutates the particle it
//! is handed and returns an [`Affect`] telling the system what else to do.

use crate::datum::ParticleDatum;
use ember_core::{GroupId, SimTime};

/// What the system should do after an affector ran on a particle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affect {
    /// Not affected; painters are not told
    Unchanged,
    /// Kinematics or visuals changed; painters reload the slot
    Changed,
    /// Move the particle into another group
    MoveTo(GroupId),
    /// Steer the particle toward a group: through the state engine when one
    /// is attached, otherwise an immediate move
    SetGoal { group: GroupId, jump: bool },
    /// End the particle now
    Kill,
}

pub trait ParticleAffector {
    /// Group names this affector applies to; empty means every group
    fn groups(&self) -> &[String];

    fn enabled(&self) -> bool {
        true
    }

    /// Affect each particle at most once per life, with `dt = 1.0`
    fn once_off(&self) -> bool {
        false
    }

    /// Whether `reset` must run for every freshly emitted particle
    fn needs_reset(&self) -> bool {
        self.once_off()
    }

    /// Initialize per-particle state for a freshly emitted particle
    fn reset(&mut self, _datum: &ParticleDatum) {}

    /// Resolve any group names the affector targets. Called whenever the
    /// system's groups may have changed.
    fn bind_groups(&mut self, _resolve: &mut dyn FnMut(&str) -> GroupId) {}

    /// Extra filter applied after the built-in liveness and once-off checks
    fn should_affect(&self, _datum: &ParticleDatum, _now: SimTime) -> bool {
        true
    }

    fn affect_particle(&mut self, datum: &mut ParticleDatum, dt: f64, now: SimTime) -> Affect;
}

/// Sets the remaining life of affected particles
#[derive(Debug, Clone)]
pub struct Age {
    pub groups: Vec<String>,
    pub enabled: bool,
    pub once_off: bool,
    /// Remaining life in milliseconds after being affected
    pub life_left_ms: i64,
    /// When false, the particle keeps its current position and velocity
    /// instead of jumping to where its new age puts it
    pub advance_position: bool,
}

impl Default for Age {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            enabled: true,
            once_off: true,
            life_left_ms: 0,
            advance_position: true,
        }
    }
}

impl ParticleAffector for Age {
    fn groups(&self) -> &[String] {
        &self.groups
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn once_off(&self) -> bool {
        self.once_off
    }

    fn affect_particle(&mut self, d: &mut ParticleDatum, _dt: f64, now: SimTime) -> Affect {
        if !d.still_alive(now) {
            return Affect::Unchanged;
        }
        let ttl = self.life_left_ms as f64 / 1000.0;
        let new_t = now.as_secs_f64() - (d.life_span - ttl);
        if !self.advance_position && ttl > 0.0 {
            d.extend_life(new_t - d.t, now);
        } else {
            d.t = new_t;
        }
        Affect::Changed
    }
}

/// Constant acceleration applied through velocity changes
#[derive(Debug, Clone)]
pub struct Gravity {
    pub groups: Vec<String>,
    pub enabled: bool,
    /// Pixels per second squared
    pub magnitude: f32,
    /// Direction in degrees; 90 points down the y axis
    pub angle: f32,
}

impl Default for Gravity {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            enabled: true,
            magnitude: 0.0,
            angle: 90.0,
        }
    }
}

impl Gravity {
    fn components(&self) -> (f64, f64) {
        let (s, c) = (self.angle as f64).to_radians().sin_cos();
        (self.magnitude as f64 * c, self.magnitude as f64 * s)
    }
}

impl ParticleAffector for Gravity {
    fn groups(&self) -> &[String] {
        &self.groups
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn affect_particle(&mut self, d: &mut ParticleDatum, dt: f64, now: SimTime) -> Affect {
        if self.magnitude == 0.0 {
            return Affect::Unchanged;
        }
        let (dx, dy) = self.components();
        let vx = d.cur_vx(now) as f64 + dx * dt;
        let vy = d.cur_vy(now) as f64 + dy * dt;
        d.set_instantaneous_vx(vx as f32, now);
        d.set_instantaneous_vy(vy as f32, now);
        Affect::Changed
    }
}

/// Sends affected particles to a goal group
#[derive(Debug, Clone, Default)]
pub struct GroupGoal {
    pub groups: Vec<String>,
    pub enabled: bool,
    pub goal_state: String,
    /// Skip intermediate states when driven by a state engine
    pub jump: bool,
    goal: Option<GroupId>,
}

impl GroupGoal {
    pub fn new(goal_state: impl Into<String>) -> Self {
        Self {
            groups: Vec::new(),
            enabled: true,
            goal_state: goal_state.into(),
            jump: false,
            goal: None,
        }
    }

    pub fn goal(&self) -> Option<GroupId> {
        self.goal
    }
}

impl ParticleAffector for GroupGoal {
    fn groups(&self) -> &[String] {
        &self.groups
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn bind_groups(&mut self, resolve: &mut dyn FnMut(&str) -> GroupId) {
        self.goal = Some(resolve(&self.goal_state));
    }

    fn affect_particle(&mut self, _d: &mut ParticleDatum, _dt: f64, _now: SimTime) -> Affect {
        match self.goal {
            Some(group) => Affect::SetGoal {
                group,
                jump: self.jump,
            },
            None => Affect::Unchanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: i64) -> SimTime {
        SimTime::from_millis(v)
    }

    fn particle(life: f64) -> ParticleDatum {
        ParticleDatum {
            t: 0.0,
            life_span: life,
            vx: 10.0,
            ..ParticleDatum::new(GroupId::DEFAULT, 0)
        }
    }

    #[test]
    fn age_kills_by_default() {
        let mut age = Age::default();
        let mut d = particle(5.0);
        assert_eq!(age.affect_particle(&mut d, 1.0, ms(1000)), Affect::Changed);
        assert!(!d.still_alive(ms(1000)));
        // Dead particles are left alone
        assert_eq!(age.affect_particle(&mut d, 1.0, ms(1000)), Affect::Unchanged);
    }

    #[test]
    fn age_sets_remaining_life() {
        let mut age = Age {
            life_left_ms: 500,
            ..Age::default()
        };
        let mut d = particle(5.0);
        age.affect_particle(&mut d, 1.0, ms(1000));
        assert!((d.life_left(ms(1000)) - 0.5).abs() < 1e-9);
        // Position follows the new age
        assert!((d.cur_x(ms(1000)) - 45.0).abs() < 1e-3);
    }

    #[test]
    fn age_can_hold_position() {
        let mut age = Age {
            life_left_ms: 500,
            advance_position: false,
            ..Age::default()
        };
        let mut d = particle(5.0);
        let before = d.cur_x(ms(1000));
        age.affect_particle(&mut d, 1.0, ms(1000));
        assert!((d.life_left(ms(1000)) - 0.5).abs() < 1e-9);
        assert!((d.cur_x(ms(1000)) - before).abs() < 1e-3);
    }

    #[test]
    fn gravity_accumulates_velocity() {
        let mut gravity = Gravity {
            magnitude: 100.0,
            ..Gravity::default()
        };
        let mut d = particle(5.0);
        let x_before = d.cur_x(ms(1000));
        assert_eq!(gravity.affect_particle(&mut d, 0.5, ms(1000)), Affect::Changed);
        assert!((d.cur_vy(ms(1000)) - 50.0).abs() < 1e-3);
        assert!(d.cur_vx(ms(1000)).abs() > 9.99);
        assert!((d.cur_x(ms(1000)) - x_before).abs() < 1e-3);
    }

    #[test]
    fn zero_gravity_is_inert() {
        let mut gravity = Gravity::default();
        let mut d = particle(5.0);
        assert_eq!(gravity.affect_particle(&mut d, 1.0, ms(0)), Affect::Unchanged);
    }

    #[test]
    fn group_goal_needs_binding() {
        let mut goal = GroupGoal::new("smoke");
        let mut d = particle(5.0);
        assert_eq!(goal.affect_particle(&mut d, 1.0, ms(0)), Affect::Unchanged);
        goal.bind_groups(&mut |name| {
            assert_eq!(name, "smoke");
            GroupId(4)
        });
        assert_eq!(goal.goal(), Some(GroupId(4)));
        assert_eq!(
            goal.affect_particle(&mut d, 1.0, ms(0)),
            Affect::SetGoal {
                group: GroupId(4),
                jump: false
            }
        );
    }
}
