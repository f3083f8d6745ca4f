//! Emitters: sources of new particles
//!
//! The system calls `emit_window` once per step. The emitter allocates slots
//! with `ParticleSystem::new_datum`, fills them in and hands them back through
//! `ParticleSystem::emit_particle`.

use crate::rand::ParticleRng;
use crate::system::{ParticleSystem, DEFAULT_MAX_LIFE_MS};
use ember_core::{GroupId, ParticleColor, SimTime, Transform2D, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Slack when comparing accumulated birth times against the window end
const WINDOW_EPSILON: f64 = 1e-9;

pub trait ParticleEmitter {
    /// Name of the group new particles go into
    fn group(&self) -> &str;

    /// Number of slots this emitter needs to run without dropping particles
    fn particle_count(&self) -> usize;

    /// Restart emission bookkeeping. Called on registration and system reset.
    fn reset(&mut self);

    fn enabled(&self) -> bool {
        true
    }

    fn set_enabled(&mut self, _enabled: bool) {}

    /// Emit `count` particles on the next window regardless of rate, at an
    /// emitter-local point if given
    fn burst(&mut self, _count: usize, _at: Option<Vec2>) {}

    /// Emit at the configured rate for `duration_ms` while disabled
    fn pulse(&mut self, _duration_ms: i64) {}

    /// Maps emitter-local coordinates to system coordinates
    fn transform(&self) -> Transform2D {
        Transform2D::IDENTITY
    }

    /// Emit every particle due up to `now`
    fn emit_window(&mut self, system: &mut ParticleSystem, group: GroupId, now: SimTime);
}

/// Configuration of the rectangular rate emitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    pub group: String,
    pub enabled: bool,
    /// Particles per second
    pub emit_rate: f32,
    pub life_span_ms: i64,
    pub life_span_variation_ms: i64,
    /// Particles live until the system is reset
    pub infinite: bool,
    /// Overrides the capacity derived from rate and life span
    pub maximum_emitted: Option<usize>,
    /// Emit as if the emitter had already been running this long
    pub start_time_ms: i64,
    /// Grow groups instead of dropping particles when full
    pub overwrite: bool,

    /// Emission rectangle, emitter-local
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Emitter placement in the system
    pub position: Vec2,
    /// Emitter rotation in degrees
    pub rotation: f32,

    pub size: f32,
    /// Negative means same as `size`
    pub end_size: f32,
    pub size_variation: f32,
    pub velocity: Vec2,
    pub velocity_variation: Vec2,
    pub acceleration: Vec2,
    pub acceleration_variation: Vec2,
    /// Hex RGB color, e.g. "#ff8800"
    pub color: Option<String>,
    pub seed: u32,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            group: String::new(),
            enabled: true,
            emit_rate: 10.0,
            life_span_ms: 1000,
            life_span_variation_ms: 0,
            infinite: false,
            maximum_emitted: None,
            start_time_ms: 0,
            overwrite: true,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            position: Vec2::ZERO,
            rotation: 0.0,
            size: 16.0,
            end_size: -1.0,
            size_variation: 0.0,
            velocity: Vec2::ZERO,
            velocity_variation: Vec2::ZERO,
            acceleration: Vec2::ZERO,
            acceleration_variation: Vec2::ZERO,
            color: None,
            seed: 1,
        }
    }
}

/// Parse "#rrggbb" or "rrggbb"
pub fn parse_color(text: &str) -> Option<ParticleColor> {
    let hex = text.strip_prefix('#').unwrap_or(text);
    if hex.len() != 6 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok().map(ParticleColor::from_hex)
}

/// Rate-based emitter over a rectangle, with bursts and pulses
pub struct Emitter {
    config: EmitterConfig,
    color: Option<ParticleColor>,
    transform: Transform2D,
    rng: ParticleRng,
    /// Pending bursts: count and optional emitter-local position
    burst_queue: VecDeque<(usize, Option<Vec2>)>,
    pulse_left_ms: i64,
    /// Birth time of the next rate-driven particle, in seconds
    last_emission: f64,
    last_timestamp: f64,
    reset_last: bool,
    /// Remaining emissions for particles that never die
    emit_cap: Option<usize>,
}

impl Emitter {
    pub fn new(config: EmitterConfig) -> Self {
        let color = config.color.as_deref().and_then(parse_color);
        let transform = Transform2D::from_rotation(config.rotation).then(
            &Transform2D::from_translation(config.position.x, config.position.y),
        );
        let rng = ParticleRng::new(config.seed);
        Self {
            config,
            color,
            transform,
            rng,
            burst_queue: VecDeque::new(),
            pulse_left_ms: 0,
            last_emission: 0.0,
            last_timestamp: 0.0,
            reset_last: true,
            emit_cap: None,
        }
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    fn life_ms(&mut self) -> i64 {
        let variation = self.config.life_span_variation_ms.max(0);
        let jitter = if variation > 0 {
            (self.rng.next_f32() * (2 * variation + 1) as f32).floor() as i64 - variation
        } else {
            0
        };
        (self.config.life_span_ms + jitter).max(0)
    }

    fn spawn_point(&mut self, at: Option<Vec2>) -> Vec2 {
        at.unwrap_or_else(|| {
            let c = &self.config;
            let (x, y, w, h) = (c.x, c.y, c.width, c.height);
            Vec2::new(x + self.rng.next_f32() * w, y + self.rng.next_f32() * h)
        })
    }
}

impl ParticleEmitter for Emitter {
    fn group(&self) -> &str {
        &self.config.group
    }

    fn particle_count(&self) -> usize {
        if let Some(max) = self.config.maximum_emitted {
            return max;
        }
        let life_ms = if self.config.infinite {
            DEFAULT_MAX_LIFE_MS
        } else {
            self.config.life_span_ms + self.config.life_span_variation_ms
        };
        (self.config.emit_rate.max(0.0) as f64 * life_ms as f64 / 1000.0) as usize
    }

    fn reset(&mut self) {
        self.reset_last = true;
        self.emit_cap = None;
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    fn burst(&mut self, count: usize, at: Option<Vec2>) {
        if count > 0 {
            self.burst_queue.push_back((count, at));
        }
    }

    fn pulse(&mut self, duration_ms: i64) {
        if !self.config.enabled {
            self.pulse_left_ms = duration_ms;
        }
    }

    fn transform(&self) -> Transform2D {
        self.transform
    }

    fn emit_window(&mut self, system: &mut ParticleSystem, group: GroupId, now: SimTime) {
        if !self.config.enabled && self.pulse_left_ms <= 0 && self.burst_queue.is_empty() {
            self.reset_last = true;
            return;
        }

        let mut time = now.as_secs_f64();
        if self.reset_last {
            self.last_emission = time - self.config.start_time_ms as f64 / 1000.0;
            self.last_timestamp = time;
            self.reset_last = false;
            self.emit_cap = None;
        }

        let mut rate_active = self.config.enabled;
        if self.pulse_left_ms > 0 {
            self.pulse_left_ms -= ((time - self.last_timestamp) * 1000.0).round() as i64;
            if self.pulse_left_ms < 0 {
                if !self.config.enabled {
                    time += self.pulse_left_ms as f64 / 1000.0;
                }
                self.pulse_left_ms = 0;
            }
            rate_active = true;
        }

        let max_life_ms = system.max_life_ms();
        let max_life = if self.config.infinite {
            max_life_ms as f64 / 1000.0
        } else {
            (self.config.life_span_ms + self.config.life_span_variation_ms) as f64 / 1000.0
        };
        let mut pt = self.last_emission;
        if !rate_active || self.config.emit_rate <= 0.0 {
            pt = time;
        }
        // Skip particles that would already be dead
        if pt + max_life < time {
            pt = time - max_life;
        }
        let particle_ratio = 1.0 / self.config.emit_rate.max(f32::MIN_POSITIVE) as f64;
        let respect_limits = !self.config.overwrite;

        let mut emitted = Vec::new();
        while (pt + WINDOW_EPSILON < time && self.emit_cap != Some(0)) || !self.burst_queue.is_empty() {
            let burst = self.burst_queue.front().map(|(_, at)| *at);
            if let Some(key) = system.new_datum(group, respect_limits, None, None) {
                let birth = if burst.is_some() { time } else { pt };
                let mut life = self.life_ms();
                if self.config.infinite || life >= max_life_ms {
                    life = max_life_ms;
                    let cap = self.emit_cap.unwrap_or_else(|| self.particle_count());
                    self.emit_cap = Some(cap.saturating_sub(1));
                }
                let at = self.spawn_point(burst.flatten());
                let c = &self.config;
                let size = self.rng.vary(c.size, c.size_variation).max(0.0);
                let end_size = if c.end_size < 0.0 {
                    size
                } else {
                    self.rng.vary(c.end_size, c.size_variation).max(0.0)
                };
                let (velocity, velocity_var) = (c.velocity, c.velocity_variation);
                let (accel, accel_var) = (c.acceleration, c.acceleration_variation);
                let vx = self.rng.vary(velocity.x, velocity_var.x);
                let vy = self.rng.vary(velocity.y, velocity_var.y);
                let ax = self.rng.vary(accel.x, accel_var.x);
                let ay = self.rng.vary(accel.y, accel_var.y);
                let r = self.rng.next_f32();

                if let Some(d) = system.datum_mut(key) {
                    d.t = birth;
                    d.life_span = life as f64 / 1000.0;
                    d.anim_t = birth;
                    d.x = at.x;
                    d.y = at.y;
                    d.vx = vx;
                    d.vy = vy;
                    d.ax = ax;
                    d.ay = ay;
                    d.size = size;
                    d.end_size = end_size;
                    d.r = r;
                    if let Some(color) = self.color {
                        d.color = color;
                    }
                }
                emitted.push(key);
            }

            if let Some(front) = self.burst_queue.front_mut() {
                front.0 -= 1;
                if front.0 == 0 {
                    self.burst_queue.pop_front();
                }
            } else {
                pt += particle_ratio;
            }
        }

        for key in emitted {
            system.emit_particle(key, &*self);
        }

        self.last_emission = pt;
        self.last_timestamp = time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: i64) -> SimTime {
        SimTime::from_millis(v)
    }

    fn system_with(config: EmitterConfig) -> (ParticleSystem, crate::registry::EmitterId) {
        let mut sys = ParticleSystem::new();
        let id = sys.register_emitter(Box::new(Emitter::new(config)));
        sys.component_complete();
        (sys, id)
    }

    fn allocated(sys: &ParticleSystem) -> usize {
        sys.groups().iter().map(|g| g.allocated()).sum()
    }

    #[test]
    fn parse_color_forms() {
        assert_eq!(parse_color("#ff8800"), Some(ParticleColor::new(255, 136, 0, 255)));
        assert_eq!(parse_color("00ff00"), Some(ParticleColor::new(0, 255, 0, 255)));
        assert_eq!(parse_color("#fff"), None);
        assert_eq!(parse_color("zzzzzz"), None);
    }

    #[test]
    fn capacity_from_rate_and_life() {
        let e = Emitter::new(EmitterConfig {
            emit_rate: 20.0,
            life_span_ms: 1500,
            life_span_variation_ms: 500,
            ..Default::default()
        });
        assert_eq!(e.particle_count(), 40);

        let infinite = Emitter::new(EmitterConfig {
            emit_rate: 2.0,
            infinite: true,
            ..Default::default()
        });
        assert_eq!(infinite.particle_count(), 1200);

        let capped = Emitter::new(EmitterConfig {
            maximum_emitted: Some(7),
            ..Default::default()
        });
        assert_eq!(capped.particle_count(), 7);
    }

    #[test]
    fn emits_at_rate() {
        let (mut sys, _) = system_with(EmitterConfig {
            emit_rate: 10.0,
            life_span_ms: 10_000,
            ..Default::default()
        });
        assert_eq!(sys.group(GroupId::DEFAULT).unwrap().size(), 100);
        sys.update_current_time(ms(0));
        assert_eq!(allocated(&sys), 0);
        sys.update_current_time(ms(1000));
        assert_eq!(allocated(&sys), 10);
        // Birth times are spread across the window
        let births: Vec<f64> = sys.groups()[0].data()[..10].iter().map(|d| d.t).collect();
        assert!((births[0] - 0.0).abs() < 1e-9);
        assert!((births[9] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn skips_particles_already_dead() {
        let (mut sys, _) = system_with(EmitterConfig {
            emit_rate: 10.0,
            life_span_ms: 500,
            ..Default::default()
        });
        sys.update_current_time(ms(0));
        sys.update_current_time(ms(5000));
        // Only the last half second of the window is emitted
        assert_eq!(allocated(&sys), 5);
        assert!(sys.groups()[0]
            .data()
            .iter()
            .filter(|d| d.life_span > 0.0)
            .all(|d| d.t >= 4.5 - 1e-9));
    }

    #[test]
    fn burst_emits_at_window_time() {
        let (mut sys, id) = system_with(EmitterConfig {
            enabled: false,
            life_span_ms: 1000,
            ..Default::default()
        });
        sys.update_current_time(ms(0));
        sys.emitter_mut(id).unwrap().burst(3, Some(Vec2::new(5.0, 6.0)));
        sys.update_current_time(ms(200));
        assert_eq!(allocated(&sys), 3);
        let d = sys.groups()[0].data()[0];
        assert!((d.t - 0.2).abs() < 1e-9);
        assert_eq!((d.x, d.y), (5.0, 6.0));
        // The queue drained
        sys.update_current_time(ms(300));
        assert_eq!(allocated(&sys), 3);
    }

    #[test]
    fn emitter_transform_applies() {
        let (mut sys, id) = system_with(EmitterConfig {
            enabled: false,
            position: Vec2::new(100.0, 50.0),
            ..Default::default()
        });
        sys.emitter_mut(id).unwrap().burst(1, None);
        sys.update_current_time(ms(10));
        let d = sys.groups()[0].data()[0];
        assert_eq!((d.x, d.y), (100.0, 50.0));
    }

    #[test]
    fn respects_limits_without_overwrite() {
        let (mut sys, _) = system_with(EmitterConfig {
            emit_rate: 100.0,
            life_span_ms: 100,
            overwrite: false,
            ..Default::default()
        });
        let capacity = sys.group(GroupId::DEFAULT).unwrap().size();
        assert_eq!(capacity, 10);
        sys.update_current_time(ms(0));
        sys.update_current_time(ms(50));
        sys.update_current_time(ms(90));
        assert!(allocated(&sys) <= capacity);
        assert_eq!(sys.group(GroupId::DEFAULT).unwrap().size(), capacity);
    }

    #[test]
    fn infinite_particles_are_capped() {
        let (mut sys, _) = system_with(EmitterConfig {
            emit_rate: 10.0,
            infinite: true,
            maximum_emitted: Some(5),
            ..Default::default()
        });
        sys.update_current_time(ms(0));
        sys.update_current_time(ms(2000));
        sys.update_current_time(ms(4000));
        assert_eq!(allocated(&sys), 5);
        let d = sys.groups()[0].data()[0];
        assert!((d.life_span - 600.0).abs() < 1e-9);
    }

    #[test]
    fn pulse_runs_disabled_emitter_briefly() {
        let (mut sys, id) = system_with(EmitterConfig {
            enabled: false,
            emit_rate: 10.0,
            life_span_ms: 10_000,
            ..Default::default()
        });
        sys.update_current_time(ms(0));
        sys.emitter_mut(id).unwrap().pulse(500);
        sys.update_current_time(ms(100));
        sys.update_current_time(ms(2000));
        sys.update_current_time(ms(4000));
        // 500ms of emission at 10/s
        assert_eq!(allocated(&sys), 5);
    }
}
