//! Particle record: authoritative per-particle state and closed-form kinematics
//!
//! Motion is stored as the state at birth (`x`, `vx`, `ax` at time `t`) and
//! evaluated on demand, so a particle needs no per-frame integration.

use crate::registry::PainterId;
use ember_core::{GroupId, ParticleColor, SimTime};

/// Tolerance, in seconds, used by the liveness checks.
pub const EPSILON: f64 = 0.001;

/// Address of a particle slot: its group and its index in that group's storage.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ParticleKey {
    pub group: GroupId,
    pub index: usize,
}

impl ParticleKey {
    pub const fn new(group: GroupId, index: usize) -> Self {
        Self { group, index }
    }
}

/// One simulated particle.
///
/// Records are reused in place: a slot is "created" and "destroyed" by group
/// bookkeeping, never by constructing or dropping a record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleDatum {
    /// Slot in the owning group's storage
    pub index: usize,
    /// Slot in the system-wide table driven by the state engine
    pub system_index: Option<usize>,
    pub group_id: GroupId,

    /// Birth time in seconds
    pub t: f64,
    /// Life span in seconds, may be infinite
    pub life_span: f64,

    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub ax: f32,
    pub ay: f32,

    pub size: f32,
    pub end_size: f32,

    pub rotation: f32,
    pub rotation_velocity: f32,
    pub auto_rotate: bool,

    // Deformation matrix
    pub xx: f32,
    pub xy: f32,
    pub yx: f32,
    pub yy: f32,

    // Sprite animation
    pub anim_idx: u32,
    pub frame_at: u32,
    pub frame_count: u32,
    /// Milliseconds per frame
    pub frame_duration: f32,
    /// Animation start time in seconds
    pub anim_t: f64,
    pub anim_x: f32,
    pub anim_y: f32,
    pub anim_width: f32,
    pub anim_height: f32,

    pub color: ParticleColor,
    /// Per-particle random value in [0, 1) for painters
    pub r: f32,

    // Painters that last wrote each shadowable attribute group
    pub color_owner: Option<PainterId>,
    pub rotation_owner: Option<PainterId>,
    pub deformation_owner: Option<PainterId>,
    pub animation_owner: Option<PainterId>,
}

impl Default for ParticleDatum {
    fn default() -> Self {
        Self {
            index: 0,
            system_index: None,
            group_id: GroupId::DEFAULT,
            t: -1.0,
            life_span: 0.0,
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            ax: 0.0,
            ay: 0.0,
            size: 0.0,
            end_size: 0.0,
            rotation: 0.0,
            rotation_velocity: 0.0,
            auto_rotate: false,
            xx: 1.0,
            xy: 0.0,
            yx: 0.0,
            yy: 1.0,
            anim_idx: 0,
            frame_at: 0,
            frame_count: 1,
            frame_duration: 1.0,
            anim_t: -1.0,
            anim_x: 0.0,
            anim_y: 0.0,
            anim_width: 1.0,
            anim_height: 1.0,
            color: ParticleColor::WHITE,
            r: 0.0,
            color_owner: None,
            rotation_owner: None,
            deformation_owner: None,
            animation_owner: None,
        }
    }
}

impl ParticleDatum {
    /// A fresh record pre-bound to a group slot
    pub fn new(group_id: GroupId, index: usize) -> Self {
        Self {
            group_id,
            index,
            ..Default::default()
        }
    }

    pub fn key(&self) -> ParticleKey {
        ParticleKey::new(self.group_id, self.index)
    }

    /// Copy every attribute of `other` except this slot's identity
    /// (`index`, `group_id`, `system_index`).
    pub fn clone_data_from(&mut self, other: &ParticleDatum) {
        let index = self.index;
        let group_id = self.group_id;
        let system_index = self.system_index;
        *self = *other;
        self.index = index;
        self.group_id = group_id;
        self.system_index = system_index;
    }

    fn age(&self, now: SimTime) -> f64 {
        now.as_secs_f64() - self.t
    }

    /// Born (by more than `EPSILON`) and not yet expired
    pub fn alive(&self, now: SimTime) -> bool {
        let st = now.as_secs_f64();
        self.t + EPSILON < st && st < self.t + self.life_span - EPSILON
    }

    /// Not yet expired; ignores whether the particle has been born
    pub fn still_alive(&self, now: SimTime) -> bool {
        now.as_secs_f64() < self.t + self.life_span - EPSILON
    }

    /// Seconds until expiry
    pub fn life_left(&self, now: SimTime) -> f64 {
        (self.t + self.life_span) - now.as_secs_f64()
    }

    /// Size interpolated from `size` to `end_size` over the particle's life
    pub fn cur_size(&self, now: SimTime) -> f32 {
        if self.life_span == 0.0 || !self.life_span.is_finite() {
            return if self.life_span == 0.0 { 0.0 } else { self.size };
        }
        let progress = crate::curves::life_progress(self.age(now), self.life_span);
        crate::curves::lerp_f32(self.size, self.end_size, progress)
    }

    // ── Closed-form kinematics ──

    pub fn cur_x(&self, now: SimTime) -> f32 {
        let dt = self.age(now);
        (self.x as f64 + self.vx as f64 * dt + 0.5 * self.ax as f64 * dt * dt) as f32
    }

    pub fn cur_vx(&self, now: SimTime) -> f32 {
        let dt = self.age(now);
        (self.vx as f64 + dt * self.ax as f64) as f32
    }

    pub fn cur_ax(&self) -> f32 {
        self.ax
    }

    pub fn cur_y(&self, now: SimTime) -> f32 {
        let dt = self.age(now);
        (self.y as f64 + self.vy as f64 * dt + 0.5 * self.ay as f64 * dt * dt) as f32
    }

    pub fn cur_vy(&self, now: SimTime) -> f32 {
        let dt = self.age(now);
        (self.vy as f64 + dt * self.ay as f64) as f32
    }

    pub fn cur_ay(&self) -> f32 {
        self.ay
    }

    /// Set the x acceleration without moving the current x velocity or position
    pub fn set_instantaneous_ax(&mut self, ax: f32, now: SimTime) {
        let (x, vx) = resolve_acceleration(self.x, self.vx, self.ax, ax, self.age(now));
        self.ax = ax;
        self.vx = vx;
        self.x = x;
    }

    /// Set the x velocity without moving the current x position
    pub fn set_instantaneous_vx(&mut self, vx: f32, now: SimTime) {
        let (x, vx) = resolve_velocity(self.x, self.vx, self.ax, vx, self.age(now));
        self.vx = vx;
        self.x = x;
    }

    /// Set the current x position
    pub fn set_instantaneous_x(&mut self, x: f32, now: SimTime) {
        self.x = resolve_position(self.vx, self.ax, x, self.age(now));
    }

    /// Set the y acceleration without moving the current y velocity or position
    pub fn set_instantaneous_ay(&mut self, ay: f32, now: SimTime) {
        let (y, vy) = resolve_acceleration(self.y, self.vy, self.ay, ay, self.age(now));
        self.ay = ay;
        self.vy = vy;
        self.y = y;
    }

    /// Set the y velocity without moving the current y position
    pub fn set_instantaneous_vy(&mut self, vy: f32, now: SimTime) {
        let (y, vy) = resolve_velocity(self.y, self.vy, self.ay, vy, self.age(now));
        self.vy = vy;
        self.y = y;
    }

    /// Set the current y position
    pub fn set_instantaneous_y(&mut self, y: f32, now: SimTime) {
        self.y = resolve_position(self.vy, self.ay, y, self.age(now));
    }

    /// Push the birth and animation times forward by `time` seconds while
    /// keeping the particle's current position and velocity.
    pub fn extend_life(&mut self, time: f64, now: SimTime) {
        let new_x = self.cur_x(now) as f64;
        let new_y = self.cur_y(now) as f64;
        let new_vx = self.cur_vx(now) as f64;
        let new_vy = self.cur_vy(now) as f64;

        self.t += time;
        self.anim_t += time;

        let elapsed = self.age(now);
        let (ax, ay) = (self.ax as f64, self.ay as f64);
        let evx = new_vx - elapsed * ax;
        let ex = new_x - elapsed * evx - 0.5 * elapsed * elapsed * ax;
        let evy = new_vy - elapsed * ay;
        let ey = new_y - elapsed * evy - 0.5 * elapsed * elapsed * ay;

        self.x = ex as f32;
        self.vx = evx as f32;
        self.y = ey as f32;
        self.vy = evy as f32;
    }

    /// One-line state summary for debug logging
    pub fn debug_dump(&self, now: SimTime) -> String {
        format!(
            "Particle {:?} {}/{} alive={} pos=({}, {}) vel=({}, {}) acc=({}, {}) size=({}, {}) time=({}, {}; {})",
            self.system_index,
            self.group_id,
            self.index,
            self.still_alive(now),
            self.x,
            self.y,
            self.vx,
            self.vy,
            self.ax,
            self.ay,
            self.size,
            self.end_size,
            self.t,
            self.life_span,
            now.as_secs_f64(),
        )
    }
}

// Per-axis back-solving shared by the x and y setters. `dt` is the particle's
// age; inputs describe the birth state, outputs the new birth state.

fn resolve_acceleration(p: f32, v: f32, a: f32, new_a: f32, dt: f64) -> (f32, f32) {
    let (p, v, a, new_a) = (p as f64, v as f64, a as f64, new_a as f64);
    let cur_p = p + v * dt + 0.5 * a * dt * dt;
    let new_v = (v + dt * a) - dt * new_a;
    let new_p = cur_p - dt * new_v - 0.5 * dt * dt * new_a;
    (new_p as f32, new_v as f32)
}

fn resolve_velocity(p: f32, v: f32, a: f32, target_v: f32, dt: f64) -> (f32, f32) {
    let (p, v, a, target_v) = (p as f64, v as f64, a as f64, target_v as f64);
    let cur_p = p + v * dt + 0.5 * a * dt * dt;
    let new_v = target_v - dt * a;
    let new_p = cur_p - dt * new_v - 0.5 * dt * dt * a;
    (new_p as f32, new_v as f32)
}

fn resolve_position(v: f32, a: f32, target_p: f32, dt: f64) -> f32 {
    let (v, a, target_p) = (v as f64, a as f64, target_p as f64);
    (target_p - dt * v - 0.5 * dt * dt * a) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(ms: i64) -> SimTime {
        SimTime::from_millis(ms)
    }

    fn particle(t: f64, life_span: f64) -> ParticleDatum {
        ParticleDatum {
            t,
            life_span,
            ..ParticleDatum::new(GroupId::DEFAULT, 0)
        }
    }

    #[test]
    fn still_alive_boundary() {
        let p = particle(0.0, 1.0);
        assert!(p.still_alive(ms(0)));
        assert!(p.still_alive(ms(998)));
        assert!(!p.still_alive(ms(999)));
        assert!(!p.still_alive(ms(1000)));
    }

    #[test]
    fn alive_excludes_unborn() {
        let p = particle(0.0, 1.0);
        assert!(!p.alive(ms(0)));
        assert!(!p.alive(ms(1)));
        assert!(p.alive(ms(2)));
        assert!(p.alive(ms(998)));
        assert!(!p.alive(ms(999)));
    }

    #[test]
    fn infinite_life_stays_alive() {
        let p = particle(0.0, f64::INFINITY);
        assert!(p.still_alive(ms(i64::MAX / 2)));
        assert!((p.cur_size(ms(5000)) - p.size).abs() < 1e-6);
    }

    #[test]
    fn constant_velocity_position() {
        let p = ParticleDatum {
            vx: 10.0,
            ..particle(0.0, 5.0)
        };
        assert!((p.cur_x(ms(1000)) - 10.0).abs() < 1e-4);
        assert!((p.cur_vx(ms(1000)) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn accelerated_motion() {
        let p = ParticleDatum {
            y: 1.0,
            vy: 2.0,
            ay: 4.0,
            ..particle(1.0, 5.0)
        };
        // two seconds after birth: 1 + 2*2 + 0.5*4*4
        assert!((p.cur_y(ms(3000)) - 13.0).abs() < 1e-4);
        assert!((p.cur_vy(ms(3000)) - 10.0).abs() < 1e-4);
        assert_eq!(p.cur_ay(), 4.0);
    }

    #[test]
    fn instantaneous_velocity_keeps_position() {
        let mut p = ParticleDatum {
            x: 3.0,
            vx: 2.0,
            ax: 1.5,
            ..particle(0.25, 10.0)
        };
        let now = ms(1750);
        let before = p.cur_x(now);
        p.set_instantaneous_vx(-4.0, now);
        assert!((p.cur_vx(now) - (-4.0)).abs() < 1e-4);
        assert!((p.cur_x(now) - before).abs() < 1e-4);
        assert_eq!(p.ax, 1.5);
    }

    #[test]
    fn instantaneous_acceleration_keeps_trajectory_continuous() {
        let mut p = ParticleDatum {
            vx: 10.0,
            ..particle(0.0, 10.0)
        };
        let now = ms(1000);
        assert!((p.cur_x(now) - 10.0).abs() < 1e-4);

        p.set_instantaneous_ax(-5.0, now);
        assert!((p.cur_x(now) - 10.0).abs() < 1e-4);
        assert!((p.cur_vx(now) - 10.0).abs() < 1e-4);
        // 10 + 10*1 - 0.5*5*1^2
        assert!((p.cur_x(ms(2000)) - 17.5).abs() < 1e-4);
    }

    #[test]
    fn instantaneous_position_y() {
        let mut p = ParticleDatum {
            vy: 1.0,
            ay: 2.0,
            ..particle(0.0, 10.0)
        };
        let now = ms(2000);
        let v_before = p.cur_vy(now);
        p.set_instantaneous_y(50.0, now);
        assert!((p.cur_y(now) - 50.0).abs() < 1e-4);
        assert!((p.cur_vy(now) - v_before).abs() < 1e-4);

        p.set_instantaneous_ay(0.0, now);
        assert!((p.cur_y(now) - 50.0).abs() < 1e-4);
        assert!((p.cur_vy(now) - v_before).abs() < 1e-4);

        p.set_instantaneous_vy(0.0, now);
        assert!((p.cur_y(ms(3000)) - 50.0).abs() < 1e-4);
    }

    #[test]
    fn extend_life_keeps_visual_state() {
        let mut p = ParticleDatum {
            x: 1.0,
            vx: 3.0,
            ax: -1.0,
            y: -2.0,
            vy: 0.5,
            ay: 2.0,
            anim_t: 0.0,
            ..particle(0.0, 4.0)
        };
        let now = ms(1500);
        let before = (p.cur_x(now), p.cur_y(now), p.cur_vx(now), p.cur_vy(now));
        p.extend_life(1.0, now);
        assert!((p.t - 1.0).abs() < 1e-12);
        assert!((p.anim_t - 1.0).abs() < 1e-12);
        assert!((p.cur_x(now) - before.0).abs() < 1e-4);
        assert!((p.cur_y(now) - before.1).abs() < 1e-4);
        assert!((p.cur_vx(now) - before.2).abs() < 1e-4);
        assert!((p.cur_vy(now) - before.3).abs() < 1e-4);
        assert!(p.still_alive(ms(4500)));
    }

    #[test]
    fn cur_size_interpolates() {
        let p = ParticleDatum {
            size: 10.0,
            end_size: 20.0,
            ..particle(0.0, 2.0)
        };
        assert!((p.cur_size(ms(0)) - 10.0).abs() < 1e-4);
        assert!((p.cur_size(ms(1000)) - 15.0).abs() < 1e-4);
        assert_eq!(particle(0.0, 0.0).cur_size(ms(10)), 0.0);
    }

    #[test]
    fn clone_preserves_identity() {
        let mut dst = ParticleDatum::new(GroupId(2), 7);
        dst.system_index = Some(4);
        let src = ParticleDatum {
            x: 5.0,
            vy: 3.0,
            system_index: Some(9),
            ..particle(1.0, 2.0)
        };
        dst.clone_data_from(&src);
        assert_eq!(dst.index, 7);
        assert_eq!(dst.group_id, GroupId(2));
        assert_eq!(dst.system_index, Some(4));
        assert_eq!(dst.x, 5.0);
        assert_eq!(dst.vy, 3.0);
        assert_eq!(dst.life_span, 2.0);
    }

    #[test]
    fn debug_dump_mentions_slot() {
        let p = ParticleDatum::new(GroupId(1), 3);
        let dump = p.debug_dump(ms(0));
        assert!(dump.contains("1/3"));
    }
}
