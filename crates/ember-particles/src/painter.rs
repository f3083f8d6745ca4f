//! Painter hand-off: the two-phase protocol between simulation and rendering
//!
//! During a simulation step the system only *notifies* painters (`load`,
//! `reload`); painters queue the touched slots. Once per render pass a painter
//! asks the system to sync (`ParticleSystem::system_sync`), which drains the
//! queue through `perform_pending_commits` against a read-only view of the
//! particle storage.

use crate::datum::{ParticleDatum, ParticleKey};
use crate::group::ParticleGroupData;
use crate::registry::PainterId;
use bytemuck::{Pod, Zeroable};
use ember_core::{GroupId, ParticleColor, SimTime};
use std::any::Any;
use std::collections::HashMap;

/// Consumer of particle state for one or more groups
pub trait ParticlePainter {
    /// Group names this painter draws; empty means the default group
    fn groups(&self) -> &[String];

    /// Number of particle slots this painter is sized for
    fn count(&self) -> usize;

    /// Capacity of the painter's groups changed
    fn set_count(&mut self, count: usize);

    /// A freshly emitted particle is ready. The painter may initialize the
    /// attributes it shadows and claim their ownership tags.
    fn load(&mut self, id: PainterId, datum: &mut ParticleDatum);

    /// An existing particle changed (affected, moved or killed)
    fn reload(&mut self, id: PainterId, datum: &mut ParticleDatum);

    /// Drop queued work; the next commit rebuilds everything
    fn reset(&mut self) {}

    /// Request a repaint
    fn update(&mut self) {}

    /// Apply queued notifications. Called through `ParticleSystem::system_sync`.
    fn perform_pending_commits(&mut self, view: &GroupView<'_>, now: SimTime);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Queue of slots with pending visual updates, drained once per render pass
#[derive(Debug, Default, Clone)]
pub struct PendingCommits {
    keys: Vec<ParticleKey>,
}

impl PendingCommits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: ParticleKey) {
        self.keys.push(key);
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, ParticleKey> {
        self.keys.drain(..)
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Read-only view of a system's groups handed to painters during a commit
pub struct GroupView<'a> {
    groups: &'a [ParticleGroupData],
    group_ids: &'a HashMap<String, GroupId>,
}

impl<'a> GroupView<'a> {
    pub fn new(groups: &'a [ParticleGroupData], group_ids: &'a HashMap<String, GroupId>) -> Self {
        Self { groups, group_ids }
    }

    pub fn group_id(&self, name: &str) -> Option<GroupId> {
        self.group_ids.get(name).copied()
    }

    pub fn group(&self, id: GroupId) -> Option<&'a ParticleGroupData> {
        self.groups.get(id.index())
    }

    pub fn datum(&self, key: ParticleKey) -> Option<&'a ParticleDatum> {
        self.group(key.group)?.datum(key.index)
    }

    pub fn groups(&self) -> &'a [ParticleGroupData] {
        self.groups
    }
}

/// Packed per-particle vertex data for an instanced renderer.
///
/// Carries the birth state rather than the current position: the renderer
/// evaluates the closed-form motion itself. 64 bytes, 4 rows of vec4.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleVertex {
    /// x, y, vx, vy
    pub pos_vel: [f32; 4],
    /// ax, ay, size, end size
    pub accel_size: [f32; 4],
    /// birth time, life span, rotation, rotation velocity
    pub timing: [f32; 4],
    /// rgba
    pub color: [f32; 4],
}

impl ParticleVertex {
    pub fn from_datum(d: &ParticleDatum, color: ParticleColor) -> Self {
        let life_span = if d.life_span.is_finite() {
            d.life_span as f32
        } else {
            f32::MAX
        };
        Self {
            pos_vel: [d.x, d.y, d.vx, d.vy],
            accel_size: [d.ax, d.ay, d.size, d.end_size],
            timing: [d.t as f32, life_span, d.rotation, d.rotation_velocity],
            color: color.to_array(),
        }
    }

    /// True when the vertex describes a particle that can still be seen at `now`
    pub fn visible_at(&self, now: SimTime) -> bool {
        let t = now.as_secs_f64() as f32;
        self.timing[1] > 0.0 && self.timing[0] <= t && t < self.timing[0] + self.timing[1]
    }
}

/// Reference painter: keeps one vertex per slot of its groups, laid out group
/// after group in the order the groups are named.
pub struct VertexPainter {
    groups: Vec<String>,
    count: usize,
    vertices: Vec<ParticleVertex>,
    pending: PendingCommits,
    /// Color written to particles whose color this painter owns
    color: Option<ParticleColor>,
    /// Colors for particles whose color tag another painter owns
    shadow_colors: HashMap<ParticleKey, ParticleColor>,
    please_reset: bool,
    commits: usize,
}

impl VertexPainter {
    pub fn new(groups: Vec<String>) -> Self {
        Self {
            groups,
            count: 0,
            vertices: Vec::new(),
            pending: PendingCommits::new(),
            color: None,
            shadow_colors: HashMap::new(),
            please_reset: true,
            commits: 0,
        }
    }

    pub fn with_color(mut self, color: ParticleColor) -> Self {
        self.color = Some(color);
        self
    }

    pub fn vertices(&self) -> &[ParticleVertex] {
        &self.vertices
    }

    /// Vertex buffer as raw bytes for upload
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Total number of vertices written by commits so far
    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn visible_count(&self, now: SimTime) -> usize {
        self.vertices.iter().filter(|v| v.visible_at(now)).count()
    }

    fn group_names(&self) -> Vec<&str> {
        if self.groups.is_empty() {
            vec![""]
        } else {
            self.groups.iter().map(String::as_str).collect()
        }
    }

    /// Position of a slot in the vertex buffer
    fn offset_of(&self, view: &GroupView<'_>, key: ParticleKey) -> Option<usize> {
        let mut offset = 0;
        for name in self.group_names() {
            let id = view.group_id(name)?;
            if id == key.group {
                return Some(offset + key.index);
            }
            offset += view.group(id).map_or(0, ParticleGroupData::size);
        }
        None
    }

    fn commit(&mut self, view: &GroupView<'_>, key: ParticleKey) {
        let Some(datum) = view.datum(key) else {
            return;
        };
        let Some(offset) = self.offset_of(view, key) else {
            return;
        };
        if offset >= self.vertices.len() {
            self.vertices.resize(offset + 1, ParticleVertex::zeroed());
        }
        let color = self
            .shadow_colors
            .get(&key)
            .copied()
            .unwrap_or(datum.color);
        self.vertices[offset] = ParticleVertex::from_datum(datum, color);
        self.commits += 1;
    }

    fn commit_all(&mut self, view: &GroupView<'_>) {
        self.vertices.fill(ParticleVertex::zeroed());
        let mut keys = Vec::new();
        for name in self.group_names() {
            if let Some(group) = view.group_id(name).and_then(|id| view.group(id)) {
                keys.extend(group.data().iter().map(ParticleDatum::key));
            }
        }
        for key in keys {
            self.commit(view, key);
        }
    }
}

impl ParticlePainter for VertexPainter {
    fn groups(&self) -> &[String] {
        &self.groups
    }

    fn count(&self) -> usize {
        self.count
    }

    /// Growing an earlier group shifts the offsets of later ones, so any
    /// change in size rebuilds the whole buffer on the next commit.
    fn set_count(&mut self, count: usize) {
        if count != self.count {
            self.please_reset = true;
        }
        self.count = count;
        self.vertices.resize(count, ParticleVertex::zeroed());
    }

    fn load(&mut self, id: PainterId, datum: &mut ParticleDatum) {
        if let Some(color) = self.color {
            match datum.color_owner {
                Some(owner) if owner != id => {
                    self.shadow_colors.insert(datum.key(), color);
                }
                _ => {
                    datum.color = color;
                    datum.color_owner = Some(id);
                    self.shadow_colors.remove(&datum.key());
                }
            }
        }
        self.pending.push(datum.key());
    }

    fn reload(&mut self, _id: PainterId, datum: &mut ParticleDatum) {
        self.pending.push(datum.key());
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.shadow_colors.clear();
        self.please_reset = true;
    }

    fn perform_pending_commits(&mut self, view: &GroupView<'_>, _now: SimTime) {
        if self.please_reset {
            self.please_reset = false;
            self.pending.clear();
            self.commit_all(view);
            return;
        }
        let keys: Vec<ParticleKey> = self.pending.drain().collect();
        for key in keys {
            self.commit(view, key);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
