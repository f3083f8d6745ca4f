//! The particle system: owns every group and drives the simulation step
//!
//! Each call to [`ParticleSystem::update_current_time`] runs one step:
//! recycle expired particles in every group, advance the state engine, let
//! emitters emit, let affectors affect, then queue painter reloads for every
//! affected particle. Painters pick their queued work up through
//! [`ParticleSystem::system_sync`].

use crate::affector::{Affect, ParticleAffector};
use crate::datum::{ParticleDatum, ParticleKey};
use crate::emitter::ParticleEmitter;
use crate::group::{Lifecycle, PainterRegistry, ParticleGroupData};
use crate::painter::{GroupView, ParticlePainter};
use crate::registry::{AffectorId, EmitterId, GroupDeclId, PainterId, Registry};
use crate::state::{ParticleGroup, StateDefinition, StateEngine, StochasticEngine};
use ember_core::{GroupId, Result, SimTime};
use ember_runtime::{AnimationClock, ClockState, EventBus, RuntimeSystem};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Lives at or above this are treated as unending by the recycler
pub const DEFAULT_MAX_LIFE_MS: i64 = 600_000;

/// Slots added when an unlimited emission finds its group full
pub const DEFAULT_GROWTH_INCREMENT: usize = 10;

/// Notifications published on the system's event bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticleEvent {
    RunningChanged(bool),
    PausedChanged(bool),
    EmptyChanged(bool),
}

pub struct ParticleSystem {
    time: SimTime,
    groups: Vec<ParticleGroupData>,
    group_ids: HashMap<String, GroupId>,
    /// System index to particle slot, for the state engine
    by_sys_idx: Vec<Option<ParticleKey>>,
    reusable_indexes: BTreeSet<usize>,
    next_index: usize,

    emitters: Registry<dyn ParticleEmitter>,
    affectors: Registry<dyn ParticleAffector>,
    painters: PainterRegistry,
    declared_groups: Registry<ParticleGroup>,
    state_engine: Option<Box<dyn StateEngine>>,

    /// Particles affected this step, reloaded in painters at its end
    needs_reset: Vec<ParticleKey>,
    /// Particles already handled by each once-off affector
    once_offed: HashMap<AffectorId, HashSet<ParticleKey>>,
    /// Affector currently checked out and running
    running_affector: Option<AffectorId>,
    /// Particles emitted while `running_affector` was out, reset once it is back
    deferred_resets: Vec<ParticleKey>,

    max_life_ms: i64,
    growth_increment: usize,

    running: bool,
    paused: bool,
    empty: bool,
    initialized: bool,
    component_complete: bool,

    clock: AnimationClock,
    events: EventBus<ParticleEvent>,
}

impl Default for ParticleSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticleSystem {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_LIFE_MS, DEFAULT_GROWTH_INCREMENT)
    }

    pub fn with_limits(max_life_ms: i64, growth_increment: usize) -> Self {
        let mut system = Self {
            time: SimTime::ZERO,
            groups: Vec::new(),
            group_ids: HashMap::new(),
            by_sys_idx: Vec::new(),
            reusable_indexes: BTreeSet::new(),
            next_index: 0,
            emitters: Registry::new(),
            affectors: Registry::new(),
            painters: PainterRegistry::new(),
            declared_groups: Registry::new(),
            state_engine: None,
            needs_reset: Vec::new(),
            once_offed: HashMap::new(),
            running_affector: None,
            deferred_resets: Vec::new(),
            max_life_ms: max_life_ms.max(1),
            growth_increment: growth_increment.max(1),
            running: true,
            paused: false,
            empty: true,
            initialized: false,
            component_complete: false,
            clock: AnimationClock::new(),
            events: EventBus::new(),
        };
        system.init_groups();
        system
    }

    // ── Accessors ──

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn max_life_ms(&self) -> i64 {
        self.max_life_ms
    }

    pub fn growth_increment(&self) -> usize {
        self.growth_increment
    }

    /// Sum of all group capacities
    pub fn particle_count(&self) -> usize {
        self.groups.iter().map(ParticleGroupData::size).sum()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// True when the last step found no particle in use
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn clock(&self) -> &AnimationClock {
        &self.clock
    }

    pub fn events(&self) -> &EventBus<ParticleEvent> {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<ParticleEvent> {
        self.events.drain()
    }

    pub fn groups(&self) -> &[ParticleGroupData] {
        &self.groups
    }

    pub fn group(&self, id: GroupId) -> Option<&ParticleGroupData> {
        self.groups.get(id.index())
    }

    pub fn group_id(&self, name: &str) -> Option<GroupId> {
        self.group_ids.get(name).copied()
    }

    /// Look a group up by name, creating an empty one if needed
    pub fn group_id_or_create(&mut self, name: &str) -> GroupId {
        if let Some(id) = self.group_ids.get(name) {
            return *id;
        }
        let id = GroupId::from(self.groups.len());
        self.groups
            .push(ParticleGroupData::new(id, name, self.growth_increment));
        self.group_ids.insert(name.to_string(), id);
        log::debug!("Registered particle group {name:?} as {id}");
        id
    }

    pub fn datum(&self, key: ParticleKey) -> Option<&ParticleDatum> {
        self.groups.get(key.group.index())?.datum(key.index)
    }

    pub fn datum_mut(&mut self, key: ParticleKey) -> Option<&mut ParticleDatum> {
        self.groups.get_mut(key.group.index())?.datum_mut(key.index)
    }

    /// Slot currently bound to a system index
    pub fn by_system_index(&self, sys_index: usize) -> Option<ParticleKey> {
        self.by_sys_idx.get(sys_index).copied().flatten()
    }

    pub fn system_index_capacity(&self) -> usize {
        self.by_sys_idx.len()
    }

    pub fn state_engine(&self) -> Option<&dyn StateEngine> {
        self.state_engine.as_deref()
    }

    /// Read-only view of the groups, as handed to painters
    pub fn view(&self) -> GroupView<'_> {
        GroupView::new(&self.groups, &self.group_ids)
    }

    fn lifecycle(&self) -> Lifecycle {
        Lifecycle {
            now: self.time,
            max_life_ms: self.max_life_ms,
        }
    }

    // ── Registration ──

    pub fn register_emitter(&mut self, mut emitter: Box<dyn ParticleEmitter>) -> EmitterId {
        log::debug!("Registering emitter for group {:?}", emitter.group());
        emitter.reset();
        let id = self.emitters.insert(emitter);
        if self.component_complete {
            self.emitter_added(id);
        }
        id
    }

    pub fn unregister_emitter(&mut self, id: EmitterId) -> Option<Box<dyn ParticleEmitter>> {
        self.emitters.remove(id)
    }

    pub fn emitter(&self, id: EmitterId) -> Option<&dyn ParticleEmitter> {
        self.emitters.get(id)
    }

    /// Mutable access to an emitter. Call `emitters_changed` after changing
    /// anything that affects its group or capacity.
    pub fn emitter_mut(
        &mut self,
        id: EmitterId,
    ) -> Option<&mut (dyn ParticleEmitter + 'static)> {
        self.emitters.get_mut(id)
    }

    pub fn register_affector(&mut self, mut affector: Box<dyn ParticleAffector>) -> AffectorId {
        log::debug!("Registering affector for groups {:?}", affector.groups());
        if self.component_complete {
            affector.bind_groups(&mut |name| self.group_id_or_create(name));
        }
        let id = self.affectors.insert(affector);
        self.once_offed.insert(id, HashSet::new());
        id
    }

    pub fn unregister_affector(&mut self, id: AffectorId) -> Option<Box<dyn ParticleAffector>> {
        self.once_offed.remove(&id);
        self.affectors.remove(id)
    }

    pub fn affector(&self, id: AffectorId) -> Option<&dyn ParticleAffector> {
        self.affectors.get(id)
    }

    pub fn affector_mut(
        &mut self,
        id: AffectorId,
    ) -> Option<&mut (dyn ParticleAffector + 'static)> {
        self.affectors.get_mut(id)
    }

    pub fn register_painter(&mut self, painter: Box<dyn ParticlePainter>) -> PainterId {
        log::debug!("Registering painter for groups {:?}", painter.groups());
        let id = self.painters.insert(painter);
        self.load_painter(id);
        id
    }

    pub fn unregister_painter(&mut self, id: PainterId) -> Option<Box<dyn ParticlePainter>> {
        for group in &mut self.groups {
            group.unsubscribe(id);
        }
        self.painters.remove(id)
    }

    pub fn painter(&self, id: PainterId) -> Option<&dyn ParticlePainter> {
        self.painters.get(id)
    }

    pub fn painter_mut(
        &mut self,
        id: PainterId,
    ) -> Option<&mut (dyn ParticlePainter + 'static)> {
        self.painters.get_mut(id)
    }

    /// A registered painter as its concrete type
    pub fn painter_as<P: ParticlePainter + 'static>(&self, id: PainterId) -> Option<&P> {
        self.painters.get(id)?.as_any().downcast_ref()
    }

    /// Declare a group with timed transitions; this creates the state engine
    pub fn register_group(&mut self, group: ParticleGroup) -> GroupDeclId {
        log::debug!("Registering group declaration {:?}", group.name);
        let id = self.declared_groups.insert(Box::new(group));
        self.create_engine();
        id
    }

    // ── Lifecycle ──

    /// Mark construction finished: start the clock and build the groups
    pub fn component_complete(&mut self) {
        self.component_complete = true;
        self.reset();
    }

    /// Discard every group and particle and start over with only the
    /// default group (id 0).
    pub fn init_groups(&mut self) {
        self.reusable_indexes.clear();
        self.next_index = 0;
        self.groups.clear();
        self.group_ids.clear();
        self.needs_reset.clear();
        self.deferred_resets.clear();
        for set in self.once_offed.values_mut() {
            set.clear();
        }
        self.empty = true;
        let default = self.group_id_or_create("");
        debug_assert_eq!(default, GroupId::DEFAULT);
    }

    /// Rebuild everything from the registered collaborators.
    ///
    /// Time goes back to 0 and all particles are discarded. When not running
    /// the system stays uninitialized until started again.
    pub fn reset(&mut self) {
        if !self.component_complete {
            return;
        }
        self.time = SimTime::ZERO;
        self.by_sys_idx.clear();
        if let Some(engine) = &mut self.state_engine {
            engine.reset();
        }
        self.init_groups();

        if !self.running {
            self.initialized = false;
            return;
        }

        for (_, emitter) in self.emitters.iter_mut() {
            emitter.reset();
        }
        self.emitters_changed();

        for id in self.painters.handles() {
            self.load_painter(id);
            if let Some(p) = self.painters.get_mut(id) {
                p.reset();
            }
        }

        if self.clock.state() != ClockState::Stopped {
            self.clock.stop();
        }
        self.clock.start();
        if self.paused {
            self.clock.pause();
        }

        self.initialized = true;
        log::debug!(
            "Particle system reset: {} groups, {} particles",
            self.groups.len(),
            self.particle_count()
        );
    }

    pub fn set_running(&mut self, running: bool) {
        if self.running == running {
            return;
        }
        self.running = running;
        self.events.push(ParticleEvent::RunningChanged(running));
        self.set_paused(false);
        if self.component_complete {
            if running {
                self.clock.start();
            } else {
                self.clock.stop();
            }
        }
        self.reset();
    }

    pub fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        if self.clock.state() != ClockState::Stopped {
            if paused {
                self.clock.pause();
            } else {
                self.clock.resume();
            }
        }
        if !paused {
            for (_, p) in self.painters.iter_mut() {
                p.update();
            }
        }
        self.events.push(ParticleEvent::PausedChanged(paused));
    }

    pub fn start(&mut self) {
        self.set_running(true);
    }

    pub fn stop(&mut self) {
        self.set_running(false);
    }

    /// Stop and start again, discarding every particle
    pub fn restart(&mut self) {
        self.set_running(false);
        self.set_running(true);
    }

    pub fn pause(&mut self) {
        self.set_paused(true);
    }

    pub fn resume(&mut self) {
        self.set_paused(false);
    }

    // ── Capacity planning ──

    /// Subscribe a painter to its groups and size it to their total capacity.
    /// A painter naming no group draws the default group.
    pub fn load_painter(&mut self, id: PainterId) {
        if !self.component_complete {
            return;
        }
        let Some(names) = self.painters.get(id).map(|p| p.groups().to_vec()) else {
            return;
        };
        for group in &mut self.groups {
            group.unsubscribe(id);
        }

        let ids: Vec<GroupId> = if names.is_empty() {
            vec![GroupId::DEFAULT]
        } else {
            names.iter().map(|n| self.group_id_or_create(n)).collect()
        };
        let mut count = 0;
        for gid in ids {
            let group = &mut self.groups[gid.index()];
            count += group.size();
            group.subscribe(id);
        }
        if let Some(p) = self.painters.get_mut(id) {
            p.set_count(count);
            p.update();
        }
    }

    /// Resize every group to fit its emitters. Groups never shrink.
    pub fn emitters_changed(&mut self) {
        if !self.component_complete {
            return;
        }
        let wanted: Vec<(String, usize)> = self
            .emitters
            .iter()
            .map(|(_, e)| (e.group().to_string(), e.particle_count()))
            .collect();

        let mut new_sizes = vec![0; self.groups.len()];
        for (name, count) in wanted {
            let gid = self.group_id_or_create(&name);
            if gid.index() >= new_sizes.len() {
                new_sizes.resize(gid.index() + 1, 0);
            }
            new_sizes[gid.index()] += count;
        }

        for (i, group) in self.groups.iter_mut().enumerate() {
            let size = new_sizes.get(i).copied().unwrap_or(0).max(group.size());
            group.set_size(size, &mut self.painters);
        }
        self.post_process_emitters();
    }

    /// Grow the emitter's group by its capacity
    pub fn emitter_added(&mut self, id: EmitterId) {
        if !self.component_complete {
            return;
        }
        let Some((name, count)) = self
            .emitters
            .get(id)
            .map(|e| (e.group().to_string(), e.particle_count()))
        else {
            return;
        };
        let gid = self.group_id_or_create(&name);
        let group = &mut self.groups[gid.index()];
        let size = group.size() + count;
        group.set_size(size, &mut self.painters);
        self.post_process_emitters();
    }

    fn post_process_emitters(&mut self) {
        let count = self.particle_count();
        log::debug!(
            "Particle system emitters changed. New particle count: {count} in {} groups",
            self.groups.len()
        );
        if count > self.by_sys_idx.len() {
            self.by_sys_idx.resize(count, None);
        }

        for id in self.affectors.handles() {
            let Some(mut affector) = self.affectors.take(id) else {
                continue;
            };
            affector.bind_groups(&mut |name| self.group_id_or_create(name));
            self.affectors.restore(id, affector);
        }

        for id in self.painters.handles() {
            self.load_painter(id);
        }

        if !self.declared_groups.is_empty() {
            self.create_engine();
        }
    }

    /// Build or refresh the state engine from the declared groups, or drop it
    /// when none are declared.
    pub fn create_engine(&mut self) {
        if !self.component_complete {
            return;
        }
        if self.declared_groups.is_empty() {
            self.state_engine = None;
            return;
        }

        let declared: Vec<ParticleGroup> = self
            .declared_groups
            .iter()
            .map(|(_, g)| g.clone())
            .collect();
        let mut by_group: HashMap<GroupId, StateDefinition> = HashMap::new();
        for decl in &declared {
            let gid = self.group_id_or_create(&decl.name);
            let transitions = decl
                .to
                .iter()
                .map(|(name, weight)| (self.group_id_or_create(name), *weight))
                .collect();
            by_group.insert(
                gid,
                StateDefinition {
                    duration_ms: decl.duration_ms,
                    duration_variation_ms: decl.duration_variation_ms,
                    transitions,
                },
            );
        }
        let states = (0..self.groups.len())
            .map(|i| by_group.remove(&GroupId::from(i)).unwrap_or_default())
            .collect();

        if self.state_engine.is_some() {
            log::debug!("Resetting existing state engine");
        } else {
            self.state_engine = Some(Box::new(StochasticEngine::new()));
        }
        let count = self.by_sys_idx.len();
        if let Some(engine) = &mut self.state_engine {
            engine.set_count(count);
            engine.set_states(states);
        }
    }

    // ── Particle allocation ──

    /// Reserve a system index: the lowest released one, otherwise the next
    /// fresh one, growing the table as needed.
    pub fn next_system_index(&mut self) -> usize {
        if let Some(index) = self.reusable_indexes.pop_first() {
            return index;
        }
        if self.next_index >= self.by_sys_idx.len() {
            let len = self.by_sys_idx.len();
            let grown = if len < 10 { 10 } else { (len as f64 * 1.1) as usize };
            self.by_sys_idx.resize(grown.max(self.next_index + 1), None);
            if let Some(engine) = &mut self.state_engine {
                engine.set_count(self.by_sys_idx.len());
            }
        }
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    fn release_system_index(&mut self, index: usize) {
        if let Some(engine) = &mut self.state_engine {
            engine.stop(index);
        }
        self.reusable_indexes.insert(index);
        if let Some(slot) = self.by_sys_idx.get_mut(index) {
            *slot = None;
        }
    }

    /// Allocate a particle slot in `group`.
    ///
    /// Returns `None` when `respect_limits` is set and the group is full.
    /// `clone_from` copies every attribute except the new slot's identity.
    /// `sys_index` forces the system index (used when moving a particle
    /// between groups); otherwise the slot keeps or receives one.
    pub fn new_datum(
        &mut self,
        group: GroupId,
        respect_limits: bool,
        sys_index: Option<usize>,
        clone_from: Option<&ParticleDatum>,
    ) -> Option<ParticleKey> {
        let clock = self.lifecycle();
        debug_assert!(group.index() < self.groups.len(), "unknown group {group}");
        let data = self.groups.get_mut(group.index())?;
        let index = data.new_datum(respect_limits, clock, &mut self.painters)?;
        let key = ParticleKey::new(group, index);

        let datum = data.datum_mut(index)?;
        if let Some(source) = clone_from {
            datum.clone_data_from(source);
        }
        let existing = datum.system_index;

        let assigned = match (sys_index, existing) {
            (None, Some(current)) => current,
            (None, None) => self.next_system_index(),
            (Some(requested), current) => {
                if let Some(old) = current.filter(|old| *old != requested) {
                    self.release_system_index(old);
                }
                requested
            }
        };
        if assigned >= self.by_sys_idx.len() {
            self.by_sys_idx.resize(assigned + 1, None);
            if let Some(engine) = &mut self.state_engine {
                engine.set_count(self.by_sys_idx.len());
            }
        }
        self.by_sys_idx[assigned] = Some(key);
        if let Some(datum) = self.datum_mut(key) {
            datum.system_index = Some(assigned);
        }

        if let Some(engine) = &mut self.state_engine {
            engine.start(assigned, group);
        }
        self.empty = false;
        Some(key)
    }

    /// Map a freshly filled particle from emitter-local to system coordinates
    /// and make it live.
    pub fn emit_particle(&mut self, key: ParticleKey, emitter: &dyn ParticleEmitter) {
        let transform = emitter.transform();
        if !transform.is_identity() {
            if let Some(d) = self.datum_mut(key) {
                let (x, y) = transform.map(d.x, d.y);
                d.x = x;
                d.y = y;
            }
        }
        self.finish_new_datum(key);
    }

    /// Queue the particle for recycling, reset per-particle affector state
    /// and tell the group's painters to load it.
    pub fn finish_new_datum(&mut self, key: ParticleKey) {
        let clock = self.lifecycle();
        let Some(group) = self.groups.get_mut(key.group.index()) else {
            return;
        };
        group.prepare_recycler(key.index, clock);

        self.reset_affectors(key);

        self.groups[key.group.index()].load_painters(key.index, &mut self.painters);
    }

    fn reset_affectors(&mut self, key: ParticleKey) {
        let Some(datum) = self.datum(key).copied() else {
            return;
        };
        if self.running_affector.is_some() {
            self.deferred_resets.push(key);
        }
        for (id, a) in self.affectors.iter_mut() {
            reset_affector(&mut self.once_offed, &self.group_ids, id, a, &datum);
        }
    }

    /// Move a particle to another group, keeping its system index.
    /// The old slot is killed.
    pub fn move_groups(&mut self, key: ParticleKey, new_group: GroupId) {
        let Some(source) = self.datum(key).copied() else {
            return;
        };
        if source.group_id == new_group {
            return;
        }
        let Some(moved) = self.new_datum(new_group, false, source.system_index, Some(&source))
        else {
            return;
        };
        self.finish_new_datum(moved);

        if let Some(old) = self.datum_mut(key) {
            old.system_index = None;
        }
        self.kill(key);
    }

    /// End a particle now and free its slot
    pub fn kill(&mut self, key: ParticleKey) {
        if let Some(group) = self.groups.get_mut(key.group.index()) {
            group.kill(key.index, &mut self.painters);
        }
    }

    fn particle_state_change(&mut self, sys_index: usize) {
        let Some(key) = self.by_system_index(sys_index) else {
            return;
        };
        if !self.datum(key).is_some_and(|d| d.still_alive(self.time)) {
            return;
        }
        let Some(state) = self
            .state_engine
            .as_ref()
            .and_then(|e| e.cur_state(sys_index))
        else {
            return;
        };
        self.move_groups(key, state);
    }

    // ── Simulation step ──

    /// Advance the simulation to `now`.
    ///
    /// Earlier times are ignored; only `reset` rewinds.
    pub fn update_current_time(&mut self, now: SimTime) {
        if !self.initialized {
            return;
        }
        if now < self.time {
            log::warn!("Ignoring time regression from {} to {now}", self.time);
            return;
        }
        let dt = (now - self.time) as f64 / 1000.0;
        self.time = now;
        self.needs_reset.clear();

        for group in &mut self.groups {
            group.prune_painters(&self.painters);
        }

        let was_empty = self.empty;
        let clock = self.lifecycle();
        self.empty = true;
        for group in &mut self.groups {
            self.empty = group.recycle(clock) && self.empty;
        }
        if was_empty != self.empty {
            self.events.push(ParticleEvent::EmptyChanged(self.empty));
        }

        let changed = match &mut self.state_engine {
            Some(engine) => engine.update(now),
            None => Vec::new(),
        };
        for sys_index in changed {
            self.particle_state_change(sys_index);
        }

        for id in self.emitters.handles() {
            let Some(mut emitter) = self.emitters.take(id) else {
                continue;
            };
            let group = self.group_id_or_create(emitter.group());
            emitter.emit_window(self, group, now);
            self.emitters.restore(id, emitter);
        }

        self.affect_all(dt);

        let reloads = std::mem::take(&mut self.needs_reset);
        for key in &reloads {
            if let Some(group) = self.groups.get_mut(key.group.index()) {
                group.reload_painters(key.index, &mut self.painters);
            }
        }
        self.needs_reset = reloads;
    }

    fn affect_all(&mut self, dt: f64) {
        for id in self.affectors.handles() {
            let Some(mut affector) = self.affectors.take(id) else {
                continue;
            };
            self.running_affector = Some(id);
            self.affect_system(id, affector.as_mut(), dt);
            self.running_affector = None;

            for key in std::mem::take(&mut self.deferred_resets) {
                if let Some(datum) = self.datum(key).copied() {
                    reset_affector(
                        &mut self.once_offed,
                        &self.group_ids,
                        id,
                        affector.as_mut(),
                        &datum,
                    );
                }
            }
            self.affectors.restore(id, affector);
        }
    }

    fn affect_system(&mut self, id: AffectorId, affector: &mut dyn ParticleAffector, dt: f64) {
        if !affector.enabled() {
            return;
        }
        let once_off = affector.once_off();
        let dt = if once_off { 1.0 } else { dt };
        let now = self.time;

        for gi in 0..self.groups.len() {
            let gid = GroupId::from(gi);
            if !group_active(affector.groups(), &self.group_ids, gid) {
                continue;
            }
            for index in 0..self.groups[gi].size() {
                let key = ParticleKey::new(gid, index);
                if once_off && self.once_offed.get(&id).is_some_and(|s| s.contains(&key)) {
                    continue;
                }
                let Some(datum) = self.groups[gi].datum_mut(index) else {
                    continue;
                };
                if !datum.still_alive(now) || !affector.should_affect(datum, now) {
                    continue;
                }
                match affector.affect_particle(datum, dt, now) {
                    Affect::Unchanged => continue,
                    Affect::Changed => {}
                    Affect::MoveTo(group) => self.move_groups(key, group),
                    Affect::SetGoal { group, jump } => self.apply_goal(key, group, jump),
                    Affect::Kill => self.kill(key),
                }
                self.needs_reset.push(key);
                if once_off {
                    self.once_offed.entry(id).or_default().insert(key);
                }
            }
        }
    }

    fn apply_goal(&mut self, key: ParticleKey, goal: GroupId, jump: bool) {
        let sys_index = self.datum(key).and_then(|d| d.system_index);
        let tracked = match (&self.state_engine, sys_index) {
            (Some(engine), Some(sys_index)) => Some((sys_index, engine.cur_state(sys_index))),
            _ => None,
        };
        let Some((sys_index, current)) = tracked else {
            self.move_groups(key, goal);
            return;
        };
        if current == Some(goal) {
            return;
        }
        if let Some(engine) = &mut self.state_engine {
            engine.set_goal(sys_index, goal, jump);
        }
        if jump {
            self.particle_state_change(sys_index);
        }
    }

    /// Apply a painter's pending commits against the current state and
    /// return the authoritative time. Returns time zero while the system is
    /// stopped or uninitialized.
    pub fn system_sync(&mut self, painter: PainterId) -> SimTime {
        if !self.running || !self.initialized {
            return SimTime::ZERO;
        }
        let view = GroupView::new(&self.groups, &self.group_ids);
        if let Some(p) = self.painters.get_mut(painter) {
            p.perform_pending_commits(&view, self.time);
        }
        self.time
    }

    /// `system_sync` for every painter
    pub fn sync_all(&mut self) -> SimTime {
        for id in self.painters.handles() {
            self.system_sync(id);
        }
        if self.running && self.initialized {
            self.time
        } else {
            SimTime::ZERO
        }
    }

    /// Advance from wall-clock time; returns the new time if a step ran
    pub fn tick(&mut self) -> Option<SimTime> {
        let now = self.clock.tick()?;
        self.update_current_time(now);
        Some(now)
    }
}

/// Whether an affector listing `names` applies to group `id`
fn group_active(names: &[String], group_ids: &HashMap<String, GroupId>, id: GroupId) -> bool {
    names.is_empty() || names.iter().any(|n| group_ids.get(n) == Some(&id))
}

/// Forget a re-emitted particle in a once-off affector's table and let the
/// affector initialize its own per-particle state
fn reset_affector(
    once_offed: &mut HashMap<AffectorId, HashSet<ParticleKey>>,
    group_ids: &HashMap<String, GroupId>,
    id: AffectorId,
    affector: &mut dyn ParticleAffector,
    datum: &ParticleDatum,
) {
    if !affector.needs_reset() {
        return;
    }
    let key = datum.key();
    if affector.once_off() && group_active(affector.groups(), group_ids, key.group) {
        if let Some(set) = once_offed.get_mut(&id) {
            set.remove(&key);
        }
    }
    affector.reset(datum);
}

impl RuntimeSystem for ParticleSystem {
    fn initialize(&mut self) -> Result<()> {
        if !self.component_complete {
            self.component_complete();
        }
        Ok(())
    }

    fn update(&mut self, dt: f64) -> Result<()> {
        if let Some(now) = self.clock.advance(dt) {
            self.update_current_time(now);
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.clock.stop();
        Ok(())
    }

    fn current_time(&self) -> SimTime {
        self.time
    }

    fn name(&self) -> &str {
        "particle_system"
    }
}
