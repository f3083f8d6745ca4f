//! Per-group particle pool: storage, free list, expiry heap and painter list

use crate::datum::ParticleDatum;
use crate::free_list::FreeList;
use crate::heap::DataHeap;
use crate::painter::ParticlePainter;
use crate::registry::{PainterId, Registry};
use ember_core::{rounded_millis, GroupId, SimTime};

/// Painters as owned by the particle system
pub type PainterRegistry = Registry<dyn ParticlePainter>;

/// Timing inputs shared by every recycling decision
#[derive(Debug, Clone, Copy)]
pub struct Lifecycle {
    pub now: SimTime,
    /// Lives at or above this many milliseconds are queued with a capped horizon
    pub max_life_ms: i64,
}

/// One named pool of particle records.
///
/// Storage is dense: every index in `[0, size)` holds a record and only the
/// free list decides which ones are in use. The pool only grows.
pub struct ParticleGroupData {
    index: GroupId,
    name: String,
    data: Vec<ParticleDatum>,
    free_list: FreeList,
    heap: DataHeap,
    painters: Vec<PainterId>,
    /// Scratch for `recycle`, cleared at the top of every call
    latest_alive: Vec<usize>,
    growth_increment: usize,
}

impl ParticleGroupData {
    pub fn new(index: GroupId, name: impl Into<String>, growth_increment: usize) -> Self {
        Self {
            index,
            name: name.into(),
            data: Vec::new(),
            free_list: FreeList::new(),
            heap: DataHeap::new(),
            painters: Vec::new(),
            latest_alive: Vec::new(),
            growth_increment: growth_increment.max(1),
        }
    }

    pub fn id(&self) -> GroupId {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current capacity
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Slots currently handed out
    pub fn allocated(&self) -> usize {
        self.free_list.count()
    }

    /// Slots available for reuse
    pub fn free_count(&self) -> usize {
        self.size() - self.allocated()
    }

    pub fn data(&self) -> &[ParticleDatum] {
        &self.data
    }

    pub fn datum(&self, index: usize) -> Option<&ParticleDatum> {
        self.data.get(index)
    }

    pub fn datum_mut(&mut self, index: usize) -> Option<&mut ParticleDatum> {
        self.data.get_mut(index)
    }

    pub fn heap(&self) -> &DataHeap {
        &self.heap
    }

    pub fn painters(&self) -> &[PainterId] {
        &self.painters
    }

    pub(crate) fn subscribe(&mut self, painter: PainterId) {
        if !self.painters.contains(&painter) {
            self.painters.push(painter);
        }
    }

    pub(crate) fn unsubscribe(&mut self, painter: PainterId) {
        self.painters.retain(|p| *p != painter);
    }

    /// Forget painters that have been unregistered
    pub(crate) fn prune_painters(&mut self, registry: &PainterRegistry) {
        self.painters.retain(|p| registry.contains(*p));
    }

    /// Grow the pool to `new_size` and tell subscribed painters by how much.
    pub fn set_size(&mut self, new_size: usize, painters: &mut PainterRegistry) {
        let old_size = self.size();
        if new_size == old_size {
            return;
        }
        debug_assert!(new_size > old_size, "particle groups cannot shrink");
        if new_size < old_size {
            return;
        }
        let index = self.index;
        self.data
            .extend((old_size..new_size).map(|i| ParticleDatum::new(index, i)));
        self.free_list.resize(new_size);

        let delta = new_size - old_size;
        for id in &self.painters {
            if let Some(p) = painters.get_mut(*id) {
                let count = p.count();
                p.set_count(count + delta);
            }
        }
        log::debug!("Group {:?} ({}) grew to {new_size}", self.name, self.index);
    }

    /// Reserve a slot for a new particle.
    ///
    /// Reclaims free slots first. A reclaimed slot whose particle still reports
    /// itself alive is put back in the expiry heap and skipped. With no free
    /// slot left, `respects_limits` drops the request; otherwise the pool grows
    /// by the growth increment.
    pub fn new_datum(
        &mut self,
        respects_limits: bool,
        clock: Lifecycle,
        painters: &mut PainterRegistry,
    ) -> Option<usize> {
        while let Some(idx) = self.free_list.alloc() {
            if self.data[idx].still_alive(clock.now) {
                // Resurrection: the slot was freed while its particle still had life left
                log::trace!("Resurrecting {}", self.data[idx].debug_dump(clock.now));
                self.prepare_recycler(idx, clock);
                continue;
            }
            return Some(idx);
        }
        if respects_limits {
            return None;
        }

        let old_size = self.size();
        self.set_size(old_size + self.growth_increment, painters);
        let idx = self.free_list.alloc();
        debug_assert_eq!(idx, Some(old_size));
        idx
    }

    /// End a particle now. Other fields are left alone because an emitter may
    /// still be filling the record in.
    pub fn kill(&mut self, index: usize, painters: &mut PainterRegistry) {
        debug_assert_eq!(self.data[index].group_id, self.index, "kill from wrong group");
        self.data[index].life_span = 0.0;
        self.reload_painters(index, painters);
        self.free_list.free(index);
    }

    /// Free every queued particle that has expired by `clock.now`.
    ///
    /// Particles whose life was extended after queueing go back in the heap.
    /// Returns true when no slot is in use.
    pub fn recycle(&mut self, clock: Lifecycle) -> bool {
        self.latest_alive.clear();

        while self.heap.top().is_some_and(|top| top <= clock.now.as_millis()) {
            let Some(slots) = self.heap.pop() else {
                break;
            };
            for idx in slots {
                if self.data[idx].still_alive(clock.now) {
                    self.latest_alive.push(idx);
                } else {
                    self.free_list.free(idx);
                }
            }
        }

        let alive = std::mem::take(&mut self.latest_alive);
        for &idx in &alive {
            self.prepare_recycler(idx, clock);
        }
        self.latest_alive = alive;

        self.free_list.count() == 0
    }

    /// Queue a particle for recycling at its expiry.
    ///
    /// Lives at or above `max_life_ms` are queued two thirds of `max_life_ms`
    /// after their (possibly shifted) birth time instead, shifting the birth
    /// time forward in thirds until that horizon is in the future.
    pub fn prepare_recycler(&mut self, index: usize, clock: Lifecycle) {
        let datum = &mut self.data[index];
        if datum.life_span * 1000.0 < clock.max_life_ms as f64 {
            self.heap.insert(datum);
            return;
        }
        let extend = 2 * clock.max_life_ms / 3;
        let step = clock.max_life_ms as f64 / 3000.0;
        while rounded_millis(datum.t) + extend <= clock.now.as_millis() {
            datum.extend_life(step, clock.now);
        }
        self.heap.insert_timed(index, rounded_millis(datum.t) + extend);
    }

    /// Discard every particle: all slots free, heap empty. Capacity is kept.
    pub fn clear(&mut self) {
        self.heap.clear();
        let size = self.size();
        for idx in 0..size {
            self.data[idx].life_span = 0.0;
            self.free_list.free(idx);
        }
    }

    pub(crate) fn load_painters(&mut self, index: usize, painters: &mut PainterRegistry) {
        let datum = &mut self.data[index];
        for id in &self.painters {
            if let Some(p) = painters.get_mut(*id) {
                p.load(*id, datum);
            }
        }
    }

    pub(crate) fn reload_painters(&mut self, index: usize, painters: &mut PainterRegistry) {
        let datum = &mut self.data[index];
        for id in &self.painters {
            if let Some(p) = painters.get_mut(*id) {
                p.reload(*id, datum);
            }
        }
    }
}
