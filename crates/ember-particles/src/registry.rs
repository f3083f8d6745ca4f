//! Generational arena for collaborators registered with a particle system
//!
//! Emitters, affectors, painters and declared groups are owned by the system
//! and addressed through handles. Removing an entry bumps its slot generation,
//! so stale handles resolve to nothing instead of dangling.

use crate::affector::ParticleAffector;
use crate::emitter::ParticleEmitter;
use crate::painter::ParticlePainter;
use crate::state::ParticleGroup;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Typed handle into a [`Registry`]
pub struct Handle<T: ?Sized> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> Box<T>>,
}

pub type EmitterId = Handle<dyn ParticleEmitter>;
pub type AffectorId = Handle<dyn ParticleAffector>;
pub type PainterId = Handle<dyn ParticlePainter>;
pub type GroupDeclId = Handle<ParticleGroup>;

impl<T: ?Sized> Handle<T> {
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl<T: ?Sized> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Handle<T> {}

impl<T: ?Sized> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T: ?Sized> Eq for Handle<T> {}

impl<T: ?Sized> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T: ?Sized> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

struct Slot<T: ?Sized> {
    generation: u32,
    value: Option<Box<T>>,
}

/// Owning arena with stable, invalidating handles.
///
/// Iteration visits live entries in slot order, which is registration order
/// until slots start being reused.
pub struct Registry<T: ?Sized> {
    slots: Vec<Slot<T>>,
    vacant: Vec<u32>,
    len: usize,
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Registry<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, value: Box<T>) -> Handle<T> {
        self.len += 1;
        if let Some(index) = self.vacant.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Handle::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Handle::new(index, 0)
    }

    /// Remove an entry; its handle (and any copy of it) becomes stale
    pub fn remove(&mut self, handle: Handle<T>) -> Option<Box<T>> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.vacant.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        let slot = self.slots.get(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_deref()
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_deref_mut()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn handles(&self) -> Vec<Handle<T>> {
        self.iter().map(|(h, _)| h).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value
                .as_deref()
                .map(|v| (Handle::new(i as u32, slot.generation), v))
        })
    }

    /// Check an entry out without invalidating its handle. Until `restore`
    /// puts it back, lookups and iteration skip it.
    pub fn take(&mut self, handle: Handle<T>) -> Option<Box<T>> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.take()
    }

    /// Return an entry checked out with `take`
    pub fn restore(&mut self, handle: Handle<T>, value: Box<T>) {
        if let Some(slot) = self.slots.get_mut(handle.index()) {
            if slot.generation == handle.generation && slot.value.is_none() {
                slot.value = Some(value);
            }
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.value
                .as_deref_mut()
                .map(|v| (Handle::new(i as u32, generation), v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named {
        fn name(&self) -> &str;
    }

    struct Item(&'static str);

    impl Named for Item {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn insert_and_get() {
        let mut reg: Registry<dyn Named> = Registry::new();
        let a = reg.insert(Box::new(Item("a")));
        let b = reg.insert(Box::new(Item("b")));
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get(a).map(|i| i.name()), Some("a"));
        assert_eq!(reg.get(b).map(|i| i.name()), Some("b"));
    }

    #[test]
    fn removed_handles_go_stale() {
        let mut reg: Registry<dyn Named> = Registry::new();
        let a = reg.insert(Box::new(Item("a")));
        assert!(reg.remove(a).is_some());
        assert!(!reg.contains(a));
        assert!(reg.remove(a).is_none());

        // The slot is reused but the old handle still resolves to nothing
        let c = reg.insert(Box::new(Item("c")));
        assert_eq!(c.index(), a.index());
        assert_ne!(c, a);
        assert!(reg.get(a).is_none());
        assert_eq!(reg.get(c).map(|i| i.name()), Some("c"));
    }

    #[test]
    fn iteration_skips_vacant_slots() {
        let mut reg: Registry<dyn Named> = Registry::new();
        let a = reg.insert(Box::new(Item("a")));
        reg.insert(Box::new(Item("b")));
        reg.insert(Box::new(Item("c")));
        reg.remove(a);
        let names: Vec<&str> = reg.iter().map(|(_, i)| i.name()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(reg.handles().len(), 2);
    }

    #[test]
    fn take_and_restore_keep_handle() {
        let mut reg: Registry<dyn Named> = Registry::new();
        let a = reg.insert(Box::new(Item("a")));
        let b = reg.insert(Box::new(Item("b")));

        let item = reg.take(a).unwrap();
        assert!(reg.get(a).is_none());
        assert_eq!(reg.iter().count(), 1);
        // Checked-out slots are not handed to new entries
        let c = reg.insert(Box::new(Item("c")));
        assert_ne!(c.index(), a.index());

        reg.restore(a, item);
        assert_eq!(reg.get(a).map(|i| i.name()), Some("a"));
        assert_eq!(reg.get(b).map(|i| i.name()), Some("b"));
        assert!(reg.take(a).is_some());
    }
}
