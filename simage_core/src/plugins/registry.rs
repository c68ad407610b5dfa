//! Ordered plugin lists with stable handles.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Identity of one registration: a slot index plus the generation the slot had when the
/// entry was added. Removing an entry bumps the generation, so an old handle never
/// addresses whatever reuses the slot later.
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: u32, generation: u32) -> Self {
        Handle {
            index,
            generation,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Priority-ordered list of plugins. Lookups walk [`Registry::iter`] front to back and the
/// first match wins, so the order is the whole point: `add(_, true)` puts an entry ahead of
/// everything registered so far, `add(_, false)` puts it behind.
pub struct Registry<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    order: Vec<u32>,
}

impl<T> Registry<T> {

    pub fn new() -> Self {
        Registry {
            slots: Vec::new(),
            free: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn add(&mut self, value: T, add_before: bool) -> Handle<T> {
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].value = Some(value);
                index
            },
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                });
                (self.slots.len() - 1) as u32
            }
        };

        if add_before {
            self.order.insert(0, index);
        } else {
            self.order.push(index);
        }

        Handle::new(index, self.slots[index as usize].generation)
    }

    /// Removes the entry for `handle`. Unknown or already removed handles are ignored.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;

        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.order.retain(|index| *index != handle.index);

        Some(value)
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.slots.get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Handle of the entry at `position` in priority order.
    pub fn handle_at(&self, position: usize) -> Option<Handle<T>> {
        let index = *self.order.get(position)?;
        Some(Handle::new(index, self.slots[index as usize].generation))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.iter_with_handles().map(|(_, value)| value)
    }

    pub fn iter_with_handles(&self) -> impl Iterator<Item = (Handle<T>, &T)> + '_ {
        self.order.iter().filter_map(move |index| {
            let slot = &self.slots[*index as usize];
            slot.value.as_ref().map(|value| (Handle::new(*index, slot.generation), value))
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
