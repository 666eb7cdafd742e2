use tracing::trace;

use crate::errors::{HelixError, HelixResult};
use crate::runtime::value::Value;
use crate::span::Span;

/// Index plus generation, so a stale handle can never alias a reused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: usize,
    generation: u32,
}

#[derive(Debug)]
struct HeapObject {
    value: Value,
    ref_count: usize,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    object: Option<HeapObject>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub allocations: usize,
    pub frees: usize,
    pub live: usize,
}

/// Reference-counted value store. Every local binding owns one object.
#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Slot>,
    free_slots: Vec<usize>,
    stats: HeapStats,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates `value` with a reference count of one.
    pub fn alloc(&mut self, value: Value) -> Handle {
        let object = HeapObject {
            value,
            ref_count: 1,
        };
        let index = match self.free_slots.pop() {
            Some(index) => {
                self.slots[index].object = Some(object);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    object: Some(object),
                });
                self.slots.len() - 1
            }
        };
        self.stats.allocations += 1;
        self.stats.live += 1;
        let handle = Handle {
            index,
            generation: self.slots[index].generation,
        };
        trace!(?handle, "alloc");
        handle
    }

    fn object(&self, handle: Handle) -> Option<&HeapObject> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.object.as_ref())
    }

    fn object_mut(&mut self, handle: Handle) -> Option<&mut HeapObject> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.object.as_mut())
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        self.object(handle).is_some()
    }

    pub fn ref_count(&self, handle: Handle) -> Option<usize> {
        self.object(handle).map(|object| object.ref_count)
    }

    pub fn get(&self, handle: Handle) -> HelixResult<&Value> {
        self.object(handle)
            .map(|object| &object.value)
            .ok_or_else(|| use_after_free(handle, "read"))
    }

    pub fn set(&mut self, handle: Handle, value: Value) -> HelixResult<Value> {
        let object = self
            .object_mut(handle)
            .ok_or_else(|| use_after_free(handle, "write"))?;
        Ok(std::mem::replace(&mut object.value, value))
    }

    pub fn retain(&mut self, handle: Handle) -> HelixResult<()> {
        let object = self
            .object_mut(handle)
            .ok_or_else(|| use_after_free(handle, "retain"))?;
        object.ref_count += 1;
        Ok(())
    }

    /// Drops one reference. Returns the value when this was the last one and
    /// the object has been freed.
    pub fn release(&mut self, handle: Handle) -> HelixResult<Option<Value>> {
        let object = self
            .object_mut(handle)
            .ok_or_else(|| use_after_free(handle, "release"))?;
        object.ref_count -= 1;
        if object.ref_count > 0 {
            return Ok(None);
        }
        self.take(handle).map(Some)
    }

    /// Frees an object explicitly. Only legal once nothing references it.
    pub fn free(&mut self, handle: Handle) -> HelixResult<Value> {
        match self.object(handle) {
            None => Err(HelixError::memory(
                format!("double free of heap object {}", handle.index),
                Span::default(),
            )),
            Some(object) if object.ref_count > 0 => Err(HelixError::memory(
                format!(
                    "cannot free heap object {} with {} outstanding reference(s)",
                    handle.index, object.ref_count
                ),
                Span::default(),
            )),
            Some(_) => self.take(handle),
        }
    }

    fn take(&mut self, handle: Handle) -> HelixResult<Value> {
        let slot = self
            .slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or_else(|| use_after_free(handle, "free"))?;
        let object = slot
            .object
            .take()
            .ok_or_else(|| use_after_free(handle, "free"))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(handle.index);
        self.stats.frees += 1;
        self.stats.live -= 1;
        trace!(?handle, "free");
        Ok(object.value)
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }
}

fn use_after_free(handle: Handle, action: &str) -> HelixError {
    HelixError::memory(
        format!("{action} of freed heap object {}", handle.index),
        Span::default(),
    )
}
