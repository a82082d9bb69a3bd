//! Object storage and the mark-and-sweep collector.
//!
//! Compile-time objects live in a const arena and are never collected.
//! Runtime objects live in generational slots grown one block at a time;
//! mark bits are kept in a side table parallel to the slots.

use log::debug;

use super::value::{ObjRef, Value};
use super::Object;
use super::ObjectData;

pub const DEFAULT_BLOCK_SIZE: usize = 1024;

#[derive(Debug)]
struct Slot {
    generation: u32,
    object: Option<Object>,
}

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcStats {
    pub marked: usize,
    pub freed: usize,
}

#[derive(Debug)]
pub struct Heap {
    consts: Vec<Object>,
    slots: Vec<Slot>,
    marks: Vec<bool>,
    free: Vec<u32>,
    block_size: usize,
    live: usize,
    collections: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}

impl Heap {
    pub fn new(block_size: usize) -> Self {
        Self {
            consts: Vec::new(),
            slots: Vec::new(),
            marks: Vec::new(),
            free: Vec::new(),
            block_size: block_size.max(1),
            live: 0,
            collections: 0,
        }
    }

    pub fn set_block_size(&mut self, block_size: usize) {
        self.block_size = block_size.max(1);
    }

    /// Store a compile-time object. Const objects are never collected.
    pub fn alloc_const(&mut self, object: Object) -> ObjRef {
        let index = self.consts.len() as u32;
        self.consts.push(object);
        ObjRef::Const(index)
    }

    /// Whether the next [`alloc`](Self::alloc) has no free slot to use.
    /// The VM collects at this point, before allocating.
    pub fn needs_collection(&self) -> bool {
        self.free.is_empty()
    }

    /// Store a runtime object, adding a block of slots if none are free.
    pub fn alloc(&mut self, object: Object) -> ObjRef {
        if self.free.is_empty() {
            self.grow();
        }
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                // grow() always frees at least one slot
                self.slots.push(Slot {
                    generation: 0,
                    object: None,
                });
                self.marks.push(false);
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.object = Some(object);
        self.live += 1;
        ObjRef::Heap {
            index,
            generation: slot.generation,
        }
    }

    fn grow(&mut self) {
        let start = self.slots.len();
        let end = start + self.block_size;
        self.slots.extend((start..end).map(|_| Slot {
            generation: 0,
            object: None,
        }));
        self.marks.resize(end, false);
        // Pop order hands out the lowest index first
        self.free.extend((start..end).rev().map(|i| i as u32));
        debug!("heap grew to {} slots", end);
    }

    pub fn get(&self, r: ObjRef) -> Option<&Object> {
        match r {
            ObjRef::Const(i) => self.consts.get(i as usize),
            ObjRef::Heap { index, generation } => self
                .slots
                .get(index as usize)
                .filter(|s| s.generation == generation)
                .and_then(|s| s.object.as_ref()),
        }
    }

    /// Mutable access to a runtime object. Const objects are immutable.
    pub fn get_mut(&mut self, r: ObjRef) -> Option<&mut Object> {
        match r {
            ObjRef::Const(_) => None,
            ObjRef::Heap { index, generation } => self
                .slots
                .get_mut(index as usize)
                .filter(|s| s.generation == generation)
                .and_then(|s| s.object.as_mut()),
        }
    }

    /// Number of live runtime objects.
    pub fn live_objects(&self) -> usize {
        self.live
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn const_count(&self) -> usize {
        self.consts.len()
    }

    pub fn collections(&self) -> usize {
        self.collections
    }

    /// Mark everything reachable from `roots`, then free every unmarked
    /// runtime object.
    pub fn collect<I>(&mut self, roots: I) -> GcStats
    where
        I: IntoIterator<Item = Value>,
    {
        let marked = self.mark(roots);
        let freed = self.sweep();
        self.collections += 1;
        debug!(
            "gc #{}: marked {}, freed {}, live {}",
            self.collections, marked, freed, self.live
        );
        GcStats { marked, freed }
    }

    fn mark<I>(&mut self, roots: I) -> usize
    where
        I: IntoIterator<Item = Value>,
    {
        let mut worklist: Vec<ObjRef> = roots.into_iter().filter_map(|v| v.as_object()).collect();
        let mut marked = 0;

        while let Some(r) = worklist.pop() {
            let ObjRef::Heap { index, generation } = r else {
                continue;
            };
            let idx = index as usize;
            match self.slots.get(idx) {
                Some(slot) if slot.generation == generation && slot.object.is_some() => {}
                _ => continue,
            }
            if self.marks[idx] {
                continue;
            }
            self.marks[idx] = true;
            marked += 1;

            if let Some(object) = &self.slots[idx].object {
                push_children(&object.data, &mut worklist);
            }
        }
        marked
    }

    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if self.marks[idx] {
                self.marks[idx] = false;
                continue;
            }
            if slot.object.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(idx as u32);
                freed += 1;
            }
        }
        self.live -= freed;
        freed
    }
}

fn push_children(data: &ObjectData, worklist: &mut Vec<ObjRef>) {
    match data {
        ObjectData::List(items) => {
            worklist.extend(items.iter().filter_map(|v| v.as_object()));
        }
        ObjectData::Dict(dict) => {
            for entry in dict.iter() {
                worklist.extend(entry.key.as_object());
                worklist.extend(entry.value.as_object());
            }
        }
        ObjectData::Set(set) => {
            worklist.extend(set.iter().filter_map(|e| e.key.as_object()));
        }
        ObjectData::Instance(attrs) => {
            worklist.extend(attrs.values().filter_map(|v| v.as_object()));
        }
        ObjectData::Str(_) | ObjectData::Callable(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::class::LIST_CLASS;
    use pretty_assertions::assert_eq;

    fn list(items: Vec<Value>) -> Object {
        Object::new(LIST_CLASS, ObjectData::List(items))
    }

    #[test]
    fn test_unreachable_objects_are_freed() {
        let mut heap = Heap::new(4);
        let kept = heap.alloc(list(vec![]));
        let _dropped = heap.alloc(list(vec![]));
        let stats = heap.collect([Value::Object(kept)]);
        assert_eq!(stats, GcStats { marked: 1, freed: 1 });
        assert_eq!(heap.live_objects(), 1);
        assert!(heap.get(kept).is_some());
    }

    #[test]
    fn test_nested_objects_survive_through_containers() {
        let mut heap = Heap::new(8);
        let inner = heap.alloc(list(vec![Value::Number(1.0)]));
        let outer = heap.alloc(list(vec![Value::Object(inner)]));
        heap.collect([Value::Object(outer)]);
        assert!(heap.get(inner).is_some());
        assert_eq!(heap.live_objects(), 2);
    }

    #[test]
    fn test_cycles_are_collected() {
        let mut heap = Heap::new(8);
        let a = heap.alloc(list(vec![]));
        let b = heap.alloc(list(vec![Value::Object(a)]));
        if let Some(ObjectData::List(items)) = heap.get_mut(a).map(|o| &mut o.data) {
            items.push(Value::Object(b));
        }
        let stats = heap.collect(std::iter::empty());
        assert_eq!(stats.freed, 2);
        assert_eq!(heap.live_objects(), 0);
    }

    #[test]
    fn test_stale_handles_do_not_resolve_after_reuse() {
        let mut heap = Heap::new(1);
        let old = heap.alloc(list(vec![]));
        heap.collect(std::iter::empty());
        let new = heap.alloc(list(vec![]));
        assert!(heap.get(old).is_none());
        assert!(heap.get(new).is_some());
        assert_eq!(heap.capacity(), 1);
    }

    #[test]
    fn test_const_objects_are_exempt() {
        let mut heap = Heap::new(2);
        let c = heap.alloc_const(Object::string("kept"));
        heap.collect(std::iter::empty());
        assert!(heap.get(c).is_some());
        assert!(heap.get_mut(c).is_none());
    }

    #[test]
    fn test_grows_by_blocks() {
        let mut heap = Heap::new(2);
        assert!(heap.needs_collection());
        heap.alloc(list(vec![]));
        heap.alloc(list(vec![]));
        assert_eq!(heap.capacity(), 2);
        heap.alloc(list(vec![]));
        assert_eq!(heap.capacity(), 4);
    }
}
