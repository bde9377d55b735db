use crate::entity::{ComponentId, EntityIndex};
use std::any::{type_name, Any};
use std::mem;
use std::ptr::{self, NonNull};

/// A value that can be attached to an entity.
pub trait Component: Send + Sync + 'static {}

impl<T> Component for T where T: Send + Sync + 'static {}

/// Number of values in one storage bucket. Buckets never reallocate,
/// so a stored value keeps its address until it is removed.
pub const BUCKET_LEN: usize = 1024;

const NONE: u32 = u32::MAX;

/// Returns `true` if components of type `T` carry no data and are stored as
/// membership only.
pub(crate) const fn is_tag<T>() -> bool {
    mem::size_of::<T>() == 0 && !mem::needs_drop::<T>()
}

enum Slot<T> {
    Occupied(T),
    Free { next: u32 },
}

enum Values<T> {
    Stored {
        buckets: Vec<Vec<Slot<T>>>,
        free_head: u32,
    },
    // Zero-sized values have nothing to store.
    Marker {
        free: Vec<u32>,
    },
}

/// Type-erased access to a component table, used where the component type is only
/// known by identifier (entity destruction, scan sources).
pub(crate) trait AnyTable: Any + Send + Sync {
    /// Drops the component of the entity at `entity`, if any.
    fn remove_entity(&mut self, entity: EntityIndex);

    /// Returns one past the highest data slot ever used.
    fn slot_bound(&self) -> usize;

    /// Returns the entity owning data slot `slot`, if it is occupied.
    fn owner(&self, slot: u32) -> Option<EntityIndex>;

    /// Returns the number of live components.
    fn len(&self) -> usize;

    fn component_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Storage of all components of type `T`.
///
/// Values sit in dense data slots. Two maps link entity slots to data slots and back.
/// Freed data slots are threaded into a free list and reused before the table grows,
/// so removing a component never moves any other.
pub struct ComponentTable<T> {
    values: Values<T>,
    entity_to_slot: Vec<u32>,
    slot_to_entity: Vec<u32>,
    len: usize,
}

impl<T: 'static> ComponentTable<T> {
    pub(crate) fn new() -> Self {
        let values = if is_tag::<T>() {
            Values::Marker { free: Vec::new() }
        } else {
            Values::Stored {
                buckets: Vec::new(),
                free_head: NONE,
            }
        };

        ComponentTable {
            values,
            entity_to_slot: Vec::new(),
            slot_to_entity: Vec::new(),
            len: 0,
        }
    }

    /// Returns the data slot of the component attached to `entity`.
    #[inline]
    pub fn slot_of(&self, entity: EntityIndex) -> Option<u32> {
        self.entity_to_slot
            .get(entity as usize)
            .copied()
            .filter(|&slot| slot != NONE)
    }

    /// Returns the entity owning data slot `slot`.
    #[inline]
    pub fn entity_of(&self, slot: u32) -> Option<EntityIndex> {
        self.slot_to_entity
            .get(slot as usize)
            .copied()
            .filter(|&entity| entity != NONE)
    }

    /// Stores `value` for `entity`, which must not have a component in this table yet.
    pub(crate) fn insert(&mut self, entity: EntityIndex, value: T) -> ComponentId {
        debug_assert_eq!(self.slot_of(entity), None);

        let slot = match &mut self.values {
            Values::Stored { buckets, free_head } => {
                if *free_head != NONE {
                    let slot = *free_head;
                    let cell = &mut buckets[slot as usize / BUCKET_LEN][slot as usize % BUCKET_LEN];
                    match mem::replace(cell, Slot::Occupied(value)) {
                        Slot::Free { next } => *free_head = next,
                        Slot::Occupied(_) => unreachable!("free list points at an occupied slot"),
                    }
                    slot
                } else {
                    let slot = self.slot_to_entity.len();
                    if slot / BUCKET_LEN == buckets.len() {
                        buckets.push(Vec::with_capacity(BUCKET_LEN));
                    }
                    buckets[slot / BUCKET_LEN].push(Slot::Occupied(value));
                    self.slot_to_entity.push(NONE);
                    slot as u32
                }
            }
            Values::Marker { free } => {
                mem::forget(value);
                match free.pop() {
                    Some(slot) => slot,
                    None => {
                        self.slot_to_entity.push(NONE);
                        (self.slot_to_entity.len() - 1) as u32
                    }
                }
            }
        };

        if entity as usize >= self.entity_to_slot.len() {
            self.entity_to_slot.resize((entity as usize + 1) * 3 / 2, NONE);
        }
        self.entity_to_slot[entity as usize] = slot;
        self.slot_to_entity[slot as usize] = entity;
        self.len += 1;

        ComponentId(slot)
    }

    /// Removes and returns the component of `entity`.
    pub(crate) fn remove(&mut self, entity: EntityIndex) -> Option<T> {
        let slot = self.slot_of(entity)?;

        let value = match &mut self.values {
            Values::Stored { buckets, free_head } => {
                let cell = &mut buckets[slot as usize / BUCKET_LEN][slot as usize % BUCKET_LEN];
                let prev = mem::replace(cell, Slot::Free { next: *free_head });
                *free_head = slot;
                match prev {
                    Slot::Occupied(value) => value,
                    Slot::Free { .. } => unreachable!("entity map points at a free slot"),
                }
            }
            Values::Marker { free } => {
                free.push(slot);
                // Safety: `T` is zero-sized and a value of it was stored by `insert`.
                unsafe { NonNull::<T>::dangling().as_ptr().read() }
            }
        };

        self.entity_to_slot[entity as usize] = NONE;
        self.slot_to_entity[slot as usize] = NONE;
        self.len -= 1;

        Some(value)
    }

    /// Returns a reference to the component in data slot `slot`.
    pub fn get(&self, slot: u32) -> Option<&T> {
        self.entity_of(slot)?;
        // Safety: the slot is occupied.
        unsafe { Some(&*Self::value_ptr(self, slot)) }
    }

    /// Returns a mutable reference to the component in data slot `slot`.
    pub fn get_mut(&mut self, slot: u32) -> Option<&mut T> {
        self.entity_of(slot)?;
        // Safety: the slot is occupied and `self` is borrowed uniquely.
        unsafe { Some(&mut *Self::value_ptr_mut(self, slot)) }
    }

    /// Returns a pointer to the value in `slot` through shared access to the table.
    ///
    /// Only the addressed slot is borrowed, so references into other slots of the
    /// same bucket stay valid.
    ///
    /// # Safety
    /// `this` must point to a live table and `slot` must be occupied.
    #[inline]
    pub(crate) unsafe fn value_ptr(this: *const Self, slot: u32) -> *const T {
        match unsafe { &*ptr::addr_of!((*this).values) } {
            Values::Stored { buckets, .. } => {
                let cell = unsafe {
                    let bucket = buckets.as_ptr().add(slot as usize / BUCKET_LEN);
                    (*bucket).as_ptr().add(slot as usize % BUCKET_LEN)
                };
                match unsafe { &*cell } {
                    Slot::Occupied(value) => value as *const T,
                    Slot::Free { .. } => unreachable!("read of a free slot"),
                }
            }
            Values::Marker { .. } => NonNull::<T>::dangling().as_ptr(),
        }
    }

    /// Returns a pointer to the value in `slot` that may be written through.
    ///
    /// # Safety
    /// `this` must point to a live table, `slot` must be occupied and no other
    /// reference to that value may exist while the result is used.
    #[inline]
    pub(crate) unsafe fn value_ptr_mut(this: *mut Self, slot: u32) -> *mut T {
        match unsafe { &mut *ptr::addr_of_mut!((*this).values) } {
            Values::Stored { buckets, .. } => {
                let cell = unsafe {
                    let bucket = buckets.as_mut_ptr().add(slot as usize / BUCKET_LEN);
                    (*bucket).as_mut_ptr().add(slot as usize % BUCKET_LEN)
                };
                match unsafe { &mut *cell } {
                    Slot::Occupied(value) => value as *mut T,
                    Slot::Free { .. } => unreachable!("write to a free slot"),
                }
            }
            Values::Marker { .. } => NonNull::<T>::dangling().as_ptr(),
        }
    }
}

impl<T: Send + Sync + 'static> AnyTable for ComponentTable<T> {
    fn remove_entity(&mut self, entity: EntityIndex) {
        self.remove(entity);
    }

    fn slot_bound(&self) -> usize {
        self.slot_to_entity.len()
    }

    fn owner(&self, slot: u32) -> Option<EntityIndex> {
        self.entity_of(slot)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn component_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn removed_slots_are_reused_without_moving_others() {
        let mut table = ComponentTable::<String>::new();
        let a = table.insert(4, "a".to_owned());
        let b = table.insert(9, "b".to_owned());
        let c = table.insert(2, "c".to_owned());
        assert_eq!((a.0, b.0, c.0), (0, 1, 2));

        let c_addr = table.get(c.0).unwrap() as *const String;
        assert_eq!(table.remove(9).as_deref(), Some("b"));
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(b.0), None);
        assert_eq!(table.entity_of(b.0), None);

        let d = table.insert(7, "d".to_owned());
        assert_eq!(d.0, 1);
        assert_eq!(table.entity_of(1), Some(7));
        assert_eq!(table.slot_of(7), Some(1));
        assert_eq!(table.get(c.0).unwrap() as *const String, c_addr);

        let order: Vec<_> = (0..3)
            .map(|slot| (table.entity_of(slot).unwrap(), table.get(slot).unwrap().as_str()))
            .collect();
        assert_eq!(order, vec![(4, "a"), (7, "d"), (2, "c")]);
    }

    #[test]
    fn values_span_several_buckets() {
        let mut table = ComponentTable::<usize>::new();
        let first = table.insert(0, 0);
        let first_addr = table.get(first.0).unwrap() as *const usize;

        for i in 1..BUCKET_LEN * 2 + 3 {
            table.insert(i as EntityIndex, i);
        }

        assert_eq!(table.len(), BUCKET_LEN * 2 + 3);
        assert_eq!(table.get(first.0).unwrap() as *const usize, first_addr);
        assert_eq!(table.get((BUCKET_LEN * 2) as u32), Some(&(BUCKET_LEN * 2)));
    }

    #[test]
    fn tags_store_no_values() {
        #[derive(Debug, PartialEq)]
        struct Marked;

        assert!(is_tag::<Marked>());
        assert!(!is_tag::<u8>());

        let mut table = ComponentTable::<Marked>::new();
        let a = table.insert(3, Marked);
        let b = table.insert(5, Marked);

        assert!(matches!(&table.values, Values::Marker { .. }));
        assert_eq!(table.get(a.0), Some(&Marked));
        assert_eq!(table.remove(3), Some(Marked));
        assert_eq!(table.remove(3), None);

        let c = table.insert(8, Marked);
        assert_eq!(c, a);
        assert_ne!(c, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn zero_sized_values_with_drop_are_stored() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        struct Guard;

        impl Drop for Guard {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        assert!(!is_tag::<Guard>());

        let mut table = ComponentTable::<Guard>::new();
        table.insert(0, Guard);
        table.insert(1, Guard);
        assert!(matches!(&table.values, Values::Stored { .. }));

        drop(table.remove(0));
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
        drop(table);
        assert_eq!(DROPS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_the_table_drops_live_values_once() {
        struct Counted(Arc<AtomicUsize>);

        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let mut table = ComponentTable::<Counted>::new();
        for i in 0..4 {
            table.insert(i, Counted(Arc::clone(&drops)));
        }

        drop(table.remove(1));
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        drop(table);
        assert_eq!(drops.load(Ordering::SeqCst), 4);
    }
}
