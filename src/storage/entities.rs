use crate::entity::{Entity, EntityIndex, Generation};
use crate::mask::Mask;
use crate::registry::ComponentTypeId;

pub(crate) struct EntitySlot {
    pub(crate) mask: Mask,
    pub(crate) generation: Generation,
}

impl EntitySlot {
    #[inline]
    pub(crate) fn is_alive(&self) -> bool {
        self.mask.get(ComponentTypeId::ALIVE.index())
    }
}

/// Live entity slots, their presence masks and generations.
///
/// Destroyed slots are reused last-in first-out.
#[derive(Default)]
pub(crate) struct EntityTable {
    slots: Vec<EntitySlot>,
    free: Vec<EntityIndex>,
    n_alive: usize,
}

impl EntityTable {
    const MAX_SLOTS: usize = u32::MAX as usize - 1;

    pub(crate) fn create(&mut self) -> Entity {
        #[cold]
        #[inline(never)]
        fn assert_failed() -> ! {
            panic!(
                "Out of slots. A maximum number of entities ({}) is reached.",
                EntityTable::MAX_SLOTS
            );
        }

        let index = if let Some(index) = self.free.pop() {
            index
        } else if self.slots.len() < Self::MAX_SLOTS {
            self.slots.push(EntitySlot {
                mask: Mask::new(),
                generation: 0,
            });
            (self.slots.len() - 1) as EntityIndex
        } else {
            assert_failed();
        };

        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.mask.is_zero());
        slot.mask.set(ComponentTypeId::ALIVE.index());
        self.n_alive += 1;

        Entity::new(index, slot.generation)
    }

    /// Releases the slot of `entity`, which must be alive.
    /// Components must already have been removed from their tables.
    pub(crate) fn release(&mut self, entity: Entity) {
        let slot = &mut self.slots[entity.index as usize];
        debug_assert_eq!(slot.generation, entity.generation);

        slot.mask.zero();
        self.n_alive -= 1;

        if slot.generation == Generation::MAX {
            log::warn!(
                "entity slot {} exhausted its generations and is retired",
                entity.index
            );
            return;
        }
        slot.generation += 1;
        self.free.push(entity.index);
    }

    /// Returns `true` if the handle refers to a live entity of the current generation.
    #[inline]
    pub(crate) fn contains(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.index as usize)
            .map_or(false, |slot| {
                slot.generation == entity.generation && slot.is_alive()
            })
    }

    /// Returns the slot of a live entity.
    #[inline]
    pub(crate) fn get(&self, entity: Entity) -> Option<&EntitySlot> {
        let slot = self.slots.get(entity.index as usize)?;
        (slot.generation == entity.generation && slot.is_alive()).then_some(slot)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, entity: Entity) -> Option<&mut EntitySlot> {
        let slot = self.slots.get_mut(entity.index as usize)?;
        (slot.generation == entity.generation && slot.is_alive()).then_some(slot)
    }

    /// Returns the slot at `index` regardless of liveness.
    #[inline]
    pub(crate) fn slot(&self, index: EntityIndex) -> Option<&EntitySlot> {
        self.slots.get(index as usize)
    }

    /// Returns the current handle of the live entity at `index`.
    #[inline]
    pub(crate) fn handle_at(&self, index: EntityIndex) -> Option<Entity> {
        let slot = self.slots.get(index as usize)?;
        slot.is_alive().then(|| Entity::new(index, slot.generation))
    }

    /// Returns the number of slots ever allocated, live or not.
    #[inline]
    pub(crate) fn n_slots(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of live entities.
    pub(crate) fn count(&self) -> usize {
        self.n_alive
    }

    /// Returns an iterator over all live entities in slot order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_alive())
            .map(|(i, slot)| Entity::new(i as EntityIndex, slot.generation))
    }
}
