/// An entity slot index within a [`Database`](crate::Database).
pub type EntityIndex = u32;
/// A generation counter of an entity slot.
pub type Generation = u32;

/// An entity handle.
///
/// Handles are plain values: copying one does not keep the entity alive. A handle whose
/// generation no longer matches its slot is stale and refers to nothing.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Entity {
    pub(crate) index: EntityIndex,
    pub(crate) generation: Generation,
}

impl Entity {
    /// A handle that never refers to a live entity.
    pub const NULL: Self = Entity {
        index: u32::MAX,
        generation: u32::MAX,
    };

    pub(crate) fn new(index: EntityIndex, generation: Generation) -> Entity {
        Entity { index, generation }
    }

    /// Returns the slot index of the entity.
    pub fn index(&self) -> EntityIndex {
        self.index
    }

    /// Returns the generation of the slot this handle was issued for.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub(crate) fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    pub(crate) fn from_bits(bits: u64) -> Entity {
        Entity {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl Default for Entity {
    fn default() -> Self {
        Entity::NULL
    }
}

/// An identifier of a component value within its type's table.
///
/// Stays valid until the component is removed; removing or adding other components of
/// the same type does not move it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId {
    /// Returns the data-slot index of the component.
    pub fn index(&self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_keep_index_and_generation_apart() {
        let entity = Entity::new(7, 3);
        let bits = entity.to_bits();

        assert_eq!(bits, (3u64 << 32) | 7);
        assert_eq!(Entity::from_bits(bits), entity);
        assert_eq!(Entity::from_bits(Entity::NULL.to_bits()), Entity::NULL);
    }
}
