//! Component type identifiers.

use crate::HashMap;
use parking_lot::RwLock;
use std::any::{type_name, TypeId};
use std::collections::hash_map;
use std::fmt;

/// A numeric identifier of a component type, assigned by a [`TypeRegistry`].
///
/// Identifiers start at 1 and double as bit indices of entity presence masks.
/// Identifier 0 is the "alive" bit every existing entity carries.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ComponentTypeId(pub(crate) usize);

impl ComponentTypeId {
    /// The presence bit marking an entity as alive.
    pub const ALIVE: Self = ComponentTypeId(0);

    /// Returns the identifier as a presence mask bit index.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

#[derive(Default)]
struct Inner {
    ids: HashMap<TypeId, ComponentTypeId>,
    // Indexed by `id - 1`.
    names: Vec<&'static str>,
}

/// Assigns each distinct component type a stable identifier on first use.
///
/// Identifiers are never reused or removed for the lifetime of the registry.
/// Databases that exchange presence masks or filters must share one registry
/// (see [`Database::with_registry`](crate::Database::with_registry)).
#[derive(Default)]
pub struct TypeRegistry {
    inner: RwLock<Inner>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> TypeRegistry {
        Default::default()
    }

    /// Returns the identifier of `T`, assigning the next free one if `T` is new.
    pub fn identifier_for<T: 'static>(&self) -> ComponentTypeId {
        if let Some(id) = self.get::<T>() {
            return id;
        }

        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let next = inner.names.len() + 1;

        match inner.ids.entry(TypeId::of::<T>()) {
            // Another thread may have registered `T` between the two locks.
            hash_map::Entry::Occupied(e) => *e.get(),
            hash_map::Entry::Vacant(e) => {
                if next == usize::MAX {
                    identifiers_exhausted();
                }
                let id = ComponentTypeId(next);
                e.insert(id);
                inner.names.push(type_name::<T>());

                log::debug!("registered component type {} as {:?}", type_name::<T>(), id);
                id
            }
        }
    }

    /// Returns the identifier of `T` if it has been registered.
    pub fn get<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.get_by_type_id(TypeId::of::<T>())
    }

    pub(crate) fn get_by_type_id(&self, type_id: TypeId) -> Option<ComponentTypeId> {
        self.inner.read().ids.get(&type_id).copied()
    }

    /// Returns the type name registered under `id`.
    pub fn name_of(&self, id: ComponentTypeId) -> Option<&'static str> {
        let idx = id.0.checked_sub(1)?;
        self.inner.read().names.get(idx).copied()
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.inner.read().names.len()
    }

    /// Returns `true` if no type has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cold]
#[inline(never)]
fn identifiers_exhausted() -> ! {
    panic!("Out of component type identifiers ({} assigned).", usize::MAX - 1);
}
