pub(crate) mod component;
pub(crate) mod entities;

use crate::entity::ComponentId;
use crate::error::{Error, Result};
use crate::registry::{ComponentTypeId, TypeRegistry};
use crate::Entity;
use component::{AnyTable, Component, ComponentTable};
use entities::EntityTable;
use std::any::type_name;
use std::sync::Arc;

/// Component tables of one database, indexed by component type identifier.
#[derive(Default)]
pub(crate) struct Tables {
    tables: Vec<Option<Box<dyn AnyTable>>>,
}

impl Tables {
    #[inline]
    pub(crate) fn get_dyn(&self, id: ComponentTypeId) -> Option<&dyn AnyTable> {
        self.tables.get(id.index())?.as_deref()
    }

    #[inline]
    pub(crate) fn get_dyn_mut(&mut self, id: ComponentTypeId) -> Option<&mut (dyn AnyTable + 'static)> {
        self.tables.get_mut(id.index())?.as_deref_mut()
    }

    #[inline]
    pub(crate) fn get<T: Component>(&self, id: ComponentTypeId) -> Option<&ComponentTable<T>> {
        self.get_dyn(id)?.as_any().downcast_ref()
    }

    #[inline]
    pub(crate) fn get_mut<T: Component>(&mut self, id: ComponentTypeId) -> Option<&mut ComponentTable<T>> {
        self.get_dyn_mut(id)?.as_any_mut().downcast_mut()
    }

    fn get_or_create<T: Component>(&mut self, id: ComponentTypeId) -> &mut ComponentTable<T> {
        if id.index() >= self.tables.len() {
            self.tables.resize_with(id.index() + 1, || None);
        }

        let table = self.tables[id.index()].get_or_insert_with(|| {
            log::debug!("created component table for {} ({:?})", type_name::<T>(), id);
            Box::new(ComponentTable::<T>::new())
        });

        if !table.as_any().is::<ComponentTable<T>>() {
            table_mismatch(id, table.component_name(), type_name::<T>());
        }
        match table.as_any_mut().downcast_mut() {
            Some(table) => table,
            None => unreachable!(),
        }
    }
}

#[cold]
#[inline(never)]
fn table_mismatch(id: ComponentTypeId, stored: &str, expected: &str) -> ! {
    panic!("component table {:?} stores {}, not {}", id, stored, expected);
}

#[cold]
#[inline(never)]
fn mask_desync(entity: Entity, component: &str) -> ! {
    panic!(
        "presence mask of {:?} lists {} but its component table does not",
        entity, component
    );
}

/// A container of entities and their components.
///
/// Every operation is synchronous and the database performs no locking of its own.
pub struct Database {
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) entities: EntityTable,
    pub(crate) tables: Tables,
}

impl Database {
    /// Creates an empty database with its own type registry.
    pub fn new() -> Database {
        Database::with_registry(Arc::new(TypeRegistry::new()))
    }

    /// Creates an empty database that takes component type identifiers from `registry`.
    pub fn with_registry(registry: Arc<TypeRegistry>) -> Database {
        Database {
            registry,
            entities: Default::default(),
            tables: Default::default(),
        }
    }

    /// Returns the type registry of the database.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Creates a new entity without components.
    pub fn create_entity(&mut self) -> Entity {
        self.entities.create()
    }

    /// Destroys an entity together with all of its components.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<()> {
        let slot = self.entities.get(entity).ok_or(Error::StaleEntity(entity))?;

        for bit in slot.mask.iter_ones() {
            if bit == ComponentTypeId::ALIVE.index() {
                continue;
            }
            match self.tables.get_dyn_mut(ComponentTypeId(bit)) {
                Some(table) => table.remove_entity(entity.index),
                None => mask_desync(entity, "a component without a table"),
            }
        }

        self.entities.release(entity);
        log::trace!("destroyed entity {:?}", entity);
        Ok(())
    }

    /// Destroys all entities.
    pub fn clear(&mut self) {
        let entities: Vec<_> = self.entities.iter().collect();
        for entity in entities {
            let destroyed = self.destroy_entity(entity);
            debug_assert!(destroyed.is_ok());
        }
    }

    /// Returns `true` if the handle refers to a live entity.
    /// Handles of destroyed entities stay invalid even after their slot is reused.
    pub fn exists(&self, entity: Entity) -> bool {
        self.entities.contains(entity)
    }

    /// Returns the number of live entities.
    pub fn size(&self) -> usize {
        self.entities.count()
    }

    /// Returns an iterator over all live entities in slot order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter()
    }

    /// Attaches `value` to the entity. If the entity already has a component of type `T`,
    /// the stored value is overwritten in place and keeps its [`ComponentId`].
    ///
    /// Zero-sized components without drop glue are tags: only their presence is recorded.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> Result<ComponentId> {
        let slot = self.entities.get_mut(entity).ok_or(Error::StaleEntity(entity))?;
        let id = self.registry.identifier_for::<T>();
        let table = self.tables.get_or_create::<T>(id);

        if slot.mask.get(id.index()) {
            let data_slot = match table.slot_of(entity.index) {
                Some(data_slot) => data_slot,
                None => mask_desync(entity, type_name::<T>()),
            };
            if let Some(stored) = table.get_mut(data_slot) {
                *stored = value;
            }
            return Ok(ComponentId(data_slot));
        }

        let component_id = table.insert(entity.index, value);
        slot.mask.set(id.index());
        Ok(component_id)
    }

    /// Detaches the component of type `T` from the entity and returns it.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<T> {
        let slot = self.entities.get_mut(entity).ok_or(Error::StaleEntity(entity))?;
        let not_found = Error::ComponentNotFound {
            entity,
            component: type_name::<T>(),
        };

        let id = self.registry.get::<T>().ok_or(not_found)?;
        if !slot.mask.get(id.index()) {
            return Err(not_found);
        }

        let value = match self.tables.get_mut::<T>(id).and_then(|t| t.remove(entity.index)) {
            Some(value) => value,
            None => mask_desync(entity, type_name::<T>()),
        };
        slot.mask.unset(id.index());

        Ok(value)
    }

    /// Locates the data slot of the entity's `T` component.
    fn locate<T: Component>(&self, entity: Entity) -> Result<(ComponentTypeId, u32)> {
        let slot = self.entities.get(entity).ok_or(Error::StaleEntity(entity))?;
        let not_found = Error::ComponentNotFound {
            entity,
            component: type_name::<T>(),
        };

        let id = self.registry.get::<T>().ok_or(not_found)?;
        if !slot.mask.get(id.index()) {
            return Err(not_found);
        }

        let data_slot = self
            .tables
            .get::<T>(id)
            .and_then(|table| table.slot_of(entity.index));

        match data_slot {
            Some(data_slot) => Ok((id, data_slot)),
            None => mask_desync(entity, type_name::<T>()),
        }
    }

    /// Returns a reference to the component `T` of the specified entity.
    pub fn get_component<T: Component>(&self, entity: Entity) -> Result<&T> {
        let (id, data_slot) = self.locate::<T>(entity)?;
        self.tables
            .get::<T>(id)
            .and_then(|table| table.get(data_slot))
            .ok_or(Error::ComponentNotFound {
                entity,
                component: type_name::<T>(),
            })
    }

    /// Returns a mutable reference to the component `T` of the specified entity.
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T> {
        let (id, data_slot) = self.locate::<T>(entity)?;
        self.tables
            .get_mut::<T>(id)
            .and_then(|table| table.get_mut(data_slot))
            .ok_or(Error::ComponentNotFound {
                entity,
                component: type_name::<T>(),
            })
    }

    /// Returns the identifier of the entity's `T` component.
    pub fn component_id<T: Component>(&self, entity: Entity) -> Result<ComponentId> {
        self.locate::<T>(entity).map(|(_, data_slot)| ComponentId(data_slot))
    }

    /// Returns `true` if the entity exists and has a component of type `T`.
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        match (self.entities.get(entity), self.registry.get::<T>()) {
            (Some(slot), Some(id)) => slot.mask.get(id.index()),
            _ => false,
        }
    }

    /// Returns the number of live components of type `T`.
    pub fn count<T: Component>(&self) -> usize {
        self.registry
            .get::<T>()
            .and_then(|id| self.tables.get_dyn(id))
            .map_or(0, |table| table.len())
    }

    fn table<T: Component>(&self) -> Option<&ComponentTable<T>> {
        self.tables.get(self.registry.get::<T>()?)
    }

    /// Returns the component of type `T` with the given identifier.
    pub fn component_by_id<T: Component>(&self, id: ComponentId) -> Option<&T> {
        self.table::<T>()?.get(id.0)
    }

    /// Returns the component of type `T` with the given identifier.
    pub fn component_by_id_mut<T: Component>(&mut self, id: ComponentId) -> Option<&mut T> {
        let type_id = self.registry.get::<T>()?;
        self.tables.get_mut::<T>(type_id)?.get_mut(id.0)
    }

    /// Returns the entity owning the component of type `T` with the given identifier.
    pub fn entity_of<T: Component>(&self, id: ComponentId) -> Option<Entity> {
        let index = self.table::<T>()?.entity_of(id.0)?;
        self.entities.handle_at(index)
    }

    /// Converts the handle to an integer token, e.g. to store it outside the database.
    /// The token is only meaningful to [`from_token`](Self::from_token) of the same database.
    pub fn to_token(&self, entity: Entity) -> u64 {
        entity.to_bits()
    }

    /// Converts a token back to a handle. Does not check that the entity still exists.
    pub fn from_token(&self, token: u64) -> Entity {
        Entity::from_bits(token)
    }
}

impl Default for Database {
    fn default() -> Self {
        Database::new()
    }
}
