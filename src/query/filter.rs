//! Reusable presence filters.

use crate::entity::Entity;
use crate::mask::Mask;
use crate::registry::{ComponentTypeId, TypeRegistry};
use crate::storage::Database;
use std::sync::Arc;

/// A presence constraint over component types, built once and matched against
/// any database sharing the same [`TypeRegistry`].
#[derive(Clone)]
pub struct Filter {
    registry: Arc<TypeRegistry>,
    required: Mask,
    denied: Mask,
}

impl Filter {
    /// Returns `true` if an entity with presence mask `mask` passes the filter.
    pub fn matches(&self, mask: &Mask) -> bool {
        mask.query_mask(&self.required) && mask.query_mask_inverse(&self.denied)
    }
}

/// Builds a [`Filter`].
///
/// ```
/// use component_db::Database;
///
/// struct Enemy;
/// struct Dead;
///
/// let mut db = Database::new();
/// let e = db.create_entity();
/// db.add_component(e, Enemy).unwrap();
///
/// let alive_enemies = db.filter().with::<Enemy>().without::<Dead>().build();
/// assert_eq!(db.entities_matching(&alive_enemies), vec![e]);
/// ```
pub struct FilterBuilder {
    registry: Arc<TypeRegistry>,
    required: Mask,
    denied: Mask,
}

impl FilterBuilder {
    pub(crate) fn new(registry: Arc<TypeRegistry>) -> Self {
        let mut required = Mask::new();
        required.set(ComponentTypeId::ALIVE.index());

        FilterBuilder {
            registry,
            required,
            denied: Mask::new(),
        }
    }

    /// Requires the presence of `T`.
    pub fn with<T: 'static>(mut self) -> Self {
        let id = self.registry.identifier_for::<T>();
        self.required.set(id.index());
        self
    }

    /// Requires the absence of `T`.
    pub fn without<T: 'static>(mut self) -> Self {
        let id = self.registry.identifier_for::<T>();
        self.denied.set(id.index());
        self
    }

    /// Finishes the filter.
    pub fn build(self) -> Filter {
        Filter {
            registry: self.registry,
            required: self.required,
            denied: self.denied,
        }
    }
}

impl Database {
    /// Starts building a [`Filter`] over this database's component types.
    pub fn filter(&self) -> FilterBuilder {
        FilterBuilder::new(Arc::clone(&self.registry))
    }

    fn check_registry(&self, filter: &Filter) {
        assert!(
            Arc::ptr_eq(&self.registry, &filter.registry),
            "filter was built for a different type registry"
        );
    }

    /// Returns all live entities passing `filter`, in slot order.
    ///
    /// # Panics
    /// Panics if `filter` was built against a different [`TypeRegistry`].
    pub fn entities_matching(&self, filter: &Filter) -> Vec<Entity> {
        self.check_registry(filter);
        self.entities
            .iter()
            .filter(|&entity| {
                self.entities
                    .get(entity)
                    .map_or(false, |slot| filter.matches(&slot.mask))
            })
            .collect()
    }

    /// Returns the number of live entities passing `filter`.
    ///
    /// # Panics
    /// Panics if `filter` was built against a different [`TypeRegistry`].
    pub fn count_matching(&self, filter: &Filter) -> usize {
        self.check_registry(filter);
        self.entities
            .iter()
            .filter_map(|entity| self.entities.get(entity))
            .filter(|slot| filter.matches(&slot.mask))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B(u8);
    struct C;

    #[test]
    fn with_and_without() {
        let mut db = Database::new();
        let e: Vec<_> = (0..4).map(|_| db.create_entity()).collect();
        db.add_component(e[0], A).unwrap();
        db.add_component(e[1], A).unwrap();
        db.add_component(e[1], B(1)).unwrap();
        db.add_component(e[2], B(2)).unwrap();

        let a = db.filter().with::<A>().build();
        let a_not_b = db.filter().with::<A>().without::<B>().build();
        let neither = db.filter().without::<A>().without::<B>().build();
        let everything = db.filter().build();

        assert_eq!(db.entities_matching(&a), vec![e[0], e[1]]);
        assert_eq!(db.entities_matching(&a_not_b), vec![e[0]]);
        assert_eq!(db.entities_matching(&neither), vec![e[3]]);
        assert_eq!(db.count_matching(&everything), 4);
    }

    #[test]
    fn filters_see_later_changes() {
        let mut db = Database::new();
        let c = db.filter().with::<C>().build();
        assert_eq!(db.count_matching(&c), 0);

        let e = db.create_entity();
        db.add_component(e, C).unwrap();
        assert_eq!(db.entities_matching(&c), vec![e]);

        db.destroy_entity(e).unwrap();
        assert_eq!(db.count_matching(&c), 0);
    }

    #[test]
    fn filters_work_across_databases_sharing_a_registry() {
        let registry = Arc::new(TypeRegistry::new());
        let mut first = Database::with_registry(Arc::clone(&registry));
        let mut second = Database::with_registry(registry);

        let only_b = first.filter().with::<B>().build();

        let x = first.create_entity();
        first.add_component(x, A).unwrap();
        let y = second.create_entity();
        second.add_component(y, B(0)).unwrap();

        assert_eq!(first.count_matching(&only_b), 0);
        assert_eq!(second.entities_matching(&only_b), vec![y]);
    }

    #[test]
    #[should_panic]
    fn foreign_registry_panics() {
        let first = Database::new();
        let second = Database::new();
        let filter = first.filter().with::<A>().build();
        second.count_matching(&filter);
    }
}
