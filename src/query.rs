//! Scans over entities selected by typed parameters.

pub mod filter;
pub mod param;

use crate::entity::{Entity, EntityIndex};
use crate::mask::Mask;
use crate::registry::{ComponentTypeId, TypeRegistry};
use crate::storage::component::AnyTable;
use crate::storage::entities::EntityTable;
use crate::storage::Database;
use param::{Fetch, ParamInfo, ParamKind, Params, Prepare, Query};
use std::marker::PhantomData;
use std::ptr::NonNull;

/// Presence constraints and the driving table of one query.
pub(crate) struct Plan {
    /// The first `&T`/`&mut T` parameter, if any.
    primary: Option<ComponentTypeId>,
    required: Mask,
    denied: Mask,
    /// `false` if a required component type was never registered.
    satisfiable: bool,
}

impl Plan {
    pub(crate) fn new<Q: Query>(registry: &TypeRegistry) -> Plan {
        let mut params = Params::new();
        Q::params(&mut params);
        check_aliasing(&params);

        let mut required = Mask::new();
        let mut denied = Mask::new();
        let mut primary = None;
        let mut satisfiable = true;

        required.set(ComponentTypeId::ALIVE.index());

        for param in &params {
            let id = param.type_id.and_then(|type_id| registry.get_by_type_id(type_id));

            match param.kind {
                ParamKind::Data | ParamKind::Tag | ParamKind::Require => match id {
                    Some(id) => {
                        required.set(id.index());
                        if param.kind == ParamKind::Data && primary.is_none() {
                            primary = Some(id);
                        }
                    }
                    None => satisfiable = false,
                },
                // Nothing can carry an unregistered type.
                ParamKind::Deny => {
                    if let Some(id) = id {
                        denied.set(id.index());
                    }
                }
                ParamKind::Optional | ParamKind::Identity => {}
            }
        }

        Plan {
            primary,
            required,
            denied,
            satisfiable,
        }
    }

    #[inline]
    pub(crate) fn matches(&self, mask: &Mask) -> bool {
        mask.query_mask(&self.required) && mask.query_mask_inverse(&self.denied)
    }
}

/// Panics if two parameters access the same component type and one of them mutably.
fn check_aliasing(params: &[ParamInfo]) {
    #[cold]
    #[inline(never)]
    fn aliasing_failed(a: &ParamInfo, b: &ParamInfo) -> ! {
        panic!(
            "query accesses {} more than once with mutable access ({:?} and {:?})",
            a.type_name, a.kind, b.kind
        );
    }

    for (i, a) in params.iter().enumerate() {
        for b in &params[i + 1..] {
            if a.data && b.data && a.type_id == b.type_id && (a.mutable || b.mutable) {
                aliasing_failed(a, b);
            }
        }
    }
}

enum Source {
    /// Walk the data slots of the primary component table.
    Table(NonNull<dyn AnyTable>),
    /// Walk all entity slots.
    Entities,
    Empty,
}

/// An iterator over the entities matching `Q`, created by [`Database::query`].
///
/// Yields values in the storage order of the first `&T`/`&mut T` parameter's table,
/// or in entity slot order if there is none.
pub struct QueryIter<'w, Q: Query> {
    entities: &'w EntityTable,
    source: Source,
    plan: Plan,
    state: Option<Q::State>,
    cursor: usize,
    _borrow: PhantomData<&'w mut Database>,
}

impl<'w, Q: Query> QueryIter<'w, Q> {
    fn bound(&self) -> usize {
        match self.source {
            // Safety: the table outlives `'w` and no other reference to its bookkeeping is alive.
            Source::Table(table) => unsafe { table.as_ref() }.slot_bound(),
            Source::Entities => self.entities.n_slots(),
            Source::Empty => 0,
        }
    }
}

impl<'w, Q: Query> Iterator for QueryIter<'w, Q> {
    type Item = Q::Item<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        let state = self.state.as_ref()?;

        loop {
            if self.cursor >= self.bound() {
                return None;
            }
            let cursor = self.cursor;
            self.cursor += 1;

            let (index, primary) = match self.source {
                Source::Table(table) => {
                    // Safety: see `bound`.
                    match unsafe { table.as_ref() }.owner(cursor as u32) {
                        Some(index) => (index, self.plan.primary.map(|id| (id, cursor as u32))),
                        None => continue,
                    }
                }
                Source::Entities => (cursor as EntityIndex, None),
                Source::Empty => return None,
            };

            let Some(slot) = self.entities.slot(index) else {
                continue;
            };
            if !self.plan.matches(&slot.mask) {
                continue;
            }

            let cx = Fetch {
                entity: Entity::new(index, slot.generation),
                mask: &slot.mask,
                primary,
            };
            // Safety: the entity matches every constraint of `Q`, parameters were checked
            // for aliasing, each entity is visited once and a fetch borrows only the
            // addressed value, not its neighbours.
            return Some(unsafe { Q::fetch(state, &cx) });
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.state {
            Some(_) => (0, Some(self.bound().saturating_sub(self.cursor))),
            None => (0, Some(0)),
        }
    }
}

impl Database {
    /// Returns an iterator over the entities matching `Q`.
    ///
    /// # Panics
    /// Panics if `Q` names a component type more than once and any of those
    /// parameters is mutable.
    pub fn query<Q: Query>(&mut self) -> QueryIter<'_, Q> {
        let plan = Plan::new::<Q>(&self.registry);

        let mut cx = Prepare::new(&self.registry, &mut self.tables);
        let state = if plan.satisfiable { Q::prepare(&mut cx) } else { None };
        let source = match (&state, plan.primary) {
            (None, _) => Source::Empty,
            (Some(_), Some(primary)) => cx.table_dyn(primary).map_or(Source::Empty, Source::Table),
            (Some(_), None) => Source::Entities,
        };

        QueryIter {
            entities: &self.entities,
            source,
            plan,
            state,
            cursor: 0,
            _borrow: PhantomData,
        }
    }

    /// Calls `visitor` once for every entity matching `Q`.
    ///
    /// The visitor may not change the structure of the database. Use
    /// [`visit_entities`](Self::visit_entities) to add or remove components during a scan.
    ///
    /// # Panics
    /// Panics if `Q` names a component type more than once and any of those
    /// parameters is mutable.
    pub fn visit<'w, Q: Query>(&'w mut self, visitor: impl FnMut(Q::Item<'w>)) {
        self.query::<Q>().for_each(visitor);
    }

    /// Calls `visitor` with the database and each entity matching `Q`.
    ///
    /// The visitor may create and destroy entities and add or remove components.
    /// The scan position only moves forward: slots already passed are never visited
    /// again, and a slot ahead of it is visited if it matches when the scan reaches it.
    /// Each slot is checked again right before its visit, so entities destroyed or
    /// changed by an earlier visit are skipped.
    pub fn visit_entities<Q: Query>(&mut self, mut visitor: impl FnMut(&mut Database, Entity)) {
        let plan = Plan::new::<Q>(&self.registry);
        if !plan.satisfiable {
            return;
        }

        let mut cursor = 0;
        loop {
            let index = match plan.primary {
                Some(primary) => {
                    let Some(table) = self.tables.get_dyn(primary) else {
                        return;
                    };
                    if cursor >= table.slot_bound() {
                        return;
                    }
                    cursor += 1;
                    match table.owner((cursor - 1) as u32) {
                        Some(index) => index,
                        None => continue,
                    }
                }
                None => {
                    if cursor >= self.entities.n_slots() {
                        return;
                    }
                    cursor += 1;
                    (cursor - 1) as EntityIndex
                }
            };

            let Some(slot) = self.entities.slot(index) else {
                continue;
            };
            if !plan.matches(&slot.mask) {
                continue;
            }

            let entity = Entity::new(index, slot.generation);
            visitor(self, entity);
        }
    }
}
