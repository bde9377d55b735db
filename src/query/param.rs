//! Typed scan parameters.

use crate::entity::Entity;
use crate::mask::Mask;
use crate::registry::{ComponentTypeId, TypeRegistry};
use crate::storage::component::{AnyTable, Component, ComponentTable};
use crate::storage::Tables;
use smallvec::SmallVec;
use std::any::{type_name, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// The role of one scan parameter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParamKind {
    /// `&T` or `&mut T`: the entity must have `T`; yields the value.
    Data,
    /// [`Tag<T>`]: the entity must have `T`; yields a marker.
    Tag,
    /// [`Require<T>`]: the entity must have `T`; yields a marker.
    Require,
    /// [`Deny<T>`]: the entity must not have `T`; yields a marker.
    Deny,
    /// `Option<..>`: no constraint; yields the value if present.
    Optional,
    /// [`Entity`]: no constraint; yields the entity handle.
    Identity,
}

/// Description of one scan parameter.
#[derive(Copy, Clone, Debug)]
pub struct ParamInfo {
    pub kind: ParamKind,
    pub(crate) type_id: Option<TypeId>,
    pub type_name: &'static str,
    /// `true` if the parameter hands out mutable references.
    pub mutable: bool,
    /// `true` if the parameter reads or writes stored values.
    pub(crate) data: bool,
}

impl ParamInfo {
    fn of<T: 'static>(kind: ParamKind, mutable: bool) -> Self {
        ParamInfo {
            kind,
            type_id: Some(TypeId::of::<T>()),
            type_name: type_name::<T>(),
            mutable,
            data: matches!(kind, ParamKind::Data | ParamKind::Optional),
        }
    }
}

#[doc(hidden)]
pub type Params = SmallVec<[ParamInfo; 8]>;

/// Resolves component tables for the parameters of one scan.
///
/// Every parameter naming the same component type receives the same table pointer.
pub struct Prepare<'a> {
    registry: &'a TypeRegistry,
    tables: &'a mut Tables,
    resolved: SmallVec<[(ComponentTypeId, NonNull<dyn AnyTable>); 8]>,
}

impl<'a> Prepare<'a> {
    pub(crate) fn new(registry: &'a TypeRegistry, tables: &'a mut Tables) -> Self {
        Prepare {
            registry,
            tables,
            resolved: SmallVec::new(),
        }
    }

    pub(crate) fn table_dyn(&mut self, id: ComponentTypeId) -> Option<NonNull<dyn AnyTable>> {
        if let Some((_, table)) = self.resolved.iter().find(|(resolved, _)| *resolved == id) {
            return Some(*table);
        }
        let table = NonNull::from(self.tables.get_dyn_mut(id)?);
        self.resolved.push((id, table));
        Some(table)
    }

    fn table<T: Component>(&mut self) -> Option<TableRef<T>> {
        let id = self.registry.get::<T>()?;
        let table = self.table_dyn(id)?;
        // Safety: pointers from `table_dyn` are valid while `self.tables` is borrowed.
        let stores_t = unsafe { table.as_ref() }.as_any().is::<ComponentTable<T>>();
        stores_t.then(|| TableRef {
            id,
            table: table.cast(),
        })
    }

    fn registered<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.registry.get::<T>()
    }
}

/// The entity a scan currently stands on.
pub struct Fetch<'a> {
    pub(crate) entity: Entity,
    pub(crate) mask: &'a Mask,
    /// The driving component type and the data slot of its value.
    pub(crate) primary: Option<(ComponentTypeId, u32)>,
}

#[doc(hidden)]
pub struct TableRef<T> {
    id: ComponentTypeId,
    table: NonNull<ComponentTable<T>>,
}

impl<T: 'static> TableRef<T> {
    /// Returns the data slot of the current entity's value.
    ///
    /// # Safety
    /// The table must be alive and the entity must have a component in it.
    #[inline]
    unsafe fn slot(&self, cx: &Fetch<'_>) -> u32 {
        match cx.primary {
            Some((id, slot)) if id == self.id => slot,
            _ => match unsafe { self.table.as_ref() }.slot_of(cx.entity.index) {
                Some(slot) => slot,
                None => unreachable!("presence mask lists {} without a stored value", type_name::<T>()),
            },
        }
    }

    #[inline]
    unsafe fn get<'w>(&self, cx: &Fetch<'_>) -> &'w T {
        unsafe { &*ComponentTable::value_ptr(self.table.as_ptr(), self.slot(cx)) }
    }

    #[inline]
    unsafe fn get_mut<'w>(&self, cx: &Fetch<'_>) -> &'w mut T {
        unsafe { &mut *ComponentTable::value_ptr_mut(self.table.as_ptr(), self.slot(cx)) }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A tuple of scan parameters, see the [crate documentation](crate) for the vocabulary.
///
/// Tuples of up to twelve parameters implement `Query`, and tuples nest.
///
/// # Safety
/// Implementations must only hand out references to values of the tables they resolved
/// in `prepare`, and only mutable ones for parameters described as mutable.
pub unsafe trait Query: sealed::Sealed {
    /// What a visit yields for one entity.
    type Item<'w>;

    #[doc(hidden)]
    type State;

    #[doc(hidden)]
    fn params(out: &mut Params);

    /// Returns `None` if the parameter can never match in this database.
    #[doc(hidden)]
    fn prepare(cx: &mut Prepare<'_>) -> Option<Self::State>;

    /// # Safety
    /// The current entity must satisfy the constraints of every parameter and no
    /// reference previously yielded for this entity may still be alive.
    #[doc(hidden)]
    unsafe fn fetch<'w>(state: &Self::State, cx: &Fetch<'_>) -> Self::Item<'w>;
}

macro_rules! marker {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        pub struct $name<T: ?Sized>(PhantomData<fn() -> T>);

        impl<T: ?Sized> $name<T> {
            /// Creates the marker.
            pub const fn new() -> Self {
                $name(PhantomData)
            }
        }

        impl<T: ?Sized> Clone for $name<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T: ?Sized> Copy for $name<T> {}

        impl<T: ?Sized> Default for $name<T> {
            fn default() -> Self {
                Self::new()
            }
        }

        impl<T: ?Sized> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}<{}>", stringify!($name), type_name::<T>())
            }
        }
    };
}

marker! {
    /// Matches entities that have a `T`, typically a data-less component.
    Tag
}

marker! {
    /// Matches entities that have a `T` without reading it.
    Require
}

marker! {
    /// Matches entities that do not have a `T`.
    Deny
}

impl<T: Component> sealed::Sealed for &T {}

unsafe impl<'q, T: Component> Query for &'q T {
    type Item<'w> = &'w T;
    type State = TableRef<T>;

    fn params(out: &mut Params) {
        out.push(ParamInfo::of::<T>(ParamKind::Data, false));
    }

    fn prepare(cx: &mut Prepare<'_>) -> Option<Self::State> {
        cx.table::<T>()
    }

    #[inline]
    unsafe fn fetch<'w>(state: &Self::State, cx: &Fetch<'_>) -> Self::Item<'w> {
        unsafe { state.get(cx) }
    }
}

impl<T: Component> sealed::Sealed for &mut T {}

unsafe impl<'q, T: Component> Query for &'q mut T {
    type Item<'w> = &'w mut T;
    type State = TableRef<T>;

    fn params(out: &mut Params) {
        out.push(ParamInfo::of::<T>(ParamKind::Data, true));
    }

    fn prepare(cx: &mut Prepare<'_>) -> Option<Self::State> {
        cx.table::<T>()
    }

    #[inline]
    unsafe fn fetch<'w>(state: &Self::State, cx: &Fetch<'_>) -> Self::Item<'w> {
        unsafe { state.get_mut(cx) }
    }
}

macro_rules! impl_marker_query {
    ($name:ident, $kind:ident) => {
        impl<T: Component> sealed::Sealed for $name<T> {}

        unsafe impl<T: Component> Query for $name<T> {
            type Item<'w> = $name<T>;
            type State = ();

            fn params(out: &mut Params) {
                out.push(ParamInfo::of::<T>(ParamKind::$kind, false));
            }

            fn prepare(_: &mut Prepare<'_>) -> Option<Self::State> {
                Some(())
            }

            #[inline]
            unsafe fn fetch<'w>(_: &Self::State, _: &Fetch<'_>) -> Self::Item<'w> {
                $name::new()
            }
        }
    };
}

impl_marker_query!(Tag, Tag);
impl_marker_query!(Require, Require);
impl_marker_query!(Deny, Deny);

impl<T: Component> sealed::Sealed for Option<&T> {}

unsafe impl<'q, T: Component> Query for Option<&'q T> {
    type Item<'w> = Option<&'w T>;
    type State = Option<TableRef<T>>;

    fn params(out: &mut Params) {
        out.push(ParamInfo::of::<T>(ParamKind::Optional, false));
    }

    fn prepare(cx: &mut Prepare<'_>) -> Option<Self::State> {
        Some(cx.table::<T>())
    }

    #[inline]
    unsafe fn fetch<'w>(state: &Self::State, cx: &Fetch<'_>) -> Self::Item<'w> {
        let table = state.as_ref()?;
        if !cx.mask.get(table.id.index()) {
            return None;
        }
        Some(unsafe { table.get(cx) })
    }
}

impl<T: Component> sealed::Sealed for Option<&mut T> {}

unsafe impl<'q, T: Component> Query for Option<&'q mut T> {
    type Item<'w> = Option<&'w mut T>;
    type State = Option<TableRef<T>>;

    fn params(out: &mut Params) {
        out.push(ParamInfo::of::<T>(ParamKind::Optional, true));
    }

    fn prepare(cx: &mut Prepare<'_>) -> Option<Self::State> {
        Some(cx.table::<T>())
    }

    #[inline]
    unsafe fn fetch<'w>(state: &Self::State, cx: &Fetch<'_>) -> Self::Item<'w> {
        let table = state.as_ref()?;
        if !cx.mask.get(table.id.index()) {
            return None;
        }
        Some(unsafe { table.get_mut(cx) })
    }
}

impl<T: Component> sealed::Sealed for Option<Tag<T>> {}

unsafe impl<T: Component> Query for Option<Tag<T>> {
    type Item<'w> = Option<Tag<T>>;
    type State = Option<ComponentTypeId>;

    fn params(out: &mut Params) {
        out.push(ParamInfo {
            data: false,
            ..ParamInfo::of::<T>(ParamKind::Optional, false)
        });
    }

    fn prepare(cx: &mut Prepare<'_>) -> Option<Self::State> {
        Some(cx.registered::<T>())
    }

    #[inline]
    unsafe fn fetch<'w>(state: &Self::State, cx: &Fetch<'_>) -> Self::Item<'w> {
        let id = (*state)?;
        cx.mask.get(id.index()).then(Tag::new)
    }
}

impl sealed::Sealed for Entity {}

unsafe impl Query for Entity {
    type Item<'w> = Entity;
    type State = ();

    fn params(out: &mut Params) {
        out.push(ParamInfo {
            kind: ParamKind::Identity,
            type_id: None,
            type_name: type_name::<Entity>(),
            mutable: false,
            data: false,
        });
    }

    fn prepare(_: &mut Prepare<'_>) -> Option<Self::State> {
        Some(())
    }

    #[inline]
    unsafe fn fetch<'w>(_: &Self::State, cx: &Fetch<'_>) -> Self::Item<'w> {
        cx.entity
    }
}

macro_rules! impl_query_tuple {
    ($($name:ident),*) => {
        impl<$($name: Query),*> sealed::Sealed for ($($name,)*) {}

        #[allow(non_snake_case, unused_variables, clippy::unused_unit)]
        unsafe impl<$($name: Query),*> Query for ($($name,)*) {
            type Item<'w> = ($($name::Item<'w>,)*);
            type State = ($($name::State,)*);

            fn params(out: &mut Params) {
                $($name::params(out);)*
            }

            fn prepare(cx: &mut Prepare<'_>) -> Option<Self::State> {
                Some(($($name::prepare(cx)?,)*))
            }

            #[inline]
            unsafe fn fetch<'w>(state: &Self::State, cx: &Fetch<'_>) -> Self::Item<'w> {
                let ($($name,)*) = state;
                ($(unsafe { $name::fetch($name, cx) },)*)
            }
        }
    };
}

impl_query_tuple!();
impl_query_tuple!(A);
impl_query_tuple!(A, B);
impl_query_tuple!(A, B, C);
impl_query_tuple!(A, B, C, D);
impl_query_tuple!(A, B, C, D, E);
impl_query_tuple!(A, B, C, D, E, F);
impl_query_tuple!(A, B, C, D, E, F, G);
impl_query_tuple!(A, B, C, D, E, F, G, H);
impl_query_tuple!(A, B, C, D, E, F, G, H, I);
impl_query_tuple!(A, B, C, D, E, F, G, H, I, J);
impl_query_tuple!(A, B, C, D, E, F, G, H, I, J, K);
impl_query_tuple!(A, B, C, D, E, F, G, H, I, J, K, L);

/// Describes the parameters of `Q` in declaration order.
pub fn describe<Q: Query>() -> Vec<ParamInfo> {
    let mut params = Params::new();
    Q::params(&mut params);
    params.into_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B(u32);

    #[test]
    fn nested_tuples_flatten_in_order() {
        let params = describe::<(Entity, (&B, Deny<A>), Option<&mut B>, Tag<A>)>();
        let kinds: Vec<_> = params.iter().map(|p| (p.kind, p.mutable)).collect();

        assert_eq!(
            kinds,
            vec![
                (ParamKind::Identity, false),
                (ParamKind::Data, false),
                (ParamKind::Deny, false),
                (ParamKind::Optional, true),
                (ParamKind::Tag, false),
            ]
        );
        assert_eq!(params[1].type_id, Some(TypeId::of::<B>()));
        assert_eq!(params[0].type_id, None);
    }

    #[test]
    fn markers_print_their_type() {
        assert_eq!(format!("{:?}", Deny::<B>::new()), format!("Deny<{}>", type_name::<B>()));
    }

    #[test]
    fn optional_tags_do_not_access_data() {
        let params = describe::<(Option<Tag<A>>, Option<&A>)>();
        assert_eq!(params[0].kind, ParamKind::Optional);
        assert!(!params[0].data);
        assert!(params[1].data);
    }
}
