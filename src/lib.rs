//! An in-memory store of heterogeneous component data.
//!
//! An entity is an opaque handle for an object.
//! Each entity can have any number of components of distinct types attached to it at run time.
//! Components of the same type live together in a dense table, and every entity carries a
//! presence mask recording which component types it has, so scans over a set of component
//! types never need to inspect types at run time.
//!
//! A scan is described by a tuple of typed parameters:
//!
//! | parameter                  | matches entities that          | yields                  |
//! |----------------------------|--------------------------------|-------------------------|
//! | `&T` / `&mut T`            | have `T`                       | the stored `T`          |
//! | [`Tag<T>`]                 | have `T`                       | a marker                |
//! | [`Require<T>`]             | have `T`                       | a marker                |
//! | [`Deny<T>`]                | do not have `T`                | a marker                |
//! | `Option<&T>` etc.          | any                            | `T` if present          |
//! | [`Entity`]                 | any                            | the entity handle       |
//!
//! The first `&T`/`&mut T` parameter drives the scan, so results come in that table's
//! storage order.
//!
//! # Examples
//!
//! ```
//! use component_db::{Database, Deny, Entity};
//!
//! struct Position {
//!     x: f32,
//!     y: f32,
//! }
//!
//! struct Velocity {
//!     dx: f32,
//!     dy: f32,
//! }
//!
//! struct Frozen;
//!
//! fn main() {
//!     let mut db = Database::new();
//!
//!     let ball = db.create_entity();
//!     db.add_component(ball, Position { x: 0.0, y: 0.0 }).unwrap();
//!     db.add_component(ball, Velocity { dx: 1.0, dy: 2.0 }).unwrap();
//!
//!     let wall = db.create_entity();
//!     db.add_component(wall, Position { x: 5.0, y: 5.0 }).unwrap();
//!     db.add_component(wall, Velocity { dx: 1.0, dy: 0.0 }).unwrap();
//!     db.add_component(wall, Frozen).unwrap();
//!
//!     db.visit::<(&mut Position, &Velocity, Deny<Frozen>)>(|(pos, vel, _)| {
//!         pos.x += vel.dx;
//!         pos.y += vel.dy;
//!     });
//!
//!     assert_eq!(db.get_component::<Position>(ball).unwrap().y, 2.0);
//!     assert_eq!(db.get_component::<Position>(wall).unwrap().x, 5.0);
//!
//!     let mut moving = Vec::new();
//!     db.visit::<(Entity, Deny<Frozen>)>(|(entity, _)| moving.push(entity));
//!     assert_eq!(moving, vec![ball]);
//! }
//! ```
//!
//! # Threading
//!
//! A [`Database`] performs no internal synchronization. Sharing one between threads requires
//! external locking; only the [`TypeRegistry`] is designed to be shared.


pub mod error;
pub mod mask;
pub mod query;
pub mod registry;
pub mod storage;

mod entity;

pub use entity::ComponentId;
pub use entity::Entity;
pub use entity::EntityIndex;
pub use entity::Generation;
pub use error::Error;
pub use error::Result;
pub use mask::Mask;
pub use query::filter::Filter;
pub use query::filter::FilterBuilder;
pub use query::param::Deny;
pub use query::param::ParamInfo;
pub use query::param::ParamKind;
pub use query::param::Query;
pub use query::param::Require;
pub use query::param::Tag;
pub use query::QueryIter;
pub use registry::ComponentTypeId;
pub use registry::TypeRegistry;
pub use storage::component::Component;
pub use storage::component::BUCKET_LEN;
pub use storage::Database;

pub(crate) type HashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;
