//! Errors of entity and component operations.

use crate::Entity;
use thiserror::Error;

/// Errors returned by [`Database`](crate::Database) operations on specific entities.
///
/// Scans never fail: an entity that does not match is skipped and a missing optional
/// component is `None`.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// The handle refers to a destroyed entity, possibly one whose slot has been reused.
    #[error("entity {0:?} does not exist")]
    StaleEntity(Entity),

    /// The entity exists but has no component of the requested type.
    #[error("entity {entity:?} has no component {component}")]
    ComponentNotFound {
        /// The entity that was asked for the component.
        entity: Entity,
        /// Type name of the missing component.
        component: &'static str,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
