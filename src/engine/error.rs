//! Error types for entity access and column storage.
//!
//! This module declares the small, focused error types that the storage layers
//! return. Each error models a single failure mode and carries enough context
//! (offending row, expected type, stale handle) to be actionable in a log line.
//!
//! ## Typical flow
//! Column operations return [`ColumnError`]. The transition engine that drives
//! them treats any column error as storage corruption and panics, since a
//! well-formed archetype graph never produces one. World-level operations that
//! can legitimately fail on stale input return [`EntityDoesNotExistError`].
//!
//! Expected absence (a missing component, a despawned entity, an absent
//! resource) is never an error: those paths return `Option` or `bool`.

use thiserror::Error;

use crate::engine::entity::Entity;


/// Returned when decoding an [`Entity`] or identifier from raw bits fails.

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierError {
    /// The high word has a zero generation, which no live identifier carries.
    #[error("the provided high bits do not encode a valid generation")]
    InvalidIdentifier,

    /// The bits decode to a placeholder identifier, not an entity.
    #[error("attempted to decode a placeholder identifier ({0:#x}) as an entity")]
    InvalidEntityId(u64),
}

/// Returned when a world operation targets an entity handle that is not live.
///
/// The handle is either stale (its slot was freed and possibly reused with a
/// newer generation) or was never allocated by this world.

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("entity {entity} does not exist")]
pub struct EntityDoesNotExistError {
    /// The handle that failed to resolve.
    pub entity: Entity,
}

/// Returned when a type-erased value does not match a column's element type.

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("type mismatch: column stores `{expected}`")]
pub struct TypeMismatchError {
    /// Element type name of the column that rejected the value.
    pub expected: &'static str,
}

/// Failure modes of a single component column.

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ColumnError {
    /// The requested row is past the end of the column.
    #[error("row {row} is out of bounds for a column of length {length}")]
    RowOutOfBounds {
        /// Offending row.
        row: usize,
        /// Column length at the time of the access.
        length: usize,
    },

    /// The row already holds a value; initialising it again would leak or
    /// double-drop the previous one.
    #[error("row {row} is already initialized")]
    AlreadyInitialized {
        /// Offending row.
        row: usize,
    },

    /// A value of the wrong type was handed to the column.
    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatchError),
}
