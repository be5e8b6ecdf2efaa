//! Core identifiers and sentinel constants.
//!
//! This module defines the small, copyable numeric identifiers shared by every
//! storage layer of the engine: component ids, table ids, archetype ids, bundle
//! ids and row indices. They are plain integer aliases so they can index arenas
//! (`Vec`s) directly, which is how every registry in the engine refers to its
//! entries.
//!
//! ## Arena + index
//!
//! Tables, archetypes, bundles and component descriptors all live in
//! append-only vectors owned by the world. Cross references between them are
//! expressed with the ids below, never with pointers, so the graph of archetype
//! edges can be cyclic without any shared ownership.
//!
//! ## Sentinels
//!
//! - [`EMPTY_ARCHETYPE`] / [`EMPTY_TABLE`] are created with the world and always
//!   exist. Freshly flushed entities land there.
//! - [`INVALID_ARCHETYPE`], [`INVALID_TABLE`] and [`INVALID_ROW`] mark a location
//!   that has been reserved but not yet placed.

/// Identifier of a registered component or resource type.
pub type ComponentID = u32;
/// Identifier of a table (a unique set of table-stored component ids).
pub type TableID = u32;
/// Identifier of an archetype (a unique table + sparse-set component set).
pub type ArchetypeID = u32;
/// Identifier of a registered bundle type.
pub type BundleID = u32;
/// Row of an entity inside its table.
pub type TableRow = u32;
/// Row of an entity inside its archetype's entity list.
pub type ArchetypeRow = u32;

/// Archetype with no components. Always present at index 0.
pub const EMPTY_ARCHETYPE: ArchetypeID = 0;
/// Table with no columns. Always present at index 0.
pub const EMPTY_TABLE: TableID = 0;

/// Archetype id of a reserved-but-unplaced entity.
pub const INVALID_ARCHETYPE: ArchetypeID = ArchetypeID::MAX;
/// Table id of a reserved-but-unplaced entity.
pub const INVALID_TABLE: TableID = TableID::MAX;
/// Row of a reserved-but-unplaced entity.
pub const INVALID_ROW: u32 = u32::MAX;

/// Default number of entity metadata slots reserved by a new world.
pub const DEFAULT_ENTITY_CAPACITY: u32 = 0;
/// Default initial row capacity of a freshly created table.
pub const DEFAULT_TABLE_CAPACITY: usize = 0;
