//! # Tabula
//!
//! Archetype-based entity/component storage.
//!
//! ## Design Goals
//! - Columnar tables keyed by component set for cache-friendly iteration
//! - Sparse sets for components that are added and removed often
//! - Cached archetype transitions so repeated structural changes are cheap
//! - Tick-based change detection that survives counter wrap-around
//!
//! ```rust
//! use tabula::prelude::*;
//!
//! struct Position(f32);
//! impl Component for Position {}
//!
//! let mut world = World::new();
//! let entity = world.spawn(Position(1.0));
//! world.get_mut::<Position>(entity).unwrap().0 += 1.0;
//! assert_eq!(world.get::<Position>(entity).unwrap().0, 2.0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]
#![deny(dead_code)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::world::{
    World,
    WorldId,
};

pub use engine::entity::{
    Entity,
    EntityLocation,
    Entities,
};

pub use engine::entity_ref::{
    EntityRef,
    EntityMut,
};

pub use engine::component::{
    Component,
    Resource,
    StorageType,
    ComponentDescriptor,
    ComponentInfo,
    ComponentRegistry,
};

pub use engine::bundle::Bundle;

pub use engine::change_detection::{
    Tick,
    ComponentTicks,
    DetectChanges,
    DetectChangesMut,
    Ref,
    Mut,
    Res,
    ResMut,
};

pub use engine::config::WorldConfig;

pub use engine::error::{
    IdentifierError,
    EntityDoesNotExistError,
    TypeMismatchError,
    ColumnError,
};

pub use engine::types::{
    ComponentID,
    TableID,
    ArchetypeID,
    BundleID,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used types.
///
/// Import with:
/// ```rust
/// use tabula::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        World,
        Entity,
        EntityRef,
        EntityMut,
        Component,
        Resource,
        StorageType,
        Bundle,
        DetectChanges,
        DetectChangesMut,
        Ref,
        Mut,
        Res,
        ResMut,
        WorldConfig,
    };
}
