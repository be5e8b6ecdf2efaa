//! World configuration.
//!
//! `WorldConfig` holds the runtime knobs a world is created with. Everything
//! else is fixed at compile time in [`types`](crate::engine::types) and
//! [`change_detection`](crate::engine::change_detection).

use crate::engine::types::{DEFAULT_ENTITY_CAPACITY, DEFAULT_TABLE_CAPACITY};


/// Construction parameters of a [`World`](crate::engine::world::World).
///
/// ## Fields
/// - `entity_capacity`: entity metadata slots reserved up front.
/// - `table_capacity`: rows reserved in every newly created table.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorldConfig {
    /// Entity metadata slots reserved up front.
    pub entity_capacity: u32,
    /// Rows reserved in every newly created table.
    pub table_capacity: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self { entity_capacity: DEFAULT_ENTITY_CAPACITY, table_capacity: DEFAULT_TABLE_CAPACITY }
    }
}

impl WorldConfig {
    /// Sets the number of entity slots reserved up front.
    pub fn with_entity_capacity(mut self, entity_capacity: u32) -> Self {
        self.entity_capacity = entity_capacity;
        self
    }

    /// Sets the number of rows reserved in each new table.
    pub fn with_table_capacity(mut self, table_capacity: usize) -> Self {
        self.table_capacity = table_capacity;
        self
    }
}
