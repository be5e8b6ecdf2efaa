//! Removed-component tracking.
//!
//! Whenever a component leaves an entity (removal, take, or despawn) the world
//! records `(component id, entity)` here. Records are double buffered: a call
//! to [`RemovedComponentEntities::update`] retires the current buffer to the
//! previous slot and drops the previous one, so every record stays visible for
//! one full update cycle after the one it was written in.

use crate::engine::entity::Entity;
use crate::engine::sparse_set::SparseArray;
use crate::engine::types::ComponentID;


#[derive(Debug, Default)]
struct RemovedBuffers {
    current: Vec<Entity>,
    previous: Vec<Entity>,
}

/// Per-component lists of entities that recently lost the component.

#[derive(Debug, Default)]
pub struct RemovedComponentEntities {
    buffers: SparseArray<RemovedBuffers>,
}

impl RemovedComponentEntities {
    /// Records that `entity` lost `component_id`.
    pub fn send(&mut self, component_id: ComponentID, entity: Entity) {
        self.buffers
            .get_or_insert_with(component_id as usize, RemovedBuffers::default)
            .current
            .push(entity);
    }

    /// Entities that lost `component_id` in this or the previous update cycle,
    /// oldest first.

    pub fn iter(&self, component_id: ComponentID) -> impl Iterator<Item = Entity> + '_ {
        self.buffers
            .get(component_id as usize)
            .into_iter()
            .flat_map(|buffers| buffers.previous.iter().chain(buffers.current.iter()).copied())
    }

    /// Rolls the buffers: current records become previous, previous ones are dropped.
    pub fn update(&mut self) {
        for buffers in self.buffers.values_mut() {
            buffers.previous.clear();
            std::mem::swap(&mut buffers.previous, &mut buffers.current);
        }
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}
