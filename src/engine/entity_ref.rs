//! Entity-level access to a world.
//!
//! [`EntityRef`] is a shared view of one live entity; [`EntityMut`] is an
//! exclusive view that can also change the entity's component set. Structural
//! changes (insert, remove, take, despawn) are executed here:
//!
//! 1. The bundle's transition is resolved through the source archetype's edges.
//! 2. The entity leaves its archetype (swap-remove). The entity swapped into
//!    its old archetype row has its location patched.
//! 3. If the table changes, the row moves between tables. The entity swapped
//!    into the old table row has its table row patched both in the allocator
//!    and in its archetype's entity list.
//! 4. New values are written, or removed values dropped or handed back.

use std::any::{type_name, Any};

use crate::engine::archetype::Archetype;
use crate::engine::archetype::Archetypes;
use crate::engine::bundle::Bundle;
use crate::engine::change_detection::{ComponentTicks, Mut, Ref, Ticks, TicksMut};
use crate::engine::component::{Component, StorageType};
use crate::engine::entity::{Entities, Entity, EntityLocation};
use crate::engine::table::{TableMoveResult, Tables};
use crate::engine::types::{ArchetypeID, ComponentID};
use crate::engine::world::World;


/// Shared view of a live entity.

#[derive(Clone, Copy)]
pub struct EntityRef<'w> {
    world: &'w World,
    entity: Entity,
    location: EntityLocation,
}

impl<'w> EntityRef<'w> {
    #[inline]
    pub(crate) fn new(world: &'w World, entity: Entity, location: EntityLocation) -> Self {
        Self { world, entity, location }
    }

    /// Handle of the viewed entity.
    #[inline] pub fn id(&self) -> Entity { self.entity }
    /// Where the entity's data lives.
    #[inline] pub fn location(&self) -> EntityLocation { self.location }
    /// World the entity belongs to.
    #[inline] pub fn world(&self) -> &'w World { self.world }

    /// Archetype the entity belongs to.
    #[inline]
    pub fn archetype(&self) -> &'w Archetype {
        &self.world.archetypes[self.location.archetype_id]
    }

    /// `true` if the entity has component `T`.
    #[inline]
    pub fn contains<T: Component>(&self) -> bool {
        self.world.components.component_id::<T>().map_or(false, |id| self.contains_id(id))
    }

    /// Returns `true` if the entity has the component with `component_id`.
    #[inline]
    pub fn contains_id(&self, component_id: ComponentID) -> bool {
        self.archetype().contains(component_id)
    }

    /// Borrows component `T`.
    #[inline]
    pub fn get<T: Component>(&self) -> Option<&'w T> {
        get_component_and_ticks::<T>(self.world, self.entity, self.location).map(|(value, _)| value)
    }

    /// Borrows component `T` with change detection relative to the world's last tick.
    pub fn get_ref<T: Component>(&self) -> Option<Ref<'w, T>> {
        let (value, ticks) = get_component_and_ticks::<T>(self.world, self.entity, self.location)?;
        Some(Ref {
            value,
            ticks: Ticks::from_component_ticks(ticks, self.world.last_change_tick(), self.world.change_tick()),
        })
    }

    /// Ticks of component `T`.
    #[inline]
    pub fn get_change_ticks<T: Component>(&self) -> Option<ComponentTicks> {
        get_component_and_ticks::<T>(self.world, self.entity, self.location).map(|(_, ticks)| *ticks)
    }

    /// Borrows a component by id without knowing its type.
    pub fn get_by_id(&self, component_id: ComponentID) -> Option<&'w dyn Any> {
        match self.archetype().get_storage_type(component_id)? {
            StorageType::Table => self.world.storages.tables[self.location.table_id]
                .get_column(component_id)?
                .get_dyn(self.location.table_row as usize),
            StorageType::SparseSet => self.world.storages.sparse_sets.get(component_id)?.get_dyn(self.entity),
        }
    }
}

impl std::fmt::Debug for EntityRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRef").field("entity", &self.entity).field("location", &self.location).finish()
    }
}

/// Exclusive view of a live entity.

pub struct EntityMut<'w> {
    world: &'w mut World,
    entity: Entity,
    location: EntityLocation,
}

impl<'w> EntityMut<'w> {
    #[inline]
    pub(crate) fn new(world: &'w mut World, entity: Entity, location: EntityLocation) -> Self {
        Self { world, entity, location }
    }

    #[inline]
    fn as_readonly(&self) -> EntityRef<'_> {
        EntityRef::new(self.world, self.entity, self.location)
    }

    /// Handle of the viewed entity.
    #[inline] pub fn id(&self) -> Entity { self.entity }
    /// Where the entity's data lives.
    #[inline] pub fn location(&self) -> EntityLocation { self.location }
    /// World the entity belongs to.
    #[inline] pub fn world(&self) -> &World { self.world }

    /// Gives up the entity view and returns the world.
    #[inline]
    pub fn into_world_mut(self) -> &'w mut World {
        self.world
    }

    /// Archetype the entity belongs to.
    #[inline] pub fn archetype(&self) -> &Archetype { self.as_readonly().archetype() }
    /// Returns `true` if the entity has component `T`.
    #[inline] pub fn contains<T: Component>(&self) -> bool { self.as_readonly().contains::<T>() }
    /// Returns `true` if the entity has the component with `component_id`.
    #[inline] pub fn contains_id(&self, component_id: ComponentID) -> bool { self.as_readonly().contains_id(component_id) }
    /// Shared reference to component `T`.
    #[inline] pub fn get<T: Component>(&self) -> Option<&T> { self.as_readonly().get::<T>() }
    /// Change-aware shared reference to component `T`.
    #[inline] pub fn get_ref<T: Component>(&self) -> Option<Ref<'_, T>> { self.as_readonly().get_ref::<T>() }
    /// Added and changed ticks of component `T`.
    #[inline] pub fn get_change_ticks<T: Component>(&self) -> Option<ComponentTicks> { self.as_readonly().get_change_ticks::<T>() }
    /// Type-erased reference to the component with `component_id`.
    #[inline] pub fn get_by_id(&self, component_id: ComponentID) -> Option<&dyn Any> { self.as_readonly().get_by_id(component_id) }

    /// Mutably borrows component `T`. The changed tick is stamped when the
    /// guard is released, if it was written through.

    #[inline]
    pub fn get_mut<T: Component>(&mut self) -> Option<Mut<'_, T>> {
        get_component_mut::<T>(self.world, self.entity, self.location)
    }

    /// Adds `bundle`, overwriting components the entity already has.
    ///
    /// ## Behavior
    /// - Every component present: values are overwritten in place and only
    ///   their changed ticks are stamped.
    /// - Otherwise the entity moves to the archetype with the union of both
    ///   component sets; new components get fresh added and changed ticks.

    pub fn insert<B: Bundle>(&mut self, bundle: B) -> &mut Self {
        let change_tick = self.world.change_tick();
        let World { entities, components, archetypes, storages, bundles, .. } = &mut *self.world;

        let bundle_info = bundles.init_info::<B>(components, storages);
        let old_archetype_id = self.location.archetype_id;
        let new_archetype_id = bundle_info.add_bundle_to_archetype(archetypes, storages, components, old_archetype_id);

        if new_archetype_id != old_archetype_id {
            self.location = move_entity(
                entities,
                archetypes,
                &mut storages.tables,
                self.entity,
                self.location,
                new_archetype_id,
                TableMove::Superset,
            );
        }

        let Some(add_bundle) = archetypes[old_archetype_id].edges().get_add_bundle_internal(bundle_info.id()) else {
            panic!("ECS corruption detected: insert edge vanished for {}", type_name::<B>());
        };
        bundle_info.write_components(
            &mut storages.tables[self.location.table_id],
            &mut storages.sparse_sets,
            Some(add_bundle.bundle_status.as_slice()),
            self.entity,
            self.location.table_row,
            change_tick,
            bundle,
        );
        self
    }

    /// Removes whichever components of `B` the entity has. Missing ones are ignored.
    pub fn remove<B: Bundle>(&mut self) -> &mut Self {
        self.remove_bundle::<B>(true);
        self
    }

    /// Removes every component of `B` and returns them.
    ///
    /// Returns `None`, leaving the entity untouched, if any component of `B` is missing.

    pub fn take<B: Bundle>(&mut self) -> Option<B> {
        let mut values = self.remove_bundle::<B>(false)?.into_iter();
        Some(B::from_components(&mut || match values.next().flatten() {
            Some(value) => value,
            None => panic!("ECS corruption detected: taken {} is missing a value", type_name::<B>()),
        }))
    }

    /// Shared implementation of remove (`intersection`) and take (exact).
    ///
    /// Returns one slot per bundle component, holding the removed value when
    /// taking, or `None` if the transition is impossible.

    fn remove_bundle<B: Bundle>(&mut self, intersection: bool) -> Option<Vec<Option<Box<dyn Any + Send>>>> {
        let World { entities, components, archetypes, storages, bundles, removed_components, .. } = &mut *self.world;

        let bundle_info = bundles.init_info::<B>(components, storages);
        let old_location = self.location;
        let new_archetype_id = bundle_info.remove_bundle_from_archetype(
            archetypes,
            storages,
            components,
            old_location.archetype_id,
            intersection,
        )?;

        let mut removed = Vec::with_capacity(bundle_info.components().len());
        if new_archetype_id == old_location.archetype_id {
            return Some(removed);
        }

        let old_archetype = &archetypes[old_location.archetype_id];
        for (&component_id, &storage_type) in bundle_info.components().iter().zip(bundle_info.storage_types()) {
            if !old_archetype.contains(component_id) {
                removed.push(None);
                continue;
            }

            removed_components.send(component_id, self.entity);
            let value = match storage_type {
                StorageType::Table if intersection => None,
                StorageType::Table => storages.tables[old_location.table_id]
                    .get_column_mut(component_id)
                    .and_then(|column| column.take_dyn(old_location.table_row as usize)),
                StorageType::SparseSet => {
                    let Some(set) = storages.sparse_sets.get_mut(component_id) else {
                        panic!("ECS corruption detected: no sparse set for component {component_id}");
                    };
                    let value = set.remove(self.entity);
                    if intersection { None } else { value }
                }
            };
            removed.push(value);
        }

        let table_move = if intersection { TableMove::DropMissing } else { TableMove::ForgetMissing };
        self.location = move_entity(
            entities,
            archetypes,
            &mut storages.tables,
            self.entity,
            old_location,
            new_archetype_id,
            table_move,
        );
        Some(removed)
    }

    /// Despawns the entity.
    ///
    /// ## Behavior
    /// Removal notifications go out for every component first, then the
    /// entity's sparse-set values and table row are dropped, and its handle
    /// is freed last.

    pub fn despawn(self) {
        self.world.flush();
        let World { entities, archetypes, storages, removed_components, .. } = self.world;
        let location = self.location;

        let archetype = &mut archetypes[location.archetype_id];
        for component_id in archetype.components() {
            removed_components.send(component_id, self.entity);
        }
        for &component_id in archetype.sparse_set_components() {
            if let Some(set) = storages.sparse_sets.get_mut(component_id) {
                set.remove_and_drop(self.entity);
            }
        }

        let result = archetype.swap_remove(location.archetype_row);
        if let Some(swapped_entity) = result.swapped_entity {
            let swapped_location = entity_location(entities, swapped_entity);
            entities.set(swapped_entity.index(), EntityLocation { archetype_row: location.archetype_row, ..swapped_location });
        }

        if let Some(swapped_entity) = storages.tables[location.table_id].swap_remove(location.table_row) {
            let swapped_location = entity_location(entities, swapped_entity);
            archetypes[swapped_location.archetype_id].set_entity_table_row(swapped_location.archetype_row, location.table_row);
            entities.set(swapped_entity.index(), EntityLocation { table_row: location.table_row, ..swapped_location });
        }

        let freed = entities.free(self.entity);
        debug_assert!(freed.is_some(), "despawned entity {} was not live", self.entity);
    }
}

impl std::fmt::Debug for EntityMut<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityMut").field("entity", &self.entity).field("location", &self.location).finish()
    }
}

/// How a row leaving its table treats columns the destination lacks.
#[derive(Clone, Copy)]
enum TableMove {
    Superset,
    DropMissing,
    ForgetMissing,
}

fn entity_location(entities: &Entities, entity: Entity) -> EntityLocation {
    match entities.get(entity) {
        Some(location) if location.is_valid() => location,
        _ => panic!("ECS corruption detected: entity {entity} is stored but has no location"),
    }
}

/// Moves `entity` from its archetype into `new_archetype_id` and returns its new location.
fn move_entity(
    entities: &mut Entities,
    archetypes: &mut Archetypes,
    tables: &mut Tables,
    entity: Entity,
    location: EntityLocation,
    new_archetype_id: ArchetypeID,
    table_move: TableMove,
) -> EntityLocation {
    let old_archetype = &mut archetypes[location.archetype_id];
    let old_table_id = old_archetype.table_id();
    let result = old_archetype.swap_remove(location.archetype_row);
    if let Some(swapped_entity) = result.swapped_entity {
        let swapped_location = entity_location(entities, swapped_entity);
        entities.set(swapped_entity.index(), EntityLocation { archetype_row: location.archetype_row, ..swapped_location });
    }

    let new_table_id = archetypes[new_archetype_id].table_id();
    let new_location = if old_table_id == new_table_id {
        archetypes[new_archetype_id].allocate(entity, result.table_row)
    } else {
        let (old_table, new_table) = tables.get_2_mut(old_table_id, new_table_id);
        let TableMoveResult { new_row, swapped_entity } = match table_move {
            TableMove::Superset => old_table.move_to_superset(result.table_row, new_table),
            TableMove::DropMissing => old_table.move_to_and_drop_missing(result.table_row, new_table),
            TableMove::ForgetMissing => old_table.move_to_and_forget_missing(result.table_row, new_table),
        };
        let new_location = archetypes[new_archetype_id].allocate(entity, new_row);

        if let Some(swapped_entity) = swapped_entity {
            let swapped_location = entity_location(entities, swapped_entity);
            archetypes[swapped_location.archetype_id].set_entity_table_row(swapped_location.archetype_row, result.table_row);
            entities.set(swapped_entity.index(), EntityLocation { table_row: result.table_row, ..swapped_location });
        }
        new_location
    };

    entities.set(entity.index(), new_location);
    new_location
}

pub(crate) fn get_component_and_ticks<T: Component>(
    world: &World,
    entity: Entity,
    location: EntityLocation,
) -> Option<(&T, &ComponentTicks)> {
    let component_id = world.components.component_id::<T>()?;
    match world.archetypes[location.archetype_id].get_storage_type(component_id)? {
        StorageType::Table => world.storages.tables[location.table_id]
            .column::<T>(component_id)?
            .get_with_ticks(location.table_row as usize),
        StorageType::SparseSet => world.storages.sparse_sets.get(component_id)?.get_with_ticks::<T>(entity),
    }
}

pub(crate) fn get_component_mut<T: Component>(
    world: &mut World,
    entity: Entity,
    location: EntityLocation,
) -> Option<Mut<'_, T>> {
    let last_run = world.last_change_tick();
    let this_run = world.change_tick();
    let component_id = world.components.component_id::<T>()?;
    let (value, ticks) = match world.archetypes[location.archetype_id].get_storage_type(component_id)? {
        StorageType::Table => world.storages.tables[location.table_id]
            .column_mut::<T>(component_id)?
            .get_mut_with_ticks(location.table_row as usize)?,
        StorageType::SparseSet => world.storages.sparse_sets.get_mut(component_id)?.get_mut_with_ticks::<T>(entity)?,
    };
    Some(Mut::new(value, TicksMut::from_component_ticks(ticks, last_run, this_run)))
}
