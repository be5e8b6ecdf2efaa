//! # World
//!
//! The `World` owns every store of the engine and is the only entry point
//! most callers need.
//!
//! ## Purpose
//! Ties the entity allocator, component registry, archetype graph, storages
//! and bundle registry together and keeps them consistent across spawns,
//! structural changes and despawns.
//!
//! ## Design
//! - One world-wide change tick (`AtomicU32`). Writes stamp the current tick;
//!   [`World::increment_change_tick`] advances it and can be called through
//!   shared access.
//! - Reserved entities are materialised into the empty archetype by
//!   [`World::flush`], which every structural operation runs first.
//! - Removals are recorded in a double-buffered log rolled by
//!   [`World::clear_trackers`].
//!
//! ## Invariants
//! - For every live entity `e`, `entities.get(e)` names an archetype row and a
//!   table row that both hold `e`.
//! - Every table column and every sparse set of an archetype holds exactly one
//!   initialised value per entity of that archetype.

use std::any::type_name;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::engine::archetype::Archetypes;
use crate::engine::bundle::{Bundle, Bundles};
use crate::engine::change_detection::{DetectChanges, Mut, Res, ResMut, Tick, Ticks, TicksMut, CHECK_TICK_THRESHOLD};
use crate::engine::component::{Component, ComponentInfo, ComponentRegistry, Resource};
use crate::engine::config::WorldConfig;
use crate::engine::entity::{AllocAtWithoutReplacement, Entities, Entity, EntityLocation, ReserveEntitiesIterator};
use crate::engine::entity_ref::{get_component_mut, EntityMut, EntityRef};
use crate::engine::error::EntityDoesNotExistError;
use crate::engine::removal::RemovedComponentEntities;
use crate::engine::resource::{downcast_resource, ResourceData};
use crate::engine::storage::Storages;
use crate::engine::table::Tables;
use crate::engine::types::{ComponentID, EMPTY_ARCHETYPE, EMPTY_TABLE};


static NEXT_WORLD_ID: AtomicUsize = AtomicUsize::new(0);

/// Process-unique identity of a world.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldId(usize);

impl WorldId {
    /// Takes the next id, or `None` once the id space is exhausted.
    pub fn new() -> Option<Self> {
        NEXT_WORLD_ID
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| id.checked_add(1))
            .map(WorldId)
            .ok()
    }
}

/// Container of entities, their components, and resources.

pub struct World {
    id: WorldId,
    pub(crate) entities: Entities,
    pub(crate) components: ComponentRegistry,
    pub(crate) archetypes: Archetypes,
    pub(crate) storages: Storages,
    pub(crate) bundles: Bundles,
    pub(crate) removed_components: RemovedComponentEntities,
    pub(crate) change_tick: AtomicU32,
    pub(crate) last_change_tick: Tick,
    pub(crate) last_check_tick: Tick,
}

impl Default for World {
    fn default() -> Self {
        Self::with_config(WorldConfig::default())
    }
}

impl World {
    /// Creates a world with the default [`WorldConfig`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a world with the capacities in `config` reserved up front.
    ///
    /// ## Panics
    /// Panics if more than `usize::MAX` worlds are created.

    pub fn with_config(config: WorldConfig) -> Self {
        let Some(id) = WorldId::new() else {
            panic!("more worlds were created than WorldId can represent");
        };

        let mut entities = Entities::new();
        entities.reserve(config.entity_capacity);
        let storages = Storages {
            tables: Tables::with_row_capacity(config.table_capacity),
            ..Storages::default()
        };

        log::debug!("created world {id:?}");
        Self {
            id,
            entities,
            components: ComponentRegistry::new(),
            archetypes: Archetypes::new(),
            storages,
            bundles: Bundles::default(),
            removed_components: RemovedComponentEntities::default(),
            change_tick: AtomicU32::new(1),
            last_change_tick: Tick::new(0),
            last_check_tick: Tick::new(0),
        }
    }

    /// Unique id of this world.
    #[inline] pub fn id(&self) -> WorldId { self.id }

    /// Asserts that state built against world `id` is being used with this world.
    ///
    /// ## Panics
    /// Panics if `id` is not this world's id.

    #[inline]
    pub fn validate_world(&self, id: WorldId) {
        assert!(self.id == id, "state built for world {id:?} was used with world {:?}", self.id);
    }

    // ───────────────────────────── Introspection ─────────────────────────────

    /// The entity allocator.
    #[inline] pub fn entities(&self) -> &Entities { &self.entities }
    /// The component registry.
    #[inline] pub fn components(&self) -> &ComponentRegistry { &self.components }
    /// Every archetype created so far.
    #[inline] pub fn archetypes(&self) -> &Archetypes { &self.archetypes }
    /// Tables, sparse sets and resources.
    #[inline] pub fn storages(&self) -> &Storages { &self.storages }
    /// Every bundle registered so far.
    #[inline] pub fn bundles(&self) -> &Bundles { &self.bundles }
    /// The removal log.
    #[inline] pub fn removed_components(&self) -> &RemovedComponentEntities { &self.removed_components }

    /// Iterates over every placed entity, archetype by archetype.
    pub fn iter_entities(&self) -> impl Iterator<Item = EntityRef<'_>> + '_ {
        self.archetypes.iter().flat_map(move |archetype| {
            archetype.entities().iter().enumerate().map(move |(row, archetype_entity)| {
                let location = EntityLocation {
                    archetype_id: archetype.id(),
                    archetype_row: row as u32,
                    table_id: archetype.table_id(),
                    table_row: archetype_entity.table_row(),
                };
                EntityRef::new(self, archetype_entity.entity(), location)
            })
        })
    }

    // ──────────────────────────────── Registry ───────────────────────────────

    /// Registers component `T`, returning its id. Idempotent.
    pub fn register_component<T: Component>(&mut self) -> ComponentID {
        self.components.register_component::<T>(&mut self.storages)
    }

    /// Registers resource `R` and creates its (empty) slot. Idempotent.
    pub fn register_resource<R: Resource>(&mut self) -> ComponentID {
        let id = self.components.register_resource::<R>();
        self.storages.resources.initialize(self.components.info(id));
        id
    }

    /// Id of component `T`, if registered.
    #[inline]
    pub fn component_id<T: Component>(&self) -> Option<ComponentID> {
        self.components.component_id::<T>()
    }

    /// Id of resource `R`, if registered.
    #[inline]
    pub fn resource_id<R: Resource>(&self) -> Option<ComponentID> {
        self.components.resource_id::<R>()
    }

    /// Metadata of a registered component or resource.
    #[inline]
    pub fn component_info(&self, id: ComponentID) -> Option<&ComponentInfo> {
        self.components.get_info(id)
    }

    // ──────────────────────────────── Entities ───────────────────────────────

    /// Spawns an entity with the components of `bundle`.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> Entity {
        self.flush();
        let change_tick = self.change_tick();
        let entity = self.entities.alloc();

        let bundle_info = self.bundles.init_info::<B>(&mut self.components, &mut self.storages);
        let archetype_id =
            bundle_info.add_bundle_to_archetype(&mut self.archetypes, &mut self.storages, &self.components, EMPTY_ARCHETYPE);

        let archetype = &mut self.archetypes[archetype_id];
        let table = &mut self.storages.tables[archetype.table_id()];
        let table_row = table.allocate(entity);
        let location = archetype.allocate(entity, table_row);
        bundle_info.write_components(table, &mut self.storages.sparse_sets, None, entity, table_row, change_tick, bundle);
        self.entities.set(entity.index(), location);
        entity
    }

    /// Spawns an entity with no components.
    pub fn spawn_empty(&mut self) -> Entity {
        self.flush();
        let entity = self.entities.alloc();
        self.place_empty(entity);
        entity
    }

    /// Spawns one entity per bundle. The target archetype is resolved once.
    pub fn spawn_batch<I>(&mut self, bundles: I) -> Vec<Entity>
    where
        I: IntoIterator,
        I::Item: Bundle,
    {
        self.flush();
        let change_tick = self.change_tick();
        let bundles = bundles.into_iter();
        let (lower, _) = bundles.size_hint();

        let bundle_info = self.bundles.init_info::<I::Item>(&mut self.components, &mut self.storages);
        let archetype_id =
            bundle_info.add_bundle_to_archetype(&mut self.archetypes, &mut self.storages, &self.components, EMPTY_ARCHETYPE);

        self.entities.reserve(u32::try_from(lower).unwrap_or(u32::MAX));
        let archetype = &mut self.archetypes[archetype_id];
        archetype.reserve(lower);
        let table = &mut self.storages.tables[archetype.table_id()];
        table.reserve(lower);

        let mut spawned = Vec::with_capacity(lower);
        for bundle in bundles {
            let entity = self.entities.alloc();
            let table_row = table.allocate(entity);
            let location = archetype.allocate(entity, table_row);
            bundle_info.write_components(table, &mut self.storages.sparse_sets, None, entity, table_row, change_tick, bundle);
            self.entities.set(entity.index(), location);
            spawned.push(entity);
        }
        log::trace!("spawned a batch of {} entities into archetype {archetype_id}", spawned.len());
        spawned
    }

    /// Returns `entity`, spawning it empty at exactly that index and generation if its slot is free.
    ///
    /// ## Behavior
    /// Returns `None` if the slot is live under another generation. An index
    /// past the end of the allocator grows it to cover the index, and every
    /// skipped index joins the free list.
    ///
    /// ## Panics
    /// Memory grows with `entity.index()`, not with the number of live
    /// entities. An index near `u32::MAX` needs tens of gigabytes and aborts
    /// on allocation failure.

    pub fn get_or_spawn(&mut self, entity: Entity) -> Option<EntityMut<'_>> {
        self.flush();
        match self.entities.alloc_at_without_replacement(entity) {
            AllocAtWithoutReplacement::Exists(location) => Some(EntityMut::new(self, entity, location)),
            AllocAtWithoutReplacement::DidNotExist => {
                let location = self.place_empty(entity);
                Some(EntityMut::new(self, entity, location))
            }
            AllocAtWithoutReplacement::ExistsWithWrongGeneration => None,
        }
    }

    fn place_empty(&mut self, entity: Entity) -> EntityLocation {
        let table_row = self.storages.tables[EMPTY_TABLE].allocate(entity);
        let location = self.archetypes.empty_mut().allocate(entity, table_row);
        self.entities.set(entity.index(), location);
        location
    }

    /// Despawns `entity`. Returns `false` if it was not alive.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        match self.get_entity_mut(entity) {
            Some(entity_mut) => {
                entity_mut.despawn();
                true
            }
            None => {
                log::debug!("ignoring despawn of {entity}: it does not exist");
                false
            }
        }
    }

    /// Returns `true` if `entity` is alive or reserved.
    #[inline]
    pub fn contains_entity(&self, entity: Entity) -> bool {
        self.entities.contains(entity)
    }

    /// Shared view of `entity`, or `None` if it is not placed in storage.
    pub fn get_entity(&self, entity: Entity) -> Option<EntityRef<'_>> {
        let location = self.entities.get(entity).filter(EntityLocation::is_valid)?;
        Some(EntityRef::new(self, entity, location))
    }

    /// Exclusive view of `entity`. Pending reservations are flushed first.
    pub fn get_entity_mut(&mut self, entity: Entity) -> Option<EntityMut<'_>> {
        self.flush();
        let location = self.entities.get(entity).filter(EntityLocation::is_valid)?;
        Some(EntityMut::new(self, entity, location))
    }

    /// ## Panics
    /// Panics if `entity` does not exist.

    pub fn entity(&self, entity: Entity) -> EntityRef<'_> {
        match self.get_entity(entity) {
            Some(entity_ref) => entity_ref,
            None => panic!("entity {entity} does not exist"),
        }
    }

    /// ## Panics
    /// Panics if `entity` does not exist.

    pub fn entity_mut(&mut self, entity: Entity) -> EntityMut<'_> {
        match self.get_entity_mut(entity) {
            Some(entity_mut) => entity_mut,
            None => panic!("entity {entity} does not exist"),
        }
    }

    // ─────────────────────────────── Components ──────────────────────────────

    /// Shared reference to component `T` of `entity`.
    #[inline]
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.get_entity(entity)?.get::<T>()
    }

    /// Mutable access to component `T` of `entity` through a change-tracking guard.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<Mut<'_, T>> {
        let location = self.entities.get(entity).filter(EntityLocation::is_valid)?;
        get_component_mut::<T>(self, entity, location)
    }

    /// Adds `bundle` to `entity`, overwriting components it already has.
    pub fn insert<B: Bundle>(&mut self, entity: Entity, bundle: B) -> Result<(), EntityDoesNotExistError> {
        let mut entity_mut = self.get_entity_mut(entity).ok_or(EntityDoesNotExistError { entity })?;
        entity_mut.insert(bundle);
        Ok(())
    }

    /// Removes whichever components of `B` `entity` has.
    pub fn remove<B: Bundle>(&mut self, entity: Entity) -> Result<(), EntityDoesNotExistError> {
        let mut entity_mut = self.get_entity_mut(entity).ok_or(EntityDoesNotExistError { entity })?;
        entity_mut.remove::<B>();
        Ok(())
    }

    /// Removes and returns every component of `B`, or `None` if `entity` lacks any of them.
    pub fn take<B: Bundle>(&mut self, entity: Entity) -> Option<B> {
        self.get_entity_mut(entity)?.take::<B>()
    }

    /// Entities that lost component `T` in this or the previous tracker cycle.
    pub fn removed<T: Component>(&self) -> impl Iterator<Item = Entity> + '_ {
        self.components
            .component_id::<T>()
            .into_iter()
            .flat_map(move |id| self.removed_components.iter(id))
    }

    /// Entities that lost the component with `component_id` in this or the previous tracker cycle.
    #[inline]
    pub fn removed_with_id(&self, component_id: ComponentID) -> impl Iterator<Item = Entity> + '_ {
        self.removed_components.iter(component_id)
    }

    /// Despawns every entity. Registered components, archetypes and tables survive.
    ///
    /// Reserved entities are flushed first and cleared with the rest. Every
    /// handle taken before the call is stale afterwards.

    pub fn clear_entities(&mut self) {
        self.flush();
        self.storages.tables.clear();
        self.storages.sparse_sets.clear_entities();
        self.archetypes.clear_entities();
        self.entities.clear();
        log::debug!("cleared every entity of world {:?}", self.id);
    }

    // ──────────────────────────────── Resources ──────────────────────────────

    /// Inserts resource `value`, replacing any existing one.
    pub fn insert_resource<R: Resource>(&mut self, value: R) {
        let change_tick = self.change_tick();
        let id = self.register_resource::<R>();
        if let Some(data) = self.storages.resources.get_mut(id) {
            data.insert(Box::new(value), change_tick);
        }
    }

    /// Inserts `R::default()` unless `R` is already present.
    pub fn init_resource<R: Resource + Default>(&mut self) -> ComponentID {
        if !self.contains_resource::<R>() {
            self.insert_resource(R::default());
        }
        self.register_resource::<R>()
    }

    /// Removes resource `R` and returns it.
    pub fn remove_resource<R: Resource>(&mut self) -> Option<R> {
        let id = self.components.resource_id::<R>()?;
        match self.storages.resources.get_mut(id)?.remove() {
            Some((value, _)) => Some(downcast_resource::<R>(value)),
            None => {
                log::debug!("resource {} is not present; nothing to remove", type_name::<R>());
                None
            }
        }
    }

    fn resource_data<R: Resource>(&self) -> Option<&ResourceData> {
        self.storages.resources.get(self.components.resource_id::<R>()?)
    }

    /// Returns `true` if resource `R` is present.
    #[inline]
    pub fn contains_resource<R: Resource>(&self) -> bool {
        self.resource_data::<R>().map_or(false, ResourceData::is_present)
    }

    /// Shared reference to resource `R`, if present.
    #[inline]
    pub fn get_resource<R: Resource>(&self) -> Option<&R> {
        self.resource_data::<R>()?.get::<R>()
    }

    /// Shared access to resource `R` with change detection.
    pub fn get_resource_ref<R: Resource>(&self) -> Option<Res<'_, R>> {
        let (value, ticks) = self.resource_data::<R>()?.get_with_ticks::<R>()?;
        Some(Res { value, ticks: Ticks::from_component_ticks(ticks, self.last_change_tick, self.change_tick()) })
    }

    /// Exclusive access to resource `R`. The changed tick is stamped only if the guard is written through.
    pub fn get_resource_mut<R: Resource>(&mut self) -> Option<ResMut<'_, R>> {
        let last_run = self.last_change_tick;
        let this_run = self.change_tick();
        let id = self.components.resource_id::<R>()?;
        let (value, ticks) = self.storages.resources.get_mut(id)?.get_mut_with_ticks::<R>()?;
        Some(ResMut::new(value, TicksMut::from_component_ticks(ticks, last_run, this_run)))
    }

    /// ## Panics
    /// Panics if `R` is not present.

    pub fn resource<R: Resource>(&self) -> &R {
        match self.get_resource::<R>() {
            Some(value) => value,
            None => panic!("requested resource {} does not exist in the world", type_name::<R>()),
        }
    }

    /// ## Panics
    /// Panics if `R` is not present.

    pub fn resource_mut<R: Resource>(&mut self) -> ResMut<'_, R> {
        match self.get_resource_mut::<R>() {
            Some(value) => value,
            None => panic!("requested resource {} does not exist in the world", type_name::<R>()),
        }
    }

    /// `true` if `R` was inserted after the last tracker clear.
    pub fn is_resource_added<R: Resource>(&self) -> bool {
        self.get_resource_ref::<R>().map_or(false, |resource| resource.is_added())
    }

    /// `true` if `R` was inserted or written after the last tracker clear.
    pub fn is_resource_changed<R: Resource>(&self) -> bool {
        self.get_resource_ref::<R>().map_or(false, |resource| resource.is_changed())
    }

    // ────────────────────────────── Maintenance ──────────────────────────────

    /// Reserves an entity id through shared access. It is placed by the next [`flush`](Self::flush).
    #[inline]
    pub fn reserve_entity(&self) -> Entity {
        self.entities.reserve_entity()
    }

    /// Reserves `count` entities. See [`reserve_entity`](Self::reserve_entity).
    #[inline]
    pub fn reserve_entities(&self, count: u32) -> ReserveEntitiesIterator<'_> {
        self.entities.reserve_entities(count)
    }

    /// Places every reserved entity into the empty archetype.
    pub fn flush(&mut self) {
        let empty_archetype = self.archetypes.empty_mut();
        let empty_table = &mut self.storages.tables[EMPTY_TABLE];
        self.entities.flush(|entity, location| {
            *location = empty_archetype.allocate(entity, empty_table.allocate(entity));
        });
    }

    /// The tick writes are currently stamped with.
    #[inline]
    pub fn change_tick(&self) -> Tick {
        Tick::new(self.change_tick.load(Ordering::Acquire))
    }

    /// Advances the change tick and returns the tick that was current before.
    #[inline]
    pub fn increment_change_tick(&self) -> Tick {
        Tick::new(self.change_tick.fetch_add(1, Ordering::AcqRel))
    }

    /// Tick at which the last tracker cycle ended.
    #[inline]
    pub fn last_change_tick(&self) -> Tick {
        self.last_change_tick
    }

    /// Ends a change-detection cycle.
    ///
    /// ## Behavior
    /// Rolls the removal log and moves `last_change_tick` to the current tick,
    /// then advances the tick so later writes read as new.

    pub fn clear_trackers(&mut self) {
        self.removed_components.update();
        self.last_change_tick = self.increment_change_tick();
    }

    /// Clamps stored ticks that are about to become ambiguous.
    ///
    /// ## Behavior
    /// Does nothing until [`CHECK_TICK_THRESHOLD`] ticks have passed since the
    /// previous pass.

    pub fn check_change_ticks(&mut self) {
        let change_tick = self.change_tick();
        if change_tick.relative_to(self.last_check_tick).get() < CHECK_TICK_THRESHOLD {
            return;
        }

        let Storages { tables, sparse_sets, resources } = &mut self.storages;
        tables.check_change_ticks(change_tick);
        sparse_sets.check_change_ticks(change_tick);
        resources.check_change_ticks(change_tick);
        self.last_check_tick = change_tick;
        log::debug!("rebased stored change ticks at tick {}", change_tick.get());
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("entity_count", &self.entities.len())
            .field("archetype_count", &self.archetypes.len())
            .field("component_count", &self.components.len())
            .field("resource_count", &self.storages.resources.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::change_detection::{ComponentTicks, DetectChangesMut};
    use crate::engine::component::StorageType;

    #[derive(Debug, PartialEq, Clone, Copy)]
    struct Position(i32);
    impl Component for Position {}

    #[derive(Debug, PartialEq, Clone, Copy)]
    struct Velocity(i32);
    impl Component for Velocity {}

    #[derive(Debug, PartialEq)]
    struct Tag(&'static str);
    impl Component for Tag {
        const STORAGE_TYPE: StorageType = StorageType::SparseSet;
    }

    #[derive(Debug, Default, PartialEq)]
    struct Score(u32);
    impl Resource for Score {}

    fn assert_consistent(world: &World) {
        for archetype in world.archetypes().iter() {
            let table = &world.storages().tables[archetype.table_id()];
            for (row, archetype_entity) in archetype.entities().iter().enumerate() {
                let location = world.entities().get(archetype_entity.entity()).unwrap();
                assert_eq!(location.archetype_id, archetype.id());
                assert_eq!(location.archetype_row as usize, row);
                assert_eq!(location.table_row, archetype_entity.table_row());
                assert_eq!(table.entities()[location.table_row as usize], archetype_entity.entity());
            }
        }
    }

    #[test]
    fn spawn_and_read_back() {
        let mut world = World::new();
        let entity = world.spawn((Position(1), Velocity(2)));

        assert_eq!(world.get::<Position>(entity), Some(&Position(1)));
        assert_eq!(world.get::<Velocity>(entity), Some(&Velocity(2)));
        assert!(world.get::<Tag>(entity).is_none());
        assert_eq!(world.entities().len(), 1);
        assert_consistent(&world);
    }

    #[test]
    fn despawn_patches_the_swapped_entity() {
        let mut world = World::new();
        let first = world.spawn(Position(1));
        let second = world.spawn(Position(2));
        let third = world.spawn(Position(3));

        assert!(world.despawn(first));
        assert!(!world.despawn(first));
        assert_eq!(world.get::<Position>(third), Some(&Position(3)));
        assert_eq!(world.get::<Position>(second), Some(&Position(2)));
        assert_eq!(world.entities().get(third).unwrap().table_row, 0);
        assert_consistent(&world);

        let reused = world.spawn(Position(4));
        assert_eq!(reused.index(), first.index());
        assert_ne!(reused.generation(), first.generation());
        assert!(world.get::<Position>(first).is_none());
    }

    #[test]
    fn insert_moves_between_tables_and_overwrites_in_place() {
        let mut world = World::new();
        let moved = world.spawn(Position(1));
        let stays = world.spawn(Position(2));

        world.insert(moved, Velocity(5)).unwrap();
        assert_eq!(world.get::<Position>(moved), Some(&Position(1)));
        assert_eq!(world.get::<Velocity>(moved), Some(&Velocity(5)));
        assert_eq!(world.get::<Position>(stays), Some(&Position(2)));
        assert_consistent(&world);

        let archetype_before = world.entity(moved).location().archetype_id;
        world.insert(moved, Velocity(6)).unwrap();
        assert_eq!(world.entity(moved).location().archetype_id, archetype_before);
        assert_eq!(world.get::<Velocity>(moved), Some(&Velocity(6)));
    }

    #[test]
    fn sparse_insert_keeps_the_table() {
        let mut world = World::new();
        let entity = world.spawn(Position(1));
        let table_before = world.entity(entity).location().table_id;

        world.insert(entity, Tag("a")).unwrap();
        let location = world.entity(entity).location();
        assert_eq!(location.table_id, table_before);
        assert_eq!(world.get::<Tag>(entity), Some(&Tag("a")));

        world.remove::<Tag>(entity).unwrap();
        assert!(world.get::<Tag>(entity).is_none());
        assert_eq!(world.get::<Position>(entity), Some(&Position(1)));
        assert_consistent(&world);
    }

    #[test]
    fn take_requires_every_component() {
        let mut world = World::new();
        let entity = world.spawn((Position(1), Tag("x")));

        assert!(world.take::<(Position, Velocity)>(entity).is_none());
        assert_eq!(world.get::<Position>(entity), Some(&Position(1)));

        let (position, tag) = world.take::<(Position, Tag)>(entity).unwrap();
        assert_eq!((position, tag), (Position(1), Tag("x")));
        assert_eq!(world.entity(entity).archetype().id(), EMPTY_ARCHETYPE);
        assert_consistent(&world);
    }

    #[test]
    fn removal_log_lasts_one_extra_cycle() {
        let mut world = World::new();
        let entity = world.spawn((Position(1), Velocity(1)));
        world.remove::<Velocity>(entity).unwrap();
        world.despawn(entity);

        assert_eq!(world.removed::<Velocity>().collect::<Vec<_>>(), vec![entity]);
        assert_eq!(world.removed::<Position>().collect::<Vec<_>>(), vec![entity]);
        world.clear_trackers();
        assert_eq!(world.removed::<Position>().count(), 1);
        world.clear_trackers();
        assert_eq!(world.removed::<Position>().count(), 0);
    }

    #[test]
    fn reserved_entities_materialise_on_flush() {
        let mut world = World::new();
        let reserved = world.reserve_entity();
        assert!(world.get_entity(reserved).is_none());

        world.flush();
        let entity_ref = world.get_entity(reserved).unwrap();
        assert_eq!(entity_ref.archetype().id(), EMPTY_ARCHETYPE);
        world.insert(reserved, Position(3)).unwrap();
        assert_eq!(world.get::<Position>(reserved), Some(&Position(3)));
    }

    #[test]
    fn get_or_spawn_honours_generations() {
        let mut world = World::new();
        let stale = world.spawn(Position(0));
        world.despawn(stale);
        let live = world.spawn(Position(1));

        assert!(world.get_or_spawn(stale).is_none());
        assert_eq!(world.get_or_spawn(live).unwrap().get::<Position>(), Some(&Position(1)));

        let fresh = Entity::from_raw(40);
        world.get_or_spawn(fresh).unwrap().insert(Velocity(9));
        assert_eq!(world.get::<Velocity>(fresh), Some(&Velocity(9)));
        assert_consistent(&world);
    }

    #[test]
    fn get_or_spawn_past_the_end_frees_the_gap() {
        let mut world = World::new();
        let far = Entity::from_raw(1000);
        assert!(world.get_or_spawn(far).is_some());
        assert_eq!(world.entities().total_count(), 1001);
        assert_eq!(world.entities().len(), 1);

        let next = world.spawn(Position(1));
        assert!(next.index() < far.index());
        assert_eq!(next.generation(), 1);
        assert_eq!(world.entities().total_count(), 1001);
        assert_consistent(&world);
    }

    #[test]
    fn mutation_stamps_changed_tick_only_when_written() {
        let mut world = World::new();
        let entity = world.spawn(Position(0));
        world.clear_trackers();

        {
            let position = world.get_mut::<Position>(entity).unwrap();
            assert!(!position.is_changed());
        }
        assert!(!world.entity(entity).get_ref::<Position>().unwrap().is_changed());

        world.get_mut::<Position>(entity).unwrap().0 = 7;
        let position = world.entity(entity).get_ref::<Position>().unwrap();
        assert!(position.is_changed());
        assert!(!position.is_added());
    }

    #[test]
    fn resources_track_added_and_changed() {
        let mut world = World::new();
        assert!(world.get_resource::<Score>().is_none());

        world.init_resource::<Score>();
        assert!(world.is_resource_added::<Score>());
        world.clear_trackers();
        assert!(!world.is_resource_changed::<Score>());

        world.resource_mut::<Score>().0 += 3;
        assert!(world.is_resource_changed::<Score>());
        assert!(!world.is_resource_added::<Score>());
        world.resource_mut::<Score>().bypass_change_detection().0 += 1;

        assert_eq!(world.remove_resource::<Score>(), Some(Score(4)));
        assert!(!world.contains_resource::<Score>());
        assert!(world.remove_resource::<Score>().is_none());
    }

    #[test]
    fn check_change_ticks_clamps_old_values() {
        let mut world = World::new();
        let entity = world.spawn((Position(0), Tag("sparse")));
        let score = world.init_resource::<Score>();
        *world.change_tick.get_mut() = CHECK_TICK_THRESHOLD.wrapping_mul(7);

        world.check_change_ticks();
        let now = world.change_tick();
        for ticks in all_ticks(&world, entity, score) {
            assert_eq!(now.relative_to(ticks.added), Tick::MAX);
            assert_eq!(now.relative_to(ticks.changed), Tick::MAX);
        }
        assert_eq!(world.last_check_tick, now);
    }

    fn all_ticks(world: &World, entity: Entity, score: ComponentID) -> [ComponentTicks; 3] {
        let view = world.entity(entity);
        [
            view.get_change_ticks::<Position>().unwrap(),
            view.get_change_ticks::<Tag>().unwrap(),
            world.storages().resources.get(score).unwrap().get_ticks().unwrap(),
        ]
    }

    #[test]
    fn check_change_ticks_waits_for_the_threshold() {
        let mut world = World::new();
        let entity = world.spawn((Position(0), Tag("sparse")));
        let score = world.init_resource::<Score>();
        *world.change_tick.get_mut() = CHECK_TICK_THRESHOLD.wrapping_mul(7);
        world.check_change_ticks();
        let checked_at = world.last_check_tick;
        let rebased = all_ticks(&world, entity, score);

        *world.change_tick.get_mut() = checked_at.get() + CHECK_TICK_THRESHOLD - 1;
        world.check_change_ticks();
        assert_eq!(world.last_check_tick, checked_at);
        assert_eq!(all_ticks(&world, entity, score), rebased);

        *world.change_tick.get_mut() = checked_at.get() + CHECK_TICK_THRESHOLD;
        world.check_change_ticks();
        let now = world.change_tick();
        assert_eq!(world.last_check_tick, now);
        for ticks in all_ticks(&world, entity, score) {
            assert_eq!(now.relative_to(ticks.changed), Tick::MAX);
        }
    }

    #[test]
    #[should_panic(expected = "was used with world")]
    fn foreign_world_ids_are_rejected() {
        let first = World::new();
        let second = World::new();
        first.validate_world(second.id());
    }

    #[test]
    fn clear_entities_keeps_the_registry() {
        let mut world = World::new();
        world.spawn_batch((0..10).map(|i| (Position(i), Tag("t"))));
        let archetype_count = world.archetypes().len();

        world.clear_entities();
        assert_eq!(world.entities().len(), 0);
        assert_eq!(world.iter_entities().count(), 0);
        assert_eq!(world.archetypes().len(), archetype_count);
        assert!(world.component_id::<Tag>().is_some());

        let entity = world.spawn(Position(3));
        assert_eq!(world.get::<Position>(entity), Some(&Position(3)));
    }

    #[test]
    fn clear_entities_leaves_old_handles_stale() {
        let mut world = World::new();
        let old = world.spawn((Position(1), Tag("old")));
        let reserved = world.reserve_entity();

        world.clear_entities();
        let new = world.spawn((Position(2), Tag("new")));

        assert_eq!(new.index(), old.index());
        assert!(new.generation() > old.generation());
        assert!(!world.contains_entity(old));
        assert!(!world.contains_entity(reserved));
        assert_eq!(world.get::<Position>(old), None);
        assert_eq!(world.get::<Tag>(old), None);
        assert_eq!(world.get::<Position>(new), Some(&Position(2)));
        assert!(!world.despawn(old));
        assert!(world.contains_entity(new));
    }
}
