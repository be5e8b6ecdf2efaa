use tabula::prelude::*;
use tabula::engine::types::{EMPTY_ARCHETYPE, EMPTY_TABLE};

#[derive(Clone, Copy, Debug, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}
impl Component for Position {}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Velocity {
    dx: f32,
    dy: f32,
}
impl Component for Velocity {}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Selected;
impl Component for Selected {
    const STORAGE_TYPE: StorageType = StorageType::SparseSet;
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn fresh_world_has_only_the_empty_archetype_and_table() {
    init_logging();
    let world = World::new();
    assert_eq!(world.archetypes().len(), 1);
    assert_eq!(world.storages().tables.len(), 1);
    assert_eq!(world.archetypes().empty().id(), EMPTY_ARCHETYPE);
    assert_eq!(world.archetypes().empty().table_id(), EMPTY_TABLE);
}

#[test]
fn table_columns_are_dense_and_in_entity_order() {
    init_logging();
    let mut world = World::new();
    let entities = world.spawn_batch((0..16).map(|i| {
        (Position { x: i as f32, y: 0.0 }, Velocity { dx: 1.0, dy: -1.0 })
    }));
    let position = world.component_id::<Position>().unwrap();
    let location = world.entity(entities[0]).location();

    let table = &world.storages().tables[location.table_id];
    let column = table.column::<Position>(position).unwrap();
    assert_eq!(column.len(), table.entity_count());
    for (row, (&entity, value)) in table.entities().iter().zip(column.iter()).enumerate() {
        assert_eq!(world.entity(entity).location().table_row as usize, row);
        assert_eq!(world.get::<Position>(entity), Some(value));
    }
}

#[test]
fn tables_are_shared_across_sparse_variations() {
    init_logging();
    let mut world = World::new();
    let plain = world.spawn(Position { x: 0.0, y: 0.0 });
    let selected = world.spawn((Position { x: 1.0, y: 1.0 }, Selected));

    let plain_location = world.entity(plain).location();
    let selected_location = world.entity(selected).location();
    assert_eq!(plain_location.table_id, selected_location.table_id);
    assert_ne!(plain_location.archetype_id, selected_location.archetype_id);

    let table = &world.storages().tables[plain_location.table_id];
    assert_eq!(table.entity_count(), 2);
}

#[test]
fn component_order_in_bundles_does_not_matter() {
    init_logging();
    let mut world = World::new();
    let first = world.spawn((Position { x: 0.0, y: 0.0 }, Velocity { dx: 0.0, dy: 0.0 }));
    let second = world.spawn((Velocity { dx: 0.0, dy: 0.0 }, Position { x: 0.0, y: 0.0 }));
    assert_eq!(
        world.entity(first).location().archetype_id,
        world.entity(second).location().archetype_id
    );
}

#[test]
fn configured_capacities_do_not_change_behaviour() {
    init_logging();
    let mut world = World::with_config(WorldConfig::default().with_entity_capacity(64).with_table_capacity(64));
    let entities = world.spawn_batch((0..100).map(|i| Position { x: i as f32, y: 0.0 }));
    assert_eq!(world.entities().len(), 100);
    assert_eq!(world.get::<Position>(entities[99]).map(|p| p.x), Some(99.0));
}

#[test]
fn reserved_entities_can_be_handed_out_through_shared_access() {
    init_logging();
    let mut world = World::new();
    let live = world.spawn(Position { x: 0.0, y: 0.0 });
    world.despawn(live);

    let reserved: Vec<Entity> = world.reserve_entities(3).collect();
    assert!(world.entities().needs_flush());
    assert_eq!(reserved[0].index(), live.index());
    assert_eq!(reserved[0].generation(), 2);

    world.flush();
    for &entity in &reserved {
        assert_eq!(world.entity(entity).archetype().id(), EMPTY_ARCHETYPE);
    }
    assert_eq!(world.archetypes().empty().len(), 3);
}
