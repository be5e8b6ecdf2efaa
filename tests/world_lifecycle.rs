use tabula::prelude::*;
use tabula::engine::types::EMPTY_ARCHETYPE;
use tabula::EntityDoesNotExistError;

#[derive(Clone, Copy, Debug, PartialEq)]
struct A(u32);
impl Component for A {}

#[derive(Clone, Copy, Debug, PartialEq)]
struct B(u32);
impl Component for B {
    const STORAGE_TYPE: StorageType = StorageType::SparseSet;
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct C(u32);
impl Component for C {}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn populated_archetypes(world: &World) -> usize {
    world.archetypes().iter().filter(|archetype| !archetype.is_empty()).count()
}

#[test]
fn table_and_sparse_components_land_in_their_stores() {
    init_logging();
    let mut world = World::new();
    let a = world.register_component::<A>();
    let b = world.register_component::<B>();

    let entity = world.spawn((A(1), B(2)));
    let location = world.entity(entity).location();

    let table = &world.storages().tables[location.table_id];
    assert_eq!(table.component_ids(), &[a]);
    assert!(!table.has_column(b));
    assert_eq!(world.storages().sparse_sets.get(b).unwrap().len(), 1);
    assert_eq!(populated_archetypes(&world), 1);
    assert_eq!(world.get::<B>(entity), Some(&B(2)));
}

#[test]
fn identical_bundles_share_one_table_and_archetype() {
    init_logging();
    let mut world = World::new();
    let entities = world.spawn_batch((0..200).map(|i| (A(i), B(i), C(i))));

    assert_eq!(populated_archetypes(&world), 1);
    let location = world.entity(entities[0]).location();
    let table = &world.storages().tables[location.table_id];
    assert_eq!(table.entity_count(), 200);

    let mut rows: Vec<u32> = entities.iter().map(|&e| world.entity(e).location().table_row).collect();
    rows.sort_unstable();
    rows.dedup();
    assert_eq!(rows.len(), 200);

    for (i, &entity) in entities.iter().enumerate() {
        assert_eq!(world.get::<C>(entity), Some(&C(i as u32)));
    }
}

#[test]
fn despawned_indices_come_back_with_a_new_generation() {
    init_logging();
    let mut world = World::new();
    let entities: Vec<Entity> = (0..8).map(|i| world.spawn(A(i))).collect();
    let victim = entities[5];
    assert_eq!((victim.index(), victim.generation()), (5, 1));

    assert!(world.despawn(victim));
    assert!(!world.entities().contains(victim));
    assert!(world.get_entity(victim).is_none());

    let reused = world.spawn(A(99));
    assert_eq!((reused.index(), reused.generation()), (5, 2));
    assert!(world.get::<A>(victim).is_none());
    assert_eq!(world.get::<A>(reused), Some(&A(99)));
}

#[test]
fn insert_edges_are_reused_for_the_same_shape() {
    init_logging();
    let mut world = World::new();
    let first = world.spawn((A(1), B(1)));
    let second = world.spawn((A(2), B(2)));
    let archetypes_before = world.archetypes().len();

    world.insert(first, C(1)).unwrap();
    assert_eq!(world.archetypes().len(), archetypes_before + 1);
    let target = world.entity(first).location().archetype_id;

    world.insert(second, C(2)).unwrap();
    assert_eq!(world.archetypes().len(), archetypes_before + 1);
    assert_eq!(world.entity(second).location().archetype_id, target);

    let bundle_id = world.bundles().get_id(std::any::TypeId::of::<C>()).unwrap();
    let source = world.archetypes().iter().find(|archetype| {
        archetype.edges().get_add_bundle(bundle_id) == Some(target) && archetype.id() != target
    });
    assert!(source.is_some());
}

#[test]
fn structural_changes_keep_every_value() {
    init_logging();
    let mut world = World::new();
    let entities = world.spawn_batch((0..32).map(|i| (A(i), C(i))));

    for &entity in entities.iter().step_by(2) {
        world.remove::<C>(entity).unwrap();
    }
    for &entity in entities.iter().step_by(3) {
        world.insert(entity, B(7)).unwrap();
    }
    for &entity in entities.iter().step_by(5) {
        world.despawn(entity);
    }

    for (i, &entity) in entities.iter().enumerate() {
        if i % 5 == 0 {
            assert!(world.get_entity(entity).is_none());
            continue;
        }
        let i = i as u32;
        assert_eq!(world.get::<A>(entity), Some(&A(i)));
        assert_eq!(world.get::<C>(entity).copied(), (i % 2 == 1).then_some(C(i)));
        assert_eq!(world.get::<B>(entity).is_some(), i % 3 == 0);
    }
    assert_eq!(world.iter_entities().count(), 32 - 7);
}

#[test]
fn operations_on_missing_entities_report_errors() {
    init_logging();
    let mut world = World::new();
    let entity = world.spawn(A(1));
    world.despawn(entity);

    assert_eq!(world.insert(entity, C(1)), Err(EntityDoesNotExistError { entity }));
    assert_eq!(world.remove::<A>(entity), Err(EntityDoesNotExistError { entity }));
    assert!(world.take::<A>(entity).is_none());
    assert!(!world.despawn(entity));
}

#[test]
fn entity_views_expose_components_and_ids() {
    init_logging();
    let mut world = World::new();
    let entity = world.spawn((A(3), B(4)));
    let b = world.component_id::<B>().unwrap();

    let view = world.entity(entity);
    assert!(view.contains::<A>());
    assert!(!view.contains::<C>());
    assert_eq!(view.get_by_id(b).and_then(|value| value.downcast_ref::<B>()), Some(&B(4)));

    let mut entity_mut = world.entity_mut(entity);
    entity_mut.insert(C(5)).remove::<A>();
    assert_eq!(entity_mut.take::<(B, C)>(), Some((B(4), C(5))));
    assert_eq!(entity_mut.archetype().id(), EMPTY_ARCHETYPE);
    entity_mut.despawn();
    assert!(world.entities().is_empty());
}
