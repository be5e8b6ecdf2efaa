#![allow(dead_code)]

use tabula::{Component, Entity, StorageType, World, WorldConfig};

pub const AGENTS_SMALL: usize = 10_000;
pub const AGENTS_MED: usize = 100_000;
pub const AGENTS_LARGE: usize = 1_000_000;

#[derive(Clone, Copy)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}
impl Component for Position {}

#[derive(Clone, Copy)]
pub struct Wealth {
    pub value: f32,
}
impl Component for Wealth {}

#[derive(Clone, Copy)]
pub struct Productivity {
    pub rate: f32,
}
impl Component for Productivity {}

#[derive(Clone, Copy)]
pub struct Trading;
impl Component for Trading {
    const STORAGE_TYPE: StorageType = StorageType::SparseSet;
}

pub fn make_world(agent_count: usize) -> World {
    World::with_config(
        WorldConfig::default()
            .with_entity_capacity(agent_count as u32)
            .with_table_capacity(agent_count),
    )
}

pub fn populate(world: &mut World, agent_count: usize) -> Vec<Entity> {
    world.spawn_batch((0..agent_count).map(|i| {
        (
            Position { x: i as f32, y: 0.0 },
            Wealth { value: 100.0 },
            Productivity { rate: 1.0 },
        )
    }))
}

pub fn setup_world(agent_count: usize) -> (World, Vec<Entity>) {
    let mut world = make_world(agent_count);
    let entities = populate(&mut world, agent_count);
    (world, entities)
}
