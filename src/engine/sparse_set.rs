//! Sparse-set component storage.
//!
//! Components declared with [`StorageType::SparseSet`](crate::engine::component::StorageType)
//! live outside tables, one [`ComponentSparseSet`] per component id. Adding or
//! removing such a component never moves the entity's table row.
//!
//! ## Layout
//!
//! ```text
//! sparse:   entity index -> dense index
//! dense:    Column<T>       (values + ticks, packed)
//! entities: Vec<Entity>     (owner of each dense slot)
//! ```
//!
//! Removal swap-removes the dense slot and repoints the sparse entry of the
//! entity that was moved into the hole.

use std::any::Any;

use rayon::prelude::*;

use crate::engine::change_detection::{ComponentTicks, Tick};
use crate::engine::component::ComponentInfo;
use crate::engine::entity::Entity;
use crate::engine::error::ColumnError;
use crate::engine::storage::{Column, TypeErasedColumn};
use crate::engine::types::ComponentID;


/// A `Vec<Option<V>>` addressed by small integer keys.

#[derive(Debug)]
pub struct SparseArray<V> {
    values: Vec<Option<V>>,
}

impl<V> Default for SparseArray<V> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

impl<V> SparseArray<V> {
    /// Creates an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a value is stored at `index`.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        matches!(self.values.get(index), Some(Some(_)))
    }

    /// Returns the value at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&V> {
        self.values.get(index)?.as_ref()
    }

    /// Mutable value at `index`.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut V> {
        self.values.get_mut(index)?.as_mut()
    }

    /// Stores `value` at `index`, growing the array as needed.
    pub fn insert(&mut self, index: usize, value: V) -> Option<V> {
        if index >= self.values.len() {
            self.values.resize_with(index + 1, || None);
        }
        self.values[index].replace(value)
    }

    /// Returns the value at `index`, inserting `func()` first if absent.
    pub fn get_or_insert_with(&mut self, index: usize, func: impl FnOnce() -> V) -> &mut V {
        if index >= self.values.len() {
            self.values.resize_with(index + 1, || None);
        }
        self.values[index].get_or_insert_with(func)
    }

    /// Removes and returns the value at `index`.
    #[inline]
    pub fn remove(&mut self, index: usize) -> Option<V> {
        self.values.get_mut(index)?.take()
    }

    /// Removes every value, keeping the allocation.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Iterates over `(index, value)` pairs that are present.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &V)> + '_ {
        self.values.iter().enumerate().filter_map(|(index, value)| Some((index, value.as_ref()?)))
    }

    /// Iterates mutably over present values.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> + '_ {
        self.values.iter_mut().flatten()
    }
}

impl<V: Send> SparseArray<V> {
    /// Parallel mutable iteration over present values.
    pub fn par_values_mut(&mut self) -> impl ParallelIterator<Item = &mut V> + '_ {
        self.values.par_iter_mut().flatten()
    }
}

/// Storage for one sparse-set component.
///
/// ## Invariants
/// - `dense.len() == entities.len()`.
/// - `sparse[entities[i].index()] == i` for every dense slot `i`.

pub struct ComponentSparseSet {
    component_id: ComponentID,
    dense: Box<dyn TypeErasedColumn>,
    entities: Vec<Entity>,
    sparse: SparseArray<u32>,
}

impl ComponentSparseSet {
    /// Creates an empty set for the component described by `info`.
    pub fn new(info: &ComponentInfo, capacity: usize) -> Self {
        let mut dense = info.descriptor().new_column();
        dense.reserve(capacity);
        Self { component_id: info.id(), dense, entities: Vec::with_capacity(capacity), sparse: SparseArray::new() }
    }

    /// Component stored in this set.
    #[inline] pub fn component_id(&self) -> ComponentID { self.component_id }
    /// Number of entities in the set.
    #[inline] pub fn len(&self) -> usize { self.entities.len() }
    /// Returns `true` if the set is empty.
    #[inline] pub fn is_empty(&self) -> bool { self.entities.is_empty() }
    /// Owners of the dense slots, in dense order.
    #[inline] pub fn entities(&self) -> &[Entity] { &self.entities }

    fn dense_index(&self, entity: Entity) -> Option<usize> {
        let dense_index = *self.sparse.get(entity.index() as usize)? as usize;
        (self.entities[dense_index] == entity).then_some(dense_index)
    }

    /// `true` if `entity` has a value in this set.
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.dense_index(entity).is_some()
    }

    /// Inserts or overwrites the value of `entity`.
    ///
    /// ## Behavior
    /// - Absent: appends a dense slot with fresh ticks.
    /// - Present: overwrites in place and stamps only the changed tick.

    pub fn insert_dyn(&mut self, entity: Entity, value: Box<dyn Any + Send>, change_tick: Tick) -> Result<(), ColumnError> {
        if let Some(dense_index) = self.dense_index(entity) {
            return self.dense.replace_dyn(dense_index, value, change_tick);
        }

        let dense_index = self.entities.len();
        self.dense.push_uninit();
        if let Err(error) = self.dense.initialize_dyn(dense_index, value, change_tick) {
            self.dense.swap_remove_and_drop(dense_index);
            return Err(error);
        }
        self.entities.push(entity);
        self.sparse.insert(entity.index() as usize, dense_index as u32);
        Ok(())
    }

    /// Typed convenience over [`insert_dyn`](Self::insert_dyn).
    pub fn insert<T: Send + Sync + 'static>(&mut self, entity: Entity, value: T, change_tick: Tick) -> Result<(), ColumnError> {
        self.insert_dyn(entity, Box::new(value), change_tick)
    }

    fn typed<T: 'static>(&self) -> Option<&Column<T>> {
        self.dense.as_any().downcast_ref::<Column<T>>()
    }

    fn typed_mut<T: 'static>(&mut self) -> Option<&mut Column<T>> {
        self.dense.as_any_mut().downcast_mut::<Column<T>>()
    }

    /// Borrows the value of `entity`.
    pub fn get<T: Send + Sync + 'static>(&self, entity: Entity) -> Option<&T> {
        let dense_index = self.dense_index(entity)?;
        self.typed::<T>()?.get(dense_index)
    }

    /// Borrows the value of `entity` together with its ticks.
    pub fn get_with_ticks<T: Send + Sync + 'static>(&self, entity: Entity) -> Option<(&T, &ComponentTicks)> {
        let dense_index = self.dense_index(entity)?;
        self.typed::<T>()?.get_with_ticks(dense_index)
    }

    /// Mutably borrows the value of `entity` together with its ticks.
    pub fn get_mut_with_ticks<T: Send + Sync + 'static>(&mut self, entity: Entity) -> Option<(&mut T, &mut ComponentTicks)> {
        let dense_index = self.dense_index(entity)?;
        self.typed_mut::<T>()?.get_mut_with_ticks(dense_index)
    }

    /// Borrows the value of `entity` as `Any`.
    pub fn get_dyn(&self, entity: Entity) -> Option<&dyn Any> {
        let dense_index = self.dense_index(entity)?;
        self.dense.get_dyn(dense_index)
    }

    /// Ticks of the value of `entity`.
    pub fn get_ticks(&self, entity: Entity) -> Option<ComponentTicks> {
        self.dense.get_ticks(self.dense_index(entity)?)
    }

    /// Removes the value of `entity` and returns it.
    pub fn remove(&mut self, entity: Entity) -> Option<Box<dyn Any + Send>> {
        let dense_index = self.dense_index(entity)?;
        self.sparse.remove(entity.index() as usize);

        let is_last = dense_index == self.entities.len() - 1;
        self.entities.swap_remove(dense_index);
        let value = self.dense.swap_remove_and_take(dense_index).map(|(value, _)| value);
        if !is_last {
            let swapped = self.entities[dense_index];
            self.sparse.insert(swapped.index() as usize, dense_index as u32);
        }
        value
    }

    /// Removes and drops the value of `entity`. Returns `true` if it was present.
    pub fn remove_and_drop(&mut self, entity: Entity) -> bool {
        self.remove(entity).is_some()
    }

    /// Dense iteration over `(entity, value)` pairs.
    pub fn iter<T: Send + Sync + 'static>(&self) -> impl Iterator<Item = (Entity, &T)> + '_ {
        self.entities.iter().copied().zip(self.typed::<T>().into_iter().flat_map(Column::iter))
    }

    pub(crate) fn check_change_ticks(&mut self, change_tick: Tick) {
        self.dense.check_change_ticks(change_tick);
    }

    /// Drops every value. The set itself stays registered.
    pub fn clear(&mut self) {
        self.dense.clear();
        self.entities.clear();
        self.sparse.clear();
    }
}

/// All sparse sets of a world, keyed by component id.

#[derive(Default)]
pub struct SparseSets {
    sets: SparseArray<ComponentSparseSet>,
}

impl SparseSets {
    /// Returns the set for `info`, creating it if needed.
    pub fn get_or_insert(&mut self, info: &ComponentInfo) -> &mut ComponentSparseSet {
        self.sets.get_or_insert_with(info.id() as usize, || ComponentSparseSet::new(info, 0))
    }

    /// Returns the sparse set of `component_id`, if one exists.
    #[inline]
    pub fn get(&self, component_id: ComponentID) -> Option<&ComponentSparseSet> {
        self.sets.get(component_id as usize)
    }

    /// Mutable sparse set of `component_id`, if one exists.
    #[inline]
    pub fn get_mut(&mut self, component_id: ComponentID) -> Option<&mut ComponentSparseSet> {
        self.sets.get_mut(component_id as usize)
    }

    /// Iterates over every set with its component id.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentID, &ComponentSparseSet)> + '_ {
        self.sets.iter().map(|(id, set)| (id as ComponentID, set))
    }

    pub(crate) fn check_change_ticks(&mut self, change_tick: Tick) {
        self.sets.par_values_mut().for_each(|set| set.check_change_ticks(change_tick));
    }

    /// Empties every set without deallocating any of them.
    pub fn clear_entities(&mut self) {
        for set in self.sets.values_mut() {
            set.clear();
        }
    }
}
