//! Tables: dense columnar storage for one set of table-stored components.
//!
//! A [`Table`] owns one column per component id in its (sorted, deduplicated)
//! id set plus the entity that owns each row. Several archetypes may share a
//! table when they differ only in sparse-set components.
//!
//! ## Row moves
//!
//! When an entity's table-stored component set changes, its row moves to the
//! table for the new set. For each source column:
//!
//! - present in the destination: the value and ticks are transferred;
//! - absent from the destination: the value is dropped
//!   ([`Table::move_to_and_drop_missing`]) or must already have been taken out
//!   ([`Table::move_to_and_forget_missing`]).
//!
//! Every removal is a swap-remove. The entity moved into the vacated row is
//! reported back so its location can be fixed up.
//!
//! ## Invariants
//! - Every column has exactly `entities.len()` rows.
//! - `component_ids` is sorted and deduplicated; `columns[i]` stores `component_ids[i]`.

use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use rayon::prelude::*;

use crate::engine::change_detection::Tick;
use crate::engine::component::ComponentRegistry;
use crate::engine::entity::Entity;
use crate::engine::storage::{Column, TypeErasedColumn};
use crate::engine::types::{ComponentID, TableID, TableRow, EMPTY_TABLE};


/// Outcome of moving a row between tables.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableMoveResult {
    /// Row of the moved entity in the destination table.
    pub new_row: TableRow,
    /// Entity that was swapped into the vacated source row, if any.
    pub swapped_entity: Option<Entity>,
}

/// Columnar storage for every entity whose table-stored components are exactly
/// `component_ids`.

pub struct Table {
    id: TableID,
    component_ids: Box<[ComponentID]>,
    columns: Box<[Box<dyn TypeErasedColumn>]>,
    entities: Vec<Entity>,
}

impl Table {
    /// Id of this table.
    #[inline] pub fn id(&self) -> TableID { self.id }
    /// Number of rows.
    #[inline] pub fn entity_count(&self) -> usize { self.entities.len() }
    /// Returns `true` if the table has no rows.
    #[inline] pub fn is_empty(&self) -> bool { self.entities.is_empty() }
    /// Entities in row order.
    #[inline] pub fn entities(&self) -> &[Entity] { &self.entities }
    /// Sorted ids of the stored components.
    #[inline] pub fn component_ids(&self) -> &[ComponentID] { &self.component_ids }

    #[inline]
    fn column_index(&self, component_id: ComponentID) -> Option<usize> {
        self.component_ids.binary_search(&component_id).ok()
    }

    /// `true` if this table stores `component_id`.
    #[inline]
    pub fn has_column(&self, component_id: ComponentID) -> bool {
        self.column_index(component_id).is_some()
    }

    /// Column of `component_id`, if the table stores it.
    pub fn get_column(&self, component_id: ComponentID) -> Option<&dyn TypeErasedColumn> {
        self.column_index(component_id).map(|index| self.columns[index].as_ref())
    }

    /// Mutable column of `component_id`, if the table stores it.
    pub fn get_column_mut(&mut self, component_id: ComponentID) -> Option<&mut dyn TypeErasedColumn> {
        let index = self.column_index(component_id)?;
        Some(self.columns[index].as_mut())
    }

    /// Typed view of a column.
    pub fn column<T: 'static>(&self, component_id: ComponentID) -> Option<&Column<T>> {
        self.get_column(component_id)?.as_any().downcast_ref::<Column<T>>()
    }

    /// Typed mutable view of a column.
    pub fn column_mut<T: 'static>(&mut self, component_id: ComponentID) -> Option<&mut Column<T>> {
        self.get_column_mut(component_id)?.as_any_mut().downcast_mut::<Column<T>>()
    }

    /// Iterates over `(component_id, column)` pairs in id order.
    pub fn iter_columns(&self) -> impl Iterator<Item = (ComponentID, &dyn TypeErasedColumn)> + '_ {
        self.component_ids.iter().copied().zip(self.columns.iter().map(|column| column.as_ref()))
    }

    /// Appends an uninitialised row owned by `entity`.
    pub fn allocate(&mut self, entity: Entity) -> TableRow {
        let row = self.entities.len() as TableRow;
        self.entities.push(entity);
        for column in self.columns.iter_mut() {
            column.push_uninit();
        }
        row
    }

    /// Reserves room for `additional` rows in every column.
    pub fn reserve(&mut self, additional: usize) {
        self.entities.reserve(additional);
        for column in self.columns.iter_mut() {
            column.reserve(additional);
        }
    }

    /// Removes `row`, dropping its values. Returns the entity that was swapped
    /// into `row`, if any.

    pub fn swap_remove(&mut self, row: TableRow) -> Option<Entity> {
        let row = row as usize;
        let is_last = row == self.entities.len() - 1;
        self.entities.swap_remove(row);
        for column in self.columns.iter_mut() {
            column.swap_remove_and_drop(row);
        }
        (!is_last).then(|| self.entities[row])
    }

    /// Moves `row` into `new_table`, dropping values for components the
    /// destination does not store.

    pub fn move_to_and_drop_missing(&mut self, row: TableRow, new_table: &mut Table) -> TableMoveResult {
        self.move_to(row, new_table, |column, row| column.swap_remove_and_drop(row))
    }

    /// Moves `row` into `new_table`. Values for components the destination does
    /// not store must already have been taken out of the row.

    pub fn move_to_and_forget_missing(&mut self, row: TableRow, new_table: &mut Table) -> TableMoveResult {
        self.move_to(row, new_table, |column, row| {
            debug_assert!(!column.is_initialized(row), "forgotten table value was never taken");
            column.swap_remove_and_drop(row);
        })
    }

    /// Moves `row` into `new_table`, whose component set contains this table's.
    pub fn move_to_superset(&mut self, row: TableRow, new_table: &mut Table) -> TableMoveResult {
        debug_assert!(self.component_ids.iter().all(|&id| new_table.has_column(id)));
        self.move_to_and_drop_missing(row, new_table)
    }

    fn move_to(
        &mut self,
        row: TableRow,
        new_table: &mut Table,
        mut on_missing: impl FnMut(&mut dyn TypeErasedColumn, usize),
    ) -> TableMoveResult {
        let row_index = row as usize;
        let is_last = row_index == self.entities.len() - 1;
        let entity = self.entities.swap_remove(row_index);
        let new_row = new_table.allocate(entity);

        for (&component_id, column) in self.component_ids.iter().zip(self.columns.iter_mut()) {
            match new_table.get_column_mut(component_id) {
                Some(destination) => {
                    if let Err(e) = column.swap_remove_into(row_index, destination, new_row as usize) {
                        debug_assert!(false, "table move failed: {e}");
                        panic!("ECS corruption detected: {e}");
                    }
                }
                None => on_missing(column.as_mut(), row_index),
            }
        }

        TableMoveResult { new_row, swapped_entity: (!is_last).then(|| self.entities[row_index]) }
    }

    pub(crate) fn check_change_ticks(&mut self, change_tick: Tick) {
        for column in self.columns.iter_mut() {
            column.check_change_ticks(change_tick);
        }
    }

    /// Drops every row.
    pub fn clear(&mut self) {
        self.entities.clear();
        for column in self.columns.iter_mut() {
            column.clear();
        }
    }
}

/// Every table of a world, deduplicated by component set.
///
/// Table [`EMPTY_TABLE`] has no columns and always exists.

pub struct Tables {
    tables: Vec<Table>,
    table_ids: HashMap<Box<[ComponentID]>, TableID>,
    row_capacity: usize,
}

impl Default for Tables {
    fn default() -> Self {
        Self::with_row_capacity(0)
    }
}

impl Tables {
    /// Creates the table set; new tables reserve `row_capacity` rows.
    pub fn with_row_capacity(row_capacity: usize) -> Self {
        let empty = Table { id: EMPTY_TABLE, component_ids: Box::new([]), columns: Box::new([]), entities: Vec::new() };
        let mut table_ids = HashMap::new();
        table_ids.insert(Box::<[ComponentID]>::from([]), EMPTY_TABLE);
        Self { tables: vec![empty], table_ids, row_capacity }
    }

    /// Number of tables, including the empty one.
    #[inline] pub fn len(&self) -> usize { self.tables.len() }
    /// Always `false` once constructed, since the empty table exists.
    #[inline] pub fn is_empty(&self) -> bool { self.tables.is_empty() }

    /// Returns the table with `id`, if it exists.
    #[inline]
    pub fn get(&self, id: TableID) -> Option<&Table> {
        self.tables.get(id as usize)
    }

    /// Mutable table with `id`, if it exists.
    #[inline]
    pub fn get_mut(&mut self, id: TableID) -> Option<&mut Table> {
        self.tables.get_mut(id as usize)
    }

    /// Iterates over every table in id order.
    pub fn iter(&self) -> std::slice::Iter<'_, Table> {
        self.tables.iter()
    }

    /// Returns the id of the table storing exactly `component_ids`, creating it if needed.
    ///
    /// ## Behavior
    /// The id set is sorted and deduplicated first, so any ordering of the same
    /// ids resolves to the same table.
    ///
    /// ## Panics
    /// Panics if an id is not registered in `components`.

    pub fn get_id_or_insert(&mut self, component_ids: &[ComponentID], components: &ComponentRegistry) -> TableID {
        let mut canonical = component_ids.to_vec();
        canonical.sort_unstable();
        canonical.dedup();

        if let Some(&id) = self.table_ids.get(canonical.as_slice()) {
            return id;
        }

        let id = TableID::try_from(self.tables.len()).unwrap_or_else(|_| panic!("exceeded the table id space"));
        let columns: Box<[Box<dyn TypeErasedColumn>]> = canonical
            .iter()
            .map(|&component_id| {
                let info = components
                    .get_info(component_id)
                    .unwrap_or_else(|| panic!("component {component_id} is not registered"));
                let mut column = info.descriptor().new_column();
                column.reserve(self.row_capacity);
                column
            })
            .collect();

        let component_ids: Box<[ComponentID]> = canonical.into_boxed_slice();
        log::debug!("created table {id} for components {component_ids:?}");
        self.tables.push(Table {
            id,
            component_ids: component_ids.clone(),
            columns,
            entities: Vec::with_capacity(self.row_capacity),
        });
        self.table_ids.insert(component_ids, id);
        id
    }

    /// Mutably borrows two distinct tables at once.
    ///
    /// ## Panics
    /// Panics if `a == b`.

    pub fn get_2_mut(&mut self, a: TableID, b: TableID) -> (&mut Table, &mut Table) {
        assert!(a != b, "source and destination table must differ");
        let (left, right) = if a < b { (a, b) } else { (b, a) };

        let (head, tail) = self.tables.split_at_mut(right as usize);
        let left_reference = &mut head[left as usize];
        let right_reference = &mut tail[0];
        if a < b { (left_reference, right_reference) } else { (right_reference, left_reference) }
    }

    pub(crate) fn check_change_ticks(&mut self, change_tick: Tick) {
        self.tables.par_iter_mut().for_each(|table| table.check_change_ticks(change_tick));
    }

    /// Drops every row of every table. Tables themselves are kept.
    pub fn clear(&mut self) {
        for table in &mut self.tables {
            table.clear();
        }
    }
}

impl Index<TableID> for Tables {
    type Output = Table;

    #[inline]
    fn index(&self, index: TableID) -> &Self::Output {
        &self.tables[index as usize]
    }
}

impl IndexMut<TableID> for Tables {
    #[inline]
    fn index_mut(&mut self, index: TableID) -> &mut Self::Output {
        &mut self.tables[index as usize]
    }
}
