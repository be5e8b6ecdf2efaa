//! Columnar component storage and type erasure.
//!
//! A [`Column<T>`] stores the values of one component type for every row of a
//! table (or every dense slot of a sparse set), together with each value's
//! [`ComponentTicks`]. Rows and ticks are kept in lockstep: allocating a row
//! pushes an empty slot and default ticks, and every removal is a swap-remove on
//! both vectors.
//!
//! # Uninitialised rows
//!
//! Table rows are allocated before their values are written. A freshly
//! allocated row holds `None` until [`Column::initialize`] fills it. Reading an
//! uninitialised row yields `None`; initialising an already-initialised row is
//! rejected with [`ColumnError::AlreadyInitialized`].
//!
//! # Type erasure
//!
//! Tables hold heterogeneous columns as `Box<dyn TypeErasedColumn>`. The trait
//! mirrors the typed operations with `Box<dyn Any + Send>` values and exposes
//! `as_any` / `as_any_mut` so callers that know `T` can downcast back to the
//! typed column for direct slice access.

use std::any::{type_name, Any, TypeId};

use crate::engine::change_detection::{ComponentTicks, Tick};
use crate::engine::error::{ColumnError, TypeMismatchError};
use crate::engine::resource::Resources;
use crate::engine::sparse_set::SparseSets;
use crate::engine::table::Tables;


/// Dynamically typed interface over a [`Column<T>`].
///
/// ## Purpose
/// Lets tables and sparse sets move, drop and stamp component values without
/// knowing their concrete type.
///
/// ## Invariants
/// Implementations keep value slots and ticks the same length.

pub trait TypeErasedColumn: Any + Send + Sync {
    /// Number of rows, initialised or not.
    fn len(&self) -> usize;

    /// `true` if the column has no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Mutable borrow as `Any` for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// `TypeId` of the stored element type.
    fn element_type_id(&self) -> TypeId;

    /// Type name of the stored element type.
    fn element_type_name(&self) -> &'static str;

    /// Creates an empty column of the same element type.
    fn empty_clone(&self) -> Box<dyn TypeErasedColumn>;

    /// Appends an uninitialised row.
    fn push_uninit(&mut self);

    /// Reserves capacity for `additional` more rows.
    fn reserve(&mut self, additional: usize);

    /// `true` if `row` holds a value.
    fn is_initialized(&self, row: usize) -> bool;

    /// Writes `value` into the uninitialised `row` with fresh ticks.
    fn initialize_dyn(&mut self, row: usize, value: Box<dyn Any + Send>, tick: Tick) -> Result<(), ColumnError>;

    /// Overwrites `row` and stamps its changed tick. An uninitialised row is initialised.
    fn replace_dyn(&mut self, row: usize, value: Box<dyn Any + Send>, tick: Tick) -> Result<(), ColumnError>;

    /// Moves the value out of `row`, leaving the row uninitialised.
    fn take_dyn(&mut self, row: usize) -> Option<Box<dyn Any + Send>>;

    /// Borrows the value in `row` as `Any`.
    fn get_dyn(&self, row: usize) -> Option<&dyn Any>;

    /// Removes `row` by swapping in the last row and drops its value.
    fn swap_remove_and_drop(&mut self, row: usize);

    /// Removes `row` by swapping in the last row and returns its value and ticks.
    fn swap_remove_and_take(&mut self, row: usize) -> Option<(Box<dyn Any + Send>, ComponentTicks)>;

    /// Removes `row` and writes its value and ticks into `destination_row` of
    /// `destination`, which must hold the same element type.
    fn swap_remove_into(
        &mut self,
        row: usize,
        destination: &mut dyn TypeErasedColumn,
        destination_row: usize,
    ) -> Result<(), ColumnError>;

    /// Ticks of `row`.
    fn get_ticks(&self, row: usize) -> Option<ComponentTicks>;

    /// Clamps every tick against `change_tick`.
    fn check_change_ticks(&mut self, change_tick: Tick);

    /// Drops every row.
    fn clear(&mut self);
}

/// Typed column of component values and their change ticks.

#[derive(Debug)]
pub struct Column<T> {
    values: Vec<Option<T>>,
    ticks: Vec<ComponentTicks>,
}

impl<T> Default for Column<T> {
    fn default() -> Self {
        Self { values: Vec::new(), ticks: Vec::new() }
    }
}

impl<T: Send + Sync + 'static> Column<T> {
    /// Creates an empty column.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty column with room for `capacity` rows.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { values: Vec::with_capacity(capacity), ticks: Vec::with_capacity(capacity) }
    }

    /// Number of rows, including uninitialised ones.
    #[inline] pub fn len(&self) -> usize { self.values.len() }
    /// Returns `true` if the column has no rows.
    #[inline] pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Value at `row`, or `None` if the row is missing or uninitialised.
    #[inline]
    pub fn get(&self, row: usize) -> Option<&T> {
        self.values.get(row)?.as_ref()
    }

    /// Mutable value at `row`. Does not stamp ticks.
    #[inline]
    pub fn get_mut(&mut self, row: usize) -> Option<&mut T> {
        self.values.get_mut(row)?.as_mut()
    }

    /// Ticks of the value at `row`.
    #[inline]
    pub fn get_ticks(&self, row: usize) -> Option<&ComponentTicks> {
        self.ticks.get(row)
    }

    /// Borrows the value in `row` together with its ticks.
    #[inline]
    pub fn get_with_ticks(&self, row: usize) -> Option<(&T, &ComponentTicks)> {
        Some((self.values.get(row)?.as_ref()?, &self.ticks[row]))
    }

    /// Mutably borrows the value in `row` together with its ticks.
    #[inline]
    pub fn get_mut_with_ticks(&mut self, row: usize) -> Option<(&mut T, &mut ComponentTicks)> {
        let value = self.values.get_mut(row)?.as_mut()?;
        Some((value, &mut self.ticks[row]))
    }

    /// Iterates over initialised values in row order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.values.iter().flatten()
    }

    /// Iterates over initialised values and their ticks in row order.
    pub fn iter_with_ticks(&self) -> impl Iterator<Item = (&T, &ComponentTicks)> + '_ {
        self.values.iter().zip(self.ticks.iter()).filter_map(|(value, ticks)| Some((value.as_ref()?, ticks)))
    }

    /// Raw value slots, uninitialised rows included.
    #[inline]
    pub fn slots(&self) -> &[Option<T>] {
        &self.values
    }

    /// Ticks of every row.
    #[inline]
    pub fn ticks(&self) -> &[ComponentTicks] {
        &self.ticks
    }

    /// Appends an uninitialised row.
    #[inline]
    pub fn push_uninit(&mut self) {
        self.values.push(None);
        self.ticks.push(ComponentTicks::default());
    }

    /// Appends an initialised row.
    #[inline]
    pub fn push(&mut self, value: T, tick: Tick) {
        self.values.push(Some(value));
        self.ticks.push(ComponentTicks::new(tick));
    }

    /// Writes `value` into the uninitialised `row`.
    ///
    /// ## Errors
    /// - [`ColumnError::RowOutOfBounds`] if `row >= len`.
    /// - [`ColumnError::AlreadyInitialized`] if the row already holds a value.

    pub fn initialize(&mut self, row: usize, value: T, tick: Tick) -> Result<(), ColumnError> {
        let length = self.values.len();
        let slot = self.values.get_mut(row).ok_or(ColumnError::RowOutOfBounds { row, length })?;
        if slot.is_some() {
            return Err(ColumnError::AlreadyInitialized { row });
        }
        *slot = Some(value);
        self.ticks[row] = ComponentTicks::new(tick);
        Ok(())
    }

    /// Overwrites `row`, returning the previous value.
    ///
    /// Only the changed tick is stamped, unless the row was uninitialised, in
    /// which case the row is initialised with fresh ticks.

    pub fn replace(&mut self, row: usize, value: T, tick: Tick) -> Result<Option<T>, ColumnError> {
        let length = self.values.len();
        let slot = self.values.get_mut(row).ok_or(ColumnError::RowOutOfBounds { row, length })?;
        let previous = slot.replace(value);
        match previous {
            Some(_) => self.ticks[row].set_changed(tick),
            None => self.ticks[row] = ComponentTicks::new(tick),
        }
        Ok(previous)
    }

    /// Moves the value out of `row`, leaving it uninitialised.
    #[inline]
    pub fn take(&mut self, row: usize) -> Option<T> {
        self.values.get_mut(row)?.take()
    }

    /// Swap-removes `row`, returning its value (if initialised) and ticks.
    pub fn swap_remove(&mut self, row: usize) -> Option<(Option<T>, ComponentTicks)> {
        if row >= self.values.len() {
            return None;
        }
        Some((self.values.swap_remove(row), self.ticks.swap_remove(row)))
    }

    fn downcast_value(value: Box<dyn Any + Send>) -> Result<T, ColumnError> {
        value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| ColumnError::from(TypeMismatchError { expected: type_name::<T>() }))
    }
}

impl<T: Send + Sync + 'static> TypeErasedColumn for Column<T> {
    fn len(&self) -> usize { self.values.len() }
    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }
    fn element_type_id(&self) -> TypeId { TypeId::of::<T>() }
    fn element_type_name(&self) -> &'static str { type_name::<T>() }

    fn empty_clone(&self) -> Box<dyn TypeErasedColumn> {
        Box::new(Column::<T>::new())
    }

    fn push_uninit(&mut self) {
        Column::push_uninit(self);
    }

    fn reserve(&mut self, additional: usize) {
        self.values.reserve(additional);
        self.ticks.reserve(additional);
    }

    fn is_initialized(&self, row: usize) -> bool {
        matches!(self.values.get(row), Some(Some(_)))
    }

    fn initialize_dyn(&mut self, row: usize, value: Box<dyn Any + Send>, tick: Tick) -> Result<(), ColumnError> {
        let value = Self::downcast_value(value)?;
        self.initialize(row, value, tick)
    }

    fn replace_dyn(&mut self, row: usize, value: Box<dyn Any + Send>, tick: Tick) -> Result<(), ColumnError> {
        let value = Self::downcast_value(value)?;
        self.replace(row, value, tick).map(drop)
    }

    fn take_dyn(&mut self, row: usize) -> Option<Box<dyn Any + Send>> {
        self.take(row).map(|value| Box::new(value) as Box<dyn Any + Send>)
    }

    fn get_dyn(&self, row: usize) -> Option<&dyn Any> {
        self.get(row).map(|value| value as &dyn Any)
    }

    fn swap_remove_and_drop(&mut self, row: usize) {
        self.swap_remove(row);
    }

    fn swap_remove_and_take(&mut self, row: usize) -> Option<(Box<dyn Any + Send>, ComponentTicks)> {
        let (value, ticks) = self.swap_remove(row)?;
        Some((Box::new(value?) as Box<dyn Any + Send>, ticks))
    }

    fn swap_remove_into(
        &mut self,
        row: usize,
        destination: &mut dyn TypeErasedColumn,
        destination_row: usize,
    ) -> Result<(), ColumnError> {
        let length = self.values.len();
        let destination = destination
            .as_any_mut()
            .downcast_mut::<Column<T>>()
            .ok_or(TypeMismatchError { expected: type_name::<T>() })?;
        let (value, ticks) = self.swap_remove(row).ok_or(ColumnError::RowOutOfBounds { row, length })?;

        let destination_length = destination.values.len();
        let slot = destination
            .values
            .get_mut(destination_row)
            .ok_or(ColumnError::RowOutOfBounds { row: destination_row, length: destination_length })?;
        *slot = value;
        destination.ticks[destination_row] = ticks;
        Ok(())
    }

    fn get_ticks(&self, row: usize) -> Option<ComponentTicks> {
        self.ticks.get(row).copied()
    }

    fn check_change_ticks(&mut self, change_tick: Tick) {
        for ticks in &mut self.ticks {
            ticks.check_ticks(change_tick);
        }
    }

    fn clear(&mut self) {
        self.values.clear();
        self.ticks.clear();
    }
}

/// Every store of component and resource data owned by a world.

#[derive(Default)]
pub struct Storages {
    /// Table-stored components.
    pub tables: Tables,
    /// Sparse-set-stored components.
    pub sparse_sets: SparseSets,
    /// Resources.
    pub resources: Resources,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Health(u32);

    fn column_with(values: &[u32]) -> Column<Health> {
        let mut column = Column::new();
        for &value in values {
            column.push(Health(value), Tick::new(value));
        }
        column
    }

    #[test]
    fn uninitialised_rows_read_as_none() {
        let mut column = Column::<Health>::new();
        column.push_uninit();
        assert_eq!(column.len(), 1);
        assert_eq!(column.get(0), None);
        assert!(!TypeErasedColumn::is_initialized(&column, 0));

        column.initialize(0, Health(5), Tick::new(3)).unwrap();
        assert_eq!(column.get(0), Some(&Health(5)));
        assert_eq!(column.get_ticks(0), Some(&ComponentTicks::new(Tick::new(3))));
    }

    #[test]
    fn double_initialisation_is_rejected() {
        let mut column = column_with(&[1]);
        assert_eq!(
            column.initialize(0, Health(2), Tick::new(4)),
            Err(ColumnError::AlreadyInitialized { row: 0 })
        );
        assert_eq!(
            column.initialize(3, Health(2), Tick::new(4)),
            Err(ColumnError::RowOutOfBounds { row: 3, length: 1 })
        );
        assert_eq!(column.get(0), Some(&Health(1)));
    }

    #[test]
    fn replace_stamps_changed_only() {
        let mut column = column_with(&[1]);
        assert_eq!(column.replace(0, Health(9), Tick::new(7)).unwrap(), Some(Health(1)));
        let ticks = column.get_ticks(0).unwrap();
        assert_eq!(ticks.added, Tick::new(1));
        assert_eq!(ticks.changed, Tick::new(7));
    }

    #[test]
    fn erased_values_of_the_wrong_type_are_rejected() {
        let mut column = Column::<Health>::new();
        column.push_uninit();
        let error = column.initialize_dyn(0, Box::new(5u64), Tick::new(0)).unwrap_err();
        assert!(matches!(error, ColumnError::TypeMismatch(_)));
        assert!(!column.is_initialized(0));
    }

    #[test]
    fn swap_remove_into_keeps_values_and_ticks_together() {
        let mut source = column_with(&[1, 2, 3]);
        let mut destination = Column::<Health>::new();
        destination.push_uninit();

        source.swap_remove_into(0, &mut destination, 0).unwrap();
        assert_eq!(destination.get(0), Some(&Health(1)));
        assert_eq!(destination.get_ticks(0).unwrap().added, Tick::new(1));
        assert_eq!(source.iter().collect::<Vec<_>>(), vec![&Health(3), &Health(2)]);
        assert_eq!(source.ticks()[0].added, Tick::new(3));
    }

    #[test]
    fn swap_remove_into_a_foreign_column_fails() {
        let mut source = column_with(&[1]);
        let mut destination = Column::<u8>::new();
        destination.push_uninit();
        assert!(source.swap_remove_into(0, &mut destination, 0).is_err());
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn take_leaves_row_allocated() {
        let mut column = column_with(&[4, 5]);
        let taken = column.take_dyn(1).unwrap();
        assert_eq!(*taken.downcast::<Health>().unwrap(), Health(5));
        assert_eq!(column.len(), 2);
        assert!(column.get(1).is_none());
    }
}
