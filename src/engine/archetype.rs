//! # Archetypes
//!
//! An archetype is a unique combination of table-stored and sparse-set-stored
//! component ids. Every entity belongs to exactly one archetype, which names
//! the table its dense data lives in and lists the entities that belong to it.
//!
//! ## Purpose
//! Archetypes are the unit queries iterate over and the nodes of the graph that
//! structural changes walk. Adding or removing a bundle moves an entity along
//! an edge from one archetype to another.
//!
//! ## Edges
//! Each archetype caches, per bundle id:
//! - the archetype reached by inserting the bundle, together with whether each
//!   bundle component was newly added or already present;
//! - the archetype reached by removing the bundle's intersection with this archetype;
//! - the archetype reached by taking the bundle, or `None` if some bundle
//!   component is missing.
//!
//! Caches are filled on first use and never invalidated; archetypes are
//! never destroyed.
//!
//! ## Invariants
//! - `table_components` and `sparse_set_components` are sorted and deduplicated.
//! - Archetype [`EMPTY_ARCHETYPE`] has no components and lives on table [`EMPTY_TABLE`](crate::engine::types::EMPTY_TABLE).
//! - No two archetypes share the same `(table, sparse set components)` key.

use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use crate::engine::component::StorageType;
use crate::engine::entity::{Entity, EntityLocation};
use crate::engine::sparse_set::SparseArray;
use crate::engine::types::{
    ArchetypeID, ArchetypeRow, BundleID, ComponentID, TableID, TableRow,
    EMPTY_ARCHETYPE, EMPTY_TABLE,
};


/// Whether an inserted bundle component is new to the entity.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentStatus {
    /// The source archetype lacks the component; its value must be initialised.
    Added,
    /// The source archetype has the component; its value is overwritten.
    Existing,
}

/// Cached result of inserting a bundle.

#[derive(Clone, Debug)]
pub struct AddBundle {
    /// Destination archetype.
    pub archetype_id: ArchetypeID,
    /// One status per bundle component, in bundle order.
    pub bundle_status: Vec<ComponentStatus>,
}

/// Transition caches of one archetype, keyed by bundle id.

#[derive(Default, Debug)]
pub struct Edges {
    add_bundle: SparseArray<AddBundle>,
    remove_bundle: SparseArray<ArchetypeID>,
    take_bundle: SparseArray<Option<ArchetypeID>>,
}

impl Edges {
    /// Archetype reached by inserting `bundle_id`, if cached.
    #[inline]
    pub fn get_add_bundle(&self, bundle_id: BundleID) -> Option<ArchetypeID> {
        self.get_add_bundle_internal(bundle_id).map(|bundle| bundle.archetype_id)
    }

    #[inline]
    pub(crate) fn get_add_bundle_internal(&self, bundle_id: BundleID) -> Option<&AddBundle> {
        self.add_bundle.get(bundle_id as usize)
    }

    #[inline]
    pub(crate) fn insert_add_bundle(&mut self, bundle_id: BundleID, archetype_id: ArchetypeID, bundle_status: Vec<ComponentStatus>) {
        self.add_bundle.insert(bundle_id as usize, AddBundle { archetype_id, bundle_status });
    }

    /// Archetype reached by removing `bundle_id`, if cached.
    #[inline]
    pub fn get_remove_bundle(&self, bundle_id: BundleID) -> Option<ArchetypeID> {
        self.remove_bundle.get(bundle_id as usize).copied()
    }

    #[inline]
    pub(crate) fn insert_remove_bundle(&mut self, bundle_id: BundleID, archetype_id: ArchetypeID) {
        self.remove_bundle.insert(bundle_id as usize, archetype_id);
    }

    /// Cached result of taking `bundle_id`: `Some(None)` means the take was
    /// found to be impossible from this archetype.

    #[inline]
    pub fn get_take_bundle(&self, bundle_id: BundleID) -> Option<Option<ArchetypeID>> {
        self.take_bundle.get(bundle_id as usize).copied()
    }

    #[inline]
    pub(crate) fn insert_take_bundle(&mut self, bundle_id: BundleID, archetype_id: Option<ArchetypeID>) {
        self.take_bundle.insert(bundle_id as usize, archetype_id);
    }
}

/// An entity's membership record inside an archetype.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchetypeEntity {
    entity: Entity,
    table_row: TableRow,
}

impl ArchetypeEntity {
    /// The entity stored in this row.
    #[inline] pub fn entity(&self) -> Entity { self.entity }
    /// Row of the entity in the archetype's table.
    #[inline] pub fn table_row(&self) -> TableRow { self.table_row }
}

/// Outcome of [`Archetype::swap_remove`].
pub(crate) struct ArchetypeSwapRemoveResult {
    pub(crate) swapped_entity: Option<Entity>,
    pub(crate) table_row: TableRow,
}

/// A unique set of components and the entities that have exactly that set.

#[derive(Debug)]
pub struct Archetype {
    id: ArchetypeID,
    table_id: TableID,
    table_components: Box<[ComponentID]>,
    sparse_set_components: Box<[ComponentID]>,
    entities: Vec<ArchetypeEntity>,
    edges: Edges,
}

impl Archetype {
    fn new(id: ArchetypeID, table_id: TableID, table_components: Box<[ComponentID]>, sparse_set_components: Box<[ComponentID]>) -> Self {
        Self { id, table_id, table_components, sparse_set_components, entities: Vec::new(), edges: Edges::default() }
    }

    /// Id of this archetype.
    #[inline] pub fn id(&self) -> ArchetypeID { self.id }
    /// Table holding this archetype's table components.
    #[inline] pub fn table_id(&self) -> TableID { self.table_id }
    /// Entities in archetype-row order.
    #[inline] pub fn entities(&self) -> &[ArchetypeEntity] { &self.entities }
    /// Number of entities in this archetype.
    #[inline] pub fn len(&self) -> usize { self.entities.len() }
    /// Returns `true` if no entity is in this archetype.
    #[inline] pub fn is_empty(&self) -> bool { self.entities.is_empty() }
    /// Sorted ids of the table-stored components.
    #[inline] pub fn table_components(&self) -> &[ComponentID] { &self.table_components }
    /// Sorted ids of the sparse-set components.
    #[inline] pub fn sparse_set_components(&self) -> &[ComponentID] { &self.sparse_set_components }
    /// Cached transitions to neighbouring archetypes.
    #[inline] pub fn edges(&self) -> &Edges { &self.edges }
    #[inline] pub(crate) fn edges_mut(&mut self) -> &mut Edges { &mut self.edges }

    /// Every component id of the archetype: table components first, then sparse ones.
    pub fn components(&self) -> impl Iterator<Item = ComponentID> + '_ {
        self.table_components.iter().chain(self.sparse_set_components.iter()).copied()
    }

    /// Number of components.
    #[inline]
    pub fn component_count(&self) -> usize {
        self.table_components.len() + self.sparse_set_components.len()
    }

    /// Where `component_id` is stored, or `None` if the archetype lacks it.
    pub fn get_storage_type(&self, component_id: ComponentID) -> Option<StorageType> {
        if self.table_components.binary_search(&component_id).is_ok() {
            Some(StorageType::Table)
        } else if self.sparse_set_components.binary_search(&component_id).is_ok() {
            Some(StorageType::SparseSet)
        } else {
            None
        }
    }

    /// Returns `true` if the archetype has `component_id`, in either storage.
    #[inline]
    pub fn contains(&self, component_id: ComponentID) -> bool {
        self.get_storage_type(component_id).is_some()
    }

    /// Registers `entity` at `table_row` and returns its full location.
    pub(crate) fn allocate(&mut self, entity: Entity, table_row: TableRow) -> EntityLocation {
        let archetype_row = self.entities.len() as ArchetypeRow;
        self.entities.push(ArchetypeEntity { entity, table_row });
        EntityLocation { archetype_id: self.id, archetype_row, table_id: self.table_id, table_row }
    }

    pub(crate) fn reserve(&mut self, additional: usize) {
        self.entities.reserve(additional);
    }

    /// Removes `row`; the last entity (if different) moves into it.
    pub(crate) fn swap_remove(&mut self, row: ArchetypeRow) -> ArchetypeSwapRemoveResult {
        let row = row as usize;
        let is_last = row == self.entities.len() - 1;
        let removed = self.entities.swap_remove(row);
        ArchetypeSwapRemoveResult {
            swapped_entity: (!is_last).then(|| self.entities[row].entity),
            table_row: removed.table_row,
        }
    }

    /// Records that the entity at `row` now lives at `table_row`.
    #[inline]
    pub(crate) fn set_entity_table_row(&mut self, row: ArchetypeRow, table_row: TableRow) {
        self.entities[row as usize].table_row = table_row;
    }

    pub(crate) fn clear_entities(&mut self) {
        self.entities.clear();
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ArchetypeComponents {
    table_id: TableID,
    sparse_set_components: Box<[ComponentID]>,
}

/// Every archetype of a world.

#[derive(Debug)]
pub struct Archetypes {
    archetypes: Vec<Archetype>,
    archetype_ids: HashMap<ArchetypeComponents, ArchetypeID>,
}

impl Default for Archetypes {
    fn default() -> Self {
        let mut archetypes = Self { archetypes: Vec::new(), archetype_ids: HashMap::new() };
        archetypes.get_id_or_insert(EMPTY_TABLE, Vec::new(), Vec::new());
        archetypes
    }
}

impl Archetypes {
    /// Creates the collection with only the empty archetype.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of archetypes, including the empty one.
    #[inline] pub fn len(&self) -> usize { self.archetypes.len() }
    /// Always `false` once constructed, since the empty archetype exists.
    #[inline] pub fn is_empty(&self) -> bool { self.archetypes.is_empty() }

    /// Returns the archetype with `id`, if it exists.
    #[inline]
    pub fn get(&self, id: ArchetypeID) -> Option<&Archetype> {
        self.archetypes.get(id as usize)
    }

    /// The component-less archetype.
    #[inline]
    pub fn empty(&self) -> &Archetype {
        &self.archetypes[EMPTY_ARCHETYPE as usize]
    }

    #[inline]
    pub(crate) fn empty_mut(&mut self) -> &mut Archetype {
        &mut self.archetypes[EMPTY_ARCHETYPE as usize]
    }

    /// Iterates over every archetype in id order.
    pub fn iter(&self) -> std::slice::Iter<'_, Archetype> {
        self.archetypes.iter()
    }

    /// Returns the archetype for the given component sets, creating it if needed.
    ///
    /// ## Behavior
    /// Component lists are canonicalised (sorted, deduplicated). The archetype
    /// is identified by its table and its sparse set components, since the
    /// table already determines the table components.

    pub(crate) fn get_id_or_insert(
        &mut self,
        table_id: TableID,
        mut table_components: Vec<ComponentID>,
        mut sparse_set_components: Vec<ComponentID>,
    ) -> ArchetypeID {
        table_components.sort_unstable();
        table_components.dedup();
        sparse_set_components.sort_unstable();
        sparse_set_components.dedup();

        let key = ArchetypeComponents {
            table_id,
            sparse_set_components: sparse_set_components.into_boxed_slice(),
        };
        if let Some(&id) = self.archetype_ids.get(&key) {
            return id;
        }

        let id = ArchetypeID::try_from(self.archetypes.len()).unwrap_or_else(|_| panic!("exceeded the archetype id space"));
        log::debug!(
            "created archetype {id} on table {table_id} (table components {table_components:?}, sparse components {:?})",
            key.sparse_set_components
        );
        self.archetypes.push(Archetype::new(
            id,
            table_id,
            table_components.into_boxed_slice(),
            key.sparse_set_components.clone(),
        ));
        self.archetype_ids.insert(key, id);
        id
    }

    pub(crate) fn clear_entities(&mut self) {
        for archetype in &mut self.archetypes {
            archetype.clear_entities();
        }
    }
}

impl Index<ArchetypeID> for Archetypes {
    type Output = Archetype;

    #[inline]
    fn index(&self, index: ArchetypeID) -> &Self::Output {
        &self.archetypes[index as usize]
    }
}

impl IndexMut<ArchetypeID> for Archetypes {
    #[inline]
    fn index_mut(&mut self, index: ArchetypeID) -> &mut Self::Output {
        &mut self.archetypes[index as usize]
    }
}
