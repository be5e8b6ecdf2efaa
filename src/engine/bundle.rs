//! Bundles: statically typed groups of components inserted or removed together.
//!
//! A [`Bundle`] is any single [`Component`] or a tuple of bundles. On first use
//! a bundle type is registered in [`Bundles`], which records its ordered
//! component ids and their storage kinds in a [`BundleInfo`].
//!
//! `BundleInfo` is also where archetype transitions are computed: given a
//! source archetype it finds (and caches on the source's edges) the archetype
//! reached by inserting, removing or taking the bundle.
//!
//! ## Invariants
//! - A bundle never lists the same component twice.
//! - `component_ids[i]` and `storage_types[i]` describe the `i`-th value that
//!   [`Bundle::get_components`] yields.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

use crate::engine::archetype::{Archetypes, ComponentStatus};
use crate::engine::change_detection::Tick;
use crate::engine::component::{Component, ComponentRegistry, StorageType};
use crate::engine::entity::Entity;
use crate::engine::sparse_set::SparseSets;
use crate::engine::storage::Storages;
use crate::engine::table::Table;
use crate::engine::types::{ArchetypeID, BundleID, ComponentID, TableRow};


/// A statically known set of components.
///
/// Implemented for every [`Component`] and for tuples of up to twelve bundles.

pub trait Bundle: Send + Sync + 'static {
    /// Registers every component of the bundle and reports their ids in order.
    fn component_ids(components: &mut ComponentRegistry, storages: &mut Storages, ids: &mut impl FnMut(ComponentID, StorageType));

    /// Yields each component value, boxed, in the order of [`Bundle::component_ids`].
    fn get_components(self, func: &mut impl FnMut(Box<dyn Any + Send>));

    /// Rebuilds the bundle from boxed values yielded in component order.
    fn from_components(func: &mut impl FnMut() -> Box<dyn Any + Send>) -> Self
    where
        Self: Sized;
}

impl<C: Component> Bundle for C {
    fn component_ids(components: &mut ComponentRegistry, storages: &mut Storages, ids: &mut impl FnMut(ComponentID, StorageType)) {
        ids(components.register_component::<C>(storages), C::STORAGE_TYPE);
    }

    #[inline]
    fn get_components(self, func: &mut impl FnMut(Box<dyn Any + Send>)) {
        func(Box::new(self));
    }

    fn from_components(func: &mut impl FnMut() -> Box<dyn Any + Send>) -> Self {
        match func().downcast::<C>() {
            Ok(value) => *value,
            Err(_) => panic!("ECS corruption detected: bundle value is not a {}", type_name::<C>()),
        }
    }
}

macro_rules! tuple_impl {
    ($($name: ident),*) => {
        impl<$($name: Bundle),*> Bundle for ($($name,)*) {
            #[allow(unused_variables)]
            fn component_ids(components: &mut ComponentRegistry, storages: &mut Storages, ids: &mut impl FnMut(ComponentID, StorageType)) {
                $(<$name as Bundle>::component_ids(components, storages, ids);)*
            }

            #[allow(unused_variables, non_snake_case)]
            fn get_components(self, func: &mut impl FnMut(Box<dyn Any + Send>)) {
                let ($($name,)*) = self;
                $($name.get_components(func);)*
            }

            #[allow(unused_variables)]
            fn from_components(func: &mut impl FnMut() -> Box<dyn Any + Send>) -> Self {
                ($(<$name as Bundle>::from_components(func),)*)
            }
        }
    }
}

tuple_impl!();
tuple_impl!(B0);
tuple_impl!(B0, B1);
tuple_impl!(B0, B1, B2);
tuple_impl!(B0, B1, B2, B3);
tuple_impl!(B0, B1, B2, B3, B4);
tuple_impl!(B0, B1, B2, B3, B4, B5);
tuple_impl!(B0, B1, B2, B3, B4, B5, B6);
tuple_impl!(B0, B1, B2, B3, B4, B5, B6, B7);
tuple_impl!(B0, B1, B2, B3, B4, B5, B6, B7, B8);
tuple_impl!(B0, B1, B2, B3, B4, B5, B6, B7, B8, B9);
tuple_impl!(B0, B1, B2, B3, B4, B5, B6, B7, B8, B9, B10);
tuple_impl!(B0, B1, B2, B3, B4, B5, B6, B7, B8, B9, B10, B11);

/// Registered metadata of one bundle type.

#[derive(Debug)]
pub struct BundleInfo {
    id: BundleID,
    component_ids: Vec<ComponentID>,
    storage_types: Vec<StorageType>,
}

impl BundleInfo {
    /// Id of this bundle.
    #[inline] pub fn id(&self) -> BundleID { self.id }
    /// Component ids in the bundle's declaration order.
    #[inline] pub fn components(&self) -> &[ComponentID] { &self.component_ids }
    /// Storage kind of each component, parallel to [`components`](Self::components).
    #[inline] pub fn storage_types(&self) -> &[StorageType] { &self.storage_types }

    /// Writes `bundle` into the entity's table row and sparse sets.
    ///
    /// ## Behavior
    /// With `bundle_status == None` every component is treated as newly added.
    /// `Added` values initialise their (uninitialised) row; `Existing` values
    /// overwrite it and stamp only the changed tick. Sparse-set values are
    /// inserted or overwritten by entity.
    ///
    /// ## Panics
    /// Panics on a column error, which means the archetype graph and the
    /// storages disagree.

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn write_components<B: Bundle>(
        &self,
        table: &mut Table,
        sparse_sets: &mut SparseSets,
        bundle_status: Option<&[ComponentStatus]>,
        entity: Entity,
        table_row: TableRow,
        change_tick: Tick,
        bundle: B,
    ) {
        let mut bundle_component = 0;
        bundle.get_components(&mut |value| {
            let component_id = self.component_ids[bundle_component];
            let status = bundle_status.map_or(ComponentStatus::Added, |status| status[bundle_component]);
            let result = match self.storage_types[bundle_component] {
                StorageType::Table => {
                    let Some(column) = table.get_column_mut(component_id) else {
                        panic!("ECS corruption detected: table has no column for component {component_id}");
                    };
                    match status {
                        ComponentStatus::Added => column.initialize_dyn(table_row as usize, value, change_tick),
                        ComponentStatus::Existing => column.replace_dyn(table_row as usize, value, change_tick),
                    }
                }
                StorageType::SparseSet => {
                    let Some(set) = sparse_sets.get_mut(component_id) else {
                        panic!("ECS corruption detected: no sparse set for component {component_id}");
                    };
                    set.insert_dyn(entity, value, change_tick)
                }
            };
            if let Err(e) = result {
                debug_assert!(false, "bundle write failed: {e}");
                panic!("ECS corruption detected: {e}");
            }
            bundle_component += 1;
        });
    }

    /// Returns the archetype reached by inserting this bundle into `archetype_id`.
    ///
    /// ## Behavior
    /// The result and the per-component [`ComponentStatus`] list are cached on
    /// the source archetype's edges. If every bundle component is already
    /// present the destination is the source itself.

    pub(crate) fn add_bundle_to_archetype(
        &self,
        archetypes: &mut Archetypes,
        storages: &mut Storages,
        components: &ComponentRegistry,
        archetype_id: ArchetypeID,
    ) -> ArchetypeID {
        if let Some(add_bundle) = archetypes[archetype_id].edges().get_add_bundle(self.id) {
            return add_bundle;
        }

        let current = &archetypes[archetype_id];
        let mut new_table_components = Vec::new();
        let mut new_sparse_set_components = Vec::new();
        let mut bundle_status = Vec::with_capacity(self.component_ids.len());

        for (&component_id, &storage_type) in self.component_ids.iter().zip(&self.storage_types) {
            if current.contains(component_id) {
                bundle_status.push(ComponentStatus::Existing);
            } else {
                bundle_status.push(ComponentStatus::Added);
                match storage_type {
                    StorageType::Table => new_table_components.push(component_id),
                    StorageType::SparseSet => new_sparse_set_components.push(component_id),
                }
            }
        }

        let new_archetype_id = if new_table_components.is_empty() && new_sparse_set_components.is_empty() {
            archetype_id
        } else {
            let (table_id, table_components) = if new_table_components.is_empty() {
                (current.table_id(), current.table_components().to_vec())
            } else {
                new_table_components.extend_from_slice(current.table_components());
                new_table_components.sort_unstable();
                let table_id = storages.tables.get_id_or_insert(&new_table_components, components);
                (table_id, new_table_components)
            };

            new_sparse_set_components.extend_from_slice(current.sparse_set_components());
            archetypes.get_id_or_insert(table_id, table_components, new_sparse_set_components)
        };

        archetypes[archetype_id].edges_mut().insert_add_bundle(self.id, new_archetype_id, bundle_status);
        new_archetype_id
    }

    /// Returns the archetype reached by removing this bundle from `archetype_id`.
    ///
    /// ## Behavior
    /// - `intersection == true` (remove): components the source lacks are
    ///   ignored; always returns `Some`.
    /// - `intersection == false` (take): returns `None` if the source lacks any
    ///   bundle component.
    ///
    /// Results, negative ones included, are cached on the source's edges.

    pub(crate) fn remove_bundle_from_archetype(
        &self,
        archetypes: &mut Archetypes,
        storages: &mut Storages,
        components: &ComponentRegistry,
        archetype_id: ArchetypeID,
        intersection: bool,
    ) -> Option<ArchetypeID> {
        let edges = archetypes[archetype_id].edges();
        if intersection {
            if let Some(cached) = edges.get_remove_bundle(self.id) {
                return Some(cached);
            }
        } else if let Some(cached) = edges.get_take_bundle(self.id) {
            return cached;
        }

        let current = &archetypes[archetype_id];
        let mut removed_table_components = Vec::new();
        let mut removed_sparse_set_components = Vec::new();
        for (&component_id, &storage_type) in self.component_ids.iter().zip(&self.storage_types) {
            if current.contains(component_id) {
                match storage_type {
                    StorageType::Table => removed_table_components.push(component_id),
                    StorageType::SparseSet => removed_sparse_set_components.push(component_id),
                }
            } else if !intersection {
                archetypes[archetype_id].edges_mut().insert_take_bundle(self.id, None);
                return None;
            }
        }

        let new_archetype_id = if removed_table_components.is_empty() && removed_sparse_set_components.is_empty() {
            archetype_id
        } else {
            removed_table_components.sort_unstable();
            removed_sparse_set_components.sort_unstable();

            let next_table_components: Vec<ComponentID> = current
                .table_components()
                .iter()
                .copied()
                .filter(|id| removed_table_components.binary_search(id).is_err())
                .collect();
            let next_sparse_set_components: Vec<ComponentID> = current
                .sparse_set_components()
                .iter()
                .copied()
                .filter(|id| removed_sparse_set_components.binary_search(id).is_err())
                .collect();

            let next_table_id = if removed_table_components.is_empty() {
                current.table_id()
            } else {
                storages.tables.get_id_or_insert(&next_table_components, components)
            };
            archetypes.get_id_or_insert(next_table_id, next_table_components, next_sparse_set_components)
        };

        let edges = archetypes[archetype_id].edges_mut();
        if intersection {
            edges.insert_remove_bundle(self.id, new_archetype_id);
        } else {
            edges.insert_take_bundle(self.id, Some(new_archetype_id));
        }
        Some(new_archetype_id)
    }
}

/// Registry of every bundle type used with a world.

#[derive(Debug, Default)]
pub struct Bundles {
    bundle_infos: Vec<BundleInfo>,
    bundle_ids: HashMap<TypeId, BundleID>,
}

impl Bundles {
    /// Returns the bundle registered under `id`.
    #[inline]
    pub fn get(&self, id: BundleID) -> Option<&BundleInfo> {
        self.bundle_infos.get(id as usize)
    }

    /// Returns the id of the bundle type with `type_id`, if registered.
    #[inline]
    pub fn get_id(&self, type_id: TypeId) -> Option<BundleID> {
        self.bundle_ids.get(&type_id).copied()
    }

    /// Number of registered bundles.
    #[inline] pub fn len(&self) -> usize { self.bundle_infos.len() }
    /// Returns `true` if no bundle has been registered.
    #[inline] pub fn is_empty(&self) -> bool { self.bundle_infos.is_empty() }

    /// Returns the info for bundle type `B`, registering it (and its components) on first use.
    ///
    /// ## Panics
    /// Panics if `B` lists the same component more than once.

    pub fn init_info<B: Bundle>(&mut self, components: &mut ComponentRegistry, storages: &mut Storages) -> &BundleInfo {
        let next_id = self.bundle_infos.len();
        let id = *self.bundle_ids.entry(TypeId::of::<B>()).or_insert_with(|| {
            let mut component_ids = Vec::new();
            let mut storage_types = Vec::new();
            B::component_ids(components, storages, &mut |id, storage_type| {
                component_ids.push(id);
                storage_types.push(storage_type);
            });

            let mut deduped = component_ids.clone();
            deduped.sort_unstable();
            deduped.dedup();
            if deduped.len() != component_ids.len() {
                panic!("bundle {} has duplicate components", type_name::<B>());
            }

            let id = BundleID::try_from(next_id).unwrap_or_else(|_| panic!("exceeded the bundle id space"));
            self.bundle_infos.push(BundleInfo { id, component_ids, storage_types });
            id
        });
        &self.bundle_infos[id as usize]
    }
}
