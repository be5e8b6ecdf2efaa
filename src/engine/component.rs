//! # Component Registry
//!
//! This module assigns compact `ComponentID` values to Rust component and
//! resource types and records the metadata the storage layers need to build
//! columns for them.
//!
//! ## Purpose
//! The registry decouples component type information (`TypeId`, name, size,
//! alignment, storage kind) from runtime storage, so tables and sparse sets can
//! hold heterogeneous columns behind `TypeErasedColumn`.
//!
//! ## Design
//! - The registry is owned by a world, not global. Two worlds may assign
//!   different ids to the same type.
//! - Each entry carries a factory function that builds an empty column for the
//!   type. This is the only place the engine learns how to store a type.
//! - Components and resources share one id counter but are looked up through
//!   separate `TypeId` maps, so a type may be both without collision.
//! - Registering a sparse-set component eagerly creates its sparse set.
//!
//! ## Invariants
//! - `ComponentID` values are dense, unique and stable for the lifetime of the world.
//! - `infos[id].id() == id` for every registered id.

use std::{
    any::{type_name, TypeId},
    collections::HashMap,
    mem::{align_of, size_of},
};

use crate::engine::storage::{Column, Storages, TypeErasedColumn};
use crate::engine::types::ComponentID;


/// Data that can be attached to an entity.
///
/// ## Storage
/// `STORAGE_TYPE` selects where values live. Table storage (the default) is
/// dense and fast to iterate; sparse-set storage is cheap to add and remove
/// because it does not move the entity between tables.

pub trait Component: Send + Sync + 'static {
    /// Where values of this component are stored.
    const STORAGE_TYPE: StorageType = StorageType::Table;
}

/// Singleton data stored once per world.
pub trait Resource: Send + Sync + 'static {}

/// Physical storage kind of a component.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StorageType {
    /// Column in the entity's table. Adding or removing moves the entity's row.
    #[default]
    Table,
    /// Per-component sparse set keyed by entity index.
    SparseSet,
}

/// Factory function for constructing an empty type-erased column.
type FactoryFn = fn() -> Box<dyn TypeErasedColumn>;

fn new_column<T: Send + Sync + 'static>() -> Box<dyn TypeErasedColumn> {
    Box::new(Column::<T>::new())
}

/// Describes a component or resource type before it is registered.
///
/// ## Fields
/// - `name`: The Rust type name (`type_name::<T>()`).
/// - `type_id`: The runtime `TypeId`.
/// - `storage_type`: Where values live.
/// - `is_resource`: Whether this is a resource rather than a component.
/// - `size` / `align`: Layout of the type in bytes.

#[derive(Clone, Copy, Debug)]
pub struct ComponentDescriptor {
    name: &'static str,
    type_id: TypeId,
    storage_type: StorageType,
    is_resource: bool,
    size: usize,
    align: usize,
    factory: FactoryFn,
}

impl ComponentDescriptor {
    /// Descriptor for component type `T`.
    pub fn new<T: Component>() -> Self {
        Self::of::<T>(T::STORAGE_TYPE, false)
    }

    /// Descriptor for resource type `R`.
    pub fn new_resource<R: Resource>() -> Self {
        Self::of::<R>(StorageType::Table, true)
    }

    fn of<T: Send + Sync + 'static>(storage_type: StorageType, is_resource: bool) -> Self {
        Self {
            name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            storage_type,
            is_resource,
            size: size_of::<T>(),
            align: align_of::<T>(),
            factory: new_column::<T>,
        }
    }

    /// Rust type name.
    #[inline] pub fn name(&self) -> &'static str { self.name }
    /// Runtime `TypeId`.
    #[inline] pub fn type_id(&self) -> TypeId { self.type_id }
    /// Where values live.
    #[inline] pub fn storage_type(&self) -> StorageType { self.storage_type }
    /// Returns `true` for resources.
    #[inline] pub fn is_resource(&self) -> bool { self.is_resource }
    /// Size of the type in bytes.
    #[inline] pub fn size(&self) -> usize { self.size }
    /// Alignment of the type in bytes.
    #[inline] pub fn align(&self) -> usize { self.align }

    /// Builds an empty column for this type.
    #[inline]
    pub fn new_column(&self) -> Box<dyn TypeErasedColumn> {
        (self.factory)()
    }
}

/// A registered component or resource.

#[derive(Clone, Debug)]
pub struct ComponentInfo {
    id: ComponentID,
    descriptor: ComponentDescriptor,
}

impl ComponentInfo {
    /// Id assigned at registration.
    #[inline] pub fn id(&self) -> ComponentID { self.id }
    /// Descriptor the id was registered from.
    #[inline] pub fn descriptor(&self) -> &ComponentDescriptor { &self.descriptor }
    /// Rust type name.
    #[inline] pub fn name(&self) -> &'static str { self.descriptor.name }
    /// Runtime `TypeId`.
    #[inline] pub fn type_id(&self) -> TypeId { self.descriptor.type_id }
    /// Where values live.
    #[inline] pub fn storage_type(&self) -> StorageType { self.descriptor.storage_type }
    /// Returns `true` for resources.
    #[inline] pub fn is_resource(&self) -> bool { self.descriptor.is_resource }
    /// Size of the type in bytes.
    #[inline] pub fn size(&self) -> usize { self.descriptor.size }
    /// Alignment of the type in bytes.
    #[inline] pub fn align(&self) -> usize { self.descriptor.align }
}

impl std::fmt::Display for ComponentInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ComponentInfo {{ id: {}, name: {}, storage: {:?}, size: {}, align: {} }}",
            self.id, self.descriptor.name, self.descriptor.storage_type, self.descriptor.size, self.descriptor.align
        )
    }
}

/// Per-world mapping between Rust types and `ComponentID` values.
///
/// ## Design
/// - `infos` is an arena indexed by `ComponentID`.
/// - `indices` maps component `TypeId`s to ids.
/// - `resource_indices` maps resource `TypeId`s to ids.

#[derive(Debug, Default)]
pub struct ComponentRegistry {
    infos: Vec<ComponentInfo>,
    indices: HashMap<TypeId, ComponentID>,
    resource_indices: HashMap<TypeId, ComponentID>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers component type `T` and returns its id.
    ///
    /// ## Behavior
    /// - Idempotent: a registered type returns its existing id.
    /// - A new sparse-set component gets its (empty) sparse set immediately.
    ///
    /// ## Panics
    /// Panics if the id space is exhausted.

    pub fn register_component<T: Component>(&mut self, storages: &mut Storages) -> ComponentID {
        self.register_component_with_descriptor(ComponentDescriptor::new::<T>(), storages)
    }

    /// Registers a component from an explicit descriptor.
    pub fn register_component_with_descriptor(
        &mut self,
        descriptor: ComponentDescriptor,
        storages: &mut Storages,
    ) -> ComponentID {
        if let Some(&existing) = self.indices.get(&descriptor.type_id) {
            return existing;
        }

        let id = self.push_info(descriptor);
        self.indices.insert(descriptor.type_id, id);
        if descriptor.storage_type == StorageType::SparseSet {
            storages.sparse_sets.get_or_insert(&self.infos[id as usize]);
        }
        id
    }

    /// Registers resource type `R` and returns its id. Idempotent.
    pub fn register_resource<R: Resource>(&mut self) -> ComponentID {
        let descriptor = ComponentDescriptor::new_resource::<R>();
        if let Some(&existing) = self.resource_indices.get(&descriptor.type_id) {
            return existing;
        }

        let id = self.push_info(descriptor);
        self.resource_indices.insert(descriptor.type_id, id);
        id
    }

    fn push_info(&mut self, descriptor: ComponentDescriptor) -> ComponentID {
        let id = ComponentID::try_from(self.infos.len())
            .unwrap_or_else(|_| panic!("exceeded the component id space registering {}", descriptor.name));
        self.infos.push(ComponentInfo { id, descriptor });
        id
    }

    /// Returns metadata for a registered id.
    #[inline]
    pub fn get_info(&self, id: ComponentID) -> Option<&ComponentInfo> {
        self.infos.get(id as usize)
    }

    /// Metadata of an id this registry handed out.
    ///
    /// ## Panics
    /// Panics if `id` was not issued by this registry.

    #[inline]
    pub(crate) fn info(&self, id: ComponentID) -> &ComponentInfo {
        &self.infos[id as usize]
    }

    /// Returns the component id registered for `type_id`, if any.
    #[inline]
    pub fn get_id(&self, type_id: TypeId) -> Option<ComponentID> {
        self.indices.get(&type_id).copied()
    }

    /// Returns the component id of `T`, if registered.
    #[inline]
    pub fn component_id<T: Component>(&self) -> Option<ComponentID> {
        self.get_id(TypeId::of::<T>())
    }

    /// Returns the resource id registered for `type_id`, if any.
    #[inline]
    pub fn get_resource_id(&self, type_id: TypeId) -> Option<ComponentID> {
        self.resource_indices.get(&type_id).copied()
    }

    /// Returns the resource id of `R`, if registered.
    #[inline]
    pub fn resource_id<R: Resource>(&self) -> Option<ComponentID> {
        self.get_resource_id(TypeId::of::<R>())
    }

    /// Storage kind of a registered component.
    #[inline]
    pub fn storage_type(&self, id: ComponentID) -> Option<StorageType> {
        self.get_info(id).map(ComponentInfo::storage_type)
    }

    /// Number of registered components and resources.
    #[inline] pub fn len(&self) -> usize { self.infos.len() }
    /// Returns `true` if nothing has been registered.
    #[inline] pub fn is_empty(&self) -> bool { self.infos.is_empty() }

    /// Iterates over every registered component and resource.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> + '_ {
        self.infos.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    impl Component for Position {}

    struct Marker;
    impl Component for Marker {
        const STORAGE_TYPE: StorageType = StorageType::SparseSet;
    }

    #[derive(Default)]
    struct Clock;
    impl Resource for Clock {}
    impl Component for Clock {}

    #[test]
    fn registration_is_idempotent_and_dense() {
        let mut storages = Storages::default();
        let mut registry = ComponentRegistry::new();
        let position = registry.register_component::<Position>(&mut storages);
        let marker = registry.register_component::<Marker>(&mut storages);
        assert_eq!((position, marker), (0, 1));
        assert_eq!(registry.register_component::<Position>(&mut storages), position);
        assert_eq!(registry.component_id::<Marker>(), Some(marker));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn sparse_components_get_their_set_on_registration() {
        let mut storages = Storages::default();
        let mut registry = ComponentRegistry::new();
        let position = registry.register_component::<Position>(&mut storages);
        let marker = registry.register_component::<Marker>(&mut storages);
        assert!(storages.sparse_sets.get(marker).is_some());
        assert!(storages.sparse_sets.get(position).is_none());
        assert_eq!(registry.storage_type(marker), Some(StorageType::SparseSet));
    }

    #[test]
    fn resources_share_the_counter_but_not_the_namespace() {
        let mut storages = Storages::default();
        let mut registry = ComponentRegistry::new();
        let as_component = registry.register_component::<Clock>(&mut storages);
        let as_resource = registry.register_resource::<Clock>();
        assert_ne!(as_component, as_resource);
        assert!(registry.get_info(as_resource).unwrap().is_resource());
        assert!(!registry.get_info(as_component).unwrap().is_resource());
        assert_eq!(registry.resource_id::<Clock>(), Some(as_resource));
        assert_eq!(registry.component_id::<Clock>(), Some(as_component));
    }

    #[test]
    fn descriptor_builds_matching_columns() {
        let descriptor = ComponentDescriptor::new::<Position>();
        let column = descriptor.new_column();
        assert_eq!(column.element_type_id(), TypeId::of::<Position>());
        assert_eq!(descriptor.size(), 0);
    }
}
