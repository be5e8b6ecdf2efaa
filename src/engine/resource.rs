//! Resource storage.
//!
//! Resources are world-unique singletons. Each registered resource id owns a
//! [`ResourceData`] slot that is either empty or holds exactly one boxed value
//! along with its added/changed ticks. The slot outlives removals so a
//! resource may be inserted again later under the same id.

use std::any::{type_name, Any};

use crate::engine::change_detection::{ComponentTicks, Tick};
use crate::engine::component::ComponentInfo;
use crate::engine::sparse_set::SparseArray;
use crate::engine::types::ComponentID;


/// Storage slot for one resource type.

pub struct ResourceData {
    name: &'static str,
    value: Option<Box<dyn Any + Send + Sync>>,
    ticks: ComponentTicks,
}

impl ResourceData {
    fn new(name: &'static str) -> Self {
        Self { name, value: None, ticks: ComponentTicks::default() }
    }

    /// Rust type name of the resource.
    #[inline] pub fn name(&self) -> &'static str { self.name }
    /// Returns `true` if the slot currently holds a value.
    #[inline] pub fn is_present(&self) -> bool { self.value.is_some() }

    /// Ticks of the stored value, if any.
    #[inline]
    pub fn get_ticks(&self) -> Option<ComponentTicks> {
        self.value.as_ref().map(|_| self.ticks)
    }

    /// Returns the value if present and of type `R`.
    pub fn get<R: 'static>(&self) -> Option<&R> {
        self.value.as_ref()?.downcast_ref::<R>()
    }

    /// Returns the value and its ticks if present and of type `R`.
    pub fn get_with_ticks<R: 'static>(&self) -> Option<(&R, &ComponentTicks)> {
        Some((self.value.as_ref()?.downcast_ref::<R>()?, &self.ticks))
    }

    /// Mutable value and ticks if present and of type `R`. Does not stamp.
    pub fn get_mut_with_ticks<R: 'static>(&mut self) -> Option<(&mut R, &mut ComponentTicks)> {
        Some((self.value.as_mut()?.downcast_mut::<R>()?, &mut self.ticks))
    }

    /// Stores `value`.
    ///
    /// ## Behavior
    /// The changed tick is always stamped; the added tick only if the slot was empty.

    pub fn insert(&mut self, value: Box<dyn Any + Send + Sync>, change_tick: Tick) {
        if self.value.replace(value).is_none() {
            self.ticks.added = change_tick;
        }
        self.ticks.changed = change_tick;
    }

    /// Empties the slot, returning the value and its ticks.
    pub fn remove(&mut self) -> Option<(Box<dyn Any + Send + Sync>, ComponentTicks)> {
        self.value.take().map(|value| (value, self.ticks))
    }

    pub(crate) fn check_change_ticks(&mut self, change_tick: Tick) {
        self.ticks.check_ticks(change_tick);
    }
}

impl std::fmt::Debug for ResourceData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceData")
            .field("name", &self.name)
            .field("present", &self.is_present())
            .field("ticks", &self.ticks)
            .finish()
    }
}

/// Every resource slot of a world, keyed by resource id.

#[derive(Default, Debug)]
pub struct Resources {
    resources: SparseArray<ResourceData>,
}

impl Resources {
    /// Returns the slot for `info`, creating an empty one if needed.
    pub fn initialize(&mut self, info: &ComponentInfo) -> &mut ResourceData {
        debug_assert!(info.is_resource(), "{} is not registered as a resource", info.name());
        self.resources.get_or_insert_with(info.id() as usize, || ResourceData::new(info.name()))
    }

    /// Returns the slot for `id`, if it has been initialised.
    #[inline]
    pub fn get(&self, id: ComponentID) -> Option<&ResourceData> {
        self.resources.get(id as usize)
    }

    /// Mutable slot for `id`, if it has been initialised.
    #[inline]
    pub fn get_mut(&mut self, id: ComponentID) -> Option<&mut ResourceData> {
        self.resources.get_mut(id as usize)
    }

    /// Number of resources currently holding a value.
    pub fn len(&self) -> usize {
        self.resources.iter().filter(|(_, data)| data.is_present()).count()
    }

    /// Returns `true` if no slot has been initialised.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over every slot with its id.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentID, &ResourceData)> + '_ {
        self.resources.iter().map(|(id, data)| (id as ComponentID, data))
    }

    pub(crate) fn check_change_ticks(&mut self, change_tick: Tick) {
        for data in self.resources.values_mut() {
            data.check_change_ticks(change_tick);
        }
    }
}

/// Downcasts a removed resource value.
///
/// ## Panics
/// Panics if the slot held a different type, which means the id map is corrupt.

pub(crate) fn downcast_resource<R: 'static>(value: Box<dyn Any + Send + Sync>) -> R {
    match value.downcast::<R>() {
        Ok(value) => *value,
        Err(_) => panic!("ECS corruption detected: resource slot does not hold a {}", type_name::<R>()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::component::{ComponentRegistry, Resource};

    struct Score(u32);
    impl Resource for Score {}

    fn score_slot() -> (Resources, ComponentID) {
        let mut registry = ComponentRegistry::new();
        let id = registry.register_resource::<Score>();
        let mut resources = Resources::default();
        resources.initialize(registry.get_info(id).unwrap());
        (resources, id)
    }

    #[test]
    fn insert_stamps_added_only_when_absent() {
        let (mut resources, id) = score_slot();
        let data = resources.get_mut(id).unwrap();
        data.insert(Box::new(Score(1)), Tick::new(3));
        data.insert(Box::new(Score(2)), Tick::new(8));

        let (score, ticks) = data.get_with_ticks::<Score>().unwrap();
        assert_eq!(score.0, 2);
        assert_eq!((ticks.added, ticks.changed), (Tick::new(3), Tick::new(8)));
    }

    #[test]
    fn removal_keeps_the_slot() {
        let (mut resources, id) = score_slot();
        let data = resources.get_mut(id).unwrap();
        data.insert(Box::new(Score(1)), Tick::new(1));
        let (value, _) = data.remove().unwrap();
        assert_eq!(downcast_resource::<Score>(value).0, 1);
        assert!(data.remove().is_none());
        assert!(resources.get(id).is_some());
        assert!(resources.is_empty());

        resources.get_mut(id).unwrap().insert(Box::new(Score(4)), Tick::new(9));
        assert_eq!(resources.get(id).unwrap().get_ticks().unwrap().added, Tick::new(9));
    }
}
