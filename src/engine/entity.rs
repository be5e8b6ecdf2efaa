//! Entity handles and the generational entity allocator.
//!
//! An [`Entity`] is a lightweight `(index, generation)` handle. The index selects
//! a metadata slot in [`Entities`]; the generation detects stale handles after a
//! slot has been freed and reused.
//!
//! ## Reservation
//!
//! [`Entities::reserve_entity`] hands out ids through a shared reference, using an
//! atomic cursor over the free list:
//!
//! - `free_cursor > 0`: the top `free_cursor` entries of `pending` are free and
//!   not yet reserved.
//! - `free_cursor < 0`: the free list is exhausted and `-free_cursor` brand new
//!   indices beyond `meta.len()` have been reserved.
//!
//! Reserved ids exist as far as [`Entities::contains`] is concerned but have no
//! location until [`Entities::flush`] materialises them. Every other mutator
//! asserts that no flush is pending.
//!
//! ## Invariants
//! - A slot's generation is in `[1, 2^31 - 1]` and only changes on `free`.
//! - `pending[..free_cursor]` are free indices; `pending[free_cursor..]` are
//!   reserved indices awaiting a flush.
//! - `len` counts allocated entities, including flushed reservations.

use std::fmt;
use std::mem;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicIsize, Ordering};

use crate::engine::error::IdentifierError;
use crate::engine::identifier::{masks::{extract_kind, inc_masked_high_by, HIGH_MASK}, IdKind, Identifier};
use crate::engine::types::{
    ArchetypeID, ArchetypeRow, TableID, TableRow,
    INVALID_ARCHETYPE, INVALID_ROW, INVALID_TABLE,
};


type IdCursor = isize;

/// Lightweight identifier of an entity.
///
/// Equality and hashing cover both index and generation, so a handle to a
/// despawned entity never equals a handle to the entity that reused its slot.

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    generation: NonZeroU32,
    index: u32,
}

impl Entity {
    /// A handle that never refers to a live entity.
    ///
    /// Its kind flag is [`IdKind::Placeholder`], which the allocator never
    /// produces, so it cannot compare equal to any allocated handle.
    pub const PLACEHOLDER: Self = Self { generation: NonZeroU32::MAX, index: u32::MAX };

    #[inline]
    pub(crate) const fn from_raw_and_generation(index: u32, generation: NonZeroU32) -> Self {
        Self { generation, index }
    }

    /// Creates a handle for `index` with the first generation.
    #[inline]
    pub const fn from_raw(index: u32) -> Self {
        Self::from_raw_and_generation(index, NonZeroU32::MIN)
    }

    /// Slot index in the allocator.
    #[inline] pub const fn index(self) -> u32 { self.index }
    /// Generation of the slot when this handle was issued.
    #[inline] pub const fn generation(self) -> u32 { self.generation.get() & HIGH_MASK }
    /// Packs the handle into 64 bits: generation high, index low.
    #[inline] pub const fn to_bits(self) -> u64 { ((self.generation.get() as u64) << 32) | self.index as u64 }

    /// Returns `true` for [`Entity::PLACEHOLDER`] and other placeholder-kind values.
    #[inline]
    pub const fn is_placeholder(self) -> bool {
        matches!(extract_kind(self.generation.get()), IdKind::Placeholder)
    }

    /// Decodes a handle produced by [`Entity::to_bits`].
    ///
    /// ## Panics
    /// Panics if the bits do not encode an entity.

    pub const fn from_bits(bits: u64) -> Self {
        match Self::try_from_bits(bits) {
            Ok(entity) => entity,
            Err(_) => panic!("attempted to initialize invalid bits as an entity"),
        }
    }

    /// Fallible counterpart of [`Entity::from_bits`].
    pub const fn try_from_bits(bits: u64) -> Result<Self, IdentifierError> {
        match Identifier::try_from_bits(bits) {
            Ok(id) => match id.kind() {
                IdKind::Entity => match NonZeroU32::new(id.masked_high()) {
                    Some(generation) => Ok(Self::from_raw_and_generation(id.low(), generation)),
                    None => Err(IdentifierError::InvalidIdentifier),
                },
                IdKind::Placeholder => Err(IdentifierError::InvalidEntityId(bits)),
            },
            Err(error) => Err(error),
        }
    }
}

impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_bits().cmp(&other.to_bits())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_placeholder() {
            write!(f, "PLACEHOLDER")
        } else {
            write!(f, "{}v{}", self.index(), self.generation())
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({self})")
    }
}

impl From<Entity> for Identifier {
    fn from(entity: Entity) -> Self {
        match Identifier::try_from_bits(entity.to_bits()) {
            Ok(id) => id,
            Err(_) => unreachable!("entity generations are never zero"),
        }
    }
}

/// Where an entity's data lives.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityLocation {
    /// Archetype the entity belongs to.
    pub archetype_id: ArchetypeID,
    /// Row inside the archetype's entity list.
    pub archetype_row: ArchetypeRow,
    /// Table holding the entity's table-stored components.
    pub table_id: TableID,
    /// Row inside that table.
    pub table_row: TableRow,
}

impl EntityLocation {
    /// Location of an entity that has been reserved or freed but not placed.
    pub const INVALID: Self = Self {
        archetype_id: INVALID_ARCHETYPE,
        archetype_row: INVALID_ROW,
        table_id: INVALID_TABLE,
        table_row: INVALID_ROW,
    };

    /// Returns `true` if the location points at real storage.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.archetype_id != INVALID_ARCHETYPE
    }
}

#[derive(Clone, Copy, Debug)]
struct EntityMeta {
    generation: NonZeroU32,
    location: EntityLocation,
}

impl EntityMeta {
    const EMPTY: Self = Self { generation: NonZeroU32::MIN, location: EntityLocation::INVALID };
}

/// Outcome of [`Entities::alloc_at_without_replacement`].

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocAtWithoutReplacement {
    /// The handle is already live at this location.
    Exists(EntityLocation),
    /// The slot was free and now belongs to the handle.
    DidNotExist,
    /// The slot is live under a different generation; nothing changed.
    ExistsWithWrongGeneration,
}

/// Generational entity allocator and location table.

#[derive(Debug, Default)]
pub struct Entities {
    meta: Vec<EntityMeta>,
    pending: Vec<u32>,
    free_cursor: AtomicIsize,
    len: u32,
}

impl Entities {
    /// Creates an empty allocator.
    pub fn new() -> Self { Self::default() }

    /// Reserves an id that [`flush`](Self::flush) will later materialise.
    ///
    /// ## Behavior
    /// Recycles the most recently freed index if one is available, otherwise
    /// hands out the next index past the end of the metadata table. Only needs
    /// shared access.

    pub fn reserve_entity(&self) -> Entity {
        let n = self.free_cursor.fetch_sub(1, Ordering::Relaxed);
        if n > 0 {
            let index = self.pending[(n - 1) as usize];
            Entity::from_raw_and_generation(index, self.meta[index as usize].generation)
        } else {
            Entity::from_raw(to_index(self.meta.len() as IdCursor - n))
        }
    }

    /// Reserves `count` ids at once. See [`reserve_entity`](Self::reserve_entity).
    pub fn reserve_entities(&self, count: u32) -> ReserveEntitiesIterator<'_> {
        let count = count as IdCursor;
        let range_end = self.free_cursor.fetch_sub(count, Ordering::Relaxed);
        let range_start = range_end - count;

        let freelist_range = range_start.max(0) as usize..range_end.max(0) as usize;

        let (new_id_start, new_id_end) = if range_start >= 0 {
            (0, 0)
        } else {
            let base = self.meta.len() as IdCursor;
            (to_index(base - range_end.min(0)), to_index(base - range_start))
        };

        ReserveEntitiesIterator {
            meta: &self.meta,
            index_iter: self.pending[freelist_range].iter(),
            index_range: new_id_start..new_id_end,
        }
    }

    /// Allocates a new entity, recycling a freed index when one is available.
    ///
    /// ## Panics
    /// Panics if reservations are waiting for a flush.

    pub fn alloc(&mut self) -> Entity {
        self.verify_flushed();
        self.len += 1;
        if let Some(index) = self.pending.pop() {
            *self.free_cursor.get_mut() = self.pending.len() as IdCursor;
            Entity::from_raw_and_generation(index, self.meta[index as usize].generation)
        } else {
            let index = to_index(self.meta.len() as IdCursor);
            self.meta.push(EntityMeta::EMPTY);
            Entity::from_raw(index)
        }
    }

    /// Allocates the exact handle `entity`, overwriting whatever held its slot.
    ///
    /// Returns the previous location if the slot was live. The caller is then
    /// responsible for the data that location pointed at. An index past the
    /// end grows the metadata table to `entity.index() + 1` slots.
    ///
    /// ## Panics
    /// Panics if reservations are waiting for a flush or `entity` is a placeholder.

    pub fn alloc_at(&mut self, entity: Entity) -> Option<EntityLocation> {
        self.verify_flushed();
        assert!(!entity.is_placeholder(), "cannot allocate a placeholder entity");

        let previous = if self.claim_free_slot(entity.index()) {
            None
        } else {
            Some(mem::replace(&mut self.meta[entity.index() as usize].location, EntityLocation::INVALID))
        };

        self.meta[entity.index() as usize].generation = entity.generation;
        previous
    }

    /// Allocates the exact handle `entity` unless its slot is live.
    ///
    /// ## Panics
    /// Panics if reservations are waiting for a flush or `entity` is a placeholder.

    pub fn alloc_at_without_replacement(&mut self, entity: Entity) -> AllocAtWithoutReplacement {
        self.verify_flushed();
        assert!(!entity.is_placeholder(), "cannot allocate a placeholder entity");

        let result = if self.claim_free_slot(entity.index()) {
            AllocAtWithoutReplacement::DidNotExist
        } else {
            let current = &self.meta[entity.index() as usize];
            if !current.location.is_valid() {
                AllocAtWithoutReplacement::DidNotExist
            } else if current.generation == entity.generation {
                AllocAtWithoutReplacement::Exists(current.location)
            } else {
                return AllocAtWithoutReplacement::ExistsWithWrongGeneration;
            }
        };

        self.meta[entity.index() as usize].generation = entity.generation;
        result
    }

    /// Takes `index` off the free list (or grows the table to cover it).
    /// Returns `false` if the slot is currently allocated.

    fn claim_free_slot(&mut self, index: u32) -> bool {
        if index as usize >= self.meta.len() {
            self.pending.extend((self.meta.len() as u32)..index);
            *self.free_cursor.get_mut() = self.pending.len() as IdCursor;
            self.meta.resize(index as usize + 1, EntityMeta::EMPTY);
            self.len += 1;
            true
        } else if let Some(position) = self.pending.iter().position(|&item| item == index) {
            self.pending.swap_remove(position);
            *self.free_cursor.get_mut() = self.pending.len() as IdCursor;
            self.len += 1;
            true
        } else {
            false
        }
    }

    /// Frees `entity`, returning its last location.
    ///
    /// ## Behavior
    /// Returns `None` for stale handles. On success the slot's generation is
    /// bumped (wrapping to 1, never 0) and the index joins the free list.
    ///
    /// ## Panics
    /// Panics if reservations are waiting for a flush.

    pub fn free(&mut self, entity: Entity) -> Option<EntityLocation> {
        self.verify_flushed();

        let meta = self.meta.get_mut(entity.index() as usize)?;
        if meta.generation != entity.generation {
            return None;
        }

        bump_generation(meta, entity.index());
        let location = mem::replace(&mut meta.location, EntityLocation::INVALID);
        self.pending.push(entity.index());
        *self.free_cursor.get_mut() = self.pending.len() as IdCursor;
        self.len -= 1;
        Some(location)
    }

    /// Ensures `additional` entities can be allocated without reallocating.
    ///
    /// ## Panics
    /// Panics if reservations are waiting for a flush.

    pub fn reserve(&mut self, additional: u32) {
        self.verify_flushed();
        let freelist_size = *self.free_cursor.get_mut();
        let shortfall = additional as IdCursor - freelist_size;
        if shortfall > 0 {
            self.meta.reserve(shortfall as usize);
        }
    }

    /// Returns `true` if `entity` is allocated or reserved.
    pub fn contains(&self, entity: Entity) -> bool {
        self.resolve_from_id(entity.index())
            .map_or(false, |current| current.generation == entity.generation)
    }

    /// Returns the location of `entity`.
    ///
    /// Reserved-but-unflushed handles resolve to [`EntityLocation::INVALID`].
    /// Stale handles resolve to `None`.

    pub fn get(&self, entity: Entity) -> Option<EntityLocation> {
        match self.meta.get(entity.index() as usize) {
            Some(meta) => (meta.generation == entity.generation).then_some(meta.location),
            None => self.contains(entity).then_some(EntityLocation::INVALID),
        }
    }

    /// Overwrites the location of the slot at `index`.
    #[inline]
    pub(crate) fn set(&mut self, index: u32, location: EntityLocation) {
        self.meta[index as usize].location = location;
    }

    /// Returns the handle currently associated with `index`, including indices
    /// reserved past the end of the table.

    pub fn resolve_from_id(&self, index: u32) -> Option<Entity> {
        let slot = index as usize;
        if let Some(meta) = self.meta.get(slot) {
            Some(Entity::from_raw_and_generation(index, meta.generation))
        } else {
            let free_cursor = self.free_cursor.load(Ordering::Relaxed);
            let num_pending = usize::try_from(-free_cursor).ok()?;
            (slot < self.meta.len() + num_pending).then_some(Entity::from_raw(index))
        }
    }

    /// Returns `true` if reservations are waiting for a flush.
    #[inline]
    pub fn needs_flush(&self) -> bool {
        self.free_cursor.load(Ordering::Relaxed) != self.pending.len() as IdCursor
    }

    fn verify_flushed(&self) {
        assert!(!self.needs_flush(), "flush() needs to be called before this operation is legal");
    }

    /// Materialises every reserved id.
    ///
    /// ## Behavior
    /// `init` runs once per reserved id, in ascending index order, with the
    /// slot's location so the caller can place the entity.

    pub fn flush(&mut self, mut init: impl FnMut(Entity, &mut EntityLocation)) {
        let free_cursor = *self.free_cursor.get_mut();
        let new_free_cursor = free_cursor.max(0) as usize;

        let mut recycled: Vec<u32> = self.pending.drain(new_free_cursor..).collect();
        recycled.sort_unstable();
        let mut materialised = recycled.len();

        for index in recycled {
            let meta = &mut self.meta[index as usize];
            init(Entity::from_raw_and_generation(index, meta.generation), &mut meta.location);
        }

        if free_cursor < 0 {
            let old_len = self.meta.len();
            let new_len = old_len + free_cursor.unsigned_abs();
            self.meta.resize(new_len, EntityMeta::EMPTY);
            materialised += new_len - old_len;
            for (index, meta) in self.meta.iter_mut().enumerate().skip(old_len) {
                init(Entity::from_raw_and_generation(index as u32, meta.generation), &mut meta.location);
            }
        }

        *self.free_cursor.get_mut() = new_free_cursor as IdCursor;
        self.len += materialised as u32;
        if materialised > 0 {
            log::trace!("flushed {materialised} reserved entities");
        }
    }

    /// Frees every allocated entity at once.
    ///
    /// ## Behavior
    /// Each live slot has its generation bumped and its index pushed onto the
    /// free list, exactly as [`free`](Self::free) would, so handles taken
    /// before the clear stay stale. Slots that were already free are untouched.
    /// The lowest cleared index is the first to be reused.
    ///
    /// ## Panics
    /// Panics if reservations are waiting for a flush.

    pub fn clear(&mut self) {
        self.verify_flushed();

        let mut is_free = vec![false; self.meta.len()];
        for &index in &self.pending {
            is_free[index as usize] = true;
        }

        for (index, meta) in self.meta.iter_mut().enumerate().rev() {
            if is_free[index] {
                continue;
            }
            bump_generation(meta, index as u32);
            meta.location = EntityLocation::INVALID;
            self.pending.push(index as u32);
        }

        *self.free_cursor.get_mut() = self.pending.len() as IdCursor;
        self.len = 0;
    }

    /// Number of allocated entities.
    #[inline] pub fn len(&self) -> u32 { self.len }
    #[inline] pub fn is_empty(&self) -> bool { self.len == 0 }
    /// Number of metadata slots ever created, live or free.
    #[inline] pub fn total_count(&self) -> usize { self.meta.len() }
}

fn bump_generation(meta: &mut EntityMeta, index: u32) {
    let (generation, wrapped) = inc_masked_high_by(meta.generation, 1);
    meta.generation = generation;
    if wrapped {
        log::warn!("generation of entity index {index} wrapped around; stale handles to it may alias new ones");
    }
}

fn to_index(value: IdCursor) -> u32 {
    u32::try_from(value).unwrap_or_else(|_| panic!("entity index space exhausted"))
}

/// Iterator returned by [`Entities::reserve_entities`].

pub struct ReserveEntitiesIterator<'a> {
    meta: &'a [EntityMeta],
    index_iter: std::slice::Iter<'a, u32>,
    index_range: std::ops::Range<u32>,
}

impl<'a> Iterator for ReserveEntitiesIterator<'a> {
    type Item = Entity;

    fn next(&mut self) -> Option<Self::Item> {
        self.index_iter
            .next()
            .map(|&index| Entity::from_raw_and_generation(index, self.meta[index as usize].generation))
            .or_else(|| self.index_range.next().map(Entity::from_raw))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.index_iter.len() + self.index_range.len();
        (len, Some(len))
    }
}

impl<'a> ExactSizeIterator for ReserveEntitiesIterator<'a> {}
