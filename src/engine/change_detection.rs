//! Tick-based change detection.
//!
//! The world keeps a monotonically increasing 32-bit change tick. Every
//! component value and resource records the tick at which it was added and the
//! tick at which it was last changed. Readers compare those ticks against the
//! tick of their own previous run to learn whether a value is new to them.
//!
//! ## Wrap-around
//!
//! Ticks are compared by age (`this_run - tick`, wrapping) rather than by raw
//! value, so the counter may overflow freely as long as no stored tick grows
//! older than [`MAX_CHANGE_AGE`]. The world guarantees that by calling
//! `check_change_ticks` at least every [`CHECK_TICK_THRESHOLD`] ticks, which
//! clamps every stored tick to at most `MAX_CHANGE_AGE` behind the present.
//!
//! ## Guards
//!
//! [`Mut`] and [`ResMut`] hand out `&mut T` through `DerefMut`. The first mutable
//! dereference marks the guard touched, and the changed tick is stamped when
//! the guard is released. Immutable reads never stamp.

use std::ops::{Deref, DerefMut};


/// Number of ticks between two tick-rebasing passes.
pub const CHECK_TICK_THRESHOLD: u32 = 518_400_000;

/// Oldest age a stored tick may reach before it is clamped.
///
/// Two threshold periods are subtracted from the full range so a tick checked
/// just before a rebasing pass still has a full period of headroom.
pub const MAX_CHANGE_AGE: u32 = u32::MAX - (2 * CHECK_TICK_THRESHOLD - 1);

/// A point on the world's change-tick timeline.

#[derive(Copy, Clone, Default, Debug, Eq, Hash, PartialEq)]
pub struct Tick {
    tick: u32,
}

impl Tick {
    /// The maximum relative age a tick may hold.
    pub const MAX: Self = Self::new(MAX_CHANGE_AGE);

    /// Creates a tick with the raw value `tick`.
    #[inline] pub const fn new(tick: u32) -> Self { Self { tick } }
    /// Raw tick value.
    #[inline] pub const fn get(self) -> u32 { self.tick }
    /// Overwrites the raw tick value.
    #[inline] pub fn set(&mut self, tick: u32) { self.tick = tick; }

    /// Returns `true` if this tick happened after `last_run`, as seen from `this_run`.
    ///
    /// ## Behavior
    /// Both ages are measured backwards from `this_run` with wrapping
    /// subtraction and clamped to [`MAX_CHANGE_AGE`]. A write at exactly
    /// `last_run` is not newer.

    #[inline]
    pub fn is_newer_than(self, last_run: Tick, this_run: Tick) -> bool {
        let ticks_since_insert = this_run.relative_to(self).tick.min(MAX_CHANGE_AGE);
        let ticks_since_system = this_run.relative_to(last_run).tick.min(MAX_CHANGE_AGE);

        ticks_since_system > ticks_since_insert
    }

    #[inline]
    pub(crate) fn relative_to(self, other: Self) -> Self {
        Self { tick: self.tick.wrapping_sub(other.tick) }
    }

    /// Clamps this tick so it is at most [`MAX_CHANGE_AGE`] older than `tick`.
    /// Returns `true` if it was clamped.

    #[inline]
    pub(crate) fn check_tick(&mut self, tick: Tick) -> bool {
        let age = tick.relative_to(*self);
        if age.get() > Self::MAX.get() {
            *self = tick.relative_to(Self::MAX);
            true
        } else {
            false
        }
    }
}

/// Added and changed ticks of one component value or resource.

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ComponentTicks {
    /// Tick at which the value was added.
    pub added: Tick,
    /// Tick at which the value was last changed (or added).
    pub changed: Tick,
}

impl ComponentTicks {
    /// Ticks of a value written at `change_tick`.
    #[inline]
    pub fn new(change_tick: Tick) -> Self {
        Self { added: change_tick, changed: change_tick }
    }

    /// Returns `true` if the value was added after `last_run`, as seen from `this_run`.
    #[inline]
    pub fn is_added(&self, last_run: Tick, this_run: Tick) -> bool {
        self.added.is_newer_than(last_run, this_run)
    }

    /// Returns `true` if the value changed after `last_run`, as seen from `this_run`.
    #[inline]
    pub fn is_changed(&self, last_run: Tick, this_run: Tick) -> bool {
        self.changed.is_newer_than(last_run, this_run)
    }

    /// Marks the value as changed at `change_tick`.
    #[inline]
    pub fn set_changed(&mut self, change_tick: Tick) {
        self.changed = change_tick;
    }

    #[inline]
    pub(crate) fn check_ticks(&mut self, change_tick: Tick) {
        self.added.check_tick(change_tick);
        self.changed.check_tick(change_tick);
    }
}

/// Read-only view of a value's change ticks.
pub trait DetectChanges {
    /// `true` if the value was added after the reader's last run.
    fn is_added(&self) -> bool;
    /// `true` if the value was added or changed after the reader's last run.
    fn is_changed(&self) -> bool;
    /// Tick of the most recent change.
    fn last_changed(&self) -> Tick;
}

/// Mutable access that participates in change detection.
pub trait DetectChangesMut: DetectChanges {
    /// Inner value type.
    type Inner: ?Sized;

    /// Stamps the changed tick now, whether or not the value was written.
    fn set_changed(&mut self);

    /// Returns the value without stamping the changed tick on release.
    fn bypass_change_detection(&mut self) -> &mut Self::Inner;
}

#[derive(Clone, Copy)]
pub(crate) struct Ticks<'w> {
    pub(crate) added: &'w Tick,
    pub(crate) changed: &'w Tick,
    pub(crate) last_run: Tick,
    pub(crate) this_run: Tick,
}

impl<'w> Ticks<'w> {
    pub(crate) fn from_component_ticks(ticks: &'w ComponentTicks, last_run: Tick, this_run: Tick) -> Self {
        Self { added: &ticks.added, changed: &ticks.changed, last_run, this_run }
    }
}

pub(crate) struct TicksMut<'w> {
    pub(crate) added: &'w mut Tick,
    pub(crate) changed: &'w mut Tick,
    pub(crate) last_run: Tick,
    pub(crate) this_run: Tick,
}

impl<'w> TicksMut<'w> {
    pub(crate) fn from_component_ticks(ticks: &'w mut ComponentTicks, last_run: Tick, this_run: Tick) -> Self {
        Self { added: &mut ticks.added, changed: &mut ticks.changed, last_run, this_run }
    }
}

macro_rules! change_detection_impl {
    ($name:ident < $( $generics:tt ),+ >, $target:ty, $($traits:ident)?) => {
        impl<$($generics),* : ?Sized $(+ $traits)?> DetectChanges for $name<$($generics),*> {
            #[inline]
            fn is_added(&self) -> bool {
                self.ticks.added.is_newer_than(self.ticks.last_run, self.ticks.this_run)
            }

            #[inline]
            fn is_changed(&self) -> bool {
                self.ticks.changed.is_newer_than(self.ticks.last_run, self.ticks.this_run)
            }

            #[inline]
            fn last_changed(&self) -> Tick {
                *self.ticks.changed
            }
        }

        impl<$($generics),*: ?Sized $(+ $traits)?> Deref for $name<$($generics),*> {
            type Target = $target;

            #[inline]
            fn deref(&self) -> &Self::Target {
                self.value
            }
        }

        impl<$($generics),* $(: $traits)?> AsRef<$target> for $name<$($generics),*> {
            #[inline]
            fn as_ref(&self) -> &$target {
                self.deref()
            }
        }
    }
}

macro_rules! change_detection_mut_impl {
    ($name:ident < $( $generics:tt ),+ >, $target:ty, $($traits:ident)?) => {
        impl<$($generics),* : ?Sized $(+ $traits)?> DetectChangesMut for $name<$($generics),*> {
            type Inner = $target;

            #[inline]
            fn set_changed(&mut self) {
                *self.ticks.changed = self.ticks.this_run;
            }

            #[inline]
            fn bypass_change_detection(&mut self) -> &mut Self::Inner {
                self.value
            }
        }

        impl<$($generics),* : ?Sized $(+ $traits)?> DerefMut for $name<$($generics),*> {
            #[inline]
            fn deref_mut(&mut self) -> &mut Self::Target {
                self.touched = true;
                self.value
            }
        }

        impl<$($generics),* : ?Sized $(+ $traits)?> Drop for $name<$($generics),*> {
            fn drop(&mut self) {
                if self.touched {
                    *self.ticks.changed = self.ticks.this_run;
                }
            }
        }
    };
}

/// Shared borrow of a component value with its change ticks.

pub struct Ref<'w, T: ?Sized> {
    pub(crate) value: &'w T,
    pub(crate) ticks: Ticks<'w>,
}

impl<'w, T: ?Sized> Ref<'w, T> {
    /// Returns the underlying reference with the full world lifetime.
    pub fn into_inner(self) -> &'w T {
        self.value
    }
}

/// Exclusive borrow of a component value that stamps its changed tick on release.

pub struct Mut<'w, T: ?Sized> {
    pub(crate) value: &'w mut T,
    pub(crate) ticks: TicksMut<'w>,
    pub(crate) touched: bool,
}

impl<'w, T: ?Sized> Mut<'w, T> {
    pub(crate) fn new(value: &'w mut T, ticks: TicksMut<'w>) -> Self {
        Self { value, ticks, touched: false }
    }
}

/// Shared borrow of a resource with its change ticks.

pub struct Res<'w, T: ?Sized> {
    pub(crate) value: &'w T,
    pub(crate) ticks: Ticks<'w>,
}

/// Exclusive borrow of a resource that stamps its changed tick on release.

pub struct ResMut<'w, T: ?Sized> {
    pub(crate) value: &'w mut T,
    pub(crate) ticks: TicksMut<'w>,
    pub(crate) touched: bool,
}

impl<'w, T: ?Sized> ResMut<'w, T> {
    pub(crate) fn new(value: &'w mut T, ticks: TicksMut<'w>) -> Self {
        Self { value, ticks, touched: false }
    }
}

change_detection_impl!(Ref<'w, T>, T,);
change_detection_impl!(Mut<'w, T>, T,);
change_detection_mut_impl!(Mut<'w, T>, T,);
change_detection_impl!(Res<'w, T>, T,);
change_detection_impl!(ResMut<'w, T>, T,);
change_detection_mut_impl!(ResMut<'w, T>, T,);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_after_last_run_is_newer() {
        let write = Tick::new(10);
        assert!(write.is_newer_than(Tick::new(5), Tick::new(12)));
        assert!(!write.is_newer_than(Tick::new(11), Tick::new(12)));
        assert!(!write.is_newer_than(Tick::new(10), Tick::new(12)));
    }

    #[test]
    fn comparison_survives_counter_wrap() {
        let last_run = Tick::new(u32::MAX - 3);
        let write = Tick::new(u32::MAX - 1);
        let this_run = Tick::new(2);
        assert!(write.is_newer_than(last_run, this_run));
        assert!(!Tick::new(u32::MAX - 5).is_newer_than(last_run, this_run));
    }

    #[test]
    fn check_tick_clamps_old_ticks() {
        let now = Tick::new(MAX_CHANGE_AGE + 100);
        let mut ancient = Tick::new(0);
        assert!(ancient.check_tick(now));
        assert_eq!(now.relative_to(ancient).get(), MAX_CHANGE_AGE);

        let mut recent = Tick::new(now.get() - 5);
        assert!(!recent.check_tick(now));
        assert_eq!(recent.get(), now.get() - 5);
    }

    #[test]
    fn rebased_ticks_keep_recent_readers_accurate() {
        let now = Tick::new(u32::MAX - 10);
        let mut stale = ComponentTicks::new(Tick::new(0));
        let mut fresh = ComponentTicks::new(Tick::new(now.get() - 3));
        stale.check_ticks(now);
        fresh.check_ticks(now);

        assert_eq!(now.relative_to(stale.changed).get(), MAX_CHANGE_AGE);
        let last_run = Tick::new(now.get() - 5);
        assert!(!stale.is_changed(last_run, now));
        assert!(fresh.is_changed(last_run, now));
    }

    #[test]
    fn mut_guard_stamps_only_when_dereferenced_mutably() {
        let mut value = 7u32;
        let mut ticks = ComponentTicks::new(Tick::new(1));

        {
            let guard = Mut::new(&mut value, TicksMut::from_component_ticks(&mut ticks, Tick::new(1), Tick::new(4)));
            assert_eq!(*guard, 7);
        }
        assert_eq!(ticks.changed, Tick::new(1));

        {
            let mut guard = Mut::new(&mut value, TicksMut::from_component_ticks(&mut ticks, Tick::new(1), Tick::new(4)));
            *guard += 1;
        }
        assert_eq!(value, 8);
        assert_eq!(ticks.changed, Tick::new(4));
        assert_eq!(ticks.added, Tick::new(1));
    }

    #[test]
    fn bypass_leaves_ticks_untouched() {
        let mut value = String::from("a");
        let mut ticks = ComponentTicks::new(Tick::new(2));
        {
            let mut guard = ResMut::new(&mut value, TicksMut::from_component_ticks(&mut ticks, Tick::new(2), Tick::new(9)));
            guard.bypass_change_detection().push('b');
            assert!(!guard.is_changed());
        }
        assert_eq!(value, "ab");
        assert_eq!(ticks.changed, Tick::new(2));
    }

    #[test]
    fn ref_reports_added_and_changed() {
        let value = 3i64;
        let ticks = ComponentTicks { added: Tick::new(3), changed: Tick::new(8) };
        let reader = Ref { value: &value, ticks: Ticks::from_component_ticks(&ticks, Tick::new(5), Tick::new(9)) };
        assert!(!reader.is_added());
        assert!(reader.is_changed());
        assert_eq!(reader.last_changed(), Tick::new(8));
        assert_eq!(*reader.into_inner(), 3);
    }
}
