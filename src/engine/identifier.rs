//! 64-bit identifier codec.
//!
//! An [`Identifier`] packs two 32-bit words into a `u64`:
//!
//! ```text
//! | kind (1 bit) | high (31 bits) | low (32 bits) |
//! ```
//!
//! - **low** is the slot index.
//! - **high** is a generation counter that skips zero, so every valid
//!   identifier has a non-zero high word and `Option<Identifier>` stays 8 bytes.
//! - **kind** distinguishes entity handles from placeholder values. Allocated
//!   entities always carry [`IdKind::Entity`], so a placeholder can never compare
//!   equal to a live handle.

use std::num::NonZeroU32;

use crate::engine::error::IdentifierError;


/// The kind of value an [`Identifier`] encodes.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    /// A handle produced by the entity allocator.
    Entity = 0,
    /// A reserved value that never refers to live data.
    Placeholder = 1,
}

/// Bit masks and arithmetic over the high word of an identifier.

pub mod masks {
    use std::num::NonZeroU32;

    use super::IdKind;

    /// Mask selecting the 31 generation bits of the high word.
    pub const HIGH_MASK: u32 = 0x7FFF_FFFF;
    /// Mask selecting the kind flag of the high word.
    pub const TYPE_FLAG: u32 = !HIGH_MASK;

    /// Extracts the [`IdKind`] from a high word.
    #[inline]
    pub const fn extract_kind(high: u32) -> IdKind {
        if high & TYPE_FLAG == 0 { IdKind::Entity } else { IdKind::Placeholder }
    }

    /// Returns `high` with its kind flag set to `kind`.
    #[inline]
    pub const fn pack_kind_into_high(high: u32, kind: IdKind) -> u32 {
        match kind {
            IdKind::Entity => high & HIGH_MASK,
            IdKind::Placeholder => high | TYPE_FLAG,
        }
    }

    /// Adds `rhs` to the masked generation bits of `lhs`.
    ///
    /// ## Behavior
    /// The generation lives in `[1, HIGH_MASK]`. Addition wraps inside that
    /// range and never produces zero, and the kind flag of `lhs` is preserved.
    /// The returned flag is `true` when the counter wrapped past `HIGH_MASK`.

    #[inline]
    pub const fn inc_masked_high_by(lhs: NonZeroU32, rhs: u32) -> (NonZeroU32, bool) {
        let lo = (lhs.get() & HIGH_MASK).wrapping_add(rhs & HIGH_MASK);
        let overflowed = lo >> 31;
        let high = ((lo + overflowed) & HIGH_MASK) | (lhs.get() & TYPE_FLAG);
        let high = match NonZeroU32::new(high) {
            Some(high) => high,
            None => NonZeroU32::MIN,
        };
        (high, overflowed == 1)
    }
}

/// A packed `(kind, high, low)` identifier.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    high: NonZeroU32,
    low: u32,
}

impl Identifier {
    /// Builds an identifier from its parts.
    ///
    /// Fails if the generation bits of `high` are zero.

    #[inline]
    pub const fn new(low: u32, high: u32, kind: IdKind) -> Result<Self, IdentifierError> {
        if high & masks::HIGH_MASK == 0 {
            return Err(IdentifierError::InvalidIdentifier);
        }
        match NonZeroU32::new(masks::pack_kind_into_high(high, kind)) {
            Some(high) => Ok(Self { high, low }),
            None => Err(IdentifierError::InvalidIdentifier),
        }
    }

    /// Slot index.
    #[inline]
    pub const fn low(self) -> u32 {
        self.low
    }

    /// Generation bits with the kind flag stripped.
    #[inline]
    pub const fn masked_high(self) -> u32 {
        self.high.get() & masks::HIGH_MASK
    }

    /// Kind flag.
    #[inline]
    pub const fn kind(self) -> IdKind {
        masks::extract_kind(self.high.get())
    }

    /// Packs the identifier into a `u64`.
    #[inline]
    pub const fn to_bits(self) -> u64 {
        ((self.high.get() as u64) << 32) | self.low as u64
    }

    /// Unpacks an identifier from a `u64`.
    #[inline]
    pub const fn try_from_bits(bits: u64) -> Result<Self, IdentifierError> {
        let high = (bits >> 32) as u32;
        let low = bits as u32;
        Self::new(low, high, masks::extract_kind(high))
    }
}

impl From<Identifier> for u64 {
    fn from(value: Identifier) -> Self {
        value.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::masks::*;

    fn nz(value: u32) -> NonZeroU32 {
        NonZeroU32::new(value).unwrap()
    }

    #[test]
    fn increment_stays_in_generation_range() {
        assert_eq!(inc_masked_high_by(nz(1), 1), (nz(2), false));
        assert_eq!(inc_masked_high_by(nz(HIGH_MASK), 1), (nz(1), true));
        assert_eq!(inc_masked_high_by(nz(HIGH_MASK - 1), 3), (nz(2), true));
        assert_eq!(inc_masked_high_by(nz(HIGH_MASK), HIGH_MASK), (nz(HIGH_MASK), true));
    }

    #[test]
    fn increment_preserves_kind_flag() {
        let placeholder = nz(pack_kind_into_high(HIGH_MASK, IdKind::Placeholder));
        let (next, wrapped) = inc_masked_high_by(placeholder, 1);
        assert!(wrapped);
        assert_eq!(extract_kind(next.get()), IdKind::Placeholder);
        assert_eq!(next.get() & HIGH_MASK, 1);
    }

    #[test]
    fn zero_generation_is_rejected() {
        assert_eq!(Identifier::new(7, 0, IdKind::Entity), Err(IdentifierError::InvalidIdentifier));
        assert_eq!(
            Identifier::new(7, TYPE_FLAG, IdKind::Placeholder),
            Err(IdentifierError::InvalidIdentifier)
        );
    }

    #[test]
    fn bits_carry_kind_and_parts() {
        let id = Identifier::new(42, 9, IdKind::Placeholder).unwrap();
        let decoded = Identifier::try_from_bits(id.to_bits()).unwrap();
        assert_eq!(decoded.low(), 42);
        assert_eq!(decoded.masked_high(), 9);
        assert_eq!(decoded.kind(), IdKind::Placeholder);
        assert_eq!(Identifier::try_from_bits(42), Err(IdentifierError::InvalidIdentifier));
    }
}
