//! The archive arena: offsets, live addresses, and the image they index.
//!
//! An archive image is one contiguous block of bytes. Every cross-reference stored inside it
//! (record → class, class → name, dictionary → record, ...) is an [`ArchiveOffset`] relative to
//! the start of the image, so the bytes stay valid verbatim no matter where they are mapped.
//! Once mapped, [`SharedArchive`] is the only place that turns an offset into a live
//! [`Address`] (and back).
//!
//! # Layout
//!
//! ```text
//! +--------------------------------------------------------------+ offset 0
//! | ArchiveHeader (64 bytes)                                     |
//! +--------------------------------------------------------------+
//! | symbols, class descriptors, RunTimeClassInfo records         |
//! |   (interleaved in build order, every object word-aligned)    |
//! +--------------------------------------------------------------+
//! | record index table    [count][pad][(class, record) ...]      |
//! | built-in dictionary   [buckets][entries]                     |
//! | unregistered dictionary                                      |
//! | pointer map           [count][pad][field offsets ...]        |
//! +--------------------------------------------------------------+ image_size
//! ```
//!
//! Offset `0` always falls on the header, which is why it doubles as the null sentinel.

mod builder;
mod class;
mod header;
mod shared;
mod symbol;

pub use builder::ArchiveBuilder;
pub use class::{ClassDescriptor, ClassFlags, ClassHeader, ClassProperties, LoaderKind};
pub use header::{ArchiveHeader, ARCHIVE_MAGIC, ARCHIVE_VERSION, HEADER_SIZE};
pub use shared::SharedArchive;
pub use symbol::{symbol_hash, InternedName, Symbol};

pub(crate) use class::CLASS_DESCRIPTOR_SIZE;

use std::fmt;

/// Size of a machine word; every object in the archive starts on a word boundary.
pub const WORD_SIZE: usize = std::mem::size_of::<usize>();

/// Rounds `value` up to the next multiple of `alignment`, which must be a power of two.
#[must_use]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Rounds `value` up to the next multiple of [`WORD_SIZE`].
#[must_use]
pub const fn align_word(value: usize) -> usize {
    align_up(value, WORD_SIZE)
}

/// An address-independent reference into an archive image.
///
/// The value is the byte distance from the start of the image. `0` is the null sentinel.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ArchiveOffset(pub u32);

impl ArchiveOffset {
    /// The null reference.
    pub const NULL: ArchiveOffset = ArchiveOffset(0);

    /// Create a new offset from its raw value
    #[must_use]
    pub fn new(value: u32) -> Self {
        ArchiveOffset(value)
    }

    /// Returns the raw value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Returns the value as an index into the image
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }

    /// Returns `true` for the null sentinel
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for ArchiveOffset {
    fn from(value: u32) -> Self {
        ArchiveOffset(value)
    }
}

impl From<ArchiveOffset> for u32 {
    fn from(offset: ArchiveOffset) -> Self {
        offset.0
    }
}

impl fmt::Debug for ArchiveOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArchiveOffset(0x{:08x})", self.0)
    }
}

impl fmt::Display for ArchiveOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// A live address inside the current mapping of an archive.
///
/// Addresses are only ever compared and translated back to offsets; they are never
/// dereferenced. Two views refer to the same archived object exactly when their addresses are
/// equal, which is what identity equality of interned names relies on.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub usize);

impl Address {
    /// Returns the raw address
    #[must_use]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{:x})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}
