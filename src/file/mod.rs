//! Storage backends holding the bytes of an archive image.
//!
//! An archive is used either straight from memory (typically right after it has been built, or
//! when an embedding runtime already holds the bytes) or from a memory-mapped file. Both are
//! abstracted by the [`Backend`] trait so that [`crate::SharedArchive`] does not care where the
//! image lives. The address at which the backend exposes its bytes is the *base address* of the
//! mapping; it is chosen by the allocator or the OS at load time and is unrelated to anything
//! recorded inside the image.
//!
//! # Key Components
//!
//! - [`Backend`] - Read access to a contiguous image
//! - [`Memory`] - Owned in-memory image
//! - [`Physical`] - Memory-mapped image file
//! - [`io`] - Little-endian bounds-checked primitives used by every decoder in the crate

pub mod io;
mod memory;
mod physical;

pub use memory::Memory;
pub use physical::Physical;

use crate::Result;

/// Read access to the bytes of an archive image.
///
/// The slice returned by [`Backend::data`] must stay at the same address for the lifetime of the
/// backend: every live reference into the archive is derived from that address.
pub trait Backend: Send + Sync {
    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the requested range exceeds the image.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the whole image.
    fn data(&self) -> &[u8];

    /// Returns the size of the image in bytes.
    fn len(&self) -> usize;

    /// Returns `true` if the image holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
