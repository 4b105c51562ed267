//! Little-endian, bounds-checked reading and writing of archive primitives.
//!
//! Every multi-byte field of an archive image (header words, record headers, offsets, bucket
//! descriptors) is stored in little-endian order. The helpers here never panic on short input:
//! they return [`crate::Error::OutOfBounds`] instead, which lets the mapping layer treat a
//! truncated or corrupted image as a recoverable error.
//!
//! # Key Components
//!
//! - [`crate::file::io::ArchiveIO`] - Conversion between primitive types and byte arrays
//! - [`crate::file::io::read_le`] / [`crate::file::io::read_le_at`] - Reading
//! - [`crate::file::io::write_le_at`] - Writing
//!
//! # Examples
//!
//! ```rust,ignore
//! use classarchive::file::io::{read_le_at, write_le_at};
//!
//! let mut data = [0u8; 8];
//! let mut offset = 0;
//! write_le_at(&mut data, &mut offset, 0xf00b_aba2_u32)?;
//! write_le_at(&mut data, &mut offset, -1_i32)?;
//!
//! let mut offset = 0;
//! assert_eq!(read_le_at::<u32>(&data, &mut offset)?, 0xf00b_aba2);
//! assert_eq!(read_le_at::<i32>(&data, &mut offset)?, -1);
//! # Ok::<(), classarchive::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Trait for primitive types that can be stored in an archive image.
///
/// Each implementation names the fixed-size byte array it converts to and from. Only the
/// little-endian direction is needed: images are always written and read in little-endian.
pub trait ArchiveIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_archive_io {
    ($($ty:ty),*) => {
        $(
            impl ArchiveIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_archive_io!(u8, u32, i32);

/// Safely reads a value of type `T` in little-endian byte order from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le<T: ArchiveIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Safely reads a value of type `T` in little-endian byte order at `offset`, advancing the
/// offset by the size of `T`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes. The offset is left
/// untouched in that case.
pub fn read_le_at<T: ArchiveIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let end = offset
        .checked_add(std::mem::size_of::<T>())
        .ok_or(OutOfBounds)?;
    let bytes = data
        .get(*offset..end)
        .and_then(|field| field.try_into().ok())
        .ok_or(OutOfBounds)?;

    *offset = end;
    Ok(T::from_le_bytes(bytes))
}

/// Safely writes a value of type `T` in little-endian byte order at `offset`, advancing the
/// offset by the size of `T`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes. Nothing is written in
/// that case.
pub fn write_le_at<T: ArchiveIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let end = offset
        .checked_add(std::mem::size_of::<T>())
        .ok_or(OutOfBounds)?;
    let field = data.get_mut(*offset..end).ok_or(OutOfBounds)?;
    field.copy_from_slice(value.to_le_bytes().as_ref());

    *offset = end;
    Ok(())
}
