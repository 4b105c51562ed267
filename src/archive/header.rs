//! Fixed header at offset 0 of every archive image.

use crate::{
    archive::{ArchiveOffset, WORD_SIZE},
    file::io::{read_le_at, write_le_at},
    record::{INDEX_ENTRY_SIZE, RECORD_HEADER_SIZE},
    Error::{NotSupported, OutOfBounds},
    Result,
};

/// Magic number identifying an archive image.
pub const ARCHIVE_MAGIC: u32 = 0xf00b_aba2;

/// Current archive format version.
pub const ARCHIVE_VERSION: u32 = 1;

/// Fixed size of the archive header in bytes.
pub const HEADER_SIZE: usize = 64;

/// The archive header.
///
/// Records where the variable parts of the image live. Section offsets are null when the
/// section is empty (e.g. no unregistered classes were archived).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    /// Magic number, always [`ARCHIVE_MAGIC`]
    pub magic: u32,
    /// Format version, always [`ARCHIVE_VERSION`]
    pub version: u32,
    /// Machine word size of the building process
    pub word_size: u32,
    /// Reserved, zero
    pub flags: u32,
    /// Number of bytes of the image that are in use
    pub image_size: u32,
    /// Dictionary of records for classes defined by a built-in loader
    pub builtin_dictionary: ArchiveOffset,
    /// Dictionary of records for classes defined by custom loaders
    pub unregistered_dictionary: ArchiveOffset,
    /// Table associating archived classes with their records
    pub record_index: ArchiveOffset,
    /// Offsets of every stored reference field
    pub pointer_map: ArchiveOffset,
    /// Number of `RunTimeClassInfo` records in the image
    pub record_count: u32,
}

impl ArchiveHeader {
    /// Creates a header for an image built by this process.
    #[must_use]
    pub fn new() -> Self {
        ArchiveHeader {
            magic: ARCHIVE_MAGIC,
            version: ARCHIVE_VERSION,
            word_size: WORD_SIZE as u32,
            flags: 0,
            image_size: HEADER_SIZE as u32,
            builtin_dictionary: ArchiveOffset::NULL,
            unregistered_dictionary: ArchiveOffset::NULL,
            record_index: ArchiveOffset::NULL,
            pointer_map: ArchiveOffset::NULL,
            record_count: 0,
        }
    }

    /// Reads and validates the header at the start of `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for a foreign magic, version or word size, and
    /// [`crate::Error::Malformed`] if the recorded sizes and offsets do not fit `data`.
    pub fn read(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(OutOfBounds);
        }

        let mut offset = 0;
        let magic = read_le_at::<u32>(data, &mut offset)?;
        if magic != ARCHIVE_MAGIC {
            return Err(NotSupported);
        }

        let header = ArchiveHeader {
            magic,
            version: read_le_at(data, &mut offset)?,
            word_size: read_le_at(data, &mut offset)?,
            flags: read_le_at(data, &mut offset)?,
            image_size: read_le_at(data, &mut offset)?,
            builtin_dictionary: ArchiveOffset::new(read_le_at(data, &mut offset)?),
            unregistered_dictionary: ArchiveOffset::new(read_le_at(data, &mut offset)?),
            record_index: ArchiveOffset::new(read_le_at(data, &mut offset)?),
            pointer_map: ArchiveOffset::new(read_le_at(data, &mut offset)?),
            record_count: read_le_at(data, &mut offset)?,
        };

        header.validate(data.len())?;
        Ok(header)
    }

    /// Writes the header to the start of `data`. The reserved tail is zeroed.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than [`HEADER_SIZE`].
    pub fn write(&self, data: &mut [u8]) -> Result<()> {
        if data.len() < HEADER_SIZE {
            return Err(OutOfBounds);
        }

        let mut offset = 0;
        write_le_at(data, &mut offset, self.magic)?;
        write_le_at(data, &mut offset, self.version)?;
        write_le_at(data, &mut offset, self.word_size)?;
        write_le_at(data, &mut offset, self.flags)?;
        write_le_at(data, &mut offset, self.image_size)?;
        write_le_at(data, &mut offset, self.builtin_dictionary.value())?;
        write_le_at(data, &mut offset, self.unregistered_dictionary.value())?;
        write_le_at(data, &mut offset, self.record_index.value())?;
        write_le_at(data, &mut offset, self.pointer_map.value())?;
        write_le_at(data, &mut offset, self.record_count)?;
        data[offset..HEADER_SIZE].fill(0);

        Ok(())
    }

    fn validate(&self, available: usize) -> Result<()> {
        if self.version != ARCHIVE_VERSION || self.word_size as usize != WORD_SIZE {
            return Err(NotSupported);
        }

        let image_size = self.image_size as usize;
        if image_size < HEADER_SIZE || image_size > available {
            return Err(malformed_error!(
                "Image size {} does not fit the {} bytes provided",
                image_size,
                available
            ));
        }

        // Every record needs at least its header and an index entry.
        let footprint = (self.record_count as usize)
            .checked_mul(RECORD_HEADER_SIZE + INDEX_ENTRY_SIZE);
        if footprint.map_or(true, |bytes| bytes > image_size - HEADER_SIZE) {
            return Err(malformed_error!(
                "Header claims {} records in an image of {} bytes",
                self.record_count,
                image_size
            ));
        }

        for (name, section) in [
            ("built-in dictionary", self.builtin_dictionary),
            ("unregistered dictionary", self.unregistered_dictionary),
            ("record index", self.record_index),
            ("pointer map", self.pointer_map),
        ] {
            if !section.is_null()
                && (section.as_usize() < HEADER_SIZE || section.as_usize() >= image_size)
            {
                return Err(malformed_error!(
                    "Section '{}' at {} lies outside the image",
                    name,
                    section
                ));
            }
        }

        Ok(())
    }
}

impl Default for ArchiveHeader {
    fn default() -> Self {
        Self::new()
    }
}
