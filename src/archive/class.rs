//! Archived class descriptors.
//!
//! The archive keeps a small descriptor for every class it has a record for. The descriptor
//! carries exactly the properties the record layout depends on: whether the class is hidden,
//! which kind of loader defined it, and whether it has archived enum objects.
//!
//! Layout (16 bytes): `[name: u32][flags: u32][loader: u8][reserved: 7]`.

use std::fmt;

use bitflags::bitflags;
use strum::{EnumCount, EnumIter, FromRepr};

use crate::{
    archive::{Address, ArchiveOffset, SharedArchive, Symbol},
    file::io::{read_le_at, write_le_at},
    Result,
};

/// Size of a class descriptor in the image.
pub(crate) const CLASS_DESCRIPTOR_SIZE: usize = 16;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Properties of an archived class
    pub struct ClassFlags : u32 {
        /// The class was defined dynamically and anonymously
        const HIDDEN = 0x0001;
        /// The class is an enum whose static field objects were archived
        const HAS_ARCHIVED_ENUM_OBJS = 0x0002;
    }
}

/// The kind of class loader that defined a class.
///
/// The discriminant is the tag stored in the image, both in class descriptors and in loader
/// constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, FromRepr)]
#[repr(u8)]
pub enum LoaderKind {
    /// The bootstrap loader
    Boot = 1,
    /// The platform loader
    Platform = 2,
    /// The application (system) loader
    App = 3,
    /// Any user-defined loader
    Unregistered = 4,
}

impl LoaderKind {
    /// Returns `true` for the loaders built into the runtime.
    ///
    /// Only classes from other loaders can have their bytes change between runs without the
    /// archive being rebuilt, so only those carry integrity info.
    #[must_use]
    pub fn is_builtin(self) -> bool {
        !matches!(self, LoaderKind::Unregistered)
    }

    /// Decodes a stored loader tag.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unknown tag.
    pub fn from_tag(tag: u8) -> Result<LoaderKind> {
        LoaderKind::from_repr(tag).ok_or_else(|| malformed_error!("Unknown loader tag - {}", tag))
    }

    /// The tag stored for this loader kind
    #[must_use]
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// The properties of a class that decide which optional sections its record carries.
pub trait ClassProperties {
    /// Whether the class was defined dynamically and anonymously
    fn is_hidden(&self) -> bool;

    /// The kind of loader that defined the class
    fn loader(&self) -> LoaderKind;

    /// Whether the class has archived enum static field objects
    fn has_archived_enum_objs(&self) -> bool;

    /// Whether the class was defined by a built-in loader
    fn is_builtin(&self) -> bool {
        self.loader().is_builtin()
    }
}

/// The decoded fields of a class descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassHeader {
    /// Offset of the class name symbol
    pub name: ArchiveOffset,
    /// Class properties
    pub flags: ClassFlags,
    /// The defining loader
    pub loader: LoaderKind,
}

impl ClassHeader {
    /// Decodes a descriptor from the start of `data`.
    ///
    /// # Errors
    /// Returns an error for truncated input, unknown flag bits or an unknown loader tag.
    pub fn read(data: &[u8]) -> Result<ClassHeader> {
        let mut offset = 0;
        let name = ArchiveOffset::new(read_le_at(data, &mut offset)?);
        let raw_flags = read_le_at::<u32>(data, &mut offset)?;
        let Some(flags) = ClassFlags::from_bits(raw_flags) else {
            return Err(malformed_error!("Unknown class flags - 0x{:x}", raw_flags));
        };
        let loader = LoaderKind::from_tag(read_le_at::<u8>(data, &mut offset)?)?;

        if name.is_null() {
            return Err(malformed_error!("Archived class without a name"));
        }

        Ok(ClassHeader {
            name,
            flags,
            loader,
        })
    }

    /// Encodes the descriptor to the start of `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
    pub fn write(&self, data: &mut [u8]) -> Result<()> {
        let mut offset = 0;
        write_le_at(data, &mut offset, self.name.value())?;
        write_le_at(data, &mut offset, self.flags.bits())?;
        write_le_at(data, &mut offset, self.loader.tag())?;
        Ok(())
    }
}

impl ClassProperties for ClassHeader {
    fn is_hidden(&self) -> bool {
        self.flags.contains(ClassFlags::HIDDEN)
    }

    fn loader(&self) -> LoaderKind {
        self.loader
    }

    fn has_archived_enum_objs(&self) -> bool {
        self.flags.contains(ClassFlags::HAS_ARCHIVED_ENUM_OBJS)
    }
}

/// A class descriptor inside a mapped archive.
///
/// Identity is the descriptor's address: two descriptors are equal exactly when they are the
/// same archived class.
#[derive(Clone, Copy)]
pub struct ClassDescriptor<'a> {
    archive: &'a SharedArchive,
    address: Address,
    header: ClassHeader,
}

impl<'a> ClassDescriptor<'a> {
    pub(crate) fn read(archive: &'a SharedArchive, address: Address) -> Result<ClassDescriptor<'a>> {
        let header = ClassHeader::read(archive.bytes_at(address, CLASS_DESCRIPTOR_SIZE)?)?;
        Ok(ClassDescriptor {
            archive,
            address,
            header,
        })
    }

    /// The archive this class lives in
    #[must_use]
    pub fn archive(&self) -> &'a SharedArchive {
        self.archive
    }

    /// The live address of the descriptor
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// The decoded descriptor fields
    #[must_use]
    pub fn header(&self) -> &ClassHeader {
        &self.header
    }

    /// The class properties
    #[must_use]
    pub fn flags(&self) -> ClassFlags {
        self.header.flags
    }

    /// Resolves the class name.
    ///
    /// # Errors
    /// Returns an error if the stored name offset does not lead to a valid symbol.
    pub fn name(&self) -> Result<Symbol<'a>> {
        self.archive.symbol_at(self.header.name)
    }

    /// The live address of the class name, without decoding it
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOffset`] if the name offset is outside the archive.
    pub fn name_identity(&self) -> Result<Address> {
        self.archive.offset_to_address(self.header.name)
    }
}

impl ClassProperties for ClassDescriptor<'_> {
    fn is_hidden(&self) -> bool {
        self.header.is_hidden()
    }

    fn loader(&self) -> LoaderKind {
        self.header.loader
    }

    fn has_archived_enum_objs(&self) -> bool {
        self.header.has_archived_enum_objs()
    }
}

impl PartialEq for ClassDescriptor<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for ClassDescriptor<'_> {}

impl fmt::Debug for ClassDescriptor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("address", &self.address)
            .field("header", &self.header)
            .finish()
    }
}
