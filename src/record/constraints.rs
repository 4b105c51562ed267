use bitflags::bitflags;

use crate::archive::{LoaderKind, Symbol};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Facts about the source side of a verifier constraint
    pub struct VerifierConstraintFlags : u8 {
        /// The value flows from a protected field
        const FROM_FIELD_IS_PROTECTED = 1 << 0;
        /// The source type is an array type
        const FROM_IS_ARRAY = 1 << 1;
        /// The source type is a plain object type
        const FROM_IS_OBJECT = 1 << 2;
    }
}

/// Stored size and crc32 of the class file a record was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcInfo {
    /// Size of the class file in bytes
    pub clsfile_size: u32,
    /// crc32 of the class file
    pub clsfile_crc32: u32,
}

/// A type relationship the verifier relied on: `name` must be assignable from `from_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifierConstraint<'a> {
    /// The target type name
    pub name: Symbol<'a>,
    /// The source type name, absent when the verifier recorded none
    pub from_name: Option<Symbol<'a>>,
}

/// A requirement that two loaders resolve `name` to the same class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConstraint<'a> {
    /// The constrained class name
    pub name: Symbol<'a>,
    /// The first loader
    pub loader_type1: LoaderKind,
    /// The second loader
    pub loader_type2: LoaderKind,
}
