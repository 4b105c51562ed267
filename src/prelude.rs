//! # classarchive Prelude
//!
//! The types needed to build an archive, map it and query its records, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all classarchive operations
pub use crate::Error;

/// The result type used throughout classarchive
pub use crate::Result;

/// Build and map settings
pub use crate::ArchiveConfig;

// ================================================================================================
// Building and Mapping
// ================================================================================================

/// Assembles archive images
pub use crate::archive::ArchiveBuilder;

/// A mapped archive image
pub use crate::archive::SharedArchive;

/// Offsets and addresses
pub use crate::archive::{Address, ArchiveOffset};

// ================================================================================================
// Classes and Names
// ================================================================================================

/// Archived class descriptors and their properties
pub use crate::archive::{ClassDescriptor, ClassFlags, ClassProperties, LoaderKind};

/// Interned names
pub use crate::archive::{symbol_hash, InternedName, Symbol};

// ================================================================================================
// Records
// ================================================================================================

/// Records, their layout and the producer representation
pub use crate::record::{
    CrcInfo, DumpTimeClassInfo, LoaderConstraint, RecordIndex, RecordShape, RunTimeClassInfo,
    Section, VerifierConstraint, VerifierConstraintFlags,
};

// ================================================================================================
// Dictionaries
// ================================================================================================

/// Compact hash tables
pub use crate::dictionary::{
    ArchivedValue, CompactHashtable, CompactHashtableStats, CompactHashtableWriter,
    RunTimeSharedDictionary,
};
