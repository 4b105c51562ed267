//! Per-class re-validation records.
//!
//! When a class is loaded from the archive, the runtime skips parsing and verification of its
//! class file and instead replays what was recorded at build time: the verifier's assignability
//! checks, the loader constraints, and, for classes of non-built-in loaders, a size and crc32
//! check against the class file presented at run time.
//!
//! # Key Components
//!
//! - [`RunTimeClassInfo`] - The archived record and its accessors
//! - [`RecordShape`] - Which sections a record has and where they are
//! - [`DumpTimeClassInfo`] - What the producer hands to [`crate::ArchiveBuilder::add_record`]
//! - [`RecordIndex`] - Class to record back-pointers

mod constraints;
mod dumptime;
mod index;
mod info;
mod layout;

pub use constraints::{CrcInfo, LoaderConstraint, VerifierConstraint, VerifierConstraintFlags};
pub use dumptime::{DumpTimeClassInfo, DumpTimeLoaderConstraint, DumpTimeVerifierConstraint};
pub use index::RecordIndex;
pub(crate) use index::{INDEX_ENTRY_SIZE, INDEX_PREFIX_SIZE};
pub use info::RunTimeClassInfo;
pub use layout::{
    RecordShape, Section, SectionFlags, CRC_INFO_SIZE, ENUM_INDEX_SIZE, LOADER_CONSTRAINT_SIZE,
    RECORD_HEADER_SIZE, VERIFIER_CONSTRAINT_SIZE,
};
