// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # classarchive
//!
//! Relocatable, memory-mappable archives of per-class re-validation metadata for a shared class
//! data archive of a managed-language runtime.
//!
//! When classes are loaded from a pre-built archive instead of from their class files, the
//! runtime must still re-check at load time what was established when the archive was built:
//! that the class file presented now is the one the archive was built from, that the type
//! relationships the verifier relied on still hold, and that loader constraints are still
//! satisfied. `classarchive` stores that information as compact, variable-length records
//! (`RunTimeClassInfo`), finds them through offset-based hash dictionaries keyed by interned
//! class name, and links every archived class back to its record.
//!
//! Every reference inside an archive is an offset from its start, so an image can be mapped at
//! any address and used in place: nothing is parsed into the heap beyond the small record index.
//!
//! ## Features
//!
//! - **Variable-length records** - Optional sections cost zero bytes when absent
//! - **Zero-copy lookup** - Dictionaries are probed directly inside the mapped image
//! - **Relocatable** - The same bytes work at any base address
//! - **Validated on map** - Header, tables and every reference field are checked once
//!
//! ## Quick Start
//!
//! ```rust
//! use classarchive::prelude::*;
//!
//! // Build
//! let mut builder = ArchiveBuilder::default();
//! let widget = builder.add_class("plugin/Widget", LoaderKind::Unregistered, ClassFlags::empty())?;
//! let base = builder.intern_symbol("plugin/Base")?;
//! builder.add_record(
//!     &DumpTimeClassInfo::new(widget)
//!         .with_crc(1024, 0xDEAD_BEEF)
//!         .with_verifier_constraint(base, None, VerifierConstraintFlags::FROM_IS_OBJECT),
//! )?;
//! let image = builder.seal()?;
//!
//! // Map and look up
//! let archive = SharedArchive::from_mem(image)?;
//! let dictionary = archive.unregistered_dictionary()?;
//! let record = dictionary.iter()?.next().unwrap()?;
//! let name = record.klass().name()?;
//!
//! assert_eq!(archive.find_record(&name)?, Some(record));
//! assert!(record.matches(1024, 0xDEAD_BEEF));
//! assert_eq!(record.verifier_constraint_at(0)?.name.as_str(), "plugin/Base");
//! # Ok::<(), classarchive::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`archive`] - Offsets, the builder, the mapped archive, symbols and class descriptors
//! - [`record`] - Record layout, accessors and the class to record index
//! - [`dictionary`] - Compact offset-based hash tables
//! - [`file`] - Storage backends and little-endian primitives
//! - [`config`] - Build and map settings
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: one `debug` line per record built, `info` lines
//! when an archive is sealed or mapped, and a `warn` line when pointer verification is turned
//! off. Nothing is printed unless the application installs a logger.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use classarchive::prelude::*;
///
/// let archive = SharedArchive::from_mem(ArchiveBuilder::default().seal()?)?;
/// assert!(archive.record_index().is_empty());
/// # Ok::<(), classarchive::Error>(())
/// ```
pub mod prelude;

/// The archive arena: offsets, building, mapping, symbols and class descriptors.
pub mod archive;

/// Build and map settings.
pub mod config;

/// Compact offset-based hash dictionaries keyed by interned name.
pub mod dictionary;

/// Storage backends and little-endian primitives.
pub mod file;

/// Per-class re-validation records.
pub mod record;

/// `classarchive` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `classarchive` Error type
///
/// # Examples
///
/// ```rust
/// use classarchive::{Error, SharedArchive};
///
/// match SharedArchive::from_mem(vec![0u8; 128]) {
///     Ok(_) => println!("Mapped"),
///     Err(Error::NotSupported) => println!("Not an archive image"),
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;

pub use archive::{
    Address, ArchiveBuilder, ArchiveOffset, ClassDescriptor, ClassFlags, InternedName,
    LoaderKind, SharedArchive, Symbol,
};
pub use config::ArchiveConfig;
pub use dictionary::{CompactHashtable, RunTimeSharedDictionary};
pub use record::{DumpTimeClassInfo, RecordIndex, RunTimeClassInfo};
