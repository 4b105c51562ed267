//! The build-time representation a record is initialized from.
//!
//! The producer walks the loaded classes and collects, per class, everything that ends up in
//! its `RunTimeClassInfo`. References here are already offsets into the buffer under
//! construction (symbols and classes are added to the builder first), so initialization only
//! has to lay the values out.

use crate::{
    archive::{ArchiveBuilder, ArchiveOffset, LoaderKind},
    record::{
        constraints::VerifierConstraintFlags,
        layout::{RecordShape, Section, LOADER_CONSTRAINT_SIZE, VERIFIER_CONSTRAINT_SIZE},
    },
    Result,
};

/// A verifier constraint before archiving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpTimeVerifierConstraint {
    /// The target type name symbol
    pub name: ArchiveOffset,
    /// The source type name symbol, if any
    pub from_name: Option<ArchiveOffset>,
    /// Facts about the source side
    pub flags: VerifierConstraintFlags,
}

/// A loader constraint before archiving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpTimeLoaderConstraint {
    /// The constrained class name symbol
    pub name: ArchiveOffset,
    /// The first loader
    pub loader_type1: LoaderKind,
    /// The second loader
    pub loader_type2: LoaderKind,
}

/// Everything archived about one class, in producer form.
///
/// # Examples
///
/// ```rust
/// use classarchive::prelude::*;
///
/// let mut builder = ArchiveBuilder::default();
/// let class = builder.add_class("app/Main", LoaderKind::Unregistered, ClassFlags::empty())?;
/// let object = builder.intern_symbol("java/lang/Object")?;
///
/// let info = DumpTimeClassInfo::new(class)
///     .with_crc(1024, 0xDEAD_BEEF)
///     .with_loader_constraint(object, LoaderKind::App, LoaderKind::Boot);
/// builder.add_record(&info)?;
/// # Ok::<(), classarchive::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpTimeClassInfo {
    /// The archived class descriptor
    pub klass: ArchiveOffset,
    /// Nest host class descriptor; only recorded for hidden classes
    pub nest_host: Option<ArchiveOffset>,
    /// Class file size; only recorded for classes from non-built-in loaders
    pub clsfile_size: u32,
    /// Class file crc32; only recorded for classes from non-built-in loaders
    pub clsfile_crc32: u32,
    /// Verifier constraints, in the order the verifier produced them
    pub verifier_constraints: Vec<DumpTimeVerifierConstraint>,
    /// Loader constraints
    pub loader_constraints: Vec<DumpTimeLoaderConstraint>,
    /// Root indices of the archived enum static field objects
    pub enum_klass_static_fields: Vec<i32>,
}

impl DumpTimeClassInfo {
    /// Starts the description of `klass` with no constraints.
    #[must_use]
    pub fn new(klass: ArchiveOffset) -> Self {
        DumpTimeClassInfo {
            klass,
            ..Default::default()
        }
    }

    /// Sets the class file size and crc32.
    #[must_use]
    pub fn with_crc(mut self, clsfile_size: u32, clsfile_crc32: u32) -> Self {
        self.clsfile_size = clsfile_size;
        self.clsfile_crc32 = clsfile_crc32;
        self
    }

    /// Sets the nest host.
    #[must_use]
    pub fn with_nest_host(mut self, nest_host: ArchiveOffset) -> Self {
        self.nest_host = Some(nest_host);
        self
    }

    /// Appends a verifier constraint.
    #[must_use]
    pub fn with_verifier_constraint(
        mut self,
        name: ArchiveOffset,
        from_name: Option<ArchiveOffset>,
        flags: VerifierConstraintFlags,
    ) -> Self {
        self.verifier_constraints.push(DumpTimeVerifierConstraint {
            name,
            from_name,
            flags,
        });
        self
    }

    /// Appends a loader constraint.
    #[must_use]
    pub fn with_loader_constraint(
        mut self,
        name: ArchiveOffset,
        loader_type1: LoaderKind,
        loader_type2: LoaderKind,
    ) -> Self {
        self.loader_constraints.push(DumpTimeLoaderConstraint {
            name,
            loader_type1,
            loader_type2,
        });
        self
    }

    /// Sets the enum static field root indices.
    #[must_use]
    pub fn with_enum_klass_static_fields(mut self, root_indices: Vec<i32>) -> Self {
        self.enum_klass_static_fields = root_indices;
        self
    }

    /// Number of verifier constraints as stored in the record header.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the count does not fit the header field.
    pub fn num_verifier_constraints(&self) -> Result<i32> {
        count_to_i32(self.verifier_constraints.len(), "verifier constraints")
    }

    /// Number of loader constraints as stored in the record header.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the count does not fit the header field.
    pub fn num_loader_constraints(&self) -> Result<i32> {
        count_to_i32(self.loader_constraints.len(), "loader constraints")
    }

    /// Number of enum static field root indices.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the count does not fit the section count.
    pub fn num_enum_klass_static_fields(&self) -> Result<i32> {
        count_to_i32(self.enum_klass_static_fields.len(), "enum static fields")
    }

    /// Fills the record block at `at`, which was allocated with `shape.byte_size()` bytes.
    ///
    /// Sections absent from `shape` are not touched. Every stored reference is written through
    /// the builder so that it is marked in the pointer map.
    pub(crate) fn write_record(
        &self,
        builder: &mut ArchiveBuilder,
        at: ArchiveOffset,
        shape: &RecordShape,
    ) -> Result<()> {
        let base = at.as_usize();
        let nest_host = if shape.has(Section::NestHost) {
            self.nest_host
        } else {
            None
        };

        builder.write_pointer(base, Some(self.klass))?;
        builder.write_pointer(base + 4, nest_host)?;
        builder.write_at(base + 8, shape.num_verifier_constraints())?;
        builder.write_at(base + 12, shape.num_loader_constraints())?;

        if shape.has(Section::Integrity) {
            let offset = base + shape.offset_of(Section::Integrity);
            builder.write_at(offset, self.clsfile_size)?;
            builder.write_at(offset + 4, self.clsfile_crc32)?;
        }

        if shape.has(Section::NestHost) {
            builder.write_pointer(base + shape.offset_of(Section::NestHost), nest_host)?;
        }

        if shape.has(Section::LoaderConstraints) {
            let start = base + shape.offset_of(Section::LoaderConstraints);
            for (i, constraint) in self.loader_constraints.iter().enumerate() {
                let offset = start + i * LOADER_CONSTRAINT_SIZE;
                builder.write_pointer(offset, Some(constraint.name))?;
                builder.write_at(offset + 4, constraint.loader_type1.tag())?;
                builder.write_at(offset + 5, constraint.loader_type2.tag())?;
            }
        }

        if shape.has(Section::VerifierConstraints) {
            let start = base + shape.offset_of(Section::VerifierConstraints);
            let flags = base + shape.offset_of(Section::VerifierConstraintFlags);
            for (i, constraint) in self.verifier_constraints.iter().enumerate() {
                let offset = start + i * VERIFIER_CONSTRAINT_SIZE;
                builder.write_pointer(offset, Some(constraint.name))?;
                builder.write_pointer(offset + 4, constraint.from_name)?;
                builder.write_at(flags + i, constraint.flags.bits())?;
            }
        }

        if shape.has(Section::EnumStaticFields) {
            let offset = base + shape.offset_of(Section::EnumStaticFields);
            builder.write_at(offset, shape.num_enum_static_fields())?;
            for (i, root_index) in self.enum_klass_static_fields.iter().enumerate() {
                builder.write_at(offset + 4 + i * 4, *root_index)?;
            }
        }

        Ok(())
    }
}

fn count_to_i32(count: usize, what: &str) -> Result<i32> {
    i32::try_from(count).map_err(|_| malformed_error!("Too many {} - {}", what, count))
}
