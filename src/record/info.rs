use std::fmt;

use crate::{
    archive::{Address, ArchiveOffset, ClassDescriptor, ClassProperties, SharedArchive},
    dictionary::ArchivedValue,
    file::io::{read_le, read_le_at},
    record::{
        constraints::{CrcInfo, LoaderConstraint, VerifierConstraint, VerifierConstraintFlags},
        layout::{
            RecordShape, Section, ENUM_INDEX_SIZE, LOADER_CONSTRAINT_SIZE, RECORD_HEADER_SIZE,
            VERIFIER_CONSTRAINT_SIZE,
        },
    },
    InternedName, LoaderKind, Result,
};

/// The archived re-validation and linking metadata of one class.
///
/// A `RunTimeClassInfo` is a view over a word-aligned block of the archive: a fixed header
/// followed by the optional sections its [`RecordShape`] says are present. The view is
/// validated once, when it is created; the block is then known to be entirely inside the
/// archive, and accessors only decode.
///
/// Accessors for optional sections must only be called when the section is present, and
/// indexed accessors only with an index below the stored count. Both are checked with
/// assertions: violating them is a bug in the caller, not a property of the archive.
///
/// # Examples
///
/// ```rust
/// use classarchive::prelude::*;
///
/// let mut builder = ArchiveBuilder::default();
/// let class = builder.add_class("app/Main", LoaderKind::Unregistered, ClassFlags::empty())?;
/// builder.add_record(&DumpTimeClassInfo::new(class).with_crc(1024, 0xDEAD_BEEF))?;
///
/// let archive = SharedArchive::from_mem(builder.seal()?)?;
/// let index = archive.record_index();
/// let record = archive.record_at(index.iter().next().unwrap().1)?;
///
/// assert!(record.matches(1024, 0xDEAD_BEEF));
/// assert!(!record.matches(1024, 0));
/// # Ok::<(), classarchive::Error>(())
/// ```
#[derive(Clone, Copy)]
pub struct RunTimeClassInfo<'a> {
    archive: &'a SharedArchive,
    address: Address,
    data: &'a [u8],
    klass: ClassDescriptor<'a>,
    nest_host_offset: ArchiveOffset,
    crc: Option<CrcInfo>,
    shape: RecordShape,
}

impl<'a> RunTimeClassInfo<'a> {
    /// The number of bytes to allocate for the record of `class` with the given counts.
    ///
    /// # Panics
    /// Panics if either constraint count is negative.
    #[must_use]
    pub fn byte_size<C: ClassProperties + ?Sized>(
        class: &C,
        num_verifier_constraints: i32,
        num_loader_constraints: i32,
        num_enum_klass_static_fields: i32,
    ) -> usize {
        RecordShape::new(
            class,
            num_verifier_constraints,
            num_loader_constraints,
            num_enum_klass_static_fields,
        )
        .byte_size()
    }

    /// Decodes and validates the record at `address`.
    ///
    /// # Errors
    /// Returns an error if the header refers outside the archive, the counts are negative, the
    /// enum section disagrees with the class, or the block does not fit the image.
    pub(crate) fn read(archive: &'a SharedArchive, address: Address) -> Result<Self> {
        let header = archive.bytes_at(address, RECORD_HEADER_SIZE)?;
        let mut offset = 0;
        let klass_offset = ArchiveOffset::new(read_le_at(header, &mut offset)?);
        let nest_host_offset = ArchiveOffset::new(read_le_at(header, &mut offset)?);
        let num_verifier_constraints = read_le_at::<i32>(header, &mut offset)?;
        let num_loader_constraints = read_le_at::<i32>(header, &mut offset)?;

        if num_verifier_constraints < 0 || num_loader_constraints < 0 {
            return Err(malformed_error!(
                "Negative constraint count in record at {} - {} / {}",
                address,
                num_verifier_constraints,
                num_loader_constraints
            ));
        }

        let klass = archive.class_at(klass_offset)?;

        let mut shape = RecordShape::new(&klass, num_verifier_constraints, num_loader_constraints, 0);
        if klass.has_archived_enum_objs() {
            let count_at = shape.offset_of(Section::EnumStaticFields);
            let prefix = archive.bytes_at(address, count_at + ENUM_INDEX_SIZE)?;
            let num_enum_klass_static_fields = read_le::<i32>(&prefix[count_at..])?;
            if num_enum_klass_static_fields <= 0 {
                return Err(malformed_error!(
                    "Enum class record at {} has {} static fields",
                    address,
                    num_enum_klass_static_fields
                ));
            }

            shape = RecordShape::new(
                &klass,
                num_verifier_constraints,
                num_loader_constraints,
                num_enum_klass_static_fields,
            );
        }

        if !shape.has(Section::NestHost) && !nest_host_offset.is_null() {
            return Err(malformed_error!(
                "Record at {} has a nest host but its class is not hidden",
                address
            ));
        }

        let data = archive.bytes_at(address, shape.byte_size())?;

        let crc = if shape.has(Section::Integrity) {
            let mut offset = shape.offset_of(Section::Integrity);
            Some(CrcInfo {
                clsfile_size: read_le_at(data, &mut offset)?,
                clsfile_crc32: read_le_at(data, &mut offset)?,
            })
        } else {
            None
        };

        Ok(RunTimeClassInfo {
            archive,
            address,
            data,
            klass,
            nest_host_offset,
            crc,
            shape,
        })
    }

    /// Looks up the record of an archived class through the archive's record index.
    ///
    /// # Errors
    /// Returns an error if the indexed record is malformed.
    ///
    /// # Panics
    /// Panics if `klass` has no record; see [`SharedArchive::record_for`].
    pub fn get_for(klass: &ClassDescriptor<'a>) -> Result<Self> {
        klass.archive().record_for(klass)
    }

    /// The live address of the record
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// The offset of the record inside the archive
    ///
    /// # Errors
    /// Cannot fail for a validated record; the `Result` mirrors the translation layer.
    pub fn offset(&self) -> Result<ArchiveOffset> {
        self.archive.address_to_offset(self.address)
    }

    /// The derived layout of this record
    #[must_use]
    pub fn shape(&self) -> &RecordShape {
        &self.shape
    }

    /// The raw bytes of the record
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// The class this record describes
    #[must_use]
    pub fn klass(&self) -> ClassDescriptor<'a> {
        self.klass
    }

    /// The number of verifier constraints
    #[must_use]
    pub fn num_verifier_constraints(&self) -> i32 {
        self.shape.num_verifier_constraints()
    }

    /// The number of loader constraints
    #[must_use]
    pub fn num_loader_constraints(&self) -> i32 {
        self.shape.num_loader_constraints()
    }

    /// The nest host of a hidden class, `None` when the class is not hidden or has no host.
    ///
    /// # Errors
    /// Returns an error if the stored offset does not lead to a class descriptor.
    pub fn nest_host(&self) -> Result<Option<ClassDescriptor<'a>>> {
        if self.nest_host_offset.is_null() {
            return Ok(None);
        }
        self.archive.class_at(self.nest_host_offset).map(Some)
    }

    /// The stored class file size and crc32.
    ///
    /// # Panics
    /// Panics if the class was defined by a built-in loader (no integrity info is stored).
    #[must_use]
    pub fn crc(&self) -> CrcInfo {
        match self.crc {
            Some(crc) => crc,
            None => panic!("integrity info is only stored for classes of non-built-in loaders"),
        }
    }

    /// Whether a freshly loaded class file of `clsfile_size` bytes with crc32 `clsfile_crc32`
    /// is the one this record was built from.
    ///
    /// # Panics
    /// Panics if the record carries no integrity info.
    #[must_use]
    pub fn matches(&self, clsfile_size: u32, clsfile_crc32: u32) -> bool {
        let crc = self.crc();
        crc.clsfile_size == clsfile_size && crc.clsfile_crc32 == clsfile_crc32
    }

    fn check_verifier_constraint_index(&self, i: usize) {
        assert!(
            i < self.num_verifier_constraints() as usize,
            "verifier constraint index {} out of range",
            i
        );
    }

    fn check_loader_constraint_index(&self, i: usize) {
        assert!(
            i < self.num_loader_constraints() as usize,
            "loader constraint index {} out of range",
            i
        );
    }

    /// The `i`th verifier constraint.
    ///
    /// # Errors
    /// Returns an error if a stored name does not lead to a valid symbol.
    ///
    /// # Panics
    /// Panics if `i` is not below [`Self::num_verifier_constraints`].
    pub fn verifier_constraint_at(&self, i: usize) -> Result<VerifierConstraint<'a>> {
        self.check_verifier_constraint_index(i);

        let mut offset = self.shape.offset_of(Section::VerifierConstraints)
            + i * VERIFIER_CONSTRAINT_SIZE;
        let name = ArchiveOffset::new(read_le_at(self.data, &mut offset)?);
        let from_name = ArchiveOffset::new(read_le_at(self.data, &mut offset)?);

        Ok(VerifierConstraint {
            name: self.archive.symbol_at(name)?,
            from_name: if from_name.is_null() {
                None
            } else {
                Some(self.archive.symbol_at(from_name)?)
            },
        })
    }

    /// All verifier constraints, in stored order.
    pub fn verifier_constraints(&self) -> impl Iterator<Item = Result<VerifierConstraint<'a>>> {
        let record = *self;
        (0..self.num_verifier_constraints() as usize).map(move |i| record.verifier_constraint_at(i))
    }

    /// The flag byte of the `i`th verifier constraint.
    ///
    /// # Panics
    /// Panics if `i` is not below [`Self::num_verifier_constraints`].
    #[must_use]
    pub fn verifier_constraint_flag(&self, i: usize) -> VerifierConstraintFlags {
        self.check_verifier_constraint_index(i);
        let byte = self.data[self.shape.offset_of(Section::VerifierConstraintFlags) + i];
        VerifierConstraintFlags::from_bits_retain(byte)
    }

    /// Whether the source of the `i`th verifier constraint is a protected field.
    #[must_use]
    pub fn from_field_is_protected(&self, i: usize) -> bool {
        self.verifier_constraint_flag(i)
            .contains(VerifierConstraintFlags::FROM_FIELD_IS_PROTECTED)
    }

    /// Whether the source of the `i`th verifier constraint is an array type.
    #[must_use]
    pub fn from_is_array(&self, i: usize) -> bool {
        self.verifier_constraint_flag(i)
            .contains(VerifierConstraintFlags::FROM_IS_ARRAY)
    }

    /// Whether the source of the `i`th verifier constraint is a plain object type.
    #[must_use]
    pub fn from_is_object(&self, i: usize) -> bool {
        self.verifier_constraint_flag(i)
            .contains(VerifierConstraintFlags::FROM_IS_OBJECT)
    }

    /// The `i`th loader constraint.
    ///
    /// # Errors
    /// Returns an error if the name does not lead to a valid symbol or a loader tag is unknown.
    ///
    /// # Panics
    /// Panics if `i` is not below [`Self::num_loader_constraints`].
    pub fn loader_constraint_at(&self, i: usize) -> Result<LoaderConstraint<'a>> {
        self.check_loader_constraint_index(i);

        let mut offset =
            self.shape.offset_of(Section::LoaderConstraints) + i * LOADER_CONSTRAINT_SIZE;
        let name = ArchiveOffset::new(read_le_at(self.data, &mut offset)?);
        let loader_type1 = LoaderKind::from_tag(read_le_at(self.data, &mut offset)?)?;
        let loader_type2 = LoaderKind::from_tag(read_le_at(self.data, &mut offset)?)?;

        Ok(LoaderConstraint {
            name: self.archive.symbol_at(name)?,
            loader_type1,
            loader_type2,
        })
    }

    /// All loader constraints, in stored order.
    pub fn loader_constraints(&self) -> impl Iterator<Item = Result<LoaderConstraint<'a>>> {
        let record = *self;
        (0..self.num_loader_constraints() as usize).map(move |i| record.loader_constraint_at(i))
    }

    /// The number of archived enum static field root indices.
    ///
    /// # Panics
    /// Panics if the record has no enum static field section.
    #[must_use]
    pub fn num_enum_klass_static_fields(&self) -> i32 {
        assert!(
            self.shape.has(Section::EnumStaticFields),
            "record has no enum static field section"
        );
        self.shape.num_enum_static_fields()
    }

    /// The `i`th enum static field root index.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the section runs past the record.
    ///
    /// # Panics
    /// Panics if the record has no enum static field section or `i` is out of range.
    pub fn enum_klass_static_field_root_index_at(&self, i: usize) -> Result<i32> {
        let count = self.num_enum_klass_static_fields() as usize;
        assert!(i < count, "enum static field index {} out of range", i);

        let mut at = self.shape.offset_of(Section::EnumStaticFields) + ENUM_INDEX_SIZE * (i + 1);
        read_le_at::<i32>(self.data, &mut at)
    }

    /// All enum static field root indices; empty if the record has no enum static field section.
    pub fn enum_klass_static_field_root_indices(
        &self,
    ) -> impl Iterator<Item = Result<i32>> + 'a {
        let record = *self;
        let count = if self.shape.has(Section::EnumStaticFields) {
            self.shape.num_enum_static_fields() as usize
        } else {
            0
        };
        (0..count).map(move |i| record.enum_klass_static_field_root_index_at(i))
    }
}

impl<'a> ArchivedValue<'a> for RunTimeClassInfo<'a> {
    fn load(archive: &'a SharedArchive, offset: ArchiveOffset) -> Result<Self> {
        archive.record_at(offset)
    }

    fn equals<K: InternedName + ?Sized>(&self, key: &K) -> Result<bool> {
        Ok(self.klass.name_identity()? == key.identity())
    }
}

impl PartialEq for RunTimeClassInfo<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for RunTimeClassInfo<'_> {}

impl fmt::Debug for RunTimeClassInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunTimeClassInfo")
            .field("address", &self.address)
            .field("klass", &self.klass)
            .field("nest_host", &self.nest_host_offset)
            .field("crc", &self.crc)
            .field("shape", &self.shape)
            .finish()
    }
}
