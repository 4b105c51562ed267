//! Construction of archive images.
//!
//! [`ArchiveBuilder`] owns the buffer an image is assembled in. Everything is appended: symbols
//! and class descriptors first, then one record per class, and finally, on [`ArchiveBuilder::seal`],
//! the record index table, both dictionaries, the pointer map and the header. Every reference
//! written into the buffer goes through [`ArchiveBuilder::write_pointer`], which both checks the
//! target and marks the field in the pointer map.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use log::{debug, info};

use crate::{
    archive::{
        align_word,
        header::{ArchiveHeader, HEADER_SIZE},
        symbol::{read_symbol, symbol_size, write_symbol},
        ArchiveOffset, ClassFlags, ClassHeader, ClassProperties, LoaderKind,
        CLASS_DESCRIPTOR_SIZE,
    },
    config::ArchiveConfig,
    dictionary::CompactHashtableWriter,
    file::io::{write_le_at, ArchiveIO},
    record::{DumpTimeClassInfo, RecordShape, INDEX_ENTRY_SIZE, INDEX_PREFIX_SIZE},
    Error::{DuplicateClass, ImageTooLarge, InvalidOffset, UnknownClass},
    Result,
};

/// Size of the `[count][pad]` prefix of the pointer map.
const TABLE_PREFIX_SIZE: usize = 8;

/// Assembles an archive image.
///
/// # Examples
///
/// ```rust
/// use classarchive::prelude::*;
///
/// let mut builder = ArchiveBuilder::new(ArchiveConfig::default());
/// let object = builder.add_class("java/lang/Object", LoaderKind::Boot, ClassFlags::empty())?;
/// builder.add_record(&DumpTimeClassInfo::new(object))?;
///
/// let image = builder.seal()?;
/// let archive = SharedArchive::from_mem(image)?;
/// assert_eq!(archive.record_index().len(), 1);
/// # Ok::<(), classarchive::Error>(())
/// ```
pub struct ArchiveBuilder {
    config: ArchiveConfig,
    buffer: Vec<u8>,
    symbols: HashMap<String, ArchiveOffset>,
    symbol_offsets: HashSet<ArchiveOffset>,
    classes: HashMap<ArchiveOffset, ClassHeader>,
    pointers: BTreeSet<u32>,
    records: BTreeMap<ArchiveOffset, ArchiveOffset>,
    builtin: CompactHashtableWriter,
    builtin_names: HashSet<ArchiveOffset>,
    unregistered: CompactHashtableWriter,
    unregistered_names: HashSet<ArchiveOffset>,
}

impl ArchiveBuilder {
    /// Creates an empty builder. The header space is reserved up front.
    #[must_use]
    pub fn new(config: ArchiveConfig) -> Self {
        ArchiveBuilder {
            config,
            buffer: vec![0; HEADER_SIZE],
            symbols: HashMap::new(),
            symbol_offsets: HashSet::new(),
            classes: HashMap::new(),
            pointers: BTreeSet::new(),
            records: BTreeMap::new(),
            builtin: CompactHashtableWriter::new(config.bucket_size),
            builtin_names: HashSet::new(),
            unregistered: CompactHashtableWriter::new(config.bucket_size),
            unregistered_names: HashSet::new(),
        }
    }

    /// The configuration in use
    #[must_use]
    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Current size of the buffer
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` while nothing but the header space has been allocated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.len() == HEADER_SIZE
    }

    /// The bytes written so far
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    /// Allocates a zeroed, word-aligned block of at least `size` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::ImageTooLarge`] if the image would outgrow the configured maximum.
    pub fn alloc(&mut self, size: usize) -> Result<ArchiveOffset> {
        let offset = self.buffer.len();
        let Some(end) = align_word(size.max(1)).checked_add(offset) else {
            return Err(ImageTooLarge(usize::MAX));
        };
        if end > self.config.max_image_size || end > u32::MAX as usize {
            return Err(ImageTooLarge(end));
        }

        self.buffer.resize(end, 0);
        Ok(ArchiveOffset::new(offset as u32))
    }

    /// Whether `offset` refers to an allocated object (not the header, not past the end).
    #[must_use]
    pub fn is_in_buffer_space(&self, offset: ArchiveOffset) -> bool {
        let offset = offset.as_usize();
        offset >= HEADER_SIZE && offset < self.buffer.len()
    }

    /// Marks the 4-byte field at `field` as holding a reference.
    ///
    /// # Panics
    /// Panics if the field is not inside the allocated space.
    pub fn mark_pointer(&mut self, field: usize) {
        assert!(
            field >= HEADER_SIZE && field + 4 <= self.buffer.len(),
            "reference field {:#x} outside the buffer",
            field
        );
        self.pointers.insert(field as u32);
    }

    /// Writes a primitive at `at`.
    pub(crate) fn write_at<T: ArchiveIO>(&mut self, at: usize, value: T) -> Result<()> {
        let mut offset = at;
        write_le_at(&mut self.buffer, &mut offset, value)
    }

    /// Writes a reference to `target` at `at`; `None` stores the null offset and is not marked.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOffset`] if `target` is not inside the buffer.
    pub(crate) fn write_pointer(&mut self, at: usize, target: Option<ArchiveOffset>) -> Result<()> {
        match target {
            Some(target) => {
                if !self.is_in_buffer_space(target) {
                    return Err(InvalidOffset);
                }
                self.write_at(at, target.value())?;
                self.mark_pointer(at);
            }
            None => self.write_at(at, 0u32)?,
        }
        Ok(())
    }

    /// Interns `name`, returning the offset of its symbol. Interning the same text twice yields
    /// the same offset.
    ///
    /// # Errors
    /// Returns [`crate::Error::ImageTooLarge`] if the symbol does not fit.
    pub fn intern_symbol(&mut self, name: &str) -> Result<ArchiveOffset> {
        if let Some(offset) = self.symbols.get(name) {
            return Ok(*offset);
        }

        let offset = self.alloc(symbol_size(name))?;
        write_symbol(&mut self.buffer[offset.as_usize()..], name)?;

        self.symbols.insert(name.to_string(), offset);
        self.symbol_offsets.insert(offset);
        Ok(offset)
    }

    /// Adds a class descriptor. The same name may be added once per loader kind.
    ///
    /// # Errors
    /// Returns [`crate::Error::ImageTooLarge`] if the descriptor does not fit.
    pub fn add_class(
        &mut self,
        name: &str,
        loader: LoaderKind,
        flags: ClassFlags,
    ) -> Result<ArchiveOffset> {
        let name = self.intern_symbol(name)?;
        let offset = self.alloc(CLASS_DESCRIPTOR_SIZE)?;

        let header = ClassHeader {
            name,
            flags,
            loader,
        };
        header.write(&mut self.buffer[offset.as_usize()..])?;
        self.mark_pointer(offset.as_usize());

        self.classes.insert(offset, header);
        Ok(offset)
    }

    /// The descriptor fields of a class added earlier.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownClass`] if `class` is not a class descriptor of this builder.
    pub fn class_header(&self, class: ArchiveOffset) -> Result<ClassHeader> {
        self.classes
            .get(&class)
            .copied()
            .ok_or(UnknownClass(class.value()))
    }

    /// Allocates, fills and registers the record for `info.klass`.
    ///
    /// The record is entered into the record index and into the dictionary matching the class
    /// loader: built-in loaders share one dictionary, every other loader goes to the
    /// unregistered one.
    ///
    /// # Errors
    /// - [`crate::Error::UnknownClass`] if the class or its nest host was not added to this builder
    /// - [`crate::Error::DuplicateClass`] if the class already has a record, or its name is
    ///   already in the target dictionary
    /// - [`crate::Error::InvalidOffset`] if a constraint name is not an interned symbol
    /// - [`crate::Error::Malformed`] if the description contradicts the class properties
    pub fn add_record(&mut self, info: &DumpTimeClassInfo) -> Result<ArchiveOffset> {
        let class = self.class_header(info.klass)?;
        let (hash, name) = {
            let (hash, name) = read_symbol(&self.buffer[class.name.as_usize()..])?;
            (hash, name.to_string())
        };

        let names = if class.is_builtin() {
            &self.builtin_names
        } else {
            &self.unregistered_names
        };
        if self.records.contains_key(&info.klass) || names.contains(&class.name) {
            return Err(DuplicateClass(name));
        }

        if class.has_archived_enum_objs() == info.enum_klass_static_fields.is_empty() {
            return Err(malformed_error!(
                "Class '{}' has {} enum static fields but the enum flag is {}",
                name,
                info.enum_klass_static_fields.len(),
                class.has_archived_enum_objs()
            ));
        }

        if let Some(nest_host) = info.nest_host {
            if !class.is_hidden() {
                return Err(malformed_error!(
                    "Class '{}' has a nest host but is not hidden",
                    name
                ));
            }
            self.class_header(nest_host)?;
        }

        let names = info
            .verifier_constraints
            .iter()
            .flat_map(|constraint| std::iter::once(constraint.name).chain(constraint.from_name))
            .chain(info.loader_constraints.iter().map(|constraint| constraint.name));
        for symbol in names {
            if !self.symbol_offsets.contains(&symbol) {
                return Err(InvalidOffset);
            }
        }

        let shape = RecordShape::new(
            &class,
            info.num_verifier_constraints()?,
            info.num_loader_constraints()?,
            info.num_enum_klass_static_fields()?,
        );
        let record = self.alloc(shape.byte_size())?;
        info.write_record(self, record, &shape)?;
        self.set_for(info.klass, record);

        if class.is_builtin() {
            self.builtin.add(hash, record);
            self.builtin_names.insert(class.name);
        } else {
            self.unregistered.add(hash, record);
            self.unregistered_names.insert(class.name);
        }

        debug!(
            "Record for '{}' ({:?}) at {} - {} bytes, sections {:?}",
            name,
            class.loader,
            record,
            shape.byte_size(),
            shape.sections()
        );

        Ok(record)
    }

    /// Associates `class` with its `record` in the back-pointer index.
    ///
    /// # Panics
    /// Panics if either offset is outside the buffer.
    pub(crate) fn set_for(&mut self, class: ArchiveOffset, record: ArchiveOffset) {
        assert!(self.is_in_buffer_space(class), "class {} outside the buffer", class);
        assert!(self.is_in_buffer_space(record), "record {} outside the buffer", record);
        self.records.insert(class, record);
    }

    /// The record built for `class`, if any.
    #[must_use]
    pub fn record_for(&self, class: ArchiveOffset) -> Option<ArchiveOffset> {
        self.records.get(&class).copied()
    }

    /// Number of records added
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Writes the trailing tables and the header and returns the finished image.
    ///
    /// # Errors
    /// Returns [`crate::Error::ImageTooLarge`] if the tables do not fit.
    pub fn seal(mut self) -> Result<Vec<u8>> {
        let mut header = ArchiveHeader::new();
        header.record_count = self.records.len() as u32;
        header.record_index = self.write_record_index()?;

        let builtin = std::mem::take(&mut self.builtin);
        let (offset, builtin_stats) = builtin.dump(&mut self)?;
        header.builtin_dictionary = offset;

        let unregistered = std::mem::take(&mut self.unregistered);
        let (offset, unregistered_stats) = unregistered.dump(&mut self)?;
        header.unregistered_dictionary = offset;

        header.pointer_map = self.write_pointer_map()?;
        header.image_size = self.buffer.len() as u32;
        header.write(&mut self.buffer[..HEADER_SIZE])?;

        info!(
            "Sealed archive - {} bytes, {} records, {} references",
            header.image_size,
            header.record_count,
            self.pointers.len()
        );
        info!("Built-in dictionary: {}", builtin_stats);
        info!("Unregistered dictionary: {}", unregistered_stats);

        Ok(self.buffer)
    }

    fn write_record_index(&mut self) -> Result<ArchiveOffset> {
        if self.records.is_empty() {
            return Ok(ArchiveOffset::NULL);
        }

        let entries: Vec<(ArchiveOffset, ArchiveOffset)> =
            self.records.iter().map(|(class, record)| (*class, *record)).collect();
        let table = self.alloc(INDEX_PREFIX_SIZE + entries.len() * INDEX_ENTRY_SIZE)?;

        let start = table.as_usize();
        self.write_at(start, entries.len() as u32)?;
        for (i, (class, record)) in entries.into_iter().enumerate() {
            let at = start + INDEX_PREFIX_SIZE + i * INDEX_ENTRY_SIZE;
            self.write_pointer(at, Some(class))?;
            self.write_pointer(at + 4, Some(record))?;
        }

        Ok(table)
    }

    fn write_pointer_map(&mut self) -> Result<ArchiveOffset> {
        let fields: Vec<u32> = self.pointers.iter().copied().collect();
        let table = self.alloc(TABLE_PREFIX_SIZE + fields.len() * 4)?;

        let start = table.as_usize();
        self.write_at(start, fields.len() as u32)?;
        for (i, field) in fields.into_iter().enumerate() {
            self.write_at(start + TABLE_PREFIX_SIZE + i * 4, field)?;
        }

        Ok(table)
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new(ArchiveConfig::default())
    }
}
