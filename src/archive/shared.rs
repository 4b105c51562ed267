//! A mapped, read-only archive image.

use std::{fmt, path::Path};

use log::{info, warn};

use crate::{
    archive::{
        header::{ArchiveHeader, HEADER_SIZE},
        Address, ArchiveOffset, ClassDescriptor, InternedName, Symbol,
    },
    config::ArchiveConfig,
    dictionary::{CompactHashtable, RunTimeSharedDictionary},
    file::{io::read_le_at, Backend, Memory, Physical},
    record::{RecordIndex, RunTimeClassInfo},
    Error::{Empty, InvalidOffset, OutOfBounds},
    Result,
};

/// An archive image mapped at some base address.
///
/// The base address is whatever the backend hands out: the heap block of an in-memory image or
/// the start of a file mapping. Every reference inside the image is an offset from that base, so
/// the same bytes mapped twice at different addresses behave identically.
///
/// `SharedArchive` is immutable and `Send + Sync`; all views into it ([`Symbol`],
/// [`ClassDescriptor`], [`RunTimeClassInfo`], dictionaries) borrow it and need no locking.
///
/// # Examples
///
/// ```rust
/// use classarchive::prelude::*;
///
/// let mut builder = ArchiveBuilder::default();
/// let main = builder.add_class("app/Main", LoaderKind::App, ClassFlags::empty())?;
/// builder.add_record(&DumpTimeClassInfo::new(main))?;
///
/// let archive = SharedArchive::from_mem(builder.seal()?)?;
/// let dictionary = archive.builtin_dictionary()?;
/// for record in dictionary.iter()? {
///     let record = record?;
///     let name = record.klass().name()?;
///     assert_eq!(archive.find_record(&name)?, Some(record));
/// }
/// # Ok::<(), classarchive::Error>(())
/// ```
pub struct SharedArchive {
    data: Box<dyn Backend>,
    header: ArchiveHeader,
    base: Address,
    records: RecordIndex,
}

impl SharedArchive {
    /// Maps an archive image file.
    ///
    /// # Arguments
    ///
    /// * `file` - Path of the image file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be opened or mapped
    /// - The file is empty
    /// - The header or any of the trailing tables is invalid
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use classarchive::SharedArchive;
    /// use std::path::Path;
    ///
    /// let archive = SharedArchive::from_file(Path::new("classes.jsa"))?;
    /// println!("{} records at {}", archive.record_index().len(), archive.base());
    /// # Ok::<(), classarchive::Error>(())
    /// ```
    pub fn from_file(file: &Path) -> Result<SharedArchive> {
        Self::from_file_with_config(file, ArchiveConfig::default())
    }

    /// Maps an archive image file with an explicit configuration.
    ///
    /// # Errors
    ///
    /// See [`SharedArchive::from_file`].
    pub fn from_file_with_config(file: &Path, config: ArchiveConfig) -> Result<SharedArchive> {
        let input = Physical::new(file)?;

        Self::load(input, config)
    }

    /// Uses an image already held in memory.
    ///
    /// # Arguments
    ///
    /// * `data` - The bytes of the image, typically straight from [`crate::ArchiveBuilder::seal`]
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is empty or the image is invalid.
    pub fn from_mem(data: Vec<u8>) -> Result<SharedArchive> {
        Self::from_mem_with_config(data, ArchiveConfig::default())
    }

    /// Uses an image already held in memory, with an explicit configuration.
    ///
    /// # Errors
    ///
    /// See [`SharedArchive::from_mem`].
    pub fn from_mem_with_config(data: Vec<u8>, config: ArchiveConfig) -> Result<SharedArchive> {
        let input = Memory::new(data);

        Self::load(input, config)
    }

    fn load<T: Backend + 'static>(data: T, config: ArchiveConfig) -> Result<SharedArchive> {
        if data.is_empty() {
            return Err(Empty);
        }

        let header = ArchiveHeader::read(data.data())?;
        let image = data.data_slice(0, header.image_size as usize)?;

        if config.verify_pointers {
            verify_pointer_map(image, header.pointer_map)?;
        } else {
            warn!("Pointer verification disabled, trusting reference fields of the image");
        }

        let records = RecordIndex::load(image, header.record_index, header.record_count)?;
        let base = Address(data.data().as_ptr() as usize);

        info!(
            "Mapped archive at {} - {} bytes, {} records",
            base,
            header.image_size,
            records.len()
        );

        Ok(SharedArchive {
            data: Box::new(data),
            header,
            base,
            records,
        })
    }

    /// The validated header
    #[must_use]
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// The address the image is mapped at
    #[must_use]
    pub fn base(&self) -> Address {
        self.base
    }

    /// Size of the image in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.header.image_size as usize
    }

    /// Always `false`; an image holds at least its header.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bytes of the image, excluding anything the backend holds past its end
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.image()
    }

    pub(crate) fn image(&self) -> &[u8] {
        &self.data.data()[..self.header.image_size as usize]
    }

    /// Whether `address` lies inside the image.
    #[must_use]
    pub fn contains(&self, address: Address) -> bool {
        address.value() >= self.base.value() && address.value() - self.base.value() < self.len()
    }

    /// Translates an offset into a live address.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOffset`] for the null offset and for offsets past the image.
    pub fn offset_to_address(&self, offset: ArchiveOffset) -> Result<Address> {
        if offset.is_null() || offset.as_usize() >= self.len() {
            return Err(InvalidOffset);
        }
        Ok(Address(self.base.value() + offset.as_usize()))
    }

    /// Translates an offset into a live address, mapping the null offset to `None`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOffset`] for offsets past the image.
    pub fn offset_to_address_or_null(&self, offset: ArchiveOffset) -> Result<Option<Address>> {
        if offset.is_null() {
            return Ok(None);
        }
        self.offset_to_address(offset).map(Some)
    }

    /// Translates a live address back into an offset.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOffset`] if the address is not inside the image.
    pub fn address_to_offset(&self, address: Address) -> Result<ArchiveOffset> {
        if !self.contains(address) {
            return Err(InvalidOffset);
        }
        Ok(ArchiveOffset::new((address.value() - self.base.value()) as u32))
    }

    /// `len` bytes of the image starting at `address`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOffset`] if `address` is outside the image and
    /// [`crate::Error::OutOfBounds`] if the range runs past its end.
    pub fn bytes_at(&self, address: Address, len: usize) -> Result<&[u8]> {
        let start = self.address_to_offset(address)?.as_usize();
        match start.checked_add(len) {
            Some(end) if end <= self.len() => self.data.data_slice(start, len),
            _ => Err(OutOfBounds),
        }
    }

    /// The symbol at `offset`.
    ///
    /// # Errors
    /// Returns an error if the offset is invalid or the symbol malformed.
    pub fn symbol_at(&self, offset: ArchiveOffset) -> Result<Symbol<'_>> {
        Symbol::read(self, self.offset_to_address(offset)?)
    }

    /// The class descriptor at `offset`.
    ///
    /// # Errors
    /// Returns an error if the offset is invalid or the descriptor malformed.
    pub fn class_at(&self, offset: ArchiveOffset) -> Result<ClassDescriptor<'_>> {
        ClassDescriptor::read(self, self.offset_to_address(offset)?)
    }

    /// The record at `offset`.
    ///
    /// # Errors
    /// Returns an error if the offset is invalid or the record malformed.
    pub fn record_at(&self, offset: ArchiveOffset) -> Result<RunTimeClassInfo<'_>> {
        RunTimeClassInfo::read(self, self.offset_to_address(offset)?)
    }

    /// The class to record back-pointers
    #[must_use]
    pub fn record_index(&self) -> &RecordIndex {
        &self.records
    }

    /// The record of an archived class.
    ///
    /// # Errors
    /// Returns an error if the indexed record is malformed.
    ///
    /// # Panics
    /// Panics if `klass` belongs to another archive or has no record.
    pub fn record_for<'a>(&'a self, klass: &ClassDescriptor<'a>) -> Result<RunTimeClassInfo<'a>> {
        assert!(
            std::ptr::eq(klass.archive(), self),
            "class {:?} is not part of this archive",
            klass
        );
        let class = self.address_to_offset(klass.address())?;
        self.record_at(self.records.get(class))
    }

    /// The dictionary of classes defined by built-in loaders.
    ///
    /// # Errors
    /// Returns an error if the table is malformed.
    pub fn builtin_dictionary(&self) -> Result<RunTimeSharedDictionary<'_>> {
        CompactHashtable::load(self, self.header.builtin_dictionary)
    }

    /// The dictionary of classes defined by other loaders.
    ///
    /// # Errors
    /// Returns an error if the table is malformed.
    pub fn unregistered_dictionary(&self) -> Result<RunTimeSharedDictionary<'_>> {
        CompactHashtable::load(self, self.header.unregistered_dictionary)
    }

    /// Finds the record of the class called `name`, checking built-in classes first.
    ///
    /// # Errors
    /// Returns an error if a dictionary or a candidate record is malformed.
    pub fn find_record<K: InternedName + ?Sized>(
        &self,
        name: &K,
    ) -> Result<Option<RunTimeClassInfo<'_>>> {
        if let Some(record) = self.builtin_dictionary()?.lookup(name)? {
            return Ok(Some(record));
        }
        self.unregistered_dictionary()?.lookup(name)
    }
}

impl fmt::Debug for SharedArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedArchive")
            .field("base", &self.base)
            .field("header", &self.header)
            .field("records", &self.records.len())
            .finish()
    }
}

/// Checks that every marked reference field holds null or an offset inside the image.
fn verify_pointer_map(image: &[u8], pointer_map: ArchiveOffset) -> Result<()> {
    if pointer_map.is_null() {
        return Err(malformed_error!("Archive has no pointer map"));
    }

    let mut offset = pointer_map.as_usize();
    let count = read_le_at::<u32>(image, &mut offset)?;
    offset += 4;

    for _ in 0..count {
        let field = read_le_at::<u32>(image, &mut offset)? as usize;
        if field < HEADER_SIZE {
            return Err(malformed_error!("Reference field {:#x} inside the header", field));
        }

        let mut at = field;
        let target = read_le_at::<u32>(image, &mut at)? as usize;
        if target != 0 && (target < HEADER_SIZE || target >= image.len()) {
            return Err(malformed_error!(
                "Reference field {:#x} points outside the image - {:#x}",
                field,
                target
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        file::io::write_le_at,
        test::{build_archive, sample_classes},
        Error,
    };

    #[test]
    fn empty_input() {
        assert!(matches!(SharedArchive::from_mem(Vec::new()), Err(Error::Empty)));
    }

    #[test]
    fn translation() {
        let archive =
            SharedArchive::from_mem(build_archive(&sample_classes(), ArchiveConfig::default()))
                .unwrap();
        let offset = ArchiveOffset(HEADER_SIZE as u32);
        let address = archive.offset_to_address(offset).unwrap();

        assert_eq!(address.value(), archive.base().value() + HEADER_SIZE);
        assert_eq!(archive.address_to_offset(address).unwrap(), offset);
        assert!(archive.contains(address));

        assert!(matches!(
            archive.offset_to_address(ArchiveOffset::NULL),
            Err(Error::InvalidOffset)
        ));
        assert_eq!(archive.offset_to_address_or_null(ArchiveOffset::NULL).unwrap(), None);
        assert!(archive
            .offset_to_address(ArchiveOffset(archive.len() as u32))
            .is_err());

        let outside = Address(archive.base().value() + archive.len());
        assert!(!archive.contains(outside));
        assert!(archive.address_to_offset(outside).is_err());
        assert!(archive.address_to_offset(Address(0)).is_err());
    }

    #[test]
    fn bytes_at_bounds() {
        let archive =
            SharedArchive::from_mem(build_archive(&sample_classes(), ArchiveConfig::default()))
                .unwrap();
        let last = archive
            .offset_to_address(ArchiveOffset(archive.len() as u32 - 4))
            .unwrap();

        assert_eq!(archive.bytes_at(last, 4).unwrap().len(), 4);
        assert!(matches!(archive.bytes_at(last, 5), Err(Error::OutOfBounds)));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut image = build_archive(&sample_classes(), ArchiveConfig::default());
        let size = image.len();
        image.extend_from_slice(&[0xAA; 32]);

        let archive = SharedArchive::from_mem(image).unwrap();
        assert_eq!(archive.len(), size);
        assert_eq!(archive.data().len(), size);

        // The backend holds the trailing bytes, reads still stop at the image size.
        let last = archive
            .offset_to_address(ArchiveOffset(size as u32 - 8))
            .unwrap();
        assert_eq!(archive.bytes_at(last, 8).unwrap(), &archive.data()[size - 8..]);
        assert!(matches!(archive.bytes_at(last, 9), Err(Error::OutOfBounds)));
    }

    #[test]
    fn corrupt_reference_detected() {
        let mut image = build_archive(&sample_classes(), ArchiveConfig::default());
        let header = ArchiveHeader::read(&image).unwrap();

        // The first marked field is the name of the first class descriptor.
        let mut offset = header.pointer_map.as_usize() + 8;
        let field = read_le_at::<u32>(&image, &mut offset).unwrap() as usize;
        let mut at = field;
        write_le_at(&mut image, &mut at, 0xFFFF_0000u32).unwrap();

        assert!(matches!(
            SharedArchive::from_mem(image.clone()),
            Err(Error::Malformed { .. })
        ));

        let unchecked = SharedArchive::from_mem_with_config(image, ArchiveConfig::minimal()).unwrap();
        assert!(!unchecked.record_index().is_empty());
    }

    #[test]
    fn record_for_class() {
        let archive =
            SharedArchive::from_mem(build_archive(&sample_classes(), ArchiveConfig::default()))
                .unwrap();

        for (class, record) in archive.record_index().iter() {
            let klass = archive.class_at(class).unwrap();
            let found = archive.record_for(&klass).unwrap();
            assert_eq!(found.offset().unwrap(), record);
            assert_eq!(found.klass(), klass);
        }
    }

    #[test]
    #[should_panic]
    fn record_for_foreign_class() {
        let first =
            SharedArchive::from_mem(build_archive(&sample_classes(), ArchiveConfig::default()))
                .unwrap();
        let second =
            SharedArchive::from_mem(build_archive(&sample_classes(), ArchiveConfig::default()))
                .unwrap();

        let (class, _) = first.record_index().iter().next().unwrap();
        let klass = first.class_at(class).unwrap();
        let _ = second.record_for(&klass);
    }
}
