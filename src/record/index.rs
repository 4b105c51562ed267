use std::collections::HashMap;

use crate::{archive::ArchiveOffset, file::io::read_le_at, Result};

/// Size of the `[count][pad]` prefix of the table.
pub(crate) const INDEX_PREFIX_SIZE: usize = 8;
/// Size of one `(class, record)` pair.
pub(crate) const INDEX_ENTRY_SIZE: usize = 8;

/// Maps each archived class to its record.
///
/// The builder persists the pairs as a table inside the image,
/// `[count: u32][pad: u32][(class: u32, record: u32) ...]`, which is loaded into a hash map when
/// the archive is mapped. Lookup by class offset is O(1).
#[derive(Debug, Default, Clone)]
pub struct RecordIndex {
    records: HashMap<ArchiveOffset, ArchiveOffset>,
}

impl RecordIndex {
    /// Loads the table at `table` from the validated `image`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the table is truncated, disagrees with
    /// `expected_count`, lists a class twice or refers outside the image.
    pub fn load(image: &[u8], table: ArchiveOffset, expected_count: u32) -> Result<RecordIndex> {
        if table.is_null() {
            if expected_count != 0 {
                return Err(malformed_error!(
                    "Archive claims {} records but has no record index",
                    expected_count
                ));
            }
            return Ok(RecordIndex::default());
        }

        let mut offset = table.as_usize();
        let count = read_le_at::<u32>(image, &mut offset)?;
        if count != expected_count {
            return Err(malformed_error!(
                "Record index holds {} entries, header claims {}",
                count,
                expected_count
            ));
        }

        let needed = (count as usize)
            .checked_mul(INDEX_ENTRY_SIZE)
            .and_then(|entries| entries.checked_add(INDEX_PREFIX_SIZE));
        let available = image.len().saturating_sub(table.as_usize());
        if needed.map_or(true, |needed| needed > available) {
            return Err(malformed_error!(
                "Record index at {} claims {} entries but only {} bytes follow it",
                table,
                count,
                available
            ));
        }
        offset += 4;

        let in_image = |offset: ArchiveOffset| !offset.is_null() && offset.as_usize() < image.len();

        let mut records = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let class = ArchiveOffset::new(read_le_at(image, &mut offset)?);
            let record = ArchiveOffset::new(read_le_at(image, &mut offset)?);
            if !in_image(class) || !in_image(record) {
                return Err(malformed_error!(
                    "Record index entry {} -> {} lies outside the image",
                    class,
                    record
                ));
            }
            if records.insert(class, record).is_some() {
                return Err(malformed_error!("Class {} is indexed twice", class));
            }
        }

        Ok(RecordIndex { records })
    }

    /// The record of `class`.
    ///
    /// # Panics
    /// Panics if `class` has no record in this archive.
    #[must_use]
    pub fn get(&self, class: ArchiveOffset) -> ArchiveOffset {
        match self.records.get(&class) {
            Some(record) => *record,
            None => panic!("class {} has no record in this archive", class),
        }
    }

    /// The record of `class`, if it has one.
    #[must_use]
    pub fn find(&self, class: ArchiveOffset) -> Option<ArchiveOffset> {
        self.records.get(&class).copied()
    }

    /// Number of indexed classes
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no class is indexed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All `(class, record)` pairs, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (ArchiveOffset, ArchiveOffset)> + '_ {
        self.records.iter().map(|(class, record)| (*class, *record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        archive::ArchiveHeader,
        file::io::write_le_at,
        test::{build_archive, sample_classes},
        ArchiveConfig, Error, SharedArchive,
    };

    fn table(entries: &[(u32, u32)], count: u32) -> Vec<u8> {
        let mut data = vec![0u8; 0x100];
        let mut offset = 0x40;
        write_le_at(&mut data, &mut offset, count).unwrap();
        offset += 4;
        for (class, record) in entries {
            write_le_at(&mut data, &mut offset, *class).unwrap();
            write_le_at(&mut data, &mut offset, *record).unwrap();
        }
        data
    }

    #[test]
    fn get_and_find() {
        let data = table(&[(0x48, 0x50), (0x10, 0x18)], 2);
        let index = RecordIndex::load(&data, ArchiveOffset(0x40), 2).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.get(ArchiveOffset(0x48)), ArchiveOffset(0x50));
        assert_eq!(index.find(ArchiveOffset(0x10)), Some(ArchiveOffset(0x18)));
        assert_eq!(index.find(ArchiveOffset(0x50)), None);
    }

    #[test]
    #[should_panic]
    fn get_unknown_class() {
        let data = table(&[(0x48, 0x50)], 1);
        let index = RecordIndex::load(&data, ArchiveOffset(0x40), 1).unwrap();
        let _ = index.get(ArchiveOffset(0x50));
    }

    #[test]
    fn null_table() {
        let index = RecordIndex::load(&[], ArchiveOffset::NULL, 0).unwrap();
        assert!(index.is_empty());
        assert!(RecordIndex::load(&[], ArchiveOffset::NULL, 1).is_err());
    }

    #[test]
    fn malformed_tables() {
        let data = table(&[(0x48, 0x50)], 1);
        assert!(RecordIndex::load(&data, ArchiveOffset(0x40), 2).is_err());

        let data = table(&[(0x48, 0x1000)], 1);
        assert!(RecordIndex::load(&data, ArchiveOffset(0x40), 1).is_err());

        let data = table(&[(0x48, 0x50), (0x48, 0x18)], 2);
        assert!(RecordIndex::load(&data, ArchiveOffset(0x40), 2).is_err());

        let data = table(&[(0x48, 0x50)], 3);
        assert!(RecordIndex::load(&data, ArchiveOffset(0x40), 3).is_err());
    }

    #[test]
    fn huge_count_is_rejected() {
        let data = table(&[(0x48, 0x50)], u32::MAX);
        assert!(matches!(
            RecordIndex::load(&data, ArchiveOffset(0x40), u32::MAX),
            Err(Error::Malformed { .. })
        ));

        // One entry more than the bytes after the table can hold.
        let fits = ((0x100 - 0x40 - INDEX_PREFIX_SIZE) / INDEX_ENTRY_SIZE) as u32;
        let data = table(&[], fits + 1);
        assert!(matches!(
            RecordIndex::load(&data, ArchiveOffset(0x40), fits + 1),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn huge_counts_in_image() {
        let mut image = build_archive(&sample_classes(), ArchiveConfig::default());
        let header = ArchiveHeader::read(&image).unwrap();

        let mut at = header.record_index.as_usize();
        write_le_at(&mut image, &mut at, u32::MAX).unwrap();
        image[36..40].copy_from_slice(&u32::MAX.to_le_bytes());

        assert!(matches!(
            SharedArchive::from_mem_with_config(image.clone(), ArchiveConfig::minimal()),
            Err(Error::Malformed { .. })
        ));

        // With a plausible header count the index itself must still be rejected.
        image[36..40].copy_from_slice(&header.record_count.to_le_bytes());
        assert!(matches!(
            SharedArchive::from_mem_with_config(image, ArchiveConfig::minimal()),
            Err(Error::Malformed { .. })
        ));
    }
}
