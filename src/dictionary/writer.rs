use std::fmt;

use crate::{
    archive::{ArchiveBuilder, ArchiveOffset},
    dictionary::{
        BUCKET_OFFSET_MASK, BUCKET_TYPE_SHIFT, REGULAR_BUCKET_TYPE, TABLE_HEADER_SIZE,
        VALUE_ONLY_BUCKET_TYPE,
    },
    Result,
};

/// Shape of a dumped dictionary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactHashtableStats {
    /// Number of buckets, excluding the sentinel
    pub bucket_count: usize,
    /// Number of values
    pub entry_count: usize,
    /// Buckets without any value
    pub empty_buckets: usize,
    /// Buckets holding a single value without its hash
    pub value_only_buckets: usize,
    /// Buckets holding `(hash, value)` pairs
    pub regular_buckets: usize,
    /// Number of values in the fullest bucket
    pub max_bucket_length: usize,
}

impl fmt::Display for CompactHashtableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries in {} buckets (empty {}, value-only {}, regular {}, longest {})",
            self.entry_count,
            self.bucket_count,
            self.empty_buckets,
            self.value_only_buckets,
            self.regular_buckets,
            self.max_bucket_length
        )
    }
}

/// Collects `(hash, value)` pairs and lays them out as a compact hashtable.
///
/// The table is built in bulk: add every entry, then [`CompactHashtableWriter::dump`] once.
#[derive(Debug, Clone)]
pub struct CompactHashtableWriter {
    bucket_size: usize,
    entries: Vec<(u32, ArchiveOffset)>,
}

impl CompactHashtableWriter {
    /// Creates a writer aiming at `bucket_size` entries per bucket.
    #[must_use]
    pub fn new(bucket_size: usize) -> Self {
        CompactHashtableWriter {
            bucket_size: bucket_size.max(1),
            entries: Vec::new(),
        }
    }

    /// Adds a value under `hash`.
    pub fn add(&mut self, hash: u32, value: ArchiveOffset) {
        self.entries.push((hash, value));
    }

    /// Number of values added
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no value was added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The number of buckets the table will have.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        (self.entries.len() / self.bucket_size).max(1)
    }

    /// Writes the table into `builder`, returning its offset, or the null offset when there is
    /// nothing to write.
    ///
    /// # Errors
    /// Returns an error if the table does not fit the image.
    pub fn dump(self, builder: &mut ArchiveBuilder) -> Result<(ArchiveOffset, CompactHashtableStats)> {
        if self.entries.is_empty() {
            return Ok((ArchiveOffset::NULL, CompactHashtableStats::default()));
        }

        let bucket_count = self.bucket_count();
        let mut buckets: Vec<Vec<(u32, ArchiveOffset)>> = vec![Vec::new(); bucket_count];
        for (hash, value) in &self.entries {
            buckets[*hash as usize % bucket_count].push((*hash, *value));
        }

        let words: usize = buckets
            .iter()
            .map(|bucket| if bucket.len() == 1 { 1 } else { bucket.len() * 2 })
            .sum();
        if words > BUCKET_OFFSET_MASK as usize {
            return Err(malformed_error!(
                "Dictionary of {} entries exceeds the bucket index range",
                self.entries.len()
            ));
        }

        let table = builder.alloc(TABLE_HEADER_SIZE + (bucket_count + 1) * 4 + words * 4)?;
        let start = table.as_usize();
        let bucket_base = start + TABLE_HEADER_SIZE;
        let entry_base = bucket_base + (bucket_count + 1) * 4;

        builder.write_at(start, bucket_count as u32)?;
        builder.write_at(start + 4, self.entries.len() as u32)?;

        let mut stats = CompactHashtableStats {
            bucket_count,
            entry_count: self.entries.len(),
            ..CompactHashtableStats::default()
        };

        let mut index = 0usize;
        for (i, bucket) in buckets.iter().enumerate() {
            stats.max_bucket_length = stats.max_bucket_length.max(bucket.len());

            let bucket_type = match bucket.len() {
                0 => {
                    stats.empty_buckets += 1;
                    REGULAR_BUCKET_TYPE
                }
                1 => {
                    stats.value_only_buckets += 1;
                    VALUE_ONLY_BUCKET_TYPE
                }
                _ => {
                    stats.regular_buckets += 1;
                    REGULAR_BUCKET_TYPE
                }
            };
            builder.write_at(bucket_base + i * 4, bucket_info(bucket_type, index))?;

            if let [(_, value)] = bucket.as_slice() {
                builder.write_pointer(entry_base + index * 4, Some(*value))?;
                index += 1;
                continue;
            }

            for (hash, value) in bucket {
                builder.write_at(entry_base + index * 4, *hash)?;
                builder.write_pointer(entry_base + (index + 1) * 4, Some(*value))?;
                index += 2;
            }
        }

        builder.write_at(
            bucket_base + bucket_count * 4,
            bucket_info(VALUE_ONLY_BUCKET_TYPE, index),
        )?;

        Ok((table, stats))
    }
}

impl Default for CompactHashtableWriter {
    fn default() -> Self {
        Self::new(4)
    }
}

fn bucket_info(bucket_type: u32, index: usize) -> u32 {
    (bucket_type << BUCKET_TYPE_SHIFT) | (index as u32 & BUCKET_OFFSET_MASK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::io::read_le;

    fn word(builder: &ArchiveBuilder, at: usize) -> u32 {
        read_le::<u32>(&builder.data()[at..]).unwrap()
    }

    #[test]
    fn empty_writes_nothing() {
        let mut builder = ArchiveBuilder::default();
        let before = builder.len();

        let (offset, stats) = CompactHashtableWriter::new(4).dump(&mut builder).unwrap();
        assert!(offset.is_null());
        assert_eq!(stats, CompactHashtableStats::default());
        assert_eq!(builder.len(), before);
    }

    #[test]
    fn bucket_count() {
        let mut writer = CompactHashtableWriter::new(4);
        assert_eq!(writer.bucket_count(), 1);

        for i in 0..9 {
            writer.add(i, ArchiveOffset(0x40));
        }
        assert_eq!(writer.bucket_count(), 2);
        assert_eq!(writer.len(), 9);
    }

    #[test]
    fn layout() {
        let mut builder = ArchiveBuilder::default();
        let value = builder.alloc(8).unwrap();

        // Hashes 0, 2 and 4 share bucket 0; hash 3 is alone in bucket 1.
        let mut writer = CompactHashtableWriter::new(2);
        writer.add(0, value);
        writer.add(2, value);
        writer.add(3, value);
        writer.add(4, value);
        let (table, stats) = writer.dump(&mut builder).unwrap();

        assert_eq!(stats.bucket_count, 2);
        assert_eq!(stats.entry_count, 4);
        assert_eq!(stats.regular_buckets, 1);
        assert_eq!(stats.value_only_buckets, 1);
        assert_eq!(stats.max_bucket_length, 3);

        let start = table.as_usize();
        assert_eq!(word(&builder, start), 2);
        assert_eq!(word(&builder, start + 4), 4);

        let bucket0 = word(&builder, start + 8);
        let bucket1 = word(&builder, start + 12);
        let sentinel = word(&builder, start + 16);
        assert_eq!(bucket0 >> BUCKET_TYPE_SHIFT, REGULAR_BUCKET_TYPE);
        assert_eq!(bucket0 & BUCKET_OFFSET_MASK, 0);
        assert_eq!(bucket1 >> BUCKET_TYPE_SHIFT, VALUE_ONLY_BUCKET_TYPE);
        assert_eq!(bucket1 & BUCKET_OFFSET_MASK, 6);
        assert_eq!(sentinel & BUCKET_OFFSET_MASK, 7);

        let entries = start + 20;
        assert_eq!(word(&builder, entries), 0);
        assert_eq!(word(&builder, entries + 4), value.value());
        assert_eq!(word(&builder, entries + 24), value.value());
    }
}
