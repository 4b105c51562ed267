//! Compact, offset-based hash dictionaries.
//!
//! A dictionary maps an interned class name to the archived record of that class. It is built
//! once by [`CompactHashtableWriter`] and read in place by [`CompactHashtable`], without
//! materializing anything on the heap: a lookup hashes into a bucket, scans the few entries in
//! it and compares candidates by identity.
//!
//! # Layout
//!
//! ```text
//! [bucket_count: u32][entry_count: u32]
//! [bucket_info: u32] x (bucket_count + 1)
//! [entries: u32] ...
//! ```
//!
//! The top two bits of a bucket info are the bucket type, the low 30 bits the index of its first
//! entry word. A bucket ends where the next one starts; the extra trailing info is a sentinel
//! marking the end of the last bucket. A regular bucket holds `(hash, value)` pairs. A bucket
//! with exactly one value is stored as value-only: the hash is omitted and the candidate is
//! decided by the identity comparison alone.
//!
//! # Key Components
//!
//! - [`CompactHashtable`] - Read-only view of a dumped table
//! - [`CompactHashtableWriter`] - Bulk builder
//! - [`ArchivedValue`] - What a table must know about the values it stores
//! - [`RunTimeSharedDictionary`] - The class name to record dictionary

mod writer;

pub use writer::{CompactHashtableStats, CompactHashtableWriter};

use std::{fmt, marker::PhantomData};

use crate::{
    archive::{ArchiveOffset, InternedName, SharedArchive},
    file::io::read_le_at,
    record::RunTimeClassInfo,
    Result,
};

/// Size of the `[bucket_count][entry_count]` prefix.
pub(crate) const TABLE_HEADER_SIZE: usize = 8;
/// Bucket of `(hash, value)` pairs.
pub(crate) const REGULAR_BUCKET_TYPE: u32 = 0;
/// Bucket of a single value without hash.
pub(crate) const VALUE_ONLY_BUCKET_TYPE: u32 = 1;
pub(crate) const BUCKET_TYPE_SHIFT: u32 = 30;
pub(crate) const BUCKET_OFFSET_MASK: u32 = (1 << BUCKET_TYPE_SHIFT) - 1;

/// A value stored in a [`CompactHashtable`].
pub trait ArchivedValue<'a>: Sized {
    /// Decodes the value at `offset`.
    ///
    /// # Errors
    /// Returns an error if the offset does not lead to a valid value.
    fn load(archive: &'a SharedArchive, offset: ArchiveOffset) -> Result<Self>;

    /// Whether this value is stored under `key`. Implementations compare identities, never
    /// text.
    ///
    /// # Errors
    /// Returns an error if the value's own key cannot be resolved.
    fn equals<K: InternedName + ?Sized>(&self, key: &K) -> Result<bool>;
}

/// The dictionary from class name to archived record.
pub type RunTimeSharedDictionary<'a> = CompactHashtable<'a, RunTimeClassInfo<'a>>;

/// A compact hashtable inside a mapped archive.
///
/// The bucket array is validated when the view is created, so lookups never read outside the
/// table.
pub struct CompactHashtable<'a, V> {
    archive: &'a SharedArchive,
    bucket_count: u32,
    entry_count: u32,
    buckets: &'a [u8],
    entries: &'a [u8],
    _marker: PhantomData<fn() -> V>,
}

impl<'a, V: ArchivedValue<'a> + 'a> CompactHashtable<'a, V> {
    /// Opens the table at `offset`; the null offset is an empty table.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the bucket array is inconsistent or the table
    /// runs past the image.
    pub fn load(archive: &'a SharedArchive, offset: ArchiveOffset) -> Result<Self> {
        if offset.is_null() {
            return Ok(CompactHashtable {
                archive,
                bucket_count: 0,
                entry_count: 0,
                buckets: &[],
                entries: &[],
                _marker: PhantomData,
            });
        }

        let image = archive.image();
        let mut cursor = offset.as_usize();
        let bucket_count = read_le_at::<u32>(image, &mut cursor)?;
        let entry_count = read_le_at::<u32>(image, &mut cursor)?;
        if bucket_count == 0 {
            return Err(malformed_error!("Dictionary at {} has no buckets", offset));
        }

        let buckets_len = (bucket_count as usize + 1) * 4;
        let Some(buckets) = cursor
            .checked_add(buckets_len)
            .and_then(|end| image.get(cursor..end))
        else {
            return Err(malformed_error!(
                "Dictionary at {} has a truncated bucket array",
                offset
            ));
        };
        cursor += buckets_len;

        let mut infos = Vec::with_capacity(bucket_count as usize + 1);
        let mut position = 0;
        for _ in 0..=bucket_count {
            infos.push(read_le_at::<u32>(buckets, &mut position)?);
        }

        let words = (infos[bucket_count as usize] & BUCKET_OFFSET_MASK) as usize;
        let Some(entries) = cursor
            .checked_add(words * 4)
            .and_then(|end| image.get(cursor..end))
        else {
            return Err(malformed_error!(
                "Dictionary at {} has a truncated entry array",
                offset
            ));
        };

        let mut values = 0usize;
        for pair in infos.windows(2) {
            let start = pair[0] & BUCKET_OFFSET_MASK;
            let end = pair[1] & BUCKET_OFFSET_MASK;
            if end < start {
                return Err(malformed_error!("Dictionary at {} has unordered buckets", offset));
            }

            let len = (end - start) as usize;
            match pair[0] >> BUCKET_TYPE_SHIFT {
                VALUE_ONLY_BUCKET_TYPE if len == 1 => values += 1,
                REGULAR_BUCKET_TYPE if len % 2 == 0 => values += len / 2,
                bucket_type => {
                    return Err(malformed_error!(
                        "Dictionary at {} has a bucket of type {} spanning {} words",
                        offset,
                        bucket_type,
                        len
                    ))
                }
            }
        }

        if values != entry_count as usize {
            return Err(malformed_error!(
                "Dictionary at {} claims {} entries but holds {}",
                offset,
                entry_count,
                values
            ));
        }

        Ok(CompactHashtable {
            archive,
            bucket_count,
            entry_count,
            buckets,
            entries,
            _marker: PhantomData,
        })
    }

    /// Number of values in the table
    #[must_use]
    pub fn len(&self) -> usize {
        self.entry_count as usize
    }

    /// Returns `true` if the table holds no values
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Number of buckets, excluding the sentinel
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.bucket_count as usize
    }

    fn bucket_info(&self, index: usize) -> Result<u32> {
        let mut offset = index * 4;
        read_le_at(self.buckets, &mut offset)
    }

    fn entry(&self, index: usize) -> Result<u32> {
        let mut offset = index * 4;
        read_le_at(self.entries, &mut offset)
    }

    /// Finds the value stored under `key`.
    ///
    /// Returns `Ok(None)` when nothing matches, including for keys that are not part of the
    /// archive at all.
    ///
    /// # Errors
    /// Returns an error if a candidate value cannot be decoded.
    pub fn lookup<K: InternedName + ?Sized>(&self, key: &K) -> Result<Option<V>> {
        if self.entry_count == 0 {
            return Ok(None);
        }

        let hash = key.identity_hash();
        let index = hash as usize % self.bucket_count as usize;
        let info = self.bucket_info(index)?;
        let start = (info & BUCKET_OFFSET_MASK) as usize;
        let end = (self.bucket_info(index + 1)? & BUCKET_OFFSET_MASK) as usize;

        if info >> BUCKET_TYPE_SHIFT == VALUE_ONLY_BUCKET_TYPE {
            let value = V::load(self.archive, ArchiveOffset::new(self.entry(start)?))?;
            return Ok(value.equals(key)?.then_some(value));
        }

        for at in (start..end).step_by(2) {
            if self.entry(at)? != hash {
                continue;
            }

            let value = V::load(self.archive, ArchiveOffset::new(self.entry(at + 1)?))?;
            if value.equals(key)? {
                return Ok(Some(value));
            }
        }

        Ok(None)
    }

    /// The offsets of all values, bucket by bucket.
    ///
    /// # Errors
    /// Cannot fail for a validated table; the `Result` mirrors the decoding layer.
    pub fn value_offsets(&self) -> Result<Vec<ArchiveOffset>> {
        let mut offsets = Vec::with_capacity(self.len());
        for index in 0..self.bucket_count as usize {
            let info = self.bucket_info(index)?;
            let start = (info & BUCKET_OFFSET_MASK) as usize;
            let end = (self.bucket_info(index + 1)? & BUCKET_OFFSET_MASK) as usize;

            if info >> BUCKET_TYPE_SHIFT == VALUE_ONLY_BUCKET_TYPE {
                offsets.push(ArchiveOffset::new(self.entry(start)?));
            } else {
                for at in (start..end).step_by(2) {
                    offsets.push(ArchiveOffset::new(self.entry(at + 1)?));
                }
            }
        }
        Ok(offsets)
    }

    /// Visits every value in the table.
    ///
    /// # Errors
    /// Stops at and returns the first decoding error.
    pub fn iter(&self) -> Result<impl Iterator<Item = Result<V>> + 'a> {
        let archive = self.archive;
        Ok(self
            .value_offsets()?
            .into_iter()
            .map(move |offset| V::load(archive, offset)))
    }
}

impl<V> fmt::Debug for CompactHashtable<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompactHashtable")
            .field("bucket_count", &self.bucket_count)
            .field("entry_count", &self.entry_count)
            .finish()
    }
}
