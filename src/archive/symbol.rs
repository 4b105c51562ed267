//! Interned names stored in the archive.
//!
//! A symbol is laid out as `[hash: u32][len: u32][utf-8 bytes]`, padded to a word boundary. The
//! hash is computed once when the builder interns the name; lookups reuse it and then compare
//! symbols by identity (their address), never by content.

use std::fmt;

use crate::{
    archive::{align_word, Address, SharedArchive},
    file::io::{read_le_at, write_le_at},
    Result,
};

/// Size of the `[hash][len]` prefix of a symbol.
pub(crate) const SYMBOL_HEADER_SIZE: usize = 8;

/// The identity hash of a name, as stored in its symbol.
#[must_use]
pub fn symbol_hash(name: &str) -> u32 {
    crc32fast::hash(name.as_bytes())
}

/// Number of bytes a symbol for `name` occupies in the image.
pub(crate) fn symbol_size(name: &str) -> usize {
    align_word(SYMBOL_HEADER_SIZE + name.len())
}

/// Writes the symbol for `name` to the start of `data`.
pub(crate) fn write_symbol(data: &mut [u8], name: &str) -> Result<()> {
    let mut offset = 0;
    write_le_at(data, &mut offset, symbol_hash(name))?;
    write_le_at(data, &mut offset, name.len() as u32)?;

    let end = offset + name.len();
    if end > data.len() {
        return Err(crate::Error::OutOfBounds);
    }
    data[offset..end].copy_from_slice(name.as_bytes());
    Ok(())
}

/// Decodes the symbol at the start of `data` into its hash and text.
pub(crate) fn read_symbol(data: &[u8]) -> Result<(u32, &str)> {
    let mut offset = 0;
    let hash = read_le_at::<u32>(data, &mut offset)?;
    let len = read_le_at::<u32>(data, &mut offset)? as usize;

    let Some(bytes) = offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
    else {
        return Err(malformed_error!("Symbol of {} bytes is truncated", len));
    };
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok((hash, text)),
        Err(_) => Err(malformed_error!("Symbol is not valid UTF-8")),
    }
}

/// A name usable as a dictionary key.
///
/// Keys are canonical: two keys denote the same name exactly when their identities are equal.
/// Implementors outside this crate represent names interned by the runtime that are not part of
/// the archive; such names never match an archived record.
pub trait InternedName {
    /// The address identifying this name
    fn identity(&self) -> Address;

    /// The hash of this name, equal to [`symbol_hash`] of its text
    fn identity_hash(&self) -> u32;
}

/// An interned name inside a mapped archive.
#[derive(Clone, Copy)]
pub struct Symbol<'a> {
    address: Address,
    hash: u32,
    text: &'a str,
}

impl<'a> Symbol<'a> {
    /// Decodes the symbol at `address` of `archive`.
    ///
    /// # Errors
    /// Returns an error if the address is outside the archive or the symbol is malformed.
    pub(crate) fn read(archive: &'a SharedArchive, address: Address) -> Result<Symbol<'a>> {
        let prefix = archive.bytes_at(address, SYMBOL_HEADER_SIZE)?;
        let mut offset = 4;
        let len = read_le_at::<u32>(prefix, &mut offset)? as usize;

        let data = archive.bytes_at(address, SYMBOL_HEADER_SIZE + len)?;
        let (hash, text) = read_symbol(data)?;

        Ok(Symbol {
            address,
            hash,
            text,
        })
    }

    /// The text of this name
    #[must_use]
    pub fn as_str(&self) -> &'a str {
        self.text
    }

    /// The hash stored with this name
    #[must_use]
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// The live address of this symbol
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }
}

impl InternedName for Symbol<'_> {
    fn identity(&self) -> Address {
        self.address
    }

    fn identity_hash(&self) -> u32 {
        self.hash
    }
}

impl PartialEq for Symbol<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Symbol<'_> {}

impl fmt::Debug for Symbol<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?} @ {})", self.text, self.address)
    }
}

impl fmt::Display for Symbol<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::WORD_SIZE;

    #[test]
    fn size_is_word_aligned() {
        assert_eq!(symbol_size(""), align_word(8));
        assert_eq!(symbol_size("java/lang/Object") % WORD_SIZE, 0);
        assert!(symbol_size("java/lang/Object") >= 8 + 16);
    }

    #[test]
    fn write_then_read() {
        let name = "java/util/HashMap";
        let mut data = vec![0u8; symbol_size(name)];
        write_symbol(&mut data, name).unwrap();

        let (hash, text) = read_symbol(&data).unwrap();
        assert_eq!(text, name);
        assert_eq!(hash, symbol_hash(name));
    }

    #[test]
    fn hash_is_stable() {
        assert_eq!(symbol_hash("Foo"), symbol_hash("Foo"));
        assert_ne!(symbol_hash("Foo"), symbol_hash("Bar"));
    }

    #[test]
    fn truncated() {
        let mut data = vec![0u8; 16];
        write_le_at(&mut data, &mut 4, 100u32).unwrap();
        assert!(read_symbol(&data).is_err());
    }

    #[test]
    fn invalid_utf8() {
        let mut data = vec![0u8; 16];
        write_symbol(&mut data, "ab").unwrap();
        data[8] = 0xFF;
        assert!(read_symbol(&data).is_err());
    }
}
