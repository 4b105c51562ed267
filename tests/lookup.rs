//! Integration tests for dictionary lookup, relocation and file-backed archives.

use classarchive::prelude::*;
use std::io::Write;

/// A name interned by the runtime outside of any archive.
struct RuntimeName {
    address: usize,
    text: &'static str,
}

impl InternedName for RuntimeName {
    fn identity(&self) -> Address {
        Address(self.address)
    }

    fn identity_hash(&self) -> u32 {
        symbol_hash(self.text)
    }
}

const CLASSES: &[(&str, LoaderKind)] = &[
    ("java/lang/Object", LoaderKind::Boot),
    ("java/lang/String", LoaderKind::Boot),
    ("java/util/HashMap", LoaderKind::Boot),
    ("jdk/internal/misc/Unsafe", LoaderKind::Platform),
    ("app/Main", LoaderKind::App),
    ("app/Util", LoaderKind::App),
    ("plugin/Widget", LoaderKind::Unregistered),
    ("plugin/Gadget", LoaderKind::Unregistered),
];

fn build(config: ArchiveConfig) -> Result<Vec<u8>> {
    let mut builder = ArchiveBuilder::new(config);
    for (i, (name, loader)) in CLASSES.iter().enumerate() {
        let class = builder.add_class(name, *loader, ClassFlags::empty())?;
        builder.add_record(&DumpTimeClassInfo::new(class).with_crc(i as u32 * 100, i as u32))?;
    }
    builder.intern_symbol("not/a/Class")?;
    builder.seal()
}

/// The archived symbol whose text is `name`, found through the class descriptors.
fn class_name<'a>(archive: &'a SharedArchive, name: &str) -> Result<Symbol<'a>> {
    for (class, _) in archive.record_index().iter() {
        let symbol = archive.class_at(class)?.name()?;
        if symbol.as_str() == name {
            return Ok(symbol);
        }
    }
    Err(Error::Error(format!("no class named {}", name)))
}

#[test]
fn test_every_class_is_found() -> Result<()> {
    let archive = SharedArchive::from_mem(build(ArchiveConfig::default())?)?;

    assert_eq!(archive.builtin_dictionary()?.len(), 6);
    assert_eq!(archive.unregistered_dictionary()?.len(), 2);

    for (name, loader) in CLASSES {
        let symbol = class_name(&archive, name)?;
        let record = archive
            .find_record(&symbol)?
            .ok_or(Error::Error(format!("{} not found", name)))?;

        assert_eq!(record.klass().name()?, symbol);
        assert_eq!(record.klass().loader(), *loader);

        let dictionary = if loader.is_builtin() {
            archive.builtin_dictionary()?
        } else {
            archive.unregistered_dictionary()?
        };
        assert_eq!(dictionary.lookup(&symbol)?, Some(record));
    }
    Ok(())
}

#[test]
fn test_misses() -> Result<()> {
    let archive = SharedArchive::from_mem(build(ArchiveConfig::default())?)?;

    // Same text as an archived class, different identity.
    let foreign = RuntimeName {
        address: 0x10,
        text: "java/lang/Object",
    };
    assert!(archive.find_record(&foreign)?.is_none());

    // Archived symbol that names no class.
    let symbols: Vec<Symbol<'_>> = (64..archive.len() as u32)
        .step_by(std::mem::size_of::<usize>())
        .filter_map(|offset| archive.symbol_at(ArchiveOffset(offset)).ok())
        .filter(|symbol| symbol.as_str() == "not/a/Class")
        .collect();
    assert!(!symbols.is_empty());
    for symbol in symbols {
        assert!(archive.find_record(&symbol)?.is_none());
    }

    // A built-in class name is not found in the unregistered dictionary.
    let object = class_name(&archive, "java/lang/Object")?;
    assert!(archive.unregistered_dictionary()?.lookup(&object)?.is_none());
    Ok(())
}

#[test]
fn test_builtin_dictionary_is_searched_first() -> Result<()> {
    let mut builder = ArchiveBuilder::default();
    let app = builder.add_class("shared/Name", LoaderKind::App, ClassFlags::empty())?;
    let custom = builder.add_class("shared/Name", LoaderKind::Unregistered, ClassFlags::empty())?;
    builder.add_record(&DumpTimeClassInfo::new(custom).with_crc(5, 6))?;
    builder.add_record(&DumpTimeClassInfo::new(app))?;

    let archive = SharedArchive::from_mem(builder.seal()?)?;
    let name = archive.class_at(app)?.name()?;
    assert_eq!(name, archive.class_at(custom)?.name()?);

    let record = archive
        .find_record(&name)?
        .ok_or(Error::Error("not found".to_string()))?;
    assert_eq!(record.klass().loader(), LoaderKind::App);

    let record = archive
        .unregistered_dictionary()?
        .lookup(&name)?
        .ok_or(Error::Error("not found".to_string()))?;
    assert!(record.matches(5, 6));
    Ok(())
}

#[test]
fn test_relocation() -> Result<()> {
    let image = build(ArchiveConfig::default())?;
    let first = SharedArchive::from_mem(image.clone())?;
    let second = SharedArchive::from_mem(image)?;
    assert_ne!(first.base(), second.base());

    for (name, _) in CLASSES {
        let a = first
            .find_record(&class_name(&first, name)?)?
            .ok_or(Error::Error(format!("{} not found", name)))?;
        let b = second
            .find_record(&class_name(&second, name)?)?
            .ok_or(Error::Error(format!("{} not found", name)))?;

        assert_eq!(a.offset()?, b.offset()?);
        assert_eq!(a.data(), b.data());
        assert_eq!(a.klass().name()?.as_str(), b.klass().name()?.as_str());
        if !a.klass().is_builtin() {
            assert_eq!(a.crc(), b.crc());
        }

        // Names are identities: a name from one mapping never finds a record in the other.
        assert!(second.find_record(&a.klass().name()?)?.is_none());
    }
    Ok(())
}

#[test]
fn test_bucket_sizes() -> Result<()> {
    for bucket_size in [1, 2, 3, 8, 64] {
        let config = ArchiveConfig::default().with_bucket_size(bucket_size);
        let archive = SharedArchive::from_mem(build(config)?)?;

        assert_eq!(archive.builtin_dictionary()?.bucket_count(), (6 / bucket_size).max(1));
        for (name, _) in CLASSES {
            assert!(archive.find_record(&class_name(&archive, name)?)?.is_some());
        }
    }
    Ok(())
}

#[test]
fn test_from_file() -> Result<()> {
    let image = build(ArchiveConfig::default())?;
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(&image)?;
    file.flush()?;

    let archive = SharedArchive::from_file(file.path())?;
    assert_eq!(archive.len(), image.len());
    assert_eq!(archive.data(), image.as_slice());

    let widget = class_name(&archive, "plugin/Widget")?;
    let record = archive
        .find_record(&widget)?
        .ok_or(Error::Error("not found".to_string()))?;
    assert!(record.matches(600, 6));
    Ok(())
}

#[test]
fn test_rejects_foreign_bytes() {
    assert!(matches!(SharedArchive::from_mem(Vec::new()), Err(Error::Empty)));
    assert!(matches!(
        SharedArchive::from_mem(vec![0x4D, 0x5A, 0x90, 0x00].repeat(32)),
        Err(Error::NotSupported)
    ));
    assert!(matches!(
        SharedArchive::from_mem(vec![0u8; 16]),
        Err(Error::OutOfBounds)
    ));
}
