//! Size and offset computation for `RunTimeClassInfo` records.
//!
//! A record is a fixed header followed by optional sections in a fixed order. A section is
//! either present with a word-aligned size or absent with size zero; there is no length table.
//! Presence is derived once, by [`RecordShape::new`], from the class properties and the three
//! counts. The builder uses the shape to size and fill the block and the reader uses the same
//! function to find its way around it, so the two cannot drift apart.
//!
//! ```text
//! [header][integrity?][nest host?][loader constraints?][verifier constraints?]
//!         [verifier constraint flags?][enum static field root indices?]
//! ```

use bitflags::bitflags;
use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::archive::{align_word, ClassProperties, WORD_SIZE};

/// Bytes of the fixed header: class, nest host, verifier count, loader count.
pub const RECORD_HEADER_SIZE: usize = 16;
/// Bytes of the integrity info: class file size and crc32.
pub const CRC_INFO_SIZE: usize = 8;
/// Bytes of one loader constraint: name, two loader tags, padding.
pub const LOADER_CONSTRAINT_SIZE: usize = 8;
/// Bytes of one verifier constraint: name and from-name.
pub const VERIFIER_CONSTRAINT_SIZE: usize = 8;
/// Bytes of the enum static field count and of each root index.
pub const ENUM_INDEX_SIZE: usize = 4;

/// The parts of a record, in layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum Section {
    /// The fixed header; always present
    Header,
    /// Class file size and crc32, for classes from non-built-in loaders
    Integrity,
    /// Nest host reference slot, for hidden classes
    NestHost,
    /// Loader constraint array
    LoaderConstraints,
    /// Verifier constraint array
    VerifierConstraints,
    /// One flag byte per verifier constraint
    VerifierConstraintFlags,
    /// Count followed by root indices of archived enum static fields
    EnumStaticFields,
}

impl Section {
    /// The presence bit governing this section. The header has none; the flag bytes share the
    /// bit of the verifier constraints they annotate.
    #[must_use]
    pub fn flag(self) -> SectionFlags {
        match self {
            Section::Header => SectionFlags::empty(),
            Section::Integrity => SectionFlags::INTEGRITY,
            Section::NestHost => SectionFlags::NEST_HOST,
            Section::LoaderConstraints => SectionFlags::LOADER_CONSTRAINTS,
            Section::VerifierConstraints | Section::VerifierConstraintFlags => {
                SectionFlags::VERIFIER_CONSTRAINTS
            }
            Section::EnumStaticFields => SectionFlags::ENUM_STATIC_FIELDS,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Which optional sections a record carries
    pub struct SectionFlags : u8 {
        /// Integrity info is present
        const INTEGRITY = 0x01;
        /// The nest host slot is present
        const NEST_HOST = 0x02;
        /// At least one loader constraint
        const LOADER_CONSTRAINTS = 0x04;
        /// At least one verifier constraint (and its flag byte)
        const VERIFIER_CONSTRAINTS = 0x08;
        /// At least one enum static field root index
        const ENUM_STATIC_FIELDS = 0x10;
    }
}

/// The derived layout of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordShape {
    sections: SectionFlags,
    num_verifier_constraints: i32,
    num_loader_constraints: i32,
    num_enum_static_fields: i32,
}

impl RecordShape {
    /// Derives the shape of the record for `class` with the given counts.
    ///
    /// A non-positive enum count means the section is absent.
    ///
    /// # Panics
    /// Panics if either constraint count is negative.
    #[must_use]
    pub fn new<C: ClassProperties + ?Sized>(
        class: &C,
        num_verifier_constraints: i32,
        num_loader_constraints: i32,
        num_enum_static_fields: i32,
    ) -> RecordShape {
        assert!(
            num_verifier_constraints >= 0,
            "negative verifier constraint count"
        );
        assert!(num_loader_constraints >= 0, "negative loader constraint count");

        let mut sections = SectionFlags::empty();
        sections.set(SectionFlags::INTEGRITY, !class.is_builtin());
        sections.set(SectionFlags::NEST_HOST, class.is_hidden());
        sections.set(SectionFlags::LOADER_CONSTRAINTS, num_loader_constraints > 0);
        sections.set(
            SectionFlags::VERIFIER_CONSTRAINTS,
            num_verifier_constraints > 0,
        );
        sections.set(SectionFlags::ENUM_STATIC_FIELDS, num_enum_static_fields > 0);

        RecordShape {
            sections,
            num_verifier_constraints,
            num_loader_constraints,
            num_enum_static_fields: num_enum_static_fields.max(0),
        }
    }

    /// The presence mask
    #[must_use]
    pub fn sections(&self) -> SectionFlags {
        self.sections
    }

    /// Whether `section` occupies any bytes
    #[must_use]
    pub fn has(&self, section: Section) -> bool {
        section == Section::Header || self.sections.contains(section.flag())
    }

    /// Number of verifier constraints
    #[must_use]
    pub fn num_verifier_constraints(&self) -> i32 {
        self.num_verifier_constraints
    }

    /// Number of loader constraints
    #[must_use]
    pub fn num_loader_constraints(&self) -> i32 {
        self.num_loader_constraints
    }

    /// Number of enum static field root indices
    #[must_use]
    pub fn num_enum_static_fields(&self) -> i32 {
        self.num_enum_static_fields
    }

    /// The word-aligned size of `section`, zero when absent.
    #[must_use]
    pub fn section_size(&self, section: Section) -> usize {
        if !self.has(section) {
            return 0;
        }

        let nv = self.num_verifier_constraints as usize;
        let nl = self.num_loader_constraints as usize;
        let ne = self.num_enum_static_fields as usize;

        match section {
            Section::Header => align_word(RECORD_HEADER_SIZE),
            Section::Integrity => align_word(CRC_INFO_SIZE),
            Section::NestHost => WORD_SIZE,
            Section::LoaderConstraints => align_word(LOADER_CONSTRAINT_SIZE * nl),
            Section::VerifierConstraints => align_word(VERIFIER_CONSTRAINT_SIZE * nv),
            Section::VerifierConstraintFlags => align_word(nv),
            Section::EnumStaticFields => align_word(ENUM_INDEX_SIZE + ENUM_INDEX_SIZE * ne),
        }
    }

    /// The byte offset of `section` from the start of the record: the sum of the sizes of all
    /// sections before it.
    #[must_use]
    pub fn offset_of(&self, section: Section) -> usize {
        Section::iter()
            .take_while(|current| *current != section)
            .map(|current| self.section_size(current))
            .sum()
    }

    /// The total size of the record.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        Section::iter()
            .map(|section| self.section_size(section))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ClassFlags, ClassHeader, ArchiveOffset, LoaderKind};

    fn class(loader: LoaderKind, flags: ClassFlags) -> ClassHeader {
        ClassHeader {
            name: ArchiveOffset(0x40),
            flags,
            loader,
        }
    }

    #[test]
    fn header_only() {
        let shape = RecordShape::new(&class(LoaderKind::Boot, ClassFlags::empty()), 0, 0, 0);

        assert_eq!(shape.sections(), SectionFlags::empty());
        assert_eq!(shape.byte_size(), align_word(RECORD_HEADER_SIZE));
        for section in Section::iter().skip(1) {
            assert_eq!(shape.section_size(section), 0);
            assert_eq!(shape.offset_of(section), shape.byte_size());
        }
    }

    #[test]
    fn integrity_only_for_unregistered() {
        for loader in LoaderKind::iter() {
            let shape = RecordShape::new(&class(loader, ClassFlags::empty()), 0, 0, 0);
            assert_eq!(shape.has(Section::Integrity), loader == LoaderKind::Unregistered);
        }
    }

    #[test]
    fn nest_host_only_for_hidden() {
        let shape = RecordShape::new(&class(LoaderKind::App, ClassFlags::HIDDEN), 0, 0, 0);
        assert!(shape.has(Section::NestHost));
        assert_eq!(shape.section_size(Section::NestHost), WORD_SIZE);

        let shape = RecordShape::new(&class(LoaderKind::App, ClassFlags::empty()), 0, 0, 0);
        assert!(!shape.has(Section::NestHost));
    }

    #[test]
    fn enum_section_sizes() {
        let class = class(LoaderKind::Boot, ClassFlags::HAS_ARCHIVED_ENUM_OBJS);

        for count in [-5, -1, 0] {
            let shape = RecordShape::new(&class, 0, 0, count);
            assert_eq!(shape.section_size(Section::EnumStaticFields), 0);
            assert_eq!(shape.num_enum_static_fields(), 0);
        }

        let one = RecordShape::new(&class, 0, 0, 1);
        assert_eq!(one.section_size(Section::EnumStaticFields), align_word(8));

        let three = RecordShape::new(&class, 0, 0, 3);
        assert_eq!(three.section_size(Section::EnumStaticFields), align_word(16));
    }

    #[test]
    fn concrete_scenario() {
        // Two verifier constraints, one loader constraint, not hidden, custom loader.
        let shape = RecordShape::new(&class(LoaderKind::Unregistered, ClassFlags::empty()), 2, 1, 0);

        let expected = align_word(RECORD_HEADER_SIZE)
            + align_word(CRC_INFO_SIZE)
            + align_word(LOADER_CONSTRAINT_SIZE)
            + align_word(2 * VERIFIER_CONSTRAINT_SIZE)
            + align_word(2);
        assert_eq!(shape.byte_size(), expected);

        if WORD_SIZE == 8 {
            assert_eq!(shape.byte_size(), 56);
        }
    }

    #[test]
    fn offsets_are_cumulative() {
        let flags = [
            ClassFlags::empty(),
            ClassFlags::HIDDEN,
            ClassFlags::HAS_ARCHIVED_ENUM_OBJS,
            ClassFlags::HIDDEN | ClassFlags::HAS_ARCHIVED_ENUM_OBJS,
        ];

        for loader in LoaderKind::iter() {
            for flags in flags {
                for nv in 0..4 {
                    for nl in 0..4 {
                        for ne in -1..4 {
                            let shape = RecordShape::new(&class(loader, flags), nv, nl, ne);
                            let sections: Vec<Section> = Section::iter().collect();

                            assert_eq!(shape.offset_of(Section::Header), 0);
                            for pair in sections.windows(2) {
                                assert_eq!(
                                    shape.offset_of(pair[1]),
                                    shape.offset_of(pair[0]) + shape.section_size(pair[0])
                                );
                                assert!(shape.offset_of(pair[1]) >= shape.offset_of(pair[0]));
                            }

                            let last = sections[Section::COUNT - 1];
                            assert_eq!(
                                shape.byte_size(),
                                shape.offset_of(last) + shape.section_size(last)
                            );
                            assert_eq!(shape.byte_size() % WORD_SIZE, 0);
                            assert_eq!(shape, RecordShape::new(&class(loader, flags), nv, nl, ne));
                        }
                    }
                }
            }
        }
    }

    #[test]
    #[should_panic]
    fn negative_verifier_count() {
        let _ = RecordShape::new(&class(LoaderKind::Boot, ClassFlags::empty()), -1, 0, 0);
    }
}
