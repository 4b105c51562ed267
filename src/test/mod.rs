//! Shared fixtures for unit tests.

use std::collections::HashMap;

use crate::{
    archive::{ArchiveBuilder, ArchiveOffset, ClassFlags, LoaderKind},
    config::ArchiveConfig,
    record::{DumpTimeClassInfo, VerifierConstraintFlags},
};

/// Everything needed to archive one class, by name.
#[derive(Debug, Clone)]
pub struct ClassSpec {
    pub name: String,
    pub loader: LoaderKind,
    pub flags: ClassFlags,
    pub crc: (u32, u32),
    pub nest_host: Option<String>,
    pub verifier_constraints: Vec<(String, Option<String>, VerifierConstraintFlags)>,
    pub loader_constraints: Vec<(String, LoaderKind, LoaderKind)>,
    pub enum_fields: Vec<i32>,
}

impl ClassSpec {
    pub fn new(name: &str, loader: LoaderKind) -> Self {
        ClassSpec {
            name: name.to_string(),
            loader,
            flags: ClassFlags::empty(),
            crc: (0, 0),
            nest_host: None,
            verifier_constraints: Vec::new(),
            loader_constraints: Vec::new(),
            enum_fields: Vec::new(),
        }
    }

    pub fn crc(mut self, size: u32, crc32: u32) -> Self {
        self.crc = (size, crc32);
        self
    }

    pub fn hidden(mut self, nest_host: &str) -> Self {
        self.flags |= ClassFlags::HIDDEN;
        self.nest_host = Some(nest_host.to_string());
        self
    }

    pub fn enum_fields(mut self, fields: &[i32]) -> Self {
        self.flags |= ClassFlags::HAS_ARCHIVED_ENUM_OBJS;
        self.enum_fields = fields.to_vec();
        self
    }

    pub fn verifier(
        mut self,
        name: &str,
        from_name: Option<&str>,
        flags: VerifierConstraintFlags,
    ) -> Self {
        self.verifier_constraints
            .push((name.to_string(), from_name.map(str::to_string), flags));
        self
    }

    pub fn loader_constraint(mut self, name: &str, first: LoaderKind, second: LoaderKind) -> Self {
        self.loader_constraints
            .push((name.to_string(), first, second));
        self
    }
}

/// A small class set touching every record section.
pub fn sample_classes() -> Vec<ClassSpec> {
    vec![
        ClassSpec::new("java/lang/Object", LoaderKind::Boot),
        ClassSpec::new("java/lang/String", LoaderKind::Boot).verifier(
            "java/lang/CharSequence",
            Some("java/lang/String"),
            VerifierConstraintFlags::FROM_IS_OBJECT,
        ),
        ClassSpec::new("app/Color", LoaderKind::App).enum_fields(&[5, 6, 7]),
        ClassSpec::new("app/Main", LoaderKind::App),
        ClassSpec::new("app/Main$$Lambda", LoaderKind::App).hidden("app/Main"),
        ClassSpec::new("plugin/Widget", LoaderKind::Unregistered)
            .crc(1024, 0xDEAD_BEEF)
            .verifier(
                "plugin/Base",
                Some("plugin/Widget"),
                VerifierConstraintFlags::FROM_IS_OBJECT,
            )
            .verifier(
                "java/lang/Object",
                None,
                VerifierConstraintFlags::FROM_IS_ARRAY
                    | VerifierConstraintFlags::FROM_FIELD_IS_PROTECTED,
            )
            .loader_constraint("plugin/Base", LoaderKind::Unregistered, LoaderKind::App),
    ]
}

/// Builds and seals an archive holding one record per spec.
pub fn build_archive(specs: &[ClassSpec], config: ArchiveConfig) -> Vec<u8> {
    let mut builder = ArchiveBuilder::new(config);

    let mut classes: HashMap<String, ArchiveOffset> = HashMap::new();
    let offsets: Vec<ArchiveOffset> = specs
        .iter()
        .map(|spec| {
            let offset = builder
                .add_class(&spec.name, spec.loader, spec.flags)
                .unwrap();
            classes.entry(spec.name.clone()).or_insert(offset);
            offset
        })
        .collect();

    for (spec, klass) in specs.iter().zip(offsets) {
        let mut info = DumpTimeClassInfo::new(klass)
            .with_crc(spec.crc.0, spec.crc.1)
            .with_enum_klass_static_fields(spec.enum_fields.clone());

        if let Some(host) = &spec.nest_host {
            info = info.with_nest_host(classes[host]);
        }
        for (name, from_name, flags) in &spec.verifier_constraints {
            let name = builder.intern_symbol(name).unwrap();
            let from_name = from_name
                .as_deref()
                .map(|from_name| builder.intern_symbol(from_name).unwrap());
            info = info.with_verifier_constraint(name, from_name, *flags);
        }
        for (name, first, second) in &spec.loader_constraints {
            let name = builder.intern_symbol(name).unwrap();
            info = info.with_loader_constraint(name, *first, *second);
        }

        builder.add_record(&info).unwrap();
    }

    builder.seal().unwrap()
}
