#![no_main]

use libfuzzer_sys::fuzz_target;
use classarchive::SharedArchive;

fuzz_target!(|data: &[u8]| {
    let Ok(archive) = SharedArchive::from_mem(data.to_vec()) else {
        return;
    };

    for (class, record) in archive.record_index().iter() {
        let _ = archive.class_at(class).and_then(|klass| klass.name());
        if let Ok(record) = archive.record_at(record) {
            let _ = record.verifier_constraints().count();
            let _ = record.loader_constraints().count();
            let _ = record.nest_host();
        }
    }

    for dictionary in [archive.builtin_dictionary(), archive.unregistered_dictionary()] {
        let Ok(dictionary) = dictionary else {
            continue;
        };
        if let Ok(values) = dictionary.iter() {
            for record in values.flatten() {
                if let Ok(name) = record.klass().name() {
                    let _ = dictionary.lookup(&name);
                }
            }
        }
    }
});
