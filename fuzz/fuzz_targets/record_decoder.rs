#![no_main]

use gltrace::codec::{decode_record, CodecContext};
use gltrace::container::SigBook;
use gltrace::schema::SchemaRegistry;
use libfuzzer_sys::fuzz_target;
use std::sync::OnceLock;

fn registry() -> &'static SchemaRegistry {
    static REGISTRY: OnceLock<SchemaRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| SchemaRegistry::default_gles().expect("built-in schema loads"))
}

fuzz_target!(|data: &[u8]| {
    let registry = registry();
    // Walk the bytes as a data section, at the current and at a legacy version
    for version in [7, 5] {
        let ctx = CodecContext::new(version);
        let mut offset = 0;
        while offset < data.len() {
            match decode_record(&data[offset..], |id| registry.by_id(id), &ctx) {
                Ok((_, len)) if len > 0 => offset += len,
                Ok(_) => break,
                Err(e) => match e.resync {
                    Some(len) if len > 0 => offset += len,
                    _ => break,
                },
            }
        }
    }

    // The signature book parser sees the same bytes
    if let Ok((book, _)) = SigBook::decode(data) {
        let _ = book.bind(registry);
    }
});
