//! Offline trace tools behind the `gltrace` subcommands
//!
//! Tools report with `anyhow` errors; the library layers below them use
//! [`crate::error::TraceError`].

pub mod checksum;
pub mod inspect;
pub mod provenance;
pub mod retrace;
pub mod rewrite;

pub use checksum::{sidecar_path, update_md5, verify, ChecksumStatus, VerifyReport};
pub use inspect::{call_json, dump, format_call, info, version, DumpOptions, TraceInfo};
pub use provenance::{conversion, file_md5, version_conversion};
pub use retrace::{load_config, render_report, replay_file};
pub use rewrite::{remap_tid, set_header_size, trim, upgrade, RewriteSummary};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::OutputFormat;
    use crate::codec::{CallRecord, Opaque, Scalar, Value};
    use crate::container::{Metadata, ThreadInfo, TraceReader, TraceWriter, WriterOptions};
    use crate::replay::{ReplayConfig, StopReason};
    use crate::schema::SchemaRegistry;
    use regex::Regex;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn registry() -> Arc<SchemaRegistry> {
        Arc::new(SchemaRegistry::default_gles().unwrap())
    }

    fn call(
        registry: &SchemaRegistry,
        name: &str,
        tid: u8,
        args: Vec<Value>,
        ret: Value,
    ) -> CallRecord {
        CallRecord::new(registry.lookup(name).unwrap().id, tid, args, ret)
    }

    fn swap(registry: &SchemaRegistry, tid: u8) -> CallRecord {
        call(
            registry,
            "eglSwapBuffers",
            tid,
            vec![Value::Scalar(Scalar::U64(1)), Value::Scalar(Scalar::U64(2))],
            Value::Scalar(Scalar::Bool(true)),
        )
    }

    fn clear(registry: &SchemaRegistry, tid: u8, mask: u32) -> CallRecord {
        call(registry, "glClear", tid, vec![Value::Scalar(Scalar::U32(mask))], Value::Void)
    }

    /// Frame `i` holds `i + 1` clears followed by a swap
    fn frames(registry: &SchemaRegistry, count: u32) -> Vec<CallRecord> {
        let mut records = Vec::new();
        for frame in 0..count {
            for n in 0..=frame {
                records.push(clear(registry, 0, frame * 100 + n));
            }
            records.push(swap(registry, 0));
        }
        records
    }

    fn write(
        path: &Path,
        records: &[CallRecord],
        metadata: Metadata,
        options: WriterOptions,
    ) -> PathBuf {
        let mut writer = TraceWriter::create_with(path, registry(), &metadata, options).unwrap();
        for record in records {
            writer.append_call(record).unwrap();
        }
        writer.finish(&metadata).unwrap();
        path.to_path_buf()
    }

    fn consistent(records: &[CallRecord], registry: &SchemaRegistry) -> Metadata {
        let mut metadata = Metadata::default();
        metadata.threads.push(ThreadInfo::new(0, 320, 240));
        metadata.call_count = records.len() as u64;
        metadata.frame_count = records
            .iter()
            .filter(|r| registry.by_id(r.function_id).is_some_and(|s| s.frame_boundary))
            .count() as u64;
        metadata
    }

    fn raw_bytes(path: &Path) -> Vec<Vec<u8>> {
        let reader = TraceReader::open(path, registry()).unwrap();
        let bytes = reader.raw_records().map(|r| r.unwrap().bytes.to_vec()).collect();
        bytes
    }

    #[test]
    fn test_trim_keeps_exact_frames() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let records = frames(&registry, 5);
        let input = write(
            &dir.path().join("in.pat"),
            &records,
            consistent(&records, &registry),
            WriterOptions::default(),
        );
        let output = dir.path().join("out.pat");

        let summary = trim(&input, &output, 2, 3, registry.clone()).unwrap();
        assert_eq!(summary.frames_written, 2);
        // frame 2 has three clears and frame 3 four, plus a swap each
        assert_eq!(summary.records_written, 9);

        let reader = TraceReader::open(&output, registry.clone()).unwrap();
        assert_eq!(reader.metadata().frame_count, 2);
        assert_eq!(reader.metadata().call_count, 9);
        assert_eq!(reader.metadata().conversions().len(), 1);
        assert_eq!(reader.metadata().conversions()[0].tool, "trim");
        assert_eq!(reader.metadata().conversions()[0].input.md5, file_md5(&input).unwrap());

        // frames 0 and 1 hold 2 + 3 records
        let original = raw_bytes(&input);
        assert_eq!(raw_bytes(&output), original[5..14].to_vec());
    }

    #[test]
    fn test_trim_rejects_bad_ranges() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let records = frames(&registry, 2);
        let input = write(
            &dir.path().join("in.pat"),
            &records,
            consistent(&records, &registry),
            WriterOptions::default(),
        );
        assert!(trim(&input, &dir.path().join("out.pat"), 3, 1, registry.clone()).is_err());
        assert!(trim(&input, &input, 0, 1, registry).is_err());
    }

    #[test]
    fn test_remap_tid_rewrites_records_and_metadata() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let records = vec![clear(&registry, 1, 1), clear(&registry, 0, 2), swap(&registry, 1)];
        let mut metadata = consistent(&records, &registry);
        metadata.default_tid = 1;
        metadata.threads = vec![ThreadInfo::new(0, 10, 10), ThreadInfo::new(1, 640, 480)];
        let input = write(&dir.path().join("in.pat"), &records, metadata, WriterOptions::default());
        let output = dir.path().join("out.pat");

        remap_tid(&input, &output, 1, 4, registry.clone()).unwrap();

        let reader = TraceReader::open(&output, registry).unwrap();
        let tids: Vec<u8> = reader.records().map(|r| r.unwrap().thread_id).collect();
        assert_eq!(tids, vec![4, 0, 4]);
        let metadata = reader.metadata();
        assert_eq!(metadata.default_tid, 4);
        assert_eq!(metadata.threads[1].id, 4);
        assert_eq!((metadata.threads[1].win_w, metadata.threads[1].win_h), (640, 480));
        assert_eq!(metadata.threads[0].id, 0);
        assert_eq!(metadata.conversions().len(), 1);

        let before = raw_bytes(&input);
        let after = raw_bytes(&output);
        assert_eq!(before[1], after[1]);
        assert_eq!(before[0][3..], after[0][3..]);
    }

    #[test]
    fn test_upgrade_tags_legacy_blobs() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let texture = call(
            &registry,
            "glCompressedTexImage2D",
            0,
            vec![
                Value::Enum(0x0DE1),
                Value::Scalar(Scalar::I32(0)),
                Value::Enum(0x8D64),
                Value::Scalar(Scalar::I32(4)),
                Value::Scalar(Scalar::I32(4)),
                Value::Scalar(Scalar::I32(0)),
                Value::Scalar(Scalar::I32(8)),
                Value::Opaque(Opaque::Blob(vec![9; 8])),
            ],
            Value::Void,
        );
        let records = vec![texture, swap(&registry, 0)];
        let legacy = WriterOptions {
            version: 5,
            ..WriterOptions::default()
        };
        let metadata = consistent(&records, &registry);
        let input = write(&dir.path().join("old.pat"), &records, metadata, legacy);
        let output = dir.path().join("new.pat");

        let summary = upgrade(&input, &output, registry.clone()).unwrap();
        assert_eq!(summary.records_written, 2);

        let old = TraceReader::open(&input, registry.clone()).unwrap();
        let new = TraceReader::open(&output, registry).unwrap();
        assert_eq!(new.version(), 7);
        let old_records: Vec<_> = old.records().map(Result::unwrap).collect();
        let new_records: Vec<_> = new.records().map(Result::unwrap).collect();
        assert_eq!(old_records, new_records);
        // the tagged form is one word longer
        assert_eq!(raw_bytes(&output)[0].len(), raw_bytes(&input)[0].len() + 4);

        let entry = &new.metadata().conversions()[0];
        assert_eq!(entry.tool, "upgrade");
        assert_eq!(entry.version_info.map(|v| (v.from, v.to)), Some((5, 7)));
    }

    #[test]
    fn test_upgrade_drops_legacy_readback_pixels() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let args = vec![
            Value::Scalar(Scalar::I32(0)),
            Value::Scalar(Scalar::I32(0)),
            Value::Scalar(Scalar::I32(1)),
            Value::Scalar(Scalar::I32(1)),
            Value::Enum(0x1908),
            Value::Enum(0x1401),
            Value::Opaque(Opaque::Blob(vec![1, 2, 3, 4])),
        ];
        let read_pixels = call(&registry, "glReadPixels", 0, args.clone(), Value::Void);
        let records = vec![read_pixels, swap(&registry, 0)];
        let legacy = WriterOptions {
            version: 5,
            ..WriterOptions::default()
        };
        let metadata = consistent(&records, &registry);
        let input = write(&dir.path().join("old.pat"), &records, metadata, legacy);
        let output = dir.path().join("new.pat");

        let summary = upgrade(&input, &output, registry.clone()).unwrap();
        assert_eq!(summary.records_written, 2);
        assert_eq!(summary.frames_written, 1);

        let old = TraceReader::open(&input, registry.clone()).unwrap();
        let new = TraceReader::open(&output, registry).unwrap();
        let old_records: Vec<_> = old.records().map(Result::unwrap).collect();
        let new_records: Vec<_> = new.records().map(Result::unwrap).collect();
        assert_eq!(new_records[0].args[..6], args[..6]);
        assert_eq!(new_records[0].args[6], Value::Opaque(Opaque::NoOp));
        assert_eq!(new_records[1], old_records[1]);
    }

    #[test]
    fn test_set_header_size_grows_once() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let records = frames(&registry, 2);
        let options = WriterOptions {
            json_reserve: 400,
            ..WriterOptions::default()
        };
        let metadata = consistent(&records, &registry);
        let path = write(&dir.path().join("t.pat"), &records, metadata, options);
        let before = raw_bytes(&path);

        assert!(set_header_size(&path, 4096).unwrap());
        assert!(!set_header_size(&path, 4096).unwrap());
        assert!(set_header_size(&path, 100).is_err());

        let reader = TraceReader::open(&path, registry).unwrap();
        assert_eq!(reader.header().json_capacity(), 4096);
        assert_eq!(reader.metadata().conversions().len(), 1);
        assert_eq!(reader.metadata().frame_count, 2);
        drop(reader);
        assert_eq!(raw_bytes(&path), before);
    }

    #[test]
    fn test_verify_and_sidecar_checksum() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let records = frames(&registry, 3);
        let path = write(
            &dir.path().join("t.pat"),
            &records,
            consistent(&records, &registry),
            WriterOptions::default(),
        );

        let reader = TraceReader::open(&path, registry.clone()).unwrap();
        let report = verify(&reader).unwrap();
        assert!(report.is_ok(), "{}", report);
        assert_eq!(report.checksum, ChecksumStatus::NoSidecar);
        assert_eq!((report.records, report.frames), (9, 3));

        let (sidecar, digest) = update_md5(&path).unwrap();
        assert_eq!(sidecar, dir.path().join("t.meta"));
        assert_eq!(verify(&reader).unwrap().checksum, ChecksumStatus::Match);

        std::fs::write(&sidecar, r#"{"md5": "00ff", "owner": "ci"}"#).unwrap();
        let report = verify(&reader).unwrap();
        assert!(matches!(
            report.checksum,
            ChecksumStatus::Mismatch { ref actual, .. } if *actual == digest
        ));
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 1);

        // other sidecar keys survive an update
        update_md5(&path).unwrap();
        let text = std::fs::read_to_string(&sidecar).unwrap();
        let sidecar: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(sidecar["owner"], "ci");
        assert_eq!(sidecar["md5"], digest.as_str());
    }

    #[test]
    fn test_verify_flags_wrong_counts() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let records = frames(&registry, 2);
        let mut metadata = consistent(&records, &registry);
        metadata.frame_count = 7;
        let path = write(&dir.path().join("t.pat"), &records, metadata, WriterOptions::default());

        let reader = TraceReader::open(&path, registry).unwrap();
        let report = verify(&reader).unwrap();
        assert!(!report.is_ok());
        assert!(report.problems[0].contains("frameCnt is 7"));
    }

    #[test]
    fn test_dump_selection() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let mut records = frames(&registry, 3);
        records.push(clear(&registry, 2, 5));
        let path = write(
            &dir.path().join("t.pat"),
            &records,
            consistent(&records, &registry),
            WriterOptions::default(),
        );
        let reader = TraceReader::open(&path, registry).unwrap();

        let mut out = Vec::new();
        let options = DumpOptions {
            filter: Some(Regex::new("^egl").unwrap()),
            ..DumpOptions::default()
        };
        assert_eq!(dump(&reader, &options, OutputFormat::Text, &mut out).unwrap(), 3);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("eglSwapBuffers(display=1, surface=2) = true"));

        let options = DumpOptions {
            thread: Some(2),
            ..DumpOptions::default()
        };
        let mut out = Vec::new();
        assert_eq!(dump(&reader, &options, OutputFormat::Json, &mut out).unwrap(), 1);
        let line: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(line["function"], "glClear");
        assert_eq!(line["args"]["mask"], 5);

        let options = DumpOptions {
            limit: Some(4),
            ..DumpOptions::default()
        };
        assert_eq!(dump(&reader, &options, OutputFormat::Text, std::io::sink()).unwrap(), 4);
    }

    #[test]
    fn test_info_and_version() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let records = frames(&registry, 2);
        let path = write(
            &dir.path().join("t.pat"),
            &records,
            consistent(&records, &registry),
            WriterOptions::default(),
        );
        assert_eq!(version(&path).unwrap(), 5);

        let reader = TraceReader::open(&path, registry).unwrap();
        let summary = info(&reader);
        assert_eq!(summary.records, 5);
        assert_eq!(summary.calls_per_function["glClear"], 3);
        assert_eq!(summary.calls_per_function["eglSwapBuffers"], 2);
        assert!(summary.to_string().contains("320x240"));
    }

    #[test]
    fn test_replay_file_with_frame_limit() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let records = frames(&registry, 4);
        let path = write(
            &dir.path().join("t.pat"),
            &records,
            consistent(&records, &registry),
            WriterOptions::default(),
        );
        let config = load_config(None, Some(2)).unwrap();
        let report = replay_file(&path, registry, config).unwrap();
        assert_eq!(report.stop_reason, StopReason::FrameLimit);
        assert_eq!(report.frames, 2);
        assert_eq!(report.calls, 5);
        assert!(render_report(&report).contains("stopped : frame limit"));
        assert_eq!(load_config(None, None).unwrap(), ReplayConfig::default());
    }
}
