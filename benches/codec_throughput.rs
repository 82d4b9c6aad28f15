//! Record codec and trace reader throughput
//!
//! Covers the per-call cost paid at capture time (encode + append) and the
//! per-call cost paid at replay time (decode while iterating a mapped file).
//!
//! ```bash
//! cargo bench --bench codec_throughput
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gltrace::codec::{decode_record, encode_record, CallRecord, CodecContext, Opaque, Scalar, Value};
use gltrace::container::{Metadata, TraceReader, TraceWriter};
use gltrace::schema::SchemaRegistry;
use std::sync::Arc;

fn i32v(v: i32) -> Value {
    Value::Scalar(Scalar::I32(v))
}

/// A typical mix: state changes, a uniform upload, a texture upload and a draw
fn frame_records(registry: &SchemaRegistry, texture_bytes: usize) -> Vec<CallRecord> {
    let call = |name: &str, args: Vec<Value>, ret: Value| {
        let sig = registry.lookup(name).expect("function is in the schema");
        CallRecord::new(sig.id, 0, args, ret)
    };
    vec![
        call("glUseProgram", vec![Value::Handle(3)], Value::Void),
        call("glBindTexture", vec![Value::Enum(0x0DE1), Value::Handle(7)], Value::Void),
        call(
            "glTexImage2D",
            vec![
                Value::Enum(0x0DE1),
                i32v(0),
                i32v(0x1908),
                i32v(64),
                i32v((texture_bytes / 256) as i32),
                i32v(0),
                Value::Enum(0x1908),
                Value::Enum(0x1401),
                Value::Opaque(Opaque::Blob(vec![0x5A; texture_bytes])),
            ],
            Value::Void,
        ),
        call("glUniform1i", vec![Value::Scoped(2), i32v(0)], Value::Void),
        call("glDrawArrays", vec![Value::Enum(0x0004), i32v(0), i32v(3)], Value::Void),
        call(
            "eglSwapBuffers",
            vec![Value::Scalar(Scalar::U64(1)), Value::Scalar(Scalar::U64(2))],
            Value::Scalar(Scalar::Bool(true)),
        ),
    ]
}

fn bench_encode(c: &mut Criterion) {
    let registry = SchemaRegistry::default_gles().expect("built-in schema loads");
    let ctx = CodecContext::new(7);
    let mut group = c.benchmark_group("encode_frame");

    for texture_bytes in [256usize, 16 * 1024, 256 * 1024] {
        let records = frame_records(&registry, texture_bytes);
        group.throughput(Throughput::Bytes(texture_bytes as u64));
        group.bench_with_input(BenchmarkId::from_parameter(texture_bytes), &records, |b, records| {
            b.iter(|| {
                for record in records {
                    let sig = registry.by_id(record.function_id).expect("registered");
                    black_box(encode_record(sig, black_box(record), &ctx).expect("encodes"));
                }
            });
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let registry = SchemaRegistry::default_gles().expect("built-in schema loads");
    let ctx = CodecContext::new(7);
    let encoded: Vec<Vec<u8>> = frame_records(&registry, 4096)
        .iter()
        .map(|r| {
            let sig = registry.by_id(r.function_id).expect("registered");
            encode_record(sig, r, &ctx).expect("encodes")
        })
        .collect();

    c.bench_function("decode_frame", |b| {
        b.iter(|| {
            for bytes in &encoded {
                let decoded = decode_record(black_box(bytes), |id| registry.by_id(id), &ctx);
                black_box(decoded.expect("decodes"));
            }
        });
    });
}

fn bench_reader_iteration(c: &mut Criterion) {
    let registry = Arc::new(SchemaRegistry::default_gles().expect("built-in schema loads"));
    let dir = tempfile::TempDir::new().expect("temp dir");
    let path = dir.path().join("bench.pat");
    let frames = 500u64;

    let records = frame_records(&registry, 1024);
    let mut metadata = Metadata::default();
    metadata.frame_count = frames;
    metadata.call_count = frames * records.len() as u64;
    let mut writer =
        TraceWriter::create(&path, Arc::clone(&registry), &metadata).expect("create trace");
    for _ in 0..frames {
        for record in &records {
            writer.append_call(record).expect("append");
        }
    }
    writer.finish(&metadata).expect("finish");

    let reader = TraceReader::open(&path, registry).expect("open trace");
    let mut group = c.benchmark_group("reader");
    group.throughput(Throughput::Elements(metadata.call_count));
    group.bench_function("iterate_records", |b| {
        b.iter(|| {
            let decoded = reader.records().filter(|r| r.is_ok()).count();
            black_box(decoded)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_reader_iteration);
criterion_main!(benches);
