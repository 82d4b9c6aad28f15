//! Capture a small multi-threaded application and replay the file headlessly

mod utils;

use gltrace::capture::{memory, CaptureArg, Tracer};
use gltrace::codec::{Scalar, Value};
use gltrace::container::{Metadata, TraceReader, TraceWriter};
use gltrace::handles::ObjectKind;
use gltrace::replay::{HeadlessDriver, ReplayConfig, ReplayEngine, StopReason};
use gltrace::tools;
use tempfile::TempDir;

const ARRAY_BUFFER: u32 = 0x8892;
const STATIC_DRAW: u32 = 0x88E4;
const TRIANGLES: u32 = 0x0004;

fn v(value: Value) -> CaptureArg<'static> {
    value.into()
}

fn i32a(x: i32) -> CaptureArg<'static> {
    v(Value::Scalar(Scalar::I32(x)))
}

/// One frame: upload a vertex buffer, draw it and swap
fn render_frame(tracer: &Tracer, buffer: u32, vertices: &[u8]) {
    tracer
        .record(
            "glGenBuffers",
            vec![i32a(1), v(Value::HandleArray(Some(vec![buffer])))],
            || Value::Void,
        )
        .unwrap();
    tracer
        .record(
            "glBindBuffer",
            vec![v(Value::Enum(ARRAY_BUFFER)), v(Value::Handle(buffer))],
            || Value::Void,
        )
        .unwrap();
    tracer
        .record(
            "glBufferData",
            vec![
                v(Value::Enum(ARRAY_BUFFER)),
                v(Value::Scalar(Scalar::I64(vertices.len() as i64))),
                memory(vertices),
                v(Value::Enum(STATIC_DRAW)),
            ],
            || Value::Void,
        )
        .unwrap();
    tracer
        .record("glDrawArrays", vec![v(Value::Enum(TRIANGLES)), i32a(0), i32a(3)], || Value::Void)
        .unwrap();
    tracer
        .record(
            "eglSwapBuffers",
            vec![v(Value::Scalar(Scalar::U64(1))), v(Value::Scalar(Scalar::U64(2)))],
            || Value::Scalar(Scalar::Bool(true)),
        )
        .unwrap();
}

#[test]
fn test_capture_then_replay() {
    let dir = TempDir::new().unwrap();
    let registry = utils::registry();
    let path = dir.path().join("app.pat");
    let writer = TraceWriter::create(&path, registry.clone(), &Metadata::default()).unwrap();
    let tracer = Tracer::new(writer);

    let vertices: Vec<u8> = (0u8..36).collect();
    tracer.set_window_size(640, 480).unwrap();
    render_frame(&tracer, 3, &vertices);

    // a loader thread gets its own slot
    std::thread::scope(|s| {
        s.spawn(|| {
            tracer.set_window_size(64, 64).unwrap();
            tracer
                .record("glViewport", vec![i32a(0), i32a(0), i32a(64), i32a(64)], || Value::Void)
                .unwrap();
        });
    });

    tracer
        .record(
            "glDeleteBuffers",
            vec![i32a(1), v(Value::HandleArray(Some(vec![3])))],
            || Value::Void,
        )
        .unwrap();
    tracer.marker("second upload").unwrap();
    render_frame(&tracer, 3, &vertices[..12]);
    assert_eq!(tracer.counts(), (2, 13));
    tracer.finish(Metadata::default()).unwrap();

    let reader = TraceReader::open(&path, registry.clone()).unwrap();
    let metadata = reader.metadata();
    assert_eq!((metadata.frame_count, metadata.call_count), (2, 13));
    assert_eq!(metadata.default_tid, 0);
    assert_eq!(metadata.threads.len(), 2);
    assert_eq!((metadata.threads[1].win_w, metadata.threads[1].win_h), (64, 64));
    assert!(tools::verify(&reader).unwrap().is_ok());

    let viewport = reader
        .records()
        .map(|r| r.unwrap())
        .find(|r| registry.by_id(r.function_id).unwrap().name == "glViewport")
        .unwrap();
    assert_eq!(viewport.thread_id, 1);

    let mut engine =
        ReplayEngine::new(registry.clone(), HeadlessDriver::new(20), ReplayConfig::default())
            .unwrap();
    let report = engine.replay(&reader);
    assert_eq!(report.stop_reason, StopReason::EndOfStream);
    assert_eq!(report.error_count(), 0);
    assert_eq!(report.frames, 2);
    assert_eq!(report.draws, 2);

    // the second upload replaced the first buffer entirely
    let buffer = engine.context().handles.resolve(ObjectKind::Buffer, 3).unwrap();
    assert_eq!(engine.driver().buffer_contents(buffer).unwrap(), &vertices[..12]);
}

#[test]
fn test_replay_stops_at_frame_limit() {
    let dir = TempDir::new().unwrap();
    let registry = utils::registry();
    let path = dir.path().join("app.pat");
    let writer = TraceWriter::create(&path, registry.clone(), &Metadata::default()).unwrap();
    let tracer = Tracer::new(writer);
    let vertices = [7u8; 24];
    for buffer in 1..=4 {
        render_frame(&tracer, buffer, &vertices);
    }
    tracer.finish(Metadata::default()).unwrap();

    let config = ReplayConfig {
        max_frames: Some(3),
        ..ReplayConfig::default()
    };
    let report = tools::replay_file(&path, registry, config).unwrap();
    assert_eq!(report.stop_reason, StopReason::FrameLimit);
    assert_eq!(report.frames, 3);
    assert_eq!(report.calls, 15);
}
