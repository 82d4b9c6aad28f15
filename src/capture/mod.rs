//! Capture: turn intercepted GLES calls into trace records

mod pointer;
mod tracer;

pub use pointer::{blob_value, classify, declared_len, BindingState, CaptureArg, ClientPointer};
pub use tracer::{memory, offset, CallDepthGuard, Tracer};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Opaque, Scalar, Value};
    use crate::container::{Metadata, TraceReader, TraceWriter};
    use crate::gl;
    use crate::schema::{SchemaRegistry, MARKER_ID};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn tracer(dir: &TempDir) -> (Tracer, std::path::PathBuf, Arc<SchemaRegistry>) {
        let registry = Arc::new(SchemaRegistry::default_gles().unwrap());
        let path = dir.path().join("capture.pat");
        let writer =
            TraceWriter::create(&path, Arc::clone(&registry), &Metadata::default()).unwrap();
        (Tracer::new(writer), path, registry)
    }

    fn i32v(v: i32) -> CaptureArg<'static> {
        Value::Scalar(Scalar::I32(v)).into()
    }

    #[test]
    fn test_nested_calls_are_not_recorded() {
        let dir = TempDir::new().unwrap();
        let (tracer, path, registry) = tracer(&dir);
        let ret = tracer
            .record("glCreateProgram", vec![], || {
                // a driver that calls back into an intercepted entry point
                tracer
                    .record("glGetError", vec![], || Value::Enum(0))
                    .unwrap();
                Value::Handle(5)
            })
            .unwrap();
        assert_eq!(ret, Value::Handle(5));
        assert_eq!(tracer.counts(), (0, 1));
        tracer.finish(Metadata::default()).unwrap();

        let reader = TraceReader::open(&path, registry).unwrap();
        assert_eq!(reader.records().count(), 1);
        assert_eq!(reader.metadata().call_count, 1);
    }

    #[test]
    fn test_texture_data_follows_unpack_binding() {
        let dir = TempDir::new().unwrap();
        let (tracer, path, registry) = tracer(&dir);
        static PIXELS: [u8; 64] = [0xAB; 64];
        let tex_args = |data: CaptureArg<'static>| -> Vec<CaptureArg<'static>> {
            vec![
                Value::Enum(0x0DE1).into(),
                i32v(0),
                i32v(0),
                i32v(0),
                i32v(2),
                i32v(2),
                Value::Enum(gl::RGBA).into(),
                Value::Enum(gl::UNSIGNED_BYTE).into(),
                data,
            ]
        };
        tracer.record("glTexSubImage2D", tex_args(memory(&PIXELS)), || Value::Void).unwrap();
        tracer
            .record(
                "glBindBuffer",
                vec![Value::Enum(gl::PIXEL_UNPACK_BUFFER).into(), Value::Handle(4).into()],
                || Value::Void,
            )
            .unwrap();
        tracer.record("glTexSubImage2D", tex_args(offset(256)), || Value::Void).unwrap();
        tracer.finish(Metadata::default()).unwrap();

        let reader = TraceReader::open(&path, registry).unwrap();
        let records: Vec<_> = reader.records().map(Result::unwrap).collect();
        // 2x2 RGBA8 clipped from the 64 bytes handed over
        assert_eq!(records[0].args[8], Value::Opaque(Opaque::Blob(vec![0xAB; 16])));
        assert_eq!(records[2].args[8], Value::Opaque(Opaque::BufferObjectReference(256)));
    }

    #[test]
    fn test_injected_records_and_metadata() {
        let dir = TempDir::new().unwrap();
        let (tracer, path, registry) = tracer(&dir);
        tracer.set_window_size(640, 480).unwrap();
        tracer.marker("frame 0").unwrap();
        tracer.mapped_write(gl::ARRAY_BUFFER, 8, &[1, 2, 3]).unwrap();
        for _ in 0..2 {
            tracer
                .record(
                    "eglSwapBuffers",
                    vec![
                        Value::Scalar(Scalar::U64(1)).into(),
                        Value::Scalar(Scalar::U64(2)).into(),
                    ],
                    || Value::Scalar(Scalar::Bool(true)),
                )
                .unwrap();
        }
        tracer.finish(Metadata::default()).unwrap();

        let reader = TraceReader::open(&path, registry).unwrap();
        let meta = reader.metadata();
        assert_eq!(meta.frame_count, 2);
        assert_eq!(meta.call_count, 4);
        assert_eq!(meta.default_tid, 0);
        assert_eq!((meta.threads[0].win_w, meta.threads[0].win_h), (640, 480));

        let records: Vec<_> = reader.records().map(Result::unwrap).collect();
        assert_eq!(records[0].function_id, MARKER_ID);
        assert!(records[0].flags.injected);
        assert!(!records[2].flags.injected);
        assert_eq!(records[1].args[2], Value::Blob(Some(vec![1, 2, 3])));
    }

    #[test]
    fn test_sync_pointers_become_tokens() {
        let dir = TempDir::new().unwrap();
        let (tracer, path, registry) = tracer(&dir);
        let fence = tracer
            .record(
                "glFenceSync",
                vec![Value::Enum(0x9117).into(), Value::Scalar(Scalar::U32(0)).into()],
                || Value::Scalar(Scalar::U64(0x7fff_1234_5678)),
            )
            .unwrap();
        // the application still sees the driver's pointer
        assert_eq!(fence, Value::Scalar(Scalar::U64(0x7fff_1234_5678)));
        tracer
            .record(
                "glDeleteSync",
                vec![Value::Scalar(Scalar::U64(0x7fff_1234_5678)).into()],
                || Value::Void,
            )
            .unwrap();
        tracer.finish(Metadata::default()).unwrap();

        let reader = TraceReader::open(&path, registry).unwrap();
        let records: Vec<_> = reader.records().map(Result::unwrap).collect();
        assert_eq!(records[0].ret, Value::Handle(1));
        assert_eq!(records[1].args[0], Value::Handle(1));
    }

    #[test]
    fn test_threads_get_separate_slots() {
        let dir = TempDir::new().unwrap();
        let (tracer, path, registry) = tracer(&dir);
        let tracer = Arc::new(tracer);
        tracer.record("glFlush", vec![], || Value::Void).unwrap();
        let worker = Arc::clone(&tracer);
        std::thread::spawn(move || {
            worker.record("glFlush", vec![], || Value::Void).unwrap();
        })
        .join()
        .unwrap();
        let tracer = Arc::try_unwrap(tracer).unwrap();
        tracer.finish(Metadata::default()).unwrap();

        let reader = TraceReader::open(&path, registry).unwrap();
        let tids: Vec<u8> = reader.records().map(|r| r.unwrap().thread_id).collect();
        assert_eq!(tids, vec![0, 1]);
        assert_eq!(reader.metadata().threads.len(), 2);
    }

    #[test]
    fn test_argument_count_mismatch() {
        let dir = TempDir::new().unwrap();
        let (tracer, _, _) = tracer(&dir);
        let err = tracer.record("glUseProgram", vec![], || Value::Void).unwrap_err();
        assert!(err.to_string().contains("glUseProgram takes 1 arguments, got 0"));
    }
}
