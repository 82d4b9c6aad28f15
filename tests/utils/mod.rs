// Integration test utilities
//
// Builders for small trace files on disk.
#![allow(dead_code)]

use gltrace::codec::{CallRecord, Scalar, Value};
use gltrace::container::{Metadata, ThreadInfo, TraceWriter, WriterOptions};
use gltrace::schema::SchemaRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub fn registry() -> Arc<SchemaRegistry> {
    Arc::new(SchemaRegistry::default_gles().expect("built-in schema loads"))
}

pub fn i32v(v: i32) -> Value {
    Value::Scalar(Scalar::I32(v))
}

pub fn u32v(v: u32) -> Value {
    Value::Scalar(Scalar::U32(v))
}

pub fn i64v(v: i64) -> Value {
    Value::Scalar(Scalar::I64(v))
}

/// Accumulates call records and writes them as a trace with matching counts
pub struct TraceBuilder {
    pub registry: Arc<SchemaRegistry>,
    pub records: Vec<CallRecord>,
    pub threads: Vec<ThreadInfo>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self {
            registry: registry(),
            records: Vec::new(),
            threads: vec![ThreadInfo::new(0, 1280, 720)],
        }
    }

    pub fn call(&mut self, name: &str, tid: u8, args: Vec<Value>, ret: Value) -> &mut Self {
        let id = self
            .registry
            .lookup(name)
            .unwrap_or_else(|| panic!("{} is not in the schema", name))
            .id;
        self.records.push(CallRecord::new(id, tid, args, ret));
        self
    }

    pub fn clear(&mut self, tid: u8) -> &mut Self {
        self.call("glClear", tid, vec![u32v(0x4000)], Value::Void)
    }

    pub fn swap(&mut self, tid: u8) -> &mut Self {
        self.call(
            "eglSwapBuffers",
            tid,
            vec![Value::Scalar(Scalar::U64(1)), Value::Scalar(Scalar::U64(2))],
            Value::Scalar(Scalar::Bool(true)),
        )
    }

    /// `count` frames; frame `i` has `i + 1` clears before its swap
    pub fn frames(&mut self, count: usize) -> &mut Self {
        for frame in 0..count {
            for _ in 0..=frame {
                self.clear(0);
            }
            self.swap(0);
        }
        self
    }

    pub fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::default();
        metadata.threads = self.threads.clone();
        metadata.call_count = self.records.len() as u64;
        metadata.frame_count = self
            .records
            .iter()
            .filter(|r| self.registry.by_id(r.function_id).is_some_and(|s| s.frame_boundary))
            .count() as u64;
        metadata
    }

    pub fn write(&self, path: &Path) -> PathBuf {
        self.write_with(path, WriterOptions::default())
    }

    pub fn write_with(&self, path: &Path, options: WriterOptions) -> PathBuf {
        let metadata = self.metadata();
        let mut writer =
            TraceWriter::create_with(path, self.registry.clone(), &metadata, options).unwrap();
        for record in &self.records {
            writer.append_call(record).unwrap();
        }
        writer.finish(&metadata).unwrap();
        path.to_path_buf()
    }
}
