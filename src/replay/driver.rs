//! Live driver abstraction and a deterministic headless implementation

use crate::codec::{Opaque, Scalar, Value};
use crate::error::{Result, TraceError};
use crate::gl;
use crate::handles::ObjectKind;
use fnv::{FnvHashMap, FnvHashSet};
use std::collections::BTreeSet;
use tracing::trace;

/// Optional driver features the dispatcher works around when missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `glMapBufferOES` is available
    pub map_buffer_oes: bool,
    /// ETC1 compressed textures are accepted
    pub etc1: bool,
    /// Program binaries can be retrieved and loaded
    pub program_binary: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            map_buffer_oes: true,
            etc1: true,
            program_binary: true,
        }
    }
}

/// The driver a trace is replayed against
///
/// Arguments passed to [`Driver::call`] are already translated to replay-time ids.
/// Entry points with object lifetimes or mapped memory have dedicated methods so the
/// dispatcher can keep its own bookkeeping in step with the driver.
pub trait Driver {
    /// Whether the named entry point exists
    fn supports(&self, name: &str) -> bool;

    fn capabilities(&self) -> Capabilities;

    /// Invoke a plain entry point; `Value::Void` stands for "no return value"
    fn call(&mut self, name: &str, args: &[Value]) -> Result<Value>;

    fn gen_objects(&mut self, kind: ObjectKind, count: usize) -> Vec<u32>;

    fn delete_objects(&mut self, kind: ObjectKind, ids: &[u32]);

    /// Map a range of the buffer bound to `target`; returns an opaque address token
    fn map_buffer(&mut self, target: u32, offset: u64, length: u64, access: u32) -> Result<u64>;

    /// Write into the mapping of `target`, `offset` relative to the mapped range
    fn write_mapped(&mut self, target: u32, offset: u64, data: &[u8]) -> Result<()>;

    fn flush_mapped(&mut self, target: u32, offset: u64, length: u64) -> Result<()>;

    fn unmap_buffer(&mut self, target: u32) -> Result<bool>;

    /// Contents of the buffer bound to `target`
    fn read_buffer(&mut self, target: u32, offset: u64, length: u64) -> Result<Vec<u8>>;

    fn link_status(&mut self, program: u32) -> bool;

    /// `(format, bytes)` of a linked program
    fn program_binary(&mut self, program: u32) -> Option<(u32, Vec<u8>)>;

    /// Returns whether the binary was accepted
    fn load_program_binary(&mut self, program: u32, format: u32, binary: &[u8]) -> bool;

    fn default_framebuffer(&self) -> u32;
}

/// One entry of the headless driver's call log
#[derive(Debug, Clone, PartialEq)]
pub struct DriverCall {
    pub name: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone)]
struct Mapping {
    buffer: u32,
    offset: u64,
    length: u64,
    access: u32,
}

/// Format token of headless program binaries
pub const HEADLESS_BINARY_FORMAT: u32 = 0x4842_4C50;
const BINARY_MAGIC: &[u8; 4] = b"HLPB";

#[derive(Debug, Default)]
struct IdPool {
    next: u32,
    free: BTreeSet<u32>,
    live: FnvHashSet<u32>,
}

impl IdPool {
    fn alloc(&mut self) -> u32 {
        let id = match self.free.pop_first() {
            Some(id) => id,
            None => {
                let id = self.next;
                self.next += 1;
                id
            }
        };
        self.live.insert(id);
        id
    }

    fn release(&mut self, id: u32) -> bool {
        if self.live.remove(&id) {
            self.free.insert(id);
            true
        } else {
            false
        }
    }
}

/// Software driver with no rendering
///
/// Hands out ids from a configurable base, always reusing the lowest freed id
/// first. Buffer contents, mappings and link state are modelled so mapped
/// writes, indirect draws and the shader cache can be exercised end to end.
#[derive(Debug)]
pub struct HeadlessDriver {
    caps: Capabilities,
    missing: FnvHashSet<String>,
    pools: Vec<IdPool>,
    buffers: FnvHashMap<u32, Vec<u8>>,
    bindings: FnvHashMap<u32, u32>,
    mappings: FnvHashMap<u32, Mapping>,
    attached: FnvHashMap<u32, Vec<u32>>,
    linked: FnvHashMap<u32, bool>,
    locations: FnvHashMap<(u32, String), i32>,
    log: Option<Vec<DriverCall>>,
    calls: u64,
}

impl Default for HeadlessDriver {
    fn default() -> Self {
        Self::new(1)
    }
}

impl HeadlessDriver {
    pub fn new(id_base: u32) -> Self {
        let base = id_base.max(1);
        Self {
            caps: Capabilities::default(),
            missing: FnvHashSet::default(),
            pools: ObjectKind::ALL
                .iter()
                .map(|_| IdPool {
                    next: base,
                    ..Default::default()
                })
                .collect(),
            buffers: FnvHashMap::default(),
            bindings: FnvHashMap::default(),
            mappings: FnvHashMap::default(),
            attached: FnvHashMap::default(),
            linked: FnvHashMap::default(),
            locations: FnvHashMap::default(),
            log: None,
            calls: 0,
        }
    }

    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    /// Pretend the named entry points do not exist
    pub fn without<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.missing.extend(names.into_iter().map(Into::into));
        self
    }

    /// Keep every call made through [`Driver::call`]
    pub fn with_call_log(mut self) -> Self {
        self.log = Some(Vec::new());
        self
    }

    pub fn call_log(&self) -> &[DriverCall] {
        self.log.as_deref().unwrap_or(&[])
    }

    /// Calls made through [`Driver::call`], logged or not
    pub fn call_count(&self) -> u64 {
        self.calls
    }

    pub fn buffer_contents(&self, buffer: u32) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    pub fn bound_buffer(&self, target: u32) -> u32 {
        self.bindings.get(&target).copied().unwrap_or(0)
    }

    pub fn is_live(&self, kind: ObjectKind, id: u32) -> bool {
        self.pools[pool_index(kind)].live.contains(&id)
    }

    fn alloc(&mut self, kind: ObjectKind) -> u32 {
        self.pools[pool_index(kind)].alloc()
    }

    fn bound(&self, target: u32) -> Result<u32> {
        match self.bindings.get(&target) {
            Some(&buffer) if buffer != 0 => Ok(buffer),
            _ => Err(TraceError::UnknownHandle {
                kind: ObjectKind::Buffer,
                id: 0,
            }),
        }
    }

    fn bind_buffer(&mut self, target: u32, buffer: u32) {
        if buffer != 0 {
            self.buffers.entry(buffer).or_default();
        }
        self.bindings.insert(target, buffer);
    }

    fn buffer_write(&mut self, target: u32, offset: usize, data: &[u8]) -> Result<()> {
        let buffer = self.bound(target)?;
        let storage = self.buffers.entry(buffer).or_default();
        let end = offset + data.len();
        if storage.len() < end {
            storage.resize(end, 0);
        }
        storage[offset..end].copy_from_slice(data);
        Ok(())
    }
}

fn pool_index(kind: ObjectKind) -> usize {
    // programs and shaders share one namespace
    match kind {
        ObjectKind::Shader => ObjectKind::Program.index(),
        other => other.index(),
    }
}

fn arg_u32(args: &[Value], index: usize) -> u32 {
    args.get(index).and_then(Value::as_u32).unwrap_or(0)
}

fn arg_i64(args: &[Value], index: usize) -> i64 {
    args.get(index).and_then(Value::as_i64).unwrap_or(0)
}

fn arg_bytes(args: &[Value], index: usize) -> Option<&[u8]> {
    match args.get(index)? {
        Value::Blob(Some(bytes)) | Value::Opaque(Opaque::Blob(bytes)) => Some(bytes),
        _ => None,
    }
}

impl Driver for HeadlessDriver {
    fn supports(&self, name: &str) -> bool {
        !self.missing.contains(name)
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn call(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        if !self.supports(name) {
            return Err(TraceError::UnsupportedFunction(name.to_string()));
        }
        self.calls += 1;
        if let Some(log) = self.log.as_mut() {
            log.push(DriverCall {
                name: name.to_string(),
                args: args.to_vec(),
            });
        }
        trace!(name, "headless call");

        let ret = match name {
            "glBindBuffer" => {
                self.bind_buffer(arg_u32(args, 0), arg_u32(args, 1));
                Value::Void
            }
            "glBindBufferBase" | "glBindBufferRange" => {
                self.bind_buffer(arg_u32(args, 0), arg_u32(args, 2));
                Value::Void
            }
            "glBufferData" => {
                let size = arg_i64(args, 1).max(0) as usize;
                let buffer = self.bound(arg_u32(args, 0))?;
                let mut storage = vec![0u8; size];
                if let Some(data) = arg_bytes(args, 2) {
                    let n = data.len().min(size);
                    storage[..n].copy_from_slice(&data[..n]);
                }
                self.buffers.insert(buffer, storage);
                Value::Void
            }
            "glBufferSubData" => {
                if let Some(data) = arg_bytes(args, 3) {
                    self.buffer_write(arg_u32(args, 0), arg_i64(args, 1).max(0) as usize, data)?;
                }
                Value::Void
            }
            "glCreateProgram" => Value::Handle(self.alloc(ObjectKind::Program)),
            "glCreateShader" => Value::Handle(self.alloc(ObjectKind::Shader)),
            "glFenceSync" => Value::Handle(self.alloc(ObjectKind::Sync)),
            "glDeleteProgram" | "glDeleteShader" | "glDeleteSync" => {
                let kind = match name {
                    "glDeleteProgram" => ObjectKind::Program,
                    "glDeleteShader" => ObjectKind::Shader,
                    _ => ObjectKind::Sync,
                };
                let id = arg_u32(args, 0);
                self.pools[pool_index(kind)].release(id);
                self.attached.remove(&id);
                self.linked.remove(&id);
                Value::Void
            }
            "glAttachShader" => {
                self.attached
                    .entry(arg_u32(args, 0))
                    .or_default()
                    .push(arg_u32(args, 1));
                Value::Void
            }
            "glLinkProgram" => {
                let program = arg_u32(args, 0);
                let ok = self.attached.get(&program).is_some_and(|s| !s.is_empty());
                self.linked.insert(program, ok);
                Value::Void
            }
            "glGetUniformLocation" | "glGetUniformBlockIndex" => {
                let program = arg_u32(args, 0);
                let uniform = match args.get(1) {
                    Some(Value::String(Some(s))) => s.clone(),
                    _ => return Ok(Value::Scoped(-1)),
                };
                let next = self
                    .locations
                    .keys()
                    .filter(|(p, _)| *p == program)
                    .count() as i32;
                let location = *self.locations.entry((program, uniform)).or_insert(next);
                Value::Scoped(location)
            }
            "glGetError" => Value::Enum(gl::NONE),
            "glClientWaitSync" => Value::Enum(0x911A),
            "eglSwapBuffers" => Value::Scalar(Scalar::Bool(true)),
            _ => Value::Void,
        };
        Ok(ret)
    }

    fn gen_objects(&mut self, kind: ObjectKind, count: usize) -> Vec<u32> {
        (0..count).map(|_| self.alloc(kind)).collect()
    }

    fn delete_objects(&mut self, kind: ObjectKind, ids: &[u32]) {
        for &id in ids {
            if !self.pools[pool_index(kind)].release(id) {
                continue;
            }
            if kind == ObjectKind::Buffer {
                self.buffers.remove(&id);
                self.bindings.retain(|_, bound| *bound != id);
                self.mappings.retain(|_, m| m.buffer != id);
            }
        }
    }

    fn map_buffer(&mut self, target: u32, offset: u64, length: u64, access: u32) -> Result<u64> {
        let buffer = self.bound(target)?;
        let size = self.buffers.get(&buffer).map_or(0, Vec::len) as u64;
        // whole-buffer maps pass a zero length
        let length = if length == 0 { size.saturating_sub(offset) } else { length };
        if offset + length > size {
            let storage = self.buffers.entry(buffer).or_default();
            storage.resize((offset + length) as usize, 0);
        }
        self.mappings.insert(
            target,
            Mapping {
                buffer,
                offset,
                length,
                access,
            },
        );
        Ok(((buffer as u64) << 32) | offset)
    }

    fn write_mapped(&mut self, target: u32, offset: u64, data: &[u8]) -> Result<()> {
        let mapping = self.mappings.get(&target).cloned().ok_or(TraceError::UnknownHandle {
            kind: ObjectKind::Buffer,
            id: self.bound_buffer(target),
        })?;
        if offset + data.len() as u64 > mapping.length {
            return Err(TraceError::Capacity(format!(
                "write of {} bytes at {} exceeds the {} byte mapping",
                data.len(),
                offset,
                mapping.length
            )));
        }
        if !gl::access_is_writable(mapping.access) {
            trace!(target, access = mapping.access, "write into read-only mapping");
        }
        let storage = self.buffers.entry(mapping.buffer).or_default();
        let start = (mapping.offset + offset) as usize;
        storage[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn flush_mapped(&mut self, target: u32, _offset: u64, _length: u64) -> Result<()> {
        if self.mappings.contains_key(&target) {
            Ok(())
        } else {
            Err(TraceError::UnknownHandle {
                kind: ObjectKind::Buffer,
                id: self.bound_buffer(target),
            })
        }
    }

    fn unmap_buffer(&mut self, target: u32) -> Result<bool> {
        Ok(self.mappings.remove(&target).is_some())
    }

    fn read_buffer(&mut self, target: u32, offset: u64, length: u64) -> Result<Vec<u8>> {
        let buffer = self.bound(target)?;
        let storage = self.buffers.get(&buffer).map(Vec::as_slice).unwrap_or(&[]);
        let start = (offset as usize).min(storage.len());
        let end = (start + length as usize).min(storage.len());
        let mut bytes = storage[start..end].to_vec();
        bytes.resize(length as usize, 0);
        Ok(bytes)
    }

    fn link_status(&mut self, program: u32) -> bool {
        self.linked.get(&program).copied().unwrap_or(false)
    }

    fn program_binary(&mut self, program: u32) -> Option<(u32, Vec<u8>)> {
        if !self.caps.program_binary || !self.link_status(program) {
            return None;
        }
        let mut bytes = BINARY_MAGIC.to_vec();
        bytes.extend_from_slice(&program.to_le_bytes());
        Some((HEADLESS_BINARY_FORMAT, bytes))
    }

    fn load_program_binary(&mut self, program: u32, format: u32, binary: &[u8]) -> bool {
        let ok = self.caps.program_binary
            && format == HEADLESS_BINARY_FORMAT
            && binary.starts_with(BINARY_MAGIC);
        self.linked.insert(program, ok);
        ok
    }

    fn default_framebuffer(&self) -> u32 {
        0
    }
}
