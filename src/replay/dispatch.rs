//! Per-function replay handlers
//!
//! The table is built once from the registry and indexed by function id. Most
//! entry points go through [`generic`]: translate handles, call the driver,
//! register returned handles. Calls whose effect on replay state cannot be
//! derived from their signature get a dedicated handler.

use super::context::{DrawParams, MappedRange, ReplayContext};
use super::driver::Driver;
use super::shader_cache::{CacheEntry, ShaderCache};
use crate::codec::{CallRecord, Opaque, Scalar, Value};
use crate::error::{CodecError, Result, TraceError};
use crate::gl;
use crate::handles::ObjectKind;
use crate::schema::{
    ArgType, Direction, HandleUse, SchemaRegistry, Signature, MAPPED_BUFFER_WRITE, MARKER,
};
use fnv::FnvHashSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Everything a handler may touch while replaying one record
pub struct Step<'a> {
    pub ctx: &'a mut ReplayContext,
    pub driver: &'a mut dyn Driver,
    pub registry: &'a SchemaRegistry,
    pub record: &'a CallRecord,
    pub sig: &'a Signature,
}

pub type Handler = fn(&mut Step<'_>) -> Result<()>;

fn arg_u32(args: &[Value], index: usize) -> u32 {
    args.get(index).and_then(Value::as_u32).unwrap_or(0)
}

fn arg_u64(args: &[Value], index: usize) -> u64 {
    args.get(index).and_then(Value::as_i64).unwrap_or(0).max(0) as u64
}

fn arg_bytes(args: &[Value], index: usize) -> &[u8] {
    match args.get(index) {
        Some(Value::Blob(Some(bytes))) | Some(Value::Opaque(Opaque::Blob(bytes))) => bytes,
        _ => &[],
    }
}

/// The driver's name for `name`, trying synonyms when it lacks the exact one
fn entry_point<'r>(
    registry: &'r SchemaRegistry,
    driver: &dyn Driver,
    name: &'r str,
) -> Option<&'r str> {
    if driver.supports(name) {
        return Some(name);
    }
    registry
        .alternatives(name)
        .into_iter()
        .find(|alt| driver.supports(alt))
}

impl Step<'_> {
    fn tid(&self) -> u8 {
        self.record.thread_id
    }

    fn arg_u32(&self, index: usize) -> u32 {
        arg_u32(&self.record.args, index)
    }

    fn arg_u64(&self, index: usize) -> u64 {
        arg_u64(&self.record.args, index)
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.sig.param_index(name).ok_or_else(|| {
            CodecError::TypeMismatch {
                expected: format!("{} with a '{}' argument", self.sig.name, name),
            }
            .into()
        })
    }

    /// Record-time program that scopes uniform locations of this call
    fn scope_program(&self) -> u32 {
        self.sig
            .params
            .iter()
            .zip(&self.record.args)
            .find_map(|(param, value)| match (&param.ty, value) {
                (
                    ArgType::Handle {
                        kind: ObjectKind::Program,
                        ..
                    },
                    Value::Handle(id),
                ) => Some(*id),
                _ => None,
            })
            .unwrap_or_else(|| {
                self.ctx
                    .thread_ref(self.tid())
                    .map_or(0, |t| t.current_program)
            })
    }

    fn resolve_or_create(&mut self, kind: ObjectKind, old: u32) -> u32 {
        let driver = &mut *self.driver;
        let (new, created) = self.ctx.handles.resolve_or_create(kind, old, || {
            driver.gen_objects(kind, 1).first().copied().unwrap_or(0)
        });
        if created {
            debug!(%kind, old, new, "created object on first bind");
            self.ctx.stats.objects_created += 1;
        }
        new
    }

    fn remap(&mut self, ty: &ArgType, value: &Value, program: u32) -> Result<Value> {
        Ok(match (ty, value) {
            (ArgType::Handle { kind, usage }, Value::Handle(old)) => match usage {
                HandleUse::Lookup => Value::Handle(self.ctx.handles.resolve(*kind, *old)?),
                HandleUse::Bind => Value::Handle(self.resolve_or_create(*kind, *old)),
            },
            (ArgType::HandleArray(kind), Value::HandleArray(Some(ids))) => Value::HandleArray(Some(
                ids.iter()
                    .map(|id| self.ctx.handles.resolve(*kind, *id))
                    .collect::<Result<Vec<_>>>()?,
            )),
            (ArgType::Scoped(kind), Value::Scoped(old)) => {
                Value::Scoped(self.ctx.handles.resolve_scoped(*kind, program, *old)?)
            }
            (
                ArgType::Opaque(_),
                Value::Opaque(Opaque::ClientSideBufferReference { name, offset }),
            ) => {
                let data = self.ctx.client_buffer(self.tid(), *name)?;
                let start = (*offset as usize).min(data.len());
                Value::Opaque(Opaque::Blob(data[start..].to_vec()))
            }
            (ArgType::Pointer(inner), Value::Pointer(Some(pointee))) => {
                Value::Pointer(Some(Box::new(self.remap(inner, pointee, program)?)))
            }
            _ => value.clone(),
        })
    }

    /// Translate every input argument to replay-time values
    pub fn remap_args(&mut self) -> Result<Vec<Value>> {
        let sig = self.sig;
        let record = self.record;
        let program = self.scope_program();
        let mut args = Vec::with_capacity(sig.params.len());
        for (param, value) in sig.params.iter().zip(&record.args) {
            args.push(match param.dir {
                Direction::Out => Value::zero(&param.ty),
                Direction::In | Direction::InOut => self.remap(&param.ty, value, program)?,
            });
        }
        Ok(args)
    }

    /// Call the driver entry point of this record with replay-time arguments
    pub fn invoke(&mut self, args: &[Value]) -> Result<Value> {
        let name = entry_point(self.registry, &*self.driver, &self.sig.name)
            .ok_or_else(|| TraceError::UnsupportedFunction(self.sig.name.clone()))?;
        if name != self.sig.name {
            trace!(function = %self.sig.name, via = name, "calling through synonym");
        }
        let ret = self.driver.call(name, args)?;
        Ok(match ret {
            Value::Void if self.sig.has_return() => Value::zero(&self.sig.ret),
            other => other,
        })
    }

    /// Map the handle the call returned at capture time to the one it returned now
    pub fn register_return(&mut self, ret: &Value) {
        match (&self.sig.ret, &self.record.ret, ret) {
            (ArgType::Handle { kind, .. }, Value::Handle(old), Value::Handle(new)) => {
                self.ctx.handles.register(*kind, *old, *new);
                if *old != 0 {
                    self.ctx.stats.objects_created += 1;
                }
            }
            (ArgType::Scoped(kind), Value::Scoped(old), Value::Scoped(new)) => {
                let program = self.scope_program();
                self.ctx.handles.register_scoped(*kind, program, *old, *new);
            }
            _ => {}
        }
    }
}

/// Remap, call, register
pub fn generic(step: &mut Step<'_>) -> Result<()> {
    let args = step.remap_args()?;
    let ret = step.invoke(&args)?;
    step.register_return(&ret);
    Ok(())
}

fn unsupported(step: &mut Step<'_>) -> Result<()> {
    Err(TraceError::UnsupportedFunction(step.sig.name.clone()))
}

fn gen_objects(step: &mut Step<'_>) -> Result<()> {
    let sig = step.sig;
    let record = step.record;
    for (param, value) in sig.params.iter().zip(&record.args) {
        if let (ArgType::HandleArray(kind), Direction::Out, Value::HandleArray(Some(old))) =
            (&param.ty, param.dir, value)
        {
            let new = step.driver.gen_objects(*kind, old.len());
            for (o, n) in old.iter().zip(&new) {
                step.ctx.handles.register(*kind, *o, *n);
            }
            step.ctx.stats.objects_created += new.len() as u64;
        }
    }
    Ok(())
}

/// Batch deletes translate every id, then erase all mappings and dependent state
fn delete_objects(step: &mut Step<'_>) -> Result<()> {
    let sig = step.sig;
    let record = step.record;
    let target = sig
        .params
        .iter()
        .zip(&record.args)
        .find_map(|(p, v)| match (&p.ty, v) {
            (ArgType::HandleArray(kind), Value::HandleArray(ids)) => {
                Some((*kind, ids.as_deref().unwrap_or(&[])))
            }
            _ => None,
        });
    let Some((kind, old_ids)) = target else {
        return Ok(());
    };

    let mut live = Vec::with_capacity(old_ids.len());
    for &old in old_ids {
        match step.ctx.handles.resolve(kind, old) {
            Ok(0) => {}
            Ok(new) => live.push((old, new)),
            // deleting an unknown name is not an error in GL
            Err(_) => debug!(%kind, old, "delete of unmapped id ignored"),
        }
    }
    let new_ids: Vec<u32> = live.iter().map(|&(_, new)| new).collect();
    step.driver.delete_objects(kind, &new_ids);
    for (old, _) in live {
        step.ctx.handles.release(kind, old);
        if kind == ObjectKind::Buffer {
            step.ctx.forget_buffer(old);
        }
    }
    Ok(())
}

/// `glDeleteProgram`, `glDeleteShader`, `glDeleteSync`
fn delete_single(step: &mut Step<'_>) -> Result<()> {
    let Some(&ArgType::Handle { kind, .. }) = step.sig.params.first().map(|p| &p.ty) else {
        return generic(step);
    };
    let old = step.arg_u32(0);
    let new = match step.ctx.handles.resolve(kind, old) {
        Ok(new) => new,
        Err(_) => {
            debug!(%kind, old, "delete of unmapped id ignored");
            return Ok(());
        }
    };
    step.invoke(&[Value::Handle(new)])?;
    step.ctx.handles.release(kind, old);
    match kind {
        ObjectKind::Program => step.ctx.forget_program(old),
        ObjectKind::Shader => step.ctx.forget_shader(old),
        _ => {}
    }
    Ok(())
}

fn bind_buffer(step: &mut Step<'_>) -> Result<()> {
    generic(step)?;
    let target = step.arg_u32(0);
    let buffer = step.arg_u32(step.index_of("buffer")?);
    let tid = step.tid();
    step.ctx.thread(tid).bound_buffers.insert(target, buffer);
    Ok(())
}

fn buffer_data(step: &mut Step<'_>) -> Result<()> {
    generic(step)?;
    let target = step.arg_u32(0);
    let size = step.arg_u64(1);
    let tid = step.tid();
    let buffer = step.ctx.thread(tid).bound_buffer(target);
    if buffer != 0 {
        step.ctx.buffer_sizes.insert(buffer, size);
    }
    Ok(())
}

fn use_program(step: &mut Step<'_>) -> Result<()> {
    generic(step)?;
    let program = step.arg_u32(0);
    let tid = step.tid();
    step.ctx.thread(tid).current_program = program;
    Ok(())
}

fn bind_framebuffer(step: &mut Step<'_>) -> Result<()> {
    let target = step.arg_u32(0);
    let old = step.arg_u32(1);
    let new = if old != 0 {
        step.resolve_or_create(ObjectKind::Framebuffer, old)
    } else if step.ctx.options.force_offscreen {
        match step.ctx.offscreen_framebuffer {
            Some(fb) => fb,
            None => {
                let fb = step
                    .driver
                    .gen_objects(ObjectKind::Framebuffer, 1)
                    .first()
                    .copied()
                    .unwrap_or(0);
                debug!(framebuffer = fb, "created offscreen framebuffer");
                step.ctx.offscreen_framebuffer = Some(fb);
                fb
            }
        }
    } else {
        step.driver.default_framebuffer()
    };
    step.invoke(&[Value::Enum(target), Value::Handle(new)])?;
    let tid = step.tid();
    step.ctx.thread(tid).current_framebuffer = old;
    Ok(())
}

fn map_buffer(step: &mut Step<'_>) -> Result<()> {
    let target = step.arg_u32(0);
    let tid = step.tid();
    let buffer = step.ctx.thread(tid).bound_buffer(target);
    if buffer == 0 {
        return Err(TraceError::UnknownHandle {
            kind: ObjectKind::Buffer,
            id: 0,
        });
    }

    let (offset, length, access) = if step.sig.name == "glMapBufferOES" {
        let access = if step.arg_u32(1) == gl::WRITE_ONLY_OES {
            gl::MAP_WRITE_BIT
        } else {
            gl::MAP_READ_BIT | gl::MAP_WRITE_BIT
        };
        if step.driver.capabilities().map_buffer_oes {
            (0, 0, access)
        } else {
            // no OES entry point: map the whole known size with the range form
            let size = step.ctx.buffer_sizes.get(&buffer).copied().unwrap_or(0);
            debug!(buffer, size, "substituting a range map for glMapBufferOES");
            (0, size, access)
        }
    } else {
        (step.arg_u64(1), step.arg_u64(2), step.arg_u32(3))
    };

    step.driver.map_buffer(target, offset, length, access)?;
    let length = if length == 0 {
        step.ctx.buffer_sizes.get(&buffer).copied().unwrap_or(0)
    } else {
        length
    };
    step.ctx.thread(tid).mapped.insert(
        target,
        MappedRange {
            buffer,
            offset,
            length,
            access,
        },
    );
    Ok(())
}

fn unmap_buffer(step: &mut Step<'_>) -> Result<()> {
    let target = step.arg_u32(0);
    let tid = step.tid();
    let mapping = step.ctx.thread(tid).mapped.remove(&target);
    step.driver.unmap_buffer(target)?;
    match mapping {
        Some(m) => debug!(
            buffer = m.buffer,
            propagated = gl::access_is_writable(m.access),
            "unmapped buffer"
        ),
        None => warn!(buffer_target = gl::buffer_target_name(target), "unmap without a mapping"),
    }
    Ok(())
}

fn flush_mapped(step: &mut Step<'_>) -> Result<()> {
    let target = step.arg_u32(0);
    let (offset, length) = (step.arg_u64(1), step.arg_u64(2));
    step.driver.flush_mapped(target, offset, length)
}

/// Bytes the application wrote through a mapped pointer
fn mapped_buffer_write(step: &mut Step<'_>) -> Result<()> {
    let target = step.arg_u32(0);
    let offset = step.arg_u64(1);
    let tid = step.tid();
    let Some(mapping) = step.ctx.thread(tid).mapped.get(&target).cloned() else {
        return Err(TraceError::UnknownHandle {
            kind: ObjectKind::Buffer,
            id: step.ctx.thread(tid).bound_buffer(target),
        });
    };
    if !gl::access_is_writable(mapping.access) {
        warn!(buffer = mapping.buffer, "write into a read-only mapping dropped");
        return Ok(());
    }
    step.driver
        .write_mapped(target, offset, arg_bytes(&step.record.args, 2))
}

fn marker(step: &mut Step<'_>) -> Result<()> {
    if let Some(Value::String(Some(text))) = step.record.args.first() {
        debug!(seq = step.record.seq, marker = %text, "trace marker");
    }
    Ok(())
}

fn create_client_buffer(step: &mut Step<'_>) -> Result<()> {
    let tid = step.tid();
    step.ctx.create_client_buffer(tid, step.arg_u32(0));
    Ok(())
}

fn delete_client_buffer(step: &mut Step<'_>) -> Result<()> {
    let tid = step.tid();
    step.ctx.delete_client_buffer(tid, step.arg_u32(0))
}

fn client_buffer_data(step: &mut Step<'_>) -> Result<()> {
    let tid = step.tid();
    let name = step.arg_u32(0);
    let size = step.arg_u64(1) as usize;
    let data = arg_bytes(&step.record.args, 2);
    let buffer = step.ctx.client_buffer_mut(tid, name)?;
    buffer.clear();
    buffer.extend_from_slice(&data[..data.len().min(size)]);
    buffer.resize(size, 0);
    Ok(())
}

fn client_buffer_sub_data(step: &mut Step<'_>) -> Result<()> {
    let tid = step.tid();
    let name = step.arg_u32(0);
    let offset = step.arg_u64(1) as usize;
    let data = arg_bytes(&step.record.args, 3);
    let buffer = step.ctx.client_buffer_mut(tid, name)?;
    let end = offset + data.len();
    if buffer.len() < end {
        buffer.resize(end, 0);
    }
    buffer[offset..end].copy_from_slice(data);
    Ok(())
}

/// Copy a client-side buffer into the buffer bound to `target`
fn copy_client_buffer(step: &mut Step<'_>) -> Result<()> {
    let tid = step.tid();
    let target = step.arg_u32(0);
    let name = step.arg_u32(1);
    if step.ctx.thread(tid).bound_buffer(target) == 0 {
        return Err(TraceError::UnknownHandle {
            kind: ObjectKind::Buffer,
            id: 0,
        });
    }
    let data = step.ctx.client_buffer(tid, name)?.to_vec();
    if step.ctx.thread(tid).mapped.contains_key(&target) {
        step.driver.write_mapped(target, 0, &data)
    } else {
        let args = [
            Value::Enum(target),
            Value::Scalar(Scalar::I64(0)),
            Value::Scalar(Scalar::I64(data.len() as i64)),
            Value::Blob(Some(data)),
        ];
        step.driver.call("glBufferSubData", &args).map(|_| ())
    }
}

fn record_draw(step: &mut Step<'_>, params: Vec<u32>) {
    let draw_id = step.ctx.next_draw_id();
    trace!(draw_id, seq = step.record.seq, function = %step.sig.name, "draw");
    if step.ctx.options.collect_draw_params {
        step.ctx.draw_params.push(DrawParams {
            draw_id,
            seq: step.record.seq,
            function: step.sig.name.clone(),
            params,
        });
    }
}

fn words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn draw(step: &mut Step<'_>) -> Result<()> {
    generic(step)?;
    let params = step
        .record
        .args
        .iter()
        .filter(|v| matches!(v, Value::Scalar(_) | Value::Enum(_)))
        .filter_map(Value::as_u32)
        .collect();
    record_draw(step, params);
    Ok(())
}

/// Indirect draws read their parameter block inline or from the bound indirect buffer
fn draw_indirect(step: &mut Step<'_>) -> Result<()> {
    let index = step.index_of("indirect")?;
    let block_len = if step.sig.name == "glDrawElementsIndirect" { 20 } else { 16 };
    let block = match &step.record.args[index] {
        Value::Opaque(Opaque::Blob(bytes)) => bytes.clone(),
        Value::Opaque(Opaque::BufferObjectReference(offset)) => {
            step.driver
                .read_buffer(gl::DRAW_INDIRECT_BUFFER, *offset as u64, block_len)?
        }
        _ => Vec::new(),
    };
    generic(step)?;
    record_draw(step, words(&block));
    Ok(())
}

fn dispatch_indirect(step: &mut Step<'_>) -> Result<()> {
    let offset = step.arg_u64(0);
    let block = match step.driver.read_buffer(gl::DISPATCH_INDIRECT_BUFFER, offset, 12) {
        Ok(block) => block,
        Err(e) => {
            warn!(error = %e, "cannot read dispatch parameters");
            Vec::new()
        }
    };
    generic(step)?;
    record_draw(step, words(&block));
    Ok(())
}

/// Substitute ETC2 for ETC1 on drivers that dropped the legacy token
fn compressed_tex_image(step: &mut Step<'_>) -> Result<()> {
    let mut args = step.remap_args()?;
    let index = step.index_of("internalformat")?;
    if args[index] == Value::Enum(gl::ETC1_RGB8_OES) && !step.driver.capabilities().etc1 {
        trace!(seq = step.record.seq, "ETC1 texture uploaded as ETC2");
        args[index] = Value::Enum(gl::COMPRESSED_RGB8_ETC2);
    }
    step.invoke(&args)?;
    Ok(())
}

fn shader_source(step: &mut Step<'_>) -> Result<()> {
    generic(step)?;
    let shader = step.arg_u32(0);
    let strings = match step.record.args.get(2) {
        Some(Value::StringArray(Some(strings))) => strings.as_slice(),
        _ => &[],
    };
    let lengths: &[Scalar] = match step.record.args.get(3) {
        Some(Value::Array(Some(lengths))) => lengths,
        _ => &[],
    };
    let mut source = String::new();
    for (i, s) in strings.iter().enumerate() {
        let s = s.as_deref().unwrap_or("");
        match lengths.get(i).map(Scalar::as_i64) {
            Some(len)
                if len >= 0 && (len as usize) < s.len() && s.is_char_boundary(len as usize) =>
            {
                source.push_str(&s[..len as usize])
            }
            _ => source.push_str(s),
        }
    }
    step.ctx.set_shader_source(shader, source);
    Ok(())
}

fn attach_shader(step: &mut Step<'_>) -> Result<()> {
    generic(step)?;
    let program = step.arg_u32(0);
    let shader = step.arg_u32(1);
    step.ctx.attach_shader(program, shader);
    Ok(())
}

/// Link, or load a cached binary for the same attached sources
fn link_program(step: &mut Step<'_>) -> Result<()> {
    let old = step.arg_u32(0);
    let new = step.ctx.handles.resolve(ObjectKind::Program, old)?;
    if step.ctx.shader_cache.is_none() {
        return generic(step);
    }

    let sources = step.ctx.program_sources(old);
    if sources.is_empty() {
        return generic(step);
    }
    let key = ShaderCache::key(sources);

    let cached = step
        .ctx
        .shader_cache
        .as_ref()
        .and_then(|cache| cache.get(&key))
        .cloned();
    if let Some(entry) = cached {
        let loaded = step.driver.load_program_binary(new, entry.format, &entry.binary);
        if loaded && step.driver.link_status(new) == entry.link_status {
            debug!(program = old, "shader cache hit");
            step.ctx.stats.shader_cache_hits += 1;
            return Ok(());
        }
        debug!(program = old, "cached binary rejected, linking");
    }

    step.ctx.stats.shader_cache_misses += 1;
    generic(step)?;
    if step.driver.capabilities().program_binary {
        if let Some((format, binary)) = step.driver.program_binary(new) {
            let link_status = step.driver.link_status(new);
            if let Some(cache) = step.ctx.shader_cache.as_mut() {
                cache.insert(
                    key,
                    CacheEntry {
                        format,
                        binary,
                        link_status,
                    },
                );
            }
        }
    }
    Ok(())
}

fn uniform_location(step: &mut Step<'_>) -> Result<()> {
    let args = step.remap_args()?;
    let ret = step.invoke(&args)?;
    if let (Value::Scoped(old), Value::Scoped(-1)) = (&step.record.ret, &ret) {
        if *old != -1 {
            warn!(seq = step.record.seq, location = old, "uniform is inactive on this driver");
        }
    }
    step.register_return(&ret);
    Ok(())
}

fn is_draw(name: &str) -> bool {
    (name.starts_with("glDraw") && name != "glDrawBuffers") || name == "glDispatchCompute"
}

fn special_handler(name: &str) -> Option<Handler> {
    let handler: Handler = match name {
        "glDeleteBuffers" | "glDeleteTextures" | "glDeleteFramebuffers" | "glDeleteRenderbuffers"
        | "glDeleteSamplers" | "glDeleteVertexArrays" | "glDeleteTransformFeedbacks"
        | "glDeleteQueries" | "glDeleteProgramPipelines" => delete_objects,
        "glDeleteProgram" | "glDeleteShader" | "glDeleteSync" => delete_single,
        "glBindBuffer" | "glBindBufferBase" | "glBindBufferRange" => bind_buffer,
        "glBufferData" => buffer_data,
        "glUseProgram" => use_program,
        "glBindFramebuffer" => bind_framebuffer,
        "glMapBufferRange" | "glMapBufferOES" => map_buffer,
        "glUnmapBuffer" => unmap_buffer,
        "glFlushMappedBufferRange" => flush_mapped,
        MAPPED_BUFFER_WRITE => mapped_buffer_write,
        MARKER => marker,
        "glCreateClientSideBuffer" => create_client_buffer,
        "glDeleteClientSideBuffer" => delete_client_buffer,
        "glClientSideBufferData" => client_buffer_data,
        "glClientSideBufferSubData" => client_buffer_sub_data,
        "glCopyClientSideBuffer" => copy_client_buffer,
        "glDrawArraysIndirect" | "glDrawElementsIndirect" => draw_indirect,
        "glDispatchComputeIndirect" => dispatch_indirect,
        "glCompressedTexImage2D" | "glCompressedTexImage3D" => compressed_tex_image,
        "glShaderSource" => shader_source,
        "glAttachShader" => attach_shader,
        "glLinkProgram" => link_program,
        "glGetUniformLocation" => uniform_location,
        n if n.starts_with("glGen") => gen_objects,
        n if is_draw(n) => draw,
        _ => return None,
    };
    Some(handler)
}

/// Function id → handler table
pub struct Dispatcher {
    handlers: Vec<Option<Handler>>,
    warned: FnvHashSet<String>,
}

impl Dispatcher {
    pub fn new(registry: &SchemaRegistry) -> Self {
        let mut handlers: Vec<Option<Handler>> = vec![None; registry.max_id() as usize + 1];
        for sig in registry.iter() {
            let handler = if sig.unsupported {
                unsupported
            } else {
                special_handler(&sig.name).unwrap_or(generic)
            };
            handlers[sig.id as usize] = Some(handler);
        }
        Self {
            handlers,
            warned: FnvHashSet::default(),
        }
    }

    pub fn has_handler(&self, function_id: u16) -> bool {
        matches!(self.handlers.get(function_id as usize), Some(Some(_)))
    }

    /// Replay one record
    ///
    /// Entry points neither the schema nor the driver can run are stubbed: a
    /// warning is logged once per name and the call counts as skipped.
    pub fn dispatch(
        &mut self,
        ctx: &mut ReplayContext,
        driver: &mut dyn Driver,
        record: &CallRecord,
    ) -> Result<()> {
        let registry = Arc::clone(&ctx.registry);
        let handler = self
            .handlers
            .get(record.function_id as usize)
            .copied()
            .flatten();
        let (Some(sig), Some(handler)) = (registry.by_id(record.function_id), handler) else {
            return Err(TraceError::UnsupportedFunction(format!(
                "function id {}",
                record.function_id
            )));
        };
        if record.args.len() != sig.params.len() {
            return Err(CodecError::ArgCount {
                function: sig.name.clone(),
                expected: sig.params.len(),
                found: record.args.len(),
            }
            .into());
        }

        let mut step = Step {
            ctx: &mut *ctx,
            driver,
            registry: &registry,
            record,
            sig,
        };
        match handler(&mut step) {
            Err(TraceError::UnsupportedFunction(name)) => {
                if self.warned.insert(name.clone()) {
                    warn!(function = %name, "unsupported entry point, replaying as no-op");
                }
                *ctx.stats.unsupported.entry(name).or_default() += 1;
                ctx.stats.skipped += 1;
                Ok(())
            }
            other => other,
        }
    }
}
