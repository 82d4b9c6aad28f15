//! Replay state carried from one record to the next
//!
//! Nothing here is global: one `ReplayContext` holds everything a dispatch step
//! may read or change, and is passed explicitly to every handler.

use super::shader_cache::ShaderCache;
use crate::error::{Result, TraceError};
use crate::handles::HandleTable;
use crate::schema::SchemaRegistry;
use fnv::FnvHashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// An active buffer mapping, in record-time ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRange {
    pub buffer: u32,
    pub offset: u64,
    pub length: u64,
    pub access: u32,
}

/// Binding state of one recorded thread
#[derive(Debug, Clone, Default)]
pub struct ThreadState {
    /// Target → record-time buffer id
    pub bound_buffers: FnvHashMap<u32, u32>,
    /// Record-time program id
    pub current_program: u32,
    /// Record-time framebuffer id
    pub current_framebuffer: u32,
    /// Target → active mapping
    pub mapped: FnvHashMap<u32, MappedRange>,
}

impl ThreadState {
    pub fn bound_buffer(&self, target: u32) -> u32 {
        self.bound_buffers.get(&target).copied().unwrap_or(0)
    }

    /// Drop every binding and mapping of a deleted buffer
    pub fn forget_buffer(&mut self, buffer: u32) {
        self.bound_buffers.retain(|_, bound| *bound != buffer);
        self.mapped.retain(|_, m| m.buffer != buffer);
    }
}

/// Parameters of one draw or dispatch, kept when `collect_draw_params` is set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrawParams {
    pub draw_id: u64,
    pub seq: u64,
    pub function: String,
    pub params: Vec<u32>,
}

/// Counters reported at the end of a replay
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    pub calls: u64,
    pub skipped: u64,
    pub frames: u64,
    pub draws: u64,
    pub objects_created: u64,
    pub shader_cache_hits: u64,
    pub shader_cache_misses: u64,
    pub errors: BTreeMap<String, u64>,
    /// Unsupported entry points with how often they were stubbed
    pub unsupported: BTreeMap<String, u64>,
}

/// Per-run switches the handlers consult
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextOptions {
    pub force_offscreen: bool,
    pub collect_draw_params: bool,
}

pub struct ReplayContext {
    pub registry: Arc<SchemaRegistry>,
    pub handles: HandleTable,
    pub options: ContextOptions,
    threads: FnvHashMap<u8, ThreadState>,
    client_buffers: FnvHashMap<(u8, u32), Vec<u8>>,
    /// Monotonic draw counter, independent of sequence numbers
    pub draw_id: u64,
    pub draw_params: Vec<DrawParams>,
    /// Record-time shader id → source
    shader_sources: FnvHashMap<u32, String>,
    /// Record-time program id → attached shaders, in attach order
    attachments: FnvHashMap<u32, Vec<u32>>,
    pub shader_cache: Option<ShaderCache>,
    /// Record-time buffer id → size from its last `glBufferData`
    pub buffer_sizes: FnvHashMap<u32, u64>,
    /// Replay id of the offscreen framebuffer standing in for the default one
    pub offscreen_framebuffer: Option<u32>,
    pub stats: ReplayStats,
}

impl ReplayContext {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            handles: HandleTable::new(),
            options: ContextOptions::default(),
            threads: FnvHashMap::default(),
            client_buffers: FnvHashMap::default(),
            draw_id: 0,
            draw_params: Vec::new(),
            shader_sources: FnvHashMap::default(),
            attachments: FnvHashMap::default(),
            shader_cache: None,
            buffer_sizes: FnvHashMap::default(),
            offscreen_framebuffer: None,
            stats: ReplayStats::default(),
        }
    }

    pub fn thread(&mut self, tid: u8) -> &mut ThreadState {
        self.threads.entry(tid).or_default()
    }

    pub fn thread_ref(&self, tid: u8) -> Option<&ThreadState> {
        self.threads.get(&tid)
    }

    /// Clear state tied to a deleted buffer on every thread
    pub fn forget_buffer(&mut self, buffer: u32) {
        self.buffer_sizes.remove(&buffer);
        for state in self.threads.values_mut() {
            state.forget_buffer(buffer);
        }
    }

    pub fn next_draw_id(&mut self) -> u64 {
        let id = self.draw_id;
        self.draw_id += 1;
        self.stats.draws += 1;
        id
    }

    pub fn create_client_buffer(&mut self, tid: u8, name: u32) {
        self.client_buffers.insert((tid, name), Vec::new());
    }

    pub fn delete_client_buffer(&mut self, tid: u8, name: u32) -> Result<()> {
        self.client_buffers
            .remove(&(tid, name))
            .map(|_| ())
            .ok_or(TraceError::UnknownClientSideBuffer { thread: tid, name })
    }

    pub fn client_buffer(&self, tid: u8, name: u32) -> Result<&[u8]> {
        self.client_buffers
            .get(&(tid, name))
            .map(Vec::as_slice)
            .ok_or(TraceError::UnknownClientSideBuffer { thread: tid, name })
    }

    pub fn client_buffer_mut(&mut self, tid: u8, name: u32) -> Result<&mut Vec<u8>> {
        self.client_buffers
            .get_mut(&(tid, name))
            .ok_or(TraceError::UnknownClientSideBuffer { thread: tid, name })
    }

    pub fn set_shader_source(&mut self, shader: u32, source: String) {
        self.shader_sources.insert(shader, source);
    }

    pub fn attach_shader(&mut self, program: u32, shader: u32) {
        let attached = self.attachments.entry(program).or_default();
        if !attached.contains(&shader) {
            attached.push(shader);
        }
    }

    pub fn forget_program(&mut self, program: u32) {
        self.attachments.remove(&program);
    }

    pub fn forget_shader(&mut self, shader: u32) {
        self.shader_sources.remove(&shader);
    }

    /// Sources of the shaders attached to `program`, in attach order
    pub fn program_sources(&self, program: u32) -> Vec<&str> {
        self.attachments
            .get(&program)
            .map(|shaders| {
                shaders
                    .iter()
                    .filter_map(|s| self.shader_sources.get(s).map(String::as_str))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn count_error(&mut self, error: &TraceError) {
        *self.stats.errors.entry(error.class().to_string()).or_default() += 1;
    }
}
