//! Replay loop
//!
//! Records are dispatched strictly in stream order on the calling thread. Errors
//! confined to one record are logged, counted and skipped; only I/O and container
//! corruption end the run early.

use super::config::ReplayConfig;
use super::context::{ContextOptions, DrawParams, ReplayContext};
use super::dispatch::Dispatcher;
use super::driver::Driver;
use super::shader_cache::ShaderCache;
use crate::codec::CallRecord;
use crate::container::TraceReader;
use crate::error::{Result, TraceError};
use crate::schema::{ArgType, Direction, SchemaRegistry, Signature};
use fnv::FnvHashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Why a replay stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum StopReason {
    EndOfStream,
    FrameLimit,
    Cancelled,
    Fatal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Dispatching { seq: u64 },
    Finished(StopReason),
}

/// Summary of one replay run
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub calls: u64,
    pub skipped: u64,
    pub frames: u64,
    pub draws: u64,
    pub objects_created: u64,
    pub errors: BTreeMap<String, u64>,
    pub unsupported: BTreeMap<String, u64>,
    pub shader_cache_hits: u64,
    pub shader_cache_misses: u64,
    pub stop_reason: StopReason,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub draw_params: Vec<DrawParams>,
}

impl ReplayReport {
    pub fn error_count(&self) -> u64 {
        self.errors.values().sum()
    }
}

/// A call that cannot be skipped without losing an id mapping later calls need
fn registers_ids(sig: &Signature) -> bool {
    matches!(sig.ret, ArgType::Handle { .. } | ArgType::Scoped(_))
        || sig
            .params
            .iter()
            .any(|p| p.dir == Direction::Out && matches!(p.ty, ArgType::HandleArray(_)))
}

fn is_fatal(error: &TraceError) -> bool {
    matches!(error, TraceError::Io(_) | TraceError::Format(_))
}

pub struct ReplayEngine<D: Driver> {
    driver: D,
    context: ReplayContext,
    dispatcher: Dispatcher,
    config: ReplayConfig,
    state: EngineState,
    cancel: Arc<AtomicBool>,
    last_seq: FnvHashMap<u8, u64>,
}

impl<D: Driver> ReplayEngine<D> {
    pub fn new(registry: Arc<SchemaRegistry>, driver: D, config: ReplayConfig) -> Result<Self> {
        config.validate().map_err(TraceError::Capacity)?;
        let mut context = ReplayContext::new(Arc::clone(&registry));
        context.options = ContextOptions {
            force_offscreen: config.force_offscreen,
            collect_draw_params: config.collect_draw_params,
        };
        if let Some(path) = &config.shader_cache {
            context.shader_cache = Some(ShaderCache::open(path)?);
        }
        Ok(Self {
            driver,
            dispatcher: Dispatcher::new(&registry),
            context,
            config,
            state: EngineState::Idle,
            cancel: Arc::new(AtomicBool::new(false)),
            last_seq: FnvHashMap::default(),
        })
    }

    /// Flag that stops the run before the next record when set
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn context(&self) -> &ReplayContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ReplayContext {
        &mut self.context
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Dispatch one record
    pub fn step(&mut self, record: &CallRecord) -> Result<()> {
        let registry = Arc::clone(&self.context.registry);
        let sig = registry.by_id(record.function_id);

        if let Some(&last) = self.last_seq.get(&record.thread_id) {
            if record.seq <= last && record.seq != 0 {
                warn!(thread = record.thread_id, seq = record.seq, last, "sequence went backwards");
            }
        }
        self.last_seq.insert(record.thread_id, record.seq);

        if let Some(sig) = sig {
            if self.config.skip_side_effect_free && !sig.side_effects && !registers_ids(sig) {
                self.context.stats.skipped += 1;
                return Ok(());
            }
        }

        self.state = EngineState::Dispatching { seq: record.seq };
        self.context.stats.calls += 1;
        let result = self
            .dispatcher
            .dispatch(&mut self.context, &mut self.driver, record);
        self.state = EngineState::Idle;

        if sig.is_some_and(|s| s.frame_boundary) {
            self.context.stats.frames += 1;
            debug!(frame = self.context.stats.frames, seq = record.seq, "frame boundary");
        }
        result
    }

    /// Replay records until the stream ends, a fatal error, the frame limit or cancellation
    pub fn run<I>(&mut self, records: I) -> ReplayReport
    where
        I: IntoIterator<Item = Result<CallRecord>>,
    {
        let mut stop = StopReason::EndOfStream;
        for item in records {
            if self.cancel.load(Ordering::Relaxed) {
                stop = StopReason::Cancelled;
                break;
            }
            let record = match item {
                Ok(record) => record,
                Err(e) if e.is_recoverable() => {
                    warn!(error = %e, "skipping undecodable record");
                    self.context.count_error(&e);
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "trace is unreadable past this point");
                    self.context.count_error(&e);
                    stop = StopReason::Fatal(e.to_string());
                    break;
                }
            };

            if let Err(e) = self.step(&record) {
                self.context.count_error(&e);
                if is_fatal(&e) {
                    error!(seq = record.seq, error = %e, "replay aborted");
                    stop = StopReason::Fatal(e.to_string());
                    break;
                }
                warn!(seq = record.seq, function = record.function_id, error = %e, "call failed");
            }

            if self
                .config
                .max_frames
                .is_some_and(|max| self.context.stats.frames >= max)
            {
                stop = StopReason::FrameLimit;
                break;
            }
        }
        self.finish(stop)
    }

    /// Replay every record of an open trace
    pub fn replay(&mut self, reader: &TraceReader) -> ReplayReport {
        info!(path = %reader.path().display(), version = reader.version(), "replaying trace");
        self.run(reader.records())
    }

    fn finish(&mut self, stop: StopReason) -> ReplayReport {
        if let Some(cache) = self.context.shader_cache.as_mut() {
            if let Err(e) = cache.save() {
                warn!(error = %e, "failed to save shader cache");
            }
        }
        let stats = &self.context.stats;
        info!(
            calls = stats.calls,
            frames = stats.frames,
            draws = stats.draws,
            stop = ?stop,
            "replay finished"
        );
        self.state = EngineState::Finished(stop.clone());
        ReplayReport {
            calls: stats.calls,
            skipped: stats.skipped,
            frames: stats.frames,
            draws: stats.draws,
            objects_created: stats.objects_created,
            errors: stats.errors.clone(),
            unsupported: stats.unsupported.clone(),
            shader_cache_hits: stats.shader_cache_hits,
            shader_cache_misses: stats.shader_cache_misses,
            stop_reason: stop,
            draw_params: std::mem::take(&mut self.context.draw_params),
        }
    }
}
