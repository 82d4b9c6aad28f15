//! Capture-side tracer
//!
//! Every intercepted entry point calls [`Tracer::record`] with its arguments and a
//! closure that runs the real driver function. A per-thread call-depth guard keeps
//! driver calls made from inside that closure (or from the tracer's own
//! bookkeeping) out of the trace.

use super::pointer::{blob_value, classify, declared_len, BindingState, CaptureArg, ClientPointer};
use crate::codec::{CallRecord, CodecContext, RecordFlags, Scalar, Value};
use crate::container::{Metadata, ThreadInfo, TraceWriter};
use crate::error::{CodecError, Result, TraceError};
use crate::handles::ObjectKind;
use crate::schema::{ArgType, SchemaRegistry, Signature, MAPPED_BUFFER_WRITE, MARKER};
use fnv::FnvHashMap;
use std::cell::Cell;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::ThreadId;
use tracing::{debug, info, warn};

thread_local! {
    static CALL_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Increments the calling thread's depth for as long as it lives
#[derive(Debug)]
pub struct CallDepthGuard {
    depth: u32,
}

impl CallDepthGuard {
    pub fn enter() -> Self {
        let depth = CALL_DEPTH.with(|d| {
            let depth = d.get();
            d.set(depth + 1);
            depth
        });
        Self { depth }
    }

    /// Whether this is the application's own call rather than a nested one
    pub fn is_outermost(&self) -> bool {
        self.depth == 0
    }
}

impl Drop for CallDepthGuard {
    fn drop(&mut self) {
        CALL_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

#[derive(Debug, Default)]
struct SlotState {
    bindings: BindingState,
    window: Option<(u32, u32)>,
}

#[derive(Debug, Default)]
struct CaptureState {
    slots: FnvHashMap<ThreadId, u8>,
    threads: Vec<SlotState>,
    /// Slot that issued the first frame boundary
    default_slot: Option<u8>,
    frames: u64,
    calls: u64,
    /// Driver sync pointer → tracer token
    sync_tokens: FnvHashMap<u64, u32>,
    next_sync: u32,
}

impl CaptureState {
    fn slot(&mut self) -> Result<u8> {
        let id = std::thread::current().id();
        if let Some(&slot) = self.slots.get(&id) {
            return Ok(slot);
        }
        let slot = u8::try_from(self.threads.len())
            .map_err(|_| TraceError::Capacity("more than 256 traced threads".into()))?;
        self.slots.insert(id, slot);
        self.threads.push(SlotState::default());
        debug!(slot, "new traced thread");
        Ok(slot)
    }

    fn sync_token(&mut self, pointer: u64) -> u32 {
        if let Some(&token) = self.sync_tokens.get(&pointer) {
            return token;
        }
        self.next_sync += 1;
        self.sync_tokens.insert(pointer, self.next_sync);
        self.next_sync
    }
}

pub struct Tracer {
    registry: Arc<SchemaRegistry>,
    ctx: CodecContext,
    writer: Mutex<TraceWriter>,
    state: Mutex<CaptureState>,
}

fn is_sync(ty: &ArgType) -> bool {
    matches!(
        ty,
        ArgType::Handle {
            kind: ObjectKind::Sync,
            ..
        }
    )
}

impl Tracer {
    pub fn new(writer: TraceWriter) -> Self {
        Self {
            registry: Arc::clone(writer.registry()),
            ctx: *writer.context(),
            writer: Mutex::new(writer),
            state: Mutex::new(CaptureState::default()),
        }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Run `invoke` and record the call
    ///
    /// The real function has already run when an error is returned. Calls made
    /// while another recorded call is on the stack run unrecorded.
    pub fn record<'a, F>(&self, name: &str, args: Vec<CaptureArg<'a>>, invoke: F) -> Result<Value>
    where
        F: FnOnce() -> Value,
    {
        let guard = CallDepthGuard::enter();
        if !guard.is_outermost() {
            return Ok(invoke());
        }
        let Some(sig) = self.registry.resolve_name(name) else {
            warn!(function = name, "call to an entry point the schema lacks, not recorded");
            return Ok(invoke());
        };
        if sig.params.len() != args.len() {
            return Err(CodecError::ArgCount {
                function: sig.name.clone(),
                expected: sig.params.len(),
                found: args.len(),
            }
            .into());
        }

        let ret = invoke();
        let flags = RecordFlags {
            side_effect: sig.side_effects,
            ..RecordFlags::default()
        };
        self.append(sig, &args, &ret, flags)?;
        Ok(ret)
    }

    /// Record a call the tracer itself generated
    pub fn inject(&self, name: &str, args: Vec<Value>, ret: Value) -> Result<()> {
        let _guard = CallDepthGuard::enter();
        let sig = self
            .registry
            .resolve_name(name)
            .ok_or_else(|| TraceError::UnsupportedFunction(name.to_string()))?;
        let args: Vec<CaptureArg<'_>> = args.into_iter().map(CaptureArg::Value).collect();
        let flags = RecordFlags {
            injected: true,
            side_effect: sig.side_effects,
            ..RecordFlags::default()
        };
        self.append(sig, &args, &ret, flags)
    }

    /// Bytes the application wrote into mapped memory of the buffer bound to `target`
    pub fn mapped_write(&self, target: u32, offset: u32, data: &[u8]) -> Result<()> {
        self.inject(
            MAPPED_BUFFER_WRITE,
            vec![
                Value::Enum(target),
                Value::Scalar(Scalar::U32(offset)),
                Value::Blob(Some(data.to_vec())),
            ],
            Value::Void,
        )
    }

    pub fn marker(&self, text: &str) -> Result<()> {
        self.inject(MARKER, vec![Value::String(Some(text.to_string()))], Value::Void)
    }

    /// Window size of the calling thread's surface
    pub fn set_window_size(&self, width: u32, height: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = state.slot()?;
        state.threads[slot as usize].window = Some((width, height));
        Ok(())
    }

    /// Translate application arguments to stored values and append the record
    fn append(
        &self,
        sig: &Signature,
        args: &[CaptureArg<'_>],
        ret: &Value,
        flags: RecordFlags,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = state.slot()?;

        let mut values = Vec::with_capacity(args.len());
        for (param, arg) in sig.params.iter().zip(args) {
            let value = match arg {
                CaptureArg::Value(Value::Scalar(Scalar::U64(pointer))) if is_sync(&param.ty) => {
                    Value::Handle(state.sync_token(*pointer))
                }
                CaptureArg::Value(v) => v.clone(),
                CaptureArg::Pointer(p) => {
                    let len = declared_len(param, args);
                    match &param.ty {
                        ArgType::Opaque(role) => {
                            let bindings = &state.threads[slot as usize].bindings;
                            Value::Opaque(classify(*role, param, *p, len, bindings, &self.ctx))
                        }
                        ArgType::Blob => blob_value(*p, len),
                        other => {
                            return Err(CodecError::TypeMismatch {
                                expected: other.to_string(),
                            }
                            .into())
                        }
                    }
                }
            };
            values.push(value);
        }
        let ret = match ret {
            Value::Scalar(Scalar::U64(pointer)) if is_sync(&sig.ret) => {
                Value::Handle(state.sync_token(*pointer))
            }
            other => other.clone(),
        };

        track(&mut state, slot, sig, &values);
        state.calls += 1;
        if sig.frame_boundary {
            state.frames += 1;
            state.default_slot.get_or_insert(slot);
        }

        let mut record = CallRecord::new(sig.id, slot, values, ret);
        record.flags = flags;
        // the state lock is held so records reach the file in the order their
        // bindings were observed
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.append_call(&record)?;
        Ok(())
    }

    /// Frame and call counts so far
    pub fn counts(&self) -> (u64, u64) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        (state.frames, state.calls)
    }

    /// Store thread, frame and call metadata and close the file
    pub fn finish(self, mut metadata: Metadata) -> Result<()> {
        let state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        let writer = self.writer.into_inner().unwrap_or_else(PoisonError::into_inner);

        metadata.default_tid = state.default_slot.unwrap_or(0) as u32;
        metadata.frame_count = state.frames;
        metadata.call_count = state.calls;
        metadata.threads = state
            .threads
            .iter()
            .enumerate()
            .map(|(slot, s)| {
                let (w, h) = s.window.unwrap_or((0, 0));
                ThreadInfo::new(slot as u32, w, h)
            })
            .collect();
        info!(
            frames = state.frames,
            calls = state.calls,
            threads = state.threads.len(),
            "capture finished"
        );
        writer.finish(&metadata)
    }
}

/// Binding changes the classifier must see for later calls
fn track(state: &mut CaptureState, slot: u8, sig: &Signature, values: &[Value]) {
    let bindings = &mut state.threads[slot as usize].bindings;
    let arg = |i: usize| values.get(i).and_then(Value::as_u32).unwrap_or(0);
    match sig.name.as_str() {
        "glBindBuffer" => bindings.bind(arg(0), arg(1)),
        "glBindBufferBase" | "glBindBufferRange" => bindings.bind(arg(0), arg(2)),
        "glDeleteBuffers" => {
            if let Some(Value::HandleArray(Some(ids))) = values.get(1) {
                for &id in ids {
                    bindings.unbind_buffer(id);
                }
            }
        }
        "glDeleteSync" => {
            if let Some(Value::Handle(token)) = values.first() {
                state.sync_tokens.retain(|_, t| t != token);
            }
        }
        _ => {}
    }
}

/// Shorthand for the common "pointer to client memory" argument
pub fn memory(bytes: &[u8]) -> CaptureArg<'_> {
    CaptureArg::Pointer(ClientPointer::Memory(bytes))
}

/// Shorthand for a buffer-relative pointer argument
pub fn offset(offset: u32) -> CaptureArg<'static> {
    CaptureArg::Pointer(ClientPointer::Offset(offset))
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (frames, calls) = self.counts();
        f.debug_struct("Tracer")
            .field("version", &self.ctx.version)
            .field("frames", &frames)
            .field("calls", &calls)
            .finish()
    }
}
