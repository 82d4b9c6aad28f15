//! Client pointers and how they are stored
//!
//! The same `const void*` argument means different things depending on what is
//! bound when the call is made. Classification happens once, at capture time, and
//! the result is stored as an [`Opaque`] sub-variant.

use crate::codec::{CodecContext, Opaque, Value};
use crate::gl;
use crate::schema::{LenExpr, OpaqueRole, Param};
use fnv::FnvHashMap;
use tracing::warn;

/// A pointer argument as the application passed it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPointer<'a> {
    Null,
    /// Offset into whatever buffer is bound for the argument
    Offset(u32),
    /// Client memory; clipped to the declared length when captured
    Memory(&'a [u8]),
    /// Offset into an emulated client-side buffer
    ClientSide { name: u32, offset: u32 },
}

impl ClientPointer<'_> {
    fn offset(&self) -> u32 {
        match *self {
            ClientPointer::Offset(offset) | ClientPointer::ClientSide { offset, .. } => offset,
            ClientPointer::Null | ClientPointer::Memory(_) => 0,
        }
    }
}

/// One argument handed to the tracer
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureArg<'a> {
    Value(Value),
    Pointer(ClientPointer<'a>),
}

impl From<Value> for CaptureArg<'_> {
    fn from(value: Value) -> Self {
        CaptureArg::Value(value)
    }
}

impl<'a> From<ClientPointer<'a>> for CaptureArg<'a> {
    fn from(pointer: ClientPointer<'a>) -> Self {
        CaptureArg::Pointer(pointer)
    }
}

impl CaptureArg<'_> {
    fn as_i64(&self) -> Option<i64> {
        match self {
            CaptureArg::Value(v) => v.as_i64(),
            CaptureArg::Pointer(_) => None,
        }
    }
}

/// Buffers bound on one traced thread
#[derive(Debug, Clone, Default)]
pub struct BindingState {
    buffers: FnvHashMap<u32, u32>,
}

impl BindingState {
    pub fn bind(&mut self, target: u32, buffer: u32) {
        if buffer == 0 {
            self.buffers.remove(&target);
        } else {
            self.buffers.insert(target, buffer);
        }
    }

    pub fn bound(&self, target: u32) -> u32 {
        self.buffers.get(&target).copied().unwrap_or(0)
    }

    /// Forget a deleted buffer on every target
    pub fn unbind_buffer(&mut self, buffer: u32) {
        self.buffers.retain(|_, bound| *bound != buffer);
    }
}

/// Capture-time byte length of a pointer argument, if declared
pub fn declared_len(param: &Param, args: &[CaptureArg<'_>]) -> Option<usize> {
    let arg = |i: usize| args.get(i).and_then(CaptureArg::as_i64).unwrap_or(0).max(0) as u64;
    let len = match param.len.as_ref()? {
        LenExpr::Fixed(n) => *n as u64,
        LenExpr::Arg { index, multiplier } => arg(*index) * *multiplier as u64,
        LenExpr::Image {
            format,
            ty,
            width,
            height,
            depth,
        } => gl::image_size(
            arg(*format) as u32,
            arg(*ty) as u32,
            arg(*width) as u32,
            arg(*height) as u32,
            depth.map_or(1, |d| arg(d) as u32),
            gl::DEFAULT_UNPACK_ALIGNMENT,
        ) as u64,
    };
    Some(len as usize)
}

fn clip(memory: &[u8], len: Option<usize>) -> Vec<u8> {
    let n = len.map_or(memory.len(), |len| len.min(memory.len()));
    memory[..n].to_vec()
}

/// Store a blob argument
pub fn blob_value(pointer: ClientPointer<'_>, len: Option<usize>) -> Value {
    match pointer {
        ClientPointer::Memory(memory) => Value::Blob(Some(clip(memory, len))),
        ClientPointer::Null => Value::Blob(None),
        other => {
            warn!(pointer = ?other, "buffer-relative pointer passed for a plain blob");
            Value::Blob(None)
        }
    }
}

/// Pick the opaque sub-variant for a pointer argument
pub fn classify(
    role: OpaqueRole,
    param: &Param,
    pointer: ClientPointer<'_>,
    len: Option<usize>,
    bindings: &BindingState,
    ctx: &CodecContext,
) -> Opaque {
    if ctx.is_legacy() {
        return match pointer {
            ClientPointer::Memory(memory) => Opaque::Blob(clip(memory, len)),
            ClientPointer::Null => Opaque::Blob(Vec::new()),
            other => {
                warn!(
                    pointer = ?other,
                    version = ctx.version,
                    "cannot store a buffer reference in a legacy trace"
                );
                Opaque::Blob(Vec::new())
            }
        };
    }

    let bound_target = match role {
        OpaqueRole::Texture => Some(gl::PIXEL_UNPACK_BUFFER),
        OpaqueRole::Readback => Some(gl::PIXEL_PACK_BUFFER),
        OpaqueRole::Generic => param.buffer_target,
    };
    if bound_target.is_some_and(|t| bindings.bound(t) != 0) {
        return Opaque::BufferObjectReference(pointer.offset());
    }

    match (role, pointer) {
        (OpaqueRole::Readback, _) => Opaque::NoOp,
        (_, ClientPointer::Memory(memory)) => Opaque::Blob(clip(memory, len)),
        (OpaqueRole::Generic, ClientPointer::ClientSide { name, offset }) => {
            Opaque::ClientSideBufferReference { name, offset }
        }
        (_, ClientPointer::Null) => Opaque::Blob(Vec::new()),
        (_, other) => {
            warn!(param = %param.name, pointer = ?other, "pointer has no buffer to refer to");
            Opaque::Blob(Vec::new())
        }
    }
}
