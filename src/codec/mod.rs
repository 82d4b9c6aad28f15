//! Type-directed value codec
//!
//! Every field is little-endian and padded to 4 bytes. Variable-length values carry
//! a `u32` length prefix in which `u32::MAX` marks an absent value, so an empty
//! blob and a NULL pointer stay distinguishable.
//!
//! Opaque arguments are the only values whose encoding depends on context: in
//! traces at or below the legacy threshold they are always an untagged blob, and
//! in newer traces a tag selects the sub-variant, restricted by the argument's role.

mod cursor;
pub mod record;
mod value;

pub use cursor::{padding, ByteReader, ByteWriter, ALIGNMENT};
pub use record::{
    decode_record, encode_record, peek_header, CallRecord, RecordError, RecordErrorKind,
    RecordFlags,
};
pub use value::{Opaque, Scalar, Value};

use crate::error::{CodecError, Result};
use crate::schema::{ArgType, OpaqueRole, ScalarType};
use std::io::Write;

/// Sentinel length for an absent array, blob or string array
pub const ABSENT: u32 = u32::MAX;

/// Default legacy threshold: opaque values in versions at or below it are bare blobs
pub const DEFAULT_LEGACY_THRESHOLD: u32 = 5;

/// The only state the codec depends on besides the declared type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecContext {
    pub version: u32,
    pub legacy_threshold: u32,
}

impl CodecContext {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            legacy_threshold: DEFAULT_LEGACY_THRESHOLD,
        }
    }

    pub fn with_legacy_threshold(mut self, threshold: u32) -> Self {
        self.legacy_threshold = threshold;
        self
    }

    pub fn is_legacy(&self) -> bool {
        self.version <= self.legacy_threshold
    }
}

fn mismatch(ty: &ArgType) -> CodecError {
    CodecError::TypeMismatch {
        expected: ty.to_string(),
    }
}

fn wire_len(len: usize) -> std::result::Result<u32, CodecError> {
    u32::try_from(len)
        .ok()
        .filter(|&l| l != ABSENT)
        .ok_or(CodecError::TooLong(len))
}

/// Encode one value of declared type `ty`
pub fn encode<W: Write>(
    ty: &ArgType,
    value: &Value,
    ctx: &CodecContext,
    w: &mut ByteWriter<W>,
) -> Result<()> {
    match (ty, value) {
        (ArgType::Void, Value::Void) => {}
        (ArgType::Scalar(st), Value::Scalar(s)) if s.ty() == *st => {
            w.write_padded(&s.to_le_bytes())?;
        }
        (ArgType::Enum(_), Value::Enum(v)) | (ArgType::Handle { .. }, Value::Handle(v)) => {
            w.write_u32(*v)?;
        }
        (ArgType::Scoped(_), Value::Scoped(v)) => w.write_i32(*v)?,
        (ArgType::HandleArray(_), Value::HandleArray(ids)) => match ids {
            None => w.write_u32(ABSENT)?,
            Some(ids) => {
                w.write_u32(wire_len(ids.len())?)?;
                for id in ids {
                    w.write_u32(*id)?;
                }
            }
        },
        (ArgType::String, Value::String(s)) => encode_string(s.as_deref(), w)?,
        (ArgType::StringArray, Value::StringArray(v)) => match v {
            None => w.write_u32(ABSENT)?,
            Some(strings) => {
                w.write_u32(wire_len(strings.len())?)?;
                for s in strings {
                    encode_string(s.as_deref(), w)?;
                }
            }
        },
        (ArgType::Array(st), Value::Array(items)) => match items {
            None => w.write_u32(ABSENT)?,
            Some(items) => {
                let mut bytes = Vec::with_capacity(items.len() * st.width());
                for item in items {
                    if item.ty() != *st {
                        return Err(mismatch(ty).into());
                    }
                    bytes.extend_from_slice(&item.to_le_bytes());
                }
                encode_bytes(Some(&bytes), w)?;
            }
        },
        (ArgType::Blob, Value::Blob(b)) => encode_bytes(b.as_deref(), w)?,
        (ArgType::Pointer(inner), Value::Pointer(p)) => match p {
            None => w.write_u32(0)?,
            Some(pointee) => {
                w.write_u32(1)?;
                encode(inner, pointee, ctx, w)?;
            }
        },
        (ArgType::Opaque(role), Value::Opaque(o)) => encode_opaque(*role, o, ctx, w)?,
        _ => return Err(mismatch(ty).into()),
    }
    Ok(())
}

fn encode_string<W: Write>(s: Option<&str>, w: &mut ByteWriter<W>) -> Result<()> {
    match s {
        None => w.write_u32(0)?,
        Some(s) => {
            w.write_u32(wire_len(s.len() + 1)?)?;
            w.write_bytes(s.as_bytes())?;
            w.write_padded(&[0])?;
        }
    }
    Ok(())
}

fn encode_bytes<W: Write>(bytes: Option<&[u8]>, w: &mut ByteWriter<W>) -> Result<()> {
    match bytes {
        None => w.write_u32(ABSENT)?,
        Some(bytes) => {
            w.write_u32(wire_len(bytes.len())?)?;
            w.write_padded(bytes)?;
        }
    }
    Ok(())
}

fn encode_opaque<W: Write>(
    role: OpaqueRole,
    opaque: &Opaque,
    ctx: &CodecContext,
    w: &mut ByteWriter<W>,
) -> Result<()> {
    if ctx.is_legacy() {
        return match opaque {
            Opaque::Blob(bytes) => encode_bytes(Some(bytes), w),
            other => Err(CodecError::IllegalOpaqueVariant {
                variant: other.variant_name(),
                version: ctx.version,
            }
            .into()),
        };
    }

    if !Opaque::tag_allowed(role, opaque.tag()) {
        return Err(CodecError::IllegalOpaqueTag {
            tag: opaque.tag(),
            role: role.as_str(),
        }
        .into());
    }
    w.write_u32(opaque.tag())?;
    match opaque {
        Opaque::NoOp => {}
        Opaque::Blob(bytes) => encode_bytes(Some(bytes), w)?,
        Opaque::BufferObjectReference(offset) => w.write_u32(*offset)?,
        Opaque::ClientSideBufferReference { name, offset } => {
            w.write_u32(*name)?;
            w.write_u32(*offset)?;
        }
    }
    Ok(())
}

/// Decode one value of declared type `ty`
pub fn decode(
    ty: &ArgType,
    ctx: &CodecContext,
    r: &mut ByteReader<'_>,
) -> std::result::Result<Value, CodecError> {
    Ok(match ty {
        ArgType::Void => Value::Void,
        ArgType::Scalar(st) => {
            let bytes = r.take_padded(st.width())?;
            Value::Scalar(Scalar::from_le_bytes(*st, bytes).ok_or_else(|| mismatch(ty))?)
        }
        ArgType::Enum(_) => Value::Enum(r.read_u32()?),
        ArgType::Handle { .. } => Value::Handle(r.read_u32()?),
        ArgType::Scoped(_) => Value::Scoped(r.read_i32()?),
        ArgType::HandleArray(_) => match r.read_u32()? {
            ABSENT => Value::HandleArray(None),
            count => {
                check_count(count as usize, 4, r)?;
                let ids = (0..count)
                    .map(|_| r.read_u32())
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Value::HandleArray(Some(ids))
            }
        },
        ArgType::String => Value::String(decode_string(r)?),
        ArgType::StringArray => match r.read_u32()? {
            ABSENT => Value::StringArray(None),
            count => {
                check_count(count as usize, 4, r)?;
                let strings = (0..count)
                    .map(|_| decode_string(r))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Value::StringArray(Some(strings))
            }
        },
        ArgType::Array(st) => match decode_bytes(r)? {
            None => Value::Array(None),
            Some(bytes) => {
                Value::Array(Some(split_scalars(*st, bytes).ok_or_else(|| mismatch(ty))?))
            }
        },
        ArgType::Blob => Value::Blob(decode_bytes(r)?.map(<[u8]>::to_vec)),
        ArgType::Pointer(inner) => match r.read_u32()? {
            0 => Value::Pointer(None),
            _ => Value::Pointer(Some(Box::new(decode(inner, ctx, r)?))),
        },
        ArgType::Opaque(role) => Value::Opaque(decode_opaque(*role, ctx, r)?),
    })
}

/// Reject counts that cannot possibly fit before allocating for them
fn check_count(
    count: usize,
    min_size: usize,
    r: &ByteReader<'_>,
) -> std::result::Result<(), CodecError> {
    let wanted = count.saturating_mul(min_size);
    if wanted > r.remaining() {
        return Err(CodecError::Truncated {
            position: r.position(),
            wanted,
            end: r.position() + r.remaining(),
        });
    }
    Ok(())
}

fn decode_string(r: &mut ByteReader<'_>) -> std::result::Result<Option<String>, CodecError> {
    let len = r.read_u32()? as usize;
    if len == 0 {
        return Ok(None);
    }
    let bytes = r.take_padded(len)?;
    match bytes.split_last() {
        Some((0, text)) => String::from_utf8(text.to_vec())
            .map(Some)
            .map_err(|_| CodecError::BadString),
        _ => Err(CodecError::BadString),
    }
}

fn decode_bytes<'a>(r: &mut ByteReader<'a>) -> std::result::Result<Option<&'a [u8]>, CodecError> {
    match r.read_u32()? {
        ABSENT => Ok(None),
        len => r.take_padded(len as usize).map(Some),
    }
}

fn split_scalars(st: ScalarType, bytes: &[u8]) -> Option<Vec<Scalar>> {
    let width = st.width();
    if bytes.len() % width != 0 {
        return None;
    }
    bytes
        .chunks_exact(width)
        .map(|chunk| Scalar::from_le_bytes(st, chunk))
        .collect()
}

fn decode_opaque(
    role: OpaqueRole,
    ctx: &CodecContext,
    r: &mut ByteReader<'_>,
) -> std::result::Result<Opaque, CodecError> {
    if ctx.is_legacy() {
        let bytes = decode_bytes(r)?.unwrap_or_default();
        return Ok(Opaque::Blob(bytes.to_vec()));
    }

    let tag = r.read_u32()?;
    if !Opaque::tag_allowed(role, tag) {
        return Err(CodecError::IllegalOpaqueTag {
            tag,
            role: role.as_str(),
        });
    }
    Ok(match tag {
        Opaque::TAG_BUFFER_OBJECT => Opaque::BufferObjectReference(r.read_u32()?),
        Opaque::TAG_BLOB => Opaque::Blob(decode_bytes(r)?.unwrap_or_default().to_vec()),
        Opaque::TAG_CLIENT_SIDE => Opaque::ClientSideBufferReference {
            name: r.read_u32()?,
            offset: r.read_u32()?,
        },
        _ => Opaque::NoOp,
    })
}

/// Encode a value into a fresh buffer
pub fn encode_to_vec(ty: &ArgType, value: &Value, ctx: &CodecContext) -> Result<Vec<u8>> {
    let mut w = ByteWriter::new(Vec::new());
    encode(ty, value, ctx, &mut w)?;
    Ok(w.into_inner())
}
