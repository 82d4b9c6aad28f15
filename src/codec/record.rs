//! Call record framing
//!
//! ```text
//! u16 functionId | u8 threadId | u8 flags | [u32 toNext] | args... | ret
//! ```
//!
//! `toNext` is the total record length. Version 7 always writes it; version 6 only
//! for signatures whose encoding length varies, which is what makes resync after a
//! corrupt record possible.

use super::{decode, encode, ByteReader, ByteWriter, CodecContext, Value};
use crate::error::{CodecError, Result};
use crate::schema::Signature;
use thiserror::Error;

/// First version whose records always carry `toNext`
pub const ALWAYS_TO_NEXT_VERSION: u32 = 7;

const HEADER_LEN: usize = 4;
const ERR_NO_MASK: u8 = 0x0F;
const INJECTED_BIT: u8 = 0x10;
const SIDE_EFFECT_BIT: u8 = 0x20;

/// Per-record flag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordFlags {
    /// GL error raised by the call at capture time
    pub err_no: u8,
    /// Written by the tracer rather than the application
    pub injected: bool,
    pub side_effect: bool,
}

impl RecordFlags {
    pub fn to_byte(self) -> u8 {
        let mut byte = self.err_no & ERR_NO_MASK;
        if self.injected {
            byte |= INJECTED_BIT;
        }
        if self.side_effect {
            byte |= SIDE_EFFECT_BIT;
        }
        byte
    }

    pub fn from_byte(byte: u8) -> Self {
        Self {
            err_no: byte & ERR_NO_MASK,
            injected: byte & INJECTED_BIT != 0,
            side_effect: byte & SIDE_EFFECT_BIT != 0,
        }
    }
}

/// One decoded call
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    /// Global position in the stream; not stored on disk
    pub seq: u64,
    pub thread_id: u8,
    pub function_id: u16,
    pub flags: RecordFlags,
    pub args: Vec<Value>,
    pub ret: Value,
}

impl CallRecord {
    pub fn new(function_id: u16, thread_id: u8, args: Vec<Value>, ret: Value) -> Self {
        Self {
            seq: 0,
            thread_id,
            function_id,
            flags: RecordFlags::default(),
            args,
            ret,
        }
    }
}

/// Why a record could not be decoded, and where the next one starts if known
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}")]
pub struct RecordError {
    pub kind: RecordErrorKind,
    /// Length of the bad record, when its `toNext` field could be trusted
    pub resync: Option<usize>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordErrorKind {
    #[error("{function}: {source}")]
    Codec {
        function: String,
        #[source]
        source: CodecError,
    },

    #[error("function id {0} is not in the signature book")]
    UnknownFunction(u16),

    #[error("record length {len} is invalid ({available} bytes remain)")]
    BadLength { len: u32, available: usize },

    #[error("record header: {0}")]
    Header(CodecError),
}

/// Whether a record of this signature carries `toNext` in a trace of `version`
pub fn has_to_next(sig: &Signature, version: u32) -> bool {
    version >= ALWAYS_TO_NEXT_VERSION || !sig.is_fixed_length()
}

/// Serialize a record; arguments must match the signature
pub fn encode_record(sig: &Signature, record: &CallRecord, ctx: &CodecContext) -> Result<Vec<u8>> {
    if record.args.len() != sig.params.len() {
        return Err(CodecError::ArgCount {
            function: sig.name.clone(),
            expected: sig.params.len(),
            found: record.args.len(),
        }
        .into());
    }

    let mut w = ByteWriter::new(Vec::with_capacity(64));
    w.write_u16(sig.id)?;
    w.write_u8(record.thread_id)?;
    w.write_u8(record.flags.to_byte())?;
    let with_to_next = has_to_next(sig, ctx.version);
    if with_to_next {
        w.write_u32(0)?;
    }
    for (param, value) in sig.params.iter().zip(&record.args) {
        encode(&param.ty, value, ctx, &mut w)?;
    }
    if sig.has_return() {
        encode(&sig.ret, &record.ret, ctx, &mut w)?;
    }

    let mut bytes = w.into_inner();
    if with_to_next {
        let len = u32::try_from(bytes.len()).map_err(|_| CodecError::TooLong(bytes.len()))?;
        bytes[HEADER_LEN..HEADER_LEN + 4].copy_from_slice(&len.to_le_bytes());
    }
    Ok(bytes)
}

/// Peek the fixed header without decoding arguments
pub fn peek_header(buf: &[u8]) -> std::result::Result<(u16, u8, RecordFlags), RecordError> {
    let header_err = |e: CodecError| RecordError {
        kind: RecordErrorKind::Header(e),
        resync: None,
    };
    let mut r = ByteReader::new(buf);
    let id = r.read_u16().map_err(header_err)?;
    let tid = r.read_u8().map_err(header_err)?;
    let flags = RecordFlags::from_byte(r.read_u8().map_err(header_err)?);
    Ok((id, tid, flags))
}

/// Decode the record at the start of `buf`, returning it with its length
///
/// `lookup` maps the on-disk function id to a signature. `buf` extends to the end
/// of the data section; a record never reads past its own `toNext`.
pub fn decode_record<'s, F>(
    buf: &[u8],
    lookup: F,
    ctx: &CodecContext,
) -> std::result::Result<(CallRecord, usize), RecordError>
where
    F: Fn(u16) -> Option<&'s Signature>,
{
    let (function_id, thread_id, flags) = peek_header(buf)?;

    let read_to_next = |buf: &[u8]| -> std::result::Result<usize, RecordError> {
        let mut r = ByteReader::new(buf);
        r.take(HEADER_LEN).and_then(|_| r.read_u32()).map_err(|e| RecordError {
            kind: RecordErrorKind::Header(e),
            resync: None,
        })
        .and_then(|len| {
            let valid = len as usize >= HEADER_LEN + 4 && len as usize <= buf.len() && len % 4 == 0;
            if valid {
                Ok(len as usize)
            } else {
                Err(RecordError {
                    kind: RecordErrorKind::BadLength {
                        len,
                        available: buf.len(),
                    },
                    resync: None,
                })
            }
        })
    };

    let sig = match lookup(function_id) {
        Some(sig) => sig,
        None => {
            // Without a signature the length is only known from toNext.
            let resync = if ctx.version >= ALWAYS_TO_NEXT_VERSION {
                read_to_next(buf).ok()
            } else {
                None
            };
            return Err(RecordError {
                kind: RecordErrorKind::UnknownFunction(function_id),
                resync,
            });
        }
    };

    let (body, resync) = if has_to_next(sig, ctx.version) {
        let len = read_to_next(buf)?;
        (&buf[..len], Some(len))
    } else {
        (buf, None)
    };

    let codec_err = |source: CodecError| RecordError {
        kind: RecordErrorKind::Codec {
            function: sig.name.clone(),
            source,
        },
        resync,
    };

    let mut r = ByteReader::new(body);
    r.take(if resync.is_some() { HEADER_LEN + 4 } else { HEADER_LEN })
        .map_err(codec_err)?;
    let mut args = Vec::with_capacity(sig.params.len());
    for param in &sig.params {
        args.push(decode(&param.ty, ctx, &mut r).map_err(codec_err)?);
    }
    let ret = decode(&sig.ret, ctx, &mut r).map_err(codec_err)?;

    let len = resync.unwrap_or_else(|| r.position());
    Ok((
        CallRecord {
            seq: 0,
            thread_id,
            function_id,
            flags,
            args,
            ret,
        },
        len,
    ))
}
