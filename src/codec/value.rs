use crate::schema::{ArgType, OpaqueRole, ScalarType};
use std::fmt;

/// A literal of one of the fixed-width scalar types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
}

impl Scalar {
    pub fn ty(&self) -> ScalarType {
        match self {
            Scalar::I8(_) => ScalarType::I8,
            Scalar::U8(_) => ScalarType::U8,
            Scalar::I16(_) => ScalarType::I16,
            Scalar::U16(_) => ScalarType::U16,
            Scalar::I32(_) => ScalarType::I32,
            Scalar::U32(_) => ScalarType::U32,
            Scalar::I64(_) => ScalarType::I64,
            Scalar::U64(_) => ScalarType::U64,
            Scalar::F32(_) => ScalarType::F32,
            Scalar::F64(_) => ScalarType::F64,
            Scalar::Bool(_) => ScalarType::Bool,
        }
    }

    pub fn zero(ty: ScalarType) -> Self {
        match ty {
            ScalarType::I8 => Scalar::I8(0),
            ScalarType::U8 => Scalar::U8(0),
            ScalarType::I16 => Scalar::I16(0),
            ScalarType::U16 => Scalar::U16(0),
            ScalarType::I32 => Scalar::I32(0),
            ScalarType::U32 => Scalar::U32(0),
            ScalarType::I64 => Scalar::I64(0),
            ScalarType::U64 => Scalar::U64(0),
            ScalarType::F32 => Scalar::F32(0.0),
            ScalarType::F64 => Scalar::F64(0.0),
            ScalarType::Bool => Scalar::Bool(false),
        }
    }

    /// Integer view, truncating floats
    pub fn as_i64(&self) -> i64 {
        match *self {
            Scalar::I8(v) => v as i64,
            Scalar::U8(v) => v as i64,
            Scalar::I16(v) => v as i64,
            Scalar::U16(v) => v as i64,
            Scalar::I32(v) => v as i64,
            Scalar::U32(v) => v as i64,
            Scalar::I64(v) => v,
            Scalar::U64(v) => v as i64,
            Scalar::F32(v) => v as i64,
            Scalar::F64(v) => v as i64,
            Scalar::Bool(v) => v as i64,
        }
    }

    /// Little-endian bytes at natural width
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match *self {
            Scalar::I8(v) => v.to_le_bytes().to_vec(),
            Scalar::U8(v) => vec![v],
            Scalar::I16(v) => v.to_le_bytes().to_vec(),
            Scalar::U16(v) => v.to_le_bytes().to_vec(),
            Scalar::I32(v) => v.to_le_bytes().to_vec(),
            Scalar::U32(v) => v.to_le_bytes().to_vec(),
            Scalar::I64(v) => v.to_le_bytes().to_vec(),
            Scalar::U64(v) => v.to_le_bytes().to_vec(),
            Scalar::F32(v) => v.to_le_bytes().to_vec(),
            Scalar::F64(v) => v.to_le_bytes().to_vec(),
            Scalar::Bool(v) => vec![v as u8],
        }
    }

    /// Inverse of [`Scalar::to_le_bytes`]; `bytes` must be exactly `ty.width()` long
    pub fn from_le_bytes(ty: ScalarType, bytes: &[u8]) -> Option<Self> {
        use byteorder::{ByteOrder, LittleEndian as LE};
        if bytes.len() != ty.width() {
            return None;
        }
        Some(match ty {
            ScalarType::I8 => Scalar::I8(bytes[0] as i8),
            ScalarType::U8 => Scalar::U8(bytes[0]),
            ScalarType::I16 => Scalar::I16(LE::read_i16(bytes)),
            ScalarType::U16 => Scalar::U16(LE::read_u16(bytes)),
            ScalarType::I32 => Scalar::I32(LE::read_i32(bytes)),
            ScalarType::U32 => Scalar::U32(LE::read_u32(bytes)),
            ScalarType::I64 => Scalar::I64(LE::read_i64(bytes)),
            ScalarType::U64 => Scalar::U64(LE::read_u64(bytes)),
            ScalarType::F32 => Scalar::F32(LE::read_f32(bytes)),
            ScalarType::F64 => Scalar::F64(LE::read_f64(bytes)),
            ScalarType::Bool => Scalar::Bool(bytes[0] != 0),
        })
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::F32(v) => write!(f, "{}", v),
            Scalar::F64(v) => write!(f, "{}", v),
            Scalar::Bool(v) => write!(f, "{}", v),
            other => write!(f, "{}", other.as_i64()),
        }
    }
}

/// Client-memory argument whose form depends on binding state at capture time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opaque {
    /// Deliberately not captured
    NoOp,
    /// Captured bytes
    Blob(Vec<u8>),
    /// Byte offset into the buffer bound to the relevant target
    BufferObjectReference(u32),
    /// Offset into an emulated client-side buffer
    ClientSideBufferReference { name: u32, offset: u32 },
}

impl Opaque {
    pub const TAG_BUFFER_OBJECT: u32 = 0;
    pub const TAG_BLOB: u32 = 1;
    pub const TAG_CLIENT_SIDE: u32 = 2;
    pub const TAG_NOOP: u32 = 3;

    pub fn tag(&self) -> u32 {
        match self {
            Opaque::BufferObjectReference(_) => Self::TAG_BUFFER_OBJECT,
            Opaque::Blob(_) => Self::TAG_BLOB,
            Opaque::ClientSideBufferReference { .. } => Self::TAG_CLIENT_SIDE,
            Opaque::NoOp => Self::TAG_NOOP,
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            Opaque::NoOp => "NoOp",
            Opaque::Blob(_) => "Blob",
            Opaque::BufferObjectReference(_) => "BufferObjectReference",
            Opaque::ClientSideBufferReference { .. } => "ClientSideBufferReference",
        }
    }

    /// Whether `tag` may appear for an argument with this role
    pub fn tag_allowed(role: OpaqueRole, tag: u32) -> bool {
        match role {
            OpaqueRole::Texture => matches!(tag, Self::TAG_BLOB | Self::TAG_BUFFER_OBJECT),
            OpaqueRole::Readback => matches!(tag, Self::TAG_NOOP | Self::TAG_BUFFER_OBJECT),
            OpaqueRole::Generic => matches!(
                tag,
                Self::TAG_BUFFER_OBJECT | Self::TAG_CLIENT_SIDE | Self::TAG_BLOB
            ),
        }
    }
}

/// A decoded argument or return value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Scalar(Scalar),
    Enum(u32),
    Handle(u32),
    HandleArray(Option<Vec<u32>>),
    /// Uniform location or uniform block index
    Scoped(i32),
    String(Option<String>),
    StringArray(Option<Vec<Option<String>>>),
    Array(Option<Vec<Scalar>>),
    Blob(Option<Vec<u8>>),
    Pointer(Option<Box<Value>>),
    Opaque(Opaque),
}

impl Value {
    /// Value a stub returns for an entry point it cannot run
    pub fn zero(ty: &ArgType) -> Value {
        match ty {
            ArgType::Void => Value::Void,
            ArgType::Scalar(s) => Value::Scalar(Scalar::zero(*s)),
            ArgType::Enum(_) => Value::Enum(0),
            ArgType::Handle { .. } => Value::Handle(0),
            ArgType::HandleArray(_) => Value::HandleArray(None),
            ArgType::Scoped(_) => Value::Scoped(-1),
            ArgType::String => Value::String(None),
            ArgType::StringArray => Value::StringArray(None),
            ArgType::Array(_) => Value::Array(None),
            ArgType::Blob => Value::Blob(None),
            ArgType::Pointer(_) => Value::Pointer(None),
            ArgType::Opaque(_) => Value::Opaque(Opaque::NoOp),
        }
    }

    /// Integer view of scalar-like values
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Scalar(s) => Some(s.as_i64()),
            Value::Enum(v) | Value::Handle(v) => Some(*v as i64),
            Value::Scoped(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_i64().map(|v| v as u32)
    }

    /// Compact JSON rendering for dumps; blobs are summarized by length
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Value::Void => serde_json::Value::Null,
            Value::Scalar(Scalar::F32(v)) => json!(v),
            Value::Scalar(Scalar::F64(v)) => json!(v),
            Value::Scalar(Scalar::Bool(v)) => json!(v),
            Value::Scalar(s) => json!(s.as_i64()),
            Value::Enum(v) => json!(format!("0x{:04X}", v)),
            Value::Handle(v) => json!(v),
            Value::Scoped(v) => json!(v),
            Value::HandleArray(ids) => json!(ids),
            Value::String(s) => json!(s),
            Value::StringArray(v) => json!(v),
            Value::Array(None) => serde_json::Value::Null,
            Value::Array(Some(items)) => serde_json::Value::Array(
                items.iter().map(|s| Value::Scalar(*s).to_json()).collect(),
            ),
            Value::Blob(None) => serde_json::Value::Null,
            Value::Blob(Some(bytes)) => json!({ "blob": bytes.len() }),
            Value::Pointer(None) => serde_json::Value::Null,
            Value::Pointer(Some(inner)) => json!({ "ptr": inner.to_json() }),
            Value::Opaque(Opaque::NoOp) => json!({ "opaque": "NoOp" }),
            Value::Opaque(Opaque::Blob(bytes)) => json!({ "opaque": "Blob", "len": bytes.len() }),
            Value::Opaque(Opaque::BufferObjectReference(offset)) => {
                json!({ "opaque": "BufferObjectReference", "offset": offset })
            }
            Value::Opaque(Opaque::ClientSideBufferReference { name, offset }) => {
                json!({ "opaque": "ClientSideBufferReference", "name": name, "offset": offset })
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("void"),
            Value::Scalar(s) => write!(f, "{}", s),
            Value::Enum(v) => write!(f, "0x{:04X}", v),
            Value::Handle(v) => write!(f, "{}", v),
            Value::Scoped(v) => write!(f, "{}", v),
            Value::HandleArray(None)
            | Value::String(None)
            | Value::StringArray(None)
            | Value::Array(None)
            | Value::Blob(None)
            | Value::Pointer(None) => f.write_str("NULL"),
            Value::HandleArray(Some(ids)) => write!(f, "{:?}", ids),
            Value::String(Some(s)) => write!(f, "{:?}", s),
            Value::StringArray(Some(v)) => write!(f, "[{} strings]", v.len()),
            Value::Array(Some(items)) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Blob(Some(bytes)) => write!(f, "<blob {} bytes>", bytes.len()),
            Value::Pointer(Some(inner)) => write!(f, "&{}", inner),
            Value::Opaque(Opaque::NoOp) => f.write_str("<noop>"),
            Value::Opaque(Opaque::Blob(bytes)) => write!(f, "<blob {} bytes>", bytes.len()),
            Value::Opaque(Opaque::BufferObjectReference(offset)) => {
                write!(f, "<buffer+{}>", offset)
            }
            Value::Opaque(Opaque::ClientSideBufferReference { name, offset }) => {
                write!(f, "<csb {}+{}>", name, offset)
            }
        }
    }
}
