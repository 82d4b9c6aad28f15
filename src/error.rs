//! Error taxonomy for trace reading, writing and replay
//!
//! Container-level structural problems (`Format`, `Capacity`) are always surfaced to the
//! caller. Record-level problems (`TruncatedRecord`, `UnknownHandle`, `UnsupportedFunction`)
//! are recoverable: the replay engine logs them and moves on to the next record.

use crate::handles::ObjectKind;
use thiserror::Error;

/// Why a file was rejected as a trace
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("not a trace file (magic 0x{found:08X}, expected 0x{expected:08X})")]
    BadMagic { found: u32, expected: u32 },

    #[error("trace version {found} is older than the minimum {minimum}; upgrade required")]
    UpgradeRequired { found: u32, minimum: u32 },

    #[error("trace version {found} is newer than this build supports ({current})")]
    UnsupportedVersion { found: u32, current: u32 },

    #[error("malformed header: {0}")]
    Header(String),

    #[error("malformed signature book: {0}")]
    SigBook(String),

    #[error("corrupt record at offset {offset}: {reason}")]
    Record { offset: u64, reason: String },
}

/// Value-level codec failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("read of {wanted} bytes at {position} runs past the record end ({end})")]
    Truncated { position: usize, wanted: usize, end: usize },

    #[error("opaque tag {tag} is not valid for a {role} argument")]
    IllegalOpaqueTag { tag: u32, role: &'static str },

    #[error("opaque {variant} cannot be stored in a version {version} trace")]
    IllegalOpaqueVariant { variant: &'static str, version: u32 },

    #[error("value does not match declared type {expected}")]
    TypeMismatch { expected: String },

    #[error("{function} takes {expected} arguments, got {found}")]
    ArgCount {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("string is not NUL-terminated UTF-8")]
    BadString,

    #[error("length {0} exceeds the wire limit")]
    TooLong(usize),
}

/// Schema loading and validation failures
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("failed to parse schema: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("function id {id} is reserved for internal pseudo-ops")]
    ReservedId { id: u16 },

    #[error("duplicate function id {id} ('{first}' and '{second}')")]
    DuplicateId { id: u16, first: String, second: String },

    #[error("duplicate function name '{0}'")]
    DuplicateName(String),

    #[error("'{function}': bad type '{ty}': {reason}")]
    BadType { function: String, ty: String, reason: String },

    #[error("'{function}': bad length expression '{expr}'")]
    BadLength { function: String, expr: String },

    #[error("synonym '{0}' forms a cycle")]
    SynonymCycle(String),

    #[error("synonym '{alias}' points at unknown function '{canonical}'")]
    UnknownCanonical { alias: String, canonical: String },
}

/// Top-level error for trace operations
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("truncated record #{seq} ({function}): {source}")]
    TruncatedRecord {
        seq: u64,
        function: String,
        #[source]
        source: CodecError,
    },

    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: ObjectKind, id: u32 },

    #[error("unknown client-side buffer {name} on thread {thread}")]
    UnknownClientSideBuffer { thread: u8, name: u32 },

    #[error("unsupported function '{0}'")]
    UnsupportedFunction(String),

    #[error("capacity error: {0}")]
    Capacity(String),

    #[error("checksum mismatch for {file}: recorded {recorded}, actual {actual}")]
    ChecksumMismatch {
        file: String,
        recorded: String,
        actual: String,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("metadata JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TraceError {
    /// Short class name used for per-class error counters
    pub fn class(&self) -> &'static str {
        match self {
            TraceError::Format(_) => "format",
            TraceError::TruncatedRecord { .. } => "truncated_record",
            TraceError::UnknownHandle { .. } | TraceError::UnknownClientSideBuffer { .. } => {
                "unknown_handle"
            }
            TraceError::UnsupportedFunction(_) => "unsupported_function",
            TraceError::Capacity(_) => "capacity",
            TraceError::ChecksumMismatch { .. } => "checksum_mismatch",
            TraceError::Codec(_) => "codec",
            TraceError::Schema(_) => "schema",
            TraceError::Json(_) => "json",
            TraceError::Io(_) => "io",
        }
    }

    /// Whether replay may continue with the next record
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TraceError::TruncatedRecord { .. }
                | TraceError::UnknownHandle { .. }
                | TraceError::UnknownClientSideBuffer { .. }
                | TraceError::UnsupportedFunction(_)
                | TraceError::ChecksumMismatch { .. }
                | TraceError::Codec(_)
        )
    }
}

/// Result type for trace operations
pub type Result<T> = std::result::Result<T, TraceError>;
