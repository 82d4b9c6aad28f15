//! Schema registry: the table of traced entry points
//!
//! Both the encoder and decoder are driven entirely by these signatures; nothing
//! in the codec knows about individual GL functions.

mod registry;
mod types;

pub use registry::{
    SchemaRegistry, FIRST_USER_ID, MAPPED_BUFFER_WRITE, MAPPED_BUFFER_WRITE_ID, MARKER, MARKER_ID,
};
pub use types::{ArgType, Direction, HandleUse, LenExpr, OpaqueRole, Param, ScalarType, Signature};
