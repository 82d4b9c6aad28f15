//! Trace container: header, JSON metadata, signature book and call records
//!
//! ```text
//! [header 32B][JSON ... reserved region][sigbook][record][record]...
//! ```

mod header;
mod metadata;
mod patch;
mod reader;
mod sigbook;
mod writer;

pub use header::{
    read_version, Header, CURRENT_VERSION, DEFAULT_JSON_RESERVE, HEADER_SIZE, MAGIC,
    MIN_SUPPORTED_VERSION, USER_VERSION_OFFSET,
};
pub use metadata::{Conversion, ConversionInput, Metadata, ThreadInfo, VersionChange};
pub use patch::grow_json_region;
pub use reader::{RawRecord, RawRecords, Records, TraceReader};
pub use sigbook::SigBook;
pub use writer::{rewrite_metadata, TraceWriter, WriterOptions};
