//! Tools that produce a modified trace: `trim`, `remap-tid`, `upgrade` and
//! `set-header-size`
//!
//! Every tool appends exactly one conversion entry to the output's metadata.
//! `trim` and `remap-tid` copy record bytes verbatim (remap-tid patches only the
//! thread byte) and keep the input's format version and signature book.

use super::provenance;
use crate::codec::{CallRecord, Opaque, Value};
use crate::container::{
    grow_json_region, rewrite_metadata, Metadata, TraceReader, TraceWriter, WriterOptions,
    CURRENT_VERSION, DEFAULT_JSON_RESERVE,
};
use crate::error::TraceError;
use crate::schema::{ArgType, OpaqueRole, SchemaRegistry, Signature};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Byte offset of the thread id inside a record header
const TID_OFFSET: usize = 2;

/// What a rewriting tool did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteSummary {
    pub records_read: u64,
    pub records_written: u64,
    /// Records that could not be decoded and were left out
    pub dropped: u64,
    pub frames_written: u64,
}

fn check_distinct(input: &Path, output: &Path) -> Result<()> {
    let same = input == output
        || match (input.canonicalize(), output.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
    if same {
        bail!("input and output must be different files: {}", input.display());
    }
    Ok(())
}

/// JSON region for a new output: the default size, or the input's if larger
fn output_reserve(reader: &TraceReader) -> u32 {
    let capacity = u32::try_from(reader.header().json_capacity()).unwrap_or(u32::MAX);
    capacity.max(DEFAULT_JSON_RESERVE)
}

/// Writer layout that keeps the input's version and id numbering
fn same_layout(reader: &TraceReader) -> WriterOptions {
    WriterOptions {
        version: reader.version(),
        json_reserve: output_reserve(reader),
        legacy_threshold: reader.context().legacy_threshold,
        sigbook: Some(reader.sigbook().clone()),
    }
}

fn skip_or_fail(error: TraceError, summary: &mut RewriteSummary) -> Result<()> {
    if error.is_recoverable() {
        warn!(error = %error, "dropping undecodable record");
        summary.dropped += 1;
        Ok(())
    } else {
        Err(error).context("trace is unreadable past this point")
    }
}

fn open_input(path: &Path, registry: Arc<SchemaRegistry>) -> Result<TraceReader> {
    TraceReader::open(path, registry).with_context(|| format!("Failed to open {}", path.display()))
}

fn open_output(
    path: &Path,
    reader: &TraceReader,
    metadata: &Metadata,
    options: WriterOptions,
) -> Result<TraceWriter> {
    TraceWriter::create_with(path, reader.registry().clone(), metadata, options)
        .with_context(|| format!("Failed to create {}", path.display()))
}

/// Keep frames `start..=end`
///
/// Frame `n` is every call after the `n`th frame-boundary call up to and including
/// the next one. Calls after the last boundary form a final partial frame.
pub fn trim(
    input: &Path,
    output: &Path,
    start: u64,
    end: u64,
    registry: Arc<SchemaRegistry>,
) -> Result<RewriteSummary> {
    if start > end {
        bail!("frame range {}..={} is empty", start, end);
    }
    check_distinct(input, output)?;
    let conversion = provenance::conversion("trim", input)?;
    let reader = open_input(input, registry)?;
    let mut metadata = reader.metadata().clone();
    let mut writer = open_output(output, &reader, &metadata, same_layout(&reader))?;

    let mut summary = RewriteSummary::default();
    let mut frame = 0u64;
    let mut last_kept_frame = None;
    for raw in reader.raw_records() {
        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                skip_or_fail(e, &mut summary)?;
                continue;
            }
        };
        summary.records_read += 1;
        if frame > end {
            break;
        }
        if frame >= start {
            writer.append_raw(raw.bytes)?;
            summary.records_written += 1;
            if last_kept_frame != Some(frame) {
                summary.frames_written += 1;
                last_kept_frame = Some(frame);
            }
        }
        if raw.signature.frame_boundary {
            frame += 1;
        }
    }
    if summary.records_written == 0 {
        warn!(start, end, frames = frame, "no call falls inside the frame range");
    }

    metadata.frame_count = summary.frames_written;
    metadata.call_count = summary.records_written;
    metadata.record_conversion(conversion);
    writer.finish(&metadata)?;
    info!(
        start,
        end,
        calls = summary.records_written,
        frames = summary.frames_written,
        "trimmed trace"
    );
    Ok(summary)
}

/// Move every call of thread slot `from` to slot `to`
pub fn remap_tid(
    input: &Path,
    output: &Path,
    from: u8,
    to: u8,
    registry: Arc<SchemaRegistry>,
) -> Result<RewriteSummary> {
    check_distinct(input, output)?;
    let conversion = provenance::conversion("remap-tid", input)?;
    let reader = open_input(input, registry)?;

    let mut metadata = reader.metadata().clone();
    if metadata.default_tid == from as u32 {
        metadata.default_tid = to as u32;
    }
    let target_exists = metadata.threads.iter().any(|t| t.id == to as u32);
    if target_exists {
        metadata.threads.retain(|t| t.id != from as u32);
    } else if let Some(thread) = metadata.thread_mut(from as u32) {
        thread.id = to as u32;
    }
    metadata.record_conversion(conversion);

    let mut writer = open_output(output, &reader, &metadata, same_layout(&reader))?;
    let mut summary = RewriteSummary::default();
    let mut remapped = 0u64;
    for raw in reader.raw_records() {
        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                skip_or_fail(e, &mut summary)?;
                continue;
            }
        };
        summary.records_read += 1;
        if raw.record.thread_id == from {
            let mut bytes = raw.bytes.to_vec();
            bytes[TID_OFFSET] = to;
            writer.append_raw(&bytes)?;
            remapped += 1;
        } else {
            writer.append_raw(raw.bytes)?;
        }
        summary.records_written += 1;
        if raw.signature.frame_boundary {
            summary.frames_written += 1;
        }
    }
    writer.finish(&metadata)?;
    info!(from, to, remapped, "remapped thread id");
    Ok(summary)
}

/// Drop read-back contents a legacy trace stored as blobs
///
/// Tagged traces only allow `NoOp` or a buffer offset for read-back targets;
/// the pixels are produced again at replay time.
fn clear_readback_blobs(sig: &Signature, record: &mut CallRecord) -> usize {
    let mut cleared = 0;
    for (param, value) in sig.params.iter().zip(record.args.iter_mut()) {
        let readback = param.ty == ArgType::Opaque(OpaqueRole::Readback);
        if readback && matches!(value, Value::Opaque(Opaque::Blob(_))) {
            *value = Value::Opaque(Opaque::NoOp);
            cleared += 1;
        }
    }
    cleared
}

/// Re-encode at the current format version
///
/// Legacy untagged opaque blobs are written back as tagged blobs, except for
/// read-back targets, which become `NoOp`. The signature book of the output is
/// the registry's own.
pub fn upgrade(
    input: &Path,
    output: &Path,
    registry: Arc<SchemaRegistry>,
) -> Result<RewriteSummary> {
    check_distinct(input, output)?;
    let reader = open_input(input, registry)?;
    let from = reader.version();
    let conversion = provenance::version_conversion("upgrade", input, from, CURRENT_VERSION)?;

    let mut metadata = reader.metadata().clone();
    metadata.record_conversion(conversion);
    let options = WriterOptions {
        version: CURRENT_VERSION,
        json_reserve: output_reserve(&reader),
        legacy_threshold: reader.context().legacy_threshold,
        sigbook: None,
    };
    let mut writer = open_output(output, &reader, &metadata, options)?;

    let mut summary = RewriteSummary::default();
    for record in reader.records() {
        let mut record: CallRecord = match record {
            Ok(record) => record,
            Err(e) => {
                skip_or_fail(e, &mut summary)?;
                continue;
            }
        };
        summary.records_read += 1;
        let sig = reader.registry().by_id(record.function_id);
        if let Some(sig) = sig {
            let cleared = clear_readback_blobs(sig, &mut record);
            if cleared > 0 {
                debug!(seq = record.seq, function = %sig.name, "legacy read-back contents dropped");
            }
        }
        writer
            .append_call(&record)
            .with_context(|| format!("Failed to re-encode record #{}", record.seq))?;
        summary.records_written += 1;
        if sig.is_some_and(|s| s.frame_boundary) {
            summary.frames_written += 1;
        }
    }
    if from == CURRENT_VERSION {
        debug!(version = from, "trace was already current; records re-encoded unchanged");
    }
    writer.finish(&metadata)?;
    info!(from, to = CURRENT_VERSION, records = summary.records_written, "upgraded trace");
    Ok(summary)
}

/// Grow the JSON region of `trace` to `size` bytes in place
///
/// Returns `false`, without touching the file, when the region already has that
/// size.
pub fn set_header_size(trace: &Path, size: u64) -> Result<bool> {
    let conversion = provenance::conversion("set-header-size", trace)?;
    let grown = grow_json_region(trace, size)
        .with_context(|| format!("Failed to resize {}", trace.display()))?;
    if grown {
        rewrite_metadata(trace, conversion, |_| {})
            .with_context(|| format!("Failed to record the conversion in {}", trace.display()))?;
    }
    Ok(grown)
}
