//! Read-only views of a trace: `info`, `version` and `dump`

use crate::cli::OutputFormat;
use crate::codec::CallRecord;
use crate::container::{read_version, ThreadInfo, TraceReader, USER_VERSION_OFFSET};
use crate::schema::Signature;
use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Summary printed by `info`
#[derive(Debug, Clone, Serialize)]
pub struct TraceInfo {
    pub path: String,
    pub version: u32,
    pub user_version: u32,
    pub json_length: u32,
    pub json_capacity: i64,
    pub data_bytes: usize,
    pub default_tid: u32,
    pub threads: Vec<ThreadInfo>,
    pub frame_count: u64,
    pub call_count: u64,
    pub conversions: usize,
    pub records: u64,
    pub undecodable: u64,
    pub calls_per_function: BTreeMap<String, u64>,
}

pub fn info(reader: &TraceReader) -> TraceInfo {
    let header = reader.header();
    let metadata = reader.metadata();
    let mut calls_per_function = BTreeMap::new();
    let mut records = 0;
    let mut undecodable = 0;
    for raw in reader.raw_records() {
        match raw {
            Ok(raw) => {
                records += 1;
                *calls_per_function.entry(raw.signature.name.clone()).or_insert(0) += 1;
            }
            Err(e) => {
                debug!(error = %e, "undecodable record");
                undecodable += 1;
            }
        }
    }
    TraceInfo {
        path: reader.path().display().to_string(),
        version: header.version,
        user_version: header.user_version(),
        json_length: header.json_length,
        json_capacity: header.json_capacity(),
        data_bytes: reader.data().len(),
        default_tid: metadata.default_tid,
        threads: metadata.threads.clone(),
        frame_count: metadata.frame_count,
        call_count: metadata.call_count,
        conversions: metadata.conversions().len(),
        records,
        undecodable,
        calls_per_function,
    }
}

impl fmt::Display for TraceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.path)?;
        writeln!(f, "  format version : {} (user {})", self.version, self.user_version)?;
        writeln!(f, "  metadata       : {} of {} bytes", self.json_length, self.json_capacity)?;
        writeln!(f, "  call data      : {} bytes", self.data_bytes)?;
        writeln!(f, "  frames / calls : {} / {}", self.frame_count, self.call_count)?;
        writeln!(f, "  default thread : {}", self.default_tid)?;
        for t in &self.threads {
            writeln!(f, "    thread {:>3}   : {}x{}", t.id, t.win_w, t.win_h)?;
        }
        writeln!(f, "  conversions    : {}", self.conversions)?;
        writeln!(f, "  records        : {} ({} undecodable)", self.records, self.undecodable)?;
        if !self.calls_per_function.is_empty() {
            let mut by_count: Vec<_> = self.calls_per_function.iter().collect();
            by_count.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            writeln!(f)?;
            writeln!(f, "{:>10}  function", "calls")?;
            writeln!(f, "---------- ----------------------------")?;
            for (name, count) in by_count {
                writeln!(f, "{:>10}  {}", count, name)?;
            }
        }
        Ok(())
    }
}

/// User-facing version of a trace without opening it
pub fn version<P: AsRef<Path>>(path: P) -> Result<u32> {
    let path = path.as_ref();
    let version = read_version(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(version.saturating_sub(USER_VERSION_OFFSET))
}

/// Record selection for `dump`
#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    pub filter: Option<Regex>,
    pub thread: Option<u8>,
    pub limit: Option<usize>,
}

impl DumpOptions {
    fn selects(&self, record: &CallRecord, sig: &Signature) -> bool {
        self.thread.map_or(true, |t| t == record.thread_id)
            && self.filter.as_ref().map_or(true, |re| re.is_match(&sig.name))
    }
}

/// One call formatted as a single text line
pub fn format_call(record: &CallRecord, sig: &Signature) -> String {
    let args: Vec<String> = sig
        .params
        .iter()
        .zip(&record.args)
        .map(|(p, v)| format!("{}={}", p.name, v))
        .collect();
    let mut line = format!(
        "{:>8} [{}] {}({})",
        record.seq,
        record.thread_id,
        sig.name,
        args.join(", ")
    );
    if sig.has_return() {
        line.push_str(&format!(" = {}", record.ret));
    }
    if record.flags.err_no != 0 {
        line.push_str(&format!(" err={}", record.flags.err_no));
    }
    if record.flags.injected {
        line.push_str(" (injected)");
    }
    line
}

pub fn call_json(record: &CallRecord, sig: &Signature) -> serde_json::Value {
    let args: serde_json::Map<String, serde_json::Value> = sig
        .params
        .iter()
        .zip(&record.args)
        .map(|(p, v)| (p.name.clone(), v.to_json()))
        .collect();
    serde_json::json!({
        "seq": record.seq,
        "tid": record.thread_id,
        "function": sig.name,
        "args": args,
        "ret": record.ret.to_json(),
        "errNo": record.flags.err_no,
        "injected": record.flags.injected,
    })
}

/// Write selected calls, one per line; returns how many were written
///
/// Undecodable records are reported inline and do not count towards the limit.
pub fn dump<W: Write>(
    reader: &TraceReader,
    options: &DumpOptions,
    format: OutputFormat,
    mut out: W,
) -> Result<usize> {
    let mut written = 0;
    for raw in reader.raw_records() {
        if options.limit.is_some_and(|limit| written >= limit) {
            break;
        }
        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                match format {
                    OutputFormat::Text => writeln!(out, "   ERROR {}", e)?,
                    OutputFormat::Json => {
                        writeln!(out, "{}", serde_json::json!({ "error": e.to_string() }))?
                    }
                }
                continue;
            }
        };
        if !options.selects(&raw.record, raw.signature) {
            continue;
        }
        match format {
            OutputFormat::Text => writeln!(out, "{}", format_call(&raw.record, raw.signature))?,
            OutputFormat::Json => writeln!(out, "{}", call_json(&raw.record, raw.signature))?,
        }
        written += 1;
    }
    out.flush()?;
    Ok(written)
}
