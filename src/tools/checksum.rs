//! `update-md5` and `verify`

use super::provenance::file_md5;
use crate::container::TraceReader;
use crate::error::TraceError;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const MD5_KEY: &str = "md5";

/// `<dir>/<stem>.meta` next to the trace
pub fn sidecar_path(trace: &Path) -> PathBuf {
    trace.with_extension("meta")
}

fn read_sidecar(path: &Path) -> Result<Map<String, Value>> {
    if !path.exists() {
        return Ok(Map::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed = serde_json::from_str(&content)
        .with_context(|| format!("Invalid sidecar JSON: {}", path.display()))?;
    match parsed {
        Value::Object(map) => Ok(map),
        _ => bail!("sidecar {} is not a JSON object", path.display()),
    }
}

/// Store the trace's MD5 in its sidecar, keeping any other keys
pub fn update_md5(trace: &Path) -> Result<(PathBuf, String)> {
    let digest = file_md5(trace)?;
    let path = sidecar_path(trace);
    let mut sidecar = read_sidecar(&path)?;
    sidecar.insert(MD5_KEY.to_string(), Value::String(digest.clone()));
    let text = serde_json::to_string_pretty(&Value::Object(sidecar))?;
    std::fs::write(&path, text + "\n")
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(sidecar = %path.display(), md5 = %digest, "updated checksum");
    Ok((path, digest))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChecksumStatus {
    NoSidecar,
    Match,
    Mismatch { recorded: String, actual: String },
}

/// Findings of `verify`; only `problems` make the trace unusable
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub records: u64,
    pub frames: u64,
    pub errors: BTreeMap<String, u64>,
    /// Records whose sequence number did not increase on their thread
    pub ordering_violations: u64,
    pub checksum: ChecksumStatus,
    pub problems: Vec<String>,
    pub warnings: Vec<String>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Decode every record and cross-check counts, ordering and the sidecar checksum
///
/// A checksum mismatch is only a warning. Undecodable records and count mismatches
/// are problems.
pub fn verify(reader: &TraceReader) -> Result<VerifyReport> {
    let mut report = VerifyReport {
        records: 0,
        frames: 0,
        errors: BTreeMap::new(),
        ordering_violations: 0,
        checksum: ChecksumStatus::NoSidecar,
        problems: Vec::new(),
        warnings: Vec::new(),
    };
    let mut last_seq: BTreeMap<u8, u64> = BTreeMap::new();

    for raw in reader.raw_records() {
        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                *report.errors.entry(e.class().to_string()).or_insert(0) += 1;
                report.problems.push(e.to_string());
                continue;
            }
        };
        let record = &raw.record;
        if let Some(&previous) = last_seq.get(&record.thread_id) {
            if record.seq <= previous {
                report.ordering_violations += 1;
            }
        }
        last_seq.insert(record.thread_id, record.seq);
        report.records += 1;
        if raw.signature.frame_boundary {
            report.frames += 1;
        }
    }

    if report.ordering_violations > 0 {
        report
            .problems
            .push(format!("{} records out of order on their thread", report.ordering_violations));
    }
    let metadata = reader.metadata();
    if metadata.call_count != report.records {
        report.problems.push(format!(
            "callCnt is {} but {} records decode",
            metadata.call_count, report.records
        ));
    }
    if metadata.frame_count != report.frames {
        report.problems.push(format!(
            "frameCnt is {} but {} frame boundaries were found",
            metadata.frame_count, report.frames
        ));
    }

    let sidecar = read_sidecar(&sidecar_path(reader.path()))?;
    if let Some(recorded) = sidecar.get(MD5_KEY).and_then(Value::as_str) {
        let actual = file_md5(reader.path())?;
        report.checksum = if recorded.eq_ignore_ascii_case(&actual) {
            ChecksumStatus::Match
        } else {
            let mismatch = TraceError::ChecksumMismatch {
                file: reader.path().display().to_string(),
                recorded: recorded.to_string(),
                actual: actual.clone(),
            };
            warn!(error = %mismatch, "sidecar checksum is stale");
            report.warnings.push(mismatch.to_string());
            ChecksumStatus::Mismatch {
                recorded: recorded.to_string(),
                actual,
            }
        };
    }
    Ok(report)
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "records: {}  frames: {}", self.records, self.frames)?;
        let checksum = match &self.checksum {
            ChecksumStatus::NoSidecar => "no sidecar",
            ChecksumStatus::Match => "matches sidecar",
            ChecksumStatus::Mismatch { .. } => "MISMATCH",
        };
        writeln!(f, "md5: {}", checksum)?;
        for warning in &self.warnings {
            writeln!(f, "warning: {}", warning)?;
        }
        for problem in &self.problems {
            writeln!(f, "problem: {}", problem)?;
        }
        write!(f, "{}", if self.is_ok() { "OK" } else { "FAILED" })
    }
}
