//! `replay`: run a trace against the headless driver

use crate::container::TraceReader;
use crate::replay::{HeadlessDriver, ReplayConfig, ReplayEngine, ReplayReport, StopReason};
use crate::schema::SchemaRegistry;
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

/// Config from `config_path` (or defaults) with `frames` overriding `max_frames`
pub fn load_config(config_path: Option<&Path>, frames: Option<u64>) -> Result<ReplayConfig> {
    let mut config = match config_path {
        Some(path) => ReplayConfig::from_toml(path)?,
        None => ReplayConfig::default(),
    };
    if frames.is_some() {
        config.max_frames = frames;
    }
    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

pub fn replay_file(
    trace: &Path,
    registry: Arc<SchemaRegistry>,
    config: ReplayConfig,
) -> Result<ReplayReport> {
    let reader = TraceReader::open_with(trace, Arc::clone(&registry), config.legacy_threshold)
        .with_context(|| format!("Failed to open {}", trace.display()))?;
    let driver = HeadlessDriver::new(config.driver_id_base);
    let mut engine =
        ReplayEngine::new(registry, driver, config).context("Failed to set up replay")?;
    Ok(engine.replay(&reader))
}

/// Text form of a report
pub fn render_report(report: &ReplayReport) -> String {
    let mut out = String::new();
    let stop = match &report.stop_reason {
        StopReason::EndOfStream => "end of stream".to_string(),
        StopReason::FrameLimit => "frame limit".to_string(),
        StopReason::Cancelled => "cancelled".to_string(),
        StopReason::Fatal(reason) => format!("fatal: {}", reason),
    };
    let _ = writeln!(out, "stopped : {}", stop);
    let _ = writeln!(out, "calls   : {} ({} skipped)", report.calls, report.skipped);
    let _ = writeln!(out, "frames  : {}", report.frames);
    let _ = writeln!(out, "draws   : {}", report.draws);
    let _ = writeln!(out, "objects : {}", report.objects_created);
    if report.shader_cache_hits + report.shader_cache_misses > 0 {
        let _ = writeln!(
            out,
            "shader cache: {} hits, {} misses",
            report.shader_cache_hits, report.shader_cache_misses
        );
    }
    for (class, count) in &report.errors {
        let _ = writeln!(out, "errors[{}]: {}", class, count);
    }
    for (name, count) in &report.unsupported {
        let _ = writeln!(out, "unsupported {}: {}", name, count);
    }
    out
}
