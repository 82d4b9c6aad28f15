//! Conversion entries and input checksums

use crate::container::{Conversion, ConversionInput, VersionChange};
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde_json::Map;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const READ_BLOCK: usize = 64 * 1024;

/// Hex MD5 of a whole file, streamed
pub fn file_md5<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut context = md5::Context::new();
    let mut block = vec![0u8; READ_BLOCK];
    loop {
        let n = reader
            .read(&mut block)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        context.consume(&block[..n]);
    }
    Ok(format!("{:x}", context.compute()))
}

/// Conversion entry for `tool` having consumed `input`
///
/// The checksum is taken before the tool touches anything, so in-place tools
/// must call this first.
pub fn conversion<P: AsRef<Path>>(tool: &str, input: P) -> Result<Conversion> {
    let input = input.as_ref();
    Ok(Conversion {
        tool: tool.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        version: env!("CARGO_PKG_VERSION").to_string(),
        input: ConversionInput {
            md5: file_md5(input)?,
            file: input.display().to_string(),
        },
        version_info: None,
        extra: Map::new(),
    })
}

/// Same as [`conversion`], carrying the format version change
pub fn version_conversion<P: AsRef<Path>>(
    tool: &str,
    input: P,
    from: u32,
    to: u32,
) -> Result<Conversion> {
    let mut entry = conversion(tool, input)?;
    entry.version_info = Some(VersionChange { from, to });
    Ok(entry)
}
