//! CLI argument parsing for gltrace

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for reports and dumps
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "gltrace")]
#[command(version)]
#[command(about = "GLES trace inspection, conversion and headless replay", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    /// Function schema to use instead of the built-in GLES schema
    #[arg(long = "schema", value_name = "FILE", global = true)]
    pub schema: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show header, metadata and per-function call counts
    Info {
        trace: PathBuf,
        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the user-facing format version (reads only the first 12 bytes)
    Version { trace: PathBuf },

    /// Print decoded calls
    Dump {
        trace: PathBuf,
        /// Only functions whose name matches this regex
        #[arg(long = "filter", value_name = "REGEX")]
        filter: Option<String>,
        /// Only calls made on this thread slot
        #[arg(long = "thread", value_name = "N")]
        thread: Option<u8>,
        /// Stop after this many printed calls
        #[arg(long = "limit", value_name = "N")]
        limit: Option<usize>,
        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Keep frames START..=END of a trace
    Trim {
        input: PathBuf,
        output: PathBuf,
        #[arg(long = "start", value_name = "FRAME")]
        start: u64,
        #[arg(long = "end", value_name = "FRAME")]
        end: u64,
    },

    /// Move every call of one thread slot to another
    RemapTid {
        input: PathBuf,
        output: PathBuf,
        #[arg(long = "from", value_name = "TID")]
        from: u8,
        #[arg(long = "to", value_name = "TID")]
        to: u8,
    },

    /// Grow the reserved JSON region in place
    SetHeaderSize {
        trace: PathBuf,
        /// New region size in bytes
        bytes: u64,
    },

    /// Re-encode a trace at the current format version
    Upgrade { input: PathBuf, output: PathBuf },

    /// Write the `.meta` sidecar holding the trace's MD5
    UpdateMd5 { trace: PathBuf },

    /// Decode every record and check ordering, counts and the sidecar checksum
    Verify {
        trace: PathBuf,
        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Replay a trace against the headless driver
    Replay {
        trace: PathBuf,
        /// Replay configuration (TOML)
        #[arg(long = "config", value_name = "FILE")]
        config: Option<PathBuf>,
        /// Stop after this many frames
        #[arg(long = "frames", value_name = "N")]
        frames: Option<u64>,
        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,
    },
}
