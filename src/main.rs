use anyhow::{bail, Context, Result};
use clap::Parser;
use gltrace::cli::{Cli, Command, OutputFormat};
use gltrace::container::TraceReader;
use gltrace::replay::StopReason;
use gltrace::schema::SchemaRegistry;
use gltrace::tools;
use regex::Regex;
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; `RUST_LOG` applies unless `--debug` is given
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_registry(path: Option<&Path>) -> Result<Arc<SchemaRegistry>> {
    let registry = match path {
        Some(path) => SchemaRegistry::from_toml(path)
            .with_context(|| format!("Failed to load schema {}", path.display()))?,
        None => SchemaRegistry::default_gles().context("Built-in schema is invalid")?,
    };
    Ok(Arc::new(registry))
}

fn open(path: &Path, registry: &Arc<SchemaRegistry>) -> Result<TraceReader> {
    TraceReader::open(path, Arc::clone(registry))
        .with_context(|| format!("Failed to open {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    // `version` must work on files too old or too damaged to open
    let schema = args.schema;
    let registry = || load_registry(schema.as_deref());

    match args.command {
        Command::Version { trace } => println!("{}", tools::version(&trace)?),
        Command::Info { trace, format } => {
            let reader = open(&trace, &registry()?)?;
            let info = tools::info(&reader);
            match format {
                OutputFormat::Text => print!("{}", info),
                OutputFormat::Json => print_json(&info)?,
            }
        }
        Command::Dump {
            trace,
            filter,
            thread,
            limit,
            format,
        } => {
            let filter = filter
                .map(|re| {
                    Regex::new(&re).with_context(|| format!("Invalid --filter regex: {}", re))
                })
                .transpose()?;
            let options = tools::DumpOptions { filter, thread, limit };
            let reader = open(&trace, &registry()?)?;
            let stdout = std::io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            tools::dump(&reader, &options, format, &mut out)?;
            out.flush()?;
        }
        Command::Trim {
            input,
            output,
            start,
            end,
        } => {
            let summary = tools::trim(&input, &output, start, end, registry()?)?;
            println!(
                "kept {} calls in {} frames ({} dropped)",
                summary.records_written, summary.frames_written, summary.dropped
            );
        }
        Command::RemapTid { input, output, from, to } => {
            let summary = tools::remap_tid(&input, &output, from, to, registry()?)?;
            println!("wrote {} calls", summary.records_written);
        }
        Command::SetHeaderSize { trace, bytes } => {
            if tools::set_header_size(&trace, bytes)? {
                println!("JSON region of {} is now {} bytes", trace.display(), bytes);
            } else {
                println!("JSON region of {} already is {} bytes", trace.display(), bytes);
            }
        }
        Command::Upgrade { input, output } => {
            let summary = tools::upgrade(&input, &output, registry()?)?;
            println!("re-encoded {} calls ({} dropped)", summary.records_written, summary.dropped);
        }
        Command::UpdateMd5 { trace } => {
            let (sidecar, digest) = tools::update_md5(&trace)?;
            println!("{}  {}", digest, sidecar.display());
        }
        Command::Verify { trace, format } => {
            let reader = open(&trace, &registry()?)?;
            let report = tools::verify(&reader)?;
            match format {
                OutputFormat::Text => println!("{}", report),
                OutputFormat::Json => print_json(&report)?,
            }
            if !report.is_ok() {
                bail!("{} failed verification", trace.display());
            }
        }
        Command::Replay {
            trace,
            config,
            frames,
            format,
        } => {
            let config = tools::load_config(config.as_deref(), frames)?;
            let report = tools::replay_file(&trace, registry()?, config)?;
            match format {
                OutputFormat::Text => print!("{}", tools::render_report(&report)),
                OutputFormat::Json => print_json(&report)?,
            }
            if let StopReason::Fatal(reason) = &report.stop_reason {
                bail!("replay of {} aborted: {}", trace.display(), reason);
            }
        }
    }
    Ok(())
}
