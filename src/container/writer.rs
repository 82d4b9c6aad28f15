use super::header::{Header, CURRENT_VERSION, DEFAULT_JSON_RESERVE, HEADER_SIZE};
use super::metadata::Metadata;
use super::sigbook::SigBook;
use crate::codec::{encode_record, CallRecord, CodecContext};
use crate::error::{Result, TraceError};
use crate::schema::SchemaRegistry;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Layout choices for a new trace file
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub version: u32,
    pub json_reserve: u32,
    pub legacy_threshold: u32,
    /// Signature book to store; defaults to the registry's own
    pub sigbook: Option<SigBook>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            json_reserve: DEFAULT_JSON_RESERVE,
            legacy_threshold: crate::codec::DEFAULT_LEGACY_THRESHOLD,
            sigbook: None,
        }
    }
}

/// Sequential trace writer
///
/// The header and JSON region are written up front and rewritten by
/// [`TraceWriter::finish`] once counts are known.
pub struct TraceWriter {
    file: BufWriter<File>,
    path: PathBuf,
    header: Header,
    registry: Arc<SchemaRegistry>,
    ctx: CodecContext,
    records: u64,
    bytes: u64,
}

impl TraceWriter {
    pub fn create<P: AsRef<Path>>(
        path: P,
        registry: Arc<SchemaRegistry>,
        metadata: &Metadata,
    ) -> Result<Self> {
        Self::create_with(path, registry, metadata, WriterOptions::default())
    }

    pub fn create_with<P: AsRef<Path>>(
        path: P,
        registry: Arc<SchemaRegistry>,
        metadata: &Metadata,
        options: WriterOptions,
    ) -> Result<Self> {
        let json = metadata.to_json()?;
        if json.len() as u64 > options.json_reserve as u64 {
            return Err(TraceError::Capacity(format!(
                "metadata is {} bytes but only {} are reserved",
                json.len(),
                options.json_reserve
            )));
        }
        let sigbook = options
            .sigbook
            .unwrap_or_else(|| SigBook::from_registry(&registry))
            .encode()?;

        let mut header = Header::new(options.version, options.json_reserve);
        header.json_length = json.len() as u32;

        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let mut file = BufWriter::new(file);
        header.write_to(&mut file)?;
        file.write_all(&json)?;
        write_zeros(&mut file, options.json_reserve as u64 - json.len() as u64)?;
        file.write_all(&sigbook)?;

        debug!(
            path = %path.display(),
            version = options.version,
            reserve = options.json_reserve,
            "created trace"
        );

        Ok(Self {
            file,
            path,
            header,
            registry,
            ctx: CodecContext::new(options.version).with_legacy_threshold(options.legacy_threshold),
            records: 0,
            bytes: 0,
        })
    }

    /// Encode and append one call; returns its sequence number
    pub fn append_call(&mut self, record: &CallRecord) -> Result<u64> {
        let sig = self.registry.by_id(record.function_id).ok_or_else(|| {
            TraceError::UnsupportedFunction(format!("function id {}", record.function_id))
        })?;
        let bytes = encode_record(sig, record, &self.ctx)?;
        self.append_raw(&bytes)
    }

    /// Append an already-encoded record verbatim
    pub fn append_raw(&mut self, bytes: &[u8]) -> Result<u64> {
        self.file.write_all(bytes)?;
        self.bytes += bytes.len() as u64;
        let seq = self.records;
        self.records += 1;
        Ok(seq)
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    pub fn context(&self) -> &CodecContext {
        &self.ctx
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store final metadata and flush
    ///
    /// Fails with a capacity error, leaving the previously written metadata in
    /// place, if the JSON no longer fits its region.
    pub fn finish(mut self, metadata: &Metadata) -> Result<()> {
        let json = metadata.to_json()?;
        let capacity = self.header.json_capacity() as u64;
        if json.len() as u64 > capacity {
            self.file.flush()?;
            return Err(TraceError::Capacity(format!(
                "final metadata is {} bytes but only {} are reserved",
                json.len(),
                capacity
            )));
        }
        self.file.flush()?;
        let mut file = self.file.into_inner().map_err(|e| TraceError::Io(e.into_error()))?;

        let previous = self.header.json_length as u64;
        self.header.json_length = json.len() as u32;
        file.seek(SeekFrom::Start(0))?;
        self.header.write_to(&mut file)?;
        file.seek(SeekFrom::Start(self.header.json_start as u64))?;
        file.write_all(&json)?;
        if previous > json.len() as u64 {
            write_zeros(&mut file, previous - json.len() as u64)?;
        }
        file.sync_all()?;

        info!(
            path = %self.path.display(),
            records = self.records,
            bytes = self.bytes,
            "trace finished"
        );
        Ok(())
    }
}

pub(super) fn write_zeros<W: Write>(w: &mut W, mut count: u64) -> std::io::Result<()> {
    const ZEROS: [u8; 4096] = [0; 4096];
    while count > 0 {
        let n = count.min(ZEROS.len() as u64) as usize;
        w.write_all(&ZEROS[..n])?;
        count -= n as u64;
    }
    Ok(())
}

/// Rewrite the JSON block of an existing trace in place
///
/// Every metadata rewrite appends `conversion` to the provenance log. Nothing is
/// written if the result does not fit the reserved region.
pub fn rewrite_metadata<P, F>(path: P, conversion: super::Conversion, edit: F) -> Result<Metadata>
where
    P: AsRef<Path>,
    F: FnOnce(&mut Metadata),
{
    use std::io::Read;

    let mut file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
    let mut head = [0u8; HEADER_SIZE];
    file.read_exact(&mut head)?;
    let mut header = Header::parse(&head)?;

    let mut json = vec![0u8; header.json_length as usize];
    file.seek(SeekFrom::Start(header.json_start as u64))?;
    file.read_exact(&mut json)?;
    let mut metadata = Metadata::from_json(&json)?;

    edit(&mut metadata);
    metadata.record_conversion(conversion);
    let updated = metadata.to_json()?;
    if updated.len() as i64 > header.json_capacity() {
        return Err(TraceError::Capacity(format!(
            "metadata grows to {} bytes but the region holds {}; enlarge it with set-header-size",
            updated.len(),
            header.json_capacity()
        )));
    }

    file.seek(SeekFrom::Start(header.json_start as u64))?;
    file.write_all(&updated)?;
    if json.len() > updated.len() {
        write_zeros(&mut file, (json.len() - updated.len()) as u64)?;
    }
    header.json_length = updated.len() as u32;
    file.seek(SeekFrom::Start(0))?;
    header.write_to(&mut file)?;
    file.sync_all()?;
    Ok(metadata)
}
