use super::header::Header;
use super::metadata::Metadata;
use super::sigbook::SigBook;
use crate::codec::{
    decode_record, CallRecord, CodecContext, RecordErrorKind, DEFAULT_LEGACY_THRESHOLD,
};
use crate::error::{FormatError, Result, TraceError};
use crate::schema::{SchemaRegistry, Signature};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Memory-mapped trace file
#[derive(Debug)]
pub struct TraceReader {
    mmap: Mmap,
    path: PathBuf,
    header: Header,
    metadata: Metadata,
    sigbook: SigBook,
    /// On-disk function id → registry id
    id_map: Vec<Option<u16>>,
    sigbook_start: usize,
    data_start: usize,
    registry: Arc<SchemaRegistry>,
    ctx: CodecContext,
}

impl TraceReader {
    pub fn open<P: AsRef<Path>>(path: P, registry: Arc<SchemaRegistry>) -> Result<Self> {
        Self::open_with(path, registry, DEFAULT_LEGACY_THRESHOLD)
    }

    /// Open with an explicit legacy threshold for opaque decoding
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        registry: Arc<SchemaRegistry>,
        legacy_threshold: u32,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        if len < 12 {
            return Err(FormatError::Header(format!("file is only {} bytes", len)).into());
        }
        let mmap = unsafe { Mmap::map(&file) }?;
        let header = Header::parse(&mmap)?;

        let json_start = header.json_start as usize;
        let json_end = header.json_end as usize;
        if header.json_end as u64 > len {
            return Err(FormatError::Header(format!(
                "JSON region ends at {} but the file has {} bytes",
                json_end, len
            ))
            .into());
        }
        let json_len = header.json_length as usize;
        let metadata = Metadata::from_json(&mmap[json_start..json_start + json_len])?;
        let (sigbook, book_len) = SigBook::decode(&mmap[json_end..])?;
        let id_map = sigbook
            .bind(&registry)
            .into_iter()
            .map(|sig| sig.map(|s| s.id))
            .collect();

        for (id, name) in sigbook.entries() {
            if registry.resolve_name(name).is_none() {
                warn!(id, name = %name, "function in trace is unknown to the schema");
            }
        }
        debug!(
            path = %path.display(),
            version = header.version,
            data_start = json_end + book_len,
            "opened trace"
        );

        Ok(Self {
            ctx: CodecContext::new(header.version).with_legacy_threshold(legacy_threshold),
            mmap,
            path,
            header,
            metadata,
            sigbook,
            id_map,
            sigbook_start: json_end,
            data_start: json_end + book_len,
            registry,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn version(&self) -> u32 {
        self.header.version
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Raw JSON text as stored
    pub fn metadata_bytes(&self) -> &[u8] {
        let start = self.header.json_start as usize;
        &self.mmap[start..start + self.header.json_length as usize]
    }

    pub fn sigbook(&self) -> &SigBook {
        &self.sigbook
    }

    /// Encoded signature book block, for tools that copy records verbatim
    pub fn sigbook_bytes(&self) -> &[u8] {
        &self.mmap[self.sigbook_start..self.data_start]
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn context(&self) -> &CodecContext {
        &self.ctx
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data_start(&self) -> usize {
        self.data_start
    }

    pub fn data(&self) -> &[u8] {
        &self.mmap[self.data_start..]
    }

    /// Signature for an on-disk function id
    pub fn signature_for(&self, file_id: u16) -> Option<&Signature> {
        let id = (*self.id_map.get(file_id as usize)?)?;
        self.registry.by_id(id)
    }

    /// Records with their raw bytes
    pub fn raw_records(&self) -> RawRecords<'_> {
        RawRecords {
            reader: self,
            offset: 0,
            seq: 0,
            done: false,
        }
    }

    /// Decoded records, with function ids translated to registry ids
    ///
    /// Recoverable errors are yielded and iteration continues.
    pub fn records(&self) -> Records<'_> {
        Records {
            inner: self.raw_records(),
        }
    }
}

/// One record as stored, plus its decoded form
#[derive(Debug, Clone)]
pub struct RawRecord<'r> {
    /// Absolute file offset
    pub offset: u64,
    pub bytes: &'r [u8],
    pub record: CallRecord,
    pub signature: &'r Signature,
}

pub struct RawRecords<'r> {
    reader: &'r TraceReader,
    offset: usize,
    seq: u64,
    done: bool,
}

impl<'r> Iterator for RawRecords<'r> {
    type Item = Result<RawRecord<'r>>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader;
        let data = reader.data();
        if self.done || self.offset >= data.len() {
            return None;
        }
        let buf = &data[self.offset..];
        let seq = self.seq;
        self.seq += 1;
        let offset = (reader.data_start + self.offset) as u64;

        match decode_record(buf, |id| reader.signature_for(id), &reader.ctx) {
            Ok((mut record, len)) => {
                record.seq = seq;
                // decode only succeeds when the lookup did
                let signature = reader.signature_for(record.function_id)?;
                record.function_id = signature.id;
                self.offset += len;
                Some(Ok(RawRecord {
                    offset,
                    bytes: &buf[..len],
                    record,
                    signature,
                }))
            }
            Err(err) => {
                let error = match (err.resync, err.kind) {
                    (Some(len), RecordErrorKind::Codec { function, source }) => {
                        self.offset += len;
                        TraceError::TruncatedRecord { seq, function, source }
                    }
                    (Some(len), RecordErrorKind::UnknownFunction(id)) => {
                        self.offset += len;
                        let name = reader.sigbook.name_of(id).unwrap_or("?");
                        TraceError::UnsupportedFunction(format!("{} (id {})", name, id))
                    }
                    (_, kind) => {
                        self.done = true;
                        FormatError::Record {
                            offset,
                            reason: kind.to_string(),
                        }
                        .into()
                    }
                };
                Some(Err(error))
            }
        }
    }
}

pub struct Records<'r> {
    inner: RawRecords<'r>,
}

impl Iterator for Records<'_> {
    type Item = Result<CallRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|raw| raw.map(|r| r.record))
    }
}
