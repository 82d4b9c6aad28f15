//! Signature book: the id → name table written before the call data
//!
//! Records store numeric function ids. The book lets a reader built against a
//! newer schema map those ids back through names, so renumbering or extending the
//! schema never breaks old files.

use crate::codec::{ByteReader, ByteWriter};
use crate::error::{FormatError, Result};
use crate::schema::{SchemaRegistry, Signature};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SigBook {
    entries: Vec<(u16, String)>,
}

impl SigBook {
    /// Book covering every signature in the registry
    pub fn from_registry(registry: &SchemaRegistry) -> Self {
        Self {
            entries: registry.iter().map(|s| (s.id, s.name.clone())).collect(),
        }
    }

    pub fn entries(&self) -> &[(u16, String)] {
        &self.entries
    }

    pub fn name_of(&self, id: u16) -> Option<&str> {
        self.entries
            .iter()
            .find(|(i, _)| *i == id)
            .map(|(_, n)| n.as_str())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut w = ByteWriter::new(Vec::new());
        w.write_u32(0)?;
        w.write_u32(self.entries.len() as u32)?;
        for (id, name) in &self.entries {
            w.write_u32(*id as u32)?;
            w.write_u32(name.len() as u32 + 1)?;
            w.write_bytes(name.as_bytes())?;
            w.write_padded(&[0])?;
        }
        let mut bytes = w.into_inner();
        let len = bytes.len() as u32;
        bytes[..4].copy_from_slice(&len.to_le_bytes());
        Ok(bytes)
    }

    /// Decode the book at the start of `buf`, returning it with its block length
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let bad = |reason: String| FormatError::SigBook(reason);
        let mut r = ByteReader::new(buf);
        let len = r.read_u32().map_err(|e| bad(e.to_string()))? as usize;
        if len < 8 || len > buf.len() {
            return Err(bad(format!("block length {} out of range", len)).into());
        }
        let mut r = ByteReader::new(&buf[..len]);
        r.take(4).map_err(|e| bad(e.to_string()))?;
        let count = r.read_u32().map_err(|e| bad(e.to_string()))?;
        let mut entries = Vec::new();
        for _ in 0..count {
            let id = r.read_u32().map_err(|e| bad(e.to_string()))?;
            let name_len = r.read_u32().map_err(|e| bad(e.to_string()))? as usize;
            let raw = r.take_padded(name_len).map_err(|e| bad(e.to_string()))?;
            let name = match raw.split_last() {
                Some((0, name)) => String::from_utf8(name.to_vec())
                    .map_err(|_| bad(format!("entry {} is not UTF-8", id)))?,
                _ => return Err(bad(format!("entry {} is not NUL-terminated", id)).into()),
            };
            let id = u16::try_from(id).map_err(|_| bad(format!("id {} out of range", id)))?;
            entries.push((id, name));
        }
        Ok((Self { entries }, len))
    }

    /// Map on-disk ids to signatures of `registry`, following synonyms
    ///
    /// The result is indexed by on-disk id. Names the registry does not know map
    /// to `None`.
    pub fn bind<'r>(&self, registry: &'r SchemaRegistry) -> Vec<Option<&'r Signature>> {
        let max = self.entries.iter().map(|(id, _)| *id as usize).max().unwrap_or(0);
        let mut table = vec![None; max + 1];
        for (id, name) in &self.entries {
            table[*id as usize] = registry.resolve_name(name);
        }
        table
    }
}
