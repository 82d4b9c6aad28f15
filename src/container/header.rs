use crate::error::{FormatError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

pub const MAGIC: u32 = 0x2012_2012;
pub const HEADER_SIZE: usize = 32;
/// Oldest layout this build reads; anything older needs an upgrade
pub const MIN_SUPPORTED_VERSION: u32 = 5;
pub const CURRENT_VERSION: u32 = 7;
/// Offset between the stored version and the version shown to users
pub const USER_VERSION_OFFSET: u32 = 2;
/// Reserved JSON region so that call data starts at 512 KiB
pub const DEFAULT_JSON_RESERVE: u32 = 512 * 1024 - HEADER_SIZE as u32;

/// Fixed 32-byte file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub to_next: u32,
    pub magic: u32,
    pub version: u32,
    pub json_length: u32,
    pub json_start: i64,
    pub json_end: i64,
}

impl Header {
    pub fn new(version: u32, json_reserve: u32) -> Self {
        Self {
            to_next: HEADER_SIZE as u32,
            magic: MAGIC,
            version,
            json_length: 0,
            json_start: HEADER_SIZE as i64,
            json_end: HEADER_SIZE as i64 + json_reserve as i64,
        }
    }

    /// Parse and validate the header at the start of `bytes`
    pub fn parse(mut bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 12 {
            return Err(FormatError::Header(format!("file is only {} bytes", bytes.len())).into());
        }
        let to_next = bytes.read_u32::<LittleEndian>()?;
        let magic = bytes.read_u32::<LittleEndian>()?;
        let version = bytes.read_u32::<LittleEndian>()?;
        check_magic_and_version(magic, version)?;

        if bytes.len() < HEADER_SIZE - 12 {
            return Err(FormatError::Header("header is truncated".into()).into());
        }
        let header = Self {
            to_next,
            magic,
            version,
            json_length: bytes.read_u32::<LittleEndian>()?,
            json_start: bytes.read_i64::<LittleEndian>()?,
            json_end: bytes.read_i64::<LittleEndian>()?,
        };
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<()> {
        if self.to_next as usize != HEADER_SIZE {
            let reason = format!("unexpected header size {}", self.to_next);
            return Err(FormatError::Header(reason).into());
        }
        if self.json_start < HEADER_SIZE as i64 || self.json_end < self.json_start {
            return Err(FormatError::Header(format!(
                "bad JSON region {}..{}",
                self.json_start, self.json_end
            ))
            .into());
        }
        if (self.json_length as i64) > self.json_capacity() {
            return Err(FormatError::Header(format!(
                "JSON length {} exceeds its region of {} bytes",
                self.json_length,
                self.json_capacity()
            ))
            .into());
        }
        Ok(())
    }

    pub fn json_capacity(&self) -> i64 {
        self.json_end - self.json_start
    }

    pub fn user_version(&self) -> u32 {
        self.version.saturating_sub(USER_VERSION_OFFSET)
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(self.to_next)?;
        w.write_u32::<LittleEndian>(self.magic)?;
        w.write_u32::<LittleEndian>(self.version)?;
        w.write_u32::<LittleEndian>(self.json_length)?;
        w.write_i64::<LittleEndian>(self.json_start)?;
        w.write_i64::<LittleEndian>(self.json_end)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        // writing into a Vec cannot fail
        let _ = self.write_to(&mut bytes);
        bytes
    }
}

fn check_magic_and_version(magic: u32, version: u32) -> Result<()> {
    if magic != MAGIC {
        return Err(FormatError::BadMagic {
            found: magic,
            expected: MAGIC,
        }
        .into());
    }
    if version < MIN_SUPPORTED_VERSION {
        return Err(FormatError::UpgradeRequired {
            found: version,
            minimum: MIN_SUPPORTED_VERSION,
        }
        .into());
    }
    if version > CURRENT_VERSION {
        return Err(FormatError::UnsupportedVersion {
            found: version,
            current: CURRENT_VERSION,
        }
        .into());
    }
    Ok(())
}

/// Read only the first 12 bytes and return the stored format version
///
/// Checks the magic but not the version range, so it also works on files too old
/// to open.
pub fn read_version<P: AsRef<Path>>(path: P) -> Result<u32> {
    let mut file = File::open(path)?;
    let mut bytes = [0u8; 12];
    file.read_exact(&mut bytes)
        .map_err(|_| FormatError::Header("file is shorter than 12 bytes".into()))?;
    let mut cursor = &bytes[4..];
    let magic = cursor.read_u32::<LittleEndian>()?;
    if magic != MAGIC {
        return Err(FormatError::BadMagic {
            found: magic,
            expected: MAGIC,
        }
        .into());
    }
    Ok(cursor.read_u32::<LittleEndian>()?)
}
