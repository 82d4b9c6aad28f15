//! Bounded little-endian cursors with 4-byte field alignment

use crate::error::CodecError;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io::{self, Write};

/// Field alignment inside a record
pub const ALIGNMENT: usize = 4;

/// Reader over one record's bytes; never reads past the end of its slice
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Take `n` raw bytes without padding
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.buf.len());
        match end {
            Some(end) => {
                let bytes = &self.buf[self.pos..end];
                self.pos = end;
                Ok(bytes)
            }
            None => Err(CodecError::Truncated {
                position: self.pos,
                wanted: n,
                end: self.buf.len(),
            }),
        }
    }

    /// Skip padding up to the next aligned position
    pub fn align(&mut self) -> Result<(), CodecError> {
        let pad = padding(self.pos);
        self.take(pad).map(|_| ())
    }

    /// Take `n` bytes followed by padding
    pub fn take_padded(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let bytes = self.take(n)?;
        self.align()?;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }
}

/// Writer that tracks its position for padding
pub struct ByteWriter<W: Write> {
    inner: W,
    pos: usize,
}

impl<W: Write> ByteWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.pos += bytes.len();
        Ok(())
    }

    /// Zero-fill up to the next aligned position
    pub fn align(&mut self) -> io::Result<()> {
        const ZEROS: [u8; ALIGNMENT] = [0; ALIGNMENT];
        let pad = padding(self.pos);
        self.write_bytes(&ZEROS[..pad])
    }

    pub fn write_padded(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_bytes(bytes)?;
        self.align()
    }

    pub fn write_u8(&mut self, v: u8) -> io::Result<()> {
        self.inner.write_u8(v)?;
        self.pos += 1;
        Ok(())
    }

    pub fn write_u16(&mut self, v: u16) -> io::Result<()> {
        self.inner.write_u16::<LittleEndian>(v)?;
        self.pos += 2;
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> io::Result<()> {
        self.inner.write_u32::<LittleEndian>(v)?;
        self.pos += 4;
        Ok(())
    }

    pub fn write_i32(&mut self, v: i32) -> io::Result<()> {
        self.inner.write_i32::<LittleEndian>(v)?;
        self.pos += 4;
        Ok(())
    }

    pub fn write_u64(&mut self, v: u64) -> io::Result<()> {
        self.inner.write_u64::<LittleEndian>(v)?;
        self.pos += 8;
        Ok(())
    }
}

/// Bytes needed to reach the next aligned offset
pub fn padding(pos: usize) -> usize {
    (ALIGNMENT - pos % ALIGNMENT) % ALIGNMENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding() {
        assert_eq!(padding(0), 0);
        assert_eq!(padding(1), 3);
        assert_eq!(padding(3), 1);
        assert_eq!(padding(8), 0);
    }

    #[test]
    fn test_writer_pads_with_zeros() {
        let mut w = ByteWriter::new(Vec::new());
        w.write_u8(0xAB).unwrap();
        w.align().unwrap();
        w.write_u16(0x1234).unwrap();
        w.align().unwrap();
        assert_eq!(w.into_inner(), vec![0xAB, 0, 0, 0, 0x34, 0x12, 0, 0]);
    }

    #[test]
    fn test_reader_stops_at_end() {
        let data = [1u8, 0, 0, 0, 2, 0];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u32().unwrap(), 1);
        let err = r.read_u32().unwrap_err();
        assert_eq!(
            err,
            CodecError::Truncated {
                position: 4,
                wanted: 4,
                end: 6
            }
        );
        // failed read leaves the cursor where it was
        assert_eq!(r.position(), 4);
        assert_eq!(r.read_u16().unwrap(), 2);
    }

    #[test]
    fn test_take_padded() {
        let data = [b'a', b'b', b'c', 0, 9, 0, 0, 0];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.take_padded(3).unwrap(), b"abc");
        assert_eq!(r.read_u32().unwrap(), 9);
        assert_eq!(r.remaining(), 0);
    }
}
