use super::header::{Header, HEADER_SIZE};
use super::writer::write_zeros;
use crate::error::{Result, TraceError};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, info};

/// Block size for the streamed move
const MOVE_BLOCK: usize = 1 << 20;

/// Grow the reserved JSON region of a trace in place
///
/// Everything after the region (signature book and call records) shifts towards
/// the end of the file by the size difference. The move runs backwards one block
/// at a time, so extra memory stays constant regardless of file size and no byte
/// is overwritten before it has been read. The JSON text itself is untouched.
///
/// Returns `false` when the region already has the requested size. Requests
/// below the current JSON length or the current region size fail with a
/// capacity error before anything is written.
pub fn grow_json_region<P: AsRef<Path>>(path: P, new_size: u64) -> Result<bool> {
    let mut file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
    let mut head = [0u8; HEADER_SIZE];
    file.read_exact(&mut head)?;
    let mut header = Header::parse(&head)?;

    let capacity = header.json_capacity() as u64;
    if new_size < header.json_length as u64 {
        return Err(TraceError::Capacity(format!(
            "requested region of {} bytes is smaller than the {} bytes of JSON it holds",
            new_size, header.json_length
        )));
    }
    if new_size == capacity {
        debug!(size = new_size, "JSON region already has the requested size");
        return Ok(false);
    }
    if new_size < capacity {
        return Err(TraceError::Capacity(format!(
            "shrinking the JSON region from {} to {} bytes is not supported",
            capacity, new_size
        )));
    }

    let delta = new_size - capacity;
    let tail_start = header.json_end as u64;
    let file_len = file.metadata()?.len();
    if tail_start > file_len {
        return Err(TraceError::Capacity(format!(
            "JSON region ends at {} past the end of the file ({})",
            tail_start, file_len
        )));
    }
    file.set_len(file_len + delta)?;

    let mut block = vec![0u8; MOVE_BLOCK.min((file_len - tail_start) as usize).max(1)];
    let mut end = file_len;
    while end > tail_start {
        let chunk = (end - tail_start).min(block.len() as u64);
        let start = end - chunk;
        let buf = &mut block[..chunk as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(buf)?;
        file.seek(SeekFrom::Start(start + delta))?;
        file.write_all(buf)?;
        end = start;
    }

    file.seek(SeekFrom::Start(tail_start))?;
    write_zeros(&mut file, delta)?;

    header.json_end += delta as i64;
    file.seek(SeekFrom::Start(0))?;
    header.write_to(&mut file)?;
    file.sync_all()?;

    info!(
        from = capacity,
        to = new_size,
        moved = file_len - tail_start,
        "grew JSON region"
    );
    Ok(true)
}
