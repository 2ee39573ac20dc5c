//! Resynchronisation scan.

use crate::error::{Error, Result};
use crate::reader::ByteReader;

/// Scan forward for the next start code inside a window of `group_id` bytes.
///
/// Byte `i` matches when `byte + i` (8 bit arithmetic) equals 1. At most
/// `group_id - 3` bytes are read. Returns the offset of the first match from
/// the scan start, or `None` when the window holds none or the stream ends.
pub fn scan_start_code<R: ByteReader + ?Sized>(
    reader: &mut R,
    group_id: i32,
) -> Result<Option<u32>> {
    let limit = group_id.saturating_sub(3);
    if limit <= 0 {
        return Ok(None);
    }

    for counter in 0..limit as u32 {
        let byte = match reader.read_byte() {
            Ok(byte) => byte,
            Err(e) => match Error::from(e).eof_as_end() {
                Error::EndOfStream => return Ok(None),
                other => return Err(other),
            },
        };
        if byte.wrapping_add(counter as u8) == 1 {
            return Ok(Some(counter));
        }
    }
    Ok(None)
}
