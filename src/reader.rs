//! Byte source access and declarative record layouts.
//!
//! Every record in a Hikvision file is a run of little-endian integers at
//! fixed offsets from the start of the record. Layouts are written down as
//! tables of [`Field`] and decoded by [`decode_fields`] rather than by
//! overlaying a native struct on the raw bytes.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Read, Seek};

/// Random-access little-endian reads over a seekable stream.
///
/// Moves are relative seeks so a `BufReader` keeps its buffer when the
/// target is already in it.
pub trait ByteReader: Read + Seek {
    fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        let current = self.stream_position()?;
        self.seek_relative(pos.wrapping_sub(current) as i64)
    }

    fn skip(&mut self, n: i64) -> io::Result<()> {
        self.seek_relative(n)
    }

    fn tell(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        self.read_u8()
    }

    fn read_le16(&mut self) -> io::Result<u16> {
        self.read_u16::<LittleEndian>()
    }

    fn read_le32(&mut self) -> io::Result<u32> {
        self.read_u32::<LittleEndian>()
    }
}

impl<R: Read + Seek + ?Sized> ByteReader for R {}

/// Width of one little-endian field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    U8,
    U16,
    U32,
}

impl Width {
    pub const fn byte_len(self) -> u64 {
        match self {
            Width::U8 => 1,
            Width::U16 => 2,
            Width::U32 => 4,
        }
    }
}

/// One entry of a record layout: where the field lives and where it goes.
pub struct Field<T> {
    pub name: &'static str,
    /// Offset from the start of the record.
    pub offset: u64,
    pub width: Width,
    pub set: fn(&mut T, u32),
}

/// Decode `fields` from the record starting at `base` into `target`.
///
/// The stream is left just past the last field of the table. On error the
/// target may be partly written and must be discarded by the caller.
pub fn decode_fields<T, R>(
    reader: &mut R,
    base: u64,
    fields: &[Field<T>],
    target: &mut T,
) -> io::Result<()>
where
    R: ByteReader + ?Sized,
{
    let mut pos = match fields.first() {
        Some(field) => base + field.offset,
        None => return Ok(()),
    };
    reader.seek_to(pos)?;
    for field in fields {
        let offset = base + field.offset;
        if offset != pos {
            reader.skip(offset.wrapping_sub(pos) as i64)?;
        }
        let value = match field.width {
            Width::U8 => reader.read_byte()? as u32,
            Width::U16 => reader.read_le16()? as u32,
            Width::U32 => reader.read_le32()?,
        };
        pos = offset + field.width.byte_len();
        tracing::trace!(field = field.name, offset, value, "decoded field");
        (field.set)(target, value);
    }
    Ok(())
}

/// Size of the span a layout covers, from the record start to the end of
/// its furthest field.
pub fn layout_len<T>(fields: &[Field<T>]) -> u64 {
    fields
        .iter()
        .map(|f| f.offset + f.width.byte_len())
        .max()
        .unwrap_or(0)
}
