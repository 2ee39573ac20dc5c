//! Walk the group and block records of a file to find its payload.
//!
//! The walker reads one window at a time. Each window yields a chunk size:
//! the bytes to step over before the next window. Two chunk sizes are
//! reserved. [`CHUNK_END`] stops the walk and sizes matching
//! [`needs_resync`] make the walker scan byte by byte for the next start
//! code instead of trusting the records.

use crate::error::{Error, Result};
use crate::header::{ContainerHeader, HEADER_LEN};
use crate::reader::ByteReader;
use crate::record::{
    parse_block_header, parse_group_header, Block, GroupHeader, RecordTime, GROUP_RECORD_LEN,
};
use crate::resolution::Resolution;
use crate::scan::scan_start_code;

/// Chunk size that ends the walk.
pub const CHUNK_END: u32 = 0xFFFF;

/// Chunk size standing for a record that failed validation.
pub const CHUNK_RESYNC: u32 = 0x8000_0002;

/// Comparator value marking a group record.
const GROUP_MARKER: u16 = 0x1001;

/// Offset of the comparator inside a window.
const COMPARATOR_OFFSET: u64 = 20;

/// Windows at least this large never hold a group record.
const GROUP_WINDOW_LIMIT: i32 = 0x2f;

/// Windows at least this large never hold a block record.
const BLOCK_WINDOW_LIMIT: i32 = 0x13;

/// Fixed part of every block chunk.
const CHUNK_PREFIX: u32 = 0x14;

/// Bytes between the lead byte and the size byte of a block chunk.
const SIZE_SKIP: u64 = 15;

/// Whether a chunk size asks for resynchronisation.
///
/// The comparison is done on the unsigned value and holds
/// for `0x8000_0002` and `0x8000_0003` only.
pub fn needs_resync(chunk_size: u32) -> bool {
    chunk_size.wrapping_add(2_147_483_646) < 2
}

/// Cursor of a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkState {
    /// Start of the next window.
    pub position: u64,
    /// Bytes left in the current group, signed. Goes negative once the
    /// records run past the declared size.
    pub group_id: i32,
    /// Bytes stepped over since the walk started.
    pub consumed: u64,
}

impl WalkState {
    fn advance(&mut self, n: u32) {
        self.position += n as u64;
        self.group_id = self.group_id.wrapping_sub(n as i32);
        self.consumed += n as u64;
    }
}

/// Byte range of video payload in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadSpan {
    pub offset: u64,
    pub length: u32,
    /// Time of the last decoded block, if any.
    pub record_time: Option<RecordTime>,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Chunk {
    size: u32,
    emit: bool,
}

impl Chunk {
    const END: Chunk = Chunk::skipped(CHUNK_END);
    const RESYNC: Chunk = Chunk::skipped(CHUNK_RESYNC);

    const fn skipped(size: u32) -> Self {
        Chunk { size, emit: false }
    }
}

/// Walks the records of one file and yields its payload spans.
///
/// The walker does not own the stream; every call seeks to where the
/// previous one stopped, so the caller may read the spans in between.
#[derive(Debug, Clone)]
pub struct GroupWalker {
    header: ContainerHeader,
    state: WalkState,
    group: Option<GroupHeader>,
    record_time: Option<RecordTime>,
    resolution: Resolution,
    finished: bool,
}

impl GroupWalker {
    /// Position the walk just past the file header.
    ///
    /// The first four bytes after the header are skipped; the next four hold
    /// the initial `group_id`. A file too short for them yields no spans.
    pub fn start<R: ByteReader + ?Sized>(
        reader: &mut R,
        header: &ContainerHeader,
    ) -> Result<Self> {
        let mut walker = GroupWalker {
            header: header.clone(),
            state: WalkState {
                position: HEADER_LEN + 8,
                group_id: 0,
                consumed: 0,
            },
            group: None,
            record_time: None,
            resolution: header.resolution,
            finished: false,
        };

        reader.seek_to(HEADER_LEN)?;
        let group_id = reader.skip(4).and_then(|_| reader.read_le32());
        match group_id {
            Ok(group_id) => walker.state.group_id = group_id as i32,
            Err(e) => match Error::from(e).eof_as_end() {
                Error::EndOfStream => {
                    tracing::warn!("file ends before the first group");
                    walker.finished = true;
                }
                other => return Err(other),
            },
        }
        tracing::debug!(group_id = walker.state.group_id, "walk starts");
        Ok(walker)
    }

    pub fn state(&self) -> &WalkState {
        &self.state
    }

    /// Current picture size, including overrides from group records.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Time of the last decoded block.
    pub fn record_time(&self) -> Option<RecordTime> {
        self.record_time
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Walk to the next payload span.
    ///
    /// Returns `Ok(None)` once the walk has ended, for good. An error also
    /// ends the walk.
    pub fn next_span<R: ByteReader + ?Sized>(
        &mut self,
        reader: &mut R,
    ) -> Result<Option<PayloadSpan>> {
        while !self.finished {
            match self.step(reader) {
                Ok(Some(span)) => return Ok(Some(span)),
                Ok(None) => {}
                Err(e) => {
                    self.finished = true;
                    return match e.eof_as_end() {
                        Error::EndOfStream => {
                            let position = self.state.position;
                            tracing::debug!(position, "walk reached end of stream");
                            Ok(None)
                        }
                        other => Err(other),
                    };
                }
            }
        }
        Ok(None)
    }

    fn step<R: ByteReader + ?Sized>(&mut self, reader: &mut R) -> Result<Option<PayloadSpan>> {
        let window = self.state.position;
        let chunk = self.next_chunk(reader, window)?;

        if chunk.size == CHUNK_END {
            tracing::debug!(position = window, "end of walk");
            self.finished = true;
            return Ok(None);
        }

        if needs_resync(chunk.size) {
            self.state.advance(1);
            tracing::warn!(
                position = window,
                group_id = self.state.group_id,
                "records out of step, scanning for start code"
            );
            reader.seek_to(self.state.position)?;
            match scan_start_code(reader, self.state.group_id)? {
                Some(skip) => self.state.advance(skip),
                None => {
                    let position = self.state.position;
                    tracing::debug!(position, "no start code left in group");
                    self.finished = true;
                }
            }
            return Ok(None);
        }

        self.state.advance(chunk.size);
        tracing::debug!(
            offset = window,
            size = chunk.size,
            group_id = self.state.group_id,
            "chunk"
        );
        if !chunk.emit {
            return Ok(None);
        }
        Ok(Some(PayloadSpan {
            offset: window,
            length: chunk.size,
            record_time: self.record_time,
            resolution: self.resolution,
        }))
    }

    /// Size of the chunk starting at `window`.
    fn next_chunk<R: ByteReader + ?Sized>(&mut self, reader: &mut R, window: u64) -> Result<Chunk> {
        let group_id = self.state.group_id;
        reader.seek_to(window + COMPARATOR_OFFSET)?;
        let comparator = reader.read_le16()?;

        if self.header.version_tag == 1 && comparator == GROUP_MARKER {
            if group_id >= GROUP_WINDOW_LIMIT {
                return Ok(Chunk::END);
            }
            reader.seek_to(window)?;
            return match parse_group_header(reader) {
                Ok(group) => {
                    self.group = Some(group);
                    Ok(Chunk::skipped(GROUP_RECORD_LEN))
                }
                Err(Error::InvalidData(_)) => Ok(Chunk::END),
                Err(e) => Err(e),
            };
        }

        if group_id >= BLOCK_WINDOW_LIMIT {
            return Ok(Chunk::END);
        }

        reader.seek_to(window)?;
        let emit = match parse_block_header(reader, self.group.as_ref(), &self.header) {
            Ok(Block::Absent { .. }) => true,
            Ok(Block::Decoded(block)) => {
                self.record_time = Some(block.record_time);
                if let Some(resolution) = block.resolution {
                    if resolution != self.resolution {
                        tracing::info!(%resolution, "resolution changed");
                    }
                    self.resolution = resolution;
                }
                block.has_payload()
            }
            Err(Error::InvalidData(msg)) => {
                tracing::warn!(offset = window, "{}", msg);
                return Ok(Chunk::RESYNC);
            }
            Err(e) => return Err(e),
        };

        let lead = reader.read_byte()? as u32;
        if lead > group_id.wrapping_sub(CHUNK_PREFIX as i32) as u32 {
            return Ok(Chunk::END);
        }

        // Converted files put a gap sized by the lead byte before the size
        // byte, and their chunks carry a second copy of the prefix.
        let inflated = !matches!(self.header.version_tag, 0 | 1);
        let extra = if inflated { lead } else { 0 };
        reader.skip((extra as u64 + SIZE_SKIP) as i64)?;
        let read_val = reader.read_byte()? as u32;

        let mut size = read_val + CHUNK_PREFIX;
        if inflated {
            size += extra + read_val + CHUNK_PREFIX;
        }
        Ok(Chunk { size, emit })
    }
}
