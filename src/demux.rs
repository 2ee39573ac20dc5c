//! Demuxer front end: probing, stream description and packets.

use std::io::{Read, Seek};
use std::path::Path;

use crate::error::Result;
use crate::header::{ContainerHeader, Variant, HEADER_LEN};
use crate::reader::ByteReader;
use crate::record::RecordTime;
use crate::walker::GroupWalker;

pub const PROBE_SCORE_MAX: u32 = 100;

/// Probing needs at least this many bytes.
pub const PROBE_MIN_LEN: usize = 100;

pub const EXTENSION: &str = "hik";

/// Read size of [`PacketMode::Raw`] unless told otherwise.
pub const RAW_CHUNK_SIZE: usize = 1024;

/// Score how likely `buf`, the start of a file, is a Hikvision recording.
pub fn probe(buf: &[u8]) -> u32 {
    if buf.len() < PROBE_MIN_LEN {
        return 0;
    }
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&buf[..4]);
    match Variant::from_magic(magic) {
        Some(_) => PROBE_SCORE_MAX,
        None => 0,
    }
}

pub fn has_hik_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(EXTENSION))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Annex B byte stream.
    H264,
}

/// The single video stream of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub codec: Codec,
    pub time_base_num: u32,
    pub time_base_den: u32,
    pub pts_wrap_bits: u32,
    pub width: u32,
    pub height: u32,
    /// Packet boundaries do not line up with access units, so a consumer
    /// has to parse the whole stream.
    pub need_full_parsing: bool,
}

/// How packet boundaries are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacketMode {
    /// One packet per payload span found by the [`GroupWalker`].
    #[default]
    Walker,
    /// Fixed size reads straight through the file after its header.
    Raw { chunk_size: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Offset of the packet data in the file.
    pub offset: u64,
    pub data: Vec<u8>,
    pub record_time: Option<RecordTime>,
}

/// Reads the H264 stream out of one recording.
pub struct HikDemuxer<R> {
    reader: R,
    header: ContainerHeader,
    walker: GroupWalker,
    mode: PacketMode,
    raw_position: u64,
}

impl<R: Read + Seek> HikDemuxer<R> {
    /// Open a recording, walking its records for packets.
    pub fn open(reader: R) -> Result<Self> {
        Self::with_mode(reader, PacketMode::default())
    }

    pub fn with_mode(mut reader: R, mode: PacketMode) -> Result<Self> {
        let header = ContainerHeader::read(&mut reader)?;
        let walker = GroupWalker::start(&mut reader, &header)?;
        tracing::info!(
            variant = ?header.variant,
            ?mode,
            resolution = %header.resolution,
            "opened recording"
        );
        Ok(HikDemuxer {
            reader,
            header,
            walker,
            mode,
            raw_position: HEADER_LEN,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn walker(&self) -> &GroupWalker {
        &self.walker
    }

    /// Describe the video stream with the latest known resolution.
    pub fn stream_info(&self) -> StreamInfo {
        let resolution = self.walker.resolution();
        StreamInfo {
            codec: Codec::H264,
            time_base_num: 1,
            time_base_den: 1_200_000,
            pts_wrap_bits: 64,
            width: resolution.width,
            height: resolution.height,
            need_full_parsing: true,
        }
    }

    /// Read the next packet, or `None` at the end of the stream.
    pub fn read_packet(&mut self) -> Result<Option<Packet>> {
        match self.mode {
            PacketMode::Walker => self.read_walker_packet(),
            PacketMode::Raw { chunk_size } => self.read_raw_packet(chunk_size),
        }
    }

    fn read_walker_packet(&mut self) -> Result<Option<Packet>> {
        let span = match self.walker.next_span(&mut self.reader)? {
            Some(span) => span,
            None => return Ok(None),
        };
        let data = self.read_at(span.offset, span.length as usize)?;
        if data.len() < span.length as usize {
            tracing::warn!(
                offset = span.offset,
                expected = span.length,
                got = data.len(),
                "payload cut short by end of file"
            );
        }
        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(Packet {
            offset: span.offset,
            data,
            record_time: span.record_time,
        }))
    }

    fn read_raw_packet(&mut self, chunk_size: usize) -> Result<Option<Packet>> {
        let offset = self.raw_position;
        let data = self.read_at(offset, chunk_size)?;
        if data.is_empty() {
            return Ok(None);
        }
        self.raw_position += data.len() as u64;
        Ok(Some(Packet {
            offset,
            data,
            record_time: None,
        }))
    }

    /// Read up to `len` bytes at `offset`. The buffer grows with what the
    /// stream actually holds, so `len` may be far past the end of the file.
    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.reader.seek_to(offset)?;
        let mut data = Vec::new();
        (&mut self.reader).take(len as u64).read_to_end(&mut data)?;
        Ok(data)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read + Seek> Iterator for HikDemuxer<R> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_packet().transpose()
    }
}
