//! Hikvision DVR recordings: parse the container and pull out the raw H264
//! video stream.
//!
//! Recordings start with a 40 byte header whose magic tells the two variants
//! apart (`4HKH` straight off the recorder, `IMKH` after conversion). The
//! rest of the file is a sequence of group and block records interleaved
//! with video payload. [`GroupWalker`] steps through those records and
//! [`HikDemuxer`] turns what it finds into packets.
//!
//! ```no_run
//! let f = std::fs::File::open("ch01.hik")?;
//! let mut demuxer = hikvision::HikDemuxer::open(std::io::BufReader::new(f))?;
//! while let Some(packet) = demuxer.read_packet()? {
//!     println!("{} bytes at {:#x}", packet.data.len(), packet.offset);
//! }
//! # Ok::<(), hikvision::Error>(())
//! ```

pub mod demux;
pub mod error;
pub mod header;
pub mod reader;
pub mod record;
pub mod resolution;
pub mod scan;
pub mod walker;

pub use demux::{probe, HikDemuxer, Packet, PacketMode, StreamInfo};
pub use error::{Error, Result};
pub use header::{ContainerHeader, MediaInfo, Variant};
pub use record::{BlockHeader, GroupHeader, RecordTime};
pub use resolution::Resolution;
pub use walker::{GroupWalker, PayloadSpan, WalkState};
