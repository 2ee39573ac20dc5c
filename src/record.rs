//! Group and block records.
//!
//! A group record opens a unit of recording and carries the packed
//! date/time word. Block records follow it; a block never carries its own
//! time and takes it from the group parsed before it.

use crate::error::{Error, Result};
use crate::header::ContainerHeader;
use crate::reader::{decode_fields, layout_len, ByteReader, Field, Width};
use crate::resolution::Resolution;

/// Base value of group type codes.
pub const GROUP_CODE_BASE: u32 = 0x1000;

/// Bytes a group record occupies in the stream.
pub const GROUP_RECORD_LEN: u32 = 0x30;

/// Wall clock time packed into a 32 bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordTime {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl RecordTime {
    /// Unpack `yyyyyy mmmm ddddd hhhhh iiiiii ssssss`, years counted from 2000.
    pub fn from_packed(v: u32) -> Self {
        RecordTime {
            year: (v >> 26) + 2000,
            month: (v >> 22) & 0xF,
            day: (v >> 17) & 0x1F,
            hour: (v >> 12) & 0x1F,
            minute: (v >> 6) & 0x3F,
            second: v & 0x3F,
        }
    }
}

impl std::fmt::Display for RecordTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Group record. Field names are byte offsets into the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupHeader {
    /// Stored with [`GROUP_CODE_BASE`] already subtracted.
    pub field_0: u32,
    pub field_4: u32,
    pub field_8: u32,
    /// Group type, 0x1000 or 0x1001.
    pub field_12: u32,
    /// Group subtype, 0x1000 to 0x1006.
    pub field_16: u32,
    /// Resolution code for recorders that store it per group.
    pub field_20: u32,
    pub field_24: u32,
    /// Packed date/time, see [`RecordTime::from_packed`].
    pub field_40: u32,
}

const GROUP_FIELDS: &[Field<GroupHeader>] = &[
    Field {
        name: "field_0",
        offset: 0,
        width: Width::U32,
        set: |g, v| g.field_0 = v.wrapping_sub(GROUP_CODE_BASE),
    },
    Field {
        name: "field_4",
        offset: 4,
        width: Width::U32,
        set: |g, v| g.field_4 = v,
    },
    Field {
        name: "field_8",
        offset: 8,
        width: Width::U32,
        set: |g, v| g.field_8 = v,
    },
    Field {
        name: "field_12",
        offset: 12,
        width: Width::U32,
        set: |g, v| g.field_12 = v,
    },
    Field {
        name: "field_16",
        offset: 16,
        width: Width::U32,
        set: |g, v| g.field_16 = v,
    },
    Field {
        name: "field_20",
        offset: 20,
        width: Width::U32,
        set: |g, v| g.field_20 = v,
    },
    Field {
        name: "field_24",
        offset: 24,
        width: Width::U32,
        set: |g, v| g.field_24 = v,
    },
    Field {
        name: "field_40",
        offset: 40,
        width: Width::U32,
        set: |g, v| g.field_40 = v,
    },
];

impl GroupHeader {
    pub fn is_valid(&self) -> bool {
        (self.field_12 == GROUP_CODE_BASE || self.field_12 == GROUP_CODE_BASE + 1)
            && self.field_16.wrapping_sub(GROUP_CODE_BASE) < 7
    }

    pub fn record_time(&self) -> RecordTime {
        RecordTime::from_packed(self.field_40)
    }
}

/// Parse the group record at the current stream position.
pub fn parse_group_header<R: ByteReader + ?Sized>(reader: &mut R) -> Result<GroupHeader> {
    let base = reader.tell()?;
    let mut group = GroupHeader::default();
    decode_fields(reader, base, GROUP_FIELDS, &mut group)?;

    if !group.is_valid() {
        tracing::warn!(
            offset = base,
            field_12 = format_args!("{:#x}", group.field_12),
            field_16 = format_args!("{:#x}", group.field_16),
            "rejecting group header"
        );
        return Err(Error::invalid_data(format!(
            "group header at {base}: field_12 {:#x}, field_16 {:#x}",
            group.field_12, group.field_16
        )));
    }

    tracing::debug!(offset = base, time = %group.record_time(), "group header");
    Ok(group)
}

/// Decoded block record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub comparator: u32,
    pub record_time: RecordTime,
    pub size_hint: u16,
    pub payload_flag: u16,
    /// Set when the group overrides the file's resolution.
    pub resolution: Option<Resolution>,
}

impl BlockHeader {
    pub fn has_payload(&self) -> bool {
        self.payload_flag >= 0x1000
    }
}

/// What [`parse_block_header`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    /// Comparator below the decoded range; nothing past it was read.
    Absent { comparator: u32 },
    Decoded(BlockHeader),
}

#[derive(Default)]
struct BlockTail {
    size_hint: u16,
    payload_flag: u16,
}

const BLOCK_TAIL_FIELDS: &[Field<BlockTail>] = &[
    Field {
        name: "size_hint",
        offset: 12,
        width: Width::U16,
        set: |b, v| b.size_hint = v as u16,
    },
    Field {
        name: "payload_flag",
        offset: 14,
        width: Width::U16,
        set: |b, v| b.payload_flag = v as u16,
    },
];

/// Bytes the decoded form of a block record occupies.
pub fn block_record_len() -> u64 {
    layout_len(BLOCK_TAIL_FIELDS)
}

/// Parse the block record at the current stream position.
///
/// `group` is the most recent group record; its date/time word and resolution
/// code are what the block carries.
pub fn parse_block_header<R: ByteReader + ?Sized>(
    reader: &mut R,
    group: Option<&GroupHeader>,
    header: &ContainerHeader,
) -> Result<Block> {
    let base = reader.tell()?;
    let comparator = reader.read_le32()?;

    match comparator {
        0..=0x1000 | 0x1003..=0x1004 => return Ok(Block::Absent { comparator }),
        0x1001..=0x1002 => {
            return Err(Error::unsupported(format!(
                "block header variant {comparator:#x} at {base}"
            )))
        }
        _ => {}
    }

    let group = group.ok_or_else(|| {
        Error::invalid_data(format!("block header at {base} without a group header"))
    })?;
    let record_time = group.record_time();

    let mut tail = BlockTail::default();
    decode_fields(reader, base, BLOCK_TAIL_FIELDS, &mut tail)?;

    let resolution = if header.overrides_resolution() {
        let packed = Resolution::pack(group.field_20 as u16, header.fields.field_18);
        let resolution = Resolution::from_code(packed);
        tracing::debug!(offset = base, %resolution, "group overrides resolution");
        Some(resolution)
    } else {
        None
    };

    let block = BlockHeader {
        comparator,
        record_time,
        size_hint: tail.size_hint,
        payload_flag: tail.payload_flag,
        resolution,
    };
    tracing::debug!(
        offset = base,
        time = %record_time,
        size_hint = block.size_hint,
        payload = block.has_payload(),
        "block header"
    );
    Ok(Block::Decoded(block))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::header::{HeaderFields, Variant, RESOLUTION_OVERRIDE_SIGNATURE};
    use std::io::Cursor;

    /// Build a group record image.
    pub(crate) fn group_bytes(field_12: u32, field_16: u32, field_20: u32, time: u32) -> Vec<u8> {
        let mut buf = vec![0u8; GROUP_RECORD_LEN as usize];
        buf[0..4].copy_from_slice(&0x1003u32.to_le_bytes());
        buf[12..16].copy_from_slice(&field_12.to_le_bytes());
        buf[16..20].copy_from_slice(&field_16.to_le_bytes());
        buf[20..24].copy_from_slice(&field_20.to_le_bytes());
        buf[40..44].copy_from_slice(&time.to_le_bytes());
        buf
    }

    /// Build the decoded form of a block record.
    pub(crate) fn block_bytes(comparator: u32, size_hint: u16, payload_flag: u16) -> Vec<u8> {
        let mut buf = vec![0u8; 16];
        buf[0..4].copy_from_slice(&comparator.to_le_bytes());
        buf[12..14].copy_from_slice(&size_hint.to_le_bytes());
        buf[14..16].copy_from_slice(&payload_flag.to_le_bytes());
        buf
    }

    fn header(field_8: u32) -> ContainerHeader {
        let fields = HeaderFields {
            field_8,
            field_18: 0x0240,
            ..Default::default()
        };
        ContainerHeader {
            magic: Variant::Original.magic(),
            variant: Variant::Original,
            version_tag: 1,
            fields,
            media_info: None,
            resolution: Resolution::new(352, 240),
        }
    }

    fn t(year: u32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> RecordTime {
        RecordTime {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    fn unpack(v: u32) -> RecordTime {
        RecordTime::from_packed(v)
    }

    #[test]
    fn test_record_time_vectors() {
        assert_eq!(unpack(0x7C20_0841), t(2031, 0, 16, 0, 33, 1));
        // bit 31
        assert_eq!(unpack(0x8000_0000), t(2032, 0, 0, 0, 0, 0));
        // bit 0
        assert_eq!(unpack(0x0000_0001), t(2000, 0, 0, 0, 0, 1));
        // lowest month bit, highest day bit
        assert_eq!(unpack(0x0040_0000), t(2000, 1, 0, 0, 0, 0));
        assert_eq!(unpack(0x0020_0000), t(2000, 0, 16, 0, 0, 0));
        assert_eq!(unpack(0x003F_FFFF), t(2000, 0, 31, 31, 63, 63));
        assert_eq!(unpack(0xFFFF_FFFF), t(2063, 15, 31, 31, 63, 63));
    }

    #[test]
    fn test_record_time_display() {
        assert_eq!(unpack(0x6162_DB5E).to_string(), "2024-05-17 13:45:30");
    }

    #[test]
    fn test_group_header_valid() {
        let bytes = group_bytes(0x1000, 0x1002, 0x1001, 0x6162_DB5E);
        let mut cur = Cursor::new(bytes);
        let group = parse_group_header(&mut cur).unwrap();
        assert_eq!(group.field_0, 3);
        assert_eq!(group.field_12, 0x1000);
        assert_eq!(group.field_16, 0x1002);
        assert_eq!(group.field_20, 0x1001);
        assert_eq!(group.record_time(), t(2024, 5, 17, 13, 45, 30));
        assert_eq!(cur.tell().unwrap(), 44);
    }

    #[test]
    fn test_group_header_subtype_out_of_range() {
        let bytes = group_bytes(0x1000, 0x1008, 0, 0);
        let err = parse_group_header(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));

        let bytes = group_bytes(0x1001, 0x1006, 0, 0);
        assert!(parse_group_header(&mut Cursor::new(bytes)).is_ok());
        let bytes = group_bytes(0x1001, 0x1007, 0, 0);
        assert!(parse_group_header(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_group_header_bad_type() {
        let bytes = group_bytes(0x1002, 0x1000, 0, 0);
        assert!(matches!(
            parse_group_header(&mut Cursor::new(bytes)),
            Err(Error::InvalidData(_))
        ));
        // Below the base wraps around and is rejected too.
        let bytes = group_bytes(0x1000, 0x0FFF, 0, 0);
        assert!(parse_group_header(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_block_absent_reads_only_comparator() {
        for comparator in [0, 0x1000, 0x1003, 0x1004] {
            let mut cur = Cursor::new(block_bytes(comparator, 0, 0));
            let block = parse_block_header(&mut cur, None, &header(0)).unwrap();
            assert_eq!(block, Block::Absent { comparator });
            assert_eq!(cur.tell().unwrap(), 4);
        }
    }

    #[test]
    fn test_block_unsupported_variant() {
        for comparator in [0x1001, 0x1002] {
            let group = GroupHeader::default();
            let err = parse_block_header(
                &mut Cursor::new(block_bytes(comparator, 0, 0)),
                Some(&group),
                &header(0),
            )
            .unwrap_err();
            assert!(matches!(err, Error::Unsupported(_)), "{comparator:#x}");
        }
    }

    #[test]
    fn test_block_decoded_takes_time_from_group() {
        let group = GroupHeader {
            field_40: 0x6162_DB5E,
            field_20: 0x1003,
            ..Default::default()
        };
        let mut cur = Cursor::new(block_bytes(0x1005, 0x0200, 0x1000));
        let block = match parse_block_header(&mut cur, Some(&group), &header(0)).unwrap() {
            Block::Decoded(block) => block,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(block.record_time, t(2024, 5, 17, 13, 45, 30));
        assert_eq!(block.size_hint, 0x0200);
        assert!(block.has_payload());
        assert_eq!(block.resolution, None);
        assert_eq!(cur.tell().unwrap(), block_record_len());
    }

    #[test]
    fn test_block_without_payload() {
        let group = GroupHeader::default();
        let mut cur = Cursor::new(block_bytes(0x2000, 0, 0x0FFF));
        match parse_block_header(&mut cur, Some(&group), &header(0)).unwrap() {
            Block::Decoded(block) => assert!(!block.has_payload()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_block_resolution_override() {
        let group = GroupHeader {
            field_20: 0x1008,
            ..Default::default()
        };
        let mut cur = Cursor::new(block_bytes(0x1005, 0, 0x1000));
        let hdr = header(RESOLUTION_OVERRIDE_SIGNATURE);
        match parse_block_header(&mut cur, Some(&group), &hdr).unwrap() {
            Block::Decoded(block) => {
                assert_eq!(block.resolution, Some(Resolution::new(528, 320)))
            }
            other => panic!("unexpected {other:?}"),
        }

        // Unknown code: raw width from the group, height from the file header.
        let group = GroupHeader {
            field_20: 0x0160,
            ..Default::default()
        };
        let mut cur = Cursor::new(block_bytes(0x1005, 0, 0x1000));
        match parse_block_header(&mut cur, Some(&group), &hdr).unwrap() {
            Block::Decoded(block) => {
                assert_eq!(block.resolution, Some(Resolution::new(0x0160, 0x0240)))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_block_needs_group() {
        let mut cur = Cursor::new(block_bytes(0x1005, 0, 0));
        let err = parse_block_header(&mut cur, None, &header(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }
}
