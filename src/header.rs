//! File header and media info block.
//!
//! Two variants share a 40 byte file header, told apart by the magic.
//! `4HKH` recordings come straight off the recorder. `IMKH` files went
//! through the vendor's converter, which overlays a media description block
//! on the same bytes.

use crate::error::{Error, Result};
use crate::reader::{decode_fields, ByteReader, Field, Width};
use crate::resolution::Resolution;

pub const ORIGINAL_MAGIC: [u8; 4] = *b"4HKH";
pub const CONVERTED_MAGIC: [u8; 4] = *b"IMKH";

/// Size of the file header. Group data starts right after it.
pub const HEADER_LEN: u64 = 40;

/// Signature version of recorders that store the picture size per group.
pub const RESOLUTION_OVERRIDE_SIGNATURE: u32 = 0x2002_0302;

/// Container variant, selected by the magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Original,
    Converted,
}

impl Variant {
    pub fn from_magic(magic: [u8; 4]) -> Option<Self> {
        match magic {
            ORIGINAL_MAGIC => Some(Variant::Original),
            CONVERTED_MAGIC => Some(Variant::Converted),
            _ => None,
        }
    }

    pub fn magic(self) -> [u8; 4] {
        match self {
            Variant::Original => ORIGINAL_MAGIC,
            Variant::Converted => CONVERTED_MAGIC,
        }
    }

    pub fn version_tag(self) -> u32 {
        match self {
            Variant::Original => 1,
            Variant::Converted => 3,
        }
    }
}

/// Media description of converted files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaInfo {
    /// Always 1 in files we know how to read.
    pub marker: u16,
    pub video_format: u16,
    pub audio_format: u16,
    pub audio_channels: u8,
    pub audio_bits_per_sample: u8,
    pub audio_sample_rate: u32,
    pub audio_bitrate: u32,
}

const MEDIA_INFO_MARKER: &[Field<MediaInfo>] = &[Field {
    name: "marker",
    offset: 8,
    width: Width::U16,
    set: |m, v| m.marker = v as u16,
}];

const MEDIA_INFO_FIELDS: &[Field<MediaInfo>] = &[
    Field {
        name: "video_format",
        offset: 10,
        width: Width::U16,
        set: |m, v| m.video_format = v as u16,
    },
    Field {
        name: "audio_format",
        offset: 12,
        width: Width::U16,
        set: |m, v| m.audio_format = v as u16,
    },
    Field {
        name: "audio_channels",
        offset: 14,
        width: Width::U8,
        set: |m, v| m.audio_channels = v as u8,
    },
    Field {
        name: "audio_bits_per_sample",
        offset: 15,
        width: Width::U8,
        set: |m, v| m.audio_bits_per_sample = v as u8,
    },
    Field {
        name: "audio_sample_rate",
        offset: 16,
        width: Width::U32,
        set: |m, v| m.audio_sample_rate = v,
    },
    Field {
        name: "audio_bitrate",
        offset: 20,
        width: Width::U32,
        set: |m, v| m.audio_bitrate = v,
    },
];

/// Recorder metadata at fixed offsets of the file header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderFields {
    /// Signature version of the recorder firmware.
    pub field_8: u32,
    /// Raw picture height, used when a group overrides the resolution.
    pub field_18: u16,
    pub field_20: u16,
    pub field_22: u16,
    pub field_24: u32,
    /// Packed resolution: low half is the code, high half the raw height.
    pub field_28: u32,
    pub field_32: u32,
}

const HEADER_FIELDS: &[Field<HeaderFields>] = &[
    Field {
        name: "field_8",
        offset: 8,
        width: Width::U32,
        set: |h, v| h.field_8 = v,
    },
    Field {
        name: "field_18",
        offset: 18,
        width: Width::U16,
        set: |h, v| h.field_18 = v as u16,
    },
    Field {
        name: "field_20",
        offset: 20,
        width: Width::U16,
        set: |h, v| h.field_20 = v as u16,
    },
    Field {
        name: "field_22",
        offset: 22,
        width: Width::U16,
        set: |h, v| h.field_22 = v as u16,
    },
    Field {
        name: "field_24",
        offset: 24,
        width: Width::U32,
        set: |h, v| h.field_24 = v,
    },
    Field {
        name: "field_28",
        offset: 28,
        width: Width::U32,
        set: |h, v| h.field_28 = v,
    },
    Field {
        name: "field_32",
        offset: 32,
        width: Width::U32,
        set: |h, v| h.field_32 = v,
    },
];

/// Decoded file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub magic: [u8; 4],
    pub variant: Variant,
    /// 1 for original recordings, 3 for converted files.
    pub version_tag: u32,
    pub fields: HeaderFields,
    pub media_info: Option<MediaInfo>,
    pub resolution: Resolution,
}

impl ContainerHeader {
    /// Read the magic and the whole file header from the start of `reader`.
    pub fn read<R: ByteReader + ?Sized>(reader: &mut R) -> Result<Self> {
        let magic = read_magic(reader)?;
        parse_container_header(reader, magic)
    }

    pub fn signature_version(&self) -> u32 {
        self.fields.field_8
    }

    pub fn resolution_code(&self) -> u32 {
        self.fields.field_28
    }

    /// Whether groups carry their own resolution code.
    pub fn overrides_resolution(&self) -> bool {
        self.signature_version() == RESOLUTION_OVERRIDE_SIGNATURE
    }
}

/// Read the four signature bytes at the start of the stream.
pub fn read_magic<R: ByteReader + ?Sized>(reader: &mut R) -> Result<[u8; 4]> {
    reader.seek_to(0)?;
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    Ok(magic)
}

/// Parse the media info block of a converted file.
///
/// The marker is the only self-check this block has. Nothing past it is
/// read unless it equals 1.
pub fn parse_media_info<R: ByteReader + ?Sized>(reader: &mut R) -> Result<MediaInfo> {
    let mut info = MediaInfo::default();
    decode_fields(reader, 0, MEDIA_INFO_MARKER, &mut info)?;
    if info.marker != 1 {
        tracing::error!("media info marker is {:#06x}, expected 1", info.marker);
        return Err(Error::invalid_data(format!(
            "media info marker {:#06x} != 1",
            info.marker
        )));
    }
    decode_fields(reader, 0, MEDIA_INFO_FIELDS, &mut info)?;
    tracing::info!(
        video_format = format_args!("{:#06x}", info.video_format),
        audio_format = format_args!("{:#06x}", info.audio_format),
        audio_channels = info.audio_channels,
        audio_bits_per_sample = info.audio_bits_per_sample,
        audio_sample_rate = info.audio_sample_rate,
        audio_bitrate = info.audio_bitrate,
        "media info"
    );
    Ok(info)
}

/// Parse the file header once `magic` has been read.
///
/// Converted files have their media info parsed before any header field.
pub fn parse_container_header<R: ByteReader + ?Sized>(
    reader: &mut R,
    magic: [u8; 4],
) -> Result<ContainerHeader> {
    let variant = match Variant::from_magic(magic) {
        Some(variant) => variant,
        None => {
            tracing::error!("found unknown magic {:02x?}", magic);
            return Err(Error::invalid_data(format!("unknown magic {magic:02x?}")));
        }
    };

    let media_info = match variant {
        Variant::Original => {
            tracing::info!("file is an original recording");
            None
        }
        Variant::Converted => {
            tracing::info!("file is a converted file");
            Some(parse_media_info(reader)?)
        }
    };

    let mut fields = HeaderFields::default();
    decode_fields(reader, 0, HEADER_FIELDS, &mut fields)?;

    let version_tag = variant.version_tag();
    tracing::info!("Version: {}", version_tag);
    tracing::info!("Field_08: {:08X}", fields.field_8);
    tracing::info!("Field_18: {:04X}", fields.field_18);
    tracing::info!("Field_20: {:04X}", fields.field_20);
    tracing::info!("Field_22: {:04X}", fields.field_22);
    tracing::info!("Field_24: {:08X}", fields.field_24);
    tracing::info!("Field_28: {:08X}", fields.field_28);
    tracing::info!("Field_32: {:08X}", fields.field_32);

    let resolution = Resolution::from_code(fields.field_28);
    tracing::info!(
        code = format_args!("{:04X}", fields.field_28 & 0xFFFF),
        %resolution,
        "resolution"
    );

    Ok(ContainerHeader {
        magic,
        variant,
        version_tag,
        fields,
        media_info,
        resolution,
    })
}
