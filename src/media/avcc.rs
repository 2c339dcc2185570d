//! AVCC framing
//!
//! An AVCC video frame as carried in an FLV video tag body:
//! ```text
//! +-----------+----------+----------------+-----------------+---------------------+
//! | FrameType | CodecID  | AVCPacketType  | CompositionTime | { len | NALU }*     |
//! | (4 bits)  | (4 bits) | (1 byte)       | (3 bytes, SI24) | len is 1-4 bytes BE |
//! +-----------+----------+----------------+-----------------+---------------------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::MediaError;

use super::flv::{VideoCodec, VideoFrameType};

/// Length of the frame header preceding the NALUs
pub const HEADER_LEN: usize = 5;

/// Parsed 5-byte AVCC frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvccHeader {
    /// Frame type nibble
    pub frame_type: Option<VideoFrameType>,
    /// Raw codec id nibble
    pub codec_id: u8,
    /// AVC packet type (0 = sequence header, 1 = NALUs)
    pub packet_type: u8,
    /// Composition time offset in milliseconds
    pub composition_time: i32,
}

impl AvccHeader {
    /// Parse the header, `None` if fewer than 5 bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_LEN {
            return None;
        }

        let composition_time =
            ((data[2] as i32) << 16) | ((data[3] as i32) << 8) | (data[4] as i32);
        // Sign extend from 24 bits
        let composition_time = if composition_time & 0x800000 != 0 {
            composition_time | !0xFFFFFF
        } else {
            composition_time
        };

        Some(Self {
            frame_type: VideoFrameType::from_byte(data[0]),
            codec_id: data[0] & 0x0F,
            packet_type: data[1],
            composition_time,
        })
    }

    pub fn codec(&self) -> Option<VideoCodec> {
        VideoCodec::from_byte(self.codec_id)
    }

    pub fn is_keyframe(&self) -> bool {
        self.frame_type.map(|t| t.is_keyframe()).unwrap_or(false)
    }

    pub fn is_sequence_header(&self) -> bool {
        self.packet_type == 0
    }
}

/// Walk the length-prefixed NALUs of `payload`, handing each one to `f`.
///
/// NALUs are zero-copy slices of `payload`. Stops at the first NALU whose
/// declared length runs past the buffer and reports it; NALUs already
/// handed out stay with the caller.
pub fn split_nalus(
    payload: &Bytes,
    length_size: usize,
    mut f: impl FnMut(Bytes),
) -> Result<(), MediaError> {
    let mut offset = 0;
    while payload.len() - offset > length_size {
        let len = payload[offset..offset + length_size]
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | b as usize);
        let end = length_size + len;
        let remaining = payload.len() - offset;
        if remaining < end {
            return Err(MediaError::NaluOverflow {
                declared: end,
                remaining,
            });
        }
        f(payload.slice(offset + length_size..offset + end));
        offset += end;
    }
    Ok(())
}

/// Encode the 5-byte frame header
pub fn put_header(buf: &mut BytesMut, codec_id: u8, keyframe: bool, composition_time: u32) {
    let frame_type = if keyframe { 0x10 } else { 0x20 };
    buf.put_u8(codec_id | frame_type);
    buf.put_u8(0);
    buf.put_uint(u64::from(composition_time & 0xFF_FFFF), 3);
}

/// Encode NALUs with 4-byte big-endian length prefixes
pub fn put_nalus<'a>(buf: &mut BytesMut, nalus: impl IntoIterator<Item = &'a Bytes>) {
    for nalu in nalus {
        buf.put_u32(nalu.len() as u32);
        buf.put_slice(nalu);
    }
}
