//! FLV tag encoding
//!
//! The container-tag form of a frame is a complete FLV tag, ready to be
//! appended to an FLV byte stream after the file header:
//! ```text
//! +--------+-------------+-----------+-------------+---------+------------------+
//! | Type(1)| DataSize(3) | TS(3+1)   | StreamID(3) | Data(N) | PrevTagSize(4)   |
//! +--------+-------------+-----------+-------------+---------+------------------+
//! ```
//!
//! Video tag bodies start with:
//! ```text
//! +----------+----------+
//! | FrameType| CodecID  | CodecData...
//! | (4 bits) | (4 bits) |
//! +----------+----------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Size of the tag header preceding the body
pub const TAG_HEADER_SIZE: usize = 11;

/// FLV tag type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    Audio,
    Video,
    Script,
}

impl FlvTagType {
    pub fn as_byte(&self) -> u8 {
        match self {
            FlvTagType::Audio => 8,
            FlvTagType::Video => 9,
            FlvTagType::Script => 18,
        }
    }
}

/// FLV tag
#[derive(Debug, Clone)]
pub struct FlvTag {
    /// Tag type
    pub tag_type: FlvTagType,
    /// Timestamp in milliseconds
    pub timestamp: u32,
    /// Tag body (including codec headers)
    pub data: Bytes,
}

/// Video frame type (upper 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    /// Keyframe (for AVC, a seekable frame)
    Keyframe = 1,
    /// Inter frame (for AVC, a non-seekable frame)
    InterFrame = 2,
    /// Disposable inter frame (H.263 only)
    DisposableInterFrame = 3,
    /// Generated keyframe (reserved for server use)
    GeneratedKeyframe = 4,
    /// Video info/command frame
    VideoInfoFrame = 5,
}

impl VideoFrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            1 => Some(VideoFrameType::Keyframe),
            2 => Some(VideoFrameType::InterFrame),
            3 => Some(VideoFrameType::DisposableInterFrame),
            4 => Some(VideoFrameType::GeneratedKeyframe),
            5 => Some(VideoFrameType::VideoInfoFrame),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(
            self,
            VideoFrameType::Keyframe | VideoFrameType::GeneratedKeyframe
        )
    }
}

/// Video codec ID (lower 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// AVC (H.264)
    Avc = 7,
    /// HEVC (H.265) - enhanced RTMP extension
    Hevc = 12,
}

impl VideoCodec {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x0F {
            7 => Some(VideoCodec::Avc),
            12 => Some(VideoCodec::Hevc),
            _ => None,
        }
    }

    pub fn id(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            VideoCodec::Avc => "h264",
            VideoCodec::Hevc => "h265",
        }
    }
}

/// AAC sound format byte: AAC, 44 kHz, 16-bit, stereo (always 0xAF for AAC in FLV)
pub const AAC_SOUND_FORMAT: u8 = 0xAF;

impl FlvTag {
    /// Create a new video tag
    pub fn video(timestamp: u32, data: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Video,
            timestamp,
            data,
        }
    }

    /// Create a new audio tag
    pub fn audio(timestamp: u32, data: Bytes) -> Self {
        Self {
            tag_type: FlvTagType::Audio,
            timestamp,
            data,
        }
    }

    /// Serialize header, body and trailing PreviousTagSize
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(TAG_HEADER_SIZE + self.data.len() + 4);
        buf.put_u8(self.tag_type.as_byte());
        buf.put_uint(self.data.len() as u64, 3);
        buf.put_uint(u64::from(self.timestamp & 0xFF_FFFF), 3);
        buf.put_u8((self.timestamp >> 24) as u8);
        buf.put_uint(0, 3);
        buf.put_slice(&self.data);
        buf.put_u32((TAG_HEADER_SIZE + self.data.len()) as u32);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_frame_type() {
        assert_eq!(
            VideoFrameType::from_byte(0x17),
            Some(VideoFrameType::Keyframe)
        );
        assert_eq!(
            VideoFrameType::from_byte(0x27),
            Some(VideoFrameType::InterFrame)
        );
        assert_eq!(VideoFrameType::from_byte(0x00), None);
        assert!(VideoFrameType::GeneratedKeyframe.is_keyframe());
        assert!(!VideoFrameType::DisposableInterFrame.is_keyframe());
    }

    #[test]
    fn test_video_codec() {
        assert_eq!(VideoCodec::from_byte(0x17), Some(VideoCodec::Avc));
        assert_eq!(VideoCodec::from_byte(0x1C), Some(VideoCodec::Hevc));
        assert_eq!(VideoCodec::from_byte(0x12), None);
        assert_eq!(VideoCodec::Hevc.id(), 12);
        assert_eq!(VideoCodec::Avc.name(), "h264");
    }

    #[test]
    fn test_encode_video_tag() {
        let tag = FlvTag::video(0x0102_0304, Bytes::from_static(&[0x17, 0x01, 0xAA]));
        let bytes = tag.encode();

        assert_eq!(bytes.len(), TAG_HEADER_SIZE + 3 + 4);
        assert_eq!(bytes[0], 9);
        assert_eq!(&bytes[1..4], &[0x00, 0x00, 0x03]);
        // Lower 24 bits then the extended byte
        assert_eq!(&bytes[4..8], &[0x02, 0x03, 0x04, 0x01]);
        assert_eq!(&bytes[8..11], &[0x00, 0x00, 0x00]);
        assert_eq!(&bytes[11..14], &[0x17, 0x01, 0xAA]);
        assert_eq!(&bytes[14..], &[0x00, 0x00, 0x00, 14]);
    }

    #[test]
    fn test_encode_audio_tag() {
        let tag = FlvTag::audio(40, Bytes::from_static(&[0xAF, 0x01]));
        let bytes = tag.encode();
        assert_eq!(bytes[0], 8);
        assert_eq!(&bytes[1..4], &[0x00, 0x00, 0x02]);
        assert_eq!(&bytes[4..7], &[0x00, 0x00, 40]);
    }
}
