//! AAC audio parsing
//!
//! FLV/RTMP carry AAC raw (without ADTS headers); MPEG-TS carries it with a
//! 7-byte ADTS header in front of every access unit.
//!
//! AAC Audio Packet Structure (FLV audio tag body):
//! ```text
//! +----------+----------+----------+----------+---------+
//! |SoundFormat|SoundRate|SoundSize |SoundType | AACType | AACData
//! | (4 bits)  | (2 bits)| (1 bit)  | (1 bit)  | (1 byte)|
//! +----------+----------+----------+----------+---------+
//! ```
//!
//! AACPacketType:
//! - 0: AAC sequence header (AudioSpecificConfig)
//! - 1: AAC raw frame data

use bytes::{Buf, Bytes};

use crate::error::{MediaError, Result};

/// Length of an ADTS header without CRC
pub const ADTS_HEADER_LEN: usize = 7;

/// AAC packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacPacketType {
    /// Sequence header (AudioSpecificConfig)
    SequenceHeader = 0,
    /// Raw AAC frame data
    Raw = 1,
}

impl AacPacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AacPacketType::SequenceHeader),
            1 => Some(AacPacketType::Raw),
            _ => None,
        }
    }
}

/// AudioSpecificConfig (from sequence header)
#[derive(Debug, Clone)]
pub struct AudioSpecificConfig {
    /// Audio object type (profile)
    pub audio_object_type: u8,
    /// Sampling frequency index
    pub sampling_frequency_index: u8,
    /// Sampling frequency in Hz
    pub sampling_frequency: u32,
    /// Channel configuration (1=mono, 2=stereo, etc.)
    pub channel_configuration: u8,
    /// Frame length flag (960 or 1024 samples)
    pub frame_length_flag: bool,
}

impl AudioSpecificConfig {
    /// Standard sampling frequencies by index
    const SAMPLING_FREQUENCIES: [u32; 16] = [
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350, 0,
        0, 0,
    ];

    /// Parse from AAC sequence header data
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(MediaError::InvalidAacPacket.into());
        }

        // audioObjectType: 5 bits
        // samplingFrequencyIndex: 4 bits
        // if (samplingFrequencyIndex == 0xf) samplingFrequency: 24 bits
        // channelConfiguration: 4 bits
        let b0 = data[0];
        let b1 = data[1];

        let audio_object_type = (b0 >> 3) & 0x1F;
        let sampling_frequency_index = ((b0 & 0x07) << 1) | ((b1 >> 7) & 0x01);

        if sampling_frequency_index == 0x0F {
            // Explicit frequencies cannot be expressed in ADTS
            return Err(MediaError::InvalidAacPacket.into());
        }
        let sampling_frequency = Self::SAMPLING_FREQUENCIES[sampling_frequency_index as usize];
        if sampling_frequency == 0 {
            return Err(MediaError::InvalidAacPacket.into());
        }

        let channel_configuration = (b1 >> 3) & 0x0F;
        let frame_length_flag = (b1 & 0x04) != 0;

        Ok(AudioSpecificConfig {
            audio_object_type,
            sampling_frequency_index,
            sampling_frequency,
            channel_configuration,
            frame_length_flag,
        })
    }

    /// Build the ADTS header for a raw access unit of `frame_length` bytes
    pub fn to_adts(&self, frame_length: usize) -> [u8; ADTS_HEADER_LEN] {
        let profile = self.audio_object_type.saturating_sub(1); // ADTS uses profile - 1
        let freq_idx = self.sampling_frequency_index;
        let channels = self.channel_configuration;

        // Length field covers the header too
        let frame_len = frame_length + ADTS_HEADER_LEN;

        let mut header = [0u8; ADTS_HEADER_LEN];

        // Syncword (12 bits) + ID (1 bit) + Layer (2 bits) + Protection absent (1 bit)
        header[0] = 0xFF;
        header[1] = 0xF1;

        // Profile (2 bits) + Freq (4 bits) + Private (1 bit) + Channels (1 bit)
        header[2] = ((profile & 0x03) << 6) | ((freq_idx & 0x0F) << 2) | ((channels >> 2) & 0x01);

        // Channels (2 bits) + Original + Home + Copyright bit + start (2 bits) + Length (2 bits)
        header[3] = ((channels & 0x03) << 6) | ((frame_len >> 11) & 0x03) as u8;

        // Length (8 bits)
        header[4] = ((frame_len >> 3) & 0xFF) as u8;

        // Length (3 bits) + Buffer fullness (5 bits)
        header[5] = (((frame_len & 0x07) << 5) | 0x1F) as u8;

        // Buffer fullness (6 bits) + Number of raw data blocks - 1 (2 bits)
        header[6] = 0xFC;

        header
    }
}

/// Parsed AAC data
#[derive(Debug, Clone)]
pub enum AacData {
    /// Sequence header (AudioSpecificConfig)
    SequenceHeader(AudioSpecificConfig),

    /// Raw AAC frame (without ADTS header)
    Frame(Bytes),
}

impl AacData {
    /// Parse from an FLV audio tag body (after the sound format byte)
    pub fn parse(mut data: Bytes) -> Result<Self> {
        if data.is_empty() {
            return Err(MediaError::InvalidAacPacket.into());
        }

        let packet_type = data.get_u8();

        match AacPacketType::from_byte(packet_type) {
            Some(AacPacketType::SequenceHeader) => {
                Ok(AacData::SequenceHeader(AudioSpecificConfig::parse(&data)?))
            }
            Some(AacPacketType::Raw) => Ok(AacData::Frame(data)),
            None => Err(MediaError::InvalidAacPacket.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lc_44k_stereo() -> AudioSpecificConfig {
        AudioSpecificConfig::parse(&[0x12, 0x10]).unwrap()
    }

    #[test]
    fn test_audio_specific_config_parse() {
        // AAC-LC, 44100 Hz, Stereo
        let config = lc_44k_stereo();
        assert_eq!(config.audio_object_type, 2);
        assert_eq!(config.sampling_frequency_index, 4);
        assert_eq!(config.sampling_frequency, 44100);
        assert_eq!(config.channel_configuration, 2);
        assert!(!config.frame_length_flag);
    }

    #[test]
    fn test_audio_specific_config_various_rates() {
        // b0 = (obj << 3) | (freq_idx >> 1), b1 = ((freq_idx & 1) << 7) | (ch << 3)
        let test_cases = [
            (&[0x12, 0x10][..], 44100, 2),
            (&[0x11, 0x90][..], 48000, 2),
            (&[0x11, 0x88][..], 48000, 1),
        ];

        for (data, expected_freq, expected_channels) in test_cases {
            let config = AudioSpecificConfig::parse(data).unwrap();
            assert_eq!(config.sampling_frequency, expected_freq);
            assert_eq!(config.channel_configuration, expected_channels);
        }
    }

    #[test]
    fn test_audio_specific_config_rejects_short_and_explicit_rate() {
        assert!(AudioSpecificConfig::parse(&[0x12]).is_err());
        // freq index 0xF (explicit 24-bit frequency)
        assert!(AudioSpecificConfig::parse(&[0x17, 0x80, 0x00, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_adts_header() {
        let header = lc_44k_stereo().to_adts(100);

        assert_eq!(header[0], 0xFF);
        assert_eq!(header[1], 0xF1);
        // profile 1 (LC - 1), freq index 4, channel high bit 0
        assert_eq!(header[2], 0x50);
        // frame length = 107 split across bytes 3..6
        let frame_len = (((header[3] & 0x03) as usize) << 11)
            | ((header[4] as usize) << 3)
            | ((header[5] as usize) >> 5);
        assert_eq!(frame_len, 107);
        assert_eq!(header[6], 0xFC);
    }

    #[test]
    fn test_adts_header_large_frame() {
        let header = lc_44k_stereo().to_adts(1024);
        let frame_len = (((header[3] & 0x03) as usize) << 11)
            | ((header[4] as usize) << 3)
            | ((header[5] as usize) >> 5);
        assert_eq!(frame_len, 1031);
        assert_eq!(header[3] >> 6, 2); // stereo
    }

    #[test]
    fn test_aac_data_sequence_header() {
        let data = Bytes::from_static(&[0x00, 0x12, 0x10]);
        match AacData::parse(data).unwrap() {
            AacData::SequenceHeader(config) => assert_eq!(config.sampling_frequency, 44100),
            other => panic!("Expected SequenceHeader, got {:?}", other),
        }
    }

    #[test]
    fn test_aac_data_raw_frame() {
        let data = Bytes::from_static(&[0x01, 0x21, 0x00, 0x49, 0x90, 0x02]);
        match AacData::parse(data).unwrap() {
            AacData::Frame(raw) => assert_eq!(raw.len(), 5),
            other => panic!("Expected Frame, got {:?}", other),
        }
    }

    #[test]
    fn test_aac_data_invalid() {
        assert!(AacData::parse(Bytes::from_static(&[0x02, 0x00])).is_err());
        assert!(AacData::parse(Bytes::new()).is_err());
        assert_eq!(AacPacketType::from_byte(1), Some(AacPacketType::Raw));
    }
}
