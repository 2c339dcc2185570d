//! H.265/HEVC parsing
//!
//! HEVC NAL unit headers are two bytes; the type sits in bits 1..7 of the
//! first byte. Parameter sets come as VPS/SPS/PPS.
//!
//! HEVCDecoderConfigurationRecord:
//! ```text
//! 21 bytes of profile/tier/level/format fields
//! | lengthSizeMinusOne (byte 21, lower 2 bits)
//! | numOfArrays (1)
//! | { array_completeness|NAL_unit_type (1) | numNalus (2) | { nalUnitLength (2) | nalUnit }* }*
//! ```

use bytes::{Buf, Bytes};

use crate::error::{MediaError, Result};

/// Access unit delimiter NALU in Annex-B form
pub const AUD_NALU: [u8; 7] = [0x00, 0x00, 0x00, 0x01, 0x46, 0x01, 0x50];

/// HEVC NAL unit type (the subset this crate acts on)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    /// Trailing/leading picture slices (types 0..=15)
    Slice(u8),
    /// BLA picture (16..=18)
    Bla(u8),
    /// IDR picture with leading pictures
    IdrWRadl,
    /// IDR picture without leading pictures
    IdrNLp,
    /// Clean random access picture
    Cra,
    /// Video parameter set
    Vps,
    /// Sequence parameter set
    Sps,
    /// Picture parameter set
    Pps,
    /// Access unit delimiter
    Aud,
    /// Prefix/suffix SEI
    Sei,
    /// Anything else
    Other(u8),
}

impl NaluType {
    pub fn from_byte(b: u8) -> Self {
        match (b >> 1) & 0x3F {
            t @ 0..=15 => NaluType::Slice(t),
            t @ 16..=18 => NaluType::Bla(t),
            19 => NaluType::IdrWRadl,
            20 => NaluType::IdrNLp,
            21 => NaluType::Cra,
            32 => NaluType::Vps,
            33 => NaluType::Sps,
            34 => NaluType::Pps,
            35 => NaluType::Aud,
            39 | 40 => NaluType::Sei,
            t => NaluType::Other(t),
        }
    }

    /// Classify a NALU by its header byte
    pub fn of(nalu: &[u8]) -> Option<Self> {
        nalu.first().map(|&b| Self::from_byte(b))
    }

    /// IRAP pictures (BLA, IDR, CRA) are decodable without earlier frames
    pub fn is_keyframe(&self) -> bool {
        matches!(
            self,
            NaluType::Bla(_) | NaluType::IdrWRadl | NaluType::IdrNLp | NaluType::Cra
        )
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NaluType::Vps | NaluType::Sps | NaluType::Pps)
    }
}

/// HEVC decoder configuration (from sequence header)
#[derive(Debug, Clone)]
pub struct HevcConfig {
    /// general_profile_idc
    pub profile: u8,
    /// general_level_idc
    pub level: u8,
    /// NALU length prefix width in bytes (usually 4)
    pub nalu_length_size: u8,
    /// Video Parameter Sets
    pub vps: Vec<Bytes>,
    /// Sequence Parameter Sets
    pub sps: Vec<Bytes>,
    /// Picture Parameter Sets
    pub pps: Vec<Bytes>,
}

impl HevcConfig {
    const FIXED_HEADER_LEN: usize = 23;

    /// Parse from HEVCDecoderConfigurationRecord
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.len() < Self::FIXED_HEADER_LEN || data[0] != 1 {
            return Err(MediaError::InvalidHevcPacket.into());
        }

        let profile = data[1] & 0x1F;
        let level = data[12];
        let nalu_length_size = (data[21] & 0x03) + 1;
        let num_arrays = data[22] as usize;

        let mut rest = data.slice(Self::FIXED_HEADER_LEN..);
        let mut config = HevcConfig {
            profile,
            level,
            nalu_length_size,
            vps: Vec::new(),
            sps: Vec::new(),
            pps: Vec::new(),
        };

        for _ in 0..num_arrays {
            if rest.len() < 3 {
                return Err(MediaError::InvalidHevcPacket.into());
            }
            let nalu_type = rest.get_u8() & 0x3F;
            let count = rest.get_u16() as usize;
            for _ in 0..count {
                if rest.len() < 2 {
                    return Err(MediaError::InvalidHevcPacket.into());
                }
                let len = rest.get_u16() as usize;
                if rest.len() < len {
                    return Err(MediaError::InvalidHevcPacket.into());
                }
                let nalu = rest.split_to(len);
                match nalu_type {
                    32 => config.vps.push(nalu),
                    33 => config.sps.push(nalu),
                    34 => config.pps.push(nalu),
                    _ => {}
                }
            }
        }

        Ok(config)
    }
}
