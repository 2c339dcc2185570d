//! Elementary stream formats
//!
//! This module provides:
//! - Annex-B start-code splitting
//! - AVCC frame headers and length-prefixed NALUs
//! - H.264/AVC and H.265/HEVC NALU classification and decoder config records
//! - AAC AudioSpecificConfig parsing and ADTS headers
//! - FLV tag encoding

pub mod aac;
pub mod annexb;
pub mod avcc;
pub mod flv;
pub mod h264;
pub mod hevc;

pub use aac::{AacData, AudioSpecificConfig};
pub use avcc::AvccHeader;
pub use flv::{FlvTag, FlvTagType, VideoCodec, VideoFrameType};
pub use h264::AvcConfig;
pub use hevc::HevcConfig;
