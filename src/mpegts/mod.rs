//! MPEG transport stream packetizing
//!
//! [`MemoryTs`] turns finalized frames into 188-byte TS packets held in
//! memory, one batch (e.g. one HLS segment) at a time. Each elementary
//! stream keeps its own [`PesFrame`] context so continuity counters survive
//! across batches.
//!
//! TS packet layout:
//! ```text
//! +------+---------------------+-----+------+---------------------+---------+
//! | 0x47 | TEI PUSI PRIO PID13 | TSC | AFC  | CC(4)               | ...     |
//! +------+---------------------+-----+------+---------------------+---------+
//!   1B          2B                 (1B)                           184B
//! ```

mod memory;
mod packet;
mod pes;

pub use memory::MemoryTs;
pub use pes::{PesFrame, PesHeader, PesPacket, START_CODE_PREFIX};

use crate::media::VideoCodec;

/// Size of a single TS packet
pub const TS_PACKET_SIZE: usize = 188;

/// Bytes after the 4-byte packet header
pub const TS_PAYLOAD_SIZE: usize = TS_PACKET_SIZE - 4;

/// Sync byte opening every packet
pub const SYNC_BYTE: u8 = 0x47;

pub const PID_PAT: u16 = 0x0000;
pub const PID_PMT: u16 = 0x1000;
pub const PID_VIDEO: u16 = 0x0100;
pub const PID_AUDIO: u16 = 0x0101;

pub const STREAM_ID_VIDEO: u8 = 0xE0;
pub const STREAM_ID_AUDIO: u8 = 0xC0;

pub const STREAM_TYPE_AAC: u8 = 0x0F;
pub const STREAM_TYPE_H264: u8 = 0x1B;
pub const STREAM_TYPE_H265: u8 = 0x24;

const TRANSPORT_STREAM_ID: u16 = 1;
const PROGRAM_NUMBER: u16 = 1;

/// One elementary stream announced in the PMT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmtStream {
    pub stream_type: u8,
    pub pid: u16,
}

impl PmtStream {
    /// Video stream on [`PID_VIDEO`]
    pub fn video(codec: VideoCodec) -> Self {
        let stream_type = match codec {
            VideoCodec::Avc => STREAM_TYPE_H264,
            VideoCodec::Hevc => STREAM_TYPE_H265,
        };
        Self {
            stream_type,
            pid: PID_VIDEO,
        }
    }

    /// AAC (ADTS) stream on [`PID_AUDIO`]
    pub fn aac() -> Self {
        Self {
            stream_type: STREAM_TYPE_AAC,
            pid: PID_AUDIO,
        }
    }

    fn is_video(&self) -> bool {
        matches!(self.stream_type, STREAM_TYPE_H264 | STREAM_TYPE_H265)
    }
}

/// PAT announcing a single program whose PMT is on [`PID_PMT`]
pub fn pat_packet() -> [u8; TS_PACKET_SIZE] {
    let mut section = vec![0x00, 0x00, 0x00]; // table_id, length placeholder
    section.extend_from_slice(&TRANSPORT_STREAM_ID.to_be_bytes());
    section.push(0xC1); // version 0, current_next
    section.push(0x00); // section number
    section.push(0x00); // last section number
    section.extend_from_slice(&PROGRAM_NUMBER.to_be_bytes());
    section.push(0xE0 | ((PID_PMT >> 8) as u8 & 0x1F));
    section.push(PID_PMT as u8);

    psi_packet(PID_PAT, section)
}

/// PMT for `streams`; the first video stream (else the first stream) carries the PCR
pub fn pmt_packet(streams: &[PmtStream]) -> [u8; TS_PACKET_SIZE] {
    let pcr_pid = streams
        .iter()
        .find(|s| s.is_video())
        .or_else(|| streams.first())
        .map_or(0x1FFF, |s| s.pid);

    let mut section = vec![0x02, 0x00, 0x00]; // table_id, length placeholder
    section.extend_from_slice(&PROGRAM_NUMBER.to_be_bytes());
    section.push(0xC1);
    section.push(0x00);
    section.push(0x00);
    section.push(0xE0 | ((pcr_pid >> 8) as u8 & 0x1F));
    section.push(pcr_pid as u8);
    section.extend_from_slice(&[0xF0, 0x00]); // no program descriptors

    for stream in streams {
        section.push(stream.stream_type);
        section.push(0xE0 | ((stream.pid >> 8) as u8 & 0x1F));
        section.push(stream.pid as u8);
        section.extend_from_slice(&[0xF0, 0x00]); // no ES descriptors
    }

    psi_packet(PID_PMT, section)
}

/// Patch the section length, append the CRC and wrap the section in one packet
fn psi_packet(pid: u16, mut section: Vec<u8>) -> [u8; TS_PACKET_SIZE] {
    // Length counts everything after the length field, CRC included
    let section_length = section.len() - 3 + 4;
    section[1] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
    section[2] = section_length as u8;
    let crc = crc32_mpeg(&section);
    section.extend_from_slice(&crc.to_be_bytes());

    let mut packet = [0xFF; TS_PACKET_SIZE];
    packet[0] = SYNC_BYTE;
    packet[1] = 0x40 | ((pid >> 8) as u8 & 0x1F);
    packet[2] = pid as u8;
    packet[3] = 0x10; // payload only, CC 0
    packet[4] = 0x00; // pointer field
    let len = section.len().min(TS_PACKET_SIZE - 5);
    packet[5..5 + len].copy_from_slice(&section[..len]);
    packet
}

const CRC_TABLE: [u32; 256] = crc_table();

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC-32/MPEG-2 over a PSI section
pub fn crc32_mpeg(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc = CRC_TABLE[((crc >> 24) as u8 ^ byte) as usize] ^ (crc << 8);
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_mpeg_check_value() {
        assert_eq!(crc32_mpeg(b"123456789"), 0x0376_E6E7);
        assert_eq!(CRC_TABLE[1], 0x04C1_1DB7);
    }

    #[test]
    fn test_pat_packet() {
        let pat = pat_packet();
        assert_eq!(pat[0], SYNC_BYTE);
        assert_eq!(&pat[1..4], &[0x40, 0x00, 0x10]);
        // table_id, section_length = 13
        assert_eq!(&pat[5..8], &[0x00, 0xB0, 0x0D]);
        // program 1 -> PMT PID 0x1000
        assert_eq!(&pat[13..17], &[0x00, 0x01, 0xF0, 0x00]);
        // CRC over the section yields zero when the CRC is included
        assert_eq!(crc32_mpeg(&pat[5..5 + 3 + 13]), 0);
        assert!(pat[21..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_pmt_packet() {
        let pmt = pmt_packet(&[PmtStream::video(VideoCodec::Avc), PmtStream::aac()]);
        assert_eq!(&pmt[1..3], &[0x50, 0x00]);
        assert_eq!(pmt[5], 0x02);
        let section_length = (((pmt[6] & 0x0F) as usize) << 8) | pmt[7] as usize;
        assert_eq!(section_length, 13 + 2 * 5);
        // PCR on the video PID
        assert_eq!(&pmt[13..15], &[0xE1, 0x00]);
        assert_eq!(&pmt[17..20], &[STREAM_TYPE_H264, 0xE1, 0x00]);
        assert_eq!(&pmt[22..25], &[STREAM_TYPE_AAC, 0xE1, 0x01]);
        assert_eq!(crc32_mpeg(&pmt[5..5 + 3 + section_length]), 0);
    }

    #[test]
    fn test_pmt_audio_only_pcr() {
        let pmt = pmt_packet(&[PmtStream::aac()]);
        assert_eq!(&pmt[13..15], &[0xE1, 0x01]);
        assert_eq!(PmtStream::video(VideoCodec::Hevc).stream_type, STREAM_TYPE_H265);
    }
}
