//! PES packets
//!
//! ```text
//! +--------------+----------+------------+-------+-------+-------------+-----------+
//! | 00 00 01 (3) | streamid | length (2) | flags | PTS/  | header data | PTS [DTS] |
//! |              |   (1)    |            | (1)   | DTS   | length (1)  | 5B each   |
//! +--------------+----------+------------+-------+-------+-------------+-----------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Start code prefix every PES packet must carry
pub const START_CODE_PREFIX: u32 = 0x000001;

/// PTS/DTS flag values
const PTS_ONLY: u8 = 0x80;
const PTS_DTS: u8 = 0xC0;

/// PES packet header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesHeader {
    pub start_code_prefix: u32,
    pub stream_id: u8,
    /// Bytes following the length field, 0 for unbounded
    pub packet_length: u16,
    /// Marker bits '10' plus scrambling/priority/alignment flags
    pub flags: u8,
    pub pts_dts_flags: u8,
    pub header_data_length: u8,
    pub pts: u64,
    pub dts: u64,
}

impl PesHeader {
    /// Header for an audio access unit (PTS only)
    pub fn audio(stream_id: u8, packet_length: u16, pts: u64) -> Self {
        Self {
            start_code_prefix: START_CODE_PREFIX,
            stream_id,
            packet_length,
            flags: 0x80,
            pts_dts_flags: PTS_ONLY,
            header_data_length: 5,
            pts,
            dts: 0,
        }
    }

    /// Header for a video access unit (PTS and DTS)
    pub fn video(stream_id: u8, packet_length: u16, pts: u64, dts: u64) -> Self {
        Self {
            start_code_prefix: START_CODE_PREFIX,
            stream_id,
            packet_length,
            flags: 0x80,
            pts_dts_flags: PTS_DTS,
            header_data_length: 10,
            pts,
            dts,
        }
    }

    /// Encoded size
    pub fn encoded_len(&self) -> usize {
        9 + self.header_data_length as usize
    }

    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_uint(u64::from(self.start_code_prefix & 0xFF_FFFF), 3);
        buf.put_u8(self.stream_id);
        buf.put_u16(self.packet_length);
        buf.put_u8(self.flags);
        buf.put_u8(self.pts_dts_flags);
        buf.put_u8(self.header_data_length);

        let has_dts = self.pts_dts_flags & 0x40 != 0;
        if self.pts_dts_flags & 0x80 != 0 {
            let marker = if has_dts { 0x03 } else { 0x02 };
            buf.put_slice(&encode_timestamp(self.pts, marker));
        }
        if has_dts {
            buf.put_slice(&encode_timestamp(self.dts, 0x01));
        }
    }
}

/// A PES header with its payload fragments
#[derive(Debug, Clone)]
pub struct PesPacket {
    pub header: PesHeader,
    pub payload: Vec<Bytes>,
}

impl PesPacket {
    pub fn new(header: PesHeader, payload: Vec<Bytes>) -> Self {
        Self { header, payload }
    }

    pub fn payload_len(&self) -> usize {
        self.payload.iter().map(Bytes::len).sum()
    }
}

/// Per-PID packetizer state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PesFrame {
    pub pid: u16,
    /// 4-bit counter, incremented for every packet on this PID
    pub continuity_counter: u8,
    /// The next packet opens a random access point (carries the PCR)
    pub is_keyframe: bool,
    /// PCR base, 90 kHz
    pub pcr_base: u64,
}

impl PesFrame {
    pub fn new(pid: u16) -> Self {
        Self {
            pid,
            ..Default::default()
        }
    }
}

/// Encode a 33-bit timestamp for the PES header
fn encode_timestamp(ts: u64, marker: u8) -> [u8; 5] {
    let mut bytes = [0u8; 5];

    // marker(4) + ts[32:30](3) + 1 + ts[29:15](15) + 1 + ts[14:0](15) + 1
    bytes[0] = (marker << 4) | ((((ts >> 30) & 0x07) as u8) << 1) | 0x01;
    bytes[1] = ((ts >> 22) & 0xFF) as u8;
    bytes[2] = ((((ts >> 15) & 0x7F) << 1) as u8) | 0x01;
    bytes[3] = ((ts >> 7) & 0xFF) as u8;
    bytes[4] = (((ts & 0x7F) << 1) | 0x01) as u8;

    bytes
}
