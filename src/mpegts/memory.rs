//! In-memory TS batch

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Result, TsError};
use crate::media::aac::{AudioSpecificConfig, ADTS_HEADER_LEN};
use crate::media::{h264, hevc};
use crate::track::{Frame, ParameterSets};

use super::packet::write_packet;
use super::pes::{PesFrame, PesHeader, PesPacket, START_CODE_PREFIX};
use super::{pat_packet, pmt_packet, PmtStream, STREAM_ID_AUDIO, STREAM_ID_VIDEO, TS_PACKET_SIZE};

/// PES header bytes after the length field for PTS+DTS (3 fixed + 10)
const VIDEO_PES_OVERHEAD: usize = 13;

/// PES header bytes after the length field for PTS only (3 fixed + 5)
const AUDIO_PES_OVERHEAD: usize = 8;

/// TS packets collected for one batch
///
/// Packets accumulate until the batch is written out with
/// [`write_to`](Self::write_to), which prefixes the PAT and PMT. A frame
/// that fails to packetize leaves no packets and no counter changes behind.
pub struct MemoryTs {
    pmt: [u8; TS_PACKET_SIZE],
    packets: BytesMut,
    /// Reused across frames: the assembled PES packet
    pes_scratch: BytesMut,
    /// Reused across frames: the TS packets of the frame being written
    ts_scratch: BytesMut,
}

impl MemoryTs {
    /// Create an empty batch whose PMT announces `streams`
    pub fn new(streams: &[PmtStream]) -> Self {
        Self {
            pmt: pmt_packet(streams),
            packets: BytesMut::new(),
            pes_scratch: BytesMut::new(),
            ts_scratch: BytesMut::new(),
        }
    }

    /// Number of collected packets (PAT/PMT excluded)
    pub fn packet_count(&self) -> usize {
        self.packets.len() / TS_PACKET_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Collected packets, back to back
    pub fn packets(&self) -> &[u8] {
        &self.packets
    }

    /// Drop collected packets, keeping the buffers for the next batch
    pub fn clear(&mut self) {
        self.packets.clear();
    }

    /// Take the collected packets, leaving the batch empty
    pub fn take(&mut self) -> Bytes {
        self.packets.split().freeze()
    }

    /// Split a PES packet into TS packets on `frame`'s PID.
    ///
    /// The first packet starts the payload unit and, for keyframes, carries
    /// the PCR with the random access indicator. Each packet advances the
    /// PID's continuity counter.
    pub fn write_pes_packet(&mut self, frame: &mut PesFrame, packet: PesPacket) -> Result<()> {
        if packet.header.start_code_prefix != START_CODE_PREFIX {
            return Err(TsError::StartCodeMismatch(packet.header.start_code_prefix).into());
        }

        self.pes_scratch.clear();
        self.pes_scratch
            .reserve(packet.header.encoded_len() + packet.payload_len());
        packet.header.write(&mut self.pes_scratch);
        for fragment in &packet.payload {
            self.pes_scratch.extend_from_slice(fragment);
        }

        self.ts_scratch.clear();
        let mut continuity_counter = frame.continuity_counter;
        let mut offset = 0;
        while offset < self.pes_scratch.len() {
            let first = offset == 0;
            let pcr = (first && frame.is_keyframe).then_some(frame.pcr_base);
            let start = self.ts_scratch.len();
            offset += write_packet(
                &mut self.ts_scratch,
                frame.pid,
                first,
                continuity_counter,
                pcr,
                &self.pes_scratch[offset..],
            );

            let size = self.ts_scratch.len() - start;
            if size != TS_PACKET_SIZE {
                return Err(TsError::PacketSize(size).into());
            }
            continuity_counter = (continuity_counter + 1) & 0x0F;
        }

        self.packets.extend_from_slice(&self.ts_scratch);
        frame.continuity_counter = continuity_counter;
        Ok(())
    }

    /// Packetize one AAC access unit with an ADTS header (PTS only)
    pub fn write_audio_frame(
        &mut self,
        frame: &Frame,
        config: &AudioSpecificConfig,
        pes: &mut PesFrame,
    ) -> Result<()> {
        let length = frame.byte_len();
        let adts = config.to_adts(length);
        let packet_length = ADTS_HEADER_LEN + length + AUDIO_PES_OVERHEAD;

        let mut payload = Vec::with_capacity(frame.raw.len() + 1);
        payload.push(Bytes::copy_from_slice(&adts));
        payload.extend(frame.raw.iter().cloned());

        pes.pcr_base = u64::from(frame.dts);
        let header = PesHeader::audio(STREAM_ID_AUDIO, packet_length as u16, u64::from(frame.pts));
        self.write_pes_packet(pes, PesPacket::new(header, payload))
    }

    /// Packetize one video access unit (PTS and DTS).
    ///
    /// The payload is an access unit delimiter (H.264 when at most two
    /// parameter sets are known, H.265 otherwise), the parameter sets for
    /// keyframes, then the frame in Annex-B form.
    pub fn write_video_frame(
        &mut self,
        frame: &Frame,
        parameter_sets: &ParameterSets,
        pes: &mut PesFrame,
    ) -> Result<()> {
        let mut payload = Vec::with_capacity(1 + 2 * (parameter_sets.len() + frame.raw.len()));
        if parameter_sets.len() <= 2 {
            payload.push(Bytes::from_static(&h264::AUD_NALU));
        } else {
            payload.push(Bytes::from_static(&hevc::AUD_NALU));
        }
        if frame.keyframe {
            payload.extend(parameter_sets.annexb());
        }
        payload.extend(frame.annexb());

        let total: usize = payload.iter().map(Bytes::len).sum::<usize>() + VIDEO_PES_OVERHEAD;
        let packet_length = if total > 0xFFFF { 0 } else { total as u16 };

        pes.is_keyframe = frame.keyframe;
        pes.pcr_base = u64::from(frame.dts);
        let header = PesHeader::video(
            STREAM_ID_VIDEO,
            packet_length,
            u64::from(frame.pts),
            u64::from(frame.dts),
        );
        self.write_pes_packet(pes, PesPacket::new(header, payload))
    }

    /// Write the PAT, the PMT and every collected packet to `w`.
    ///
    /// Returns the number of bytes written.
    pub async fn write_to<W>(&self, w: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        w.write_all(&pat_packet()).await?;
        w.write_all(&self.pmt).await?;
        w.write_all(&self.packets).await?;
        Ok((2 * TS_PACKET_SIZE + self.packets.len()) as u64)
    }
}
