//! Access unit frames
//!
//! A [`Frame`] is assembled by a track, finalized by `flush`, and then shared
//! read-only with every reader as `Arc<Frame>`. Frames are pooled: when the
//! ring recycles a slot nobody else still holds, the frame is reset and
//! reused for the next access unit instead of being freed.

use bytes::{BufMut, Bytes, BytesMut};

use crate::media::annexb;
use crate::media::avcc;
use crate::media::flv::{FlvTag, AAC_SOUND_FORMAT};

/// One access unit
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Position in the track, monotonic
    pub sequence: u64,
    /// Presentation timestamp, 90 kHz
    pub pts: u32,
    /// Decode timestamp, 90 kHz
    pub dts: u32,
    /// Decodable without earlier frames
    pub keyframe: bool,
    /// NALUs (or raw audio units), zero-copy views into the ingest buffers
    pub raw: Vec<Bytes>,
    avcc: Option<Bytes>,
    flv: Option<Bytes>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one NALU slice
    pub fn append_raw(&mut self, nalu: Bytes) {
        self.raw.push(nalu);
    }

    /// Whether the frame carries any payload
    pub fn has_payload(&self) -> bool {
        !self.raw.is_empty()
    }

    /// Total payload length in bytes
    pub fn byte_len(&self) -> usize {
        self.raw.iter().map(Bytes::len).sum()
    }

    /// Composition time offset in milliseconds
    pub fn composition_time(&self) -> i32 {
        ((self.pts as i64 - self.dts as i64) / 90) as i32
    }

    /// Memoized AVCC encoding, if it was built
    pub fn avcc(&self) -> Option<&Bytes> {
        self.avcc.as_ref()
    }

    /// Memoized FLV tag encoding, if it was built
    pub fn flv(&self) -> Option<&Bytes> {
        self.flv.as_ref()
    }

    /// Annex-B fragments: a 4-byte start code before every NALU
    pub fn annexb(&self) -> Vec<Bytes> {
        let mut out = Vec::with_capacity(self.raw.len() * 2);
        for nalu in &self.raw {
            out.push(annexb::start_code());
            out.push(nalu.clone());
        }
        out
    }

    /// Clear for reuse, keeping the NALU list allocation
    pub fn reset(&mut self) {
        self.sequence = 0;
        self.pts = 0;
        self.dts = 0;
        self.keyframe = false;
        self.raw.clear();
        self.avcc = None;
        self.flv = None;
    }

    /// Build the AVCC form once: 5-byte header then 4-byte length-prefixed NALUs
    pub(crate) fn fill_avcc(&mut self, codec_id: u8) {
        if self.avcc.is_some() {
            return;
        }
        let len = avcc::HEADER_LEN + self.raw.iter().map(|n| 4 + n.len()).sum::<usize>();
        let mut buf = BytesMut::with_capacity(len);
        avcc::put_header(
            &mut buf,
            codec_id,
            self.keyframe,
            self.composition_time() as u32,
        );
        avcc::put_nalus(&mut buf, &self.raw);
        self.avcc = Some(buf.freeze());
    }

    /// Build the FLV video tag once, from the AVCC form
    ///
    /// The tag body marks its payload as NALUs (AVC packet type 1).
    pub(crate) fn fill_video_flv(&mut self) {
        if self.flv.is_some() {
            return;
        }
        if let Some(avcc) = &self.avcc {
            let mut body = BytesMut::from(&avcc[..]);
            body[1] = 1;
            let tag = FlvTag::video(self.dts / 90, body.freeze());
            self.flv = Some(tag.encode());
        }
    }

    /// Build the FLV audio tag once: AAC sound format, raw packet type, access unit
    pub(crate) fn fill_audio_flv(&mut self) {
        if self.flv.is_some() {
            return;
        }
        let mut body = BytesMut::with_capacity(2 + self.byte_len());
        body.put_u8(AAC_SOUND_FORMAT);
        body.put_u8(1);
        for unit in &self.raw {
            body.put_slice(unit);
        }
        let tag = FlvTag::audio(self.dts / 90, body.freeze());
        self.flv = Some(tag.encode());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idr_frame() -> Frame {
        let mut frame = Frame::new();
        frame.keyframe = true;
        frame.append_raw(Bytes::from_static(&[0x67, 0x42]));
        frame.append_raw(Bytes::from_static(&[0x65, 0x88, 0x84]));
        frame
    }

    #[test]
    fn test_payload_accounting() {
        let frame = idr_frame();
        assert!(frame.has_payload());
        assert_eq!(frame.byte_len(), 5);
        assert!(!Frame::new().has_payload());
    }

    #[test]
    fn test_fill_avcc_layout() {
        let mut frame = idr_frame();
        frame.pts = 3600;
        frame.dts = 0;
        frame.fill_avcc(7);

        let avcc = frame.avcc().unwrap();
        assert_eq!(
            &avcc[..],
            &[
                0x17, 0x00, 0x00, 0x00, 0x28, // header, cts = 40ms
                0x00, 0x00, 0x00, 0x02, 0x67, 0x42, // SPS
                0x00, 0x00, 0x00, 0x03, 0x65, 0x88, 0x84, // IDR
            ]
        );
    }

    #[test]
    fn test_fill_avcc_is_memoized() {
        let mut frame = idr_frame();
        frame.fill_avcc(7);
        let first = frame.avcc().cloned().unwrap();

        frame.keyframe = false;
        frame.fill_avcc(7);
        assert_eq!(frame.avcc().unwrap(), &first);
    }

    #[test]
    fn test_fill_video_flv_uses_nalu_packet_type() {
        let mut frame = idr_frame();
        frame.dts = 9000; // 100ms
        frame.fill_video_flv();
        assert!(frame.flv().is_none()); // needs AVCC first

        frame.fill_avcc(7);
        frame.fill_video_flv();
        let tag = frame.flv().unwrap();
        assert_eq!(tag[0], 9);
        assert_eq!(&tag[4..7], &[0x00, 0x00, 100]);
        assert_eq!(&tag[11..13], &[0x17, 0x01]);
    }

    #[test]
    fn test_fill_audio_flv() {
        let mut frame = Frame::new();
        frame.append_raw(Bytes::from_static(&[0x21, 0x10]));
        frame.fill_audio_flv();
        let tag = frame.flv().unwrap();
        assert_eq!(tag[0], 8);
        assert_eq!(&tag[11..15], &[0xAF, 0x01, 0x21, 0x10]);
    }

    #[test]
    fn test_annexb_fragments() {
        let frame = idr_frame();
        let joined: Vec<u8> = frame.annexb().iter().flat_map(|b| b.to_vec()).collect();
        assert_eq!(
            joined,
            vec![0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84]
        );
    }

    #[test]
    fn test_negative_composition_time() {
        let mut frame = Frame::new();
        frame.pts = 0;
        frame.dts = 1800;
        assert_eq!(frame.composition_time(), -20);
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut frame = idr_frame();
        frame.sequence = 9;
        frame.fill_avcc(7);
        let capacity = frame.raw.capacity();

        frame.reset();
        assert!(!frame.has_payload());
        assert!(frame.avcc().is_none());
        assert_eq!(frame.sequence, 0);
        assert_eq!(frame.raw.capacity(), capacity);
    }
}
