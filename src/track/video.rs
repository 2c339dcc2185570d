//! Video tracks
//!
//! [`VideoTrack`] ingests H.264/H.265 access units either as Annex-B byte
//! streams or as AVCC frames and keeps the ring sized to hold at least one
//! full GOP:
//!
//! - every keyframe measures the GOP and, when the ring is far larger than
//!   it, gives the surplus slots back
//! - when the only keyframe in the ring is about to be overwritten, the ring
//!   grows instead, up to `max_ring_size`
//!
//! [`UnknownVideo`] is the entry point for AVCC sources that announce their
//! codec in the first sequence header.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{MediaError, Result};
use crate::media::{annexb, avcc, h264, hevc};
use crate::media::{AvcConfig, AvccHeader, HevcConfig, VideoCodec};
use crate::ring::{Ring, RingReader};

use super::{Frame, ParameterSets, TrackConfig, TrackHandle, TrackMeta, TrackStats};

/// Slack kept on top of one GOP before the ring is shrunk
const GOP_SLACK: i64 = 5;

/// What a NALU means for frame assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NaluClass {
    Keyframe,
    ParameterSet,
    Other,
}

impl NaluClass {
    fn of(codec: VideoCodec, nalu: &[u8]) -> Self {
        let (keyframe, parameter_set) = match codec {
            VideoCodec::Avc => h264::NaluType::of(nalu)
                .map_or((false, false), |t| (t.is_keyframe(), t.is_parameter_set())),
            VideoCodec::Hevc => hevc::NaluType::of(nalu)
                .map_or((false, false), |t| (t.is_keyframe(), t.is_parameter_set())),
        };
        if keyframe {
            NaluClass::Keyframe
        } else if parameter_set {
            NaluClass::ParameterSet
        } else {
            NaluClass::Other
        }
    }
}

/// Raw NALU type from the header byte
fn nalu_type(codec: VideoCodec, nalu: &[u8]) -> u8 {
    let header = nalu.first().copied().unwrap_or(0);
    match codec {
        VideoCodec::Avc => header & 0x1F,
        VideoCodec::Hevc => (header >> 1) & 0x3F,
    }
}

/// H.264 or H.265 track
pub struct VideoTrack {
    codec: VideoCodec,
    config: TrackConfig,
    ring: Ring,
    frame: Frame,
    meta: Arc<RwLock<TrackMeta>>,
    nalu_length_size: usize,
    /// Keyframes currently resident in the ring
    idr_count: usize,
    last_keyframe: Option<u64>,
    gop: u64,
    frames_written: u64,
    frames_dropped: u64,
}

impl VideoTrack {
    /// Create a track for `codec`
    pub fn new(codec: VideoCodec, config: TrackConfig) -> Self {
        let mut ring = Ring::new(config.ring_size);
        let frame = ring.take_frame();
        Self {
            codec,
            nalu_length_size: config.nalu_length_size,
            config,
            ring,
            frame,
            meta: Arc::new(RwLock::new(TrackMeta::default())),
            idr_count: 0,
            last_keyframe: None,
            gop: 0,
            frames_written: 0,
            frames_dropped: 0,
        }
    }

    /// Create an H.264 track
    pub fn h264(config: TrackConfig) -> Self {
        Self::new(VideoCodec::Avc, config)
    }

    /// Create an H.265 track
    pub fn h265(config: TrackConfig) -> Self {
        Self::new(VideoCodec::Hevc, config)
    }

    pub fn codec(&self) -> VideoCodec {
        self.codec
    }

    /// Append one Annex-B access unit to the current frame.
    ///
    /// Every span between start codes becomes one NALU of the frame.
    /// Keyframe NALUs mark the frame, each parameter set replaces the
    /// track's current one of the same type. The frame is stamped with `pts`/`dts` when it holds
    /// payload afterwards.
    pub fn write_annexb(&mut self, pts: u32, dts: u32, data: Bytes) {
        tracing::trace!(
            codec = self.codec.name(),
            pts = pts,
            dts = dts,
            len = data.len(),
            "Annex-B ingest"
        );

        let codec = self.codec;
        let frame = &mut self.frame;
        let mut parameter_sets = Vec::new();
        annexb::split_nalus(data, |nalu| {
            match NaluClass::of(codec, &nalu) {
                NaluClass::Keyframe => frame.keyframe = true,
                NaluClass::ParameterSet => parameter_sets.push(nalu.clone()),
                NaluClass::Other => {}
            }
            frame.append_raw(nalu);
        });

        if !parameter_sets.is_empty() {
            let mut meta = self.meta.write();
            for set in parameter_sets {
                meta.parameter_sets.replace(set, |nalu| nalu_type(codec, nalu));
            }
        }
        if self.frame.has_payload() {
            self.frame.pts = pts;
            self.frame.dts = dts;
        }
    }

    /// Append one AVCC frame (FLV video tag body) to the current frame.
    ///
    /// `timestamp` is the decode time in milliseconds. A NALU whose length
    /// prefix runs past the buffer is logged and ends parsing; NALUs already
    /// appended are kept. Fails only when the 5-byte header is missing.
    pub fn write_avcc(&mut self, timestamp: u32, data: Bytes) -> Result<()> {
        let header = AvccHeader::parse(&data).ok_or(MediaError::InvalidAvcPacket)?;
        tracing::trace!(
            codec = self.codec.name(),
            timestamp = timestamp,
            keyframe = header.is_keyframe(),
            len = data.len(),
            "AVCC ingest"
        );

        let dts = timestamp.wrapping_mul(90);
        self.frame.dts = dts;
        self.frame.pts = dts.wrapping_add(header.composition_time.wrapping_mul(90) as u32);
        self.frame.keyframe = header.is_keyframe();

        let payload = data.slice(avcc::HEADER_LEN..);
        let frame = &mut self.frame;
        if let Err(e) = avcc::split_nalus(&payload, self.nalu_length_size, |nalu| {
            frame.append_raw(nalu)
        }) {
            tracing::error!(
                codec = self.codec.name(),
                nalu_length_size = self.nalu_length_size,
                error = %e,
                "Malformed AVCC frame"
            );
        }
        Ok(())
    }

    /// Apply a sequence header (FLV video tag body carrying the decoder
    /// configuration record).
    ///
    /// Sets the NALU length width and replaces the parameter sets.
    pub fn write_sequence_header(&mut self, data: Bytes) -> Result<()> {
        let invalid = match self.codec {
            VideoCodec::Avc => MediaError::InvalidAvcPacket,
            VideoCodec::Hevc => MediaError::InvalidHevcPacket,
        };
        if data.len() < avcc::HEADER_LEN {
            return Err(invalid.into());
        }
        let record = data.slice(avcc::HEADER_LEN..);

        let (nalu_length_size, sets) = match self.codec {
            VideoCodec::Avc => {
                let config = AvcConfig::parse(record.clone())?;
                tracing::debug!(
                    profile = config.profile_name(),
                    level = %config.level_string(),
                    sps = config.sps.len(),
                    pps = config.pps.len(),
                    "H.264 sequence header"
                );
                let mut sets = config.sps;
                sets.extend(config.pps);
                (config.nalu_length_size, sets)
            }
            VideoCodec::Hevc => {
                let config = HevcConfig::parse(record.clone())?;
                tracing::debug!(
                    profile = config.profile,
                    level = config.level,
                    vps = config.vps.len(),
                    sps = config.sps.len(),
                    pps = config.pps.len(),
                    "H.265 sequence header"
                );
                let mut sets = config.vps;
                sets.extend(config.sps);
                sets.extend(config.pps);
                (config.nalu_length_size, sets)
            }
        };

        self.nalu_length_size = nalu_length_size as usize;
        let mut meta = self.meta.write();
        meta.parameter_sets = ParameterSets::new(sets);
        meta.sequence_header = Some(record);
        Ok(())
    }

    /// Finalize the current frame and publish it to the ring.
    ///
    /// A frame without payload is reset and dropped.
    pub fn flush(&mut self) {
        if !self.frame.has_payload() {
            self.frame.reset();
            self.frames_dropped += 1;
            return;
        }

        if self.config.wants_avcc() {
            self.frame.fill_avcc(self.codec.id());
        }
        if self.config.enable_flv {
            self.frame.fill_video_flv();
        }

        if self.frame.keyframe {
            self.compute_gop();
        }

        // The oldest frame is about to be overwritten
        if self.ring.write_slot_is_keyframe() {
            if self.idr_count == 1 && self.ring.size() < self.config.max_ring_size {
                self.ring.grow(self.config.grow_step);
            } else {
                self.idr_count = self.idr_count.saturating_sub(1);
            }
        }

        let next = self.ring.take_frame();
        let frame = std::mem::replace(&mut self.frame, next);
        self.ring.publish(frame);
        self.frames_written += 1;
    }

    fn compute_gop(&mut self) {
        self.idr_count += 1;
        let sequence = self.ring.next_sequence();

        if let Some(previous) = self.last_keyframe {
            self.gop = sequence - previous;
            let size = self.ring.size() as i64;
            let excess = size - self.gop as i64 - GOP_SLACK;
            if excess > GOP_SLACK {
                let removed = self.ring.shrink(excess as usize);
                self.idr_count = self.idr_count.saturating_sub(removed);
                tracing::debug!(
                    codec = self.codec.name(),
                    gop = self.gop,
                    size = self.ring.size(),
                    "Ring resized to GOP"
                );
            }
        }
        self.last_keyframe = Some(sequence);
    }

    /// Attach a reader at the newest keyframe
    pub fn read_ring(&self) -> RingReader {
        self.ring.reader()
    }

    /// Cloneable read side for downstream tasks
    pub fn handle(&self) -> TrackHandle {
        TrackHandle::new(self.codec.name(), self.ring.handle(), self.meta.clone())
    }

    /// Current parameter sets
    pub fn parameter_sets(&self) -> ParameterSets {
        self.meta.read().parameter_sets.clone()
    }

    /// NALU length width used for AVCC input
    pub fn nalu_length_size(&self) -> usize {
        self.nalu_length_size
    }

    /// Frames between the last two keyframes
    pub fn gop(&self) -> u64 {
        self.gop
    }

    pub fn stats(&self) -> TrackStats {
        TrackStats {
            ring_size: self.ring.size(),
            resident_keyframes: self.idr_count,
            gop: self.gop,
            frames_written: self.frames_written,
            frames_dropped: self.frames_dropped,
        }
    }

    /// Close the ring; readers drain and then stop
    pub fn close(&mut self) {
        self.ring.close();
    }
}

/// Video track whose codec is taken from the first AVCC sequence header
pub struct UnknownVideo {
    config: TrackConfig,
    track: Option<VideoTrack>,
    unsupported: bool,
}

impl UnknownVideo {
    pub fn new(config: TrackConfig) -> Self {
        Self {
            config,
            track: None,
            unsupported: false,
        }
    }

    /// Whether a concrete track has been created
    pub fn is_active(&self) -> bool {
        self.track.is_some()
    }

    pub fn track(&self) -> Option<&VideoTrack> {
        self.track.as_ref()
    }

    pub fn track_mut(&mut self) -> Option<&mut VideoTrack> {
        self.track.as_mut()
    }

    pub fn handle(&self) -> Option<TrackHandle> {
        self.track.as_ref().map(VideoTrack::handle)
    }

    /// Route one AVCC frame.
    ///
    /// Sequence headers configure the track (creating it on the first one);
    /// any other frame is ingested and flushed.
    pub fn write_avcc(&mut self, timestamp: u32, data: Bytes) -> Result<()> {
        let header = AvccHeader::parse(&data).ok_or(MediaError::InvalidAvcPacket)?;
        if self.track.is_none() && !self.activate(&header)? {
            return Ok(());
        }
        let track = match self.track.as_mut() {
            Some(track) => track,
            None => return Ok(()),
        };

        if header.is_sequence_header() {
            track.write_sequence_header(data)
        } else {
            track.write_avcc(timestamp, data)?;
            track.flush();
            Ok(())
        }
    }

    /// Forward an Annex-B access unit once the codec is known
    pub fn write_annexb(&mut self, pts: u32, dts: u32, data: Bytes) {
        match self.track.as_mut() {
            Some(track) => {
                track.write_annexb(pts, dts, data);
                track.flush();
            }
            None => {
                tracing::warn!(len = data.len(), "Video data before sequence header dropped");
            }
        }
    }

    /// Create the track from a sequence header.
    ///
    /// Every sequence header is tried until one names a supported codec. An
    /// unsupported codec is reported once; later ones are dropped quietly.
    fn activate(&mut self, header: &AvccHeader) -> Result<bool> {
        if !header.is_sequence_header() {
            if !self.unsupported {
                tracing::warn!("Video data before sequence header dropped");
            }
            return Ok(false);
        }

        match header.codec() {
            Some(codec) => {
                tracing::info!(codec = codec.name(), "Video track created");
                self.track = Some(VideoTrack::new(codec, self.config.clone()));
                self.unsupported = false;
                Ok(true)
            }
            None if self.unsupported => Ok(false),
            None => {
                tracing::error!(codec_id = header.codec_id, "Unsupported video codec");
                self.unsupported = true;
                Err(MediaError::UnsupportedCodec(header.codec_id).into())
            }
        }
    }
}
