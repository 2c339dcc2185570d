//! AAC audio track
//!
//! Every audio frame is a join point, so readers attach at the newest frame
//! and the ring never grows or shrinks.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{MediaError, Result};
use crate::media::{AacData, AudioSpecificConfig};
use crate::ring::{Ring, RingReader};

use super::{Frame, TrackConfig, TrackHandle, TrackMeta, TrackStats};

/// FLV sound format id for AAC
const SOUND_FORMAT_AAC: u8 = 10;

/// AAC track
pub struct AudioTrack {
    config: TrackConfig,
    ring: Ring,
    frame: Frame,
    meta: Arc<RwLock<TrackMeta>>,
    frames_written: u64,
    frames_dropped: u64,
    /// An unsupported sound format has been reported
    unsupported: bool,
}

impl AudioTrack {
    pub fn new(config: TrackConfig) -> Self {
        let mut ring = Ring::new(config.ring_size).every_frame_joins();
        let frame = ring.take_frame();
        Self {
            config,
            ring,
            frame,
            meta: Arc::new(RwLock::new(TrackMeta::default())),
            frames_written: 0,
            frames_dropped: 0,
            unsupported: false,
        }
    }

    /// Set the AudioSpecificConfig directly
    pub fn set_audio_config(&mut self, config: AudioSpecificConfig) {
        tracing::debug!(
            sample_rate = config.sampling_frequency,
            channels = config.channel_configuration,
            "AAC config"
        );
        self.meta.write().audio_config = Some(config);
    }

    pub fn audio_config(&self) -> Option<AudioSpecificConfig> {
        self.meta.read().audio_config.clone()
    }

    /// Append one raw AAC access unit (no ADTS header) with its 90 kHz timestamp
    pub fn write_raw(&mut self, pts: u32, data: Bytes) {
        tracing::trace!(pts = pts, len = data.len(), "AAC ingest");
        if data.is_empty() {
            return;
        }
        self.frame.append_raw(data);
        self.frame.pts = pts;
        self.frame.dts = pts;
    }

    /// Ingest one FLV audio tag body.
    ///
    /// Sequence headers set the AudioSpecificConfig; raw frames are appended
    /// and flushed. `timestamp` is in milliseconds.
    pub fn write_avcc(&mut self, timestamp: u32, data: Bytes) -> Result<()> {
        let format = data.first().map(|b| b >> 4).ok_or(MediaError::InvalidAacPacket)?;
        if format != SOUND_FORMAT_AAC {
            if !self.unsupported {
                tracing::error!(sound_format = format, "Unsupported audio codec");
                self.unsupported = true;
            }
            return Err(MediaError::UnsupportedCodec(format).into());
        }

        match AacData::parse(data.slice(1..))? {
            AacData::SequenceHeader(config) => self.set_audio_config(config),
            AacData::Frame(raw) => {
                self.write_raw(timestamp.wrapping_mul(90), raw);
                self.flush();
            }
        }
        Ok(())
    }

    /// Finalize the current frame and publish it to the ring
    pub fn flush(&mut self) {
        if !self.frame.has_payload() {
            self.frame.reset();
            self.frames_dropped += 1;
            return;
        }
        if self.config.enable_flv {
            self.frame.fill_audio_flv();
        }

        let next = self.ring.take_frame();
        let frame = std::mem::replace(&mut self.frame, next);
        self.ring.publish(frame);
        self.frames_written += 1;
    }

    /// Attach a reader at the newest frame
    pub fn read_ring(&self) -> RingReader {
        self.ring.reader()
    }

    pub fn handle(&self) -> TrackHandle {
        TrackHandle::new("aac", self.ring.handle(), self.meta.clone())
    }

    pub fn stats(&self) -> TrackStats {
        TrackStats {
            ring_size: self.ring.size(),
            resident_keyframes: 0,
            gop: 0,
            frames_written: self.frames_written,
            frames_dropped: self.frames_dropped,
        }
    }

    pub fn close(&mut self) {
        self.ring.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_sequence_header_then_frames() {
        let mut track = AudioTrack::new(TrackConfig::default().enable_flv());
        track
            .write_avcc(0, Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10]))
            .unwrap();
        assert_eq!(track.audio_config().map(|c| c.sampling_frequency), Some(44100));
        assert_eq!(track.stats().frames_written, 0);

        let mut reader = track.read_ring();
        track
            .write_avcc(23, Bytes::from_static(&[0xAF, 0x01, 0x21, 0x10, 0x04]))
            .unwrap();

        let frame = reader.try_read().unwrap().unwrap();
        assert_eq!(frame.pts, 23 * 90);
        assert_eq!(&frame.raw[0][..], &[0x21, 0x10, 0x04]);
        assert_eq!(&frame.flv().unwrap()[11..13], &[0xAF, 0x01]);
    }

    #[test]
    fn test_reader_attaches_at_newest_frame() {
        let mut track = AudioTrack::new(TrackConfig::default());
        for i in 0..3u32 {
            track.write_raw(i * 1920, Bytes::from_static(&[0x21, 0x00]));
            track.flush();
        }

        let mut reader = track.read_ring();
        assert_eq!(reader.try_read().unwrap().unwrap().sequence, 3);
        assert!(track.handle().audio_config().is_none());
    }

    #[test]
    fn test_rejects_non_aac() {
        let mut track = AudioTrack::new(TrackConfig::default());
        let err = track
            .write_avcc(0, Bytes::from_static(&[0x2F, 0x01, 0x00]))
            .unwrap_err();
        assert!(matches!(err, Error::Media(MediaError::UnsupportedCodec(2))));
        assert!(track.unsupported);
        assert!(track.write_avcc(0, Bytes::new()).is_err());
    }

    #[test]
    fn test_unsupported_format_reported_once() {
        let mut track = AudioTrack::new(TrackConfig::default());
        for _ in 0..3 {
            let err = track
                .write_avcc(0, Bytes::from_static(&[0x2F, 0x01, 0x00]))
                .unwrap_err();
            assert!(matches!(err, Error::Media(MediaError::UnsupportedCodec(2))));
            assert!(track.unsupported);
        }

        // AAC still goes through afterwards
        track
            .write_avcc(0, Bytes::from_static(&[0xAF, 0x01, 0x21, 0x10]))
            .unwrap();
        assert_eq!(track.stats().frames_written, 1);
    }

    #[test]
    fn test_empty_flush_is_dropped() {
        let mut track = AudioTrack::new(TrackConfig::default());
        track.write_raw(0, Bytes::new());
        track.flush();
        assert_eq!(track.stats().frames_dropped, 1);
        assert_eq!(track.stats().ring_size, 64);
    }
}
