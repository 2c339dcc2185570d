//! Media tracks
//!
//! A track owns one [`Ring`](crate::ring::Ring) and is its only writer. It
//! assembles ingest data into a [`Frame`], finalizes it with `flush` and
//! publishes it to every reader.
//!
//! Downstream consumers hold a [`TrackHandle`] instead of the track itself:
//! it attaches readers and exposes the codec configuration a muxer needs.

mod audio;
mod config;
mod frame;
mod video;

pub use audio::AudioTrack;
pub use config::TrackConfig;
pub use frame::Frame;
pub use video::{UnknownVideo, VideoTrack};

use std::ops::ControlFlow;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{Error, Result, RingError};
use crate::media::annexb;
use crate::media::AudioSpecificConfig;
use crate::ring::{RingHandle, RingReader};

/// Parameter set NALUs (VPS/SPS/PPS) that must precede a keyframe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSets {
    sets: Vec<Bytes>,
}

impl ParameterSets {
    pub fn new(sets: Vec<Bytes>) -> Self {
        Self { sets }
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.sets.iter()
    }

    /// Store `set`, replacing the one of the same NALU type.
    ///
    /// Sets stay ordered by type (VPS, SPS, PPS).
    pub(crate) fn replace(&mut self, set: Bytes, nalu_type: impl Fn(&[u8]) -> u8) {
        let kind = nalu_type(&set[..]);
        match self.sets.iter().position(|s| nalu_type(&s[..]) >= kind) {
            Some(i) if nalu_type(&self.sets[i][..]) == kind => self.sets[i] = set,
            Some(i) => self.sets.insert(i, set),
            None => self.sets.push(set),
        }
    }

    /// Annex-B fragments: a 4-byte start code before every set
    pub fn annexb(&self) -> Vec<Bytes> {
        let mut out = Vec::with_capacity(self.sets.len() * 2);
        for set in &self.sets {
            out.push(annexb::start_code());
            out.push(set.clone());
        }
        out
    }
}

/// Codec configuration shared between a track and its handles
#[derive(Debug, Clone, Default)]
pub struct TrackMeta {
    /// Current video parameter sets
    pub parameter_sets: ParameterSets,
    /// Raw decoder configuration record from the last sequence header
    pub sequence_header: Option<Bytes>,
    /// Audio configuration from the AAC sequence header
    pub audio_config: Option<AudioSpecificConfig>,
}

/// Snapshot of a track's ring bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackStats {
    /// Linked ring slots
    pub ring_size: usize,
    /// Keyframes currently held by the ring
    pub resident_keyframes: usize,
    /// Frames between the last two keyframes
    pub gop: u64,
    /// Frames published
    pub frames_written: u64,
    /// Flushes that carried no payload
    pub frames_dropped: u64,
}

/// Cloneable read side of a track
#[derive(Debug, Clone)]
pub struct TrackHandle {
    codec: &'static str,
    ring: RingHandle,
    meta: Arc<RwLock<TrackMeta>>,
}

impl TrackHandle {
    pub(crate) fn new(codec: &'static str, ring: RingHandle, meta: Arc<RwLock<TrackMeta>>) -> Self {
        Self { codec, ring, meta }
    }

    /// Codec name ("h264", "h265", "aac")
    pub fn codec(&self) -> &'static str {
        self.codec
    }

    /// Attach a reader at the newest keyframe
    pub fn read_ring(&self) -> RingReader {
        self.ring.reader()
    }

    /// Current parameter sets
    pub fn parameter_sets(&self) -> ParameterSets {
        self.meta.read().parameter_sets.clone()
    }

    /// AAC configuration, once the sequence header arrived
    pub fn audio_config(&self) -> Option<AudioSpecificConfig> {
        self.meta.read().audio_config.clone()
    }

    /// Raw decoder configuration record, once a sequence header arrived
    pub fn sequence_header(&self) -> Option<Bytes> {
        self.meta.read().sequence_header.clone()
    }

    /// Whether the writer is gone
    pub fn is_closed(&self) -> bool {
        self.ring.is_closed()
    }

    /// Hand every frame to `on_frame` in order, starting at the newest keyframe.
    ///
    /// Returns when the callback breaks or the track closes.
    pub async fn play<F>(&self, mut on_frame: F) -> Result<()>
    where
        F: FnMut(&Frame) -> ControlFlow<()>,
    {
        let mut reader = self.read_ring();
        loop {
            let frame = match reader.read().await {
                Ok(frame) => frame,
                Err(Error::Ring(RingError::Closed)) => return Ok(()),
                Err(e) => return Err(e),
            };
            if on_frame(&frame).is_break() {
                return Ok(());
            }
            reader.move_next();
        }
    }
}
