//! live-ts: Live media cache and MPEG-TS packetizer
//!
//! This library provides the distribution core of a live streaming server:
//! - Annex-B and AVCC ingest for H.264/H.265 video, raw and FLV-wrapped AAC audio
//! - A GOP-aware cyclic frame ring with one writer and many lossy readers
//! - Late joiners start at the newest keyframe
//! - AVCC and FLV tag forms of every frame, built once on demand
//! - MPEG-TS packetizing (PES, PCR, continuity counters, PAT/PMT)
//!
//! # Example: Annex-B in, TS out
//!
//! ```no_run
//! use bytes::Bytes;
//! use live_ts::mpegts::{MemoryTs, PesFrame, PmtStream, PID_VIDEO};
//! use live_ts::media::VideoCodec;
//! use live_ts::track::{TrackConfig, VideoTrack};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut track = VideoTrack::h264(TrackConfig::default());
//!     let mut reader = track.read_ring();
//!
//!     track.write_annexb(0, 0, Bytes::from_static(&[0, 0, 0, 1, 0x65, 0x88, 0x84]));
//!     track.flush();
//!
//!     let frame = reader.read().await?;
//!     let mut ts = MemoryTs::new(&[PmtStream::video(VideoCodec::Avc)]);
//!     let mut pes = PesFrame::new(PID_VIDEO);
//!     ts.write_video_frame(&frame, &track.parameter_sets(), &mut pes)?;
//!
//!     let mut out = Vec::new();
//!     ts.write_to(&mut out).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod media;
pub mod mpegts;
pub mod ring;
pub mod track;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use mpegts::MemoryTs;
pub use ring::{Ring, RingReader};
pub use track::{AudioTrack, Frame, TrackConfig, TrackHandle, UnknownVideo, VideoTrack};
