//! Annex-B to MPEG-TS - Feeds a synthetic H.264 stream through a track and
//! muxes what a reader sees into a transport stream file
//!
//! Run with: cargo run --example annexb_to_ts -- [output.ts]
//!
//! This example demonstrates:
//! - Ingesting Annex-B access units into a `VideoTrack`
//! - Reading the ring from another task through a `TrackHandle`
//! - Packetizing frames with `MemoryTs` and writing PAT/PMT + packets
//!
//! ```text
//!   producer ── write_annexb/flush ──> VideoTrack (ring)
//!                                          │
//!                                    TrackHandle::play
//!                                          │
//!                                          ▼
//!                              MemoryTs ──> output.ts
//! ```

use std::ops::ControlFlow;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use live_ts::media::VideoCodec;
use live_ts::mpegts::{MemoryTs, PesFrame, PmtStream, PID_VIDEO};
use live_ts::track::{TrackConfig, VideoTrack};

const SPS: &[u8] = &[0x67, 0x42, 0xC0, 0x1F, 0xDA, 0x01, 0x40, 0x16, 0xE8];
const PPS: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];
const GOP: u32 = 25;
const FRAMES: u32 = 100;
/// 25 fps in 90 kHz ticks
const FRAME_DURATION: u32 = 3600;

/// Build one access unit; keyframes carry SPS/PPS in front of the IDR slice
fn access_unit(index: u32) -> Bytes {
    let mut buf = BytesMut::new();
    if index % GOP == 0 {
        for nalu in [SPS, PPS] {
            buf.put_slice(&[0x00, 0x00, 0x00, 0x01]);
            buf.put_slice(nalu);
        }
        buf.put_slice(&[0x00, 0x00, 0x00, 0x01, 0x65]);
        buf.put_bytes(0x88, 2000);
    } else {
        buf.put_slice(&[0x00, 0x00, 0x00, 0x01, 0x41]);
        buf.put_bytes(0x9A, 400 + (index % 7) as usize * 50);
    }
    buf.freeze()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("live_ts=debug".parse()?)
                .add_directive("annexb_to_ts=info".parse()?),
        )
        .init();

    let output = std::env::args().nth(1).unwrap_or_else(|| "output.ts".into());

    let mut track = VideoTrack::h264(TrackConfig::default().ring_size(16));
    let handle = track.handle();

    let muxer = tokio::spawn(async move {
        let mut ts = MemoryTs::new(&[PmtStream::video(VideoCodec::Avc)]);
        let mut pes = PesFrame::new(PID_VIDEO);
        let mut frames = 0u32;
        let mut failed = None;

        let played = handle
            .play(|frame| {
                let parameter_sets = handle.parameter_sets();
                match ts.write_video_frame(frame, &parameter_sets, &mut pes) {
                    Ok(()) => {
                        frames += 1;
                        ControlFlow::Continue(())
                    }
                    Err(e) => {
                        failed = Some(e);
                        ControlFlow::Break(())
                    }
                }
            })
            .await;

        match failed {
            Some(e) => Err(e),
            None => played.map(|()| (ts, frames)),
        }
    });

    for index in 0..FRAMES {
        let timestamp = index * FRAME_DURATION;
        track.write_annexb(timestamp, timestamp, access_unit(index));
        track.flush();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let stats = track.stats();
    tracing::info!(
        frames = stats.frames_written,
        ring_size = stats.ring_size,
        gop = stats.gop,
        keyframes = stats.resident_keyframes,
        "Ingest finished"
    );
    // Closing the track ends playback
    drop(track);

    let (ts, frames) = muxer.await??;
    let mut file = File::create(&output).await?;
    let written = ts.write_to(&mut file).await?;
    file.flush().await?;

    tracing::info!(
        path = %output,
        frames,
        packets = ts.packet_count(),
        bytes = written,
        "Transport stream written"
    );
    Ok(())
}
