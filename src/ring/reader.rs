//! Ring reader cursor

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{Result, RingError};
use crate::track::Frame;

use super::Shared;

/// Independent cursor over a ring
///
/// A reader is positioned on one slot and keeps that slot pinned. Reading
/// never blocks the writer; when the writer laps the reader, the reader
/// continues from whatever newer frame it finds (delivery is lossy).
pub struct RingReader {
    shared: Shared,
    rx: watch::Receiver<u64>,
    /// Pinned slot
    pos: usize,
    /// The frame at `pos` has been consumed; the next read looks at its successor
    consumed: bool,
    /// Lowest sequence the next read accepts
    expected: u64,
    /// Skip frames until the first keyframe
    need_keyframe: bool,
    current: Option<Arc<Frame>>,
}

impl RingReader {
    /// Attach at the newest join point, or at the write edge when the ring has none
    pub(super) fn attach(shared: Shared, rx: watch::Receiver<u64>) -> Self {
        let (pos, consumed, expected, need_keyframe) = {
            let inner = shared.read();
            let need_keyframe = !inner.every_frame_joins;
            let position = match (inner.last_keyframe, inner.last_written) {
                (Some((slot, sequence)), _) => (slot, false, sequence, false),
                (None, Some(slot)) => {
                    let sequence = inner.sequence_at(slot).unwrap_or(0);
                    (slot, true, sequence + 1, need_keyframe)
                }
                (None, None) => (inner.write, false, 1, need_keyframe),
            };
            inner.pin(position.0);
            position
        };

        Self {
            shared,
            rx,
            pos,
            consumed,
            expected,
            need_keyframe,
            current: None,
        }
    }

    /// Wait for the frame at the cursor.
    ///
    /// Returns the same frame again until [`move_next`](Self::move_next) is
    /// called. Fails with [`RingError::Closed`] once the writer is gone and
    /// every remaining frame has been read.
    pub async fn read(&mut self) -> Result<Arc<Frame>> {
        loop {
            self.rx.borrow_and_update();
            if let Some(frame) = self.try_read()? {
                return Ok(frame);
            }
            if self.rx.changed().await.is_err() {
                return self
                    .try_read()?
                    .ok_or_else(|| RingError::Closed.into());
            }
        }
    }

    /// The frame at the cursor if it has been written, without waiting
    pub fn try_read(&mut self) -> Result<Option<Arc<Frame>>> {
        let inner = self.shared.read();
        loop {
            let target = if self.consumed {
                inner.slots[self.pos].next
            } else {
                self.pos
            };

            let frame = match &inner.slots[target].frame {
                Some(frame) if frame.sequence >= self.expected => frame.clone(),
                _ if inner.closed => return Err(RingError::Closed.into()),
                _ => return Ok(None),
            };

            if target != self.pos {
                inner.pin(target);
                inner.unpin(self.pos);
                self.pos = target;
            }

            if self.need_keyframe && !frame.keyframe {
                self.consumed = true;
                self.expected = frame.sequence + 1;
                continue;
            }

            self.need_keyframe = false;
            self.consumed = false;
            self.expected = frame.sequence;
            self.current = Some(frame.clone());
            return Ok(Some(frame));
        }
    }

    /// Advance past the frame returned by the last read.
    ///
    /// Does nothing if no frame was read since the last move.
    pub fn move_next(&mut self) {
        if let Some(frame) = self.current.take() {
            self.expected = frame.sequence + 1;
            self.consumed = true;
        }
    }

    /// The frame returned by the last read, until the cursor moves
    pub fn current(&self) -> Option<&Arc<Frame>> {
        self.current.as_ref()
    }
}

impl Drop for RingReader {
    fn drop(&mut self) {
        self.shared.read().unpin(self.pos);
    }
}

impl std::fmt::Debug for RingReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingReader")
            .field("pos", &self.pos)
            .field("expected", &self.expected)
            .field("need_keyframe", &self.need_keyframe)
            .finish()
    }
}
