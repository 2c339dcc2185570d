//! GOP-aware cyclic frame cache
//!
//! A [`Ring`] is a circle of slots stored in an arena and linked by index.
//! One writer (the owning track) fills slots in order; any number of
//! [`RingReader`]s walk the circle behind it at their own pace.
//!
//! ```text
//!            last_written    write
//!                 |            |
//!   ... -> [F41] -> [F42] -> [F35] -> [F36] -> ...
//!                             oldest
//! ```
//!
//! The writer can grow the circle (new slots are linked in between the newest
//! and the oldest frame) or shrink it (oldest slots are unlinked and put on a
//! free list). Both happen under the exclusive lock. A reader pins the slot
//! it is positioned on so that a shrink never unlinks it.
//!
//! Readers never block the writer: a reader that falls a full lap behind
//! simply finds a newer frame in its next slot and continues from there.

mod reader;

pub use reader::RingReader;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::track::Frame;

/// Upper bound on recycled frames kept around between flushes
const POOL_LIMIT: usize = 8;

pub(crate) struct Slot {
    frame: Option<Arc<Frame>>,
    next: usize,
    readers: AtomicUsize,
}

impl Slot {
    fn empty(next: usize) -> Self {
        Self {
            frame: None,
            next,
            readers: AtomicUsize::new(0),
        }
    }

    fn is_keyframe(&self) -> bool {
        self.frame.as_ref().map_or(false, |f| f.keyframe)
    }

    fn is_pinned(&self) -> bool {
        self.readers.load(Ordering::Acquire) > 0
    }
}

/// Ring structure, shared between the writer and its readers
pub(crate) struct Inner {
    slots: Vec<Slot>,
    free: Vec<usize>,
    size: usize,
    /// Slot the next frame is stored in (holds the oldest frame once full)
    write: usize,
    last_written: Option<usize>,
    /// Newest join point: slot index and the sequence stored there
    last_keyframe: Option<(usize, u64)>,
    /// Every frame is a join point (audio)
    every_frame_joins: bool,
    closed: bool,
}

impl Inner {
    fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            slots: (0..size).map(|i| Slot::empty((i + 1) % size)).collect(),
            free: Vec::new(),
            size,
            write: 0,
            last_written: None,
            last_keyframe: None,
            every_frame_joins: false,
            closed: false,
        }
    }

    fn alloc(&mut self) -> usize {
        match self.free.pop() {
            Some(idx) => idx,
            None => {
                self.slots.push(Slot::empty(0));
                self.slots.len() - 1
            }
        }
    }

    fn sequence_at(&self, idx: usize) -> Option<u64> {
        self.slots[idx].frame.as_ref().map(|f| f.sequence)
    }

    pub(crate) fn pin(&self, idx: usize) {
        self.slots[idx].readers.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unpin(&self, idx: usize) {
        self.slots[idx].readers.fetch_sub(1, Ordering::AcqRel);
    }
}

pub(crate) type Shared = Arc<RwLock<Inner>>;

/// Writer side of the ring
///
/// Owned by exactly one track. Dropping it closes the ring; readers drain
/// what is left and then get [`RingError::Closed`](crate::error::RingError).
pub struct Ring {
    shared: Shared,
    tx: watch::Sender<u64>,
    pool: Vec<Frame>,
    sequence: u64,
}

impl Ring {
    /// Create a ring with `size` empty slots (at least one)
    pub fn new(size: usize) -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            shared: Arc::new(RwLock::new(Inner::new(size))),
            tx,
            pool: Vec::new(),
            sequence: 0,
        }
    }

    /// Treat every frame as a join point instead of keyframes only
    pub fn every_frame_joins(self) -> Self {
        self.shared.write().every_frame_joins = true;
        self
    }

    /// Number of linked slots
    pub fn size(&self) -> usize {
        self.shared.read().size
    }

    /// Sequence the next published frame will get
    pub fn next_sequence(&self) -> u64 {
        self.sequence + 1
    }

    /// Sequence of the newest published frame, 0 before the first
    pub fn last_sequence(&self) -> u64 {
        self.sequence
    }

    /// Sequence of the newest join point still in the ring
    pub fn last_keyframe(&self) -> Option<u64> {
        self.shared.read().last_keyframe.map(|(_, seq)| seq)
    }

    /// Whether the slot about to be overwritten holds a keyframe
    pub fn write_slot_is_keyframe(&self) -> bool {
        let inner = self.shared.read();
        inner.slots[inner.write].is_keyframe()
    }

    /// A cleared frame to assemble the next access unit into
    pub fn take_frame(&mut self) -> Frame {
        self.pool.pop().unwrap_or_default()
    }

    /// Hand an unused frame back to the pool
    pub fn recycle(&mut self, mut frame: Frame) {
        if self.pool.len() < POOL_LIMIT {
            frame.reset();
            self.pool.push(frame);
        }
    }

    /// Link `count` empty slots in between the newest and the oldest frame.
    ///
    /// The next frame goes into the first new slot, so the oldest frame
    /// survives one more lap.
    pub fn grow(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        let mut inner = self.shared.write();
        let after = match inner.last_written {
            Some(idx) => idx,
            None => return,
        };
        let tail = inner.slots[after].next;

        let mut prev = after;
        let mut first = None;
        for _ in 0..count {
            let idx = inner.alloc();
            inner.slots[prev].next = idx;
            first.get_or_insert(idx);
            prev = idx;
        }
        inner.slots[prev].next = tail;
        if let Some(first) = first {
            inner.write = first;
        }
        inner.size += count;

        tracing::debug!(size = inner.size, added = count, "Ring grown");
    }

    /// Unlink up to `count` of the oldest slots.
    ///
    /// Stops early at a slot a reader is positioned on, at the newest join
    /// point and at the newest frame. Returns how many keyframes were
    /// removed.
    pub fn shrink(&mut self, count: usize) -> usize {
        let mut guard = self.shared.write();
        let inner = &mut *guard;
        let last_written = match inner.last_written {
            Some(idx) => idx,
            None => return 0,
        };
        let marker = inner.last_keyframe.map(|(idx, _)| idx);

        let mut cursor = inner.write;
        let mut removed = 0;
        let mut removed_keyframes = 0;
        while removed < count && inner.size > 1 {
            let slot = &mut inner.slots[cursor];
            if cursor == last_written || Some(cursor) == marker || slot.is_pinned() {
                break;
            }
            let next = slot.next;
            if let Some(frame) = slot.frame.take() {
                if frame.keyframe {
                    removed_keyframes += 1;
                }
                if let Ok(frame) = Arc::try_unwrap(frame) {
                    if self.pool.len() < POOL_LIMIT {
                        let mut frame = frame;
                        frame.reset();
                        self.pool.push(frame);
                    }
                }
            }
            inner.free.push(cursor);
            inner.size -= 1;
            removed += 1;
            cursor = next;
        }

        if removed > 0 {
            inner.slots[last_written].next = cursor;
            inner.write = cursor;
            tracing::debug!(
                size = inner.size,
                removed,
                removed_keyframes,
                "Ring shrunk"
            );
        }
        removed_keyframes
    }

    /// Store a finalized frame in the write slot and advance.
    ///
    /// Assigns the frame's sequence, moves the join marker and wakes every
    /// waiting reader. Returns the sequence.
    pub fn publish(&mut self, mut frame: Frame) -> u64 {
        self.sequence += 1;
        let sequence = self.sequence;
        frame.sequence = sequence;

        let previous = {
            let mut inner = self.shared.write();
            let idx = inner.write;
            if matches!(inner.last_keyframe, Some((slot, _)) if slot == idx) {
                inner.last_keyframe = None;
            }
            let joins = frame.keyframe || inner.every_frame_joins;
            let previous = inner.slots[idx].frame.replace(Arc::new(frame));
            if joins {
                inner.last_keyframe = Some((idx, sequence));
            }
            inner.last_written = Some(idx);
            inner.write = inner.slots[idx].next;
            previous
        };

        if let Some(Ok(frame)) = previous.map(Arc::try_unwrap) {
            self.recycle(frame);
        }
        self.tx.send_replace(sequence);
        sequence
    }

    /// Cloneable read-side handle
    pub fn handle(&self) -> RingHandle {
        RingHandle {
            shared: self.shared.clone(),
            rx: self.tx.subscribe(),
        }
    }

    /// Attach a new reader at the newest join point
    pub fn reader(&self) -> RingReader {
        self.handle().reader()
    }

    /// Mark the ring closed and wake all readers
    pub fn close(&mut self) {
        self.shared.write().closed = true;
        self.tx.send_modify(|_| {});
    }

    #[cfg(test)]
    pub(crate) fn resident_keyframes(&self) -> usize {
        let inner = self.shared.read();
        self.walk(&inner)
            .into_iter()
            .filter(|&idx| inner.slots[idx].is_keyframe())
            .count()
    }

    /// Stored sequences from the oldest to the newest slot
    #[cfg(test)]
    pub(crate) fn sequences(&self) -> Vec<u64> {
        let inner = self.shared.read();
        self.walk(&inner)
            .into_iter()
            .filter_map(|idx| inner.sequence_at(idx))
            .collect()
    }

    #[cfg(test)]
    fn walk(&self, inner: &Inner) -> Vec<usize> {
        let mut out = Vec::with_capacity(inner.size);
        let mut idx = inner.write;
        for _ in 0..inner.size {
            out.push(idx);
            idx = inner.slots[idx].next;
        }
        out
    }
}

impl Drop for Ring {
    fn drop(&mut self) {
        self.close();
    }
}

/// Cloneable read side of a ring
#[derive(Clone)]
pub struct RingHandle {
    shared: Shared,
    rx: watch::Receiver<u64>,
}

impl RingHandle {
    /// Attach a new reader at the newest join point
    pub fn reader(&self) -> RingReader {
        RingReader::attach(self.shared.clone(), self.rx.clone())
    }

    /// Whether the writer has closed the ring
    pub fn is_closed(&self) -> bool {
        self.shared.read().closed
    }
}

impl std::fmt::Debug for RingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.read();
        f.debug_struct("RingHandle")
            .field("size", &inner.size)
            .field("closed", &inner.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame(keyframe: bool) -> Frame {
        let mut frame = Frame::new();
        frame.keyframe = keyframe;
        frame.append_raw(Bytes::from_static(&[0x41, 0x9A]));
        frame
    }

    #[test]
    fn test_publish_wraps_around() {
        let mut ring = Ring::new(3);
        for i in 0..5 {
            ring.publish(frame(i == 0));
        }

        assert_eq!(ring.size(), 3);
        assert_eq!(ring.last_sequence(), 5);
        assert_eq!(ring.sequences(), vec![3, 4, 5]);
        // The keyframe at sequence 1 was overwritten
        assert_eq!(ring.last_keyframe(), None);
    }

    #[test]
    fn test_grow_keeps_oldest_frame() {
        let mut ring = Ring::new(3);
        for i in 0..3 {
            ring.publish(frame(i == 0));
        }
        assert!(ring.write_slot_is_keyframe());

        ring.grow(2);
        assert_eq!(ring.size(), 5);
        ring.publish(frame(false));

        assert_eq!(ring.sequences(), vec![1, 2, 3, 4]);
        assert_eq!(ring.last_keyframe(), Some(1));
        assert!(!ring.write_slot_is_keyframe());
    }

    #[test]
    fn test_grow_single_slot_ring() {
        let mut ring = Ring::new(1);
        ring.publish(frame(true));
        ring.grow(2);
        ring.publish(frame(false));
        ring.publish(frame(false));

        assert_eq!(ring.size(), 3);
        assert_eq!(ring.sequences(), vec![1, 2, 3]);
    }

    #[test]
    fn test_shrink_counts_removed_keyframes() {
        let mut ring = Ring::new(6);
        for i in 0..6 {
            ring.publish(frame(i == 0 || i == 4));
        }

        // Oldest are 1 (keyframe), 2, 3; then 4, 5 (marker), 6
        let removed = ring.shrink(3);
        assert_eq!(removed, 1);
        assert_eq!(ring.size(), 3);
        assert_eq!(ring.sequences(), vec![4, 5, 6]);

        // The marker and the newest frame are never removed
        assert_eq!(ring.shrink(10), 0);
        assert_eq!(ring.sequences(), vec![5, 6]);
        assert_eq!(ring.last_keyframe(), Some(5));
    }

    #[test]
    fn test_shrink_stops_at_pinned_slot() {
        let mut ring = Ring::new(5);
        ring.publish(frame(true));
        // Positioned on the first slot until it reads
        let _reader = ring.reader();
        for i in 0..4 {
            ring.publish(frame(i == 3));
        }
        assert_eq!(ring.last_keyframe(), Some(5));

        assert_eq!(ring.shrink(2), 0);
        assert_eq!(ring.size(), 5);
    }

    #[test]
    fn test_shrink_without_readers() {
        let mut ring = Ring::new(5);
        for i in 0..5 {
            ring.publish(frame(i == 0 || i == 4));
        }

        assert_eq!(ring.shrink(2), 1);
        assert_eq!(ring.sequences(), vec![3, 4, 5]);
    }

    #[test]
    fn test_freed_slots_are_reused() {
        let mut ring = Ring::new(6);
        for i in 0..6 {
            ring.publish(frame(i == 5));
        }
        ring.shrink(3);
        assert_eq!(ring.size(), 3);

        let arena = ring.shared.read().slots.len();
        ring.publish(frame(false));
        ring.grow(2);
        assert_eq!(ring.size(), 5);
        assert_eq!(ring.shared.read().slots.len(), arena);
    }

    #[test]
    fn test_overwritten_frames_are_recycled() {
        let mut ring = Ring::new(1);
        ring.publish(frame(true));
        ring.publish(frame(false));

        let recycled = ring.take_frame();
        assert!(!recycled.has_payload());
        assert!(recycled.raw.capacity() > 0);
    }

    #[test]
    fn test_every_frame_joins() {
        let mut ring = Ring::new(4).every_frame_joins();
        ring.publish(frame(false));
        ring.publish(frame(false));
        assert_eq!(ring.last_keyframe(), Some(2));
    }

    #[test]
    fn test_close_is_visible_to_handles() {
        let mut ring = Ring::new(2);
        let handle = ring.handle();
        assert!(!handle.is_closed());
        ring.close();
        assert!(handle.is_closed());
    }
}
