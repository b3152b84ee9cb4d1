//! Audio output boundary.
//!
//! The APU has no device access; it pushes each frame's interleaved stereo
//! samples into whatever [`AudioSink`] the host injected. [`queue`] builds a
//! bounded single-producer/single-consumer ring suitable for feeding a real
//! audio callback: hand the producer half to the engine and drain the
//! consumer half from the callback thread.
//!
//! Each stereo frame fits in one `AtomicU64` (two `f32` bit patterns), so the
//! ring needs no unsafe code: a slot is published by bumping the free-running
//! write position after the slot store, and reclaimed the same way on the
//! read side.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Receiver for the engine's audio output.
///
/// Samples are interleaved stereo `f32` in `[-1, 1]` at the engine's
/// configured sample rate; one call per emulated frame.
pub trait AudioSink: Send {
    fn push_samples(&mut self, samples: &[f32]);
}

#[inline]
fn pack_frame(left: f32, right: f32) -> u64 {
    ((left.to_bits() as u64) << 32) | right.to_bits() as u64
}

#[inline]
fn unpack_frame(raw: u64) -> (f32, f32) {
    (f32::from_bits((raw >> 32) as u32), f32::from_bits(raw as u32))
}

struct Shared {
    /// Power-of-two slot array; a position maps to `pos & mask`.
    slots: Box<[AtomicU64]>,
    mask: usize,
    /// Free-running frame counts. `write_pos - read_pos` is the fill level;
    /// the positions themselves are only ever advanced by their owner side.
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
}

impl Shared {
    fn len(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }
}

/// Producer half of the queue. Implements [`AudioSink`], dropping frames when
/// the consumer falls behind (the queue is lossy, never blocking).
pub struct QueueProducer {
    shared: Arc<Shared>,
}

/// Consumer half of the queue.
pub struct QueueConsumer {
    shared: Arc<Shared>,
}

/// Create a queue holding `capacity_frames` stereo frames, rounded up to the
/// next power of two.
pub fn queue(capacity_frames: usize) -> (QueueProducer, QueueConsumer) {
    let cap = capacity_frames.max(1).next_power_of_two();
    let slots: Box<[AtomicU64]> = (0..cap).map(|_| AtomicU64::new(0)).collect();

    let shared = Arc::new(Shared {
        slots,
        mask: cap - 1,
        write_pos: AtomicUsize::new(0),
        read_pos: AtomicUsize::new(0),
    });

    (
        QueueProducer {
            shared: Arc::clone(&shared),
        },
        QueueConsumer { shared },
    )
}

impl QueueProducer {
    /// Enqueue one stereo frame. Returns false (dropping the frame) when full.
    #[inline]
    pub fn push_stereo(&self, left: f32, right: f32) -> bool {
        let write = self.shared.write_pos.load(Ordering::Relaxed);
        let read = self.shared.read_pos.load(Ordering::Acquire);
        if write.wrapping_sub(read) > self.shared.mask {
            return false;
        }

        self.shared.slots[write & self.shared.mask].store(pack_frame(left, right), Ordering::Relaxed);
        // Publish the slot: the release pairs with the consumer's acquire of
        // write_pos, ordering the store above before the position becomes
        // visible.
        self.shared.write_pos.store(write.wrapping_add(1), Ordering::Release);
        true
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity_frames(&self) -> usize {
        self.shared.mask + 1
    }
}

impl AudioSink for QueueProducer {
    fn push_samples(&mut self, samples: &[f32]) {
        for frame in samples.chunks_exact(2) {
            self.push_stereo(frame[0], frame[1]);
        }
    }
}

impl QueueConsumer {
    #[inline]
    pub fn pop_stereo(&self) -> Option<(f32, f32)> {
        let read = self.shared.read_pos.load(Ordering::Relaxed);
        let write = self.shared.write_pos.load(Ordering::Acquire);
        if read == write {
            return None;
        }

        let raw = self.shared.slots[read & self.shared.mask].load(Ordering::Relaxed);
        // Release the slot back to the producer only after reading it.
        self.shared.read_pos.store(read.wrapping_add(1), Ordering::Release);
        Some(unpack_frame(raw))
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity_frames(&self) -> usize {
        self.shared.mask + 1
    }
}
