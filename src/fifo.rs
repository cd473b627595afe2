//! Receive FIFO readout.
//!
//! This module reads IQ samples from the AXI-Stream receive FIFO and packs them
//! into frames. Each frame has a 32-bit little-endian frame counter followed
//! by [`FRAME_SAMPLES`] samples, each formed by a little-endian 16-bit I and a
//! little-endian 16-bit Q.

use crate::{
    registers::{IqSample, RxFifo, FIFO_ADDRESS, MAP_SIZE},
    regs::{RegisterBus, RegisterPort},
};
use anyhow::{Context, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::time::{Duration, Instant};

/// Number of samples in each frame.
pub const FRAME_SAMPLES: usize = 256;

/// Size of each frame in bytes.
pub const FRAME_BYTES: usize = 4 + 4 * FRAME_SAMPLES;

/// Number of words read by default by [`drain`] (10 seconds at 48 ksps).
pub const DEFAULT_DRAIN_WORDS: usize = 480_000;

/// Builds a frame.
///
/// Only the first [`FRAME_SAMPLES`] samples are used. If there are fewer
/// samples, the frame is shorter.
pub fn build_frame<I: IntoIterator<Item = IqSample>>(counter: u32, samples: I) -> Bytes {
    let mut frame = BytesMut::with_capacity(FRAME_BYTES);
    frame.put_u32_le(counter);
    for sample in samples.into_iter().take(FRAME_SAMPLES) {
        frame.put_slice(&sample.to_le_bytes());
    }
    frame.freeze()
}

/// Frame reader.
///
/// Reads samples from the receive FIFO and assembles them into frames with
/// consecutive frame counters. The counter wraps around after `2^32` frames.
#[derive(Debug)]
pub struct FrameReader<P> {
    fifo: RxFifo<P>,
    counter: u32,
}

impl<P: RegisterPort> FrameReader<P> {
    /// Creates a frame reader from a port opened at [`FIFO_ADDRESS`].
    pub fn new(port: P) -> FrameReader<P> {
        FrameReader {
            fifo: RxFifo::new(port),
            counter: 0,
        }
    }

    /// Reads the next frame.
    ///
    /// This busy-waits until enough samples are available in the FIFO.
    pub fn next_frame(&mut self) -> Bytes {
        let fifo = &self.fifo;
        let frame = build_frame(
            self.counter,
            (0..FRAME_SAMPLES).map(|_| fifo.read_sample_blocking()),
        );
        self.counter = self.counter.wrapping_add(1);
        frame
    }

    /// Reads the next frame, unless cancelled.
    ///
    /// This busy-waits until enough samples are available in the FIFO,
    /// polling `cancelled` while the FIFO is empty. If it returns `true`, the
    /// samples read so far are discarded, the frame counter is not advanced,
    /// and `None` is returned.
    pub fn next_frame_until(&mut self, mut cancelled: impl FnMut() -> bool) -> Option<Bytes> {
        let mut samples = Vec::with_capacity(FRAME_SAMPLES);
        for _ in 0..FRAME_SAMPLES {
            samples.push(self.fifo.read_sample_until(&mut cancelled)?);
        }
        let frame = build_frame(self.counter, samples);
        self.counter = self.counter.wrapping_add(1);
        Some(frame)
    }
}

/// Opens the receive FIFO on `bus`.
pub fn open_fifo<B: RegisterBus>(bus: &B) -> Result<B::Port> {
    bus.open(FIFO_ADDRESS, MAP_SIZE)
        .context("failed to open receive FIFO")
}

/// Summary of a FIFO drain.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DrainSummary {
    /// Number of words read.
    pub words: usize,
    /// Time taken to read the words.
    pub elapsed: Duration,
}

impl DrainSummary {
    /// Average rate at which words were read, in words per second.
    pub fn words_per_second(&self) -> f64 {
        self.words as f64 / self.elapsed.as_secs_f64()
    }
}

/// Reads and discards `words` words from the receive FIFO.
///
/// This busy-waits until all the words have been read.
#[tracing::instrument(level = "debug", skip(bus))]
pub fn drain<B: RegisterBus>(bus: &B, words: usize) -> Result<DrainSummary> {
    let mut port = open_fifo(bus)?;
    let start = Instant::now();
    let words = RxFifo::new(&mut port).drain(words);
    let elapsed = start.elapsed();
    port.close()?;
    Ok(DrainSummary { words, elapsed })
}
