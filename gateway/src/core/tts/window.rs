//! Sliding-window decoding of codec frames into PCM.
//!
//! The model emits codec frames one at a time. Decoding every frame in
//! isolation causes audible seams, so each window is decoded together with
//! up to `lookback` frames of already-emitted context and only the samples of
//! the new frames are kept.

/// Turns codec frames into 16-bit PCM.
pub trait FrameDecoder: Send {
    type Frame: Clone + Send;

    /// Samples produced per frame.
    fn samples_per_frame(&self) -> usize;

    /// Decode `frames`, the first of which sits at absolute position
    /// `first_index` in the utterance. Must return exactly
    /// `frames.len() * samples_per_frame()` samples.
    fn decode(&self, first_index: usize, frames: &[Self::Frame]) -> Vec<i16>;
}

/// Accumulates frames and releases decoded PCM every `chunk_size` frames.
pub struct FrameWindow<D: FrameDecoder> {
    decoder: D,
    chunk_size: usize,
    lookback: usize,
    /// Retained frames: lookback context followed by pending frames
    frames: Vec<D::Frame>,
    /// Absolute index of `frames[0]`
    base: usize,
    /// Absolute index of the first frame not yet emitted
    emitted: usize,
}

impl<D: FrameDecoder> FrameWindow<D> {
    pub fn new(decoder: D, chunk_size: usize, lookback: usize) -> Self {
        Self {
            decoder,
            chunk_size: chunk_size.max(1),
            lookback,
            frames: Vec::new(),
            base: 0,
            emitted: 0,
        }
    }

    fn pending(&self) -> usize {
        self.base + self.frames.len() - self.emitted
    }

    /// Add a frame. Returns PCM once a full window is pending.
    pub fn push(&mut self, frame: D::Frame) -> Option<Vec<i16>> {
        self.frames.push(frame);
        if self.pending() >= self.chunk_size {
            Some(self.flush())
        } else {
            None
        }
    }

    /// Decode whatever is still pending.
    pub fn finish(&mut self) -> Option<Vec<i16>> {
        if self.pending() == 0 {
            return None;
        }
        Some(self.flush())
    }

    fn flush(&mut self) -> Vec<i16> {
        let start = self.emitted.saturating_sub(self.lookback).max(self.base);
        let offset = start - self.base;
        let decoded = self.decoder.decode(start, &self.frames[offset..]);

        let skip = (self.emitted - start) * self.decoder.samples_per_frame();
        let samples = decoded.get(skip..).map(<[i16]>::to_vec).unwrap_or_default();

        self.emitted = self.base + self.frames.len();

        // Keep only the context the next window can look back on.
        let keep_from = self.emitted.saturating_sub(self.lookback).max(self.base);
        self.frames.drain(..keep_from - self.base);
        self.base = keep_from;

        samples
    }
}
