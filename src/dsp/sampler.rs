//! Sample storage and interpolated playback reads.
//!
//! Holds PCM decoded from the SoundFont `smpl` chunk and provides the cursor
//! arithmetic voices rely on: fractional-position reads with linear
//! interpolation, and loop wrap that preserves the fractional remainder so
//! pitch stays continuous across the loop seam.

use std::sync::Arc;

/// An immutable mono sample buffer.
///
/// PCM is stored as f32 (converted from the 16-bit source); all read math is
/// f64. Buffers are shared between zones and voices via `Arc`, so a voice
/// keeps its sample alive even if the owning font is dropped.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    /// Sample name from the `shdr` record (diagnostics only).
    pub name: String,
    data: Vec<f32>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(name: String, data: Vec<f32>, sample_rate: u32) -> Arc<Self> {
        Arc::new(SampleBuffer {
            name,
            data,
            sample_rate,
        })
    }

    /// Convert 16-bit signed PCM into a shared buffer.
    pub fn from_i16(name: String, pcm: &[i16], sample_rate: u32) -> Arc<Self> {
        let data: Vec<f32> = pcm.iter().map(|&s| s as f32 / 32768.0).collect();
        SampleBuffer::new(name, data, sample_rate)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Native sample rate of the recording.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Read a sample with linear interpolation at a fractional position.
    ///
    /// Positions past the end (and the last sample, which has no right
    /// neighbor) read as the nearest valid sample or silence; callers never
    /// see an out-of-bounds access.
    pub fn read_interpolated(&self, position: f64) -> f64 {
        if self.data.is_empty() || position < 0.0 {
            return 0.0;
        }

        let idx = position as usize;
        if idx >= self.data.len() - 1 {
            return if idx < self.data.len() {
                self.data[idx] as f64
            } else {
                0.0
            };
        }

        let frac = position - idx as f64;
        self.data[idx] as f64 * (1.0 - frac) + self.data[idx + 1] as f64 * frac
    }
}

/// Wrap a cursor that ran past `loop_end` back into `[loop_start, loop_end)`.
///
/// The overshoot past the loop end carries over, so a cursor advancing by a
/// fractional step lands at `loop_start + remainder` rather than snapping to
/// the loop start. Requires `loop_end > loop_start`.
pub fn wrap_loop(position: f64, loop_start: f64, loop_end: f64) -> f64 {
    let loop_length = loop_end - loop_start;
    loop_start + (position - loop_end) % loop_length
}
