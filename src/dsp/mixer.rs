//! Mixer — sums voice blocks into an interleaved accumulator.
//!
//! Accumulation runs in f64; the final write-out converts to f32 with a hard
//! clamp to [-1, 1]. Overdriven mixes clip rather than wrap.

/// Interleaved summing mixer for 1- or 2-channel output.
#[derive(Debug, Clone)]
pub struct Mixer {
    channels: usize,
    buffer: Vec<f64>,
}

impl Mixer {
    /// `channels` is 1 (mono) or 2 (interleaved stereo). The accumulator is
    /// pre-sized to `max_frames` so steady-state mixing never allocates.
    pub fn new(channels: usize, max_frames: usize) -> Self {
        Mixer {
            channels,
            buffer: vec![0.0; channels * max_frames],
        }
    }

    /// Zero the accumulator for a block of `frames` frames.
    pub fn clear(&mut self, frames: usize) {
        for s in self.buffer[..frames * self.channels].iter_mut() {
            *s = 0.0;
        }
    }

    /// Add a mono voice block with per-side gains. Mono output downmixes the
    /// two sides power-preserving: a center-panned voice lands at unit gain.
    pub fn accumulate(&mut self, block: &[f64], gain_left: f64, gain_right: f64) {
        match self.channels {
            1 => {
                let gain = (gain_left + gain_right) * std::f64::consts::FRAC_1_SQRT_2;
                for (frame, &s) in block.iter().enumerate() {
                    self.buffer[frame] += s * gain;
                }
            }
            _ => {
                for (frame, &s) in block.iter().enumerate() {
                    self.buffer[frame * 2] += s * gain_left;
                    self.buffer[frame * 2 + 1] += s * gain_right;
                }
            }
        }
    }

    /// Write the accumulated block into `out` (interleaved f32), hard-clamped.
    pub fn write_out(&self, out: &mut [f32]) {
        for (dst, &src) in out.iter_mut().zip(self.buffer.iter()) {
            *dst = src.clamp(-1.0, 1.0) as f32;
        }
    }
}

/// Constant-power pan law. `pan` is [-0.5, 0.5]; 0.0 splits the signal
/// equally (-3 dB per side).
pub fn pan_gains(pan: f64) -> (f64, f64) {
    let angle = (pan.clamp(-0.5, 0.5) + 0.5) * std::f64::consts::FRAC_PI_2;
    (angle.cos(), angle.sin())
}
