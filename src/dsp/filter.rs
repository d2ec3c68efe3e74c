//! Biquad lowpass for zone filter generators.
//!
//! Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson),
//! Direct Form II Transposed. Only the lowpass response is needed: SoundFont
//! zones carry an initial cutoff and resonance, fixed for the life of a voice.

use std::f64::consts::PI;

/// A 2nd-order lowpass IIR filter.
#[derive(Debug, Clone)]
pub struct Lowpass {
    cutoff_hz: f64,
    q: f64,

    // Coefficients
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // State (Direct Form II Transposed)
    z1: f64,
    z2: f64,
}

impl Lowpass {
    pub fn new(cutoff_hz: f64, q: f64, sample_rate: f64) -> Self {
        let mut f = Lowpass {
            cutoff_hz,
            q: q.max(0.001),
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
        };
        f.update_coefficients(sample_rate);
        f
    }

    /// Recompute coefficients for a new output rate. Cutoff must stay below
    /// Nyquist for the coefficients to be stable, so it is clamped here.
    pub fn update_coefficients(&mut self, sample_rate: f64) {
        let cutoff = self.cutoff_hz.min(sample_rate * 0.45);
        let w0 = 2.0 * PI * cutoff / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * self.q);

        let b1 = 1.0 - cos_w0;
        let b0 = b1 / 2.0;
        let b2 = b0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    /// Process a single sample through the filter.
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }
}
