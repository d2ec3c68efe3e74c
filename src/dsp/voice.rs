//! Voice — a single sounding note: sample cursor, envelope, optional filter.
//!
//! Voices live in a fixed pool owned by the engine. `start` rebinds an idle
//! or stolen voice to a new zone without allocating (the sample is an `Arc`
//! clone), and a voice reports itself finished once its envelope falls below
//! the silence floor or a non-looping sample runs out.

use std::sync::Arc;

use super::envelope::{Envelope, Stage};
use super::filter::Lowpass;
use super::sampler::{wrap_loop, SampleBuffer};
use crate::preset::{sample_playback_rate, LoopMode, Zone};

/// A pooled playback voice.
#[derive(Debug, Clone)]
pub struct Voice {
    channel: u8,
    note: u8,
    /// Monotonic start counter, used for oldest-voice stealing.
    age: u64,
    sample: Option<Arc<SampleBuffer>>,
    /// Fractional read cursor into the sample.
    position: f64,
    /// Cursor advance per output sample at neutral pitch bend.
    step: f64,
    /// Source-rate cursor advance (zone rate × pitch ratio); divided by the
    /// output rate to get `step`, so output-rate changes can recompute it.
    natural_step: f64,
    loop_mode: LoopMode,
    loop_start: f64,
    loop_end: f64,
    /// Zone pan [-0.5, 0.5], combined with channel pan at mix time.
    pan: f64,
    /// Zone attenuation × velocity gain.
    gain: f64,
    envelope: Envelope,
    filter: Option<Lowpass>,
    released: bool,
}

impl Voice {
    /// An idle voice, ready for the pool.
    pub fn idle() -> Self {
        Voice {
            channel: 0,
            note: 0,
            age: 0,
            sample: None,
            position: 0.0,
            step: 0.0,
            natural_step: 0.0,
            loop_mode: LoopMode::None,
            loop_start: 0.0,
            loop_end: 0.0,
            pan: 0.0,
            gain: 0.0,
            envelope: Envelope::new(Default::default(), 44100.0),
            filter: None,
            released: false,
        }
    }

    /// Bind this voice to a zone and trigger it.
    pub fn start(
        &mut self,
        zone: &Zone,
        channel: u8,
        note: u8,
        velocity: u8,
        output_rate: f64,
        age: u64,
    ) {
        let pitch_rate =
            sample_playback_rate(note, zone.root_key, zone.coarse_tune, zone.fine_tune);

        self.channel = channel;
        self.note = note;
        self.age = age;
        self.sample = Some(Arc::clone(&zone.sample));
        self.position = 0.0;
        self.natural_step = pitch_rate * zone.sample.sample_rate() as f64;
        self.step = self.natural_step / output_rate;
        self.loop_mode = zone.loop_mode;
        self.loop_start = zone.loop_start as f64;
        self.loop_end = zone.loop_end as f64;
        self.pan = zone.pan;
        self.gain = zone.attenuation * (velocity as f64 / 127.0);
        self.envelope = Envelope::new(zone.envelope, output_rate);
        self.envelope.gate_on();
        self.filter = zone
            .filter
            .map(|f| Lowpass::new(f.cutoff_hz, f.q, output_rate));
        self.released = false;
    }

    /// Note off: enter the release stage. Loop-until-release zones play out
    /// to the sample end from here.
    pub fn release(&mut self) {
        self.released = true;
        self.envelope.gate_off();
    }

    /// Adopt a new output sample rate between blocks. The cursor keeps its
    /// position; only the per-sample step and envelope timing rescale.
    pub fn set_output_rate(&mut self, output_rate: f64) {
        if output_rate <= 0.0 {
            return;
        }
        self.step = self.natural_step / output_rate;
        self.envelope.set_sample_rate(output_rate);
        if let Some(f) = self.filter.as_mut() {
            f.update_coefficients(output_rate);
        }
    }

    /// Render a mono block into `out`, scaled by envelope and gain.
    /// `pitch_ratio` is the channel's pitch-bend multiplier for this block.
    pub fn render_block(&mut self, out: &mut [f64], pitch_ratio: f64) {
        let Some(sample) = self.sample.clone() else {
            out.fill(0.0);
            return;
        };
        let step = self.step * pitch_ratio;
        let looping = self.loop_end > self.loop_start
            && match self.loop_mode {
                LoopMode::None => false,
                LoopMode::Continuous => true,
                LoopMode::UntilRelease => !self.released,
            };

        for (i, o) in out.iter_mut().enumerate() {
            if self.envelope.is_finished() {
                self.retire();
                out[i..].fill(0.0);
                return;
            }

            let env = self.envelope.next_sample();
            let mut s = sample.read_interpolated(self.position);
            if let Some(f) = self.filter.as_mut() {
                s = f.process(s);
            }
            *o = s * env * self.gain;

            self.position += step;
            if looping {
                if self.position >= self.loop_end {
                    self.position = wrap_loop(self.position, self.loop_start, self.loop_end);
                }
            } else if self.position >= sample.len() as f64 {
                self.retire();
                if i + 1 < out.len() {
                    out[i + 1..].fill(0.0);
                }
                return;
            }
        }
    }

    /// Still sounding (not idle, not finished)?
    pub fn is_active(&self) -> bool {
        !matches!(self.envelope.stage(), Stage::Idle | Stage::Finished)
    }

    pub fn is_releasing(&self) -> bool {
        self.envelope.is_releasing()
    }

    /// Does this voice answer a note-off for (channel, note)? Released
    /// voices don't — a re-struck note must not cut its own tail short.
    pub fn matches_note(&self, channel: u8, note: u8) -> bool {
        self.is_active() && !self.released && self.channel == channel && self.note == note
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn pan(&self) -> f64 {
        self.pan
    }

    /// Current envelope level, for quietest-voice stealing.
    pub fn envelope_level(&self) -> f64 {
        self.envelope.level()
    }

    #[cfg(test)]
    pub fn position(&self) -> f64 {
        self.position
    }

    fn retire(&mut self) {
        self.sample = None;
        self.envelope.kill();
    }
}
