//! Synth engine — MIDI channels, a bounded voice pool, and block rendering.
//!
//! The engine owns a pre-sized voice pool and renders interleaved f32 in
//! fixed-size internal blocks, so steady-state rendering never allocates.
//! Control calls (note on/off, preset/volume/pan/bend changes, output
//! reconfiguration) take effect at the next block; nothing resamples
//! mid-block.

use std::sync::Arc;

use super::mixer::{pan_gains, Mixer};
use super::voice::Voice;
use crate::preset::PresetInfo;
use crate::soundfont::SoundFont;

/// Frames per internal render block.
pub const MAX_BLOCK_FRAMES: usize = 256;

/// Number of MIDI channels.
pub const NUM_CHANNELS: usize = 16;

/// Default polyphony cap.
pub const DEFAULT_MAX_VOICES: usize = 64;

/// Bank number conventionally holding percussion presets.
pub const DRUM_BANK: u16 = 128;

/// Construction-time engine settings.
#[derive(Debug, Clone, Copy)]
pub struct SynthConfig {
    pub sample_rate: u32,
    /// Output channels: 1 (mono) or 2 (interleaved stereo).
    pub channels: u16,
    pub max_voices: usize,
}

impl Default for SynthConfig {
    fn default() -> Self {
        SynthConfig {
            sample_rate: 44100,
            channels: 2,
            max_voices: DEFAULT_MAX_VOICES,
        }
    }
}

/// Per-channel MIDI state.
#[derive(Debug, Clone, Copy)]
struct Channel {
    bank: u16,
    program: u8,
    volume: f64,
    pan: f64,
    /// 14-bit pitch wheel value, 8192 = center.
    pitch_bend: u16,
}

impl Default for Channel {
    fn default() -> Self {
        Channel {
            bank: 0,
            program: 0,
            volume: 1.0,
            pan: 0.0,
            pitch_bend: 8192,
        }
    }
}

impl Channel {
    /// Pitch multiplier for the wheel position, ±2 semitone range.
    fn pitch_ratio(&self) -> f64 {
        let semitones = (self.pitch_bend as f64 - 8192.0) / 8192.0 * 2.0;
        (2.0_f64).powf(semitones / 12.0)
    }
}

/// A polyphonic SoundFont synthesizer instance.
///
/// One instance is single-producer: all calls come from one thread (or one
/// AudioWorklet). Separate instances share nothing but the font's sample
/// data.
pub struct Synth {
    font: Arc<SoundFont>,
    channels: [Channel; NUM_CHANNELS],
    voices: Vec<Voice>,
    scratch: [f64; MAX_BLOCK_FRAMES],
    mixer: Mixer,
    sample_rate: f64,
    out_channels: usize,
    /// Monotonic note counter for oldest-voice stealing.
    age: u64,
}

impl Synth {
    pub fn new(font: Arc<SoundFont>, config: SynthConfig) -> Self {
        let out_channels = if config.channels <= 1 { 1 } else { 2 };
        Synth {
            font,
            channels: [Channel::default(); NUM_CHANNELS],
            voices: vec![Voice::idle(); config.max_voices.max(1)],
            scratch: [0.0; MAX_BLOCK_FRAMES],
            mixer: Mixer::new(out_channels, MAX_BLOCK_FRAMES),
            sample_rate: config.sample_rate as f64,
            out_channels,
            age: 0,
        }
    }

    // ── Output configuration ────────────────────────────────

    /// Reconfigure the output format. Applies from the next render call;
    /// running voices rescale their cursors' step to keep pitch.
    pub fn set_output(&mut self, sample_rate: u32, channels: u16) {
        let out_channels = if channels <= 1 { 1 } else { 2 };
        if out_channels != self.out_channels {
            self.out_channels = out_channels;
            self.mixer = Mixer::new(out_channels, MAX_BLOCK_FRAMES);
        }
        let rate = sample_rate as f64;
        if rate > 0.0 && rate != self.sample_rate {
            self.sample_rate = rate;
            for v in self.voices.iter_mut().filter(|v| v.is_active()) {
                v.set_output_rate(rate);
            }
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate as u32
    }

    pub fn output_channels(&self) -> usize {
        self.out_channels
    }

    // ── Channel controls ────────────────────────────────────

    /// Select (bank, program) for a channel. Resolution happens at note-on,
    /// with the table's fallback, so a dangling selection still sounds.
    pub fn set_preset(&mut self, channel: u8, bank: u16, program: u8) {
        if let Some(ch) = self.channels.get_mut(channel as usize) {
            ch.bank = bank;
            ch.program = program;
        }
    }

    pub fn set_channel_volume(&mut self, channel: u8, volume: f64) {
        if let Some(ch) = self.channels.get_mut(channel as usize) {
            ch.volume = volume.clamp(0.0, 1.0);
        }
    }

    pub fn set_channel_pan(&mut self, channel: u8, pan: f64) {
        if let Some(ch) = self.channels.get_mut(channel as usize) {
            ch.pan = pan.clamp(-0.5, 0.5);
        }
    }

    /// Pitch wheel, 0..=16383 with 8192 center (±2 semitones). Applies to
    /// already-running voices at the next block.
    pub fn set_pitch_bend(&mut self, channel: u8, bend: u16) {
        if let Some(ch) = self.channels.get_mut(channel as usize) {
            ch.pitch_bend = bend.min(16383);
        }
    }

    // ── Note events ─────────────────────────────────────────

    /// Start a note: one voice per matching zone of the channel's preset.
    /// Velocity 0 is a note-off, per MIDI convention. Out-of-range channel
    /// or note numbers are ignored.
    pub fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        if velocity == 0 {
            self.note_off(channel, note);
            return;
        }
        if channel as usize >= NUM_CHANNELS || note > 127 {
            return;
        }
        let velocity = velocity.min(127);
        let (bank, program) = {
            let ch = &self.channels[channel as usize];
            (ch.bank, ch.program)
        };

        let font = Arc::clone(&self.font);
        let preset = font.table.lookup(bank, program);
        for zone in preset.zones_for(note, velocity) {
            let idx = self.allocate_voice();
            self.voices[idx].start(zone, channel, note, velocity, self.sample_rate, self.age);
            self.age += 1;
        }
    }

    /// Release every held voice matching (channel, note). Voices already in
    /// release keep their tails.
    pub fn note_off(&mut self, channel: u8, note: u8) {
        for v in self.voices.iter_mut() {
            if v.matches_note(channel, note) {
                v.release();
            }
        }
    }

    /// Release everything that is sounding, honoring release times.
    pub fn all_notes_off(&mut self) {
        for v in self.voices.iter_mut() {
            if v.is_active() {
                v.release();
            }
        }
    }

    /// Number of currently sounding voices.
    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Catalog of the loaded font's presets.
    pub fn presets(&self) -> Vec<PresetInfo> {
        self.font.table.infos()
    }

    // ── Rendering ───────────────────────────────────────────

    /// Render `frames` frames of interleaved f32.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0_f32; frames * self.out_channels];
        self.render_into(&mut out);
        out
    }

    /// Allocation-free render into a caller buffer. The buffer length must
    /// be a multiple of the output channel count; a trailing partial frame
    /// is left untouched.
    pub fn render_into(&mut self, out: &mut [f32]) {
        let out_channels = self.out_channels;
        let frames = out.len() / out_channels;
        let mut frame = 0;
        while frame < frames {
            let block = (frames - frame).min(MAX_BLOCK_FRAMES);
            let out_start = frame * out_channels;
            self.render_block(&mut out[out_start..out_start + block * out_channels], block);
            frame += block;
        }
    }

    fn render_block(&mut self, out: &mut [f32], frames: usize) {
        let Synth {
            voices,
            scratch,
            mixer,
            channels,
            ..
        } = self;

        mixer.clear(frames);
        for v in voices.iter_mut() {
            if !v.is_active() {
                continue;
            }
            let ch = &channels[v.channel() as usize];
            v.render_block(&mut scratch[..frames], ch.pitch_ratio());
            let (gain_l, gain_r) = pan_gains((v.pan() + ch.pan).clamp(-0.5, 0.5));
            mixer.accumulate(&scratch[..frames], gain_l * ch.volume, gain_r * ch.volume);
        }
        mixer.write_out(out);
    }

    /// Pick a voice slot for a new note: a free slot if any, else steal the
    /// quietest releasing voice, else the oldest. Ties break to the lowest
    /// pool index, so allocation is fully deterministic.
    fn allocate_voice(&mut self) -> usize {
        if let Some(idx) = self.voices.iter().position(|v| !v.is_active()) {
            return idx;
        }

        let mut quietest: Option<(usize, f64)> = None;
        for (i, v) in self.voices.iter().enumerate() {
            if v.is_releasing() {
                let level = v.envelope_level();
                if quietest.is_none_or(|(_, best)| level < best) {
                    quietest = Some((i, level));
                }
            }
        }
        if let Some((idx, _)) = quietest {
            return idx;
        }

        let mut oldest = 0;
        let mut oldest_age = u64::MAX;
        for (i, v) in self.voices.iter().enumerate() {
            if v.age() < oldest_age {
                oldest_age = v.age();
                oldest = i;
            }
        }
        oldest
    }
}
