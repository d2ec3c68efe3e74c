//! Preset and zone types, the bank/program table, and playback-rate math.
//!
//! A flattened view of the SoundFont hydra: each `Preset` owns the fully
//! merged zones (instrument-level generators refined by preset-level ones),
//! so note-on only has to match key/velocity ranges and copy parameters into
//! a voice.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::dsp::envelope::AdsrConfig;
use crate::dsp::sampler::SampleBuffer;

// ── Ranges ──────────────────────────────────────────────────

/// Inclusive MIDI key range.
#[derive(Debug, Clone, Copy)]
pub struct KeyRange {
    pub low: u8,
    pub high: u8,
}

impl Default for KeyRange {
    fn default() -> Self {
        KeyRange { low: 0, high: 127 }
    }
}

impl KeyRange {
    pub fn contains(&self, key: u8) -> bool {
        key >= self.low && key <= self.high
    }

    /// Intersection of two ranges. An empty intersection comes back with
    /// `low > high` and matches nothing.
    pub fn intersect(&self, other: &KeyRange) -> KeyRange {
        KeyRange {
            low: self.low.max(other.low),
            high: self.high.min(other.high),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.low > self.high
    }
}

/// Inclusive note-on velocity range.
#[derive(Debug, Clone, Copy)]
pub struct VelocityRange {
    pub low: u8,
    pub high: u8,
}

impl Default for VelocityRange {
    fn default() -> Self {
        VelocityRange { low: 0, high: 127 }
    }
}

impl VelocityRange {
    pub fn contains(&self, velocity: u8) -> bool {
        velocity >= self.low && velocity <= self.high
    }

    pub fn intersect(&self, other: &VelocityRange) -> VelocityRange {
        VelocityRange {
            low: self.low.max(other.low),
            high: self.high.min(other.high),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.low > self.high
    }
}

// ── Zones ───────────────────────────────────────────────────

/// Loop behavior from the zone's sampleModes generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// Play straight through; the voice ends at the buffer end.
    None,
    /// Loop for the life of the voice.
    Continuous,
    /// Loop while held, play to the end once released.
    UntilRelease,
}

/// Lowpass settings derived from initialFilterFc/initialFilterQ.
#[derive(Debug, Clone, Copy)]
pub struct FilterConfig {
    pub cutoff_hz: f64,
    pub q: f64,
}

/// One playable region of a preset: a sample plus the merged generator
/// parameters that govern how it sounds.
#[derive(Debug, Clone)]
pub struct Zone {
    pub key_range: KeyRange,
    pub vel_range: VelocityRange,
    /// MIDI key at which the sample plays at its recorded pitch.
    pub root_key: u8,
    /// Tuning offsets: whole semitones and cents.
    pub coarse_tune: i32,
    pub fine_tune: i32,
    /// Stereo position [-0.5, 0.5].
    pub pan: f64,
    /// Linear gain from initialAttenuation (1.0 = unattenuated).
    pub attenuation: f64,
    pub envelope: AdsrConfig,
    pub loop_mode: LoopMode,
    /// Loop points in samples, relative to the zone's buffer.
    pub loop_start: u64,
    pub loop_end: u64,
    pub filter: Option<FilterConfig>,
    pub sample: Arc<SampleBuffer>,
}

impl Zone {
    pub fn matches(&self, key: u8, velocity: u8) -> bool {
        self.key_range.contains(key) && self.vel_range.contains(velocity)
    }
}

// ── Presets ─────────────────────────────────────────────────

/// A bank/program entry with its merged zones, in parse order.
#[derive(Debug, Clone)]
pub struct Preset {
    pub name: String,
    pub bank: u16,
    pub program: u8,
    pub zones: Vec<Zone>,
}

impl Preset {
    /// Every zone matching the key and velocity, in parse order. Overlapping
    /// zones layer; the same input always yields the same sequence.
    pub fn zones_for(&self, key: u8, velocity: u8) -> impl Iterator<Item = &Zone> {
        self.zones.iter().filter(move |z| z.matches(key, velocity))
    }
}

/// Serde-visible catalog entry describing one preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetInfo {
    pub name: String,
    pub bank: u16,
    pub program: u8,
    #[serde(rename = "zoneCount")]
    pub zone_count: usize,
}

/// All presets of a font, keyed by (bank, program).
///
/// Keys are unique — when a font defines the same (bank, program) twice, the
/// first definition wins. Construction requires at least one preset, so
/// `lookup` can always return something.
#[derive(Debug, Clone)]
pub struct PresetTable {
    presets: Vec<Preset>,
}

impl PresetTable {
    pub fn new(mut presets: Vec<Preset>) -> Self {
        // Stable sort keeps parse order within duplicate keys, so dedup
        // retains the first definition.
        presets.sort_by_key(|p| (p.bank, p.program));
        presets.dedup_by_key(|p| (p.bank, p.program));
        PresetTable { presets }
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Preset> {
        self.presets.iter()
    }

    /// Exact (bank, program) match.
    pub fn get(&self, bank: u16, program: u8) -> Option<&Preset> {
        self.presets
            .binary_search_by_key(&(bank, program), |p| (p.bank, p.program))
            .ok()
            .map(|i| &self.presets[i])
    }

    /// Resolve (bank, program) with fallback: a missing key resolves to the
    /// lowest-numbered preset of bank 0, then the overall lowest. Never fails
    /// on a table with at least one preset.
    pub fn lookup(&self, bank: u16, program: u8) -> &Preset {
        if let Some(p) = self.get(bank, program) {
            return p;
        }
        self.presets
            .iter()
            .find(|p| p.bank == 0)
            .unwrap_or(&self.presets[0])
    }

    /// Catalog of every preset, in (bank, program) order.
    pub fn infos(&self) -> Vec<PresetInfo> {
        self.presets
            .iter()
            .map(|p| PresetInfo {
                name: p.name.clone(),
                bank: p.bank,
                program: p.program,
                zone_count: p.zones.len(),
            })
            .collect()
    }
}

// ── Pitch math ──────────────────────────────────────────────

/// Playback-rate multiplier for sounding `note` from a sample rooted at
/// `root_key`, with coarse (semitones) and fine (cents) tuning offsets.
///
/// `2^((note - root + coarse + fine/100) / 12)`: one octave above root reads
/// the sample twice as fast.
pub fn sample_playback_rate(note: u8, root_key: u8, coarse_tune: i32, fine_tune: i32) -> f64 {
    let semitones =
        note as f64 - root_key as f64 + coarse_tune as f64 + fine_tune as f64 / 100.0;
    (2.0_f64).powf(semitones / 12.0)
}
