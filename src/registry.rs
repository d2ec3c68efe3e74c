//! Handle table for synthesizer instances.
//!
//! The WASM and FFI surfaces address synths by opaque `i32` handles. Each
//! handle owns an independent `Synth` behind its own mutex, so instances
//! never contend with each other; the registry lock only guards the map
//! itself. A closed handle stays invalid forever — handles are never reused
//! within a process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use crate::dsp::engine::{Synth, SynthConfig};
use crate::error::{ParseError, SynthError};
use crate::preset::PresetInfo;
use crate::soundfont::SoundFont;

static HANDLES: OnceLock<RwLock<HashMap<i32, Arc<Mutex<Synth>>>>> = OnceLock::new();
static NEXT_HANDLE: AtomicI32 = AtomicI32::new(1);

fn handles() -> &'static RwLock<HashMap<i32, Arc<Mutex<Synth>>>> {
    HANDLES.get_or_init(|| RwLock::new(HashMap::new()))
}

fn with_synth<T>(handle: i32, f: impl FnOnce(&mut Synth) -> T) -> Result<T, SynthError> {
    let synth = {
        let map = handles().read().unwrap_or_else(|e| e.into_inner());
        map.get(&handle)
            .cloned()
            .ok_or(SynthError::InvalidHandle { handle })?
    };
    let mut guard = synth.lock().unwrap_or_else(|e| e.into_inner());
    Ok(f(&mut guard))
}

/// Parse a SoundFont and register a new synth instance with default output
/// settings (44100 Hz stereo, channel presets at bank 0 program 0).
pub fn load(bytes: &[u8]) -> Result<i32, ParseError> {
    let font = Arc::new(SoundFont::parse(bytes)?);
    let synth = Synth::new(font, SynthConfig::default());

    let handle = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
    let mut map = handles().write().unwrap_or_else(|e| e.into_inner());
    map.insert(handle, Arc::new(Mutex::new(synth)));
    Ok(handle)
}

/// Drop an instance. Every later call on the handle fails with
/// `InvalidHandle`; closing twice is itself an `InvalidHandle` error.
pub fn close(handle: i32) -> Result<(), SynthError> {
    let mut map = handles().write().unwrap_or_else(|e| e.into_inner());
    map.remove(&handle)
        .map(|_| ())
        .ok_or(SynthError::InvalidHandle { handle })
}

pub fn set_output(handle: i32, sample_rate: u32, channels: u16) -> Result<(), SynthError> {
    with_synth(handle, |s| s.set_output(sample_rate, channels))
}

pub fn note_on(handle: i32, channel: u8, note: u8, velocity: u8) -> Result<(), SynthError> {
    with_synth(handle, |s| s.note_on(channel, note, velocity))
}

pub fn note_off(handle: i32, channel: u8, note: u8) -> Result<(), SynthError> {
    with_synth(handle, |s| s.note_off(channel, note))
}

pub fn set_preset(handle: i32, channel: u8, bank: u16, program: u8) -> Result<(), SynthError> {
    with_synth(handle, |s| s.set_preset(channel, bank, program))
}

pub fn set_pitch_bend(handle: i32, channel: u8, bend: u16) -> Result<(), SynthError> {
    with_synth(handle, |s| s.set_pitch_bend(channel, bend))
}

pub fn set_channel_volume(handle: i32, channel: u8, volume: f64) -> Result<(), SynthError> {
    with_synth(handle, |s| s.set_channel_volume(channel, volume))
}

pub fn set_channel_pan(handle: i32, channel: u8, pan: f64) -> Result<(), SynthError> {
    with_synth(handle, |s| s.set_channel_pan(channel, pan))
}

pub fn all_notes_off(handle: i32) -> Result<(), SynthError> {
    with_synth(handle, |s| s.all_notes_off())
}

pub fn active_voices(handle: i32) -> Result<usize, SynthError> {
    with_synth(handle, |s| s.active_voice_count())
}

pub fn render(handle: i32, frames: usize) -> Result<Vec<f32>, SynthError> {
    with_synth(handle, |s| s.render(frames))
}

pub fn presets(handle: i32) -> Result<Vec<PresetInfo>, SynthError> {
    with_synth(handle, |s| s.presets())
}
