pub mod dsp;
pub mod error;
pub mod preset;
pub mod registry;
pub mod soundfont;

pub use dsp::engine::{Synth, SynthConfig};
pub use error::{ParseError, SynthError};
pub use preset::{Preset, PresetInfo, PresetTable, Zone};
pub use soundfont::SoundFont;

use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the sfsynth version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

// The flat handle API below backs the AudioWorklet host. Handles are opaque
// i32 values; 0 means "no instance" (load failure), so JS can treat a handle
// as truthy. Invalid handles degrade to safe no-ops rather than throwing
// from inside the audio callback.

/// WASM-exposed: parse an SF2 buffer and create a synth instance.
/// Returns the handle, or 0 if the font failed to parse.
#[wasm_bindgen]
pub fn load_soundfont(bytes: &[u8]) -> i32 {
    registry::load(bytes).unwrap_or(0)
}

/// WASM-exposed: destroy a synth instance. No-op on an invalid handle.
#[wasm_bindgen]
pub fn close_synth(handle: i32) {
    let _ = registry::close(handle);
}

/// WASM-exposed: set output sample rate and channel count (1 or 2).
#[wasm_bindgen]
pub fn set_output(handle: i32, sample_rate: u32, channels: u16) {
    let _ = registry::set_output(handle, sample_rate, channels);
}

/// WASM-exposed: start a note on a channel.
#[wasm_bindgen]
pub fn note_on(handle: i32, channel: u8, note: u8, velocity: u8) {
    let _ = registry::note_on(handle, channel, note, velocity);
}

/// WASM-exposed: release a note on a channel.
#[wasm_bindgen]
pub fn note_off(handle: i32, channel: u8, note: u8) {
    let _ = registry::note_off(handle, channel, note);
}

/// WASM-exposed: select (bank, program) for a channel.
#[wasm_bindgen]
pub fn set_preset(handle: i32, channel: u8, bank: u16, program: u8) {
    let _ = registry::set_preset(handle, channel, bank, program);
}

/// WASM-exposed: pitch wheel, 0..=16383 with 8192 center (±2 semitones).
#[wasm_bindgen]
pub fn set_pitch_bend(handle: i32, channel: u8, bend: u16) {
    let _ = registry::set_pitch_bend(handle, channel, bend);
}

/// WASM-exposed: channel volume [0, 1].
#[wasm_bindgen]
pub fn set_channel_volume(handle: i32, channel: u8, volume: f64) {
    let _ = registry::set_channel_volume(handle, channel, volume);
}

/// WASM-exposed: channel pan [-0.5, 0.5].
#[wasm_bindgen]
pub fn set_channel_pan(handle: i32, channel: u8, pan: f64) {
    let _ = registry::set_channel_pan(handle, channel, pan);
}

/// WASM-exposed: release every sounding note.
#[wasm_bindgen]
pub fn all_notes_off(handle: i32) {
    let _ = registry::all_notes_off(handle);
}

/// WASM-exposed: number of currently sounding voices.
#[wasm_bindgen]
pub fn active_voices(handle: i32) -> u32 {
    registry::active_voices(handle).unwrap_or(0) as u32
}

/// WASM-exposed: render interleaved f32 frames for AudioWorklet playback.
/// An invalid handle renders an empty buffer.
#[wasm_bindgen]
pub fn render(handle: i32, frames: u32) -> Vec<f32> {
    registry::render(handle, frames as usize).unwrap_or_default()
}

/// WASM-exposed: the loaded font's preset catalog as a JS array of
/// `{name, bank, program, zoneCount}` objects. Null on an invalid handle.
#[wasm_bindgen]
pub fn preset_catalog(handle: i32) -> JsValue {
    match registry::presets(handle) {
        Ok(infos) => serde_wasm_bindgen::to_value(&infos).unwrap_or(JsValue::NULL),
        Err(_) => JsValue::NULL,
    }
}
