//! DSP core — sample playback, envelopes, voices, and the polyphonic engine.
//!
//! All rendering runs in pure Rust for deterministic, cross-platform audio
//! output. The same code powers the WebAudio path (AudioWorklet + WASM) and
//! the offline WAV renderer.

pub mod engine;
pub mod envelope;
pub mod filter;
pub mod mixer;
pub mod renderer;
pub mod sampler;
pub mod voice;
