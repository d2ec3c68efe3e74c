//! End-to-end checks through the public surface: a synthetic SF2 font is
//! built byte-by-byte, loaded through the handle registry, and rendered;
//! the output is then inspected in the time and frequency domains.

use std::io::Cursor;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use sfsynth::dsp::engine::{Synth, SynthConfig};
use sfsynth::dsp::renderer::{render_wav, NoteEvent};
use sfsynth::registry;
use sfsynth::{SoundFont, SynthError};

// ── SF2 byte builder ────────────────────────────────────────

const GEN_RELEASE_VOL_ENV: u16 = 38;
const GEN_INSTRUMENT: u16 = 41;
const GEN_SAMPLE_ID: u16 = 53;
const GEN_SAMPLE_MODES: u16 = 54;

fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(id);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    out
}

fn list(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut inner = Vec::with_capacity(4 + body.len());
    inner.extend_from_slice(kind);
    inner.extend_from_slice(body);
    chunk(b"LIST", &inner)
}

fn name20(name: &str) -> [u8; 20] {
    let mut out = [0u8; 20];
    out[..name.len()].copy_from_slice(name.as_bytes());
    out
}

fn phdr_record(name: &str, program: u16, bank: u16, bag: u16) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&name20(name));
    out.extend_from_slice(&program.to_le_bytes());
    out.extend_from_slice(&bank.to_le_bytes());
    out.extend_from_slice(&bag.to_le_bytes());
    out.extend_from_slice(&[0u8; 12]);
    out
}

fn inst_record(name: &str, bag: u16) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&name20(name));
    out.extend_from_slice(&bag.to_le_bytes());
    out
}

fn bag_record(gen_index: u16) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&gen_index.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

fn gen_record(oper: u16, amount: u16) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&oper.to_le_bytes());
    out.extend_from_slice(&amount.to_le_bytes());
    out
}

/// One preset (bank 0, program 0) wrapping a 441 Hz sine at 44100 Hz,
/// rooted at A4 and looped over the whole buffer. 441 Hz divides the
/// sample rate exactly (period = 100 frames), so the loop seam is
/// phase-continuous. `inst_gens` are injected before the sampleID.
fn sine_font(inst_gens: &[(u16, u16)]) -> Vec<u8> {
    const RATE: u32 = 44100;
    let pcm: Vec<u8> = (0..RATE)
        .flat_map(|i| {
            let t = i as f64 / RATE as f64;
            let s = (2.0 * std::f64::consts::PI * 441.0 * t).sin() * 0.5;
            (((s * 32767.0).round()) as i16).to_le_bytes()
        })
        .collect();
    let sdta = list(b"sdta", &chunk(b"smpl", &pcm));

    let mut phdr = phdr_record("Sine Lead", 0, 0, 0);
    phdr.extend(phdr_record("EOP", 0, 0, 1));

    let mut pbag = bag_record(0);
    pbag.extend(bag_record(1));
    let mut pgen = gen_record(GEN_INSTRUMENT, 0);
    pgen.extend(gen_record(0, 0));

    let mut inst = inst_record("Sine", 0);
    inst.extend(inst_record("EOI", 1));
    let mut ibag = bag_record(0);
    ibag.extend(bag_record(inst_gens.len() as u16 + 1));
    let mut igen = Vec::new();
    for &(oper, amount) in inst_gens {
        igen.extend(gen_record(oper, amount));
    }
    igen.extend(gen_record(GEN_SAMPLE_ID, 0));
    igen.extend(gen_record(0, 0));

    let mut shdr = Vec::new();
    shdr.extend_from_slice(&name20("sine441"));
    shdr.extend_from_slice(&0u32.to_le_bytes()); // start
    shdr.extend_from_slice(&RATE.to_le_bytes()); // end
    shdr.extend_from_slice(&0u32.to_le_bytes()); // loop start
    shdr.extend_from_slice(&RATE.to_le_bytes()); // loop end
    shdr.extend_from_slice(&RATE.to_le_bytes()); // sample rate
    shdr.push(69);
    shdr.push(0);
    shdr.extend_from_slice(&[0u8; 4]);
    shdr.extend_from_slice(&name20("EOS"));
    shdr.extend_from_slice(&[0u8; 26]);

    let mut pdta_body = Vec::new();
    for (id, body) in [
        (b"phdr", &phdr),
        (b"pbag", &pbag),
        (b"pgen", &pgen),
        (b"inst", &inst),
        (b"ibag", &ibag),
        (b"igen", &igen),
        (b"shdr", &shdr),
    ] {
        pdta_body.extend(chunk(id, body));
    }
    let pdta = list(b"pdta", &pdta_body);

    let mut sfbk = Vec::new();
    sfbk.extend_from_slice(b"sfbk");
    sfbk.extend(sdta);
    sfbk.extend(pdta);
    chunk(b"RIFF", &sfbk)
}

/// Looped sine with a 200 ms release tail (-2786 timecents ≈ 0.2 s).
fn sine_font_with_release() -> Vec<u8> {
    sine_font(&[(GEN_SAMPLE_MODES, 1), (GEN_RELEASE_VOL_ENV, (-2786i16) as u16)])
}

fn peak_frequency(signal: &[f32], sample_rate: f64) -> f64 {
    let n = signal.len();
    let mut buf: Vec<Complex<f64>> = signal
        .iter()
        .map(|&s| Complex::new(s as f64, 0.0))
        .collect();
    FftPlanner::new().plan_fft_forward(n).process(&mut buf);

    let peak_bin = (1..n / 2)
        .max_by(|&a, &b| {
            buf[a]
                .norm_sqr()
                .partial_cmp(&buf[b].norm_sqr())
                .unwrap()
        })
        .unwrap();
    peak_bin as f64 * sample_rate / n as f64
}

// ── Tests ───────────────────────────────────────────────────

#[test]
fn a4_renders_within_one_percent_of_440hz() {
    let handle = registry::load(&sine_font_with_release()).unwrap();
    registry::set_output(handle, 44100, 1).unwrap();
    registry::note_on(handle, 0, 69, 127).unwrap();

    // Skip the attack, then analyze a steady 32768-frame window
    registry::render(handle, 1024).unwrap();
    let signal = registry::render(handle, 32768).unwrap();
    registry::close(handle).unwrap();

    let peak = peak_frequency(&signal, 44100.0);
    assert!(
        (peak - 440.0).abs() < 4.4,
        "expected an A4 peak near 440 Hz, got {peak:.1} Hz"
    );
}

#[test]
fn octave_up_doubles_the_peak_frequency() {
    let handle = registry::load(&sine_font_with_release()).unwrap();
    registry::set_output(handle, 44100, 1).unwrap();
    registry::note_on(handle, 0, 81, 127).unwrap();

    registry::render(handle, 1024).unwrap();
    let signal = registry::render(handle, 32768).unwrap();
    registry::close(handle).unwrap();

    let peak = peak_frequency(&signal, 44100.0);
    assert!(
        (peak - 880.0).abs() < 8.8,
        "expected an A5 peak near 880 Hz, got {peak:.1} Hz"
    );
}

#[test]
fn split_render_matches_single_render() {
    let bytes = sine_font_with_release();
    let a = registry::load(&bytes).unwrap();
    let b = registry::load(&bytes).unwrap();
    for h in [a, b] {
        registry::set_output(h, 44100, 2).unwrap();
        registry::note_on(h, 0, 64, 100).unwrap();
    }

    let mut split = registry::render(a, 300).unwrap();
    split.extend(registry::render(a, 400).unwrap());
    let whole = registry::render(b, 700).unwrap();

    registry::close(a).unwrap();
    registry::close(b).unwrap();

    assert_eq!(split.len(), whole.len());
    for (i, (x, y)) in split.iter().zip(whole.iter()).enumerate() {
        assert_eq!(x, y, "sample {i} diverges between split and whole renders");
    }
}

#[test]
fn note_off_decays_monotonically_to_silence() {
    let handle = registry::load(&sine_font_with_release()).unwrap();
    registry::set_output(handle, 44100, 1).unwrap();
    registry::note_on(handle, 0, 69, 127).unwrap();
    registry::render(handle, 4410).unwrap();
    registry::note_off(handle, 0, 69).unwrap();

    // 200 ms release: inspect window peaks over 300 ms of tail
    let tail = registry::render(handle, 13230).unwrap();

    // Windows longer than one waveform period, so each peak tracks the
    // envelope rather than the sine phase
    let peaks: Vec<f32> = tail
        .chunks(441)
        .map(|w| w.iter().fold(0.0_f32, |m, &s| m.max(s.abs())))
        .collect();
    assert!(peaks[0] > 0.1, "tail should start audible, got {}", peaks[0]);
    for pair in peaks.windows(2) {
        assert!(
            pair[1] <= pair[0] * 1.001,
            "release must never grow: {} -> {}",
            pair[0],
            pair[1]
        );
    }
    let last = *peaks.last().unwrap();
    assert!(last < 1e-3, "tail should reach silence, got {last}");

    assert_eq!(registry::active_voices(handle).unwrap(), 0);
    registry::close(handle).unwrap();
}

#[test]
fn loop_seam_is_phase_continuous() {
    let handle = registry::load(&sine_font_with_release()).unwrap();
    registry::set_output(handle, 44100, 1).unwrap();
    registry::note_on(handle, 0, 69, 127).unwrap();

    // Two full loop passes; a discontinuity at the wrap would show up as a
    // sample-to-sample jump far above the sine's own slope
    registry::render(handle, 1024).unwrap();
    let signal = registry::render(handle, 88200).unwrap();
    registry::close(handle).unwrap();

    let max_slope = (2.0 * std::f64::consts::PI * 441.0 / 44100.0) as f32;
    let mut worst = 0.0_f32;
    for pair in signal.windows(2) {
        worst = worst.max((pair[1] - pair[0]).abs());
    }
    assert!(
        worst < max_slope * 1.5,
        "loop seam jump {worst} exceeds the sine slope bound"
    );
}

#[test]
fn voice_pool_steals_instead_of_growing() {
    let font = Arc::new(SoundFont::parse(&sine_font_with_release()).unwrap());
    let mut synth = Synth::new(
        font,
        SynthConfig {
            sample_rate: 44100,
            channels: 1,
            max_voices: 4,
        },
    );

    for note in [60, 62, 64, 65, 67] {
        synth.note_on(0, note, 100);
    }
    assert_eq!(synth.active_voice_count(), 4, "fifth note must steal");

    // The oldest note was stolen; the rest keep sounding
    let out = synth.render(1024);
    assert!(out.iter().any(|&s| s.abs() > 0.01));
}

#[test]
fn unknown_program_falls_back_to_an_audible_preset() {
    let handle = registry::load(&sine_font_with_release()).unwrap();
    registry::set_output(handle, 44100, 1).unwrap();
    registry::set_preset(handle, 0, 99, 42).unwrap();
    registry::note_on(handle, 0, 69, 100).unwrap();

    let out = registry::render(handle, 2048).unwrap();
    registry::close(handle).unwrap();
    assert!(
        out.iter().any(|&s| s.abs() > 0.01),
        "missing (bank, program) should fall back, not go silent"
    );
}

#[test]
fn closed_handle_rejects_rendering() {
    let handle = registry::load(&sine_font_with_release()).unwrap();
    registry::close(handle).unwrap();
    assert!(matches!(
        registry::render(handle, 64),
        Err(SynthError::InvalidHandle { .. })
    ));
}

#[test]
fn wav_export_reads_back_with_hound() {
    let font = Arc::new(SoundFont::parse(&sine_font_with_release()).unwrap());
    let mut synth = Synth::new(
        font,
        SynthConfig {
            sample_rate: 22050,
            channels: 2,
            max_voices: 8,
        },
    );
    let events = [NoteEvent {
        start: 0.1,
        duration: 0.3,
        channel: 0,
        note: 69,
        velocity: 100,
    }];
    let wav = render_wav(&mut synth, &events, 1.0);

    let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 22050);
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_format, hound::SampleFormat::Int);

    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(samples.len(), 22050 * 2, "1 s of interleaved stereo");
    assert!(
        samples.iter().any(|&s| s.abs() > 1000),
        "the scheduled note should be audible in the export"
    );
}
