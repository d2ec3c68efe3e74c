//! WAV renderer — renders a scheduled note sequence to a WAV byte buffer.
//!
//! Offline counterpart to the real-time surface: the same `Synth` renders in
//! slices cut exactly at event boundaries, so note timing is sample-accurate
//! regardless of the internal block size.

use super::engine::Synth;

/// One scheduled note for offline rendering, in seconds.
#[derive(Debug, Clone, Copy)]
pub struct NoteEvent {
    pub start: f64,
    pub duration: f64,
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
}

/// Render `events` through `synth` into 16-bit PCM WAV bytes covering
/// `total_seconds` of output (release tails past the end are cut).
pub fn render_wav(synth: &mut Synth, events: &[NoteEvent], total_seconds: f64) -> Vec<u8> {
    let sample_rate = synth.sample_rate();
    let channels = synth.output_channels() as u16;
    let total_frames = (total_seconds.max(0.0) * sample_rate as f64) as usize;

    // Split every event into on/off edges at frame offsets
    let mut edges: Vec<(usize, bool, u8, u8, u8)> = Vec::with_capacity(events.len() * 2);
    for ev in events {
        let on = (ev.start.max(0.0) * sample_rate as f64) as usize;
        let off = ((ev.start + ev.duration).max(0.0) * sample_rate as f64) as usize;
        edges.push((on, true, ev.channel, ev.note, ev.velocity));
        edges.push((off, false, ev.channel, ev.note, 0));
    }
    // Offs before ons at the same frame, so zero-length notes still release
    edges.sort_by_key(|&(frame, is_on, ..)| (frame, is_on));

    let mut pcm = Vec::with_capacity(total_frames * channels as usize);
    let mut cursor = 0;
    let mut next_edge = 0;
    while cursor < total_frames {
        while next_edge < edges.len() && edges[next_edge].0 <= cursor {
            let (_, is_on, channel, note, velocity) = edges[next_edge];
            if is_on {
                synth.note_on(channel, note, velocity.max(1));
            } else {
                synth.note_off(channel, note);
            }
            next_edge += 1;
        }

        let slice_end = edges
            .get(next_edge)
            .map(|&(frame, ..)| frame.clamp(cursor + 1, total_frames))
            .unwrap_or(total_frames);
        for s in synth.render(slice_end - cursor) {
            pcm.push((s as f64 * 32767.0).round().clamp(-32768.0, 32767.0) as i16);
        }
        cursor = slice_end;
    }

    encode_wav(&pcm, sample_rate, channels)
}

/// Encode interleaved i16 PCM as a canonical 44-byte-header WAV buffer.
fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    const BITS_PER_SAMPLE: u16 = 16;
    let block_align = channels * (BITS_PER_SAMPLE / 8);
    let data_len = (samples.len() * 2) as u32;

    let mut buf = Vec::with_capacity(44 + data_len as usize);
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    for field in [1u16, channels] {
        // format tag 1 = integer PCM
        buf.extend_from_slice(&field.to_le_bytes());
    }
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    for field in [block_align, BITS_PER_SAMPLE] {
        buf.extend_from_slice(&field.to_le_bytes());
    }

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }
    buf
}
