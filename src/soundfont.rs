//! SoundFont (SF2) container parsing.
//!
//! Reads the RIFF `sfbk` container: 16-bit PCM from `sdta/smpl` and the
//! preset/instrument/sample records (the "hydra") from `pdta`, then flattens
//! the two-level generator hierarchy into merged zones — preset-level
//! generators refine instrument-level ones (ranges intersect, offsets add).
//! Modulators (`pmod`/`imod`) are skipped.
//!
//! Every declared offset and record count is validated against the actual
//! data; malformed input fails with a `ParseError`, never a panic, and
//! out-of-range sample offsets are clamped.

use std::sync::Arc;

use crate::dsp::envelope::AdsrConfig;
use crate::dsp::sampler::SampleBuffer;
use crate::error::ParseError;
use crate::preset::{
    FilterConfig, KeyRange, LoopMode, Preset, PresetTable, VelocityRange, Zone,
};

/// A parsed SoundFont: the flattened preset table. PCM lives in shared
/// buffers referenced by the zones.
#[derive(Debug, Clone)]
pub struct SoundFont {
    pub table: PresetTable,
}

impl SoundFont {
    /// Parse an SF2 byte buffer.
    pub fn parse(bytes: &[u8]) -> Result<SoundFont, ParseError> {
        let mut r = Reader::new(bytes);
        expect_fourcc(&mut r, b"RIFF")?;
        let riff_size = r.read_u32()? as usize;
        if riff_size + 8 > bytes.len() {
            return Err(ParseError::Truncated { offset: bytes.len() });
        }
        expect_fourcc(&mut r, b"sfbk")?;

        let mut smpl: Option<Vec<i16>> = None;
        let mut hydra: Option<RawHydra<'_>> = None;
        while r.remaining() >= 8 {
            let id = r.read_fourcc()?;
            let size = r.read_u32()? as usize;
            let body = r.read_bytes(size)?;
            if &id != b"LIST" || body.len() < 4 {
                continue;
            }
            let list_type: [u8; 4] = [body[0], body[1], body[2], body[3]];
            let contents = &body[4..];
            match &list_type {
                b"sdta" => smpl = Some(parse_sdta(contents)?),
                b"pdta" => hydra = Some(RawHydra::parse(contents)?),
                _ => {} // INFO and friends
            }
        }

        let smpl = smpl.ok_or_else(|| invalid("missing sdta/smpl chunk"))?;
        let hydra = hydra.ok_or_else(|| invalid("missing pdta chunk"))?;
        let table = flatten(&smpl, &hydra)?;
        Ok(SoundFont { table })
    }
}

fn invalid(detail: impl Into<String>) -> ParseError {
    ParseError::InvalidHeader {
        detail: detail.into(),
    }
}

// ── Byte reader ─────────────────────────────────────────────

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        if self.remaining() < n {
            return Err(ParseError::Truncated { offset: self.pos });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_fourcc(&mut self) -> Result<[u8; 4], ParseError> {
        let b = self.read_bytes(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_i8(&mut self) -> Result<i8, ParseError> {
        Ok(self.read_u8()? as i8)
    }

    fn read_u16(&mut self) -> Result<u16, ParseError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, ParseError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

fn expect_fourcc(r: &mut Reader<'_>, expected: &[u8; 4]) -> Result<(), ParseError> {
    let found = r.read_fourcc()?;
    if &found != expected {
        return Err(invalid(format!(
            "expected '{}', found '{}'",
            String::from_utf8_lossy(expected),
            String::from_utf8_lossy(&found)
        )));
    }
    Ok(())
}

/// A fixed-length, NUL-padded record name.
fn read_name(r: &mut Reader<'_>) -> Result<String, ParseError> {
    let raw = r.read_bytes(20)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
}

// ── Chunk decoding ──────────────────────────────────────────

fn parse_sdta(contents: &[u8]) -> Result<Vec<i16>, ParseError> {
    let mut r = Reader::new(contents);
    while r.remaining() >= 8 {
        let id = r.read_fourcc()?;
        let size = r.read_u32()? as usize;
        let body = r.read_bytes(size)?;
        if &id == b"smpl" {
            let pcm = body
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]))
                .collect();
            return Ok(pcm);
        }
        // sm24 and unknown sub-chunks are skipped
    }
    Err(invalid("sdta list has no smpl chunk"))
}

/// Raw hydra chunk slices, located by name within `pdta`.
struct RawHydra<'a> {
    phdr: &'a [u8],
    pbag: &'a [u8],
    pgen: &'a [u8],
    inst: &'a [u8],
    ibag: &'a [u8],
    igen: &'a [u8],
    shdr: &'a [u8],
}

impl<'a> RawHydra<'a> {
    fn parse(contents: &'a [u8]) -> Result<Self, ParseError> {
        let mut found: [Option<&'a [u8]>; 7] = [None; 7];
        const NAMES: [&[u8; 4]; 7] = [
            b"phdr", b"pbag", b"pgen", b"inst", b"ibag", b"igen", b"shdr",
        ];

        let mut r = Reader::new(contents);
        while r.remaining() >= 8 {
            let id = r.read_fourcc()?;
            let size = r.read_u32()? as usize;
            let body = r.read_bytes(size)?;
            if let Some(slot) = NAMES.iter().position(|n| *n == &id) {
                found[slot] = Some(body);
            }
            // pmod/imod and unknown chunks are skipped
        }

        let get = |slot: usize| {
            found[slot].ok_or_else(|| {
                invalid(format!(
                    "missing {} chunk",
                    String::from_utf8_lossy(NAMES[slot])
                ))
            })
        };
        Ok(RawHydra {
            phdr: get(0)?,
            pbag: get(1)?,
            pgen: get(2)?,
            inst: get(3)?,
            ibag: get(4)?,
            igen: get(5)?,
            shdr: get(6)?,
        })
    }
}

struct PresetHeader {
    name: String,
    program: u16,
    bank: u16,
    bag: u16,
}

struct InstHeader {
    bag: u16,
}

struct GenRecord {
    oper: u16,
    amount: u16,
}

struct SampleHeader {
    name: String,
    start: u32,
    end: u32,
    loop_start: u32,
    loop_end: u32,
    sample_rate: u32,
    original_pitch: u8,
    pitch_correction: i8,
}

fn decode_records<T>(
    chunk: &[u8],
    record_size: usize,
    chunk_name: &str,
    decode: impl Fn(&mut Reader<'_>) -> Result<T, ParseError>,
) -> Result<Vec<T>, ParseError> {
    if chunk.len() % record_size != 0 {
        return Err(invalid(format!(
            "{chunk_name} chunk size {} is not a multiple of {record_size}",
            chunk.len()
        )));
    }
    let mut r = Reader::new(chunk);
    let mut records = Vec::with_capacity(chunk.len() / record_size);
    while r.remaining() > 0 {
        records.push(decode(&mut r)?);
    }
    Ok(records)
}

fn decode_phdr(chunk: &[u8]) -> Result<Vec<PresetHeader>, ParseError> {
    decode_records(chunk, 38, "phdr", |r| {
        let name = read_name(r)?;
        let program = r.read_u16()?;
        let bank = r.read_u16()?;
        let bag = r.read_u16()?;
        r.read_bytes(12)?; // library, genre, morphology
        Ok(PresetHeader {
            name,
            program,
            bank,
            bag,
        })
    })
}

fn decode_inst(chunk: &[u8]) -> Result<Vec<InstHeader>, ParseError> {
    decode_records(chunk, 22, "inst", |r| {
        r.read_bytes(20)?; // instrument name, unused
        let bag = r.read_u16()?;
        Ok(InstHeader { bag })
    })
}

/// Bag records reduce to their generator index; modulator indices are unused.
fn decode_bags(chunk: &[u8], chunk_name: &str) -> Result<Vec<u16>, ParseError> {
    decode_records(chunk, 4, chunk_name, |r| {
        let gen_index = r.read_u16()?;
        let _mod = r.read_u16()?;
        Ok(gen_index)
    })
}

fn decode_gens(chunk: &[u8], chunk_name: &str) -> Result<Vec<GenRecord>, ParseError> {
    decode_records(chunk, 4, chunk_name, |r| {
        let oper = r.read_u16()?;
        let amount = r.read_u16()?;
        Ok(GenRecord { oper, amount })
    })
}

fn decode_shdr(chunk: &[u8]) -> Result<Vec<SampleHeader>, ParseError> {
    decode_records(chunk, 46, "shdr", |r| {
        let name = read_name(r)?;
        let start = r.read_u32()?;
        let end = r.read_u32()?;
        let loop_start = r.read_u32()?;
        let loop_end = r.read_u32()?;
        let sample_rate = r.read_u32()?;
        let original_pitch = r.read_u8()?;
        let pitch_correction = r.read_i8()?;
        r.read_bytes(4)?; // sample link, sample type
        Ok(SampleHeader {
            name,
            start,
            end,
            loop_start,
            loop_end,
            sample_rate,
            original_pitch,
            pitch_correction,
        })
    })
}

// ── Generators ──────────────────────────────────────────────

const GEN_INITIAL_FILTER_FC: u16 = 8;
const GEN_INITIAL_FILTER_Q: u16 = 9;
const GEN_PAN: u16 = 17;
const GEN_ATTACK_VOL_ENV: u16 = 34;
const GEN_HOLD_VOL_ENV: u16 = 35;
const GEN_DECAY_VOL_ENV: u16 = 36;
const GEN_SUSTAIN_VOL_ENV: u16 = 37;
const GEN_RELEASE_VOL_ENV: u16 = 38;
const GEN_INSTRUMENT: u16 = 41;
const GEN_KEY_RANGE: u16 = 43;
const GEN_VEL_RANGE: u16 = 44;
const GEN_INITIAL_ATTENUATION: u16 = 48;
const GEN_COARSE_TUNE: u16 = 51;
const GEN_FINE_TUNE: u16 = 52;
const GEN_SAMPLE_ID: u16 = 53;
const GEN_SAMPLE_MODES: u16 = 54;
const GEN_OVERRIDING_ROOT_KEY: u16 = 58;

/// Default cutoff in cents; at or above this the filter is effectively open
/// and no lowpass is instantiated.
const FILTER_OPEN_CENTS: i32 = 13500;

/// Accumulated generator values for one zone.
///
/// Instrument-level values are absolute; preset-level values are offsets on
/// top of them, so the two start from different defaults.
#[derive(Debug, Clone, Copy)]
struct GenValues {
    key_range: KeyRange,
    vel_range: VelocityRange,
    attenuation_cb: i32,
    pan_mille: i32,
    attack_tc: i32,
    hold_tc: i32,
    decay_tc: i32,
    sustain_cb: i32,
    release_tc: i32,
    coarse_tune: i32,
    fine_tune: i32,
    /// Negative means "use the sample header's original pitch".
    root_key: i32,
    sample_modes: i32,
    filter_fc_cents: i32,
    filter_q_cb: i32,
    instrument: Option<u16>,
    sample: Option<u16>,
}

impl GenValues {
    /// SF2 defaults for instrument zones: ~1 ms envelope segments
    /// (-12000 timecents), no attenuation, open filter.
    fn instrument_level() -> Self {
        GenValues {
            key_range: KeyRange::default(),
            vel_range: VelocityRange::default(),
            attenuation_cb: 0,
            pan_mille: 0,
            attack_tc: -12000,
            hold_tc: -12000,
            decay_tc: -12000,
            sustain_cb: 0,
            release_tc: -12000,
            coarse_tune: 0,
            fine_tune: 0,
            root_key: -1,
            sample_modes: 0,
            filter_fc_cents: FILTER_OPEN_CENTS,
            filter_q_cb: 0,
            instrument: None,
            sample: None,
        }
    }

    /// Identity offsets for preset zones.
    fn preset_level() -> Self {
        GenValues {
            attack_tc: 0,
            hold_tc: 0,
            decay_tc: 0,
            release_tc: 0,
            filter_fc_cents: 0,
            ..GenValues::instrument_level()
        }
    }

    fn apply(&mut self, rec: &GenRecord) {
        let signed = rec.amount as i16 as i32;
        match rec.oper {
            GEN_KEY_RANGE => {
                self.key_range = KeyRange {
                    low: (rec.amount & 0xFF) as u8,
                    high: (rec.amount >> 8) as u8,
                };
            }
            GEN_VEL_RANGE => {
                self.vel_range = VelocityRange {
                    low: (rec.amount & 0xFF) as u8,
                    high: (rec.amount >> 8) as u8,
                };
            }
            GEN_INITIAL_ATTENUATION => self.attenuation_cb = signed,
            GEN_PAN => self.pan_mille = signed,
            GEN_ATTACK_VOL_ENV => self.attack_tc = signed,
            GEN_HOLD_VOL_ENV => self.hold_tc = signed,
            GEN_DECAY_VOL_ENV => self.decay_tc = signed,
            GEN_SUSTAIN_VOL_ENV => self.sustain_cb = signed,
            GEN_RELEASE_VOL_ENV => self.release_tc = signed,
            GEN_COARSE_TUNE => self.coarse_tune = signed,
            GEN_FINE_TUNE => self.fine_tune = signed,
            GEN_OVERRIDING_ROOT_KEY => self.root_key = signed,
            GEN_SAMPLE_MODES => self.sample_modes = signed,
            GEN_INITIAL_FILTER_FC => self.filter_fc_cents = signed,
            GEN_INITIAL_FILTER_Q => self.filter_q_cb = signed,
            GEN_INSTRUMENT => self.instrument = Some(rec.amount),
            GEN_SAMPLE_ID => self.sample = Some(rec.amount),
            _ => {} // unimplemented generators are ignored
        }
    }
}

/// `2^(timecents / 1200)` seconds, clamped to the SF2 useful range.
fn timecents_to_seconds(tc: i32) -> f64 {
    let tc = tc.clamp(-12000, 8000);
    (2.0_f64).powf(tc as f64 / 1200.0)
}

/// Centibel attenuation to linear gain: `10^(-cb / 200)`. 1440 cB is silent.
fn centibels_to_gain(cb: i32) -> f64 {
    let cb = cb.clamp(0, 1440);
    if cb >= 1440 {
        return 0.0;
    }
    (10.0_f64).powf(-(cb as f64) / 200.0)
}

// ── Flattening ──────────────────────────────────────────────

fn flatten(smpl: &[i16], hydra: &RawHydra<'_>) -> Result<PresetTable, ParseError> {
    let phdr = decode_phdr(hydra.phdr)?;
    let pbag = decode_bags(hydra.pbag, "pbag")?;
    let pgen = decode_gens(hydra.pgen, "pgen")?;
    let inst = decode_inst(hydra.inst)?;
    let ibag = decode_bags(hydra.ibag, "ibag")?;
    let igen = decode_gens(hydra.igen, "igen")?;
    let shdr = decode_shdr(hydra.shdr)?;

    // Last record of each list is a terminal sentinel (EOP/EOI/EOS)
    if phdr.len() < 2 {
        return Err(ParseError::NoPresets);
    }

    // One shared buffer per sample header; offsets are clamped to the
    // actual PCM so a lying header can't read out of bounds.
    let samples: Vec<(Arc<SampleBuffer>, u64, u64)> = shdr
        .iter()
        .map(|sh| {
            let start = (sh.start as usize).min(smpl.len());
            let end = (sh.end as usize).clamp(start, smpl.len());
            let buffer =
                SampleBuffer::from_i16(sh.name.clone(), &smpl[start..end], sh.sample_rate.max(1));
            let loop_start = sh.loop_start.saturating_sub(sh.start) as u64;
            let loop_end = (sh.loop_end.saturating_sub(sh.start) as u64)
                .min((end - start) as u64);
            (buffer, loop_start, loop_end)
        })
        .collect();

    let mut presets = Vec::new();
    for window in phdr.windows(2) {
        let (ph, next) = (&window[0], &window[1]);
        let zone_range = bag_slice(ph.bag, next.bag, pbag.len(), "pbag")?;

        let mut zones = Vec::new();
        let mut preset_global: Option<GenValues> = None;
        for (zone_idx, bag_idx) in zone_range.enumerate() {
            let gens = gen_slice(&pbag, bag_idx, pgen.len(), "pgen")?;
            let mut pv = preset_global.unwrap_or_else(GenValues::preset_level);
            for g in &pgen[gens] {
                pv.apply(g);
            }

            match pv.instrument {
                Some(inst_idx) => {
                    expand_instrument(
                        inst_idx, &pv, &inst, &ibag, &igen, &shdr, &samples, &mut zones,
                    )?;
                }
                None if zone_idx == 0 => preset_global = Some(pv),
                None => {} // zone without an instrument is silent; skip
            }
        }

        presets.push(Preset {
            name: ph.name.clone(),
            bank: ph.bank,
            program: (ph.program & 0x7F) as u8,
            zones,
        });
    }

    if presets.is_empty() {
        return Err(ParseError::NoPresets);
    }
    Ok(PresetTable::new(presets))
}

/// Zones of one instrument, merged with the preset-level offsets `pv`.
fn expand_instrument(
    inst_idx: u16,
    pv: &GenValues,
    inst: &[InstHeader],
    ibag: &[u16],
    igen: &[GenRecord],
    shdr: &[SampleHeader],
    samples: &[(Arc<SampleBuffer>, u64, u64)],
    zones: &mut Vec<Zone>,
) -> Result<(), ParseError> {
    let idx = inst_idx as usize;
    if idx + 1 >= inst.len() {
        return Err(invalid(format!("instrument index {idx} out of range")));
    }
    let zone_range = bag_slice(inst[idx].bag, inst[idx + 1].bag, ibag.len(), "ibag")?;

    let mut inst_global: Option<GenValues> = None;
    for (zone_idx, bag_idx) in zone_range.enumerate() {
        let gens = gen_slice(ibag, bag_idx, igen.len(), "igen")?;
        let mut iv = inst_global.unwrap_or_else(GenValues::instrument_level);
        for g in &igen[gens] {
            iv.apply(g);
        }

        match iv.sample {
            Some(sample_idx) => {
                let si = sample_idx as usize;
                if si >= shdr.len() {
                    return Err(invalid(format!("sample index {si} out of range")));
                }
                if let Some(zone) = build_zone(&iv, pv, &shdr[si], &samples[si]) {
                    zones.push(zone);
                }
            }
            None if zone_idx == 0 => inst_global = Some(iv),
            None => {}
        }
    }
    Ok(())
}

fn bag_slice(
    start: u16,
    end: u16,
    len: usize,
    chunk_name: &str,
) -> Result<std::ops::Range<usize>, ParseError> {
    let (start, end) = (start as usize, end as usize);
    if start > end || end >= len {
        return Err(invalid(format!(
            "{chunk_name} indices {start}..{end} out of range ({len} records)"
        )));
    }
    Ok(start..end)
}

fn gen_slice(
    bags: &[u16],
    bag_idx: usize,
    gen_len: usize,
    chunk_name: &str,
) -> Result<std::ops::Range<usize>, ParseError> {
    let start = bags[bag_idx] as usize;
    let end = bags[bag_idx + 1] as usize;
    if start > end || end > gen_len {
        return Err(invalid(format!(
            "{chunk_name} indices {start}..{end} out of range ({gen_len} records)"
        )));
    }
    Ok(start..end)
}

/// Merge one instrument zone with the preset-level offsets and produce a
/// playable `Zone`. Returns `None` when the merged ranges are empty.
fn build_zone(
    iv: &GenValues,
    pv: &GenValues,
    sh: &SampleHeader,
    sample: &(Arc<SampleBuffer>, u64, u64),
) -> Option<Zone> {
    let key_range = iv.key_range.intersect(&pv.key_range);
    let vel_range = iv.vel_range.intersect(&pv.vel_range);
    if key_range.is_empty() || vel_range.is_empty() {
        return None;
    }

    let (buffer, loop_start, loop_end) = sample;
    if buffer.is_empty() {
        return None;
    }

    let root_key = if iv.root_key >= 0 {
        (iv.root_key & 0x7F) as u8
    } else if sh.original_pitch <= 127 {
        sh.original_pitch
    } else {
        60 // "unpitched" sentinel (255): treat as middle C
    };

    let envelope = AdsrConfig {
        attack: timecents_to_seconds(iv.attack_tc + pv.attack_tc),
        hold: timecents_to_seconds(iv.hold_tc + pv.hold_tc),
        decay: timecents_to_seconds(iv.decay_tc + pv.decay_tc),
        sustain: centibels_to_gain(iv.sustain_cb + pv.sustain_cb),
        release: timecents_to_seconds(iv.release_tc + pv.release_tc),
    };

    let loop_mode = match iv.sample_modes & 3 {
        1 => LoopMode::Continuous,
        3 => LoopMode::UntilRelease,
        _ => LoopMode::None,
    };
    let (loop_mode, loop_start, loop_end) = if *loop_end > *loop_start {
        (loop_mode, *loop_start, *loop_end)
    } else {
        (LoopMode::None, 0, 0)
    };

    let fc_cents = iv.filter_fc_cents + pv.filter_fc_cents;
    let filter = (fc_cents < FILTER_OPEN_CENTS).then(|| FilterConfig {
        cutoff_hz: 8.176 * (2.0_f64).powf(fc_cents.clamp(1500, FILTER_OPEN_CENTS) as f64 / 1200.0),
        q: (10.0_f64)
            .powf((iv.filter_q_cb + pv.filter_q_cb).clamp(0, 960) as f64 / 200.0)
            .max(std::f64::consts::FRAC_1_SQRT_2),
    });

    Some(Zone {
        key_range,
        vel_range,
        root_key,
        coarse_tune: iv.coarse_tune + pv.coarse_tune,
        fine_tune: iv.fine_tune + pv.fine_tune + sh.pitch_correction as i32,
        pan: ((iv.pan_mille + pv.pan_mille).clamp(-500, 500)) as f64 / 1000.0,
        attenuation: centibels_to_gain(iv.attenuation_cb + pv.attenuation_cb),
        envelope,
        loop_mode,
        loop_start,
        loop_end,
        filter,
        sample: Arc::clone(buffer),
    })
}
