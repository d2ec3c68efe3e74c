//! Volume envelope — attack/hold/decay/sustain/release.
//!
//! Attack is a linear ramp; decay and release are exponential segments, the
//! conventional shape for sample playback. A level below the -100 dB floor
//! ends the envelope, which is what retires a voice.

/// Amplitude below which a released envelope counts as silent (-100 dB).
pub const SILENCE_FLOOR: f64 = 1e-5;

/// Envelope stages, in order of progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
    Finished,
}

/// Envelope timing parameters, all times in seconds.
#[derive(Debug, Clone, Copy)]
pub struct AdsrConfig {
    pub attack: f64,
    pub hold: f64,
    pub decay: f64,
    /// Sustain level [0, 1].
    pub sustain: f64,
    pub release: f64,
}

impl Default for AdsrConfig {
    fn default() -> Self {
        // 1 ms segments and full sustain: effectively a gate with a
        // click-free edge, matching an all-defaults SoundFont zone.
        AdsrConfig {
            attack: 0.001,
            hold: 0.0,
            decay: 0.001,
            sustain: 1.0,
            release: 0.001,
        }
    }
}

/// Per-voice envelope generator.
///
/// All state advances one sample at a time, so output is identical no matter
/// how rendering is split into blocks.
#[derive(Debug, Clone)]
pub struct Envelope {
    config: AdsrConfig,
    stage: Stage,
    level: f64,
    sample_rate: f64,
    /// Samples in the current linear stage (attack/hold).
    stage_samples: usize,
    stage_counter: usize,
    /// Per-sample multipliers for the exponential stages.
    decay_coef: f64,
    release_coef: f64,
}

impl Envelope {
    pub fn new(config: AdsrConfig, sample_rate: f64) -> Self {
        let mut env = Envelope {
            config,
            stage: Stage::Idle,
            level: 0.0,
            sample_rate,
            stage_samples: 0,
            stage_counter: 0,
            decay_coef: 1.0,
            release_coef: 0.0,
        };
        env.recompute_coefficients();
        env
    }

    /// Trigger the envelope (note on).
    pub fn gate_on(&mut self) {
        self.level = 0.0;
        self.stage = Stage::Attack;
        self.stage_samples = (self.config.attack * self.sample_rate) as usize;
        self.stage_counter = 0;
    }

    /// Release the envelope (note off). Honors the release time from any
    /// stage; releasing an idle or finished envelope is a no-op.
    pub fn gate_off(&mut self) {
        if self.stage == Stage::Idle || self.stage == Stage::Finished {
            return;
        }
        // An attack that never advanced sits at 0.0, which the exponential
        // release can't decay from; start the tail at one attack step so an
        // immediate on/off still renders audibly.
        if self.stage == Stage::Attack {
            let first_step = 1.0 / self.stage_samples.max(1) as f64;
            self.level = self.level.max(first_step.min(1.0));
        }
        self.stage = Stage::Release;
    }

    /// Force the envelope straight to `Finished`, e.g. when a non-looping
    /// voice runs off the end of its sample.
    pub fn kill(&mut self) {
        self.finish();
    }

    /// Update the sample rate, preserving the current stage and level.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        if sample_rate <= 0.0 || sample_rate == self.sample_rate {
            return;
        }
        // Rescale the remaining linear-stage time
        if self.stage_samples > 0 {
            let ratio = sample_rate / self.sample_rate;
            self.stage_samples = ((self.stage_samples as f64) * ratio) as usize;
            self.stage_counter = ((self.stage_counter as f64) * ratio) as usize;
        }
        self.sample_rate = sample_rate;
        self.recompute_coefficients();
    }

    /// Generate the next envelope sample [0, 1].
    pub fn next_sample(&mut self) -> f64 {
        match self.stage {
            Stage::Idle | Stage::Finished => {
                self.level = 0.0;
            }
            Stage::Attack => {
                if self.stage_samples == 0 {
                    self.level = 1.0;
                    self.enter_hold();
                } else {
                    self.stage_counter += 1;
                    self.level = self.stage_counter as f64 / self.stage_samples as f64;
                    if self.stage_counter >= self.stage_samples {
                        self.level = 1.0;
                        self.enter_hold();
                    }
                }
            }
            Stage::Hold => {
                self.level = 1.0;
                self.stage_counter += 1;
                if self.stage_counter >= self.stage_samples {
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                self.level *= self.decay_coef;
                let sustain = self.config.sustain;
                if self.level <= sustain.max(SILENCE_FLOOR) {
                    if sustain <= SILENCE_FLOOR {
                        self.finish();
                    } else {
                        self.level = sustain;
                        self.stage = Stage::Sustain;
                    }
                }
            }
            Stage::Sustain => {
                self.level = self.config.sustain;
            }
            Stage::Release => {
                self.level *= self.release_coef;
                if self.level <= SILENCE_FLOOR {
                    self.finish();
                }
            }
        }
        self.level
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Current output level, without advancing.
    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Finished
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == Stage::Release
    }

    fn enter_hold(&mut self) {
        self.stage_samples = (self.config.hold * self.sample_rate) as usize;
        self.stage_counter = 0;
        if self.stage_samples == 0 {
            self.stage = Stage::Decay;
        } else {
            self.stage = Stage::Hold;
        }
    }

    fn finish(&mut self) {
        self.level = 0.0;
        self.stage = Stage::Finished;
    }

    fn recompute_coefficients(&mut self) {
        let decay_samples = (self.config.decay * self.sample_rate).max(1.0);
        let release_samples = (self.config.release * self.sample_rate).max(1.0);
        // Exponential segments: multiply per sample so the level reaches the
        // target after the configured time.
        let decay_target = self.config.sustain.max(SILENCE_FLOOR);
        self.decay_coef = if decay_target >= 1.0 {
            1.0
        } else {
            decay_target.powf(1.0 / decay_samples)
        };
        self.release_coef = SILENCE_FLOOR.powf(1.0 / release_samples);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(attack: f64, hold: f64, decay: f64, sustain: f64, release: f64) -> AdsrConfig {
        AdsrConfig {
            attack,
            hold,
            decay,
            sustain,
            release,
        }
    }

    #[test]
    fn starts_idle() {
        let env = Envelope::new(AdsrConfig::default(), 44100.0);
        assert_eq!(env.stage(), Stage::Idle);
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn attack_reaches_one() {
        let mut env = Envelope::new(config(0.01, 0.0, 0.1, 0.7, 0.1), 44100.0);
        env.gate_on();

        let mut max_level = 0.0_f64;
        for _ in 0..500 {
            max_level = max_level.max(env.next_sample());
        }
        assert!(
            (max_level - 1.0).abs() < 0.01,
            "Attack should reach ~1.0, got {max_level}"
        );
    }

    #[test]
    fn hold_stays_at_peak() {
        let mut env = Envelope::new(config(0.001, 0.01, 0.1, 0.5, 0.1), 44100.0);
        env.gate_on();

        // Run past attack (44 samples) into hold (441 samples)
        for _ in 0..100 {
            env.next_sample();
        }
        assert_eq!(env.stage(), Stage::Hold);
        assert!((env.level() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn decay_settles_at_sustain() {
        let mut env = Envelope::new(config(0.001, 0.0, 0.01, 0.6, 0.1), 44100.0);
        env.gate_on();

        for _ in 0..2000 {
            env.next_sample();
        }
        assert_eq!(env.stage(), Stage::Sustain);
        assert!(
            (env.level() - 0.6).abs() < 0.01,
            "Should sustain at 0.6, got {}",
            env.level()
        );
    }

    #[test]
    fn zero_sustain_finishes_without_release() {
        // Percussive zones decay to silence and the envelope self-retires
        let mut env = Envelope::new(config(0.001, 0.0, 0.01, 0.0, 0.1), 44100.0);
        env.gate_on();

        for _ in 0..5000 {
            env.next_sample();
        }
        assert!(env.is_finished(), "Zero sustain should finish on its own");
    }

    #[test]
    fn release_is_monotonic_and_finishes() {
        let mut env = Envelope::new(config(0.001, 0.0, 0.001, 0.8, 0.02), 44100.0);
        env.gate_on();
        for _ in 0..500 {
            env.next_sample();
        }
        env.gate_off();
        assert!(env.is_releasing());

        let mut prev = env.level();
        let mut finished = false;
        for _ in 0..5000 {
            let s = env.next_sample();
            assert!(
                s <= prev + 1e-12,
                "Release must be non-increasing: {s} after {prev}"
            );
            prev = s;
            if env.is_finished() {
                finished = true;
                break;
            }
        }
        assert!(finished, "Release should reach the silence floor");
    }

    #[test]
    fn release_time_is_honored() {
        // With a 20 ms release the envelope should still be audible at 10 ms
        // and silent shortly after 20 ms.
        let sr = 44100.0;
        let mut env = Envelope::new(config(0.001, 0.0, 0.001, 1.0, 0.02), sr);
        env.gate_on();
        for _ in 0..500 {
            env.next_sample();
        }
        env.gate_off();

        for _ in 0..((0.01 * sr) as usize) {
            env.next_sample();
        }
        assert!(env.level() > 0.001, "Mid-release level should be audible");

        for _ in 0..((0.015 * sr) as usize) {
            env.next_sample();
        }
        assert!(env.is_finished(), "Envelope should finish after release time");
    }

    #[test]
    fn immediate_gate_off_still_releases_audibly() {
        // On and off with no samples in between: the tail must still render
        // instead of dropping straight through the silence floor
        let mut env = Envelope::new(config(0.001, 0.0, 0.001, 1.0, 0.02), 44100.0);
        env.gate_on();
        env.gate_off();
        assert!(env.is_releasing());

        let first = env.next_sample();
        assert!(
            first > SILENCE_FLOOR,
            "First release sample should be audible, got {first}"
        );

        let mut prev = first;
        let mut lifetime = 1;
        for _ in 0..5000 {
            let s = env.next_sample();
            assert!(s <= prev + 1e-12, "Release must not grow: {s} after {prev}");
            prev = s;
            if env.is_finished() {
                break;
            }
            lifetime += 1;
        }
        assert!(env.is_finished(), "Tail should still reach the floor");
        assert!(lifetime > 50, "Tail should outlive a single block, got {lifetime}");
    }

    #[test]
    fn gate_off_from_attack_releases() {
        let mut env = Envelope::new(config(0.1, 0.0, 0.1, 0.8, 0.01), 44100.0);
        env.gate_on();
        for _ in 0..100 {
            env.next_sample();
        }
        env.gate_off();
        assert!(env.is_releasing());

        for _ in 0..2000 {
            env.next_sample();
        }
        assert!(env.is_finished());
    }

    #[test]
    fn output_stays_in_range() {
        let mut env = Envelope::new(config(0.01, 0.005, 0.05, 0.5, 0.1), 44100.0);
        env.gate_on();
        for _ in 0..10000 {
            let s = env.next_sample();
            assert!((0.0..=1.0).contains(&s), "Envelope out of range: {s}");
        }
        env.gate_off();
        for _ in 0..10000 {
            let s = env.next_sample();
            assert!((0.0..=1.0).contains(&s), "Envelope out of range: {s}");
        }
        assert!(env.is_finished());
    }
}
