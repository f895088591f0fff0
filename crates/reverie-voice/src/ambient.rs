//! Ambient sound effects: the wipe chime and the awakening singing bowl.
//!
//! Tones are synthesized on the fly and played straight into the output mixer,
//! so they overlap narrated speech without touching the speech sink.

use crate::voice_output::OutputDevice;
use rand::Rng;
use rodio::Source;
use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const SAMPLE_RATE: u32 = 44_100;
const MASTER_GAIN: f32 = 0.5;

/// Pentatonic chime pitches (C6, D6, E6, G6, A6).
const CHIME_FREQUENCIES: [f32; 5] = [1046.50, 1174.66, 1318.51, 1567.98, 1760.00];
const BOWL_FUNDAMENTAL: f32 = 220.0;
const BOWL_HARMONICS: [(f32, f32); 4] = [(1.0, 0.5), (1.5, 0.2), (2.02, 0.1), (2.98, 0.05)];

/// Fire-and-forget sound effects, independent of speech playback.
pub trait AmbientSounds: Send + Sync {
    fn chime(&self);
    fn singing_bowl(&self);
}

/// No-op effects for tests and headless runs.
#[derive(Debug, Default)]
pub struct NullAmbient;

impl AmbientSounds for NullAmbient {
    fn chime(&self) {}
    fn singing_bowl(&self) {}
}

#[derive(Debug, Clone, Copy)]
enum Wave {
    Sine,
    Triangle,
}

#[derive(Debug, Clone, Copy)]
struct Partial {
    frequency: f32,
    amplitude: f32,
    wave: Wave,
}

/// Additive tone with a linear attack and an exponential decay to -60 dB.
#[derive(Debug, Clone)]
pub struct Tone {
    partials: Vec<Partial>,
    attack: f32,
    decay_end: f32,
    total_samples: u64,
    position: u64,
    gain: f32,
}

impl Tone {
    fn new(partials: Vec<Partial>, attack: f32, decay_end: f32, length: f32, gain: f32) -> Self {
        Self {
            partials,
            attack,
            decay_end,
            total_samples: (length * SAMPLE_RATE as f32) as u64,
            position: 0,
            gain,
        }
    }

    /// Single sine partial at a random pentatonic pitch, slightly detuned.
    pub fn chime() -> Self {
        let mut rng = rand::thread_rng();
        let base = CHIME_FREQUENCIES[rng.gen_range(0..CHIME_FREQUENCIES.len())];
        let detune = rng.gen_range(-5.0..5.0);
        Self::new(
            vec![Partial {
                frequency: base + detune,
                amplitude: 0.3,
                wave: Wave::Sine,
            }],
            0.05,
            2.5,
            3.0,
            MASTER_GAIN,
        )
    }

    /// A3 fundamental with three inharmonic overtones.
    pub fn singing_bowl() -> Self {
        let partials = BOWL_HARMONICS
            .iter()
            .enumerate()
            .map(|(i, &(ratio, amplitude))| Partial {
                frequency: BOWL_FUNDAMENTAL * ratio,
                amplitude,
                wave: if i == 0 { Wave::Sine } else { Wave::Triangle },
            })
            .collect();
        Self::new(partials, 0.5, 8.0, 8.0, MASTER_GAIN)
    }

    fn envelope(&self, t: f32) -> f32 {
        if t < self.attack {
            t / self.attack
        } else {
            let span = (self.decay_end - self.attack).max(f32::EPSILON);
            let progress = ((t - self.attack) / span).min(1.0);
            // 1.0 -> 0.001 exponentially
            (0.001f32.ln() * progress).exp()
        }
    }
}

impl Iterator for Tone {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.position >= self.total_samples {
            return None;
        }
        let t = self.position as f32 / SAMPLE_RATE as f32;
        self.position += 1;
        let env = self.envelope(t);
        let sample: f32 = self
            .partials
            .iter()
            .map(|p| {
                let phase = 2.0 * PI * p.frequency * t;
                let value = match p.wave {
                    Wave::Sine => phase.sin(),
                    Wave::Triangle => (2.0 / PI) * phase.sin().asin(),
                };
                value * p.amplitude
            })
            .sum();
        Some(sample * env * self.gain)
    }
}

impl Source for Tone {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(
            self.total_samples as f32 / SAMPLE_RATE as f32,
        ))
    }
}

/// Effects mixed directly into the default output device.
pub struct RodioAmbient {
    device: Arc<OutputDevice>,
}

impl RodioAmbient {
    pub fn new(device: Arc<OutputDevice>) -> Self {
        Self { device }
    }

    fn play(&self, tone: Tone) {
        if let Err(e) = self.device.handle().play_raw(tone) {
            warn!("Ambient: playback failed: {}", e);
        }
    }
}

impl AmbientSounds for RodioAmbient {
    fn chime(&self) {
        self.play(Tone::chime());
    }

    fn singing_bowl(&self) {
        self.play(Tone::singing_bowl());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chime_is_three_seconds_and_decays() {
        let tone = Tone::chime();
        assert_eq!(tone.total_duration(), Some(Duration::from_secs(3)));
        let samples: Vec<f32> = tone.collect();
        assert_eq!(samples.len(), 3 * SAMPLE_RATE as usize);
        let peak_head = samples[..SAMPLE_RATE as usize / 4]
            .iter()
            .fold(0.0f32, |m, s| m.max(s.abs()));
        let peak_tail = samples[samples.len() - SAMPLE_RATE as usize / 4..]
            .iter()
            .fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak_head > peak_tail * 10.0);
        assert!(peak_head <= 0.3 * MASTER_GAIN + 1e-3);
    }

    #[test]
    fn bowl_attack_starts_silent() {
        let mut tone = Tone::singing_bowl();
        assert_eq!(tone.next(), Some(0.0));
        assert_eq!(tone.partials.len(), 4);
    }
}
