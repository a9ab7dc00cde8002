//! Voice-activity gating
//!
//! The detector itself is pluggable (an ONNX model, an energy heuristic);
//! this module turns its per-window probabilities into a debounced
//! is-speech boolean with confirmed edges, and accounts silence in audio
//! time so turn-taking decisions are deterministic for a given stream.

use parlo_core::{audio::rms_energy, VoiceActivityDetector};

/// RMS at which the energy detector saturates to probability 1.0. An RMS
/// of 0.01 (quiet speech) maps exactly onto the default 0.40 threshold.
const ENERGY_REFERENCE_RMS: f32 = 0.025;

/// Energy-based fallback detector.
///
/// Maps RMS energy onto a pseudo-probability. Good enough for tests and
/// for deployments without a model; a trained VAD plugs in behind the same
/// trait.
#[derive(Debug, Default)]
pub struct EnergyVad;

impl VoiceActivityDetector for EnergyVad {
    fn speech_probability(&mut self, window: &[f32]) -> f32 {
        (rms_energy(window) / ENERGY_REFERENCE_RMS).clamp(0.0, 1.0)
    }

    fn reset(&mut self) {}
}

#[derive(Debug, Clone)]
pub struct SpeechGateConfig {
    pub threshold: f32,
    pub window_samples: usize,
    pub speech_confirm_frames: u32,
    pub silence_confirm_frames: u32,
    pub sample_rate: u32,
}

impl Default for SpeechGateConfig {
    fn default() -> Self {
        use parlo_config::constants::vad;
        Self {
            threshold: vad::PROBABILITY_THRESHOLD,
            window_samples: vad::WINDOW_SAMPLES,
            speech_confirm_frames: vad::SPEECH_CONFIRM_FRAMES,
            silence_confirm_frames: vad::SILENCE_CONFIRM_FRAMES,
            sample_rate: parlo_core::audio::SAMPLE_RATE_HZ,
        }
    }
}

/// What one chunk did to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GateUpdate {
    /// A confirmed speech edge happened inside this chunk
    pub speech_started: bool,
    /// A confirmed silence edge happened inside this chunk
    pub speech_ended: bool,
    /// Debounced state after the chunk
    pub is_speech: bool,
    /// Audio milliseconds of uninterrupted below-threshold windows since
    /// the last above-threshold window
    pub silence_ms: u64,
}

/// Debounces per-window speech probabilities into confirmed edges.
///
/// Holds the analysis residue buffer (samples that do not yet fill a
/// window); this buffer is only ever touched by the gate.
pub struct SpeechGate {
    config: SpeechGateConfig,
    pending: Vec<f32>,
    is_speech: bool,
    consecutive_speech: u32,
    consecutive_silence: u32,
    /// Raw below-threshold audio time since the last above-threshold window
    silence_ms: u64,
}

impl SpeechGate {
    pub fn new(config: SpeechGateConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            is_speech: false,
            consecutive_speech: 0,
            consecutive_silence: 0,
            silence_ms: 0,
        }
    }

    fn window_ms(&self) -> u64 {
        (self.config.window_samples as u64 * 1_000) / self.config.sample_rate as u64
    }

    /// Feed one chunk through the detector, window by window.
    pub fn process(
        &mut self,
        samples: &[f32],
        vad: &mut dyn VoiceActivityDetector,
    ) -> GateUpdate {
        self.pending.extend_from_slice(samples);

        let mut update = GateUpdate::default();
        let window = self.config.window_samples;
        let window_ms = self.window_ms();

        let mut offset = 0;
        while self.pending.len() - offset >= window {
            let probability = vad.speech_probability(&self.pending[offset..offset + window]);
            offset += window;

            if probability >= self.config.threshold {
                self.consecutive_speech += 1;
                self.consecutive_silence = 0;
                self.silence_ms = 0;
                if !self.is_speech && self.consecutive_speech >= self.config.speech_confirm_frames
                {
                    self.is_speech = true;
                    update.speech_started = true;
                }
            } else {
                self.consecutive_silence += 1;
                self.consecutive_speech = 0;
                self.silence_ms += window_ms;
                if self.is_speech
                    && self.consecutive_silence >= self.config.silence_confirm_frames
                {
                    self.is_speech = false;
                    update.speech_ended = true;
                }
            }
        }
        self.pending.drain(..offset);

        update.is_speech = self.is_speech;
        update.silence_ms = self.silence_ms;
        update
    }

    pub fn is_speech(&self) -> bool {
        self.is_speech
    }

    /// Clear all internal state for the next turn.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.is_speech = false;
        self.consecutive_speech = 0;
        self.consecutive_silence = 0;
        self.silence_ms = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> SpeechGate {
        SpeechGate::new(SpeechGateConfig::default())
    }

    fn speech_chunk(windows: usize) -> Vec<f32> {
        vec![0.3; windows * 512]
    }

    fn silence_chunk(windows: usize) -> Vec<f32> {
        vec![0.0; windows * 512]
    }

    #[test]
    fn test_speech_edge_needs_confirmation() {
        let mut gate = gate();
        let mut vad = EnergyVad;

        // One speech window: not yet confirmed
        let update = gate.process(&speech_chunk(1), &mut vad);
        assert!(!update.speech_started);
        assert!(!update.is_speech);

        // Second window confirms
        let update = gate.process(&speech_chunk(1), &mut vad);
        assert!(update.speech_started);
        assert!(update.is_speech);
    }

    #[test]
    fn test_silence_edge_needs_confirmation() {
        let mut gate = gate();
        let mut vad = EnergyVad;
        gate.process(&speech_chunk(2), &mut vad);

        let update = gate.process(&silence_chunk(2), &mut vad);
        assert!(!update.speech_ended);
        assert!(update.is_speech);

        let update = gate.process(&silence_chunk(1), &mut vad);
        assert!(update.speech_ended);
        assert!(!update.is_speech);
    }

    #[test]
    fn test_silence_accumulates_in_audio_time() {
        let mut gate = gate();
        let mut vad = EnergyVad;
        gate.process(&speech_chunk(2), &mut vad);

        // 512 samples at 16 kHz = 32 ms per window
        let update = gate.process(&silence_chunk(5), &mut vad);
        assert_eq!(update.silence_ms, 160);

        // Speech resets the accumulation
        let update = gate.process(&speech_chunk(1), &mut vad);
        assert_eq!(update.silence_ms, 0);
    }

    #[test]
    fn test_residue_buffering() {
        let mut gate = gate();
        let mut vad = EnergyVad;

        // 700 samples: one full window processed, 188 held back
        let update = gate.process(&vec![0.3; 700], &mut vad);
        assert!(!update.is_speech);

        // 400 more completes the second window and confirms speech
        let update = gate.process(&vec![0.3; 400], &mut vad);
        assert!(update.is_speech);
    }

    #[test]
    fn test_reset() {
        let mut gate = gate();
        let mut vad = EnergyVad;
        gate.process(&speech_chunk(3), &mut vad);
        assert!(gate.is_speech());

        gate.reset();
        assert!(!gate.is_speech());
        let update = gate.process(&silence_chunk(1), &mut vad);
        assert_eq!(update.silence_ms, 32);
    }
}
