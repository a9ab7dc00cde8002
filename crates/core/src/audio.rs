//! Audio chunk types
//!
//! The engine works on linear PCM, 16 kHz, mono. Clients send 16-bit
//! little-endian samples over the wire; internally everything is f32 in
//! [-1.0, 1.0].

use serde::{Deserialize, Serialize};

/// Sample rate the whole pipeline assumes.
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// A chunk of mono audio as received from (or sent to) a client.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Monotonic sequence number within the session
    pub sequence: u64,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sequence: u64) -> Self {
        Self {
            samples,
            sample_rate: SAMPLE_RATE_HZ,
            sequence,
        }
    }

    /// Decode 16-bit little-endian PCM into a chunk.
    ///
    /// A trailing odd byte is dropped rather than rejected; clients
    /// occasionally split frames mid-sample on reconnect.
    pub fn from_pcm16(bytes: &[u8], sequence: u64) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / i16::MAX as f32)
            .collect();
        Self::new(samples, sequence)
    }

    /// Encode back to 16-bit little-endian PCM.
    pub fn to_pcm16(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.samples.len() * 2);
        for s in &self.samples {
            let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Duration of this chunk in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        (self.samples.len() as u64 * 1000) / self.sample_rate as u64
    }

    /// RMS energy in [0.0, 1.0].
    pub fn rms_energy(&self) -> f32 {
        rms_energy(&self.samples)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// RMS energy of a sample slice.
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Reference to a persisted utterance recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRef(pub String);

impl std::fmt::Display for AudioRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
