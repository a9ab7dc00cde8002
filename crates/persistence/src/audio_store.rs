//! Durable storage for raw utterance audio

use async_trait::async_trait;
use std::path::PathBuf;

use parlo_core::audio::{AudioRef, SAMPLE_RATE_HZ};

use crate::PersistenceError;

/// Where raw utterance recordings go before analysis.
#[async_trait]
pub trait AudioStore: Send + Sync {
    /// Persist one utterance and return a reference usable in turn records.
    async fn persist_utterance(
        &self,
        session_id: &str,
        turn_number: u64,
        samples: &[f32],
    ) -> Result<AudioRef, PersistenceError>;
}

/// Writes utterances as 16 kHz mono 16-bit WAV files under a base directory.
pub struct WavAudioStore {
    base_dir: PathBuf,
}

impl WavAudioStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl AudioStore for WavAudioStore {
    async fn persist_utterance(
        &self,
        session_id: &str,
        turn_number: u64,
        samples: &[f32],
    ) -> Result<AudioRef, PersistenceError> {
        let dir = self.base_dir.join(session_id);
        let path = dir.join(format!("turn-{turn_number:05}.wav"));
        let samples = samples.to_vec();

        let path_for_task = path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), PersistenceError> {
            std::fs::create_dir_all(path_for_task.parent().unwrap())
                .map_err(|e| PersistenceError::Audio(e.to_string()))?;

            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: SAMPLE_RATE_HZ,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut writer = hound::WavWriter::create(&path_for_task, spec)
                .map_err(|e| PersistenceError::Audio(e.to_string()))?;
            for s in &samples {
                let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer
                    .write_sample(v)
                    .map_err(|e| PersistenceError::Audio(e.to_string()))?;
            }
            writer
                .finalize()
                .map_err(|e| PersistenceError::Audio(e.to_string()))
        })
        .await
        .map_err(|e| PersistenceError::Audio(e.to_string()))??;

        Ok(AudioRef(path.to_string_lossy().into_owned()))
    }
}
