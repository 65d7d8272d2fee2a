//! Storage and model plumbing for the voice cloning service.
//!
//! [`CloneManager`] ties together the sample directory, the artifact
//! directory and the model backend, and runs one synthesis at a time per
//! permit.

pub mod backend;
pub mod naming;
mod store;
mod wav;

use std::{io, path::PathBuf, sync::Arc, time::Duration, time::Instant};

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub use backend::{load_cloner, BackendConfig, CloneJob, VoiceCloner};
pub use store::{OutputStore, PendingArtifact, VoiceStore};

#[derive(Debug, Error)]
pub enum CloneError {
    #[error("no voice recorded for user '{0}'")]
    NoSample(String),

    #[error("{0:#}")]
    Synthesis(anyhow::Error),

    #[error("timed out after {} seconds", .0.as_secs())]
    TimedOut(Duration),

    #[error("storage error: {0}")]
    Io(#[from] io::Error),
}

/// A finished synthesis.
#[derive(Debug, Clone)]
pub struct ClonedAudio {
    pub file_name: String,
    pub path: PathBuf,
    pub reference: PathBuf,
    pub duration_ms: u64,
    pub elapsed: Duration,
}

pub struct CloneManager {
    voices: VoiceStore,
    outputs: OutputStore,
    cloner: Arc<dyn VoiceCloner>,
    language: String,
    permits: Semaphore,
    timeout: Duration,
}

impl CloneManager {
    /// `max_concurrent` bounds how many model calls may run at once (min 1);
    /// `timeout` bounds each call once it holds a permit.
    pub fn new(
        voices: VoiceStore,
        outputs: OutputStore,
        cloner: Arc<dyn VoiceCloner>,
        language: impl Into<String>,
        max_concurrent: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            voices,
            outputs,
            cloner,
            language: language.into(),
            permits: Semaphore::new(max_concurrent.max(1)),
            timeout,
        }
    }

    pub fn outputs(&self) -> &OutputStore {
        &self.outputs
    }

    /// Store an uploaded sample. `ext` must already be validated.
    pub async fn record_sample(
        &self,
        user_id: &str,
        ext: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, CloneError> {
        let path = self.voices.save(user_id, ext, bytes).await?;
        info!("Saved voice sample for user '{}' to '{}'", user_id, path.display());
        Ok(path)
    }

    /// Synthesize `text` in the voice of the newest sample of `user_id`.
    pub async fn clone_voice(&self, user_id: &str, text: &str) -> Result<ClonedAudio, CloneError> {
        let reference = self
            .voices
            .latest_sample(user_id)
            .await?
            .ok_or_else(|| CloneError::NoSample(user_id.to_string()))?;
        let (file_name, path) = self.outputs.allocate(user_id);

        info!(
            "Cloning voice for user '{}' using sample '{}'. Output: '{}'",
            user_id,
            reference.display(),
            path.display()
        );
        info!("Input text: '{}'", preview(text, 50));

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| CloneError::Synthesis(anyhow::anyhow!("synthesis permits closed: {e}")))?;

        // removes the output on every exit path, cancellation included
        let pending = PendingArtifact::new(path);
        let started = Instant::now();
        let job = CloneJob {
            reference: &reference,
            text,
            language: &self.language,
            output: pending.path(),
        };
        let duration_ms = match tokio::time::timeout(self.timeout, self.run(&job)).await {
            Ok(Ok(ms)) => ms,
            Ok(Err(e)) => {
                warn!("Voice cloning failed for user '{}': {:#}", user_id, e);
                return Err(CloneError::Synthesis(e));
            }
            Err(_) => {
                warn!(
                    "Voice cloning for user '{}' timed out after {:?}",
                    user_id, self.timeout
                );
                return Err(CloneError::TimedOut(self.timeout));
            }
        };
        let path = pending.keep();
        let elapsed = started.elapsed();
        info!(
            "Generated {} ms of audio at '{}' in {:?}",
            duration_ms,
            path.display(),
            elapsed
        );

        Ok(ClonedAudio {
            file_name,
            path,
            reference,
            duration_ms,
            elapsed,
        })
    }

    async fn run(&self, job: &CloneJob<'_>) -> anyhow::Result<u64> {
        self.cloner.clone_to_file(job).await?;
        let output = job.output.to_path_buf();
        tokio::task::spawn_blocking(move || wav::read_duration_ms(&output))
            .await
            .map_err(|e| anyhow::anyhow!("WAV check task failed: {e}"))?
            .map_err(|e| {
                e.context(format!(
                    "backend '{}' produced no usable audio",
                    self.cloner.name()
                ))
            })
    }

    /// Path of a generated artifact, if it exists.
    pub async fn artifact(&self, file_name: &str) -> io::Result<Option<PathBuf>> {
        self.outputs.locate(file_name).await
    }

    /// Delete samples and artifacts older than `max_age`.
    pub async fn prune(&self, max_age: Duration) -> io::Result<(usize, usize)> {
        let samples = self.voices.prune_older_than(max_age).await?;
        let artifacts = self.outputs.prune_older_than(max_age).await?;
        Ok((samples, artifacts))
    }
}

/// First `max_chars` characters of `text`, marked when truncated.
fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
