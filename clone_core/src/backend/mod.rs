//! Voice-cloning model backends.
//!
//! The model itself is an external collaborator: given a reference
//! recording, a text and a language code it writes a WAV file or fails.
//! A backend is constructed and checked once at startup and then shared by
//! every request.

mod command;
mod http;

use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::info;

pub use command::CommandCloner;
pub use http::HttpCloner;

/// One synthesis request handed to a backend.
#[derive(Debug, Clone, Copy)]
pub struct CloneJob<'a> {
    /// Recording that defines the target voice.
    pub reference: &'a Path,
    pub text: &'a str,
    pub language: &'a str,
    /// Where the backend must write the generated WAV.
    pub output: &'a Path,
}

#[async_trait]
pub trait VoiceCloner: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Readiness check run once before the server accepts traffic.
    async fn check(&self) -> anyhow::Result<()>;

    /// Synthesize `job.text` in the voice of `job.reference` into `job.output`.
    async fn clone_to_file(&self, job: &CloneJob<'_>) -> anyhow::Result<()>;
}

/// Which backend to run and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Spawn the Coqui `tts` command line once per request.
    Command {
        program: String,
        model_name: String,
        use_gpu: bool,
    },
    /// Forward requests to a long-running model server.
    Http { base_url: String, timeout: Duration },
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Command { .. } => "command",
            BackendConfig::Http { .. } => "http",
        }
    }
}

/// Build the configured backend and run its readiness check.
pub async fn load_cloner(config: &BackendConfig) -> anyhow::Result<Arc<dyn VoiceCloner>> {
    let cloner: Arc<dyn VoiceCloner> = match config {
        BackendConfig::Command {
            program,
            model_name,
            use_gpu,
        } => Arc::new(CommandCloner::new(program, model_name, *use_gpu)),
        BackendConfig::Http { base_url, timeout } => Arc::new(HttpCloner::new(base_url, *timeout)?),
    };
    info!("Checking voice cloning backend '{}'...", cloner.name());
    cloner.check().await?;
    info!("Voice cloning backend '{}' is ready", cloner.name());
    Ok(cloner)
}
