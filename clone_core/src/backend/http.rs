use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client,
};

use super::{CloneJob, VoiceCloner};
use crate::naming;

/// Talks to a model server that keeps the model resident.
///
/// Protocol: `GET {base}/health` answers 2xx when the model is loaded;
/// `POST {base}/clone` takes multipart fields `text`, `language` and the
/// file `speaker_wav`, and answers with the WAV bytes.
#[derive(Debug, Clone)]
pub struct HttpCloner {
    base_url: String,
    client: Client,
}

impl HttpCloner {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl VoiceCloner for HttpCloner {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn check(&self) -> anyhow::Result<()> {
        let url = self.endpoint("health");
        self.client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("model server unreachable at {url}"))?
            .error_for_status()
            .context("model server is not ready")?;
        Ok(())
    }

    async fn clone_to_file(&self, job: &CloneJob<'_>) -> anyhow::Result<()> {
        let reference = tokio::fs::read(job.reference)
            .await
            .with_context(|| format!("failed to read {}", job.reference.display()))?;
        let file_name = job
            .reference
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "speaker.wav".to_string());
        let mime = naming::audio_mime_type(&file_name);
        let part = Part::bytes(reference).file_name(file_name).mime_str(mime)?;
        let form = Form::new()
            .text("text", job.text.to_string())
            .text("language", job.language.to_string())
            .part("speaker_wav", part);

        let response = self
            .client
            .post(self.endpoint("clone"))
            .multipart(form)
            .send()
            .await
            .context("model server request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("model server returned {status}: {}", body.trim());
        }
        let audio = response.bytes().await.context("failed to read model server response")?;
        // written in one step so a cancelled call cannot finish the write later
        std::fs::write(job.output, &audio)
            .with_context(|| format!("failed to write {}", job.output.display()))?;
        Ok(())
    }
}
