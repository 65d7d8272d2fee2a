use std::{ffi::OsString, process::Stdio};

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{CloneJob, VoiceCloner};

/// Lines of stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 5;

/// Runs the Coqui TTS command line tool for every request.
#[derive(Debug, Clone)]
pub struct CommandCloner {
    program: String,
    model_name: String,
    use_gpu: bool,
}

impl CommandCloner {
    pub fn new(program: &str, model_name: &str, use_gpu: bool) -> Self {
        Self {
            program: program.to_string(),
            model_name: model_name.to_string(),
            use_gpu,
        }
    }

    fn args(&self, job: &CloneJob<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--model_name".into(),
            self.model_name.clone().into(),
            "--text".into(),
            job.text.into(),
            "--speaker_wav".into(),
            job.reference.into(),
            "--language_idx".into(),
            job.language.into(),
            "--out_path".into(),
            job.output.into(),
        ];
        if self.use_gpu {
            args.push("--use_cuda".into());
            args.push("true".into());
        }
        args
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[async_trait]
impl VoiceCloner for CommandCloner {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn check(&self) -> anyhow::Result<()> {
        let output = Command::new(&self.program)
            .arg("--help")
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("could not start '{}'", self.program))?;
        if !output.status.success() {
            anyhow::bail!(
                "'{} --help' exited with {}: {}",
                self.program,
                output.status,
                stderr_tail(&output.stderr)
            );
        }
        Ok(())
    }

    async fn clone_to_file(&self, job: &CloneJob<'_>) -> anyhow::Result<()> {
        debug!("Running {} for {}", self.program, job.output.display());
        let output = Command::new(&self.program)
            .args(self.args(job))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("could not start '{}'", self.program))?;
        if !output.status.success() {
            anyhow::bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr_tail(&output.stderr)
            );
        }
        Ok(())
    }
}
