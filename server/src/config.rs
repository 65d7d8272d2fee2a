// Configuration for the server, read from the environment

use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context;
use clone_core::BackendConfig;

use crate::validation::is_valid_language_code;

pub const DEFAULT_MODEL_NAME: &str = "tts_models/multilingual/multi-dataset/xtts_v2";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub voices_dir: PathBuf,
    pub cloned_dir: PathBuf,
    pub backend: BackendConfig,
    pub language: String,
    pub max_concurrent_synthesis: usize,
    pub synthesis_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_upload_bytes: usize,
    pub rate_limit_per_minute: u32,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub retention_max_age_hours: Option<u64>,
    pub retention_sweep_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            voices_dir: PathBuf::from("voices"),
            cloned_dir: PathBuf::from("cloned"),
            backend: BackendConfig::Command {
                program: "tts".to_string(),
                model_name: DEFAULT_MODEL_NAME.to_string(),
                use_gpu: true,
            },
            language: "en".to_string(),
            max_concurrent_synthesis: 1,
            synthesis_timeout_secs: 600,
            request_timeout_secs: 660,
            max_upload_bytes: 25 * 1024 * 1024,
            rate_limit_per_minute: 60,
            cors_allowed_origins: None,
            retention_max_age_hours: None,
            retention_sweep_secs: 3600,
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env_var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let synthesis_timeout_secs = env_or("SYNTHESIS_TIMEOUT_SECS", defaults.synthesis_timeout_secs);

        let backend_kind = env_var("CLONE_BACKEND").unwrap_or_else(|| "command".to_string());
        let backend = match backend_kind.as_str() {
            "command" => BackendConfig::Command {
                program: env_var("TTS_COMMAND").unwrap_or_else(|| "tts".to_string()),
                model_name: env_var("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
                use_gpu: env_var("USE_GPU").and_then(|v| parse_flag(&v)).unwrap_or(true),
            },
            "http" => BackendConfig::Http {
                base_url: env_var("CLONE_SERVER_URL")
                    .unwrap_or_else(|| "http://127.0.0.1:8020".to_string()),
                timeout: Duration::from_secs(synthesis_timeout_secs),
            },
            other => anyhow::bail!("Unknown CLONE_BACKEND '{other}' (expected 'command' or 'http')"),
        };

        let language = env_var("CLONE_LANGUAGE").unwrap_or(defaults.language);
        if !is_valid_language_code(&language) {
            anyhow::bail!("Invalid CLONE_LANGUAGE '{language}' (expected e.g. 'en' or 'zh-cn')");
        }

        let retention_max_age_hours = match env_var("RETENTION_MAX_AGE_HOURS") {
            Some(v) => Some(
                v.parse::<u64>()
                    .with_context(|| format!("Invalid RETENTION_MAX_AGE_HOURS '{v}'"))?,
            ),
            None => None,
        };

        let cors_allowed_origins = env_var("CORS_ALLOWED_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        Ok(Self {
            port: env_or("PORT", defaults.port),
            voices_dir: env_var("VOICES_DIR").map(PathBuf::from).unwrap_or(defaults.voices_dir),
            cloned_dir: env_var("CLONED_DIR").map(PathBuf::from).unwrap_or(defaults.cloned_dir),
            backend,
            language,
            max_concurrent_synthesis: env_or("MAX_CONCURRENT_SYNTHESIS", defaults.max_concurrent_synthesis),
            synthesis_timeout_secs,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            rate_limit_per_minute: env_or("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute),
            cors_allowed_origins,
            retention_max_age_hours,
            retention_sweep_secs: env_or("RETENTION_SWEEP_SECS", defaults.retention_sweep_secs),
        })
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Age after which stored files are swept, when retention is enabled.
    pub fn retention_max_age(&self) -> Option<Duration> {
        self.retention_max_age_hours
            .map(|hours| Duration::from_secs(hours.saturating_mul(3600)))
    }

    pub fn retention_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention_sweep_secs.max(1))
    }
}
