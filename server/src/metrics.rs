// Metrics collection and tracking

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Latency samples kept per endpoint for percentiles.
const LATENCY_WINDOW: usize = 1000;

/// Per-endpoint counters.
#[derive(Debug, Clone, Default)]
pub struct EndpointMetrics {
    request_count: Arc<AtomicU64>,
    error_count: Arc<AtomicU64>,
    total_latency_ms: Arc<AtomicU64>,
    max_latency_ms: Arc<AtomicU64>,
    latency_samples: Arc<Mutex<VecDeque<u64>>>,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, latency: Duration, success: bool) {
        let latency_ms = latency.as_millis() as u64;
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);
        if !success {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut samples) = self.latency_samples.lock() {
            if samples.len() == LATENCY_WINDOW {
                samples.pop_front();
            }
            samples.push_back(latency_ms);
        }
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> EndpointStats {
        let request_count = self.request_count();
        let avg_latency_ms = if request_count == 0 {
            0.0
        } else {
            self.total_latency_ms.load(Ordering::Relaxed) as f64 / request_count as f64
        };

        let mut sorted: Vec<u64> = self
            .latency_samples
            .lock()
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        sorted.sort_unstable();
        let percentile = |p: usize| -> u64 {
            if sorted.is_empty() {
                return 0;
            }
            sorted[(sorted.len() * p / 100).min(sorted.len() - 1)]
        };

        EndpointStats {
            request_count,
            error_count: self.error_count(),
            avg_latency_ms,
            min_latency_ms: sorted.first().copied().unwrap_or(0),
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
            p50_latency_ms: percentile(50),
            p95_latency_ms: percentile(95),
            p99_latency_ms: percentile(99),
        }
    }
}

/// Model invocation counters.
#[derive(Debug, Clone, Default)]
pub struct SynthesisMetrics {
    synthesis_count: Arc<AtomicU64>,
    failure_count: Arc<AtomicU64>,
    total_synthesis_time_ms: Arc<AtomicU64>,
    total_audio_ms: Arc<AtomicU64>,
}

impl SynthesisMetrics {
    pub fn record_success(&self, elapsed: Duration, audio_ms: u64) {
        self.synthesis_count.fetch_add(1, Ordering::Relaxed);
        self.total_synthesis_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.total_audio_ms.fetch_add(audio_ms, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> SynthesisStats {
        let count = self.synthesis_count.load(Ordering::Relaxed);
        let avg_synthesis_time_ms = if count == 0 {
            0.0
        } else {
            self.total_synthesis_time_ms.load(Ordering::Relaxed) as f64 / count as f64
        };
        SynthesisStats {
            synthesis_count: count,
            failure_count: self.failure_count.load(Ordering::Relaxed),
            avg_synthesis_time_ms,
            total_audio_ms: self.total_audio_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppMetrics {
    pub started_at: Instant,
    pub request_count: Arc<AtomicU64>,
    pub record_voice: EndpointMetrics,
    pub clone_voice: EndpointMetrics,
    pub audio: EndpointMetrics,
    pub synthesis: SynthesisMetrics,
}

impl AppMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            request_count: Arc::new(AtomicU64::new(0)),
            record_voice: EndpointMetrics::new(),
            clone_voice: EndpointMetrics::new(),
            audio: EndpointMetrics::new(),
            synthesis: SynthesisMetrics::default(),
        }
    }

    pub fn snapshot(&self) -> MetricsResponse {
        MetricsResponse {
            timestamp: Utc::now(),
            system: SystemMetrics::collect(
                self.request_count.load(Ordering::Relaxed),
                self.started_at.elapsed().as_secs(),
            ),
            endpoints: EndpointMetricsResponse {
                record_voice: self.record_voice.stats(),
                clone_voice: self.clone_voice.stats(),
                audio: self.audio.stats(),
            },
            synthesis: self.synthesis.stats(),
        }
    }
}

impl Default for AppMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub endpoints: EndpointMetricsResponse,
    pub synthesis: SynthesisStats,
}

#[derive(Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub request_count: u64,
    pub uptime_seconds: u64,
    pub system_load: Option<f64>,
}

impl SystemMetrics {
    fn collect(request_count: u64, uptime_seconds: u64) -> Self {
        let mut system = sysinfo::System::new();
        system.refresh_cpu();
        system.refresh_memory();

        let memory_used = system.used_memory();
        let memory_total = system.total_memory();
        let memory_usage_percent = if memory_total > 0 {
            (memory_used as f64 / memory_total as f64 * 100.0) as f32
        } else {
            0.0
        };
        let load = sysinfo::System::load_average().one;

        Self {
            cpu_usage_percent: system.global_cpu_info().cpu_usage(),
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            request_count,
            uptime_seconds,
            // zero on platforms without load averages
            system_load: (load > 0.0).then_some(load),
        }
    }
}

#[derive(Serialize)]
pub struct EndpointMetricsResponse {
    pub record_voice: EndpointStats,
    pub clone_voice: EndpointStats,
    pub audio: EndpointStats,
}

#[derive(Debug, Serialize)]
pub struct EndpointStats {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct SynthesisStats {
    pub synthesis_count: u64,
    pub failure_count: u64,
    pub avg_synthesis_time_ms: f64,
    pub total_audio_ms: u64,
}
