//! Job queue configuration.

use atelier_core::JobType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// In-process poll loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Run the poll loop inside the server process.
    #[serde(default = "default_dispatcher_enabled")]
    pub enabled: bool,

    /// Seconds between ticks.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Concurrent drains per tick.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: default_dispatcher_enabled(),
            interval_secs: default_interval(),
            concurrency: default_concurrency(),
        }
    }
}

impl DispatcherConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_dispatcher_enabled() -> bool {
    true
}

fn default_interval() -> u64 {
    60
}

fn default_concurrency() -> usize {
    2
}

/// Worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Bearer secret for `POST /internal/worker/tick`.
    #[serde(default = "default_worker_secret")]
    pub secret: String,

    /// Job execution timeout in seconds.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,

    /// Maximum jobs one drain processes.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            secret: default_worker_secret(),
            job_timeout_secs: default_job_timeout(),
            batch_size: default_batch_size(),
        }
    }
}

impl WorkerConfig {
    /// Insecure placeholder shipped in the defaults.
    pub const DEFAULT_SECRET: &'static str = "change-me-worker-secret";

    #[must_use]
    pub const fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

fn default_worker_secret() -> String {
    WorkerConfig::DEFAULT_SECRET.to_string()
}

fn default_job_timeout() -> u64 {
    300 // 5 minutes
}

fn default_batch_size() -> usize {
    10
}

/// Settings for one job type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTypeConfig {
    /// Default max retries for new jobs of this type.
    pub max_retries: i32,
    /// Credits debited on submission.
    pub credit_cost: i64,
}

/// Per job type settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobsConfig {
    #[serde(default = "default_artifact")]
    pub generate_artifact: JobTypeConfig,

    #[serde(default = "default_composite_pack")]
    pub generate_composite_pack: JobTypeConfig,

    #[serde(default = "default_structured_content")]
    pub generate_structured_content: JobTypeConfig,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            generate_artifact: default_artifact(),
            generate_composite_pack: default_composite_pack(),
            generate_structured_content: default_structured_content(),
        }
    }
}

impl JobsConfig {
    /// Settings for `job_type`.
    #[must_use]
    pub const fn for_type(&self, job_type: JobType) -> &JobTypeConfig {
        match job_type {
            JobType::GenerateArtifact => &self.generate_artifact,
            JobType::GenerateCompositePack => &self.generate_composite_pack,
            JobType::GenerateStructuredContent => &self.generate_structured_content,
        }
    }

    #[must_use]
    pub const fn max_retries(&self, job_type: JobType) -> i32 {
        self.for_type(job_type).max_retries
    }

    #[must_use]
    pub const fn credit_cost(&self, job_type: JobType) -> i64 {
        self.for_type(job_type).credit_cost
    }
}

fn default_artifact() -> JobTypeConfig {
    JobTypeConfig {
        max_retries: 3,
        credit_cost: 1,
    }
}

// The pack pays for its children up front; they are enqueued without a debit.
fn default_composite_pack() -> JobTypeConfig {
    JobTypeConfig {
        max_retries: 1,
        credit_cost: 7,
    }
}

fn default_structured_content() -> JobTypeConfig {
    JobTypeConfig {
        max_retries: 3,
        credit_cost: 1,
    }
}

/// Fixed-window submission rate limit, per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,

    /// Submissions allowed per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Window length in seconds.
    #[serde(default = "default_window")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            max_requests: default_max_requests(),
            window_secs: default_window(),
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_max_requests() -> u64 {
    10
}

fn default_window() -> u64 {
    60
}

/// Requeues jobs stuck in processing. Off by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    #[serde(default)]
    pub enabled: bool,

    /// A processing job older than this is considered abandoned.
    #[serde(default = "default_lease_timeout")]
    pub lease_timeout_secs: u64,

    /// Seconds between reaper passes.
    #[serde(default = "default_reaper_interval")]
    pub interval_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            lease_timeout_secs: default_lease_timeout(),
            interval_secs: default_reaper_interval(),
        }
    }
}

impl ReaperConfig {
    #[must_use]
    pub const fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.lease_timeout_secs)
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_lease_timeout() -> u64 {
    900 // 15 minutes
}

fn default_reaper_interval() -> u64 {
    60
}

/// External generation services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Image synthesis endpoint.
    #[serde(default = "default_image_url")]
    pub image_service_url: String,

    /// Content analysis endpoint.
    #[serde(default = "default_content_url")]
    pub content_service_url: String,

    /// Bearer token sent to both services.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            image_service_url: default_image_url(),
            content_service_url: default_content_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl GenerationConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_image_url() -> String {
    "http://localhost:9100/v1/images".to_string()
}

fn default_content_url() -> String {
    "http://localhost:9100/v1/content".to_string()
}

fn default_request_timeout() -> u64 {
    120
}
