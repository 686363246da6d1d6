//! Configuration validation module.
//!
//! Collects every problem in one pass so a bad deploy fails at startup
//! with the full list.

use crate::AppConfig;
use atelier_core::JobType;
use std::fmt;
use url::Url;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// Port number is invalid (must be 1-65535).
    InvalidPort { name: String, value: u16 },
    /// Pool size configuration is invalid (min must be <= max).
    InvalidPoolSize { min: u32, max: u32 },
    /// Pool size exceeds maximum allowed.
    PoolSizeTooLarge { value: u64, maximum: u64 },
    /// URL format is invalid.
    InvalidUrl { url_type: String, message: String },
    /// Timeout or interval must be positive.
    NonPositiveTimeout { name: String },
    /// Count must be positive.
    NonPositiveCount { name: String },
    /// Log level is invalid.
    InvalidLogLevel { value: String },
    /// Worker secret is too short.
    WorkerSecretTooShort { actual: usize, minimum: usize },
    /// Negative max retries for a job type.
    NegativeRetries { job_type: JobType, value: i32 },
    /// Negative credit cost for a job type.
    NegativeCost { job_type: JobType, value: i64 },
    /// Reaper lease does not outlast the worker's per-job timeout.
    LeaseNotAboveJobTimeout { lease_secs: u64, job_timeout_secs: u64 },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPort { name, value } => {
                write!(f, "Invalid port for {}: {} (must be 1-65535)", name, value)
            }
            Self::InvalidPoolSize { min, max } => write!(
                f,
                "Invalid pool size: min ({}) cannot be greater than max ({})",
                min, max
            ),
            Self::PoolSizeTooLarge { value, maximum } => {
                write!(f, "Pool size {} exceeds maximum allowed ({})", value, maximum)
            }
            Self::InvalidUrl { url_type, message } => {
                write!(f, "Invalid {} URL: {}", url_type, message)
            }
            Self::NonPositiveTimeout { name } => write!(f, "'{}' must be positive", name),
            Self::NonPositiveCount { name } => write!(f, "'{}' must be at least 1", name),
            Self::InvalidLogLevel { value } => write!(
                f,
                "Invalid log level: '{}' (valid: trace, debug, info, warn, error)",
                value
            ),
            Self::WorkerSecretTooShort { actual, minimum } => write!(
                f,
                "Worker secret too short: {} characters (minimum {})",
                actual, minimum
            ),
            Self::NegativeRetries { job_type, value } => {
                write!(f, "max_retries for {} must be >= 0, got {}", job_type, value)
            }
            Self::NegativeCost { job_type, value } => {
                write!(f, "credit_cost for {} must be >= 0, got {}", job_type, value)
            }
            Self::LeaseNotAboveJobTimeout {
                lease_secs,
                job_timeout_secs,
            } => write!(
                f,
                "reaper.lease_timeout_secs ({}) must be greater than worker.job_timeout_secs ({})",
                lease_secs, job_timeout_secs
            ),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

#[derive(Debug, Default)]
struct ValidationResult {
    errors: Vec<ConfigValidationError>,
}

impl ValidationResult {
    fn add_error(&mut self, error: ConfigValidationError) {
        self.errors.push(error);
    }

    fn require_positive(&mut self, name: &str, value: u64) {
        if value == 0 {
            self.add_error(ConfigValidationError::NonPositiveTimeout {
                name: name.to_string(),
            });
        }
    }

    fn require_url(&mut self, url_type: &str, value: &str, schemes: &[&str]) {
        match Url::parse(value) {
            Ok(url) if schemes.contains(&url.scheme()) => {}
            Ok(url) => self.add_error(ConfigValidationError::InvalidUrl {
                url_type: url_type.to_string(),
                message: format!(
                    "scheme '{}' not allowed (expected one of {})",
                    url.scheme(),
                    schemes.join(", ")
                ),
            }),
            Err(e) => self.add_error(ConfigValidationError::InvalidUrl {
                url_type: url_type.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn into_result(self) -> Result<(), Vec<ConfigValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Maximum connection pool size.
    const MAX_POOL_SIZE: u64 = 1000;
    /// Minimum worker secret length.
    const MIN_WORKER_SECRET_LENGTH: usize = 16;
    /// Valid log levels.
    const VALID_LOG_LEVELS: &'static [&'static str] = &["trace", "debug", "info", "warn", "error"];

    /// Validates the entire application configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut result = ValidationResult::default();

        Self::validate_server(config, &mut result);
        Self::validate_database(config, &mut result);
        Self::validate_redis(config, &mut result);
        Self::validate_queue(config, &mut result);
        Self::validate_generation(config, &mut result);
        Self::validate_observability(config, &mut result);

        result.into_result()
    }

    fn validate_server(config: &AppConfig, result: &mut ValidationResult) {
        if config.server.port == 0 {
            result.add_error(ConfigValidationError::InvalidPort {
                name: "server.port".to_string(),
                value: 0,
            });
        }
        result.require_positive("server.request_timeout_secs", config.server.request_timeout_secs);
    }

    fn validate_database(config: &AppConfig, result: &mut ValidationResult) {
        let db = &config.database;
        result.require_url("database", &db.url, &["postgres", "postgresql"]);

        if db.min_connections > db.max_connections {
            result.add_error(ConfigValidationError::InvalidPoolSize {
                min: db.min_connections,
                max: db.max_connections,
            });
        }
        if u64::from(db.max_connections) > Self::MAX_POOL_SIZE {
            result.add_error(ConfigValidationError::PoolSizeTooLarge {
                value: u64::from(db.max_connections),
                maximum: Self::MAX_POOL_SIZE,
            });
        }

        result.require_positive("database.connect_timeout_secs", db.connect_timeout_secs);
        result.require_positive("database.idle_timeout_secs", db.idle_timeout_secs);
    }

    fn validate_redis(config: &AppConfig, result: &mut ValidationResult) {
        if !config.redis.enabled {
            return;
        }

        result.require_url("redis", &config.redis.url, &["redis", "rediss"]);

        if config.redis.pool_size as u64 > Self::MAX_POOL_SIZE {
            result.add_error(ConfigValidationError::PoolSizeTooLarge {
                value: config.redis.pool_size as u64,
                maximum: Self::MAX_POOL_SIZE,
            });
        }
    }

    fn validate_queue(config: &AppConfig, result: &mut ValidationResult) {
        if config.dispatcher.enabled {
            result.require_positive("dispatcher.interval_secs", config.dispatcher.interval_secs);
            if config.dispatcher.concurrency == 0 {
                result.add_error(ConfigValidationError::NonPositiveCount {
                    name: "dispatcher.concurrency".to_string(),
                });
            }
        }

        if config.worker.secret.len() < Self::MIN_WORKER_SECRET_LENGTH {
            result.add_error(ConfigValidationError::WorkerSecretTooShort {
                actual: config.worker.secret.len(),
                minimum: Self::MIN_WORKER_SECRET_LENGTH,
            });
        }
        result.require_positive("worker.job_timeout_secs", config.worker.job_timeout_secs);
        if config.worker.batch_size == 0 {
            result.add_error(ConfigValidationError::NonPositiveCount {
                name: "worker.batch_size".to_string(),
            });
        }

        for job_type in JobType::all() {
            let settings = config.jobs.for_type(job_type);
            if settings.max_retries < 0 {
                result.add_error(ConfigValidationError::NegativeRetries {
                    job_type,
                    value: settings.max_retries,
                });
            }
            if settings.credit_cost < 0 {
                result.add_error(ConfigValidationError::NegativeCost {
                    job_type,
                    value: settings.credit_cost,
                });
            }
        }

        if config.rate_limit.enabled {
            result.require_positive("rate_limit.window_secs", config.rate_limit.window_secs);
            if config.rate_limit.max_requests == 0 {
                result.add_error(ConfigValidationError::NonPositiveCount {
                    name: "rate_limit.max_requests".to_string(),
                });
            }
        }

        if config.reaper.enabled {
            result.require_positive("reaper.lease_timeout_secs", config.reaper.lease_timeout_secs);
            result.require_positive("reaper.interval_secs", config.reaper.interval_secs);
            if config.reaper.lease_timeout_secs <= config.worker.job_timeout_secs {
                result.add_error(ConfigValidationError::LeaseNotAboveJobTimeout {
                    lease_secs: config.reaper.lease_timeout_secs,
                    job_timeout_secs: config.worker.job_timeout_secs,
                });
            }
        }
    }

    fn validate_generation(config: &AppConfig, result: &mut ValidationResult) {
        let generation = &config.generation;
        result.require_url("image_service", &generation.image_service_url, &["http", "https"]);
        result.require_url(
            "content_service",
            &generation.content_service_url,
            &["http", "https"],
        );
        result.require_positive("generation.request_timeout_secs", generation.request_timeout_secs);
    }

    fn validate_observability(config: &AppConfig, result: &mut ValidationResult) {
        let level = config.observability.log_level.to_lowercase();
        if !Self::VALID_LOG_LEVELS.contains(&level.as_str()) {
            result.add_error(ConfigValidationError::InvalidLogLevel {
                value: config.observability.log_level.clone(),
            });
        }
    }
}

/// Formats validation errors for display.
#[must_use]
pub fn format_validation_errors(errors: &[ConfigValidationError]) -> String {
    let mut output = String::from("Configuration validation failed:\n");
    for (i, error) in errors.iter().enumerate() {
        output.push_str(&format!("  {}. {}\n", i + 1, error));
    }
    output
}
