//! Dependency injection module using Shaku.

use atelier_config::{AppConfig, RedisConfig};
use atelier_core::{AtelierError, AtelierResult};
use atelier_jobs::collaborators::{
    build_http_client, HttpContentAnalyzerParameters, HttpImageGeneratorParameters,
};
use atelier_jobs::rate_limit::RedisRateLimiterParameters;
use atelier_jobs::service::JobServiceComponentParameters;
use atelier_jobs::{
    ContentAnalyzer, HttpContentAnalyzer, HttpImageGenerator, ImageGenerator, JobService,
    JobServiceComponent, RedisRateLimiter,
};
use atelier_repository::{
    ArtifactStore, DatabasePool, DatabasePoolInterface, DatabasePoolParameters, JobStore,
    PgArtifactStore, PgJobStore, PgLedger, PgProjectStore, ProjectStore,
};
use shaku::{module, HasComponent};
use std::sync::Arc;
use tracing::info;

use crate::app::Collaborators;

// Production module: Postgres stores, Redis rate limiter, HTTP
// generation clients and the submission service.
module! {
    pub AtelierModule {
        components = [
            DatabasePool,
            PgJobStore,
            PgProjectStore,
            PgArtifactStore,
            PgLedger,
            RedisRateLimiter,
            HttpImageGenerator,
            HttpContentAnalyzer,
            JobServiceComponent,
        ],
        providers = [],
    }
}

impl AtelierModule {
    #[must_use]
    pub fn job_service(&self) -> Arc<dyn JobService> {
        self.resolve()
    }

    #[must_use]
    pub fn database(&self) -> Arc<dyn DatabasePoolInterface> {
        self.resolve()
    }

    /// Stores and clients the worker side needs.
    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            jobs: HasComponent::<dyn JobStore>::resolve(self),
            projects: HasComponent::<dyn ProjectStore>::resolve(self),
            artifacts: HasComponent::<dyn ArtifactStore>::resolve(self),
            images: HasComponent::<dyn ImageGenerator>::resolve(self),
            content: HasComponent::<dyn ContentAnalyzer>::resolve(self),
        }
    }
}

/// Connects to Postgres and Redis and builds the module.
pub async fn build_module(config: &AppConfig) -> AtelierResult<Arc<AtelierModule>> {
    let db_pool = DatabasePool::new(&config.database).await?;
    let redis_pool = create_redis_pool(&config.redis)?;

    let http_client = build_http_client(&config.generation)
        .map_err(|e| AtelierError::Configuration(format!("Failed to build HTTP client: {e}")))?;
    let generation = &config.generation;

    let module = AtelierModule::builder()
        .with_component_parameters::<DatabasePool>(DatabasePoolParameters {
            pool: db_pool.inner().clone(),
        })
        .with_component_parameters::<RedisRateLimiter>(RedisRateLimiterParameters {
            pool: redis_pool.filter(|_| config.rate_limit.enabled),
            max_requests: config.rate_limit.max_requests,
            window_secs: config.rate_limit.window_secs.max(1),
            key_prefix: config.redis.key_prefix.clone(),
        })
        .with_component_parameters::<HttpImageGenerator>(HttpImageGeneratorParameters {
            client: http_client.clone(),
            endpoint: generation.image_service_url.clone(),
            api_key: generation.api_key.clone(),
        })
        .with_component_parameters::<HttpContentAnalyzer>(HttpContentAnalyzerParameters {
            client: http_client,
            endpoint: generation.content_service_url.clone(),
            api_key: generation.api_key.clone(),
        })
        .with_component_parameters::<JobServiceComponent>(JobServiceComponentParameters {
            config: config.jobs.clone(),
        })
        .build();

    info!("Dependency injection module built");
    Ok(Arc::new(module))
}

fn create_redis_pool(config: &RedisConfig) -> AtelierResult<Option<Arc<deadpool_redis::Pool>>> {
    if !config.enabled {
        info!("Redis disabled, submissions are not rate limited");
        return Ok(None);
    }

    let mut redis_cfg = deadpool_redis::Config::from_url(&config.url);
    redis_cfg.pool = Some(deadpool_redis::PoolConfig::new(config.pool_size));
    let pool = redis_cfg
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| AtelierError::Cache(format!("Failed to create Redis pool: {e}")))?;

    info!(url = %config.url, pool_size = config.pool_size, "Redis pool created");
    Ok(Some(Arc::new(pool)))
}
