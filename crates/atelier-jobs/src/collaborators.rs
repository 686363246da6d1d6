//! External collaborators used by the handlers.
//!
//! Image synthesis and content analysis live behind [`ImageGenerator`] and
//! [`ContentAnalyzer`]. The HTTP adapters here talk JSON to a generation
//! service and classify failures into transient and permanent
//! [`GenerationError`]s. The credit ledger is defined next to the other
//! stores and re-exported from here.

use crate::error::GenerationError;
use atelier_config::GenerationConfig;
use atelier_core::{ArtifactKind, Interface, ProjectId};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;
use shaku::Component;
use tracing::{debug, warn};

pub use atelier_repository::{Ledger, LedgerError};

/// Input of one image generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRequest {
    pub project_id: ProjectId,
    pub kind: ArtifactKind,
    pub source_images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// A generated image.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeneratedImage {
    pub uri: String,
}

/// Input of one content analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentRequest {
    pub project_id: ProjectId,
    pub source_images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
}

/// Produces one image per request.
#[async_trait]
pub trait ImageGenerator: Interface + Send + Sync {
    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage, GenerationError>;
}

/// Produces structured listing content from source images.
#[async_trait]
pub trait ContentAnalyzer: Interface + Send + Sync {
    async fn analyze(&self, request: &ContentRequest) -> Result<JsonValue, GenerationError>;
}

const IMAGE_SERVICE: &str = "image-service";
const CONTENT_SERVICE: &str = "content-service";

/// Builds the HTTP client shared by the generation adapters.
pub fn build_http_client(config: &GenerationConfig) -> Result<reqwest::Client, GenerationError> {
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| GenerationError::InvalidResponse {
            service: "http-client",
            message: e.to_string(),
        })
}

async fn post_json<B, T>(
    client: &reqwest::Client,
    service: &'static str,
    endpoint: &str,
    api_key: Option<&str>,
    body: &B,
) -> Result<T, GenerationError>
where
    B: Serialize + Sync,
    T: DeserializeOwned,
{
    let mut request = client.post(endpoint).json(body);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    let response = request.send().await.map_err(|e| classify_transport(service, &e))?;
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        warn!(service, status = status.as_u16(), "Generation request failed");
        return Err(GenerationError::from_status(service, status.as_u16(), message));
    }

    response.json::<T>().await.map_err(|e| {
        if e.is_timeout() {
            GenerationError::Timeout { service }
        } else {
            GenerationError::InvalidResponse {
                service,
                message: e.to_string(),
            }
        }
    })
}

fn classify_transport(service: &'static str, err: &reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout { service }
    } else {
        GenerationError::Unavailable {
            service,
            status: None,
            message: err.to_string(),
        }
    }
}

/// [`ImageGenerator`] over HTTP. `POST {endpoint}` with an [`ImageRequest`],
/// expecting `{"uri": "..."}` back.
#[derive(Component)]
#[shaku(interface = ImageGenerator)]
pub struct HttpImageGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpImageGenerator {
    #[must_use]
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        }
    }

    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        Ok(Self::new(
            build_http_client(config)?,
            config.image_service_url.clone(),
            config.api_key.clone(),
        ))
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(&self, request: &ImageRequest) -> Result<GeneratedImage, GenerationError> {
        debug!(project_id = %request.project_id, kind = %request.kind, "Requesting image");
        let image: GeneratedImage = post_json(
            &self.client,
            IMAGE_SERVICE,
            &self.endpoint,
            self.api_key.as_deref(),
            request,
        )
        .await?;

        if image.uri.trim().is_empty() {
            return Err(GenerationError::InvalidResponse {
                service: IMAGE_SERVICE,
                message: "empty image uri".to_string(),
            });
        }
        Ok(image)
    }
}

/// [`ContentAnalyzer`] over HTTP. The response body is stored as the
/// artifact content and must be a JSON object.
#[derive(Component)]
#[shaku(interface = ContentAnalyzer)]
pub struct HttpContentAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpContentAnalyzer {
    #[must_use]
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        }
    }

    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        Ok(Self::new(
            build_http_client(config)?,
            config.content_service_url.clone(),
            config.api_key.clone(),
        ))
    }
}

#[async_trait]
impl ContentAnalyzer for HttpContentAnalyzer {
    async fn analyze(&self, request: &ContentRequest) -> Result<JsonValue, GenerationError> {
        debug!(project_id = %request.project_id, "Requesting structured content");
        let content: JsonValue = post_json(
            &self.client,
            CONTENT_SERVICE,
            &self.endpoint,
            self.api_key.as_deref(),
            request,
        )
        .await?;

        if !content.is_object() {
            return Err(GenerationError::InvalidResponse {
                service: CONTENT_SERVICE,
                message: "expected a JSON object".to_string(),
            });
        }
        Ok(content)
    }
}
