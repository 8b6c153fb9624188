//! Outfit image generation
//!
//! Provides a common interface for the image pipeline plus a logging wrapper.

mod error;
mod openai;
mod prompts;

pub use error::{GenerationError, GenerationErrorKind};
pub use openai::OpenAIImageService;
pub use prompts::Prompts;

use crate::job::RequestKind;
use crate::state_machine::ImageRef;
use async_trait::async_trait;
use std::sync::Arc;

/// Input for one generation call
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub kind: RequestKind,
    /// Garment photos in the order the user sent them
    pub images: &'a [ImageRef],
    pub brief: &'a str,
}

/// Common interface for image generation backends
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Produce one outfit image and return a reference to it
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<ImageRef, GenerationError>;

    /// Model used for the final image
    fn model_id(&self) -> &str;
}

/// Logging wrapper for image services
pub struct LoggingGenerator {
    inner: Arc<dyn ImageService>,
    model_id: String,
}

impl LoggingGenerator {
    pub fn new(inner: Arc<dyn ImageService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl ImageService for LoggingGenerator {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<ImageRef, GenerationError> {
        let start = std::time::Instant::now();
        let result = self.inner.generate(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => {
                tracing::info!(
                    model = %self.model_id,
                    kind = %request.kind,
                    images = request.images.len(),
                    duration_ms = %duration.as_millis(),
                    "Image generation completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    kind = %request.kind,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    error_kind = e.kind.as_str(),
                    transient = e.kind.is_transient(),
                    "Image generation failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::MockImageService;

    #[tokio::test]
    async fn test_logging_generator_passes_through() {
        let inner = Arc::new(MockImageService::new("mock-image"));
        inner.queue_result(Ok(ImageRef::new("https://cdn/1.png")));
        inner.queue_result(Err(GenerationError::rate_limit("slow down")));
        let logging = LoggingGenerator::new(inner.clone());

        let images = [ImageRef::new("a")];
        let request = GenerationRequest {
            kind: RequestKind::MatchOutfit,
            images: &images,
            brief: "jeans",
        };

        assert_eq!(logging.model_id(), "mock-image");
        assert_eq!(
            logging.generate(&request).await.unwrap().as_str(),
            "https://cdn/1.png"
        );
        let err = logging.generate(&request).await.unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::RateLimit);
        assert_eq!(inner.call_count(), 2);
    }
}
