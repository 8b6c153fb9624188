//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::db::Database;
use crate::generation::{GenerationError, GenerationRequest, ImageService};
use crate::job::{Job, RequestKind, UserId};
use crate::rate_limiter::RateLimitSettings;
use crate::state_machine::ImageRef;
use async_trait::async_trait;
use std::sync::Arc;

/// Outbound messages to a user
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a plain text message
    async fn send_text(&self, user_id: UserId, text: &str) -> Result<(), String>;

    /// Send an image with a caption
    async fn send_image(&self, user_id: UserId, image: &ImageRef, caption: &str)
        -> Result<(), String>;

    /// Send a message with the main menu keyboard attached
    async fn show_menu(&self, user_id: UserId, text: &str) -> Result<(), String>;
}

/// Produces outfit images for jobs
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(
        &self,
        images: &[ImageRef],
        brief: &str,
        kind: RequestKind,
    ) -> Result<ImageRef, GenerationError>;
}

/// Storage for jobs and service settings
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or update a job by id
    async fn save_job(&self, job: &Job) -> Result<(), String>;

    /// Rate-limit settings, if any were ever stored
    async fn load_settings(&self) -> Result<Option<RateLimitSettings>, String>;

    /// Replace the stored rate-limit settings
    async fn save_settings(&self, settings: RateLimitSettings) -> Result<(), String>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn send_text(&self, user_id: UserId, text: &str) -> Result<(), String> {
        (**self).send_text(user_id, text).await
    }

    async fn send_image(
        &self,
        user_id: UserId,
        image: &ImageRef,
        caption: &str,
    ) -> Result<(), String> {
        (**self).send_image(user_id, image, caption).await
    }

    async fn show_menu(&self, user_id: UserId, text: &str) -> Result<(), String> {
        (**self).show_menu(user_id, text).await
    }
}

#[async_trait]
impl<T: ImageGenerator + ?Sized> ImageGenerator for Arc<T> {
    async fn generate(
        &self,
        images: &[ImageRef],
        brief: &str,
        kind: RequestKind,
    ) -> Result<ImageRef, GenerationError> {
        (**self).generate(images, brief, kind).await
    }
}

#[async_trait]
impl<T: JobStore + ?Sized> JobStore for Arc<T> {
    async fn save_job(&self, job: &Job) -> Result<(), String> {
        (**self).save_job(job).await
    }

    async fn load_settings(&self) -> Result<Option<RateLimitSettings>, String> {
        (**self).load_settings().await
    }

    async fn save_settings(&self, settings: RateLimitSettings) -> Result<(), String> {
        (**self).save_settings(settings).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as `JobStore`
#[derive(Clone)]
pub struct DatabaseJobStore {
    db: Database,
}

impl DatabaseJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl JobStore for DatabaseJobStore {
    async fn save_job(&self, job: &Job) -> Result<(), String> {
        self.db.save_job(job).map_err(|e| e.to_string())
    }

    async fn load_settings(&self) -> Result<Option<RateLimitSettings>, String> {
        self.db.load_rate_limit_settings().map_err(|e| e.to_string())
    }

    async fn save_settings(&self, settings: RateLimitSettings) -> Result<(), String> {
        self.db
            .save_rate_limit_settings(settings)
            .map_err(|e| e.to_string())
    }
}

/// Adapter to use an `ImageService` as `ImageGenerator`
pub struct ServiceImageGenerator {
    service: Arc<dyn ImageService>,
}

impl ServiceImageGenerator {
    pub fn new(service: Arc<dyn ImageService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ImageGenerator for ServiceImageGenerator {
    async fn generate(
        &self,
        images: &[ImageRef],
        brief: &str,
        kind: RequestKind,
    ) -> Result<ImageRef, GenerationError> {
        let request = GenerationRequest {
            kind,
            images,
            brief,
        };
        self.service.generate(&request).await
    }
}
