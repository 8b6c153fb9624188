//! Job execution
//!
//! Each dispatched job runs on its own task through [`GenerationExecutor`].
//! Whatever happens inside, the user's conversation goes back to Idle once.

use super::traits::{ImageGenerator, JobStore, Notifier};
use super::{failure_text, result_caption};
use crate::conversation::ConversationTable;
use crate::generation::GenerationError;
use crate::job::{Job, JobId, UserId};
use crate::queue::{panic_message, JobExecutor};
use crate::state_machine::ImageRef;
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Resets the user's conversation when dropped, covering early returns and
/// unwinding alike.
struct IdleResetGuard {
    conversations: Arc<ConversationTable>,
    user_id: UserId,
    job_id: JobId,
}

impl Drop for IdleResetGuard {
    fn drop(&mut self) {
        if self.conversations.reset_to_idle(self.user_id, self.job_id) {
            tracing::debug!(user_id = self.user_id, job_id = %self.job_id, "Conversation reset to idle");
        }
    }
}

/// Runs jobs against the generation collaborator and reports back to users
pub struct GenerationExecutor<G, S, N>
where
    G: ImageGenerator + 'static,
    S: JobStore + 'static,
    N: Notifier + 'static,
{
    generator: G,
    store: S,
    notifier: N,
    conversations: Arc<ConversationTable>,
}

impl<G, S, N> GenerationExecutor<G, S, N>
where
    G: ImageGenerator + 'static,
    S: JobStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(generator: G, store: S, notifier: N, conversations: Arc<ConversationTable>) -> Self {
        Self {
            generator,
            store,
            notifier,
            conversations,
        }
    }

    async fn persist(&self, job: &Job) -> Result<(), String> {
        let result = self.store.save_job(job).await;
        if let Err(e) = &result {
            tracing::error!(
                job_id = %job.id(),
                status = %job.status(),
                error = %e,
                "Failed to persist job"
            );
        }
        result
    }

    async fn generate(&self, job: &Job) -> Result<ImageRef, GenerationError> {
        AssertUnwindSafe(self.generator.generate(job.images(), job.brief(), job.kind()))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(GenerationError::unknown(format!(
                    "Generation panicked: {}",
                    panic_message(payload.as_ref())
                )))
            })
    }

    async fn finish_success(&self, job: Job, image: ImageRef) {
        let mut completed = job.clone();
        if let Err(e) = completed.complete(image.clone(), Utc::now()) {
            tracing::error!(job_id = %job.id(), error = %e, "Cannot complete job");
            return;
        }

        // A result we could not record counts as a failed job
        if let Err(e) = self.persist(&completed).await {
            self.finish_failure(job, format!("Failed to persist result: {e}"))
                .await;
            return;
        }

        tracing::info!(
            job_id = %job.id(),
            user_id = job.user_id(),
            kind = %job.kind(),
            "Job completed"
        );

        let caption = result_caption(job.kind());
        if let Err(e) = self
            .notifier
            .send_image(job.user_id(), &image, caption)
            .await
        {
            tracing::warn!(user_id = job.user_id(), error = %e, "Failed to send result image");
        }
    }

    async fn finish_failure(&self, mut job: Job, error: String) {
        tracing::error!(
            job_id = %job.id(),
            user_id = job.user_id(),
            kind = %job.kind(),
            error = %error,
            "Job failed"
        );

        match job.fail(error, Utc::now()) {
            // persist logs its own failure
            Ok(()) => {
                self.persist(&job).await.ok();
            }
            Err(e) => tracing::error!(job_id = %job.id(), error = %e, "Cannot fail job"),
        }

        if let Err(e) = self
            .notifier
            .send_text(job.user_id(), failure_text(job.kind()))
            .await
        {
            tracing::warn!(user_id = job.user_id(), error = %e, "Failed to send failure notice");
        }
    }
}

#[async_trait]
impl<G, S, N> JobExecutor for GenerationExecutor<G, S, N>
where
    G: ImageGenerator + 'static,
    S: JobStore + 'static,
    N: Notifier + 'static,
{
    async fn execute(&self, mut job: Job) {
        let _reset = IdleResetGuard {
            conversations: Arc::clone(&self.conversations),
            user_id: job.user_id(),
            job_id: job.id(),
        };

        if let Err(e) = job.start_processing() {
            tracing::error!(job_id = %job.id(), error = %e, "Job not dispatchable");
            return;
        }
        tracing::debug!(job_id = %job.id(), user_id = job.user_id(), "Job processing");
        // A missed Processing save is logged and superseded by the final save
        self.persist(&job).await.ok();

        match self.generate(&job).await {
            Ok(image) => self.finish_success(job, image).await,
            Err(e) => self.finish_failure(job, e.message).await,
        }
    }
}
