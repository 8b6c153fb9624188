//! Runtime for handling bot events
//!
//! Routes inbound user events through the conversation table, carries out
//! the resulting effects and hands formed jobs to the queue.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::GenerationExecutor;
pub use traits::*;

use crate::conversation::ConversationTable;
use crate::job::{RequestKind, UserId};
use crate::queue::JobQueue;
use crate::rate_limiter::RateLimitSettings;
use crate::state_machine::{Effect, Event};
use std::sync::Arc;

/// Text sent alongside the main menu keyboard
pub const MENU_PROMPT: &str = "Choose a mode:";

/// Sent when a formed job could not be recorded
pub const COULD_NOT_PROCESS: &str = "Could not process your request, please try again.";

/// Acknowledgement sent once a job has been queued
pub fn acknowledgement(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::CombineOutfit => "Creating your outfit...",
        RequestKind::MatchOutfit => "Finding a matching outfit...",
    }
}

/// Caption on the generated image
pub fn result_caption(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::CombineOutfit => "Your outfit is ready!",
        RequestKind::MatchOutfit => "Here is a matching outfit!",
    }
}

/// Sent when generation fails
pub fn failure_text(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::CombineOutfit => {
            "Sorry, something went wrong while creating the outfit. Please try again."
        }
        RequestKind::MatchOutfit => {
            "Sorry, something went wrong while matching an outfit. Please try again."
        }
    }
}

/// Rate limits to start with. A missing or unreadable settings row falls
/// back to the defaults; a missing row also gets the defaults written.
pub async fn startup_rate_limits<S: JobStore>(store: &S) -> RateLimitSettings {
    let settings = match store.load_settings().await {
        Ok(Some(stored)) => stored,
        Ok(None) => {
            let defaults = RateLimitSettings::default();
            if let Err(e) = store.save_settings(defaults).await {
                tracing::warn!(error = %e, "Failed to store default rate limits");
            }
            defaults
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read rate limits, using defaults");
            RateLimitSettings::default()
        }
    };
    settings.clamped()
}

/// Type alias for production runtime with concrete implementations
pub type ProductionRuntime = BotRuntime<DatabaseJobStore, Arc<crate::telegram::TelegramClient>>;

/// Type alias for production executor with concrete implementations
pub type ProductionExecutor = GenerationExecutor<
    ServiceImageGenerator,
    DatabaseJobStore,
    Arc<crate::telegram::TelegramClient>,
>;

/// Front door for inbound events
pub struct BotRuntime<S, N>
where
    S: JobStore + 'static,
    N: Notifier + 'static,
{
    conversations: Arc<ConversationTable>,
    queue: Arc<JobQueue>,
    store: S,
    notifier: N,
}

impl<S, N> BotRuntime<S, N>
where
    S: JobStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        conversations: Arc<ConversationTable>,
        queue: Arc<JobQueue>,
        store: S,
        notifier: N,
    ) -> Self {
        Self {
            conversations,
            queue,
            store,
            notifier,
        }
    }

    /// Handle one event for a user. Never fails: rejections become replies
    /// and delivery problems are logged.
    pub async fn handle_event(&self, user_id: UserId, event: Event) {
        let handled = match self.conversations.handle(user_id, event) {
            Ok(handled) => handled,
            Err(rejection) => {
                tracing::debug!(user_id, reason = %rejection, "Event rejected");
                self.send_text(user_id, rejection.user_message()).await;
                return;
            }
        };

        for effect in handled.effects {
            self.execute_effect(user_id, effect).await;
        }

        let Some(job) = handled.job else {
            return;
        };

        if let Err(e) = self.store.save_job(&job).await {
            tracing::error!(
                job_id = %job.id(),
                user_id,
                error = %e,
                "Failed to record new job"
            );
            self.conversations.release(user_id, job.id());
            self.send_text(user_id, COULD_NOT_PROCESS).await;
            return;
        }

        tracing::info!(
            job_id = %job.id(),
            user_id,
            kind = %job.kind(),
            images = job.images().len(),
            "Job queued"
        );
        self.send_text(user_id, acknowledgement(job.kind())).await;
        self.queue.enqueue(job);
    }

    async fn execute_effect(&self, user_id: UserId, effect: Effect) {
        match effect {
            Effect::ShowMenu => {
                if let Err(e) = self.notifier.show_menu(user_id, MENU_PROMPT).await {
                    tracing::warn!(user_id, error = %e, "Failed to show menu");
                }
            }
            Effect::Reply { text } => self.send_text(user_id, &text).await,
            Effect::SubmitJob(_) => {
                // Converted into a job by the conversation table
                tracing::warn!(user_id, "Unexpected job submission effect");
            }
        }
    }

    async fn send_text(&self, user_id: UserId, text: &str) {
        if let Err(e) = self.notifier.send_text(user_id, text).await {
            tracing::warn!(user_id, error = %e, "Failed to send message");
        }
    }
}
