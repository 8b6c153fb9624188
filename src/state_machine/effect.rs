//! Effects produced by state transitions

use crate::job::JobDraft;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send the main menu keyboard
    ShowMenu,

    /// Send a plain text reply
    Reply { text: String },

    /// Hand a finished draft over to the job queue
    SubmitJob(JobDraft),
}

impl Effect {
    pub fn reply(text: impl Into<String>) -> Self {
        Effect::Reply { text: text.into() }
    }

    pub fn submit_job(draft: JobDraft) -> Self {
        Effect::SubmitJob(draft)
    }
}
