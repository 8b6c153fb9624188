//! Generation jobs
//!
//! A job is formed by the conversation state machine once a user has supplied
//! enough input, travels through the queue, and is finished by the executor.
//! Its payload never changes after formation; only the status moves forward.

use crate::state_machine::event::ImageRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Telegram user identifier; private chats share it as the chat id
pub type UserId = i64;

/// Unique job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// What the user asked the generator to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Several garments combined into one outfit
    CombineOutfit,
    /// A full outfit built around a single garment
    MatchOutfit,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::CombineOutfit => "combine_outfit",
            RequestKind::MatchOutfit => "match_outfit",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "combine_outfit" => Ok(RequestKind::CombineOutfit),
            "match_outfit" => Ok(RequestKind::MatchOutfit),
            other => Err(format!("unknown request kind: {other}")),
        }
    }
}

/// Lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

/// Payload produced by the state machine before the job gets an identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDraft {
    pub kind: RequestKind,
    /// Snapshot of the user's images at the time the job was formed
    pub images: Vec<ImageRef>,
    pub brief: String,
}

/// One unit of generation work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    user_id: UserId,
    kind: RequestKind,
    images: Vec<ImageRef>,
    brief: String,
    status: JobStatus,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    result: Option<ImageRef>,
    error: Option<String>,
}

impl Job {
    /// Give a draft its identity. The job starts out `Queued`.
    pub fn form(user_id: UserId, draft: JobDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            user_id,
            kind: draft.kind,
            images: draft.images,
            brief: draft.brief,
            status: JobStatus::Queued,
            created_at,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    /// Rebuild a job from its persisted columns
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: JobId,
        user_id: UserId,
        kind: RequestKind,
        images: Vec<ImageRef>,
        brief: String,
        status: JobStatus,
        created_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        result: Option<ImageRef>,
        error: Option<String>,
    ) -> Self {
        Self {
            id,
            user_id,
            kind,
            images,
            brief,
            status,
            created_at,
            completed_at,
            result,
            error,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn images(&self) -> &[ImageRef] {
        &self.images
    }

    pub fn brief(&self) -> &str {
        &self.brief
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn result(&self) -> Option<&ImageRef> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Queued -> Processing, done once at dispatch
    pub fn start_processing(&mut self) -> Result<(), JobError> {
        self.advance(JobStatus::Queued, JobStatus::Processing)
    }

    /// Processing -> Completed
    pub fn complete(&mut self, result: ImageRef, at: DateTime<Utc>) -> Result<(), JobError> {
        self.advance(JobStatus::Processing, JobStatus::Completed)?;
        self.result = Some(result);
        self.completed_at = Some(at);
        Ok(())
    }

    /// Processing -> Failed
    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) -> Result<(), JobError> {
        self.advance(JobStatus::Processing, JobStatus::Failed)?;
        self.error = Some(error.into());
        self.completed_at = Some(at);
        Ok(())
    }

    fn advance(&mut self, expected: JobStatus, to: JobStatus) -> Result<(), JobError> {
        if self.status != expected {
            return Err(JobError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}
