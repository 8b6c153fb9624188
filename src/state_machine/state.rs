//! Conversation state types

use super::event::{ImageRef, MenuOption};
use crate::job::{JobId, RequestKind, UserId};
use serde::{Deserialize, Serialize};

/// Where a user is in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Nothing in progress, the menu is the only meaningful input
    #[default]
    Idle,
    /// Chose "combine", waiting for the outfit description
    AwaitingOutfitPrompt,
    /// Collecting garment photos until `/generate`
    AwaitingOutfitImages,
    /// Chose "match", waiting for the description
    AwaitingMatchingPrompt,
    /// Waiting for the single garment photo
    AwaitingMatchingImage,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Idle => "idle",
            Step::AwaitingOutfitPrompt => "awaiting_outfit_prompt",
            Step::AwaitingOutfitImages => "awaiting_outfit_images",
            Step::AwaitingMatchingPrompt => "awaiting_matching_prompt",
            Step::AwaitingMatchingImage => "awaiting_matching_image",
        }
    }
}

impl MenuOption {
    /// The mode this menu button selects
    pub fn request_kind(self) -> RequestKind {
        match self {
            MenuOption::Combine => RequestKind::CombineOutfit,
            MenuOption::Match => RequestKind::MatchOutfit,
        }
    }

    /// First step of the flow this button starts
    pub fn prompt_step(self) -> Step {
        match self {
            MenuOption::Combine => Step::AwaitingOutfitPrompt,
            MenuOption::Match => Step::AwaitingMatchingPrompt,
        }
    }
}

/// Per-user conversation record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub user_id: UserId,
    pub step: Step,
    /// Set when the user picks a mode from the menu
    pub request_kind: Option<RequestKind>,
    /// Insertion order matters to the generation prompt
    pub images: Vec<ImageRef>,
    pub brief: String,
    /// Job this user is waiting on; blocks forming another one
    #[serde(default)]
    pub outstanding_job: Option<JobId>,
}

impl ConversationState {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            step: Step::Idle,
            request_kind: None,
            images: Vec::new(),
            brief: String::new(),
            outstanding_job: None,
        }
    }

    pub fn has_outstanding_job(&self) -> bool {
        self.outstanding_job.is_some()
    }

    /// Back to Idle after a job resolves. The brief and mode are kept so
    /// the record still describes the last request.
    pub fn reset_to_idle(&mut self) {
        self.step = Step::Idle;
        self.images.clear();
        self.outstanding_job = None;
    }
}
