//! Pure state transition function

use super::event::{Command, Event};
use super::state::{ConversationState, Step};
use super::Effect;
use crate::job::{JobDraft, RequestKind};
use thiserror::Error;

pub const OUTFIT_PROMPT_REQUEST: &str =
    "Describe the look you want (for example \"business casual\" or \"weekend outfit\"):";
pub const MATCHING_PROMPT_REQUEST: &str =
    "Describe what the outfit should add (for example \"pair it with jeans\" or \"find a top\"):";
pub const OUTFIT_IMAGES_REQUEST: &str =
    "Now send photos of the items you want to combine into an outfit.";
pub const MATCHING_IMAGE_REQUEST: &str =
    "Now send a photo of the item you want an outfit for.";
pub const PHOTO_RECEIVED: &str =
    "Photo received. Send more or use /generate to create the outfit.";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConversationState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConversationState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Rejected input. The state stays as it was and the user is told why.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    #[error("No images collected before generate")]
    NoImages,
    #[error("Outfit description is empty")]
    EmptyBrief,
    #[error("Photo message carried no images")]
    EmptyPhotos,
    #[error("A job for this user is still in progress")]
    JobInProgress,
}

impl TransitionError {
    /// Text shown to the user for this rejection
    pub fn user_message(self) -> &'static str {
        match self {
            TransitionError::NoImages => "Please send photos of the items first.",
            TransitionError::EmptyBrief => "Please describe the outfit first.",
            TransitionError::EmptyPhotos => "That message had no photo in it.",
            TransitionError::JobInProgress => {
                "Still working on your previous request, please wait for the result."
            }
        }
    }
}

/// Pure transition function
///
/// Given the same state and event it always produces the same result; no
/// clock, randomness or I/O is involved. Forming a job is expressed as an
/// [`Effect::SubmitJob`] draft and the step is left unchanged: only job
/// completion brings the user back to Idle.
pub fn transition(
    state: &ConversationState,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state.step, event) {
        (_, Event::Command(Command::Start)) => {
            let mut next = state.clone();
            next.step = Step::Idle;
            Ok(TransitionResult::new(next).with_effect(Effect::ShowMenu))
        }

        (Step::Idle, Event::MenuChoice(option)) => {
            let mut next = state.clone();
            next.step = option.prompt_step();
            next.request_kind = Some(option.request_kind());
            next.images.clear();
            let prompt = match option.request_kind() {
                RequestKind::CombineOutfit => OUTFIT_PROMPT_REQUEST,
                RequestKind::MatchOutfit => MATCHING_PROMPT_REQUEST,
            };
            Ok(TransitionResult::new(next).with_effect(Effect::reply(prompt)))
        }

        (Step::AwaitingOutfitPrompt, Event::Text(text)) => {
            let mut next = state.clone();
            next.brief = text;
            next.step = Step::AwaitingOutfitImages;
            Ok(TransitionResult::new(next).with_effect(Effect::reply(OUTFIT_IMAGES_REQUEST)))
        }

        (Step::AwaitingMatchingPrompt, Event::Text(text)) => {
            let mut next = state.clone();
            next.brief = text;
            next.step = Step::AwaitingMatchingImage;
            Ok(TransitionResult::new(next).with_effect(Effect::reply(MATCHING_IMAGE_REQUEST)))
        }

        (Step::AwaitingOutfitImages, Event::Photos(photos)) => {
            if photos.is_empty() {
                return Err(TransitionError::EmptyPhotos);
            }
            let mut next = state.clone();
            next.images.extend(photos);
            Ok(TransitionResult::new(next).with_effect(Effect::reply(PHOTO_RECEIVED)))
        }

        (Step::AwaitingOutfitImages, Event::Command(Command::Generate)) => {
            if state.has_outstanding_job() {
                return Err(TransitionError::JobInProgress);
            }
            if state.images.is_empty() {
                return Err(TransitionError::NoImages);
            }
            if state.brief.trim().is_empty() {
                return Err(TransitionError::EmptyBrief);
            }
            let draft = JobDraft {
                kind: RequestKind::CombineOutfit,
                images: state.images.clone(),
                brief: state.brief.clone(),
            };
            Ok(TransitionResult::new(state.clone()).with_effect(Effect::submit_job(draft)))
        }

        (Step::AwaitingMatchingImage, Event::Photos(photos)) => {
            if state.has_outstanding_job() {
                return Err(TransitionError::JobInProgress);
            }
            let first = photos
                .into_iter()
                .next()
                .ok_or(TransitionError::EmptyPhotos)?;
            let mut next = state.clone();
            next.images.push(first);
            // Only the first collected photo drives a matching request
            let draft = JobDraft {
                kind: RequestKind::MatchOutfit,
                images: next.images.iter().take(1).cloned().collect(),
                brief: state.brief.clone(),
            };
            Ok(TransitionResult::new(next).with_effect(Effect::submit_job(draft)))
        }

        _ => Ok(TransitionResult::new(state.clone()).with_effect(Effect::ShowMenu)),
    }
}
