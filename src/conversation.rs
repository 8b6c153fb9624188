//! Per-user conversation records
//!
//! Holds one [`ConversationState`] per user and applies events to it through
//! the pure transition function. Records are created on first contact and
//! live in memory only.

use crate::job::{Job, JobId, UserId};
use crate::state_machine::{transition, ConversationState, Effect, Event, TransitionError};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Outcome of applying one event to a user's conversation
#[derive(Debug)]
pub struct Handled {
    /// Effects other than job submission, in emission order
    pub effects: Vec<Effect>,
    /// Job formed by this event, already marked outstanding for the user
    pub job: Option<Job>,
}

#[derive(Debug, Default)]
pub struct ConversationTable {
    states: Mutex<HashMap<UserId, ConversationState>>,
}

impl ConversationTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, ConversationState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply an event for a user. Events for the same user are serialized by
    /// the table lock, so two photos can never race on the image list.
    pub fn handle(&self, user_id: UserId, event: Event) -> Result<Handled, TransitionError> {
        let mut states = self.lock();
        let state = states
            .entry(user_id)
            .or_insert_with(|| ConversationState::new(user_id));

        let from = state.step;
        let result = transition(state, event)?;
        *state = result.new_state;

        let mut effects = Vec::with_capacity(result.effects.len());
        let mut job = None;
        for effect in result.effects {
            match effect {
                Effect::SubmitJob(draft) => {
                    let formed = Job::form(user_id, draft, Utc::now());
                    state.outstanding_job = Some(formed.id());
                    job = Some(formed);
                }
                other => effects.push(other),
            }
        }

        if from != state.step {
            tracing::debug!(
                user_id,
                from = from.as_str(),
                to = state.step.as_str(),
                "Conversation step changed"
            );
        }

        Ok(Handled { effects, job })
    }

    /// Return the user to Idle once their job has resolved. A stale job id
    /// (the user already has a different outstanding job) is ignored.
    pub fn reset_to_idle(&self, user_id: UserId, job_id: JobId) -> bool {
        let mut states = self.lock();
        let Some(state) = states.get_mut(&user_id) else {
            return false;
        };
        if state.outstanding_job.is_some_and(|id| id != job_id) {
            tracing::warn!(user_id, job_id = %job_id, "Ignoring reset for stale job");
            return false;
        }
        state.reset_to_idle();
        true
    }

    /// Drop the outstanding marker without touching the step, used when a
    /// formed job never made it into the queue.
    pub fn release(&self, user_id: UserId, job_id: JobId) {
        if let Some(state) = self.lock().get_mut(&user_id) {
            if state.outstanding_job == Some(job_id) {
                state.outstanding_job = None;
            }
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn snapshot(&self, user_id: UserId) -> Option<ConversationState> {
        self.lock().get(&user_id).cloned()
    }

    #[allow(dead_code)] // Diagnostics
    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::RequestKind;
    use crate::state_machine::{Command, ImageRef, MenuOption, Step};

    fn walk_to_outfit_images(table: &ConversationTable, user: UserId) {
        table.handle(user, Event::MenuChoice(MenuOption::Combine)).unwrap();
        table.handle(user, Event::Text("evening".to_string())).unwrap();
        table
            .handle(user, Event::Photos(vec![ImageRef::new("a"), ImageRef::new("b")]))
            .unwrap();
    }

    #[test]
    fn test_records_created_lazily() {
        let table = ConversationTable::new();
        assert!(table.snapshot(5).is_none());

        let handled = table.handle(5, Event::Text("hello".to_string())).unwrap();
        assert_eq!(handled.effects, vec![Effect::ShowMenu]);
        assert_eq!(table.snapshot(5).map(|s| s.step), Some(Step::Idle));
    }

    #[test]
    fn test_generate_forms_job_and_marks_outstanding() {
        let table = ConversationTable::new();
        walk_to_outfit_images(&table, 1);

        let handled = table.handle(1, Event::Command(Command::Generate)).unwrap();
        let job = handled.job.expect("job formed");

        assert!(handled.effects.is_empty());
        assert_eq!(job.user_id(), 1);
        assert_eq!(job.kind(), RequestKind::CombineOutfit);
        assert_eq!(job.images(), &[ImageRef::new("a"), ImageRef::new("b")]);
        assert_eq!(job.brief(), "evening");

        let state = table.snapshot(1).unwrap();
        assert_eq!(state.outstanding_job, Some(job.id()));
        assert_eq!(state.step, Step::AwaitingOutfitImages);
    }

    #[test]
    fn test_second_generate_rejected_until_reset() {
        let table = ConversationTable::new();
        walk_to_outfit_images(&table, 1);
        let job = table
            .handle(1, Event::Command(Command::Generate))
            .unwrap()
            .job
            .unwrap();

        let err = table.handle(1, Event::Command(Command::Generate)).unwrap_err();
        assert_eq!(err, TransitionError::JobInProgress);

        assert!(table.reset_to_idle(1, job.id()));
        let state = table.snapshot(1).unwrap();
        assert_eq!(state.step, Step::Idle);
        assert!(state.images.is_empty());
        assert!(state.outstanding_job.is_none());
    }

    #[test]
    fn test_rejection_leaves_state_untouched() {
        let table = ConversationTable::new();
        table.handle(3, Event::MenuChoice(MenuOption::Combine)).unwrap();
        table.handle(3, Event::Text("casual".to_string())).unwrap();
        let before = table.snapshot(3).unwrap();

        let err = table.handle(3, Event::Command(Command::Generate)).unwrap_err();
        assert_eq!(err, TransitionError::NoImages);
        assert_eq!(table.snapshot(3).unwrap(), before);
    }

    #[test]
    fn test_stale_reset_is_ignored() {
        let table = ConversationTable::new();
        walk_to_outfit_images(&table, 1);
        table.handle(1, Event::Command(Command::Generate)).unwrap();

        assert!(!table.reset_to_idle(1, JobId::new()));
        assert!(table.snapshot(1).unwrap().has_outstanding_job());
    }

    #[test]
    fn test_release_keeps_step() {
        let table = ConversationTable::new();
        walk_to_outfit_images(&table, 1);
        let job = table
            .handle(1, Event::Command(Command::Generate))
            .unwrap()
            .job
            .unwrap();

        table.release(1, job.id());
        let state = table.snapshot(1).unwrap();
        assert!(state.outstanding_job.is_none());
        assert_eq!(state.step, Step::AwaitingOutfitImages);
        assert_eq!(state.images.len(), 2);
    }

    #[test]
    fn test_users_are_independent() {
        let table = ConversationTable::new();
        walk_to_outfit_images(&table, 1);
        table.handle(2, Event::MenuChoice(MenuOption::Match)).unwrap();

        assert_eq!(table.snapshot(1).unwrap().step, Step::AwaitingOutfitImages);
        assert_eq!(table.snapshot(2).unwrap().step, Step::AwaitingMatchingPrompt);
        assert_eq!(table.len(), 2);
    }
}
