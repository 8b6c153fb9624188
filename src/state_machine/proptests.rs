//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::state::*;
use super::transition::*;
use super::*;
use crate::job::{JobId, RequestKind};
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_image() -> impl Strategy<Value = ImageRef> {
    "[a-z0-9]{4,12}".prop_map(|name| ImageRef::new(format!("https://files.example/{name}.jpg")))
}

fn arb_images(max: usize) -> impl Strategy<Value = Vec<ImageRef>> {
    proptest::collection::vec(arb_image(), 0..max)
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Idle),
        Just(Step::AwaitingOutfitPrompt),
        Just(Step::AwaitingOutfitImages),
        Just(Step::AwaitingMatchingPrompt),
        Just(Step::AwaitingMatchingImage),
    ]
}

fn arb_menu_option() -> impl Strategy<Value = MenuOption> {
    prop_oneof![Just(MenuOption::Combine), Just(MenuOption::Match)]
}

fn arb_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Start),
        Just(Command::Generate),
        "[a-z]{3,8}".prop_map(Command::Other),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        arb_command().prop_map(Event::Command),
        "[a-zA-Z ]{0,30}".prop_map(Event::Text),
        arb_images(4).prop_map(Event::Photos),
        arb_menu_option().prop_map(Event::MenuChoice),
    ]
}

fn arb_request_kind() -> impl Strategy<Value = Option<RequestKind>> {
    prop_oneof![
        Just(None),
        Just(Some(RequestKind::CombineOutfit)),
        Just(Some(RequestKind::MatchOutfit)),
    ]
}

fn arb_state() -> impl Strategy<Value = ConversationState> {
    (
        arb_step(),
        arb_request_kind(),
        arb_images(5),
        "[a-zA-Z ]{0,20}",
        any::<bool>(),
    )
        .prop_map(|(step, request_kind, images, brief, outstanding)| {
            let mut state = ConversationState::new(99);
            state.step = step;
            state.request_kind = request_kind;
            state.images = images;
            state.brief = brief;
            state.outstanding_job = outstanding.then(JobId::new);
            state
        })
}

fn submitted(result: &TransitionResult) -> Vec<&crate::job::JobDraft> {
    result
        .effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::SubmitJob(draft) => Some(draft),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    // Invariant 1: Same state and event always give the same outcome
    #[test]
    fn prop_transition_is_deterministic(state in arb_state(), event in arb_event()) {
        let first = transition(&state, event.clone());
        let second = transition(&state, event);
        match (first, second) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(a.new_state, b.new_state);
                prop_assert_eq!(a.effects, b.effects);
            }
            (Err(a), Err(b)) => prop_assert_eq!(a, b),
            (a, b) => prop_assert!(false, "Diverging outcomes: {:?} vs {:?}", a, b),
        }
    }

    // Invariant 2: /start always lands in Idle with the menu
    #[test]
    fn prop_start_always_resets(state in arb_state()) {
        let result = transition(&state, Event::Command(Command::Start)).unwrap();
        prop_assert_eq!(result.new_state.step, Step::Idle);
        prop_assert_eq!(result.effects, vec![Effect::ShowMenu]);
    }

    // Invariant 3: At most one job per transition, and never with no images
    #[test]
    fn prop_jobs_always_carry_images(state in arb_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, event) {
            let drafts = submitted(&result);
            prop_assert!(drafts.len() <= 1);
            for draft in drafts {
                prop_assert!(!draft.images.is_empty(), "Job formed without images");
                if draft.kind == RequestKind::MatchOutfit {
                    prop_assert_eq!(draft.images.len(), 1);
                }
            }
        }
    }

    // Invariant 4: No job is formed while one is outstanding
    #[test]
    fn prop_outstanding_job_blocks_submission(
        mut state in arb_state(),
        event in arb_event()
    ) {
        state.outstanding_job = Some(JobId::new());
        if let Ok(result) = transition(&state, event) {
            prop_assert!(submitted(&result).is_empty());
        }
    }

    // Invariant 5: Generate with no collected images never forms a job
    #[test]
    fn prop_generate_without_images_rejected(brief in "[a-zA-Z ]{0,20}") {
        let mut state = ConversationState::new(1);
        state.step = Step::AwaitingOutfitImages;
        state.brief = brief;
        let result = transition(&state, Event::Command(Command::Generate));
        prop_assert!(result.is_err());
    }

    // Invariant 6: The job carries a snapshot of the images at formation time
    #[test]
    fn prop_job_images_are_snapshot(
        images in proptest::collection::vec(arb_image(), 1..6),
        later in proptest::collection::vec(arb_image(), 1..3),
        brief in "[a-zA-Z]{1,20}"
    ) {
        let mut state = ConversationState::new(1);
        state.step = Step::AwaitingOutfitImages;
        state.images = images.clone();
        state.brief = brief;

        let result = transition(&state, Event::Command(Command::Generate)).unwrap();
        let draft = submitted(&result)[0].clone();

        // Photos arriving after formation extend the state but not the job
        let after = transition(&result.new_state, Event::Photos(later)).unwrap();
        prop_assert!(after.new_state.images.len() > images.len());
        prop_assert_eq!(draft.images, images);
    }

    // Invariant 7: Photos keep arrival order
    #[test]
    fn prop_photos_preserve_order(
        batches in proptest::collection::vec(
            proptest::collection::vec(arb_image(), 1..3), 1..6)
    ) {
        let mut state = ConversationState::new(1);
        state.step = Step::AwaitingOutfitImages;
        for batch in &batches {
            state = transition(&state, Event::Photos(batch.clone())).unwrap().new_state;
        }
        let expected: Vec<ImageRef> = batches.into_iter().flatten().collect();
        prop_assert_eq!(state.images, expected);
    }

    // Invariant 8: Transitions never touch identity or the outstanding marker
    #[test]
    fn prop_user_id_is_preserved(state in arb_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, event) {
            prop_assert_eq!(result.new_state.user_id, state.user_id);
            prop_assert_eq!(result.new_state.outstanding_job, state.outstanding_job);
        }
    }
}
