//! Per-user conversation state machine
//!
//! Pure state transitions: each event plus the current state yields the next
//! state and a list of effects for the runtime to carry out.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::{Command, Event, ImageRef, MenuOption};
pub use state::{ConversationState, Step};
pub use transition::{transition, TransitionError, TransitionResult};
