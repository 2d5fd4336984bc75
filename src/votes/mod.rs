pub mod engine;
pub mod state;

pub use engine::{EngineEvent, ToggleOutcome, VoteEngine, VoteSnapshot};
pub use state::{PendingToggle, ToggleRejection, VoteState};
