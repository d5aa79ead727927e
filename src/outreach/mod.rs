//! Outreach state machine: users, queries, reach-outs and the coordinator
//! that drives them.

pub mod candidates;
mod coordinator;
mod fanout;
pub mod matcher;
pub mod model;
pub mod prompts;
pub mod queries;
pub mod reach_outs;
mod session;
mod sweep;
mod triage;

pub use candidates::{Candidate, CandidateSource, StoreCandidateSource};
pub use coordinator::Coordinator;
pub use matcher::{run_match_cycle, spawn_matcher_loop};
pub use queries::QueryRegistry;
pub use reach_outs::ReachOutRegistry;
pub use session::{SessionAction, SessionOutcome};
pub use sweep::SweepOutcome;
pub use triage::{Triage, is_professional_profile};
