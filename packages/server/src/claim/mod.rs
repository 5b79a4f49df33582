pub mod machine;
pub mod orchestrator;

pub use machine::{ClaimEvent, ClaimRequest, ClaimState, ClaimTransaction, TransitionError};
pub use orchestrator::{ClaimOrchestrator, PendingClaim};
