//! Medical triage routing workflow.
//!
//! One inbound patient message fans out to two agents at once: a triage
//! classifier that decides whether the situation is an emergency, and a
//! care navigator that drafts the ordinary reply. An emergency verdict
//! short-circuits into a fixed call-911 message; otherwise a fan-in router
//! waits for both agents and emits the navigator's reply. A classifier
//! whose output cannot be decoded is treated as "no emergency confirmed" —
//! the gate fails closed — while the navigator's reply still flows.

pub mod router;
pub mod verdict;
pub mod workflow;

pub use router::FinalResponseRouter;
pub use verdict::TriageVerdict;
pub use workflow::{
    build_triage_workflow, CARE_NAVIGATOR_ID, EMERGENCY_REPLY, EMERGENCY_REPLY_ID, ENTRY_ID,
    FINAL_ROUTER_ID, TRIAGE_CLASSIFIER_ID,
};
