use serde::{Deserialize, Serialize};

use trellis_workflow::AgentResponse;

/// The triage classifier's structured verdict.
///
/// Decoded from the classifier's raw output by the emergency edge gate and
/// by the final router. Extra fields are ignored; a missing or mistyped
/// field makes the whole verdict undecodable, which downstream consumers
/// treat as "no emergency confirmed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageVerdict {
    pub is_medical_emergency: bool,
    /// Human-readable rationale from the classifier.
    pub reason: String,
}

impl TriageVerdict {
    /// Decode a classifier response, typed side channel first, raw text
    /// second. `None` means undecodable.
    pub fn from_response(response: &AgentResponse) -> Option<Self> {
        if let Some(value) = &response.value {
            if let Ok(verdict) = serde_json::from_value::<Self>(value.clone()) {
                return Some(verdict);
            }
        }
        serde_json::from_str::<Self>(&response.text).ok()
    }
}
