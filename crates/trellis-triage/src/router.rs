use tracing::debug;

use trellis_workflow::{AgentResponse, JoinHandler};

use crate::verdict::TriageVerdict;
use crate::workflow::{CARE_NAVIGATOR_ID, TRIAGE_CLASSIFIER_ID};

/// Fan-in router that decides the run's ordinary reply.
///
/// Fires once both the classifier and the care navigator have reported.
/// On a confirmed emergency it emits nothing — the dedicated emergency
/// branch already yielded its message and the navigator's reply must be
/// suppressed. Otherwise it emits the navigator's trimmed reply, or
/// nothing when that reply is empty.
#[derive(Debug, Default)]
pub struct FinalResponseRouter;

impl JoinHandler for FinalResponseRouter {
    fn combine(&self, results: &[AgentResponse]) -> Option<String> {
        let triage = results.iter().find(|r| r.node_id == TRIAGE_CLASSIFIER_ID)?;
        let navigator = results.iter().find(|r| r.node_id == CARE_NAVIGATOR_ID)?;

        if let Some(verdict) = TriageVerdict::from_response(triage) {
            if verdict.is_medical_emergency {
                debug!(reason = %verdict.reason, "Emergency confirmed, suppressing navigator reply");
                return None;
            }
        }

        let reply = navigator.text.trim();
        if reply.is_empty() {
            None
        } else {
            Some(reply.to_string())
        }
    }
}
