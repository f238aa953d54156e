//! Edge predicate evaluation.
//!
//! Two rules, applied in a fixed order:
//!
//! 1. **Pass-through**: a gated edge fed anything other than a node
//!    response (the inbound request, a fan-in delivery) returns `true`.
//!    The predicate was written against a response it never got; blocking
//!    here would dead-end the graph on a condition that can never be
//!    evaluated.
//! 2. **Fail closed**: a response that does not decode into the edge's
//!    declared schema returns `false`. An undecodable response must never
//!    be treated as confirming the gated condition.
//!
//! The order matters: the type check runs before the decode check, so an
//! edge that is both gated and structurally unreachable lets the message
//! through rather than deadlocking.

use tracing::debug;

use crate::edge::{Edge, EdgeCondition};
use crate::message::GraphMessage;

/// Evaluate an edge's condition against the message traversing it.
pub fn evaluate(edge: &Edge, message: &GraphMessage) -> bool {
    match &edge.condition {
        EdgeCondition::Always => true,
        EdgeCondition::Gated(check) => {
            let response = match message {
                GraphMessage::Response(resp) => resp,
                // Pass-through: not the response kind this gate evaluates.
                _ => {
                    debug!(
                        source = %edge.source,
                        target = %edge.target,
                        "Gated edge fed a non-response message, passing through"
                    );
                    return true;
                }
            };
            match check(response) {
                Some(verdict) => verdict,
                None => {
                    // Fail closed: undecodable output never confirms the condition.
                    debug!(
                        source = %edge.source,
                        target = %edge.target,
                        node_id = %response.node_id,
                        "Response did not decode into the edge schema, gate closed"
                    );
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AgentRequest, AgentResponse};
    use serde::Deserialize;
    use trellis_core::types::ChatMessage;

    #[derive(Debug, Deserialize)]
    struct Verdict {
        is_emergency: bool,
    }

    fn gated_edge() -> Edge {
        Edge::gated(
            "classifier",
            "emergency",
            EdgeCondition::decoded::<Verdict, _>(|v| v.is_emergency),
        )
    }

    fn response(text: &str) -> GraphMessage {
        GraphMessage::Response(AgentResponse {
            node_id: "classifier".into(),
            text: text.into(),
            value: None,
            history: vec![ChatMessage::user("q")],
        })
    }

    #[test]
    fn test_always_edge() {
        let edge = Edge::new("a", "b");
        let msg = GraphMessage::Request(AgentRequest::from_user_text("hi"));
        assert!(evaluate(&edge, &msg));
    }

    #[test]
    fn test_gate_opens_on_condition() {
        assert!(evaluate(&gated_edge(), &response(r#"{"is_emergency": true}"#)));
    }

    #[test]
    fn test_gate_closes_on_negative_condition() {
        assert!(!evaluate(&gated_edge(), &response(r#"{"is_emergency": false}"#)));
    }

    #[test]
    fn test_fail_closed_on_undecodable_response() {
        assert!(!evaluate(&gated_edge(), &response("I cannot help with that")));
        assert!(!evaluate(&gated_edge(), &response("")));
        assert!(!evaluate(&gated_edge(), &response(r#"{"is_emergency": "maybe"}"#)));
    }

    #[test]
    fn test_pass_through_on_request() {
        let msg = GraphMessage::Request(AgentRequest::from_user_text("hi"));
        assert!(evaluate(&gated_edge(), &msg));
    }

    #[test]
    fn test_pass_through_on_joined() {
        let msg = GraphMessage::Joined(vec![]);
        assert!(evaluate(&gated_edge(), &msg));
    }

    #[test]
    fn test_pass_through_wins_over_fail_closed() {
        // A message that is both "not a response" and would be undecodable
        // as one: the type check must run first and let it through.
        let msg = GraphMessage::Request(AgentRequest::new(vec![ChatMessage::user("not json")]));
        assert!(evaluate(&gated_edge(), &msg));
    }
}
