use std::sync::Arc;

use trellis_core::error::Result;
use trellis_core::traits::AgentAdapter;
use trellis_workflow::{EdgeCondition, GraphBuilder, Node, WorkflowGraph};

use crate::router::FinalResponseRouter;
use crate::verdict::TriageVerdict;

pub const ENTRY_ID: &str = "entry_dispatcher";
pub const TRIAGE_CLASSIFIER_ID: &str = "medical_triage";
pub const CARE_NAVIGATOR_ID: &str = "care_navigator";
pub const EMERGENCY_REPLY_ID: &str = "reply_emergency";
pub const FINAL_ROUTER_ID: &str = "final_response_router";

/// The fixed short-circuit reply for confirmed emergencies.
pub const EMERGENCY_REPLY: &str = "Yo, you should call 911 or go to the emergency room!";

/// Assemble the triage routing graph.
///
/// ```text
/// entry --fan-out--> [medical_triage, care_navigator]
/// medical_triage --(is_medical_emergency)--> reply_emergency (yields)
/// [medical_triage, care_navigator] --fan-in--> final_response_router (yields)
/// ```
///
/// The classifier and navigator capabilities are injected so callers
/// choose the backing model per node; tests inject scripted fakes.
pub fn build_triage_workflow(
    classifier: Arc<dyn AgentAdapter>,
    navigator: Arc<dyn AgentAdapter>,
) -> Result<WorkflowGraph> {
    let graph = GraphBuilder::new()
        .add_node(Node::relay(ENTRY_ID))
        .add_node(Node::agent(TRIAGE_CLASSIFIER_ID, classifier))
        .add_node(Node::agent(CARE_NAVIGATOR_ID, navigator))
        .add_node(Node::fixed(EMERGENCY_REPLY_ID, EMERGENCY_REPLY).yielding())
        .add_node(Node::join(FINAL_ROUTER_ID, Arc::new(FinalResponseRouter)).yielding())
        .set_start(ENTRY_ID)
        .add_fan_out(ENTRY_ID, [TRIAGE_CLASSIFIER_ID, CARE_NAVIGATOR_ID])
        .add_gated_edge(
            TRIAGE_CLASSIFIER_ID,
            EMERGENCY_REPLY_ID,
            EdgeCondition::decoded::<TriageVerdict, _>(|verdict| verdict.is_medical_emergency),
        )
        .add_fan_in([TRIAGE_CLASSIFIER_ID, CARE_NAVIGATOR_ID], FINAL_ROUTER_ID)
        .build()?;

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use trellis_core::types::{AgentReply, ChatMessage};

    struct Canned(&'static str);

    impl AgentAdapter for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        fn invoke(&self, _history: &[ChatMessage]) -> BoxFuture<'_, Result<AgentReply>> {
            Box::pin(async move { Ok(AgentReply::text(self.0)) })
        }
    }

    #[test]
    fn test_graph_builds() {
        let graph = build_triage_workflow(Arc::new(Canned("{}")), Arc::new(Canned("hello")))
            .expect("valid graph");

        assert_eq!(graph.start_nodes(), &[ENTRY_ID.to_string()]);
        assert!(graph.is_join(FINAL_ROUTER_ID));
        assert_eq!(
            graph.fan_out_targets(ENTRY_ID).unwrap(),
            &[
                TRIAGE_CLASSIFIER_ID.to_string(),
                CARE_NAVIGATOR_ID.to_string()
            ]
        );
    }
}
