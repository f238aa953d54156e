//! End-to-end dispatcher behavior: determinism, isolation, cancellation,
//! and deadline handling against scripted adapters.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;

use trellis_core::config::WorkflowConfig;
use trellis_core::error::{Result, TrellisError};
use trellis_core::traits::AgentAdapter;
use trellis_core::types::{AgentReply, ChatMessage, RunOutput};
use trellis_workflow::{
    AgentRequest, AgentResponse, EdgeCondition, GraphBuilder, JoinHandler, Node, WorkflowGraph,
    WorkflowRuntime,
};

/// Always replies with the same text.
struct Scripted {
    name: String,
    text: String,
}

impl Scripted {
    fn new(name: &str, text: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            text: text.into(),
        })
    }
}

impl AgentAdapter for Scripted {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, _history: &[ChatMessage]) -> BoxFuture<'_, Result<AgentReply>> {
        Box::pin(async move { Ok(AgentReply::text(self.text.clone())) })
    }
}

/// Sleeps before replying; used to exercise deadlines and cancellation.
struct Slow {
    delay: Duration,
}

impl AgentAdapter for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    fn invoke(&self, _history: &[ChatMessage]) -> BoxFuture<'_, Result<AgentReply>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(AgentReply::text("finally"))
        })
    }
}

/// Echoes the last turn of the history it was invoked with.
struct Echo;

impl AgentAdapter for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn invoke(&self, history: &[ChatMessage]) -> BoxFuture<'_, Result<AgentReply>> {
        let text = history.last().map(|turn| turn.text.clone()).unwrap_or_default();
        Box::pin(async move { Ok(AgentReply::text(format!("echo: {text}"))) })
    }
}

#[derive(Debug, Deserialize)]
struct Flag {
    flagged: bool,
}

fn concat_join() -> Arc<dyn JoinHandler> {
    Arc::new(|results: &[AgentResponse]| {
        Some(
            results
                .iter()
                .map(|r| format!("{}={}", r.node_id, r.text))
                .collect::<Vec<_>>()
                .join(","),
        )
    })
}

/// entry --fan-out--> [north, south, west] --fan-in--> merge (yields).
fn diamond() -> WorkflowGraph {
    GraphBuilder::new()
        .add_node(Node::relay("entry"))
        .add_node(Node::agent("north", Scripted::new("north", "N")))
        .add_node(Node::agent("south", Scripted::new("south", "S")))
        .add_node(Node::agent("west", Scripted::new("west", "W")))
        .add_node(Node::join("merge", concat_join()).yielding())
        .add_fan_out("entry", ["north", "south", "west"])
        .add_fan_in(["north", "south", "west"], "merge")
        .set_start("entry")
        .build()
        .expect("valid graph")
}

#[tokio::test]
async fn identical_runs_produce_identical_outputs() {
    let runtime = WorkflowRuntime::new(diamond(), WorkflowConfig::default());

    let mut seen = Vec::new();
    for _ in 0..5 {
        let outputs = runtime
            .run(AgentRequest::from_user_text("hello"))
            .outputs()
            .await
            .expect("run completes");
        seen.push(outputs);
    }

    let first = &seen[0];
    assert_eq!(first, &vec![RunOutput::Text("north=N,south=S,west=W".into())]);
    assert!(seen.iter().all(|outputs| outputs == first));
}

#[tokio::test]
async fn concurrent_runs_do_not_share_state() {
    let runtime = WorkflowRuntime::new(diamond(), WorkflowConfig::default());

    let handle_a = runtime.run(AgentRequest::from_user_text("from a"));
    let handle_b = runtime.run(AgentRequest::from_user_text("from b"));

    let run_a = handle_a.run_id().clone();
    let run_b = handle_b.run_id().clone();
    assert_ne!(run_a, run_b);

    runtime
        .state()
        .set(&run_a, "owner", serde_json::json!("a"));
    runtime
        .state()
        .set(&run_b, "owner", serde_json::json!("b"));
    assert_eq!(
        runtime.state().get(&run_a, "owner"),
        Some(serde_json::json!("a"))
    );
    assert_eq!(
        runtime.state().get(&run_b, "owner"),
        Some(serde_json::json!("b"))
    );

    let (outputs_a, outputs_b) =
        tokio::join!(handle_a.outputs(), handle_b.outputs());
    assert_eq!(outputs_a.unwrap(), outputs_b.unwrap());
}

#[tokio::test]
async fn gated_branch_runs_only_when_condition_holds() {
    let graph = GraphBuilder::new()
        .add_node(Node::agent(
            "classifier",
            Scripted::new("classifier", r#"{"flagged": true, "reason": "test"}"#),
        ))
        .add_node(Node::fixed("alarm", "flagged!").yielding())
        .add_gated_edge(
            "classifier",
            "alarm",
            EdgeCondition::decoded::<Flag, _>(|f| f.flagged),
        )
        .set_start("classifier")
        .build()
        .unwrap();

    let runtime = WorkflowRuntime::new(graph, WorkflowConfig::default());
    let outputs = runtime
        .run(AgentRequest::from_user_text("check this"))
        .outputs()
        .await
        .unwrap();
    assert_eq!(outputs, vec![RunOutput::Text("flagged!".into())]);
}

#[tokio::test]
async fn malformed_classifier_output_closes_the_gate() {
    let graph = GraphBuilder::new()
        .add_node(Node::agent(
            "classifier",
            Scripted::new("classifier", "I think it's probably fine?"),
        ))
        .add_node(Node::fixed("alarm", "flagged!").yielding())
        .add_gated_edge(
            "classifier",
            "alarm",
            EdgeCondition::decoded::<Flag, _>(|f| f.flagged),
        )
        .set_start("classifier")
        .build()
        .unwrap();

    let runtime = WorkflowRuntime::new(graph, WorkflowConfig::default());
    let outputs = runtime
        .run(AgentRequest::from_user_text("check this"))
        .outputs()
        .await
        .unwrap();
    assert!(outputs.is_empty());
}

#[tokio::test]
async fn run_deadline_reports_incomplete() {
    let graph = GraphBuilder::new()
        .add_node(
            Node::agent(
                "sluggish",
                Arc::new(Slow {
                    delay: Duration::from_secs(600),
                }),
            )
            .yielding(),
        )
        .set_start("sluggish")
        .build()
        .unwrap();

    let config = WorkflowConfig {
        run_deadline_secs: 1,
        ..Default::default()
    };
    let runtime = WorkflowRuntime::new(graph, config);

    tokio::time::pause();
    let handle = runtime.run(AgentRequest::from_user_text("take your time"));
    let err = handle.outputs().await.unwrap_err();
    assert!(matches!(err, TrellisError::RunIncomplete { .. }));
}

#[tokio::test]
async fn cancelled_run_reports_cancelled() {
    let graph = GraphBuilder::new()
        .add_node(
            Node::agent(
                "sluggish",
                Arc::new(Slow {
                    delay: Duration::from_secs(600),
                }),
            )
            .yielding(),
        )
        .set_start("sluggish")
        .build()
        .unwrap();

    let runtime = WorkflowRuntime::new(graph, WorkflowConfig::default());
    let handle = runtime.run(AgentRequest::from_user_text("never mind"));
    handle.cancel();
    let err = handle.outputs().await.unwrap_err();
    assert!(matches!(err, TrellisError::Cancelled));
}

#[tokio::test]
async fn history_flows_through_a_chain() {
    let graph = GraphBuilder::new()
        .add_node(Node::agent("first", Scripted::new("first", "hop one")))
        .add_node(Node::agent("second", Arc::new(Echo)).yielding())
        .add_edge("first", "second")
        .set_start("first")
        .build()
        .unwrap();

    let runtime = WorkflowRuntime::new(graph, WorkflowConfig::default());
    let outputs = runtime
        .run(AgentRequest::from_user_text("start"))
        .outputs()
        .await
        .unwrap();
    // Echo sees "first"'s reply as the most recent turn.
    assert_eq!(outputs, vec![RunOutput::Text("echo: hop one".into())]);
}

#[tokio::test]
async fn yields_from_fan_out_targets_follow_declaration_order() {
    let graph = GraphBuilder::new()
        .add_node(Node::relay("entry"))
        .add_node(Node::agent("zed", Scripted::new("zed", "from zed")).yielding())
        .add_node(Node::agent("abe", Scripted::new("abe", "from abe")).yielding())
        .add_fan_out("entry", ["zed", "abe"])
        .set_start("entry")
        .build()
        .unwrap();

    let runtime = WorkflowRuntime::new(graph, WorkflowConfig::default());
    for _ in 0..5 {
        let outputs = runtime
            .run(AgentRequest::from_user_text("go"))
            .outputs()
            .await
            .unwrap();
        assert_eq!(
            outputs,
            vec![
                RunOutput::Text("from zed".into()),
                RunOutput::Text("from abe".into())
            ]
        );
    }
}
