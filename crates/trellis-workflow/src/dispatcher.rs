use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use trellis_core::config::WorkflowConfig;
use trellis_core::error::{GraphDefinitionError, Result, TrellisError};
use trellis_core::types::{AgentReply, ChatMessage, RunId, RunOutput};

use crate::gate;
use crate::graph::WorkflowGraph;
use crate::message::{AgentRequest, AgentResponse, GraphMessage};
use crate::node::{Node, NodeKind};
use crate::state::RunStateStore;

/// One entry in a run's worklist.
enum Dispatch {
    /// Invoke a single node with a message.
    Single {
        node_id: String,
        message: GraphMessage,
    },
    /// Invoke every target of a fan-out group concurrently with the same
    /// message.
    Broadcast {
        targets: Vec<String>,
        message: GraphMessage,
    },
}

/// What a node produced when it settled.
struct Settlement {
    node_id: String,
    /// Message forwarded along outgoing edges, if any.
    forward: Option<GraphMessage>,
    /// Outputs to append to the run's channel, in settlement order.
    yields: Vec<RunOutput>,
}

/// Handle on one in-flight run.
///
/// The caller observes exactly one of: the ordered outputs once the run
/// completes, or a run-level failure (`RunIncomplete`, `Cancelled`).
/// Adapter and decode failures inside the run are never surfaced here.
pub struct RunHandle {
    run_id: RunId,
    token: CancellationToken,
    join: JoinHandle<Result<Vec<RunOutput>>>,
}

impl RunHandle {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Cancel the run: in-flight adapter invocations are dropped and the
    /// run's partial state is discarded.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the run to complete and take its ordered outputs.
    pub async fn outputs(self) -> Result<Vec<RunOutput>> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(TrellisError::RunIncomplete {
                run_id: self.run_id,
                reason: format!("run task aborted: {e}"),
            }),
        }
    }
}

/// Walks a [`WorkflowGraph`] for one run at a time.
///
/// The runtime owns no per-run state itself; everything mutable lives in
/// the [`RunStateStore`], partitioned by run id, so any number of runs can
/// execute concurrently against the same graph.
#[derive(Clone)]
pub struct WorkflowRuntime {
    graph: Arc<WorkflowGraph>,
    state: Arc<RunStateStore>,
    config: WorkflowConfig,
}

impl WorkflowRuntime {
    pub fn new(graph: WorkflowGraph, config: WorkflowConfig) -> Self {
        Self {
            graph: Arc::new(graph),
            state: Arc::new(RunStateStore::new()),
            config,
        }
    }

    /// Run-scoped shared state and output channels. Exposed so embedders
    /// can read or seed run-scoped keys around a run.
    pub fn state(&self) -> &Arc<RunStateStore> {
        &self.state
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// Start a run for an inbound request.
    pub fn run(&self, request: AgentRequest) -> RunHandle {
        let run_id = RunId::new();
        let token = CancellationToken::new();
        self.state.open_run(&run_id);

        let runtime = self.clone();
        let task_run_id = run_id.clone();
        let task_token = token.clone();
        let join =
            tokio::spawn(async move { runtime.drive(task_run_id, task_token, request).await });

        RunHandle {
            run_id,
            token,
            join,
        }
    }

    /// Drive one run to completion, cancellation, or its deadline.
    async fn drive(
        self,
        run_id: RunId,
        token: CancellationToken,
        request: AgentRequest,
    ) -> Result<Vec<RunOutput>> {
        let start = Instant::now();
        info!(run_id = %run_id, "Run started");

        let deadline = self.config.run_deadline();
        let result = tokio::select! {
            // Dropping the traversal cancels any in-flight invocations.
            _ = token.cancelled() => Err(TrellisError::Cancelled),
            traversal = tokio::time::timeout(deadline, self.traverse(&run_id, request)) => {
                match traversal {
                    Ok(result) => result,
                    Err(_) => Err(TrellisError::RunIncomplete {
                        run_id: run_id.clone(),
                        reason: format!("deadline of {}s elapsed", self.config.run_deadline_secs),
                    }),
                }
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(()) => {
                let outputs = self.state.drain_outputs(&run_id);
                self.state.discard_run(&run_id);
                info!(run_id = %run_id, outputs = outputs.len(), elapsed_ms, "Run complete");
                Ok(outputs)
            }
            Err(e) => {
                self.state.discard_run(&run_id);
                warn!(run_id = %run_id, error = %e, elapsed_ms, "Run did not complete");
                Err(e)
            }
        }
    }

    /// The worklist loop: invoke pending nodes until none remain, then
    /// verify no join was left waiting on missing siblings.
    async fn traverse(&self, run_id: &RunId, request: AgentRequest) -> Result<()> {
        let mut worklist: VecDeque<Dispatch> = VecDeque::new();
        for start in self.graph.start_nodes() {
            worklist.push_back(Dispatch::Single {
                node_id: start.clone(),
                message: GraphMessage::Request(request.clone()),
            });
        }

        while let Some(dispatch) = worklist.pop_front() {
            match dispatch {
                Dispatch::Single { node_id, message } => {
                    let settlement = self.invoke(run_id, &node_id, message).await?;
                    self.settle(run_id, settlement, &mut worklist)?;
                }
                Dispatch::Broadcast { targets, message } => {
                    let invocations = targets
                        .iter()
                        .map(|target| self.invoke(run_id, target, message.clone()));
                    let settlements = join_all(invocations).await;
                    // Settlements are routed in declared target order, so
                    // yields and join deliveries stay deterministic even
                    // though the invocations raced.
                    for settlement in settlements {
                        self.settle(run_id, settlement?, &mut worklist)?;
                    }
                }
            }
        }

        // A join that heard from some predecessors but not all of them is a
        // graph defect only reachable at run time; report it rather than
        // completing silently.
        for (join, predecessors) in self.graph.joins() {
            if self.state.has_fired(run_id, join) {
                continue;
            }
            let have = self.state.partial_count(run_id, join);
            if have > 0 {
                return Err(TrellisError::RunIncomplete {
                    run_id: run_id.clone(),
                    reason: format!(
                        "join '{join}' received {have} of {} predecessor results",
                        predecessors.len()
                    ),
                });
            }
        }

        Ok(())
    }

    /// Invoke one node and build its settlement. Adapter failures are
    /// downgraded to an empty, undecodable result so the branch continues
    /// through the gate rules instead of aborting the run.
    async fn invoke(
        &self,
        run_id: &RunId,
        node_id: &str,
        message: GraphMessage,
    ) -> Result<Settlement> {
        let node = self
            .graph
            .node(node_id)
            .ok_or_else(|| GraphDefinitionError::UnknownNode(node_id.to_string()))?;

        debug!(run_id = %run_id, node_id = %node.id, "Invoking node");

        let produced = match &node.kind {
            NodeKind::Relay => {
                return Ok(self.settle_relay(node, message));
            }
            NodeKind::Agent(adapter) => {
                let history = message.history();
                match adapter.invoke(&history).await {
                    Ok(reply) => Some((reply, history)),
                    Err(e) => {
                        warn!(
                            run_id = %run_id,
                            node_id = %node.id,
                            adapter = adapter.name(),
                            error = %e,
                            "Adapter failed, substituting empty result"
                        );
                        Some((AgentReply::default(), history))
                    }
                }
            }
            NodeKind::Fixed(text) => Some((AgentReply::text(text.clone()), message.history())),
            NodeKind::Join(handler) => {
                let results = match &message {
                    GraphMessage::Joined(results) => results.as_slice(),
                    // Joins are only enqueued via join_ready; anything else
                    // means a miswired graph probed the node directly.
                    _ => {
                        warn!(
                            run_id = %run_id,
                            node_id = %node.id,
                            "Join node invoked without a fan-in delivery"
                        );
                        &[]
                    }
                };
                handler
                    .combine(results)
                    .map(|text| (AgentReply::text(text), message.history()))
            }
        };

        let Some((reply, mut history)) = produced else {
            // The node declined to produce anything; the branch ends here.
            return Ok(Settlement {
                node_id: node.id.clone(),
                forward: None,
                yields: vec![],
            });
        };

        self.state.set(
            run_id,
            format!("{}_response", node.id),
            serde_json::Value::String(reply.text.clone()),
        );

        let mut yields = Vec::new();
        if node.output.yields() {
            // A failed adapter settles with an empty substitute; yielding
            // that verbatim would hand the caller a blank output.
            if reply.text.is_empty() {
                debug!(run_id = %run_id, node_id = %node.id, "Suppressing empty yield");
            } else {
                yields.push(RunOutput::Text(reply.text.clone()));
            }
        }

        let forward = if node.output.forwards() {
            history.push(ChatMessage::assistant(reply.text.clone()));
            Some(GraphMessage::Response(AgentResponse {
                node_id: node.id.clone(),
                text: reply.text,
                value: reply.value,
                history,
            }))
        } else {
            None
        };

        Ok(Settlement {
            node_id: node.id.clone(),
            forward,
            yields,
        })
    }

    /// A relay forwards its input untouched; a yielding relay emits the
    /// most recent turn's text.
    fn settle_relay(&self, node: &Node, message: GraphMessage) -> Settlement {
        let mut yields = Vec::new();
        if node.output.yields() {
            if let Some(turn) = message.history().last() {
                yields.push(RunOutput::Text(turn.text.clone()));
            }
        }
        Settlement {
            node_id: node.id.clone(),
            forward: node.output.forwards().then_some(message),
            yields,
        }
    }

    /// Append a settlement's yields and enqueue its qualifying successors.
    fn settle(
        &self,
        run_id: &RunId,
        settlement: Settlement,
        worklist: &mut VecDeque<Dispatch>,
    ) -> Result<()> {
        for output in settlement.yields {
            self.state.append_output(run_id, output);
        }

        let node_id = settlement.node_id;
        let Some(message) = settlement.forward else {
            debug!(run_id = %run_id, node_id = %node_id, "Branch terminated");
            return Ok(());
        };

        // Fan-out targets run immediately after the source settles, ahead
        // of any other pending work.
        if let Some(targets) = self.graph.fan_out_targets(&node_id) {
            worklist.push_front(Dispatch::Broadcast {
                targets: targets.to_vec(),
                message: message.clone(),
            });
        }

        for edge in self.graph.sequential_edges(&node_id) {
            if !gate::evaluate(edge, &message) {
                debug!(
                    run_id = %run_id,
                    source = %edge.source,
                    target = %edge.target,
                    "Edge gate closed"
                );
                continue;
            }

            if self.graph.is_join(&edge.target) {
                let result = match &message {
                    GraphMessage::Response(resp) => resp.clone(),
                    // A relay can forward a request straight into a join;
                    // record it as that node's (empty-value) result.
                    other => AgentResponse {
                        node_id: node_id.clone(),
                        text: other
                            .history()
                            .last()
                            .map(|turn| turn.text.clone())
                            .unwrap_or_default(),
                        value: None,
                        history: other.history(),
                    },
                };
                self.state
                    .record_partial(run_id, &edge.target, &node_id, result);

                let predecessors = self
                    .graph
                    .join_predecessors(&edge.target)
                    .unwrap_or_default();
                if let Some(results) = self.state.join_ready(run_id, &edge.target, predecessors) {
                    debug!(run_id = %run_id, join = %edge.target, "Join satisfied");
                    worklist.push_back(Dispatch::Single {
                        node_id: edge.target.clone(),
                        message: GraphMessage::Joined(results),
                    });
                }
            } else {
                worklist.push_back(Dispatch::Single {
                    node_id: edge.target.clone(),
                    message: message.clone(),
                });
            }
        }

        Ok(())
    }
}
