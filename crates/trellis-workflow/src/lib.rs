//! Workflow graph executor — routes one request through a directed acyclic
//! graph of agent nodes.
//!
//! A workflow is an immutable [`WorkflowGraph`] of [`Node`]s connected by
//! [`Edge`]s, validated once at build time. The [`WorkflowRuntime`] walks the
//! graph for one run: sequential edges fire as their source settles, fan-out
//! groups broadcast the same message to their targets concurrently, and
//! fan-in joins wait until every declared predecessor has reported before
//! firing exactly once with the collected results.
//!
//! Nodes are backed by [`AgentAdapter`] implementations
//! (`trellis_core::traits`), so the dispatcher never depends on how an agent
//! is implemented. Gated edges decode a node's raw output into a per-edge
//! schema and fail closed when the decode fails; a message that is not a
//! node response at all passes through instead, so the graph cannot dead-end
//! on a condition that can never be evaluated.
//!
//! Per-run state (shared keys, join partials, the ordered output channel)
//! lives in [`RunStateStore`], partitioned by run id so concurrent runs
//! never observe each other.

pub mod dispatcher;
pub mod edge;
pub mod gate;
pub mod graph;
pub mod message;
pub mod node;
pub mod session;
pub mod state;

pub use dispatcher::{RunHandle, WorkflowRuntime};
pub use edge::{Edge, EdgeCondition};
pub use graph::{GraphBuilder, WorkflowGraph};
pub use message::{AgentRequest, AgentResponse, GraphMessage};
pub use node::{JoinHandler, Node, NodeKind, OutputMode};
pub use session::{ConversationRouter, MemoryConversationStore};
pub use state::RunStateStore;

pub use trellis_core::traits::AgentAdapter;
