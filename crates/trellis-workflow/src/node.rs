use std::sync::Arc;

use trellis_core::traits::AgentAdapter;

use crate::message::AgentResponse;

/// How a fan-in node turns its collected predecessor results into output.
///
/// Returning `None` means the node produces nothing for this run — a normal
/// outcome (e.g., a router that suppresses its reply), not an error.
pub trait JoinHandler: Send + Sync + 'static {
    fn combine(&self, results: &[AgentResponse]) -> Option<String>;
}

impl<F> JoinHandler for F
where
    F: Fn(&[AgentResponse]) -> Option<String> + Send + Sync + 'static,
{
    fn combine(&self, results: &[AgentResponse]) -> Option<String> {
        self(results)
    }
}

/// What a node does when invoked.
#[derive(Clone)]
pub enum NodeKind {
    /// Invoke an agent capability with the accumulated history.
    Agent(Arc<dyn AgentAdapter>),
    /// Emit a fixed reply without calling any capability.
    Fixed(String),
    /// Forward the incoming message unchanged.
    Relay,
    /// Combine fan-in results. Only valid on a declared fan-in target.
    Join(Arc<dyn JoinHandler>),
}

impl std::fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agent(adapter) => f.debug_tuple("Agent").field(&adapter.name()).finish(),
            Self::Fixed(text) => f.debug_tuple("Fixed").field(text).finish(),
            Self::Relay => write!(f, "Relay"),
            Self::Join(_) => write!(f, "Join"),
        }
    }
}

/// Where a node's result goes once it settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Forward to successor edges only.
    #[default]
    Forward,
    /// Append to the run's output channel only.
    Yield,
    /// Both forward and yield.
    ForwardAndYield,
}

impl OutputMode {
    pub fn forwards(self) -> bool {
        matches!(self, Self::Forward | Self::ForwardAndYield)
    }

    pub fn yields(self) -> bool {
        matches!(self, Self::Yield | Self::ForwardAndYield)
    }
}

/// A unit of work in the graph. Immutable once the graph is built.
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique identifier.
    pub id: String,
    /// What the node does when invoked.
    pub kind: NodeKind,
    /// Where its result goes.
    pub output: OutputMode,
}

impl Node {
    /// An agent-backed node.
    pub fn agent(id: impl Into<String>, adapter: Arc<dyn AgentAdapter>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Agent(adapter),
            output: OutputMode::Forward,
        }
    }

    /// A trivial responder that always replies with `text`.
    pub fn fixed(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Fixed(text.into()),
            output: OutputMode::Forward,
        }
    }

    /// A pass-through node that forwards its input untouched.
    pub fn relay(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Relay,
            output: OutputMode::Forward,
        }
    }

    /// A fan-in combiner.
    pub fn join(id: impl Into<String>, handler: Arc<dyn JoinHandler>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Join(handler),
            output: OutputMode::Forward,
        }
    }

    /// Set the output mode.
    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Shorthand for `with_output(OutputMode::Yield)`.
    pub fn yielding(self) -> Self {
        self.with_output(OutputMode::Yield)
    }
}
