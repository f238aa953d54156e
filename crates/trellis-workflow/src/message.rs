use trellis_core::types::ChatMessage;

/// The inbound request that seeds a run.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Ordered conversation history, oldest first. The last turn is the
    /// message being routed.
    pub history: Vec<ChatMessage>,
}

impl AgentRequest {
    pub fn new(history: Vec<ChatMessage>) -> Self {
        Self { history }
    }

    /// A request holding a single user turn.
    pub fn from_user_text(text: impl Into<String>) -> Self {
        Self {
            history: vec![ChatMessage::user(text)],
        }
    }
}

/// A settled node's output, forwarded along edges.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// Node that produced this response.
    pub node_id: String,
    /// Raw response text.
    pub text: String,
    /// Optional typed side channel from the capability.
    pub value: Option<serde_json::Value>,
    /// Conversation so far, including this response as the final assistant
    /// turn. Downstream agent nodes invoke their adapter with this.
    pub history: Vec<ChatMessage>,
}

/// What travels along an edge.
///
/// Gated edges only ever evaluate their predicate against a `Response`;
/// anything else passes through (see `gate::evaluate`).
#[derive(Debug, Clone)]
pub enum GraphMessage {
    /// The inbound request, untouched by any agent yet.
    Request(AgentRequest),
    /// A single settled node's output.
    Response(AgentResponse),
    /// A fan-in delivery: every declared predecessor's response, in
    /// ascending producer-id order.
    Joined(Vec<AgentResponse>),
}

impl GraphMessage {
    /// The conversation history an agent node should be invoked with.
    pub fn history(&self) -> Vec<ChatMessage> {
        match self {
            Self::Request(req) => req.history.clone(),
            Self::Response(resp) => resp.history.clone(),
            Self::Joined(results) => {
                // Shared origin: predecessors all descend from the same
                // request, so take the first history and append the rest of
                // the results as assistant turns.
                let mut history = results
                    .first()
                    .map(|r| r.history.clone())
                    .unwrap_or_default();
                for resp in results.iter().skip(1) {
                    history.push(ChatMessage::assistant(resp.text.clone()));
                }
                history
            }
        }
    }
}
