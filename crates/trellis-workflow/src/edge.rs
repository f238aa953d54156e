use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::message::AgentResponse;

/// Attempts to decode a response into an edge's declared schema and check
/// the predicate. `None` means the response was undecodable.
type GatedCheck = dyn Fn(&AgentResponse) -> Option<bool> + Send + Sync;

/// Condition for traversing an edge.
#[derive(Clone, Default)]
pub enum EdgeCondition {
    /// Always traverse.
    #[default]
    Always,
    /// Traverse when the source's output decodes into the edge's schema and
    /// the predicate holds. Evaluation policy lives in `gate::evaluate`.
    Gated(Arc<GatedCheck>),
}

impl EdgeCondition {
    /// Gate an edge on a typed decode of the source's output.
    ///
    /// The schema is declared per edge via `T`. Decoding prefers the
    /// adapter's typed side channel, then falls back to parsing the raw
    /// text as JSON; unknown fields are ignored, type mismatches count as
    /// undecodable.
    pub fn decoded<T, F>(check: F) -> Self
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::Gated(Arc::new(move |resp: &AgentResponse| {
            decode_response::<T>(resp).map(|decoded| check(&decoded))
        }))
    }
}

impl std::fmt::Debug for EdgeCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => write!(f, "Always"),
            Self::Gated(_) => write!(f, "Gated"),
        }
    }
}

/// Decode a response into `T`, side channel first, then raw text.
fn decode_response<T: DeserializeOwned>(resp: &AgentResponse) -> Option<T> {
    if let Some(value) = &resp.value {
        if let Ok(decoded) = serde_json::from_value::<T>(value.clone()) {
            return Some(decoded);
        }
    }
    serde_json::from_str::<T>(&resp.text).ok()
}

/// A directed, optionally gated connection between two nodes.
#[derive(Debug, Clone)]
pub struct Edge {
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Condition that must hold to traverse this edge.
    pub condition: EdgeCondition,
    /// Whether this edge was created as part of a fan-out group. Group
    /// edges are scheduled by the broadcast step, not the sequential pass.
    pub(crate) fan_out: bool,
}

impl Edge {
    /// Create an unconditional edge.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: EdgeCondition::Always,
            fan_out: false,
        }
    }

    /// Create a gated edge.
    pub fn gated(
        source: impl Into<String>,
        target: impl Into<String>,
        condition: EdgeCondition,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition,
            fan_out: false,
        }
    }

    pub(crate) fn fan_out(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: EdgeCondition::Always,
            fan_out: true,
        }
    }
}
