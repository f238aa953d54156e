use thiserror::Error;

use crate::types::RunId;

/// Structural misconfiguration of a workflow graph.
///
/// Raised by `GraphBuilder::build()` only. A graph that builds cleanly can
/// never produce one of these at run time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphDefinitionError {
    #[error("node '{0}' referenced by an edge does not exist")]
    UnknownNode(String),

    #[error("node '{0}' declared more than once")]
    DuplicateNode(String),

    #[error("graph contains a cycle through node '{0}'")]
    CycleDetected(String),

    #[error("fan-in target '{join}' declared more than once")]
    DuplicateJoin { join: String },

    #[error("fan-in target '{join}' is missing an edge from declared predecessor '{predecessor}'")]
    JoinMissingEdge { join: String, predecessor: String },

    #[error("edge from '{edge_source}' into fan-in target '{join}' is not in its declared predecessor set")]
    AmbiguousJoinEdge { join: String, edge_source: String },

    #[error("start node '{0}' does not exist")]
    UnknownStartNode(String),

    #[error("no start node declared")]
    NoStartNode,
}

#[derive(Debug, Error)]
pub enum TrellisError {
    // Build-time errors
    #[error("graph definition error: {0}")]
    Graph(#[from] GraphDefinitionError),

    // Adapter errors (recovered inside the dispatcher, never surfaced to callers)
    #[error("adapter '{adapter}' failed: {message}")]
    Adapter { adapter: String, message: String },

    #[error("adapter '{adapter}' timed out after {timeout_secs}s")]
    AdapterTimeout { adapter: String, timeout_secs: u64 },

    // Run-level errors
    #[error("run {run_id} incomplete: {reason}")]
    RunIncomplete { run_id: RunId, reason: String },

    #[error("run cancelled")]
    Cancelled,

    // Storage errors
    #[error("conversation store error: {0}")]
    Store(String),

    // Config errors
    #[error("config error: {0}")]
    Config(String),

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrellisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_error_converts() {
        let err: TrellisError = GraphDefinitionError::NoStartNode.into();
        assert!(matches!(
            err,
            TrellisError::Graph(GraphDefinitionError::NoStartNode)
        ));
    }

    #[test]
    fn test_run_incomplete_display() {
        let err = TrellisError::RunIncomplete {
            run_id: RunId::from_str("r1"),
            reason: "join 'final' never satisfied".into(),
        };
        let text = err.to_string();
        assert!(text.contains("r1"));
        assert!(text.contains("never satisfied"));
    }
}
