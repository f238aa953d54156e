use std::collections::{HashMap, HashSet, VecDeque};

use trellis_core::error::GraphDefinitionError;

use crate::edge::{Edge, EdgeCondition};
use crate::node::Node;

/// Builder for a [`WorkflowGraph`].
///
/// Collects nodes, edges, fan-out groups, fan-in joins, and start nodes,
/// then validates the whole structure in [`build`](Self::build). Structural
/// mistakes are programmer errors surfaced as [`GraphDefinitionError`]
/// before any run starts.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    fan_out: Vec<(String, Vec<String>)>,
    fan_in: Vec<(String, Vec<String>)>,
    start: Vec<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node.
    pub fn add_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add an unconditional edge.
    pub fn add_edge(self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.add_gated_edge(source, target, EdgeCondition::Always)
    }

    /// Add an edge gated on a condition.
    pub fn add_gated_edge(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        condition: EdgeCondition,
    ) -> Self {
        self.edges.push(Edge::gated(source, target, condition));
        self
    }

    /// Broadcast the source's settled message to every target concurrently.
    ///
    /// Group edges carry no predicates; the grouping exists for scheduling
    /// parallelism only and implies nothing about join semantics.
    pub fn add_fan_out(
        mut self,
        source: impl Into<String>,
        targets: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let source = source.into();
        let targets: Vec<String> = targets.into_iter().map(Into::into).collect();
        for target in &targets {
            self.edges.push(Edge::fan_out(source.clone(), target.clone()));
        }
        self.fan_out.push((source, targets));
        self
    }

    /// Suppress the target until every source has reported for the run,
    /// then deliver the collected results in ascending producer-id order.
    pub fn add_fan_in(
        mut self,
        sources: impl IntoIterator<Item = impl Into<String>>,
        target: impl Into<String>,
    ) -> Self {
        let target = target.into();
        let sources: Vec<String> = sources.into_iter().map(Into::into).collect();
        for source in &sources {
            self.edges.push(Edge::new(source.clone(), target.clone()));
        }
        self.fan_in.push((target, sources));
        self
    }

    /// Declare a start node. May be called more than once; starts seed the
    /// run in declaration order.
    pub fn set_start(mut self, node_id: impl Into<String>) -> Self {
        self.start.push(node_id.into());
        self
    }

    /// Validate and freeze the graph.
    pub fn build(self) -> Result<WorkflowGraph, GraphDefinitionError> {
        let mut nodes: HashMap<String, Node> = HashMap::new();
        for node in self.nodes {
            if nodes.contains_key(&node.id) {
                return Err(GraphDefinitionError::DuplicateNode(node.id));
            }
            nodes.insert(node.id.clone(), node);
        }

        for edge in &self.edges {
            for id in [edge.source.as_str(), edge.target.as_str()] {
                if !nodes.contains_key(id) {
                    return Err(GraphDefinitionError::UnknownNode(id.to_string()));
                }
            }
        }

        if self.start.is_empty() {
            return Err(GraphDefinitionError::NoStartNode);
        }
        for id in &self.start {
            if !nodes.contains_key(id) {
                return Err(GraphDefinitionError::UnknownStartNode(id.clone()));
            }
        }

        let mut fan_in: HashMap<String, Vec<String>> = HashMap::new();
        for (target, sources) in self.fan_in {
            if fan_in.contains_key(&target) {
                return Err(GraphDefinitionError::DuplicateJoin { join: target });
            }
            fan_in.insert(target, sources);
        }

        // Every incoming edge to a join target must come from its declared
        // predecessor set, and every declared predecessor must have an edge.
        // Anything else makes in-degree satisfaction ambiguous.
        for (join, predecessors) in &fan_in {
            let declared: HashSet<&String> = predecessors.iter().collect();
            let mut incoming: HashSet<&String> = HashSet::new();
            for edge in self.edges.iter().filter(|e| &e.target == join) {
                if !declared.contains(&edge.source) {
                    return Err(GraphDefinitionError::AmbiguousJoinEdge {
                        join: join.clone(),
                        edge_source: edge.source.clone(),
                    });
                }
                incoming.insert(&edge.source);
            }
            for predecessor in predecessors {
                if !incoming.contains(predecessor) {
                    return Err(GraphDefinitionError::JoinMissingEdge {
                        join: join.clone(),
                        predecessor: predecessor.clone(),
                    });
                }
            }
        }

        // Cycle check over all edges. Gated edges count as present: a cycle
        // that only closes when a predicate fires is still a cycle.
        detect_cycle(&nodes, &self.edges)?;

        let mut fan_out: HashMap<String, Vec<String>> = HashMap::new();
        for (source, targets) in self.fan_out {
            fan_out.entry(source).or_default().extend(targets);
        }

        Ok(WorkflowGraph {
            nodes,
            edges: self.edges,
            fan_out,
            fan_in,
            start: self.start,
        })
    }
}

/// Kahn's algorithm; any node left with in-degree > 0 sits on a cycle.
fn detect_cycle(
    nodes: &HashMap<String, Node>,
    edges: &[Edge],
) -> Result<(), GraphDefinitionError> {
    let mut in_degree: HashMap<&str, usize> = nodes.keys().map(|id| (id.as_str(), 0)).collect();
    for edge in edges {
        *in_degree.entry(edge.target.as_str()).or_default() += 1;
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut visited = 0usize;

    while let Some(id) = queue.pop_front() {
        visited += 1;
        for edge in edges.iter().filter(|e| e.source == id) {
            let degree = in_degree.get_mut(edge.target.as_str()).expect("known node");
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(edge.target.as_str());
            }
        }
    }

    if visited == nodes.len() {
        Ok(())
    } else {
        let on_cycle = in_degree
            .iter()
            .filter(|(_, d)| **d > 0)
            .map(|(id, _)| id.to_string())
            .min()
            .unwrap_or_default();
        Err(GraphDefinitionError::CycleDetected(on_cycle))
    }
}

/// Immutable description of a workflow: nodes, edges, fan-out groups,
/// fan-in joins, and the start set. Created once, shared across runs.
#[derive(Debug)]
pub struct WorkflowGraph {
    nodes: HashMap<String, Node>,
    edges: Vec<Edge>,
    fan_out: HashMap<String, Vec<String>>,
    fan_in: HashMap<String, Vec<String>>,
    start: Vec<String>,
}

impl WorkflowGraph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn start_nodes(&self) -> &[String] {
        &self.start
    }

    /// Fan-out targets of a node, in declaration order.
    pub fn fan_out_targets(&self, source: &str) -> Option<&[String]> {
        self.fan_out.get(source).map(Vec::as_slice)
    }

    /// Declared predecessors of a fan-in target.
    pub fn join_predecessors(&self, target: &str) -> Option<&[String]> {
        self.fan_in.get(target).map(Vec::as_slice)
    }

    pub fn is_join(&self, target: &str) -> bool {
        self.fan_in.contains_key(target)
    }

    /// All declared fan-in targets.
    pub fn joins(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fan_in
            .iter()
            .map(|(join, preds)| (join.as_str(), preds.as_slice()))
    }

    /// Outgoing edges that are not part of a fan-out group, in declaration
    /// order. Group edges are scheduled by the broadcast step instead.
    pub fn sequential_edges<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.source == source && !e.fan_out)
    }
}
