use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use tracing::warn;

use trellis_core::types::{RunId, RunOutput};

use crate::message::AgentResponse;

/// Everything mutable that belongs to one run.
#[derive(Debug, Default)]
struct RunSlot {
    /// Keyed values visible to any node in the run.
    shared: HashMap<String, serde_json::Value>,
    /// Partial fan-in results, keyed by join id then producer id. BTreeMap
    /// keeps delivery in ascending producer-id order.
    partials: HashMap<String, BTreeMap<String, AgentResponse>>,
    /// Joins that have already fired this run.
    fired: HashSet<String>,
    /// Append-only ordered outputs.
    outputs: Vec<RunOutput>,
}

/// Per-run keyed storage and output channels.
///
/// Each run gets its own slot behind its own lock: operations for one
/// run are linearizable with respect to each other, and operations on
/// different runs never contend. No lock is held across an await.
#[derive(Debug, Default)]
pub struct RunStateStore {
    runs: RwLock<HashMap<RunId, Arc<Mutex<RunSlot>>>>,
}

impl RunStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the slot for a run. Idempotent.
    pub fn open_run(&self, run_id: &RunId) {
        let mut runs = self.runs.write().unwrap();
        runs.entry(run_id.clone()).or_default();
    }

    /// Drop all state for a run.
    pub fn discard_run(&self, run_id: &RunId) {
        self.runs.write().unwrap().remove(run_id);
    }

    fn slot(&self, run_id: &RunId) -> Arc<Mutex<RunSlot>> {
        if let Some(slot) = self.runs.read().unwrap().get(run_id) {
            return slot.clone();
        }
        // Late writers (e.g. a node settling during teardown) still get a
        // slot rather than a panic; discard_run drops it with the rest.
        self.runs
            .write()
            .unwrap()
            .entry(run_id.clone())
            .or_default()
            .clone()
    }

    /// Read a shared value.
    pub fn get(&self, run_id: &RunId, key: &str) -> Option<serde_json::Value> {
        let slot = self.slot(run_id);
        let slot = slot.lock().unwrap();
        slot.shared.get(key).cloned()
    }

    /// Write a shared value.
    pub fn set(&self, run_id: &RunId, key: impl Into<String>, value: serde_json::Value) {
        let slot = self.slot(run_id);
        slot.lock().unwrap().shared.insert(key.into(), value);
    }

    /// Record one predecessor's result for a join awaiting siblings.
    pub fn record_partial(
        &self,
        run_id: &RunId,
        join_id: &str,
        predecessor_id: &str,
        result: AgentResponse,
    ) {
        let slot = self.slot(run_id);
        let mut slot = slot.lock().unwrap();
        if slot.fired.contains(join_id) {
            warn!(
                run_id = %run_id,
                join_id,
                predecessor_id,
                "Partial result recorded after join fired, dropping"
            );
            return;
        }
        let partials = slot.partials.entry(join_id.to_string()).or_default();
        if partials.insert(predecessor_id.to_string(), result).is_some() {
            warn!(
                run_id = %run_id,
                join_id,
                predecessor_id,
                "Predecessor reported twice for the same join, keeping latest"
            );
        }
    }

    /// Take the collected results once every declared predecessor has
    /// reported, in ascending producer-id order. Clears the partial set and
    /// marks the join fired so it cannot refire within the run.
    pub fn join_ready(
        &self,
        run_id: &RunId,
        join_id: &str,
        predecessors: &[String],
    ) -> Option<Vec<AgentResponse>> {
        let slot = self.slot(run_id);
        let mut slot = slot.lock().unwrap();
        if slot.fired.contains(join_id) {
            return None;
        }
        let complete = slot
            .partials
            .get(join_id)
            .is_some_and(|p| predecessors.iter().all(|id| p.contains_key(id)));
        if !complete {
            return None;
        }
        let partials = slot.partials.remove(join_id)?;
        slot.fired.insert(join_id.to_string());
        Some(partials.into_values().collect())
    }

    /// How many predecessors have reported for a join that has not fired.
    pub fn partial_count(&self, run_id: &RunId, join_id: &str) -> usize {
        let slot = self.slot(run_id);
        let slot = slot.lock().unwrap();
        slot.partials.get(join_id).map_or(0, BTreeMap::len)
    }

    pub fn has_fired(&self, run_id: &RunId, join_id: &str) -> bool {
        let slot = self.slot(run_id);
        let fired = slot.lock().unwrap().fired.contains(join_id);
        fired
    }

    /// Append an externally visible output.
    pub fn append_output(&self, run_id: &RunId, output: RunOutput) {
        let slot = self.slot(run_id);
        slot.lock().unwrap().outputs.push(output);
    }

    /// Take the run's outputs in the order they were yielded.
    pub fn drain_outputs(&self, run_id: &RunId) -> Vec<RunOutput> {
        let slot = self.slot(run_id);
        let mut slot = slot.lock().unwrap();
        std::mem::take(&mut slot.outputs)
    }
}
