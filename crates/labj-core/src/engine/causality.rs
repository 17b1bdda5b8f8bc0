//! Causality traversal over `caused_by` edges.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::str::FromStr;

use serde_json::{Value, json};

use super::JournalEngine;
use crate::error::{JournalError, Result};

/// Hard cap on traversal depth, applied over the caller's request.
const MAX_DEPTH: u32 = 100;

/// Which way to walk the causality graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Follow the entry's own `caused_by` links toward causes.
    Backward,
    /// Find entries whose `caused_by` contains the entry, toward effects.
    Forward,
    /// Both halves.
    Both,
}

impl FromStr for Direction {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "backward" => Ok(Self::Backward),
            "forward" => Ok(Self::Forward),
            "both" => Ok(Self::Both),
            other => Err(JournalError::invalid(format!(
                "direction must be backward, forward, or both; got '{other}'"
            ))),
        }
    }
}

impl JournalEngine {
    /// Breadth-first walk of the causality graph from `entry_id`.
    ///
    /// A visited set per direction guards against cycles, so traversal
    /// terminates on any input and each id appears at most once per
    /// direction. Depth is capped at 100.
    ///
    /// # Errors
    ///
    /// [`JournalError::NotFound`] when the starting entry does not exist.
    pub fn trace_causality(
        &self,
        entry_id: &str,
        direction: Direction,
        depth: u32,
    ) -> Result<Value> {
        let root = self
            .index()
            .get(entry_id)?
            .ok_or_else(|| JournalError::NotFound {
                what: format!("entry {entry_id}"),
            })?;
        let depth = depth.min(MAX_DEPTH);

        let mut nodes: BTreeMap<String, Value> = BTreeMap::new();
        nodes.insert(entry_id.to_string(), node_summary(&root));
        let mut edges: Vec<Value> = Vec::new();

        if matches!(direction, Direction::Backward | Direction::Both) {
            self.walk_backward(entry_id, depth, &mut nodes, &mut edges)?;
        }
        if matches!(direction, Direction::Forward | Direction::Both) {
            self.walk_forward(entry_id, depth, &mut nodes, &mut edges)?;
        }

        Ok(json!({
            "root": entry_id,
            "direction": match direction {
                Direction::Backward => "backward",
                Direction::Forward => "forward",
                Direction::Both => "both",
            },
            "nodes": nodes,
            "edges": edges,
        }))
    }

    /// Toward causes: follow the entry's own `caused_by` links, plus the
    /// `references_entry` link when the current node is an amendment (the
    /// corrected entry precedes its correction).
    fn walk_backward(
        &self,
        start: &str,
        depth: u32,
        nodes: &mut BTreeMap<String, Value>,
        edges: &mut Vec<Value>,
    ) -> Result<()> {
        let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
        let mut queue: VecDeque<(String, u32)> = VecDeque::from([(start.to_string(), 0)]);

        while let Some((current, level)) = queue.pop_front() {
            if level >= depth {
                continue;
            }
            let Some(row) = self.index().get(&current)? else {
                continue;
            };
            let mut predecessors: Vec<(String, &str)> = row["caused_by"]
                .as_array()
                .map(|list| {
                    list.iter()
                        .filter_map(|v| v.as_str().map(|s| (s.to_string(), "causes")))
                        .collect()
                })
                .unwrap_or_default();
            if let Some(amended) = row["references_entry"].as_str() {
                predecessors.push((amended.to_string(), "amends"));
            }
            for (cause, edge_type) in predecessors {
                edges.push(json!({ "from": cause, "to": current, "type": edge_type }));
                if visited.insert(cause.clone()) {
                    if let Some(cause_row) = self.index().get(&cause)? {
                        nodes.insert(cause.clone(), node_summary(&cause_row));
                    }
                    queue.push_back((cause, level + 1));
                }
            }
        }
        Ok(())
    }

    /// Toward effects: entries whose `caused_by` names the current node,
    /// plus amendments that correct it.
    fn walk_forward(
        &self,
        start: &str,
        depth: u32,
        nodes: &mut BTreeMap<String, Value>,
        edges: &mut Vec<Value>,
    ) -> Result<()> {
        let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
        let mut queue: VecDeque<(String, u32)> = VecDeque::from([(start.to_string(), 0)]);

        while let Some((current, level)) = queue.pop_front() {
            if level >= depth {
                continue;
            }
            let mut successors: Vec<(Value, &str)> = self
                .index()
                .caused_by_of(&current)?
                .into_iter()
                .map(|row| (row, "causes"))
                .collect();
            successors.extend(
                self.index()
                    .amendments_of(&current)?
                    .into_iter()
                    .map(|row| (row, "amends")),
            );
            for (effect_row, edge_type) in successors {
                let Some(effect_id) = effect_row["entry_id"].as_str().map(str::to_string) else {
                    continue;
                };
                edges.push(json!({ "from": current, "to": effect_id, "type": edge_type }));
                if visited.insert(effect_id.clone()) {
                    nodes.insert(effect_id.clone(), node_summary(&effect_row));
                    queue.push_back((effect_id, level + 1));
                }
            }
        }
        Ok(())
    }
}

/// Short node form: id, author, truncated context, outcome, timestamp.
fn node_summary(row: &Value) -> Value {
    let context = row["context"]
        .as_str()
        .or_else(|| row["correction"].as_str())
        .unwrap_or_default();
    let short: String = context.chars().take(80).collect();
    json!({
        "entry_id": row["entry_id"],
        "author": row["author"],
        "context": short,
        "outcome": row["outcome"],
        "timestamp": row["timestamp"],
        "caused_by": row["caused_by"],
    })
}
