//! Test doubles for the executor seam.

use crate::executor::GraphQueryExecutor;
use crate::sanitizer::Record;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) fn records(values: Vec<Value>) -> Vec<Record> {
    values
        .into_iter()
        .map(|v| v.as_object().cloned().expect("test record must be an object"))
        .collect()
}

#[derive(Debug, Clone)]
pub(crate) struct ExecutedQuery {
    pub query: String,
    pub parameters: Value,
}

impl ExecutedQuery {
    /// The bound `props` or `rels` rows.
    pub fn rows(&self) -> Vec<Value> {
        ["props", "rels"]
            .iter()
            .find_map(|key| self.parameters.get(*key))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }
}

/// Records every attempt; can fail or stall on demand.
#[derive(Default)]
pub(crate) struct RecordingExecutor {
    calls: Mutex<Vec<ExecutedQuery>>,
    remaining_failures: AtomicUsize,
    fail_matching: Option<String>,
    delay: Option<Duration>,
    graph: Option<Mutex<InMemoryGraph>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the first `n` attempts, then succeeds.
    pub fn failing_first(n: usize) -> Self {
        Self {
            remaining_failures: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    /// Fails every attempt whose query text contains `fragment`.
    pub fn failing_when(fragment: &str) -> Self {
        Self {
            fail_matching: Some(fragment.to_string()),
            ..Self::default()
        }
    }

    /// Sleeps before answering, to exercise chunk deadlines.
    pub fn stalling(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Also applies successful queries to an in-memory graph.
    pub fn with_graph() -> Self {
        Self {
            graph: Some(Mutex::new(InMemoryGraph::default())),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<ExecutedQuery> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_containing(&self, fragment: &str) -> Vec<ExecutedQuery> {
        self.calls()
            .into_iter()
            .filter(|c| c.query.contains(fragment))
            .collect()
    }

    pub fn graph(&self) -> InMemoryGraph {
        self.graph
            .as_ref()
            .map(|g| g.lock().unwrap().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GraphQueryExecutor for RecordingExecutor {
    async fn execute(&self, query: &str, parameters: &Value) -> Result<()> {
        self.calls.lock().unwrap().push(ExecutedQuery {
            query: query.to_string(),
            parameters: parameters.clone(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(fragment) = &self.fail_matching {
            if query.contains(fragment.as_str()) {
                anyhow::bail!("injected failure for query containing '{}'", fragment);
            }
        }

        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("injected failure ({} left)", remaining - 1);
        }

        if let Some(graph) = &self.graph {
            graph.lock().unwrap().apply(query, parameters);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FakeNode {
    pub label: String,
    pub props: Record,
}

/// Just enough of a property graph to interpret the three query shapes the
/// batch writer emits, with merge semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct InMemoryGraph {
    pub nodes: BTreeMap<String, FakeNode>,
    pub edges: BTreeSet<(String, String, String)>,
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let len = text[from..].find(end)?;
    Some(&text[from..from + len])
}

impl InMemoryGraph {
    pub fn labeled(&self, label: &str) -> Vec<(&String, &FakeNode)> {
        self.nodes.iter().filter(|(_, n)| n.label == label).collect()
    }

    pub fn edges_labeled(&self, label: &str) -> Vec<(String, String)> {
        self.edges
            .iter()
            .filter(|(l, _, _)| l == label)
            .map(|(_, from, to)| (from.clone(), to.clone()))
            .collect()
    }

    fn apply(&mut self, query: &str, parameters: &Value) {
        let rows = parameters
            .get("props")
            .or_else(|| parameters.get("rels"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        if query.starts_with("UNWIND $props") {
            let label = between(query, "MERGE (s:`", "`").unwrap_or_default().to_string();
            let fields: Vec<String> = query
                .split("s.`")
                .skip(1)
                .filter_map(|part| part.split("` = ").next())
                .map(|f| f.replace("``", "`"))
                .collect();
            for row in rows {
                let Some(id) = row.get("__id").and_then(Value::as_str) else { continue };
                let node = self.nodes.entry(id.to_string()).or_insert_with(|| FakeNode {
                    label: label.clone(),
                    props: Record::new(),
                });
                node.props.insert("~id".to_string(), Value::String(id.to_string()));
                for field in &fields {
                    let value = row.get(field).cloned().unwrap_or(Value::Null);
                    node.props.insert(field.clone(), value);
                }
            }
        } else if query.starts_with("UNWIND $rels") {
            let label = between(query, "MERGE (from)-[:`", "`]").unwrap_or_default().to_string();
            let from_prop = between(query, "MATCH (from {`", "`:").unwrap_or_default().replace("``", "`");
            let to_prop = between(query, "MATCH (to {`", "`:").unwrap_or_default().replace("``", "`");
            let (from_key, to_key) = if query.contains("r.fromId") {
                ("fromId", "toId")
            } else {
                ("from", "to")
            };
            for row in rows {
                let from_ids = self.matching(&from_prop, row.get(from_key));
                let to_ids = self.matching(&to_prop, row.get(to_key));
                for from in &from_ids {
                    for to in &to_ids {
                        self.edges.insert((label.clone(), from.clone(), to.clone()));
                    }
                }
            }
        }
    }

    fn matching(&self, property: &str, value: Option<&Value>) -> Vec<String> {
        let Some(value) = value else { return Vec::new() };
        self.nodes
            .iter()
            .filter(|(_, node)| node.props.get(property) == Some(value))
            .map(|(id, _)| id.clone())
            .collect()
    }
}
