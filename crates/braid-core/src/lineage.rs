//! Lineage Graph
//!
//! Compression edges form a DAG over conversations: each edge records what
//! a new conversation carried, dropped, and resolved from its predecessor.
//! One edge traversal is one hop, the unit in which decision and thread
//! staleness is measured. The graph is updated under a single writer lock
//! so the acyclicity check and the insert are atomic.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};
use crate::identity;

/// Default compression tag emitted by the archive pipeline.
pub const DEFAULT_COMPRESSION_TAG: &str = "CONCEPT_DETAIL_RESULT";

/// Suffix marking a carried id as explicitly revalidated at this edge.
const REVALIDATION_MARKER: char = '!';

// ============================================================================
// EDGES
// ============================================================================

/// One compression event between two conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageEdge {
    pub id: String,
    pub source_conversation: String,
    pub target_conversation: String,
    pub compression_tag: String,
    /// Decision ids carried forward; a trailing `!` marks revalidation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decisions_carried: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decisions_dropped: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub threads_carried: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub threads_resolved: Vec<String>,
    /// Derived: endpoint conversations belong to different projects.
    pub cross_project: bool,
    pub created_at: DateTime<Utc>,
}

impl LineageEdge {
    /// Whether `id` was carried across this edge, and if so whether it was
    /// explicitly revalidated.
    pub fn carried_decision(&self, id: &str) -> Option<bool> {
        Self::carried(&self.decisions_carried, id)
    }

    /// Same contract as [`Self::carried_decision`] for threads.
    pub fn carried_thread(&self, id: &str) -> Option<bool> {
        Self::carried(&self.threads_carried, id)
    }

    fn carried(entries: &[String], id: &str) -> Option<bool> {
        entries.iter().find_map(|entry| {
            let (bare, revalidated) = match entry.strip_suffix(REVALIDATION_MARKER) {
                Some(bare) => (bare, true),
                None => (entry.as_str(), false),
            };
            (bare == id).then_some(revalidated)
        })
    }
}

/// Input for [`LineageGraph::add_edge`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDraft {
    pub source_conversation: String,
    pub target_conversation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_tag: Option<String>,
    #[serde(default)]
    pub decisions_carried: Vec<String>,
    #[serde(default)]
    pub decisions_dropped: Vec<String>,
    #[serde(default)]
    pub threads_carried: Vec<String>,
    #[serde(default)]
    pub threads_resolved: Vec<String>,
}

/// Both directions of a conversation's lineage in one structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageTrace {
    pub conversation: String,
    /// Edge chain toward the root, in traversal order.
    pub ancestors: Vec<LineageEdge>,
    /// Edge chain toward the leaves, in traversal order.
    pub descendants: Vec<LineageEdge>,
}

// ============================================================================
// GRAPH
// ============================================================================

#[derive(Debug, Default)]
struct GraphInner {
    edges: Vec<LineageEdge>,
    by_source: HashMap<String, Vec<usize>>,
    by_target: HashMap<String, Vec<usize>>,
    /// Known conversations with their project, where known.
    conversations: HashMap<String, Option<String>>,
    /// Transitive-closure cache: `(a, b)` means b is reachable from a.
    closure: HashSet<(String, String)>,
}

/// The compression-hop DAG. Single writer lock; reads are concurrent.
#[derive(Debug, Default)]
pub struct LineageGraph {
    inner: RwLock<GraphInner>,
}

impl LineageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, GraphInner>> {
        self.inner
            .read()
            .map_err(|e| MemoryError::Internal(format!("lineage lock poisoned: {e}")))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, GraphInner>> {
        self.inner
            .write()
            .map_err(|e| MemoryError::Internal(format!("lineage lock poisoned: {e}")))
    }

    /// Introduce a conversation (registries call this when a record names
    /// one). A later project value fills in an unknown one.
    pub fn register_conversation(&self, conversation: &str, project: Option<&str>) -> Result<()> {
        let mut inner = self.write()?;
        let slot = inner
            .conversations
            .entry(conversation.to_string())
            .or_insert(None);
        if slot.is_none() {
            *slot = project.map(str::to_string);
        }
        Ok(())
    }

    pub fn knows(&self, conversation: &str) -> Result<bool> {
        Ok(self.read()?.conversations.contains_key(conversation))
    }

    /// Total edges added; doubles as the hop clock for validation stamps.
    pub fn hop_clock(&self) -> u64 {
        self.read().map(|inner| inner.edges.len() as u64).unwrap_or(0)
    }

    /// Append a compression edge.
    ///
    /// Preconditions enforced atomically under the writer lock: endpoints
    /// differ, the source conversation exists, and the edge keeps the
    /// graph acyclic. A replayed identical edge is returned as-is.
    pub fn add_edge(&self, draft: EdgeDraft) -> Result<LineageEdge> {
        let source = draft.source_conversation.trim().to_string();
        let target = draft.target_conversation.trim().to_string();
        if source.is_empty() || target.is_empty() {
            return Err(MemoryError::InvalidArgument(
                "edge endpoints cannot be empty".to_string(),
            ));
        }
        if source == target {
            return Err(MemoryError::InvalidArgument(format!(
                "self-edge on conversation {source}"
            )));
        }

        let mut inner = self.write()?;

        if !inner.conversations.contains_key(&source) {
            return Err(MemoryError::NotFound(format!(
                "source conversation {source} is unknown"
            )));
        }

        let id = identity::edge_id(&source, &target);
        if let Some(existing) = inner.edges.iter().find(|e| e.id == id) {
            return Ok(existing.clone());
        }

        // Acyclicity: the new edge closes a cycle iff source is already
        // reachable from target.
        if inner.closure.contains(&(target.clone(), source.clone())) {
            return Err(MemoryError::Conflict(format!(
                "edge {source} -> {target} would close a lineage cycle"
            )));
        }

        let source_project = inner.conversations.get(&source).cloned().flatten();
        let target_project = inner.conversations.get(&target).cloned().flatten();
        let cross_project = match (&source_project, &target_project) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        };

        // A compression event introduces its target conversation. An
        // unknown target project inherits the source's.
        inner
            .conversations
            .entry(target.clone())
            .or_insert_with(|| source_project.clone());

        let edge = LineageEdge {
            id,
            source_conversation: source.clone(),
            target_conversation: target.clone(),
            compression_tag: draft
                .compression_tag
                .unwrap_or_else(|| DEFAULT_COMPRESSION_TAG.to_string()),
            decisions_carried: draft.decisions_carried,
            decisions_dropped: draft.decisions_dropped,
            threads_carried: draft.threads_carried,
            threads_resolved: draft.threads_resolved,
            cross_project,
            created_at: Utc::now(),
        };

        // Extend the closure: everything reaching source now reaches
        // target and everything target reaches.
        let mut upstream: Vec<String> = inner
            .closure
            .iter()
            .filter(|(_, b)| b == &source)
            .map(|(a, _)| a.clone())
            .collect();
        upstream.push(source.clone());
        let mut downstream: Vec<String> = inner
            .closure
            .iter()
            .filter(|(a, _)| a == &target)
            .map(|(_, b)| b.clone())
            .collect();
        downstream.push(target.clone());
        for a in &upstream {
            for b in &downstream {
                inner.closure.insert((a.clone(), b.clone()));
            }
        }

        let index = inner.edges.len();
        inner.by_source.entry(source).or_default().push(index);
        inner.by_target.entry(target).or_default().push(index);
        inner.edges.push(edge.clone());

        Ok(edge)
    }

    /// Edge chain from `conversation` toward the root, BFS order.
    pub fn ancestors(&self, conversation: &str, limit: usize) -> Result<Vec<LineageEdge>> {
        self.walk(conversation, limit, Direction::Up)
    }

    /// Edge chain from `conversation` toward the leaves, BFS order.
    pub fn descendants(&self, conversation: &str, limit: usize) -> Result<Vec<LineageEdge>> {
        self.walk(conversation, limit, Direction::Down)
    }

    /// Both directions in one structure.
    pub fn trace(&self, conversation: &str, limit: usize) -> Result<LineageTrace> {
        Ok(LineageTrace {
            conversation: conversation.to_string(),
            ancestors: self.ancestors(conversation, limit)?,
            descendants: self.descendants(conversation, limit)?,
        })
    }

    /// Edges whose source is `conversation`, in insertion order.
    pub fn edges_from(&self, conversation: &str) -> Result<Vec<LineageEdge>> {
        let inner = self.read()?;
        Ok(inner
            .by_source
            .get(conversation)
            .map(|indices| indices.iter().map(|&i| inner.edges[i].clone()).collect())
            .unwrap_or_default())
    }

    pub fn edge_count(&self) -> usize {
        self.read().map(|inner| inner.edges.len()).unwrap_or(0)
    }

    fn walk(&self, conversation: &str, limit: usize, direction: Direction) -> Result<Vec<LineageEdge>> {
        let inner = self.read()?;
        let mut out = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(conversation.to_string());
        seen.insert(conversation.to_string());

        while let Some(current) = queue.pop_front() {
            if limit > 0 && out.len() >= limit {
                break;
            }
            let (index_map, next_of): (&HashMap<String, Vec<usize>>, fn(&LineageEdge) -> String) =
                match direction {
                    Direction::Up => (&inner.by_target, |e| e.source_conversation.clone()),
                    Direction::Down => (&inner.by_source, |e| e.target_conversation.clone()),
                };
            if let Some(indices) = index_map.get(&current) {
                for &i in indices {
                    if limit > 0 && out.len() >= limit {
                        break;
                    }
                    let edge = &inner.edges[i];
                    out.push(edge.clone());
                    let next = next_of(edge);
                    if seen.insert(next.clone()) {
                        queue.push_back(next);
                    }
                }
            }
        }
        Ok(out)
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Up,
    Down,
}

// ============================================================================
// TESTS
// ============================================================================
