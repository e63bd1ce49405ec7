//! Entanglement Scanner
//!
//! Offline job over decisions and threads: for every item it probes both
//! collections for cross-project neighbors, emits tiered resonance edges,
//! builds clusters from the strong-edge graph, surfaces bridges, and lists
//! loose ends. Snapshots are append-only; the scanner checkpoints its
//! cursor so a restart resumes instead of starting over.
//!
//! Determinism: items are walked in lexicographic id order, ties broken by
//! id, and cluster ids assigned in order of the smallest member id.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MemoryError, Result};
use crate::events::{EventKind, EventLog};
use crate::identity;
use crate::store::{Collection, SearchFilter, StoredRecord, VectorStore};

/// Cosine at or above which a resonance is strong.
pub const STRONG_RESONANCE: f32 = 0.65;

/// Cosine at or above which a resonance exists at all.
pub const WEAK_RESONANCE: f32 = 0.50;

/// Neighbors requested per item and collection.
const SCAN_K: usize = 20;

// ============================================================================
// SCAN ARTIFACTS
// ============================================================================

/// Resonance strength band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResonanceTier {
    Strong,
    Weak,
}

impl ResonanceTier {
    fn from_similarity(similarity: f32) -> Option<Self> {
        if similarity >= STRONG_RESONANCE {
            Some(ResonanceTier::Strong)
        } else if similarity >= WEAK_RESONANCE {
            Some(ResonanceTier::Weak)
        } else {
            None
        }
    }
}

/// One directed edge of the entanglement graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resonance {
    pub from_id: String,
    pub to_id: String,
    pub similarity: f32,
    pub tier: ResonanceTier,
}

/// A connected component of the strong-edge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntanglementCluster {
    /// `cluster-N`, assigned in order of the smallest member id.
    pub id: String,
    pub member_ids: Vec<String>,
    pub projects: Vec<String>,
}

/// A strong cluster edge whose endpoints span two projects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bridge {
    pub from_id: String,
    pub to_id: String,
    pub from_project: String,
    pub to_project: String,
    pub similarity: f32,
}

/// Append-only scan output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub id: String,
    pub scanned_at: DateTime<Utc>,
    pub item_count: usize,
    pub resonance_count: usize,
    pub resonances: Vec<Resonance>,
    pub clusters: Vec<EntanglementCluster>,
    pub bridges: Vec<Bridge>,
    pub loose_ends: Vec<String>,
}

// ============================================================================
// SCANNER
// ============================================================================

#[derive(Debug, Default)]
struct PartialScan {
    resonances: Vec<Resonance>,
    /// Last item id fully processed; a restart resumes past it.
    cursor: Option<String>,
}

/// Single-writer background scanner.
pub struct EntanglementScanner {
    store: Arc<dyn VectorStore>,
    events: Arc<EventLog>,
    partial: Mutex<PartialScan>,
}

impl EntanglementScanner {
    pub fn new(store: Arc<dyn VectorStore>, events: Arc<EventLog>) -> Self {
        Self { store, events, partial: Mutex::new(PartialScan::default()) }
    }

    /// Run a full scan, resuming from the checkpoint cursor if an earlier
    /// run was interrupted. Writes the snapshot to the scans collection.
    pub async fn scan(&self) -> Result<ScanSnapshot> {
        self.scan_at(Utc::now()).await
    }

    /// Scan with an explicit timestamp on the snapshot.
    pub async fn scan_at(&self, now: DateTime<Utc>) -> Result<ScanSnapshot> {
        // Items in lexicographic id order keeps runs deterministic and the
        // checkpoint cursor meaningful.
        let mut items: Vec<(Collection, StoredRecord)> = Vec::new();
        for collection in [Collection::Decisions, Collection::Threads] {
            for record in self.store.list(collection, &SearchFilter::empty(), 0).await? {
                if !record.embedding.is_empty() {
                    items.push((collection, record));
                }
            }
        }
        items.sort_by(|a, b| a.1.id.cmp(&b.1.id));

        let (mut resonances, start_after) = {
            let partial = self
                .partial
                .lock()
                .map_err(|e| MemoryError::Internal(format!("scan state poisoned: {e}")))?;
            (partial.resonances.clone(), partial.cursor.clone())
        };
        if start_after.is_some() {
            info!(cursor = ?start_after, "resuming entanglement scan from checkpoint");
        }

        for (collection, record) in &items {
            if let Some(cursor) = &start_after {
                if record.id.as_str() <= cursor.as_str() {
                    continue;
                }
            }
            let found = self.probe(*collection, record).await?;
            resonances.extend(found);

            let mut partial = self
                .partial
                .lock()
                .map_err(|e| MemoryError::Internal(format!("scan state poisoned: {e}")))?;
            partial.resonances = resonances.clone();
            partial.cursor = Some(record.id.clone());
        }

        resonances.sort_by(|a, b| a.from_id.cmp(&b.from_id).then_with(|| a.to_id.cmp(&b.to_id)));

        let snapshot = build_snapshot(&items, resonances, now);
        self.store
            .upsert(
                Collection::Scans,
                StoredRecord {
                    id: snapshot.id.clone(),
                    project: String::new(),
                    text: format!(
                        "entanglement scan: {} items, {} clusters, {} bridges, {} loose ends",
                        snapshot.item_count,
                        snapshot.clusters.len(),
                        snapshot.bridges.len(),
                        snapshot.loose_ends.len()
                    ),
                    embedding: Vec::new(),
                    status: None,
                    category: None,
                    source_conversation: None,
                    created_at: snapshot.scanned_at,
                    updated_at: snapshot.scanned_at,
                    payload: serde_json::to_value(&snapshot)?,
                },
            )
            .await?;

        // Completed: drop the checkpoint.
        if let Ok(mut partial) = self.partial.lock() {
            *partial = PartialScan::default();
        }
        self.events
            .append(EventKind::Write, "entanglement.scan", vec![snapshot.id.clone()]);
        debug!(
            items = snapshot.item_count,
            resonances = snapshot.resonance_count,
            clusters = snapshot.clusters.len(),
            "entanglement scan complete"
        );
        Ok(snapshot)
    }

    /// Most recent snapshot, if any scan has completed.
    pub async fn latest(&self) -> Result<Option<ScanSnapshot>> {
        let snapshots = self.store.list(Collection::Scans, &SearchFilter::empty(), 1).await?;
        snapshots
            .first()
            .map(|record| {
                serde_json::from_value(record.payload.clone())
                    .map_err(|e| MemoryError::Internal(format!("scan payload {}: {e}", record.id)))
            })
            .transpose()
    }

    /// Cross-project neighbors of one item, in both collections.
    async fn probe(&self, own: Collection, record: &StoredRecord) -> Result<Vec<Resonance>> {
        let other = if own == Collection::Decisions {
            Collection::Threads
        } else {
            Collection::Decisions
        };

        let mut found = Vec::new();
        for collection in [own, other] {
            // The store filter is equality-only, so over-fetch and drop
            // same-project hits here.
            let hits = self
                .store
                .search(collection, &record.embedding, SCAN_K * 2, &SearchFilter::empty())
                .await?;
            let mut kept = 0;
            for hit in hits {
                if kept >= SCAN_K {
                    break;
                }
                if hit.id == record.id || hit.record.project == record.project {
                    continue;
                }
                if let Some(tier) = ResonanceTier::from_similarity(hit.score) {
                    found.push(Resonance {
                        from_id: record.id.clone(),
                        to_id: hit.id,
                        similarity: hit.score,
                        tier,
                    });
                }
                kept += 1;
            }
        }
        Ok(found)
    }
}

// ============================================================================
// SNAPSHOT CONSTRUCTION
// ============================================================================

fn build_snapshot(
    items: &[(Collection, StoredRecord)],
    resonances: Vec<Resonance>,
    now: DateTime<Utc>,
) -> ScanSnapshot {
    let project_of: HashMap<&str, &str> = items
        .iter()
        .map(|(_, r)| (r.id.as_str(), r.project.as_str()))
        .collect();

    // Undirected strong edges, deduped with ordered endpoints.
    let mut strong_edges: BTreeMap<(String, String), f32> = BTreeMap::new();
    for r in resonances.iter().filter(|r| r.tier == ResonanceTier::Strong) {
        let key = if r.from_id <= r.to_id {
            (r.from_id.clone(), r.to_id.clone())
        } else {
            (r.to_id.clone(), r.from_id.clone())
        };
        let entry = strong_edges.entry(key).or_insert(r.similarity);
        if r.similarity > *entry {
            *entry = r.similarity;
        }
    }

    // Connected components over the strong graph.
    let mut dsu = DisjointSet::default();
    for (a, b) in strong_edges.keys() {
        dsu.union(a, b);
    }
    let mut components: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (a, b) in strong_edges.keys() {
        for node in [a, b] {
            let root = dsu.find(node);
            components.entry(root).or_default().insert(node.clone());
        }
    }

    // Cluster ids in order of smallest member id; BTreeMap on the root is
    // not enough since roots are arbitrary members, so sort by minimum.
    let mut component_list: Vec<BTreeSet<String>> = components.into_values().collect();
    component_list.sort_by(|a, b| a.first().cmp(&b.first()));
    let clusters: Vec<EntanglementCluster> = component_list
        .into_iter()
        .enumerate()
        .map(|(index, members)| {
            let projects: BTreeSet<String> = members
                .iter()
                .filter_map(|id| project_of.get(id.as_str()).map(|p| p.to_string()))
                .collect();
            EntanglementCluster {
                id: format!("cluster-{index}"),
                member_ids: members.into_iter().collect(),
                projects: projects.into_iter().collect(),
            }
        })
        .collect();

    // Bridges: strong edges whose endpoints sit in different projects.
    let bridges: Vec<Bridge> = strong_edges
        .iter()
        .filter_map(|((a, b), similarity)| {
            let pa = project_of.get(a.as_str())?;
            let pb = project_of.get(b.as_str())?;
            (pa != pb).then(|| Bridge {
                from_id: a.clone(),
                to_id: b.clone(),
                from_project: pa.to_string(),
                to_project: pb.to_string(),
                similarity: *similarity,
            })
        })
        .collect();

    // Loose ends: items with no resonance at all, either direction.
    let mut entangled: BTreeSet<&str> = BTreeSet::new();
    for r in &resonances {
        entangled.insert(r.from_id.as_str());
        entangled.insert(r.to_id.as_str());
    }
    let loose_ends: Vec<String> = items
        .iter()
        .map(|(_, r)| r.id.clone())
        .filter(|id| !entangled.contains(id.as_str()))
        .collect();

    ScanSnapshot {
        id: identity::record_id(Collection::Scans.as_str(), "", &now.to_rfc3339()),
        scanned_at: now,
        item_count: items.len(),
        resonance_count: resonances.len(),
        resonances,
        clusters,
        bridges,
        loose_ends,
    }
}

/// Minimal union-find over string ids, path-compressed.
#[derive(Debug, Default)]
struct DisjointSet {
    parent: HashMap<String, String>,
}

impl DisjointSet {
    fn find(&mut self, node: &str) -> String {
        let parent = match self.parent.get(node) {
            Some(p) if p != node => p.clone(),
            Some(_) => return node.to_string(),
            None => {
                self.parent.insert(node.to_string(), node.to_string());
                return node.to_string();
            }
        };
        let root = self.find(&parent);
        self.parent.insert(node.to_string(), root.clone());
        root
    }

    fn union(&mut self, a: &str, b: &str) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Deterministic root choice: the smaller id wins.
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent.insert(child, root);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
