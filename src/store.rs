//! Persisted knowledge graph with lock-guarded, read-modify-write merges.
//!
//! The graph lives in a single JSON snapshot. Writers take an exclusive
//! advisory lock on a sibling `<graph>.lock` file (via `fd-lock`, so it
//! holds across processes), reload the snapshot, fold in their triples,
//! and replace the snapshot with a temp-file-and-rename. Readers never
//! lock; they see either the previous or the next complete snapshot.
//!
//! A snapshot that fails to parse at merge time is copied aside to
//! `<graph>.corrupt-<unix-ts>` and the merge starts from an empty graph.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use docgraph_core::graph::{KnowledgeGraph, MergeStats};
use docgraph_core::models::Triple;
use serde::Serialize;

/// What a [`GraphStore::merge`] call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub triples_in: usize,
    pub triples_applied: usize,
    pub nodes_added: usize,
    pub edges_added: usize,
    pub relations_added: usize,
    pub node_count: usize,
    pub edge_count: usize,
}

impl MergeReport {
    fn new(triples_in: usize, stats: MergeStats, graph: &KnowledgeGraph) -> Self {
        Self {
            triples_in,
            triples_applied: stats.triples_applied,
            nodes_added: stats.nodes_added,
            edges_added: stats.edges_added,
            relations_added: stats.relations_added,
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
        }
    }
}

/// Handle on one snapshot path. Cheap to clone; holds no open files.
#[derive(Debug, Clone)]
pub struct GraphStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl GraphStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("lock");
        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Fold `triples` into the persisted graph under the exclusive lock.
    ///
    /// Blocks while another writer holds the lock; call from
    /// `spawn_blocking` in async code.
    pub fn merge(&self, triples: &[Triple]) -> Result<MergeReport> {
        ensure_parent(&self.path)?;
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .with_context(|| format!("Failed to open lock file: {}", self.lock_path.display()))?;
        let mut lock = fd_lock::RwLock::new(lock_file);
        let _guard = lock
            .write()
            .with_context(|| format!("Failed to lock {}", self.lock_path.display()))?;

        let mut graph = self.load_for_merge()?;
        let stats = graph.merge(triples);
        let json = graph.to_json()?;
        write_atomic(&self.path, json.as_bytes())
            .with_context(|| format!("Failed to write graph snapshot: {}", self.path.display()))?;

        let report = MergeReport::new(triples.len(), stats, &graph);
        tracing::debug!(
            path = %self.path.display(),
            applied = report.triples_applied,
            nodes = report.node_count,
            edges = report.edge_count,
            "graph merged"
        );
        Ok(report)
    }

    /// Lock-free read. A missing or unreadable snapshot yields an empty graph.
    pub fn load(&self) -> KnowledgeGraph {
        match std::fs::read(&self.path) {
            Ok(bytes) => match parse_snapshot(bytes) {
                Ok(graph) => graph,
                Err(e) => {
                    tracing::error!(
                        path = %self.path.display(),
                        error = %e,
                        "unreadable graph snapshot, using empty graph"
                    );
                    KnowledgeGraph::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => KnowledgeGraph::new(),
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to read graph snapshot, using empty graph"
                );
                KnowledgeGraph::new()
            }
        }
    }

    /// Load under the write lock. Corrupt snapshots are backed up first.
    fn load_for_merge(&self) -> Result<KnowledgeGraph> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(KnowledgeGraph::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read graph snapshot: {}", self.path.display())
                })
            }
        };
        match parse_snapshot(bytes) {
            Ok(graph) => Ok(graph),
            Err(e) => {
                let backup = self.backup_path();
                std::fs::copy(&self.path, &backup).with_context(|| {
                    format!("Failed to back up corrupt snapshot to {}", backup.display())
                })?;
                tracing::error!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "corrupt graph snapshot, starting from an empty graph"
                );
                Ok(KnowledgeGraph::new())
            }
        }
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".corrupt-{}", chrono::Utc::now().timestamp()));
        PathBuf::from(name)
    }
}

/// Decode snapshot bytes. Invalid UTF-8 counts as corruption, like bad JSON.
fn parse_snapshot(bytes: Vec<u8>) -> Result<KnowledgeGraph> {
    let json = String::from_utf8(bytes).context("snapshot is not valid UTF-8")?;
    Ok(KnowledgeGraph::from_json(&json)?)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

/// Replace `path` with `bytes` via a uniquely named sibling temp file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(format!(".tmp-{}", uuid::Uuid::new_v4()));
    let tmp = PathBuf::from(tmp_name);

    let result = (|| -> Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn t(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(s, p, o).unwrap()
    }

    #[test]
    fn merge_creates_snapshot_and_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::new(dir.path().join("kg").join("graph.json"));
        let report = store
            .merge(&[t("Alice", "works_at", "Acme"), t("acme", "located_in", "Paris")])
            .unwrap();
        assert_eq!(report.triples_in, 2);
        assert_eq!(report.nodes_added, 3);
        assert_eq!(report.edges_added, 2);
        assert!(store.path().exists());
        assert!(store.lock_path().exists());
        assert_eq!(store.lock_path().extension().unwrap(), "lock");

        let graph = store.load();
        assert_eq!(graph.relations("alice", "acme"), Some(&["works_at".to_string()][..]));
    }

    #[test]
    fn merging_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::new(dir.path().join("graph.json"));
        let triples = [t("a", "r", "b"), t("b", "s", "c")];
        store.merge(&triples).unwrap();
        let first = std::fs::read_to_string(store.path()).unwrap();
        let report = store.merge(&triples).unwrap();
        assert_eq!(report.relations_added, 0);
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), first);
    }

    #[test]
    fn relations_accumulate_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::new(dir.path().join("graph.json"));
        store.merge(&[t("a", "first", "b")]).unwrap();
        store.merge(&[t("b", "second", "a"), t("a", "first", "b")]).unwrap();
        let graph = store.load();
        assert_eq!(
            graph.relations("a", "b").unwrap(),
            &["first".to_string(), "second".to_string()]
        );
    }

    #[test]
    fn load_of_missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::new(dir.path().join("nothing.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn corrupt_snapshot_is_backed_up_and_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = GraphStore::new(&path);
        assert!(store.load().is_empty());

        let report = store.merge(&[t("x", "r", "y")]).unwrap();
        assert_eq!(report.node_count, 2);

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("graph.json.corrupt-"))
            .collect();
        assert_eq!(backups.len(), 1);
        let saved = std::fs::read_to_string(dir.path().join(&backups[0])).unwrap();
        assert_eq!(saved, "{ not json");
        assert_eq!(store.load().node_count(), 2);
    }

    #[test]
    fn non_utf8_snapshot_is_backed_up_and_merges_recover() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        let garbage = [0xffu8, 0xfe, 0x00, 0x7b];
        std::fs::write(&path, garbage).unwrap();
        let store = GraphStore::new(&path);
        assert!(store.load().is_empty());

        let report = store.merge(&[t("x", "r", "y")]).unwrap();
        assert_eq!(report.node_count, 2);
        let report = store.merge(&[t("y", "r", "z")]).unwrap();
        assert_eq!(report.node_count, 3);

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.to_string_lossy().contains("graph.json.corrupt-"))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(std::fs::read(&backups[0]).unwrap(), garbage);
    }

    #[test]
    fn concurrent_merges_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(GraphStore::new(dir.path().join("graph.json")));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let triples: Vec<Triple> = (0..5)
                        .map(|j| t(&format!("s{i}"), "rel", &format!("o{i}-{j}")))
                        .collect();
                    store.merge(&triples).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let graph = store.load();
        assert_eq!(graph.edge_count(), 40);
        assert_eq!(graph.node_count(), 48);
        for i in 0..8 {
            for j in 0..5 {
                assert!(graph.relations(&format!("s{i}"), &format!("o{i}-{j}")).is_some());
            }
        }
    }

    #[test]
    fn write_atomic_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
