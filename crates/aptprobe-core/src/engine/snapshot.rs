use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::DependencyEngine;
use crate::error::{EngineError, EngineResult};
use crate::graph::{PackageGraph, PackageNode, ResolvedState};

/// A resolved package graph captured to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub packages: Vec<PackageNode>,
}

impl Snapshot {
    pub fn from_graph(graph: &PackageGraph) -> Self {
        Self {
            source: graph.source().to_string(),
            packages: graph.iter().cloned().collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, json)
    }
}

/// Replays a [`Snapshot`] file through the normal pipeline.
#[derive(Debug, Clone)]
pub struct SnapshotEngine {
    path: PathBuf,
    config: BTreeMap<String, String>,
    raw: Option<String>,
    resolved: Vec<(String, ResolvedState)>,
}

impl SnapshotEngine {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: BTreeMap::new(),
            raw: None,
            resolved: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &BTreeMap<String, String> {
        &self.config
    }
}

impl DependencyEngine for SnapshotEngine {
    fn name(&self) -> &str {
        "snapshot"
    }

    fn set_config(&mut self, name: &str, value: &str) {
        self.config.insert(name.to_string(), value.to_string());
    }

    fn init_config(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn init_system(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn open(&mut self) -> EngineResult<PackageGraph> {
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            EngineError::with_source(
                format!("cannot read snapshot {}: {}", self.path.display(), e),
                e,
            )
        })?;
        self.raw = Some(raw);
        Ok(PackageGraph::new(self.path.display().to_string()))
    }

    fn build_index(&mut self, graph: &mut PackageGraph) -> EngineResult<()> {
        let raw = self
            .raw
            .take()
            .ok_or_else(|| EngineError::new("snapshot was not opened"))?;
        let snapshot: Snapshot = serde_json::from_str(&raw).map_err(|e| {
            EngineError::with_source(
                format!("invalid snapshot {}: {}", self.path.display(), e),
                e,
            )
        })?;
        debug!(
            "Snapshot {} holds {} packages",
            self.path.display(),
            snapshot.packages.len()
        );
        self.resolved.clear();
        for mut node in snapshot.packages {
            self.resolved.push((node.key(), node.state));
            node.state = ResolvedState::Keep;
            graph.insert(node);
        }
        Ok(())
    }

    fn resolve_upgrade(&mut self, graph: &mut PackageGraph) -> EngineResult<()> {
        for (key, state) in self.resolved.drain(..) {
            if let Some(node) = graph.get_mut(&key) {
                node.state = state;
            }
        }
        Ok(())
    }
}
