use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::summary::Counters;

/// State a package ends up in after the upgrade simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolvedState {
    #[default]
    Keep,
    Install,
    Remove,
    Broken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_version: Option<String>,
    #[serde(default)]
    pub state: ResolvedState,
    /// Problematic for reasons other than dependencies (half-installed,
    /// reinstall required, ...).
    #[serde(default)]
    pub flagged: bool,
}

impl PackageNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            architecture: None,
            installed_version: None,
            candidate_version: None,
            state: ResolvedState::Keep,
            flagged: false,
        }
    }

    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = Some(architecture.into());
        self
    }

    pub fn with_installed(mut self, version: impl Into<String>) -> Self {
        self.installed_version = Some(version.into());
        self
    }

    pub fn with_candidate(mut self, version: impl Into<String>) -> Self {
        self.candidate_version = Some(version.into());
        self
    }

    pub fn with_state(mut self, state: ResolvedState) -> Self {
        self.state = state;
        self
    }

    pub fn flagged(mut self) -> Self {
        self.flagged = true;
        self
    }

    pub fn is_installed(&self) -> bool {
        self.installed_version.is_some()
    }

    /// `name:arch` when the architecture is known, otherwise `name`.
    pub fn key(&self) -> String {
        match &self.architecture {
            Some(arch) => format!("{}:{}", self.name, arch),
            None => self.name.clone(),
        }
    }
}

/// How far the pipeline has carried a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GraphStage {
    Opened,
    Indexed,
    Resolved,
}

/// Package graph handle for a single request. Built from scratch on every
/// call and dropped when the call returns.
#[derive(Debug, Clone)]
pub struct PackageGraph {
    source: String,
    stage: GraphStage,
    nodes: Vec<PackageNode>,
    index: HashMap<String, usize>,
}

impl PackageGraph {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            stage: GraphStage::Opened,
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Where the graph was loaded from (a path or an engine label).
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn stage(&self) -> GraphStage {
        self.stage
    }

    pub(crate) fn advance(&mut self, stage: GraphStage) {
        if stage > self.stage {
            self.stage = stage;
        }
    }

    /// Insert a node, replacing any node with the same key.
    pub fn insert(&mut self, node: PackageNode) -> &mut PackageNode {
        let key = node.key();
        let position = match self.index.get(&key) {
            Some(&existing) => {
                self.nodes[existing] = node;
                existing
            }
            None => {
                let position = self.nodes.len();
                self.index.entry(node.name.clone()).or_insert(position);
                self.index.insert(key, position);
                self.nodes.push(node);
                position
            }
        };
        &mut self.nodes[position]
    }

    fn position(&self, name: &str) -> Option<usize> {
        if let Some(&position) = self.index.get(name) {
            return Some(position);
        }
        // A qualified lookup may only alias a node that carries no architecture
        let (bare, _) = name.split_once(':')?;
        self.index
            .get(bare)
            .copied()
            .filter(|&position| self.nodes[position].architecture.is_none())
    }

    /// Look a package up by `name:arch` or bare `name`.
    pub fn get(&self, name: &str) -> Option<&PackageNode> {
        self.position(name).map(|position| &self.nodes[position])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PackageNode> {
        self.position(name).map(move |position| &mut self.nodes[position])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PackageNode> {
        self.nodes.iter()
    }

    pub fn counts(&self) -> Counters {
        let mut counters = Counters::default();
        for node in &self.nodes {
            let slot = match node.state {
                ResolvedState::Keep if node.is_installed() => Some(&mut counters.upgrade),
                ResolvedState::Keep => None,
                ResolvedState::Install => Some(&mut counters.install),
                ResolvedState::Remove => Some(&mut counters.remove),
                ResolvedState::Broken => Some(&mut counters.broken),
            };
            if let Some(slot) = slot {
                *slot = slot.saturating_add(1);
            }
            if node.flagged {
                counters.bad = counters.bad.saturating_add(1);
            }
        }
        counters
    }

    /// Lazily walk the packages that would change. Call again to restart.
    pub fn changes(&self) -> Changes<'_> {
        Changes {
            nodes: self.nodes.iter(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeAction {
    Install,
    Upgrade,
    Remove,
    Broken,
    /// Installed, has a newer candidate, but resolution keeps it.
    Held,
}

impl ChangeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeAction::Install => "install",
            ChangeAction::Upgrade => "upgrade",
            ChangeAction::Remove => "remove",
            ChangeAction::Broken => "broken",
            ChangeAction::Held => "held",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageChange {
    pub name: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub action: ChangeAction,
}

impl PackageChange {
    fn from_node(node: &PackageNode) -> Option<Self> {
        let from = node.installed_version.clone();
        let to = node.candidate_version.clone();
        let action = match node.state {
            ResolvedState::Remove => ChangeAction::Remove,
            ResolvedState::Broken => ChangeAction::Broken,
            ResolvedState::Install if from.is_some() => ChangeAction::Upgrade,
            ResolvedState::Install => ChangeAction::Install,
            ResolvedState::Keep => match (&from, &to) {
                (Some(current), Some(candidate)) if current != candidate => ChangeAction::Held,
                _ => return None,
            },
        };
        let to = if action == ChangeAction::Remove { None } else { to };
        Some(Self {
            name: node.key(),
            from,
            to,
            action,
        })
    }
}

/// Iterator returned by [`PackageGraph::changes`].
#[derive(Debug, Clone)]
pub struct Changes<'a> {
    nodes: std::slice::Iter<'a, PackageNode>,
}

impl Iterator for Changes<'_> {
    type Item = PackageChange;

    fn next(&mut self) -> Option<Self::Item> {
        self.nodes.by_ref().find_map(PackageChange::from_node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.nodes.size_hint().1)
    }
}
