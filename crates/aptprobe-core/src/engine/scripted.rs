use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::DependencyEngine;
use crate::error::{EngineError, EngineResult};
use crate::graph::{PackageGraph, PackageNode, ResolvedState};

/// Engine steps that can be observed or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptStep {
    InitConfig,
    InitSystem,
    Open,
    BuildIndex,
    ResolveUpgrade,
}

#[derive(Debug, Default)]
struct ScriptState {
    calls: HashMap<ScriptStep, usize>,
    failures: HashSet<ScriptStep>,
    config: BTreeMap<String, String>,
    config_at_init: Option<BTreeMap<String, String>>,
}

/// Shared view of a [`ScriptedEngine`] that stays usable after the engine
/// has been moved into a context.
#[derive(Debug, Clone, Default)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptHandle {
    /// Make `step` fail from now on.
    pub fn fail(&self, step: ScriptStep) {
        self.state.lock().failures.insert(step);
    }

    pub fn recover(&self, step: ScriptStep) {
        self.state.lock().failures.remove(&step);
    }

    pub fn calls(&self, step: ScriptStep) -> usize {
        self.state.lock().calls.get(&step).copied().unwrap_or(0)
    }

    pub fn config(&self) -> BTreeMap<String, String> {
        self.state.lock().config.clone()
    }

    /// Configuration as it stood when `init_config` last ran.
    pub fn config_at_init(&self) -> Option<BTreeMap<String, String>> {
        self.state.lock().config_at_init.clone()
    }

    fn enter(&self, step: ScriptStep) -> EngineResult<()> {
        let mut state = self.state.lock();
        *state.calls.entry(step).or_insert(0) += 1;
        if step == ScriptStep::InitConfig {
            state.config_at_init = Some(state.config.clone());
        }
        if state.failures.contains(&step) {
            return Err(EngineError::new(format!("scripted failure in {:?}", step)));
        }
        Ok(())
    }
}

/// In-memory engine whose package set and resolution outcome are scripted
/// up front. Used wherever a real package database is unavailable.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    packages: Vec<PackageNode>,
    handle: ScriptHandle,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package. Its `state` is the outcome `resolve_upgrade` will
    /// assign; the index step always starts it at `Keep`.
    pub fn with_package(mut self, node: PackageNode) -> Self {
        self.packages.push(node);
        self
    }

    pub fn with_packages(mut self, nodes: impl IntoIterator<Item = PackageNode>) -> Self {
        self.packages.extend(nodes);
        self
    }

    pub fn failing_at(self, step: ScriptStep) -> Self {
        self.handle.fail(step);
        self
    }

    pub fn handle(&self) -> ScriptHandle {
        self.handle.clone()
    }
}

impl DependencyEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn set_config(&mut self, name: &str, value: &str) {
        self.handle
            .state
            .lock()
            .config
            .insert(name.to_string(), value.to_string());
    }

    fn init_config(&mut self) -> EngineResult<()> {
        self.handle.enter(ScriptStep::InitConfig)
    }

    fn init_system(&mut self) -> EngineResult<()> {
        self.handle.enter(ScriptStep::InitSystem)
    }

    fn open(&mut self) -> EngineResult<PackageGraph> {
        self.handle.enter(ScriptStep::Open)?;
        Ok(PackageGraph::new("scripted"))
    }

    fn build_index(&mut self, graph: &mut PackageGraph) -> EngineResult<()> {
        self.handle.enter(ScriptStep::BuildIndex)?;
        for package in &self.packages {
            let mut node = package.clone();
            node.state = ResolvedState::Keep;
            graph.insert(node);
        }
        Ok(())
    }

    fn resolve_upgrade(&mut self, graph: &mut PackageGraph) -> EngineResult<()> {
        self.handle.enter(ScriptStep::ResolveUpgrade)?;
        for package in &self.packages {
            if let Some(node) = graph.get_mut(&package.key()) {
                node.state = package.state;
            }
        }
        Ok(())
    }
}
