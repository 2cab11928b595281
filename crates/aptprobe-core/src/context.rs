//! Caller-owned probe state.
//!
//! A [`ProbeContext`] bundles one dependency engine with its initialization
//! state and diagnostics channel. Every operation takes `&mut self`, so
//! sharing a context across threads requires an explicit lock.

use tracing::debug;

use crate::config::EngineConfig;
use crate::diagnostics::Diagnostics;
use crate::engine::DependencyEngine;
use crate::error::{ProbeError, Result};
use crate::graph::{Changes, PackageGraph};
use crate::pipeline;
use crate::state::InitState;
use crate::summary::{Counters, UpgradeSummary};

pub struct ProbeContext {
    engine: Box<dyn DependencyEngine>,
    state: InitState,
    diagnostics: Diagnostics,
}

impl ProbeContext {
    pub fn new<E>(engine: E) -> Self
    where
        E: DependencyEngine + 'static,
    {
        Self::from_boxed(Box::new(engine))
    }

    pub fn from_boxed(engine: Box<dyn DependencyEngine>) -> Self {
        Self {
            engine,
            state: InitState::default(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn state(&self) -> &InitState {
        &self.state
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn set_trace(&mut self, enabled: bool) {
        self.diagnostics.set_trace(enabled);
    }

    pub fn last_error(&self) -> &str {
        self.diagnostics.last_error()
    }

    /// Record a failure detected outside the engine, e.g. a bad argument at
    /// a binding boundary.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.diagnostics.record_error(message);
    }

    /// Forward a configuration value to the engine. Values set before the
    /// first [`init`](Self::init) are visible to initialization.
    pub fn set_config(&mut self, name: &str, value: &str) {
        self.diagnostics.trace("set config");
        debug!("Engine option {}={}", name, value);
        self.engine.set_config(name, value);
    }

    pub fn apply_engine_options(&mut self, config: &EngineConfig) {
        for (name, value) in config.engine_options() {
            self.set_config(&name, &value);
        }
    }

    /// Bring the engine online once. Returns the latched error on every call
    /// after a failed first attempt.
    pub fn init(&mut self) -> Result<()> {
        self.state.ensure(&mut self.engine, &mut self.diagnostics)
    }

    /// Initialize if needed, then open, index and resolve a fresh graph.
    pub fn build_upgrade_graph(&mut self) -> Result<PackageGraph> {
        self.init()?;
        pipeline::build_upgrade_graph(&mut self.engine, &self.diagnostics)
            .map_err(|err| self.record(err))
    }

    pub fn upgrade_summary(&mut self) -> Result<UpgradeSummary> {
        let graph = self.build_upgrade_graph()?;
        let counters = self.engine.counts(&graph);
        debug!(
            "Upgrade summary: upgrade={} remove={} install={} broken={} bad={}",
            counters.upgrade, counters.remove, counters.install, counters.broken, counters.bad
        );
        Ok(UpgradeSummary::from_counters(counters))
    }

    /// Write the summary into `out` on success. On failure `out` is left
    /// exactly as it was and the cause is available from
    /// [`last_error`](Self::last_error).
    pub fn fill_upgrade_summary(&mut self, out: &mut UpgradeSummary) -> bool {
        match self.upgrade_summary() {
            Ok(summary) => {
                *out = summary;
                true
            }
            Err(_) => false,
        }
    }

    /// Per-package changes the upgrade would make.
    pub fn package_changes(&mut self) -> Result<ChangeReport> {
        let graph = self.build_upgrade_graph()?;
        Ok(ChangeReport { graph })
    }

    fn record(&mut self, err: ProbeError) -> ProbeError {
        self.diagnostics.trace("  error");
        self.diagnostics.record_error(err.to_string());
        err
    }
}

impl std::fmt::Debug for ProbeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeContext")
            .field("engine", &self.engine.name())
            .field("state", &self.state)
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

/// A resolved graph kept alive so its changes can be walked any number of
/// times.
#[derive(Debug, Clone)]
pub struct ChangeReport {
    graph: PackageGraph,
}

impl ChangeReport {
    pub fn iter(&self) -> Changes<'_> {
        self.graph.changes()
    }

    pub fn counts(&self) -> Counters {
        self.graph.counts()
    }

    pub fn graph(&self) -> &PackageGraph {
        &self.graph
    }
}

impl<'a> IntoIterator for &'a ChangeReport {
    type Item = crate::graph::PackageChange;
    type IntoIter = Changes<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
