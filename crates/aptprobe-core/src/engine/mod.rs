//! Capability interface to the dependency engine, plus the two engines that
//! need nothing but this crate.

mod scripted;
mod snapshot;

pub use scripted::{ScriptHandle, ScriptStep, ScriptedEngine};
pub use snapshot::{Snapshot, SnapshotEngine};

use crate::error::EngineResult;
use crate::graph::PackageGraph;
use crate::summary::Counters;

/// The external package engine, seen only at its boundary.
///
/// Steps are called in a fixed order: `init_config` then `init_system`
/// once per context, then `open`, `build_index` and `resolve_upgrade` for
/// every request. An engine never mutates installed package state.
pub trait DependencyEngine: Send {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Store a named configuration value. Not validated here; a bad value
    /// surfaces when a later step consults it.
    fn set_config(&mut self, name: &str, value: &str);

    /// Bring the engine's global configuration online.
    fn init_config(&mut self) -> EngineResult<()>;

    /// Bring the platform packaging subsystem online using that
    /// configuration.
    fn init_system(&mut self) -> EngineResult<()>;

    /// Locate and open the on-disk package cache.
    fn open(&mut self) -> EngineResult<PackageGraph>;

    /// Materialize the package/version index into the graph.
    fn build_index(&mut self, graph: &mut PackageGraph) -> EngineResult<()>;

    /// Run the upgrade simulation, annotating each node with its resolved
    /// state.
    fn resolve_upgrade(&mut self, graph: &mut PackageGraph) -> EngineResult<()>;

    fn counts(&self, graph: &PackageGraph) -> Counters {
        graph.counts()
    }
}

impl<E: DependencyEngine + ?Sized> DependencyEngine for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn set_config(&mut self, name: &str, value: &str) {
        (**self).set_config(name, value)
    }

    fn init_config(&mut self) -> EngineResult<()> {
        (**self).init_config()
    }

    fn init_system(&mut self) -> EngineResult<()> {
        (**self).init_system()
    }

    fn open(&mut self) -> EngineResult<PackageGraph> {
        (**self).open()
    }

    fn build_index(&mut self, graph: &mut PackageGraph) -> EngineResult<()> {
        (**self).build_index(graph)
    }

    fn resolve_upgrade(&mut self, graph: &mut PackageGraph) -> EngineResult<()> {
        (**self).resolve_upgrade(graph)
    }

    fn counts(&self, graph: &PackageGraph) -> Counters {
        (**self).counts(graph)
    }
}
