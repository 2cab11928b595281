//! The three-phase cache build: open, build caches, build dep cache.
//!
//! Every run starts from a fresh graph so the result always reflects the
//! current on-disk state. No phase is retried and nothing partial escapes.

use tracing::debug;

use crate::diagnostics::Diagnostics;
use crate::engine::DependencyEngine;
use crate::error::{Phase, ProbeError, Result};
use crate::graph::{GraphStage, PackageGraph};

/// Open, index and resolve a new graph. Initialization is the caller's
/// concern; see [`crate::ProbeContext::build_upgrade_graph`].
pub fn build_upgrade_graph<E>(engine: &mut E, diagnostics: &Diagnostics) -> Result<PackageGraph>
where
    E: DependencyEngine + ?Sized,
{
    diagnostics.trace("upgrade summary get");

    diagnostics.trace("  open cache files");
    let mut graph = engine
        .open()
        .map_err(|e| ProbeError::from_phase(Phase::CacheOpen, e))?;

    diagnostics.trace("  build caches");
    engine
        .build_index(&mut graph)
        .map_err(|e| ProbeError::from_phase(Phase::CacheBuild, e))?;
    graph.advance(GraphStage::Indexed);

    diagnostics.trace("  build dep cache");
    engine
        .resolve_upgrade(&mut graph)
        .map_err(|e| ProbeError::from_phase(Phase::DepCacheBuild, e))?;
    graph.advance(GraphStage::Resolved);

    debug!(
        "Resolved {} packages from {} via {}",
        graph.len(),
        graph.source(),
        engine.name()
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ScriptStep, ScriptedEngine};
    use crate::graph::{PackageNode, ResolvedState};

    #[test]
    fn phases_run_in_order_and_resolve() {
        let mut engine = ScriptedEngine::new().with_package(
            PackageNode::new("tzdata")
                .with_installed("2024a")
                .with_candidate("2024b")
                .with_state(ResolvedState::Install),
        );
        let handle = engine.handle();
        let graph = build_upgrade_graph(&mut engine, &Diagnostics::new()).unwrap();
        assert_eq!(graph.stage(), GraphStage::Resolved);
        assert_eq!(graph.counts().install, 1);
        assert_eq!(handle.calls(ScriptStep::Open), 1);
        assert_eq!(handle.calls(ScriptStep::BuildIndex), 1);
        assert_eq!(handle.calls(ScriptStep::ResolveUpgrade), 1);
    }

    #[test]
    fn each_phase_maps_to_its_error() {
        let cases = [
            (ScriptStep::Open, Phase::CacheOpen, 0, 0),
            (ScriptStep::BuildIndex, Phase::CacheBuild, 1, 0),
            (ScriptStep::ResolveUpgrade, Phase::DepCacheBuild, 1, 1),
        ];
        for (step, phase, index_calls, resolve_calls) in cases {
            let mut engine = ScriptedEngine::new().failing_at(step);
            let handle = engine.handle();
            let err = build_upgrade_graph(&mut engine, &Diagnostics::new()).unwrap_err();
            assert_eq!(err.phase(), Some(phase));
            assert!(!err.is_terminal());
            assert_eq!(handle.calls(ScriptStep::BuildIndex), index_calls);
            assert_eq!(handle.calls(ScriptStep::ResolveUpgrade), resolve_calls);
        }
    }
}
