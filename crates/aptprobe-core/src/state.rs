use tracing::info;

use crate::diagnostics::Diagnostics;
use crate::engine::DependencyEngine;
use crate::error::{EngineError, InitFailure, Phase, ProbeError, Result};

/// Engine initialization lifecycle.
///
/// `Uninitialized` moves to exactly one of the two terminal states and never
/// leaves it. A failed initialization can have left the engine's global
/// configuration half-built, so there is no retry in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InitState {
    #[default]
    Uninitialized,
    Initialized,
    Failed(InitFailure),
}

impl InitState {
    pub fn is_initialized(&self) -> bool {
        matches!(self, InitState::Initialized)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, InitState::Failed(_))
    }

    pub fn failure(&self) -> Option<&InitFailure> {
        match self {
            InitState::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Run initialization if it has not run yet.
    ///
    /// Both terminal states return without touching the engine or the
    /// diagnostics channel.
    pub fn ensure<E>(&mut self, engine: &mut E, diagnostics: &mut Diagnostics) -> Result<()>
    where
        E: DependencyEngine + ?Sized,
    {
        match self {
            InitState::Initialized => return Ok(()),
            InitState::Failed(failure) => {
                return Err(ProbeError::InitializationLatched(failure.clone()))
            }
            InitState::Uninitialized => {}
        }

        diagnostics.trace("initialize");

        diagnostics.trace("  init config");
        if let Err(err) = engine.init_config() {
            return Err(self.latch(Phase::ConfigInit, err, diagnostics));
        }

        diagnostics.trace("  init system");
        if let Err(err) = engine.init_system() {
            return Err(self.latch(Phase::SystemInit, err, diagnostics));
        }

        info!("Dependency engine '{}' initialized", engine.name());
        *self = InitState::Initialized;
        Ok(())
    }

    fn latch(
        &mut self,
        phase: Phase,
        err: EngineError,
        diagnostics: &mut Diagnostics,
    ) -> ProbeError {
        diagnostics.trace("  error");
        *self = InitState::Failed(InitFailure {
            phase,
            message: err.message().to_string(),
        });
        let err = ProbeError::from_phase(phase, err);
        diagnostics.record_error(err.to_string());
        err
    }
}
