//! aptprobe core: answers "what would an upgrade do right now?" without
//! performing it.
//!
//! The crate owns the initialization state machine, the three-phase cache
//! build pipeline and the fixed-layout [`UpgradeSummary`] record. The
//! dependency engine itself is reached through the [`DependencyEngine`]
//! capability trait so the pipeline can run against the system tooling or
//! a scripted stand-in.

pub mod config;
pub mod context;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod state;
pub mod summary;

pub use config::{
    CheckConfig, ConfigError, ConfigManager, EngineConfig, LoggingConfig, ProbeConfig,
    UpgradeMode, CONFIG_PATH_ENV,
};
pub use context::{ChangeReport, ProbeContext};
pub use diagnostics::Diagnostics;
pub use engine::{
    DependencyEngine, ScriptHandle, ScriptStep, ScriptedEngine, Snapshot, SnapshotEngine,
};
pub use error::{EngineError, EngineResult, InitFailure, Phase, ProbeError, Result};
pub use graph::{
    ChangeAction, Changes, GraphStage, PackageChange, PackageGraph, PackageNode, ResolvedState,
};
pub use state::InitState;
pub use summary::{
    Counters, UpgradeSummary, RESERVED_SLOTS, UPGRADE_SUMMARY_ABI_VERSION, UPGRADE_SUMMARY_SIZE,
};
