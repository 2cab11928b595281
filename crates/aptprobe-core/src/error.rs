use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;

/// The fallible steps between "uninitialized" and "summary written".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    ConfigInit,
    SystemInit,
    CacheOpen,
    CacheBuild,
    DepCacheBuild,
}

impl Phase {
    /// Initialization phases latch the process into the failed state;
    /// cache phases only fail the current call.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::ConfigInit | Phase::SystemInit)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::ConfigInit => "config-init",
            Phase::SystemInit => "system-init",
            Phase::CacheOpen => "cache-open",
            Phase::CacheBuild => "cache-build",
            Phase::DepCacheBuild => "dep-cache-build",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a [`crate::DependencyEngine`] step.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(err.to_string(), err)
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Payload of the latched failure state. Cloneable so every later call can
/// report the original cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitFailure {
    pub phase: Phase,
    pub message: String,
}

impl fmt::Display for InitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.phase, self.message)
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Configuration initialization failed: {0}")]
    ConfigInit(#[source] EngineError),

    #[error("System initialization failed: {0}")]
    SystemInit(#[source] EngineError),

    #[error("Opening the package cache failed: {0}")]
    CacheOpen(#[source] EngineError),

    #[error("Building the package caches failed: {0}")]
    CacheBuild(#[source] EngineError),

    #[error("Building the dependency cache failed: {0}")]
    DepCacheBuild(#[source] EngineError),

    #[error("Initialization previously failed ({0}); restart the process to retry")]
    InitializationLatched(InitFailure),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ProbeError {
    /// Build the error for a failed engine step.
    pub fn from_phase(phase: Phase, err: EngineError) -> Self {
        match phase {
            Phase::ConfigInit => ProbeError::ConfigInit(err),
            Phase::SystemInit => ProbeError::SystemInit(err),
            Phase::CacheOpen => ProbeError::CacheOpen(err),
            Phase::CacheBuild => ProbeError::CacheBuild(err),
            Phase::DepCacheBuild => ProbeError::DepCacheBuild(err),
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            ProbeError::ConfigInit(_) => Some(Phase::ConfigInit),
            ProbeError::SystemInit(_) => Some(Phase::SystemInit),
            ProbeError::CacheOpen(_) => Some(Phase::CacheOpen),
            ProbeError::CacheBuild(_) => Some(Phase::CacheBuild),
            ProbeError::DepCacheBuild(_) => Some(Phase::DepCacheBuild),
            ProbeError::InitializationLatched(failure) => Some(failure.phase),
            _ => None,
        }
    }

    /// True when the failure is (or stems from) a latched initialization
    /// failure. Such errors will repeat until the process restarts.
    pub fn is_terminal(&self) -> bool {
        self.phase().map(Phase::is_terminal).unwrap_or(false)
    }
}

pub type Result<T> = std::result::Result<T, ProbeError>;
