use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use aptprobe_core::{
    DependencyEngine, EngineConfig, EngineError, EngineResult, PackageGraph, PackageNode,
    ResolvedState, UpgradeMode,
};
use tracing::{debug, info, warn};

use crate::options::{parse_config_dump, AptOptions};
use crate::simulate::{parse_simulation, SimAction};
use crate::status::{parse_status, StatusEntry};

/// Engine driving `apt-config` and `apt-get --simulate`.
#[derive(Debug, Clone)]
pub struct AptEngine {
    apt_get: String,
    apt_config: String,
    mode: UpgradeMode,
    options: AptOptions,
    dumped: BTreeMap<String, String>,
    status_path: Option<PathBuf>,
    status_text: Option<String>,
}

impl Default for AptEngine {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl AptEngine {
    pub fn new(apt_get: impl Into<String>, apt_config: impl Into<String>) -> Self {
        Self {
            apt_get: apt_get.into(),
            apt_config: apt_config.into(),
            mode: UpgradeMode::default(),
            options: AptOptions::new(),
            dumped: BTreeMap::new(),
            status_path: None,
            status_text: None,
        }
    }

    /// Build from configuration. `root_filesystem` and the option table are
    /// preloaded as APT options.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut engine = Self::new(config.apt_get.clone(), config.apt_config.clone())
            .with_mode(config.upgrade_mode);
        for (name, value) in config.engine_options() {
            engine.options.set(&name, &value);
        }
        engine
    }

    pub fn with_mode(mut self, mode: UpgradeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> UpgradeMode {
        self.mode
    }

    pub fn options(&self) -> &AptOptions {
        &self.options
    }

    /// Values reported by `apt-config dump` during initialization.
    pub fn loaded_config(&self) -> &BTreeMap<String, String> {
        &self.dumped
    }

    pub fn status_path(&self) -> Option<&Path> {
        self.status_path.as_deref()
    }

    fn run(&self, program: &str, tail: &[&str]) -> EngineResult<Output> {
        let mut command = Command::new(program);
        command.args(self.options.to_args()).args(tail).env("LC_ALL", "C");
        debug!("Running {} {:?}", program, tail);

        command.output().map_err(|e| {
            EngineError::with_source(format!("failed to run {}: {}", program, e), e)
        })
    }
}

fn stderr_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        output.status.to_string()
    } else {
        stderr.to_string()
    }
}

/// A package the status database does not know about yet.
fn node_for_key(key: &str) -> PackageNode {
    match key.split_once(':') {
        Some((name, arch)) => PackageNode::new(name).with_architecture(arch),
        None => PackageNode::new(key),
    }
}

impl DependencyEngine for AptEngine {
    fn name(&self) -> &str {
        "apt"
    }

    fn set_config(&mut self, name: &str, value: &str) {
        self.options.set(name, value);
    }

    fn init_config(&mut self) -> EngineResult<()> {
        let output = self.run(&self.apt_config, &["dump"])?;
        if !output.status.success() {
            return Err(EngineError::new(format!(
                "{} dump failed: {}",
                self.apt_config,
                stderr_text(&output)
            )));
        }
        self.dumped = parse_config_dump(&String::from_utf8_lossy(&output.stdout));
        debug!("Loaded {} APT configuration values", self.dumped.len());
        Ok(())
    }

    fn init_system(&mut self) -> EngineResult<()> {
        let path = self.options.status_path(&self.dumped);
        let metadata = fs::metadata(&path).map_err(|e| {
            EngineError::with_source(
                format!("dpkg status database {} unavailable: {}", path.display(), e),
                e,
            )
        })?;
        if !metadata.is_file() {
            return Err(EngineError::new(format!(
                "dpkg status database {} is not a file",
                path.display()
            )));
        }
        info!("Using dpkg status database {}", path.display());
        self.status_path = Some(path);
        Ok(())
    }

    fn open(&mut self) -> EngineResult<PackageGraph> {
        let path = self
            .status_path
            .as_ref()
            .ok_or_else(|| EngineError::new("packaging system not initialized"))?;
        let text = fs::read_to_string(path).map_err(|e| {
            EngineError::with_source(format!("cannot read {}: {}", path.display(), e), e)
        })?;
        let graph = PackageGraph::new(path.display().to_string());
        self.status_text = Some(text);
        Ok(graph)
    }

    fn build_index(&mut self, graph: &mut PackageGraph) -> EngineResult<()> {
        let text = self
            .status_text
            .take()
            .ok_or_else(|| EngineError::new("package cache was not opened"))?;
        let entries = parse_status(&text).map_err(|e| {
            EngineError::with_source(format!("{}: {}", graph.source(), e), e)
        })?;
        for entry in entries {
            graph.insert(StatusEntry::into_node(entry));
        }
        debug!("Indexed {} packages", graph.len());
        Ok(())
    }

    fn resolve_upgrade(&mut self, graph: &mut PackageGraph) -> EngineResult<()> {
        let output = self.run(&self.apt_get, &["-s", "-q", self.mode.as_str()])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let simulation = parse_simulation(&stdout);

        if !output.status.success() {
            if simulation.broken.is_empty() {
                return Err(EngineError::new(format!(
                    "{} -s {} failed: {}",
                    self.apt_get,
                    self.mode,
                    stderr_text(&output)
                )));
            }
            warn!(
                "Upgrade simulation left {} packages with unmet dependencies",
                simulation.broken.len()
            );
        }

        for action in &simulation.actions {
            let key = action.key();
            match action {
                SimAction::Install { to, .. } => match graph.get_mut(&key) {
                    Some(node) => {
                        node.state = ResolvedState::Install;
                        if let Some(version) = to {
                            node.candidate_version = Some(version.clone());
                        }
                    }
                    None => {
                        let mut node = node_for_key(&key).with_state(ResolvedState::Install);
                        node.candidate_version = to.clone();
                        graph.insert(node);
                    }
                },
                SimAction::Remove { .. } => match graph.get_mut(&key) {
                    Some(node) => node.state = ResolvedState::Remove,
                    None => warn!("Simulation removes unknown package {}", key),
                },
            }
        }

        for name in &simulation.broken {
            match graph.get_mut(name) {
                Some(node) => node.state = ResolvedState::Broken,
                None => {
                    graph.insert(node_for_key(name).with_state(ResolvedState::Broken));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_filesystem_becomes_dir_option() {
        let config = EngineConfig {
            root_filesystem: Some(PathBuf::from("/srv/guest")),
            upgrade_mode: UpgradeMode::DistUpgrade,
            ..EngineConfig::default()
        };
        let engine = AptEngine::from_config(&config);
        assert_eq!(engine.options().get("Dir"), Some("/srv/guest"));
        assert_eq!(engine.mode(), UpgradeMode::DistUpgrade);
    }

    #[test]
    fn missing_program_fails_config_init() {
        let mut engine = AptEngine::new("apt-get", "/nonexistent/aptprobe/apt-config");
        let err = engine.init_config().unwrap_err();
        assert!(err.message().contains("failed to run"));
    }

    #[test]
    fn open_requires_system_init() {
        let mut engine = AptEngine::default();
        assert!(engine.open().is_err());
    }
}
