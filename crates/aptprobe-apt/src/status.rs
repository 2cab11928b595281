//! dpkg status database parsing.

use aptprobe_core::PackageNode;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StatusError {
    #[error("stanza ending at line {line} has no Package field")]
    MissingPackage { line: usize },

    #[error("malformed field at line {line}: {text}")]
    MalformedField { line: usize, text: String },
}

/// One package stanza from the status file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusEntry {
    pub package: String,
    pub architecture: Option<String>,
    pub version: Option<String>,
    /// Selection state: install, hold, deinstall, purge, unknown
    pub want: String,
    /// ok or reinstreq
    pub flag: String,
    /// Package state: installed, config-files, half-installed, ...
    pub status: String,
}

impl StatusEntry {
    /// Package files are present on disk in some form.
    pub fn has_files(&self) -> bool {
        !matches!(self.status.as_str(), "not-installed" | "config-files" | "")
    }

    /// Stuck part way through an install, or marked as needing reinstall.
    pub fn is_problematic(&self) -> bool {
        self.flag == "reinstreq"
            || matches!(
                self.status.as_str(),
                "half-installed"
                    | "unpacked"
                    | "half-configured"
                    | "triggers-awaited"
                    | "triggers-pending"
            )
    }

    pub fn into_node(self) -> PackageNode {
        let problematic = self.is_problematic();
        let installed = if self.has_files() { self.version } else { None };
        let mut node = PackageNode::new(self.package);
        if let Some(arch) = self.architecture {
            node = node.with_architecture(arch);
        }
        if let Some(version) = installed {
            node = node.with_installed(version.clone()).with_candidate(version);
        }
        if problematic {
            node = node.flagged();
        }
        node
    }
}

pub fn parse_status(text: &str) -> Result<Vec<StatusEntry>, StatusError> {
    let mut entries = Vec::new();
    let mut current: Option<StatusEntry> = None;
    let mut seen_fields = false;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;

        if raw.trim().is_empty() {
            if seen_fields {
                entries.push(finish(current.take(), line_no)?);
                seen_fields = false;
            }
            continue;
        }

        // Continuation of a multi-line field (Description, Conffiles, ...)
        if raw.starts_with(' ') || raw.starts_with('\t') {
            if !seen_fields {
                return Err(StatusError::MalformedField {
                    line: line_no,
                    text: raw.to_string(),
                });
            }
            continue;
        }

        let Some((name, value)) = raw.split_once(':') else {
            return Err(StatusError::MalformedField {
                line: line_no,
                text: raw.to_string(),
            });
        };
        seen_fields = true;
        let value = value.trim();
        let entry = current.get_or_insert_with(StatusEntry::default);

        match name {
            "Package" => entry.package = value.to_string(),
            "Architecture" => entry.architecture = Some(value.to_string()),
            "Version" => entry.version = Some(value.to_string()),
            "Status" => {
                let mut words = value.split_whitespace();
                entry.want = words.next().unwrap_or_default().to_string();
                entry.flag = words.next().unwrap_or_default().to_string();
                entry.status = words.next().unwrap_or_default().to_string();
            }
            _ => {}
        }
    }

    if seen_fields {
        entries.push(finish(current.take(), text.lines().count())?);
    }
    Ok(entries)
}

fn finish(entry: Option<StatusEntry>, line: usize) -> Result<StatusEntry, StatusError> {
    match entry {
        Some(entry) if !entry.package.is_empty() => Ok(entry),
        _ => Err(StatusError::MissingPackage { line }),
    }
}
