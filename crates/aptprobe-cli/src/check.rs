//! Monitoring-plugin style health check: update freshness, pending reboot
//! and the upgrade summary folded into one status line.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use aptprobe_core::{ChangeAction, CheckConfig, PackageChange, ProbeError, UpgradeSummary};
use serde::Serialize;

const UPDATE_STAMP: &str = "var/lib/apt/periodic/update-success-stamp";
const REBOOT_REQUIRED: &str = "var/run/reboot-required";

/// Declared in order of severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    #[default]
    Ok,
    Unknown,
    Warning,
    Critical,
}

impl CheckStatus {
    /// Raise the status; never lowers it.
    pub fn update(&mut self, status: CheckStatus) {
        if status > *self {
            *self = status;
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Unknown => "UNKNOWN",
            CheckStatus::Warning => "WARNING",
            CheckStatus::Critical => "CRITICAL",
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            CheckStatus::Ok => "no problems detected",
            CheckStatus::Unknown => "unable to perform check",
            CheckStatus::Warning => "minor problems detected",
            CheckStatus::Critical => "major problems detected",
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            CheckStatus::Ok => 0,
            CheckStatus::Warning => 1,
            CheckStatus::Critical => 2,
            CheckStatus::Unknown => 3,
        }
    }
}

#[derive(Debug, Default)]
pub struct CheckResultBuilder {
    status: CheckStatus,
    messages: Vec<String>,
    extra_information: Vec<String>,
}

impl CheckResultBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, status: CheckStatus, message: impl Into<String>) {
        self.messages.push(message.into());
        self.status.update(status);
    }

    pub fn ok(&mut self, message: impl Into<String>) {
        self.push(CheckStatus::Ok, message);
    }

    pub fn unknown(&mut self, message: impl Into<String>) {
        self.push(CheckStatus::Unknown, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(CheckStatus::Warning, message);
    }

    pub fn critical(&mut self, message: impl Into<String>) {
        self.push(CheckStatus::Critical, message);
    }

    pub fn extra_information(&mut self, line: impl Into<String>) {
        self.extra_information.push(line.into());
    }

    pub fn build(self, prefix: &str) -> CheckResult {
        let status = self.status;
        let message = if self.messages.is_empty() {
            status.default_message().to_string()
        } else {
            self.messages.join(", ")
        };
        CheckResult {
            prefix: prefix.to_string(),
            status,
            message,
            extra_information: self.extra_information,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub prefix: String,
    pub status: CheckStatus,
    pub message: String,
    pub extra_information: Vec<String>,
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.prefix, self.status.as_str(), self.message)?;
        for line in &self.extra_information {
            write!(f, "\n{}", line)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Thresholds {
    pub warning: Option<Duration>,
    pub critical: Option<Duration>,
}

impl Thresholds {
    pub fn from_hours(warning: Option<u64>, critical: Option<u64>) -> Self {
        Self {
            warning: warning.map(hours),
            critical: critical.map(hours),
        }
    }

    fn grade(&self, age: Duration) -> Option<(CheckStatus, Duration)> {
        if let Some(limit) = self.critical.filter(|limit| age > *limit) {
            return Some((CheckStatus::Critical, limit));
        }
        self.warning
            .filter(|limit| age > *limit)
            .map(|limit| (CheckStatus::Warning, limit))
    }
}

fn hours(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(3600))
}

fn as_hours(duration: Duration) -> u64 {
    duration.as_secs() / 3600
}

#[derive(Debug, Clone, Default)]
pub struct AptCheck {
    pub root_filesystem: Option<PathBuf>,
    pub update: Thresholds,
    pub reboot: Thresholds,
    /// Print each pending change below the status line
    pub list_changes: bool,
}

impl AptCheck {
    pub fn from_config(config: &CheckConfig, root_filesystem: Option<PathBuf>) -> Self {
        Self {
            root_filesystem,
            update: Thresholds::from_hours(
                config.update_warning_hours,
                config.update_critical_hours,
            ),
            reboot: Thresholds::from_hours(
                config.reboot_warning_hours,
                config.reboot_critical_hours,
            ),
            list_changes: false,
        }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root_filesystem
            .as_deref()
            .unwrap_or_else(|| Path::new("/"))
            .join(relative)
    }

    /// Run every check. `upgrades` is the outcome of the upgrade
    /// simulation; `changes` are listed as extra output lines.
    pub fn perform(
        &self,
        upgrades: Result<UpgradeSummary, ProbeError>,
        changes: &[PackageChange],
    ) -> CheckResult {
        let mut builder = CheckResultBuilder::new();

        if let Err(e) = self.check_last_update(&mut builder) {
            builder.unknown(format!("error checking last update: {}", e));
        }
        if let Err(e) = self.check_reboot_required(&mut builder) {
            builder.unknown(format!("error checking reboot recommendation: {}", e));
        }
        check_package_upgrades(upgrades, changes, &mut builder);

        if self.list_changes {
            for change in changes {
                builder.extra_information(format_change(change));
            }
        }

        builder.build("APT")
    }

    fn check_last_update(&self, builder: &mut CheckResultBuilder) -> io::Result<()> {
        match file_age_if_exists(&self.path(UPDATE_STAMP))? {
            Some(age) => match self.update.grade(age) {
                Some((CheckStatus::Critical, limit)) => builder.critical(format!(
                    "last update {} hours ago (critical is {})",
                    as_hours(age),
                    as_hours(limit)
                )),
                Some((_, limit)) => builder.warning(format!(
                    "last update {} hours ago (warning is {})",
                    as_hours(age),
                    as_hours(limit)
                )),
                None => builder.ok(format!("last update {} hours ago", as_hours(age))),
            },
            None => {
                let message = "no record of successful update";
                if self.update.critical.is_some() {
                    builder.critical(message);
                } else if self.update.warning.is_some() {
                    builder.warning(message);
                } else {
                    builder.ok(message);
                }
            }
        }
        Ok(())
    }

    fn check_reboot_required(&self, builder: &mut CheckResultBuilder) -> io::Result<()> {
        let Some(age) = file_age_if_exists(&self.path(REBOOT_REQUIRED))? else {
            return Ok(());
        };
        match self.reboot.grade(age) {
            Some((CheckStatus::Critical, limit)) => builder.critical(format!(
                "reboot recommended for {} hours (critical is {})",
                as_hours(age),
                as_hours(limit)
            )),
            Some((_, limit)) => builder.warning(format!(
                "reboot recommended for {} hours (warning is {})",
                as_hours(age),
                as_hours(limit)
            )),
            None => builder.ok(format!("reboot recommended for {} hours", as_hours(age))),
        }
        Ok(())
    }
}

/// Kept packages never raise the status; everything else that would change
/// does.
/// `changes` splits the install counter into upgrades of installed packages
/// and new installs. Without them the two are reported together.
pub fn check_package_upgrades(
    upgrades: Result<UpgradeSummary, ProbeError>,
    changes: &[PackageChange],
    builder: &mut CheckResultBuilder,
) {
    let summary = match upgrades {
        Ok(summary) => summary,
        Err(e) => {
            builder.unknown(format!("error checking package upgrades: {}", e));
            return;
        }
    };

    let total = summary
        .install
        .saturating_add(summary.remove)
        .saturating_add(summary.broken)
        .saturating_add(summary.bad);
    if total == 0 {
        builder.ok("no packages need upgrading");
        return;
    }

    if summary.install > 0 && changes.is_empty() {
        builder.warning(format!(
            "{} packages would be installed or upgraded",
            summary.install
        ));
    } else if summary.install > 0 {
        let upgrading = changes
            .iter()
            .filter(|change| change.action == ChangeAction::Upgrade)
            .count() as u64;
        let upgrading = upgrading.min(summary.install);
        let installing = summary.install - upgrading;
        if upgrading > 0 {
            builder.warning(format!("{} packages need upgrading", upgrading));
        }
        if installing > 0 {
            builder.warning(format!("{} packages need installing", installing));
        }
    }
    if summary.remove > 0 {
        builder.warning(format!("{} packages can be removed", summary.remove));
    }
    if summary.broken > 0 {
        builder.critical(format!("{} packages are broken", summary.broken));
    }
    if summary.bad > 0 {
        builder.critical(format!("{} packages failed to install", summary.bad));
    }
}

fn format_change(change: &PackageChange) -> String {
    match (&change.from, &change.to) {
        (Some(from), Some(to)) => format!(
            "{} {} ({} -> {})",
            change.action.as_str(),
            change.name,
            from,
            to
        ),
        (None, Some(version)) | (Some(version), None) => {
            format!("{} {} ({})", change.action.as_str(), change.name, version)
        }
        (None, None) => format!("{} {}", change.action.as_str(), change.name),
    }
}

/// Time since `path` was last modified, or `None` if it does not exist.
/// A modification time in the future counts as zero.
pub fn file_age_if_exists(path: &Path) -> io::Result<Option<Duration>> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let modified = metadata.modified()?;
    Ok(Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aptprobe_core::{Counters, EngineError, Phase};
    use std::fs::File;
    use tempfile::TempDir;

    fn summary(install: u64, remove: u64, broken: u64, bad: u64) -> UpgradeSummary {
        UpgradeSummary::from_counters(Counters {
            upgrade: 250,
            remove,
            install,
            broken,
            bad,
        })
    }

    fn touch(root: &Path, relative: &str, age_hours: u64) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - hours(age_hours) - Duration::from_secs(60))
            .unwrap();
    }

    #[test]
    fn status_only_rises() {
        let mut status = CheckStatus::Ok;
        status.update(CheckStatus::Warning);
        status.update(CheckStatus::Unknown);
        assert_eq!(status, CheckStatus::Warning);
        status.update(CheckStatus::Critical);
        status.update(CheckStatus::Ok);
        assert_eq!(status, CheckStatus::Critical);
    }

    #[test]
    fn default_message_when_nothing_reported() {
        let result = CheckResultBuilder::new().build("APT");
        assert_eq!(result.to_string(), "APT OK: no problems detected");
        assert_eq!(result.status.exit_code(), 0);
    }

    #[test]
    fn kept_packages_alone_are_ok() {
        let mut builder = CheckResultBuilder::new();
        check_package_upgrades(Ok(summary(0, 0, 0, 0)), &[], &mut builder);
        let result = builder.build("APT");
        assert_eq!(result.status, CheckStatus::Ok);
        assert_eq!(result.message, "no packages need upgrading");
    }

    #[test]
    fn pending_changes_grade_by_kind() {
        let mut builder = CheckResultBuilder::new();
        check_package_upgrades(Ok(summary(12, 2, 0, 0)), &[], &mut builder);
        let result = builder.build("APT");
        assert_eq!(result.status, CheckStatus::Warning);
        assert_eq!(
            result.message,
            "12 packages would be installed or upgraded, 2 packages can be removed"
        );

        let mut builder = CheckResultBuilder::new();
        check_package_upgrades(Ok(summary(0, 0, 1, 3)), &[], &mut builder);
        let result = builder.build("APT");
        assert_eq!(result.status, CheckStatus::Critical);
        assert_eq!(result.status.exit_code(), 2);
        assert_eq!(
            result.message,
            "1 packages are broken, 3 packages failed to install"
        );
    }

    fn change(name: &str, from: Option<&str>, action: ChangeAction) -> PackageChange {
        PackageChange {
            name: name.to_string(),
            from: from.map(str::to_string),
            to: Some("2.0".to_string()),
            action,
        }
    }

    #[test]
    fn new_installs_are_not_reported_as_upgrades() {
        let changes = [
            change("openssl:amd64", Some("1.0"), ChangeAction::Upgrade),
            change("linux-image-6.1.0-18-amd64:amd64", None, ChangeAction::Install),
            change("linux-headers-6.1.0-18-amd64:amd64", None, ChangeAction::Install),
        ];
        let mut builder = CheckResultBuilder::new();
        check_package_upgrades(Ok(summary(3, 0, 0, 0)), &changes, &mut builder);
        let result = builder.build("APT");
        assert_eq!(result.status, CheckStatus::Warning);
        assert_eq!(
            result.message,
            "1 packages need upgrading, 2 packages need installing"
        );

        let mut builder = CheckResultBuilder::new();
        check_package_upgrades(Ok(summary(1, 0, 0, 0)), &changes[1..2], &mut builder);
        assert_eq!(builder.build("APT").message, "1 packages need installing");
    }

    #[test]
    fn summary_failure_is_unknown() {
        let mut builder = CheckResultBuilder::new();
        let err = ProbeError::from_phase(Phase::CacheOpen, EngineError::new("locked"));
        check_package_upgrades(Err(err), &[], &mut builder);
        let result = builder.build("APT");
        assert_eq!(result.status, CheckStatus::Unknown);
        assert_eq!(result.status.exit_code(), 3);
        assert!(result.message.starts_with("error checking package upgrades"));
    }

    #[test]
    fn missing_update_stamp_graded_by_thresholds() {
        let dir = TempDir::new().unwrap();
        let mut check = AptCheck {
            root_filesystem: Some(dir.path().to_path_buf()),
            ..AptCheck::default()
        };
        let result = check.perform(Ok(summary(0, 0, 0, 0)), &[]);
        assert_eq!(
            result.to_string(),
            "APT OK: no record of successful update, no packages need upgrading"
        );

        check.update = Thresholds::from_hours(Some(24), None);
        let result = check.perform(Ok(summary(0, 0, 0, 0)), &[]);
        assert_eq!(result.status, CheckStatus::Warning);
    }

    #[test]
    fn stale_update_and_pending_reboot() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), UPDATE_STAMP, 30);
        touch(dir.path(), REBOOT_REQUIRED, 5);

        let check = AptCheck::from_config(
            &CheckConfig {
                update_warning_hours: Some(24),
                update_critical_hours: Some(48),
                reboot_warning_hours: Some(2),
                reboot_critical_hours: Some(4),
            },
            Some(dir.path().to_path_buf()),
        );
        let result = check.perform(Ok(summary(0, 0, 0, 0)), &[]);
        assert_eq!(result.status, CheckStatus::Critical);
        assert_eq!(
            result.message,
            "last update 30 hours ago (warning is 24), \
             reboot recommended for 5 hours (critical is 4), \
             no packages need upgrading"
        );
    }

    #[test]
    fn changes_become_extra_lines() {
        let check = AptCheck {
            root_filesystem: Some(TempDir::new().unwrap().path().to_path_buf()),
            list_changes: true,
            ..AptCheck::default()
        };
        let changes = [
            PackageChange {
                name: "openssl:amd64".to_string(),
                from: Some("3.0.11".to_string()),
                to: Some("3.0.13".to_string()),
                action: ChangeAction::Upgrade,
            },
            PackageChange {
                name: "python2.7".to_string(),
                from: Some("2.7.18".to_string()),
                to: None,
                action: ChangeAction::Remove,
            },
        ];
        let result = check.perform(Ok(summary(1, 1, 0, 0)), &changes);
        let text = result.to_string();
        let mut lines = text.lines().skip(1);
        assert_eq!(lines.next(), Some("upgrade openssl:amd64 (3.0.11 -> 3.0.13)"));
        assert_eq!(lines.next(), Some("remove python2.7 (2.7.18)"));

        let quiet = AptCheck {
            list_changes: false,
            ..check
        };
        let result = quiet.perform(Ok(summary(1, 1, 0, 0)), &changes);
        assert_eq!(result.to_string().lines().count(), 1);
        assert!(result.message.contains("1 packages need upgrading"));
    }
}
