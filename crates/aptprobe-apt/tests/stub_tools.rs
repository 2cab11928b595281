//! Drives `AptEngine` against shell stand-ins for `apt-config` and
//! `apt-get` written into a temporary directory.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use aptprobe_apt::AptEngine;
use aptprobe_core::{
    Counters, DependencyEngine, EngineConfig, Phase, ProbeContext, ResolvedState, UpgradeMode,
    UpgradeSummary,
};
use parking_lot::{Mutex, MutexGuard};
use tempfile::TempDir;

// Writing an executable while another test thread forks can make exec fail
// with ETXTBSY, so fixtures run one at a time.
static SERIAL: Mutex<()> = Mutex::new(());

const STATUS: &str = "\
Package: bash
Status: install ok installed
Architecture: amd64
Version: 5.2.15-2+b2

Package: libssl3
Status: install ok installed
Architecture: amd64
Version: 3.0.11-1~deb12u1

Package: python2.7
Status: install ok installed
Architecture: amd64
Version: 2.7.18-8

Package: stuck
Status: install reinstreq half-installed
Architecture: amd64
Version: 0.1-1

Package: leftover
Status: deinstall ok config-files
Architecture: all
Version: 1.0
";

const UPGRADE_OUTPUT: &str = "\
NOTE: This is only a simulation!
Reading package lists...
Building dependency tree...
Calculating upgrade...
Inst libssl3 [3.0.11-1~deb12u1] (3.0.11-1~deb12u2 Debian:12.5/stable [amd64])
Inst linux-image-6.1.0-18-amd64 (6.1.76-1 Debian-Security:12/stable-security [amd64])
Remv python2.7 [2.7.18-8]
Conf libssl3 (3.0.11-1~deb12u2 Debian:12.5/stable [amd64])
";

const UNMET_OUTPUT: &str = "\
Some packages could not be installed.
The following packages have unmet dependencies:
 bash : Depends: libc6 (>= 2.38) but 2.36-9 is to be installed
";

struct Fixture {
    dir: TempDir,
    _serial: MutexGuard<'static, ()>,
}

impl Fixture {
    fn new() -> Self {
        let serial = SERIAL.lock();
        let dir = TempDir::new().unwrap();
        let status = dir.path().join("status");
        fs::write(&status, STATUS).unwrap();
        let fixture = Self {
            dir,
            _serial: serial,
        };
        fixture.config_dump(&status);
        fixture.simulation(UPGRADE_OUTPUT, 0);
        fixture
    }

    fn config_dump(&self, status: &Path) {
        self.tool(
            "apt-config",
            &format!(
                "echo \"$@\" > \"{}\"\ncat <<'OUT'\nDir \"/\";\nDir::State::status \"{}\";\nOUT\n",
                self.path("apt-config.args").display(),
                status.display()
            ),
        );
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn tool(&self, name: &str, body: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn simulation(&self, stdout: &str, code: i32) {
        let output = self.path("apt-get.out");
        fs::write(&output, stdout).unwrap();
        self.tool(
            "apt-get",
            &format!(
                "echo \"$@\" > \"{}\"\ncat \"{}\"\necho 'E: simulated failure' >&2\nexit {}\n",
                self.path("apt-get.args").display(),
                output.display(),
                code
            ),
        );
    }

    fn engine(&self) -> AptEngine {
        AptEngine::new(
            self.path("apt-get").display().to_string(),
            self.path("apt-config").display().to_string(),
        )
    }

    fn args(&self, tool: &str) -> String {
        fs::read_to_string(self.path(&format!("{}.args", tool))).unwrap_or_default()
    }
}

fn assert_exists(path: &Path) {
    assert!(path.exists(), "{} missing", path.display());
}

#[test]
fn test_summary_from_simulation() {
    let fixture = Fixture::new();
    let mut ctx = ProbeContext::new(fixture.engine());

    let summary = ctx.upgrade_summary().unwrap();
    assert_eq!(
        summary.counters(),
        Counters {
            upgrade: 2,
            remove: 1,
            install: 2,
            broken: 0,
            bad: 1,
        }
    );
    assert!(summary.reserved_is_zero());
    assert_eq!(fixture.args("apt-get").trim(), "-s -q upgrade");
}

#[test]
fn test_changes_carry_versions() {
    let fixture = Fixture::new();
    let mut ctx = ProbeContext::new(fixture.engine());
    let report = ctx.package_changes().unwrap();

    let libssl = report
        .iter()
        .find(|change| change.name == "libssl3:amd64")
        .unwrap();
    assert_eq!(libssl.from.as_deref(), Some("3.0.11-1~deb12u1"));
    assert_eq!(libssl.to.as_deref(), Some("3.0.11-1~deb12u2"));

    let kernel = report
        .graph()
        .get("linux-image-6.1.0-18-amd64")
        .unwrap();
    assert_eq!(kernel.state, ResolvedState::Install);
    assert!(!kernel.is_installed());
}

#[test]
fn test_foreign_arch_install_leaves_native_package_alone() {
    let fixture = Fixture::new();
    fixture.simulation(
        "Inst libssl3:i386 (3.0.11-1~deb12u2 Debian:12.5/stable [i386])\n",
        0,
    );
    let mut ctx = ProbeContext::new(fixture.engine());
    let report = ctx.package_changes().unwrap();

    let counts = report.counts();
    assert_eq!(counts.upgrade, 4, "native packages are all kept");
    assert_eq!(counts.install, 1);

    let native = report.graph().get("libssl3:amd64").unwrap();
    assert_eq!(native.state, ResolvedState::Keep);
    assert_eq!(native.candidate_version.as_deref(), Some("3.0.11-1~deb12u1"));

    let foreign = report.graph().get("libssl3:i386").unwrap();
    assert_eq!(foreign.architecture.as_deref(), Some("i386"));
    assert_eq!(foreign.state, ResolvedState::Install);
    assert!(!foreign.is_installed());
}

#[test]
fn test_options_reach_both_tools() {
    let fixture = Fixture::new();
    let mut ctx = ProbeContext::new(fixture.engine().with_mode(UpgradeMode::DistUpgrade));
    ctx.set_config("APT::Get::Show-Versions", "true");

    ctx.upgrade_summary().unwrap();
    assert_eq!(
        fixture.args("apt-config").trim(),
        "-o APT::Get::Show-Versions=true dump"
    );
    assert_eq!(
        fixture.args("apt-get").trim(),
        "-o APT::Get::Show-Versions=true -s -q dist-upgrade"
    );
}

#[test]
fn test_unmet_dependencies_mark_broken() {
    let fixture = Fixture::new();
    fixture.simulation(UNMET_OUTPUT, 100);
    let mut ctx = ProbeContext::new(fixture.engine());

    let summary = ctx.upgrade_summary().unwrap();
    assert_eq!(summary.broken, 1);
    assert_eq!(summary.upgrade, 3);
}

#[test]
fn test_simulation_failure_is_per_call() {
    let fixture = Fixture::new();
    fixture.simulation("", 100);
    let mut ctx = ProbeContext::new(fixture.engine());

    let mut out = UpgradeSummary::default();
    out.reserved[3] = 42;
    assert!(!ctx.fill_upgrade_summary(&mut out));
    assert_eq!(out.reserved[3], 42);
    assert!(ctx.last_error().contains("simulated failure"));
    assert!(ctx.state().is_initialized());

    fixture.simulation(UPGRADE_OUTPUT, 0);
    assert!(ctx.fill_upgrade_summary(&mut out));
    assert_eq!(out.reserved[3], 0);
}

#[test]
fn test_config_tool_failure_latches() {
    let fixture = Fixture::new();
    fixture.tool("apt-config", "echo 'E: Syntax error' >&2\nexit 100\n");
    let mut ctx = ProbeContext::new(fixture.engine());

    let err = ctx.init().unwrap_err();
    assert_eq!(err.phase(), Some(Phase::ConfigInit));
    assert!(ctx.last_error().contains("Syntax error"));

    // A repaired tool does not help once initialization has failed
    fixture.config_dump(&fixture.path("status"));
    assert!(ctx.upgrade_summary().unwrap_err().is_terminal());
    assert_eq!(fixture.args("apt-get"), "");
}

#[test]
fn test_missing_status_database_fails_system_init() {
    let fixture = Fixture::new();
    let mut engine = fixture.engine();
    engine.set_config("Dir::State::status", &fixture.path("absent").display().to_string());

    engine.init_config().unwrap();
    let err = engine.init_system().unwrap_err();
    assert!(err.message().contains("unavailable"));
}

#[test]
fn test_root_filesystem_relocates_status_database() {
    let fixture = Fixture::new();
    let root = fixture.path("guest");
    fs::create_dir_all(root.join("var/lib/dpkg")).unwrap();
    fs::write(root.join("var/lib/dpkg/status"), STATUS).unwrap();

    let config = EngineConfig {
        apt_get: fixture.path("apt-get").display().to_string(),
        apt_config: fixture.path("apt-config").display().to_string(),
        root_filesystem: Some(root.clone()),
        ..EngineConfig::default()
    };
    let mut engine = AptEngine::from_config(&config);
    engine.init_config().unwrap();
    engine.init_system().unwrap();

    let status = engine.status_path().unwrap().to_path_buf();
    assert_exists(&status);
    assert!(status.starts_with(&root));
    assert!(fixture.args("apt-config").contains(&format!("Dir={}", root.display())));
}
