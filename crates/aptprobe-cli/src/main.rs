mod check;
mod output;

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use aptprobe_apt::AptEngine;
use aptprobe_core::{
    ConfigManager, LoggingConfig, PackageChange, ProbeConfig, ProbeContext, Snapshot,
    SnapshotEngine, UpgradeSummary,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::json;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::check::AptCheck;
use crate::output::{print_changes, print_output, OutputFormat};

#[derive(Parser)]
#[command(name = "aptprobe")]
#[command(about = "aptprobe - what would an upgrade do right now?", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty)
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    output: OutputFormat,

    /// Configuration file
    #[arg(short, long, global = true, env = "APTPROBE_CONFIG")]
    config: Option<PathBuf>,

    /// Replay a saved snapshot instead of querying the system
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Engine option, repeatable
    #[arg(
        short = 'o',
        long = "option",
        global = true,
        value_name = "NAME=VALUE",
        value_parser = parse_option
    )]
    options: Vec<(String, String)>,

    /// Verbose output with engine step tracing
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the upgrade summary counters
    Summary,

    /// List the packages an upgrade would change
    Changes,

    /// Monitoring check with plugin exit codes (0 ok, 1 warning, 2 critical, 3 unknown)
    Check(CheckArgs),

    /// Save the resolved package graph for later replay with --snapshot
    Snapshot {
        /// Destination file
        path: PathBuf,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Root file system in which to perform the checks
    #[arg(long)]
    root_filesystem: Option<PathBuf>,

    /// Package update warning threshold in hours
    #[arg(long, value_name = "HOURS")]
    update_warning: Option<u64>,

    /// Package update critical threshold in hours
    #[arg(long, value_name = "HOURS")]
    update_critical: Option<u64>,

    /// Reboot recommendation warning threshold in hours
    #[arg(long, value_name = "HOURS")]
    reboot_warning: Option<u64>,

    /// Reboot recommendation critical threshold in hours
    #[arg(long, value_name = "HOURS")]
    reboot_critical: Option<u64>,

    /// List pending package changes below the status line
    #[arg(long)]
    list: bool,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a default configuration file
    Init {
        /// Destination (defaults to ~/.aptprobe/config.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

fn parse_option(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{}'", raw)),
    }
}

fn main() {
    let cli = Cli::parse();

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            if let Commands::Check(_) = cli.command {
                println!("APT UNKNOWN: {:#}", e);
                3
            } else {
                eprintln!("{} {:#}", "Error:".red().bold(), e);
                1
            }
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<i32> {
    let manager =
        ConfigManager::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let config_path = manager.config_path().map(|p| p.to_path_buf());
    let mut config = manager.into_config();

    init_logging(&config.logging, cli.verbose);
    if let Some(path) = &config_path {
        debug!("Configuration file: {}", path.display());
    }

    if let Commands::Check(args) = &cli.command {
        if let Some(root) = &args.root_filesystem {
            config.engine.root_filesystem = Some(root.clone());
        }
    }

    match &cli.command {
        Commands::Summary => {
            let mut ctx = build_context(cli, &config);
            let summary = ctx.upgrade_summary()?;
            let mut value = serde_json::to_value(summary.counters())?;
            value["total"] = json!(summary.total());
            print_output(cli.output, &value)?;
            Ok(0)
        }
        Commands::Changes => {
            let mut ctx = build_context(cli, &config);
            let changes: Vec<PackageChange> = ctx.package_changes()?.iter().collect();
            print_changes(cli.output, &changes)?;
            Ok(0)
        }
        Commands::Check(args) => Ok(execute_check(cli, args, &config)),
        Commands::Snapshot { path } => {
            let mut ctx = build_context(cli, &config);
            let report = ctx.package_changes()?;
            Snapshot::from_graph(report.graph())
                .save(path)
                .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
            print_output(
                cli.output,
                &json!({
                    "snapshot": path.display().to_string(),
                    "packages": report.graph().len(),
                }),
            )?;
            Ok(0)
        }
        Commands::Config(ConfigCommands::Init { path, force }) => {
            let path = match path {
                Some(path) => path.clone(),
                None => dirs::home_dir()
                    .ok_or_else(|| anyhow!("Cannot determine home directory"))?
                    .join(".aptprobe")
                    .join("config.toml"),
            };
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            ConfigManager::create_default_config(&path)?;
            println!("{} {}", "Wrote".green().bold(), path.display());
            Ok(0)
        }
        Commands::Config(ConfigCommands::Show) => {
            match cli.output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
                OutputFormat::Pretty => print!("{}", ConfigManager::to_toml(&config)?),
            }
            Ok(0)
        }
    }
}

fn build_context(cli: &Cli, config: &ProbeConfig) -> ProbeContext {
    let mut ctx = match &cli.snapshot {
        Some(path) => ProbeContext::new(SnapshotEngine::new(path)),
        None => ProbeContext::new(AptEngine::from_config(&config.engine)),
    };
    ctx.set_trace(cli.verbose);
    for (name, value) in &cli.options {
        ctx.set_config(name, value);
    }
    debug!("Using {} engine", ctx.engine_name());
    ctx
}

fn execute_check(cli: &Cli, args: &CheckArgs, config: &ProbeConfig) -> i32 {
    let mut thresholds = config.check.clone();
    if args.update_warning.is_some() {
        thresholds.update_warning_hours = args.update_warning;
    }
    if args.update_critical.is_some() {
        thresholds.update_critical_hours = args.update_critical;
    }
    if args.reboot_warning.is_some() {
        thresholds.reboot_warning_hours = args.reboot_warning;
    }
    if args.reboot_critical.is_some() {
        thresholds.reboot_critical_hours = args.reboot_critical;
    }
    let mut check = AptCheck::from_config(&thresholds, config.engine.root_filesystem.clone());
    check.list_changes = args.list;

    let mut ctx = build_context(cli, config);
    let (upgrades, changes): (_, Vec<PackageChange>) = match ctx.package_changes() {
        Ok(report) => (
            Ok(UpgradeSummary::from_counters(report.counts())),
            report.iter().collect(),
        ),
        Err(e) => (Err(e), Vec::new()),
    };

    let result = check.perform(upgrades, &changes);
    match cli.output {
        OutputFormat::Json => match serde_json::to_string_pretty(&result) {
            Ok(text) => println!("{}", text),
            Err(_) => println!("{}", result),
        },
        OutputFormat::Pretty => println!("{}", result),
    }
    result.status.exit_code()
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "aptprobe={level},aptprobe_core={level},aptprobe_apt={level}"
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    let result = match logging.format.as_str() {
        "json" => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        "compact" => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
        _ => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("{} {}", "Warning:".yellow().bold(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn option_values_may_contain_equals() {
        assert_eq!(
            parse_option("Acquire::http::Proxy=http://proxy:3128/?a=b").unwrap(),
            (
                "Acquire::http::Proxy".to_string(),
                "http://proxy:3128/?a=b".to_string()
            )
        );
        assert!(parse_option("novalue").is_err());
        assert!(parse_option("=value").is_err());
    }

    #[test]
    fn check_flags_parse() {
        let cli = Cli::try_parse_from([
            "aptprobe",
            "-o",
            "Dir=/srv/guest",
            "check",
            "--update-warning",
            "24",
            "--root-filesystem",
            "/srv/guest",
            "--list",
        ])
        .unwrap();
        assert_eq!(cli.options, vec![("Dir".to_string(), "/srv/guest".to_string())]);
        match cli.command {
            Commands::Check(args) => {
                assert_eq!(args.update_warning, Some(24));
                assert!(args.list);
            }
            _ => panic!("expected check"),
        }
    }
}
