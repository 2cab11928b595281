use anyhow::Result;
use clap::ValueEnum;
use colored::{ColoredString, Colorize};

use aptprobe_core::{ChangeAction, PackageChange};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
}

pub fn print_output(format: OutputFormat, value: &serde_json::Value) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Pretty => {
            print_pretty(value)?;
        }
    }
    Ok(())
}

fn print_pretty(value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                let key_colored = key.cyan().bold();
                match val {
                    serde_json::Value::String(s) => {
                        println!("{}: {}", key_colored, s.green());
                    }
                    serde_json::Value::Number(n) => {
                        println!("{}: {}", key_colored, n.to_string().yellow());
                    }
                    serde_json::Value::Bool(b) => {
                        let val_colored = if *b { "true".green() } else { "false".red() };
                        println!("{}: {}", key_colored, val_colored);
                    }
                    _ => {
                        println!("{}: {}", key_colored, val);
                    }
                }
            }
        }
        _ => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}

pub fn print_changes(format: OutputFormat, changes: &[PackageChange]) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(changes)?);
        }
        OutputFormat::Pretty => {
            if changes.is_empty() {
                println!("{}", "No package changes pending".green());
            }
            for change in changes {
                println!(
                    "{} {} {}",
                    action_label(change.action),
                    change.name.bold(),
                    version_span(change).dimmed()
                );
            }
        }
    }
    Ok(())
}

fn action_label(action: ChangeAction) -> ColoredString {
    let label = format!("{:<8}", action.as_str());
    match action {
        ChangeAction::Install | ChangeAction::Upgrade => label.green(),
        ChangeAction::Held => label.yellow(),
        ChangeAction::Remove => label.red(),
        ChangeAction::Broken => label.red().bold(),
    }
}

fn version_span(change: &PackageChange) -> String {
    match (&change.from, &change.to) {
        (Some(from), Some(to)) => format!("{} -> {}", from, to),
        (Some(version), None) | (None, Some(version)) => version.clone(),
        (None, None) => String::new(),
    }
}
