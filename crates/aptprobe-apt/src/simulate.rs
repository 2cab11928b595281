//! Parsing of `apt-get --simulate` output.
//!
//! Only the machine-oriented lines matter:
//!
//! ```text
//! Inst libssl3 [3.0.11-1] (3.0.13-1 Debian:12.5/stable [amd64])
//! Inst linux-image-6.1.0-18-amd64 (6.1.76-1 Debian-Security:12/stable-security [amd64])
//! Remv python2.7 [2.7.18-8]
//! ```
//!
//! plus the block that follows "The following packages have unmet
//! dependencies:" when resolution fails.

const UNMET_HEADER: &str = "The following packages have unmet dependencies:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimAction {
    Install {
        name: String,
        architecture: Option<String>,
        from: Option<String>,
        to: Option<String>,
    },
    Remove {
        name: String,
        version: Option<String>,
    },
}

impl SimAction {
    /// Lookup key in the package graph.
    pub fn key(&self) -> String {
        match self {
            SimAction::Install {
                name,
                architecture: Some(arch),
                ..
            } if !name.contains(':') => format!("{}:{}", name, arch),
            SimAction::Install { name, .. } | SimAction::Remove { name, .. } => name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Simulation {
    pub actions: Vec<SimAction>,
    /// Packages named in the unmet dependencies report
    pub broken: Vec<String>,
}

pub fn parse_simulation(output: &str) -> Simulation {
    let mut simulation = Simulation::default();
    let mut in_unmet = false;

    for line in output.lines() {
        if in_unmet {
            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some(name) = unmet_package(line) {
                    if !simulation.broken.iter().any(|known| known == name) {
                        simulation.broken.push(name.to_string());
                    }
                }
                continue;
            }
            in_unmet = false;
        }

        if line.trim_end() == UNMET_HEADER {
            in_unmet = true;
        } else if let Some(rest) = line.strip_prefix("Inst ") {
            if let Some(action) = parse_inst(rest) {
                simulation.actions.push(action);
            }
        } else if let Some(rest) = line
            .strip_prefix("Remv ")
            .or_else(|| line.strip_prefix("Purg "))
        {
            if let Some(action) = parse_remv(rest) {
                simulation.actions.push(action);
            }
        }
    }

    simulation
}

/// ` libfoo : Depends: libbar (>= 2) but it is not going to be installed`
/// names `libfoo`. Continuation lines have nothing before the colon.
fn unmet_package(line: &str) -> Option<&str> {
    let (name, _) = line.split_once(" : ")?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some(name)
}

fn parse_inst(rest: &str) -> Option<SimAction> {
    let (name, mut rest) = split_word(rest)?;

    let mut from = None;
    if let Some(inner) = rest.strip_prefix('[') {
        let (version, after) = inner.split_once(']')?;
        from = Some(version.to_string());
        rest = after.trim_start();
    }

    let mut to = None;
    let mut architecture = None;
    if let Some(inner) = rest.strip_prefix('(') {
        let inner = inner.split_once(')').map(|(inside, _)| inside).unwrap_or(inner);
        let mut words = inner.split_whitespace();
        to = words.next().map(str::to_string);
        architecture = words
            .last()
            .and_then(|word| word.strip_prefix('['))
            .and_then(|word| word.strip_suffix(']'))
            .map(str::to_string);
    }

    Some(SimAction::Install {
        name: name.to_string(),
        architecture,
        from,
        to,
    })
}

fn parse_remv(rest: &str) -> Option<SimAction> {
    let (name, rest) = split_word(rest)?;
    let version = rest
        .strip_prefix('[')
        .and_then(|inner| inner.split_once(']'))
        .map(|(version, _)| version.to_string());
    Some(SimAction::Remove {
        name: name.to_string(),
        version,
    })
}

fn split_word(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }
    match text.split_once(char::is_whitespace) {
        Some((word, rest)) => Some((word, rest.trim_start())),
        None => Some((text, "")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inst_and_remv() {
        let output = "\
NOTE: This is only a simulation!
Reading package lists...
Inst libssl3 [3.0.11-1~deb12u1] (3.0.11-1~deb12u2 Debian:12.5/stable [amd64])
Inst linux-image-6.1.0-18-amd64 (6.1.76-1 Debian-Security:12/stable-security [amd64])
Inst libc6:i386 [2.36-9] (2.36-9+deb12u4 Debian:12.5/stable [i386]) []
Conf libssl3 (3.0.11-1~deb12u2 Debian:12.5/stable [amd64])
Remv python2.7 [2.7.18-8]
";
        let sim = parse_simulation(output);
        assert_eq!(sim.actions.len(), 4);
        assert_eq!(
            sim.actions[0],
            SimAction::Install {
                name: "libssl3".to_string(),
                architecture: Some("amd64".to_string()),
                from: Some("3.0.11-1~deb12u1".to_string()),
                to: Some("3.0.11-1~deb12u2".to_string()),
            }
        );
        assert_eq!(sim.actions[0].key(), "libssl3:amd64");
        assert!(matches!(&sim.actions[1], SimAction::Install { from: None, .. }));
        assert_eq!(sim.actions[2].key(), "libc6:i386");
        assert_eq!(
            sim.actions[3],
            SimAction::Remove {
                name: "python2.7".to_string(),
                version: Some("2.7.18-8".to_string()),
            }
        );
        assert!(sim.broken.is_empty());
    }

    #[test]
    fn collects_unmet_dependencies() {
        let output = "\
Some packages could not be installed.
The following packages have unmet dependencies:
 libfoo : Depends: libbar (>= 2) but it is not going to be installed
          Depends: libbaz but it is not installable
 tool:i386 : PreDepends: libfoo
 libfoo : Breaks: old
Inst unrelated (1.0 Debian:12/stable [all])
";
        let sim = parse_simulation(output);
        assert_eq!(sim.broken, vec!["libfoo", "tool:i386"]);
        assert_eq!(sim.actions.len(), 1);
    }

    #[test]
    fn ignores_noise() {
        let sim = parse_simulation("Inst\nRemv \nCalculating upgrade... Done\n");
        assert_eq!(sim, Simulation::default());
    }
}
