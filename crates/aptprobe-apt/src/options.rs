use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_STATUS_PATH: &str = "/var/lib/dpkg/status";

const STATUS_KEY: &str = "Dir::State::status";
const ROOT_KEY: &str = "Dir";

/// APT options set through the configuration accessor, kept in the order
/// they were first set. Setting a name again replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AptOptions {
    entries: Vec<(String, String)>,
}

impl AptOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(existing, _)| existing == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `-o name=value` pairs for the APT command line tools.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.entries.len() * 2);
        for (name, value) in &self.entries {
            args.push("-o".to_string());
            args.push(format!("{}={}", name, value));
        }
        args
    }

    /// Where the dpkg status database lives.
    ///
    /// An explicit `Dir::State::status` wins (relative values are taken
    /// under `Dir`). Otherwise an explicit `Dir` moves the default path
    /// under that root. Failing both, the value reported by `apt-config
    /// dump` is used, then the stock location.
    pub fn status_path(&self, dumped: &BTreeMap<String, String>) -> PathBuf {
        let root = Path::new(self.get(ROOT_KEY).unwrap_or("/"));

        if let Some(status) = self.get(STATUS_KEY) {
            return under_root(root, status);
        }
        if self.get(ROOT_KEY).is_some() {
            return under_root(root, DEFAULT_STATUS_PATH);
        }
        match dumped.get(STATUS_KEY) {
            Some(status) if !status.is_empty() => under_root(root, status),
            _ => PathBuf::from(DEFAULT_STATUS_PATH),
        }
    }
}

fn under_root(root: &Path, path: &str) -> PathBuf {
    let relative = path.trim_start_matches('/');
    if path.starts_with('/') && root == Path::new("/") {
        return PathBuf::from(path);
    }
    root.join(relative)
}

/// Parse `apt-config dump` output (`Name "value";` per line).
///
/// List entries (`Name:: "value";`) and lines that do not look like an
/// assignment are skipped.
pub fn parse_config_dump(text: &str) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        let Some((name, rest)) = line.split_once(' ') else {
            continue;
        };
        if name.ends_with("::") {
            continue;
        }
        let value = rest.trim().trim_end_matches(';').trim();
        let Some(value) = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
        else {
            continue;
        };
        values.insert(name.to_string(), value.to_string());
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_per_name_wins_in_first_position() {
        let mut options = AptOptions::new();
        options.set("Dir", "/a");
        options.set("APT::Architecture", "amd64");
        options.set("Dir", "/b");
        assert_eq!(
            options.to_args(),
            vec!["-o", "Dir=/b", "-o", "APT::Architecture=amd64"]
        );
    }

    #[test]
    fn status_path_resolution() {
        let mut dumped = BTreeMap::new();
        let options = AptOptions::new();
        assert_eq!(options.status_path(&dumped), PathBuf::from(DEFAULT_STATUS_PATH));

        dumped.insert(STATUS_KEY.to_string(), "/srv/dpkg/status".to_string());
        assert_eq!(options.status_path(&dumped), PathBuf::from("/srv/dpkg/status"));

        let mut rooted = AptOptions::new();
        rooted.set("Dir", "/var/lib/lxc/web/rootfs");
        assert_eq!(
            rooted.status_path(&dumped),
            PathBuf::from("/var/lib/lxc/web/rootfs/var/lib/dpkg/status")
        );

        rooted.set(STATUS_KEY, "custom/status");
        assert_eq!(
            rooted.status_path(&dumped),
            PathBuf::from("/var/lib/lxc/web/rootfs/custom/status")
        );
    }

    #[test]
    fn parses_dump_lines() {
        let dump = r#"APT "";
APT::Architecture "amd64";
APT::Architectures "";
APT::Architectures:: "amd64";
Dir "/";
Dir::State::status "/var/lib/dpkg/status";
garbage line
"#;
        let values = parse_config_dump(dump);
        assert_eq!(values.get("APT::Architecture").map(String::as_str), Some("amd64"));
        assert_eq!(values.get("Dir").map(String::as_str), Some("/"));
        assert_eq!(
            values.get(STATUS_KEY).map(String::as_str),
            Some(DEFAULT_STATUS_PATH)
        );
        assert!(!values.contains_key("APT::Architectures::"));
        assert!(!values.contains_key("garbage"));
    }
}
