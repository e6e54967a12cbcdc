use std::collections::HashMap;

use super::VariableSource;

const NAMESPACE: &str = "system.";

/// Process environment and platform properties under `system.`.
///
/// Environment variables appear as `system.env.<NAME>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSource;

impl SystemSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn property(key: &str) -> Option<String> {
        let value = match key {
            "os.name" => std::env::consts::OS.to_string(),
            "os.arch" => std::env::consts::ARCH.to_string(),
            "os.family" => std::env::consts::FAMILY.to_string(),
            "user.dir" => std::env::current_dir()
                .ok()?
                .to_string_lossy()
                .into_owned(),
            "file.separator" => std::path::MAIN_SEPARATOR.to_string(),
            "path.separator" => (if cfg!(windows) { ";" } else { ":" }).to_string(),
            "line.separator" => (if cfg!(windows) { "\r\n" } else { "\n" }).to_string(),
            "cpus" => std::thread::available_parallelism()
                .map_or(1, std::num::NonZeroUsize::get)
                .to_string(),
            _ => return None,
        };
        Some(value)
    }
}

const PROPERTIES: &[&str] = &[
    "os.name",
    "os.arch",
    "os.family",
    "user.dir",
    "file.separator",
    "path.separator",
    "line.separator",
    "cpus",
];

impl VariableSource for SystemSource {
    fn namespace(&self) -> &str {
        NAMESPACE
    }

    fn produce_entries(&self) -> HashMap<String, String> {
        let mut entries: HashMap<String, String> = PROPERTIES
            .iter()
            .filter_map(|p| Self::property(p).map(|v| (format!("{NAMESPACE}{p}"), v)))
            .collect();
        for (name, value) in std::env::vars() {
            entries.insert(format!("{NAMESPACE}env.{name}"), value);
        }
        entries
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let key = key.strip_prefix(NAMESPACE)?;
        match key.strip_prefix("env.") {
            Some(var) => std::env::var(var).ok(),
            None => Self::property(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_properties() {
        let source = SystemSource::new();
        assert_eq!(
            source.lookup("system.os.name").as_deref(),
            Some(std::env::consts::OS)
        );
        assert!(source.lookup("system.cpus").unwrap().parse::<usize>().unwrap() >= 1);
        assert!(source.lookup("system.nope").is_none());
        assert!(source.lookup("os.name").is_none());
    }

    #[test]
    fn environment_variables_are_exposed() {
        let source = SystemSource::new();
        let entries = source.produce_entries();
        if let Ok(path) = std::env::var("PATH") {
            assert_eq!(entries.get("system.env.PATH"), Some(&path));
            assert_eq!(source.lookup("system.env.PATH"), Some(path));
        }
        assert!(entries.contains_key("system.file.separator"));
    }
}
