use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ExtractError, Result};

/// Path separator used when addressing nested scope nodes.
const SEPARATOR: char = '/';

/// A read-only node of a configuration profile.
///
/// Tables become child nodes and scalars become string entries. Every node
/// knows its absolute path (`/` for the root, `/course/sections` below it),
/// which is what error messages report as the scope of a failing field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigScope {
    path: String,
    entries: BTreeMap<String, String>,
    children: BTreeMap<String, ConfigScope>,
}

impl ConfigScope {
    /// Create an empty root node.
    #[must_use]
    pub fn root() -> Self {
        Self {
            path: SEPARATOR.to_string(),
            ..Default::default()
        }
    }

    /// Load a profile, picking the format from the file extension.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExtractError::Config(format!("cannot read profile {}: {e}", path.display()))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(source)
            .map_err(|e| ExtractError::Config(format!("invalid TOML profile: {e}")))?;
        let mut root = Self::root();
        root.fill_from_toml(&table);
        Ok(root)
    }

    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let value: serde_yaml_ng::Value = serde_yaml_ng::from_str(source)
            .map_err(|e| ExtractError::Config(format!("invalid YAML profile: {e}")))?;
        let mut root = Self::root();
        match value {
            serde_yaml_ng::Value::Mapping(map) => root.fill_from_yaml(&map),
            serde_yaml_ng::Value::Null => {}
            _ => {
                return Err(ExtractError::Config(
                    "YAML profile must be a mapping at the top level".into(),
                ))
            }
        }
        Ok(root)
    }

    fn fill_from_toml(&mut self, table: &toml::Table) {
        for (key, value) in table {
            match value {
                toml::Value::Table(inner) => self.child_mut(key).fill_from_toml(inner),
                scalar => {
                    self.entries.insert(key.clone(), toml_scalar(scalar));
                }
            }
        }
    }

    fn fill_from_yaml(&mut self, map: &serde_yaml_ng::Mapping) {
        for (key, value) in map {
            let Some(key) = yaml_scalar(key) else {
                continue;
            };
            match value {
                serde_yaml_ng::Value::Mapping(inner) => self.child_mut(&key).fill_from_yaml(inner),
                scalar => {
                    if let Some(text) = yaml_scalar(scalar) {
                        self.entries.insert(key, text);
                    }
                }
            }
        }
    }

    /// Get or create a direct child, keeping its path consistent with ours.
    fn child_mut(&mut self, name: &str) -> &mut ConfigScope {
        let path = self.child_path(name);
        self.children
            .entry(name.to_string())
            .or_insert_with(|| ConfigScope {
                path,
                ..Default::default()
            })
    }

    fn child_path(&self, name: &str) -> String {
        if self.path.ends_with(SEPARATOR) {
            format!("{}{name}", self.path)
        } else {
            format!("{}{SEPARATOR}{name}", self.path)
        }
    }

    /// Set an entry by relative path, creating intermediate nodes.
    ///
    /// `set("course/fields/title", "@title")` creates `course` and `fields`
    /// when they are missing.
    pub fn set(&mut self, path: &str, value: impl Into<String>) -> &mut Self {
        let mut segments: Vec<&str> = path.split(SEPARATOR).filter(|s| !s.is_empty()).collect();
        let Some(key) = segments.pop() else {
            return self;
        };
        let mut node = &mut *self;
        for segment in segments {
            node = node.child_mut(segment);
        }
        node.entries.insert(key.to_string(), value.into());
        self
    }

    /// Absolute path of this node.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment (empty for the root).
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.rsplit(SEPARATOR).next().unwrap_or("")
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Interpret an entry as a boolean (`true`/`yes`/`1`).
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).map(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "true" | "yes" | "1" | "on"
            )
        })
    }

    /// String entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Direct child nodes in name order.
    pub fn children(&self) -> impl Iterator<Item = &ConfigScope> {
        self.children.values()
    }

    /// Navigate to a descendant by relative path (`"course/sections"`).
    #[must_use]
    pub fn node(&self, relative: &str) -> Option<&ConfigScope> {
        relative
            .split(SEPARATOR)
            .filter(|s| !s.is_empty())
            .try_fold(self, |node, segment| node.children.get(segment))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.children.is_empty()
    }
}

fn toml_scalar(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Array(items) => items.iter().map(toml_scalar).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

fn yaml_scalar(value: &serde_yaml_ng::Value) -> Option<String> {
    match value {
        serde_yaml_ng::Value::String(s) => Some(s.clone()),
        serde_yaml_ng::Value::Bool(b) => Some(b.to_string()),
        serde_yaml_ng::Value::Number(n) => Some(n.to_string()),
        serde_yaml_ng::Value::Sequence(items) => Some(
            items
                .iter()
                .filter_map(yaml_scalar)
                .collect::<Vec<_>>()
                .join(","),
        ),
        serde_yaml_ng::Value::Tagged(tagged) => yaml_scalar(&tagged.value),
        serde_yaml_ng::Value::Null | serde_yaml_ng::Value::Mapping(_) => None,
    }
}
