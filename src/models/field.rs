use std::fmt;
use std::str::FromStr;

use crate::models::scope::ConfigScope;

/// Name of the scope child that holds field definitions.
pub const FIELDS_NODE: &str = "fields";

const DEFAULT_SEPARATOR: &str = ", ";

/// What to do when a query yields more than one value for a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Aggregation {
    /// Keep the first value in document order.
    #[default]
    First,
    /// Keep the last value in document order.
    Last,
    /// Join all values with the field's separator.
    Join,
    /// Write one entry per value: `key.0`, `key.1`, ...
    Enumerate,
    /// More than one value is a parse error.
    Error,
}

impl Aggregation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Last => "last",
            Self::Join => "join",
            Self::Enumerate => "enumerate",
            Self::Error => "error",
        }
    }
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            "join" | "concat" => Ok(Self::Join),
            "enumerate" | "all" => Ok(Self::Enumerate),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown aggregation policy: {other}")),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile-wide defaults applied to fields that don't override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefaults {
    pub aggregation: Aggregation,
    pub separator: String,
}

impl Default for FieldDefaults {
    fn default() -> Self {
        Self {
            aggregation: Aggregation::First,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

impl FieldDefaults {
    /// Read `multiple` / `separator` from a routine scope node.
    pub fn from_scope(routine: Option<&ConfigScope>) -> Result<Self, String> {
        let mut defaults = Self::default();
        if let Some(node) = routine {
            if let Some(policy) = node.get("multiple") {
                defaults.aggregation = policy.parse()?;
            }
            if let Some(sep) = node.get("separator") {
                defaults.separator = sep.to_string();
            }
        }
        Ok(defaults)
    }
}

/// A declarative (name, query) pair read from a scope's `fields` node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    pub name: String,
    pub query: String,
    pub required: bool,
    pub aggregation: Aggregation,
    pub separator: String,
}

impl FieldDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            required: false,
            aggregation: Aggregation::First,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }

    /// Enumerate every field defined under `scope`.
    ///
    /// Plain entries of the `fields` node are `name = query`; child tables
    /// carry `query` plus optional `required`, `multiple` and `separator`.
    /// A scope without a `fields` node defines no fields.
    pub fn from_scope(
        scope: &ConfigScope,
        defaults: &FieldDefaults,
    ) -> Result<Vec<FieldDefinition>, (String, String)> {
        let Some(fields) = scope.node(FIELDS_NODE) else {
            return Ok(Vec::new());
        };

        let mut defs: Vec<FieldDefinition> = fields
            .entries()
            .map(|(name, query)| FieldDefinition {
                name: name.to_string(),
                query: query.to_string(),
                required: false,
                aggregation: defaults.aggregation,
                separator: defaults.separator.clone(),
            })
            .collect();

        for table in fields.children() {
            let name = table.name().to_string();
            let Some(query) = table.get("query") else {
                return Err((name, "field table has no 'query' entry".into()));
            };
            let aggregation = match table.get("multiple") {
                Some(policy) => policy.parse().map_err(|e| (name.clone(), e))?,
                None => defaults.aggregation,
            };
            defs.push(FieldDefinition {
                query: query.to_string(),
                required: table.get_bool("required").unwrap_or(false),
                aggregation,
                separator: table
                    .get("separator")
                    .map_or_else(|| defaults.separator.clone(), str::to_string),
                name,
            });
        }

        defs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(defs)
    }

    /// Turn raw query results into `(key, value)` entries under `key`.
    ///
    /// Returns an empty list when there is nothing to write, and an error
    /// message when a required field is empty or the policy rejects the
    /// number of values.
    pub fn aggregate(
        &self,
        key: &str,
        mut values: Vec<String>,
    ) -> Result<Vec<(String, String)>, String> {
        if values.is_empty() {
            if self.required {
                return Err("required field produced no value".into());
            }
            return Ok(Vec::new());
        }

        let entries = match self.aggregation {
            Aggregation::First => vec![(key.to_string(), values.swap_remove(0))],
            Aggregation::Last => {
                let last = values.pop().unwrap_or_default();
                vec![(key.to_string(), last)]
            }
            Aggregation::Join => vec![(key.to_string(), values.join(&self.separator))],
            Aggregation::Enumerate => values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (format!("{key}.{i}"), v))
                .collect(),
            Aggregation::Error if values.len() > 1 => {
                return Err(format!("query produced {} values, expected one", values.len()));
            }
            Aggregation::Error => vec![(key.to_string(), values.swap_remove(0))],
        };
        Ok(entries)
    }
}
