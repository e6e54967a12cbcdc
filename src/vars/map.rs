use std::collections::HashMap;

use super::VariableSource;

/// A fixed set of variables under one namespace.
///
/// Used for profile variables and for the short-lived, call-scoped source
/// that exposes the current unit's index and id to field queries.
#[derive(Debug, Clone)]
pub struct MapSource {
    namespace: String,
    entries: HashMap<String, String>,
}

impl MapSource {
    /// `namespace` is given without the trailing dot (`"unit"`).
    #[must_use]
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: format!("{}.", namespace.trim_end_matches('.')),
            entries: HashMap::new(),
        }
    }

    /// Insert `key` (unqualified) with `value`.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.entries
            .insert(format!("{}{key}", self.namespace), value.into());
        self
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }
}

impl VariableSource for MapSource {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn produce_entries(&self) -> HashMap<String, String> {
        self.entries.clone()
    }

    fn lookup(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_qualified() {
        let source = MapSource::new("unit").with("index", "2").with("id", "S1");
        assert_eq!(source.namespace(), "unit.");
        assert_eq!(source.lookup("unit.index").as_deref(), Some("2"));
        assert_eq!(source.lookup("index"), None);
        assert_eq!(source.produce_entries().len(), 2);
    }

    #[test]
    fn trailing_dot_is_normalised() {
        assert_eq!(MapSource::new("profile.").namespace(), "profile.");
    }
}
