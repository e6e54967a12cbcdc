use std::collections::HashMap;
use std::sync::Arc;

use super::input::InputSource;
use super::loader::{MarkupLoader, TextLoader};
use super::{CourseRoutine, ParserRoutine};
use crate::models::scope::ConfigScope;

/// Line-oriented catalogs.
pub const COURSE_TEXT: &str = "course-text";
/// HTML catalogs.
pub const COURSE_HTML: &str = "course-html";
/// XML catalogs.
pub const COURSE_XML: &str = "course-xml";

/// Builds a routine bound to one input and one profile.
pub type RoutineFactory =
    Box<dyn Fn(Box<dyn InputSource>, Arc<ConfigScope>) -> Box<dyn ParserRoutine> + Send + Sync>;

/// Maps source identifiers to routine factories.
pub struct Registry {
    factories: HashMap<String, RoutineFactory>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// The registry with every built-in routine.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(COURSE_TEXT, |input, scope| -> Box<dyn ParserRoutine> {
            Box::new(CourseRoutine::new(COURSE_TEXT, TextLoader, input, scope))
        });
        registry.register(COURSE_HTML, |input, scope| -> Box<dyn ParserRoutine> {
            Box::new(CourseRoutine::new(COURSE_HTML, MarkupLoader::html(), input, scope))
        });
        registry.register(COURSE_XML, |input, scope| -> Box<dyn ParserRoutine> {
            Box::new(CourseRoutine::new(COURSE_XML, MarkupLoader::xml(), input, scope))
        });
        registry
    }

    /// Register (or replace) the factory for `id`.
    pub fn register<F>(&mut self, id: &str, factory: F)
    where
        F: Fn(Box<dyn InputSource>, Arc<ConfigScope>) -> Box<dyn ParserRoutine>
            + Send
            + Sync
            + 'static,
    {
        if self
            .factories
            .insert(id.to_string(), Box::new(factory))
            .is_some()
        {
            tracing::debug!(id, "replaced routine factory");
        }
    }

    /// The factory for `id`, or `None` when nothing is registered.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&RoutineFactory> {
        self.factories.get(id)
    }

    /// Build a routine for `id`. Inputs are not touched when `id` is unknown.
    #[must_use]
    pub fn create(
        &self,
        id: &str,
        input: Box<dyn InputSource>,
        scope: Arc<ConfigScope>,
    ) -> Option<Box<dyn ParserRoutine>> {
        self.get(id).map(|factory| factory(input, scope))
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Registered identifiers, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
