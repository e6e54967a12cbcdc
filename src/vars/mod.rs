//! Placeholder substitution.
//!
//! Expressions reference variables as `${namespace.key}`. Values come from a
//! stack of [`VariableSource`]s; each source owns one namespace prefix so
//! keys from different sources cannot collide. `$$` writes a literal `$`.

pub mod map;
pub mod random;
pub mod system;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ExtractError, Result};
use crate::models::scope::ConfigScope;

pub use map::MapSource;
pub use random::RandomSource;
pub use system::SystemSource;

/// Namespace of variables declared in a profile's `[variables]` table.
pub const PROFILE_NAMESPACE: &str = "profile";

/// A named contributor of substitutable key/value pairs.
///
/// Implementations must be side-effect free and safe to call concurrently.
pub trait VariableSource: Send + Sync {
    /// Key prefix including the trailing dot, e.g. `"system."`.
    fn namespace(&self) -> &str;

    /// All entries this source currently provides, fully qualified.
    fn produce_entries(&self) -> HashMap<String, String>;

    /// Look up one fully qualified key.
    fn lookup(&self, key: &str) -> Option<String> {
        if !key.starts_with(self.namespace()) {
            return None;
        }
        self.produce_entries().remove(key)
    }
}

/// Ordered union of variable sources.
///
/// Lookups consult the most recently layered source first, so a call-scoped
/// source pushed on top of the global ones is seen before them.
#[derive(Clone, Default)]
pub struct VariableContext {
    sources: Vec<Arc<dyn VariableSource>>,
}

impl std::fmt::Debug for VariableContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let namespaces: Vec<&str> = self.sources.iter().map(|s| s.namespace()).collect();
        f.debug_struct("VariableContext")
            .field("sources", &namespaces)
            .finish()
    }
}

impl VariableContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The global context: `system.*` and `random.*`.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut ctx = Self::new();
        ctx.push(Arc::new(SystemSource::new()));
        ctx.push(Arc::new(RandomSource::new()));
        ctx
    }

    /// Global context plus the profile's `[variables]` table as `profile.*`.
    ///
    /// Profile values are resolved once against the global sources.
    pub fn for_profile(profile: &ConfigScope) -> Result<Self> {
        let mut ctx = Self::with_defaults();
        if let Some(vars) = profile.node("variables") {
            let mut source = MapSource::new(PROFILE_NAMESPACE);
            for (key, value) in vars.entries() {
                source.insert(key, ctx.resolve(value)?);
            }
            ctx.push(Arc::new(source));
        }
        Ok(ctx)
    }

    pub fn push(&mut self, source: Arc<dyn VariableSource>) {
        self.sources.push(source);
    }

    /// A new context with `source` layered on top of this one.
    #[must_use]
    pub fn layered(&self, source: Arc<dyn VariableSource>) -> Self {
        let mut ctx = self.clone();
        ctx.push(source);
        ctx
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<String> {
        self.sources.iter().rev().find_map(|s| s.lookup(key))
    }

    /// Merged view of every source; later sources shadow earlier ones.
    #[must_use]
    pub fn entries(&self) -> HashMap<String, String> {
        let mut merged = HashMap::new();
        for source in &self.sources {
            merged.extend(source.produce_entries());
        }
        merged
    }

    /// Replace every `${key}` in `expression`.
    pub fn resolve(&self, expression: &str) -> Result<String> {
        resolve(self, expression)
    }
}

/// Replace every `${key}` placeholder in `expression` using `context`.
///
/// Substituted values are not rescanned. An unknown key is an error, never
/// an empty substitution.
pub fn resolve(context: &VariableContext, expression: &str) -> Result<String> {
    if !expression.contains('$') {
        return Ok(expression.to_string());
    }

    let mut out = String::with_capacity(expression.len());
    let mut rest = expression;
    let mut offset = 0;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            offset += pos + 2;
            rest = tail;
        } else if let Some(body) = after.strip_prefix('{') {
            let close = body
                .find('}')
                .ok_or(ExtractError::UnterminatedPlaceholder {
                    position: offset + pos,
                })?;
            let key = body[..close].trim();
            let value = context
                .lookup(key)
                .ok_or_else(|| ExtractError::UnknownVariable {
                    key: key.to_string(),
                })?;
            out.push_str(&value);
            offset += pos + 2 + close + 1;
            rest = &body[close + 1..];
        } else {
            out.push('$');
            offset += pos + 1;
            rest = after;
        }
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with(namespace: &str, pairs: &[(&str, &str)]) -> VariableContext {
        let mut source = MapSource::new(namespace);
        for (k, v) in pairs {
            source.insert(k, *v);
        }
        let mut ctx = VariableContext::new();
        ctx.push(Arc::new(source));
        ctx
    }

    #[test]
    fn expression_without_placeholders_is_unchanged() {
        let ctx = VariableContext::new();
        assert_eq!(ctx.resolve("course/title").unwrap(), "course/title");
    }

    #[test]
    fn placeholders_are_replaced() {
        let ctx = ctx_with("unit", &[("index", "3"), ("id", "CS101")]);
        let out = ctx.resolve("section[${unit.index}][@id='${ unit.id }']").unwrap();
        assert_eq!(out, "section[3][@id='CS101']");
    }

    #[test]
    fn unknown_key_is_an_error() {
        let ctx = ctx_with("unit", &[("index", "3")]);
        let err = ctx.resolve("x${unit.missing}").unwrap_err();
        assert!(matches!(err, ExtractError::UnknownVariable { key } if key == "unit.missing"));
    }

    #[test]
    fn key_is_not_remapped_to_another_namespace() {
        let ctx = ctx_with("unit", &[("index", "3")]);
        assert!(ctx.resolve("${index}").is_err());
        assert!(ctx.resolve("${other.index}").is_err());
    }

    #[test]
    fn unterminated_placeholder_reports_position() {
        let ctx = VariableContext::new();
        let err = ctx.resolve("ab${unit.index").unwrap_err();
        assert!(matches!(
            err,
            ExtractError::UnterminatedPlaceholder { position: 2 }
        ));
    }

    #[test]
    fn dollar_escapes_and_lone_dollars() {
        let ctx = ctx_with("unit", &[("index", "1")]);
        assert_eq!(ctx.resolve("$$${unit.index}").unwrap(), "$1");
        assert_eq!(ctx.resolve("re:\\d+$").unwrap(), "re:\\d+$");
        assert_eq!(ctx.resolve("$$1").unwrap(), "$1");
    }

    #[test]
    fn values_are_not_rescanned() {
        let ctx = ctx_with("unit", &[("raw", "${unit.raw}")]);
        assert_eq!(ctx.resolve("${unit.raw}").unwrap(), "${unit.raw}");
    }

    #[test]
    fn layered_source_shadows_earlier() {
        let base = ctx_with("unit", &[("index", "0")]);
        let mut top = MapSource::new("unit");
        top.insert("index", "7");
        let layered = base.layered(Arc::new(top));
        assert_eq!(layered.resolve("${unit.index}").unwrap(), "7");
        assert_eq!(base.resolve("${unit.index}").unwrap(), "0");
        assert_eq!(layered.entries().get("unit.index").map(String::as_str), Some("7"));
    }

    #[test]
    fn system_resolution_is_idempotent() {
        let ctx = VariableContext::with_defaults();
        let a = ctx.resolve("${system.os.name}/${system.os.arch}").unwrap();
        let b = ctx.resolve("${system.os.name}/${system.os.arch}").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH));
    }

    #[test]
    fn random_resolution_draws_each_time() {
        let ctx = VariableContext::with_defaults();
        let draws: std::collections::HashSet<String> = (0..8)
            .map(|_| ctx.resolve("${random.long}").unwrap())
            .collect();
        assert!(draws.len() > 1);
    }

    #[test]
    fn profile_variables_resolve_against_system() {
        let mut profile = ConfigScope::root();
        profile
            .set("variables/term", "fall")
            .set("variables/host", "${system.os.name}");
        let ctx = VariableContext::for_profile(&profile).unwrap();
        assert_eq!(ctx.resolve("${profile.term}").unwrap(), "fall");
        assert_eq!(
            ctx.resolve("${profile.host}").unwrap(),
            std::env::consts::OS
        );
    }

    #[test]
    fn profile_variable_with_unknown_reference_fails() {
        let mut profile = ConfigScope::root();
        profile.set("variables/bad", "${nowhere.x}");
        assert!(VariableContext::for_profile(&profile).is_err());
    }
}
