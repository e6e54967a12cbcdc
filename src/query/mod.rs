pub mod markup;
pub mod path;
pub mod text;

use std::sync::Arc;

use crate::error::{ExtractError, Result};
use crate::models::field::{FieldDefaults, FieldDefinition};
use crate::models::scope::ConfigScope;
use crate::models::store::CourseFields;
use crate::vars::{MapSource, VariableContext};

/// Namespace of the call-scoped variables describing the current unit.
pub const UNIT_NAMESPACE: &str = "unit";

/// Evaluates resolved query expressions against document units.
///
/// This is the boundary to the document format: the engine never looks
/// inside a unit except through this trait.
pub trait DocumentQuery: Send + Sync {
    type Unit: Copy + Send + Sync + std::fmt::Debug;

    /// Zero, one or many values for `expression` at `unit`.
    fn evaluate(
        &self,
        unit: Self::Unit,
        expression: &str,
    ) -> std::result::Result<Vec<String>, String>;

    /// The unit's own identifier, if the format has one.
    fn unit_id(&self, unit: Self::Unit) -> Option<String>;
}

/// Structural view used to decompose a catalog into course work units.
pub trait CourseDocument: DocumentQuery {
    /// One unit per course, in document order.
    fn groups(&self) -> Vec<Self::Unit>;

    /// The course record followed by its sections, in document order.
    fn members(&self, group: Self::Unit) -> Vec<Self::Unit>;

    /// Meetings of one section, in document order.
    fn meetings(&self, section: Self::Unit) -> Vec<Self::Unit>;
}

/// Where the values of one `retrieve_*` call land.
#[derive(Debug, Clone, Copy)]
struct Slot<'a> {
    index: usize,
    key_prefix: Option<&'a str>,
    value_key_prefix: Option<&'a str>,
}

/// Maps the field definitions of a scope onto unit queries.
#[derive(Debug, Clone)]
pub struct QueryTool {
    vars: VariableContext,
    defaults: FieldDefaults,
}

impl QueryTool {
    #[must_use]
    pub fn new(vars: VariableContext, defaults: FieldDefaults) -> Self {
        Self { vars, defaults }
    }

    /// A tool whose queries can also see `${unit.course}`.
    #[must_use]
    pub fn for_course(&self, course_id: &str) -> Self {
        let source = MapSource::new(UNIT_NAMESPACE).with("course", course_id);
        Self {
            vars: self.vars.layered(Arc::new(source)),
            defaults: self.defaults.clone(),
        }
    }

    #[must_use]
    pub fn variables(&self) -> &VariableContext {
        &self.vars
    }

    /// Extract every field of `scope` from `unit` into `data` under the
    /// plain field names. Returns the number of entries written.
    pub fn retrieve_data<D: DocumentQuery>(
        &self,
        doc: &D,
        unit: D::Unit,
        scope: &ConfigScope,
        data: &mut CourseFields,
    ) -> Result<usize> {
        let slot = Slot {
            index: 0,
            key_prefix: None,
            value_key_prefix: None,
        };
        self.retrieve(doc, unit, scope, slot, data)
    }

    /// Indexed form for repeated structures: values land under
    /// `value_key_prefix.<field>` so sibling units never collide.
    #[allow(clippy::too_many_arguments)]
    pub fn retrieve_data_indexed<D: DocumentQuery>(
        &self,
        doc: &D,
        unit: D::Unit,
        index: usize,
        scope: &ConfigScope,
        key_prefix: &str,
        value_key_prefix: &str,
        data: &mut CourseFields,
    ) -> Result<usize> {
        let slot = Slot {
            index,
            key_prefix: Some(key_prefix),
            value_key_prefix: Some(value_key_prefix),
        };
        self.retrieve(doc, unit, scope, slot, data)
    }

    /// Every field is attempted; successful ones are written even when a
    /// sibling field fails, and the first failure is returned afterwards.
    fn retrieve<D: DocumentQuery>(
        &self,
        doc: &D,
        unit: D::Unit,
        scope: &ConfigScope,
        slot: Slot<'_>,
        data: &mut CourseFields,
    ) -> Result<usize> {
        let defs = FieldDefinition::from_scope(scope, &self.defaults).map_err(|(field, detail)| {
            ExtractError::Parse {
                field,
                scope: scope.path().to_string(),
                detail,
            }
        })?;
        if defs.is_empty() {
            return Ok(0);
        }

        let ctx = self.vars.layered(Arc::new(unit_source(doc, unit, slot)));
        let mut written = 0;
        let mut first_error: Option<ExtractError> = None;

        for def in &defs {
            let key = match slot.value_key_prefix {
                Some(prefix) => format!("{prefix}.{}", def.name),
                None => def.name.clone(),
            };
            match evaluate_field(doc, unit, def, &ctx, scope, &key) {
                Ok(entries) => {
                    written += entries.len();
                    data.extend(entries);
                }
                Err(e) => {
                    tracing::debug!(field = %def.name, scope = scope.path(), error = %e, "field failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }
}

fn unit_source<D: DocumentQuery>(doc: &D, unit: D::Unit, slot: Slot<'_>) -> MapSource {
    let mut source = MapSource::new(UNIT_NAMESPACE);
    source.insert("index", slot.index.to_string());
    if let Some(id) = doc.unit_id(unit) {
        source.insert("id", id);
    }
    if let Some(prefix) = slot.key_prefix {
        source.insert("prefix", prefix);
    }
    if let Some(key) = slot.value_key_prefix {
        source.insert("key", key);
    }
    source
}

fn evaluate_field<D: DocumentQuery>(
    doc: &D,
    unit: D::Unit,
    def: &FieldDefinition,
    ctx: &VariableContext,
    scope: &ConfigScope,
    key: &str,
) -> Result<Vec<(String, String)>> {
    let parse_error = |detail: String| ExtractError::Parse {
        field: def.name.clone(),
        scope: scope.path().to_string(),
        detail,
    };
    let expression = ctx
        .resolve(&def.query)
        .map_err(|e| e.at_field(&def.name, scope.path()))?;
    let values = doc.evaluate(unit, &expression).map_err(parse_error)?;
    def.aggregate(key, values).map_err(parse_error)
}

#[cfg(test)]
mod tests {
    use super::markup::{Dialect, MarkupDocument, NodeId};
    use super::*;

    fn doc(source: &str) -> MarkupDocument {
        MarkupDocument::parse(source, Dialect::Xml).unwrap()
    }

    fn course(doc: &MarkupDocument) -> NodeId {
        doc.select(doc.root(), "//course").unwrap()[0]
    }

    fn tool() -> QueryTool {
        QueryTool::new(VariableContext::with_defaults(), FieldDefaults::default())
    }

    #[test]
    fn scenario_course_id_and_title() {
        let d = doc(r#"<course id="CS101">Intro</course>"#);
        let mut scope = ConfigScope::root();
        scope
            .set("course/fields/title", "name-of(.)")
            .set("course/fields/id", "@id");
        let mut data = CourseFields::new();
        let n = tool()
            .retrieve_data(&d, course(&d), scope.node("course").unwrap(), &mut data)
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(data.len(), 2);
        assert_eq!(data["id"], "CS101");
        assert_eq!(data["title"], "Intro");
    }

    #[test]
    fn failing_field_does_not_block_others() {
        let d = doc(r#"<course id="CS101">Intro</course>"#);
        let mut scope = ConfigScope::root();
        scope
            .set("fields/id", "@id")
            .set("fields/broken", "section[")
            .set("fields/title", "text()");
        let mut data = CourseFields::new();
        let err = tool()
            .retrieve_data(&d, course(&d), &scope, &mut data)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Parse { ref field, .. } if field == "broken"));
        assert_eq!(data.len(), 2);
        assert_eq!(data["title"], "Intro");
        assert!(!data.contains_key("broken"));
    }

    #[test]
    fn missing_optional_field_writes_nothing() {
        let d = doc(r#"<course id="CS101">Intro</course>"#);
        let mut scope = ConfigScope::root();
        scope.set("fields/credits", "@credits");
        let mut data = CourseFields::new();
        let n = tool().retrieve_data(&d, course(&d), &scope, &mut data).unwrap();
        assert_eq!(n, 0);
        assert!(data.is_empty());
    }

    #[test]
    fn missing_required_field_is_parse_error() {
        let d = doc(r#"<course id="CS101">Intro</course>"#);
        let scope = ConfigScope::from_toml_str(
            "[fields.credits]\nquery = \"@credits\"\nrequired = true\n",
        )
        .unwrap();
        let mut data = CourseFields::new();
        let err = tool()
            .retrieve_data(&d, course(&d), &scope, &mut data)
            .unwrap_err();
        match err {
            ExtractError::Parse { field, scope, .. } => {
                assert_eq!(field, "credits");
                assert_eq!(scope, "/");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn indexed_form_prefixes_keys_and_exposes_unit_vars() {
        let d = doc(
            r#"<course id="CS101"><section id="S1"><room>A1</room></section><section id="S2"><room>B2</room></section></course>"#,
        );
        let sections = d.select(course(&d), "section").unwrap();
        let mut scope = ConfigScope::root();
        scope
            .set("fields/room", "room")
            .set("fields/tag", "${unit.id}-${unit.index}")
            .set("fields/nth", "../section[${unit.index}]/@id");
        let t = tool();
        let mut data = CourseFields::new();
        for (i, &s) in sections.iter().enumerate() {
            let key = format!("course.sections.{i}");
            let written = t
                .retrieve_data_indexed(&d, s, i + 1, &scope, "course.sections", &key, &mut data)
                .unwrap();
            assert_eq!(written, 2, "section {i}");
        }
        assert_eq!(data["course.sections.0.room"], "A1");
        assert_eq!(data["course.sections.1.room"], "B2");
        assert_eq!(data["course.sections.0.nth"], "S1");
        assert_eq!(data["course.sections.1.nth"], "S2");
        // "S1-1" is a child step that matches nothing.
        assert!(!data.contains_key("course.sections.0.tag"));
    }

    #[test]
    fn unknown_variable_is_field_parse_error() {
        let d = doc(r#"<course id="CS101">Intro</course>"#);
        let mut scope = ConfigScope::root();
        scope.set("fields/title", "${nowhere.title}");
        let mut data = CourseFields::new();
        let err = tool()
            .retrieve_data(&d, course(&d), &scope, &mut data)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Parse { detail, .. } if detail.contains("nowhere.title")));
    }

    #[test]
    fn course_variable_is_visible() {
        let d = doc(r#"<catalog><course id="CS101">Intro</course><course id="CS102">Next</course></catalog>"#);
        let mut scope = ConfigScope::root();
        scope.set("fields/self", "/catalog/course[@id='${unit.course}']");
        let mut data = CourseFields::new();
        tool()
            .for_course("CS102")
            .retrieve_data(&d, course(&d), &scope, &mut data)
            .unwrap();
        assert_eq!(data["self"], "Next");
    }

    #[test]
    fn works_over_text_records() {
        use super::text::{TextCatalog, TextLayout};
        let catalog = TextCatalog::parse("CS101\tIntro\n", &TextLayout::standard().unwrap());
        let mut scope = ConfigScope::root();
        scope.set("fields/id", "$1").set("fields/title", "$2");
        let mut data = CourseFields::new();
        tool()
            .retrieve_data(&catalog, catalog.groups()[0], &scope, &mut data)
            .unwrap();
        assert_eq!(data["id"], "CS101");
        assert_eq!(data["title"], "Intro");
    }
}
