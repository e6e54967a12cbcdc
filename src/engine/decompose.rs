//! Course-level fork/join.
//!
//! Each course group becomes one [`CourseTask`]. The task extracts the
//! course record, then its sections in document order, forking a section's
//! meetings onto the pool when there are enough of them. It builds its field
//! map privately and publishes it to the [`ResultStore`] exactly once.

use std::sync::Arc;

use rayon::prelude::*;

use crate::engine::batch::{BatchExecutor, FailurePolicy};
use crate::engine::pool::WorkerPool;
use crate::engine::task::Task;
use crate::error::{ExtractError, Result};
use crate::models::scope::ConfigScope;
use crate::models::store::{CourseFields, ResultStore};
use crate::query::{CourseDocument, QueryTool};

/// Profile node holding course-level fields.
pub const COURSE_SCOPE: &str = "course";
/// Profile node holding section-level fields.
pub const SECTION_SCOPE: &str = "course/sections";
/// Profile node holding meeting-level fields.
pub const MEETING_SCOPE: &str = "course/sections/meetings";
/// Key prefix for section fields.
pub const SECTION_PREFIX: &str = "course.sections";

/// Shared, read-only inputs of every course task in a run.
#[derive(Debug, Clone)]
pub struct UnitContext {
    pub tool: QueryTool,
    /// Course field whose value identifies the course.
    pub id_field: String,
    pub fork_threshold: usize,
}

/// A unit that completed exceptionally.
#[derive(Debug)]
pub struct UnitFailure {
    pub label: String,
    /// Set when the failure happened after the course id was known.
    pub course_id: Option<String>,
    pub error: ExtractError,
}

/// The outcome of one extraction run: everything that was extracted, plus
/// every unit that failed.
#[derive(Debug)]
pub struct Extraction {
    pub store: Arc<ResultStore>,
    pub failures: Vec<UnitFailure>,
}

impl Extraction {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Extracts one course and all of its sections and meetings.
pub struct CourseTask<D: CourseDocument> {
    doc: Arc<D>,
    group: D::Unit,
    index: usize,
    store: Arc<ResultStore>,
    scope: Arc<ConfigScope>,
    ctx: Arc<UnitContext>,
    course_id: Option<String>,
}

impl<D: CourseDocument> CourseTask<D> {
    pub fn new(
        doc: Arc<D>,
        group: D::Unit,
        index: usize,
        store: Arc<ResultStore>,
        scope: Arc<ConfigScope>,
        ctx: Arc<UnitContext>,
    ) -> Self {
        Self {
            doc,
            group,
            index,
            store,
            scope,
            ctx,
            course_id: None,
        }
    }

    fn course_id_for(&self, unit: D::Unit, fields: &CourseFields) -> String {
        if let Some(id) = fields.get(&self.ctx.id_field).filter(|v| !v.is_empty()) {
            return id.clone();
        }
        if let Some(id) = self.doc.unit_id(unit) {
            return id;
        }
        let id = format!("course-{}", self.index);
        tracing::warn!(course = self.index, id = %id, "course has no id, using a synthetic one");
        id
    }

    /// Sections in document order; the first failure stops the course.
    fn extract_sections(
        &self,
        tool: &QueryTool,
        sections: &[D::Unit],
        fields: &mut CourseFields,
    ) -> Result<()> {
        let section_scope = self.scope.node(SECTION_SCOPE);
        let meeting_scope = self.scope.node(MEETING_SCOPE);

        for (i, &section) in sections.iter().enumerate() {
            let key = format!("{SECTION_PREFIX}.{i}");
            if let Some(scope) = section_scope {
                tool.retrieve_data_indexed(
                    &*self.doc,
                    section,
                    i + 1,
                    scope,
                    SECTION_PREFIX,
                    &key,
                    fields,
                )?;
            }
            if let Some(scope) = meeting_scope {
                self.extract_meetings(tool, section, &key, scope, fields)?;
            }
        }
        Ok(())
    }

    /// Each meeting fills its own map; maps are merged in index order.
    fn extract_meetings(
        &self,
        tool: &QueryTool,
        section: D::Unit,
        section_key: &str,
        scope: &ConfigScope,
        fields: &mut CourseFields,
    ) -> Result<()> {
        let meetings = self.doc.meetings(section);
        if meetings.is_empty() {
            return Ok(());
        }

        let prefix = format!("{section_key}.meetings");
        let extract_one = |(j, &unit): (usize, &D::Unit)| {
            let mut own = CourseFields::new();
            let key = format!("{prefix}.{j}");
            let result =
                tool.retrieve_data_indexed(&*self.doc, unit, j + 1, scope, &prefix, &key, &mut own);
            (own, result)
        };

        let results: Vec<(CourseFields, Result<usize>)> =
            if meetings.len() >= self.ctx.fork_threshold {
                tracing::debug!(section = section_key, meetings = meetings.len(), "forking meetings");
                meetings.par_iter().enumerate().map(extract_one).collect()
            } else {
                meetings.iter().enumerate().map(extract_one).collect()
            };

        let mut first_error = None;
        for (own, result) in results {
            fields.extend(own);
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<D: CourseDocument> Task for CourseTask<D> {
    fn label(&self) -> String {
        format!("course #{}", self.index)
    }

    fn subject(&self) -> Option<String> {
        self.course_id.clone()
    }

    fn compute(&mut self) -> Result<()> {
        let members = self.doc.members(self.group);
        let Some((&course, sections)) = members.split_first() else {
            return Ok(());
        };

        let mut fields = CourseFields::new();
        let course_result = match self.scope.node(COURSE_SCOPE) {
            Some(scope) => self
                .ctx
                .tool
                .retrieve_data(&*self.doc, course, scope, &mut fields)
                .map(|_| ()),
            None => Ok(()),
        };

        let id = self.course_id_for(course, &fields);
        self.course_id = Some(id.clone());
        tracing::debug!(course = %id, sections = sections.len(), "extracting course");

        let tool = self.ctx.tool.for_course(&id);
        let result = course_result.and_then(|()| self.extract_sections(&tool, sections, &mut fields));

        // Partial results are published even when the course failed.
        let published = self.store.insert(&id, fields);
        result.and(published)
    }
}

/// Fork one task per course and join them all.
///
/// Never fails as a whole: every exceptional completion is returned as a
/// [`UnitFailure`] and the rest of the store stays populated.
pub fn run_course_tasks<D>(
    tasks: Vec<CourseTask<D>>,
    policy: Box<dyn FailurePolicy>,
    pool: &WorkerPool,
) -> Vec<UnitFailure>
where
    D: CourseDocument + 'static,
{
    let mut batch = BatchExecutor::with_policy(policy);
    for task in tasks {
        batch.push(Box::new(task));
    }
    tracing::info!(courses = batch.len(), "decomposed catalog");

    batch
        .run(pool)
        .outcomes
        .into_iter()
        .filter(|o| o.is_failure())
        .filter_map(|o| {
            o.error.map(|error| UnitFailure {
                label: o.label,
                course_id: o.subject,
                error,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::batch::{FailFast, LogAndContinue};
    use crate::models::field::FieldDefaults;
    use crate::query::markup::{Dialect, MarkupCatalog, MarkupDocument, MarkupLayout};
    use crate::vars::VariableContext;

    const CATALOG: &str = r#"<catalog>
  <course id="CS101"><name>Intro</name>
    <section id="S1"><room>A1</room>
      <meeting day="Mon"/><meeting day="Wed"/><meeting day="Fri"/>
    </section>
    <section id="S2"><room>B2</room></section>
  </course>
  <course id="CS102"><name>Data Structures</name>
    <section id="S1"><room>C3</room></section>
  </course>
  <course id="CS103"><name>Compilers</name></course>
</catalog>"#;

    const PROFILE: &str = r#"
[course.fields]
id = "@id"
name = "name"

[course.sections.fields]
room = "room"
id = "@id"

[course.sections.meetings.fields]
day = "@day"
"#;

    fn run(
        xml: &str,
        profile: &str,
        fork_threshold: usize,
        policy: Box<dyn FailurePolicy>,
    ) -> (Arc<ResultStore>, Vec<UnitFailure>) {
        let doc = MarkupDocument::parse(xml, Dialect::Xml).unwrap();
        let catalog = Arc::new(MarkupCatalog::new(doc, &MarkupLayout::default()).unwrap());
        let scope = Arc::new(ConfigScope::from_toml_str(profile).unwrap());
        let store = Arc::new(ResultStore::new());
        let ctx = Arc::new(UnitContext {
            tool: QueryTool::new(VariableContext::with_defaults(), FieldDefaults::default()),
            id_field: "id".into(),
            fork_threshold,
        });
        let tasks = catalog
            .groups()
            .into_iter()
            .enumerate()
            .map(|(i, g)| {
                CourseTask::new(
                    Arc::clone(&catalog),
                    g,
                    i,
                    Arc::clone(&store),
                    Arc::clone(&scope),
                    Arc::clone(&ctx),
                )
            })
            .collect();
        let pool = WorkerPool::new(4).unwrap();
        let failures = run_course_tasks(tasks, policy, &pool);
        (store, failures)
    }

    #[test]
    fn sections_get_disjoint_indexed_keys() {
        let (store, failures) = run(CATALOG, PROFILE, 4, Box::new(LogAndContinue));
        assert!(failures.is_empty(), "{failures:?}");
        assert_eq!(store.len(), 3);

        let cs101 = store.get("CS101").unwrap();
        assert_eq!(cs101["id"], "CS101");
        assert_eq!(cs101["name"], "Intro");
        assert_eq!(cs101["course.sections.0.room"], "A1");
        assert_eq!(cs101["course.sections.1.room"], "B2");
        assert_eq!(cs101["course.sections.0.id"], "S1");
        assert_eq!(cs101["course.sections.1.id"], "S2");

        let cs103 = store.get("CS103").unwrap();
        assert!(cs103.keys().all(|k| !k.starts_with("course.sections")));
    }

    #[test]
    fn meetings_keep_index_order_forked_or_not() {
        let (forked, _) = run(CATALOG, PROFILE, 1, Box::new(LogAndContinue));
        let (sequential, _) = run(CATALOG, PROFILE, 100, Box::new(LogAndContinue));
        let forked = forked.get("CS101").unwrap();
        assert_eq!(forked["course.sections.0.meetings.0.day"], "Mon");
        assert_eq!(forked["course.sections.0.meetings.1.day"], "Wed");
        assert_eq!(forked["course.sections.0.meetings.2.day"], "Fri");
        assert_eq!(forked, sequential.get("CS101").unwrap());
    }

    #[test]
    fn one_failing_course_does_not_block_others() {
        let profile = r#"
[course.fields]
id = "@id"
name = "name"

[course.sections.fields.room]
query = "room"
required = true
"#;
        let xml = r#"<catalog>
  <course id="A"><name>a</name><section><room>R1</room></section></course>
  <course id="B"><name>b</name><section/><section><room>R2</room></section></course>
  <course id="C"><name>c</name><section><room>R3</room></section></course>
</catalog>"#;
        let (store, failures) = run(xml, profile, 4, Box::new(LogAndContinue));
        assert_eq!(failures.len(), 1);
        let failure = &failures[0];
        assert_eq!(failure.course_id.as_deref(), Some("B"));
        assert!(matches!(&failure.error, ExtractError::Parse { field, scope, .. }
            if field == "room" && scope == "/course/sections"));

        assert_eq!(store.get("A").unwrap()["course.sections.0.room"], "R1");
        assert_eq!(store.get("C").unwrap()["course.sections.0.room"], "R3");

        // The failing course keeps what it had and stops at the bad section.
        let b = store.get("B").unwrap();
        assert_eq!(b["name"], "b");
        assert!(!b.contains_key("course.sections.1.room"));
    }

    #[test]
    fn duplicate_course_id_is_reported() {
        let xml = r#"<catalog><course id="X"><name>one</name></course><course id="X"><name>two</name></course></catalog>"#;
        let (store, failures) = run(xml, PROFILE, 4, Box::new(LogAndContinue));
        assert_eq!(store.len(), 1);
        assert_eq!(failures.len(), 1);
        assert!(matches!(&failures[0].error, ExtractError::DuplicateCourse { id } if id == "X"));
    }

    #[test]
    fn course_without_id_gets_synthetic_one() {
        let xml = "<catalog><course><name>anon</name></course></catalog>";
        let (store, failures) = run(xml, PROFILE, 4, Box::new(LogAndContinue));
        assert!(failures.is_empty());
        assert_eq!(store.get("course-0").unwrap()["name"], "anon");
    }

    #[test]
    fn id_field_falls_back_to_unit_id() {
        let profile = "[course.fields]\nname = \"name\"\n";
        let (store, _) = run(CATALOG, profile, 4, Box::new(LogAndContinue));
        assert_eq!(store.course_ids(), vec!["CS101", "CS102", "CS103"]);
    }

    #[test]
    fn course_variable_reaches_section_queries() {
        let profile = r#"
[course.fields]
id = "@id"

[course.sections.fields]
owner = "../../course[@id='${unit.course}']/name"
"#;
        let (store, failures) = run(CATALOG, profile, 4, Box::new(LogAndContinue));
        assert!(failures.is_empty(), "{failures:?}");
        assert_eq!(store.get("CS102").unwrap()["course.sections.0.owner"], "Data Structures");
    }

    #[test]
    fn fail_fast_reports_cancelled_courses() {
        let profile = "[course.fields.name]\nquery = \"missing\"\nrequired = true\n";
        let (_, failures) = run(CATALOG, profile, 4, Box::new(FailFast));
        assert!(!failures.is_empty());
        assert!(failures.len() <= 3);
        assert!(failures
            .iter()
            .all(|f| matches!(f.error, ExtractError::Parse { .. } | ExtractError::Cancelled { .. })));
    }
}
