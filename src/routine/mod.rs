//! Parser routines: one run of one input under one profile.

pub mod input;
pub mod loader;
pub mod registry;

use std::fmt;
use std::sync::Arc;

use crate::config::EngineSettings;
use crate::engine::batch::policy_for;
use crate::engine::decompose::{run_course_tasks, CourseTask, Extraction, UnitContext};
use crate::engine::pool::WorkerPool;
use crate::error::{ExtractError, Result};
use crate::models::field::FieldDefaults;
use crate::models::scope::ConfigScope;
use crate::models::store::ResultStore;
use crate::query::{CourseDocument, DocumentQuery, QueryTool};
use crate::vars::VariableContext;

pub use input::{FileSource, InputGuard, InputSource, StringSource};
pub use loader::{DocumentLoader, MarkupLoader, TextLoader};
pub use registry::Registry;

/// Profile node with routine behaviour toggles.
pub const ROUTINE_NODE: &str = "routine";
/// Default course field used as the course id.
const DEFAULT_ID_FIELD: &str = "id";

/// Where a routine is in its single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineState {
    Constructed,
    PreparingInput,
    Executing,
    Completed,
    CompletedExceptionally,
}

impl fmt::Display for RoutineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Constructed => "constructed",
            Self::PreparingInput => "preparing-input",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::CompletedExceptionally => "completed-exceptionally",
        };
        f.write_str(s)
    }
}

/// A unit of parsing work bound to one input and one profile.
///
/// Routines are single-use: a second `execute` is an error.
pub trait ParserRoutine: Send {
    fn source_id(&self) -> &str;

    fn state(&self) -> RoutineState;

    /// The store this routine's tasks write into.
    fn store(&self) -> Arc<ResultStore>;

    fn execute(&mut self, pool: &WorkerPool, settings: &EngineSettings) -> Result<Extraction>;
}

/// The course routine, generic over how its input becomes a document.
///
/// It owns the run's [`ResultStore`] and creates every course task.
pub struct CourseRoutine<L: DocumentLoader> {
    source_id: String,
    loader: L,
    input: Option<Box<dyn InputSource>>,
    scope: Arc<ConfigScope>,
    state: RoutineState,
    store: Arc<ResultStore>,
}

impl<L: DocumentLoader> CourseRoutine<L> {
    pub fn new(
        source_id: impl Into<String>,
        loader: L,
        input: Box<dyn InputSource>,
        scope: Arc<ConfigScope>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            loader,
            input: Some(input),
            scope,
            state: RoutineState::Constructed,
            store: Arc::new(ResultStore::new()),
        }
    }

    /// Read and parse the input. The input is closed when this returns,
    /// whether or not it succeeded.
    pub fn prepare_input(&mut self) -> Result<L::Document> {
        self.state = RoutineState::PreparingInput;
        let input = self
            .input
            .take()
            .ok_or_else(|| self.preparation_error("input already consumed"))?;
        let mut guard = InputGuard::new(input);

        let text = guard
            .read_to_string()
            .map_err(|e| self.preparation_error(e))?;
        let doc = self
            .loader
            .load(&text, self.scope.node(ROUTINE_NODE))
            .map_err(|e| self.preparation_error(e))?;

        tracing::debug!(source = %self.source_id, input = guard.name(), bytes = text.len(), "input prepared");
        Ok(doc)
    }

    /// One task per course group.
    pub fn create_unit_task(
        &self,
        doc: &Arc<L::Document>,
        unit: <L::Document as DocumentQuery>::Unit,
        index: usize,
        store: &Arc<ResultStore>,
        scope: &Arc<ConfigScope>,
        ctx: &Arc<UnitContext>,
    ) -> CourseTask<L::Document> {
        CourseTask::new(
            Arc::clone(doc),
            unit,
            index,
            Arc::clone(store),
            Arc::clone(scope),
            Arc::clone(ctx),
        )
    }

    /// Profile-derived inputs shared by all tasks.
    fn unit_context(&self, settings: &EngineSettings) -> Result<UnitContext> {
        let routine = self.scope.node(ROUTINE_NODE);
        let vars = VariableContext::for_profile(&self.scope)?;
        let defaults = FieldDefaults::from_scope(routine).map_err(ExtractError::Config)?;
        let id_field = routine
            .and_then(|r| r.get("id_field"))
            .unwrap_or(DEFAULT_ID_FIELD)
            .to_string();
        Ok(UnitContext {
            tool: QueryTool::new(vars, defaults),
            id_field,
            fork_threshold: settings.fork_threshold,
        })
    }

    fn preparation_error(&self, detail: impl fmt::Display) -> ExtractError {
        ExtractError::InputPreparation {
            source_id: self.source_id.clone(),
            detail: detail.to_string(),
        }
    }

    fn run(&mut self, pool: &WorkerPool, settings: &EngineSettings) -> Result<Extraction> {
        let ctx = Arc::new(self.unit_context(settings)?);
        let doc = Arc::new(self.prepare_input()?);

        self.state = RoutineState::Executing;
        let groups = doc.groups();
        tracing::info!(source = %self.source_id, courses = groups.len(), "extracting catalog");

        let tasks = groups
            .into_iter()
            .enumerate()
            .map(|(i, group)| self.create_unit_task(&doc, group, i, &self.store, &self.scope, &ctx))
            .collect();
        let failures = run_course_tasks(tasks, policy_for(settings.failure_policy), pool);

        Ok(Extraction {
            store: Arc::clone(&self.store),
            failures,
        })
    }
}

impl<L: DocumentLoader> ParserRoutine for CourseRoutine<L> {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn state(&self) -> RoutineState {
        self.state
    }

    fn store(&self) -> Arc<ResultStore> {
        Arc::clone(&self.store)
    }

    fn execute(&mut self, pool: &WorkerPool, settings: &EngineSettings) -> Result<Extraction> {
        if self.state != RoutineState::Constructed {
            return Err(ExtractError::Config(format!(
                "routine '{}' is {} and cannot run again",
                self.source_id, self.state
            )));
        }

        let result = self.run(pool, settings);
        self.state = match &result {
            Ok(extraction) if extraction.is_complete() => RoutineState::Completed,
            _ => RoutineState::CompletedExceptionally,
        };
        if let Err(e) = &result {
            tracing::warn!(source = %self.source_id, error = %e, "routine failed");
        }
        result
    }
}

impl<L: DocumentLoader> Drop for CourseRoutine<L> {
    /// Inputs never handed to `prepare_input` are still closed.
    fn drop(&mut self) {
        if let Some(input) = self.input.take() {
            drop(InputGuard::new(input));
        }
    }
}
