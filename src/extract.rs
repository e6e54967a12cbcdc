use std::sync::Arc;

use crate::config::EngineSettings;
use crate::engine::pool::WorkerPool;
use crate::error::{ExtractError, Result};
use crate::models::scope::ConfigScope;
use crate::routine::input::InputSource;
use crate::routine::registry::Registry;

pub use crate::engine::decompose::{Extraction, UnitFailure};

/// Run one extraction on a fresh worker pool.
///
/// An unknown `source_id` is a `RegistryLookup` error and the input is
/// never read.
pub fn run_extraction(
    registry: &Registry,
    source_id: &str,
    input: Box<dyn InputSource>,
    scope: Arc<ConfigScope>,
    settings: &EngineSettings,
) -> Result<Extraction> {
    if !registry.contains(source_id) {
        return Err(ExtractError::RegistryLookup {
            id: source_id.to_string(),
        });
    }
    let pool = WorkerPool::new(settings.workers)?;
    run_extraction_in(&pool, registry, source_id, input, scope, settings)
}

/// Same as [`run_extraction`], on a caller-owned pool.
pub fn run_extraction_in(
    pool: &WorkerPool,
    registry: &Registry,
    source_id: &str,
    input: Box<dyn InputSource>,
    scope: Arc<ConfigScope>,
    settings: &EngineSettings,
) -> Result<Extraction> {
    let mut routine =
        registry
            .create(source_id, input, scope)
            .ok_or_else(|| ExtractError::RegistryLookup {
                id: source_id.to_string(),
            })?;

    let extraction = routine.execute(pool, settings)?;
    tracing::info!(
        source = source_id,
        courses = extraction.store.len(),
        failures = extraction.failures.len(),
        "extraction finished"
    );
    Ok(extraction)
}
