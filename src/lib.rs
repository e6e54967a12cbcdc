// Pedantic lint configuration for the crate.
// Most of these are reasonable but too strict for this codebase:
// - missing_errors_doc: Error handling is self-evident from Result types
// - missing_panics_doc: Panics are rare and documented inline
// - items_after_statements: Output structs are clearer near their usage
// - too_many_lines: Path and markup lowering need cohesive logic
// - similar_names: Variable naming is contextually clear
// - option_if_let_else: if-let is often clearer
// - fn_params_excessive_bools: CLI flags are naturally boolean
// - trivially_copy_pass_by_ref: Minor optimization not worth churn
// - needless_pass_by_value: Sometimes clearer semantically
// - match_same_arms: Combined arms can reduce readability
// - single_match_else: match is clearer than if-let for pattern matching
// - module_name_repetitions: Names like `MarkupDocument` read better in logs
// - manual_let_else: if-let with early return is often clearer in context
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::items_after_statements,
    clippy::too_many_lines,
    clippy::similar_names,
    clippy::option_if_let_else,
    clippy::fn_params_excessive_bools,
    clippy::trivially_copy_pass_by_ref,
    clippy::needless_pass_by_value,
    clippy::match_same_arms,
    clippy::single_match_else,
    clippy::module_name_repetitions,
    clippy::manual_let_else
)]

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod models;
pub mod query;
pub mod routine;
pub mod vars;

pub use error::{ExtractError, Result};
pub use extract::{run_extraction, Extraction, UnitFailure};
