pub mod field;
pub mod scope;
pub mod store;

pub use field::{Aggregation, FieldDefaults, FieldDefinition};
pub use scope::ConfigScope;
pub use store::{CourseFields, ResultStore};
