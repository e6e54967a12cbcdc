use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot prepare input for {source_id}: {detail}")]
    InputPreparation { source_id: String, detail: String },

    #[error("parse error in field '{field}' at {scope}: {detail}")]
    Parse {
        field: String,
        scope: String,
        detail: String,
    },

    #[error("unknown variable: ${{{key}}}")]
    UnknownVariable { key: String },

    #[error("unterminated placeholder at position {position}")]
    UnterminatedPlaceholder { position: usize },

    #[error("no routine registered for source: {id}")]
    RegistryLookup { id: String },

    #[error("course already claimed by another task: {id}")]
    DuplicateCourse { id: String },

    #[error("{failed} of {total} batch task(s) failed; first: {first}")]
    Batch {
        failed: usize,
        total: usize,
        first: Box<ExtractError>,
    },

    #[error("task panicked: {label}: {message}")]
    TaskPanicked { label: String, message: String },

    #[error("task cancelled: {label}")]
    Cancelled { label: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl ExtractError {
    /// Re-scope a variable error raised while resolving a field query.
    #[must_use]
    pub fn at_field(self, field: &str, scope: &str) -> Self {
        match self {
            e @ (Self::UnknownVariable { .. } | Self::UnterminatedPlaceholder { .. }) => {
                Self::Parse {
                    field: field.to_string(),
                    scope: scope.to_string(),
                    detail: e.to_string(),
                }
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
