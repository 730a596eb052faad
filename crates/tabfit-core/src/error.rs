use thiserror::Error;

/// Error type shared by every tabfit crate.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TabError {
    #[error("Invalid argument `{field}`: {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Schema mismatch on column `{column}`: {reason}")]
    SchemaMismatch { column: String, reason: String },

    #[error("Unknown preprocessing step kind: {0}")]
    UnknownStepKind(String),

    #[error("Unsupported output: {0}")]
    UnsupportedOutput(String),

    #[error("Invalid hyperparameter: {name} = {value}, {reason}")]
    InvalidHyperparameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Fit failure: {0}")]
    FitFailure(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Singular matrix: cannot invert or decompose")]
    SingularMatrix,

    #[error("Deadline exceeded after {elapsed_ms} ms")]
    DeadlineExceeded { elapsed_ms: u128 },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TabError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        TabError::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn schema_mismatch(column: impl Into<String>, reason: impl Into<String>) -> Self {
        TabError::SchemaMismatch {
            column: column.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_hyperparameter(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        TabError::InvalidHyperparameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for TabError {
    fn from(err: serde_json::Error) -> Self {
        TabError::Serialization(err.to_string())
    }
}

pub type TabResult<T> = Result<T, TabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TabError::invalid_hyperparameter("neighbors", 0, "must be >= 1");
        assert_eq!(
            err.to_string(),
            "Invalid hyperparameter: neighbors = 0, must be >= 1"
        );
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: TabError = json_err.into();
        assert!(matches!(err, TabError::Serialization(_)));
    }
}
