//! Error types for harmonizer.

use thiserror::Error;

/// The main error type for translation.
#[derive(Debug, Error)]
pub enum TranslationError {
    /// The source text could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The requested chain is not one of the supported datasets.
    #[error("Unknown dataset: '{0}'. Expected one of: ethereum, gnosis, optimism, bnb, polygon")]
    UnknownDataset(String),

    /// A column could not be resolved against the schema.
    #[error("Unknown column: {column}{}", suggestion.as_ref().map(|s| format!(" (did you mean '{}'?)", s)).unwrap_or_default())]
    UnknownColumn {
        column: String,
        suggestion: Option<String>,
    },

    /// A qualifier does not name any table in scope.
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// A column is provided by more than one table in scope.
    #[error("Ambiguous column: {0}")]
    AmbiguousColumn(String),

    /// The requested options contradict each other.
    #[error("Invalid option combination: {0}")]
    InvalidOptionCombination(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranslationError {
    /// Create an unknown column error.
    pub fn unknown_column(column: impl Into<String>, suggestion: Option<String>) -> Self {
        Self::UnknownColumn {
            column: column.into(),
            suggestion,
        }
    }

    /// Rewrite the human-readable text of the error, keeping its kind.
    pub(crate) fn map_message(self, f: impl Fn(&str) -> String) -> Self {
        match self {
            Self::Parse(m) => Self::Parse(f(&m)),
            Self::UnknownColumn { column, suggestion } => Self::UnknownColumn {
                column: f(&column),
                suggestion: suggestion.map(|s| f(&s)),
            },
            Self::UnknownTable(m) => Self::UnknownTable(f(&m)),
            Self::AmbiguousColumn(m) => Self::AmbiguousColumn(f(&m)),
            other => other,
        }
    }
}

/// Result type alias for translation.
pub type TranslationResult<T> = Result<T, TranslationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TranslationError::unknown_column("col", None);
        assert_eq!(err.to_string(), "Unknown column: col");

        let err = TranslationError::unknown_column("amout", Some("amount".into()));
        assert_eq!(
            err.to_string(),
            "Unknown column: amout (did you mean 'amount'?)"
        );
    }

    #[test]
    fn test_map_message_keeps_kind() {
        let err = TranslationError::Parse("near __param_x__".into());
        let err = err.map_message(|m| m.replace("__param_x__", "{{x}}"));
        assert_eq!(err.to_string(), "Parse error: near {{x}}");
    }
}
