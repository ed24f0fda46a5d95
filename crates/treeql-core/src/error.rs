//! Error types for TreeQL
//!
//! Every stage of the pipeline reports failures through the single [`Error`]
//! enum. Errors abort the whole request; nothing partial is ever returned.

use thiserror::Error;

/// Broad classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The query text could not be tokenized or does not follow the grammar
    Lex,
    /// The query is well formed but does not make sense against the schema
    Semantic,
    /// Plan building or the backing engine failed
    Evaluation,
    /// Schema construction, configuration, IO and serialization failures
    Ambient,
}

/// The main error type for TreeQL operations
#[derive(Error, Debug)]
pub enum Error {
    // ========== Lex Errors ==========
    #[error("line {line}: cannot tokenize `{text}`")]
    MalformedLine { line: usize, text: String },

    #[error("line {line}: expected a query model on the first line but received `{text}` instead")]
    MissingRoot { line: usize, text: String },

    #[error("line {line}: {message} at offset {offset}\n{pointer}")]
    MalformedFilter {
        line: usize,
        offset: usize,
        message: String,
        pointer: String,
    },

    #[error("closing }} not found while parsing {model}")]
    UnterminatedBlock { model: String },

    #[error("line {line}: expected {expected}, found {found}")]
    UnexpectedToken {
        line: usize,
        expected: String,
        found: String,
    },

    #[error("unexpected end of query, expected {expected}")]
    UnexpectedEnd { expected: String },

    // ========== Semantic Errors ==========
    #[error("unknown model `{0}`")]
    UnknownModel(String),

    #[error("model `{model}` has no attribute `{attribute}`")]
    UnknownAttribute { model: String, attribute: String },

    #[error("model `{model}` has no relationship `{relationship}`")]
    UnknownRelationship { model: String, relationship: String },

    #[error("cannot cast relationship `{relationship}` to `{cast}`: not a variant of `{target}`")]
    InvalidCast {
        relationship: String,
        target: String,
        cast: String,
    },

    #[error("cannot specify `{selector}` filter on {context}")]
    InvalidQuantifier { selector: String, context: String },

    #[error("line {line}: operator `{operator}` requires {expected}")]
    OperatorValueMismatch {
        line: usize,
        operator: String,
        expected: String,
    },

    #[error("line {line}: boolean values only support `==`, found `{operator}`")]
    BooleanOperator { line: usize, operator: String },

    #[error("line {line}: list literal mixes {first} and {other} elements")]
    HeterogeneousList {
        line: usize,
        first: String,
        other: String,
    },

    #[error("line {line}: filter mixes `*` with quantified selectors")]
    MixedSelectors { line: usize },

    #[error("line {line}: filter mixes {first} and {other} literals")]
    MixedLiteralTypes {
        line: usize,
        first: String,
        other: String,
    },

    #[error("type mismatch on `{attribute}`: expected {expected}, found {found}")]
    TypeMismatch {
        attribute: String,
        expected: String,
        found: String,
    },

    #[error("invalid {declared} literal for `{attribute}`: {literal}")]
    InvalidLiteral {
        attribute: String,
        declared: String,
        literal: String,
    },

    // ========== Evaluation Errors ==========
    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("engine error: {0}")]
    Engine(String),

    // ========== Schema Errors ==========
    #[error("schema error: {0}")]
    Schema(String),

    // ========== Configuration Errors ==========
    #[error("configuration error: {0}")]
    Configuration(String),

    // ========== IO Errors ==========
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========== Serialization Errors ==========
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for TreeQL operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::MalformedLine { .. }
            | Error::MissingRoot { .. }
            | Error::MalformedFilter { .. }
            | Error::UnterminatedBlock { .. }
            | Error::UnexpectedToken { .. }
            | Error::UnexpectedEnd { .. } => ErrorCategory::Lex,

            Error::UnknownModel(_)
            | Error::UnknownAttribute { .. }
            | Error::UnknownRelationship { .. }
            | Error::InvalidCast { .. }
            | Error::InvalidQuantifier { .. }
            | Error::OperatorValueMismatch { .. }
            | Error::BooleanOperator { .. }
            | Error::HeterogeneousList { .. }
            | Error::MixedSelectors { .. }
            | Error::MixedLiteralTypes { .. }
            | Error::TypeMismatch { .. }
            | Error::InvalidLiteral { .. } => ErrorCategory::Semantic,

            Error::Evaluation(_) | Error::Engine(_) => ErrorCategory::Evaluation,

            Error::Schema(_) | Error::Configuration(_) | Error::Io(_) | Error::Serialization(_) => {
                ErrorCategory::Ambient
            }
        }
    }

    /// Returns true if the query text itself is at fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Lex | ErrorCategory::Semantic
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownModel("Sample".to_string());
        assert_eq!(err.to_string(), "unknown model `Sample`");

        let err = Error::UnterminatedBlock {
            model: "Tube".to_string(),
        };
        assert_eq!(err.to_string(), "closing } not found while parsing Tube");
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            Error::MissingRoot {
                line: 1,
                text: "Sample {".into()
            }
            .category(),
            ErrorCategory::Lex
        );
        assert_eq!(
            Error::MixedSelectors { line: 3 }.category(),
            ErrorCategory::Semantic
        );
        assert_eq!(
            Error::Evaluation("bad selector".into()).category(),
            ErrorCategory::Evaluation
        );
    }

    #[test]
    fn test_client_error() {
        assert!(Error::UnknownModel("X".into()).is_client_error());
        assert!(!Error::Engine("down".into()).is_client_error());
        assert!(!Error::Configuration("port".into()).is_client_error());
    }
}
