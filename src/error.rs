//! Errors raised while compiling a query.
//!
//! Every error is fatal for the statement being transformed: the first
//! problem found is returned and no partial output is produced.

use thiserror::Error;

/// Errors that can occur while transforming a query.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("\"{name}\" not found in path \"{path}\"")]
    UnresolvablePath { name: String, path: String },

    #[error("Ambiguous reference \"{name}\", found in {}", .candidates.join(", "))]
    AmbiguousReference {
        name: String,
        candidates: Vec<String>,
    },

    #[error("Operator \"{op}\" is not supported for structured operand \"{path}\"")]
    UnsupportedStructOperator { op: String, path: String },

    #[error("Can't compare \"{lhs}\" with \"{rhs}\": the operands have different structures")]
    StructureMismatch { lhs: String, rhs: String },

    #[error("Path step \"{step}\" of \"{path}\" has no foreign keys")]
    MissingForeignKeys { step: String, path: String },

    #[error("Filter shorthand on \"{path}\" needs exactly one non-association key, found {found}")]
    FilterNeedsSingleKey { path: String, found: usize },

    #[error("Query on \"{entity}\" has no columns left to select")]
    EmptyProjection { entity: String },

    #[error("Expected \"{path}\" after exists to end in an association")]
    InvalidExistsTarget { path: String },

    #[error("Structured element or association \"{path}\" can't be used as a value")]
    AssociationAsValue { path: String },

    #[error("Unknown entity \"{0}\"")]
    UnknownEntity(String),

    #[error("Duplicate alias \"{0}\"")]
    DuplicateAlias(String),

    #[error("Duplicate column name \"{0}\"")]
    DuplicateColumn(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl TransformError {
    pub(crate) fn unresolvable(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::UnresolvablePath {
            name: name.into(),
            path: path.into(),
        }
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }
}

pub type TransformResult<T> = Result<T, TransformError>;
