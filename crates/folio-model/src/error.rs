use thiserror::Error;

/// Failure of a structural replace. This is the one recoverable error the
/// model reports while building a new document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplaceError {
    #[error("Inserted content deeper than insertion position")]
    DeeperThanInsertion,
    #[error("Inconsistent open depths")]
    InconsistentOpenDepths,
    #[error("Cannot join {sub} onto {main}")]
    CannotJoin { sub: String, main: String },
    #[error("Invalid content for node {node}")]
    InvalidContent { node: String },
    #[error("Removing non-flat range")]
    NonFlatRange,
    #[error("Position {pos} out of range")]
    OutOfRange { pos: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),
    #[error("Unknown mark type: {0}")]
    UnknownMarkType(String),
    #[error("No node type or group '{name}' found (in content expression '{expr}')")]
    UnknownContentName { name: String, expr: String },
    #[error("Invalid content expression '{expr}': {reason}")]
    InvalidContentExpression { expr: String, reason: String },
    #[error("Schema is missing its top node type '{0}'")]
    MissingTopNode(String),
    #[error("Invalid content for node {0}")]
    InvalidContent(String),
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
}
