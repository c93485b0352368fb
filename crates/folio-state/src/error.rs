use folio_transform::TransformError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// A selection was resolved against some other document than the
    /// transaction's current one.
    #[error("Selection does not point into the transaction's current document")]
    ForeignSelection,
    /// The transaction was built from a different document than the state
    /// it is applied to.
    #[error("Transaction was created for a different document")]
    MismatchedDocument,
    #[error(transparent)]
    Transform(#[from] TransformError),
}

#[derive(Debug, Error)]
pub enum SelectionJsonError {
    #[error("Invalid selection JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Selection position {pos} outside of document of size {size}")]
    OutOfRange { pos: usize, size: usize },
    #[error("No selectable node at position {0}")]
    NoSelectableNode(usize),
}
