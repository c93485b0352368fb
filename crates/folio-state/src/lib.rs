//! Editor state on top of folio documents and transforms.
//!
//! An [`EditorState`] bundles a document, a [`Selection`], stored marks and
//! one state field per [`Plugin`]. It is never changed in place: build a
//! [`Transaction`] with [`EditorState::tr`], then
//! [`apply`](EditorState::apply) it to get the next state.

mod error;
mod meta;
mod plugin;
mod selection;
mod state;
mod transaction;

pub use error::{SelectionJsonError, TransactionError};
pub use meta::{ADD_TO_HISTORY, APPENDED_TRANSACTION, COMPOSITION, Meta, MetaKey, PluginKey, REBASED};
pub use plugin::{Plugin, PluginState};
pub use selection::{AllSelection, Bias, GapSelection, NodeSelection, Selection, SelectionBookmark, TextSelection};
pub use state::{AppliedTransaction, EditorState, EditorStateConfig};
pub use transaction::Transaction;
