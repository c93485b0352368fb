use std::any::Any;
use std::sync::Arc;

use crate::meta::PluginKey;
use crate::state::EditorState;
use crate::transaction::Transaction;

/// The value a plugin keeps in the editor state.
pub type PluginState = Arc<dyn Any + Send + Sync>;

/// Extends an [`EditorState`] with its own state field and hooks into how
/// transactions are applied. Every method but [`key`](Plugin::key) has a
/// default that leaves things alone.
pub trait Plugin: Send + Sync {
    fn key(&self) -> &PluginKey;

    /// Initial value of the plugin's state field, or `None` when the plugin
    /// keeps no state.
    fn init(&self, _state: &EditorState) -> Option<PluginState> {
        None
    }

    /// Compute the field's next value. `new_state` only has the fields of
    /// plugins that come earlier in the plugin list.
    fn apply(&self, _tr: &Transaction, value: &PluginState, _old_state: &EditorState, _new_state: &EditorState) -> PluginState {
        Arc::clone(value)
    }

    /// Return false to drop the transaction.
    fn filter_transaction(&self, _tr: &Transaction, _state: &EditorState) -> bool {
        true
    }

    /// Optionally add a transaction after `transactions` were applied.
    /// Only transactions this plugin hasn't seen yet are passed.
    fn append_transaction(
        &self,
        _transactions: &[Transaction],
        _old_state: &EditorState,
        _new_state: &EditorState,
    ) -> Option<Transaction> {
        None
    }
}
