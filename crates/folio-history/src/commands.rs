//! Undo and redo as commands on an [`EditorState`].
//!
//! Commands return the transaction to apply, or `None` when there is
//! nothing to do.

use folio_state::{EditorState, Transaction};

use crate::history::HistoryState;
use crate::plugin::{close_history_key, history_key};

pub fn history_state(state: &EditorState) -> Option<&HistoryState> {
    state.plugin_state::<HistoryState>(&history_key())
}

fn history_transaction(state: &EditorState, redo: bool, scroll: bool) -> Option<Transaction> {
    let history = history_state(state)?;
    let branch = if redo { history.undone() } else { history.done() };
    if branch.event_count() == 0 {
        return None;
    }
    let mut tr = history.transaction(state, redo)?;
    if scroll {
        tr.scroll_into_view();
    }
    Some(tr)
}

/// Undo the last change and scroll it into view.
pub fn undo(state: &EditorState) -> Option<Transaction> {
    history_transaction(state, false, true)
}

/// Redo the last undone change and scroll it into view.
pub fn redo(state: &EditorState) -> Option<Transaction> {
    history_transaction(state, true, true)
}

pub fn undo_no_scroll(state: &EditorState) -> Option<Transaction> {
    history_transaction(state, false, false)
}

pub fn redo_no_scroll(state: &EditorState) -> Option<Transaction> {
    history_transaction(state, true, false)
}

/// Number of undoable events.
pub fn undo_depth(state: &EditorState) -> usize {
    history_state(state).map_or(0, |history| history.done().event_count())
}

/// Number of redoable events.
pub fn redo_depth(state: &EditorState) -> usize {
    history_state(state).map_or(0, |history| history.undone().event_count())
}

/// Make sure the next change starts a new undo event, however close it
/// is to the previous one.
pub fn close_history(tr: &mut Transaction) -> &mut Transaction {
    tr.set_meta(close_history_key(), true)
}
