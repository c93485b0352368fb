//! Undo history for folio editor states.
//!
//! Add a [`History`] plugin to an [`EditorState`](folio_state::EditorState)
//! and it records the inverse of every change. [`undo`] and [`redo`] build
//! the transactions that walk back and forth through it. Changes close
//! together in time and position are grouped into one event, configured by
//! [`HistoryConfig`](folio_config::HistoryConfig).

mod branch;
mod commands;
mod history;
mod plugin;

pub use branch::{Branch, DEPTH_OVERFLOW, MAX_EMPTY_ITEMS};
pub use commands::{
    close_history, history_state, redo, redo_depth, redo_no_scroll, undo, undo_depth, undo_no_scroll,
};
pub use history::HistoryState;
pub use plugin::{History, history_key};
