use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use folio_model::{Mark, Node, Schema};

use crate::error::TransactionError;
use crate::meta::{APPENDED_TRANSACTION, PluginKey};
use crate::plugin::{Plugin, PluginState};
use crate::selection::Selection;
use crate::transaction::Transaction;

/// Everything needed to create an [`EditorState`].
pub struct EditorStateConfig {
    pub doc: Node,
    /// Defaults to the first valid selection in the document.
    pub selection: Option<Selection>,
    pub stored_marks: Option<Vec<Mark>>,
    pub plugins: Vec<Arc<dyn Plugin>>,
}

impl EditorStateConfig {
    pub fn new(doc: Node) -> Self {
        Self {
            doc,
            selection: None,
            stored_marks: None,
            plugins: Vec::new(),
        }
    }
}

/// The result of [`EditorState::apply_transaction`]: the new state and
/// every transaction that went into it, the original one first.
#[derive(Debug)]
pub struct AppliedTransaction {
    pub state: EditorState,
    pub transactions: Vec<Transaction>,
}

/// An immutable snapshot of an editor: document, selection, stored marks
/// and one state field per plugin. Applying a transaction produces a new
/// state and leaves this one untouched.
#[derive(Clone)]
pub struct EditorState {
    doc: Node,
    selection: Selection,
    stored_marks: Option<Vec<Mark>>,
    plugins: Arc<[Arc<dyn Plugin>]>,
    fields: HashMap<PluginKey, PluginState>,
}

impl EditorState {
    /// Create a state and initialize every plugin's field in order.
    ///
    /// Panics when two plugins share a key.
    pub fn create(config: EditorStateConfig) -> EditorState {
        for (i, plugin) in config.plugins.iter().enumerate() {
            if config.plugins[..i].iter().any(|p| p.key() == plugin.key()) {
                panic!("plugin key {} is used by more than one plugin", plugin.key());
            }
        }
        let selection = config.selection.unwrap_or_else(|| Selection::at_start(&config.doc));
        let mut state = EditorState {
            doc: config.doc,
            selection,
            stored_marks: config.stored_marks,
            plugins: config.plugins.into(),
            fields: HashMap::new(),
        };
        let plugins = Arc::clone(&state.plugins);
        for plugin in plugins.iter() {
            if let Some(value) = plugin.init(&state) {
                state.fields.insert(plugin.key().clone(), value);
            }
        }
        state
    }

    pub fn doc(&self) -> &Node {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn stored_marks(&self) -> Option<&[Mark]> {
        self.stored_marks.as_deref()
    }

    pub fn schema(&self) -> &Schema {
        self.doc.ty().schema()
    }

    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    /// The state field of the plugin with `key`, if it has one of type `T`.
    pub fn plugin_state<T: Any>(&self, key: &PluginKey) -> Option<&T> {
        self.fields.get(key).and_then(|value| (**value).downcast_ref::<T>())
    }

    /// Start a transaction on this state.
    pub fn tr(&self) -> Transaction {
        Transaction::new(self.doc.clone(), self.selection.clone(), self.stored_marks.clone())
    }

    /// Apply a transaction, including anything plugins append to it.
    pub fn apply(&self, tr: Transaction) -> Result<EditorState, TransactionError> {
        Ok(self.apply_transaction(tr)?.state)
    }

    fn filter_transaction(&self, tr: &Transaction, ignore: Option<usize>) -> bool {
        self.plugins
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != ignore)
            .all(|(_, plugin)| plugin.filter_transaction(tr, self))
    }

    /// Apply `root`, then let plugins append transactions until none of
    /// them has anything more to add. Each plugin is shown every
    /// transaction exactly once, together with the state from before the
    /// first one it hasn't seen.
    pub fn apply_transaction(&self, root: Transaction) -> Result<AppliedTransaction, TransactionError> {
        if !self.filter_transaction(&root, None) {
            log::debug!("transaction dropped by a plugin filter");
            return Ok(AppliedTransaction {
                state: self.clone(),
                transactions: Vec::new(),
            });
        }
        let root_meta = root.meta().clone();
        let mut new_state = self.apply_inner(&root)?;
        let mut transactions = vec![root];
        // Per plugin: the state it last saw and how many transactions it has seen.
        let mut seen: Option<Vec<(EditorState, usize)>> = None;
        loop {
            let mut have_new = false;
            for (i, plugin) in self.plugins.iter().enumerate() {
                let appended = {
                    let (n, old_state) = match &seen {
                        Some(seen) => (seen[i].1, &seen[i].0),
                        None => (0, self),
                    };
                    if n < transactions.len() {
                        plugin.append_transaction(&transactions[n..], old_state, &new_state)
                    } else {
                        None
                    }
                };
                if let Some(mut tr) = appended
                    && new_state.filter_transaction(&tr, Some(i))
                {
                    tr.set_meta(APPENDED_TRANSACTION, root_meta.clone());
                    if seen.is_none() {
                        seen = Some(
                            (0..self.plugins.len())
                                .map(|j| {
                                    if j < i {
                                        (new_state.clone(), transactions.len())
                                    } else {
                                        (self.clone(), 0)
                                    }
                                })
                                .collect(),
                        );
                    }
                    new_state = new_state.apply_inner(&tr)?;
                    transactions.push(tr);
                    have_new = true;
                }
                if let Some(seen) = seen.as_mut() {
                    seen[i] = (new_state.clone(), transactions.len());
                }
            }
            if !have_new {
                return Ok(AppliedTransaction {
                    state: new_state,
                    transactions,
                });
            }
        }
    }

    fn apply_inner(&self, tr: &Transaction) -> Result<EditorState, TransactionError> {
        if !tr.before().ptr_eq(&self.doc) && tr.before() != &self.doc {
            return Err(TransactionError::MismatchedDocument);
        }
        let mut new_state = EditorState {
            doc: tr.doc().clone(),
            selection: tr.selection(),
            stored_marks: tr.stored_marks().map(<[Mark]>::to_vec),
            plugins: Arc::clone(&self.plugins),
            fields: HashMap::new(),
        };
        for plugin in self.plugins.iter() {
            if let Some(value) = self.fields.get(plugin.key()) {
                let next = plugin.apply(tr, value, self, &new_state);
                new_state.fields.insert(plugin.key().clone(), next);
            }
        }
        Ok(new_state)
    }
}

impl fmt::Debug for EditorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorState")
            .field("doc", &self.doc)
            .field("selection", &self.selection)
            .field("stored_marks", &self.stored_marks)
            .field("plugins", &self.plugins.iter().map(|p| p.key().to_string()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Meta;
    use crate::selection::TextSelection;
    use folio_model::basic::basic_schema;
    use folio_model::builders::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Counts the transactions applied since creation.
    struct Counter {
        key: PluginKey,
    }

    impl Plugin for Counter {
        fn key(&self) -> &PluginKey {
            &self.key
        }

        fn init(&self, _state: &EditorState) -> Option<PluginState> {
            Some(Arc::new(0usize))
        }

        fn apply(&self, _tr: &Transaction, value: &PluginState, _old: &EditorState, _new: &EditorState) -> PluginState {
            let count = (**value).downcast_ref::<usize>().copied().unwrap_or(0);
            Arc::new(count + 1)
        }
    }

    /// Appends a "!" to the first paragraph after every user edit.
    struct Exclaim {
        key: PluginKey,
    }

    impl Plugin for Exclaim {
        fn key(&self) -> &PluginKey {
            &self.key
        }

        fn append_transaction(&self, trs: &[Transaction], _old: &EditorState, new: &EditorState) -> Option<Transaction> {
            let user_edit = trs
                .iter()
                .any(|tr| tr.doc_changed() && tr.get_meta::<Meta>(APPENDED_TRANSACTION).is_none());
            if !user_edit {
                return None;
            }
            let mut tr = new.tr();
            let end = new.doc().child(0).node_size() - 1;
            tr.insert(end, new.schema().text("!", vec![])).ok()?;
            Some(tr)
        }
    }

    /// Records how many transactions each append call was shown.
    struct Recorder {
        key: PluginKey,
        calls: Mutex<Vec<usize>>,
    }

    impl Plugin for Recorder {
        fn key(&self) -> &PluginKey {
            &self.key
        }

        fn append_transaction(&self, trs: &[Transaction], _old: &EditorState, _new: &EditorState) -> Option<Transaction> {
            self.calls.lock().unwrap().push(trs.len());
            None
        }
    }

    /// Rejects every transaction that changes the document.
    struct ReadOnly {
        key: PluginKey,
    }

    impl Plugin for ReadOnly {
        fn key(&self) -> &PluginKey {
            &self.key
        }

        fn filter_transaction(&self, tr: &Transaction, _state: &EditorState) -> bool {
            !tr.doc_changed()
        }
    }

    #[test]
    fn test_create_selects_document_start() {
        let state = EditorState::create(EditorStateConfig::new(document![p!["ab"]]));
        let expected: Selection = TextSelection::create(state.doc(), 1, 1).into();
        assert_eq!(state.selection(), &expected);
        assert!(state.stored_marks().is_none());
    }

    #[test]
    fn test_apply_updates_document_and_selection() {
        let state = EditorState::create(EditorStateConfig::new(document![p!["ab"]]));
        let mut tr = state.tr();
        tr.insert_text("x").unwrap();
        let next = state.apply(tr).unwrap();
        assert_eq!(next.doc(), &document![p!["xab"]]);
        assert_eq!(next.selection().head(), 2);
        assert_eq!(state.doc(), &document![p!["ab"]]);
    }

    #[test]
    fn test_mismatched_transaction_is_rejected() {
        let state = EditorState::create(EditorStateConfig::new(document![p!["ab"]]));
        let other = EditorState::create(EditorStateConfig::new(document![p!["cd"]]));
        let result = state.apply(other.tr());
        assert!(matches!(result, Err(TransactionError::MismatchedDocument)));
    }

    #[test]
    fn test_plugin_state_follows_transactions() {
        let key = PluginKey::new("counter");
        let state = EditorState::create(EditorStateConfig {
            plugins: vec![Arc::new(Counter { key: key.clone() })],
            ..EditorStateConfig::new(document![p!["ab"]])
        });
        assert_eq!(state.plugin_state::<usize>(&key), Some(&0));
        let state = state.apply(state.tr()).unwrap();
        let state = state.apply(state.tr()).unwrap();
        assert_eq!(state.plugin_state::<usize>(&key), Some(&2));
        assert_eq!(state.plugin_state::<String>(&key), None);
    }

    #[test]
    fn test_filtered_transaction_is_dropped() {
        let state = EditorState::create(EditorStateConfig {
            plugins: vec![Arc::new(ReadOnly { key: PluginKey::new("read-only") })],
            ..EditorStateConfig::new(document![p!["ab"]])
        });
        let mut tr = state.tr();
        tr.insert_text("x").unwrap();
        let applied = state.apply_transaction(tr).unwrap();
        assert!(applied.transactions.is_empty());
        assert_eq!(applied.state.doc(), state.doc());
    }

    #[test]
    fn test_append_loop_shows_each_transaction_once() {
        let _ = env_logger::builder().is_test(true).try_init();
        let recorder = Arc::new(Recorder {
            key: PluginKey::new("recorder"),
            calls: Mutex::new(Vec::new()),
        });
        let counter_key = PluginKey::new("counter");
        let state = EditorState::create(EditorStateConfig {
            plugins: vec![
                Arc::new(Exclaim { key: PluginKey::new("exclaim") }) as Arc<dyn Plugin>,
                recorder.clone() as Arc<dyn Plugin>,
                Arc::new(Counter { key: counter_key.clone() }) as Arc<dyn Plugin>,
            ],
            ..EditorStateConfig::new(document![p!["ab"]])
        });
        let mut tr = state.tr();
        tr.insert_text("x").unwrap();
        let applied = state.apply_transaction(tr).unwrap();

        assert_eq!(applied.state.doc(), &document![p!["xab!"]]);
        assert_eq!(applied.transactions.len(), 2);
        assert!(
            applied.transactions[1]
                .get_meta::<Meta>(APPENDED_TRANSACTION)
                .is_some()
        );
        assert_eq!(*recorder.calls.lock().unwrap(), vec![2]);
        assert_eq!(applied.state.plugin_state::<usize>(&counter_key), Some(&2));
    }

    #[test]
    fn test_schema_comes_from_document() {
        let state = EditorState::create(EditorStateConfig::new(document![p!["ab"]]));
        assert!(state.schema().node_type("paragraph").is_some());
        assert_eq!(state.schema().top_node_type(), basic_schema().top_node_type());
    }
}
