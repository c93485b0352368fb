use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::{SystemTime, UNIX_EPOCH};

use folio_model::{Mark, Node, Slice};
use folio_transform::{MarkPattern, Transform, TransformError};

use crate::error::TransactionError;
use crate::meta::{Meta, MetaKey};
use crate::selection::{Bias, Selection};

const UPDATED_SEL: u8 = 1;
const UPDATED_MARKS: u8 = 2;
const UPDATED_SCROLL: u8 = 4;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A [`Transform`] that also tracks the selection, stored marks, a
/// timestamp and arbitrary metadata. Build one with
/// [`EditorState::tr`](crate::EditorState::tr) and apply it with
/// [`EditorState::apply`](crate::EditorState::apply).
///
/// The selection is cached together with the number of steps it was last
/// mapped through. Reading it maps the cache forward over any steps added
/// since. Stored marks are reset by every new step.
#[derive(Clone)]
pub struct Transaction {
    transform: Transform,
    time: u64,
    selection: RefCell<Selection>,
    selection_for: Cell<usize>,
    stored_marks: Option<Vec<Mark>>,
    stored_marks_for: usize,
    updated: u8,
    meta: Meta,
}

impl Transaction {
    pub(crate) fn new(doc: Node, selection: Selection, stored_marks: Option<Vec<Mark>>) -> Self {
        Self {
            transform: Transform::new(doc),
            time: now_millis(),
            selection: RefCell::new(selection),
            selection_for: Cell::new(0),
            stored_marks,
            stored_marks_for: 0,
            updated: 0,
            meta: Meta::default(),
        }
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Milliseconds since the Unix epoch when the transaction was created,
    /// unless overridden with [`set_time`](Self::set_time).
    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn set_time(&mut self, time: u64) -> &mut Self {
        self.time = time;
        self
    }

    /// The selection, mapped through the steps added since it was set.
    pub fn selection(&self) -> Selection {
        let steps = self.transform.steps().len();
        let mapped_for = self.selection_for.get();
        if mapped_for < steps {
            let mapped = self
                .selection
                .borrow()
                .map(self.transform.doc(), &self.transform.mapping().slice_from(mapped_for));
            self.selection.replace(mapped);
            self.selection_for.set(steps);
        }
        self.selection.borrow().clone()
    }

    /// Replace the selection. It must be resolved against the current
    /// document.
    pub fn set_selection(&mut self, selection: Selection) -> Result<&mut Self, TransactionError> {
        if !selection.from_pos().doc().ptr_eq(self.transform.doc()) {
            return Err(TransactionError::ForeignSelection);
        }
        let steps = self.transform.steps().len();
        self.selection.replace(selection);
        self.selection_for.set(steps);
        self.updated = (self.updated | UPDATED_SEL) & !UPDATED_MARKS;
        self.stored_marks = None;
        self.stored_marks_for = steps;
        Ok(self)
    }

    pub fn selection_set(&self) -> bool {
        self.updated & UPDATED_SEL > 0
    }

    /// Marks to apply to the next typed text, if any were set and no step
    /// has been added since.
    pub fn stored_marks(&self) -> Option<&[Mark]> {
        if self.stored_marks_for == self.transform.steps().len() {
            self.stored_marks.as_deref()
        } else {
            None
        }
    }

    pub fn set_stored_marks(&mut self, marks: Option<Vec<Mark>>) -> &mut Self {
        self.stored_marks = marks;
        self.stored_marks_for = self.transform.steps().len();
        self.updated |= UPDATED_MARKS;
        self
    }

    pub fn stored_marks_set(&self) -> bool {
        self.updated & UPDATED_MARKS > 0 && self.stored_marks_for == self.transform.steps().len()
    }

    fn current_marks(&self, from_head: bool) -> Vec<Mark> {
        match self.stored_marks() {
            Some(marks) => marks.to_vec(),
            None => {
                let selection = self.selection();
                if from_head {
                    selection.head_pos().marks()
                } else {
                    selection.from_pos().marks()
                }
            }
        }
    }

    /// Store `marks` unless they already are the marks at the cursor.
    pub fn ensure_marks(&mut self, marks: Vec<Mark>) -> &mut Self {
        if !Mark::same_set(&self.current_marks(false), &marks) {
            self.set_stored_marks(Some(marks));
        }
        self
    }

    pub fn add_stored_mark(&mut self, mark: &Mark) -> &mut Self {
        let marks = mark.add_to_set(&self.current_marks(true));
        self.ensure_marks(marks)
    }

    pub fn remove_stored_mark(&mut self, pattern: impl Into<MarkPattern>) -> &mut Self {
        let pattern = pattern.into();
        let mut marks = self.current_marks(true);
        marks.retain(|mark| !pattern.matches(mark));
        self.ensure_marks(marks)
    }

    /// Replace the selection with `slice`.
    pub fn replace_selection(&mut self, slice: Slice) -> Result<&mut Self, TransactionError> {
        let selection = self.selection();
        selection.replace(self, slice)?;
        Ok(self)
    }

    /// Replace the selection with `node`, which takes on the marks at the
    /// selection when `inherit_marks` is set.
    pub fn replace_selection_with(&mut self, node: Node, inherit_marks: bool) -> Result<&mut Self, TransactionError> {
        let selection = self.selection();
        let node = if inherit_marks {
            let marks = match self.stored_marks() {
                Some(marks) => marks.to_vec(),
                None if selection.empty() => selection.from_pos().marks(),
                None => selection
                    .from_pos()
                    .marks_across(selection.to_pos())
                    .unwrap_or_default(),
            };
            node.mark(marks)
        } else {
            node
        };
        selection.replace_with(self, node)?;
        Ok(self)
    }

    pub fn delete_selection(&mut self) -> Result<&mut Self, TransactionError> {
        let selection = self.selection();
        selection.replace(self, Slice::empty())?;
        Ok(self)
    }

    /// Replace the selection with `text`, using the stored marks or the
    /// marks at the selection.
    pub fn insert_text(&mut self, text: &str) -> Result<&mut Self, TransactionError> {
        if text.is_empty() {
            return self.delete_selection();
        }
        let node = self.transform.doc().ty().schema().text(text, Vec::new());
        self.replace_selection_with(node, true)
    }

    /// Replace `from..to` with `text`.
    pub fn insert_text_at(&mut self, text: &str, from: usize, to: usize) -> Result<&mut Self, TransactionError> {
        let size = self.transform.doc().content().size();
        if from > to || to > size {
            return Err(TransformError::InvalidArgument(format!(
                "range {from}..{to} outside of document of size {size}"
            ))
            .into());
        }
        if text.is_empty() {
            self.transform.delete_range(from, to)?;
            return Ok(self);
        }
        let marks = match self.stored_marks() {
            Some(marks) => marks.to_vec(),
            None => {
                let doc = self.transform.doc();
                let rfrom = doc.resolve(from);
                if from == to {
                    rfrom.marks()
                } else {
                    rfrom.marks_across(&doc.resolve(to)).unwrap_or_default()
                }
            }
        };
        let node = self.transform.doc().ty().schema().text(text, marks);
        self.transform.replace_range_with(from, to, node)?;
        let selection = self.selection();
        if !selection.empty() && selection.to() == from + text.chars().count() {
            self.set_selection(Selection::near(selection.to_pos(), Bias::Forward))?;
        }
        Ok(self)
    }

    pub fn set_meta<T: Any + Send + Sync>(&mut self, key: impl Into<MetaKey>, value: T) -> &mut Self {
        self.meta.set(key, value);
        self
    }

    pub fn get_meta<T: Any>(&self, key: impl Into<MetaKey>) -> Option<&T> {
        self.meta.get(key)
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// True when no metadata was attached, meaning the transaction can be
    /// treated as a plain document edit.
    pub fn is_generic(&self) -> bool {
        self.meta.is_empty()
    }

    pub fn scroll_into_view(&mut self) -> &mut Self {
        self.updated |= UPDATED_SCROLL;
        self
    }

    pub fn scrolled_into_view(&self) -> bool {
        self.updated & UPDATED_SCROLL > 0
    }
}

impl Deref for Transaction {
    type Target = Transform;

    fn deref(&self) -> &Transform {
        &self.transform
    }
}

impl DerefMut for Transaction {
    fn deref_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("steps", &self.transform.steps())
            .field("time", &self.time)
            .field("selection", &self.selection())
            .field("meta", &self.meta)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::{NodeSelection, TextSelection};
    use crate::state::{EditorState, EditorStateConfig};
    use folio_model::basic::basic_schema;
    use folio_model::builders::*;
    use pretty_assertions::assert_eq;

    fn state_with(doc: Node, anchor: usize, head: usize) -> EditorState {
        let selection = TextSelection::create(&doc, anchor, head).into();
        EditorState::create(EditorStateConfig {
            selection: Some(selection),
            ..EditorStateConfig::new(doc)
        })
    }

    fn strong() -> Mark {
        basic_schema().mark("strong", None).unwrap()
    }

    #[test]
    fn test_selection_follows_steps() {
        let state = state_with(document![p!["abcd"]], 3, 3);
        let mut tr = state.tr();
        tr.insert(1, basic_schema().text("xy", vec![])).unwrap();
        assert_eq!(tr.selection().head(), 5);
        assert!(!tr.selection_set());
    }

    #[test]
    fn test_selection_is_mapped_forward_from_last_read() {
        let state = state_with(document![p!["abcd"]], 3, 3);
        let mut tr = state.tr();
        tr.insert(1, basic_schema().text("xy", vec![])).unwrap();
        assert_eq!(tr.selection().head(), 5);
        assert_eq!(tr.selection().head(), 5);
        tr.insert(1, basic_schema().text("z", vec![])).unwrap();
        tr.insert(7, basic_schema().text("q", vec![])).unwrap();
        assert_eq!(tr.doc(), &document![p!["zxyabcqd"]]);
        let selection = tr.selection();
        assert_eq!((selection.anchor(), selection.head()), (6, 6));
        assert!(selection.from_pos().doc().ptr_eq(tr.doc()));
    }

    #[test]
    fn test_foreign_selection_is_rejected() {
        let state = state_with(document![p!["abcd"]], 1, 1);
        let mut tr = state.tr();
        let other = document![p!["abcd"]];
        let result = tr.set_selection(TextSelection::create(&other, 2, 2).into());
        assert!(matches!(result, Err(TransactionError::ForeignSelection)));
        let own = TextSelection::create(tr.doc(), 2, 2).into();
        tr.set_selection(own).unwrap();
        assert!(tr.selection_set());
    }

    #[test]
    fn test_insert_text_replaces_selection_and_moves_cursor() {
        let state = state_with(document![p!["abcd"]], 2, 4);
        let mut tr = state.tr();
        tr.insert_text("X").unwrap();
        assert_eq!(tr.doc(), &document![p!["aXd"]]);
        let selection = tr.selection();
        assert!(selection.empty());
        assert_eq!(selection.head(), 3);
    }

    #[test]
    fn test_insert_text_inherits_marks() {
        let state = state_with(document![p![strong!["ab"]]], 2, 2);
        let mut tr = state.tr();
        tr.insert_text("x").unwrap();
        assert_eq!(tr.doc(), &document![p![strong!["axb"]]]);
    }

    #[test]
    fn test_stored_marks_apply_to_typed_text_and_reset_on_step() {
        let state = state_with(document![p!["ab"]], 2, 2);
        let mut tr = state.tr();
        tr.add_stored_mark(&strong());
        assert!(tr.stored_marks_set());
        assert_eq!(tr.stored_marks(), Some(&[strong()][..]));
        tr.insert_text("x").unwrap();
        assert_eq!(tr.doc(), &document![p!["a", strong!["x"], "b"]]);
        assert_eq!(tr.stored_marks(), None);
        assert!(!tr.stored_marks_set());
    }

    #[test]
    fn test_remove_stored_mark() {
        let state = state_with(document![p![strong!["ab"]]], 2, 2);
        let mut tr = state.tr();
        tr.remove_stored_mark(strong().ty().clone());
        assert_eq!(tr.stored_marks(), Some(&[][..]));
        // already matching marks are not stored again
        let mut tr = state.tr();
        tr.ensure_marks(vec![strong()]);
        assert!(!tr.stored_marks_set());
    }

    #[test]
    fn test_delete_selection_keeps_marks_across() {
        let state = state_with(document![p![strong!["abc"]]], 2, 3);
        let mut tr = state.tr();
        tr.delete_selection().unwrap();
        assert_eq!(tr.doc(), &document![p![strong!["ac"]]]);
        assert_eq!(tr.selection().head(), 2);
        // the marks match the cursor, so nothing needs storing
        assert!(!tr.stored_marks_set());
    }

    #[test]
    fn test_replace_selection_with_block_node() {
        let state = state_with(document![p!["ab"]], 2, 2);
        let mut tr = state.tr();
        tr.replace_selection_with(hr!(), false).unwrap();
        assert_eq!(tr.doc(), &document![p!["a"], hr!(), p!["b"]]);
        assert_eq!(tr.selection().head(), 5);
    }

    #[test]
    fn test_replace_node_selection() {
        let doc = document![p!["a"], hr!()];
        let selection = NodeSelection::create(&doc, 3).into();
        let state = EditorState::create(EditorStateConfig {
            selection: Some(selection),
            ..EditorStateConfig::new(doc)
        });
        let mut tr = state.tr();
        tr.replace_selection(Slice::new(p!["b"].into(), 0, 0)).unwrap();
        assert_eq!(tr.doc(), &document![p!["a"], p!["b"]]);
    }

    #[test]
    fn test_insert_text_at_range() {
        let state = state_with(document![p!["abcd"]], 1, 1);
        let mut tr = state.tr();
        tr.insert_text_at("XY", 2, 4).unwrap();
        assert_eq!(tr.doc(), &document![p!["aXYd"]]);
        tr.insert_text_at("", 1, 3).unwrap();
        assert_eq!(tr.doc(), &document![p!["Yd"]]);
        assert!(tr.insert_text_at("z", 3, 40).is_err());
    }

    #[test]
    fn test_meta_and_flags() {
        let state = state_with(document![p!["ab"]], 1, 1);
        let mut tr = state.tr();
        assert!(tr.is_generic());
        tr.set_meta(crate::meta::ADD_TO_HISTORY, false).set_time(42).scroll_into_view();
        assert_eq!(tr.get_meta::<bool>(crate::meta::ADD_TO_HISTORY), Some(&false));
        assert!(!tr.is_generic());
        assert_eq!(tr.time(), 42);
        assert!(tr.scrolled_into_view());
    }
}
