use folio_model::{Fragment, Mark, Node, Slice, Value};

use crate::attr_step::{AttrStep, DocAttrStep};
use crate::error::TransformError;
use crate::fitter::replace_step;
use crate::map::Mapping;
use crate::mark::MarkPattern;
use crate::mark_step::{AddNodeMarkStep, RemoveNodeMarkStep, node_at};
use crate::step::{Step, StepResult};

/// Builds up a sequence of steps against a document.
///
/// Every successful step replaces `doc`, keeps the document it was applied
/// to in `docs`, and appends its map to `mapping`, so the three lists always
/// have the same length.
#[derive(Debug, Clone)]
pub struct Transform {
    doc: Node,
    steps: Vec<Step>,
    docs: Vec<Node>,
    mapping: Mapping,
}

impl Transform {
    pub fn new(doc: Node) -> Self {
        Self {
            doc,
            steps: Vec::new(),
            docs: Vec::new(),
            mapping: Mapping::new(),
        }
    }

    /// The current document.
    pub fn doc(&self) -> &Node {
        &self.doc
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The document before each step.
    pub fn docs(&self) -> &[Node] {
        &self.docs
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// The document this transform started from.
    pub fn before(&self) -> &Node {
        self.docs.first().unwrap_or(&self.doc)
    }

    pub fn doc_changed(&self) -> bool {
        !self.steps.is_empty()
    }

    /// Apply a step, failing the whole operation when the document rejects
    /// it.
    pub fn step(&mut self, step: Step) -> Result<&mut Self, TransformError> {
        let doc = step.apply(&self.doc)?;
        self.add_step(step, doc);
        Ok(self)
    }

    /// Apply a step if it can be applied, leaving the transform untouched
    /// otherwise.
    pub fn maybe_step(&mut self, step: Step) -> StepResult {
        match step.apply(&self.doc) {
            Ok(doc) => {
                self.add_step(step, doc.clone());
                Ok(doc)
            }
            Err(failure) => {
                log::debug!("skipping step {step:?}: {failure}");
                Err(failure)
            }
        }
    }

    pub(crate) fn add_step(&mut self, step: Step, doc: Node) {
        let previous = std::mem::replace(&mut self.doc, doc);
        self.docs.push(previous);
        self.mapping.append_map(step.get_map(), None);
        self.steps.push(step);
    }

    pub(crate) fn check_range(&self, from: usize, to: usize) -> Result<(), TransformError> {
        let size = self.doc.content().size();
        if from > to || to > size {
            return Err(TransformError::InvalidArgument(format!(
                "range {from}..{to} outside of document of size {size}"
            )));
        }
        Ok(())
    }

    pub(crate) fn check_pos(&self, pos: usize) -> Result<(), TransformError> {
        self.check_range(pos, pos)
    }

    /// Replace `from..to` with `slice`, fitting the slice to the surrounding
    /// structure. Adds nothing when the change would be a no-op.
    pub fn replace(&mut self, from: usize, to: usize, slice: Slice) -> Result<&mut Self, TransformError> {
        self.check_range(from, to)?;
        if let Some(step) = replace_step(&self.doc, from, to, &slice) {
            self.step(step)?;
        }
        Ok(self)
    }

    pub fn replace_with(
        &mut self,
        from: usize,
        to: usize,
        content: impl Into<Fragment>,
    ) -> Result<&mut Self, TransformError> {
        self.replace(from, to, Slice::new(content.into(), 0, 0))
    }

    pub fn delete(&mut self, from: usize, to: usize) -> Result<&mut Self, TransformError> {
        self.replace(from, to, Slice::empty())
    }

    pub fn insert(&mut self, pos: usize, content: impl Into<Fragment>) -> Result<&mut Self, TransformError> {
        self.replace_with(pos, pos, content)
    }

    pub fn set_node_attribute(
        &mut self,
        pos: usize,
        attr: impl Into<String>,
        value: Value,
    ) -> Result<&mut Self, TransformError> {
        self.step(AttrStep::new(pos, attr, value).into())
    }

    pub fn set_doc_attribute(&mut self, attr: impl Into<String>, value: Value) -> Result<&mut Self, TransformError> {
        self.step(DocAttrStep::new(attr, value).into())
    }

    pub fn add_node_mark(&mut self, pos: usize, mark: Mark) -> Result<&mut Self, TransformError> {
        self.step(AddNodeMarkStep::new(pos, mark).into())
    }

    /// Remove the marks matching `pattern` from the node at `pos`.
    pub fn remove_node_mark(&mut self, pos: usize, pattern: &MarkPattern) -> Result<&mut Self, TransformError> {
        let Some(node) = node_at(&self.doc, pos) else {
            return Err(TransformError::InvalidArgument(format!("no node at position {pos}")));
        };
        let matching: Vec<Mark> = node
            .marks()
            .iter()
            .filter(|mark| pattern.matches(mark))
            .cloned()
            .collect();
        for mark in matching {
            self.step(RemoveNodeMarkStep::new(pos, mark).into())?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{Assoc, Mappable};
    use folio_model::basic::basic_schema;
    use folio_model::builders::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_step_bookkeeping() {
        let doc = document![p!["hello"]];
        let mut tr = Transform::new(doc.clone());
        assert!(!tr.doc_changed());
        tr.insert(6, basic_schema().text("!", vec![]))
            .unwrap()
            .delete(1, 2)
            .unwrap();
        assert_eq!(tr.doc(), &document![p!["ello!"]]);
        assert_eq!(tr.before(), &doc);
        assert_eq!(tr.steps().len(), 2);
        assert_eq!(tr.docs().len(), 2);
        assert_eq!(tr.mapping().len(), 2);
        assert_eq!(tr.docs()[1], document![p!["hello!"]]);
        assert_eq!(tr.mapping().map(6, Assoc::Before), 5);
    }

    #[test]
    fn test_failed_step_leaves_transform_untouched() {
        let doc = document![p!["ab"]];
        let mut tr = Transform::new(doc.clone());
        let bad: Step = AttrStep::new(1, "level", json!(2)).into();
        assert!(tr.maybe_step(bad.clone()).is_err());
        assert!(matches!(tr.step(bad), Err(TransformError::StepFailed(_))));
        assert_eq!(tr.doc(), &doc);
        assert!(tr.steps().is_empty());
    }

    #[test]
    fn test_no_op_replace_adds_no_step() {
        let mut tr = Transform::new(document![p!["ab"]]);
        tr.delete(2, 2).unwrap();
        assert!(!tr.doc_changed());
    }

    #[test]
    fn test_out_of_range_arguments_are_rejected() {
        let mut tr = Transform::new(document![p!["ab"]]);
        assert!(matches!(tr.delete(1, 40), Err(TransformError::InvalidArgument(_))));
        assert!(matches!(tr.delete(3, 1), Err(TransformError::InvalidArgument(_))));
    }

    #[test]
    fn test_node_marks() {
        let em = basic_schema().mark("em", None).unwrap();
        let mut tr = Transform::new(document![p![img!()]]);
        tr.add_node_mark(1, em.clone()).unwrap();
        assert_eq!(tr.doc(), &document![p![em![img!()]]]);
        tr.remove_node_mark(1, &MarkPattern::Type(em.ty().clone())).unwrap();
        assert_eq!(tr.doc(), &document![p![img!()]]);
        assert_eq!(tr.steps().len(), 2);
    }
}
