use folio_model::{Fragment, Node, Slice, Value};

use crate::error::StepFailure;
use crate::map::{Assoc, Mappable};
use crate::mark_step::node_at;
use crate::replace_step::apply_replace;
use crate::step::StepResult;

/// Set a single attribute on the node at `pos`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrStep {
    pos: usize,
    attr: String,
    value: Value,
}

impl AttrStep {
    pub fn new(pos: usize, attr: impl Into<String>, value: Value) -> Self {
        Self {
            pos,
            attr: attr.into(),
            value,
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn apply(&self, doc: &Node) -> StepResult {
        let Some(node) = node_at(doc, self.pos) else {
            return Err(StepFailure::new("No node at attribute step's position"));
        };
        if node.is_text() {
            return Err(StepFailure::new("Text nodes have no attributes"));
        }
        let mut attrs = node.attrs().clone();
        attrs.insert(self.attr.clone(), self.value.clone());
        let updated = node
            .ty()
            .create(Some(&attrs), Fragment::empty(), node.marks().to_vec());
        let open_end = if node.is_leaf() { 0 } else { 1 };
        apply_replace(
            doc,
            self.pos,
            self.pos + 1,
            &Slice::new(Fragment::from(updated), 0, open_end),
        )
    }

    /// Restores the value the attribute had in `doc`.
    pub fn invert(&self, doc: &Node) -> AttrStep {
        let previous = node_at(doc, self.pos)
            .and_then(|n| n.attr(&self.attr).cloned())
            .unwrap_or(Value::Null);
        AttrStep::new(self.pos, self.attr.clone(), previous)
    }

    pub fn map<M: Mappable + ?Sized>(&self, mapping: &M) -> Option<AttrStep> {
        let pos = mapping.map_result(self.pos, Assoc::After);
        (!pos.deleted_after()).then(|| AttrStep::new(pos.pos, self.attr.clone(), self.value.clone()))
    }
}

/// Set an attribute on the document node itself.
#[derive(Debug, Clone, PartialEq)]
pub struct DocAttrStep {
    attr: String,
    value: Value,
}

impl DocAttrStep {
    pub fn new(attr: impl Into<String>, value: Value) -> Self {
        Self {
            attr: attr.into(),
            value,
        }
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn apply(&self, doc: &Node) -> StepResult {
        let mut attrs = doc.attrs().clone();
        attrs.insert(self.attr.clone(), self.value.clone());
        Ok(doc
            .ty()
            .create(Some(&attrs), doc.content().clone(), doc.marks().to_vec()))
    }

    pub fn invert(&self, doc: &Node) -> DocAttrStep {
        let previous = doc.attr(&self.attr).cloned().unwrap_or(Value::Null);
        DocAttrStep::new(self.attr.clone(), previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_model::builders::*;
    use folio_model::{NodeSpec, Schema, SchemaSpec};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_set_heading_level_and_invert() {
        let doc = document![h1!["Title"]];
        let step = AttrStep::new(0, "level", json!(2));
        let changed = step.apply(&doc).unwrap();
        assert_eq!(changed, document![h2!["Title"]]);
        let inverse = step.invert(&doc);
        assert_eq!(inverse.value(), &json!(1));
        assert_eq!(inverse.apply(&changed).unwrap(), doc);
    }

    #[test]
    fn test_attr_on_leaf_node() {
        let doc = document![p![img!("a.png")]];
        let changed = AttrStep::new(1, "src", json!("b.png")).apply(&doc).unwrap();
        assert_eq!(changed, document![p![img!("b.png")]]);
    }

    #[test]
    fn test_attr_step_without_node_fails() {
        let doc = document![p!["x"]];
        assert!(AttrStep::new(1, "level", json!(1)).apply(&doc).is_err());
        assert!(AttrStep::new(3, "level", json!(1)).apply(&doc).is_err());
    }

    #[test]
    fn test_doc_attr() {
        let schema = Schema::new(
            SchemaSpec::new()
                .node("doc", NodeSpec::new().content("paragraph+").attr("lang", Some(json!("en"))))
                .node("paragraph", NodeSpec::new().content("text*"))
                .node("text", NodeSpec::new()),
        )
        .unwrap();
        let para = schema.node("paragraph", None, Fragment::empty(), vec![]).unwrap();
        let doc = schema.node("doc", None, Fragment::from(para), vec![]).unwrap();
        let step = DocAttrStep::new("lang", json!("fr"));
        let changed = step.apply(&doc).unwrap();
        assert_eq!(changed.attr("lang"), Some(&json!("fr")));
        let inverse = step.invert(&doc);
        assert_eq!(inverse.value(), &json!("en"));
        assert_eq!(inverse.apply(&changed).unwrap(), doc);
    }
}
