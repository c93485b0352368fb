use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::mark::{attrs_from_json, check_required};
use crate::{
    Attrs, ContentMatch, Fragment, Mark, MarkType, ModelError, NodeType, ReplaceError,
    ResolvedPos, Schema, Slice,
};

/// The substring of `text` between two char offsets.
pub(crate) fn char_slice(text: &str, from: usize, to: usize) -> String {
    text.chars().skip(from).take(to.saturating_sub(from)).collect()
}

struct NodeData {
    ty: NodeType,
    attrs: Attrs,
    content: Fragment,
    marks: Vec<Mark>,
    text: Option<String>,
    text_len: usize,
}

/// An immutable document node.
///
/// Nodes are reference counted, so cloning is cheap and every edit produces a
/// new tree that shares untouched subtrees with the old one.
///
/// ## Positions
///
/// A node's size is 1 for leaves, the character count for text, and the
/// content size plus 2 (opening and closing token) for everything else.
/// Positions count tokens from the start of a node's content.
#[derive(Clone)]
pub struct Node(Arc<NodeData>);

impl Node {
    pub(crate) fn new(ty: NodeType, attrs: Attrs, content: Fragment, marks: Vec<Mark>) -> Self {
        Node(Arc::new(NodeData {
            ty,
            attrs,
            content,
            marks,
            text: None,
            text_len: 0,
        }))
    }

    pub(crate) fn new_text(ty: NodeType, text: String, marks: Vec<Mark>) -> Self {
        assert!(!text.is_empty(), "Empty text nodes are not allowed");
        let text_len = text.chars().count();
        Node(Arc::new(NodeData {
            ty,
            attrs: Attrs::new(),
            content: Fragment::empty(),
            marks,
            text: Some(text),
            text_len,
        }))
    }

    pub fn ty(&self) -> &NodeType {
        &self.0.ty
    }

    pub fn attrs(&self) -> &Attrs {
        &self.0.attrs
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.0.attrs.get(name)
    }

    pub fn content(&self) -> &Fragment {
        &self.0.content
    }

    pub fn marks(&self) -> &[Mark] {
        &self.0.marks
    }

    pub fn text(&self) -> Option<&str> {
        self.0.text.as_deref()
    }

    pub(crate) fn text_str(&self) -> &str {
        self.0.text.as_deref().unwrap_or("")
    }

    /// Length of a text node in characters, 0 for other nodes.
    pub fn text_len(&self) -> usize {
        self.0.text_len
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn node_size(&self) -> usize {
        if self.is_text() {
            self.0.text_len
        } else if self.is_leaf() {
            1
        } else {
            2 + self.0.content.size()
        }
    }

    pub fn child_count(&self) -> usize {
        self.0.content.child_count()
    }

    pub fn child(&self, index: usize) -> &Node {
        self.0.content.child(index)
    }

    pub fn maybe_child(&self, index: usize) -> Option<&Node> {
        self.0.content.maybe_child(index)
    }

    pub fn first_child(&self) -> Option<&Node> {
        self.0.content.first_child()
    }

    pub fn last_child(&self) -> Option<&Node> {
        self.0.content.last_child()
    }

    pub fn is_text(&self) -> bool {
        self.0.ty.is_text()
    }

    pub fn is_leaf(&self) -> bool {
        self.0.ty.is_leaf()
    }

    pub fn is_atom(&self) -> bool {
        self.0.ty.is_atom()
    }

    pub fn is_inline(&self) -> bool {
        self.0.ty.is_inline()
    }

    pub fn is_block(&self) -> bool {
        self.0.ty.is_block()
    }

    pub fn is_textblock(&self) -> bool {
        self.0.ty.is_textblock()
    }

    pub fn inline_content(&self) -> bool {
        self.0.ty.inline_content()
    }

    /// Same node with different content.
    pub fn copy(&self, content: Fragment) -> Node {
        if self.is_text() {
            return self.clone();
        }
        Node::new(
            self.0.ty.clone(),
            self.0.attrs.clone(),
            content,
            self.0.marks.clone(),
        )
    }

    /// Same node with a different mark set.
    pub fn mark(&self, marks: Vec<Mark>) -> Node {
        if Mark::same_set(&marks, &self.0.marks) {
            return self.clone();
        }
        Node(Arc::new(NodeData {
            ty: self.0.ty.clone(),
            attrs: self.0.attrs.clone(),
            content: self.0.content.clone(),
            marks,
            text: self.0.text.clone(),
            text_len: self.0.text_len,
        }))
    }

    /// A text node with the same marks and different text.
    pub fn with_text(&self, text: &str) -> Node {
        if self.text() == Some(text) {
            return self.clone();
        }
        Node::new_text(self.0.ty.clone(), text.to_string(), self.0.marks.clone())
    }

    pub fn cut(&self, from: usize, to: usize) -> Node {
        if self.is_text() {
            if from == 0 && to == self.0.text_len {
                return self.clone();
            }
            return self.with_text(&char_slice(self.text_str(), from, to));
        }
        if from == 0 && to == self.0.content.size() {
            return self.clone();
        }
        self.copy(self.0.content.cut(from, to))
    }

    pub fn cut_from(&self, from: usize) -> Node {
        let end = if self.is_text() {
            self.0.text_len
        } else {
            self.0.content.size()
        };
        self.cut(from, end)
    }

    pub fn same_markup(&self, other: &Node) -> bool {
        self.has_markup(other.ty(), Some(other.attrs()), other.marks())
    }

    pub fn has_markup(&self, ty: &NodeType, attrs: Option<&Attrs>, marks: &[Mark]) -> bool {
        let attrs_match = match attrs.or(ty.default_attrs()) {
            Some(attrs) => attrs == &self.0.attrs,
            None => self.0.attrs.is_empty(),
        };
        &self.0.ty == ty && attrs_match && Mark::same_set(&self.0.marks, marks)
    }

    /// Resolve a position in this node. Panics when `pos` is outside the
    /// node's content.
    pub fn resolve(&self, pos: usize) -> ResolvedPos {
        ResolvedPos::resolve(self, pos)
    }

    /// The node directly after `pos`, descending as far as needed.
    pub fn node_at(&self, pos: usize) -> Option<Node> {
        let mut node = self.clone();
        let mut pos = pos;
        loop {
            if pos > node.content().size() {
                return None;
            }
            let (index, offset) = node.content().find_index(pos, -1);
            let child = node.maybe_child(index)?.clone();
            if offset == pos || child.is_text() {
                return Some(child);
            }
            pos -= offset + 1;
            node = child;
        }
    }

    pub fn child_after(&self, pos: usize) -> (Option<Node>, usize, usize) {
        let (index, offset) = self.0.content.find_index(pos, -1);
        (self.maybe_child(index).cloned(), index, offset)
    }

    pub fn nodes_between<F>(&self, from: usize, to: usize, f: &mut F)
    where
        F: FnMut(&Node, usize, Option<&Node>, usize) -> bool,
    {
        self.0.content.nodes_between(from, to, f, 0, Some(self));
    }

    pub fn descendants<F>(&self, f: &mut F)
    where
        F: FnMut(&Node, usize, Option<&Node>, usize) -> bool,
    {
        self.nodes_between(0, self.0.content.size(), f);
    }

    pub fn text_content(&self) -> String {
        if self.is_text() {
            return self.text_str().to_string();
        }
        self.text_between(0, self.0.content.size(), "")
    }

    pub fn text_between(&self, from: usize, to: usize, block_separator: &str) -> String {
        self.0.content.text_between(from, to, block_separator)
    }

    /// Whether any inline node in `from..to` carries a mark of `ty`.
    pub fn range_has_mark(&self, from: usize, to: usize, ty: &MarkType) -> bool {
        let mut found = false;
        if to > from {
            self.nodes_between(from, to, &mut |node, _, _, _| {
                if ty.is_in_set(node.marks()).is_some() {
                    found = true;
                }
                !found
            });
        }
        found
    }

    /// Slice of this node's content between two positions, open as deep as
    /// the positions go below their shared parent.
    pub fn slice(&self, from: usize, to: usize, include_parents: bool) -> Slice {
        if from == to {
            return Slice::empty();
        }
        let rfrom = self.resolve(from);
        let rto = self.resolve(to);
        let depth = if include_parents {
            0
        } else {
            rfrom.shared_depth(to)
        };
        let start = rfrom.start(depth);
        let node = rfrom.node(depth);
        let content = node.content().cut(rfrom.pos() - start, rto.pos() - start);
        Slice::new(content, rfrom.depth() - depth, rto.depth() - depth)
    }

    /// Replace `from..to` with `slice`, producing a new node.
    pub fn replace(&self, from: usize, to: usize, slice: &Slice) -> Result<Node, ReplaceError> {
        let size = self.0.content.size();
        if from > to || to > size {
            return Err(ReplaceError::OutOfRange { pos: to.max(from) });
        }
        crate::replace::replace(&self.resolve(from), &self.resolve(to), slice)
    }

    pub fn content_match_at(&self, index: usize) -> ContentMatch {
        match self
            .0
            .ty
            .content_match()
            .match_fragment(&self.0.content, 0, index)
        {
            Some(m) => m,
            None => panic!("Called content_match_at on a node with invalid content"),
        }
    }

    /// Whether replacing children `from..to` with `replacement[start..end]`
    /// leaves this node's content valid.
    pub fn can_replace(&self, from: usize, to: usize, replacement: &Fragment, start: usize, end: usize) -> bool {
        let Some(one) = self.content_match_at(from).match_fragment(replacement, start, end) else {
            return false;
        };
        let Some(two) = one.match_fragment(&self.0.content, to, self.child_count()) else {
            return false;
        };
        if !two.valid_end() {
            return false;
        }
        (start..end).all(|i| self.0.ty.allows_marks(replacement.child(i).marks()))
    }

    pub fn can_replace_range(&self, from: usize, to: usize) -> bool {
        self.can_replace(from, to, &Fragment::empty(), 0, 0)
    }

    pub fn can_replace_with(&self, from: usize, to: usize, ty: &NodeType, marks: Option<&[Mark]>) -> bool {
        if let Some(marks) = marks
            && !self.0.ty.allows_marks(marks)
        {
            return false;
        }
        let Some(start) = self.content_match_at(from).match_type(ty) else {
            return false;
        };
        start
            .match_fragment(&self.0.content, to, self.child_count())
            .is_some_and(|end| end.valid_end())
    }

    pub fn can_append(&self, other: &Node) -> bool {
        if other.content().size() > 0 {
            let count = self.child_count();
            self.can_replace(count, count, other.content(), 0, other.child_count())
        } else {
            self.0.ty.compatible_content(other.ty())
        }
    }

    /// Check this node and all descendants against the schema.
    pub fn check(&self) -> Result<(), ModelError> {
        if !self.0.ty.valid_content(&self.0.content) {
            return Err(ModelError::InvalidContent(format!(
                "{} cannot contain {}",
                self.0.ty.name(),
                self.0.content
            )));
        }
        for child in self.0.content.iter() {
            child.check()?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".into(), json!(self.0.ty.name()));
        if !self.0.attrs.is_empty() {
            obj.insert("attrs".into(), json!(self.0.attrs));
        }
        if let Some(content) = self.0.content.to_json() {
            obj.insert("content".into(), content);
        }
        if !self.0.marks.is_empty() {
            obj.insert(
                "marks".into(),
                Value::Array(self.0.marks.iter().map(Mark::to_json).collect()),
            );
        }
        if let Some(text) = &self.0.text {
            obj.insert("text".into(), json!(text));
        }
        Value::Object(obj)
    }

    /// Parse a node tree and check it against the schema.
    pub fn from_json(schema: &Schema, value: &Value) -> Result<Node, ModelError> {
        let node = Node::parse_json(schema, value)?;
        node.check()?;
        Ok(node)
    }

    /// Parse without validating content, for the open nodes at the edges of
    /// a slice.
    pub(crate) fn parse_json(schema: &Schema, value: &Value) -> Result<Node, ModelError> {
        let name = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ModelError::InvalidJson("node without a type".into()))?;
        let marks = match value.get("marks") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|m| Mark::from_json(schema, m))
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(ModelError::InvalidJson(format!(
                    "marks must be an array, got {other}"
                )));
            }
        };
        if name == "text" {
            let text = value
                .get("text")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| ModelError::InvalidJson("invalid text node".into()))?;
            return Ok(schema.text(text, marks));
        }
        let ty = schema
            .node_type(name)
            .ok_or_else(|| ModelError::UnknownNodeType(name.to_string()))?;
        let attrs = attrs_from_json(value.get("attrs"))?;
        check_required(&ty.spec().attrs, attrs.as_ref(), name)?;
        let content = Fragment::from_json(schema, value.get("content"))?;
        Ok(ty.create(attrs.as_ref(), content, marks))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        self.same_markup(other) && self.0.text == other.0.text && self.0.content == other.0.content
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut body = String::new();
        if let Some(text) = &self.0.text {
            body = format!("{text:?}");
        } else {
            body.push_str(self.0.ty.name());
            if self.0.content.size() > 0 {
                body.push('(');
                body.push_str(&format!("{}", DisplayInner(&self.0.content)));
                body.push(')');
            }
        }
        for mark in self.0.marks.iter().rev() {
            body = format!("{}({body})", mark.ty().name());
        }
        f.write_str(&body)
    }
}

struct DisplayInner<'a>(&'a Fragment);

impl fmt::Display for DisplayInner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt_inner(f)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::basic_schema;
    use crate::builders::*;
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_node_size() {
        let d = document![p!["hello"], hr!()];
        assert_eq!(d.child(0).node_size(), 7);
        assert_eq!(d.child(1).node_size(), 1);
        assert_eq!(d.content().size(), 8);
    }

    #[test]
    fn test_display_wraps_marks() {
        let d = document![p!["a", strong!["b", em!["c"]]]];
        assert_snapshot!(d.to_string(), @r#"doc(paragraph("a", strong("b"), em(strong("c"))))"#);
    }

    #[test]
    fn test_node_at() {
        let d = document![p!["ab"], blockquote![p!["cd"]]];
        assert_eq!(d.node_at(0).unwrap().ty().name(), "paragraph");
        assert_eq!(d.node_at(1).unwrap().text(), Some("ab"));
        assert_eq!(d.node_at(2).unwrap().text(), Some("ab"));
        assert_eq!(d.node_at(4).unwrap().ty().name(), "blockquote");
        assert_eq!(d.node_at(5).unwrap().ty().name(), "paragraph");
        assert!(d.node_at(10).is_none());
    }

    #[test]
    fn test_slice_is_open_at_shared_depth() {
        let d = document![p!["hello"], p!["world"]];
        let slice = d.slice(3, 10, false);
        assert_eq!(slice.open_start(), 1);
        assert_eq!(slice.open_end(), 1);
        assert_eq!(slice.content().to_string(), "<paragraph(\"llo\"), paragraph(\"wo\")>");
    }

    #[test]
    fn test_range_has_mark() {
        let d = document![p!["ab", strong!["cd"]]];
        let strong = basic_schema().mark_type("strong").unwrap();
        assert!(!d.range_has_mark(1, 3, &strong));
        assert!(d.range_has_mark(2, 4, &strong));
    }

    #[test]
    fn test_text_uses_char_offsets() {
        let d = document![p!["héllo"]];
        assert_eq!(d.content().size(), 7);
        assert_eq!(d.text_between(2, 4, ""), "él");
    }

    #[test]
    fn test_json_round_trip() {
        let d = document![h1!["title"], p!["x", em!["y"]], ul![li![p!["item"]]]];
        let json = d.to_json();
        let back = Node::from_json(&basic_schema(), &json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_from_json_rejects_invalid_content() {
        let json = json!({"type": "doc", "content": [{"type": "text", "text": "loose"}]});
        assert!(Node::from_json(&basic_schema(), &json).is_err());
    }

    #[test]
    fn test_can_replace() {
        let d = document![p!["a"]];
        let para = basic_schema().node_type("paragraph").unwrap();
        let item = basic_schema().node_type("list_item").unwrap();
        assert!(d.can_replace_with(1, 1, &para, None));
        assert!(!d.can_replace_with(1, 1, &item, None));
        assert!(!d.can_replace_range(0, 1));
    }
}
