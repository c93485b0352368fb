use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::content::{self, ContentMatch, MatchState};
use crate::{Fragment, Mark, ModelError, Node, ReplaceError};

/// Attribute values of a node or mark, kept sorted by name so equality and
/// serialization are stable.
pub type Attrs = BTreeMap<String, Value>;

/// Declaration of a node type.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    /// Content expression, e.g. `"paragraph block*"`. `None` makes a leaf.
    pub content: Option<String>,
    /// Space-separated mark names allowed inside this node, `"_"` for all.
    pub marks: Option<String>,
    pub group: Option<String>,
    pub inline: bool,
    pub atom: bool,
    /// Attribute names with an optional default. No default means required.
    pub attrs: Vec<(String, Option<Value>)>,
    pub selectable: bool,
    /// Code nodes keep their whitespace verbatim.
    pub code: bool,
    pub defining: bool,
    pub isolating: bool,
}

impl Default for NodeSpec {
    fn default() -> Self {
        Self {
            content: None,
            marks: None,
            group: None,
            inline: false,
            atom: false,
            attrs: Vec::new(),
            selectable: true,
            code: false,
            defining: false,
            isolating: false,
        }
    }
}

impl NodeSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, expr: &str) -> Self {
        self.content = Some(expr.to_string());
        self
    }

    pub fn marks(mut self, marks: &str) -> Self {
        self.marks = Some(marks.to_string());
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub fn inline(mut self) -> Self {
        self.inline = true;
        self
    }

    pub fn atom(mut self) -> Self {
        self.atom = true;
        self
    }

    pub fn attr(mut self, name: &str, default: Option<Value>) -> Self {
        self.attrs.push((name.to_string(), default));
        self
    }

    pub fn unselectable(mut self) -> Self {
        self.selectable = false;
        self
    }

    pub fn code(mut self) -> Self {
        self.code = true;
        self
    }

    pub fn defining(mut self) -> Self {
        self.defining = true;
        self
    }

    pub fn isolating(mut self) -> Self {
        self.isolating = true;
        self
    }
}

/// Declaration of a mark type.
#[derive(Debug, Clone)]
pub struct MarkSpec {
    pub attrs: Vec<(String, Option<Value>)>,
    /// Whether the mark extends to content typed at its end.
    pub inclusive: bool,
    /// Space-separated mark names this mark excludes, `"_"` for all.
    /// `None` means the mark only excludes other instances of itself.
    pub excludes: Option<String>,
    pub group: Option<String>,
}

impl Default for MarkSpec {
    fn default() -> Self {
        Self {
            attrs: Vec::new(),
            inclusive: true,
            excludes: None,
            group: None,
        }
    }
}

impl MarkSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, name: &str, default: Option<Value>) -> Self {
        self.attrs.push((name.to_string(), default));
        self
    }

    pub fn non_inclusive(mut self) -> Self {
        self.inclusive = false;
        self
    }

    pub fn excludes(mut self, excludes: &str) -> Self {
        self.excludes = Some(excludes.to_string());
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }
}

/// Ordered description of every node and mark type in a schema.
///
/// Order matters: the first node type in a group is the default used when
/// content has to be synthesized, and mark order defines mark-set ranking.
#[derive(Debug, Clone, Default)]
pub struct SchemaSpec {
    pub nodes: Vec<(String, NodeSpec)>,
    pub marks: Vec<(String, MarkSpec)>,
    pub top_node: Option<String>,
}

impl SchemaSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, name: &str, spec: NodeSpec) -> Self {
        self.nodes.push((name.to_string(), spec));
        self
    }

    pub fn mark(mut self, name: &str, spec: MarkSpec) -> Self {
        self.marks.push((name.to_string(), spec));
        self
    }

    pub fn top_node(mut self, name: &str) -> Self {
        self.top_node = Some(name.to_string());
        self
    }
}

pub(crate) struct NodeTypeData {
    pub(crate) name: String,
    pub(crate) spec: NodeSpec,
    pub(crate) is_text: bool,
    pub(crate) is_inline: bool,
    pub(crate) inline_content: bool,
    pub(crate) states: Vec<MatchState>,
    /// `None` allows every mark.
    pub(crate) mark_set: Option<Vec<usize>>,
    pub(crate) default_attrs: Option<Attrs>,
}

pub(crate) struct MarkTypeData {
    pub(crate) name: String,
    pub(crate) spec: MarkSpec,
    pub(crate) excluded: Vec<usize>,
}

pub(crate) struct SchemaInner {
    pub(crate) nodes: Vec<NodeTypeData>,
    pub(crate) marks: Vec<MarkTypeData>,
    top: usize,
    text: Option<usize>,
}

/// A compiled document schema.
///
/// Cheap to clone. Node and mark types hold a handle back to their schema and
/// compare equal only when they come from the same compiled instance.
#[derive(Clone)]
pub struct Schema(pub(crate) Arc<SchemaInner>);

impl Schema {
    pub fn new(spec: SchemaSpec) -> Result<Schema, ModelError> {
        let node_names: HashMap<&str, usize> = spec
            .nodes
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.as_str(), i))
            .collect();
        let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, (_, node)) in spec.nodes.iter().enumerate() {
            if let Some(group) = &node.group {
                for g in group.split_whitespace() {
                    groups.entry(g).or_default().push(i);
                }
            }
        }

        let top_name = spec.top_node.clone().unwrap_or_else(|| "doc".to_string());
        let top = *node_names
            .get(top_name.as_str())
            .ok_or_else(|| ModelError::MissingTopNode(top_name.clone()))?;
        let text = node_names.get("text").copied();

        let mut nodes = Vec::with_capacity(spec.nodes.len());
        for (name, node) in &spec.nodes {
            let expr = node.content.as_deref().unwrap_or("");
            let states = content::compile(expr, &node_names, &groups)?;
            let is_text = name == "text";
            nodes.push(NodeTypeData {
                name: name.clone(),
                spec: node.clone(),
                is_text,
                is_inline: node.inline || is_text,
                inline_content: false,
                states,
                mark_set: None,
                default_attrs: default_attrs(&node.attrs),
            });
        }
        let inline_flags: Vec<bool> = nodes.iter().map(|n| n.is_inline).collect();
        for node in &mut nodes {
            node.inline_content = node.states[0]
                .next
                .first()
                .is_some_and(|(ty, _)| inline_flags[*ty]);
        }

        let mark_names: HashMap<&str, usize> = spec
            .marks
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.as_str(), i))
            .collect();
        let mut mark_groups: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, (_, mark)) in spec.marks.iter().enumerate() {
            if let Some(group) = &mark.group {
                for g in group.split_whitespace() {
                    mark_groups.entry(g).or_default().push(i);
                }
            }
        }
        let gather = |expr: &str| -> Result<Vec<usize>, ModelError> {
            let mut found = Vec::new();
            for name in expr.split_whitespace() {
                if name == "_" {
                    return Ok((0..spec.marks.len()).collect());
                }
                if let Some(index) = mark_names.get(name) {
                    found.push(*index);
                } else if let Some(members) = mark_groups.get(name) {
                    found.extend(members.iter().copied());
                } else {
                    return Err(ModelError::UnknownMarkType(name.to_string()));
                }
            }
            Ok(found)
        };

        let mut marks = Vec::with_capacity(spec.marks.len());
        for (i, (name, mark)) in spec.marks.iter().enumerate() {
            let excluded = match &mark.excludes {
                None => vec![i],
                Some(expr) => gather(expr)?,
            };
            marks.push(MarkTypeData {
                name: name.clone(),
                spec: mark.clone(),
                excluded,
            });
        }

        for (data, (_, node)) in nodes.iter_mut().zip(&spec.nodes) {
            data.mark_set = match node.marks.as_deref() {
                Some("_") => None,
                Some(expr) => Some(gather(expr)?),
                None if !data.inline_content => Some(Vec::new()),
                None => None,
            };
        }

        Ok(Schema(Arc::new(SchemaInner {
            nodes,
            marks,
            top,
            text,
        })))
    }

    pub fn node_type(&self, name: &str) -> Option<NodeType> {
        self.0
            .nodes
            .iter()
            .position(|n| n.name == name)
            .map(|index| NodeType {
                schema: self.clone(),
                index,
            })
    }

    pub fn mark_type(&self, name: &str) -> Option<MarkType> {
        self.0
            .marks
            .iter()
            .position(|m| m.name == name)
            .map(|index| MarkType {
                schema: self.clone(),
                index,
            })
    }

    pub fn node_types(&self) -> impl Iterator<Item = NodeType> + '_ {
        (0..self.0.nodes.len()).map(|index| NodeType {
            schema: self.clone(),
            index,
        })
    }

    pub fn top_node_type(&self) -> NodeType {
        NodeType {
            schema: self.clone(),
            index: self.0.top,
        }
    }

    /// Create a node by type name.
    pub fn node(
        &self,
        name: &str,
        attrs: Option<&Attrs>,
        content: Fragment,
        marks: Vec<Mark>,
    ) -> Result<Node, ModelError> {
        let ty = self
            .node_type(name)
            .ok_or_else(|| ModelError::UnknownNodeType(name.to_string()))?;
        Ok(ty.create(attrs, content, marks))
    }

    /// Create a text node. Panics on empty text or when the schema has no
    /// `text` node type, both of which are caller bugs.
    pub fn text(&self, text: &str, marks: Vec<Mark>) -> Node {
        let Some(index) = self.0.text else {
            panic!("Schema has no text node type");
        };
        let ty = NodeType {
            schema: self.clone(),
            index,
        };
        Node::new_text(ty, text.to_string(), Mark::set_from(marks))
    }

    pub fn mark(&self, name: &str, attrs: Option<&Attrs>) -> Result<Mark, ModelError> {
        let ty = self
            .mark_type(name)
            .ok_or_else(|| ModelError::UnknownMarkType(name.to_string()))?;
        Ok(ty.create(attrs))
    }

    pub(crate) fn ptr_eq(&self, other: &Schema) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.nodes.iter().map(|n| n.name.as_str()).collect();
        f.debug_struct("Schema").field("nodes", &names).finish()
    }
}

fn default_attrs(attrs: &[(String, Option<Value>)]) -> Option<Attrs> {
    let mut defaults = Attrs::new();
    for (name, default) in attrs {
        defaults.insert(name.clone(), default.clone()?);
    }
    Some(defaults)
}

fn compute_attrs(spec: &[(String, Option<Value>)], given: Option<&Attrs>, owner: &str) -> Attrs {
    let mut built = Attrs::new();
    for (name, default) in spec {
        let value = given.and_then(|g| g.get(name)).cloned().or_else(|| default.clone());
        match value {
            Some(value) => {
                built.insert(name.clone(), value);
            }
            None => panic!("No value supplied for attribute {name} of {owner}"),
        }
    }
    built
}

/// A node type within a [`Schema`].
#[derive(Clone)]
pub struct NodeType {
    pub(crate) schema: Schema,
    pub(crate) index: usize,
}

impl NodeType {
    fn data(&self) -> &NodeTypeData {
        &self.schema.0.nodes[self.index]
    }

    pub fn name(&self) -> &str {
        &self.data().name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn spec(&self) -> &NodeSpec {
        &self.data().spec
    }

    pub fn is_text(&self) -> bool {
        self.data().is_text
    }

    pub fn is_inline(&self) -> bool {
        self.data().is_inline
    }

    pub fn is_block(&self) -> bool {
        !self.is_inline()
    }

    pub fn inline_content(&self) -> bool {
        self.data().inline_content
    }

    pub fn is_textblock(&self) -> bool {
        self.is_block() && self.inline_content()
    }

    pub fn is_leaf(&self) -> bool {
        self.data().states[0].next.is_empty()
    }

    pub fn is_atom(&self) -> bool {
        self.is_leaf() || self.spec().atom
    }

    /// Whether text in this node keeps newlines and runs of spaces.
    pub fn whitespace_pre(&self) -> bool {
        self.spec().code
    }

    pub fn content_match(&self) -> ContentMatch {
        ContentMatch::new(self.clone(), 0)
    }

    /// Attribute values used when none are given. `None` when some
    /// attribute has no default.
    pub fn default_attrs(&self) -> Option<&Attrs> {
        self.data().default_attrs.as_ref()
    }

    pub fn has_required_attrs(&self) -> bool {
        self.data().default_attrs.is_none()
    }

    pub fn compute_attrs(&self, given: Option<&Attrs>) -> Attrs {
        match (&self.data().default_attrs, given) {
            (Some(defaults), None) => defaults.clone(),
            _ => compute_attrs(&self.spec().attrs, given, self.name()),
        }
    }

    pub fn compatible_content(&self, other: &NodeType) -> bool {
        self == other || self.content_match().compatible(&other.content_match())
    }

    pub fn valid_content(&self, content: &Fragment) -> bool {
        let Some(end) = self.content_match().match_fragment(content, 0, content.child_count()) else {
            return false;
        };
        end.valid_end() && content.iter().all(|child| self.allows_marks(child.marks()))
    }

    pub fn check_content(&self, content: &Fragment) -> Result<(), ReplaceError> {
        if self.valid_content(content) {
            Ok(())
        } else {
            Err(ReplaceError::InvalidContent {
                node: self.name().to_string(),
            })
        }
    }

    pub fn allows_mark_type(&self, mark_type: &MarkType) -> bool {
        match &self.data().mark_set {
            None => true,
            Some(set) => set.contains(&mark_type.index),
        }
    }

    pub fn allows_marks(&self, marks: &[Mark]) -> bool {
        marks.iter().all(|m| self.allows_mark_type(m.ty()))
    }

    pub fn allowed_marks(&self, marks: &[Mark]) -> Vec<Mark> {
        marks
            .iter()
            .filter(|m| self.allows_mark_type(m.ty()))
            .cloned()
            .collect()
    }

    /// Create a node of this type without checking its content.
    pub fn create(&self, attrs: Option<&Attrs>, content: Fragment, marks: Vec<Mark>) -> Node {
        if self.is_text() {
            panic!("NodeType::create can't construct text nodes");
        }
        Node::new(
            self.clone(),
            self.compute_attrs(attrs),
            content,
            Mark::set_from(marks),
        )
    }

    pub fn create_checked(
        &self,
        attrs: Option<&Attrs>,
        content: Fragment,
        marks: Vec<Mark>,
    ) -> Result<Node, ModelError> {
        if !self.valid_content(&content) {
            return Err(ModelError::InvalidContent(self.name().to_string()));
        }
        Ok(self.create(attrs, content, marks))
    }

    /// Create a node, adding whatever content is required before and after
    /// `content` to make it valid. `None` when no such filling exists.
    pub fn create_and_fill(
        &self,
        attrs: Option<&Attrs>,
        content: Fragment,
        marks: Vec<Mark>,
    ) -> Option<Node> {
        if attrs.is_none() && self.has_required_attrs() {
            return None;
        }
        let mut content = content;
        if content.size() > 0 {
            let before = self.content_match().fill_before(&content, false, 0)?;
            content = before.append(&content);
        }
        let matched = self
            .content_match()
            .match_fragment(&content, 0, content.child_count())?;
        let after = matched.fill_before(&Fragment::empty(), true, 0)?;
        Some(self.create(attrs, content.append(&after), marks))
    }
}

impl PartialEq for NodeType {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.schema.ptr_eq(&other.schema)
    }
}

impl Eq for NodeType {}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeType({})", self.name())
    }
}

/// A mark type within a [`Schema`]. Its position in the schema is its rank.
#[derive(Clone)]
pub struct MarkType {
    pub(crate) schema: Schema,
    pub(crate) index: usize,
}

impl MarkType {
    fn data(&self) -> &MarkTypeData {
        &self.schema.0.marks[self.index]
    }

    pub fn name(&self) -> &str {
        &self.data().name
    }

    pub fn spec(&self) -> &MarkSpec {
        &self.data().spec
    }

    pub fn rank(&self) -> usize {
        self.index
    }

    pub fn create(&self, attrs: Option<&Attrs>) -> Mark {
        let attrs = compute_attrs(&self.spec().attrs, attrs, self.name());
        Mark::new(self.clone(), attrs)
    }

    pub fn excludes(&self, other: &MarkType) -> bool {
        self.data().excluded.contains(&other.index)
    }

    /// The first mark of this type in `set`, if any.
    pub fn is_in_set<'a>(&self, set: &'a [Mark]) -> Option<&'a Mark> {
        set.iter().find(|m| m.ty() == self)
    }

    pub fn remove_from_set(&self, set: &[Mark]) -> Vec<Mark> {
        set.iter().filter(|m| m.ty() != self).cloned().collect()
    }
}

impl PartialEq for MarkType {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.schema.ptr_eq(&other.schema)
    }
}

impl Eq for MarkType {}

impl fmt::Debug for MarkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MarkType({})", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::basic_schema;

    #[test]
    fn test_unknown_content_name_is_rejected() {
        let spec = SchemaSpec::new()
            .node("doc", NodeSpec::new().content("nonsense+"))
            .node("text", NodeSpec::new());
        let err = Schema::new(spec).unwrap_err();
        assert!(matches!(err, ModelError::UnknownContentName { .. }));
    }

    #[test]
    fn test_missing_top_node() {
        let spec = SchemaSpec::new().node("text", NodeSpec::new());
        assert_eq!(
            Schema::new(spec).unwrap_err(),
            ModelError::MissingTopNode("doc".to_string())
        );
    }

    #[test]
    fn test_type_classification() {
        let schema = basic_schema();
        let paragraph = schema.node_type("paragraph").unwrap();
        let blockquote = schema.node_type("blockquote").unwrap();
        let image = schema.node_type("image").unwrap();
        assert!(paragraph.is_textblock());
        assert!(!blockquote.is_textblock());
        assert!(blockquote.is_block());
        assert!(image.is_inline() && image.is_leaf() && image.is_atom());
        assert!(image.has_required_attrs());
        assert!(!paragraph.has_required_attrs());
    }

    #[test]
    fn test_mark_permissions() {
        let schema = basic_schema();
        let strong = schema.mark_type("strong").unwrap();
        assert!(schema.node_type("paragraph").unwrap().allows_mark_type(&strong));
        assert!(!schema.node_type("code_block").unwrap().allows_mark_type(&strong));
    }

    #[test]
    fn test_create_and_fill_adds_required_children() {
        let schema = basic_schema();
        let list = schema.node_type("bullet_list").unwrap();
        let filled = list
            .create_and_fill(None, Fragment::empty(), Vec::new())
            .unwrap();
        assert_eq!(filled.to_string(), "bullet_list(list_item(paragraph))");
    }

    #[test]
    fn test_types_from_different_schemas_differ() {
        let a = basic_schema();
        let b = Schema::new(crate::basic::basic_spec()).unwrap();
        assert_ne!(a.node_type("doc").unwrap(), b.node_type("doc").unwrap());
        assert_eq!(a.node_type("doc").unwrap(), a.top_node_type());
    }
}
