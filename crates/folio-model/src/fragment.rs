use std::fmt;

use serde_json::Value;

use crate::{ModelError, Node, Schema};

/// An ordered sequence of sibling nodes with a cached total size.
///
/// Adjacent text nodes with identical marks are always joined, so a fragment
/// has a single canonical shape for any given content.
#[derive(Clone, Default)]
pub struct Fragment {
    content: Vec<Node>,
    size: usize,
}

impl Fragment {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a fragment, joining adjacent compatible text nodes.
    pub fn from_array(nodes: Vec<Node>) -> Self {
        let mut joined: Vec<Node> = Vec::with_capacity(nodes.len());
        let mut size = 0;
        for node in nodes {
            size += node.node_size();
            if let Some(last) = joined.last_mut()
                && node.is_text()
                && last.same_markup(&node)
            {
                *last = last.with_text(&format!("{}{}", last.text_str(), node.text_str()));
                continue;
            }
            joined.push(node);
        }
        Self {
            content: joined,
            size,
        }
    }

    fn from_joined(content: Vec<Node>) -> Self {
        let size = content.iter().map(Node::node_size).sum();
        Self { content, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn child_count(&self) -> usize {
        self.content.len()
    }

    /// Panics when `index` is out of range.
    pub fn child(&self, index: usize) -> &Node {
        &self.content[index]
    }

    pub fn maybe_child(&self, index: usize) -> Option<&Node> {
        self.content.get(index)
    }

    pub fn first_child(&self) -> Option<&Node> {
        self.content.first()
    }

    pub fn last_child(&self) -> Option<&Node> {
        self.content.last()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Node> {
        self.content.iter()
    }

    pub fn append(&self, other: &Fragment) -> Fragment {
        if other.size == 0 {
            return self.clone();
        }
        if self.size == 0 {
            return other.clone();
        }
        let mut content = self.content.clone();
        let mut rest = other.content.iter();
        if let (Some(last), Some(first)) = (content.last_mut(), other.first_child())
            && first.is_text()
            && last.same_markup(first)
        {
            *last = last.with_text(&format!("{}{}", last.text_str(), first.text_str()));
            rest.next();
        }
        content.extend(rest.cloned());
        Fragment {
            content,
            size: self.size + other.size,
        }
    }

    /// The part of this fragment between two offsets.
    pub fn cut(&self, from: usize, to: usize) -> Fragment {
        if from == 0 && to == self.size {
            return self.clone();
        }
        let mut result = Vec::new();
        if to > from {
            let mut pos = 0;
            for child in &self.content {
                if pos >= to {
                    break;
                }
                let end = pos + child.node_size();
                if end > from {
                    let child = if pos < from || end > to {
                        if child.is_text() {
                            child.cut(from.saturating_sub(pos), (to - pos).min(child.text_len()))
                        } else {
                            child.cut(
                                from.saturating_sub(pos + 1),
                                (to - pos - 1).min(child.content().size()),
                            )
                        }
                    } else {
                        child.clone()
                    };
                    result.push(child);
                }
                pos = end;
            }
        }
        Fragment::from_joined(result)
    }

    pub fn cut_by_index(&self, from: usize, to: usize) -> Fragment {
        if from == to {
            return Fragment::empty();
        }
        if from == 0 && to == self.content.len() {
            return self.clone();
        }
        Fragment::from_joined(self.content[from..to].to_vec())
    }

    pub fn replace_child(&self, index: usize, node: Node) -> Fragment {
        let mut content = self.content.clone();
        let size = self.size + node.node_size() - content[index].node_size();
        content[index] = node;
        Fragment { content, size }
    }

    pub fn add_to_start(&self, node: Node) -> Fragment {
        let size = self.size + node.node_size();
        let mut content = Vec::with_capacity(self.content.len() + 1);
        content.push(node);
        content.extend(self.content.iter().cloned());
        Fragment { content, size }
    }

    pub fn add_to_end(&self, node: Node) -> Fragment {
        let size = self.size + node.node_size();
        let mut content = self.content.clone();
        content.push(node);
        Fragment { content, size }
    }

    /// Find the child index and start offset for position `pos`. With
    /// `round > 0`, a position inside a child rounds up to the next index.
    pub fn find_index(&self, pos: usize, round: i32) -> (usize, usize) {
        if pos == 0 {
            return (0, 0);
        }
        if pos == self.size {
            return (self.content.len(), pos);
        }
        assert!(pos < self.size, "Position {pos} outside of fragment");
        let mut cur = 0;
        for (i, child) in self.content.iter().enumerate() {
            let end = cur + child.node_size();
            if end >= pos {
                if end == pos || round > 0 {
                    return (i + 1, end);
                }
                return (i, cur);
            }
            cur = end;
        }
        (self.content.len(), self.size)
    }

    /// Call `f` for every node overlapping `from..to`, descending into a
    /// node's children when `f` returns true. Positions are relative to
    /// `node_start`.
    pub fn nodes_between<F>(&self, from: usize, to: usize, f: &mut F, node_start: usize, parent: Option<&Node>)
    where
        F: FnMut(&Node, usize, Option<&Node>, usize) -> bool,
    {
        let mut pos = 0;
        for (i, child) in self.content.iter().enumerate() {
            if pos >= to {
                break;
            }
            let end = pos + child.node_size();
            if end > from && f(child, node_start + pos, parent, i) && child.content().size() > 0 {
                let start = pos + 1;
                child.content().nodes_between(
                    from.saturating_sub(start),
                    child.content().size().min(to - start),
                    f,
                    node_start + start,
                    Some(child),
                );
            }
            pos = end;
        }
    }

    pub fn descendants<F>(&self, f: &mut F)
    where
        F: FnMut(&Node, usize, Option<&Node>, usize) -> bool,
    {
        self.nodes_between(0, self.size, f, 0, None);
    }

    pub fn text_between(&self, from: usize, to: usize, block_separator: &str) -> String {
        let mut text = String::new();
        let mut first = true;
        self.nodes_between(
            from,
            to,
            &mut |node, pos, _, _| {
                let node_text = if node.is_text() {
                    let end = (to - pos).min(node.text_len());
                    crate::node::char_slice(node.text_str(), from.saturating_sub(pos), end)
                } else {
                    String::new()
                };
                if node.is_textblock() && !block_separator.is_empty() {
                    if first {
                        first = false;
                    } else {
                        text.push_str(block_separator);
                    }
                }
                text.push_str(&node_text);
                true
            },
            0,
            None,
        );
        text
    }

    pub fn to_json(&self) -> Option<Value> {
        if self.content.is_empty() {
            None
        } else {
            Some(Value::Array(self.content.iter().map(Node::to_json).collect()))
        }
    }

    pub fn from_json(schema: &Schema, value: Option<&Value>) -> Result<Fragment, ModelError> {
        match value {
            None | Some(Value::Null) => Ok(Fragment::empty()),
            Some(Value::Array(items)) => {
                let nodes = items
                    .iter()
                    .map(|item| Node::parse_json(schema, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Fragment::from_array(nodes))
            }
            Some(other) => Err(ModelError::InvalidJson(format!(
                "fragment must be an array, got {other}"
            ))),
        }
    }

    pub(crate) fn fmt_inner(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, child) in self.content.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{child}")?;
        }
        Ok(())
    }
}

impl PartialEq for Fragment {
    fn eq(&self, other: &Self) -> bool {
        self.content.len() == other.content.len()
            && self.content.iter().zip(&other.content).all(|(a, b)| a == b)
    }
}

impl From<Node> for Fragment {
    fn from(node: Node) -> Self {
        Fragment::from_joined(vec![node])
    }
}

impl From<Vec<Node>> for Fragment {
    fn from(nodes: Vec<Node>) -> Self {
        Fragment::from_array(nodes)
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<")?;
        self.fmt_inner(f)?;
        f.write_str(">")
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use crate::builders::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_array_joins_text() {
        let frag = p!["foo", "bar"].content().clone();
        assert_eq!(frag.child_count(), 1);
        assert_eq!(frag.size(), 6);
    }

    #[test]
    fn test_cut_through_nested_nodes() {
        // doc(p("hello"), p("world")): "hello" at 1..6, "world" at 8..13
        let d = document![p!["hello"], p!["world"]];
        let cut = d.content().cut(3, 10);
        assert_eq!(cut.to_string(), "<paragraph(\"llo\"), paragraph(\"wo\")>");
        assert_eq!(cut.size(), 9);
    }

    #[test]
    fn test_find_index() {
        let d = document![p!["ab"], p!["cd"]];
        let content = d.content();
        assert_eq!(content.find_index(0, -1), (0, 0));
        assert_eq!(content.find_index(2, -1), (0, 0));
        assert_eq!(content.find_index(2, 1), (1, 4));
        assert_eq!(content.find_index(4, -1), (1, 4));
        assert_eq!(content.find_index(8, -1), (2, 8));
    }

    #[test]
    fn test_nodes_between_reports_positions() {
        let d = document![p!["ab"], blockquote![p!["cd"]]];
        let mut seen = Vec::new();
        d.content().descendants(&mut |node, pos, _, _| {
            seen.push((node.ty().name().to_string(), pos));
            true
        });
        assert_eq!(
            seen,
            vec![
                ("paragraph".to_string(), 0),
                ("text".to_string(), 1),
                ("blockquote".to_string(), 4),
                ("paragraph".to_string(), 5),
                ("text".to_string(), 6),
            ]
        );
    }

    #[test]
    fn test_text_between_uses_separator() {
        let d = document![p!["ab"], p!["cd"]];
        assert_eq!(d.text_between(0, d.content().size(), "|"), "ab|cd");
    }
}
