use std::fmt;

use crate::{Mark, Node};

#[derive(Clone)]
struct PathEntry {
    node: Node,
    index: usize,
    /// Absolute position of the start of the child at `index`.
    offset: usize,
}

/// A position resolved against a document, with its full ancestor chain.
///
/// Depth 0 is the document itself, `depth()` is the innermost parent. All
/// depth arguments are absolute.
#[derive(Clone)]
pub struct ResolvedPos {
    pos: usize,
    path: Vec<PathEntry>,
    parent_offset: usize,
}

impl ResolvedPos {
    pub(crate) fn resolve(doc: &Node, pos: usize) -> ResolvedPos {
        assert!(
            pos <= doc.content().size(),
            "Position {pos} out of range (document size {})",
            doc.content().size()
        );
        let mut path = Vec::new();
        let mut start = 0;
        let mut parent_offset = pos;
        let mut node = doc.clone();
        loop {
            let (index, offset) = node.content().find_index(parent_offset, -1);
            let rem = parent_offset - offset;
            path.push(PathEntry {
                node: node.clone(),
                index,
                offset: start + offset,
            });
            if rem == 0 {
                break;
            }
            let child = node.child(index).clone();
            if child.is_text() {
                break;
            }
            parent_offset = rem - 1;
            start += offset + 1;
            node = child;
        }
        ResolvedPos {
            pos,
            path,
            parent_offset,
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn depth(&self) -> usize {
        self.path.len() - 1
    }

    pub fn parent_offset(&self) -> usize {
        self.parent_offset
    }

    pub fn parent(&self) -> &Node {
        &self.path[self.depth()].node
    }

    pub fn doc(&self) -> &Node {
        &self.path[0].node
    }

    pub fn node(&self, depth: usize) -> &Node {
        &self.path[depth].node
    }

    pub fn index(&self, depth: usize) -> usize {
        self.path[depth].index
    }

    pub fn index_after(&self, depth: usize) -> usize {
        let extra = if depth == self.depth() && self.text_offset() == 0 {
            0
        } else {
            1
        };
        self.index(depth) + extra
    }

    /// Start of the content of the ancestor at `depth`.
    pub fn start(&self, depth: usize) -> usize {
        if depth == 0 {
            0
        } else {
            self.path[depth - 1].offset + 1
        }
    }

    pub fn end(&self, depth: usize) -> usize {
        self.start(depth) + self.node(depth).content().size()
    }

    /// Position before the ancestor at `depth`. Panics at depth 0.
    pub fn before(&self, depth: usize) -> usize {
        assert!(depth > 0, "There is no position before the top-level node");
        if depth == self.depth() + 1 {
            self.pos
        } else {
            self.path[depth - 1].offset
        }
    }

    /// Position after the ancestor at `depth`. Panics at depth 0.
    pub fn after(&self, depth: usize) -> usize {
        assert!(depth > 0, "There is no position after the top-level node");
        if depth == self.depth() + 1 {
            self.pos
        } else {
            self.path[depth - 1].offset + self.node(depth).node_size()
        }
    }

    /// Offset into a text node when the position points inside one.
    pub fn text_offset(&self) -> usize {
        self.pos - self.path[self.depth()].offset
    }

    pub fn node_after(&self) -> Option<Node> {
        let parent = self.parent();
        let index = self.index(self.depth());
        if index == parent.child_count() {
            return None;
        }
        let offset = self.text_offset();
        let child = parent.child(index);
        Some(if offset > 0 {
            child.cut_from(offset)
        } else {
            child.clone()
        })
    }

    pub fn node_before(&self) -> Option<Node> {
        let index = self.index(self.depth());
        let offset = self.text_offset();
        if offset > 0 {
            return Some(self.parent().child(index).cut(0, offset));
        }
        if index == 0 {
            None
        } else {
            Some(self.parent().child(index - 1).clone())
        }
    }

    pub fn pos_at_index(&self, index: usize, depth: usize) -> usize {
        let node = self.node(depth);
        let mut pos = if depth == 0 {
            0
        } else {
            self.path[depth - 1].offset + 1
        };
        for i in 0..index {
            pos += node.child(i).node_size();
        }
        pos
    }

    /// Marks that content inserted at this position would get.
    pub fn marks(&self) -> Vec<Mark> {
        let parent = self.parent();
        let index = self.index(self.depth());
        if parent.content().size() == 0 {
            return Vec::new();
        }
        if self.text_offset() > 0 {
            return parent.child(index).marks().to_vec();
        }
        let before = index.checked_sub(1).and_then(|i| parent.maybe_child(i));
        let after = parent.maybe_child(index);
        let (main, other) = match before {
            Some(before) => (before, after),
            None => match after {
                Some(after) => (after, None),
                None => return Vec::new(),
            },
        };
        let mut marks = main.marks().to_vec();
        marks.retain(|m| m.ty().spec().inclusive || other.is_some_and(|o| m.is_in_set(o.marks())));
        marks
    }

    /// Marks to preserve after deleting the content between this position
    /// and `end`. `None` when the position is not before inline content.
    pub fn marks_across(&self, end: &ResolvedPos) -> Option<Vec<Mark>> {
        let after = self.parent().maybe_child(self.index(self.depth()))?;
        if !after.is_inline() {
            return None;
        }
        let next = end.parent().maybe_child(end.index(end.depth()));
        let mut marks = after.marks().to_vec();
        marks.retain(|m| m.ty().spec().inclusive || next.is_some_and(|n| m.is_in_set(n.marks())));
        Some(marks)
    }

    /// Deepest depth whose node contains both this position and `pos`.
    pub fn shared_depth(&self, pos: usize) -> usize {
        for depth in (1..=self.depth()).rev() {
            if self.start(depth) <= pos && self.end(depth) >= pos {
                return depth;
            }
        }
        0
    }

    /// The block-level range around this position and `other`, optionally
    /// restricted to parents accepted by `pred`.
    pub fn block_range(&self, other: &ResolvedPos, pred: Option<&dyn Fn(&Node) -> bool>) -> Option<NodeRange> {
        if other.pos < self.pos {
            return other.block_range(self, pred);
        }
        let skip = usize::from(self.parent().inline_content() || self.pos == other.pos);
        let top = self.depth() as isize - skip as isize;
        let mut d = top;
        while d >= 0 {
            let depth = d as usize;
            if other.pos <= self.end(depth) && pred.is_none_or(|p| p(self.node(depth))) {
                return Some(NodeRange::new(self.clone(), other.clone(), depth));
            }
            d -= 1;
        }
        None
    }

    pub fn same_parent(&self, other: &ResolvedPos) -> bool {
        self.pos - self.parent_offset == other.pos - other.parent_offset
    }

    pub fn max(&self, other: &ResolvedPos) -> ResolvedPos {
        if other.pos > self.pos {
            other.clone()
        } else {
            self.clone()
        }
    }

    pub fn min(&self, other: &ResolvedPos) -> ResolvedPos {
        if other.pos < self.pos {
            other.clone()
        } else {
            self.clone()
        }
    }
}

impl fmt::Debug for ResolvedPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = String::new();
        for depth in 1..=self.depth() {
            if !names.is_empty() {
                names.push('/');
            }
            names.push_str(&format!("{}_{}", self.node(depth).ty().name(), self.index(depth - 1)));
        }
        write!(f, "{names}:{}", self.parent_offset)
    }
}

/// A flat range of sibling block nodes inside a common parent.
#[derive(Clone, Debug)]
pub struct NodeRange {
    pub from: ResolvedPos,
    pub to: ResolvedPos,
    pub depth: usize,
}

impl NodeRange {
    pub fn new(from: ResolvedPos, to: ResolvedPos, depth: usize) -> Self {
        Self { from, to, depth }
    }

    pub fn start(&self) -> usize {
        self.from.before(self.depth + 1)
    }

    pub fn end(&self) -> usize {
        self.to.after(self.depth + 1)
    }

    pub fn parent(&self) -> &Node {
        self.from.node(self.depth)
    }

    pub fn start_index(&self) -> usize {
        self.from.index(self.depth)
    }

    pub fn end_index(&self) -> usize {
        self.to.index_after(self.depth)
    }
}

#[cfg(test)]
mod tests {
    use crate::builders::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_inside_text() {
        // doc(blockquote(p("abc"))): blockquote 0..7, p 1..6, text 2..5
        let d = document![blockquote![p!["abc"]]];
        let pos = d.resolve(3);
        assert_eq!(pos.depth(), 2);
        assert_eq!(pos.parent().ty().name(), "paragraph");
        assert_eq!(pos.parent_offset(), 1);
        assert_eq!(pos.text_offset(), 1);
        assert_eq!(pos.start(2), 2);
        assert_eq!(pos.end(2), 5);
        assert_eq!(pos.before(1), 0);
        assert_eq!(pos.after(1), 7);
        assert_eq!(pos.before(2), 1);
        assert_eq!(pos.after(2), 6);
        assert_eq!(pos.node_before().unwrap().text(), Some("a"));
        assert_eq!(pos.node_after().unwrap().text(), Some("bc"));
        assert_eq!(pos.index_after(2), 1);
    }

    #[test]
    fn test_resolve_between_blocks() {
        let d = document![p!["a"], p!["b"]];
        let pos = d.resolve(3);
        assert_eq!(pos.depth(), 0);
        assert_eq!(pos.index(0), 1);
        assert_eq!(pos.node_before().unwrap().ty().name(), "paragraph");
        assert_eq!(pos.shared_depth(5), 0);
        assert_eq!(format!("{pos:?}"), ":3");
    }

    #[test]
    fn test_marks_skip_non_inclusive() {
        let d = document![p![link!("x", ["ab"]), "c"]];
        // end of the link text: link is not inclusive and not on the next node
        assert!(d.resolve(3).marks().is_empty());
        assert_eq!(d.resolve(2).marks().len(), 1);
    }

    #[test]
    fn test_block_range() {
        let d = document![blockquote![p!["ab"], p!["cd"]]];
        let from = d.resolve(3);
        let to = d.resolve(7);
        let range = from.block_range(&to, None).unwrap();
        assert_eq!(range.depth, 1);
        assert_eq!(range.start(), 1);
        assert_eq!(range.end(), 9);
        assert_eq!((range.start_index(), range.end_index()), (0, 2));
    }
}
