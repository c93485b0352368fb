use folio_model::{Fragment, Mark, Node, Slice};

use crate::error::StepFailure;
use crate::map::{Assoc, Mappable};
use crate::replace_step::{ReplaceStep, apply_replace};
use crate::step::{Step, StepResult};

/// Rebuild `fragment`, passing every inline node through `f` together with
/// its parent.
fn map_fragment(fragment: &Fragment, f: &dyn Fn(Node, &Node) -> Node, parent: &Node) -> Fragment {
    let mut mapped = Vec::with_capacity(fragment.child_count());
    for child in fragment.iter() {
        let mut child = child.clone();
        if child.content().size() > 0 {
            let inner = map_fragment(child.content(), f, &child);
            child = child.copy(inner);
        }
        if child.is_inline() {
            child = f(child, parent);
        }
        mapped.push(child);
    }
    Fragment::from_array(mapped)
}

fn map_marks(doc: &Node, from: usize, to: usize, f: &dyn Fn(Node, &Node) -> Node) -> StepResult {
    if from > to || to > doc.content().size() {
        return Err(StepFailure::new(format!("Mark range {from}..{to} out of bounds")));
    }
    let old = doc.slice(from, to, false);
    let rfrom = doc.resolve(from);
    let parent = rfrom.node(rfrom.shared_depth(to));
    let slice = Slice::new(
        map_fragment(old.content(), f, parent),
        old.open_start(),
        old.open_end(),
    );
    apply_replace(doc, from, to, &slice)
}

/// True when `keep` holds for every inline node overlapping `from..to`,
/// together with its parent.
fn all_inline(doc: &Node, from: usize, to: usize, keep: &dyn Fn(&Node, &Node) -> bool) -> bool {
    if from > to || to > doc.content().size() {
        return true;
    }
    let mut clean = true;
    doc.nodes_between(from, to, &mut |node: &Node, _, parent: Option<&Node>, _| {
        if clean && node.is_inline() {
            clean = keep(node, parent.unwrap_or(doc));
        }
        clean
    });
    clean
}

/// Put `from..to` back exactly as it was in `doc`.
fn restore_range(doc: &Node, from: usize, to: usize) -> Step {
    Step::Replace(ReplaceStep::new(from, to, doc.slice(from, to, false), false))
}

fn map_range<M: Mappable + ?Sized>(mapping: &M, from: usize, to: usize) -> Option<(usize, usize)> {
    let from = mapping.map_result(from, Assoc::After);
    let to = mapping.map_result(to, Assoc::Before);
    if (from.deleted() && to.deleted()) || from.pos >= to.pos {
        return None;
    }
    Some((from.pos, to.pos))
}

/// Add a mark to all inline content between two positions.
#[derive(Debug, Clone, PartialEq)]
pub struct AddMarkStep {
    from: usize,
    to: usize,
    mark: Mark,
}

impl AddMarkStep {
    pub fn new(from: usize, to: usize, mark: Mark) -> Self {
        Self { from, to, mark }
    }

    pub fn from(&self) -> usize {
        self.from
    }

    pub fn to(&self) -> usize {
        self.to
    }

    pub fn mark(&self) -> &Mark {
        &self.mark
    }

    pub(crate) fn extend_to(&mut self, to: usize) {
        self.to = to;
    }

    pub fn apply(&self, doc: &Node) -> StepResult {
        let mark = &self.mark;
        map_marks(doc, self.from, self.to, &|node, parent| {
            if !node.is_atom() || !parent.ty().allows_mark_type(mark.ty()) {
                return node;
            }
            let marks = mark.add_to_set(node.marks());
            node.mark(marks)
        })
    }

    /// Removing the mark again only undoes this step when the mark was
    /// absent everywhere and displaced no other mark. Anything else is
    /// undone by restoring the range's old content.
    pub fn invert(&self, doc: &Node) -> Step {
        let mark = &self.mark;
        let only_added = all_inline(doc, self.from, self.to, &|node, parent| {
            !node.is_atom()
                || !parent.ty().allows_mark_type(mark.ty())
                || mark.add_to_set(node.marks()).len() == node.marks().len() + 1
        });
        if only_added {
            Step::RemoveMark(RemoveMarkStep::new(self.from, self.to, mark.clone()))
        } else {
            restore_range(doc, self.from, self.to)
        }
    }

    pub fn map<M: Mappable + ?Sized>(&self, mapping: &M) -> Option<AddMarkStep> {
        let (from, to) = map_range(mapping, self.from, self.to)?;
        Some(AddMarkStep::new(from, to, self.mark.clone()))
    }

    pub fn merge(&self, other: &AddMarkStep) -> Option<AddMarkStep> {
        if other.mark == self.mark && self.from <= other.to && self.to >= other.from {
            Some(AddMarkStep::new(
                self.from.min(other.from),
                self.to.max(other.to),
                self.mark.clone(),
            ))
        } else {
            None
        }
    }
}

/// Remove a mark from all inline content between two positions.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveMarkStep {
    from: usize,
    to: usize,
    mark: Mark,
}

impl RemoveMarkStep {
    pub fn new(from: usize, to: usize, mark: Mark) -> Self {
        Self { from, to, mark }
    }

    pub fn from(&self) -> usize {
        self.from
    }

    pub fn to(&self) -> usize {
        self.to
    }

    pub fn mark(&self) -> &Mark {
        &self.mark
    }

    pub(crate) fn extend_to(&mut self, to: usize) {
        self.to = to;
    }

    pub fn apply(&self, doc: &Node) -> StepResult {
        let mark = &self.mark;
        map_marks(doc, self.from, self.to, &|node, _| {
            let marks = mark.remove_from_set(node.marks());
            node.mark(marks)
        })
    }

    /// Adding the mark back is exact only when all of the range carried it.
    pub fn invert(&self, doc: &Node) -> Step {
        let mark = &self.mark;
        if all_inline(doc, self.from, self.to, &|node, _| mark.is_in_set(node.marks())) {
            Step::AddMark(AddMarkStep::new(self.from, self.to, mark.clone()))
        } else {
            restore_range(doc, self.from, self.to)
        }
    }

    pub fn map<M: Mappable + ?Sized>(&self, mapping: &M) -> Option<RemoveMarkStep> {
        let (from, to) = map_range(mapping, self.from, self.to)?;
        Some(RemoveMarkStep::new(from, to, self.mark.clone()))
    }

    pub fn merge(&self, other: &RemoveMarkStep) -> Option<RemoveMarkStep> {
        if other.mark == self.mark && self.from <= other.to && self.to >= other.from {
            Some(RemoveMarkStep::new(
                self.from.min(other.from),
                self.to.max(other.to),
                self.mark.clone(),
            ))
        } else {
            None
        }
    }
}

/// Replace the node at `pos` with a copy carrying `marks`, leaving its
/// content in place.
fn remark_node(doc: &Node, pos: usize, marks: impl FnOnce(&Node) -> Vec<Mark>) -> StepResult {
    let Some(node) = node_at(doc, pos) else {
        return Err(StepFailure::new("No node at mark step's position"));
    };
    if node.is_text() {
        return Err(StepFailure::new("Node marks can't be set on text"));
    }
    let updated = node
        .ty()
        .create(Some(node.attrs()), Fragment::empty(), marks(&node));
    let open_end = if node.is_leaf() { 0 } else { 1 };
    apply_replace(
        doc,
        pos,
        pos + 1,
        &Slice::new(Fragment::from(updated), 0, open_end),
    )
}

pub(crate) fn node_at(doc: &Node, pos: usize) -> Option<Node> {
    if pos >= doc.content().size() {
        return None;
    }
    doc.node_at(pos)
}

/// Add a mark to the node at `pos`.
#[derive(Debug, Clone, PartialEq)]
pub struct AddNodeMarkStep {
    pos: usize,
    mark: Mark,
}

impl AddNodeMarkStep {
    pub fn new(pos: usize, mark: Mark) -> Self {
        Self { pos, mark }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn mark(&self) -> &Mark {
        &self.mark
    }

    pub fn apply(&self, doc: &Node) -> StepResult {
        remark_node(doc, self.pos, |node| self.mark.add_to_set(node.marks()))
    }

    /// The inverse depends on what the node carried before: adding a mark
    /// can replace an excluded one, or change nothing at all.
    pub fn invert(&self, doc: &Node) -> Step {
        if let Some(node) = node_at(doc, self.pos) {
            let new_set = self.mark.add_to_set(node.marks());
            if new_set.len() == node.marks().len() {
                for mark in node.marks() {
                    if !mark.is_in_set(&new_set) {
                        return Step::AddNodeMark(AddNodeMarkStep::new(self.pos, mark.clone()));
                    }
                }
                return Step::AddNodeMark(self.clone());
            }
        }
        Step::RemoveNodeMark(RemoveNodeMarkStep::new(self.pos, self.mark.clone()))
    }

    pub fn map<M: Mappable + ?Sized>(&self, mapping: &M) -> Option<AddNodeMarkStep> {
        let pos = mapping.map_result(self.pos, Assoc::After);
        (!pos.deleted_after()).then(|| AddNodeMarkStep::new(pos.pos, self.mark.clone()))
    }
}

/// Remove a mark from the node at `pos`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveNodeMarkStep {
    pos: usize,
    mark: Mark,
}

impl RemoveNodeMarkStep {
    pub fn new(pos: usize, mark: Mark) -> Self {
        Self { pos, mark }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn mark(&self) -> &Mark {
        &self.mark
    }

    pub fn apply(&self, doc: &Node) -> StepResult {
        remark_node(doc, self.pos, |node| self.mark.remove_from_set(node.marks()))
    }

    pub fn invert(&self, doc: &Node) -> Step {
        match node_at(doc, self.pos) {
            Some(node) if self.mark.is_in_set(node.marks()) => {
                Step::AddNodeMark(AddNodeMarkStep::new(self.pos, self.mark.clone()))
            }
            _ => Step::RemoveNodeMark(self.clone()),
        }
    }

    pub fn map<M: Mappable + ?Sized>(&self, mapping: &M) -> Option<RemoveNodeMarkStep> {
        let pos = mapping.map_result(self.pos, Assoc::After);
        (!pos.deleted_after()).then(|| RemoveNodeMarkStep::new(pos.pos, self.mark.clone()))
    }
}
