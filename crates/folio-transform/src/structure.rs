//! Structural queries and the transform operations built on them: lifting,
//! wrapping, changing block types, splitting and joining.

use folio_model::{Attrs, Fragment, Mark, Node, NodeRange, NodeType, Slice};

use crate::error::TransformError;
use crate::map::{Assoc, Mappable};
use crate::mark_step::node_at;
use crate::replace_step::{ReplaceAroundStep, ReplaceStep};
use crate::transform::Transform;

/// A node type to wrap content in, with optional attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Wrapper {
    pub ty: NodeType,
    pub attrs: Option<Attrs>,
}

impl Wrapper {
    pub fn new(ty: NodeType, attrs: Option<Attrs>) -> Self {
        Self { ty, attrs }
    }
}

impl From<NodeType> for Wrapper {
    fn from(ty: NodeType) -> Self {
        Self { ty, attrs: None }
    }
}

fn can_cut(node: &Node, start: usize, end: usize) -> bool {
    (start == 0 || node.can_replace_range(start, node.child_count()))
        && (end == node.child_count() || node.can_replace_range(0, end))
}

/// The depth the content in `range` could be lifted to, if any.
pub fn lift_target(range: &NodeRange) -> Option<usize> {
    let content = range
        .parent()
        .content()
        .cut_by_index(range.start_index(), range.end_index());
    let mut depth = range.depth;
    loop {
        let node = range.from.node(depth);
        let index = range.from.index(depth);
        let end_index = range.to.index_after(depth);
        if depth < range.depth && node.can_replace(index, end_index, &content, 0, content.child_count()) {
            return Some(depth);
        }
        if depth == 0 || node.ty().spec().isolating || !can_cut(node, index, end_index) {
            return None;
        }
        depth -= 1;
    }
}

/// The wrappers, outermost first, needed to wrap `range` in a node of type
/// `ty`: any parents `ty` itself needs, `ty`, and anything needed between
/// `ty` and the wrapped content.
pub fn find_wrapping(range: &NodeRange, ty: &NodeType, attrs: Option<Attrs>) -> Option<Vec<Wrapper>> {
    let around = find_wrapping_outside(range, ty)?;
    let inner = find_wrapping_inside(range, ty)?;
    let mut wrappers: Vec<Wrapper> = around.into_iter().map(Wrapper::from).collect();
    wrappers.push(Wrapper::new(ty.clone(), attrs));
    wrappers.extend(inner.into_iter().map(Wrapper::from));
    Some(wrappers)
}

fn find_wrapping_outside(range: &NodeRange, ty: &NodeType) -> Option<Vec<NodeType>> {
    let parent = range.parent();
    let around = parent
        .content_match_at(range.start_index())
        .find_wrapping(ty)?;
    let outer = around.first().unwrap_or(ty);
    parent
        .can_replace_with(range.start_index(), range.end_index(), outer, None)
        .then_some(around)
}

fn find_wrapping_inside(range: &NodeRange, ty: &NodeType) -> Option<Vec<NodeType>> {
    let parent = range.parent();
    let inner = parent.child(range.start_index());
    let inside = ty.content_match().find_wrapping(inner.ty())?;
    let last = inside.last().unwrap_or(ty);
    let mut matcher = Some(last.content_match());
    for i in range.start_index()..range.end_index() {
        matcher = matcher.and_then(|m| m.match_type(parent.child(i).ty()));
    }
    matcher.filter(|m| m.valid_end()).map(|_| inside)
}

/// Whether the textblock at `pos` could be turned into a node of type `ty`.
pub fn can_change_type(doc: &Node, pos: usize, ty: &NodeType) -> bool {
    let rpos = doc.resolve(pos);
    let index = rpos.index(rpos.depth());
    rpos.parent().can_replace_with(index, index + 1, ty, None)
}

fn type_after(types_after: Option<&[Option<Wrapper>]>, i: isize) -> Option<&Wrapper> {
    let i = usize::try_from(i).ok()?;
    types_after?.get(i)?.as_ref()
}

/// Whether splitting at `pos` through `depth` levels yields valid nodes.
/// `types_after` optionally overrides the type of each node after the
/// split, outermost first.
pub fn can_split(doc: &Node, pos: usize, depth: usize, types_after: Option<&[Option<Wrapper>]>) -> bool {
    if pos > doc.content().size() {
        return false;
    }
    let rpos = doc.resolve(pos);
    let Some(base) = rpos.depth().checked_sub(depth) else {
        return false;
    };
    let parent = rpos.parent();
    let index = rpos.index(rpos.depth());
    let inner_ty = types_after
        .and_then(|t| t.last())
        .and_then(|w| w.as_ref())
        .map(|w| &w.ty)
        .unwrap_or(parent.ty());
    if parent.ty().spec().isolating
        || !parent.can_replace_range(index, parent.child_count())
        || !inner_ty.valid_content(&parent.content().cut_by_index(index, parent.child_count()))
    {
        return false;
    }
    let mut i = depth as isize - 2;
    for d in (base + 1..rpos.depth()).rev() {
        let node = rpos.node(d);
        let index = rpos.index(d);
        if node.ty().spec().isolating {
            return false;
        }
        let mut rest = node.content().cut_by_index(index, node.child_count());
        if let Some(child) = type_after(types_after, i + 1) {
            rest = rest.replace_child(0, child.ty.create(child.attrs.as_ref(), Fragment::empty(), Vec::new()));
        }
        let after = type_after(types_after, i).map(|w| &w.ty).unwrap_or(node.ty());
        if !node.can_replace_range(index + 1, node.child_count()) || !after.valid_content(&rest) {
            return false;
        }
        i -= 1;
    }
    let index = rpos.index_after(base);
    let base_ty = type_after(types_after, 0)
        .map(|w| w.ty.clone())
        .unwrap_or_else(|| rpos.node(base + 1).ty().clone());
    rpos.node(base).can_replace_with(index, index, &base_ty, None)
}

fn joinable(a: Option<&Node>, b: Option<&Node>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => !a.is_leaf() && a.can_append(b),
        _ => false,
    }
}

/// Whether the nodes on both sides of `pos` can be joined.
pub fn can_join(doc: &Node, pos: usize) -> bool {
    if pos > doc.content().size() {
        return false;
    }
    let rpos = doc.resolve(pos);
    let index = rpos.index(rpos.depth());
    joinable(rpos.node_before().as_ref(), rpos.node_after().as_ref())
        && rpos.parent().can_replace_range(index, index + 1)
}

/// Look for a point near `pos` where two non-textblock nodes can be joined,
/// moving outward. `Assoc::Before` looks at the end of the preceding node,
/// `Assoc::After` at the start of the next.
pub fn join_point(doc: &Node, pos: usize, dir: Assoc) -> Option<usize> {
    let rpos = doc.resolve(pos);
    let mut pos = pos;
    let mut d = rpos.depth();
    loop {
        let mut index = rpos.index(d);
        let (before, after) = if d == rpos.depth() {
            (rpos.node_before(), rpos.node_after())
        } else if dir == Assoc::After {
            index += 1;
            (Some(rpos.node(d + 1).clone()), rpos.node(d).maybe_child(index).cloned())
        } else {
            let before = index
                .checked_sub(1)
                .and_then(|i| rpos.node(d).maybe_child(i).cloned());
            (before, Some(rpos.node(d + 1).clone()))
        };
        if before.as_ref().is_some_and(|b| !b.is_textblock())
            && joinable(before.as_ref(), after.as_ref())
            && rpos.node(d).can_replace_range(index, index + 1)
        {
            return Some(pos);
        }
        if d == 0 {
            return None;
        }
        pos = if dir == Assoc::Before {
            rpos.before(d)
        } else {
            rpos.after(d)
        };
        d -= 1;
    }
}

/// A position at or around `pos` where a node of type `ty` could be inserted
/// without splitting anything.
pub fn insert_point(doc: &Node, pos: usize, ty: &NodeType) -> Option<usize> {
    let rpos = doc.resolve(pos);
    let index = rpos.index(rpos.depth());
    if rpos.parent().can_replace_with(index, index, ty, None) {
        return Some(pos);
    }
    if rpos.parent_offset() == 0 {
        for d in (0..rpos.depth()).rev() {
            let index = rpos.index(d);
            if rpos.node(d).can_replace_with(index, index, ty, None) {
                return Some(rpos.before(d + 1));
            }
            if index > 0 {
                return None;
            }
        }
    }
    if rpos.parent_offset() == rpos.parent().content().size() {
        for d in (0..rpos.depth()).rev() {
            let index = rpos.index_after(d);
            if rpos.node(d).can_replace_with(index, index, ty, None) {
                return Some(rpos.after(d + 1));
            }
            if index < rpos.node(d).child_count() {
                return None;
            }
        }
    }
    None
}

/// A position around `pos` where `slice` could be dropped, allowing the
/// slice to be wrapped when it is closed.
pub fn drop_point(doc: &Node, pos: usize, slice: &Slice) -> Option<usize> {
    let rpos = doc.resolve(pos);
    if slice.content().size() == 0 {
        return Some(pos);
    }
    let mut content = slice.content().clone();
    for _ in 0..slice.open_start() {
        content = content.first_child()?.content().clone();
    }
    let passes = if slice.open_start() == 0 && slice.size() > 0 { 2 } else { 1 };
    for pass in 1..=passes {
        for d in (0..=rpos.depth()).rev() {
            let bias = if d == rpos.depth() {
                0
            } else if 2 * rpos.pos() <= rpos.start(d + 1) + rpos.end(d + 1) {
                -1
            } else {
                1
            };
            let insert_pos = rpos.index(d) + usize::from(bias > 0);
            let parent = rpos.node(d);
            let fits = if pass == 1 {
                parent.can_replace(insert_pos, insert_pos, &content, 0, content.child_count())
            } else {
                content
                    .first_child()
                    .and_then(|first| parent.content_match_at(insert_pos).find_wrapping(first.ty()))
                    .and_then(|wrapping| wrapping.first().cloned())
                    .is_some_and(|outer| parent.can_replace_with(insert_pos, insert_pos, &outer, None))
            };
            if fits {
                return Some(match bias {
                    0 => rpos.pos(),
                    b if b < 0 => rpos.before(d + 1),
                    _ => rpos.after(d + 1),
                });
            }
        }
    }
    None
}

impl Transform {
    /// Move the content of `range` out of its parents, up to depth
    /// `target`, splitting the parents where needed.
    pub fn lift(&mut self, range: &NodeRange, target: usize) -> Result<&mut Self, TransformError> {
        let NodeRange { from, to, depth } = range;
        let depth = *depth;
        if target > depth {
            return Err(TransformError::InvalidArgument(format!(
                "lift target {target} below range depth {depth}"
            )));
        }
        let gap_start = from.before(depth + 1);
        let gap_end = to.after(depth + 1);
        let mut start = gap_start;
        let mut end = gap_end;

        let mut before = Fragment::empty();
        let mut open_start = 0;
        let mut splitting = false;
        for d in (target + 1..=depth).rev() {
            if splitting || from.index(d) > 0 {
                splitting = true;
                before = Fragment::from(from.node(d).copy(before));
                open_start += 1;
            } else {
                start -= 1;
            }
        }
        let mut after = Fragment::empty();
        let mut open_end = 0;
        let mut splitting = false;
        for d in (target + 1..=depth).rev() {
            if splitting || to.after(d + 1) < to.end(d) {
                splitting = true;
                after = Fragment::from(to.node(d).copy(after));
                open_end += 1;
            } else {
                end += 1;
            }
        }

        let insert = before.size() - open_start;
        self.step(
            ReplaceAroundStep::new(
                start,
                end,
                gap_start,
                gap_end,
                Slice::new(before.append(&after), open_start, open_end),
                insert,
                true,
            )
            .into(),
        )
    }

    /// Wrap the nodes in `range` in the given wrappers, outermost first.
    pub fn wrap(&mut self, range: &NodeRange, wrappers: &[Wrapper]) -> Result<&mut Self, TransformError> {
        let mut content = Fragment::empty();
        for wrapper in wrappers.iter().rev() {
            if content.size() > 0 {
                let valid = wrapper
                    .ty
                    .content_match()
                    .match_fragment(&content, 0, content.child_count())
                    .is_some_and(|m| m.valid_end());
                if !valid {
                    return Err(TransformError::InvalidArgument(format!(
                        "wrapper {} can't hold the wrappers inside it",
                        wrapper.ty.name()
                    )));
                }
            }
            content = Fragment::from(wrapper.ty.create(wrapper.attrs.as_ref(), content, Vec::new()));
        }
        let start = range.start();
        let end = range.end();
        self.step(
            ReplaceAroundStep::new(start, end, start, end, Slice::new(content, 0, 0), wrappers.len(), true).into(),
        )
    }

    /// Turn every textblock between `from` and `to` into a `ty` node with
    /// `attrs`. Blocks that already have that markup are left alone.
    pub fn set_block_type(
        &mut self,
        from: usize,
        to: usize,
        ty: &NodeType,
        attrs: Option<&Attrs>,
    ) -> Result<&mut Self, TransformError> {
        if !ty.is_textblock() {
            return Err(TransformError::InvalidArgument(format!(
                "{} is not a textblock type",
                ty.name()
            )));
        }
        self.check_range(from, to)?;
        let map_from = self.steps().len();
        let mut blocks: Vec<(Node, usize)> = Vec::new();
        self.doc().nodes_between(from, to, &mut |node: &Node, pos, _, _| {
            if node.is_textblock() {
                blocks.push((node.clone(), pos));
                return false;
            }
            true
        });
        for (node, pos) in blocks {
            if node.has_markup(ty, attrs, node.marks()) {
                continue;
            }
            let mapped = self.mapping().slice_from(map_from).map(pos, Assoc::After);
            if !can_change_type(self.doc(), mapped, ty) {
                continue;
            }
            self.clear_incompatible(mapped, ty, None)?;
            let mapping = self.mapping().slice_from(map_from);
            let start = mapping.map(pos, Assoc::After);
            let end = mapping.map(pos + node.node_size(), Assoc::After);
            let replacement = ty.create(attrs, Fragment::empty(), node.marks().to_vec());
            self.step(
                ReplaceAroundStep::new(
                    start,
                    end,
                    start + 1,
                    end - 1,
                    Slice::new(Fragment::from(replacement), 0, 0),
                    1,
                    true,
                )
                .into(),
            )?;
        }
        Ok(self)
    }

    /// Change the type, attributes and/or marks of the node at `pos`,
    /// keeping its content.
    pub fn set_node_markup(
        &mut self,
        pos: usize,
        ty: Option<&NodeType>,
        attrs: Option<&Attrs>,
        marks: Option<Vec<Mark>>,
    ) -> Result<&mut Self, TransformError> {
        let Some(node) = node_at(self.doc(), pos) else {
            return Err(TransformError::InvalidArgument(format!("no node at position {pos}")));
        };
        let ty = ty.unwrap_or(node.ty()).clone();
        let marks = marks.unwrap_or_else(|| node.marks().to_vec());
        if node.is_leaf() {
            let replacement = ty.create(attrs, Fragment::empty(), marks);
            return self.replace_with(pos, pos + node.node_size(), replacement);
        }
        if !ty.valid_content(node.content()) {
            return Err(TransformError::InvalidArgument(format!(
                "invalid content for node type {}",
                ty.name()
            )));
        }
        let replacement = ty.create(attrs, Fragment::empty(), marks);
        let end = pos + node.node_size();
        self.step(
            ReplaceAroundStep::new(
                pos,
                end,
                pos + 1,
                end - 1,
                Slice::new(Fragment::from(replacement), 0, 0),
                1,
                true,
            )
            .into(),
        )
    }

    /// Split the node at `pos`, and `depth - 1` of its ancestors.
    pub fn split(
        &mut self,
        pos: usize,
        depth: usize,
        types_after: Option<&[Option<Wrapper>]>,
    ) -> Result<&mut Self, TransformError> {
        self.check_pos(pos)?;
        let rpos = self.doc().resolve(pos);
        let Some(base) = rpos.depth().checked_sub(depth) else {
            return Err(TransformError::InvalidArgument(format!(
                "can't split {depth} levels at depth {}",
                rpos.depth()
            )));
        };
        let mut before = Fragment::empty();
        let mut after = Fragment::empty();
        let mut i = depth as isize - 1;
        for d in (base + 1..=rpos.depth()).rev() {
            before = Fragment::from(rpos.node(d).copy(before));
            after = Fragment::from(match type_after(types_after, i) {
                Some(wrapper) => wrapper.ty.create(wrapper.attrs.as_ref(), after, Vec::new()),
                None => rpos.node(d).copy(after),
            });
            i -= 1;
        }
        self.step(ReplaceStep::new(pos, pos, Slice::new(before.append(&after), depth, depth), true).into())
    }

    /// Join the blocks around `pos`, closing `depth` levels.
    pub fn join(&mut self, pos: usize, depth: usize) -> Result<&mut Self, TransformError> {
        if depth > pos {
            return Err(TransformError::InvalidArgument(format!("can't join {depth} levels at {pos}")));
        }
        self.check_pos(pos + depth)?;
        self.step(ReplaceStep::new(pos - depth, pos + depth, Slice::empty(), true).into())
    }
}
