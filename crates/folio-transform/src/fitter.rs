//! Fitting arbitrary slices into a document.
//!
//! The fitter walks the slice's content from its open start, placing nodes
//! into an open "frontier" that starts at the replace's start position. It
//! opens, wraps or drops slice nodes until everything is placed, then closes
//! the frontier onto the content after the end of the range.

use folio_model::{Attrs, ContentMatch, Fragment, Node, NodeType, ResolvedPos, Slice};

use crate::replace_step::{ReplaceAroundStep, ReplaceStep};
use crate::step::Step;

/// A step replacing `from..to` with `slice`, adjusted so that the result is
/// valid for the schema. `None` when nothing would change or no fit exists.
pub fn replace_step(doc: &Node, from: usize, to: usize, slice: &Slice) -> Option<Step> {
    if from == to && slice.size() == 0 {
        return None;
    }
    let rfrom = doc.resolve(from);
    let rto = doc.resolve(to);
    if fits_trivially(&rfrom, &rto, slice) {
        return Some(ReplaceStep::new(from, to, slice.clone(), false).into());
    }
    Fitter::new(rfrom, rto, slice.clone()).fit()
}

/// Whether a closed slice can go between two positions in the same parent as
/// it is.
pub fn fits_trivially(rfrom: &ResolvedPos, rto: &ResolvedPos, slice: &Slice) -> bool {
    slice.open_start() == 0
        && slice.open_end() == 0
        && rfrom.start(rfrom.depth()) == rto.start(rto.depth())
        && rfrom.parent().can_replace(
            rfrom.index(rfrom.depth()),
            rto.index(rto.depth()),
            slice.content(),
            0,
            slice.content().child_count(),
        )
}

#[derive(Debug, Clone)]
struct Frontier {
    ty: NodeType,
    matcher: ContentMatch,
}

struct Fittable {
    slice_depth: usize,
    frontier_depth: usize,
    parent: Option<Node>,
    inject: Option<Fragment>,
    wrap: Option<Vec<NodeType>>,
}

struct CloseLevel {
    depth: usize,
    fit: Fragment,
    target: ResolvedPos,
}

struct Fitter {
    from: ResolvedPos,
    to: ResolvedPos,
    unplaced: Slice,
    frontier: Vec<Frontier>,
    placed: Fragment,
}

impl Fitter {
    fn new(from: ResolvedPos, to: ResolvedPos, unplaced: Slice) -> Self {
        let mut frontier = Vec::with_capacity(from.depth() + 1);
        for d in 0..=from.depth() {
            let node = from.node(d);
            frontier.push(Frontier {
                ty: node.ty().clone(),
                matcher: node.content_match_at(from.index_after(d)),
            });
        }
        let mut placed = Fragment::empty();
        for d in (1..=from.depth()).rev() {
            placed = Fragment::from(from.node(d).copy(placed));
        }
        Self {
            from,
            to,
            unplaced,
            frontier,
            placed,
        }
    }

    fn depth(&self) -> usize {
        self.frontier.len() - 1
    }

    fn fit(mut self) -> Option<Step> {
        while self.unplaced.size() > 0 {
            if let Some(fittable) = self.find_fittable() {
                self.place_nodes(fittable);
            } else if !self.open_more() {
                self.drop_node();
            }
        }
        let move_inline = self.must_move_inline();
        let placed_size = self
            .placed
            .size()
            .saturating_sub(self.depth() + self.from.depth());
        let target = match move_inline {
            Some(pos) => self.from.doc().resolve(pos),
            None => self.to.clone(),
        };
        let closed = self.close(target)?;

        let mut content = self.placed.clone();
        let mut open_start = self.from.depth();
        let mut open_end = closed.depth();
        while open_start > 0 && open_end > 0 && content.child_count() == 1 {
            let Some(first) = content.first_child() else {
                break;
            };
            content = first.content().clone();
            open_start -= 1;
            open_end -= 1;
        }
        let slice = Slice::new(content, open_start, open_end);
        if let Some(move_to) = move_inline {
            return Some(
                ReplaceAroundStep::new(
                    self.from.pos(),
                    move_to,
                    self.to.pos(),
                    self.to.end(self.to.depth()),
                    slice,
                    placed_size,
                    false,
                )
                .into(),
            );
        }
        if slice.size() > 0 || self.from.pos() != self.to.pos() {
            return Some(ReplaceStep::new(self.from.pos(), closed.pos(), slice, false).into());
        }
        None
    }

    /// Find a position where the next bit of unplaced content fits. Wrapping
    /// is only tried after a direct fit failed everywhere.
    fn find_fittable(&self) -> Option<Fittable> {
        let mut start_depth = self.unplaced.open_start();
        let mut cur = self.unplaced.content().clone();
        let mut open_end = self.unplaced.open_end();
        for d in 0..start_depth {
            let Some(node) = cur.first_child().cloned() else {
                break;
            };
            if cur.child_count() > 1 {
                open_end = 0;
            }
            if node.ty().spec().isolating && open_end <= d {
                start_depth = d;
                break;
            }
            cur = node.content().clone();
        }

        for pass in 1..=2 {
            let top = if pass == 1 {
                start_depth
            } else {
                self.unplaced.open_start()
            };
            for slice_depth in (0..=top).rev() {
                let (fragment, parent) = if slice_depth > 0 {
                    let parent = content_at(self.unplaced.content(), slice_depth - 1)
                        .first_child()
                        .cloned();
                    let fragment = parent
                        .as_ref()
                        .map(|p| p.content().clone())
                        .unwrap_or_else(Fragment::empty);
                    (fragment, parent)
                } else {
                    (self.unplaced.content().clone(), None)
                };
                let first = fragment.first_child();
                for frontier_depth in (0..=self.depth()).rev() {
                    let Frontier { ty, matcher } = &self.frontier[frontier_depth];
                    if pass == 1 {
                        let (fits, inject) = match first {
                            Some(first) => {
                                if matcher.match_type(first.ty()).is_some() {
                                    (true, None)
                                } else {
                                    let inject =
                                        matcher.fill_before(&Fragment::from(first.clone()), false, 0);
                                    (inject.is_some(), inject)
                                }
                            }
                            None => (
                                parent
                                    .as_ref()
                                    .is_some_and(|p| ty.compatible_content(p.ty())),
                                None,
                            ),
                        };
                        if fits {
                            return Some(Fittable {
                                slice_depth,
                                frontier_depth,
                                parent,
                                inject,
                                wrap: None,
                            });
                        }
                    } else if let Some(wrap) = first.and_then(|f| matcher.find_wrapping(f.ty())) {
                        return Some(Fittable {
                            slice_depth,
                            frontier_depth,
                            parent,
                            inject: None,
                            wrap: Some(wrap),
                        });
                    }
                    if parent
                        .as_ref()
                        .is_some_and(|p| matcher.match_type(p.ty()).is_some())
                    {
                        break;
                    }
                }
            }
        }
        None
    }

    fn open_more(&mut self) -> bool {
        let content = self.unplaced.content().clone();
        let open_start = self.unplaced.open_start();
        let open_end = self.unplaced.open_end();
        let inner = content_at(&content, open_start);
        match inner.first_child() {
            Some(first) if !first.is_leaf() => {}
            _ => return false,
        }
        let open_end = if inner.size() + open_start >= content.size() - open_end {
            open_end.max(open_start + 1)
        } else {
            open_end
        };
        self.unplaced = Slice::new(content, open_start + 1, open_end);
        true
    }

    fn drop_node(&mut self) {
        let content = self.unplaced.content().clone();
        let open_start = self.unplaced.open_start();
        let open_end = self.unplaced.open_end();
        let inner = content_at(&content, open_start);
        if let Some(dropped) = inner.first_child() {
            log::debug!("fitter dropping unplaceable {} at slice depth {open_start}", dropped.ty().name());
        }
        if inner.child_count() <= 1 && open_start > 0 {
            let open_at_end = content.size() - open_start <= open_start + inner.size();
            self.unplaced = Slice::new(
                drop_from_fragment(&content, open_start - 1, 1),
                open_start - 1,
                if open_at_end { open_start - 1 } else { open_end },
            );
        } else {
            self.unplaced = Slice::new(drop_from_fragment(&content, open_start, 1), open_start, open_end);
        }
    }

    /// Move content from the unplaced slice at `slice_depth` into the
    /// frontier node at `frontier_depth`.
    fn place_nodes(&mut self, fittable: Fittable) {
        let Fittable {
            slice_depth,
            frontier_depth,
            parent,
            inject,
            wrap,
        } = fittable;
        while self.depth() > frontier_depth {
            self.close_frontier_node();
        }
        for ty in wrap.iter().flatten() {
            self.open_frontier_node(ty, None, Fragment::empty());
        }

        let slice = self.unplaced.clone();
        let fragment = match &parent {
            Some(parent) => parent.content().clone(),
            None => slice.content().clone(),
        };
        let open_start = slice.open_start() - slice_depth;
        let mut taken = 0;
        let mut add = Vec::new();
        let top = self.depth();
        let ty = self.frontier[top].ty.clone();
        let mut matcher = self.frontier[top].matcher.clone();
        if let Some(inject) = &inject {
            add.extend(inject.iter().cloned());
            if let Some(m) = matcher.match_fragment(inject, 0, inject.child_count()) {
                matcher = m;
            }
        }
        // Open nodes at the end of the fragment: 0 means only the parent is
        // open, negative means nothing is.
        let mut open_end_count = (fragment.size() + slice_depth) as isize
            - (slice.content().size() - slice.open_end()) as isize;
        while taken < fragment.child_count() {
            let next = fragment.child(taken);
            let Some(matches) = matcher.match_type(next.ty()) else {
                break;
            };
            taken += 1;
            if taken > 1 || open_start == 0 || next.content().size() > 0 {
                matcher = matches;
                let node = next.mark(ty.allowed_marks(next.marks()));
                add.push(close_node_start(
                    node,
                    if taken == 1 { open_start } else { 0 },
                    if taken == fragment.child_count() {
                        open_end_count
                    } else {
                        -1
                    },
                ));
            }
        }
        let to_end = taken == fragment.child_count();
        if !to_end {
            open_end_count = -1;
        }

        self.placed = add_to_fragment(&self.placed, top, Fragment::from_array(add));
        self.frontier[top].matcher = matcher;

        if to_end
            && open_end_count < 0
            && parent.as_ref().is_some_and(|p| *p.ty() == self.frontier[self.depth()].ty)
            && self.frontier.len() > 1
        {
            self.close_frontier_node();
        }

        let mut cur = fragment.clone();
        for _ in 0..open_end_count.max(0) {
            let Some(node) = cur.last_child().cloned() else {
                break;
            };
            self.frontier.push(Frontier {
                ty: node.ty().clone(),
                matcher: node.content_match_at(node.child_count()),
            });
            cur = node.content().clone();
        }

        self.unplaced = if !to_end {
            Slice::new(
                drop_from_fragment(slice.content(), slice_depth, taken),
                slice.open_start(),
                slice.open_end(),
            )
        } else if slice_depth == 0 {
            Slice::empty()
        } else {
            Slice::new(
                drop_from_fragment(slice.content(), slice_depth - 1, 1),
                slice_depth - 1,
                if open_end_count < 0 {
                    slice.open_end()
                } else {
                    slice_depth - 1
                },
            )
        };
    }

    /// When the placed content ends in a textblock and the range ends in
    /// one, the end's inline content is pulled into the placed textblock.
    /// Returns the position after the end textblock in that case.
    fn must_move_inline(&self) -> Option<usize> {
        if !self.to.parent().is_textblock() {
            return None;
        }
        let top = &self.frontier[self.depth()];
        if !top.ty.is_textblock()
            || content_after_fits(&self.to, self.to.depth(), &top.ty, &top.matcher, false).is_none()
        {
            return None;
        }
        if self.to.depth() == self.depth()
            && self
                .find_close_level(&self.to)
                .is_some_and(|level| level.depth == self.depth())
        {
            return None;
        }
        let mut depth = self.to.depth();
        let mut after = self.to.after(depth);
        while depth > 1 {
            depth -= 1;
            if after != self.to.end(depth) {
                break;
            }
            after += 1;
        }
        Some(after)
    }

    fn find_close_level(&self, to: &ResolvedPos) -> Option<CloseLevel> {
        'scan: for i in (0..=self.depth().min(to.depth())).rev() {
            let Frontier { ty, matcher } = &self.frontier[i];
            let drop_inner = i < to.depth() && to.end(i + 1) == to.pos() + (to.depth() - (i + 1));
            let Some(fit) = content_after_fits(to, i, ty, matcher, drop_inner) else {
                continue;
            };
            for d in (0..i).rev() {
                let Frontier { ty, matcher } = &self.frontier[d];
                match content_after_fits(to, d, ty, matcher, true) {
                    Some(matches) if matches.child_count() == 0 => {}
                    _ => continue 'scan,
                }
            }
            let target = if drop_inner {
                to.doc().resolve(to.after(i + 1))
            } else {
                to.clone()
            };
            return Some(CloseLevel {
                depth: i,
                fit,
                target,
            });
        }
        None
    }

    fn close(&mut self, to: ResolvedPos) -> Option<ResolvedPos> {
        let close = self.find_close_level(&to)?;
        while self.depth() > close.depth {
            self.close_frontier_node();
        }
        if close.fit.child_count() > 0 {
            self.placed = add_to_fragment(&self.placed, close.depth, close.fit);
        }
        let target = close.target;
        for d in close.depth + 1..=target.depth() {
            let node = target.node(d);
            let add = node
                .ty()
                .content_match()
                .fill_before(node.content(), true, target.index(d))
                .unwrap_or_else(Fragment::empty);
            self.open_frontier_node(node.ty(), Some(node.attrs()), add);
        }
        Some(target)
    }

    fn open_frontier_node(&mut self, ty: &NodeType, attrs: Option<&Attrs>, content: Fragment) {
        let depth = self.depth();
        let top = &mut self.frontier[depth];
        if let Some(next) = top.matcher.match_type(ty) {
            top.matcher = next;
        }
        self.placed = add_to_fragment(
            &self.placed,
            depth,
            Fragment::from(ty.create(attrs, content, Vec::new())),
        );
        self.frontier.push(Frontier {
            ty: ty.clone(),
            matcher: ty.content_match(),
        });
    }

    fn close_frontier_node(&mut self) {
        let Some(open) = self.frontier.pop() else {
            return;
        };
        if let Some(add) = open.matcher.fill_before(&Fragment::empty(), true, 0)
            && add.child_count() > 0
        {
            self.placed = add_to_fragment(&self.placed, self.frontier.len(), add);
        }
    }
}

fn drop_from_fragment(fragment: &Fragment, depth: usize, count: usize) -> Fragment {
    if depth == 0 {
        return fragment.cut_by_index(count.min(fragment.child_count()), fragment.child_count());
    }
    match fragment.first_child() {
        Some(first) => fragment.replace_child(
            0,
            first.copy(drop_from_fragment(first.content(), depth - 1, count)),
        ),
        None => fragment.clone(),
    }
}

fn add_to_fragment(fragment: &Fragment, depth: usize, content: Fragment) -> Fragment {
    if depth == 0 {
        return fragment.append(&content);
    }
    match fragment.last_child() {
        Some(last) => fragment.replace_child(
            fragment.child_count() - 1,
            last.copy(add_to_fragment(last.content(), depth - 1, content)),
        ),
        None => fragment.clone(),
    }
}

fn content_at(fragment: &Fragment, depth: usize) -> Fragment {
    let mut fragment = fragment.clone();
    for _ in 0..depth {
        fragment = match fragment.first_child() {
            Some(first) => first.content().clone(),
            None => return Fragment::empty(),
        };
    }
    fragment
}

/// Complete the start of a node that was open in the slice so that it is
/// valid on its own.
fn close_node_start(node: Node, open_start: usize, open_end: isize) -> Node {
    if open_start == 0 {
        return node;
    }
    let mut frag = node.content().clone();
    if open_start > 1
        && let Some(first) = frag.first_child().cloned()
    {
        let inner_end = if frag.child_count() == 1 { open_end - 1 } else { 0 };
        frag = frag.replace_child(0, close_node_start(first, open_start - 1, inner_end));
    }
    let matcher = node.ty().content_match();
    if let Some(before) = matcher.fill_before(&frag, false, 0) {
        frag = before.append(&frag);
    }
    if open_end <= 0
        && let Some(after) = matcher
            .match_fragment(&frag, 0, frag.child_count())
            .and_then(|m| m.fill_before(&Fragment::empty(), true, 0))
    {
        frag = frag.append(&after);
    }
    node.copy(frag)
}

/// Nodes needed to make the content after `to` at `depth` valid when it
/// follows content matched so far by `matcher`.
fn content_after_fits(
    to: &ResolvedPos,
    depth: usize,
    ty: &NodeType,
    matcher: &ContentMatch,
    open: bool,
) -> Option<Fragment> {
    let node = to.node(depth);
    let index = if open {
        to.index_after(depth)
    } else {
        to.index(depth)
    };
    if index == node.child_count() && !ty.compatible_content(node.ty()) {
        return None;
    }
    let fit = matcher.fill_before(node.content(), true, index)?;
    (!invalid_marks(ty, node.content(), index)).then_some(fit)
}

fn invalid_marks(ty: &NodeType, fragment: &Fragment, start: usize) -> bool {
    (start..fragment.child_count()).any(|i| !ty.allows_marks(fragment.child(i).marks()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_model::basic::basic_schema;
    use folio_model::builders::*;
    use pretty_assertions::assert_eq;

    fn apply(doc: &Node, from: usize, to: usize, slice: Slice) -> Node {
        match replace_step(doc, from, to, &slice) {
            Some(step) => step.apply(doc).unwrap(),
            None => doc.clone(),
        }
    }

    #[test]
    fn test_no_op_produces_no_step() {
        let doc = document![p!["ab"]];
        assert!(replace_step(&doc, 1, 1, &Slice::empty()).is_none());
    }

    #[test]
    fn test_trivial_fit_is_used_as_is() {
        let doc = document![p!["ab"]];
        let slice = Slice::new(Fragment::from(basic_schema().text("x", vec![])), 0, 0);
        let step = replace_step(&doc, 2, 2, &slice).unwrap();
        assert_eq!(step, Step::from(ReplaceStep::new(2, 2, slice, false)));
    }

    #[test]
    fn test_deleting_across_paragraphs_joins_them() {
        let doc = document![p!["abc"], p!["def"]];
        assert_eq!(apply(&doc, 3, 7, Slice::empty()), document![p!["abef"]]);
    }

    #[test]
    fn test_closed_paragraph_inside_text_splits() {
        let doc = document![p!["abcd"]];
        let slice = Slice::new(Fragment::from(p!["x"]), 0, 0);
        assert_eq!(apply(&doc, 3, 3, slice), document![p!["ab"], p!["x"], p!["cd"]]);
    }

    #[test]
    fn test_list_item_is_wrapped_to_fit() {
        let doc = document![p!["a"]];
        let slice = Slice::new(Fragment::from(li![p!["b"]]), 0, 0);
        assert_eq!(apply(&doc, 3, 3, slice), document![p!["a"], ol![li![p!["b"]]]]);
    }

    #[test]
    fn test_paragraph_at_list_end_goes_after_the_list() {
        let doc = document![ul![li![p!["a"]]]];
        let slice = Slice::new(Fragment::from(p!["b"]), 0, 0);
        assert_eq!(apply(&doc, 6, 6, slice), document![ul![li![p!["a"]]], p!["b"]]);
    }

    #[test]
    fn test_open_slice_is_merged_into_surrounding_text() {
        let doc = document![p!["ab"], p!["cd"]];
        let slice = doc.slice(2, 6, false);
        let result = apply(&doc, 1, 1, slice);
        assert_eq!(result, document![p!["b"], p!["cab"], p!["cd"]]);
    }

    #[test]
    fn test_disallowed_marks_are_dropped() {
        let doc = document![code_block!["xy"]];
        let slice = Slice::new(Fragment::from(basic_schema().text("z", vec![basic_schema().mark("em", None).unwrap()])), 0, 0);
        assert_eq!(apply(&doc, 2, 2, slice), document![code_block!["xzy"]]);
    }
}
