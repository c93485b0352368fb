use folio_model::{Fragment, Node, ResolvedPos, Slice};

use crate::error::TransformError;
use crate::fitter::fits_trivially;
use crate::replace_step::ReplaceStep;
use crate::structure::insert_point;
use crate::transform::Transform;

/// Depths at which the range `from..to` covers the entire content of the
/// ancestor node, deepest first.
pub(crate) fn covered_depths(from: &ResolvedPos, to: &ResolvedPos) -> Vec<usize> {
    let mut result = Vec::new();
    for d in (0..=from.depth().min(to.depth())).rev() {
        let start = from.start(d);
        if start < from.pos() - (from.depth() - d)
            || to.end(d) > to.pos() + (to.depth() - d)
            || from.node(d).ty().spec().isolating
            || to.node(d).ty().spec().isolating
        {
            break;
        }
        let same_textblock_edges = d == from.depth()
            && d == to.depth()
            && from.parent().inline_content()
            && to.parent().inline_content()
            && d > 0
            && to.start(d - 1) == start - 1;
        if start == to.start(d) || same_textblock_edges {
            result.push(d);
        }
    }
    result
}

/// Close the start of `fragment` from `old_open` down to `new_open` levels,
/// filling in whatever content the closed nodes need.
fn close_fragment(fragment: &Fragment, depth: usize, old_open: usize, new_open: usize, parent: Option<&Node>) -> Fragment {
    let mut fragment = fragment.clone();
    if depth < old_open
        && let Some(first) = fragment.first_child().cloned()
    {
        let inner = close_fragment(first.content(), depth + 1, old_open, new_open, Some(&first));
        fragment = fragment.replace_child(0, first.copy(inner));
    }
    if depth > new_open
        && let Some(parent) = parent
    {
        let matcher = parent.content_match_at(0);
        let start = matcher
            .fill_before(&fragment, false, 0)
            .unwrap_or_else(Fragment::empty)
            .append(&fragment);
        let end = matcher
            .match_fragment(&start, 0, start.child_count())
            .and_then(|m| m.fill_before(&Fragment::empty(), true, 0))
            .unwrap_or_else(Fragment::empty);
        fragment = start.append(&end);
    }
    fragment
}

impl Transform {
    /// Replace a range with a slice, expanding the range to cover whole
    /// parent nodes when that makes the slice fit better. Open slices of
    /// defining nodes keep their own wrapper instead of taking on the
    /// surrounding one.
    pub fn replace_range(&mut self, from: usize, to: usize, slice: Slice) -> Result<&mut Self, TransformError> {
        self.check_range(from, to)?;
        if slice.size() == 0 {
            return self.delete_range(from, to);
        }
        let doc = self.doc().clone();
        let rfrom = doc.resolve(from);
        let rto = doc.resolve(to);
        if fits_trivially(&rfrom, &rto, &slice) {
            return self.step(ReplaceStep::new(from, to, slice, false).into());
        }

        // Negative depths mean "replace from before that node up to `to`"
        // instead of covering the whole node.
        let mut target_depths: Vec<isize> = covered_depths(&rfrom, &rto)
            .into_iter()
            .map(|d| d as isize)
            .collect();
        if target_depths.last() == Some(&0) {
            target_depths.pop();
        }
        let mut preferred_target = -(rfrom.depth() as isize + 1);
        target_depths.insert(0, preferred_target);
        let mut pos = rfrom.pos();
        for d in (1..=rfrom.depth()).rev() {
            pos -= 1;
            let spec = rfrom.node(d).ty().spec();
            if spec.defining || spec.isolating {
                break;
            }
            if target_depths.contains(&(d as isize)) {
                preferred_target = d as isize;
            } else if rfrom.before(d) == pos {
                target_depths.insert(1, -(d as isize));
            }
        }
        let preferred_index = target_depths
            .iter()
            .position(|&d| d == preferred_target)
            .unwrap_or(0);

        let mut left_nodes: Vec<Node> = Vec::new();
        let mut content = slice.content().clone();
        for i in 0..=slice.open_start() {
            let Some(node) = content.first_child().cloned() else {
                break;
            };
            content = node.content().clone();
            left_nodes.push(node);
            if i == slice.open_start() {
                break;
            }
        }

        // Back up to cover defining textblocks directly above the preferred
        // depth, possibly skipping a non-defining textblock.
        let mut preferred_depth = slice.open_start();
        let target_node = rfrom.node(preferred_target.unsigned_abs() - 1);
        for d in (0..preferred_depth).rev() {
            let Some(left) = left_nodes.get(d) else {
                continue;
            };
            let defining = left.ty().spec().defining;
            if defining && !left.same_markup(target_node) {
                preferred_depth = d;
            } else if defining || !left.ty().is_textblock() {
                break;
            }
        }

        let open_start = slice.open_start();
        for j in (0..=open_start).rev() {
            let open_depth = (j + preferred_depth + 1) % (open_start + 1);
            let Some(insert) = left_nodes.get(open_depth) else {
                continue;
            };
            for i in 0..target_depths.len() {
                let target = target_depths[(i + preferred_index) % target_depths.len()];
                let expand = target >= 0;
                let target = target.unsigned_abs();
                let parent = rfrom.node(target - 1);
                let index = rfrom.index(target - 1);
                if parent.can_replace_with(index, index, insert.ty(), Some(insert.marks())) {
                    let end = if expand { rto.after(target) } else { to };
                    let closed = close_fragment(slice.content(), 0, open_start, open_depth, None);
                    return self.replace(
                        rfrom.before(target),
                        end,
                        Slice::new(closed, open_depth, slice.open_end()),
                    );
                }
            }
        }

        let start_steps = self.steps().len();
        let (mut from, mut to) = (from, to);
        for &depth in target_depths.iter().rev() {
            self.replace(from, to, slice.clone())?;
            if self.steps().len() > start_steps {
                break;
            }
            if depth < 0 {
                continue;
            }
            from = rfrom.before(depth as usize);
            to = rto.after(depth as usize);
        }
        Ok(self)
    }

    /// Replace a range with a single node. A block node inserted at a point
    /// inside non-empty content moves to a nearby spot where it fits without
    /// splitting.
    pub fn replace_range_with(&mut self, from: usize, to: usize, node: Node) -> Result<&mut Self, TransformError> {
        self.check_range(from, to)?;
        let (mut from, mut to) = (from, to);
        if !node.is_inline()
            && from == to
            && self.doc().resolve(from).parent().content().size() > 0
            && let Some(point) = insert_point(self.doc(), from, node.ty())
        {
            from = point;
            to = point;
        }
        self.replace_range(from, to, Slice::new(Fragment::from(node), 0, 0))
    }

    /// Delete a range, growing it to cover whole nodes when the range covers
    /// all of their content.
    pub fn delete_range(&mut self, from: usize, to: usize) -> Result<&mut Self, TransformError> {
        self.check_range(from, to)?;
        let doc = self.doc().clone();
        let rfrom = doc.resolve(from);
        let rto = doc.resolve(to);
        let covered = covered_depths(&rfrom, &rto);
        for (i, &depth) in covered.iter().enumerate() {
            let last = i == covered.len() - 1;
            if (last && depth == 0) || rfrom.node(depth).ty().content_match().valid_end() {
                return self.delete(rfrom.start(depth), rto.end(depth));
            }
            if depth > 0
                && (last
                    || rfrom
                        .node(depth - 1)
                        .can_replace_range(rfrom.index(depth - 1), rto.index_after(depth - 1)))
            {
                return self.delete(rfrom.before(depth), rto.after(depth));
            }
        }
        for d in 1..=rfrom.depth().min(rto.depth()) {
            if from - rfrom.start(d) == rfrom.depth() - d
                && to > rfrom.end(d)
                && rto.end(d) - to != rto.depth() - d
                && rfrom.start(d - 1) == rto.start(d - 1)
                && rfrom
                    .node(d - 1)
                    .can_replace_range(rfrom.index(d - 1), rto.index(d - 1))
            {
                return self.delete(rfrom.before(d), to);
            }
        }
        self.delete(from, to)
    }
}
