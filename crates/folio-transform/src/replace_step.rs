use folio_model::{Node, Slice};

use crate::error::StepFailure;
use crate::map::{Assoc, MapRange, Mappable, StepMap};
use crate::step::StepResult;

fn check_range(doc: &Node, from: usize, to: usize) -> Result<(), StepFailure> {
    if from > to || to > doc.content().size() {
        return Err(StepFailure::new(format!(
            "Range {from}..{to} outside of document of size {}",
            doc.content().size()
        )));
    }
    Ok(())
}

pub(crate) fn apply_replace(doc: &Node, from: usize, to: usize, slice: &Slice) -> StepResult {
    check_range(doc, from, to)?;
    Ok(doc.replace(from, to, slice)?)
}

/// Replace the content between `from` and `to` with a slice.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceStep {
    from: usize,
    to: usize,
    slice: Slice,
    structure: bool,
}

impl ReplaceStep {
    /// With `structure` set the step refuses to apply when the replaced
    /// range contains anything besides node boundaries.
    pub fn new(from: usize, to: usize, slice: Slice, structure: bool) -> Self {
        assert!(from <= to, "ReplaceStep from {from} after to {to}");
        Self {
            from,
            to,
            slice,
            structure,
        }
    }

    pub fn from(&self) -> usize {
        self.from
    }

    pub fn to(&self) -> usize {
        self.to
    }

    pub fn slice(&self) -> &Slice {
        &self.slice
    }

    pub fn structure(&self) -> bool {
        self.structure
    }

    pub fn apply(&self, doc: &Node) -> StepResult {
        check_range(doc, self.from, self.to)?;
        if self.structure && content_between(doc, self.from, self.to) {
            return Err(StepFailure::new("Structure replace would overwrite content"));
        }
        apply_replace(doc, self.from, self.to, &self.slice)
    }

    pub fn get_map(&self) -> StepMap {
        StepMap::new(vec![MapRange::new(
            self.from,
            self.to - self.from,
            self.slice.size(),
        )])
    }

    pub fn invert(&self, doc: &Node) -> ReplaceStep {
        ReplaceStep::new(
            self.from,
            self.from + self.slice.size(),
            doc.slice(self.from, self.to, false),
            false,
        )
    }

    pub fn map<M: Mappable + ?Sized>(&self, mapping: &M) -> Option<ReplaceStep> {
        let from = mapping.map_result(self.from, Assoc::After);
        let to = mapping.map_result(self.to, Assoc::Before);
        if from.deleted_across() && to.deleted_across() {
            return None;
        }
        Some(ReplaceStep::new(
            from.pos,
            from.pos.max(to.pos),
            self.slice.clone(),
            self.structure,
        ))
    }

    pub fn merge(&self, other: &ReplaceStep) -> Option<ReplaceStep> {
        if other.structure || self.structure {
            return None;
        }
        let empty = self.slice.size() + other.slice.size() == 0;
        if self.from + self.slice.size() == other.from
            && self.slice.open_end() == 0
            && other.slice.open_start() == 0
        {
            let slice = if empty {
                Slice::empty()
            } else {
                Slice::new(
                    self.slice.content().append(other.slice.content()),
                    self.slice.open_start(),
                    other.slice.open_end(),
                )
            };
            Some(ReplaceStep::new(
                self.from,
                self.to + (other.to - other.from),
                slice,
                false,
            ))
        } else if other.to == self.from
            && self.slice.open_start() == 0
            && other.slice.open_end() == 0
        {
            let slice = if empty {
                Slice::empty()
            } else {
                Slice::new(
                    other.slice.content().append(self.slice.content()),
                    other.slice.open_start(),
                    self.slice.open_end(),
                )
            };
            Some(ReplaceStep::new(other.from, self.to, slice, false))
        } else {
            None
        }
    }
}

/// Replace `from..to` with a slice while keeping the content of the gap
/// `gap_from..gap_to`, which is moved into the slice at offset `insert`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceAroundStep {
    from: usize,
    to: usize,
    gap_from: usize,
    gap_to: usize,
    slice: Slice,
    insert: usize,
    structure: bool,
}

impl ReplaceAroundStep {
    pub fn new(
        from: usize,
        to: usize,
        gap_from: usize,
        gap_to: usize,
        slice: Slice,
        insert: usize,
        structure: bool,
    ) -> Self {
        assert!(
            from <= gap_from && gap_from <= gap_to && gap_to <= to,
            "ReplaceAroundStep gap {gap_from}..{gap_to} not inside {from}..{to}"
        );
        Self {
            from,
            to,
            gap_from,
            gap_to,
            slice,
            insert,
            structure,
        }
    }

    pub fn from(&self) -> usize {
        self.from
    }

    pub fn to(&self) -> usize {
        self.to
    }

    pub fn gap_from(&self) -> usize {
        self.gap_from
    }

    pub fn gap_to(&self) -> usize {
        self.gap_to
    }

    pub fn slice(&self) -> &Slice {
        &self.slice
    }

    pub fn insert(&self) -> usize {
        self.insert
    }

    pub fn structure(&self) -> bool {
        self.structure
    }

    pub fn apply(&self, doc: &Node) -> StepResult {
        check_range(doc, self.from, self.to)?;
        if self.structure
            && (content_between(doc, self.from, self.gap_from)
                || content_between(doc, self.gap_to, self.to))
        {
            return Err(StepFailure::new("Structure gap-replace would overwrite content"));
        }
        let gap = doc.slice(self.gap_from, self.gap_to, false);
        if gap.open_start() > 0 || gap.open_end() > 0 {
            return Err(StepFailure::new("Gap is not a flat range"));
        }
        let Some(inserted) = self.slice.insert_at(self.insert, gap.content()) else {
            return Err(StepFailure::new("Content does not fit in gap"));
        };
        apply_replace(doc, self.from, self.to, &inserted)
    }

    pub fn get_map(&self) -> StepMap {
        StepMap::new(vec![
            MapRange::new(self.from, self.gap_from - self.from, self.insert),
            MapRange::new(
                self.gap_to,
                self.to - self.gap_to,
                self.slice.size() - self.insert,
            ),
        ])
    }

    pub fn invert(&self, doc: &Node) -> ReplaceAroundStep {
        let gap = self.gap_to - self.gap_from;
        let removed = match doc
            .slice(self.from, self.to, false)
            .remove_between(self.gap_from - self.from, self.gap_to - self.from)
        {
            Ok(slice) => slice,
            Err(e) => panic!("Inverting a replace-around step on a document it was not applied to: {e}"),
        };
        ReplaceAroundStep::new(
            self.from,
            self.from + self.slice.size() + gap,
            self.from + self.insert,
            self.from + self.insert + gap,
            removed,
            self.gap_from - self.from,
            self.structure,
        )
    }

    pub fn map<M: Mappable + ?Sized>(&self, mapping: &M) -> Option<ReplaceAroundStep> {
        let from = mapping.map_result(self.from, Assoc::After);
        let to = mapping.map_result(self.to, Assoc::Before);
        let gap_from = if self.from == self.gap_from {
            from.pos
        } else {
            mapping.map(self.gap_from, Assoc::Before)
        };
        let gap_to = if self.to == self.gap_to {
            to.pos
        } else {
            mapping.map(self.gap_to, Assoc::After)
        };
        if (from.deleted_across() && to.deleted_across())
            || gap_from < from.pos
            || gap_to > to.pos
            || gap_from > gap_to
        {
            return None;
        }
        Some(ReplaceAroundStep::new(
            from.pos,
            to.pos,
            gap_from,
            gap_to,
            self.slice.clone(),
            self.insert,
            self.structure,
        ))
    }
}

/// Whether `from..to` holds anything other than closing tokens followed by
/// opening tokens. Errs towards reporting content.
pub(crate) fn content_between(doc: &Node, from: usize, to: usize) -> bool {
    let rfrom = doc.resolve(from);
    let mut dist = to - from;
    let mut depth = rfrom.depth();
    while dist > 0 && depth > 0 && rfrom.index_after(depth) == rfrom.node(depth).child_count() {
        depth -= 1;
        dist -= 1;
    }
    if dist > 0 {
        let mut next = rfrom.node(depth).maybe_child(rfrom.index_after(depth)).cloned();
        while dist > 0 {
            match next {
                Some(node) if !node.is_leaf() => {
                    next = node.first_child().cloned();
                    dist -= 1;
                }
                _ => return true,
            }
        }
    }
    false
}
