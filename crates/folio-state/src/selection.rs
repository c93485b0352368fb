//! Selections and their document-independent bookmarks.
//!
//! A [`Selection`] is always resolved against a specific document. Edits
//! never mutate one in place: mapping through a change produces a new
//! selection, falling back to the nearest valid spot when the old one no
//! longer makes sense.

use folio_model::{Fragment, Node, ResolvedPos, Slice, Value};
use folio_transform::{Assoc, Mappable, Step};
use serde::{Deserialize, Serialize};

use crate::error::{SelectionJsonError, TransactionError};
use crate::transaction::Transaction;

/// Direction to search in when looking for a valid selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    Backward,
    Forward,
}

impl Bias {
    pub fn reverse(self) -> Bias {
        match self {
            Bias::Backward => Bias::Forward,
            Bias::Forward => Bias::Backward,
        }
    }
}

/// A cursor or range inside inline content.
#[derive(Debug, Clone)]
pub struct TextSelection {
    anchor: ResolvedPos,
    head: ResolvedPos,
}

impl TextSelection {
    pub fn new(anchor: ResolvedPos, head: ResolvedPos) -> Self {
        Self { anchor, head }
    }

    pub fn cursor(pos: ResolvedPos) -> Self {
        Self::new(pos.clone(), pos)
    }

    pub fn create(doc: &Node, anchor: usize, head: usize) -> Self {
        let anchor = doc.resolve(anchor);
        let head = if head == anchor.pos() {
            anchor.clone()
        } else {
            doc.resolve(head)
        };
        Self::new(anchor, head)
    }

    /// A text selection between two positions, moving endpoints that are
    /// not in inline content to the nearest place that is. Falls back to
    /// another kind of selection when there is no inline content at all.
    pub fn between(anchor: &ResolvedPos, head: &ResolvedPos, bias: Option<Bias>) -> Selection {
        let d_pos = anchor.pos() as isize - head.pos() as isize;
        let bias = match bias {
            Some(bias) if d_pos == 0 => bias,
            _ if d_pos >= 0 => Bias::Forward,
            _ => Bias::Backward,
        };
        let mut head = head.clone();
        if !head.parent().inline_content() {
            let found = Selection::find_from(&head, bias, true)
                .or_else(|| Selection::find_from(&head, bias.reverse(), true));
            match found {
                Some(found) => head = found.head_pos().clone(),
                None => return Selection::near(&head, bias),
            }
        }
        let mut anchor = anchor.clone();
        if !anchor.parent().inline_content() {
            if d_pos == 0 {
                anchor = head.clone();
            } else {
                let found = Selection::find_from(&anchor, bias.reverse(), true)
                    .or_else(|| Selection::find_from(&anchor, bias, true));
                anchor = match found {
                    Some(found) => found.anchor_pos().clone(),
                    None => head.clone(),
                };
                if (anchor.pos() < head.pos()) != (d_pos < 0) {
                    anchor = head.clone();
                }
            }
        }
        TextSelection::new(anchor, head).into()
    }

    /// The cursor position when this selection is empty.
    pub fn cursor_pos(&self) -> Option<&ResolvedPos> {
        (self.anchor.pos() == self.head.pos()).then_some(&self.head)
    }
}

/// A single selected node.
#[derive(Debug, Clone)]
pub struct NodeSelection {
    from: ResolvedPos,
    to: ResolvedPos,
    node: Node,
}

impl NodeSelection {
    /// Select the node directly after `pos`. Panics when there is none.
    pub fn new(pos: ResolvedPos) -> Self {
        match Self::try_new(pos) {
            Some(selection) => selection,
            None => panic!("NodeSelection needs a node after its position"),
        }
    }

    pub fn try_new(pos: ResolvedPos) -> Option<Self> {
        let node = pos.node_after()?;
        let to = pos.doc().resolve(pos.pos() + node.node_size());
        Some(Self { from: pos, to, node })
    }

    pub fn create(doc: &Node, from: usize) -> Self {
        Self::new(doc.resolve(from))
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn is_selectable(node: &Node) -> bool {
        !node.is_text() && node.ty().spec().selectable
    }
}

/// The whole document.
#[derive(Debug, Clone)]
pub struct AllSelection {
    from: ResolvedPos,
    to: ResolvedPos,
}

impl AllSelection {
    pub fn new(doc: &Node) -> Self {
        Self {
            from: doc.resolve(0),
            to: doc.resolve(doc.content().size()),
        }
    }
}

/// A cursor between two blocks where no text cursor can be placed.
#[derive(Debug, Clone)]
pub struct GapSelection {
    pos: ResolvedPos,
}

impl GapSelection {
    pub fn new(pos: ResolvedPos) -> Self {
        Self { pos }
    }

    /// Whether a gap cursor makes sense at `pos`: outside any textblock,
    /// with closed nodes on both sides, in a parent whose default content
    /// is a textblock.
    pub fn valid(pos: &ResolvedPos) -> bool {
        let parent = pos.parent();
        if parent.is_textblock() || !closed_before(pos) || !closed_after(pos) {
            return false;
        }
        parent
            .content_match_at(pos.index(pos.depth()))
            .default_type()
            .is_some_and(|ty| ty.is_textblock())
    }
}

fn closed_before(pos: &ResolvedPos) -> bool {
    for d in (0..=pos.depth()).rev() {
        let index = pos.index(d);
        let parent = pos.node(d);
        if index == 0 {
            if parent.ty().spec().isolating {
                return true;
            }
            continue;
        }
        let mut before = parent.child(index - 1).clone();
        loop {
            if (before.child_count() == 0 && !before.inline_content())
                || before.is_atom()
                || before.ty().spec().isolating
            {
                return true;
            }
            if before.inline_content() {
                return false;
            }
            let Some(last) = before.last_child().cloned() else {
                return true;
            };
            before = last;
        }
    }
    true
}

fn closed_after(pos: &ResolvedPos) -> bool {
    for d in (0..=pos.depth()).rev() {
        let index = pos.index_after(d);
        let parent = pos.node(d);
        if index == parent.child_count() {
            if parent.ty().spec().isolating {
                return true;
            }
            continue;
        }
        let mut after = parent.child(index).clone();
        loop {
            if (after.child_count() == 0 && !after.inline_content())
                || after.is_atom()
                || after.ty().spec().isolating
            {
                return true;
            }
            if after.inline_content() {
                return false;
            }
            let Some(first) = after.first_child().cloned() else {
                return true;
            };
            after = first;
        }
    }
    true
}

/// The current selection of an editor state.
#[derive(Debug, Clone)]
pub enum Selection {
    Text(TextSelection),
    Node(NodeSelection),
    All(AllSelection),
    Gap(GapSelection),
}

impl From<TextSelection> for Selection {
    fn from(selection: TextSelection) -> Self {
        Selection::Text(selection)
    }
}

impl From<NodeSelection> for Selection {
    fn from(selection: NodeSelection) -> Self {
        Selection::Node(selection)
    }
}

impl From<AllSelection> for Selection {
    fn from(selection: AllSelection) -> Self {
        Selection::All(selection)
    }
}

impl From<GapSelection> for Selection {
    fn from(selection: GapSelection) -> Self {
        Selection::Gap(selection)
    }
}

impl PartialEq for Selection {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Selection::Text(a), Selection::Text(b)) => {
                a.anchor.pos() == b.anchor.pos() && a.head.pos() == b.head.pos()
            }
            (Selection::Node(a), Selection::Node(b)) => a.from.pos() == b.from.pos(),
            (Selection::All(_), Selection::All(_)) => true,
            (Selection::Gap(a), Selection::Gap(b)) => a.pos.pos() == b.pos.pos(),
            _ => false,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum SelectionJson {
    Text { anchor: usize, head: usize },
    Node { anchor: usize },
    All,
    Gap { pos: usize },
}

impl Selection {
    /// The side of the selection that doesn't move when it is extended.
    pub fn anchor_pos(&self) -> &ResolvedPos {
        match self {
            Selection::Text(s) => &s.anchor,
            Selection::Node(s) => &s.from,
            Selection::All(s) => &s.from,
            Selection::Gap(s) => &s.pos,
        }
    }

    /// The side of the selection that moves when it is extended.
    pub fn head_pos(&self) -> &ResolvedPos {
        match self {
            Selection::Text(s) => &s.head,
            Selection::Node(s) => &s.to,
            Selection::All(s) => &s.to,
            Selection::Gap(s) => &s.pos,
        }
    }

    pub fn from_pos(&self) -> &ResolvedPos {
        let (anchor, head) = (self.anchor_pos(), self.head_pos());
        if head.pos() < anchor.pos() { head } else { anchor }
    }

    pub fn to_pos(&self) -> &ResolvedPos {
        let (anchor, head) = (self.anchor_pos(), self.head_pos());
        if head.pos() > anchor.pos() { head } else { anchor }
    }

    pub fn anchor(&self) -> usize {
        self.anchor_pos().pos()
    }

    pub fn head(&self) -> usize {
        self.head_pos().pos()
    }

    pub fn from(&self) -> usize {
        self.from_pos().pos()
    }

    pub fn to(&self) -> usize {
        self.to_pos().pos()
    }

    pub fn empty(&self) -> bool {
        self.from() == self.to()
    }

    /// The selected content.
    pub fn content(&self) -> Slice {
        match self {
            Selection::Node(s) => Slice::new(Fragment::from(s.node.clone()), 0, 0),
            Selection::Gap(_) => Slice::empty(),
            _ => self.from_pos().doc().slice(self.from(), self.to(), true),
        }
    }

    /// Map this selection into `doc` through `mapping`, falling back to
    /// a nearby valid selection when it can't be kept as is.
    pub fn map<M: Mappable + ?Sized>(&self, doc: &Node, mapping: &M) -> Selection {
        match self {
            Selection::Text(s) => {
                let head = resolve_clamped(doc, mapping.map(s.head.pos(), Assoc::After));
                if !head.parent().inline_content() {
                    return Selection::near(&head, Bias::Forward);
                }
                let anchor = resolve_clamped(doc, mapping.map(s.anchor.pos(), Assoc::After));
                let anchor = if anchor.parent().inline_content() { anchor } else { head.clone() };
                TextSelection::new(anchor, head).into()
            }
            Selection::Node(s) => {
                let result = mapping.map_result(s.from.pos(), Assoc::After);
                let pos = resolve_clamped(doc, result.pos);
                if result.deleted() {
                    return Selection::near(&pos, Bias::Forward);
                }
                match NodeSelection::try_new(pos.clone()) {
                    Some(selection) => selection.into(),
                    None => Selection::near(&pos, Bias::Forward),
                }
            }
            Selection::All(_) => AllSelection::new(doc).into(),
            Selection::Gap(s) => {
                let pos = resolve_clamped(doc, mapping.map(s.pos.pos(), Assoc::After));
                if GapSelection::valid(&pos) {
                    GapSelection::new(pos).into()
                } else {
                    Selection::near(&pos, Bias::Forward)
                }
            }
        }
    }

    /// Replace the selection with `content`, moving the transaction's
    /// selection to the end of the inserted content.
    pub fn replace(&self, tr: &mut Transaction, content: Slice) -> Result<(), TransactionError> {
        let deleting = content == Slice::empty();
        if let Selection::All(_) = self
            && deleting
        {
            let size = tr.doc().content().size();
            tr.delete(0, size)?;
            let start = Selection::at_start(tr.doc());
            if start != tr.selection() {
                tr.set_selection(start)?;
            }
            return Ok(());
        }

        let mut last_node = content.content().last_child().cloned();
        let mut last_parent: Option<Node> = None;
        for _ in 0..content.open_end() {
            last_parent = last_node.clone();
            last_node = last_node.and_then(|node| node.last_child().cloned());
        }
        let map_from = tr.steps().len();
        tr.replace_range(self.from(), self.to(), content)?;
        let ends_inline = match &last_node {
            Some(node) => node.is_inline(),
            None => last_parent.is_some_and(|parent| parent.is_textblock()),
        };
        let bias = if ends_inline { Bias::Backward } else { Bias::Forward };
        selection_to_insertion_end(tr, map_from, bias)?;

        if let Selection::Text(_) = self
            && deleting
            && let Some(marks) = self.from_pos().marks_across(self.to_pos())
        {
            tr.ensure_marks(marks);
        }
        Ok(())
    }

    /// Replace the selection with a single node.
    pub fn replace_with(&self, tr: &mut Transaction, node: Node) -> Result<(), TransactionError> {
        let map_from = tr.steps().len();
        let bias = if node.is_inline() { Bias::Backward } else { Bias::Forward };
        tr.replace_range_with(self.from(), self.to(), node)?;
        selection_to_insertion_end(tr, map_from, bias)
    }

    /// The first valid selection found searching from `pos` in `dir`,
    /// optionally only considering text selections.
    pub fn find_from(pos: &ResolvedPos, dir: Bias, text_only: bool) -> Option<Selection> {
        let doc = pos.doc();
        if pos.parent().inline_content() {
            return Some(TextSelection::cursor(pos.clone()).into());
        }
        let inner = find_selection_in(doc, pos.parent(), pos.pos(), pos.index(pos.depth()), dir, text_only);
        if inner.is_some() {
            return inner;
        }
        for depth in (0..pos.depth()).rev() {
            let found = match dir {
                Bias::Backward => {
                    find_selection_in(doc, pos.node(depth), pos.before(depth + 1), pos.index(depth), dir, text_only)
                }
                Bias::Forward => find_selection_in(
                    doc,
                    pos.node(depth),
                    pos.after(depth + 1),
                    pos.index(depth) + 1,
                    dir,
                    text_only,
                ),
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }

    /// A valid selection near `pos`, preferring the `bias` direction and
    /// selecting the whole document when nothing else fits.
    pub fn near(pos: &ResolvedPos, bias: Bias) -> Selection {
        Selection::find_from(pos, bias, false)
            .or_else(|| Selection::find_from(pos, bias.reverse(), false))
            .unwrap_or_else(|| AllSelection::new(pos.doc()).into())
    }

    pub fn at_start(doc: &Node) -> Selection {
        find_selection_in(doc, doc, 0, 0, Bias::Forward, false).unwrap_or_else(|| AllSelection::new(doc).into())
    }

    pub fn at_end(doc: &Node) -> Selection {
        find_selection_in(doc, doc, doc.content().size(), doc.child_count(), Bias::Backward, false)
            .unwrap_or_else(|| AllSelection::new(doc).into())
    }

    /// A representation of this selection that can be mapped without
    /// access to a document.
    pub fn bookmark(&self) -> SelectionBookmark {
        match self {
            Selection::Text(s) => SelectionBookmark::Text {
                anchor: s.anchor.pos(),
                head: s.head.pos(),
            },
            Selection::Node(s) => SelectionBookmark::Node { anchor: s.from.pos() },
            Selection::All(_) => SelectionBookmark::All,
            Selection::Gap(s) => SelectionBookmark::Gap { pos: s.pos.pos() },
        }
    }

    pub fn to_json(&self) -> Value {
        let json = match self {
            Selection::Text(s) => SelectionJson::Text {
                anchor: s.anchor.pos(),
                head: s.head.pos(),
            },
            Selection::Node(s) => SelectionJson::Node { anchor: s.from.pos() },
            Selection::All(_) => SelectionJson::All,
            Selection::Gap(s) => SelectionJson::Gap { pos: s.pos.pos() },
        };
        serde_json::to_value(json).unwrap_or_else(|e| panic!("selection JSON is always serializable: {e}"))
    }

    pub fn from_json(doc: &Node, value: &Value) -> Result<Selection, SelectionJsonError> {
        let json: SelectionJson = serde_json::from_value(value.clone())?;
        let size = doc.content().size();
        let resolve = |pos: usize| {
            if pos > size {
                Err(SelectionJsonError::OutOfRange { pos, size })
            } else {
                Ok(doc.resolve(pos))
            }
        };
        Ok(match json {
            SelectionJson::Text { anchor, head } => TextSelection::new(resolve(anchor)?, resolve(head)?).into(),
            SelectionJson::Node { anchor } => NodeSelection::try_new(resolve(anchor)?)
                .ok_or(SelectionJsonError::NoSelectableNode(anchor))?
                .into(),
            SelectionJson::All => AllSelection::new(doc).into(),
            SelectionJson::Gap { pos } => GapSelection::new(resolve(pos)?).into(),
        })
    }
}

fn resolve_clamped(doc: &Node, pos: usize) -> ResolvedPos {
    doc.resolve(pos.min(doc.content().size()))
}

fn find_selection_in(
    doc: &Node,
    node: &Node,
    pos: usize,
    index: usize,
    dir: Bias,
    text_only: bool,
) -> Option<Selection> {
    if node.inline_content() {
        return Some(TextSelection::create(doc, pos, pos).into());
    }
    let mut pos = pos;
    match dir {
        Bias::Forward => {
            for i in index..node.child_count() {
                let child = node.child(i);
                if let Some(found) = select_in_child(doc, child, pos, dir, text_only) {
                    return Some(found);
                }
                pos += child.node_size();
            }
        }
        Bias::Backward => {
            for i in (0..index).rev() {
                let child = node.child(i);
                if let Some(found) = select_in_child(doc, child, pos, dir, text_only) {
                    return Some(found);
                }
                pos -= child.node_size();
            }
        }
    }
    None
}

/// `pos` is the child's start when searching forward and its end when
/// searching backward.
fn select_in_child(doc: &Node, child: &Node, pos: usize, dir: Bias, text_only: bool) -> Option<Selection> {
    if !child.is_atom() {
        let (inner_pos, inner_index) = match dir {
            Bias::Forward => (pos + 1, 0),
            Bias::Backward => (pos - 1, child.child_count()),
        };
        find_selection_in(doc, child, inner_pos, inner_index, dir, text_only)
    } else if !text_only && NodeSelection::is_selectable(child) {
        let start = match dir {
            Bias::Forward => pos,
            Bias::Backward => pos - child.node_size(),
        };
        Some(NodeSelection::create(doc, start).into())
    } else {
        None
    }
}

/// Put the transaction's selection at the end of what the last replace
/// step (added after `start_len`) inserted.
fn selection_to_insertion_end(tr: &mut Transaction, start_len: usize, bias: Bias) -> Result<(), TransactionError> {
    let Some(last) = tr.steps().len().checked_sub(1) else {
        return Ok(());
    };
    if last < start_len || !matches!(tr.steps()[last], Step::Replace(_) | Step::ReplaceAround(_)) {
        return Ok(());
    }
    let mut end = None;
    tr.mapping().maps()[last].for_each(|_, _, _, new_to| {
        end.get_or_insert(new_to);
    });
    let Some(end) = end else {
        return Ok(());
    };
    let selection = Selection::near(&tr.doc().resolve(end), bias);
    tr.set_selection(selection)?;
    Ok(())
}

/// A selection reduced to plain positions, mappable without a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionBookmark {
    Text { anchor: usize, head: usize },
    Node { anchor: usize },
    All,
    Gap { pos: usize },
}

impl SelectionBookmark {
    pub fn map<M: Mappable + ?Sized>(&self, mapping: &M) -> SelectionBookmark {
        match *self {
            SelectionBookmark::Text { anchor, head } => SelectionBookmark::Text {
                anchor: mapping.map(anchor, Assoc::After),
                head: mapping.map(head, Assoc::After),
            },
            SelectionBookmark::Node { anchor } => {
                let result = mapping.map_result(anchor, Assoc::After);
                if result.deleted() {
                    SelectionBookmark::Text {
                        anchor: result.pos,
                        head: result.pos,
                    }
                } else {
                    SelectionBookmark::Node { anchor: result.pos }
                }
            }
            SelectionBookmark::All => SelectionBookmark::All,
            SelectionBookmark::Gap { pos } => SelectionBookmark::Gap {
                pos: mapping.map(pos, Assoc::After),
            },
        }
    }

    /// Turn the bookmark back into a selection in `doc`.
    pub fn resolve(&self, doc: &Node) -> Selection {
        match *self {
            SelectionBookmark::Text { anchor, head } => {
                TextSelection::between(&resolve_clamped(doc, anchor), &resolve_clamped(doc, head), None)
            }
            SelectionBookmark::Node { anchor } => {
                let pos = resolve_clamped(doc, anchor);
                match pos.node_after() {
                    Some(node) if NodeSelection::is_selectable(&node) => NodeSelection::new(pos).into(),
                    _ => Selection::near(&pos, Bias::Forward),
                }
            }
            SelectionBookmark::All => AllSelection::new(doc).into(),
            SelectionBookmark::Gap { pos } => {
                let pos = resolve_clamped(doc, pos);
                if GapSelection::valid(&pos) {
                    GapSelection::new(pos).into()
                } else {
                    Selection::near(&pos, Bias::Forward)
                }
            }
        }
    }
}
