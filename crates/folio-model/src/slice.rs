use std::fmt;

use serde_json::{Map, Value, json};

use crate::{Fragment, ModelError, Node, ReplaceError, Schema};

/// A piece of document content that may be open on either side.
///
/// `open_start` and `open_end` count how many nodes on the respective edge
/// are cut open, i.e. should be joined with the surrounding structure rather
/// than inserted as new nodes.
#[derive(Clone, Default, PartialEq)]
pub struct Slice {
    content: Fragment,
    open_start: usize,
    open_end: usize,
}

impl Slice {
    pub fn new(content: Fragment, open_start: usize, open_end: usize) -> Self {
        Self {
            content,
            open_start,
            open_end,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn content(&self) -> &Fragment {
        &self.content
    }

    pub fn open_start(&self) -> usize {
        self.open_start
    }

    pub fn open_end(&self) -> usize {
        self.open_end
    }

    /// Size this slice adds when inserted.
    pub fn size(&self) -> usize {
        self.content.size() - self.open_start - self.open_end
    }

    /// Insert `fragment` at `pos` (relative to the slice) when the parent
    /// there accepts it.
    pub fn insert_at(&self, pos: usize, fragment: &Fragment) -> Option<Slice> {
        let content = insert_into(&self.content, pos + self.open_start, fragment, None)?;
        Some(Slice::new(content, self.open_start, self.open_end))
    }

    /// Remove the flat range `from..to` (relative to the slice).
    pub fn remove_between(&self, from: usize, to: usize) -> Result<Slice, ReplaceError> {
        let content = remove_range(&self.content, from + self.open_start, to + self.open_start)?;
        Ok(Slice::new(content, self.open_start, self.open_end))
    }

    /// A slice over `fragment` opened as far as its edges allow.
    pub fn max_open(fragment: Fragment, open_isolating: bool) -> Slice {
        let mut open_start = 0;
        let mut node = fragment.first_child().cloned();
        while let Some(n) = node {
            if n.is_leaf() || (!open_isolating && n.ty().spec().isolating) {
                break;
            }
            open_start += 1;
            node = n.first_child().cloned();
        }
        let mut open_end = 0;
        let mut node = fragment.last_child().cloned();
        while let Some(n) = node {
            if n.is_leaf() || (!open_isolating && n.ty().spec().isolating) {
                break;
            }
            open_end += 1;
            node = n.last_child().cloned();
        }
        Slice::new(fragment, open_start, open_end)
    }

    /// JSON form, `None` for the empty slice.
    pub fn to_json(&self) -> Option<Value> {
        let content = self.content.to_json()?;
        let mut obj = Map::new();
        obj.insert("content".into(), content);
        if self.open_start > 0 {
            obj.insert("openStart".into(), json!(self.open_start));
        }
        if self.open_end > 0 {
            obj.insert("openEnd".into(), json!(self.open_end));
        }
        Some(Value::Object(obj))
    }

    pub fn from_json(schema: &Schema, value: Option<&Value>) -> Result<Slice, ModelError> {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return Ok(Slice::empty());
        };
        let open = |key: &str| -> Result<usize, ModelError> {
            match value.get(key) {
                None | Some(Value::Null) => Ok(0),
                Some(v) => v
                    .as_u64()
                    .map(|n| n as usize)
                    .ok_or_else(|| ModelError::InvalidJson(format!("invalid {key} for slice"))),
            }
        };
        let open_start = open("openStart")?;
        let open_end = open("openEnd")?;
        let content = Fragment::from_json(schema, value.get("content"))?;
        Ok(Slice::new(content, open_start, open_end))
    }
}

fn remove_range(content: &Fragment, from: usize, to: usize) -> Result<Fragment, ReplaceError> {
    let (index, offset) = content.find_index(from, -1);
    let child = content.maybe_child(index);
    let (index_to, offset_to) = content.find_index(to, -1);
    if offset == from || child.is_some_and(Node::is_text) {
        if offset_to != to && !content.child(index_to).is_text() {
            return Err(ReplaceError::NonFlatRange);
        }
        return Ok(content.cut(0, from).append(&content.cut(to, content.size())));
    }
    let Some(child) = child else {
        return Err(ReplaceError::NonFlatRange);
    };
    if index != index_to {
        return Err(ReplaceError::NonFlatRange);
    }
    let inner = remove_range(child.content(), from - offset - 1, to - offset - 1)?;
    Ok(content.replace_child(index, child.copy(inner)))
}

fn insert_into(content: &Fragment, dist: usize, insert: &Fragment, parent: Option<&Node>) -> Option<Fragment> {
    let (index, offset) = content.find_index(dist, -1);
    let child = content.maybe_child(index);
    if offset == dist || child.is_some_and(Node::is_text) {
        if let Some(parent) = parent
            && !parent.can_replace(index, index, insert, 0, insert.child_count())
        {
            return None;
        }
        return Some(
            content
                .cut(0, dist)
                .append(insert)
                .append(&content.cut(dist, content.size())),
        );
    }
    let child = child?;
    let inner = insert_into(child.content(), dist - offset - 1, insert, Some(child))?;
    Some(content.replace_child(index, child.copy(inner)))
}

impl fmt::Debug for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({},{})", self.content, self.open_start, self.open_end)
    }
}
