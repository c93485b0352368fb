//! One direction of the undo history.
//!
//! A branch is a flat list of items. Items with a step hold the inverse of
//! a change that can be undone; items without one only carry the position
//! map of a change that happened on top of them (a remote edit, say), so
//! older steps can be mapped past it. An item carrying a selection
//! bookmark starts a new event, the unit that a single undo reverts.

use std::sync::Arc;

use folio_config::HistoryConfig;
use folio_state::{EditorState, SelectionBookmark, Transaction};
use folio_transform::{Mapping, Step, StepMap, Transform};

/// Map-only items beyond this count trigger a compression of the branch.
pub const MAX_EMPTY_ITEMS: usize = 500;

/// How many events trimmed off by the depth limit are allowed to linger
/// before their items are actually dropped.
pub const DEPTH_OVERFLOW: usize = 20;

#[derive(Debug, Clone)]
pub(crate) struct Item {
    map: StepMap,
    step: Option<Step>,
    selection: Option<SelectionBookmark>,
    /// Distance back to the item whose map this one's map mirrors.
    mirror_offset: Option<usize>,
}

impl Item {
    fn map_only(map: StepMap) -> Self {
        Self {
            map,
            step: None,
            selection: None,
            mirror_offset: None,
        }
    }

    fn merge(&self, other: &Item) -> Option<Item> {
        let (Some(step), Some(other_step)) = (&self.step, &other.step) else {
            return None;
        };
        if other.selection.is_some() {
            return None;
        }
        let merged = other_step.merge(step)?;
        Some(Item {
            map: merged.get_map().invert(),
            step: Some(merged),
            selection: self.selection,
            mirror_offset: None,
        })
    }
}

/// The result of popping an event off a branch.
pub(crate) struct PoppedEvent {
    pub remaining: Branch,
    pub transaction: Transaction,
    pub selection: SelectionBookmark,
}

#[derive(Debug, Clone, Default)]
pub struct Branch {
    items: Arc<[Item]>,
    event_count: usize,
    /// Events past the depth limit whose bookmarks were removed but whose
    /// items are still at the start of the branch.
    retired: usize,
}

impl Branch {
    /// Number of events that can be popped.
    pub fn event_count(&self) -> usize {
        self.event_count
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn empty_item_count(&self) -> usize {
        self.items.iter().filter(|item| item.step.is_none()).count()
    }

    /// Undo the last event against `state`. With `preserve_items`, the
    /// event's items are replaced by map-only items instead of being
    /// removed, so changes that were rebased over them still line up.
    pub(crate) fn pop_event(&self, state: &EditorState, preserve_items: bool) -> Option<PoppedEvent> {
        if self.event_count == 0 {
            return None;
        }
        let end = self.items.iter().rposition(|item| item.selection.is_some())?;

        let mut remap: Option<Mapping> = None;
        let mut map_from = 0;
        if preserve_items {
            let mapping = self.remapping(end, self.items.len());
            map_from = mapping.len();
            remap = Some(mapping);
        }
        let mut tr = state.tr();
        let mut add_before: Vec<Item> = Vec::new();
        let mut add_after: Vec<Item> = Vec::new();

        for i in (end..self.items.len()).rev() {
            let item = &self.items[i];
            let Some(step) = &item.step else {
                if remap.is_none() {
                    let mapping = self.remapping(end, i + 1);
                    map_from = mapping.len();
                    remap = Some(mapping);
                }
                map_from -= 1;
                add_before.push(item.clone());
                continue;
            };

            match remap.as_mut() {
                Some(remap) => {
                    add_before.push(Item::map_only(item.map.clone()));
                    let mut applied = None;
                    if let Some(mapped) = step.map(&remap.slice_from(map_from))
                        && tr.maybe_step(mapped).is_ok()
                        && let Some(map) = tr.mapping().maps().last().cloned()
                    {
                        let mirror_offset = add_after.len() + add_before.len();
                        add_after.push(Item {
                            map: map.clone(),
                            step: None,
                            selection: None,
                            mirror_offset: Some(mirror_offset),
                        });
                        applied = Some(map);
                    }
                    map_from -= 1;
                    if let Some(map) = applied {
                        remap.append_map(map, Some(map_from));
                    }
                }
                None => {
                    let _ = tr.maybe_step(step.clone());
                }
            }

            if let Some(selection) = item.selection {
                let selection = match &remap {
                    Some(remap) => selection.map(&remap.slice_from(map_from)),
                    None => selection,
                };
                let mut items = self.items[..end].to_vec();
                items.extend(add_before.into_iter().rev());
                items.extend(add_after);
                return Some(PoppedEvent {
                    remaining: Branch {
                        items: items.into(),
                        event_count: self.event_count - 1,
                        retired: self.retired,
                    },
                    transaction: tr,
                    selection,
                });
            }
        }
        None
    }

    /// Record the inverses of `transform`'s steps. A `selection` starts a
    /// new event.
    pub(crate) fn add_transform(
        &self,
        transform: &Transform,
        selection: Option<SelectionBookmark>,
        config: &HistoryConfig,
        preserve_items: bool,
    ) -> Branch {
        let mut new_items: Vec<Item> = Vec::new();
        let mut event_count = self.event_count;
        let mut old_len = self.items.len();
        let mut last_item = if preserve_items { None } else { self.items.last().cloned() };
        let mut selection = selection;

        for (i, step) in transform.steps().iter().enumerate() {
            let mut item = Item {
                map: transform.mapping().maps()[i].clone(),
                step: Some(step.invert(&transform.docs()[i])),
                selection,
                mirror_offset: None,
            };
            if let Some(merged) = last_item.as_ref().and_then(|last| last.merge(&item)) {
                item = merged;
                if i > 0 {
                    new_items.pop();
                } else {
                    old_len -= 1;
                }
            }
            if selection.take().is_some() {
                event_count += 1;
            }
            if !preserve_items {
                last_item = Some(item.clone());
            }
            new_items.push(item);
        }

        let mut items = self.items[..old_len].to_vec();
        items.extend(new_items);
        let mut retired = self.retired;
        if event_count > config.depth {
            let overflow = event_count - config.depth;
            items
                .iter_mut()
                .filter(|item| item.selection.is_some())
                .take(overflow)
                .for_each(|item| item.selection = None);
            event_count = config.depth;
            retired += overflow;
            if retired > DEPTH_OVERFLOW {
                let cut = items
                    .iter()
                    .position(|item| item.selection.is_some())
                    .unwrap_or(items.len());
                log::debug!("dropping {retired} events ({cut} items) past the history depth");
                items.drain(..cut);
                retired = 0;
            }
        }
        Branch {
            items: items.into(),
            event_count,
            retired,
        }
    }

    /// A mapping over the maps of `items[from..to]`, with mirrors restored.
    fn remapping(&self, from: usize, to: usize) -> Mapping {
        let mut maps = Mapping::new();
        for (i, item) in self.items.iter().enumerate().take(to).skip(from) {
            let mirror = item
                .mirror_offset
                .filter(|&offset| i >= from + offset)
                .map(|offset| maps.len() - offset);
            maps.append_map(item.map.clone(), mirror);
        }
        maps
    }

    /// Record changes that aren't undoable so older items can be mapped
    /// over them.
    pub(crate) fn add_maps(&self, maps: &[StepMap]) -> Branch {
        if self.event_count == 0 {
            return self.clone();
        }
        let mut items = self.items.to_vec();
        items.extend(maps.iter().cloned().map(Item::map_only));
        Branch {
            items: items.into(),
            event_count: self.event_count,
            retired: self.retired,
        }
    }

    /// Rewrite the last `rebased_count` items after they were rebased over
    /// other changes by `transform`. Its mapping must mirror each inverted
    /// step with the step that reapplies it.
    pub(crate) fn rebased(&self, transform: &Transform, rebased_count: usize) -> Branch {
        if self.event_count == 0 {
            return self.clone();
        }
        let start = self.items.len().saturating_sub(rebased_count);
        let mapping = transform.mapping();
        let mut new_until = transform.steps().len();
        let mut event_count = self.event_count
            - self.items[start..]
                .iter()
                .filter(|item| item.selection.is_some())
                .count();

        let mut rebased_items = Vec::new();
        let mut i_rebased = rebased_count;
        for item in &self.items[start..] {
            i_rebased -= 1;
            let Some(pos) = mapping.get_mirror(i_rebased) else {
                log::warn!("history item {i_rebased} has no rebased counterpart, dropping it");
                continue;
            };
            new_until = new_until.min(pos);
            let map = mapping.maps()[pos].clone();
            if item.step.is_some() {
                let step = transform.steps()[pos].invert(&transform.docs()[pos]);
                let selection = item.selection.map(|selection| {
                    if i_rebased < pos {
                        selection.map(&mapping.slice(i_rebased + 1, pos))
                    } else {
                        selection
                    }
                });
                if selection.is_some() {
                    event_count += 1;
                }
                rebased_items.push(Item {
                    map,
                    step: Some(step),
                    selection,
                    mirror_offset: None,
                });
            } else {
                rebased_items.push(Item::map_only(map));
            }
        }

        let rebased_len = rebased_items.len();
        let mut items = self.items[..start].to_vec();
        items.extend((rebased_count..new_until).map(|i| Item::map_only(mapping.maps()[i].clone())));
        items.extend(rebased_items);
        let branch = Branch {
            items: items.into(),
            event_count,
            retired: self.retired,
        };
        if branch.empty_item_count() > MAX_EMPTY_ITEMS {
            branch.compress(self.items.len() - rebased_len)
        } else {
            branch
        }
    }

    /// Fold the map-only items below `upto` into the steps they affect,
    /// leaving only step items in that part of the branch.
    pub fn compress(&self, upto: usize) -> Branch {
        let upto = upto.min(self.items.len());
        let mut remap = self.remapping(0, upto);
        let mut map_from = remap.len();
        let mut items: Vec<Item> = Vec::new();
        let mut events = 0;
        for (i, item) in self.items.iter().enumerate().rev() {
            if i >= upto {
                if item.selection.is_some() {
                    events += 1;
                }
                items.push(item.clone());
                continue;
            }
            map_from -= 1;
            let Some(step) = &item.step else {
                continue;
            };
            let Some(mapped) = step.map(&remap.slice_from(map_from + 1)) else {
                continue;
            };
            let map = mapped.get_map();
            remap.append_map(map.clone(), Some(map_from));
            let selection = item.selection.map(|selection| selection.map(&remap.slice_from(map_from)));
            if selection.is_some() {
                events += 1;
            }
            let new_item = Item {
                map: map.invert(),
                step: Some(mapped),
                selection,
                mirror_offset: None,
            };
            match items.last().and_then(|last| last.merge(&new_item)) {
                Some(merged) => {
                    let last = items.len() - 1;
                    items[last] = merged;
                }
                None => items.push(new_item),
            }
        }
        items.reverse();
        log::debug!(
            "compressed history branch from {} to {} items",
            self.items.len(),
            items.len()
        );
        Branch {
            items: items.into(),
            event_count: events,
            retired: self.retired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_model::builders::*;
    use folio_state::{EditorStateConfig, TextSelection};
    use pretty_assertions::assert_eq;

    fn state(doc: folio_model::Node) -> EditorState {
        EditorState::create(EditorStateConfig::new(doc))
    }

    fn bookmark(state: &EditorState) -> Option<SelectionBookmark> {
        Some(state.selection().bookmark())
    }

    fn insert(state: &EditorState, pos: usize, text: &str) -> (EditorState, Transaction) {
        let mut tr = state.tr();
        tr.insert_text_at(text, pos, pos).unwrap();
        let next = state.apply(tr.clone()).unwrap();
        (next, tr)
    }

    fn undo(branch: &Branch, state: &EditorState) -> (Branch, EditorState) {
        let popped = branch.pop_event(state, false).unwrap();
        let next = state.apply(popped.transaction).unwrap();
        (popped.remaining, next)
    }

    #[test]
    fn test_pop_event_reverts_last_event_only() {
        let config = HistoryConfig::default();
        let s0 = state(document![p!["ab"]]);
        let (s1, tr1) = insert(&s0, 1, "x");
        let (s2, tr2) = insert(&s1, 4, "y");
        let branch = Branch::default()
            .add_transform(&tr1, bookmark(&s0), &config, false)
            .add_transform(&tr2, bookmark(&s1), &config, false);
        assert_eq!(branch.event_count(), 2);

        let (branch, s3) = undo(&branch, &s2);
        assert_eq!(s3.doc(), &document![p!["xab"]]);
        assert_eq!(branch.event_count(), 1);
        let (branch, s4) = undo(&branch, &s3);
        assert_eq!(s4.doc(), &document![p!["ab"]]);
        assert!(branch.pop_event(&s4, false).is_none());
    }

    #[test]
    fn test_adjacent_steps_without_selection_merge() {
        let config = HistoryConfig::default();
        let s0 = state(document![p![]]);
        let (s1, tr1) = insert(&s0, 1, "a");
        let (_, tr2) = insert(&s1, 2, "b");
        let branch = Branch::default()
            .add_transform(&tr1, bookmark(&s0), &config, false)
            .add_transform(&tr2, None, &config, false);
        assert_eq!(branch.len(), 1);
        assert_eq!(branch.event_count(), 1);
    }

    #[test]
    fn test_depth_limit_makes_oldest_event_unreachable() {
        let config = HistoryConfig {
            depth: 2,
            ..HistoryConfig::default()
        };
        let s0 = state(document![p![]]);
        let (s1, tr1) = insert(&s0, 1, "a");
        let (s2, tr2) = insert(&s1, 2, "b");
        let (s3, tr3) = insert(&s2, 3, "c");
        let branch = Branch::default()
            .add_transform(&tr1, bookmark(&s0), &config, false)
            .add_transform(&tr2, bookmark(&s1), &config, false)
            .add_transform(&tr3, bookmark(&s2), &config, false);
        assert_eq!(branch.event_count(), 2);

        let (branch, s4) = undo(&branch, &s3);
        let (branch, s5) = undo(&branch, &s4);
        assert_eq!(s5.doc(), &document![p!["a"]]);
        assert_eq!(branch.event_count(), 0);
        assert!(branch.pop_event(&s5, false).is_none());
    }

    #[test]
    fn test_event_count_stays_bounded() {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = HistoryConfig {
            depth: 3,
            ..HistoryConfig::default()
        };
        let mut current = state(document![p![]]);
        let mut branch = Branch::default();
        for i in 0..60 {
            let (next, tr) = insert(&current, 1 + i, "z");
            branch = branch.add_transform(&tr, bookmark(&current), &config, false);
            current = next;
            assert!(branch.event_count() <= config.depth);
        }
        // retired events are dropped in batches
        assert!(branch.len() <= config.depth + DEPTH_OVERFLOW + 1);
    }

    #[test]
    fn test_compress_keeps_undo_result() {
        let config = HistoryConfig::default();
        let s0 = state(document![p![]]);
        let (s1, tr1) = insert(&s0, 1, "hello");
        let (s2, remote) = insert(&s1, 1, "X");
        let branch = Branch::default()
            .add_transform(&tr1, bookmark(&s0), &config, false)
            .add_maps(remote.mapping().maps());
        assert_eq!(branch.len(), 2);
        assert_eq!(branch.empty_item_count(), 1);

        let compressed = branch.compress(branch.len());
        assert_eq!(compressed.len(), 1);
        assert_eq!(compressed.empty_item_count(), 0);
        assert_eq!(compressed.event_count(), 1);

        let (_, plain) = undo(&branch, &s2);
        let (_, folded) = undo(&compressed, &s2);
        assert_eq!(plain.doc(), &document![p!["X"]]);
        assert_eq!(folded.doc(), plain.doc());
    }

    #[test]
    fn test_preserved_items_stay_as_maps() {
        let config = HistoryConfig::default();
        let s0 = state(document![p!["ab"]]);
        let (s1, tr1) = insert(&s0, 3, "c");
        let branch = Branch::default().add_transform(&tr1, bookmark(&s0), &config, true);
        let popped = branch.pop_event(&s1, true).unwrap();
        assert_eq!(popped.remaining.event_count(), 0);
        // the undone step and its reversal both stay as maps
        assert_eq!(popped.remaining.len(), 2);
        assert_eq!(popped.remaining.empty_item_count(), 2);
        let s2 = s1.apply(popped.transaction).unwrap();
        assert_eq!(s2.doc(), &document![p!["ab"]]);
        let expected: folio_state::Selection = TextSelection::create(s2.doc(), 1, 1).into();
        assert_eq!(popped.selection.resolve(s2.doc()), expected);
    }
}
