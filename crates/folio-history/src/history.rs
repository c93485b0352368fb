use folio_config::HistoryConfig;
use folio_state::{
    ADD_TO_HISTORY, APPENDED_TRANSACTION, COMPOSITION, EditorState, Meta, REBASED, Transaction,
};
use folio_transform::{Assoc, Mappable, Mapping, StepMap, Transform};

use crate::branch::Branch;
use crate::plugin::{close_history_key, history_key};

/// Options fixed when the history plugin is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Settings {
    pub config: HistoryConfig,
    pub preserve_items: bool,
}

/// Metadata attached to undo and redo transactions.
#[derive(Debug, Clone)]
pub(crate) struct HistoryMeta {
    pub redo: bool,
    pub state: HistoryState,
}

/// The value of the history plugin's state field.
#[derive(Debug, Clone)]
pub struct HistoryState {
    done: Branch,
    undone: Branch,
    /// Ranges touched by the last recorded change, as flat from/to pairs.
    prev_ranges: Option<Vec<usize>>,
    prev_time: u64,
    prev_composition: Option<u64>,
    pub(crate) settings: Settings,
}

impl HistoryState {
    pub(crate) fn new(settings: Settings) -> Self {
        Self {
            done: Branch::default(),
            undone: Branch::default(),
            prev_ranges: None,
            prev_time: 0,
            prev_composition: None,
            settings,
        }
    }

    pub fn done(&self) -> &Branch {
        &self.done
    }

    pub fn undone(&self) -> &Branch {
        &self.undone
    }

    /// Fold `tr`, applied to `old_state`, into the history.
    pub(crate) fn apply_transaction(&self, old_state: &EditorState, tr: &Transaction) -> HistoryState {
        if let Some(meta) = tr.get_meta::<HistoryMeta>(history_key()) {
            return meta.state.clone();
        }

        let closed;
        let history = if tr.get_meta::<bool>(close_history_key()) == Some(&true) {
            closed = HistoryState {
                prev_ranges: None,
                prev_time: 0,
                prev_composition: None,
                ..self.clone()
            };
            &closed
        } else {
            self
        };

        if tr.steps().is_empty() {
            return history.clone();
        }

        let config = &history.settings.config;
        let preserve = history.settings.preserve_items;
        let appended = tr.get_meta::<Meta>(APPENDED_TRANSACTION);

        if let Some(origin) = appended.and_then(|meta| meta.get::<HistoryMeta>(history_key())) {
            // appended to an undo or redo: extends the event it produced
            return if origin.redo {
                HistoryState {
                    done: history.done.add_transform(tr, None, config, preserve),
                    prev_ranges: Some(ranges_for(tr.mapping().maps())),
                    ..history.clone()
                }
            } else {
                HistoryState {
                    undone: history.undone.add_transform(tr, None, config, preserve),
                    prev_ranges: None,
                    ..history.clone()
                }
            };
        }

        let add_to_history = tr.get_meta::<bool>(ADD_TO_HISTORY) != Some(&false)
            && !appended.is_some_and(|meta| meta.get::<bool>(ADD_TO_HISTORY) == Some(&false));
        if add_to_history {
            let composition = tr.get_meta::<u64>(COMPOSITION).copied();
            let same_composition = composition.is_some() && composition == history.prev_composition;
            let new_group = history.prev_time == 0
                || (appended.is_none()
                    && !same_composition
                    && (history.prev_time + config.new_group_delay < tr.time()
                        || !is_adjacent_to(tr, history.prev_ranges.as_deref())));
            let prev_ranges = if appended.is_some() {
                map_ranges(history.prev_ranges.as_deref(), tr.mapping())
            } else {
                Some(ranges_for(tr.mapping().maps()))
            };
            let selection = new_group.then(|| old_state.selection().bookmark());
            return HistoryState {
                done: history.done.add_transform(tr, selection, config, preserve),
                undone: Branch::default(),
                prev_ranges,
                prev_time: tr.time(),
                prev_composition: composition.or(history.prev_composition),
                settings: history.settings,
            };
        }

        let prev_ranges = map_ranges(history.prev_ranges.as_deref(), tr.mapping());
        match tr.get_meta::<usize>(REBASED).copied().filter(|&count| count > 0) {
            Some(rebased) => HistoryState {
                done: history.done.rebased(tr, rebased),
                undone: history.undone.rebased(tr, rebased),
                prev_ranges,
                ..history.clone()
            },
            None => HistoryState {
                done: history.done.add_maps(tr.mapping().maps()),
                undone: history.undone.add_maps(tr.mapping().maps()),
                prev_ranges,
                ..history.clone()
            },
        }
    }

    /// Build the transaction that undoes (or redoes) the last event.
    pub(crate) fn transaction(&self, state: &EditorState, redo: bool) -> Option<Transaction> {
        let settings = self.settings;
        let (source, target) = if redo {
            (&self.undone, &self.done)
        } else {
            (&self.done, &self.undone)
        };
        let popped = source.pop_event(state, settings.preserve_items)?;
        let mut tr = popped.transaction;
        let selection = popped.selection.resolve(tr.doc());
        let added = target.add_transform(
            &tr,
            Some(state.selection().bookmark()),
            &settings.config,
            settings.preserve_items,
        );
        let (done, undone) = if redo {
            (added, popped.remaining)
        } else {
            (popped.remaining, added)
        };
        let next = HistoryState {
            done,
            undone,
            prev_ranges: None,
            prev_time: 0,
            prev_composition: None,
            settings,
        };
        if let Err(err) = tr.set_selection(selection) {
            log::warn!("could not restore the selection of a history event: {err}");
            return None;
        }
        tr.set_meta(history_key(), HistoryMeta { redo, state: next });
        Some(tr)
    }
}

/// Whether the first change in `transform` touches one of `prev_ranges`.
fn is_adjacent_to(transform: &Transform, prev_ranges: Option<&[usize]>) -> bool {
    let Some(prev_ranges) = prev_ranges else {
        return false;
    };
    let Some(first) = transform.mapping().maps().first() else {
        return true;
    };
    if !transform.doc_changed() {
        return true;
    }
    let mut adjacent = false;
    first.for_each(|start, end, _, _| {
        for range in prev_ranges.chunks_exact(2) {
            if start <= range[1] && end >= range[0] {
                adjacent = true;
            }
        }
    });
    adjacent
}

/// The ranges changed by the last map that changed anything.
fn ranges_for(maps: &[StepMap]) -> Vec<usize> {
    let mut result = Vec::new();
    for map in maps.iter().rev() {
        map.for_each(|_, _, from, to| {
            result.push(from);
            result.push(to);
        });
        if !result.is_empty() {
            break;
        }
    }
    result
}

fn map_ranges(ranges: Option<&[usize]>, mapping: &Mapping) -> Option<Vec<usize>> {
    let ranges = ranges?;
    let mut result = Vec::new();
    for range in ranges.chunks_exact(2) {
        let from = mapping.map(range[0], Assoc::After);
        let to = mapping.map(range[1], Assoc::Before);
        if from <= to {
            result.push(from);
            result.push(to);
        }
    }
    Some(result)
}
