//! Position mapping.
//!
//! A [`StepMap`] describes how a single step moved positions: a list of
//! replaced regions, each with its size before and after the step. A
//! [`Mapping`] chains step maps and remembers which maps undo which, so a
//! position that was deleted and then restored maps back to exactly where it
//! was.

use std::sync::Arc;

const LOWER16: usize = 0xffff;
const FACTOR16: usize = 1 << 16;

const DEL_BEFORE: u8 = 1;
const DEL_AFTER: u8 = 2;
const DEL_ACROSS: u8 = 4;
const DEL_SIDE: u8 = 8;

fn make_recover(index: usize, offset: usize) -> usize {
    index + offset * FACTOR16
}

fn recover_index(value: usize) -> usize {
    value & LOWER16
}

fn recover_offset(value: usize) -> usize {
    (value - (value & LOWER16)) / FACTOR16
}

/// Which side a position sticks to when content is inserted right at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Before,
    After,
}

impl Assoc {
    fn is_before(self) -> bool {
        self == Assoc::Before
    }
}

/// A mapped position plus what happened to the content around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapResult {
    pub pos: usize,
    del_info: u8,
    /// Token that lets a mirrored map find the exact spot inside a deleted
    /// region again.
    pub recover: Option<usize>,
}

impl MapResult {
    fn new(pos: usize, del_info: u8, recover: Option<usize>) -> Self {
        Self {
            pos,
            del_info,
            recover,
        }
    }

    /// The content on the side the position associates with was deleted.
    pub fn deleted(&self) -> bool {
        self.del_info & DEL_SIDE > 0
    }

    pub fn deleted_before(&self) -> bool {
        self.del_info & (DEL_BEFORE | DEL_ACROSS) > 0
    }

    pub fn deleted_after(&self) -> bool {
        self.del_info & (DEL_AFTER | DEL_ACROSS) > 0
    }

    /// The position was strictly inside a deleted region.
    pub fn deleted_across(&self) -> bool {
        self.del_info & DEL_ACROSS > 0
    }
}

/// Anything positions can be mapped through.
pub trait Mappable {
    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult;

    fn map(&self, pos: usize, assoc: Assoc) -> usize {
        self.map_result(pos, assoc).pos
    }
}

/// One replaced region: `old_size` units at `start` became `new_size` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRange {
    pub start: usize,
    pub old_size: usize,
    pub new_size: usize,
}

impl MapRange {
    pub fn new(start: usize, old_size: usize, new_size: usize) -> Self {
        Self {
            start,
            old_size,
            new_size,
        }
    }
}

/// The position changes made by a single step.
///
/// Ranges are sorted by start and never overlap. Inverting only flips a
/// flag, the ranges themselves are shared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepMap {
    ranges: Arc<[MapRange]>,
    inverted: bool,
}

impl Default for StepMap {
    fn default() -> Self {
        Self::empty()
    }
}

impl StepMap {
    pub fn new(ranges: Vec<MapRange>) -> Self {
        Self {
            ranges: ranges.into(),
            inverted: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// A map that shifts every position by `n`.
    pub fn offset(n: isize) -> Self {
        match n {
            0 => Self::empty(),
            n if n < 0 => Self::new(vec![MapRange::new(0, n.unsigned_abs(), 0)]),
            n => Self::new(vec![MapRange::new(0, 0, n as usize)]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    fn sizes(&self, range: &MapRange) -> (usize, usize) {
        if self.inverted {
            (range.new_size, range.old_size)
        } else {
            (range.old_size, range.new_size)
        }
    }

    /// Position in the mapped document for a recovery token produced by
    /// this map's inverse.
    pub fn recover(&self, value: usize) -> usize {
        let index = recover_index(value);
        let mut diff: isize = 0;
        if !self.inverted {
            for range in &self.ranges[..index] {
                diff += range.new_size as isize - range.old_size as isize;
            }
        }
        (self.ranges[index].start as isize + diff) as usize + recover_offset(value)
    }

    /// Whether the region named by `recover` contains `pos`.
    pub fn touches(&self, pos: usize, recover: usize) -> bool {
        let index = recover_index(recover);
        let mut diff: isize = 0;
        for (i, range) in self.ranges.iter().enumerate() {
            let start = self.start_of(range, diff);
            if start > pos as isize {
                break;
            }
            let (old_size, new_size) = self.sizes(range);
            let end = start + old_size as isize;
            if pos as isize <= end && i == index {
                return true;
            }
            diff += new_size as isize - old_size as isize;
        }
        false
    }

    fn start_of(&self, range: &MapRange, diff: isize) -> isize {
        if self.inverted {
            range.start as isize - diff
        } else {
            range.start as isize
        }
    }

    /// Call `f(old_start, old_end, new_start, new_end)` for every region.
    pub fn for_each(&self, mut f: impl FnMut(usize, usize, usize, usize)) {
        let mut diff: isize = 0;
        for range in self.ranges.iter() {
            let old_start = self.start_of(range, diff) as usize;
            let new_start = if self.inverted {
                range.start
            } else {
                (range.start as isize + diff) as usize
            };
            let (old_size, new_size) = self.sizes(range);
            f(old_start, old_start + old_size, new_start, new_start + new_size);
            diff += new_size as isize - old_size as isize;
        }
    }

    pub fn invert(&self) -> StepMap {
        StepMap {
            ranges: Arc::clone(&self.ranges),
            inverted: !self.inverted,
        }
    }
}

impl Mappable for StepMap {
    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult {
        let mut diff: isize = 0;
        let p = pos as isize;
        for (i, range) in self.ranges.iter().enumerate() {
            let start = self.start_of(range, diff);
            if start > p {
                break;
            }
            let (old_size, new_size) = self.sizes(range);
            let end = start + old_size as isize;
            if p <= end {
                let stick_before = if old_size == 0 {
                    assoc.is_before()
                } else if p == start {
                    true
                } else if p == end {
                    false
                } else {
                    assoc.is_before()
                };
                let result = start + diff + if stick_before { 0 } else { new_size as isize };
                let edge = if assoc.is_before() { start } else { end };
                let recover = (p != edge).then(|| make_recover(i, (p - start) as usize));
                let mut del = if p == start {
                    DEL_AFTER
                } else if p == end {
                    DEL_BEFORE
                } else {
                    DEL_ACROSS
                };
                let side_deleted = if assoc.is_before() { p != start } else { p != end };
                if side_deleted {
                    del |= DEL_SIDE;
                }
                return MapResult::new(result.max(0) as usize, del, recover);
            }
            diff += new_size as isize - old_size as isize;
        }
        MapResult::new((p + diff).max(0) as usize, 0, None)
    }
}

/// A pipeline of step maps, with mirror pairs marking maps that exactly undo
/// an earlier one.
#[derive(Clone, Debug, Default)]
pub struct Mapping {
    maps: Vec<StepMap>,
    mirror: Vec<(usize, usize)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_maps(maps: Vec<StepMap>) -> Self {
        Self {
            maps,
            mirror: Vec::new(),
        }
    }

    pub fn maps(&self) -> &[StepMap] {
        &self.maps
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// A view over `maps[from..to]` sharing this mapping's storage.
    pub fn slice(&self, from: usize, to: usize) -> MappingView<'_> {
        assert!(from <= to && to <= self.maps.len(), "Mapping slice {from}..{to} out of range");
        MappingView {
            mapping: self,
            from,
            to,
        }
    }

    pub fn slice_from(&self, from: usize) -> MappingView<'_> {
        self.slice(from, self.maps.len())
    }

    /// Add a map, optionally registering it as the mirror of map `mirror`.
    pub fn append_map(&mut self, map: StepMap, mirror: Option<usize>) {
        self.maps.push(map);
        if let Some(m) = mirror {
            self.set_mirror(self.maps.len() - 1, m);
        }
    }

    pub fn set_mirror(&mut self, n: usize, m: usize) {
        self.mirror.push((n, m));
    }

    pub fn get_mirror(&self, n: usize) -> Option<usize> {
        self.mirror.iter().find_map(|&(a, b)| {
            if a == n {
                Some(b)
            } else if b == n {
                Some(a)
            } else {
                None
            }
        })
    }

    /// Append all maps of `other`, keeping its mirror pairs.
    pub fn append_mapping(&mut self, other: &Mapping) {
        let start = self.maps.len();
        for (i, map) in other.maps.iter().enumerate() {
            let mirror = other.get_mirror(i).filter(|&m| m < i).map(|m| start + m);
            self.append_map(map.clone(), mirror);
        }
    }

    /// Append the inverse of `other`: its maps inverted, in reverse order.
    pub fn append_mapping_inverted(&mut self, other: &Mapping) {
        let total = self.maps.len() + other.maps.len();
        for i in (0..other.maps.len()).rev() {
            let mirror = other.get_mirror(i).filter(|&m| m > i).map(|m| total - m - 1);
            self.append_map(other.maps[i].invert(), mirror);
        }
    }

    pub fn invert(&self) -> Mapping {
        let mut inverse = Mapping::new();
        inverse.append_mapping_inverted(self);
        inverse
    }

    fn map_range(&self, from: usize, to: usize, mut pos: usize, assoc: Assoc) -> MapResult {
        let mut del_info = 0;
        let mut i = from;
        while i < to {
            let result = self.maps[i].map_result(pos, assoc);
            if let Some(recover) = result.recover
                && let Some(corr) = self.get_mirror(i).filter(|&c| c > i && c < to)
            {
                log::trace!("recovering position {pos} through mirror {i} -> {corr}");
                pos = self.maps[corr].recover(recover);
                i = corr + 1;
                continue;
            }
            del_info |= result.del_info;
            pos = result.pos;
            i += 1;
        }
        MapResult::new(pos, del_info, None)
    }
}

impl Mappable for Mapping {
    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult {
        self.map_range(0, self.maps.len(), pos, assoc)
    }
}

/// A borrowed sub-range of a [`Mapping`].
#[derive(Clone, Copy, Debug)]
pub struct MappingView<'a> {
    mapping: &'a Mapping,
    from: usize,
    to: usize,
}

impl<'a> MappingView<'a> {
    pub fn maps(&self) -> &'a [StepMap] {
        &self.mapping.maps[self.from..self.to]
    }
}

impl Mappable for MappingView<'_> {
    fn map_result(&self, pos: usize, assoc: Assoc) -> MapResult {
        self.mapping.map_range(self.from, self.to, pos, assoc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn replace_map(from: usize, to: usize, size: usize) -> StepMap {
        StepMap::new(vec![MapRange::new(from, to - from, size)])
    }

    #[rstest]
    #[case::before_region(0, Assoc::After, 0)]
    #[case::region_start(2, Assoc::After, 2)]
    #[case::inside_after(3, Assoc::After, 3)]
    #[case::inside_before(3, Assoc::Before, 2)]
    #[case::region_end(4, Assoc::Before, 3)]
    #[case::after_region(6, Assoc::After, 5)]
    fn test_map_through_replacement(#[case] pos: usize, #[case] assoc: Assoc, #[case] expected: usize) {
        // 2..4 replaced by one unit
        let map = replace_map(2, 4, 1);
        assert_eq!(map.map(pos, assoc), expected);
    }

    #[test]
    fn test_insertion_respects_assoc() {
        let map = replace_map(3, 3, 2);
        assert_eq!(map.map(3, Assoc::Before), 3);
        assert_eq!(map.map(3, Assoc::After), 5);
        assert!(!map.map_result(3, Assoc::After).deleted());
    }

    #[test]
    fn test_deletion_flags() {
        let map = replace_map(2, 6, 0);
        let inside = map.map_result(4, Assoc::After);
        assert_eq!(inside.pos, 2);
        assert!(inside.deleted());
        assert!(inside.deleted_across());
        assert!(inside.deleted_before() && inside.deleted_after());
        let at_start = map.map_result(2, Assoc::After);
        assert!(at_start.deleted_after());
        assert!(!at_start.deleted_before());
        assert!(at_start.deleted());
        let at_end = map.map_result(6, Assoc::After);
        assert!(at_end.deleted_before());
        assert!(!at_end.deleted());
    }

    #[test]
    fn test_invert_shares_ranges_and_maps_back() {
        let map = replace_map(2, 6, 1);
        let inverted = map.invert();
        assert!(Arc::ptr_eq(&map.ranges, &inverted.ranges));
        assert_eq!(inverted.map(8, Assoc::After), 11);
        assert_eq!(inverted.invert(), map);
    }

    #[test]
    fn test_for_each_reports_both_coordinates() {
        let map = StepMap::new(vec![MapRange::new(2, 2, 0), MapRange::new(10, 0, 3)]);
        let mut seen = Vec::new();
        map.for_each(|a, b, c, d| seen.push((a, b, c, d)));
        assert_eq!(seen, vec![(2, 4, 2, 2), (10, 10, 8, 11)]);
        let mut inverted = Vec::new();
        map.invert().for_each(|a, b, c, d| inverted.push((a, b, c, d)));
        assert_eq!(inverted, vec![(2, 2, 2, 4), (8, 11, 10, 10)]);
    }

    #[test]
    fn test_offset() {
        assert_eq!(StepMap::offset(3).map(5, Assoc::After), 8);
        assert_eq!(StepMap::offset(-2).map(5, Assoc::After), 3);
        assert!(StepMap::offset(0).is_empty());
    }

    #[test]
    fn test_deleted_position_without_mirror_stays_deleted() {
        // 20 units, an insertion of 2 at 3, then a deletion of 10..15
        let mut mapping = Mapping::new();
        mapping.append_map(replace_map(3, 3, 2), None);
        mapping.append_map(replace_map(10, 15, 0), None);
        let result = mapping.map_result(10, Assoc::After);
        // 10 became 12 after the insertion, inside the deleted region
        assert_eq!(result.pos, 10);
        assert!(result.deleted_across());
        assert_eq!(mapping.map(20, Assoc::After), 17);
    }

    #[test]
    fn test_mirror_restores_deleted_position() {
        let map = replace_map(5, 10, 1);
        let mut mapping = Mapping::new();
        mapping.append_map(map.clone(), None);
        mapping.append_map(map.invert(), Some(0));
        for pos in 0..=20 {
            let result = mapping.map_result(pos, Assoc::After);
            assert_eq!(result.pos, pos, "position {pos}");
        }
        // without the mirror the interior collapses
        let plain = Mapping::from_maps(vec![map.clone(), map.invert()]);
        assert_eq!(plain.map(7, Assoc::After), 10);
    }

    #[test]
    fn test_invert_mapping_keeps_mirrors() {
        let a = replace_map(2, 4, 0);
        let mut mapping = Mapping::new();
        mapping.append_map(StepMap::offset(5), None);
        mapping.append_map(a.clone(), None);
        mapping.append_map(a.invert(), Some(1));
        let inverse = mapping.invert();
        assert_eq!(inverse.len(), 3);
        assert_eq!(inverse.get_mirror(0), Some(1));
        assert_eq!(inverse.map(13, Assoc::After), 8);
    }

    #[test]
    fn test_append_mapping_offsets_mirrors() {
        let a = replace_map(1, 3, 0);
        let mut inner = Mapping::new();
        inner.append_map(a.clone(), None);
        inner.append_map(a.invert(), Some(0));
        let mut outer = Mapping::from_maps(vec![StepMap::offset(1)]);
        outer.append_mapping(&inner);
        assert_eq!(outer.get_mirror(2), Some(1));
        assert_eq!(outer.map(2, Assoc::After), 3);
    }

    #[test]
    fn test_slice_view_maps_subrange() {
        let mapping = Mapping::from_maps(vec![StepMap::offset(1), StepMap::offset(2), StepMap::offset(4)]);
        assert_eq!(mapping.slice(1, 3).map(0, Assoc::After), 6);
        assert_eq!(mapping.slice_from(2).map(0, Assoc::After), 4);
        assert_eq!(mapping.slice(0, 0).maps().len(), 0);
    }

    #[test]
    fn test_touches() {
        let map = replace_map(4, 8, 0);
        let result = map.map_result(6, Assoc::After);
        let token = result.recover.unwrap();
        assert!(map.invert().touches(4, token));
        assert!(!map.invert().touches(9, token));
    }
}
