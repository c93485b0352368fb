//! The structural replace underlying every document edit: cut out the range
//! between two resolved positions and splice a slice in, joining open nodes
//! on both sides with the surrounding structure.

use crate::{Fragment, Node, NodeType, ReplaceError, ResolvedPos, Slice};

pub(crate) fn replace(from: &ResolvedPos, to: &ResolvedPos, slice: &Slice) -> Result<Node, ReplaceError> {
    if slice.open_start() > from.depth() {
        return Err(ReplaceError::DeeperThanInsertion);
    }
    if from.depth() as isize - slice.open_start() as isize != to.depth() as isize - slice.open_end() as isize {
        return Err(ReplaceError::InconsistentOpenDepths);
    }
    replace_outer(from, to, slice, 0)
}

fn replace_outer(from: &ResolvedPos, to: &ResolvedPos, slice: &Slice, depth: usize) -> Result<Node, ReplaceError> {
    let index = from.index(depth);
    let node = from.node(depth);
    if index == to.index(depth) && depth < from.depth() - slice.open_start() {
        let inner = replace_outer(from, to, slice, depth + 1)?;
        Ok(node.copy(node.content().replace_child(index, inner)))
    } else if slice.content().size() == 0 {
        close(node, replace_two_way(from, to, depth)?)
    } else if slice.open_start() == 0 && slice.open_end() == 0 && from.depth() == depth && to.depth() == depth {
        let parent = from.parent();
        let content = parent.content();
        let joined = content
            .cut(0, from.parent_offset())
            .append(slice.content())
            .append(&content.cut(to.parent_offset(), content.size()));
        close(parent, joined)
    } else {
        let (start, end) = prepare_slice_for_replace(slice, from);
        close(node, replace_three_way(from, &start, &end, to, depth)?)
    }
}

fn check_join(main: &NodeType, sub: &NodeType) -> Result<(), ReplaceError> {
    if sub.compatible_content(main) {
        Ok(())
    } else {
        Err(ReplaceError::CannotJoin {
            sub: sub.name().to_string(),
            main: main.name().to_string(),
        })
    }
}

fn joinable(before: &ResolvedPos, after: &ResolvedPos, depth: usize) -> Result<Node, ReplaceError> {
    let node = before.node(depth);
    check_join(node.ty(), after.node(depth).ty())?;
    Ok(node.clone())
}

fn add_node(child: Node, target: &mut Vec<Node>) {
    if let Some(last) = target.last_mut()
        && child.is_text()
        && child.same_markup(last)
    {
        let joined = format!("{}{}", last.text().unwrap_or(""), child.text().unwrap_or(""));
        *last = child.with_text(&joined);
        return;
    }
    target.push(child);
}

fn add_range(start: Option<&ResolvedPos>, end: Option<&ResolvedPos>, depth: usize, target: &mut Vec<Node>) {
    let Some(node) = end.or(start).map(|p| p.node(depth)) else {
        return;
    };
    let mut start_index = 0;
    let end_index = end.map_or(node.child_count(), |e| e.index(depth));
    if let Some(start) = start {
        start_index = start.index(depth);
        if start.depth() > depth {
            start_index += 1;
        } else if start.text_offset() > 0 {
            if let Some(after) = start.node_after() {
                add_node(after, target);
            }
            start_index += 1;
        }
    }
    for i in start_index..end_index {
        add_node(node.child(i).clone(), target);
    }
    if let Some(end) = end
        && end.depth() == depth
        && end.text_offset() > 0
        && let Some(before) = end.node_before()
    {
        add_node(before, target);
    }
}

fn close(node: &Node, content: Fragment) -> Result<Node, ReplaceError> {
    node.ty().check_content(&content)?;
    Ok(node.copy(content))
}

fn replace_three_way(
    from: &ResolvedPos,
    start: &ResolvedPos,
    end: &ResolvedPos,
    to: &ResolvedPos,
    depth: usize,
) -> Result<Fragment, ReplaceError> {
    let open_start = if from.depth() > depth {
        Some(joinable(from, start, depth + 1)?)
    } else {
        None
    };
    let open_end = if to.depth() > depth {
        Some(joinable(end, to, depth + 1)?)
    } else {
        None
    };

    let mut content = Vec::new();
    add_range(None, Some(from), depth, &mut content);
    match (&open_start, &open_end) {
        (Some(os), Some(oe)) if start.index(depth) == end.index(depth) => {
            check_join(os.ty(), oe.ty())?;
            let inner = replace_three_way(from, start, end, to, depth + 1)?;
            add_node(close(os, inner)?, &mut content);
        }
        _ => {
            if let Some(os) = &open_start {
                add_node(close(os, replace_two_way(from, start, depth + 1)?)?, &mut content);
            }
            add_range(Some(start), Some(end), depth, &mut content);
            if let Some(oe) = &open_end {
                add_node(close(oe, replace_two_way(end, to, depth + 1)?)?, &mut content);
            }
        }
    }
    add_range(Some(to), None, depth, &mut content);
    Ok(Fragment::from_array(content))
}

fn replace_two_way(from: &ResolvedPos, to: &ResolvedPos, depth: usize) -> Result<Fragment, ReplaceError> {
    let mut content = Vec::new();
    add_range(None, Some(from), depth, &mut content);
    if from.depth() > depth {
        let ty = joinable(from, to, depth + 1)?;
        add_node(close(&ty, replace_two_way(from, to, depth + 1)?)?, &mut content);
    }
    add_range(Some(to), None, depth, &mut content);
    Ok(Fragment::from_array(content))
}

fn prepare_slice_for_replace(slice: &Slice, along: &ResolvedPos) -> (ResolvedPos, ResolvedPos) {
    let extra = along.depth() - slice.open_start();
    let parent = along.node(extra);
    let mut node = parent.copy(slice.content().clone());
    for i in (0..extra).rev() {
        node = along.node(i).copy(Fragment::from(node));
    }
    let start = node.resolve(slice.open_start() + extra);
    let end = node.resolve(node.content().size() - slice.open_end() - extra);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn text_slice(text: &str) -> Slice {
        Slice::new(Fragment::from(crate::basic::basic_schema().text(text, vec![])), 0, 0)
    }

    #[test]
    fn test_replace_text_in_paragraph() {
        let d = document![p!["hello world"]];
        let result = d.replace(1, 6, &text_slice("bye")).unwrap();
        assert_eq!(result, document![p!["bye world"]]);
    }

    #[test]
    fn test_delete_across_paragraphs_joins_them() {
        let d = document![p!["hello"], p!["world"]];
        let result = d.replace(3, 10, &Slice::empty()).unwrap();
        assert_eq!(result, document![p!["herld"]]);
    }

    #[test]
    fn test_open_slice_splits_paragraph() {
        let d = document![p!["abcd"]];
        let split = Slice::new(vec![p!(), p!()].into(), 1, 1);
        let result = d.replace(3, 3, &split).unwrap();
        assert_eq!(result, document![p!["ab"], p!["cd"]]);
    }

    #[rstest]
    #[case::deeper(2, 2, 3, 0, ReplaceError::DeeperThanInsertion)]
    #[case::inconsistent(2, 2, 1, 0, ReplaceError::InconsistentOpenDepths)]
    fn test_open_depth_errors(
        #[case] from: usize,
        #[case] to: usize,
        #[case] open_start: usize,
        #[case] open_end: usize,
        #[case] expected: ReplaceError,
    ) {
        let d = document![p!["abc"]];
        let slice = Slice::new(vec![p!["x"]].into(), open_start, open_end);
        assert_eq!(d.replace(from, to, &slice).unwrap_err(), expected);
    }

    #[test]
    fn test_invalid_content_is_an_error() {
        let d = document![p!["abc"]];
        let slice = Slice::new(Fragment::from(p!["x"]), 0, 0);
        assert!(matches!(
            d.replace(2, 2, &slice),
            Err(ReplaceError::InvalidContent { .. })
        ));
    }

    #[test]
    fn test_cannot_join_incompatible_nodes() {
        let d = document![p!["ab"]];
        let slice = Slice::new(Fragment::from(blockquote![p!["x"]]), 1, 1);
        assert_eq!(
            d.replace(2, 2, &slice).unwrap_err(),
            ReplaceError::CannotJoin {
                sub: "blockquote".into(),
                main: "paragraph".into()
            }
        );
    }

    #[test]
    fn test_out_of_range() {
        let d = document![p!["a"]];
        assert_eq!(
            d.replace(0, 10, &Slice::empty()).unwrap_err(),
            ReplaceError::OutOfRange { pos: 10 }
        );
    }
}
