use folio_model::basic::basic_schema;
use folio_model::builders::*;
use folio_model::{Fragment, Node, NodeRange, NodeType, Slice};
use folio_transform::{
    AddMarkStep, Assoc, Mappable, Mapping, RemoveMarkStep, ReplaceStep, Step, Transform, find_wrapping, lift_target,
    replace_step,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn node_type(name: &str) -> NodeType {
    basic_schema().node_type(name).unwrap()
}

fn text(s: &str) -> Slice {
    Slice::new(Fragment::from(basic_schema().text(s, vec![])), 0, 0)
}

fn block_range(doc: &Node, from: usize, to: usize) -> NodeRange {
    doc.resolve(from).block_range(&doc.resolve(to), None).unwrap()
}

/// A paragraph whose content makes the document exactly 20 units long.
fn flat_doc() -> Node {
    document![p!["abcdefghijklmnopqr"]]
}

/// Undo every step of `tr` in reverse, starting from its current document.
fn unwind(tr: &Transform) -> Node {
    let mut doc = tr.doc().clone();
    for (step, before) in tr.steps().iter().zip(tr.docs()).rev() {
        doc = step.invert(before).apply(&doc).unwrap();
    }
    doc
}

#[test]
fn test_replace_then_invert_restores_document() {
    init_logging();
    let doc = flat_doc();
    assert_eq!(doc.content().size(), 20);
    let step: Step = ReplaceStep::new(5, 10, text("X"), false).into();
    let changed = step.apply(&doc).unwrap();
    assert_eq!(changed, document![p!["abcdXjklmnopqr"]]);
    let restored = step.invert(&doc).apply(&changed).unwrap();
    assert_eq!(restored, doc);
}

#[test]
fn test_positions_outside_replaced_region_round_trip() {
    let doc = flat_doc();
    let step: Step = ReplaceStep::new(5, 10, text("X"), false).into();
    let inverse = step.invert(&doc);
    for pos in (0..=5).chain(10..=20) {
        let there = step.get_map().map(pos, Assoc::After);
        assert_eq!(inverse.get_map().map(there, Assoc::After), pos, "position {pos}");
    }
}

#[test]
fn test_mirrored_mapping_restores_deleted_positions() {
    let doc = flat_doc();
    let step: Step = ReplaceStep::new(5, 10, text("X"), false).into();
    let mut mapping = Mapping::new();
    mapping.append_map(step.get_map(), None);
    mapping.append_map(step.invert(&doc).get_map(), Some(0));
    for pos in 0..=20 {
        assert_eq!(mapping.map(pos, Assoc::After), pos, "position {pos}");
        assert!(!mapping.map_result(pos, Assoc::After).deleted_across());
    }
    // on its own the step loses positions inside the replaced range
    assert!(step.get_map().map_result(7, Assoc::After).deleted_across());
}

#[test]
fn test_transform_mapping_inverts_through_mirrors() {
    let doc = flat_doc();
    let mut tr = Transform::new(doc.clone());
    tr.delete(3, 8).unwrap();
    let undo = tr.steps()[0].invert(&doc);
    tr.step(undo).unwrap();
    assert_eq!(tr.doc(), &doc);
    let mut mapping = Mapping::new();
    mapping.append_map(tr.mapping().maps()[0].clone(), None);
    mapping.append_map(tr.mapping().maps()[1].clone(), Some(0));
    assert_eq!(mapping.map(5, Assoc::Before), 5);
    assert_eq!(mapping.invert().map(5, Assoc::Before), 5);
}

#[rstest]
#[case::overlapping_marks(
    AddMarkStep::new(1, 7, basic_schema().mark("strong", None).unwrap()).into(),
    AddMarkStep::new(5, 11, basic_schema().mark("strong", None).unwrap()).into(),
)]
#[case::adjacent_removals(
    RemoveMarkStep::new(1, 4, basic_schema().mark("em", None).unwrap()).into(),
    RemoveMarkStep::new(4, 9, basic_schema().mark("em", None).unwrap()).into(),
)]
#[case::typing(
    ReplaceStep::new(3, 3, text("x"), false).into(),
    ReplaceStep::new(4, 4, text("y"), false).into(),
)]
#[case::backspacing(
    ReplaceStep::new(8, 9, Slice::empty(), false).into(),
    ReplaceStep::new(7, 8, Slice::empty(), false).into(),
)]
fn test_merged_step_matches_applying_both(#[case] a: Step, #[case] b: Step) {
    let doc = document![p![em!["abcdefghijkl"]]];
    let merged = a.merge(&b).unwrap();
    let sequential = b.apply(&a.apply(&doc).unwrap()).unwrap();
    assert_eq!(merged.apply(&doc).unwrap(), sequential);
}

#[test]
fn test_bold_ranges_merge_into_one_step() {
    let strong = basic_schema().mark("strong", None).unwrap();
    let a: Step = AddMarkStep::new(1, 7, strong.clone()).into();
    let b: Step = AddMarkStep::new(5, 11, strong.clone()).into();
    assert_eq!(a.merge(&b), Some(AddMarkStep::new(1, 11, strong).into()));
}

fn link_to(href: &str) -> folio_model::Mark {
    basic_schema()
        .mark("link", Some(&attrs(&[("href", serde_json::json!(href))])))
        .unwrap()
}

#[rstest]
#[case::unmarked(
    document![p!["abcd"]],
    AddMarkStep::new(1, 5, basic_schema().mark("strong", None).unwrap()).into(),
)]
#[case::already_marked(
    document![p![strong!["abcd"]]],
    AddMarkStep::new(1, 5, basic_schema().mark("strong", None).unwrap()).into(),
)]
#[case::partly_marked(
    document![p![strong!["ab"], "cd"]],
    AddMarkStep::new(1, 5, basic_schema().mark("strong", None).unwrap()).into(),
)]
#[case::replacing_an_excluded_mark(
    document![p![link!("a.example", ["ab"]), "cd"]],
    AddMarkStep::new(1, 5, link_to("b.example")).into(),
)]
#[case::removing_a_partial_mark(
    document![p![em!["ab"], "cd"]],
    RemoveMarkStep::new(1, 5, basic_schema().mark("em", None).unwrap()).into(),
)]
#[case::removing_an_absent_mark(
    document![p!["abcd"]],
    RemoveMarkStep::new(1, 5, basic_schema().mark("em", None).unwrap()).into(),
)]
#[case::removing_across_blocks(
    document![p![em!["ab"]], p!["cd"]],
    RemoveMarkStep::new(1, 7, basic_schema().mark("em", None).unwrap()).into(),
)]
fn test_mark_step_inverse_restores_document(#[case] doc: Node, #[case] step: Step) {
    let changed = step.apply(&doc).unwrap();
    let restored = step.invert(&doc).apply(&changed).unwrap();
    assert_eq!(restored, doc);
}

fn fitter_docs() -> Vec<Node> {
    vec![
        document![p!["ab"], p!["cd"]],
        document![p!["ab"], blockquote![p!["cd"], p!["ef"]]],
        document![ul![li![p!["ab"]], li![p!["cd"]]], hr!()],
        document![h1!["ab"], code_block!["cd"]],
    ]
}

fn fitter_slices() -> Vec<Slice> {
    let source = document![p!["xy"], blockquote![p!["zw"]]];
    vec![
        Slice::empty(),
        text("q"),
        Slice::new(Fragment::from(p!["para"]), 0, 0),
        Slice::new(Fragment::from(hr!()), 0, 0),
        Slice::new(Fragment::from(li![p!["item"]]), 0, 0),
        source.slice(2, 7, false),
        source.slice(1, 9, false),
    ]
}

#[test]
fn test_fitted_steps_always_apply() {
    init_logging();
    for doc in fitter_docs() {
        let size = doc.content().size();
        for (n, slice) in fitter_slices().iter().enumerate() {
            for from in 0..=size {
                for to in from..=size {
                    if let Some(step) = replace_step(&doc, from, to, slice) {
                        let result = step.apply(&doc);
                        assert!(result.is_ok(), "slice {n} at {from}..{to} in {doc}: {result:?}");
                    }
                }
            }
        }
    }
}

#[test]
fn test_structural_edits_unwind_to_the_original() {
    init_logging();
    let doc = document![p!["hello"], p!["world"]];
    let mut tr = Transform::new(doc.clone());

    let range = block_range(&doc, 1, 8);
    let wrappers = find_wrapping(&range, &node_type("blockquote"), None).unwrap();
    tr.wrap(&range, &wrappers).unwrap();
    assert_eq!(tr.doc(), &document![blockquote![p!["hello"], p!["world"]]]);

    tr.split(4, 1, None).unwrap();
    assert_eq!(tr.doc(), &document![blockquote![p!["he"], p!["llo"], p!["world"]]]);

    tr.set_block_type(2, 5, &node_type("heading"), None).unwrap();
    tr.add_mark(2, 4, basic_schema().mark("strong", None).unwrap()).unwrap();
    assert_eq!(
        tr.doc(),
        &document![blockquote![h1![strong!["he"]], p!["llo"], p!["world"]]]
    );

    let range = block_range(tr.doc(), 11, 11);
    let target = lift_target(&range).unwrap();
    tr.lift(&range, target).unwrap();
    assert_eq!(
        tr.doc(),
        &document![blockquote![h1![strong!["he"]], p!["llo"]], p!["world"]]
    );

    assert_eq!(tr.steps().len(), tr.mapping().len());
    assert_eq!(tr.before(), &doc);
    assert_eq!(unwind(&tr), doc);
}

#[test]
fn test_steps_survive_json_round_trip() {
    let doc = document![p!["hello"], p!["world"]];
    let mut tr = Transform::new(doc.clone());
    let range = block_range(&doc, 1, 8);
    let wrappers = find_wrapping(&range, &node_type("bullet_list"), None).unwrap();
    tr.wrap(&range, &wrappers)
        .unwrap()
        .add_mark(3, 5, basic_schema().mark("em", None).unwrap())
        .unwrap()
        .replace_with(4, 4, basic_schema().text("!", vec![]))
        .unwrap();
    let schema = basic_schema();
    for step in tr.steps() {
        let parsed = Step::from_json(&schema, &step.to_json()).unwrap();
        assert_eq!(&parsed, step);
    }
}

#[test]
fn test_replace_range_never_deletes_the_root() {
    let doc = document![p!["ab"]];
    let mut tr = Transform::new(doc);
    tr.delete_range(0, 4).unwrap();
    assert_eq!(tr.doc().ty().name(), "doc");
    assert!(tr.doc().ty().valid_content(tr.doc().content()));
}
