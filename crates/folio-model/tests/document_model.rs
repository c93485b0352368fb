use folio_model::basic::basic_schema;
use folio_model::builders::*;
use folio_model::{Fragment, ModelError, Node, NodeSpec, Schema, SchemaSpec, Slice};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

fn sample() -> Node {
    document![
        h1!["Title"],
        p!["Some ", em!["emphasised ", strong!["bold"]], " text", img!()],
        ul![li![p!["one"]], li![p!["two"], blockquote![p!["nested"]]]],
        code_block!["fn main() {}"],
        hr!(),
    ]
}

#[test]
fn test_display_shows_structure_and_marks() {
    insta::assert_snapshot!(sample().to_string(), @r#"doc(heading("Title"), paragraph("Some ", em("emphasised "), em(strong("bold")), " text", image), bullet_list(list_item(paragraph("one")), list_item(paragraph("two"), blockquote(paragraph("nested")))), code_block("fn main() {}"), horizontal_rule)"#);
}

#[test]
fn test_json_round_trip_preserves_document() {
    let doc = sample();
    let json = doc.to_json();
    let parsed = Node::from_json(&basic_schema(), &json).unwrap();
    assert_eq!(parsed, doc);
    assert_eq!(parsed.to_json(), json);
}

#[test]
fn test_json_shape_of_marked_text() {
    let doc = document![p![link!("https://example.com", ["go"])]];
    assert_eq!(
        doc.to_json(),
        json!({
            "type": "doc",
            "content": [{
                "type": "paragraph",
                "content": [{
                    "type": "text",
                    "marks": [{"type": "link", "attrs": {"href": "https://example.com", "title": null}}],
                    "text": "go"
                }]
            }]
        })
    );
}

#[rstest]
#[case::unknown_type(json!({"type": "table"}))]
#[case::missing_required_attr(json!({"type": "doc", "content": [{"type": "paragraph", "content": [{"type": "image"}]}]}))]
#[case::invalid_content(json!({"type": "doc", "content": [{"type": "text", "text": "loose"}]}))]
#[case::empty_text(json!({"type": "doc", "content": [{"type": "paragraph", "content": [{"type": "text", "text": ""}]}]}))]
fn test_invalid_json_is_rejected(#[case] value: serde_json::Value) {
    assert!(Node::from_json(&basic_schema(), &value).is_err());
}

#[test]
fn test_sizes_and_positions() {
    let doc = sample();
    // heading: 1 + 5 + 1
    assert_eq!(doc.child(0).node_size(), 7);
    assert_eq!(doc.node_at(7).unwrap().ty().name(), "paragraph");
    assert_eq!(doc.node_at(8).unwrap().text(), Some("Some "));
    let pos = doc.resolve(9);
    assert_eq!(pos.parent().ty().name(), "paragraph");
    assert_eq!(pos.parent_offset(), 1);
    assert_eq!(doc.text_between(0, doc.content().size(), "|"), "Title|Some emphasised bold text|one|two|nested|fn main() {}");
}

#[test]
fn test_replace_result_is_checked_against_schema() {
    let doc = document![p!["ab"]];
    // a list item can't sit directly in a paragraph
    let slice = Slice::new(Fragment::from(li![p!["x"]]), 0, 0);
    assert!(doc.replace(2, 2, &slice).is_err());
    // nor can a horizontal rule
    let slice = Slice::new(Fragment::from(hr!()), 0, 0);
    assert!(doc.replace(2, 2, &slice).is_err());
    // the same rule at the top level is fine
    let replaced = doc.replace(4, 4, &slice).unwrap();
    assert_eq!(replaced, document![p!["ab"], hr!()]);
}

#[test]
fn test_slice_then_replace_restores_document() {
    let doc = sample();
    let (from, to) = (10, 30);
    let slice = doc.slice(from, to, false);
    let removed = doc.replace(from, to, &Slice::empty()).unwrap();
    let restored = removed.replace(from, from, &slice).unwrap();
    assert_eq!(restored, doc);
}

#[test]
fn test_schema_rejects_unknown_content_name() {
    let spec = SchemaSpec::new()
        .node("doc", NodeSpec::new().content("chapter+"))
        .node("text", NodeSpec::new());
    assert!(matches!(
        Schema::new(spec),
        Err(ModelError::UnknownContentName { .. })
    ));
}

#[test]
fn test_create_and_fill_adds_required_children() {
    let schema = basic_schema();
    let item = schema
        .node_type("list_item")
        .unwrap()
        .create_and_fill(None, Fragment::empty(), vec![])
        .unwrap();
    assert_eq!(item.to_string(), "list_item(paragraph)");
    item.check().unwrap();
}
