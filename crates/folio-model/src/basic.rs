//! A ready-made rich text schema: paragraphs, headings, quotes, code,
//! lists, images and the common inline marks.

use std::sync::OnceLock;

use serde_json::json;

use crate::{MarkSpec, NodeSpec, Schema, SchemaSpec};

pub fn basic_spec() -> SchemaSpec {
    SchemaSpec::new()
        .node("doc", NodeSpec::new().content("block+"))
        .node("paragraph", NodeSpec::new().content("inline*").group("block"))
        .node(
            "blockquote",
            NodeSpec::new().content("block+").group("block").defining(),
        )
        .node("horizontal_rule", NodeSpec::new().group("block"))
        .node(
            "heading",
            NodeSpec::new()
                .attr("level", Some(json!(1)))
                .content("inline*")
                .group("block")
                .defining(),
        )
        .node(
            "code_block",
            NodeSpec::new()
                .content("text*")
                .marks("")
                .group("block")
                .code()
                .defining(),
        )
        .node(
            "ordered_list",
            NodeSpec::new()
                .attr("order", Some(json!(1)))
                .content("list_item+")
                .group("block"),
        )
        .node("bullet_list", NodeSpec::new().content("list_item+").group("block"))
        .node(
            "list_item",
            NodeSpec::new().content("paragraph block*").defining(),
        )
        .node("text", NodeSpec::new().group("inline"))
        .node(
            "image",
            NodeSpec::new()
                .inline()
                .attr("src", None)
                .attr("alt", Some(json!(null)))
                .attr("title", Some(json!(null)))
                .group("inline"),
        )
        .node(
            "hard_break",
            NodeSpec::new().inline().group("inline").unselectable(),
        )
        .mark(
            "link",
            MarkSpec::new()
                .attr("href", None)
                .attr("title", Some(json!(null)))
                .non_inclusive(),
        )
        .mark("em", MarkSpec::new())
        .mark("strong", MarkSpec::new())
        .mark("code", MarkSpec::new())
}

/// Shared instance of the basic schema.
pub fn basic_schema() -> Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA
        .get_or_init(|| match Schema::new(basic_spec()) {
            Ok(schema) => schema,
            Err(e) => panic!("basic schema is invalid: {e}"),
        })
        .clone()
}
