//! Terse constructors for documents in the basic schema, mostly for tests.
//!
//! ```
//! use folio_model::builders::*;
//!
//! let d = document![p!["plain ", strong!["bold"]], hr!()];
//! assert_eq!(d.to_string(), r#"doc(paragraph("plain ", strong("bold")), horizontal_rule)"#);
//! ```

use serde_json::json;

use crate::basic::basic_schema;
use crate::{Attrs, Fragment, Node};

pub use crate::{
    blockquote, br, code, code_block, document, em, h1, h2, hr, img, li, link, ol, p, strong, ul,
};

pub trait IntoNodes {
    fn into_nodes(self) -> Vec<Node>;
}

impl IntoNodes for &str {
    fn into_nodes(self) -> Vec<Node> {
        if self.is_empty() {
            Vec::new()
        } else {
            vec![basic_schema().text(self, Vec::new())]
        }
    }
}

impl IntoNodes for Node {
    fn into_nodes(self) -> Vec<Node> {
        vec![self]
    }
}

impl IntoNodes for Vec<Node> {
    fn into_nodes(self) -> Vec<Node> {
        self
    }
}

pub fn attrs(pairs: &[(&str, serde_json::Value)]) -> Attrs {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn node(name: &str, attrs: Option<Attrs>, children: Vec<Vec<Node>>) -> Node {
    let Some(ty) = basic_schema().node_type(name) else {
        panic!("no node type {name} in the basic schema");
    };
    ty.create(
        attrs.as_ref(),
        Fragment::from_array(children.concat()),
        Vec::new(),
    )
}

pub fn marked(name: &str, attrs: Option<Attrs>, children: Vec<Vec<Node>>) -> Vec<Node> {
    let mark = match basic_schema().mark(name, attrs.as_ref()) {
        Ok(mark) => mark,
        Err(e) => panic!("{e}"),
    };
    children
        .concat()
        .into_iter()
        .map(|n| {
            let marks = mark.add_to_set(n.marks());
            n.mark(marks)
        })
        .collect()
}

pub fn heading(level: u64, children: Vec<Vec<Node>>) -> Node {
    node("heading", Some(attrs(&[("level", json!(level))])), children)
}

pub fn linked(href: &str, children: Vec<Vec<Node>>) -> Vec<Node> {
    marked("link", Some(attrs(&[("href", json!(href))])), children)
}

pub fn image(src: &str) -> Node {
    node("image", Some(attrs(&[("src", json!(src))])), Vec::new())
}

#[macro_export]
macro_rules! document {
    ($($child:expr),* $(,)?) => {
        $crate::builders::node("doc", None, vec![$($crate::builders::IntoNodes::into_nodes($child)),*])
    };
}

#[macro_export]
macro_rules! p {
    ($($child:expr),* $(,)?) => {
        $crate::builders::node("paragraph", None, vec![$($crate::builders::IntoNodes::into_nodes($child)),*])
    };
}

#[macro_export]
macro_rules! blockquote {
    ($($child:expr),* $(,)?) => {
        $crate::builders::node("blockquote", None, vec![$($crate::builders::IntoNodes::into_nodes($child)),*])
    };
}

#[macro_export]
macro_rules! h1 {
    ($($child:expr),* $(,)?) => {
        $crate::builders::heading(1, vec![$($crate::builders::IntoNodes::into_nodes($child)),*])
    };
}

#[macro_export]
macro_rules! h2 {
    ($($child:expr),* $(,)?) => {
        $crate::builders::heading(2, vec![$($crate::builders::IntoNodes::into_nodes($child)),*])
    };
}

#[macro_export]
macro_rules! code_block {
    ($($child:expr),* $(,)?) => {
        $crate::builders::node("code_block", None, vec![$($crate::builders::IntoNodes::into_nodes($child)),*])
    };
}

#[macro_export]
macro_rules! ul {
    ($($child:expr),* $(,)?) => {
        $crate::builders::node("bullet_list", None, vec![$($crate::builders::IntoNodes::into_nodes($child)),*])
    };
}

#[macro_export]
macro_rules! ol {
    ($($child:expr),* $(,)?) => {
        $crate::builders::node("ordered_list", None, vec![$($crate::builders::IntoNodes::into_nodes($child)),*])
    };
}

#[macro_export]
macro_rules! li {
    ($($child:expr),* $(,)?) => {
        $crate::builders::node("list_item", None, vec![$($crate::builders::IntoNodes::into_nodes($child)),*])
    };
}

#[macro_export]
macro_rules! hr {
    () => {
        $crate::builders::node("horizontal_rule", None, Vec::new())
    };
}

#[macro_export]
macro_rules! br {
    () => {
        $crate::builders::node("hard_break", None, Vec::new())
    };
}

#[macro_export]
macro_rules! img {
    () => {
        $crate::builders::image("img.png")
    };
    ($src:expr) => {
        $crate::builders::image($src)
    };
}

#[macro_export]
macro_rules! em {
    ($($child:expr),* $(,)?) => {
        $crate::builders::marked("em", None, vec![$($crate::builders::IntoNodes::into_nodes($child)),*])
    };
}

#[macro_export]
macro_rules! strong {
    ($($child:expr),* $(,)?) => {
        $crate::builders::marked("strong", None, vec![$($crate::builders::IntoNodes::into_nodes($child)),*])
    };
}

#[macro_export]
macro_rules! code {
    ($($child:expr),* $(,)?) => {
        $crate::builders::marked("code", None, vec![$($crate::builders::IntoNodes::into_nodes($child)),*])
    };
}

#[macro_export]
macro_rules! link {
    ($href:expr, [$($child:expr),* $(,)?]) => {
        $crate::builders::linked($href, vec![$($crate::builders::IntoNodes::into_nodes($child)),*])
    };
}
