//! Immutable document trees validated against a schema.
//!
//! A [`Node`] tree is addressed by integer positions: entering or leaving a
//! non-leaf node counts one token, every character of text counts one, and a
//! leaf counts one. [`Node::resolve`] turns a position into a [`ResolvedPos`]
//! with its ancestor chain, and [`Node::replace`] splices a [`Slice`] between
//! two positions, checking the result against the [`Schema`].

pub mod basic;
pub mod builders;
mod content;
mod error;
mod fragment;
mod mark;
mod node;
mod replace;
mod resolved;
mod schema;
mod slice;

pub use content::ContentMatch;
pub use error::{ModelError, ReplaceError};
pub use fragment::Fragment;
pub use mark::Mark;
pub use node::Node;
pub use resolved::{NodeRange, ResolvedPos};
pub use schema::{Attrs, MarkSpec, MarkType, NodeSpec, NodeType, Schema, SchemaSpec};
pub use slice::Slice;

pub use serde_json::Value;
