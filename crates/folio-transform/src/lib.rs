//! Document transforms: position maps, the steps that change documents,
//! and the [`Transform`] builder that records them.
//!
//! Every change to a document is expressed as a [`Step`]. Steps can be
//! applied, inverted, mapped over other changes and serialized. The
//! [`Transform`] offers higher level operations (replacing ranges, lifting,
//! wrapping, marking) that compute the right steps for the current document.

mod attr_step;
mod error;
mod fitter;
mod map;
mod mark;
mod mark_step;
mod replace;
mod replace_step;
mod step;
mod structure;
mod transform;

pub use attr_step::{AttrStep, DocAttrStep};
pub use error::{StepFailure, StepJsonError, TransformError};
pub use fitter::{fits_trivially, replace_step};
pub use map::{Assoc, MapRange, MapResult, Mappable, Mapping, MappingView, StepMap};
pub use mark::MarkPattern;
pub use mark_step::{AddMarkStep, AddNodeMarkStep, RemoveMarkStep, RemoveNodeMarkStep};
pub use replace_step::{ReplaceAroundStep, ReplaceStep};
pub use step::{Step, StepResult};
pub use structure::{
    Wrapper, can_change_type, can_join, can_split, drop_point, find_wrapping, insert_point, join_point,
    lift_target,
};
pub use transform::Transform;
