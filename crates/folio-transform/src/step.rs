use folio_model::{Mark, Node, Schema, Slice, Value};
use serde::{Deserialize, Serialize};

use crate::attr_step::{AttrStep, DocAttrStep};
use crate::error::{StepFailure, StepJsonError};
use crate::map::{Mappable, StepMap};
use crate::mark_step::{AddMarkStep, AddNodeMarkStep, RemoveMarkStep, RemoveNodeMarkStep};
use crate::replace_step::{ReplaceAroundStep, ReplaceStep};

/// The document a step produced, or why it couldn't be applied.
pub type StepResult = Result<Node, StepFailure>;

/// An atomic, invertible document change.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Replace(ReplaceStep),
    ReplaceAround(ReplaceAroundStep),
    AddMark(AddMarkStep),
    RemoveMark(RemoveMarkStep),
    AddNodeMark(AddNodeMarkStep),
    RemoveNodeMark(RemoveNodeMarkStep),
    Attr(AttrStep),
    DocAttr(DocAttrStep),
}

impl Step {
    /// Apply to `doc`. Never modifies `doc`; failures are returned, not
    /// raised.
    pub fn apply(&self, doc: &Node) -> StepResult {
        match self {
            Step::Replace(s) => s.apply(doc),
            Step::ReplaceAround(s) => s.apply(doc),
            Step::AddMark(s) => s.apply(doc),
            Step::RemoveMark(s) => s.apply(doc),
            Step::AddNodeMark(s) => s.apply(doc),
            Step::RemoveNodeMark(s) => s.apply(doc),
            Step::Attr(s) => s.apply(doc),
            Step::DocAttr(s) => s.apply(doc),
        }
    }

    pub fn get_map(&self) -> StepMap {
        match self {
            Step::Replace(s) => s.get_map(),
            Step::ReplaceAround(s) => s.get_map(),
            _ => StepMap::empty(),
        }
    }

    /// A step that undoes this one. `doc` must be the document this step
    /// was applied to.
    pub fn invert(&self, doc: &Node) -> Step {
        match self {
            Step::Replace(s) => Step::Replace(s.invert(doc)),
            Step::ReplaceAround(s) => Step::ReplaceAround(s.invert(doc)),
            Step::AddMark(s) => s.invert(doc),
            Step::RemoveMark(s) => s.invert(doc),
            Step::AddNodeMark(s) => s.invert(doc),
            Step::RemoveNodeMark(s) => s.invert(doc),
            Step::Attr(s) => Step::Attr(s.invert(doc)),
            Step::DocAttr(s) => Step::DocAttr(s.invert(doc)),
        }
    }

    /// Re-express this step for a document changed by `mapping`. `None` when
    /// the content it targeted is gone.
    pub fn map<M: Mappable + ?Sized>(&self, mapping: &M) -> Option<Step> {
        match self {
            Step::Replace(s) => s.map(mapping).map(Step::Replace),
            Step::ReplaceAround(s) => s.map(mapping).map(Step::ReplaceAround),
            Step::AddMark(s) => s.map(mapping).map(Step::AddMark),
            Step::RemoveMark(s) => s.map(mapping).map(Step::RemoveMark),
            Step::AddNodeMark(s) => s.map(mapping).map(Step::AddNodeMark),
            Step::RemoveNodeMark(s) => s.map(mapping).map(Step::RemoveNodeMark),
            Step::Attr(s) => s.map(mapping).map(Step::Attr),
            Step::DocAttr(s) => Some(Step::DocAttr(s.clone())),
        }
    }

    /// Combine with a step applied directly after this one.
    pub fn merge(&self, other: &Step) -> Option<Step> {
        match (self, other) {
            (Step::Replace(a), Step::Replace(b)) => a.merge(b).map(Step::Replace),
            (Step::AddMark(a), Step::AddMark(b)) => a.merge(b).map(Step::AddMark),
            (Step::RemoveMark(a), Step::RemoveMark(b)) => a.merge(b).map(Step::RemoveMark),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        let json = match self {
            Step::Replace(s) => StepJson::Replace {
                from: s.from(),
                to: s.to(),
                slice: s.slice().to_json(),
                structure: s.structure(),
            },
            Step::ReplaceAround(s) => StepJson::ReplaceAround {
                from: s.from(),
                to: s.to(),
                gap_from: s.gap_from(),
                gap_to: s.gap_to(),
                insert: s.insert(),
                slice: s.slice().to_json(),
                structure: s.structure(),
            },
            Step::AddMark(s) => StepJson::AddMark {
                from: s.from(),
                to: s.to(),
                mark: s.mark().to_json(),
            },
            Step::RemoveMark(s) => StepJson::RemoveMark {
                from: s.from(),
                to: s.to(),
                mark: s.mark().to_json(),
            },
            Step::AddNodeMark(s) => StepJson::AddNodeMark {
                pos: s.pos(),
                mark: s.mark().to_json(),
            },
            Step::RemoveNodeMark(s) => StepJson::RemoveNodeMark {
                pos: s.pos(),
                mark: s.mark().to_json(),
            },
            Step::Attr(s) => StepJson::Attr {
                pos: s.pos(),
                attr: s.attr().to_string(),
                value: s.value().clone(),
            },
            Step::DocAttr(s) => StepJson::DocAttr {
                attr: s.attr().to_string(),
                value: s.value().clone(),
            },
        };
        match serde_json::to_value(json) {
            Ok(value) => value,
            Err(e) => panic!("step serialization can't fail: {e}"),
        }
    }

    pub fn from_json(schema: &Schema, value: &Value) -> Result<Step, StepJsonError> {
        let json: StepJson = serde_json::from_value(value.clone())?;
        let step = match json {
            StepJson::Replace {
                from,
                to,
                slice,
                structure,
            } => {
                check_order(from, to)?;
                let slice = Slice::from_json(schema, slice.as_ref())?;
                Step::Replace(ReplaceStep::new(from, to, slice, structure))
            }
            StepJson::ReplaceAround {
                from,
                to,
                gap_from,
                gap_to,
                insert,
                slice,
                structure,
            } => {
                check_order(from, gap_from)?;
                check_order(gap_from, gap_to)?;
                check_order(gap_to, to)?;
                let slice = Slice::from_json(schema, slice.as_ref())?;
                Step::ReplaceAround(ReplaceAroundStep::new(
                    from, to, gap_from, gap_to, slice, insert, structure,
                ))
            }
            StepJson::AddMark { from, to, mark } => {
                Step::AddMark(AddMarkStep::new(from, to, Mark::from_json(schema, &mark)?))
            }
            StepJson::RemoveMark { from, to, mark } => {
                Step::RemoveMark(RemoveMarkStep::new(from, to, Mark::from_json(schema, &mark)?))
            }
            StepJson::AddNodeMark { pos, mark } => {
                Step::AddNodeMark(AddNodeMarkStep::new(pos, Mark::from_json(schema, &mark)?))
            }
            StepJson::RemoveNodeMark { pos, mark } => {
                Step::RemoveNodeMark(RemoveNodeMarkStep::new(pos, Mark::from_json(schema, &mark)?))
            }
            StepJson::Attr { pos, attr, value } => Step::Attr(AttrStep::new(pos, attr, value)),
            StepJson::DocAttr { attr, value } => Step::DocAttr(DocAttrStep::new(attr, value)),
        };
        Ok(step)
    }
}

fn check_order(a: usize, b: usize) -> Result<(), StepJsonError> {
    if a > b {
        return Err(StepJsonError::Json(serde::de::Error::custom(format!(
            "position {a} is after {b}"
        ))));
    }
    Ok(())
}

fn is_false(b: &bool) -> bool {
    !b
}

/// Wire shape of a step, tagged by `stepType`.
#[derive(Serialize, Deserialize)]
#[serde(tag = "stepType", rename_all = "camelCase")]
enum StepJson {
    Replace {
        from: usize,
        to: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slice: Option<Value>,
        #[serde(default, skip_serializing_if = "is_false")]
        structure: bool,
    },
    ReplaceAround {
        from: usize,
        to: usize,
        #[serde(rename = "gapFrom")]
        gap_from: usize,
        #[serde(rename = "gapTo")]
        gap_to: usize,
        insert: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slice: Option<Value>,
        #[serde(default, skip_serializing_if = "is_false")]
        structure: bool,
    },
    AddMark {
        from: usize,
        to: usize,
        mark: Value,
    },
    RemoveMark {
        from: usize,
        to: usize,
        mark: Value,
    },
    AddNodeMark {
        pos: usize,
        mark: Value,
    },
    RemoveNodeMark {
        pos: usize,
        mark: Value,
    },
    Attr {
        pos: usize,
        attr: String,
        value: Value,
    },
    DocAttr {
        attr: String,
        value: Value,
    },
}

impl From<ReplaceStep> for Step {
    fn from(step: ReplaceStep) -> Self {
        Step::Replace(step)
    }
}

impl From<ReplaceAroundStep> for Step {
    fn from(step: ReplaceAroundStep) -> Self {
        Step::ReplaceAround(step)
    }
}

impl From<AddMarkStep> for Step {
    fn from(step: AddMarkStep) -> Self {
        Step::AddMark(step)
    }
}

impl From<RemoveMarkStep> for Step {
    fn from(step: RemoveMarkStep) -> Self {
        Step::RemoveMark(step)
    }
}

impl From<AddNodeMarkStep> for Step {
    fn from(step: AddNodeMarkStep) -> Self {
        Step::AddNodeMark(step)
    }
}

impl From<RemoveNodeMarkStep> for Step {
    fn from(step: RemoveNodeMarkStep) -> Self {
        Step::RemoveNodeMark(step)
    }
}

impl From<AttrStep> for Step {
    fn from(step: AttrStep) -> Self {
        Step::Attr(step)
    }
}

impl From<DocAttrStep> for Step {
    fn from(step: DocAttrStep) -> Self {
        Step::DocAttr(step)
    }
}
