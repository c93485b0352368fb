use std::fmt;

use serde_json::{Map, Value, json};

use crate::{Attrs, MarkType, ModelError, Schema};

/// A mark (emphasis, link, ...) attached to inline content or a node.
///
/// Mark sets are plain `Vec<Mark>`s kept sorted by mark type rank. The helpers
/// here all return new sets; an existing set is never modified.
#[derive(Clone)]
pub struct Mark {
    ty: MarkType,
    attrs: Attrs,
}

impl Mark {
    pub(crate) fn new(ty: MarkType, attrs: Attrs) -> Self {
        Self { ty, attrs }
    }

    pub fn ty(&self) -> &MarkType {
        &self.ty
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    /// Add this mark to `set`, dropping marks it excludes. Returns the set
    /// unchanged when the mark is already present or excluded by a member.
    pub fn add_to_set(&self, set: &[Mark]) -> Vec<Mark> {
        let mut copy: Option<Vec<Mark>> = None;
        let mut placed = false;
        for (i, other) in set.iter().enumerate() {
            if self == other {
                return set.to_vec();
            }
            if self.ty.excludes(&other.ty) {
                if copy.is_none() {
                    copy = Some(set[..i].to_vec());
                }
            } else if other.ty.excludes(&self.ty) {
                return set.to_vec();
            } else {
                if !placed && other.ty.rank() > self.ty.rank() {
                    let c = copy.get_or_insert_with(|| set[..i].to_vec());
                    c.push(self.clone());
                    placed = true;
                }
                if let Some(c) = copy.as_mut() {
                    c.push(other.clone());
                }
            }
        }
        let mut copy = copy.unwrap_or_else(|| set.to_vec());
        if !placed {
            copy.push(self.clone());
        }
        copy
    }

    pub fn remove_from_set(&self, set: &[Mark]) -> Vec<Mark> {
        set.iter().filter(|m| *m != self).cloned().collect()
    }

    pub fn is_in_set(&self, set: &[Mark]) -> bool {
        set.iter().any(|m| m == self)
    }

    pub fn same_set(a: &[Mark], b: &[Mark]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
    }

    /// Build a properly ordered mark set from arbitrary marks.
    pub fn set_from(marks: Vec<Mark>) -> Vec<Mark> {
        if marks.len() <= 1 {
            return marks;
        }
        let mut sorted = marks;
        sorted.sort_by_key(|m| m.ty.rank());
        sorted
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".into(), json!(self.ty.name()));
        if !self.attrs.is_empty() {
            obj.insert("attrs".into(), json!(self.attrs));
        }
        Value::Object(obj)
    }

    pub fn from_json(schema: &Schema, value: &Value) -> Result<Mark, ModelError> {
        let name = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ModelError::InvalidJson("mark without a type".into()))?;
        let ty = schema
            .mark_type(name)
            .ok_or_else(|| ModelError::UnknownMarkType(name.to_string()))?;
        let attrs = attrs_from_json(value.get("attrs"))?;
        check_required(&ty.spec().attrs, attrs.as_ref(), name)?;
        Ok(ty.create(attrs.as_ref()))
    }
}

/// Fail when `given` lacks an attribute that has no default.
pub(crate) fn check_required(
    spec: &[(String, Option<Value>)],
    given: Option<&Attrs>,
    owner: &str,
) -> Result<(), ModelError> {
    for (name, default) in spec {
        if default.is_none() && !given.is_some_and(|g| g.contains_key(name)) {
            return Err(ModelError::InvalidJson(format!(
                "{owner} is missing required attribute {name}"
            )));
        }
    }
    Ok(())
}

pub(crate) fn attrs_from_json(value: Option<&Value>) -> Result<Option<Attrs>, ModelError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        )),
        Some(other) => Err(ModelError::InvalidJson(format!(
            "attrs must be an object, got {other}"
        ))),
    }
}

impl PartialEq for Mark {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.attrs == other.attrs
    }
}

impl fmt::Debug for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attrs.is_empty() {
            write!(f, "{}", self.ty.name())
        } else {
            write!(f, "{}({})", self.ty.name(), json!(self.attrs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::basic_schema;
    use pretty_assertions::assert_eq;

    fn mark(name: &str) -> Mark {
        basic_schema().mark(name, None).unwrap()
    }

    fn link(href: &str) -> Mark {
        let attrs: Attrs = [("href".to_string(), json!(href))].into_iter().collect();
        basic_schema().mark("link", Some(&attrs)).unwrap()
    }

    #[test]
    fn test_add_keeps_rank_order() {
        let set = mark("strong").add_to_set(&[]);
        let set = mark("em").add_to_set(&set);
        assert_eq!(format!("{set:?}"), "[em, strong]");
    }

    #[test]
    fn test_add_existing_is_noop() {
        let set = vec![mark("em")];
        assert_eq!(mark("em").add_to_set(&set), set);
    }

    #[test]
    fn test_same_type_replaces_attrs() {
        let set = link("a").add_to_set(&[]);
        let set = link("b").add_to_set(&set);
        assert_eq!(set, vec![link("b")]);
    }

    #[test]
    fn test_remove_from_set() {
        let set = vec![mark("em"), mark("strong")];
        assert_eq!(mark("em").remove_from_set(&set), vec![mark("strong")]);
        assert!(!mark("code").is_in_set(&set));
    }

    #[test]
    fn test_json_round_trip_keeps_attrs() {
        let original = link("https://example.com");
        let json = original.to_json();
        assert_eq!(json, json!({"type": "link", "attrs": {"href": "https://example.com", "title": null}}));
        assert_eq!(Mark::from_json(&basic_schema(), &json).unwrap(), original);
    }

    #[test]
    fn test_unknown_mark_json() {
        let err = Mark::from_json(&basic_schema(), &json!({"type": "blink"})).unwrap_err();
        assert_eq!(err, ModelError::UnknownMarkType("blink".into()));
    }
}
