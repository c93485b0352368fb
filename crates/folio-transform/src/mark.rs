use std::sync::LazyLock;

use folio_model::{ContentMatch, Fragment, Mark, MarkType, Node, NodeType, Slice};
use regex::Regex;

use crate::error::TransformError;
use crate::mark_step::{AddMarkStep, RemoveMarkStep, node_at};
use crate::replace_step::ReplaceStep;
use crate::step::Step;
use crate::transform::Transform;

static NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n|\r").unwrap_or_else(|e| panic!("invalid newline pattern: {e}")));

/// Which marks a removal applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkPattern {
    /// Every mark.
    All,
    /// Every mark of this type, whatever its attributes.
    Type(MarkType),
    /// Only marks equal to this one.
    Mark(Mark),
}

impl MarkPattern {
    pub fn matches(&self, mark: &Mark) -> bool {
        match self {
            MarkPattern::All => true,
            MarkPattern::Type(ty) => mark.ty() == ty,
            MarkPattern::Mark(m) => m == mark,
        }
    }
}

impl From<Mark> for MarkPattern {
    fn from(mark: Mark) -> Self {
        MarkPattern::Mark(mark)
    }
}

impl From<MarkType> for MarkPattern {
    fn from(ty: MarkType) -> Self {
        MarkPattern::Type(ty)
    }
}

struct MatchedRun {
    mark: Mark,
    from: usize,
    to: usize,
    step: usize,
}

impl Transform {
    /// Add `mark` to the inline content between `from` and `to`. Adjacent
    /// nodes that need the same change share one step.
    pub fn add_mark(&mut self, from: usize, to: usize, mark: Mark) -> Result<&mut Self, TransformError> {
        self.check_range(from, to)?;
        let mut removed: Vec<RemoveMarkStep> = Vec::new();
        let mut added: Vec<AddMarkStep> = Vec::new();
        self.doc().nodes_between(from, to, &mut |node: &Node, pos, parent: Option<&Node>, _| {
            if !node.is_inline() {
                return true;
            }
            let marks = node.marks();
            let allowed = parent.is_some_and(|p| p.ty().allows_mark_type(mark.ty()));
            if mark.is_in_set(marks) || !allowed {
                return true;
            }
            let start = pos.max(from);
            let end = (pos + node.node_size()).min(to);
            let new_set = mark.add_to_set(marks);
            for existing in marks {
                if existing.is_in_set(&new_set) {
                    continue;
                }
                match removed.last_mut() {
                    Some(last) if last.to() == start && last.mark() == existing => last.extend_to(end),
                    _ => removed.push(RemoveMarkStep::new(start, end, existing.clone())),
                }
            }
            match added.last_mut() {
                Some(last) if last.to() == start => last.extend_to(end),
                _ => added.push(AddMarkStep::new(start, end, mark.clone())),
            }
            true
        });
        for step in removed {
            self.step(step.into())?;
        }
        for step in added {
            self.step(step.into())?;
        }
        Ok(self)
    }

    /// Remove marks matching `pattern` from the inline content between `from`
    /// and `to`, one step per continuous run of each mark.
    pub fn remove_mark(
        &mut self,
        from: usize,
        to: usize,
        pattern: impl Into<MarkPattern>,
    ) -> Result<&mut Self, TransformError> {
        self.check_range(from, to)?;
        let pattern = pattern.into();
        let mut matched: Vec<MatchedRun> = Vec::new();
        let mut step = 0;
        self.doc().nodes_between(from, to, &mut |node: &Node, pos, _, _| {
            if !node.is_inline() {
                return true;
            }
            step += 1;
            let end = (pos + node.node_size()).min(to);
            for mark in node.marks().iter().filter(|m| pattern.matches(m)) {
                let previous = matched
                    .iter_mut()
                    .rev()
                    .find(|run| run.step == step - 1 && run.mark == *mark);
                match previous {
                    Some(run) => {
                        run.to = end;
                        run.step = step;
                    }
                    None => matched.push(MatchedRun {
                        mark: mark.clone(),
                        from: pos.max(from),
                        to: end,
                        step,
                    }),
                }
            }
            true
        });
        for run in matched {
            self.step(RemoveMarkStep::new(run.from, run.to, run.mark).into())?;
        }
        Ok(self)
    }

    /// Make the children of the node at `pos` valid content for
    /// `parent_type`: drop children it doesn't accept, strip marks it doesn't
    /// allow, turn newlines into spaces unless it preserves whitespace, and
    /// fill in required trailing content.
    pub fn clear_incompatible(
        &mut self,
        pos: usize,
        parent_type: &NodeType,
        matcher: Option<ContentMatch>,
    ) -> Result<&mut Self, TransformError> {
        let Some(node) = node_at(self.doc(), pos) else {
            return Err(TransformError::InvalidArgument(format!("no node at position {pos}")));
        };
        let mut matcher = matcher.unwrap_or_else(|| parent_type.content_match());
        let mut replace_steps: Vec<Step> = Vec::new();
        let mut cur = pos + 1;
        for child in node.content().iter() {
            let end = cur + child.node_size();
            match matcher.match_type(child.ty()) {
                None => replace_steps.push(ReplaceStep::new(cur, end, Slice::empty(), false).into()),
                Some(allowed) => {
                    matcher = allowed;
                    for mark in child.marks() {
                        if !parent_type.allows_mark_type(mark.ty()) {
                            self.step(RemoveMarkStep::new(cur, end, mark.clone()).into())?;
                        }
                    }
                    if let Some(text) = child.text()
                        && !parent_type.whitespace_pre()
                    {
                        let space = Slice::new(
                            Fragment::from(
                                parent_type
                                    .schema()
                                    .text(" ", parent_type.allowed_marks(child.marks())),
                            ),
                            0,
                            0,
                        );
                        for found in NEWLINE.find_iter(text) {
                            let start = cur + text[..found.start()].chars().count();
                            let len = found.as_str().chars().count();
                            replace_steps.push(ReplaceStep::new(start, start + len, space.clone(), false).into());
                        }
                    }
                }
            }
            cur = end;
        }
        if !matcher.valid_end() {
            let fill = matcher
                .fill_before(&Fragment::empty(), true, 0)
                .unwrap_or_else(Fragment::empty);
            self.replace(cur, cur, Slice::new(fill, 0, 0))?;
        }
        for step in replace_steps.into_iter().rev() {
            self.step(step)?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_model::basic::basic_schema;
    use folio_model::builders::*;
    use pretty_assertions::assert_eq;

    fn mark(name: &str) -> Mark {
        basic_schema().mark(name, None).unwrap()
    }

    fn link(href: &str) -> Mark {
        basic_schema().mark("link", Some(&attrs(&[("href", href.into())]))).unwrap()
    }

    #[test]
    fn test_add_mark_coalesces_runs() {
        let mut tr = Transform::new(document![p!["ab", em!["cd"], "ef"]]);
        tr.add_mark(1, 7, mark("strong")).unwrap();
        assert_eq!(tr.steps().len(), 1);
        assert_eq!(tr.doc(), &document![p![strong!["ab", em!["cd"], "ef"]]]);
    }

    #[test]
    fn test_add_mark_already_present_is_a_no_op() {
        let mut tr = Transform::new(document![p![em!["abc"]]]);
        tr.add_mark(1, 4, mark("em")).unwrap();
        assert!(!tr.doc_changed());
    }

    #[test]
    fn test_add_mark_replaces_mark_of_same_type() {
        let mut tr = Transform::new(document![p![link!("a", ["xy"])]]);
        tr.add_mark(1, 3, link("b")).unwrap();
        assert_eq!(tr.doc(), &document![p![link!("b", ["xy"])]]);
        assert_eq!(tr.steps().len(), 2);
    }

    #[test]
    fn test_remove_mark_by_type() {
        let mut tr = Transform::new(document![p![link!("a", ["x"]), link!("b", ["y"]), "z"]]);
        tr.remove_mark(0, 5, basic_schema().mark_type("link").unwrap()).unwrap();
        assert_eq!(tr.doc(), &document![p!["xyz"]]);
        assert_eq!(tr.steps().len(), 2);
    }

    #[test]
    fn test_remove_mark_joins_runs_across_nodes() {
        let mut tr = Transform::new(document![p![em!["a", strong!["b"], "c"]]]);
        tr.remove_mark(1, 4, mark("em")).unwrap();
        assert_eq!(tr.doc(), &document![p!["a", strong!["b"], "c"]]);
        assert_eq!(tr.steps().len(), 1);
    }

    #[test]
    fn test_remove_all_marks() {
        let mut tr = Transform::new(document![p![em![strong!["ab"]]]]);
        tr.remove_mark(1, 3, MarkPattern::All).unwrap();
        assert_eq!(tr.doc(), &document![p!["ab"]]);
    }

    #[test]
    fn test_clear_incompatible_for_code_block() {
        let doc = document![p!["a\nb", em!["c"], br!()]];
        let mut tr = Transform::new(doc);
        let code_block = basic_schema().node_type("code_block").unwrap();
        tr.clear_incompatible(0, &code_block, None).unwrap();
        // code blocks keep newlines, drop marks and don't allow hard breaks
        assert_eq!(tr.doc(), &document![p!["a\nbc"]]);
    }

    #[test]
    fn test_clear_incompatible_replaces_newlines() {
        let doc = document![code_block!["a\r\nb\nc"]];
        let mut tr = Transform::new(doc);
        let paragraph = basic_schema().node_type("paragraph").unwrap();
        tr.clear_incompatible(0, &paragraph, None).unwrap();
        assert_eq!(tr.doc(), &document![code_block!["a b c"]]);
    }
}
