//! Content expressions and the automaton that matches node sequences
//! against them.
//!
//! Expressions are a linear sequence of terms. A term is a node name, a group
//! name, or a parenthesised `|` alternative, optionally followed by `*`, `+`
//! or `?`. The sequence is compiled into a deterministic automaton up front,
//! so matching a child costs one edge lookup.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::{Fragment, ModelError, NodeType};

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\w+|[()|*+?]|\S").unwrap_or_else(|e| panic!("invalid token pattern: {e}"))
});

#[derive(Debug, Clone)]
pub(crate) struct MatchState {
    /// Outgoing edges as `(node type index, target state)`, in preference
    /// order.
    pub(crate) next: Vec<(usize, usize)>,
    pub(crate) valid_end: bool,
}

#[derive(Debug)]
struct Term {
    types: Vec<usize>,
    min: usize,
    max: Option<usize>,
}

impl Term {
    /// Highest repetition count worth distinguishing.
    fn cap(&self) -> usize {
        self.max.unwrap_or(self.min)
    }
}

/// Position inside the term sequence: `(term index, repetitions so far)`.
type Position = (usize, usize);

pub(crate) fn compile(
    expr: &str,
    node_names: &HashMap<&str, usize>,
    groups: &HashMap<&str, Vec<usize>>,
) -> Result<Vec<MatchState>, ModelError> {
    let terms = parse(expr, node_names, groups)?;

    let start = closure(&terms, [(0, 0)].into_iter().collect());
    let mut states: Vec<BTreeSet<Position>> = vec![start.clone()];
    let mut index: HashMap<BTreeSet<Position>, usize> = HashMap::from([(start, 0)]);
    let mut compiled = Vec::new();
    let mut work = 0;
    while work < states.len() {
        let current = states[work].clone();
        let mut next = Vec::new();
        for &(term, _) in &current {
            let Some(t) = terms.get(term) else { continue };
            for &ty in &t.types {
                if next.iter().any(|(seen, _)| *seen == ty) {
                    continue;
                }
                let target = step(&terms, &current, ty);
                if target.is_empty() {
                    continue;
                }
                let id = match index.get(&target) {
                    Some(id) => *id,
                    None => {
                        states.push(target.clone());
                        index.insert(target, states.len() - 1);
                        states.len() - 1
                    }
                };
                next.push((ty, id));
            }
        }
        compiled.push(MatchState {
            next,
            valid_end: current.contains(&(terms.len(), 0)),
        });
        work += 1;
    }
    Ok(compiled)
}

fn closure(terms: &[Term], mut set: BTreeSet<Position>) -> BTreeSet<Position> {
    let mut pending: Vec<Position> = set.iter().copied().collect();
    while let Some((term, count)) = pending.pop() {
        if let Some(t) = terms.get(term)
            && count >= t.min
            && set.insert((term + 1, 0))
        {
            pending.push((term + 1, 0));
        }
    }
    set
}

fn step(terms: &[Term], from: &BTreeSet<Position>, ty: usize) -> BTreeSet<Position> {
    let mut target = BTreeSet::new();
    for &(term, count) in from {
        let Some(t) = terms.get(term) else { continue };
        if t.types.contains(&ty) && t.max.is_none_or(|max| count < max) {
            target.insert((term, (count + 1).min(t.cap())));
        }
    }
    closure(terms, target)
}

fn parse(
    expr: &str,
    node_names: &HashMap<&str, usize>,
    groups: &HashMap<&str, Vec<usize>>,
) -> Result<Vec<Term>, ModelError> {
    let tokens: Vec<&str> = TOKEN.find_iter(expr).map(|m| m.as_str()).collect();
    let invalid = |reason: &str| ModelError::InvalidContentExpression {
        expr: expr.to_string(),
        reason: reason.to_string(),
    };
    let resolve = |name: &str| -> Result<Vec<usize>, ModelError> {
        if let Some(members) = groups.get(name) {
            Ok(members.clone())
        } else if let Some(index) = node_names.get(name) {
            Ok(vec![*index])
        } else {
            Err(ModelError::UnknownContentName {
                name: name.to_string(),
                expr: expr.to_string(),
            })
        }
    };

    let mut terms = Vec::new();
    let mut pos = 0;
    while pos < tokens.len() {
        let mut types = Vec::new();
        match tokens[pos] {
            "(" => {
                pos += 1;
                loop {
                    let Some(name) = tokens.get(pos) else {
                        return Err(invalid("unclosed parenthesis"));
                    };
                    if !is_name(name) {
                        return Err(invalid("expected a type name"));
                    }
                    for ty in resolve(name)? {
                        if !types.contains(&ty) {
                            types.push(ty);
                        }
                    }
                    pos += 1;
                    match tokens.get(pos) {
                        Some(&"|") => pos += 1,
                        Some(&")") => {
                            pos += 1;
                            break;
                        }
                        _ => return Err(invalid("expected '|' or ')'")),
                    }
                }
            }
            name if is_name(name) => {
                types = resolve(name)?;
                pos += 1;
            }
            other => return Err(invalid(&format!("unexpected token '{other}'"))),
        }
        let (min, max) = match tokens.get(pos) {
            Some(&"*") => (0, None),
            Some(&"+") => (1, None),
            Some(&"?") => (0, Some(1)),
            _ => (1, Some(1)),
        };
        if min != 1 || max != Some(1) {
            pos += 1;
        }
        terms.push(Term { types, min, max });
    }
    Ok(terms)
}

fn is_name(token: &str) -> bool {
    token.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// A state in a node type's content automaton.
#[derive(Clone)]
pub struct ContentMatch {
    owner: NodeType,
    state: usize,
}

impl ContentMatch {
    pub(crate) fn new(owner: NodeType, state: usize) -> Self {
        Self { owner, state }
    }

    fn data(&self) -> &MatchState {
        &self.owner.schema.0.nodes[self.owner.index].states[self.state]
    }

    fn node_type(&self, index: usize) -> NodeType {
        NodeType {
            schema: self.owner.schema.clone(),
            index,
        }
    }

    /// True when the content matched so far is a complete sequence.
    pub fn valid_end(&self) -> bool {
        self.data().valid_end
    }

    pub fn edge_count(&self) -> usize {
        self.data().next.len()
    }

    pub fn edge(&self, n: usize) -> (NodeType, ContentMatch) {
        let (ty, next) = self.data().next[n];
        (self.node_type(ty), ContentMatch::new(self.owner.clone(), next))
    }

    fn edges(&self) -> impl Iterator<Item = (NodeType, ContentMatch)> + '_ {
        (0..self.edge_count()).map(|n| self.edge(n))
    }

    pub fn match_type(&self, ty: &NodeType) -> Option<ContentMatch> {
        if !ty.schema.ptr_eq(&self.owner.schema) {
            return None;
        }
        self.data()
            .next
            .iter()
            .find(|(t, _)| *t == ty.index)
            .map(|(_, next)| ContentMatch::new(self.owner.clone(), *next))
    }

    pub fn match_fragment(&self, fragment: &Fragment, start: usize, end: usize) -> Option<ContentMatch> {
        let mut current = self.clone();
        for i in start..end {
            current = current.match_type(fragment.child(i).ty())?;
        }
        Some(current)
    }

    pub fn inline_content(&self) -> bool {
        self.data()
            .next
            .first()
            .is_some_and(|(ty, _)| self.node_type(*ty).is_inline())
    }

    /// The first type that can be created here without extra input.
    pub fn default_type(&self) -> Option<NodeType> {
        self.edges()
            .map(|(ty, _)| ty)
            .find(|ty| !(ty.is_text() || ty.has_required_attrs()))
    }

    pub fn compatible(&self, other: &ContentMatch) -> bool {
        self.data()
            .next
            .iter()
            .any(|(a, _)| other.data().next.iter().any(|(b, _)| a == b))
    }

    /// Find nodes that, inserted before `after` (from `start_index`), make the
    /// combination match. With `to_end`, the result must also complete the
    /// content. Search is depth first over the automaton's edges.
    pub fn fill_before(&self, after: &Fragment, to_end: bool, start_index: usize) -> Option<Fragment> {
        let mut seen = vec![self.state];
        self.search_fill(after, to_end, start_index, &mut seen, &mut Vec::new())
    }

    fn search_fill(
        &self,
        after: &Fragment,
        to_end: bool,
        start_index: usize,
        seen: &mut Vec<usize>,
        types: &mut Vec<NodeType>,
    ) -> Option<Fragment> {
        let finished = self.match_fragment(after, start_index, after.child_count());
        if let Some(finished) = finished
            && (!to_end || finished.valid_end())
        {
            let mut nodes = Vec::with_capacity(types.len());
            for ty in types.iter() {
                nodes.push(ty.create_and_fill(None, Fragment::empty(), Vec::new())?);
            }
            return Some(Fragment::from_array(nodes));
        }
        for (ty, next) in self.edges() {
            if !(ty.is_text() || ty.has_required_attrs()) && !seen.contains(&next.state) {
                seen.push(next.state);
                types.push(ty);
                if let Some(found) = next.search_fill(after, to_end, start_index, seen, types) {
                    return Some(found);
                }
                types.pop();
            }
        }
        None
    }

    /// The shortest chain of wrapper types that would let `target` appear
    /// here, `Some(vec![])` when it already fits directly.
    pub fn find_wrapping(&self, target: &NodeType) -> Option<Vec<NodeType>> {
        struct Candidate {
            matcher: ContentMatch,
            ty: Option<NodeType>,
            via: Option<usize>,
        }
        let mut candidates = vec![Candidate {
            matcher: self.clone(),
            ty: None,
            via: None,
        }];
        let mut active = VecDeque::from([0]);
        let mut seen: Vec<NodeType> = Vec::new();
        while let Some(current) = active.pop_front() {
            if candidates[current].matcher.match_type(target).is_some() {
                let mut result = Vec::new();
                let mut at = Some(current);
                while let Some(i) = at {
                    if let Some(ty) = &candidates[i].ty {
                        result.push(ty.clone());
                    }
                    at = candidates[i].via;
                }
                result.reverse();
                return Some(result);
            }
            let edges: Vec<_> = candidates[current].matcher.edges().collect();
            for (ty, next) in edges {
                if !ty.is_leaf()
                    && !ty.has_required_attrs()
                    && !seen.contains(&ty)
                    && (candidates[current].ty.is_none() || next.valid_end())
                {
                    seen.push(ty.clone());
                    candidates.push(Candidate {
                        matcher: ty.content_match(),
                        ty: Some(ty),
                        via: Some(current),
                    });
                    active.push_back(candidates.len() - 1);
                }
            }
        }
        None
    }
}

impl PartialEq for ContentMatch {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.state == other.state
    }
}

impl fmt::Debug for ContentMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let next: Vec<&str> = self
            .data()
            .next
            .iter()
            .map(|(ty, _)| self.owner.schema.0.nodes[*ty].name.as_str())
            .collect();
        f.debug_struct("ContentMatch")
            .field("owner", &self.owner.name())
            .field("next", &next)
            .field("valid_end", &self.valid_end())
            .finish()
    }
}
