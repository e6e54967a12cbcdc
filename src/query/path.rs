//! The small path language understood by the markup evaluator.
//!
//! ```text
//! query     := "name-of(" path ")" | "count(" path ")" | path
//! path      := ["/" | "//"] step (("/" | "//") step)* ["/" terminal] | terminal
//! step      := "." | ".." | "*" | NAME predicate*
//! predicate := "[" N "]" | "[@" NAME "]" | "[@" NAME "=" QUOTED "]"
//! terminal  := "@" NAME | "text()" | "name()"
//! ```
//!
//! A path that ends on elements yields each element's normalised text.

use super::markup::{MarkupDocument, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Select(PathExpr),
    /// Display name of the selected nodes (their normalised text).
    NameOf(PathExpr),
    Count(PathExpr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    /// Starts at the document root instead of the context unit.
    pub absolute: bool,
    pub steps: Vec<Step>,
    pub terminal: Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    SelfNode,
    Parent,
    Any,
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// 1-based position among the step's matches for one context node.
    Position(usize),
    HasAttr(String),
    AttrEq(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Content,
    OwnText,
    Name,
    Attr(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Predicate>,
}

impl Step {
    /// Nodes reached from `node` through this step, in document order.
    pub fn apply(&self, doc: &MarkupDocument, node: NodeId) -> Vec<NodeId> {
        let candidates: Vec<NodeId> = match (&self.test, self.axis) {
            (NodeTest::SelfNode, _) => vec![node],
            (NodeTest::Parent, _) => doc.parent(node).into_iter().collect(),
            (NodeTest::Any, Axis::Child) => doc.child_elements(node).collect(),
            (NodeTest::Any, Axis::Descendant) => doc.descendants(node),
            (NodeTest::Name(name), Axis::Child) => doc
                .child_elements(node)
                .filter(|&c| doc.tag_is(c, name))
                .collect(),
            (NodeTest::Name(name), Axis::Descendant) => doc
                .descendants(node)
                .into_iter()
                .filter(|&c| doc.tag_is(c, name))
                .collect(),
        };

        self.predicates
            .iter()
            .fold(candidates, |nodes, predicate| match predicate {
                Predicate::Position(n) => nodes.get(n - 1).copied().into_iter().collect(),
                Predicate::HasAttr(attr) => nodes
                    .into_iter()
                    .filter(|&c| doc.attr(c, attr).is_some())
                    .collect(),
                Predicate::AttrEq(attr, value) => nodes
                    .into_iter()
                    .filter(|&c| doc.attr(c, attr) == Some(value.as_str()))
                    .collect(),
            })
    }
}

pub fn parse_query(expression: &str) -> Result<Query, String> {
    let expr = expression.trim();
    if expr.is_empty() {
        return Err("empty query".into());
    }
    if let Some(inner) = function_arg(expr, "name-of") {
        return parse_path(inner).map(Query::NameOf);
    }
    if let Some(inner) = function_arg(expr, "count") {
        return parse_path(inner).map(Query::Count);
    }
    parse_path(expr).map(Query::Select)
}

fn function_arg<'a>(expr: &'a str, name: &str) -> Option<&'a str> {
    expr.strip_prefix(name)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
}

pub fn parse_path(expression: &str) -> Result<PathExpr, String> {
    let mut rest = expression.trim();
    if rest.is_empty() {
        return Err("empty path".into());
    }

    let mut absolute = false;
    let mut first_axis = Axis::Child;
    if let Some(r) = rest.strip_prefix("//") {
        first_axis = Axis::Descendant;
        rest = r;
    } else if let Some(r) = rest.strip_prefix('/') {
        absolute = true;
        if let Some(r2) = r.strip_prefix("//") {
            first_axis = Axis::Descendant;
            rest = r2;
        } else {
            rest = r;
        }
    }

    let segments = split_segments(rest, first_axis)?;
    let mut steps = Vec::new();
    let mut terminal = Terminal::Content;

    let count = segments.len();
    for (i, (axis, segment)) in segments.into_iter().enumerate() {
        if let Some(t) = parse_terminal(segment)? {
            if i + 1 != count {
                return Err(format!("'{segment}' must be the last part of a path"));
            }
            if axis == Axis::Descendant {
                return Err(format!("'{segment}' cannot follow '//'"));
            }
            terminal = t;
        } else {
            steps.push(parse_step(axis, segment)?);
        }
    }

    if steps.is_empty() && terminal == Terminal::Content && !absolute {
        return Err(format!("'{expression}' selects nothing"));
    }

    Ok(PathExpr {
        absolute,
        steps,
        terminal,
    })
}

/// Split on `/` outside brackets and quotes; `//` marks the next segment
/// as a descendant step.
fn split_segments(path: &str, first_axis: Axis) -> Result<Vec<(Axis, &str)>, String> {
    if path.is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut axis = first_axis;
    let bytes = path.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| format!("unbalanced ']' in '{path}'"))?;
            }
            (None, '/') if depth == 0 => {
                let segment = path[start..i].trim();
                if segment.is_empty() {
                    return Err(format!("empty step in '{path}'"));
                }
                segments.push((axis, segment));
                if bytes.get(i + 1) == Some(&b'/') {
                    axis = Axis::Descendant;
                    i += 1;
                } else {
                    axis = Axis::Child;
                }
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }

    if quote.is_some() {
        return Err(format!("unterminated quote in '{path}'"));
    }
    if depth != 0 {
        return Err(format!("unbalanced '[' in '{path}'"));
    }
    let last = path[start..].trim();
    if last.is_empty() {
        return Err(format!("path '{path}' ends with '/'"));
    }
    segments.push((axis, last));
    Ok(segments)
}

fn parse_terminal(segment: &str) -> Result<Option<Terminal>, String> {
    if let Some(attr) = segment.strip_prefix('@') {
        if !is_name(attr) {
            return Err(format!("invalid attribute name '{attr}'"));
        }
        return Ok(Some(Terminal::Attr(attr.to_string())));
    }
    Ok(match segment {
        "text()" => Some(Terminal::OwnText),
        "name()" => Some(Terminal::Name),
        _ => None,
    })
}

fn parse_step(axis: Axis, segment: &str) -> Result<Step, String> {
    let (head, mut preds) = match segment.find('[') {
        Some(pos) => (segment[..pos].trim(), &segment[pos..]),
        None => (segment, ""),
    };

    let test = match head {
        "." => NodeTest::SelfNode,
        ".." => NodeTest::Parent,
        "*" => NodeTest::Any,
        name if is_name(name) => NodeTest::Name(name.to_string()),
        other => return Err(format!("invalid step '{other}'")),
    };
    if axis == Axis::Descendant && matches!(test, NodeTest::SelfNode | NodeTest::Parent) {
        return Err(format!("'{head}' cannot follow '//'"));
    }

    let mut predicates = Vec::new();
    while !preds.is_empty() {
        let body_end = closing_bracket(preds)
            .ok_or_else(|| format!("unbalanced predicate in '{segment}'"))?;
        predicates.push(parse_predicate(preds[1..body_end].trim())?);
        preds = preds[body_end + 1..].trim_start();
        if !preds.is_empty() && !preds.starts_with('[') {
            return Err(format!("unexpected '{preds}' after predicate"));
        }
    }

    Ok(Step {
        axis,
        test,
        predicates,
    })
}

/// Index of the `]` closing the predicate that starts at `s[0]`.
fn closing_bracket(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_predicate(body: &str) -> Result<Predicate, String> {
    if let Ok(n) = body.parse::<usize>() {
        if n == 0 {
            return Err("positions are 1-based".into());
        }
        return Ok(Predicate::Position(n));
    }
    let Some(attr) = body.strip_prefix('@') else {
        return Err(format!("unsupported predicate '[{body}]'"));
    };
    match attr.split_once('=') {
        None if is_name(attr.trim()) => Ok(Predicate::HasAttr(attr.trim().to_string())),
        None => Err(format!("invalid attribute name '{attr}'")),
        Some((name, value)) => {
            let name = name.trim();
            let value = value.trim();
            let unquoted = value
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
                .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
                .ok_or_else(|| format!("predicate value must be quoted: {value}"))?;
            if !is_name(name) {
                return Err(format!("invalid attribute name '{name}'"));
            }
            Ok(Predicate::AttrEq(name.to_string(), unquoted.to_string()))
        }
    }
}

fn is_name(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        && !s.starts_with('.')
}
