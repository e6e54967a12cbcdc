//! HTML/XML documents for the markup routines.
//!
//! Parsing is delegated to tree-sitter's HTML grammar, which tolerates the
//! tag soup found in published course listings and reads well-formed XML as
//! plain nested elements. The syntax tree is lowered once into an owned
//! arena so units can be shared freely across worker threads.

use std::collections::{BTreeSet, HashSet};

use tree_sitter::{Language, Node, Parser};

use super::path::{self, PathExpr, Query, Terminal};
use super::{CourseDocument, DocumentQuery};

/// Position of an element in the arena. Ids follow document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Markup flavour; decides tag case handling and input clean-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Html,
    Xml,
}

#[derive(Debug, Clone)]
enum Content {
    Element(NodeId),
    Text(String),
}

#[derive(Debug, Clone)]
struct Element {
    tag: String,
    attrs: Vec<(String, String)>,
    parent: Option<NodeId>,
    content: Vec<Content>,
}

/// Owned element tree. Node 0 is a synthetic `#document` root.
#[derive(Debug, Clone)]
pub struct MarkupDocument {
    dialect: Dialect,
    nodes: Vec<Element>,
    error_lines: Vec<u32>,
}

impl MarkupDocument {
    pub fn parse(source: &str, dialect: Dialect) -> Result<Self, String> {
        let cleaned;
        let source = match dialect {
            Dialect::Html => source,
            Dialect::Xml => {
                cleaned = prepare_xml(source);
                cleaned.as_str()
            }
        };

        let language: Language = tree_sitter_html::LANGUAGE.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| format!("failed to set HTML language: {e}"))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| "tree-sitter parse returned None".to_string())?;

        let mut doc = Self {
            dialect,
            nodes: vec![Element {
                tag: "#document".into(),
                attrs: Vec::new(),
                parent: None,
                content: Vec::new(),
            }],
            error_lines: Vec::new(),
        };
        let root = tree.root_node();
        if root.has_error() {
            doc.error_lines = find_error_lines(root);
        }
        doc.lower_children(root, source.as_bytes(), NodeId(0));
        Ok(doc)
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of elements, excluding the document root.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// 1-based lines where the grammar reported errors.
    #[must_use]
    pub fn error_lines(&self) -> &[u32] {
        &self.error_lines
    }

    #[must_use]
    pub fn tag(&self, id: NodeId) -> &str {
        &self.nodes[id.0].tag
    }

    #[must_use]
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        let name = self.normalize_name(name);
        self.nodes[id.0]
            .attrs
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Whether `id`'s tag equals `name` under the dialect's case rules.
    #[must_use]
    pub fn tag_is(&self, id: NodeId, name: &str) -> bool {
        self.nodes[id.0].tag == self.normalize_name(name)
    }

    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0].content.iter().filter_map(|c| match c {
            Content::Element(child) => Some(*child),
            Content::Text(_) => None,
        })
    }

    /// All elements below `id` in document order.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.child_elements(id).collect();
        stack.reverse();
        while let Some(next) = stack.pop() {
            out.push(next);
            let mut children: Vec<NodeId> = self.child_elements(next).collect();
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Whitespace-normalised text of `id` and everything below it.
    #[must_use]
    pub fn text(&self, id: NodeId) -> String {
        let mut raw = String::new();
        self.collect_text(id, &mut raw);
        normalize_ws(&raw)
    }

    /// Whitespace-normalised text directly inside `id`.
    #[must_use]
    pub fn own_text(&self, id: NodeId) -> String {
        let raw: String = self.nodes[id.0]
            .content
            .iter()
            .filter_map(|c| match c {
                Content::Text(t) => Some(t.as_str()),
                Content::Element(_) => None,
            })
            .collect();
        normalize_ws(&raw)
    }

    /// Select element nodes for a path that must end on elements.
    pub fn select(&self, context: NodeId, expression: &str) -> Result<Vec<NodeId>, String> {
        let query = path::parse_query(expression)?;
        match query {
            Query::Select(p) if p.terminal == Terminal::Content => Ok(self.select_path(context, &p)),
            _ => Err(format!("'{expression}' does not select elements")),
        }
    }

    fn select_path(&self, context: NodeId, expr: &PathExpr) -> Vec<NodeId> {
        let start = if expr.absolute { self.root() } else { context };
        let mut current = vec![start];
        for step in &expr.steps {
            let mut next = Vec::new();
            let mut seen = HashSet::new();
            for &node in &current {
                for hit in step.apply(self, node) {
                    if seen.insert(hit) {
                        next.push(hit);
                    }
                }
            }
            next.sort_unstable();
            current = next;
        }
        current
    }

    fn terminal_value(&self, node: NodeId, terminal: &Terminal) -> Option<String> {
        match terminal {
            Terminal::Content => Some(self.text(node)),
            Terminal::OwnText => Some(self.own_text(node)),
            Terminal::Name => Some(self.tag(node).to_string()),
            Terminal::Attr(name) => self.attr(node, name).map(normalize_ws),
        }
    }

    fn normalize_name<'a>(&self, name: &'a str) -> std::borrow::Cow<'a, str> {
        match self.dialect {
            Dialect::Html => std::borrow::Cow::Owned(name.to_ascii_lowercase()),
            Dialect::Xml => std::borrow::Cow::Borrowed(name),
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let mut stack: Vec<std::slice::Iter<'_, Content>> = vec![self.nodes[id.0].content.iter()];
        while let Some(top) = stack.last_mut() {
            match top.next() {
                Some(Content::Text(t)) => out.push_str(t),
                Some(Content::Element(child)) => stack.push(self.nodes[child.0].content.iter()),
                None => {
                    stack.pop();
                }
            }
        }
    }

    // ── tree-sitter lowering ────────────────────────────────────

    /// Appends everything below `node` to `parent`, preorder, so ids follow
    /// document order. Iterative: nesting depth is bounded only by memory.
    fn lower_children(&mut self, node: Node, src: &[u8], parent: NodeId) {
        let mut stack: Vec<(Node, NodeId)> = Vec::new();
        push_children(&mut stack, node, parent);

        while let Some((child, parent)) = stack.pop() {
            match child.kind() {
                "element" | "script_element" | "style_element" => {
                    let mut cursor = child.walk();
                    let tag_node = child
                        .children(&mut cursor)
                        .find(|c| matches!(c.kind(), "start_tag" | "self_closing_tag"));
                    let Some(tag_node) = tag_node else {
                        push_children(&mut stack, child, parent);
                        continue;
                    };

                    let (tag, attrs) = self.read_tag(tag_node, src);
                    let id = NodeId(self.nodes.len());
                    self.nodes.push(Element {
                        tag,
                        attrs,
                        parent: Some(parent),
                        content: Vec::new(),
                    });
                    self.nodes[parent.0].content.push(Content::Element(id));
                    push_children(&mut stack, child, id);
                }
                "text" | "raw_text" | "entity" => {
                    let text = spaced_text(child, src);
                    if !text.is_empty() {
                        self.nodes[parent.0].content.push(Content::Text(text));
                    }
                }
                "ERROR" => push_children(&mut stack, child, parent),
                _ => {}
            }
        }
    }

    fn read_tag(&self, tag_node: Node, src: &[u8]) -> (String, Vec<(String, String)>) {
        let mut tag = String::new();
        let mut attrs = Vec::new();
        let mut cursor = tag_node.walk();
        for part in tag_node.children(&mut cursor) {
            match part.kind() {
                "tag_name" => tag = self.normalize_name(node_text(part, src)).into_owned(),
                "attribute" => {
                    let mut name = String::new();
                    let mut value = String::new();
                    let mut inner = part.walk();
                    for piece in part.children(&mut inner) {
                        match piece.kind() {
                            "attribute_name" => {
                                name = self.normalize_name(node_text(piece, src)).into_owned();
                            }
                            "attribute_value" | "quoted_attribute_value" => {
                                let raw = node_text(piece, src);
                                value = decode_entities(raw.trim_matches('"').trim_matches('\''));
                            }
                            _ => {}
                        }
                    }
                    if !name.is_empty() {
                        attrs.push((name, value));
                    }
                }
                _ => {}
            }
        }
        (tag, attrs)
    }
}

impl DocumentQuery for MarkupDocument {
    type Unit = NodeId;

    fn evaluate(&self, unit: NodeId, expression: &str) -> Result<Vec<String>, String> {
        let query = path::parse_query(expression)?;
        let values = match query {
            Query::Select(p) | Query::NameOf(p) => self
                .select_path(unit, &p)
                .into_iter()
                .filter_map(|n| self.terminal_value(n, &p.terminal))
                .filter(|v| !v.is_empty())
                .collect(),
            Query::Count(p) => {
                let count = self
                    .select_path(unit, &p)
                    .into_iter()
                    .filter_map(|n| self.terminal_value(n, &p.terminal))
                    .count();
                vec![count.to_string()]
            }
        };
        Ok(values)
    }

    fn unit_id(&self, unit: NodeId) -> Option<String> {
        self.attr(unit, "id").map(str::to_string)
    }
}

/// Where course, section and meeting elements sit in a markup catalog.
#[derive(Debug, Clone)]
pub struct MarkupLayout {
    pub group: String,
    pub section: String,
    pub meeting: Option<String>,
}

impl Default for MarkupLayout {
    fn default() -> Self {
        Self {
            group: "//course".into(),
            section: "section".into(),
            meeting: Some("meeting".into()),
        }
    }
}

/// A markup document plus the selections that decompose it into courses.
#[derive(Debug, Clone)]
pub struct MarkupCatalog {
    doc: MarkupDocument,
    groups: Vec<NodeId>,
    section_path: String,
    meeting_path: Option<String>,
}

impl MarkupCatalog {
    /// Resolve the group selection up front; a bad layout path fails here.
    pub fn new(doc: MarkupDocument, layout: &MarkupLayout) -> Result<Self, String> {
        let groups = doc.select(doc.root(), &layout.group)?;
        doc.select(doc.root(), &layout.section)?;
        if let Some(meeting) = &layout.meeting {
            doc.select(doc.root(), meeting)?;
        }
        Ok(Self {
            doc,
            groups,
            section_path: layout.section.clone(),
            meeting_path: layout.meeting.clone(),
        })
    }

    #[must_use]
    pub fn document(&self) -> &MarkupDocument {
        &self.doc
    }
}

impl DocumentQuery for MarkupCatalog {
    type Unit = NodeId;

    fn evaluate(&self, unit: NodeId, expression: &str) -> Result<Vec<String>, String> {
        self.doc.evaluate(unit, expression)
    }

    fn unit_id(&self, unit: NodeId) -> Option<String> {
        self.doc.unit_id(unit)
    }
}

impl CourseDocument for MarkupCatalog {
    fn groups(&self) -> Vec<NodeId> {
        self.groups.clone()
    }

    fn members(&self, group: NodeId) -> Vec<NodeId> {
        let mut members = vec![group];
        members.extend(self.doc.select(group, &self.section_path).unwrap_or_default());
        members
    }

    fn meetings(&self, section: NodeId) -> Vec<NodeId> {
        self.meeting_path
            .as_deref()
            .and_then(|p| self.doc.select(section, p).ok())
            .unwrap_or_default()
    }
}

fn node_text<'a>(node: Node, src: &'a [u8]) -> &'a str {
    node.utf8_text(src).unwrap_or("")
}

/// Decoded text of a text node, keeping one space where the source had
/// whitespace next to it so adjacent inline runs don't fuse.
fn spaced_text(node: Node, src: &[u8]) -> String {
    let mut text = String::new();
    let start = node.start_byte();
    let end = node.end_byte();
    if start > 0 && src[start - 1].is_ascii_whitespace() {
        text.push(' ');
    }
    text.push_str(&decode_entities(node_text(node, src)));
    if end < src.len() && src[end].is_ascii_whitespace() {
        text.push(' ');
    }
    text
}

/// Collapse runs of whitespace and trim.
#[must_use]
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the character references that show up in catalog listings.
#[must_use]
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&tail[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        "ndash" => Some('\u{2013}'),
        "mdash" => Some('\u{2014}'),
        _ => None,
    }
}

/// Drop XML declarations and processing instructions, and turn CDATA
/// sections into escaped text the HTML grammar can read.
fn prepare_xml(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    loop {
        let pi = rest.find("<?");
        let cdata = rest.find("<![CDATA[");
        match (pi, cdata) {
            (Some(p), c) if c.map_or(true, |c| p < c) => {
                out.push_str(&rest[..p]);
                rest = rest[p..].find("?>").map_or("", |end| &rest[p + end + 2..]);
            }
            (_, Some(c)) => {
                out.push_str(&rest[..c]);
                let body = &rest[c + 9..];
                let end = body.find("]]>").unwrap_or(body.len());
                out.push_str(
                    &body[..end]
                        .replace('&', "&amp;")
                        .replace('<', "&lt;")
                        .replace('>', "&gt;"),
                );
                rest = body.get(end + 3..).unwrap_or("");
            }
            _ => break,
        }
    }
    out.push_str(rest);
    out
}

/// 1-based line numbers of ERROR/MISSING nodes.
fn find_error_lines(root: Node) -> Vec<u32> {
    let mut errors = BTreeSet::new();
    let mut cursor = root.walk();

    'walk: loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            errors.insert(node.start_position().row as u32 + 1);
        }
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                continue 'walk;
            }
            if !cursor.goto_parent() {
                break 'walk;
            }
        }
    }

    errors.into_iter().collect()
}

/// Queue `node`'s children for lowering into `parent`, first child on top.
fn push_children<'t>(stack: &mut Vec<(Node<'t>, NodeId)>, node: Node<'t>, parent: NodeId) {
    let mut cursor = node.walk();
    let start = stack.len();
    stack.extend(node.children(&mut cursor).map(|c| (c, parent)));
    stack[start..].reverse();
}
