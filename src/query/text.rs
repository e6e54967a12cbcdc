//! Line-oriented catalogs: one record per line, course/section/meeting
//! lines told apart by regexes over the raw line.

use std::collections::HashMap;

use regex::Regex;

use super::{CourseDocument, DocumentQuery};

/// How lines are classified and split.
#[derive(Debug, Clone)]
pub struct TextLayout {
    pub course: Regex,
    pub section: Regex,
    /// Checked before `section` so deeper indentation can win.
    pub meeting: Option<Regex>,
    pub delimiter: String,
    pub comment: String,
}

pub const DEFAULT_COURSE_PATTERN: &str = r"^\S";
pub const DEFAULT_SECTION_PATTERN: &str = r"^\s+\S";
pub const DEFAULT_DELIMITER: &str = "\t";
pub const DEFAULT_COMMENT: &str = "#";

impl TextLayout {
    /// Tab-separated records, unindented course lines, indented sections.
    pub fn standard() -> Result<Self, String> {
        Self::new(
            DEFAULT_COURSE_PATTERN,
            DEFAULT_SECTION_PATTERN,
            None,
            DEFAULT_DELIMITER,
            DEFAULT_COMMENT,
        )
    }

    pub fn new(
        course: &str,
        section: &str,
        meeting: Option<&str>,
        delimiter: &str,
        comment: &str,
    ) -> Result<Self, String> {
        let compile = |p: &str| Regex::new(p).map_err(|e| format!("invalid pattern '{p}': {e}"));
        if delimiter.is_empty() {
            return Err("delimiter must not be empty".into());
        }
        Ok(Self {
            course: compile(course)?,
            section: compile(section)?,
            meeting: meeting.map(compile).transpose()?,
            delimiter: delimiter.to_string(),
            comment: comment.to_string(),
        })
    }
}

/// One non-blank, non-comment input line.
#[derive(Debug, Clone)]
pub struct Record {
    /// 1-based line number in the source.
    pub line: usize,
    pub raw: String,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Course,
    Section,
    Meeting,
}

/// Parsed text catalog. Units are indexes into the record list.
#[derive(Debug, Clone, Default)]
pub struct TextCatalog {
    records: Vec<Record>,
    groups: Vec<usize>,
    children: HashMap<usize, Vec<usize>>,
    skipped: Vec<usize>,
}

impl TextCatalog {
    #[must_use]
    pub fn parse(source: &str, layout: &TextLayout) -> Self {
        let mut catalog = Self::default();
        let mut course: Option<usize> = None;
        let mut section: Option<usize> = None;

        for (idx, line) in source.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty()
                || (!layout.comment.is_empty() && trimmed.starts_with(&layout.comment))
            {
                continue;
            }

            let kind = if layout.meeting.as_ref().is_some_and(|m| m.is_match(line)) {
                Kind::Meeting
            } else if layout.section.is_match(line) {
                Kind::Section
            } else if layout.course.is_match(line) {
                Kind::Course
            } else {
                tracing::debug!(line = line_no, "line matches no record pattern");
                catalog.skipped.push(line_no);
                continue;
            };

            let parent = match kind {
                Kind::Course => None,
                Kind::Section => course,
                Kind::Meeting => section,
            };
            if kind != Kind::Course && parent.is_none() {
                tracing::debug!(line = line_no, "record has no enclosing course/section");
                catalog.skipped.push(line_no);
                continue;
            }

            let unit = catalog.records.len();
            catalog.records.push(Record {
                line: line_no,
                raw: trimmed.to_string(),
                cells: trimmed
                    .split(layout.delimiter.as_str())
                    .map(|c| c.trim().to_string())
                    .collect(),
            });

            match kind {
                Kind::Course => {
                    catalog.groups.push(unit);
                    course = Some(unit);
                    section = None;
                }
                Kind::Section => section = Some(unit),
                Kind::Meeting => {}
            }
            if let Some(p) = parent {
                catalog.children.entry(p).or_default().push(unit);
            }
        }

        catalog
    }

    #[must_use]
    pub fn record(&self, unit: usize) -> Option<&Record> {
        self.records.get(unit)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Line numbers that matched no pattern or had no parent record.
    #[must_use]
    pub fn skipped_lines(&self) -> &[usize] {
        &self.skipped
    }

    fn children_of(&self, unit: usize) -> Vec<usize> {
        self.children.get(&unit).cloned().unwrap_or_default()
    }
}

impl DocumentQuery for TextCatalog {
    type Unit = usize;

    /// `$N` is the N-th cell (1-based), `$0` the whole line, and
    /// `re:PATTERN` every match of PATTERN (capture group 1 if present).
    fn evaluate(&self, unit: usize, expression: &str) -> Result<Vec<String>, String> {
        let record = self
            .records
            .get(unit)
            .ok_or_else(|| format!("no record for unit {unit}"))?;
        let expr = expression.trim();

        if let Some(pattern) = expr.strip_prefix("re:") {
            let re = Regex::new(pattern).map_err(|e| format!("invalid pattern: {e}"))?;
            return Ok(re
                .captures_iter(&record.raw)
                .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
                .map(|m| m.as_str().trim().to_string())
                .filter(|v| !v.is_empty())
                .collect());
        }

        if let Some(column) = expr.strip_prefix('$') {
            let n: usize = column
                .parse()
                .map_err(|_| format!("invalid column reference '{expr}'"))?;
            let value = if n == 0 {
                Some(record.raw.as_str())
            } else {
                record.cells.get(n - 1).map(String::as_str)
            };
            return Ok(value
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .into_iter()
                .collect());
        }

        Err(format!("unsupported text query '{expr}'"))
    }

    fn unit_id(&self, unit: usize) -> Option<String> {
        self.records
            .get(unit)
            .and_then(|r| r.cells.first())
            .filter(|c| !c.is_empty())
            .cloned()
    }
}

impl CourseDocument for TextCatalog {
    fn groups(&self) -> Vec<usize> {
        self.groups.clone()
    }

    fn members(&self, group: usize) -> Vec<usize> {
        let mut members = vec![group];
        members.extend(self.children_of(group));
        members
    }

    fn meetings(&self, section: usize) -> Vec<usize> {
        self.children_of(section)
    }
}
