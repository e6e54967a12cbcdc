use crate::models::scope::ConfigScope;
use crate::query::markup::{Dialect, MarkupCatalog, MarkupDocument, MarkupLayout};
use crate::query::text::{
    TextCatalog, TextLayout, DEFAULT_COMMENT, DEFAULT_COURSE_PATTERN, DEFAULT_DELIMITER,
    DEFAULT_SECTION_PATTERN,
};
use crate::query::CourseDocument;

/// Turns raw input into a decomposable document.
///
/// `routine` is the profile's `[routine]` node, if any.
pub trait DocumentLoader: Send + Sync {
    type Document: CourseDocument + 'static;

    fn load(&self, source: &str, routine: Option<&ConfigScope>) -> Result<Self::Document, String>;
}

/// Line-oriented catalogs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    type Document = TextCatalog;

    fn load(&self, source: &str, routine: Option<&ConfigScope>) -> Result<TextCatalog, String> {
        let setting = |key: &str| routine.and_then(|r| r.get(key));
        let layout = TextLayout::new(
            setting("course_pattern").unwrap_or(DEFAULT_COURSE_PATTERN),
            setting("section_pattern").unwrap_or(DEFAULT_SECTION_PATTERN),
            setting("meeting_pattern").filter(|p| !p.is_empty()),
            setting("delimiter").unwrap_or(DEFAULT_DELIMITER),
            setting("comment").unwrap_or(DEFAULT_COMMENT),
        )?;

        let catalog = TextCatalog::parse(source, &layout);
        if !catalog.skipped_lines().is_empty() {
            tracing::warn!(
                skipped = catalog.skipped_lines().len(),
                "some lines matched no record pattern"
            );
        }
        Ok(catalog)
    }
}

/// HTML or XML catalogs.
#[derive(Debug, Clone, Copy)]
pub struct MarkupLoader {
    dialect: Dialect,
}

impl MarkupLoader {
    #[must_use]
    pub fn html() -> Self {
        Self {
            dialect: Dialect::Html,
        }
    }

    #[must_use]
    pub fn xml() -> Self {
        Self {
            dialect: Dialect::Xml,
        }
    }
}

impl DocumentLoader for MarkupLoader {
    type Document = MarkupCatalog;

    fn load(&self, source: &str, routine: Option<&ConfigScope>) -> Result<MarkupCatalog, String> {
        let doc = MarkupDocument::parse(source, self.dialect)?;
        if !doc.error_lines().is_empty() {
            tracing::warn!(
                lines = ?doc.error_lines(),
                "markup has syntax errors, continuing with recovered tree"
            );
        }
        if doc.element_count() == 0 {
            return Err("document contains no elements".into());
        }

        let mut layout = MarkupLayout::default();
        if let Some(r) = routine {
            if let Some(group) = r.get("group") {
                layout.group = group.to_string();
            }
            if let Some(section) = r.get("section") {
                layout.section = section.to_string();
            }
            if let Some(meeting) = r.get("meeting") {
                layout.meeting = Some(meeting.to_string()).filter(|m| !m.is_empty());
            }
        }
        MarkupCatalog::new(doc, &layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::DocumentQuery;

    #[test]
    fn text_loader_reads_routine_settings() {
        let mut scope = ConfigScope::root();
        scope
            .set("routine/delimiter", "|")
            .set("routine/section_pattern", r"^-");
        let catalog = TextLoader
            .load("CS1|Intro\n-|001|A1\n", scope.node("routine"))
            .unwrap();
        let members = catalog.members(catalog.groups()[0]);
        assert_eq!(members.len(), 2);
        assert_eq!(catalog.evaluate(members[1], "$3").unwrap(), vec!["A1"]);
    }

    #[test]
    fn text_loader_rejects_bad_pattern() {
        let mut scope = ConfigScope::root();
        scope.set("routine/course_pattern", "(");
        assert!(TextLoader.load("x", scope.node("routine")).is_err());
    }

    #[test]
    fn text_loader_falls_back_to_standard_layout() {
        let catalog = TextLoader
            .load("# fall term\nCS1\tIntro\n\t001\tA1\n", None)
            .unwrap();
        assert_eq!(catalog.groups().len(), 1);
        let members = catalog.members(catalog.groups()[0]);
        assert_eq!(catalog.evaluate(members[0], "$2").unwrap(), vec!["Intro"]);
        assert_eq!(catalog.evaluate(members[1], "$1").unwrap(), vec!["001"]);
    }

    #[test]
    fn markup_loader_uses_layout_overrides() {
        let mut scope = ConfigScope::root();
        scope
            .set("routine/group", "//div[@class='course']")
            .set("routine/section", "table/tr")
            .set("routine/meeting", "");
        let html = r#"<html><body>
<div class="course" id="CS1"><h2>Intro</h2><table><tr><td>A1</td></tr><tr><td>B2</td></tr></table></div>
</body></html>"#;
        let catalog = MarkupLoader::html().load(html, scope.node("routine")).unwrap();
        let groups = catalog.groups();
        assert_eq!(groups.len(), 1);
        let members = catalog.members(groups[0]);
        assert_eq!(members.len(), 3);
        assert!(catalog.meetings(members[1]).is_empty());
        assert_eq!(catalog.evaluate(members[2], "td").unwrap(), vec!["B2"]);
    }

    #[test]
    fn markup_loader_rejects_empty_document() {
        assert!(MarkupLoader::xml().load("just text", None).is_err());
    }
}
