use super::extensions::GdExtensions;
use chrono::{DateTime, Utc};
use std::hash::{Hash, Hasher};

pub const REL_SELF: &str = "self";
pub const REL_EDIT: &str = "edit";
pub const REL_NEXT: &str = "next";
pub const REL_PREVIOUS: &str = "previous";
pub const REL_ALTERNATE: &str = "alternate";
/// GData link to the feed itself, for reads.
pub const REL_FEED: &str = "http://schemas.google.com/g/2005#feed";
/// GData link new entries are POSTed to.
pub const REL_POST: &str = "http://schemas.google.com/g/2005#post";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextKind {
    #[default]
    Text,
    Html,
    Xhtml,
}

impl TextKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TextKind::Text => "text",
            TextKind::Html => "html",
            TextKind::Xhtml => "xhtml",
        }
    }

    /// Unknown or missing `type` attributes mean plain text.
    pub fn from_attr(value: Option<&str>) -> Self {
        match value {
            Some("html") => TextKind::Html,
            Some("xhtml") => TextKind::Xhtml,
            _ => TextKind::Text,
        }
    }
}

/// Atom text construct (`title`, `subtitle`, `summary`, `rights`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextConstruct {
    pub kind: TextKind,
    pub text: String,
}

impl TextConstruct {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            kind: TextKind::Text,
            text: text.into(),
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            kind: TextKind::Html,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AtomLink {
    pub href: String,
    pub rel: Option<String>,
    pub media_type: Option<String>,
    pub hreflang: Option<String>,
    pub title: Option<String>,
    pub length: Option<u64>,
}

impl AtomLink {
    pub fn new(rel: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            rel: Some(rel.into()),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// A link without `rel` is an alternate link.
    pub fn rel_or_default(&self) -> &str {
        self.rel.as_deref().unwrap_or(REL_ALTERNATE)
    }
}

/// Category; two categories are the same when term and scheme match.
#[derive(Debug, Clone, Default)]
pub struct AtomCategory {
    pub term: String,
    pub scheme: Option<String>,
    pub label: Option<String>,
}

impl AtomCategory {
    pub fn new(term: impl Into<String>, scheme: Option<&str>) -> Self {
        Self {
            term: term.into(),
            scheme: scheme.map(str::to_string),
            label: None,
        }
    }
}

impl PartialEq for AtomCategory {
    fn eq(&self, other: &Self) -> bool {
        self.term == other.term && self.scheme == other.scheme
    }
}

impl Eq for AtomCategory {}

impl Hash for AtomCategory {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.term.hash(state);
        self.scheme.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AtomPerson {
    pub name: String,
    pub email: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AtomContent {
    pub media_type: Option<String>,
    /// Out-of-line content location; `text` is empty when set.
    pub src: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Generator {
    pub name: String,
    pub version: Option<String>,
    pub uri: Option<String>,
}

/// Link lookups shared by feeds and entries.
pub trait Links {
    fn links(&self) -> &[AtomLink];

    /// First link with the given rel and, when given, media type.
    fn find_link(&self, rel: &str, media_type: Option<&str>) -> Option<&AtomLink> {
        self.links().iter().find(|link| {
            link.rel_or_default() == rel
                && match media_type {
                    Some(t) => link.media_type.as_deref() == Some(t),
                    None => true,
                }
        })
    }

    fn self_link(&self) -> Option<&AtomLink> {
        self.find_link(REL_SELF, None)
    }

    fn edit_link(&self) -> Option<&AtomLink> {
        self.find_link(REL_EDIT, None)
    }

    fn next_link(&self) -> Option<&AtomLink> {
        self.find_link(REL_NEXT, None)
    }

    fn alternate_link(&self) -> Option<&AtomLink> {
        self.find_link(REL_ALTERNATE, None)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AtomEntry {
    pub id: Option<String>,
    pub title: Option<TextConstruct>,
    pub summary: Option<TextConstruct>,
    pub content: Option<AtomContent>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    /// `app:edited`, the last time the entry was changed through the API.
    pub edited: Option<DateTime<Utc>>,
    pub links: Vec<AtomLink>,
    pub categories: Vec<AtomCategory>,
    pub authors: Vec<AtomPerson>,
    pub contributors: Vec<AtomPerson>,
    pub extensions: GdExtensions,
}

impl AtomEntry {
    pub fn title_text(&self) -> &str {
        self.title.as_ref().map(|t| t.text.as_str()).unwrap_or("")
    }
}

impl Links for AtomEntry {
    fn links(&self) -> &[AtomLink] {
        &self.links
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AtomFeed {
    pub id: Option<String>,
    pub title: Option<TextConstruct>,
    pub subtitle: Option<TextConstruct>,
    pub updated: Option<DateTime<Utc>>,
    pub links: Vec<AtomLink>,
    pub categories: Vec<AtomCategory>,
    pub authors: Vec<AtomPerson>,
    pub generator: Option<Generator>,
    /// OpenSearch `totalResults`.
    pub total_results: Option<u64>,
    /// OpenSearch `startIndex` (1-based).
    pub start_index: Option<u64>,
    /// OpenSearch `itemsPerPage`.
    pub items_per_page: Option<u64>,
    pub entries: Vec<AtomEntry>,
}

impl AtomFeed {
    pub fn title_text(&self) -> &str {
        self.title.as_ref().map(|t| t.text.as_str()).unwrap_or("")
    }

    /// The link new entries are POSTed to.
    pub fn post_link(&self) -> Option<&AtomLink> {
        self.find_link(REL_POST, None)
    }
}

impl Links for AtomFeed {
    fn links(&self) -> &[AtomLink] {
        &self.links
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_category_equality_ignores_label() {
        let mut a = AtomCategory::new("friends", Some("http://schemas.google.com/g/2005#kind"));
        let b = AtomCategory::new("friends", Some("http://schemas.google.com/g/2005#kind"));
        a.label = Some("Friends".to_string());
        assert_eq!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_category_scheme_matters() {
        assert_ne!(
            AtomCategory::new("work", None),
            AtomCategory::new("work", Some("urn:labels"))
        );
    }

    #[test]
    fn test_link_lookup() {
        let entry = AtomEntry {
            links: vec![
                AtomLink {
                    href: "https://example.com/e/1".to_string(),
                    ..AtomLink::default()
                },
                AtomLink::new(REL_EDIT, "https://example.com/e/1/edit"),
                AtomLink::new(REL_SELF, "https://example.com/e/1.json").with_type("application/json"),
                AtomLink::new(REL_SELF, "https://example.com/e/1.atom")
                    .with_type("application/atom+xml"),
            ],
            ..AtomEntry::default()
        };

        assert_eq!(entry.alternate_link().unwrap().href, "https://example.com/e/1");
        assert_eq!(entry.edit_link().unwrap().href, "https://example.com/e/1/edit");
        assert_eq!(
            entry
                .find_link(REL_SELF, Some("application/atom+xml"))
                .unwrap()
                .href,
            "https://example.com/e/1.atom"
        );
        assert!(entry.next_link().is_none());
    }

    #[test]
    fn test_text_kind_from_attr() {
        assert_eq!(TextKind::from_attr(Some("html")), TextKind::Html);
        assert_eq!(TextKind::from_attr(Some("xhtml")), TextKind::Xhtml);
        assert_eq!(TextKind::from_attr(Some("text")), TextKind::Text);
        assert_eq!(TextKind::from_attr(None), TextKind::Text);
    }
}
