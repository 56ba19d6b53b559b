use super::extensions::GdExtensions;
use super::model::{
    AtomCategory, AtomContent, AtomEntry, AtomFeed, AtomLink, AtomPerson, Generator, TextConstruct,
    TextKind,
};
use super::tree::Element;
use chrono::{DateTime, Utc};

pub(crate) fn feed_from(root: &Element) -> AtomFeed {
    AtomFeed {
        id: root.atom_child_text("id"),
        title: root.atom_child("title").map(text_construct),
        subtitle: root.atom_child("subtitle").map(text_construct),
        updated: timestamp(root.atom_child("updated")),
        links: root.atom_children("link").filter_map(link).collect(),
        categories: root.atom_children("category").filter_map(category).collect(),
        authors: root.atom_children("author").map(person).collect(),
        generator: root.atom_child("generator").map(generator),
        total_results: count(root, "totalResults"),
        start_index: count(root, "startIndex"),
        items_per_page: count(root, "itemsPerPage"),
        entries: root.atom_children("entry").map(entry_from).collect(),
    }
}

pub(crate) fn entry_from(element: &Element) -> AtomEntry {
    AtomEntry {
        id: element.atom_child_text("id"),
        title: element.atom_child("title").map(text_construct),
        summary: element.atom_child("summary").map(text_construct),
        content: element.atom_child("content").map(content),
        published: timestamp(element.atom_child("published")),
        updated: timestamp(element.atom_child("updated")),
        edited: timestamp(element.child("edited")),
        links: element.atom_children("link").filter_map(link).collect(),
        categories: element.atom_children("category").filter_map(category).collect(),
        authors: element.atom_children("author").map(person).collect(),
        contributors: element.atom_children("contributor").map(person).collect(),
        extensions: GdExtensions::from_entry(element),
    }
}

fn text_construct(element: &Element) -> TextConstruct {
    let kind = TextKind::from_attr(element.attr("type"));
    let text = match kind {
        TextKind::Xhtml => element.deep_text(),
        _ => element.text.clone(),
    };
    TextConstruct {
        kind,
        text: text.trim().to_string(),
    }
}

fn content(element: &Element) -> AtomContent {
    AtomContent {
        media_type: element.attr("type").map(str::to_string),
        src: element.attr("src").map(str::to_string),
        text: element.deep_text().trim().to_string(),
    }
}

fn link(element: &Element) -> Option<AtomLink> {
    let Some(href) = element.attr("href") else {
        tracing::debug!("Ignoring link without href");
        return None;
    };
    Some(AtomLink {
        href: href.to_string(),
        rel: element.attr("rel").map(str::to_string),
        media_type: element.attr("type").map(str::to_string),
        hreflang: element.attr("hreflang").map(str::to_string),
        title: element.attr("title").map(str::to_string),
        length: element.attr("length").and_then(|l| l.parse().ok()),
    })
}

fn category(element: &Element) -> Option<AtomCategory> {
    let term = element.attr("term")?;
    Some(AtomCategory {
        term: term.to_string(),
        scheme: element.attr("scheme").map(str::to_string),
        label: element.attr("label").map(str::to_string),
    })
}

fn person(element: &Element) -> AtomPerson {
    AtomPerson {
        name: element.child_text("name").unwrap_or_default(),
        email: element.child_text("email"),
        uri: element.child_text("uri"),
    }
}

fn generator(element: &Element) -> Generator {
    Generator {
        name: element.text.trim().to_string(),
        version: element.attr("version").map(str::to_string),
        uri: element.attr("uri").map(str::to_string),
    }
}

fn timestamp(element: Option<&Element>) -> Option<DateTime<Utc>> {
    let element = element?;
    let raw = element.text.trim();
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(e) => {
            tracing::debug!(element = %element.name, value = %raw, error = %e, "Ignoring unparseable timestamp");
            None
        }
    }
}

fn count(parent: &Element, name: &str) -> Option<u64> {
    parent.child_text(name).and_then(|v| v.parse().ok())
}
