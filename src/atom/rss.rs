use super::model::{
    AtomCategory, AtomContent, AtomEntry, AtomFeed, AtomLink, AtomPerson, Generator, TextConstruct,
};
use super::AtomError;
use feed_rs::model;
use feed_rs::parser;

/// Parses an RSS (or RDF) document with `feed-rs` and maps it onto the Atom model.
pub(crate) fn parse_rss(bytes: &[u8]) -> Result<AtomFeed, AtomError> {
    let feed = parser::parse(bytes).map_err(|e| AtomError::Rss(e.to_string()))?;

    Ok(AtomFeed {
        id: non_empty(feed.id),
        title: feed.title.map(text),
        subtitle: feed.description.map(text),
        updated: feed.updated,
        links: feed.links.into_iter().map(link).collect(),
        categories: feed.categories.into_iter().map(category).collect(),
        authors: feed.authors.into_iter().map(person).collect(),
        generator: feed.generator.map(|g| Generator {
            name: g.content,
            version: g.version,
            uri: g.uri,
        }),
        total_results: None,
        start_index: None,
        items_per_page: None,
        entries: feed.entries.into_iter().map(entry).collect(),
    })
}

fn entry(entry: model::Entry) -> AtomEntry {
    AtomEntry {
        id: non_empty(entry.id),
        title: entry.title.map(text),
        summary: entry.summary.map(text),
        content: entry.content.map(|c| AtomContent {
            media_type: Some(c.content_type.to_string()),
            src: c.src.map(|l| l.href),
            text: c.body.unwrap_or_default(),
        }),
        published: entry.published,
        updated: entry.updated,
        edited: None,
        links: entry.links.into_iter().map(link).collect(),
        categories: entry.categories.into_iter().map(category).collect(),
        authors: entry.authors.into_iter().map(person).collect(),
        contributors: entry.contributors.into_iter().map(person).collect(),
        extensions: Default::default(),
    }
}

fn text(text: model::Text) -> TextConstruct {
    if text.content_type.subty() == "html" {
        TextConstruct::html(text.content)
    } else {
        TextConstruct::plain(text.content)
    }
}

fn link(link: model::Link) -> AtomLink {
    AtomLink {
        href: link.href,
        rel: link.rel,
        media_type: link.media_type,
        hreflang: link.href_lang,
        title: link.title,
        length: link.length,
    }
}

fn category(category: model::Category) -> AtomCategory {
    AtomCategory {
        term: category.term,
        scheme: category.scheme,
        label: category.label,
    }
}

fn person(person: model::Person) -> AtomPerson {
    AtomPerson {
        name: person.name,
        email: person.email,
        uri: person.uri,
    }
}

fn non_empty(id: String) -> Option<String> {
    let trimmed = id.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
