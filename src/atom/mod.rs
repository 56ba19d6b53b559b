//! Atom feed and entry model, parsing and serialization.
//!
//! Documents are read with `quick-xml` into a small element tree (local
//! names plus resolved namespace, nesting capped at [`MAX_DEPTH`]) and mapped onto
//! [`AtomFeed`] / [`AtomEntry`]. RSS documents are handed to `feed-rs` and
//! normalised into the same model. Unknown elements are ignored.

mod extensions;
mod model;
mod parse;
mod rss;
mod shopping;
mod tree;
mod writer;

pub use extensions::{FeedLink, GdExtensions, Rating, When, Who, GD_NAMESPACE};
pub use model::{
    AtomCategory, AtomContent, AtomEntry, AtomFeed, AtomLink, AtomPerson, Generator, Links,
    TextConstruct, TextKind, REL_ALTERNATE, REL_EDIT, REL_FEED, REL_NEXT, REL_POST, REL_PREVIOUS,
    REL_SELF,
};
pub use shopping::{
    CustomAttribute, Datapoint, DestinationStatus, Performance, ProductAttribute, ProductControl,
    ProductExtensions, ProductNamespace, Warning, APP_NAMESPACE, SCP_NAMESPACE, SC_NAMESPACE,
};
pub use tree::MAX_DEPTH;

use thiserror::Error;

pub const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

#[derive(Debug, Error)]
pub enum AtomError {
    #[error("XML parse error: {0}")]
    Xml(String),
    #[error("Document is not valid UTF-8")]
    Encoding,
    #[error("XML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),
    #[error("Document is empty")]
    Empty,
    #[error("Expected <{expected}> document, found <{found}>")]
    UnexpectedRoot {
        expected: &'static str,
        found: String,
    },
    #[error("RSS parse error: {0}")]
    Rss(String),
    #[error("Failed to write XML: {0}")]
    Write(String),
}

/// Parses an Atom `<feed>` or an RSS document.
pub fn parse_feed(bytes: &[u8]) -> Result<AtomFeed, AtomError> {
    let root = tree::parse_tree(bytes)?;
    match root.name.as_str() {
        "feed" => Ok(parse::feed_from(&root)),
        "rss" | "RDF" => rss::parse_rss(bytes),
        other => Err(AtomError::UnexpectedRoot {
            expected: "feed",
            found: other.to_string(),
        }),
    }
}

/// Parses an Atom `<entry>` document, or the first entry of a `<feed>`.
pub fn parse_entry(bytes: &[u8]) -> Result<AtomEntry, AtomError> {
    let root = tree::parse_tree(bytes)?;
    match root.name.as_str() {
        "entry" => Ok(parse::entry_from(&root)),
        "feed" => root
            .atom_child("entry")
            .map(parse::entry_from)
            .ok_or_else(|| AtomError::UnexpectedRoot {
                expected: "entry",
                found: "feed without entries".to_string(),
            }),
        other => Err(AtomError::UnexpectedRoot {
            expected: "entry",
            found: other.to_string(),
        }),
    }
}
