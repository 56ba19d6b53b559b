//! GData "kinds" elements (`gd:` namespace) carried on entries, plus the
//! product elements of shopping entries.

use super::shopping::ProductExtensions;
use super::tree::Element;

pub const GD_NAMESPACE: &str = "http://schemas.google.com/g/2005";

/// `gd:who`: a person associated with the entry (organizer, attendee, ...).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Who {
    pub rel: Option<String>,
    pub value_string: Option<String>,
    pub email: Option<String>,
}

/// `gd:when`: a time span. Times stay as sent; all-day events use bare dates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct When {
    pub start_time: String,
    pub end_time: Option<String>,
    pub value_string: Option<String>,
}

/// `gd:rating`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rating {
    pub value: Option<u32>,
    pub min: u32,
    pub max: u32,
    pub average: Option<f64>,
    pub num_raters: Option<u32>,
}

/// `gd:feedLink`: a nested feed (e.g. comments) belonging to the entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedLink {
    pub href: Option<String>,
    pub rel: Option<String>,
    pub count_hint: Option<u32>,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GdExtensions {
    pub who: Vec<Who>,
    pub when: Vec<When>,
    pub rating: Option<Rating>,
    pub feed_links: Vec<FeedLink>,
    /// `sc:`/`scp:` attributes and `app:control` of a product entry.
    pub product: Option<ProductExtensions>,
}

impl GdExtensions {
    pub fn is_empty(&self) -> bool {
        !self.has_kinds() && self.product.is_none()
    }

    /// Whether any `gd:` element is present.
    pub fn has_kinds(&self) -> bool {
        !(self.who.is_empty() && self.when.is_empty() && self.rating.is_none() && self.feed_links.is_empty())
    }

    /// Collects the extension elements among an entry's children.
    pub(crate) fn from_entry(entry: &Element) -> Self {
        let mut ext = GdExtensions {
            product: ProductExtensions::from_entry(entry),
            ..GdExtensions::default()
        };
        let kinds = entry
            .children
            .iter()
            .filter(|c| c.namespace.is_none() || c.in_namespace(GD_NAMESPACE));
        for child in kinds {
            match child.name.as_str() {
                "who" => ext.who.push(Who {
                    rel: owned(child.attr("rel")),
                    value_string: owned(child.attr("valueString")),
                    email: owned(child.attr("email")),
                }),
                "when" => match child.attr("startTime") {
                    Some(start) => ext.when.push(When {
                        start_time: start.to_string(),
                        end_time: owned(child.attr("endTime")),
                        value_string: owned(child.attr("valueString")),
                    }),
                    None => tracing::debug!("Ignoring gd:when without startTime"),
                },
                "rating" => {
                    ext.rating = Some(Rating {
                        value: number(child.attr("value")),
                        min: number(child.attr("min")).unwrap_or(1),
                        max: number(child.attr("max")).unwrap_or(5),
                        average: number(child.attr("average")),
                        num_raters: number(child.attr("numRaters")),
                    })
                }
                "feedLink" => ext.feed_links.push(FeedLink {
                    href: owned(child.attr("href")),
                    rel: owned(child.attr("rel")),
                    count_hint: number(child.attr("countHint")),
                    read_only: child.attr("readOnly") == Some("true"),
                }),
                _ => {}
            }
        }
        ext
    }
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

fn number<T: std::str::FromStr>(value: Option<&str>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::tree::parse_tree;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extensions_from_entry() {
        let xml = br#"<entry xmlns:gd="http://schemas.google.com/g/2005">
            <gd:who rel="http://schemas.google.com/g/2005#event.organizer" valueString="Jane" email="jane@example.com"/>
            <gd:when startTime="2011-03-01T10:00:00.000Z" endTime="2011-03-01T11:00:00.000Z"/>
            <gd:when valueString="no start"/>
            <gd:rating value="4" min="1" max="5" average="3.5" numRaters="12"/>
            <gd:feedLink href="https://example.com/comments" countHint="7" readOnly="true"/>
        </entry>"#;
        let ext = GdExtensions::from_entry(&parse_tree(xml).unwrap());

        assert_eq!(
            ext.who,
            vec![Who {
                rel: Some("http://schemas.google.com/g/2005#event.organizer".to_string()),
                value_string: Some("Jane".to_string()),
                email: Some("jane@example.com".to_string()),
            }]
        );
        assert_eq!(ext.when.len(), 1);
        assert_eq!(ext.when[0].end_time.as_deref(), Some("2011-03-01T11:00:00.000Z"));
        assert_eq!(
            ext.rating,
            Some(Rating {
                value: Some(4),
                min: 1,
                max: 5,
                average: Some(3.5),
                num_raters: Some(12),
            })
        );
        assert_eq!(ext.feed_links[0].count_hint, Some(7));
        assert!(ext.feed_links[0].read_only);
    }

    #[test]
    fn test_kinds_outside_gd_namespace_ignored() {
        let xml = br#"<entry xmlns:scp="http://schemas.google.com/structuredcontent/2009/products">
            <scp:rating min="1" max="5" value="2"/>
        </entry>"#;
        let ext = GdExtensions::from_entry(&parse_tree(xml).unwrap());

        assert_eq!(ext.rating, None);
        assert!(!ext.has_kinds());
        assert_eq!(ext.product.unwrap().get("rating"), Some(""));
    }

    #[test]
    fn test_no_extensions() {
        let ext = GdExtensions::from_entry(&parse_tree(b"<entry><title>x</title></entry>").unwrap());
        assert!(ext.is_empty());
    }
}
