//! GData feed query URIs.
//!
//! ```ignore
//! let url = FeedQuery::new(base)
//!     .with_category("friends")
//!     .with_text("darcy")
//!     .max_results(25)?
//!     .to_url();
//! // https://.../full/-/friends?q=darcy&max-results=25
//! ```

mod shopping;

pub use shopping::{AccountFeed, AccountQuery, ItemQuery, Projection, CONTENT_API_BASE};

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use url::Url;

/// Path segment separating a feed URI from its category filter.
const CATEGORY_MARKER: &str = "-";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("{name} must be at least 1, got {value}")]
    OutOfRange { name: &'static str, value: i64 },
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },
    #[error("URL cannot carry a category path: {0}")]
    CannotBeABase(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    base: Url,
    /// Full-text query (`q`).
    pub text: Option<String>,
    /// Category path segments; `a|b` within one segment means either.
    pub categories: Vec<String>,
    pub author: Option<String>,
    /// Alternate representation (`alt`), e.g. `rss` or `json`.
    pub alt: Option<String>,
    start_index: Option<u32>,
    max_results: Option<u32>,
    pub updated_min: Option<DateTime<Utc>>,
    pub updated_max: Option<DateTime<Utc>>,
    pub published_min: Option<DateTime<Utc>>,
    pub published_max: Option<DateTime<Utc>>,
    /// Opaque paging token some feeds use instead of `start-index`.
    pub start_token: Option<String>,
    /// Service-specific parameters, in order.
    pub extra: Vec<(String, String)>,
}

impl FeedQuery {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            text: None,
            categories: Vec::new(),
            author: None,
            alt: None,
            start_index: None,
            max_results: None,
            updated_min: None,
            updated_max: None,
            published_min: None,
            published_max: None,
            start_token: None,
            extra: Vec::new(),
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_alt(mut self, alt: impl Into<String>) -> Self {
        self.alt = Some(alt.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }

    pub fn updated_between(
        mut self,
        min: Option<DateTime<Utc>>,
        max: Option<DateTime<Utc>>,
    ) -> Self {
        self.updated_min = min;
        self.updated_max = max;
        self
    }

    pub fn published_between(
        mut self,
        min: Option<DateTime<Utc>>,
        max: Option<DateTime<Utc>>,
    ) -> Self {
        self.published_min = min;
        self.published_max = max;
        self
    }

    pub fn with_start_token(mut self, token: impl Into<String>) -> Self {
        self.start_token = Some(token.into());
        self
    }

    /// 1-based index of the first result.
    pub fn start_index(mut self, index: u32) -> Result<Self, QueryError> {
        self.start_index = Some(at_least_one("start-index", index)?);
        Ok(self)
    }

    pub fn max_results(mut self, max: u32) -> Result<Self, QueryError> {
        self.max_results = Some(at_least_one("max-results", max)?);
        Ok(self)
    }

    pub fn get_start_index(&self) -> Option<u32> {
        self.start_index
    }

    pub fn get_max_results(&self) -> Option<u32> {
        self.max_results
    }

    /// Builds the request URI.
    pub fn to_url(&self) -> Url {
        let mut url = self.base.clone();

        if !self.categories.is_empty() {
            if let Ok(mut segments) = url.path_segments_mut() {
                segments
                    .pop_if_empty()
                    .push(CATEGORY_MARKER)
                    .extend(self.categories.iter());
            }
        }

        let params = self.params();
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        url
    }

    fn params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        let mut push = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                params.push((name.to_string(), value));
            }
        };
        push("q", self.text.clone());
        push("author", self.author.clone());
        push("alt", self.alt.clone());
        push("updated-min", self.updated_min.map(timestamp));
        push("updated-max", self.updated_max.map(timestamp));
        push("published-min", self.published_min.map(timestamp));
        push("published-max", self.published_max.map(timestamp));
        push("start-index", self.start_index.map(|v| v.to_string()));
        push("max-results", self.max_results.map(|v| v.to_string()));
        push("start-token", self.start_token.clone());
        params.extend(self.extra.iter().cloned());
        params
    }

    /// Reads a feed URI back into a query. Unknown parameters land in
    /// [`extra`](Self::extra); the category path is split off the base.
    pub fn parse(url: &Url) -> Result<Self, QueryError> {
        let mut base = url.clone();
        base.set_query(None);
        base.set_fragment(None);

        let mut categories = Vec::new();
        if let Some(segments) = url.path_segments() {
            let segments: Vec<&str> = segments.collect();
            if let Some(marker) = segments.iter().position(|s| *s == CATEGORY_MARKER) {
                categories = segments[marker + 1..]
                    .iter()
                    .filter(|s| !s.is_empty())
                    .map(|s| decode_segment(s))
                    .collect();
                let mut path = base
                    .path_segments_mut()
                    .map_err(|_| QueryError::CannotBeABase(url.to_string()))?;
                path.clear().extend(&segments[..marker]);
            }
        }

        let mut query = FeedQuery::new(base);
        query.categories = categories;

        for (name, value) in url.query_pairs() {
            let value = value.into_owned();
            match name.as_ref() {
                "q" => query.text = Some(value),
                "author" => query.author = Some(value),
                "alt" => query.alt = Some(value),
                "updated-min" => query.updated_min = Some(parse_timestamp("updated-min", &value)?),
                "updated-max" => query.updated_max = Some(parse_timestamp("updated-max", &value)?),
                "published-min" => {
                    query.published_min = Some(parse_timestamp("published-min", &value)?)
                }
                "published-max" => {
                    query.published_max = Some(parse_timestamp("published-max", &value)?)
                }
                "start-index" => query.start_index = Some(parse_count("start-index", &value)?),
                "max-results" => query.max_results = Some(parse_count("max-results", &value)?),
                "start-token" => query.start_token = Some(value),
                other => query.extra.push((other.to_string(), value)),
            }
        }

        Ok(query)
    }
}

fn at_least_one(name: &'static str, value: u32) -> Result<u32, QueryError> {
    if value == 0 {
        return Err(QueryError::OutOfRange {
            name,
            value: i64::from(value),
        });
    }
    Ok(value)
}

fn parse_count(name: &'static str, value: &str) -> Result<u32, QueryError> {
    match value.trim().parse::<i64>() {
        Ok(n) if n < 1 => Err(QueryError::OutOfRange { name, value: n }),
        Ok(n) => u32::try_from(n).map_err(|_| QueryError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        }),
        Err(_) => Err(QueryError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_timestamp(name: &str, value: &str) -> Result<DateTime<Utc>, QueryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| QueryError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        })
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn decode_segment(segment: &str) -> String {
    url::form_urlencoded::parse(format!("s={}", segment.replace('+', "%2B")).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| segment.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn base() -> Url {
        Url::parse("https://www.google.com/m8/feeds/contacts/default/full").unwrap()
    }

    #[test]
    fn test_plain_base_unchanged() {
        assert_eq!(FeedQuery::new(base()).to_url(), base());
    }

    #[test]
    fn test_builds_category_path_and_params() {
        let url = FeedQuery::new(base())
            .with_category("friends")
            .with_category("family|work")
            .with_text("darcy bingley")
            .start_index(11)
            .unwrap()
            .max_results(10)
            .unwrap()
            .to_url();

        assert_eq!(
            url.as_str(),
            "https://www.google.com/m8/feeds/contacts/default/full/-/friends/family|work?q=darcy+bingley&start-index=11&max-results=10"
        );
    }

    #[test]
    fn test_dates_formatted_rfc3339() {
        let min = Utc.with_ymd_and_hms(2011, 1, 1, 0, 0, 0).unwrap();
        let url = FeedQuery::new(base())
            .updated_between(Some(min), None)
            .to_url();
        assert_eq!(url.query(), Some("updated-min=2011-01-01T00%3A00%3A00Z"));
    }

    #[test]
    fn test_zero_rejected() {
        assert_eq!(
            FeedQuery::new(base()).start_index(0).unwrap_err(),
            QueryError::OutOfRange {
                name: "start-index",
                value: 0
            }
        );
        assert!(FeedQuery::new(base()).max_results(0).is_err());
    }

    #[test]
    fn test_parse_reads_back() {
        let original = FeedQuery::new(base())
            .with_category("friends")
            .with_author("jane")
            .with_alt("rss")
            .with_start_token("tok")
            .with_param("showdeleted", "true")
            .published_between(None, Some(Utc.with_ymd_and_hms(2012, 6, 1, 12, 0, 0).unwrap()))
            .max_results(5)
            .unwrap();

        let parsed = FeedQuery::parse(&original.to_url()).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parsed.base(), &base());
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        let url = Url::parse("https://example.com/feed?start-index=0").unwrap();
        assert!(matches!(
            FeedQuery::parse(&url).unwrap_err(),
            QueryError::OutOfRange { name: "start-index", value: 0 }
        ));

        let url = Url::parse("https://example.com/feed?max-results=lots").unwrap();
        assert!(matches!(
            FeedQuery::parse(&url).unwrap_err(),
            QueryError::InvalidValue { .. }
        ));

        let url = Url::parse("https://example.com/feed?updated-min=yesterday").unwrap();
        assert!(FeedQuery::parse(&url).is_err());
    }
}
