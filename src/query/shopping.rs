//! Content API for Shopping feed URIs, all scoped to a merchant account.
//!
//! ```ignore
//! let url = ItemQuery::new("1234", "products", Projection::Schema)?
//!     .with_performance(start, end)?
//!     .to_url();
//! // https://content.googleapis.com/content/v1/1234/items/products/schema
//! //     ?performance.start=2011-03-01&performance.end=2011-03-31
//! ```

use super::{decode_segment, FeedQuery, QueryError};
use chrono::NaiveDate;
use url::Url;

pub const CONTENT_API_BASE: &str = "https://content.googleapis.com/content/v1";

const PERFORMANCE_START: &str = "performance.start";
const PERFORMANCE_END: &str = "performance.end";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// How item attributes are represented in returned entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Every attribute as `sc:attribute`.
    Generic,
    /// Known attributes as typed `sc:`/`scp:` elements.
    Schema,
}

impl Projection {
    pub fn as_str(self) -> &'static str {
        match self {
            Projection::Generic => "generic",
            Projection::Schema => "schema",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "generic" => Some(Projection::Generic),
            "schema" => Some(Projection::Schema),
            _ => None,
        }
    }
}

/// Items feed of one account: `{base}/{account}/items/{data type}/{projection}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemQuery {
    account_id: String,
    data_type: String,
    projection: Projection,
    performance: Option<(NaiveDate, NaiveDate)>,
    /// Generic GData parameters (`start-token`, `max-results`, ...).
    pub feed: FeedQuery,
}

impl ItemQuery {
    pub fn new(account_id: &str, data_type: &str, projection: Projection) -> Result<Self, QueryError> {
        Self::with_base(&default_base()?, account_id, data_type, projection)
    }

    /// Product items in the schema projection.
    pub fn products(account_id: &str) -> Result<Self, QueryError> {
        Self::new(account_id, "products", Projection::Schema)
    }

    pub fn with_base(
        base: &Url,
        account_id: &str,
        data_type: &str,
        projection: Projection,
    ) -> Result<Self, QueryError> {
        let url = account_url(base, account_id, &["items", data_type, projection.as_str()])?;
        Ok(Self {
            account_id: account_id.to_string(),
            data_type: data_type.to_string(),
            projection,
            performance: None,
            feed: FeedQuery::new(url),
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    /// Asks for `sc:performance` click data over an inclusive date range.
    /// The server only honours the range when both ends are given.
    pub fn with_performance(mut self, start: NaiveDate, end: NaiveDate) -> Result<Self, QueryError> {
        if end < start {
            return Err(QueryError::InvalidValue {
                name: PERFORMANCE_END.to_string(),
                value: end.format(DATE_FORMAT).to_string(),
            });
        }
        self.performance = Some((start, end));
        Ok(self)
    }

    pub fn performance(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.performance
    }

    pub fn with_start_token(mut self, token: impl Into<String>) -> Self {
        self.feed = self.feed.with_start_token(token);
        self
    }

    pub fn max_results(mut self, max: u32) -> Result<Self, QueryError> {
        self.feed = self.feed.max_results(max)?;
        Ok(self)
    }

    pub fn to_url(&self) -> Url {
        let mut url = self.feed.to_url();
        if let Some((start, end)) = self.performance {
            url.query_pairs_mut()
                .append_pair(PERFORMANCE_START, &start.format(DATE_FORMAT).to_string())
                .append_pair(PERFORMANCE_END, &end.format(DATE_FORMAT).to_string());
        }
        url
    }

    /// Reads an items feed URI back, including its performance range.
    pub fn parse(url: &Url) -> Result<Self, QueryError> {
        let mut feed = FeedQuery::parse(url)?;

        let segments: Vec<String> = feed
            .base()
            .path_segments()
            .map(|s| s.map(decode_segment).collect())
            .unwrap_or_default();
        let malformed = || QueryError::InvalidValue {
            name: "path".to_string(),
            value: url.path().to_string(),
        };
        let items = segments
            .iter()
            .rposition(|s| s == "items")
            .filter(|&i| i >= 1 && i + 2 < segments.len())
            .ok_or_else(malformed)?;
        let projection = Projection::from_segment(&segments[items + 2]).ok_or_else(malformed)?;

        let start = take_param(&mut feed.extra, PERFORMANCE_START);
        let end = take_param(&mut feed.extra, PERFORMANCE_END);
        let performance = match (start, end) {
            (Some(start), Some(end)) => Some((
                parse_date(PERFORMANCE_START, &start)?,
                parse_date(PERFORMANCE_END, &end)?,
            )),
            (None, None) => None,
            (Some(_), None) => return Err(missing(PERFORMANCE_END)),
            (None, Some(_)) => return Err(missing(PERFORMANCE_START)),
        };

        Ok(Self {
            account_id: segments[items - 1].clone(),
            data_type: segments[items + 1].clone(),
            projection,
            performance,
            feed,
        })
    }
}

/// Account-level feeds other than items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountFeed {
    /// `{account}/datafeeds/products/`
    Datafeeds,
    /// `{account}/dataquality/`
    DataQuality,
    /// `{account}/users/`
    Users,
}

impl AccountFeed {
    fn segments(self) -> &'static [&'static str] {
        match self {
            AccountFeed::Datafeeds => &["datafeeds", "products", ""],
            AccountFeed::DataQuality => &["dataquality", ""],
            AccountFeed::Users => &["users", ""],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountQuery {
    account_id: String,
    kind: AccountFeed,
    pub feed: FeedQuery,
}

impl AccountQuery {
    pub fn new(account_id: &str, kind: AccountFeed) -> Result<Self, QueryError> {
        Self::with_base(&default_base()?, account_id, kind)
    }

    pub fn datafeeds(account_id: &str) -> Result<Self, QueryError> {
        Self::new(account_id, AccountFeed::Datafeeds)
    }

    pub fn with_base(base: &Url, account_id: &str, kind: AccountFeed) -> Result<Self, QueryError> {
        Ok(Self {
            account_id: account_id.to_string(),
            kind,
            feed: FeedQuery::new(account_url(base, account_id, kind.segments())?),
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn kind(&self) -> AccountFeed {
        self.kind
    }

    pub fn to_url(&self) -> Url {
        self.feed.to_url()
    }
}

fn default_base() -> Result<Url, QueryError> {
    Url::parse(CONTENT_API_BASE).map_err(|e| QueryError::InvalidValue {
        name: "base".to_string(),
        value: e.to_string(),
    })
}

fn account_url(base: &Url, account_id: &str, rest: &[&str]) -> Result<Url, QueryError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| QueryError::CannotBeABase(base.to_string()))?
        .pop_if_empty()
        .push(account_id)
        .extend(rest);
    Ok(url)
}

fn take_param(params: &mut Vec<(String, String)>, name: &str) -> Option<String> {
    let index = params.iter().position(|(n, _)| n == name)?;
    Some(params.remove(index).1)
}

fn parse_date(name: &str, value: &str) -> Result<NaiveDate, QueryError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| QueryError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn missing(name: &str) -> QueryError {
    QueryError::InvalidValue {
        name: name.to_string(),
        value: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_items_url() {
        let url = ItemQuery::products("1234")
            .unwrap()
            .max_results(25)
            .unwrap()
            .to_url();
        assert_eq!(
            url.as_str(),
            "https://content.googleapis.com/content/v1/1234/items/products/schema?max-results=25"
        );
    }

    #[test]
    fn test_performance_range_appended() {
        let url = ItemQuery::new("1234", "products", Projection::Generic)
            .unwrap()
            .with_performance(date(2011, 3, 1), date(2011, 3, 31))
            .unwrap()
            .to_url();
        assert_eq!(
            url.as_str(),
            "https://content.googleapis.com/content/v1/1234/items/products/generic\
             ?performance.start=2011-03-01&performance.end=2011-03-31"
        );
    }

    #[test]
    fn test_inverted_performance_range_rejected() {
        let err = ItemQuery::products("1234")
            .unwrap()
            .with_performance(date(2011, 3, 31), date(2011, 3, 1))
            .unwrap_err();
        assert_eq!(
            err,
            QueryError::InvalidValue {
                name: "performance.end".to_string(),
                value: "2011-03-01".to_string(),
            }
        );
    }

    #[test]
    fn test_item_query_parses_back() {
        let query = ItemQuery::products("1234")
            .unwrap()
            .with_start_token("tok")
            .with_performance(date(2011, 3, 1), date(2011, 3, 2))
            .unwrap();
        let parsed = ItemQuery::parse(&query.to_url()).unwrap();

        assert_eq!(parsed.account_id(), "1234");
        assert_eq!(parsed.data_type(), "products");
        assert_eq!(parsed.projection(), Projection::Schema);
        assert_eq!(parsed.performance(), Some((date(2011, 3, 1), date(2011, 3, 2))));
        assert_eq!(parsed.feed.start_token.as_deref(), Some("tok"));
        assert!(parsed.feed.extra.is_empty());
    }

    #[test]
    fn test_half_performance_range_rejected() {
        let url = Url::parse(
            "https://content.googleapis.com/content/v1/1234/items/products/schema?performance.start=2011-03-01",
        )
        .unwrap();
        assert_eq!(ItemQuery::parse(&url).unwrap_err(), missing("performance.end"));
    }

    #[test]
    fn test_non_item_path_rejected() {
        let url = Url::parse("https://content.googleapis.com/content/v1/1234/datafeeds/products/").unwrap();
        assert!(matches!(
            ItemQuery::parse(&url),
            Err(QueryError::InvalidValue { name, .. }) if name == "path"
        ));
    }

    #[test]
    fn test_account_feeds() {
        assert_eq!(
            AccountQuery::datafeeds("1234").unwrap().to_url().as_str(),
            "https://content.googleapis.com/content/v1/1234/datafeeds/products/"
        );
        assert_eq!(
            AccountQuery::new("1234", AccountFeed::DataQuality).unwrap().to_url().as_str(),
            "https://content.googleapis.com/content/v1/1234/dataquality/"
        );
        assert_eq!(
            AccountQuery::new("1234", AccountFeed::Users).unwrap().to_url().as_str(),
            "https://content.googleapis.com/content/v1/1234/users/"
        );
    }

    #[test]
    fn test_account_id_escaped() {
        let base = Url::parse("http://localhost:8080/content/v1/").unwrap();
        let query = ItemQuery::with_base(&base, "a b", "products", Projection::Schema).unwrap();
        assert_eq!(
            query.to_url().as_str(),
            "http://localhost:8080/content/v1/a%20b/items/products/schema"
        );
        assert_eq!(ItemQuery::parse(&query.to_url()).unwrap().account_id(), "a b");
    }
}
