//! Utility functions shared by the request and authentication layers.
//!
//! - **URL validation**: scheme/transport policy for service endpoints
//!
//! # Examples
//!
//! ```
//! use gdata::util::validate_target_url;
//!
//! let url = validate_target_url("https://www.google.com/calendar/feeds/default").unwrap();
//! assert_eq!(url.host_str(), Some("www.google.com"));
//! ```

mod url_validator;

pub use url_validator::{validate_target_url, UrlValidationError};
