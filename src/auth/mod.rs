//! Authentication schemes for GData services.
//!
//! An [`Authenticator`] produces the `Authorization` header value for a
//! request, optionally rewrites the target URI, and can be told to drop
//! cached credentials when the server answers 403.
//!
//! - [`NoAuth`] - anonymous access
//! - [`ClientLogin`] - username/password exchanged for a `GoogleLogin` token
//! - [`AuthSub`] - pre-issued AuthSub token (unsigned)
//! - [`OAuth2`] - bearer token, with code exchange and refresh
//! - [`RequestorId`] - adds `xoauth_requestor_id` to another authenticator's URIs
//!
//! Authenticators run on operation worker threads and may block on the
//! network (token queries use the transport's blocking client).

mod client_login;
mod oauth2;

pub use client_login::{
    parse_login_response, ClientLogin, Credentials, CLIENT_LOGIN_URL, DEFAULT_ACCOUNT_TYPE,
};
pub use oauth2::{OAuth2, OAuth2Parameters, GOOGLE_TOKEN_URL};

use crate::async_ops::HttpVerb;
use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Authentication endpoint returned HTTP status {0}")]
    HttpStatus(u16),
    /// ClientLogin wants the user to solve a CAPTCHA before retrying.
    #[error("CAPTCHA required (token {token})")]
    CaptchaRequired { token: String, url: Option<String> },
    /// ClientLogin rejected the credentials, e.g. `BadAuthentication`.
    #[error("Login rejected: {0}")]
    Rejected(String),
    #[error("Login response did not contain an Auth token")]
    MissingToken,
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
    #[error("No access token, authorization code or refresh token available")]
    NoCredentials,
}

/// Applies one authentication scheme to outgoing requests.
pub trait Authenticator: Send + Sync {
    /// Short scheme name for logs.
    fn scheme(&self) -> &'static str;

    /// Value of the `Authorization` header, or `None` for anonymous requests.
    ///
    /// May perform a blocking token query through `client` on first use.
    fn authorization(
        &self,
        client: &Client,
        uri: &Url,
        verb: HttpVerb,
    ) -> Result<Option<String>, AuthError>;

    /// Rewrites the request URI. Most schemes leave it alone.
    fn apply_to_uri(&self, uri: Url) -> Url {
        uri
    }

    /// Drops cached credentials so the next request re-authenticates.
    fn reset(&self) {}
}

/// Anonymous access.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl Authenticator for NoAuth {
    fn scheme(&self) -> &'static str {
        "none"
    }

    fn authorization(
        &self,
        _client: &Client,
        _uri: &Url,
        _verb: HttpVerb,
    ) -> Result<Option<String>, AuthError> {
        Ok(None)
    }
}

/// AuthSub with a token issued to a web application.
///
/// Only the unsigned form is supported.
pub struct AuthSub {
    token: SecretString,
}

impl AuthSub {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

impl fmt::Debug for AuthSub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSub")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl Authenticator for AuthSub {
    fn scheme(&self) -> &'static str {
        "authsub"
    }

    fn authorization(
        &self,
        _client: &Client,
        _uri: &Url,
        _verb: HttpVerb,
    ) -> Result<Option<String>, AuthError> {
        Ok(Some(format!(
            "AuthSub token=\"{}\"",
            self.token.expose_secret()
        )))
    }
}

/// Query parameter naming the user a two-legged OAuth request acts for.
pub const REQUESTOR_ID_PARAM: &str = "xoauth_requestor_id";

/// Wraps another authenticator and appends
/// `xoauth_requestor_id=<user>@<domain>` to every request URI.
pub struct RequestorId {
    inner: Arc<dyn Authenticator>,
    user: String,
    domain: String,
}

impl RequestorId {
    pub fn new(inner: Arc<dyn Authenticator>, user: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            inner,
            user: user.into(),
            domain: domain.into(),
        }
    }
}

impl Authenticator for RequestorId {
    fn scheme(&self) -> &'static str {
        self.inner.scheme()
    }

    fn authorization(
        &self,
        client: &Client,
        uri: &Url,
        verb: HttpVerb,
    ) -> Result<Option<String>, AuthError> {
        self.inner.authorization(client, uri, verb)
    }

    fn apply_to_uri(&self, uri: Url) -> Url {
        let mut uri = self.inner.apply_to_uri(uri);
        uri.query_pairs_mut().append_pair(
            REQUESTOR_ID_PARAM,
            &format!("{}@{}", self.user, self.domain),
        );
        uri
    }

    fn reset(&self) {
        self.inner.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        Client::new()
    }

    fn uri() -> Url {
        Url::parse("https://www.google.com/m8/feeds/contacts/default/full").unwrap()
    }

    #[test]
    fn test_no_auth_sends_nothing() {
        let header = NoAuth.authorization(&client(), &uri(), HttpVerb::Get).unwrap();
        assert!(header.is_none());
    }

    #[test]
    fn test_authsub_header() {
        let auth = AuthSub::new(SecretString::from("abc123".to_string()));
        let header = auth.authorization(&client(), &uri(), HttpVerb::Get).unwrap();
        assert_eq!(header.as_deref(), Some("AuthSub token=\"abc123\""));
    }

    #[test]
    fn test_authsub_debug_redacts() {
        let auth = AuthSub::new(SecretString::from("abc123".to_string()));
        let debug = format!("{:?}", auth);
        assert!(!debug.contains("abc123"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_requestor_id_appended() {
        let auth = RequestorId::new(Arc::new(NoAuth), "jane", "example.com");
        let rewritten = auth.apply_to_uri(uri());
        assert_eq!(rewritten.query(), Some("xoauth_requestor_id=jane%40example.com"));
    }

    #[test]
    fn test_requestor_id_keeps_existing_query() {
        let auth = RequestorId::new(Arc::new(NoAuth), "jane", "example.com");
        let mut source = uri();
        source.set_query(Some("max-results=10"));
        let rewritten = auth.apply_to_uri(source);
        assert_eq!(
            rewritten.query(),
            Some("max-results=10&xoauth_requestor_id=jane%40example.com")
        );
    }
}
