use super::upload::UploadReader;
use super::{
    Transport, TransportError, TransportResponse, DEVELOPER_KEY_HEADER, GDATA_VERSION_HEADER,
    METHOD_OVERRIDE_HEADER,
};
use crate::async_ops::{AsyncRequest, CancellationToken, HttpVerb};
use crate::auth::{Authenticator, NoAuth};
use crate::util::{validate_target_url, UrlValidationError};
use reqwest::blocking::{Body, Client, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, IF_MODIFIED_SINCE, LOCATION};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::io::Cursor;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use url::Url;

const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: u32 = 10;

/// Per-transport request settings.
pub struct RequestSettings {
    /// Identifies the calling application in the `User-Agent` header.
    pub application_name: String,
    pub protocol_major: u32,
    pub protocol_minor: u32,
    /// How many times a 500 response is retried.
    pub retries: u32,
    /// Tunnel PUT/PATCH/DELETE through POST with `X-HTTP-Method-Override`.
    pub method_override: bool,
    /// Only follow redirects for GET requests.
    pub strict_redirect: bool,
    pub timeout: Option<Duration>,
    pub developer_key: Option<SecretString>,
}

impl RequestSettings {
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            ..Self::default()
        }
    }

    /// `GData-Version` header value.
    pub fn version(&self) -> String {
        format!("{}.{}", self.protocol_major, self.protocol_minor)
    }

    pub fn user_agent(&self) -> String {
        format!(
            "{} {}/{}",
            self.application_name,
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )
    }
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            application_name: env!("CARGO_PKG_NAME").to_string(),
            protocol_major: 1,
            protocol_minor: 0,
            retries: DEFAULT_RETRIES,
            method_override: false,
            strict_redirect: false,
            timeout: Some(DEFAULT_TIMEOUT),
            developer_key: None,
        }
    }
}

impl fmt::Debug for RequestSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSettings")
            .field("application_name", &self.application_name)
            .field("version", &self.version())
            .field("retries", &self.retries)
            .field("method_override", &self.method_override)
            .field("strict_redirect", &self.strict_redirect)
            .field("timeout", &self.timeout)
            .field(
                "developer_key",
                &self.developer_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// GData-speaking [`Transport`] over a blocking `reqwest` client.
///
/// The client is built on first use, on the worker thread that needs it.
/// Redirects are never followed by the client itself: 3xx responses come
/// back here so the redirect policy and URL validation apply to every hop.
pub struct HttpTransport {
    settings: RequestSettings,
    authenticator: Arc<dyn Authenticator>,
    client: OnceLock<Client>,
}

impl HttpTransport {
    pub fn new(settings: RequestSettings, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            settings,
            authenticator,
            client: OnceLock::new(),
        }
    }

    pub fn anonymous(settings: RequestSettings) -> Self {
        Self::new(settings, Arc::new(NoAuth))
    }

    pub fn settings(&self) -> &RequestSettings {
        &self.settings
    }

    pub fn authenticator(&self) -> &Arc<dyn Authenticator> {
        &self.authenticator
    }

    /// The shared client, built on first call.
    pub fn client(&self) -> Result<&Client, TransportError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(self.settings.user_agent())
            .timeout(self.settings.timeout)
            .build()?;
        Ok(self.client.get_or_init(|| client))
    }

    fn send_once(
        &self,
        client: &Client,
        request: &AsyncRequest,
        uri: &Url,
        cancel: &CancellationToken,
    ) -> Result<Response, TransportError> {
        let overridden = self.settings.method_override && request.verb.needs_override();
        let method = if overridden {
            Method::POST
        } else {
            method_for(request.verb)
        };

        let mut builder = client
            .request(method, uri.clone())
            .header(GDATA_VERSION_HEADER, self.settings.version());

        if overridden {
            builder = builder.header(METHOD_OVERRIDE_HEADER, request.verb.as_str());
        }
        if let Some(key) = &self.settings.developer_key {
            builder = builder.header(DEVELOPER_KEY_HEADER, format!("key={}", key.expose_secret()));
        }
        if let Some(value) = self
            .authenticator
            .authorization(client, uri, request.verb)?
        {
            builder = builder.header(AUTHORIZATION, value);
        }
        if let Some(since) = request.if_modified_since {
            builder = builder.header(
                IF_MODIFIED_SINCE,
                since.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            );
        }

        match &request.body {
            Some(body) => {
                let len = body.bytes.len() as u64;
                let reader = UploadReader::new(Cursor::new(body.bytes.clone()), cancel.clone());
                builder = builder
                    .header(CONTENT_TYPE, body.content_type.as_str())
                    .body(Body::sized(reader, len));
            }
            // An overridden DELETE still goes out as a POST and needs a length
            None if overridden => builder = builder.body(Vec::<u8>::new()),
            None => {}
        }

        builder.send().map_err(|e| {
            if cancel.is_cancelled() {
                TransportError::Cancelled
            } else {
                TransportError::Network(e)
            }
        })
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("settings", &self.settings)
            .field("auth", &self.authenticator.scheme())
            .finish()
    }
}

impl Transport for HttpTransport {
    fn execute(
        &self,
        request: &AsyncRequest,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse, TransportError> {
        let client = self.client()?;
        let mut uri = self.authenticator.apply_to_uri(request.uri.clone());
        let mut redirects = 0u32;
        let mut server_errors = 0u32;
        let mut reauthenticated = false;

        loop {
            let response = self.send_once(client, request, &uri, cancel)?;
            let status = response.status();

            if status.is_success() {
                tracing::debug!(
                    user_data = %request.user_data,
                    status = status.as_u16(),
                    "Request succeeded"
                );
                if status == StatusCode::NO_CONTENT {
                    return Ok(TransportResponse::empty());
                }
                let content_length = response.content_length();
                return Ok(TransportResponse::new(Box::new(response), content_length));
            }

            match status {
                StatusCode::NOT_MODIFIED => return Err(TransportError::NotModified),
                StatusCode::MOVED_PERMANENTLY
                | StatusCode::FOUND
                | StatusCode::SEE_OTHER
                | StatusCode::TEMPORARY_REDIRECT
                | StatusCode::PERMANENT_REDIRECT => {
                    let location = response
                        .headers()
                        .get(LOCATION)
                        .and_then(|v| v.to_str().ok())
                        .filter(|v| !v.is_empty())
                        .map(str::to_string);
                    let Some(location) = location else {
                        return Err(TransportError::Redirect {
                            status: status.as_u16(),
                            location: None,
                        });
                    };
                    if self.settings.strict_redirect && request.verb != HttpVerb::Get {
                        return Err(TransportError::Redirect {
                            status: status.as_u16(),
                            location: Some(location),
                        });
                    }
                    redirects += 1;
                    if redirects > MAX_REDIRECTS {
                        return Err(TransportError::TooManyRedirects(MAX_REDIRECTS));
                    }
                    let next = uri.join(&location).map_err(UrlValidationError::from)?;
                    uri = validate_target_url(next.as_str())?;
                    tracing::debug!(
                        user_data = %request.user_data,
                        status = status.as_u16(),
                        location = %uri,
                        "Following redirect"
                    );
                }
                StatusCode::FORBIDDEN if !reauthenticated => {
                    reauthenticated = true;
                    tracing::info!(
                        user_data = %request.user_data,
                        scheme = self.authenticator.scheme(),
                        "Access forbidden, re-authenticating once"
                    );
                    self.authenticator.reset();
                }
                StatusCode::INTERNAL_SERVER_ERROR if server_errors < self.settings.retries => {
                    server_errors += 1;
                    tracing::warn!(
                        user_data = %request.user_data,
                        attempt = server_errors,
                        max_retries = self.settings.retries,
                        "Server error, retrying"
                    );
                }
                _ => return Err(TransportError::HttpStatus(status.as_u16())),
            }

            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
        }
    }
}

fn method_for(verb: HttpVerb) -> Method {
    match verb {
        HttpVerb::Get => Method::GET,
        HttpVerb::Post => Method::POST,
        HttpVerb::Put => Method::PUT,
        HttpVerb::Patch => Method::PATCH,
        HttpVerb::Delete => Method::DELETE,
    }
}
