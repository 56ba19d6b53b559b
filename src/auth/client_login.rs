use super::{AuthError, Authenticator};
use crate::async_ops::HttpVerb;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use url::Url;

pub const CLIENT_LOGIN_URL: &str = "https://www.google.com/accounts/ClientLogin";
pub const DEFAULT_ACCOUNT_TYPE: &str = "HOSTED_OR_GOOGLE";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Account credentials for a ClientLogin token query.
pub struct Credentials {
    pub username: String,
    password: SecretString,
    pub account_type: String,
    /// Token from a previous `CaptchaRequired` answer.
    pub captcha_token: Option<String>,
    /// The user's solution to that CAPTCHA.
    pub captcha_answer: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
            account_type: DEFAULT_ACCOUNT_TYPE.to_string(),
            captcha_token: None,
            captcha_answer: None,
        }
    }

    pub fn with_account_type(mut self, account_type: impl Into<String>) -> Self {
        self.account_type = account_type.into();
        self
    }

    pub fn with_captcha(mut self, token: impl Into<String>, answer: impl Into<String>) -> Self {
        self.captcha_token = Some(token.into());
        self.captcha_answer = Some(answer.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("account_type", &self.account_type)
            .field("captcha_token", &self.captcha_token)
            .finish()
    }
}

/// Username/password authentication through the ClientLogin handler.
///
/// The token is queried on first use and cached until [`reset`](Authenticator::reset).
/// The cache lock is held across the query so concurrent workers log in once.
pub struct ClientLogin {
    credentials: Credentials,
    service: String,
    source: String,
    handler: Url,
    token: Mutex<Option<SecretString>>,
}

impl ClientLogin {
    /// `service` is the GData service code (e.g. `cp` for contacts), `source`
    /// identifies the calling application.
    pub fn new(
        credentials: Credentials,
        service: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            credentials,
            service: service.into(),
            source: source.into(),
            handler: Url::parse(CLIENT_LOGIN_URL)?,
            token: Mutex::new(None),
        })
    }

    /// Overrides the login endpoint, e.g. for a test server.
    pub fn with_handler(mut self, handler: Url) -> Self {
        self.handler = handler;
        self
    }

    /// Seeds the cache with a previously issued token.
    pub fn with_token(self, token: SecretString) -> Self {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
        self
    }

    /// The cached token, querying the handler if there is none.
    pub fn token(&self, client: &Client) -> Result<SecretString, AuthError> {
        let mut cached = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = cached.as_ref() {
            return Ok(SecretString::from(token.expose_secret().to_string()));
        }
        let token = self.query_token(client)?;
        *cached = Some(SecretString::from(token.expose_secret().to_string()));
        Ok(token)
    }

    /// POSTs the credentials to the login handler and returns the `Auth` token.
    pub fn query_token(&self, client: &Client) -> Result<SecretString, AuthError> {
        let creds = &self.credentials;
        let mut form = url::form_urlencoded::Serializer::new(String::new());
        form.append_pair("accountType", &creds.account_type)
            .append_pair("Email", &creds.username)
            .append_pair("Passwd", creds.password.expose_secret())
            .append_pair("service", &self.service)
            .append_pair("source", &self.source);
        if let (Some(token), Some(answer)) = (&creds.captcha_token, &creds.captcha_answer) {
            form.append_pair("logintoken", token)
                .append_pair("logincaptcha", answer);
        }

        tracing::debug!(
            username = %creds.username,
            service = %self.service,
            handler = %self.handler,
            "Querying ClientLogin token"
        );

        let response = client
            .post(self.handler.clone())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(form.finish())
            .send()?;
        let status = response.status();
        let body = response.text()?;
        let fields = parse_login_response(&body);

        if status.is_success() {
            return fields
                .get("Auth")
                .map(|token| SecretString::from(token.clone()))
                .ok_or(AuthError::MissingToken);
        }

        match fields.get("Error").map(String::as_str) {
            Some("CaptchaRequired") => {
                let token = fields.get("CaptchaToken").cloned().unwrap_or_default();
                let url = fields.get("CaptchaUrl").cloned();
                tracing::warn!(username = %creds.username, "ClientLogin requires a CAPTCHA");
                Err(AuthError::CaptchaRequired { token, url })
            }
            Some(code) => {
                tracing::warn!(username = %creds.username, error = code, "ClientLogin rejected");
                Err(AuthError::Rejected(code.to_string()))
            }
            None => Err(AuthError::HttpStatus(status.as_u16())),
        }
    }
}

impl fmt::Debug for ClientLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientLogin")
            .field("credentials", &self.credentials)
            .field("service", &self.service)
            .field("source", &self.source)
            .field("handler", &self.handler.as_str())
            .finish()
    }
}

impl Authenticator for ClientLogin {
    fn scheme(&self) -> &'static str {
        "client_login"
    }

    fn authorization(
        &self,
        client: &Client,
        _uri: &Url,
        _verb: HttpVerb,
    ) -> Result<Option<String>, AuthError> {
        let token = self.token(client)?;
        Ok(Some(format!("GoogleLogin auth={}", token.expose_secret())))
    }

    fn reset(&self) {
        let mut cached = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if cached.take().is_some() {
            tracing::debug!(username = %self.credentials.username, "Cleared ClientLogin token");
        }
    }
}

/// Splits a line-oriented `Key=Value` login response.
///
/// Values may themselves contain `=`; only the first one separates.
pub fn parse_login_response(body: &str) -> HashMap<String, String> {
    body.lines()
        .filter_map(|line| line.trim().split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn off_runtime<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
        tokio::task::spawn_blocking(move || std::thread::spawn(f).join().unwrap())
            .await
            .unwrap()
    }

    fn login(server: &MockServer) -> ClientLogin {
        let creds = Credentials::new("jane@example.com", SecretString::from("hunter2".to_string()));
        ClientLogin::new(creds, "cp", "test-app")
            .unwrap()
            .with_handler(Url::parse(&format!("{}/accounts/ClientLogin", server.uri())).unwrap())
    }

    #[test]
    fn test_parse_login_response() {
        let fields = parse_login_response("SID=abc\nLSID=def\nAuth=tok=en\n\n");
        assert_eq!(fields.get("SID").map(String::as_str), Some("abc"));
        assert_eq!(fields.get("Auth").map(String::as_str), Some("tok=en"));
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("jane", SecretString::from("hunter2".to_string()));
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("HOSTED_OR_GOOGLE"));
    }

    #[tokio::test]
    async fn test_token_queried_once_and_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accounts/ClientLogin"))
            .and(header("Content-Type", FORM_CONTENT_TYPE))
            .and(body_string_contains("Email=jane%40example.com"))
            .and(body_string_contains("service=cp"))
            .and(body_string_contains("accountType=HOSTED_OR_GOOGLE"))
            .respond_with(ResponseTemplate::new(200).set_body_string("SID=x\nLSID=y\nAuth=secret-token\n"))
            .expect(1)
            .mount(&server)
            .await;

        let auth = login(&server);
        let uri = Url::parse("https://www.google.com/m8/feeds").unwrap();
        let headers = off_runtime(move || {
            let client = Client::new();
            let first = auth.authorization(&client, &uri, HttpVerb::Get).unwrap();
            let second = auth.authorization(&client, &uri, HttpVerb::Get).unwrap();
            (first, second)
        })
        .await;

        assert_eq!(headers.0.as_deref(), Some("GoogleLogin auth=secret-token"));
        assert_eq!(headers.0, headers.1);
    }

    #[tokio::test]
    async fn test_reset_forces_new_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Auth=again\n"))
            .expect(2)
            .mount(&server)
            .await;

        let auth = login(&server);
        off_runtime(move || {
            let client = Client::new();
            auth.token(&client).unwrap();
            auth.reset();
            auth.token(&client).unwrap();
        })
        .await;
    }

    #[tokio::test]
    async fn test_captcha_required() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                "Url=https://www.google.com/login/captcha\nError=CaptchaRequired\nCaptchaToken=ctok\nCaptchaUrl=Captcha?ctoken=ctok\n",
            ))
            .mount(&server)
            .await;

        let auth = login(&server);
        let err = off_runtime(move || auth.query_token(&Client::new()).unwrap_err()).await;
        match err {
            AuthError::CaptchaRequired { token, url } => {
                assert_eq!(token, "ctok");
                assert_eq!(url.as_deref(), Some("Captcha?ctoken=ctok"));
            }
            other => panic!("Expected CaptchaRequired, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bad_authentication_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Error=BadAuthentication\n"))
            .mount(&server)
            .await;

        let auth = login(&server);
        let err = off_runtime(move || auth.query_token(&Client::new()).unwrap_err()).await;
        assert!(matches!(err, AuthError::Rejected(ref code) if code == "BadAuthentication"));
    }

    #[tokio::test]
    async fn test_captcha_answer_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("logintoken=ctok"))
            .and(body_string_contains("logincaptcha=brinmar"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Auth=solved\n"))
            .expect(1)
            .mount(&server)
            .await;

        let creds = Credentials::new("jane", SecretString::from("pw".to_string()))
            .with_captcha("ctok", "brinmar");
        let auth = ClientLogin::new(creds, "cp", "test-app")
            .unwrap()
            .with_handler(Url::parse(&server.uri()).unwrap());
        let token = off_runtime(move || auth.query_token(&Client::new()).unwrap()).await;
        assert_eq!(token.expose_secret(), "solved");
    }

    #[test]
    fn test_seeded_token_skips_query() {
        let creds = Credentials::new("jane", SecretString::from("pw".to_string()));
        let auth = ClientLogin::new(creds, "cp", "app")
            .unwrap()
            .with_token(SecretString::from("seeded".to_string()));
        // No server: a query would fail to connect
        let cached = auth.token.lock().unwrap();
        assert_eq!(cached.as_ref().map(|t| t.expose_secret().to_string()).as_deref(), Some("seeded"));
    }
}
