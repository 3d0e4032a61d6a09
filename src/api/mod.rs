//! Client for the backend API.
//!
//! All backend calls go through [`ApiClient`] so they share one connection
//! pool, one user agent and one way of turning HTTP failures into
//! [`ApiError`]. A `401` tells the caller the session is gone and the user
//! should be sent to the login page, except when it comes from the auth
//! status endpoint: that endpoint answers `401` for every anonymous visitor,
//! and following it with a login redirect would loop.

pub mod types;

pub use self::types::{LoginRequest, LoginResponse, LogoutResponse, StatusResponse};

use crate::session::SessionToken;
use reqwest::{header::COOKIE, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const STATUS_PATH: &str = "/auth/status";
pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),
    /// `login_redirect` is false only for the auth status endpoint.
    #[error("not authenticated")]
    Unauthorized { login_redirect: bool },
    #[error("unexpected status: {0}")]
    Status(u16),
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// True when the backend never produced a usable answer.
    #[must_use]
    pub const fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl(_) | Self::Timeout | Self::Transport(_) | Self::Decode(_)
        )
    }

    #[must_use]
    pub const fn login_redirect(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized {
                login_redirect: true
            }
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    cookie_name: String,
    status_path: String,
}

impl ApiClient {
    /// Build a client for the backend at `base_url`.
    ///
    /// # Errors
    /// Returns an error if the URL is not an absolute http(s) URL or the HTTP
    /// client cannot be created.
    pub fn new(base_url: &str, cookie_name: &str) -> Result<Self, ApiError> {
        let url = Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }

        let http = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(DEFAULT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cookie_name: cookie_name.to_string(),
            status_path: STATUS_PATH.to_string(),
        })
    }

    #[must_use]
    pub fn with_status_path(mut self, path: &str) -> Self {
        self.status_path = path.to_string();
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn status_path(&self) -> &str {
        &self.status_path
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: Method, path: &str, token: Option<&SessionToken>) -> RequestBuilder {
        let builder = self.http.request(method, self.endpoint(path));

        match token {
            Some(token) => builder.header(COOKIE, token.cookie_header(&self.cookie_name)),
            None => builder,
        }
    }

    async fn send(&self, path: &str, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();

        debug!("{} -> {}", path, status);

        if status.is_success() {
            Ok(response)
        } else if status == StatusCode::UNAUTHORIZED {
            Err(ApiError::Unauthorized {
                login_redirect: path != self.status_path,
            })
        } else {
            Err(ApiError::Status(status.as_u16()))
        }
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Ask the backend whether `token` is a live session, looking only at the
    /// HTTP status. `timeout` overrides the client default for this call.
    ///
    /// # Errors
    /// Returns an error for any non-success status or transport failure.
    #[instrument(skip(self))]
    pub async fn check_status(
        &self,
        token: &SessionToken,
        timeout: Option<Duration>,
    ) -> Result<(), ApiError> {
        let mut builder = self.request(Method::GET, &self.status_path, Some(token));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        self.send(&self.status_path, builder).await.map(|_| ())
    }

    /// Fetch the current session state.
    ///
    /// # Errors
    /// Returns `Unauthorized { login_redirect: false }` for anonymous sessions.
    #[instrument(skip(self))]
    pub async fn status(&self, token: Option<&SessionToken>) -> Result<StatusResponse, ApiError> {
        let builder = self.request(Method::GET, &self.status_path, token);
        let response = self.send(&self.status_path, builder).await?;
        Self::json(response).await
    }

    /// # Errors
    /// Returns `Unauthorized` on bad credentials.
    #[instrument(skip(self, request), fields(login_id = %request.login_id))]
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let builder = self.request(Method::POST, LOGIN_PATH, None).json(request);
        let response = self.send(LOGIN_PATH, builder).await?;
        Self::json(response).await
    }

    /// # Errors
    /// Returns an error if the backend rejects the logout.
    #[instrument(skip(self))]
    pub async fn logout(&self, token: Option<&SessionToken>) -> Result<LogoutResponse, ApiError> {
        let builder = self.request(Method::POST, LOGOUT_PATH, token);
        let response = self.send(LOGOUT_PATH, builder).await?;
        Self::json(response).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token(value: &str) -> SessionToken {
        SessionToken::parse(value).unwrap()
    }

    #[test]
    fn rejects_bad_base_urls() {
        assert!(matches!(
            ApiClient::new("not a url", "access_token"),
            Err(ApiError::InvalidUrl(_))
        ));
        assert!(matches!(
            ApiClient::new("ftp://backend", "access_token"),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://localhost:8000/api/", "access_token").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000/api");
        assert_eq!(
            client.endpoint(STATUS_PATH),
            "http://localhost:8000/api/auth/status"
        );
    }

    #[tokio::test]
    async fn status_authenticated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/status"))
            .and(header("cookie", "access_token=valid_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "is_authenticated": true, "user_id": 1 })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), "access_token").unwrap();
        let status = client.status(Some(&token("valid_token"))).await.unwrap();

        assert_eq!(
            status,
            StatusResponse {
                is_authenticated: true,
                user_id: Some(1)
            }
        );
    }

    #[tokio::test]
    async fn status_401_does_not_ask_for_login_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/status"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "detail": "Not authenticated" })),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), "access_token").unwrap();
        let err = client.status(None).await.unwrap_err();

        assert!(matches!(
            err,
            ApiError::Unauthorized {
                login_redirect: false
            }
        ));
        assert!(!err.login_redirect());
    }

    #[tokio::test]
    async fn other_401_asks_for_login_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "Unauthorized" })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), "access_token").unwrap();
        let err = client.logout(Some(&token("expired"))).await.unwrap_err();

        assert!(err.login_redirect());
        assert!(!err.is_unreachable());
    }

    #[tokio::test]
    async fn login_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({ "login_id": "admin", "password": "password" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "login succeeded",
                "access_token": "test_token",
                "user_id": 1
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), "access_token").unwrap();
        let response = client
            .login(&LoginRequest {
                login_id: "admin".to_string(),
                password: "password".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(response.access_token, "test_token");
        assert_eq!(response.user_id, 1);
    }

    #[tokio::test]
    async fn logout_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "detail": "Logout failed" })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), "access_token").unwrap();
        let err = client.logout(None).await.unwrap_err();

        assert!(matches!(err, ApiError::Status(500)));
    }

    #[tokio::test]
    async fn check_status_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/status"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), "access_token").unwrap();
        let err = client
            .check_status(&token("slow"), Some(Duration::from_millis(100)))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Timeout));
        assert!(err.is_unreachable());
    }

    #[tokio::test]
    async fn unreachable_backend() {
        // Nothing listens on port 1.
        let client = ApiClient::new("http://127.0.0.1:1", "access_token").unwrap();
        let err = client
            .check_status(&token("any"), Some(Duration::from_secs(1)))
            .await
            .unwrap_err();

        assert!(err.is_unreachable());
    }

    #[tokio::test]
    async fn malformed_status_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/status"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), "access_token").unwrap();
        let err = client.status(Some(&token("t"))).await.unwrap_err();

        assert!(matches!(err, ApiError::Decode(_)));
    }
}
