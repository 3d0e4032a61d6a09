//! axum binding for the gate: cookie in, redirect or pass-through out.

use super::{decide, Decision, GateConfig, RequestContext, SessionVerifier};
use crate::session::SessionToken;
use axum::{
    extract::{Request, State},
    http::{header::LOCATION, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

/// Shared, read-only state for [`auth_gate`].
pub struct GateState<V> {
    config: Arc<GateConfig>,
    verifier: Arc<V>,
    cookie_name: Arc<str>,
}

impl<V> Clone for GateState<V> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            verifier: Arc::clone(&self.verifier),
            cookie_name: Arc::clone(&self.cookie_name),
        }
    }
}

impl<V: SessionVerifier> GateState<V> {
    #[must_use]
    pub fn new(config: GateConfig, verifier: V, cookie_name: &str) -> Self {
        Self {
            config: Arc::new(config),
            verifier: Arc::new(verifier),
            cookie_name: Arc::from(cookie_name),
        }
    }
}

/// Middleware: runs the gate before the wrapped routes.
///
/// Install with `axum::middleware::from_fn_with_state(state, auth_gate::<V>)`.
pub async fn auth_gate<V: SessionVerifier + 'static>(
    State(state): State<GateState<V>>,
    request: Request,
    next: Next,
) -> Response {
    let token = SessionToken::from_headers(request.headers(), &state.cookie_name);
    let ctx = RequestContext::new(request.uri().path(), token);

    match decide(&state.config, &ctx, state.verifier.as_ref()).await {
        Decision::Allow => next.run(request).await,
        Decision::Redirect(location) => redirect(&location),
    }
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::TEMPORARY_REDIRECT, [(LOCATION, value)]).into_response(),
        Err(err) => {
            // Paths are validated at startup, so this is a configuration bug.
            error!("Invalid redirect location {:?}: {}", location, err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{api::ApiClient, gate::HttpSessionVerifier};
    use axum::{
        body::Body, http::Request as HttpRequest, middleware::from_fn_with_state, routing::get,
        Router,
    };
    use std::time::Duration;
    use tower::ServiceExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app(config: GateConfig, api_url: &str) -> Router {
        let client = ApiClient::new(api_url, "access_token").unwrap();
        let verifier = HttpSessionVerifier::new(client, Duration::from_secs(1));
        let state = GateState::new(config, verifier, "access_token");

        Router::new()
            .route("/", get(|| async { "root" }))
            .route("/login", get(|| async { "login form" }))
            .route("/dashboard", get(|| async { "dashboard" }))
            .layer(from_fn_with_state(state, auth_gate::<HttpSessionVerifier>))
    }

    fn request(uri: &str, cookie: Option<&str>) -> Request {
        let mut builder = HttpRequest::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn status_server(token: &str, status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/status"))
            .and(header("cookie", format!("access_token={token}").as_str()))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        server
    }

    fn location(response: &Response) -> Option<&str> {
        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
    }

    #[tokio::test]
    async fn dashboard_without_cookie_redirects_to_login() {
        let server = MockServer::start().await;
        let response = app(GateConfig::new(true), &server.uri())
            .oneshot(request("/dashboard", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert!(location(&response).unwrap().contains("/login"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dashboard_with_valid_cookie_passes() {
        let server = status_server("valid", 200).await;
        let response = app(GateConfig::new(true), &server.uri())
            .oneshot(request("/dashboard", Some("access_token=valid")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(location(&response).is_none());
    }

    #[tokio::test]
    async fn dashboard_with_rejected_cookie_redirects_to_login() {
        let server = status_server("invalid", 401).await;
        let response = app(GateConfig::new(true), &server.uri())
            .oneshot(request("/dashboard", Some("access_token=invalid")))
            .await
            .unwrap();

        assert!(location(&response).unwrap().contains("/login"));
    }

    #[tokio::test]
    async fn login_with_valid_cookie_redirects_to_dashboard() {
        let server = status_server("valid", 200).await;
        let response = app(GateConfig::new(true), &server.uri())
            .oneshot(request("/login", Some("access_token=valid")))
            .await
            .unwrap();

        assert!(location(&response).unwrap().contains("/dashboard"));
    }

    #[tokio::test]
    async fn login_without_cookie_shows_form() {
        let server = MockServer::start().await;
        let response = app(GateConfig::new(true), &server.uri())
            .oneshot(request("/login", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(location(&response).is_none());
    }

    #[tokio::test]
    async fn root_routes_by_session() {
        let server = status_server("valid", 200).await;

        let response = app(GateConfig::new(true), &server.uri())
            .oneshot(request("/", Some("access_token=valid")))
            .await
            .unwrap();
        assert!(location(&response).unwrap().contains("/dashboard"));

        let response = app(GateConfig::new(true), &server.uri())
            .oneshot(request("/", None))
            .await
            .unwrap();
        assert!(location(&response).unwrap().contains("/login"));
    }

    #[tokio::test]
    async fn disabled_gate_sends_root_to_dashboard() {
        let server = MockServer::start().await;

        let response = app(GateConfig::new(false), &server.uri())
            .oneshot(request("/", None))
            .await
            .unwrap();
        assert!(location(&response).unwrap().contains("/dashboard"));

        let response = app(GateConfig::new(false), &server.uri())
            .oneshot(request("/login", None))
            .await
            .unwrap();
        assert!(location(&response).unwrap().contains("/dashboard"));

        let response = app(GateConfig::new(false), &server.uri())
            .oneshot(request("/dashboard", None))
            .await
            .unwrap();
        assert!(location(&response).is_none());

        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn network_error_redirects_to_login() {
        let response = app(GateConfig::new(true), "http://127.0.0.1:1")
            .oneshot(request("/dashboard", Some("access_token=any_token")))
            .await
            .unwrap();

        assert!(location(&response).unwrap().contains("/login"));
    }

    #[test]
    fn invalid_location_is_server_error() {
        let response = redirect("/bad\nlocation");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
