use anyhow::{anyhow, Result};
use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Extension, Request},
    http::{
        header::{
            CONNECTION, CONTENT_LENGTH, HOST, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE,
            TRAILER, TRANSFER_ENCODING, UPGRADE,
        },
        HeaderMap, HeaderName, HeaderValue, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
};
use reqwest::{redirect::Policy, Client};
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};
use tracing::{error, instrument, warn};
use url::Url;

pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Front-end origin that allowed requests are forwarded to.
#[derive(Debug, Clone)]
pub struct Upstream {
    client: Client,
    base_url: String,
}

impl Upstream {
    /// # Errors
    /// Returns an error if the URL is not an absolute http(s) URL or the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let url = Url::parse(base_url)?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "Error parsing upstream URL: unsupported scheme {}",
                url.scheme()
            ));
        }

        // Upstream redirects go back to the browser untouched.
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn target(&self, uri: &Uri) -> String {
        let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
        format!("{}{path_and_query}", self.base_url)
    }
}

// axum handler that forwards the request to the upstream, the response body is streamed back
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn proxy(
    Extension(upstream): Extension<Arc<Upstream>>,
    client: Option<ConnectInfo<SocketAddr>>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let target = upstream.target(&parts.uri);

    let mut headers = forwarded_headers(&parts.headers);
    add_forwarding_headers(
        &mut headers,
        &parts.headers,
        client.map(|ConnectInfo(addr)| addr.ip()),
    );

    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            warn!("Error reading request body: {}", e);
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let response = match upstream
        .client
        .request(parts.method, &target)
        .headers(headers)
        .body(body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            error!("Error forwarding request to upstream: {}", e);
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let status = response.status();
    let headers = forwarded_headers(response.headers());

    let mut proxied = Response::new(Body::from_stream(response.bytes_stream()));
    *proxied.status_mut() = status;
    *proxied.headers_mut() = headers;

    proxied
}

/// Copy headers across the proxy hop, dropping hop-by-hop headers, any header
/// named in `Connection`, `Host` and `Content-Length`.
#[must_use]
pub fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || listed.iter().any(|l| l == name.as_str()) {
            continue;
        }
        forwarded.append(name.clone(), value.clone());
    }

    forwarded
}

/// Tell the upstream who the original client and origin were. Values set by
/// a proxy in front of the gate are kept; the client address is appended to
/// `X-Forwarded-For`.
pub fn add_forwarding_headers(
    headers: &mut HeaderMap,
    original: &HeaderMap,
    client: Option<IpAddr>,
) {
    if let Some(ip) = client {
        let chain = match original
            .get(X_FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            Some(existing) => format!("{existing}, {ip}"),
            None => ip.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if !headers.contains_key(X_FORWARDED_HOST) {
        if let Some(host) = original.get(HOST) {
            headers.insert(X_FORWARDED_HOST, host.clone());
        }
    }

    if !headers.contains_key(X_FORWARDED_PROTO) {
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    [
        CONNECTION,
        PROXY_AUTHENTICATE,
        PROXY_AUTHORIZATION,
        TE,
        TRAILER,
        TRANSFER_ENCODING,
        UPGRADE,
        HOST,
        CONTENT_LENGTH,
    ]
    .contains(name)
        || name.as_str() == "keep-alive"
}
