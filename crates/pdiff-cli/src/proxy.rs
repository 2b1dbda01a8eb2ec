//! Instrumentation reverse proxy
//!
//! Forwards every request to the host named in the path and injects
//! [`pdiff::instrument::TRACKING_SCRIPT`] ahead of the first `<head` tag of
//! HTML responses, so the page keeps a count of its in-flight requests.
//!
//! ```text
//! browser ──► http://localhost:5050/example.com/about
//!              (or  http://localhost:5050/https/example.com/about)
//!                      │
//!                      ▼  resolve host: path ▸ Referer ▸ default
//!             http://example.com/about ──► upstream
//!                      │
//!                      ▼  HeadInjector (HTML only)
//! browser ◄── body with <script> before <head
//! ```

#![allow(clippy::missing_errors_doc)]

use crate::error::{CliError, CliResult};
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use futures::{Stream, StreamExt};
use pdiff::instrument::TRACKING_SCRIPT;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Bytes buffered while looking for `<head` before giving up
pub const INJECT_SCAN_LIMIT: usize = 64 * 1024;

/// Largest request body forwarded upstream
const MAX_REQUEST_BODY: usize = 16 * 1024 * 1024;

/// Proxy settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Listen port on 127.0.0.1
    pub port: u16,
    /// Host used when neither the path nor the Referer names one
    pub default_host: Option<String>,
    /// Scheme for upstream requests
    pub upstream_scheme: String,
}

impl ProxyConfig {
    /// Proxy on `port`, plain HTTP upstream
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            default_host: None,
            upstream_scheme: "http".to_string(),
        }
    }

    /// Set the fallback host
    #[must_use]
    pub fn with_default_host(mut self, host: impl Into<String>) -> Self {
        self.default_host = Some(host.into());
        self
    }

    /// Set the upstream scheme
    #[must_use]
    pub fn with_upstream_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.upstream_scheme = scheme.into();
        self
    }
}

// =============================================================================
// HOST RESOLUTION
// =============================================================================

/// Extensions of files commonly requested by root-relative URLs.
///
/// A first path segment ending in one of these is a file, not a host.
const FILE_EXTENSIONS: &[&str] = &[
    "css", "eot", "gif", "htm", "html", "ico", "jpeg", "jpg", "js", "json", "map", "mjs", "mp4",
    "otf", "pdf", "php", "png", "svg", "ttf", "txt", "wasm", "webm", "webp", "woff", "woff2",
    "xml",
];

/// Upstream target of a proxied request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    /// Scheme named in the path, if any
    pub scheme: Option<String>,
    /// Host, with port when given
    pub host: String,
    /// Path after the host, without leading `/`
    pub path: String,
}

impl Upstream {
    fn new(scheme: Option<&str>, host: &str, path: &str) -> Self {
        Self {
            scheme: scheme.map(str::to_string),
            host: host.to_string(),
            path: path.to_string(),
        }
    }

    /// Full upstream URL; `default_scheme` applies when the path named none
    #[must_use]
    pub fn url(&self, default_scheme: &str) -> String {
        let scheme = self.scheme.as_deref().unwrap_or(default_scheme);
        format!("{scheme}://{}/{}", self.host, self.path)
    }
}

/// Whether a path segment names a host rather than a file or directory
fn looks_like_host(segment: &str) -> bool {
    if segment.starts_with("localhost") {
        return true;
    }
    let name = segment.split_once(':').map_or(segment, |(name, _)| name);
    let Some((_, last_label)) = name.rsplit_once('.') else {
        return false;
    };
    let has_port = segment.contains(':');
    has_port || !FILE_EXTENSIONS.contains(&last_label.to_ascii_lowercase().as_str())
}

/// Split a request path (without leading `/`) into scheme, host and remainder.
///
/// The path is `[http|https/]host/rest`. The host segment starts with
/// `localhost` or contains a dot; a dotted segment with a file extension
/// (`favicon.ico`, `app.js`) is a file unless it carries a port.
#[must_use]
pub fn split_host(path: &str) -> (Option<&str>, Option<&str>, &str) {
    let (first, rest) = path.split_once('/').unwrap_or((path, ""));
    if matches!(first, "http" | "https") {
        let (host, tail) = rest.split_once('/').unwrap_or((rest, ""));
        if looks_like_host(host) {
            return (Some(first), Some(host), tail);
        }
    }
    if looks_like_host(first) {
        (None, Some(first), rest)
    } else {
        (None, None, path)
    }
}

/// Scheme and host named by a Referer that itself pointed at the proxy
fn referer_origin(referer: &str) -> Option<(Option<&str>, &str)> {
    let without_scheme = referer.split_once("://").map_or(referer, |(_, rest)| rest);
    let (_, path) = without_scheme.split_once('/')?;
    match split_host(path) {
        (scheme, Some(host), _) => Some((scheme, host)),
        (_, None, _) => None,
    }
}

/// Upstream target for a proxied request: path, then Referer, then default host
#[must_use]
pub fn resolve_target(
    path: &str,
    referer: Option<&str>,
    default_host: Option<&str>,
) -> Option<Upstream> {
    let path = path.trim_start_matches('/');
    match split_host(path) {
        (scheme, Some(host), rest) => Some(Upstream::new(scheme, host, rest)),
        (_, None, rest) => referer
            .and_then(referer_origin)
            .or_else(|| default_host.map(|host| (None, host)))
            .map(|(scheme, host)| Upstream::new(scheme, host, rest)),
    }
}

// =============================================================================
// INJECTION
// =============================================================================

/// Streaming `<head` injector.
///
/// Buffers until the tag is seen (case-insensitive, not `<header`) or
/// [`INJECT_SCAN_LIMIT`] bytes have been held, then passes everything through.
#[derive(Debug)]
pub struct HeadInjector {
    script: &'static [u8],
    buffer: Vec<u8>,
    done: bool,
    limit: usize,
}

impl Default for HeadInjector {
    fn default() -> Self {
        Self::new(TRACKING_SCRIPT.as_bytes())
    }
}

impl HeadInjector {
    /// Inject `script`
    #[must_use]
    pub const fn new(script: &'static [u8]) -> Self {
        Self {
            script,
            buffer: Vec::new(),
            done: false,
            limit: INJECT_SCAN_LIMIT,
        }
    }

    /// Override the scan limit
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Whether injection already happened or was abandoned
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a chunk; returns the bytes ready to send (possibly none)
    pub fn push(&mut self, chunk: &[u8]) -> Vec<u8> {
        if self.done {
            return chunk.to_vec();
        }
        self.buffer.extend_from_slice(chunk);
        if let Some(idx) = find_head_tag(&self.buffer) {
            self.done = true;
            let mut out = Vec::with_capacity(self.buffer.len() + self.script.len());
            out.extend_from_slice(&self.buffer[..idx]);
            out.extend_from_slice(self.script);
            out.extend_from_slice(&self.buffer[idx..]);
            self.buffer.clear();
            return out;
        }
        if self.buffer.len() >= self.limit {
            self.done = true;
            tracing::debug!(limit = self.limit, "no <head> within scan limit");
            return std::mem::take(&mut self.buffer);
        }
        Vec::new()
    }

    /// End of body; returns whatever is still buffered, unchanged
    pub fn finish(&mut self) -> Vec<u8> {
        self.done = true;
        std::mem::take(&mut self.buffer)
    }
}

/// Offset of the first `<head` followed by `>`, `/` or whitespace
fn find_head_tag(haystack: &[u8]) -> Option<usize> {
    const TAG: &[u8] = b"<head";
    haystack.windows(TAG.len() + 1).position(|window| {
        window[..TAG.len()].eq_ignore_ascii_case(TAG)
            && (matches!(window[TAG.len()], b'>' | b'/')
                || window[TAG.len()].is_ascii_whitespace())
    })
}

/// Run `upstream` through `injector`, flushing the tail at end of stream
fn inject_stream<S>(
    upstream: S,
    injector: HeadInjector,
) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin + Send + 'static,
{
    futures::stream::unfold(Some((upstream, injector)), |state| async move {
        let (mut upstream, mut injector) = state?;
        loop {
            match upstream.next().await {
                Some(Ok(chunk)) => {
                    let out = injector.push(&chunk);
                    if !out.is_empty() {
                        return Some((Ok(Bytes::from(out)), Some((upstream, injector))));
                    }
                }
                Some(Err(e)) => return Some((Err(e), None)),
                None => {
                    let tail = injector.finish();
                    return (!tail.is_empty()).then(|| (Ok(Bytes::from(tail)), None));
                }
            }
        }
    })
}

// =============================================================================
// SERVER
// =============================================================================

#[derive(Debug)]
struct ProxyState {
    config: ProxyConfig,
    client: reqwest::Client,
}

/// Router that proxies every path
pub fn router(config: ProxyConfig) -> CliResult<Router> {
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| CliError::proxy(e.to_string()))?;
    let state = Arc::new(ProxyState { config, client });
    Ok(Router::new().fallback(forward).with_state(state))
}

/// Serve on an already bound listener until the process ends
pub async fn serve(listener: TcpListener, config: ProxyConfig) -> CliResult<()> {
    let app = router(config)?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Bind 127.0.0.1 on the configured port and serve
pub async fn run(config: ProxyConfig) -> CliResult<()> {
    let listener = TcpListener::bind(("127.0.0.1", config.port))
        .await
        .map_err(|e| CliError::proxy(format!("cannot bind port {}: {e}", config.port)))?;
    tracing::info!(port = config.port, default_host = ?config.default_host, "proxy listening");
    serve(listener, config).await
}

/// Headers never copied between the two legs
fn is_hop_header(name: &header::HeaderName) -> bool {
    name == header::HOST
        || name == header::CONTENT_LENGTH
        || name == header::CONNECTION
        || name == header::TRANSFER_ENCODING
}

fn copy_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from {
        if !is_hop_header(name) {
            to.append(name.clone(), value.clone());
        }
    }
}

async fn forward(State(state): State<Arc<ProxyState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let referer = parts
        .headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok());
    let Some(target) = resolve_target(
        parts.uri.path(),
        referer,
        state.config.default_host.as_deref(),
    ) else {
        return (StatusCode::BAD_GATEWAY, "URL has no host").into_response();
    };

    let mut url = target.url(&state.config.upstream_scheme);
    if let Some(query) = parts.uri.query() {
        url.push('?');
        url.push_str(query);
    }

    let body = match axum::body::to_bytes(body, MAX_REQUEST_BODY).await {
        Ok(body) => body,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let mut headers = HeaderMap::new();
    copy_headers(&parts.headers, &mut headers);
    // Compressed bodies would hide the tag
    headers.insert(
        header::ACCEPT_ENCODING,
        header::HeaderValue::from_static("identity"),
    );

    tracing::debug!(method = %parts.method, %url, "forwarding");
    let upstream = match state
        .client
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await
    {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::warn!(%url, error = %e, "upstream request failed");
            return (StatusCode::BAD_GATEWAY, e.to_string()).into_response();
        }
    };

    let status = upstream.status();
    let is_html = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("text/html"));
    let mut response_headers = HeaderMap::new();
    copy_headers(upstream.headers(), &mut response_headers);

    let stream = Box::pin(upstream.bytes_stream());
    let body = if is_html {
        Body::from_stream(inject_stream(stream, HeadInjector::default()))
    } else {
        Body::from_stream(stream)
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    response
}
