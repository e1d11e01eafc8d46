//! HTTP network backed by reqwest.
//!
//! ### URL Canonicalization
//! - Trim whitespace, require an http(s) scheme
//! - Lowercase host, remove fragments
//! - Preserve query string
//!
//! ### Response mapping
//! - Any HTTP status is a response; only transport failures are errors.
//! - Timeouts map to `FETCH_TIMEOUT`, everything else to `NETWORK_ERROR`.
//! - A response whose final URL (after redirects) left the request's origin
//!   is marked `cors`, otherwise `basic`.

pub mod url;

use reqwest::{Client, header};
use std::time::{Duration, Instant};

pub use url::{UrlError, canonicalize, resolve, same_origin};

use offline_h5_core::Error;
use offline_h5_core::http::{Headers, Network, Request, Response, ResponseKind};

/// Configuration for the HTTP network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// User agent string (default: "offline-h5/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { user_agent: "offline-h5/0.1".to_string(), timeout: Duration::from_millis(20000), max_redirects: 5 }
    }
}

/// The real network.
pub struct HttpNetwork {
    http: Client,
    config: NetworkConfig,
}

impl HttpNetwork {
    /// Create a new network client with the given configuration.
    pub fn new(config: NetworkConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }
}

fn transport_error(url: &reqwest::Url, err: &reqwest::Error) -> Error {
    if err.is_timeout() { Error::FetchTimeout(format!("{url}: {err}")) } else { Error::Network(format!("{url}: {err}")) }
}

fn kind_for(requested: &reqwest::Url, final_url: &reqwest::Url) -> ResponseKind {
    if same_origin(requested, final_url) { ResponseKind::Basic } else { ResponseKind::Cors }
}

fn collect_headers(map: &header::HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        if let Ok(value) = value.to_str() {
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing: &mut String| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
    }
    headers
}

#[async_trait::async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| Error::InvalidInput(e.to_string()))?;

        let mut builder = self.http.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(&request.url, &e))?;

        let status = response.status();
        let final_url = response.url().clone();
        let kind = kind_for(&request.url, &final_url);
        let headers = collect_headers(response.headers());

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&request.url, &e))?
            .to_vec();

        let fetch_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            url = %request.url,
            final_url = %final_url,
            status = status.as_u16(),
            bytes = body.len(),
            fetch_ms,
            "fetched"
        );

        Ok(Response {
            url: final_url.to_string(),
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a loopback port.
    async fn serve_once(raw: &'static str) -> reqwest::Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            socket.write_all(raw.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        reqwest::Url::parse(&format!("http://{addr}/video/1.mp4")).unwrap()
    }

    #[test]
    fn test_network_config_default() {
        let config = NetworkConfig::default();
        assert_eq!(config.user_agent, "offline-h5/0.1");
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_kind_for_redirects() {
        let requested = reqwest::Url::parse("https://app.test/a").unwrap();
        assert_eq!(kind_for(&requested, &reqwest::Url::parse("https://app.test/b").unwrap()), ResponseKind::Basic);
        assert_eq!(kind_for(&requested, &reqwest::Url::parse("https://cdn.test/b").unwrap()), ResponseKind::Cors);
    }

    #[test]
    fn test_collect_headers_lowercases_and_joins() {
        let mut map = header::HeaderMap::new();
        map.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("video/mp4"));
        map.append(header::VARY, header::HeaderValue::from_static("accept"));
        map.append(header::VARY, header::HeaderValue::from_static("origin"));

        let headers = collect_headers(&map);
        assert_eq!(headers.get("content-type").map(String::as_str), Some("video/mp4"));
        assert_eq!(headers.get("vary").map(String::as_str), Some("accept, origin"));
    }

    #[tokio::test]
    async fn test_http_error_status_is_a_response() {
        let url = serve_once("HTTP/1.1 404 Not Found\r\ncontent-length: 4\r\nconnection: close\r\n\r\nnope").await;
        let network = HttpNetwork::new(NetworkConfig::default()).unwrap();

        let response = network.fetch(&Request::get(url)).await.unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.status_text, "Not Found");
        assert_eq!(response.body, b"nope");
        assert_eq!(response.kind, ResponseKind::Basic);
    }

    #[tokio::test]
    async fn test_ok_response_keeps_headers() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-type: video/mp4\r\ncontent-length: 3\r\nconnection: close\r\n\r\nmp4",
        )
        .await;
        let network = HttpNetwork::new(NetworkConfig::default()).unwrap();

        let response = network.fetch(&Request::get(url)).await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.header("content-type"), Some("video/mp4"));
        assert_eq!(response.body, b"mp4");
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let network = HttpNetwork::new(NetworkConfig::default()).unwrap();
        let url = reqwest::Url::parse(&format!("http://{addr}/")).unwrap();
        let result = network.fetch(&Request::get(url)).await;
        assert!(result.unwrap_err().is_network_failure());
    }
}
