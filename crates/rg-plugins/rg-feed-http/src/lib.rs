//! # rg-feed-http
//! rusty-gallery/crates/rg-plugins/rg-feed-http/src/lib.rs
//! HTTP implementation of `FeedClient` for the event image-list endpoint.
//!
//! The endpoint answers `GET {base_url}?event_id=..&page=..&page_size=..&key=..&order_by=..&order_asc=..`
//! with a single documented shape:
//!
//! ```json
//! { "data": { "image_list": [ { "id": 1, "img_url": "...", "thumbnail_url": "...",
//!     "width": 1080, "height": 720, "created_at": "2024-05-01T12:00:00Z", "size": 123 } ] },
//!   "total_count": 250 }
//! ```
//!
//! Anything else is a `Parse` error; there is no guessing between shapes.

use async_trait::async_trait;
use rg_core::error::{AppError, Result};
use rg_core::models::{PageQuery, RawFeedResponse, RawImage};
use rg_core::traits::FeedClient;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Per-request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where and how to reach the listing endpoint.
#[derive(Debug)]
pub struct FeedEndpoint {
    pub base_url: String,
    pub event_id: String,
    pub api_key: SecretString,
    pub timeout: Duration,
}

pub struct HttpFeedClient {
    http: reqwest::Client,
    endpoint: FeedEndpoint,
}

impl HttpFeedClient {
    pub fn new(endpoint: FeedEndpoint) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch_page(&self, query: &PageQuery) -> Result<RawFeedResponse> {
        let params = [
            ("event_id", self.endpoint.event_id.clone()),
            ("page", query.page.to_string()),
            ("page_size", query.page_size.to_string()),
            ("key", self.endpoint.api_key.expose_secret().to_string()),
            ("order_by", query.order_by.to_string()),
            ("order_asc", query.order_ascending.to_string()),
        ];

        let response = self
            .http
            .get(&self.endpoint.base_url)
            .query(&params)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;
        debug!(page = query.page, status = status.as_u16(), bytes = body.len(), "feed response");

        if !status.is_success() {
            return Err(AppError::Http {
                status: status.as_u16(),
                message: error_message(&body)
                    .or_else(|| status.canonical_reason().map(str::to_owned))
                    .unwrap_or_default(),
            });
        }
        decode_listing(&body)
    }
}

#[derive(Deserialize)]
struct ListingBody {
    data: ListingData,
    #[serde(default)]
    total_count: Option<u64>,
}

#[derive(Deserialize)]
struct ListingData {
    image_list: Vec<RawImage>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Strictly decodes a listing body.
pub fn decode_listing(body: &[u8]) -> Result<RawFeedResponse> {
    let listing: ListingBody = serde_json::from_slice(body)
        .map_err(|err| AppError::Parse(format!("unexpected image list payload: {err}")))?;
    Ok(RawFeedResponse {
        items: listing.data.image_list,
        total_count: listing.total_count,
    })
}

/// The `message` field of an error body, if the server sent one.
fn error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .map(|body| body.message)
        .filter(|message| !message.is_empty())
}

fn transport_error(err: reqwest::Error) -> AppError {
    if err.is_decode() {
        return AppError::Parse(err.to_string());
    }
    let code = if err.is_timeout() {
        "TIMEOUT"
    } else if err.is_connect() {
        "CONNECT"
    } else {
        "NETWORK_ERROR"
    };
    AppError::Network {
        message: err.to_string(),
        code: Some(code.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rg_core::models::RawId;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serves one canned HTTP response and hands back the request head.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/open/event/image-list", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let read = socket.read(&mut chunk).await.unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..read]);
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (url, handle)
    }

    fn client(base_url: String) -> HttpFeedClient {
        HttpFeedClient::new(FeedEndpoint {
            base_url,
            event_id: "154770".into(),
            api_key: SecretString::from("4030".to_string()),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn query() -> PageQuery {
        PageQuery { page: 2, page_size: 40, order_by: 2, order_ascending: false }
    }

    #[test]
    fn test_decode_listing_accepts_documented_shape() {
        let body = br#"{
            "data": { "image_list": [
                { "id": 7, "img_url": "https://cdn.example/7.jpg", "width": 800, "height": 600,
                  "created_at": "2024-05-01T12:00:00Z", "size": 4096 },
                { "id": "abc", "img_url": "https://cdn.example/abc.jpg", "thumbnail_url": "https://cdn.example/abc_t.jpg" }
            ] },
            "total_count": 250
        }"#;
        let listing = decode_listing(body).unwrap();
        assert_eq!(listing.total_count, Some(250));
        assert_eq!(listing.items.len(), 2);
        assert_eq!(listing.items[0].id, RawId::Number(7));
        assert_eq!(listing.items[1].id, RawId::Text("abc".into()));
        assert_eq!(listing.items[1].width, None);
    }

    #[test]
    fn test_decode_listing_rejects_other_shapes() {
        for body in [
            r#"{ "images": [] }"#,
            r#"[ { "id": 1, "img_url": "x" } ]"#,
            r#"{ "data": { "results": [] } }"#,
            r#"{ "data": { "image_list": [ { "id": 1 } ] } }"#,
        ] {
            let err = decode_listing(body.as_bytes()).unwrap_err();
            assert!(matches!(err, AppError::Parse(_)), "accepted {body}");
        }
    }

    #[tokio::test]
    async fn test_fetch_page_sends_query_and_decodes() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"data":{"image_list":[{"id":1,"img_url":"https://cdn.example/1.jpg"}]},"total_count":1}"#,
        )
        .await;

        let listing = client(url).fetch_page(&query()).await.unwrap();
        assert_eq!(listing.items.len(), 1);

        let request = server.await.unwrap();
        let request_line = request.lines().next().unwrap();
        assert!(request_line.starts_with("GET /open/event/image-list?"));
        for param in ["event_id=154770", "page=2", "page_size=40", "key=4030", "order_by=2", "order_asc=false"] {
            assert!(request_line.contains(param), "missing {param} in {request_line}");
        }
    }

    #[tokio::test]
    async fn test_fetch_page_maps_http_status() {
        let (url, server) = serve_once("429 Too Many Requests", r#"{"message":"slow down"}"#).await;

        let err = client(url).fetch_page(&query()).await.unwrap_err();
        assert_eq!(err, AppError::Http { status: 429, message: "slow down".into() });
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_page_maps_unreachable_host_to_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);

        let err = client(url).fetch_page(&query()).await.unwrap_err();
        assert!(matches!(err, AppError::Network { .. }), "got {err:?}");
    }
}
