//! DNS over HTTPS transport
//!
//! Queries are POSTed in wire format to `<server>/dns-query` using the
//! `application/dns-message` media type for both request and response.

use std::time::Duration;

use hickory_proto::op::Message;

use crate::error::{Error, Result};

/// Media type of a wire-format DNS message
pub const DNS_MESSAGE_MEDIA_TYPE: &str = "application/dns-message";

/// Path the query is posted to
pub const DOH_PATH: &str = "/dns-query";

/// HTTP client for DNS over HTTPS
#[derive(Clone)]
pub struct DohTransport {
    client: reqwest::Client,
}

impl DohTransport {
    /// Create a transport whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Wrap an existing HTTP client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Send `query` to the DoH server at `server` (`https://host[:port]`)
    pub async fn exchange(&self, server: &str, query: &Message) -> Result<Message> {
        let body = query
            .to_vec()
            .map_err(|e| Error::Encode(e.to_string()))?;

        let url = doh_url(server);
        log::debug!("DoH POST {} ({} bytes)", url, body.len());

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, DNS_MESSAGE_MEDIA_TYPE)
            .header(reqwest::header::ACCEPT, DNS_MESSAGE_MEDIA_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("DoH request failed: {}", e)))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(Error::Transport(format!(
                "error fetching response {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("failed to read DoH response: {}", e)))?;

        Message::from_vec(&body).map_err(|e| Error::Decode(e.to_string()))
    }
}

fn doh_url(server: &str) -> String {
    format!("{}{}", server.trim_end_matches('/'), DOH_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doh_url() {
        assert_eq!(
            doh_url("https://cloudflare-dns.com"),
            "https://cloudflare-dns.com/dns-query"
        );
        assert_eq!(
            doh_url("https://doh.example.net:8443/"),
            "https://doh.example.net:8443/dns-query"
        );
    }

    #[test]
    fn test_transport_creation() {
        assert!(DohTransport::new(Duration::from_secs(5)).is_ok());
    }

    /// Serve one HTTP response on `listener` and return the request head
    async fn serve_once(
        listener: tokio::net::TcpListener,
        status: &'static str,
        body: &'static [u8],
    ) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        let head_end = loop {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before request head");
            request.extend_from_slice(&buf[..n]);
            if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&request[..head_end]).to_ascii_lowercase();
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while request.len() < head_end + content_length {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before request body");
            request.extend_from_slice(&buf[..n]);
        }

        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            status,
            DNS_MESSAGE_MEDIA_TYPE,
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.write_all(body).await.unwrap();
        stream.shutdown().await.unwrap();

        head
    }

    async fn stub(
        status: &'static str,
        body: &'static [u8],
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = format!("http://{}", listener.local_addr().unwrap());
        (server, tokio::spawn(serve_once(listener, status, body)))
    }

    #[tokio::test]
    async fn test_post_target_and_headers() {
        let (server, handle) = stub("503 Service Unavailable", b"").await;
        let transport = DohTransport::with_client(reqwest::Client::new());

        let _ = transport.exchange(&server, &Message::new()).await;

        let head = handle.await.unwrap();
        assert!(head.starts_with("post /dns-query http/1.1\r\n"), "{head}");
        assert!(head.contains("content-type: application/dns-message\r\n"), "{head}");
        assert!(head.contains("accept: application/dns-message\r\n"), "{head}");
    }

    #[tokio::test]
    async fn test_non_ok_status_is_transport_error() {
        let (server, handle) = stub("503 Service Unavailable", b"").await;
        let transport = DohTransport::with_client(reqwest::Client::new());

        let err = transport.exchange(&server, &Message::new()).await.unwrap_err();
        handle.await.unwrap();

        assert!(matches!(err, Error::Transport(ref msg) if msg.contains("503")), "{err}");
    }

    #[tokio::test]
    async fn test_undecodable_body_is_decode_error() {
        let (server, handle) = stub("200 OK", b"\xff").await;
        let transport = DohTransport::with_client(reqwest::Client::new());

        let err = transport.exchange(&server, &Message::new()).await.unwrap_err();
        handle.await.unwrap();

        assert!(matches!(err, Error::Decode(_)), "{err}");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let transport = DohTransport::new(Duration::from_millis(500)).unwrap();
        let err = transport
            .exchange("https://127.0.0.1:1", &Message::new())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
