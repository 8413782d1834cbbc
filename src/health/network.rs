// ABOUTME: HTTP and TCP health probes over plain tokio sockets.
// ABOUTME: HTTP uses a one-shot hyper http1 connection per probe.

use super::{HealthCheck, HealthProber, ProbeError};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::{Request, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;

const USER_AGENT: &str = concat!("convoy-health/", env!("CARGO_PKG_VERSION"));

/// Probes over the network with a per-probe timeout.
#[derive(Debug, Clone)]
pub struct NetworkProber {
    timeout: Duration,
}

impl NetworkProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn get(&self, uri: &Uri, host: &str, port: u16) -> Result<StatusCode, String> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| format!("connect to {host}:{port} failed: {e}"))?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| format!("HTTP handshake failed: {e}"))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::trace!("probe connection closed: {}", e);
            }
        });

        let path = uri.path_and_query().map_or("/", |p| p.as_str());
        let req = Request::builder()
            .method("GET")
            .uri(path)
            .header("Host", format!("{host}:{port}"))
            .header("User-Agent", USER_AGENT)
            .body(Empty::<Bytes>::new())
            .map_err(|e| format!("failed to build request: {e}"))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        let status = resp.status();

        // Drain so the server sees a complete exchange.
        let _ = resp.into_body().collect().await;
        Ok(status)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Split an `http://host[:port]/path` url.
fn parse_http_url(url: &str) -> Result<(Uri, String, u16), ProbeError> {
    let invalid = |reason: &str| ProbeError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let uri: Uri = url.parse().map_err(|_| invalid("not a valid URI"))?;
    if uri.scheme_str() != Some("http") {
        return Err(invalid("only http:// is supported"));
    }
    let host = uri.host().ok_or_else(|| invalid("missing host"))?.to_string();
    let port = uri.port_u16().unwrap_or(80);
    Ok((uri, host, port))
}

#[async_trait]
impl HealthProber for NetworkProber {
    async fn check_http(&self, url: &str) -> Result<HealthCheck, ProbeError> {
        let (uri, host, port) = parse_http_url(url)?;
        let started = Instant::now();

        let check = match tokio::time::timeout(self.timeout, self.get(&uri, &host, port)).await {
            Ok(Ok(status)) if status.is_success() => {
                HealthCheck::passed(Some(status.as_u16()), elapsed_ms(started))
            }
            Ok(Ok(status)) => HealthCheck {
                healthy: false,
                status_code: Some(status.as_u16()),
                response_time_ms: elapsed_ms(started),
                error_message: Some(format!("HTTP {status}")),
            },
            Ok(Err(e)) => HealthCheck::failed(elapsed_ms(started), e),
            Err(_) => HealthCheck::failed(
                elapsed_ms(started),
                format!("timed out after {:?}", self.timeout),
            ),
        };

        tracing::trace!(url, healthy = check.healthy, "http probe");
        Ok(check)
    }

    async fn check_tcp(&self, host: &str, port: u16) -> Result<HealthCheck, ProbeError> {
        let started = Instant::now();
        let check = match tokio::time::timeout(self.timeout, TcpStream::connect((host, port))).await
        {
            Ok(Ok(_)) => HealthCheck::passed(None, elapsed_ms(started)),
            Ok(Err(e)) => HealthCheck::failed(elapsed_ms(started), e.to_string()),
            Err(_) => HealthCheck::failed(
                elapsed_ms(started),
                format!("timed out after {:?}", self.timeout),
            ),
        };
        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(response: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        port
    }

    #[test]
    fn url_parsing() {
        let (uri, host, port) = parse_http_url("http://10.0.0.5:8081/health?deep=1").unwrap();
        assert_eq!(host, "10.0.0.5");
        assert_eq!(port, 8081);
        assert_eq!(uri.path_and_query().unwrap().as_str(), "/health?deep=1");

        assert_eq!(parse_http_url("http://svc/").unwrap().2, 80);
        assert!(parse_http_url("https://svc/health").is_err());
        assert!(parse_http_url("not a url").is_err());
    }

    #[tokio::test]
    async fn success_status_is_healthy() {
        let port =
            serve_once("HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok").await;
        let prober = NetworkProber::new(Duration::from_secs(2));
        let check = prober
            .check_http(&format!("http://127.0.0.1:{port}/health"))
            .await
            .unwrap();
        assert!(check.healthy);
        assert_eq!(check.status_code, Some(200));
    }

    #[tokio::test]
    async fn error_status_is_unhealthy() {
        let port = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
        let prober = NetworkProber::new(Duration::from_secs(2));
        let check = prober
            .check_http(&format!("http://127.0.0.1:{port}/health"))
            .await
            .unwrap();
        assert!(!check.healthy);
        assert_eq!(check.status_code, Some(503));
    }

    #[tokio::test]
    async fn refused_connection_is_unhealthy_not_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let prober = NetworkProber::new(Duration::from_secs(2));
        let http = prober
            .check_http(&format!("http://127.0.0.1:{port}/"))
            .await
            .unwrap();
        assert!(!http.healthy);
        assert!(http.error_message.is_some());

        let tcp = prober.check_tcp("127.0.0.1", port).await.unwrap();
        assert!(!tcp.healthy);
    }
}
