use anyhow::{Result, anyhow, bail};
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tracing::warn;

pub type HttpsClient = Client<
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
    String,
>;

/// Build the shared HTTPS client backed by the system certificate store.
pub fn build_client() -> Result<HttpsClient> {
    let mut root_store = rustls::RootCertStore::empty();
    let result = rustls_native_certs::load_native_certs();
    root_store.add_parsable_certificates(result.certs);

    if root_store.is_empty() {
        bail!("No valid system certificates found.");
    }

    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    let https_connector = HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .build();

    Ok(Client::builder(TokioExecutor::new()).build(https_connector))
}

/// Statuses worth another attempt: rate limiting and server-side failures.
pub fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Bounded exponential backoff schedule. `next_delay` returns the wait
/// before the following attempt, or `None` once attempts are exhausted.
#[derive(Debug, Clone)]
pub struct Backoff {
    retries_left: u32,
    delay: Duration,
    cap: Duration,
}

impl Backoff {
    pub fn new(attempts: u32, initial: Duration, cap: Duration) -> Self {
        Self {
            retries_left: attempts.saturating_sub(1),
            delay: initial,
            cap,
        }
    }

    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.retries_left == 0 {
            return None;
        }
        self.retries_left -= 1;
        let current = self.delay;
        self.delay = (self.delay * 2).min(self.cap);
        Some(current.min(self.cap))
    }
}

impl Default for Backoff {
    // 3 attempts, exponential wait from 4s capped at 10s.
    fn default() -> Self {
        Self::new(3, Duration::from_secs(4), Duration::from_secs(10))
    }
}

/// Send one request and collect the response body.
pub async fn send(
    client: &HttpsClient,
    request: Request<String>,
) -> Result<(http::response::Parts, Vec<u8>)> {
    let response = client
        .request(request)
        .await
        .map_err(|e| anyhow!("request failed: {}", e))?;
    let (parts, body) = response.into_parts();
    let bytes = body
        .collect()
        .await
        .map_err(|e| anyhow!("reading response body: {}", e))?
        .to_bytes();
    Ok((parts, bytes.to_vec()))
}

/// Send with retry: transient failures (connection errors, 429, 5xx) are
/// retried on the given backoff schedule, then surfaced. The request is
/// rebuilt per attempt by the closure.
pub async fn send_with_retry<F>(
    client: &HttpsClient,
    mut backoff: Backoff,
    what: &str,
    build: F,
) -> Result<(http::response::Parts, Vec<u8>)>
where
    F: Fn() -> Result<Request<String>>,
{
    let mut attempt = 1u32;
    loop {
        let outcome = send(client, build()?).await;
        match outcome {
            Ok((parts, body)) if !is_retryable(parts.status) => return Ok((parts, body)),
            Ok((parts, _)) => match backoff.next_delay() {
                Some(wait) => {
                    warn!(
                        "{}: got {} (attempt {}), retrying in {:?}",
                        what, parts.status, attempt, wait
                    );
                    tokio::time::sleep(wait).await;
                }
                None => bail!("{} failed after {} attempts: HTTP {}", what, attempt, parts.status),
            },
            Err(e) => match backoff.next_delay() {
                Some(wait) => {
                    warn!("{}: {} (attempt {}), retrying in {:?}", what, e, attempt, wait);
                    tokio::time::sleep(wait).await;
                }
                None => return Err(e.context(format!("{} failed after {} attempts", what, attempt))),
            },
        }
        attempt += 1;
    }
}
