//! Server-driven retry.
//!
//! A response is retried only when the server asks for it: status `429` or
//! any `5xx`, together with an integer `Retry-After` header. Each evaluated
//! response counts as one attempt, the first one included.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderValue, StatusCode, header};
use http_body_util::{BodyExt, Full};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;
use volley_core::MAX_ERROR_BODY_BYTES;

use crate::{
    Body, Error, Method, ResponseBody, Result, Transport, TransportRequest, TransportResponse,
    full_body,
};

/// Retry settings.
///
/// ```
/// use std::time::Duration;
/// use volley::RetryPolicy;
///
/// let policy = RetryPolicy::default().with_max_delay(Duration::from_secs(5));
/// assert_eq!(policy.max_attempts(), 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    honor_retry_after: bool,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            honor_retry_after: true,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that re-sends right away, ignoring the `Retry-After` delay.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            honor_retry_after: false,
            ..Self::default()
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Set the maximum number of evaluated responses, at least one.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the upper bound on a single `Retry-After` wait.
    #[must_use]
    pub const fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Choose whether to wait for `Retry-After` before re-sending.
    #[must_use]
    pub const fn honor_retry_after(mut self, honor: bool) -> Self {
        self.honor_retry_after = honor;
        self
    }

    /// Maximum number of evaluated responses.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Upper bound on a single wait.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Time to wait before the next attempt.
    #[must_use]
    pub fn delay_for(&self, retry_after_seconds: i64) -> Duration {
        if !self.honor_retry_after {
            return Duration::ZERO;
        }
        let seconds = u64::try_from(retry_after_seconds).unwrap_or(0);
        Duration::from_secs(seconds).min(self.max_delay)
    }
}

/// The `Retry-After` header as whole seconds.
///
/// HTTP dates and anything else that is not an integer count as absent.
#[must_use]
pub fn retry_after_seconds(headers: &HeaderMap) -> Option<i64> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// The `Retry-After` seconds when the response may be retried.
fn wait_candidate(status: StatusCode, headers: &HeaderMap) -> Option<i64> {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        retry_after_seconds(headers)
    } else {
        None
    }
}

/// Read at most `limit` bytes of a body, then drop the rest.
pub(crate) async fn read_prefix(mut body: ResponseBody, limit: usize) -> Result<Bytes> {
    let mut buffer = BytesMut::new();
    while buffer.len() < limit {
        let Some(frame) = body.frame().await else {
            break;
        };
        let frame = frame.map_err(|e| crate::transport::classify_read_error(&e))?;
        if let Ok(data) = frame.into_data() {
            buffer.extend_from_slice(&data);
        }
    }
    buffer.truncate(limit);
    Ok(buffer.freeze())
}

/// Run `fut` unless `token` is cancelled first.
pub(crate) async fn cancellable<T>(
    token: Option<&CancellationToken>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match token {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => Err(Error::Cancelled),
            result = fut => result,
        },
        None => fut.await,
    }
}

/// Drain a small response so its connection can go back to the pool.
///
/// Read failures are only logged; cancellation is returned.
async fn drain(response: TransportResponse, token: Option<&CancellationToken>) -> Result<()> {
    let declared = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());

    if declared.is_none_or(|length| length <= MAX_ERROR_BODY_BYTES) {
        let read = read_prefix(response.into_body(), MAX_ERROR_BODY_BYTES);
        match cancellable(token, read).await {
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => debug!(error = %err, "draining response body failed"),
            Ok(_) => {}
        }
    }
    Ok(())
}

fn reset_placeholder() -> TransportResponse {
    let mut response = http::Response::new(full_body(Bytes::new()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
    response
}

/// Everything needed to send one request, possibly several times.
pub(crate) struct Exchange {
    pub(crate) transport: Transport,
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<Body>,
    pub(crate) cancel: Option<CancellationToken>,
    pub(crate) policy: RetryPolicy,
}

impl Exchange {
    pub(crate) async fn build_request(&mut self) -> Result<TransportRequest> {
        let body = match &mut self.body {
            Some(body) => body.read_all().await?,
            None => Bytes::new(),
        };

        let mut request = http::Request::builder()
            .method(http::Method::from(self.method))
            .uri(self.url.as_str())
            .body(Full::new(body))
            .map_err(|e| Error::invalid_request(e.to_string()))?;
        *request.headers_mut() = self.headers.clone();

        Ok(request)
    }

    pub(crate) async fn send_once(&self, request: TransportRequest) -> Result<TransportResponse> {
        cancellable(self.cancel.as_ref(), self.transport.send(request)).await
    }

    async fn rewind(&mut self) -> Result<()> {
        match &mut self.body {
            Some(body) => body.rewind().await,
            None => Ok(()),
        }
    }

    async fn sleep(&self, delay: Duration) -> Result<()> {
        cancellable(self.cancel.as_ref(), async {
            tokio::time::sleep(delay).await;
            Ok::<_, Error>(())
        })
        .await
    }

    /// Send until the response is terminal, returning that response.
    ///
    /// Transport failures are returned as is, except a connection reset on a
    /// GET, which is treated as a `500` asking to retry after one second.
    pub(crate) async fn send_with_retry(mut self) -> Result<TransportResponse> {
        let mut attempts = 0_u32;

        loop {
            let request = self.build_request().await?;
            let response = match self.send_once(request).await {
                Ok(response) => response,
                Err(err) if err.is_connection_reset() && self.method == Method::Get => {
                    debug!(method = %self.method, url = %self.url, error = %err, "connection reset");
                    reset_placeholder()
                }
                Err(err) => return Err(err),
            };

            attempts += 1;
            let status = response.status();
            debug!(
                method = %self.method,
                url = %self.url,
                attempt = attempts,
                status = status.as_u16(),
                "response received"
            );

            let Some(retry_after) = wait_candidate(status, response.headers()) else {
                return Ok(response);
            };
            if attempts >= self.policy.max_attempts {
                return Ok(response);
            }
            if let Err(err) = self.rewind().await {
                warn!(url = %self.url, error = %err, "cannot replay request body, not retrying");
                return Ok(response);
            }

            drain(response, self.cancel.as_ref()).await?;

            let delay = self.policy.delay_for(retry_after);
            if !delay.is_zero() {
                debug!(
                    url = %self.url,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "waiting before retry"
                );
                self.sleep(delay).await?;
            }
        }
    }
}
