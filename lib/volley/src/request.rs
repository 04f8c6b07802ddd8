//! The fluent request builder.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::{StreamExt, TryStreamExt};
use http::{HeaderMap, HeaderName, HeaderValue};
use http_body_util::{BodyExt, BodyStream};
use tokio_util::sync::CancellationToken;
use url::Url;
use volley_core::{Decoders, Location, MAX_ERROR_BODY_BYTES, Outcome, standard_decoders};

use crate::retry::{Exchange, cancellable, read_prefix};
use crate::transport::classify_read_error;
use crate::{Error, IntoBody, Method, Result, RetryPolicy, Transport, default_transport};

/// Live response body returned by [`Request::stream`].
pub type StreamingBody = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

struct Pending {
    location: Location,
    method: Method,
    headers: HeaderMap,
    body: Option<crate::Body>,
    transport: Option<Transport>,
    cancel: Option<CancellationToken>,
    retry: RetryPolicy,
    decoders: Arc<Decoders>,
}

impl Pending {
    fn into_exchange(self) -> (Exchange, Arc<Decoders>) {
        let exchange = Exchange {
            transport: self.transport.unwrap_or_else(default_transport),
            method: self.method,
            url: self.location.url(),
            headers: self.headers,
            body: self.body,
            cancel: self.cancel,
            policy: self.retry,
        };
        (exchange, self.decoders)
    }
}

/// A request being configured.
///
/// Every configuration method is chainable. The first configuration error is
/// kept, later calls become no-ops, and the error is reported on execution.
///
/// ```no_run
/// # async fn run() -> volley::Result<()> {
/// use std::time::Duration;
/// use volley::Request;
///
/// #[derive(Debug, Default, serde::Deserialize)]
/// struct Pod {
///     name: String,
/// }
///
/// let outcome = Request::new("https://api.example.com", "get")
///     .prefix(["/api", "v1"])
///     .suffix(["pods", "web-0"])
///     .timeout(Duration::from_secs(5))
///     .execute()
///     .await;
///
/// let pod: Pod = outcome.decode()?;
/// # Ok(())
/// # }
/// ```
pub struct Request {
    inner: Result<Pending>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Ok(pending) => f
                .debug_struct("Request")
                .field("method", &pending.method)
                .field("url", &pending.location.url().as_str())
                .field("body", &pending.body)
                .finish_non_exhaustive(),
            Err(err) => f.debug_struct("Request").field("error", err).finish(),
        }
    }
}

impl Request {
    /// Start a request against `base` with a case-insensitive HTTP verb.
    ///
    /// `base` is either a full URL or a bare host.
    pub fn new(base: impl AsRef<str>, verb: impl AsRef<str>) -> Self {
        let inner = verb
            .as_ref()
            .parse::<Method>()
            .and_then(|method| Self::pending(base.as_ref(), method));
        Self { inner }
    }

    /// Start a request with an already typed method.
    pub fn with_method(base: impl AsRef<str>, method: Method) -> Self {
        Self {
            inner: Self::pending(base.as_ref(), method),
        }
    }

    fn pending(base: &str, method: Method) -> Result<Pending> {
        Ok(Pending {
            location: Location::parse(base)?,
            method,
            headers: HeaderMap::new(),
            body: None,
            transport: None,
            cancel: None,
            retry: RetryPolicy::default(),
            decoders: standard_decoders(),
        })
    }

    fn configure(mut self, apply: impl FnOnce(&mut Pending) -> Result<()>) -> Self {
        if let Ok(pending) = &mut self.inner {
            if let Err(err) = apply(pending) {
                self.inner = Err(err);
            }
        }
        self
    }

    /// Send through this transport instead of the process-wide default.
    #[must_use]
    pub fn transport(self, transport: Transport) -> Self {
        self.configure(|pending| {
            pending.transport = Some(transport);
            Ok(())
        })
    }

    /// Set a header, replacing any value it had.
    #[must_use]
    pub fn header<I, V>(self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: AsRef<str>,
    {
        self.configure(|pending| {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::InvalidHeader(format!("{name}: {e}")))?;
            let values = values
                .into_iter()
                .map(|value| {
                    HeaderValue::from_str(value.as_ref())
                        .map_err(|e| Error::InvalidHeader(format!("{name}: {e}")))
                })
                .collect::<Result<Vec<_>>>()?;

            pending.headers.remove(&name);
            for value in values {
                pending.headers.append(name.clone(), value);
            }
            Ok(())
        })
    }

    /// Ask the server to answer within `timeout`.
    ///
    /// Sent as the `timeout` query parameter; nothing is enforced locally.
    #[must_use]
    pub fn timeout(self, timeout: Duration) -> Self {
        self.configure(|pending| {
            pending.location.set_timeout(timeout);
            Ok(())
        })
    }

    /// Abort the execution when `token` is cancelled.
    ///
    /// This covers sending, retry waits and reading the response body,
    /// including the body handed out by [`Request::stream`].
    #[must_use]
    pub fn cancel_on(self, token: CancellationToken) -> Self {
        self.configure(|pending| {
            pending.cancel = Some(token);
            Ok(())
        })
    }

    /// Append path prefix segments.
    #[must_use]
    pub fn prefix<I, S>(self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.configure(|pending| {
            pending.location.prefix(segments);
            Ok(())
        })
    }

    /// Append path suffix segments.
    #[must_use]
    pub fn suffix<I, S>(self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.configure(|pending| {
            pending.location.suffix(segments);
            Ok(())
        })
    }

    /// Replace the path with segments under the base path.
    #[must_use]
    pub fn abs_path<I, S>(self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.configure(|pending| {
            pending.location.abs_path(segments);
            Ok(())
        })
    }

    /// Take path and query from a request URI such as `/pods?watch=true`.
    #[must_use]
    pub fn request_uri(self, uri: &str) -> Self {
        self.configure(|pending| pending.location.request_uri(uri))
    }

    /// Add a query parameter value. Repeated names accumulate.
    #[must_use]
    pub fn param(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.configure(|pending| {
            pending.location.param(name, value);
            Ok(())
        })
    }

    /// Set the request body.
    #[must_use]
    pub fn body(self, body: impl IntoBody) -> Self {
        self.configure(|pending| {
            pending.body = Some(body.into_body()?);
            Ok(())
        })
    }

    /// Use another retry policy.
    #[must_use]
    pub fn retry_policy(self, policy: RetryPolicy) -> Self {
        self.configure(|pending| {
            pending.retry = policy;
            Ok(())
        })
    }

    /// Use another decoding registry for the outcome.
    #[must_use]
    pub fn decoders(self, decoders: impl Into<Arc<Decoders>>) -> Self {
        self.configure(|pending| {
            pending.decoders = decoders.into();
            Ok(())
        })
    }

    /// The URL that would be sent.
    pub fn url(&self) -> Result<Url> {
        match &self.inner {
            Ok(pending) => Ok(pending.location.url()),
            Err(err) => Err(err.clone()),
        }
    }

    /// The configuration error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        self.inner.as_ref().err()
    }

    /// Send the request, retrying as the server asks, and read the whole response.
    pub async fn execute(self) -> Outcome {
        let pending = match self.inner {
            Ok(pending) => pending,
            Err(err) => return Outcome::from_error(err),
        };
        let (exchange, decoders) = pending.into_exchange();
        let cancel = exchange.cancel.clone();

        let response = match exchange.send_with_retry().await {
            Ok(response) => response,
            Err(err) => return Outcome::from_error(err),
        };

        let (parts, body) = response.into_parts();
        let read = async {
            body.collect()
                .await
                .map(|collected| collected.to_bytes())
                .map_err(|err| classify_read_error(&err))
        };
        match cancellable(cancel.as_ref(), read).await {
            Ok(bytes) => Outcome::from_response(parts.status, parts.headers, bytes, decoders),
            Err(err) => Outcome::from_error(err),
        }
    }

    /// Send the request once and hand back the live body.
    ///
    /// On a 2xx the body is streamed as it arrives. Any other status reads a
    /// short body sample and returns the classified error.
    pub async fn stream(self) -> Result<StreamingBody> {
        let (mut exchange, _) = self.inner?.into_exchange();
        let request = exchange.build_request().await?;
        let response = exchange.send_once(request).await?;

        let status = response.status();
        if status.is_success() {
            let body: StreamingBody = Box::pin(
                BodyStream::new(response.into_body())
                    .map_ok(|frame| frame.into_data().unwrap_or_default())
                    .map_err(|err| classify_read_error(&err)),
            );
            return Ok(match exchange.cancel {
                Some(token) => until_cancelled(body, token),
                None => body,
            });
        }

        let (parts, body) = response.into_parts();
        let sample = cancellable(
            exchange.cancel.as_ref(),
            read_prefix(body, MAX_ERROR_BODY_BYTES),
        )
        .await?;
        Err(volley_core::classify(status, &parts.headers, &sample).map_or_else(
            || Error::UnexpectedStatus {
                status: status.as_u16(),
                url: exchange.url.to_string(),
                body: String::from_utf8_lossy(&sample).into_owned(),
            },
            Error::from,
        ))
    }
}

/// Yield `body` until `token` fires, then a single `Cancelled` error.
fn until_cancelled(body: StreamingBody, token: CancellationToken) -> StreamingBody {
    let stream = futures_util::stream::unfold(Some((body, token)), |state| async move {
        let (mut body, token) = state?;
        tokio::select! {
            biased;
            () = token.cancelled() => Some((Err(Error::Cancelled), None)),
            item = body.next() => item.map(|item| (item, Some((body, token)))),
        }
    });
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;

    #[test]
    fn verb_is_case_insensitive() {
        check!(Request::new("http://localhost", "pAtCh").error().is_none());
        let request = Request::new("http://localhost", "FETCH");
        let_assert!(Some(Error::InvalidMethod(_)) = request.error());
    }

    #[test]
    fn composes_the_url() {
        let url = Request::new("http://localhost:8080", "GET")
            .prefix(["/api", "/v1"])
            .suffix(["items", ""])
            .param("a", "1")
            .param("a", "2")
            .url()
            .expect("url");
        check!(url.as_str() == "http://localhost:8080/api/v1/items?a=1&a=2");
    }

    #[test]
    fn timeout_wins_over_param() {
        let url = Request::new("http://localhost", "GET")
            .param("timeout", "99")
            .timeout(Duration::from_secs(2))
            .url()
            .expect("url");
        check!(url.query() == Some("timeout=2s"));
    }

    #[test]
    fn first_error_sticks() {
        let request = Request::new("http://localhost", "GET")
            .header("bad header", ["x"])
            .body(Box::new(7_i32) as Box<dyn std::any::Any + Send>)
            .prefix(["ignored"]);

        let_assert!(Some(Error::InvalidHeader(_)) = request.error());
        let_assert!(Err(Error::InvalidHeader(_)) = request.url());
    }

    #[test]
    fn unknown_body_type_is_reported() {
        let request = Request::new("http://localhost", "POST")
            .body(Box::new(7_i32) as Box<dyn std::any::Any + Send>);
        let_assert!(Some(Error::UnknownBodyType(_)) = request.error());
    }

    #[tokio::test]
    async fn configuration_error_surfaces_on_execution() {
        let outcome = Request::new("http://localhost", "GET")
            .request_uri("http://[::1")
            .execute()
            .await;

        check!(outcome.status_code() == 0);
        let_assert!(Some(Error::InvalidUrl(_)) = outcome.error());
    }

    #[test]
    fn header_replaces_previous_values() {
        let request = Request::new("http://localhost", "GET")
            .header("X-Trace", ["a", "b"])
            .header("x-trace", ["c"]);

        let_assert!(Ok(pending) = &request.inner);
        let values: Vec<_> = pending
            .headers
            .get_all("x-trace")
            .iter()
            .map(|value| value.to_str().ok())
            .collect();
        check!(values == [Some("c")]);
    }
}
