//! The network transport: a hyper-util client behind a tower service.

use std::error::Error as StdError;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tower::Layer;
use tower::util::BoxCloneService;
use tower_service::Service;

use crate::middleware::LoggingLayer;
use crate::{
    ClientConfig, Error, Result, config::ClientConfigBuilder, connector::https_connector,
};

/// Boxed error produced while reading a response body.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Body of a transport response.
pub type ResponseBody = UnsyncBoxBody<Bytes, BoxError>;

/// Request handed to the transport.
pub type TransportRequest = http::Request<Full<Bytes>>;

/// Response produced by the transport.
pub type TransportResponse = http::Response<ResponseBody>;

/// Type-erased transport service, the unit tower layers compose over.
pub type BoxedService = BoxCloneService<TransportRequest, TransportResponse, Error>;

/// Future returned by [`Transport`] as a tower service.
pub type ServiceFuture = Pin<Box<dyn Future<Output = Result<TransportResponse>> + Send + 'static>>;

/// Build a response body from bytes, mostly for hand-written transports.
#[must_use]
pub fn full_body(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

#[derive(Clone)]
struct SyncService {
    inner: Arc<Mutex<BoxedService>>,
}

impl SyncService {
    fn new(service: BoxedService) -> Self {
        Self {
            inner: Arc::new(Mutex::new(service)),
        }
    }

    fn call(&self, request: TransportRequest) -> ServiceFuture {
        let mut service = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        Box::pin(async move { service.call(request).await })
    }
}

#[derive(Clone)]
struct RawHyperClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Duration,
}

impl RawHyperClient {
    fn new(config: &ClientConfig) -> Self {
        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_idle_per_host)
            .build(https_connector(config));

        Self {
            inner,
            timeout: config.timeout,
        }
    }

    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let response = tokio::time::timeout(self.timeout, self.inner.request(request))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(map_hyper_error)?;

        Ok(response.map(|body| body.map_err(BoxError::from).boxed_unsync()))
    }
}

impl Service<TransportRequest> for RawHyperClient {
    type Response = TransportResponse;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: TransportRequest) -> Self::Future {
        let client = self.clone();
        Box::pin(async move { client.send(request).await })
    }
}

#[allow(clippy::needless_pass_by_value)]
fn map_hyper_error(err: hyper_util::client::legacy::Error) -> Error {
    let msg = error_chain_message(&err);

    if is_connection_reset(&err) {
        return Error::connection_reset(msg);
    }
    if err.is_connect() {
        return Error::connection(msg);
    }

    let lower = msg.to_ascii_lowercase();
    if lower.contains("ssl") || lower.contains("tls") || lower.contains("certificate") {
        return Error::tls(msg);
    }

    Error::connection(msg)
}

fn error_chain_message(err: &(dyn StdError + 'static)) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

fn io_kinds<'a>(err: &'a (dyn StdError + 'static)) -> impl Iterator<Item = io::ErrorKind> + 'a {
    std::iter::successors(Some(err), |&cause| cause.source())
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .map(io::Error::kind)
}

/// Whether a connection reset appears anywhere in the source chain.
pub(crate) fn is_connection_reset(err: &(dyn StdError + 'static)) -> bool {
    io_kinds(err).any(|kind| kind == io::ErrorKind::ConnectionReset)
}

/// Classify a failure met while reading a response body.
///
/// Failures that look like the connection going away are reported as
/// [`Error::StreamRead`], anything else as [`Error::UnexpectedRead`].
pub(crate) fn classify_read_error(err: &BoxError) -> Error {
    let err: &(dyn StdError + 'static) = &**err;
    let msg = error_chain_message(err);

    let closed = io_kinds(err).any(|kind| {
        matches!(
            kind,
            io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof
        )
    });
    let lower = msg.to_ascii_lowercase();
    if closed
        || lower.contains("stream error")
        || lower.contains("connection closed")
        || lower.contains("incomplete")
    {
        Error::StreamRead(msg)
    } else {
        Error::UnexpectedRead(msg)
    }
}

/// Handle on the network transport.
///
/// Cloning is cheap and clones share the connection pool.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use volley::Transport;
///
/// let transport = Transport::builder()
///     .timeout(Duration::from_secs(10))
///     .with_logging()
///     .build();
/// ```
#[derive(Clone)]
pub struct Transport {
    service: SyncService,
    config: ClientConfig,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Create a transport with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a transport with a custom configuration and no middleware.
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        let raw = RawHyperClient::new(&config);
        Self::with_service(BoxCloneService::new(raw), config)
    }

    /// Use any tower service as the transport.
    ///
    /// ```
    /// use volley::{Transport, TransportRequest, full_body};
    ///
    /// let transport = Transport::from_service(tower::service_fn(|_: TransportRequest| async {
    ///     Ok::<_, volley::Error>(http::Response::new(full_body("pong")))
    /// }));
    /// ```
    pub fn from_service<S>(service: S) -> Self
    where
        S: Service<TransportRequest, Response = TransportResponse, Error = Error>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        Self::with_service(BoxCloneService::new(service), ClientConfig::default())
    }

    fn with_service(service: BoxedService, config: ClientConfig) -> Self {
        Self {
            service: SyncService::new(service),
            config,
        }
    }

    /// Create a transport builder.
    #[must_use]
    pub fn builder() -> TransportBuilder {
        TransportBuilder::default()
    }

    /// The transport configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send one request.
    pub async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        self.service.call(request).await
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<TransportRequest> for Transport {
    type Response = TransportResponse;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: TransportRequest) -> Self::Future {
        self.service.call(request)
    }
}

type LayerFn = Arc<dyn Fn(BoxedService) -> BoxedService + Send + Sync>;

/// Builder for [`Transport`].
///
/// Layers are applied in order: first added is outermost.
#[derive(Default)]
pub struct TransportBuilder {
    config: ClientConfigBuilder,
    layers: Vec<LayerFn>,
}

impl std::fmt::Debug for TransportBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBuilder")
            .field("config", &self.config)
            .field("layers_count", &self.layers.len())
            .finish()
    }
}

impl TransportBuilder {
    /// Set the response timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.timeout(timeout);
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.connect_timeout(timeout);
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.config = self.config.pool_idle_per_host(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.pool_idle_timeout(timeout);
        self
    }

    /// Use a custom TLS configuration.
    #[must_use]
    pub fn tls(mut self, tls: Arc<rustls::ClientConfig>) -> Self {
        self.config = self.config.tls(tls);
        self
    }

    /// Add a tower layer around the transport.
    #[must_use]
    pub fn layer<L>(mut self, layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<TransportRequest, Response = TransportResponse, Error = Error>
            + Clone
            + Send
            + 'static,
        <L::Service as Service<TransportRequest>>::Future: Send + 'static,
    {
        self.layers.push(Arc::new(move |service| {
            BoxCloneService::new(layer.layer(service))
        }));
        self
    }

    /// Alias for [`TransportBuilder::layer`].
    #[must_use]
    pub fn with<L>(self, layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<TransportRequest, Response = TransportResponse, Error = Error>
            + Clone
            + Send
            + 'static,
        <L::Service as Service<TransportRequest>>::Future: Send + 'static,
    {
        self.layer(layer)
    }

    /// Log each request and its outcome at info level.
    #[must_use]
    pub fn with_logging(self) -> Self {
        self.layer(LoggingLayer::new())
    }

    /// Log each request with its headers at debug level.
    #[must_use]
    pub fn with_debug_logging(self) -> Self {
        self.layer(LoggingLayer::debug())
    }

    /// Build the transport.
    #[must_use]
    pub fn build(self) -> Transport {
        let config = self.config.build();
        let mut service: BoxedService = BoxCloneService::new(RawHyperClient::new(&config));

        for layer_fn in self.layers.into_iter().rev() {
            service = layer_fn(service);
        }

        Transport::with_service(service, config)
    }
}

static DEFAULT_TRANSPORT: RwLock<Option<Transport>> = RwLock::new(None);

/// The process-wide default transport.
///
/// Built from [`ClientConfig::default`] on first use unless one was set with
/// [`set_default_transport`].
#[must_use]
pub fn default_transport() -> Transport {
    if let Some(transport) = DEFAULT_TRANSPORT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        return transport.clone();
    }

    DEFAULT_TRANSPORT
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .get_or_insert_with(Transport::new)
        .clone()
}

/// Replace the process-wide default transport, returning the previous one.
pub fn set_default_transport(transport: Transport) -> Option<Transport> {
    DEFAULT_TRANSPORT
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(transport)
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;

    #[derive(Debug)]
    struct Wrapped(io::Error);

    impl std::fmt::Display for Wrapped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("wrapped")
        }
    }

    impl StdError for Wrapped {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn builder_applies_config() {
        let transport = Transport::builder()
            .timeout(Duration::from_secs(60))
            .pool_idle_per_host(4)
            .with_logging()
            .build();

        check!(transport.config().timeout == Duration::from_secs(60));
        check!(transport.config().pool_idle_per_host == 4);
    }

    #[test]
    fn transport_is_debug() {
        let debug = format!("{:?}", Transport::new());
        check!(debug.contains("Transport"));
    }

    #[test]
    fn reset_is_found_through_the_source_chain() {
        let err = Wrapped(io::Error::from(io::ErrorKind::ConnectionReset));
        check!(is_connection_reset(&err));

        let err = Wrapped(io::Error::from(io::ErrorKind::TimedOut));
        check!(!is_connection_reset(&err));
    }

    #[test]
    fn read_errors_are_classified() {
        let closed: BoxError = Box::new(Wrapped(io::Error::from(io::ErrorKind::UnexpectedEof)));
        let_assert!(Error::StreamRead(msg) = classify_read_error(&closed));
        check!(msg.starts_with("wrapped: "));

        let other: BoxError = "decoder exploded".into();
        let_assert!(Error::UnexpectedRead(msg) = classify_read_error(&other));
        check!(msg == "decoder exploded");

        let incomplete: BoxError = "incomplete message".into();
        let_assert!(Error::StreamRead(_) = classify_read_error(&incomplete));
    }

    #[tokio::test]
    async fn from_service_routes_requests() {
        let transport = Transport::from_service(tower::service_fn(|req: TransportRequest| async move {
            let body = full_body(req.uri().path().to_string());
            Ok::<_, Error>(http::Response::new(body))
        }));

        let request = http::Request::builder()
            .uri("http://localhost/ping")
            .body(Full::default())
            .expect("request");
        let response = transport.send(request).await.expect("response");
        let body = response.into_body().collect().await.expect("body").to_bytes();
        check!(body.as_ref() == b"/ping");
    }
}
