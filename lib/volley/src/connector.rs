//! HTTPS connector using rustls.

use std::sync::Arc;

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;

use crate::ClientConfig;

/// Create an HTTP/HTTPS connector for the given configuration.
///
/// Plain `http://` is allowed alongside TLS. Both HTTP/1.1 and HTTP/2 are
/// enabled. Without a TLS override the Mozilla root certificates are trusted.
#[must_use]
pub fn https_connector(config: &ClientConfig) -> HttpsConnector<HttpConnector> {
    let tls_config = config
        .tls
        .as_deref()
        .cloned()
        .unwrap_or_else(default_tls_config);

    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(Some(config.connect_timeout));

    HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http)
}

fn default_tls_config() -> rustls::ClientConfig {
    let root_store: rustls::RootCertStore =
        webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();

    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

/// Shared default TLS configuration, for callers that want to tweak it.
#[must_use]
pub fn default_tls() -> Arc<rustls::ClientConfig> {
    Arc::new(default_tls_config())
}
