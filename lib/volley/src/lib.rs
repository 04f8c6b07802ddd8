//! Fluent HTTP request builder with server-driven retry.
//!
//! Build a request step by step, execute it, then inspect or decode the
//! [`Outcome`]. Responses with status `429` or `5xx` that carry a
//! `Retry-After` header are re-sent, up to ten evaluated responses.
//!
//! # Example
//!
//! ```no_run
//! use volley::prelude::*;
//!
//! #[derive(Debug, Default, Deserialize)]
//! struct Greeting {
//!     hello: String,
//! }
//!
//! # async fn run() -> volley::Result<()> {
//! let outcome = Request::new("localhost:8080", "POST")
//!     .prefix(["/api"])
//!     .suffix(["echo"])
//!     .header("Content-Type", ["application/json"])
//!     .body(br#"{"hello":"world"}"#.as_slice())
//!     .execute()
//!     .await;
//!
//! let greeting: Greeting = outcome.decode()?;
//! assert_eq!(greeting.hello, "world");
//! # Ok(())
//! # }
//! ```

mod body;
mod config;
mod connector;
pub mod middleware;
pub mod prelude;
mod request;
mod retry;
mod transport;

pub use body::{Body, IntoBody, SeekableRead};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use connector::{default_tls, https_connector};
pub use request::{Request, StreamingBody};
pub use retry::{RetryPolicy, retry_after_seconds};
pub use transport::{
    BoxError, BoxedService, ResponseBody, ServiceFuture, Transport, TransportBuilder,
    TransportRequest, TransportResponse, default_transport, full_body, set_default_transport,
};

// Re-export core types
pub use volley_core::{
    Cookie, DecodeFn, Decoders, Error, HeaderMap, Method, Outcome, Result, StatusCode,
    StatusError, Strategy, from_json, header, media_type, standard_decoders, status_message,
};

pub use http;
pub use tokio_util::sync::CancellationToken;
pub use tower;
pub use url::Url;
