//! Tower middleware for the volley transport.
//!
//! Layers wrap the [`Transport`](crate::Transport) service and see every
//! attempt, retries included. Add them with
//! [`TransportBuilder::layer`](crate::TransportBuilder::layer):
//!
//! ```no_run
//! use volley::Transport;
//! use volley::middleware::LoggingLayer;
//!
//! let transport = Transport::builder()
//!     .layer(LoggingLayer::debug())
//!     .build();
//! ```

mod logging;

pub use logging::{LogLevel, Logging, LoggingLayer};

pub use tower::{Layer, ServiceBuilder};
