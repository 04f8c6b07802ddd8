//! Core types for the volley fluent HTTP request builder.
//!
//! This crate holds everything that does not touch the network:
//! - [`Location`] - URL composition (base, prefix/suffix, absolute path, query)
//! - [`Method`] - HTTP verbs
//! - [`StatusError`] and [`classify`] - response classification
//! - [`Decoders`] - media-type keyed decoding strategies
//! - [`Outcome`] - the result of one executed request
//! - [`Error`] and [`Result`] - error handling

mod decode;
mod error;
mod location;
mod method;
mod outcome;
mod status;

pub use decode::{DecodeFn, Decoders, Strategy, from_json, media_type, standard_decoders};
pub use error::{Error, Result};
pub use location::{Location, TIMEOUT_PARAM, join_path};
pub use method::Method;
pub use outcome::Outcome;
pub use status::{
    MAX_ERROR_BODY_BYTES, StatusError, classify, is_text_response, status_message,
};

// Re-export http crate types for status codes and headers
pub use http::{HeaderMap, StatusCode, header};

pub use cookie::Cookie;
