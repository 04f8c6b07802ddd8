//! Common imports.
//!
//! ```
//! use volley::prelude::*;
//! ```

pub use crate::{
    Body, CancellationToken, Decoders, Error, Method, Outcome, Request, Result, RetryPolicy,
    StatusCode, Transport, header,
};
pub use serde::{Deserialize, Serialize};
