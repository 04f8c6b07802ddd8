//! Content decoding keyed by media type.
//!
//! [`Decoders`] is a registry from media type to [`Strategy`]. The standard
//! registry knows `application/json`, `application/yaml`, `application/xml`
//! and `text/xml`; new formats are added with [`Decoders::register`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use volley_core::{Decoders, Strategy};
//!
//! let decoders = Decoders::default().register(
//!     "application/x-ndjson",
//!     Strategy::custom(|data| {
//!         let first = data.split(|b| *b == b'\n').next().unwrap_or_default();
//!         serde_json::from_slice(first)
//!             .map_err(|e| volley_core::Error::json_deserialization("", e.to_string()))
//!     }),
//! );
//!
//! let mut value = serde_json::Value::Null;
//! let decoded = decoders
//!     .decode_into(b"{\"a\":1}\n{\"a\":2}", "application/x-ndjson", &mut value)
//!     .expect("decode");
//! assert!(decoded);
//! assert_eq!(value["a"], 1);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Custom decoding routine: bytes in, JSON value out.
///
/// The value is then deserialized into the caller's target type.
pub type DecodeFn = Arc<dyn Fn(&[u8]) -> Result<serde_json::Value> + Send + Sync>;

/// How to turn bytes of one media type into a value.
#[derive(Clone)]
pub enum Strategy {
    /// `serde_json`, with path-aware errors.
    Json,
    /// `serde_yaml`.
    Yaml,
    /// `quick-xml` serde support.
    Xml,
    /// A custom routine producing a JSON value.
    Custom(DecodeFn),
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("Json"),
            Self::Yaml => f.write_str("Yaml"),
            Self::Xml => f.write_str("Xml"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Strategy {
    /// Wrap a closure as a custom strategy.
    pub fn custom<F>(decode: F) -> Self
    where
        F: Fn(&[u8]) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(decode))
    }

    /// Decode `data` into a `T`.
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            Self::Json => from_json(data),
            Self::Yaml => {
                serde_yaml::from_slice(data).map_err(|e| Error::YamlDeserialization(e.to_string()))
            }
            Self::Xml => quick_xml::de::from_reader(data)
                .map_err(|e| Error::XmlDeserialization(e.to_string())),
            Self::Custom(decode) => {
                let value = decode(data)?;
                serde_path_to_error::deserialize(value).map_err(|e| {
                    Error::json_deserialization(e.path().to_string(), e.inner().to_string())
                })
            }
        }
    }
}

/// Deserialize JSON bytes to a value with path-aware error messages.
///
/// ```
/// use volley_core::from_json;
/// use serde::Deserialize;
///
/// #[derive(Debug, PartialEq, Deserialize)]
/// struct User { name: String }
///
/// let user: User = from_json(br#"{"name":"Alice"}"#).expect("deserialize");
/// assert_eq!(user, User { name: "Alice".to_string() });
/// ```
pub fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer)
        .map_err(|e| Error::json_deserialization(e.path().to_string(), e.inner().to_string()))
}

/// Extract the lowercase media type from a `Content-Type` value.
///
/// ```
/// assert_eq!(
///     volley_core::media_type("Application/JSON; charset=utf-8").as_deref(),
///     Ok("application/json")
/// );
/// assert!(volley_core::media_type("").is_err());
/// ```
pub fn media_type(content_type: &str) -> Result<String> {
    content_type
        .parse::<mime::Mime>()
        .map(|media| media.essence_str().to_ascii_lowercase())
        .map_err(|e| Error::InvalidMediaType(format!("{content_type:?}: {e}")))
}

/// Registry of decoding strategies.
#[derive(Clone)]
pub struct Decoders {
    strategies: HashMap<String, Strategy>,
    silent_unsupported: bool,
}

impl fmt::Debug for Decoders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut media_types: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
        media_types.sort_unstable();
        f.debug_struct("Decoders")
            .field("media_types", &media_types)
            .field("silent_unsupported", &self.silent_unsupported)
            .finish()
    }
}

impl Default for Decoders {
    fn default() -> Self {
        Self::empty()
            .register(mime::APPLICATION_JSON.essence_str(), Strategy::Json)
            .register("application/yaml", Strategy::Yaml)
            .register("application/xml", Strategy::Xml)
            .register(mime::TEXT_XML.essence_str(), Strategy::Xml)
    }
}

impl Decoders {
    /// A registry with no strategies.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
            silent_unsupported: false,
        }
    }

    /// The standard registry where unsupported media types are a silent no-op.
    ///
    /// Kept for callers that relied on decoding an unknown media type
    /// leaving the target untouched without an error.
    #[must_use]
    pub fn legacy() -> Self {
        Self::default().silent_on_unsupported(true)
    }

    /// Register (or replace) the strategy for a media type.
    #[must_use]
    pub fn register(mut self, media_type: impl AsRef<str>, strategy: Strategy) -> Self {
        self.strategies
            .insert(media_type.as_ref().to_ascii_lowercase(), strategy);
        self
    }

    /// Choose whether unsupported media types are ignored instead of rejected.
    #[must_use]
    pub const fn silent_on_unsupported(mut self, silent: bool) -> Self {
        self.silent_unsupported = silent;
        self
    }

    /// The strategy registered for a media type.
    #[must_use]
    pub fn strategy(&self, media_type: &str) -> Option<&Strategy> {
        self.strategies.get(&media_type.to_ascii_lowercase())
    }

    /// Decode `data` of `media_type` into `target`.
    ///
    /// Returns `Ok(true)` when the target was populated. An unsupported media
    /// type is an [`Error::UnsupportedMediaType`], or `Ok(false)` with the
    /// target untouched when the registry is silent on unsupported types.
    pub fn decode_into<T: DeserializeOwned>(
        &self,
        data: &[u8],
        media_type: &str,
        target: &mut T,
    ) -> Result<bool> {
        match self.strategy(media_type) {
            Some(strategy) => {
                *target = strategy.decode(data)?;
                Ok(true)
            }
            None if self.silent_unsupported => Ok(false),
            None => Err(Error::UnsupportedMediaType(media_type.to_string())),
        }
    }
}

/// The process-wide standard registry.
#[must_use]
pub fn standard_decoders() -> Arc<Decoders> {
    static STANDARD: OnceLock<Arc<Decoders>> = OnceLock::new();
    Arc::clone(STANDARD.get_or_init(|| Arc::new(Decoders::default())))
}
