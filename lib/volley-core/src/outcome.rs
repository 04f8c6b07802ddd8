//! The result of one executed request.

use std::sync::Arc;

use bytes::Bytes;
use cookie::Cookie;
use http::{HeaderMap, StatusCode, header};
use serde::de::DeserializeOwned;

use crate::{Decoders, Error, Result, decode, standard_decoders, status};

/// Outcome of one completed execution.
///
/// Holds the raw body, the final status, response headers and cookies, and
/// the error if there was one. Every accessor is pure: asking twice gives the
/// same answer.
#[derive(Debug, Clone)]
pub struct Outcome {
    body: Bytes,
    content_type: Option<String>,
    status: u16,
    headers: HeaderMap,
    cookies: Vec<Cookie<'static>>,
    error: Option<Error>,
    decoders: Arc<Decoders>,
}

impl Outcome {
    /// Build the outcome of a fully read response.
    ///
    /// Statuses outside `200..300` (except `101`) always carry an error.
    #[must_use]
    pub fn from_response(
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
        decoders: Arc<Decoders>,
    ) -> Self {
        let error = status::classify(status, &headers, &body).map(Error::from);
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let cookies = headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| Cookie::parse(value.to_string()).ok())
            .collect();

        Self {
            body,
            content_type,
            status: status.as_u16(),
            headers,
            cookies,
            error,
            decoders,
        }
    }

    /// Build the outcome of an execution that never produced a response.
    #[must_use]
    pub fn from_error(error: Error) -> Self {
        Self {
            body: Bytes::new(),
            content_type: None,
            status: 0,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            error: Some(error),
            decoders: standard_decoders(),
        }
    }

    /// Raw body, or the error if there was one.
    ///
    /// The body stays reachable through [`Outcome::body`] either way.
    pub fn raw(&self) -> std::result::Result<&Bytes, &Error> {
        match &self.error {
            Some(error) => Err(error),
            None => Ok(&self.body),
        }
    }

    /// Raw body bytes.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decode the body into `target` using the declared `Content-Type`.
    ///
    /// Fails before decoding when the execution failed, the body is empty,
    /// or the `Content-Type` is not a valid media type. Returns whether the
    /// target was populated.
    pub fn decode_into<T: DeserializeOwned>(&self, target: &mut T) -> Result<bool> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if self.body.is_empty() {
            return Err(Error::EmptyResponse);
        }
        let media_type = decode::media_type(self.content_type.as_deref().unwrap_or_default())?;
        self.decoders.decode_into(&self.body, &media_type, target)
    }

    /// Decode the body into a fresh `T`.
    ///
    /// Same as [`Outcome::decode_into`] except that a target left unpopulated
    /// is reported as [`Error::UnsupportedMediaType`].
    pub fn decode<T: DeserializeOwned + Default>(&self) -> Result<T> {
        let mut target = T::default();
        if self.decode_into(&mut target)? {
            Ok(target)
        } else {
            Err(Error::UnsupportedMediaType(
                self.content_type.clone().unwrap_or_default(),
            ))
        }
    }

    /// Whether the server answered `201 Created`.
    #[must_use]
    pub fn was_created(&self) -> bool {
        self.status == StatusCode::CREATED.as_u16()
    }

    /// Final HTTP status code, `0` when no response was received.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.status
    }

    /// Declared `Content-Type`.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Cookies set by the response. Unparseable `Set-Cookie` values are skipped.
    #[must_use]
    pub fn cookies(&self) -> &[Cookie<'static>] {
        &self.cookies
    }

    /// The error, if the execution failed.
    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Returns `true` when there is no error.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};
    use http::HeaderValue;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, PartialEq, Deserialize)]
    struct Greeting {
        hello: String,
    }

    fn outcome(status: u16, content_type: Option<&str>, body: &'static [u8]) -> Outcome {
        let mut headers = HeaderMap::new();
        if let Some(content_type) = content_type {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_str(content_type).expect("valid header"),
            );
        }
        Outcome::from_response(
            StatusCode::from_u16(status).expect("valid status"),
            headers,
            Bytes::from_static(body),
            standard_decoders(),
        )
    }

    #[test]
    fn decode_json_body() {
        let outcome = outcome(200, Some("application/json"), br#"{"hello":"world"}"#);
        let greeting: Greeting = outcome.decode().expect("decode");
        check!(greeting.hello == "world");
    }

    #[test]
    fn empty_body_fails_decoding_but_not_raw() {
        let outcome = outcome(200, Some("application/json"), b"");

        let mut target = Greeting::default();
        let_assert!(Err(Error::EmptyResponse) = outcome.decode_into(&mut target));

        let_assert!(Ok(body) = outcome.raw());
        check!(body.is_empty());
    }

    #[test]
    fn missing_content_type_fails_decoding() {
        let outcome = outcome(200, None, br#"{"hello":"world"}"#);
        let mut target = Greeting::default();
        let_assert!(Err(Error::InvalidMediaType(_)) = outcome.decode_into(&mut target));
    }

    #[test]
    fn error_status_keeps_body_and_status() {
        let outcome = outcome(404, Some("text/plain"), b"missing");

        check!(outcome.status_code() == 404);
        check!(outcome.body().as_ref() == b"missing");
        let_assert!(Err(Error::Status(err)) = outcome.raw());
        check!(err.message() == "the server could not find the requested resource");

        let mut target = Greeting::default();
        let_assert!(Err(Error::Status(_)) = outcome.decode_into(&mut target));
    }

    #[test]
    fn decode_error_keeps_raw_access() {
        let outcome = outcome(200, Some("application/json"), b"not json");
        let mut target = Greeting::default();
        let_assert!(Err(Error::JsonDeserialization { .. }) = outcome.decode_into(&mut target));
        check!(outcome.raw().map(|b| b.len()) == Ok(8));
    }

    #[test]
    fn was_created_only_for_201() {
        check!(outcome(201, None, b"").was_created());
        check!(!outcome(200, None, b"").was_created());
    }

    #[test]
    fn cookies_are_parsed_from_set_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(
            header::SET_COOKIE,
            HeaderValue::from_static("session=abc; Path=/; HttpOnly"),
        );
        headers.append(header::SET_COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("=broken"));

        let outcome = Outcome::from_response(
            StatusCode::OK,
            headers,
            Bytes::new(),
            standard_decoders(),
        );

        let names: Vec<&str> = outcome.cookies().iter().map(Cookie::name).collect();
        check!(names == ["session", "theme"]);
        check!(outcome.cookies().first().and_then(Cookie::path) == Some("/"));
    }

    #[test]
    fn accessors_are_idempotent() {
        let outcome = outcome(503, Some("text/plain"), b"busy");

        check!(outcome.status_code() == outcome.status_code());
        check!(outcome.headers() == outcome.headers());
        check!(outcome.cookies() == outcome.cookies());
        check!(outcome.raw() == outcome.raw());
        check!(outcome.error() == outcome.error());
    }

    #[test]
    fn from_error_has_no_status() {
        let outcome = Outcome::from_error(Error::Timeout);
        check!(outcome.status_code() == 0);
        check!(outcome.error() == Some(&Error::Timeout));
        check!(!outcome.is_success());
    }
}
