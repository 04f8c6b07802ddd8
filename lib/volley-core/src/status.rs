//! Response classification and status-code messages.
//!
//! Non-success responses are turned into a [`StatusError`] whose message
//! depends on the status code, not on whatever reason phrase the server sent.
//! Server-provided body text is only trusted for the handful of codes where it
//! usually carries the real explanation (403, 406, 415, 429).

use derive_more::{Display, Error};
use http::{HeaderMap, StatusCode, header};

/// Number of body bytes kept for diagnostics.
pub const MAX_ERROR_BODY_BYTES: usize = 2048;

/// Human-readable error for a non-success status.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("{message}")]
pub struct StatusError {
    message: String,
}

impl StatusError {
    /// Create a status error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build the error for `status`, using `server_text` only for codes where
    /// the server's explanation is meaningful. See [`status_message`].
    #[must_use]
    pub fn from_status(status: u16, server_text: Option<&str>) -> Self {
        Self::new(status_message(status, server_text))
    }

    /// The message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Translate a status code into a stable message.
///
/// `server_text` is the trimmed body text, or `None` when the body is not
/// text. For 403, 406 and 415 the message is the server text, or `"unknown"`
/// without one. A 429 uses non-empty server text, `"unknown"` for a body that
/// is not text, and a canned message for an empty text body.
///
/// ```
/// use volley_core::status_message;
///
/// assert_eq!(status_message(429, Some("slow down")), "slow down");
/// assert_eq!(status_message(429, None), "unknown");
/// assert_eq!(status_message(404, Some("ignored")), "the server could not find the requested resource");
/// ```
#[must_use]
pub fn status_message(status: u16, server_text: Option<&str>) -> String {
    let canned = match status {
        409 => "the server reported a conflict",
        404 => "the server could not find the requested resource",
        400 => "the server rejected our request for an unknown reason",
        401 => "the server has asked for the client to provide credentials",
        403 | 406 | 415 => return server_text.unwrap_or(UNKNOWN_MESSAGE).to_string(),
        405 => "the server does not allow this method on the requested resource",
        422 => "the server rejected our request due to an error in our request",
        503 => "the server is currently unable to handle the request",
        504 => {
            "the server was unable to return a response in the time allotted, but may still be processing the request"
        }
        429 => match server_text {
            None => UNKNOWN_MESSAGE,
            Some("") => "the server has received too many requests and has asked us to try again later",
            Some(text) => return text.to_string(),
        },
        code if code >= 500 => {
            return format!(
                "an error on the server ({code}) has prevented the request from succeeding"
            );
        }
        code => {
            return format!(
                "the server responded with the status code {code} but did not return more information"
            );
        }
    };
    canned.to_string()
}

const UNKNOWN_MESSAGE: &str = "unknown";

/// Returns `true` when the response body is plain text worth showing.
///
/// A missing `Content-Type` counts as text; otherwise only `text/*` media
/// types do. An unparseable `Content-Type` does not.
#[must_use]
pub fn is_text_response(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(header::CONTENT_TYPE) else {
        return true;
    };
    let Ok(value) = value.to_str() else {
        return false;
    };
    if value.is_empty() {
        return true;
    }
    value
        .parse::<mime::Mime>()
        .is_ok_and(|media| media.type_() == mime::TEXT)
}

/// Classify a response.
///
/// Returns `None` for `101 Switching Protocols` and any 2xx status. For every
/// other status returns the [`StatusError`] built from the code and, where
/// allowed, from the first [`MAX_ERROR_BODY_BYTES`] of a text body.
#[must_use]
pub fn classify(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Option<StatusError> {
    if status == StatusCode::SWITCHING_PROTOCOLS || status.is_success() {
        return None;
    }

    let sample = body.get(..MAX_ERROR_BODY_BYTES).unwrap_or(body);
    let text = is_text_response(headers).then(|| String::from_utf8_lossy(sample));
    let server_text = text.as_deref().map(str::trim);

    Some(StatusError::from_status(status.as_u16(), server_text))
}

#[cfg(test)]
mod tests {
    use assert2::check;
    use http::HeaderValue;

    use super::*;

    fn headers_with_type(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(content_type).expect("valid header"),
        );
        headers
    }

    fn classify_text(status: u16, body: &str) -> Option<String> {
        let status = StatusCode::from_u16(status).expect("valid status");
        classify(status, &HeaderMap::new(), body.as_bytes()).map(|e| e.message().to_string())
    }

    #[test]
    fn success_and_upgrade_have_no_error() {
        check!(classify_text(200, "").is_none());
        check!(classify_text(201, "created").is_none());
        check!(classify_text(299, "").is_none());
        check!(classify_text(101, "").is_none());
    }

    #[test]
    fn canned_messages_ignore_the_body() {
        insta::assert_snapshot!(
            classify_text(404, "nope").unwrap_or_default(),
            @"the server could not find the requested resource"
        );
        insta::assert_snapshot!(
            classify_text(409, "").unwrap_or_default(),
            @"the server reported a conflict"
        );
        insta::assert_snapshot!(
            classify_text(504, "").unwrap_or_default(),
            @"the server was unable to return a response in the time allotted, but may still be processing the request"
        );
    }

    #[test]
    fn forbidden_prefers_trimmed_server_text() {
        check!(classify_text(403, "  access denied for user\n").as_deref() == Some("access denied for user"));
        check!(classify_text(415, "bad type").as_deref() == Some("bad type"));
    }

    #[test]
    fn non_text_bodies_become_unknown() {
        let headers = headers_with_type("application/json");
        let err = classify(StatusCode::FORBIDDEN, &headers, br#"{"reason":"x"}"#);
        check!(err.map(|e| e.message().to_string()).as_deref() == Some("unknown"));
    }

    #[test]
    fn unparseable_content_type_is_not_text() {
        let headers = headers_with_type("not a media type");
        check!(!is_text_response(&headers));
        check!(is_text_response(&headers_with_type("text/plain; charset=utf-8")));
        check!(is_text_response(&HeaderMap::new()));
    }

    #[test]
    fn too_many_requests_uses_server_text_or_canned() {
        check!(classify_text(429, "slow down").as_deref() == Some("slow down"));
        check!(classify_text(429, "unknown").as_deref() == Some("unknown"));
        check!(
            classify_text(429, "   ").as_deref()
                == Some("the server has received too many requests and has asked us to try again later")
        );
    }

    #[test]
    fn too_many_requests_without_text_is_unknown() {
        let headers = headers_with_type("application/json");
        let err = classify(StatusCode::TOO_MANY_REQUESTS, &headers, br#"{"retry":true}"#);
        check!(err.map(|e| e.message().to_string()).as_deref() == Some("unknown"));
        check!(status_message(429, None) == "unknown");
    }

    #[test]
    fn other_server_errors_are_synthesized() {
        check!(
            classify_text(502, "upstream").as_deref()
                == Some("an error on the server (502) has prevented the request from succeeding")
        );
        check!(
            classify_text(503, "").as_deref()
                == Some("the server is currently unable to handle the request")
        );
    }

    #[test]
    fn other_codes_get_a_generic_message() {
        check!(
            classify_text(302, "moved").as_deref()
                == Some("the server responded with the status code 302 but did not return more information")
        );
        check!(
            classify_text(418, "teapot").as_deref()
                == Some("the server responded with the status code 418 but did not return more information")
        );
    }

    #[test]
    fn server_text_is_truncated() {
        let long = "x".repeat(MAX_ERROR_BODY_BYTES + 100);
        let message = classify_text(403, &long).unwrap_or_default();
        check!(message.len() == MAX_ERROR_BODY_BYTES);
    }
}
