//! Request body sources.
//!
//! A [`Body`] is either an in-memory buffer, which can always be re-sent, or
//! a caller-supplied reader. Readers are replayable only when they can seek
//! back to the start, which is what [`Body::seekable`] asks for.

use std::any::Any;
use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::{Error, Result};

/// A reader that can also seek.
pub trait SeekableRead: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T> SeekableRead for T where T: AsyncRead + AsyncSeek + Send + Unpin {}

enum Source {
    Bytes(Bytes),
    Reader(Box<dyn AsyncRead + Send + Unpin>),
    Seekable(Box<dyn SeekableRead>),
}

/// Body of a request.
pub struct Body {
    source: Source,
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Bytes(bytes) => f.debug_tuple("Body::Bytes").field(&bytes.len()).finish(),
            Source::Reader(_) => f.write_str("Body::Reader"),
            Source::Seekable(_) => f.write_str("Body::Seekable"),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::bytes(Bytes::new())
    }
}

impl Body {
    /// An in-memory body.
    #[must_use]
    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            source: Source::Bytes(bytes.into()),
        }
    }

    /// Read a whole file into memory.
    pub fn file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::read(path)
            .map(Self::bytes)
            .map_err(|e| Error::Io(format!("{}: {e}", path.display())))
    }

    /// A one-shot reader. Requests carrying it are never retried.
    pub fn reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            source: Source::Reader(Box::new(reader)),
        }
    }

    /// A reader that is rewound to its start before each retry.
    pub fn seekable(reader: impl SeekableRead + 'static) -> Self {
        Self {
            source: Source::Seekable(Box::new(reader)),
        }
    }

    /// Whether the body can be sent again.
    #[must_use]
    pub const fn is_replayable(&self) -> bool {
        !matches!(self.source, Source::Reader(_))
    }

    pub(crate) async fn read_all(&mut self) -> Result<Bytes> {
        let mut buffer = Vec::new();
        let read = match &mut self.source {
            Source::Bytes(bytes) => return Ok(bytes.clone()),
            Source::Reader(reader) => reader.read_to_end(&mut buffer).await,
            Source::Seekable(reader) => reader.read_to_end(&mut buffer).await,
        };
        read.map_err(|e| Error::Io(format!("reading request body: {e}")))?;

        Ok(Bytes::from(buffer))
    }

    /// Move back to the start of the body.
    pub(crate) async fn rewind(&mut self) -> Result<()> {
        match &mut self.source {
            Source::Bytes(_) => Ok(()),
            Source::Reader(_) => Err(Error::Io("request body cannot be rewound".to_string())),
            Source::Seekable(reader) => reader
                .seek(SeekFrom::Start(0))
                .await
                .map(|_| ())
                .map_err(|e| Error::Io(format!("rewinding request body: {e}"))),
        }
    }
}

/// Values accepted by [`Request::body`](crate::Request::body).
pub trait IntoBody {
    /// Turn the value into a body, or fail with a configuration error.
    fn into_body(self) -> Result<Body>;
}

impl IntoBody for Body {
    fn into_body(self) -> Result<Body> {
        Ok(self)
    }
}

impl IntoBody for Bytes {
    fn into_body(self) -> Result<Body> {
        Ok(Body::bytes(self))
    }
}

impl IntoBody for Vec<u8> {
    fn into_body(self) -> Result<Body> {
        Ok(Body::bytes(self))
    }
}

impl IntoBody for &'static [u8] {
    fn into_body(self) -> Result<Body> {
        Ok(Body::bytes(Bytes::from_static(self)))
    }
}

impl IntoBody for &Path {
    fn into_body(self) -> Result<Body> {
        Body::file(self)
    }
}

impl IntoBody for PathBuf {
    fn into_body(self) -> Result<Body> {
        Body::file(self)
    }
}

/// Dynamically typed bodies: `Body`, `Bytes`, `Vec<u8>`, `PathBuf`, or a
/// `String` naming a file. Anything else is [`Error::UnknownBodyType`].
impl IntoBody for Box<dyn Any + Send> {
    fn into_body(self) -> Result<Body> {
        let value = match self.downcast::<Body>() {
            Ok(body) => return Ok(*body),
            Err(value) => value,
        };
        let value = match value.downcast::<Bytes>() {
            Ok(bytes) => return Ok(Body::bytes(*bytes)),
            Err(value) => value,
        };
        let value = match value.downcast::<Vec<u8>>() {
            Ok(bytes) => return Ok(Body::bytes(*bytes)),
            Err(value) => value,
        };
        let value = match value.downcast::<PathBuf>() {
            Ok(path) => return Body::file(*path),
            Err(value) => value,
        };
        match value.downcast::<String>() {
            Ok(path) => Body::file(path.as_str()),
            Err(_) => Err(Error::UnknownBodyType(
                "expected bytes, a file path or a reader".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use assert2::{check, let_assert};
    use tempfile::NamedTempFile;

    use super::*;

    fn temp_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("create");
        file.write_all(content).expect("write");
        file
    }

    #[tokio::test]
    async fn bytes_are_replayable() {
        let mut body = Body::bytes("hello");
        check!(body.is_replayable());
        check!(body.read_all().await.expect("read").as_ref() == b"hello");
        body.rewind().await.expect("rewind");
        check!(body.read_all().await.expect("read").as_ref() == b"hello");
    }

    #[tokio::test]
    async fn seekable_reader_rewinds() {
        let mut body = Body::seekable(Cursor::new(b"payload".to_vec()));
        check!(body.read_all().await.expect("read").as_ref() == b"payload");
        check!(body.read_all().await.expect("read").is_empty());

        body.rewind().await.expect("rewind");
        check!(body.read_all().await.expect("read").as_ref() == b"payload");
    }

    #[tokio::test]
    async fn plain_reader_cannot_rewind() {
        let mut body = Body::reader(&b"once"[..]);
        check!(!body.is_replayable());
        check!(body.read_all().await.expect("read").as_ref() == b"once");
        let_assert!(Err(Error::Io(_)) = body.rewind().await);
    }

    #[tokio::test]
    async fn file_is_read_into_memory() {
        let file = temp_file(b"from disk");
        let mut body = file.path().to_path_buf().into_body().expect("body");
        check!(body.read_all().await.expect("read").as_ref() == b"from disk");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let_assert!(Err(Error::Io(msg)) = Body::file("/definitely/not/here"));
        check!(msg.starts_with("/definitely/not/here"));
    }

    #[tokio::test]
    async fn dynamic_values() {
        let value: Box<dyn Any + Send> = Box::new(b"raw".to_vec());
        let mut body = value.into_body().expect("bytes");
        check!(body.read_all().await.expect("read").as_ref() == b"raw");

        let file = temp_file(b"named");
        let value: Box<dyn Any + Send> = Box::new(file.path().display().to_string());
        let mut body = value.into_body().expect("path");
        check!(body.read_all().await.expect("read").as_ref() == b"named");

        let value: Box<dyn Any + Send> = Box::new(42_u32);
        let_assert!(Err(err) = value.into_body());
        check!(err.to_string().starts_with("unknown type used for body"));
    }
}
