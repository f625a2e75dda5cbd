//! Response shapes returned to legacy fetch call sites.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::constants::STATUS_OK;
use crate::content_type::guess_content_type;

/// Header name read by most consumers.
pub const CONTENT_TYPE: &str = "content-type";

/// Header name some consumers read instead of [`CONTENT_TYPE`].
pub const CONTENT_TYPE_CANONICAL: &str = "Content-Type";

/// Length of the verified file in bytes.
pub const CONTENT_LENGTH: &str = "content-length";

/// Response headers.
///
/// Always carries a content-type entry under both spellings; the value is
/// empty when the type is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Headers {
    entries: BTreeMap<String, String>,
}

impl Headers {
    /// Builds headers for a target path.
    ///
    /// The content type is guessed from `target_path`, not from the request
    /// URL, so a rule mapping `/pkg/` to `/pkg/index.html` yields `text/html`.
    #[must_use]
    pub fn for_target(target_path: &str) -> Self {
        let (content_type, _) = guess_content_type(target_path);
        let content_type = content_type.unwrap_or_default();

        let mut entries = BTreeMap::new();
        entries.insert(CONTENT_TYPE.to_string(), content_type.to_string());
        entries.insert(CONTENT_TYPE_CANONICAL.to_string(), content_type.to_string());
        Self { entries }
    }

    /// Sets a header.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    /// Returns a header value by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Returns the content type, or `None` when unknown.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.get(CONTENT_TYPE).filter(|v| !v.is_empty())
    }

    /// Returns the content length, if recorded.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.get(CONTENT_LENGTH).and_then(|v| v.parse().ok())
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of [`TrustSession::retrieve`](crate::TrustSession::retrieve).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieved {
    /// Local file holding the verified content.
    pub filename: PathBuf,
    /// Headers describing the content.
    pub headers: Headers,
}

/// Verified content opened for reading, with the metadata an HTTP response
/// would carry.
pub struct Response {
    url: String,
    status: u16,
    headers: Headers,
    filename: PathBuf,
    body: File,
}

impl Response {
    pub(crate) fn new(url: impl Into<String>, retrieved: Retrieved, body: File) -> Self {
        Self {
            url: url.into(),
            status: STATUS_OK,
            headers: retrieved.headers,
            filename: retrieved.filename,
            body,
        }
    }

    /// Returns the URL that was requested.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the status code (always 200).
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Returns the headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the local file backing the body.
    #[must_use]
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Reads the whole body.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the underlying file.
    pub fn bytes(mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.body.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Consumes the response and returns the open file.
    #[must_use]
    pub fn into_file(self) -> File {
        self.body
    }
}

impl Read for Response {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("url", &self.url)
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("filename", &self.filename)
            .finish_non_exhaustive()
    }
}
