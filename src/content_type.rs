//! Content-type guessing from a target path's extension.

/// Compression suffixes that describe an encoding rather than a type.
const ENCODINGS: &[(&str, &str)] = &[
    ("gz", "gzip"),
    ("bz2", "bzip2"),
    ("xz", "xz"),
    ("br", "br"),
    ("z", "compress"),
];

/// Shorthand suffixes that stand for a compressed archive.
const ARCHIVE_SUFFIXES: &[(&str, &str, &str)] = &[
    ("tgz", "application/x-tar", "gzip"),
    ("tbz2", "application/x-tar", "bzip2"),
    ("txz", "application/x-tar", "xz"),
];

const TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("txt", "text/plain"),
    ("text", "text/plain"),
    ("css", "text/css"),
    ("csv", "text/csv"),
    ("xml", "text/xml"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("tar", "application/x-tar"),
    ("whl", "application/zip"),
    ("jar", "application/java-archive"),
    ("egg", "application/zip"),
    ("deb", "application/vnd.debian.binary-package"),
    ("rpm", "application/x-rpm"),
    ("exe", "application/octet-stream"),
    ("bin", "application/octet-stream"),
    ("py", "text/x-python"),
    ("sh", "application/x-sh"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/vnd.microsoft.icon"),
];

/// Guesses `(content type, content encoding)` from a path.
///
/// Only the final path segment is inspected. A trailing compression suffix
/// becomes the encoding and the type comes from the suffix before it, so
/// `pkg.tar.gz` is `application/x-tar` encoded with `gzip`. Unknown or
/// missing extensions yield `None`.
///
/// # Examples
///
/// ```
/// use interposition::guess_content_type;
///
/// assert_eq!(guess_content_type("/pkg/index.html"), (Some("text/html"), None));
/// assert_eq!(
///     guess_content_type("/dist/pkg-1.0.tar.gz"),
///     (Some("application/x-tar"), Some("gzip"))
/// );
/// assert_eq!(guess_content_type("/pkg/"), (None, None));
/// ```
#[must_use]
pub fn guess_content_type(path: &str) -> (Option<&'static str>, Option<&'static str>) {
    let name = path.rsplit('/').next().unwrap_or(path);
    let Some((stem, extension)) = split_extension(name) else {
        return (None, None);
    };
    let extension = extension.to_ascii_lowercase();

    if let Some((_, kind, encoding)) = ARCHIVE_SUFFIXES.iter().find(|(s, ..)| *s == extension) {
        return (Some(*kind), Some(*encoding));
    }

    if let Some((_, encoding)) = ENCODINGS.iter().find(|(s, _)| *s == extension) {
        let kind = split_extension(stem).and_then(|(_, inner)| lookup(&inner.to_ascii_lowercase()));
        return (kind, Some(*encoding));
    }

    (lookup(&extension), None)
}

fn lookup(extension: &str) -> Option<&'static str> {
    TYPES
        .iter()
        .find(|(s, _)| *s == extension)
        .map(|(_, kind)| *kind)
}

/// Splits `name.ext`; names starting with a dot and no other dot have no extension.
fn split_extension(name: &str) -> Option<(&str, &str)> {
    let (stem, extension) = name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some((stem, extension))
}
