//! Network location (`host` or `host:port`) of an interposed origin.
//!
//! ```text
//! network-location = host [ ":" port ]
//! host             = domain / ipv4-address / "[" ipv6-address "]"
//! ```

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::constants::DEFAULT_PORT;
use crate::error::ConfigurationError;

/// A validated origin network location.
///
/// The hostname is normalized the way request URLs are normalized (lowercase
/// domains, bracketed IPv6 literals) so it can be compared directly against
/// the host of an incoming URL.
///
/// # Examples
///
/// ```
/// use interposition::NetworkLocation;
///
/// let location = NetworkLocation::parse("Example.COM").unwrap();
/// assert_eq!(location.hostname(), "example.com");
/// assert!(location.port().is_none());
///
/// let location = NetworkLocation::parse("localhost:8001").unwrap();
/// assert_eq!(location.as_str(), "localhost:8001");
/// assert_eq!(location.port(), Some(8001));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkLocation {
    hostname: String,
    port: Option<u16>,
    /// `hostname[:port]`
    normalized: String,
}

impl NetworkLocation {
    /// Parses a network location.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidNetworkLocation` if the input is
    /// empty, carries a scheme, path or credentials, has a malformed host,
    /// or has a port outside 0-65535.
    pub fn parse(input: &str) -> Result<Self, ConfigurationError> {
        let invalid = |reason| ConfigurationError::InvalidNetworkLocation {
            value: input.to_string(),
            reason,
        };

        if input.is_empty() {
            return Err(invalid("network location cannot be empty"));
        }
        if input
            .chars()
            .any(|c| matches!(c, '/' | '@' | '?' | '#') || c.is_whitespace())
        {
            return Err(invalid("expected 'host' or 'host:port' without scheme or path"));
        }

        let (host_part, port) = Self::split_host_port(input).map_err(invalid)?;
        if host_part.is_empty() {
            return Err(invalid("host cannot be empty"));
        }

        let host = url::Host::parse(host_part).map_err(|_| invalid("malformed host"))?;
        let hostname = host.to_string();
        let normalized = Self::normalize(&hostname, port);

        Ok(Self {
            hostname,
            port,
            normalized,
        })
    }

    /// Returns the hostname.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Returns the declared port, if any.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// Returns `hostname[:port]`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// Returns true if a request to `url` targets this network location.
    ///
    /// A URL without a port is on port 80, whatever its scheme. A location
    /// declared as `example.com` and one declared as `example.com:80` each
    /// accept `http://example.com/` and `http://example.com:80/`. Any other
    /// port, including one equal to the scheme's default, must be declared
    /// explicitly and match exactly.
    ///
    /// # Examples
    ///
    /// ```
    /// use interposition::NetworkLocation;
    ///
    /// let location = NetworkLocation::parse("example.com").unwrap();
    /// assert!(location.accepts("https://example.com/pkg/"));
    /// assert!(!location.accepts("https://example.com:443/pkg/"));
    /// assert!(!location.accepts("not a url"));
    /// ```
    #[must_use]
    pub fn accepts(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|parsed| self.accepts_parsed(&parsed, url))
    }

    /// As [`accepts`](Self::accepts), for a URL already parsed from `original`.
    pub(crate) fn accepts_parsed(&self, url: &Url, original: &str) -> bool {
        request_locations(url, original).contains(&self.normalized)
    }

    fn split_host_port(input: &str) -> Result<(&str, Option<u16>), &'static str> {
        // Bracketed IPv6 literal, optionally followed by a port
        if input.starts_with('[') {
            let closing = input
                .find(']')
                .ok_or("missing closing bracket for IPv6 literal")?;
            let rest = &input[closing + 1..];
            if rest.is_empty() {
                return Ok((input, None));
            }
            let port = rest
                .strip_prefix(':')
                .ok_or("expected ':' after IPv6 closing bracket")?;
            return Ok((&input[..=closing], Some(Self::parse_port(port)?)));
        }

        match input.rsplit_once(':') {
            Some((host, port)) => Ok((host, Some(Self::parse_port(port)?))),
            None => Ok((input, None)),
        }
    }

    fn parse_port(port: &str) -> Result<u16, &'static str> {
        if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
            return Err("port must be numeric");
        }
        port.parse().map_err(|_| "port must be 0-65535")
    }

    fn normalize(hostname: &str, port: Option<u16>) -> String {
        match port {
            Some(p) => format!("{hostname}:{p}"),
            None => hostname.to_string(),
        }
    }
}

/// The `host[:port]` spellings under which a request URL may address an origin.
///
/// Returns an empty set for URLs without a host.
pub(crate) fn request_locations(url: &Url, original: &str) -> BTreeSet<String> {
    let mut locations = BTreeSet::new();
    let Some(host) = url.host_str() else {
        return locations;
    };

    let port = url
        .port()
        .or_else(|| written_port(original))
        .unwrap_or(DEFAULT_PORT);
    locations.insert(format!("{host}:{port}"));
    if port == DEFAULT_PORT {
        locations.insert(host.to_string());
    }
    locations
}

/// The port as written in the authority of `original`.
///
/// `Url` drops a port equal to the scheme's default, so `https://h:443/`
/// and `https://h/` parse the same.
fn written_port(original: &str) -> Option<u16> {
    let (_, rest) = original.trim().split_once("://")?;
    let authority = rest.split(['/', '\\', '?', '#']).next()?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
    let port = match host_port.rfind(']') {
        Some(close) => host_port[close + 1..].strip_prefix(':')?,
        None => host_port.rsplit_once(':')?.1,
    };
    port.parse().ok()
}

impl fmt::Display for NetworkLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.normalized)
    }
}

impl FromStr for NetworkLocation {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for NetworkLocation {
    fn as_ref(&self) -> &str {
        &self.normalized
    }
}

impl PartialOrd for NetworkLocation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NetworkLocation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized.cmp(&other.normalized)
    }
}
