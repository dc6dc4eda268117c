//! Reversed-URL storage keys.
//!
//! A URL such as `http://bar.foo.com:8983/to/index.html?a=b` is stored under
//! `com.foo.bar:http:8983/to/index.html?a=b`. Host labels come first and in
//! reverse order, so every page of a site, and every subdomain of a domain,
//! sits in one contiguous key range.
//!
//! Key grammar: `reversedHost ":" scheme [ ":" port ] [ "/" pathAndQuery ]`.

use std::fmt;

use log::debug;
use url::{Host, Url};

use crate::error::CrawlError;

/// A URL split into the parts that make up a storage key.
///
/// Neither `scheme` nor `host` may contain `:` or `/`, since both characters
/// delimit key fields and the key format has no escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    scheme: String,
    host: String,
    port: Option<u16>,
    path_and_query: String,
}

impl Locator {
    pub fn new(
        scheme: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
        path_and_query: impl Into<String>,
    ) -> Result<Self, CrawlError> {
        let scheme = scheme.into();
        let host = host.into();

        if scheme.is_empty() {
            return Err(CrawlError::MalformedLocator(
                "Scheme cannot be empty".to_string(),
            ));
        }
        if has_key_delimiter(&scheme) {
            return Err(CrawlError::MalformedLocator(format!(
                "Scheme '{}' contains ':' or '/'",
                scheme
            )));
        }
        if has_key_delimiter(&host) {
            return Err(CrawlError::MalformedLocator(format!(
                "Host '{}' contains ':' or '/'",
                host
            )));
        }

        Ok(Self {
            scheme,
            host,
            port,
            path_and_query: path_and_query.into(),
        })
    }

    /// Parses a URL string.
    ///
    /// The URL must be well formed, but host and path are kept exactly as
    /// written: no case folding, no dot-segment removal, no percent
    /// encoding. An explicitly written port is kept even when it is the
    /// scheme's default. Nothing after the authority means an empty path,
    /// and an empty authority (`file:///etc/hosts`) means an empty host.
    /// The fragment is dropped. IPv6 literal hosts are rejected.
    pub fn parse(input: &str) -> Result<Self, CrawlError> {
        let input = input.trim();
        let url = Url::parse(input).map_err(|e| {
            CrawlError::MalformedLocator(format!("Failed to parse '{}': {}", input, e))
        })?;

        let (authority, rest) = split_authority(input, url.scheme().len()).ok_or_else(|| {
            CrawlError::MalformedLocator(format!("'{}' has no authority", input))
        })?;

        if matches!(url.host(), Some(Host::Ipv6(_))) || authority.contains('[') {
            return Err(CrawlError::MalformedLocator(format!(
                "IPv6 host in '{}' cannot be stored in a key",
                input
            )));
        }

        let host_port = strip_userinfo(authority);
        let port = explicit_port(host_port);
        let host = match host_port.rsplit_once(':') {
            Some((host, digits)) if digits.bytes().all(|b| b.is_ascii_digit()) => host,
            _ => host_port,
        };

        let path_and_query = rest.split('#').next().unwrap_or_default();

        Self::new(url.scheme(), host, port, path_and_query)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path_and_query(&self) -> &str {
        &self.path_and_query
    }

    pub fn reverse(&self) -> String {
        reverse_url(self)
    }
}

/// Formats as `scheme://host[:port]path`, with a `/` inserted before a path
/// that lacks one. This is exactly what decoding the locator's key yields.
impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        if needs_path_slash(&self.path_and_query) {
            f.write_str("/")?;
        }
        f.write_str(&self.path_and_query)
    }
}

/// Encodes a locator as a reversed key.
///
/// `http://bar.foo.com:8983/to/index.html?a=b` becomes
/// `com.foo.bar:http:8983/to/index.html?a=b`.
pub fn reverse_url(locator: &Locator) -> String {
    let mut buf = String::with_capacity(
        locator.host.len() + locator.scheme.len() + locator.path_and_query.len() + 8,
    );

    reverse_append_labels(&locator.host, &mut buf);

    buf.push(':');
    buf.push_str(&locator.scheme);

    if let Some(port) = locator.port {
        buf.push(':');
        buf.push_str(&port.to_string());
    }

    if needs_path_slash(&locator.path_and_query) {
        buf.push('/');
    }
    buf.push_str(&locator.path_and_query);

    buf
}

/// Parses `url` and encodes it. Parse failures are `MalformedLocator`.
pub fn reverse_url_str(url: &str) -> Result<String, CrawlError> {
    Locator::parse(url).map(|locator| reverse_url(&locator))
}

/// Decodes a reversed key back into `scheme://host[:port]path`.
pub fn unreverse_url(reversed_url: &str) -> Result<String, CrawlError> {
    let key = ReversedKey::parse(reversed_url)?;

    let mut buf = String::with_capacity(reversed_url.len() + 3);
    buf.push_str(key.scheme);
    buf.push_str("://");
    reverse_append_labels(key.reversed_host, &mut buf);
    if let Some(port) = key.port {
        buf.push(':');
        buf.push_str(port);
    }
    buf.push_str(key.tail);

    Ok(buf)
}

/// Returns the reversed host of a key, e.g. `com.foo.bar` for
/// `com.foo.bar:http:8983/to/index.html?a=b`.
pub fn reversed_host(reversed_url: &str) -> Result<&str, CrawlError> {
    reversed_url
        .find(':')
        .map(|idx| &reversed_url[..idx])
        .ok_or_else(|| {
            debug!("Rejected key without scheme separator: {}", reversed_url);
            CrawlError::MalformedKey(format!("No ':' in '{}'", reversed_url))
        })
}

/// Reverses the order of dot-separated labels. Applying it twice gives back
/// the input.
pub fn reverse_host(host: &str) -> String {
    let mut buf = String::with_capacity(host.len());
    reverse_append_labels(host, &mut buf);
    buf
}

/// A reversed key split into its fields, borrowing from the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReversedKey<'a> {
    reversed_host: &'a str,
    scheme: &'a str,
    port: Option<&'a str>,
    tail: &'a str,
}

impl<'a> ReversedKey<'a> {
    /// Splits a key at its first `/`; the part before it must have two or
    /// three `:`-separated fields.
    pub fn parse(key: &'a str) -> Result<Self, CrawlError> {
        let path_begin = key.find('/').unwrap_or(key.len());
        let (header, tail) = key.split_at(path_begin);

        let mut fields = header.split(':');
        let reversed_host = fields.next().unwrap_or_default();
        let scheme = fields.next().ok_or_else(|| {
            debug!("Rejected key without scheme: {}", key);
            CrawlError::MalformedKey(format!("No scheme field in '{}'", key))
        })?;
        let port = fields.next();

        if fields.next().is_some() {
            debug!("Rejected key with too many header fields: {}", key);
            return Err(CrawlError::MalformedKey(format!(
                "Expected at most 3 ':'-separated fields before the path in '{}'",
                key
            )));
        }

        Ok(Self {
            reversed_host,
            scheme,
            port,
            tail,
        })
    }

    pub fn reversed_host(&self) -> &'a str {
        self.reversed_host
    }

    pub fn scheme(&self) -> &'a str {
        self.scheme
    }

    /// The port field as written in the key.
    pub fn port(&self) -> Option<&'a str> {
        self.port
    }

    /// Everything from the first `/` on, or empty.
    pub fn path_and_query(&self) -> &'a str {
        self.tail
    }

    pub fn host(&self) -> String {
        reverse_host(self.reversed_host)
    }

    /// Rebuilds a typed locator. Unlike [`unreverse_url`], this requires the
    /// port field to be a valid port number.
    pub fn to_locator(&self) -> Result<Locator, CrawlError> {
        let port = self
            .port
            .map(|port| {
                port.parse::<u16>().map_err(|_| {
                    CrawlError::MalformedKey(format!("Invalid port '{}' in key", port))
                })
            })
            .transpose()?;

        Locator::new(self.scheme, self.host(), port, self.tail)
            .map_err(|e| CrawlError::MalformedKey(e.to_string()))
    }
}

fn reverse_append_labels(dotted: &str, buf: &mut String) {
    for (i, label) in dotted.rsplit('.').enumerate() {
        if i > 0 {
            buf.push('.');
        }
        buf.push_str(label);
    }
}

fn needs_path_slash(path_and_query: &str) -> bool {
    !path_and_query.is_empty() && !path_and_query.starts_with('/')
}

fn has_key_delimiter(s: &str) -> bool {
    s.contains(|c| c == ':' || c == '/')
}

// Raw text between "scheme://" and the path, plus whatever follows it.
fn split_authority(input: &str, scheme_len: usize) -> Option<(&str, &str)> {
    let rest = input.get(scheme_len..)?.strip_prefix("://")?;
    let end = rest
        .find(|c| matches!(c, '/' | '\\' | '?' | '#'))
        .unwrap_or(rest.len());
    Some(rest.split_at(end))
}

fn strip_userinfo(authority: &str) -> &str {
    authority
        .rsplit_once('@')
        .map_or(authority, |(_, host_port)| host_port)
}

fn explicit_port(host_port: &str) -> Option<u16> {
    let (_, port) = host_port.rsplit_once(':')?;
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    port.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator(scheme: &str, host: &str, port: Option<u16>, path: &str) -> Locator {
        Locator::new(scheme, host, port, path).unwrap()
    }

    #[test]
    fn test_reverse_url_with_port_and_query() {
        let l = locator("http", "bar.foo.com", Some(8983), "/to/index.html?a=b");
        assert_eq!(reverse_url(&l), "com.foo.bar:http:8983/to/index.html?a=b");
    }

    #[test]
    fn test_reverse_url_without_port_or_path() {
        let l = locator("http", "example.com", None, "");
        assert_eq!(reverse_url(&l), "com.example:http");
    }

    #[test]
    fn test_reverse_url_inserts_single_slash() {
        let l = locator("https", "example.com", None, "index.html");
        assert_eq!(reverse_url(&l), "com.example:https/index.html");

        let l = locator("https", "example.com", None, "?q=1");
        assert_eq!(reverse_url(&l), "com.example:https/?q=1");
    }

    #[test]
    fn test_single_label_and_empty_host() {
        assert_eq!(reverse_url(&locator("http", "localhost", None, "/")), "localhost:http/");
        assert_eq!(reverse_url(&locator("file", "", None, "/etc/hosts")), ":file/etc/hosts");
    }

    #[test]
    fn test_unreverse_url() {
        assert_eq!(
            unreverse_url("com.foo.bar:http:8983/to/index.html?a=b").unwrap(),
            "http://bar.foo.com:8983/to/index.html?a=b"
        );
        assert_eq!(unreverse_url("com.example:http").unwrap(), "http://example.com");
        assert_eq!(unreverse_url(":file/etc/hosts").unwrap(), "file:///etc/hosts");
    }

    #[test]
    fn test_unreverse_url_rejects_malformed_keys() {
        for key in ["bad-key-no-colon", "no-colon-at-all", "a:b:c:d/x", "", "/path:only"] {
            assert!(
                matches!(unreverse_url(key), Err(CrawlError::MalformedKey(_))),
                "expected MalformedKey for {:?}",
                key
            );
        }
    }

    #[test]
    fn test_colons_after_path_are_not_header_fields() {
        assert_eq!(
            unreverse_url("org.example:http/a:b:c").unwrap(),
            "http://example.org/a:b:c"
        );
    }

    #[test]
    fn test_reversed_host() {
        assert_eq!(reversed_host("com.example:http").unwrap(), "com.example");
        assert_eq!(
            reversed_host("com.foo.bar:http:8983/to/index.html?a=b").unwrap(),
            "com.foo.bar"
        );
        assert!(matches!(
            reversed_host("com.example"),
            Err(CrawlError::MalformedKey(_))
        ));
    }

    #[test]
    fn test_reverse_host_is_label_reversal() {
        assert_eq!(reverse_host("www.example.co.uk"), "uk.co.example.www");
        assert_eq!(reverse_host("localhost"), "localhost");
        assert_eq!(reverse_host(&reverse_host("a.b.c")), "a.b.c");
    }

    #[test]
    fn test_locator_rejects_key_delimiters() {
        assert!(matches!(
            Locator::new("http", "::1", None, "/"),
            Err(CrawlError::MalformedLocator(_))
        ));
        assert!(matches!(
            Locator::new("http", "a/b", None, "/"),
            Err(CrawlError::MalformedLocator(_))
        ));
        assert!(matches!(
            Locator::new("", "example.com", None, "/"),
            Err(CrawlError::MalformedLocator(_))
        ));
    }

    #[test]
    fn test_parse_keeps_explicit_default_port() {
        let l = Locator::parse("http://example.com:80/a").unwrap();
        assert_eq!(l.port(), Some(80));
        assert_eq!(l.reverse(), "com.example:http:80/a");

        let l = Locator::parse("http://example.com/a").unwrap();
        assert_eq!(l.port(), None);
    }

    #[test]
    fn test_parse_empty_path_and_fragment() {
        let l = Locator::parse("http://example.com").unwrap();
        assert_eq!(l.path_and_query(), "");
        assert_eq!(l.reverse(), "com.example:http");

        let l = Locator::parse("http://example.com?x=1#top").unwrap();
        assert_eq!(l.path_and_query(), "?x=1");
        assert_eq!(l.reverse(), "com.example:http/?x=1");

        let l = Locator::parse("https://user:pw@example.com:8443/p?q#f").unwrap();
        assert_eq!(l.port(), Some(8443));
        assert_eq!(l.path_and_query(), "/p?q");
    }

    #[test]
    fn test_parse_keeps_host_and_path_as_written() {
        let l = Locator::parse("http://Example.COM/A/../b c").unwrap();
        assert_eq!(l.host(), "Example.COM");
        assert_eq!(l.path_and_query(), "/A/../b c");
        assert_eq!(l.reverse(), "COM.Example:http/A/../b c");
        assert_eq!(unreverse_url(&l.reverse()).unwrap(), "http://Example.COM/A/../b c");

        let l = Locator::parse("http://example.com/a%2Fb/./c/?q=%41").unwrap();
        assert_eq!(l.path_and_query(), "/a%2Fb/./c/?q=%41");
    }

    #[test]
    fn test_parse_empty_host() {
        let l = Locator::parse("file:///etc/hosts").unwrap();
        assert_eq!(l.host(), "");
        assert_eq!(l.reverse(), ":file/etc/hosts");
        assert_eq!(reverse_url_str("file:///etc/hosts").unwrap(), ":file/etc/hosts");
        assert_eq!(unreverse_url(":file/etc/hosts").unwrap(), "file:///etc/hosts");
    }

    #[test]
    fn test_parse_rejects_unsupported_inputs() {
        for input in [
            "not a url",
            "http://[::1]:8080/",
            "mailto:someone@example.com",
            "mailto:a@b.org?body=http://x.org/",
        ] {
            assert!(
                matches!(Locator::parse(input), Err(CrawlError::MalformedLocator(_))),
                "expected MalformedLocator for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_structured_decode() {
        let key = ReversedKey::parse("com.foo.bar:http:8983/to/index.html?a=b").unwrap();
        assert_eq!(key.reversed_host(), "com.foo.bar");
        assert_eq!(key.scheme(), "http");
        assert_eq!(key.port(), Some("8983"));
        assert_eq!(key.path_and_query(), "/to/index.html?a=b");

        let l = key.to_locator().unwrap();
        assert_eq!(l, locator("http", "bar.foo.com", Some(8983), "/to/index.html?a=b"));
    }

    #[test]
    fn test_structured_decode_rejects_bad_port() {
        let key = ReversedKey::parse("com.example:http:abc/").unwrap();
        assert!(matches!(key.to_locator(), Err(CrawlError::MalformedKey(_))));
        // the string form passes the port through untouched
        assert_eq!(unreverse_url("com.example:http:abc/").unwrap(), "http://example.com:abc/");
    }

    #[test]
    fn test_display_matches_decoded_key() {
        let l = locator("http", "example.com", Some(8080), "page");
        assert_eq!(l.to_string(), "http://example.com:8080/page");
        assert_eq!(unreverse_url(&l.reverse()).unwrap(), l.to_string());
    }
}
