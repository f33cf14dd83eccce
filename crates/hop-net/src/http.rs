//! HTTP request/response contracts.

use crate::url::PageUrl;
use hop_core::HopError;
use hop_core::HopResult;

/// Methods the navigation layer issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl HttpVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http10 => "HTTP/1.0",
            Self::Http11 => "HTTP/1.1",
        }
    }
}

/// Single HTTP header with validated wire-safe name/value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: &str, value: &str) -> HopResult<Self> {
        if name.is_empty() || !name.bytes().all(is_token_byte) {
            return Err(HopError::new(
                "net.http.header_name_invalid",
                format!("invalid HTTP header name `{name}`"),
            ));
        }

        if value.bytes().any(|byte| matches!(byte, b'\r' | b'\n' | 0)) {
            return Err(HopError::new(
                "net.http.header_value_invalid",
                format!("invalid characters found in HTTP header `{name}`"),
            ));
        }

        Ok(Self {
            name: name.to_owned(),
            value: value.to_owned(),
        })
    }
}

/// Outgoing request. Bodies are never sent by this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: PageUrl,
    pub headers: Vec<Header>,
}

impl HttpRequest {
    /// Builds a request with a `Host` header derived from `url`. The fragment
    /// is stripped since it never goes on the wire.
    pub fn new(method: HttpMethod, url: &PageUrl) -> HopResult<Self> {
        let url = url.without_fragment();
        let host = Header::new("Host", &url.authority())?;
        Ok(Self {
            method,
            url,
            headers: vec![host],
        })
    }

    pub fn with_header(mut self, name: &str, value: &str) -> HopResult<Self> {
        self.headers.retain(|header| !header.name.eq_ignore_ascii_case(name));
        self.headers.push(Header::new(name, value)?);
        Ok(self)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut encoded = Vec::new();
        encoded.extend_from_slice(self.method.as_str().as_bytes());
        encoded.push(b' ');
        encoded.extend_from_slice(self.url.path_and_query().as_bytes());
        encoded.extend_from_slice(b" HTTP/1.1\r\n");
        for header in &self.headers {
            encoded.extend_from_slice(header.name.as_bytes());
            encoded.extend_from_slice(b": ");
            encoded.extend_from_slice(header.value.as_bytes());
            encoded.extend_from_slice(b"\r\n");
        }
        encoded.extend_from_slice(b"\r\n");
        encoded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HttpStatusCode(u16);

impl HttpStatusCode {
    pub fn new(code: u16) -> HopResult<Self> {
        if (100..=599).contains(&code) {
            return Ok(Self(code));
        }

        Err(HopError::new(
            "net.http.status_invalid",
            format!("status code must be 100-599, got `{code}`"),
        ))
    }

    pub fn as_u16(self) -> u16 {
        self.0
    }

    pub fn is_success(self) -> bool {
        (200..=299).contains(&self.0)
    }

    pub fn is_redirect(self) -> bool {
        matches!(self.0, 301 | 302 | 303 | 307 | 308)
    }

    pub(crate) fn disallows_body(self) -> bool {
        (100..200).contains(&self.0) || self.0 == 204 || self.0 == 304
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub version: HttpVersion,
    pub status: HttpStatusCode,
    pub headers: Vec<Header>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> &str {
        self.header("content-type").unwrap_or("")
    }
}

pub(crate) fn find_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(name))
        .map(|header| header.value.as_str())
}

pub(crate) fn header_contains(headers: &[Header], name: &str, value: &str) -> bool {
    headers.iter().any(|header| {
        header.name.eq_ignore_ascii_case(name)
            && header
                .value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case(value))
    })
}

fn is_token_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_'
                | b'`' | b'|' | b'~'
        )
}

#[cfg(test)]
mod tests {
    use super::Header;
    use super::HttpMethod;
    use super::HttpRequest;
    use crate::url::PageUrl;

    #[test]
    fn rejects_header_injection() {
        assert!(Header::new("X-Test", "a\r\nSet-Cookie: b").is_err());
        assert!(Header::new("Bad Name", "x").is_err());
    }

    #[test]
    fn encodes_request_without_fragment() {
        let url = match PageUrl::parse("https://a.example:8443/about?x=1#team") {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        let request = HttpRequest::new(HttpMethod::Get, &url)
            .and_then(|request| request.with_header("Accept", "text/html"));
        let request = match request {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };

        let encoded = String::from_utf8_lossy(&request.encode()).into_owned();
        assert_eq!(
            encoded,
            "GET /about?x=1 HTTP/1.1\r\nHost: a.example:8443\r\nAccept: text/html\r\n\r\n"
        );
    }

    #[test]
    fn with_header_replaces_existing_value() {
        let url = match PageUrl::parse("https://a.example/") {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        let request = HttpRequest::new(HttpMethod::Head, &url)
            .and_then(|request| request.with_header("accept", "a"))
            .and_then(|request| request.with_header("Accept", "b"));
        let request = match request {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(request.header("ACCEPT"), Some("b"));
        assert_eq!(request.headers.len(), 2);
    }
}
