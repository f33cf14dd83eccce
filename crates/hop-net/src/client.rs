//! Blocking HTTP/1.1 client: one connection per request.

use crate::http::Header;
use crate::http::HttpMethod;
use crate::http::HttpRequest;
use crate::http::HttpResponse;
use crate::http::HttpStatusCode;
use crate::http::HttpVersion;
use crate::http::find_header;
use crate::http::header_contains;
use crate::tls::BoxedIoStream;
use crate::tls::TlsConnector;
use crate::tls::TrustStoreMode;
use brotli::Decompressor;
use flate2::read::DeflateDecoder;
use flate2::read::GzDecoder;
use flate2::read::ZlibDecoder;
use hop_core::HopError;
use hop_core::HopResult;
use std::io::Cursor;
use std::io::Read;
use std::io::Write;
use std::net::SocketAddr;
use std::net::TcpStream;
use std::net::ToSocketAddrs;
use std::time::Duration;

const MAX_RESPONSE_HEAD_BYTES: usize = 128 * 1024;
const MAX_CHUNK_LINE_BYTES: usize = 8 * 1024;
const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Client tuning shared by page fetches and prefetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientConfig {
    pub connect_timeout: Duration,
    pub max_redirects: usize,
    pub trust_store: TrustStoreMode,
    pub user_agent: String,
    /// Upper bound on a response body, both as framed on the wire and after
    /// content decoding.
    pub max_body_bytes: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            max_redirects: 10,
            trust_store: TrustStoreMode::WebPkiOnly,
            user_agent: concat!("hopscotch/", env!("CARGO_PKG_VERSION")).to_owned(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Http11Client {
    config: HttpClientConfig,
    tls: TlsConnector,
}

impl Http11Client {
    pub fn new(config: HttpClientConfig) -> HopResult<Self> {
        let tls = TlsConnector::new(config.trust_store)?;
        Ok(Self { config, tls })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Sends `request` on a fresh connection and reads one full response.
    /// `Connection: close` is always sent; there is no pooling.
    pub fn execute(&self, request: HttpRequest) -> HopResult<HttpResponse> {
        let request = request
            .with_header("Connection", "close")?
            .with_header("User-Agent", &self.config.user_agent)?;

        let mut stream = self.open_stream(&request)?;
        stream.write_all(&request.encode()).map_err(|error| {
            HopError::new(
                "net.http.write_failed",
                format!("failed to write HTTP request bytes: {error}"),
            )
        })?;
        stream.flush().map_err(|error| {
            HopError::new(
                "net.http.flush_failed",
                format!("failed to flush HTTP request bytes: {error}"),
            )
        })?;

        read_response(&mut *stream, request.method, self.config.max_body_bytes)
    }

    fn open_stream(&self, request: &HttpRequest) -> HopResult<BoxedIoStream> {
        let host = request.url.host();
        let port = request.url.port();
        let addresses = resolve(host, port)?;
        let stream = connect_first_available(&addresses, self.config.connect_timeout)?;

        if request.url.is_secure() {
            self.tls.connect(stream, host)
        } else {
            Ok(Box::new(stream))
        }
    }
}

fn resolve(host: &str, port: u16) -> HopResult<Vec<SocketAddr>> {
    let query = format!("{host}:{port}");
    let addresses: Vec<SocketAddr> = query
        .to_socket_addrs()
        .map_err(|error| {
            HopError::new(
                "net.dns.resolve_failed",
                format!("failed to resolve `{query}`: {error}"),
            )
        })?
        .collect();

    if addresses.is_empty() {
        return Err(HopError::new(
            "net.dns.no_results",
            format!("resolver returned no addresses for `{query}`"),
        ));
    }

    Ok(addresses)
}

fn connect_first_available(addresses: &[SocketAddr], timeout: Duration) -> HopResult<TcpStream> {
    let mut last_error = HopError::new(
        "net.transport.no_addresses",
        "no addresses available to open a connection",
    );

    for address in addresses {
        match TcpStream::connect_timeout(address, timeout) {
            Ok(stream) => {
                let configured = stream
                    .set_nodelay(true)
                    .and_then(|()| stream.set_read_timeout(Some(timeout)))
                    .and_then(|()| stream.set_write_timeout(Some(timeout)));
                if let Err(error) = configured {
                    last_error = HopError::new(
                        "net.transport.configure_failed",
                        format!("failed to configure socket for `{address}`: {error}"),
                    );
                    continue;
                }
                return Ok(stream);
            }
            Err(error) => {
                last_error = HopError::new(
                    "net.transport.connect_failed",
                    format!("failed to connect to `{address}`: {error}"),
                );
            }
        }
    }

    Err(last_error)
}

fn read_response<R: Read + ?Sized>(
    stream: &mut R,
    method: HttpMethod,
    max_body_bytes: usize,
) -> HopResult<HttpResponse> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];
    let header_end = loop {
        if let Some(end) = find_header_end(&buffer) {
            break end;
        }

        let read = stream.read(&mut chunk).map_err(|error| {
            HopError::new(
                "net.http.read_head_failed",
                format!("failed while reading HTTP response head: {error}"),
            )
        })?;
        if read == 0 {
            return Err(HopError::new(
                "net.http.unexpected_eof",
                "unexpected EOF before response head completed",
            ));
        }

        buffer.extend_from_slice(&chunk[..read]);
        if buffer.len() > MAX_RESPONSE_HEAD_BYTES {
            return Err(HopError::new(
                "net.http.head_too_large",
                format!("HTTP response head exceeds {MAX_RESPONSE_HEAD_BYTES} bytes"),
            ));
        }
    };

    let head_text = std::str::from_utf8(&buffer[..header_end]).map_err(|error| {
        HopError::new(
            "net.http.head_invalid_utf8",
            format!("HTTP response head is not valid UTF-8 text: {error}"),
        )
    })?;

    let mut lines = head_text.split("\r\n");
    let (version, status) = parse_status_line(lines.next().unwrap_or_default())?;
    let mut headers = Vec::new();
    for line in lines.filter(|line| !line.is_empty()) {
        let (name, value) = line.split_once(':').ok_or_else(|| {
            HopError::new(
                "net.http.header_invalid",
                format!("invalid HTTP header line `{line}`"),
            )
        })?;
        headers.push(Header::new(name.trim(), value.trim())?);
    }

    let prefetched = buffer[header_end..].to_vec();
    let body = if method == HttpMethod::Head || status.disallows_body() {
        Vec::new()
    } else {
        let raw = read_body(stream, &headers, prefetched, max_body_bytes)?;
        decode_content_encoding(&headers, raw, max_body_bytes)?
    };

    Ok(HttpResponse {
        version,
        status,
        headers,
        body,
    })
}

fn read_body<R: Read + ?Sized>(
    stream: &mut R,
    headers: &[Header],
    prefetched: Vec<u8>,
    max_body_bytes: usize,
) -> HopResult<Vec<u8>> {
    if let Some(encoding) = find_header(headers, "transfer-encoding") {
        if !header_contains(headers, "transfer-encoding", "chunked") {
            return Err(HopError::new(
                "net.http.transfer_encoding_unsupported",
                format!("unsupported transfer encoding `{encoding}`"),
            ));
        }
        return read_chunked_body(stream, prefetched, max_body_bytes);
    }

    let mut body = prefetched;
    match parse_content_length(headers)? {
        Some(length) if length > max_body_bytes => {
            return Err(body_too_large(max_body_bytes));
        }
        Some(length) if body.len() >= length => body.truncate(length),
        Some(length) => {
            let start = body.len();
            body.resize(length, 0);
            stream.read_exact(&mut body[start..]).map_err(|error| {
                HopError::new(
                    "net.http.read_body_failed",
                    format!("failed to read HTTP body bytes: {error}"),
                )
            })?;
        }
        None => {
            let remaining = (max_body_bytes + 1).saturating_sub(body.len());
            stream
                .take(u64::try_from(remaining).unwrap_or(u64::MAX))
                .read_to_end(&mut body)
                .map_err(|error| {
                    HopError::new(
                        "net.http.read_body_failed",
                        format!("failed while draining connection-close response body: {error}"),
                    )
                })?;
            if body.len() > max_body_bytes {
                return Err(body_too_large(max_body_bytes));
            }
        }
    }

    Ok(body)
}

fn read_chunked_body<R: Read + ?Sized>(
    stream: &mut R,
    prefetched: Vec<u8>,
    max_body_bytes: usize,
) -> HopResult<Vec<u8>> {
    let mut reader = Cursor::new(prefetched).chain(stream);
    let mut decoded = Vec::new();

    loop {
        let size_line = read_crlf_line(&mut reader)?;
        if size_line.is_empty() {
            continue;
        }

        let size_token = size_line.split(';').next().unwrap_or_default().trim();
        let chunk_size = usize::from_str_radix(size_token, 16).map_err(|error| {
            HopError::new(
                "net.http.chunk_size_invalid",
                format!("invalid chunk size `{size_token}`: {error}"),
            )
        })?;

        if chunk_size == 0 {
            // Trailers are read and discarded.
            while !read_crlf_line(&mut reader)?.is_empty() {}
            break;
        }

        let start = decoded.len();
        let end = start
            .checked_add(chunk_size)
            .filter(|end| *end <= max_body_bytes)
            .ok_or_else(|| body_too_large(max_body_bytes))?;
        decoded.resize(end, 0);
        let mut terminator = [0_u8; 2];
        reader
            .read_exact(&mut decoded[start..])
            .and_then(|()| reader.read_exact(&mut terminator))
            .map_err(|error| {
                HopError::new(
                    "net.http.read_body_failed",
                    format!("failed while reading chunked HTTP body bytes: {error}"),
                )
            })?;
        if terminator != *b"\r\n" {
            return Err(HopError::new(
                "net.http.chunk_terminator_invalid",
                "chunk data is missing trailing CRLF",
            ));
        }
    }

    Ok(decoded)
}

fn body_too_large(max_body_bytes: usize) -> HopError {
    HopError::new(
        "net.http.body_too_large",
        format!("HTTP response body exceeds {max_body_bytes} bytes"),
    )
}

fn read_crlf_line(reader: &mut impl Read) -> HopResult<String> {
    let mut line = Vec::new();
    let mut byte = [0_u8; 1];

    while !line.ends_with(b"\r\n") {
        reader.read_exact(&mut byte).map_err(|error| {
            HopError::new(
                "net.http.read_body_failed",
                format!("failed while reading chunked transfer line: {error}"),
            )
        })?;
        line.push(byte[0]);

        if line.len() > MAX_CHUNK_LINE_BYTES {
            return Err(HopError::new(
                "net.http.chunk_line_too_large",
                format!("chunk metadata line exceeds {MAX_CHUNK_LINE_BYTES} bytes"),
            ));
        }
    }

    line.truncate(line.len() - 2);
    String::from_utf8(line).map_err(|error| {
        HopError::new(
            "net.http.chunk_line_invalid_utf8",
            format!("chunk metadata line is not valid UTF-8: {error}"),
        )
    })
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|idx| idx + 4)
}

fn parse_status_line(line: &str) -> HopResult<(HttpVersion, HttpStatusCode)> {
    let mut parts = line.splitn(3, ' ');
    let version = match parts.next().unwrap_or_default() {
        "HTTP/1.0" => HttpVersion::Http10,
        "HTTP/1.1" => HttpVersion::Http11,
        other => {
            return Err(HopError::new(
                "net.http.version_unsupported",
                format!("unsupported response version `{other}` in `{line}`"),
            ));
        }
    };

    let code_text = parts.next().unwrap_or_default();
    let code = code_text.parse::<u16>().map_err(|error| {
        HopError::new(
            "net.http.status_line_invalid",
            format!("invalid status code `{code_text}`: {error}"),
        )
    })?;

    Ok((version, HttpStatusCode::new(code)?))
}

fn parse_content_length(headers: &[Header]) -> HopResult<Option<usize>> {
    let mut value: Option<usize> = None;
    for header in headers
        .iter()
        .filter(|header| header.name.eq_ignore_ascii_case("content-length"))
    {
        let parsed = header.value.trim().parse::<usize>().map_err(|error| {
            HopError::new(
                "net.http.content_length_invalid",
                format!("invalid Content-Length `{}`: {error}", header.value),
            )
        })?;

        if value.is_some_and(|existing| existing != parsed) {
            return Err(HopError::new(
                "net.http.content_length_conflict",
                "conflicting Content-Length headers in response",
            ));
        }
        value = Some(parsed);
    }

    Ok(value)
}

fn decode_content_encoding(
    headers: &[Header],
    body: Vec<u8>,
    max_body_bytes: usize,
) -> HopResult<Vec<u8>> {
    let encodings: Vec<String> = headers
        .iter()
        .filter(|header| header.name.eq_ignore_ascii_case("content-encoding"))
        .flat_map(|header| header.value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    let mut decoded = body;
    for encoding in encodings.iter().rev() {
        decoded = match encoding.as_str() {
            "identity" => decoded,
            "gzip" | "x-gzip" => read_all(
                GzDecoder::new(Cursor::new(decoded)),
                "gzip",
                max_body_bytes,
            )?,
            "deflate" => decode_deflate(decoded, max_body_bytes)?,
            "br" => read_all(
                Decompressor::new(Cursor::new(decoded), 4096),
                "brotli",
                max_body_bytes,
            )?,
            _ => {
                return Err(HopError::new(
                    "net.http.content_encoding_unsupported",
                    format!("unsupported content encoding `{encoding}`"),
                ));
            }
        };
    }

    Ok(decoded)
}

/// Servers disagree on whether `deflate` means zlib-wrapped or raw.
fn decode_deflate(body: Vec<u8>, max_body_bytes: usize) -> HopResult<Vec<u8>> {
    match read_all(ZlibDecoder::new(Cursor::new(&body)), "zlib", max_body_bytes) {
        Ok(zlib) => Ok(zlib),
        Err(error) if error.code == "net.http.body_too_large" => Err(error),
        Err(_) => read_all(
            DeflateDecoder::new(Cursor::new(body)),
            "deflate",
            max_body_bytes,
        ),
    }
}

/// Decodes at most `max_body_bytes`; one byte more means the limit is hit.
fn read_all(decoder: impl Read, label: &str, max_body_bytes: usize) -> HopResult<Vec<u8>> {
    let cap = u64::try_from(max_body_bytes)
        .unwrap_or(u64::MAX)
        .saturating_add(1);
    let mut decoded = Vec::new();
    decoder.take(cap).read_to_end(&mut decoded).map_err(|error| {
        HopError::new(
            "net.http.decode_failed",
            format!("{label} decode failed: {error}"),
        )
    })?;
    if decoded.len() > max_body_bytes {
        return Err(body_too_large(max_body_bytes));
    }
    Ok(decoded)
}
