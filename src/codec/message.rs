use super::headers::{split_values, HeaderMap};
use super::traits::{WireDecode, WireEncode};
use super::FormatError;
use std::fmt;
use std::io::{Result, Write};
use std::str::FromStr;

pub const METHOD_SEARCH: &str = "M-SEARCH";
pub const METHOD_NOTIFY: &str = "NOTIFY";

/// Protocol version from a start line, e.g. `HTTP/1.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpVersion {
    pub major: u8,
    pub minor: u8,
}

impl HttpVersion {
    pub const HTTP_11: HttpVersion = HttpVersion { major: 1, minor: 1 };
}

impl Default for HttpVersion {
    fn default() -> Self {
        HttpVersion::HTTP_11
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

impl FromStr for HttpVersion {
    type Err = FormatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || FormatError::InvalidVersion(s.to_string());
        if !s.get(..5).is_some_and(|prefix| prefix.eq_ignore_ascii_case("HTTP/")) {
            return Err(invalid());
        }
        let (major, minor) = s.get(5..).and_then(|rest| rest.split_once('.')).ok_or_else(invalid)?;
        let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !digits(major) || !digits(minor) {
            return Err(invalid());
        }
        Ok(HttpVersion {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

/// `METHOD * HTTP/1.1` style message (M-SEARCH, NOTIFY).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpRequest {
    pub method: String,
    pub target: String,
    pub version: HttpVersion,
    pub headers: HeaderMap,
}

impl SsdpRequest {
    pub fn new(method: &str, headers: HeaderMap) -> Self {
        SsdpRequest {
            method: method.to_string(),
            target: "*".to_string(),
            version: HttpVersion::HTTP_11,
            headers,
        }
    }

    pub fn is_search(&self) -> bool {
        self.method.eq_ignore_ascii_case(METHOD_SEARCH)
    }

    pub fn is_notify(&self) -> bool {
        self.method.eq_ignore_ascii_case(METHOD_NOTIFY)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.first(name)
    }
}

/// `HTTP/1.1 200 OK` style message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpResponse {
    pub version: HttpVersion,
    pub status_code: u16,
    pub reason: String,
    pub headers: HeaderMap,
}

impl SsdpResponse {
    pub fn ok(headers: HeaderMap) -> Self {
        SsdpResponse {
            version: HttpVersion::HTTP_11,
            status_code: 200,
            reason: "OK".to_string(),
            headers,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.first(name)
    }
}

impl WireEncode for SsdpRequest {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        write!(writer, "{} {} {}\r\n", self.method, self.target, self.version)?;
        write!(writer, "{}\r\n", self.headers)
    }
}

impl WireEncode for SsdpResponse {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        write!(writer, "{} {} {}\r\n", self.version, self.status_code, self.reason)?;
        write!(writer, "{}\r\n", self.headers)
    }
}

impl WireDecode for SsdpRequest {
    fn decode(text: &str) -> std::result::Result<Self, FormatError> {
        let (start_line, header_lines) = split_message(text)?;

        let parts: Vec<&str> = start_line.trim().split(' ').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(FormatError::InvalidStartLine(start_line.to_string()));
        }
        let version = parts[2].parse::<HttpVersion>()?;

        Ok(SsdpRequest {
            method: parts[0].to_string(),
            target: parts[1].to_string(),
            version,
            headers: parse_headers(&header_lines),
        })
    }
}

impl WireDecode for SsdpResponse {
    fn decode(text: &str) -> std::result::Result<Self, FormatError> {
        let (start_line, header_lines) = split_message(text)?;

        let mut parts = start_line.trim().splitn(3, ' ');
        let version = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| FormatError::InvalidStartLine(start_line.to_string()))?
            .parse::<HttpVersion>()?;
        let status = parts
            .next()
            .ok_or_else(|| FormatError::InvalidStartLine(start_line.to_string()))?;
        if status.len() != 3 || !status.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FormatError::InvalidStatusCode(status.to_string()));
        }
        let status_code = status
            .parse::<u16>()
            .map_err(|_| FormatError::InvalidStatusCode(status.to_string()))?;
        let reason = parts.next().unwrap_or("").trim().to_string();

        Ok(SsdpResponse {
            version,
            status_code,
            reason,
            headers: parse_headers(&header_lines),
        })
    }
}

/// Splits wire text into its start line and header lines.
///
/// Fails unless the header block is closed by a blank line (CRLF CRLF or LF LF).
fn split_message(text: &str) -> std::result::Result<(&str, Vec<&str>), FormatError> {
    if text.trim().is_empty() {
        return Err(FormatError::Empty);
    }

    let end = [text.find("\r\n\r\n"), text.find("\n\n")]
        .into_iter()
        .flatten()
        .min()
        .ok_or(FormatError::MissingTerminator)?;

    let mut lines = text[..end]
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line));
    let start_line = lines.next().unwrap_or("");
    if start_line.trim().is_empty() {
        return Err(FormatError::InvalidStartLine(start_line.to_string()));
    }
    Ok((start_line, lines.collect()))
}

fn parse_headers(lines: &[&str]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let mut last_name: Option<String> = None;

    for line in lines {
        if line.starts_with([' ', '\t']) {
            // continuation of the previous header
            if line.trim().is_empty() {
                continue;
            }
            if let Some(name) = &last_name {
                headers.extend_values(name, split_values(line));
            }
            continue;
        }

        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        headers.extend_values(name, split_values(value));
        last_name = Some(name.to_string());
    }
    headers
}
