// minimal HTTP/1.1 messages for the blob endpoint
use std::fmt;

use serde::Serialize;
use thiserror::Error;

const MAX_HEAD_SIZE: usize = 16 * 1024;
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";

pub const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("message exceeds {0} bytes")]
    TooLarge(usize),
}

pub trait Frame: Sized {
    /// Parse one message from the front of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` does not hold a complete message yet,
    /// otherwise the message and the number of bytes it occupied.
    fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>, FrameError>;

    fn encode(&self) -> Vec<u8>;

    // Reply owed to the peer while `buf` holds a complete head whose body is
    // still outstanding.
    fn interim(_buf: &[u8]) -> Option<&'static [u8]> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other(String),
}

impl Method {
    fn from_token(token: &str) -> Method {
        match token {
            "GET" => Method::Get,
            "POST" => Method::Post,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Other(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub target: String,
    pub http10: bool,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        HttpRequest {
            method,
            target: target.into(),
            http10: false,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_form(mut self, fields: &[(&str, &str)]) -> Self {
        let body = fields
            .iter()
            .map(|(k, v)| format!("{}={}", encode_form_component(k), encode_form_component(v)))
            .collect::<Vec<_>>()
            .join("&");
        self.body = body.into_bytes();
        self.with_header("Content-Type", FORM_CONTENT_TYPE)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }

    pub fn keep_alive(&self) -> bool {
        match self.header("Connection").map(str::to_ascii_lowercase) {
            Some(v) if v == "close" => false,
            Some(v) if v == "keep-alive" => true,
            _ => !self.http10,
        }
    }

    // First value of a form field from a urlencoded or multipart body. Multipart
    // parts carrying a filename are uploads, not form fields.
    pub fn form_field(&self, name: &str) -> Option<Vec<u8>> {
        let content_type = self.header("Content-Type")?;
        let (mime, params) = content_type.split_once(';').unwrap_or((content_type, ""));

        match mime.trim().to_ascii_lowercase().as_str() {
            FORM_CONTENT_TYPE => urlencoded_field(&self.body, name),
            MULTIPART_CONTENT_TYPE => {
                let boundary = header_param(params, "boundary")?;
                multipart_field(&self.body, boundary, name)
            }
            _ => None,
        }
    }
}

impl Frame for HttpRequest {
    fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>, FrameError> {
        let head = match Head::parse(buf)? {
            Some(head) => head,
            None => return Ok(None),
        };

        let mut parts = head.start_line.split(' ');
        let (method, target, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(t), Some(v)) if parts.next().is_none() => (m, t, v),
            _ => return Err(malformed(&head.start_line)),
        };
        let http10 = match version {
            "HTTP/1.1" => false,
            "HTTP/1.0" => true,
            _ => return Err(malformed(&head.start_line)),
        };

        let total = head.len + head.content_length;
        if buf.len() < total {
            return Ok(None);
        }

        let request = HttpRequest {
            method: Method::from_token(method),
            target: target.to_string(),
            http10,
            headers: head.headers,
            body: buf[head.len..total].to_vec(),
        };
        Ok(Some((request, total)))
    }

    fn interim(buf: &[u8]) -> Option<&'static [u8]> {
        let head = Head::parse(buf).ok()??;
        let expects_continue = find_header(&head.headers, "Expect")
            .map_or(false, |v| v.eq_ignore_ascii_case("100-continue"));

        if expects_continue
            && head.start_line.ends_with("HTTP/1.1")
            && head.content_length > 0
            && buf.len() == head.len
        {
            Some(CONTINUE)
        } else {
            None
        }
    }

    fn encode(&self) -> Vec<u8> {
        let version = if self.http10 { "HTTP/1.0" } else { "HTTP/1.1" };
        let start_line = format!("{} {} {}", self.method, self.target, version);
        encode_message(&start_line, &self.headers, &self.body)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn empty(status: u16) -> Self {
        HttpResponse::new(status).with_header("Content-Type", "text/plain")
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let mut response =
            HttpResponse::new(status).with_header("Content-Type", "text/plain; charset=utf-8");
        response.body = body.into().into_bytes();
        response
    }

    pub fn json<T: Serialize>(status: u16, body: &T) -> Self {
        match serde_json::to_vec(body) {
            Ok(bytes) => {
                let mut response =
                    HttpResponse::new(status).with_header("Content-Type", "application/json");
                response.body = bytes;
                response
            }
            Err(e) => {
                log::error!("encode json response failed, reason: {}", e);
                HttpResponse::empty(500)
            }
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl Frame for HttpResponse {
    fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>, FrameError> {
        let head = match Head::parse(buf)? {
            Some(head) => head,
            None => return Ok(None),
        };

        let mut parts = head.start_line.splitn(3, ' ');
        let status = match (parts.next(), parts.next()) {
            (Some(version), Some(code)) if version.starts_with("HTTP/1.") => code
                .parse::<u16>()
                .map_err(|_| malformed(&head.start_line))?,
            _ => return Err(malformed(&head.start_line)),
        };

        let total = head.len + head.content_length;
        if buf.len() < total {
            return Ok(None);
        }

        let response = HttpResponse {
            status,
            headers: head.headers,
            body: buf[head.len..total].to_vec(),
        };
        Ok(Some((response, total)))
    }

    fn encode(&self) -> Vec<u8> {
        let start_line = format!("HTTP/1.1 {} {}", self.status, reason_phrase(self.status));
        encode_message(&start_line, &self.headers, &self.body)
    }
}

// start line, headers and body length of a message whose head is complete
struct Head {
    start_line: String,
    headers: Vec<(String, String)>,
    len: usize,
    content_length: usize,
}

impl Head {
    fn parse(buf: &[u8]) -> Result<Option<Head>, FrameError> {
        let end = match buf.windows(4).position(|w| w == b"\r\n\r\n") {
            Some(end) => end,
            None if buf.len() > MAX_HEAD_SIZE => return Err(FrameError::TooLarge(MAX_HEAD_SIZE)),
            None => return Ok(None),
        };
        if end > MAX_HEAD_SIZE {
            return Err(FrameError::TooLarge(MAX_HEAD_SIZE));
        }

        let text = std::str::from_utf8(&buf[..end])
            .map_err(|_| FrameError::Malformed("head is not valid UTF-8".to_string()))?;
        let mut lines = text.split("\r\n");
        let start_line = lines.next().unwrap_or_default().to_string();

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line.split_once(':').ok_or_else(|| malformed(line))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        if let Some(encoding) = find_header(&headers, "Transfer-Encoding") {
            return Err(FrameError::Malformed(format!(
                "transfer encoding {} is not supported",
                encoding
            )));
        }
        let content_length = match find_header(&headers, "Content-Length") {
            Some(v) => v.parse::<usize>().map_err(|_| malformed(v))?,
            None => 0,
        };
        if content_length > MAX_BODY_SIZE {
            return Err(FrameError::TooLarge(MAX_BODY_SIZE));
        }

        Ok(Some(Head {
            start_line,
            headers,
            len: end + 4,
            content_length,
        }))
    }
}

fn malformed(line: &str) -> FrameError {
    FrameError::Malformed(line.to_string())
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn encode_message(start_line: &str, headers: &[(String, String)], body: &[u8]) -> Vec<u8> {
    let mut head = format!("{}\r\n", start_line);
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("Content-Length") {
            continue;
        }
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));

    let mut bytes = head.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "",
    }
}

fn urlencoded_field(body: &[u8], name: &str) -> Option<Vec<u8>> {
    body.split(|&b| b == b'&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.iter().position(|&b| b == b'=') {
            Some(i) => (decode_form_component(&pair[..i]), &pair[i + 1..]),
            None => (decode_form_component(pair), &pair[pair.len()..]),
        })
        .find(|(key, _)| key == name.as_bytes())
        .map(|(_, value)| decode_form_component(value))
}

fn multipart_field(body: &[u8], boundary: &str, name: &str) -> Option<Vec<u8>> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let part_end = [&b"\r\n"[..], &delimiter[..]].concat();

    let start = find(body, &delimiter)?;
    let mut rest = &body[start + delimiter.len()..];

    loop {
        if rest.starts_with(b"--") {
            return None;
        }
        // the remainder of the delimiter line is transport padding
        let line_end = find(rest, b"\r\n")?;
        rest = &rest[line_end + 2..];

        let end = find(rest, &part_end)?;
        let part = &rest[..end];
        rest = &rest[end + part_end.len()..];

        let (head, content) = if let Some(content) = part.strip_prefix(b"\r\n") {
            (&part[..0], content)
        } else {
            let head_end = find(part, b"\r\n\r\n")?;
            (&part[..head_end], &part[head_end + 4..])
        };

        let head = String::from_utf8_lossy(head);
        let disposition = head
            .split("\r\n")
            .filter_map(|line| line.split_once(':'))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("Content-Disposition"))
            .map(|(_, v)| v);

        if let Some(disposition) = disposition {
            let params = disposition.split_once(';').map_or("", |(_, p)| p);
            if header_param(params, "name") == Some(name)
                && header_param(params, "filename").is_none()
            {
                return Some(content.to_vec());
            }
        }
    }
}

// value of `key` in a `; k=v; k2="v2"` parameter list
fn header_param<'a>(params: &'a str, key: &str) -> Option<&'a str> {
    params
        .split(';')
        .filter_map(|param| param.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim().trim_matches('"'))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn decode_form_component(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < input.len() => {
                match (hex_value(input[i + 1]), hex_value(input[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    out
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

pub fn encode_form_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for &b in input.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
