//! STOMP 1.2 frame model and codec.
//!
//! Only the client-side subset used by the chat transport is modelled. Frames are carried one per
//! websocket message; heartbeats arrive as bare EOLs and decode to `None`.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::types::{ChatError, ChatResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StompCommand {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl StompCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Stomp => "STOMP",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Send => "SEND",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Disconnect => "DISCONNECT",
            StompCommand::Message => "MESSAGE",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
        }
    }

    fn parse(line: &[u8]) -> Option<Self> {
        Some(match line {
            b"CONNECT" => StompCommand::Connect,
            b"STOMP" => StompCommand::Stomp,
            b"CONNECTED" => StompCommand::Connected,
            b"SEND" => StompCommand::Send,
            b"SUBSCRIBE" => StompCommand::Subscribe,
            b"UNSUBSCRIBE" => StompCommand::Unsubscribe,
            b"DISCONNECT" => StompCommand::Disconnect,
            b"MESSAGE" => StompCommand::Message,
            b"RECEIPT" => StompCommand::Receipt,
            b"ERROR" => StompCommand::Error,
            _ => return None,
        })
    }

    /// CONNECT and CONNECTED frames carry raw header values (no escaping), for 1.0 compatibility.
    #[inline]
    fn escapes_headers(self) -> bool {
        !matches!(self, StompCommand::Connect | StompCommand::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value for `name`; repeated headers after the first are ignored.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn connect(host: &str, authorization: Option<&str>) -> Self {
        let frame = StompFrame::new(StompCommand::Connect)
            .header("accept-version", "1.2,1.1,1.0")
            .header("host", host)
            .header("heart-beat", "0,0");
        match authorization {
            Some(token) => frame.header("Authorization", format!("Bearer {token}")),
            None => frame,
        }
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        StompFrame::new(StompCommand::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        StompFrame::new(StompCommand::Unsubscribe).header("id", id)
    }

    pub fn send_json(destination: &str, body: impl Into<Bytes>) -> Self {
        StompFrame::new(StompCommand::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .body(body)
    }

    pub fn disconnect() -> Self {
        StompFrame::new(StompCommand::Disconnect)
    }

    pub fn encode(&self) -> Bytes {
        encode(self)
    }
}

/// Serialize a frame. A `content-length` header is added for non-empty bodies unless the caller
/// already provided one.
pub fn encode(frame: &StompFrame) -> Bytes {
    let escape = frame.command.escapes_headers();
    let mut out = BytesMut::with_capacity(64 + frame.body.len());
    out.put_slice(frame.command.as_str().as_bytes());
    out.put_u8(b'\n');

    for (name, value) in &frame.headers {
        put_header_part(&mut out, name, escape);
        out.put_u8(b':');
        put_header_part(&mut out, value, escape);
        out.put_u8(b'\n');
    }
    if !frame.body.is_empty() && frame.get("content-length").is_none() {
        out.put_slice(b"content-length:");
        out.put_slice(frame.body.len().to_string().as_bytes());
        out.put_u8(b'\n');
    }

    out.put_u8(b'\n');
    out.put_slice(frame.body.as_ref());
    out.put_u8(0);
    out.freeze()
}

fn put_header_part(out: &mut BytesMut, s: &str, escape: bool) {
    if !escape {
        out.put_slice(s.as_bytes());
        return;
    }
    for b in s.bytes() {
        match b {
            b'\\' => out.put_slice(b"\\\\"),
            b'\n' => out.put_slice(b"\\n"),
            b'\r' => out.put_slice(b"\\r"),
            b':' => out.put_slice(b"\\c"),
            _ => out.put_u8(b),
        }
    }
}

fn unescape(raw: &[u8], escape: bool) -> ChatResult<String> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| ChatError::Protocol(format!("header is not valid UTF-8: {e}")))?;
    if !escape || !text.contains('\\') {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(ChatError::Protocol(format!(
                    "undefined header escape sequence: \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

#[inline]
fn is_heartbeat(data: &[u8]) -> bool {
    data.iter().all(|b| matches!(b, b'\n' | b'\r'))
}

/// Split off the next EOL-terminated line (without the EOL).
fn next_line<'a>(rest: &mut &'a [u8]) -> ChatResult<&'a [u8]> {
    let whole: &'a [u8] = *rest;
    let Some(end) = whole.iter().position(|&b| b == b'\n') else {
        return Err(ChatError::Protocol("truncated frame header".to_string()));
    };
    let line = &whole[..end];
    *rest = &whole[end + 1..];
    Ok(line.strip_suffix(b"\r").unwrap_or(line))
}

/// Decode a single frame from one websocket payload.
///
/// Returns `Ok(None)` for heartbeats (payloads made only of EOLs).
pub fn decode(data: &[u8]) -> ChatResult<Option<StompFrame>> {
    if is_heartbeat(data) {
        return Ok(None);
    }

    // Leading EOLs may precede a frame when heartbeats are coalesced with it.
    let start = data
        .iter()
        .position(|b| !matches!(b, b'\n' | b'\r'))
        .unwrap_or(data.len());
    let mut rest = &data[start..];

    let command_line = next_line(&mut rest)?;
    let command = StompCommand::parse(command_line).ok_or_else(|| {
        ChatError::Protocol(format!(
            "unknown command: {}",
            String::from_utf8_lossy(command_line)
        ))
    })?;
    let escape = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let line = next_line(&mut rest)?;
        if line.is_empty() {
            break;
        }
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            return Err(ChatError::Protocol(format!(
                "malformed header line: {}",
                String::from_utf8_lossy(line)
            )));
        };
        let name = unescape(&line[..colon], escape)?;
        let value = unescape(&line[colon + 1..], escape)?;
        headers.push((name, value));
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| ChatError::Protocol(format!("invalid content-length: {v}")))
        })
        .transpose()?;

    let body = match content_length {
        Some(len) => {
            if rest.len() < len + 1 || rest[len] != 0 {
                return Err(ChatError::Protocol(format!(
                    "body shorter than content-length {len} or missing NUL terminator"
                )));
            }
            Bytes::copy_from_slice(&rest[..len])
        }
        None => {
            let Some(nul) = rest.iter().position(|&b| b == 0) else {
                return Err(ChatError::Protocol("missing NUL terminator".to_string()));
            };
            Bytes::copy_from_slice(&rest[..nul])
        }
    };

    Ok(Some(StompFrame {
        command,
        headers,
        body,
    }))
}
