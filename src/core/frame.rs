use bytes::Bytes;

/// Transport-neutral websocket frame type.
///
/// Transports convert their native frame representation into/from `WsFrame`; the STOMP layer
/// only ever looks at text and binary payloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WsFrame {
    Text(Bytes),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<WsCloseFrame>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WsCloseFrame {
    pub code: u16,
    pub reason: Bytes,
}

impl WsFrame {
    /// Wrap an owned string as a text frame.
    #[inline]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(Bytes::from(s.into()))
    }

    #[inline]
    pub fn close(code: u16, reason: Bytes) -> Self {
        Self::Close(Some(WsCloseFrame { code, reason }))
    }

    /// Payload carrying application data (text or binary), if any.
    ///
    /// STOMP brokers may send frames as either kind, so both are treated as candidate STOMP
    /// frames. Control frames return `None`.
    #[inline]
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            WsFrame::Text(bytes) | WsFrame::Binary(bytes) => Some(bytes.as_ref()),
            WsFrame::Ping(_) | WsFrame::Pong(_) | WsFrame::Close(_) => None,
        }
    }

    #[inline]
    pub fn is_close(&self) -> bool {
        matches!(self, WsFrame::Close(_))
    }
}

/// Human readable reason for a close frame, used in disconnect logs.
pub fn close_reason(frame: Option<&WsCloseFrame>) -> String {
    frame
        .map(|f| {
            format!(
                "code={} reason={}",
                f.code,
                String::from_utf8_lossy(f.reason.as_ref())
            )
        })
        .unwrap_or_else(|| "remote closed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_is_exposed_for_text_and_binary_only() {
        assert_eq!(WsFrame::text("abc").data(), Some(&b"abc"[..]));
        assert_eq!(
            WsFrame::Binary(Bytes::from_static(b"\x00\x01")).data(),
            Some(&b"\x00\x01"[..])
        );
        assert_eq!(WsFrame::Ping(Bytes::from_static(b"p")).data(), None);
        assert_eq!(WsFrame::Close(None).data(), None);
    }

    #[test]
    fn close_reason_formats_code_and_text() {
        let frame = WsCloseFrame {
            code: 1000,
            reason: Bytes::from_static(b"bye"),
        };
        assert_eq!(close_reason(Some(&frame)), "code=1000 reason=bye");
        assert_eq!(close_reason(None), "remote closed");
    }
}
