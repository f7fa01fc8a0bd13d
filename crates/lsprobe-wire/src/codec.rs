//! Content-Length framing per the LSP base protocol.
//!
//! A frame is a small header block terminated by a blank line; the only
//! mandatory header declares the exact byte length of the JSON body that
//! follows. The decoder reads exactly that many bytes regardless of how the
//! transport chunks them.
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::WireError;
use crate::message::Message;

/// Frame a serialized JSON body with a Content-Length header.
pub fn frame_body(body: &str) -> Vec<u8> {
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut bytes = header.into_bytes();
    bytes.extend_from_slice(body.as_bytes());
    bytes
}

/// Encode a message into its framed wire form.
pub fn encode(message: &Message) -> Vec<u8> {
    frame_body(&message.to_json().to_string())
}

/// Parse the Content-Length value from a raw header block.
pub fn parse_content_length(header: &str) -> Result<usize, WireError> {
    for line in header.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("Content-Length:") {
            let value = value.trim();
            return value
                .parse::<usize>()
                .map_err(|_| WireError::MalformedFrame(format!("invalid Content-Length: {}", value)));
        }
    }
    Err(WireError::MalformedFrame(
        "missing Content-Length header".to_string(),
    ))
}

/// Streaming decoder over a buffered async reader.
///
/// `read_frame` yields one message per call and `Ok(None)` at end of stream.
/// A `MalformedFrame` or `InvalidPayload` error leaves the decoder usable;
/// subsequent calls skip ahead to the next parsable header, so a transient
/// framing glitch does not kill the whole stream.
pub struct FrameDecoder<R> {
    reader: R,
}

impl<R: AsyncBufRead + Unpin> FrameDecoder<R> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Consume the decoder, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next framed message from the stream.
    pub async fn read_frame(&mut self) -> Result<Option<Message>, WireError> {
        // Header block: lines until blank. Unknown header lines are skipped,
        // which is also what lets us resynchronize after a bad frame.
        let mut declared_length: Option<Result<usize, String>> = None;
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                // EOF. A dangling partial header is treated as end of stream.
                return Ok(None);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                if declared_length.is_some() {
                    break;
                }
                // Blank line with no length seen yet; keep scanning.
                continue;
            }
            if let Some(value) = trimmed.strip_prefix("Content-Length:") {
                let value = value.trim();
                declared_length = Some(value.parse::<usize>().map_err(|_| value.to_string()));
            }
        }

        let length = match declared_length {
            Some(Ok(length)) => length,
            Some(Err(raw)) => {
                return Err(WireError::MalformedFrame(format!(
                    "invalid Content-Length: {}",
                    raw
                )));
            }
            None => unreachable!("loop only exits once a length was seen"),
        };

        // Read exactly the declared number of body bytes.
        let mut body_buf = vec![0u8; length];
        self.reader.read_exact(&mut body_buf).await?;

        let body = String::from_utf8(body_buf)
            .map_err(|_| WireError::InvalidPayload("body is not valid UTF-8".into()))?;
        Message::parse(&body).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RequestId;
    use tokio::io::BufReader;

    fn decoder_over(bytes: Vec<u8>) -> FrameDecoder<BufReader<std::io::Cursor<Vec<u8>>>> {
        FrameDecoder::new(BufReader::new(std::io::Cursor::new(bytes)))
    }

    #[test]
    fn frame_body_format() {
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"test"}"#;
        let framed = String::from_utf8(frame_body(body)).unwrap();
        assert!(framed.starts_with("Content-Length: 40\r\n\r\n"));
        assert!(framed.ends_with(body));
    }

    #[test]
    fn parse_content_length_valid() {
        assert_eq!(parse_content_length("Content-Length: 42").unwrap(), 42);
    }

    #[test]
    fn parse_content_length_with_extra_headers() {
        let header = "Content-Type: application/json\r\nContent-Length: 100";
        assert_eq!(parse_content_length(header).unwrap(), 100);
    }

    #[test]
    fn parse_content_length_missing() {
        assert!(matches!(
            parse_content_length("Content-Type: application/json"),
            Err(WireError::MalformedFrame(_))
        ));
    }

    #[test]
    fn parse_content_length_invalid_number() {
        assert!(matches!(
            parse_content_length("Content-Length: abc"),
            Err(WireError::MalformedFrame(_))
        ));
    }

    #[tokio::test]
    async fn decode_single_message() {
        let msg = Message::request(1, "initialize", serde_json::json!({}));
        let mut decoder = decoder_over(encode(&msg));
        let decoded = decoder.read_frame().await.unwrap().unwrap();
        assert_eq!(decoded, msg);
        assert!(decoder.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn decode_back_to_back_messages() {
        let first = Message::request(1, "a", serde_json::json!({}));
        let second = Message::notification("b", serde_json::json!({"k": true}));
        let mut bytes = encode(&first);
        bytes.extend_from_slice(&encode(&second));

        let mut decoder = decoder_over(bytes);
        assert_eq!(decoder.read_frame().await.unwrap().unwrap(), first);
        assert_eq!(decoder.read_frame().await.unwrap().unwrap(), second);
        assert!(decoder.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn decode_ignores_extra_headers() {
        let body = r#"{"jsonrpc":"2.0","method":"initialized","params":{}}"#;
        let framed = format!(
            "Content-Type: application/vscode-jsonrpc\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let mut decoder = decoder_over(framed.into_bytes());
        let msg = decoder.read_frame().await.unwrap().unwrap();
        assert_eq!(msg.method(), Some("initialized"));
    }

    #[tokio::test]
    async fn decode_malformed_length_is_recoverable() {
        let good = Message::request(2, "hover", serde_json::json!({}));
        let mut bytes = b"Content-Length: zzz\r\n\r\n".to_vec();
        bytes.extend_from_slice(&encode(&good));

        let mut decoder = decoder_over(bytes);
        let err = decoder.read_frame().await.unwrap_err();
        assert!(matches!(err, WireError::MalformedFrame(_)));
        // The decoder resynchronizes at the next valid header.
        assert_eq!(decoder.read_frame().await.unwrap().unwrap(), good);
    }

    #[tokio::test]
    async fn decode_invalid_body_is_recoverable() {
        let bad_body = "this is not json";
        let good = Message::notification("exit", serde_json::Value::Null);
        let mut bytes = frame_body(bad_body);
        bytes.extend_from_slice(&encode(&good));

        let mut decoder = decoder_over(bytes);
        let err = decoder.read_frame().await.unwrap_err();
        assert!(matches!(err, WireError::InvalidPayload(_)));
        assert_eq!(decoder.read_frame().await.unwrap().unwrap(), good);
    }

    #[tokio::test]
    async fn decode_eof_mid_header_is_end_of_stream() {
        let mut decoder = decoder_over(b"Content-Length: 10".to_vec());
        assert!(decoder.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn decode_eof_mid_body_is_io_error() {
        let mut decoder = decoder_over(b"Content-Length: 100\r\n\r\nshort".to_vec());
        let err = decoder.read_frame().await.unwrap_err();
        assert!(matches!(err, WireError::Io(_)));
    }

    #[tokio::test]
    async fn decode_body_length_independent_of_chunking() {
        // A body containing newlines must be read by byte count, not lines.
        let body = "{\"jsonrpc\":\"2.0\",\n\"id\":9,\n\"method\":\"x\"}";
        let mut decoder = decoder_over(frame_body(body));
        let msg = decoder.read_frame().await.unwrap().unwrap();
        match msg {
            Message::Request { id, .. } => assert_eq!(id, RequestId::Number(9)),
            _ => panic!("expected request"),
        }
    }

    #[tokio::test]
    async fn round_trip_preserves_equality() {
        let messages = vec![
            Message::request("alpha", "m1", serde_json::json!({"nested": {"deep": [1, 2, 3]}})),
            Message::response(7, serde_json::json!(null)),
            Message::error_response(7, -32603, "internal error"),
            Message::notification("m2", serde_json::json!("plain string")),
        ];
        let mut bytes = Vec::new();
        for msg in &messages {
            bytes.extend_from_slice(&encode(msg));
        }
        let mut decoder = decoder_over(bytes);
        for msg in &messages {
            assert_eq!(&decoder.read_frame().await.unwrap().unwrap(), msg);
        }
    }
}
