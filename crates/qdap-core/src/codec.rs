//! DAP base-protocol framing.
//!
//! Wire format: `Content-Length: <N>\r\n\r\n<N bytes of UTF-8 JSON>`

use crate::error::{DapError, DapResult};

/// Largest accepted frame payload (16 MiB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Largest accepted header block before the `\r\n\r\n` separator.
const MAX_HEADER_LEN: usize = 8 * 1024;

const SEPARATOR: &[u8] = b"\r\n\r\n";

/// Encode a serializable value into a `Content-Length` framed message.
pub fn frame_encode<T: serde::Serialize>(value: &T) -> DapResult<Vec<u8>> {
    let payload = serde_json::to_vec(value)?;
    let header = format!("Content-Length: {}\r\n\r\n", payload.len());

    let mut frame = Vec::with_capacity(header.len() + payload.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend(payload);
    Ok(frame)
}

/// Streaming frame decoder: accumulates bytes and yields complete payloads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed bytes into the decoder and return all complete JSON-decoded messages.
    pub fn feed<T: serde::de::DeserializeOwned>(&mut self, data: &[u8]) -> DapResult<Vec<T>> {
        self.feed_raw(data)?
            .iter()
            .map(|payload| serde_json::from_slice(payload).map_err(DapError::from))
            .collect()
    }

    /// Feed raw bytes and return complete raw payloads (undecoded JSON).
    ///
    /// A malformed header is unrecoverable: the stream position is lost, so the
    /// error should end the connection.
    pub fn feed_raw(&mut self, data: &[u8]) -> DapResult<Vec<Vec<u8>>> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();

        loop {
            let Some(header_end) = find_separator(&self.buffer) else {
                if self.buffer.len() > MAX_HEADER_LEN {
                    return Err(DapError::Codec(format!(
                        "header exceeds {MAX_HEADER_LEN} bytes without terminator"
                    )));
                }
                break;
            };

            let len = parse_content_length(&self.buffer[..header_end])?;
            let body_start = header_end + SEPARATOR.len();
            if self.buffer.len() < body_start + len {
                break;
            }

            frames.push(self.buffer[body_start..body_start + len].to_vec());
            self.buffer.drain(..body_start + len);
        }

        Ok(frames)
    }

    /// Reset internal buffer.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of bytes remaining in the internal buffer.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn find_separator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(SEPARATOR.len())
        .position(|window| window == SEPARATOR)
}

fn parse_content_length(header: &[u8]) -> DapResult<usize> {
    let text = std::str::from_utf8(header)
        .map_err(|_| DapError::Codec("header is not valid UTF-8".into()))?;

    let mut content_length = None;
    for line in text.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            return Err(DapError::Codec(format!("malformed header line: {line:?}")));
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            let len: usize = value
                .trim()
                .parse()
                .map_err(|_| DapError::Codec(format!("invalid Content-Length: {}", value.trim())))?;
            content_length = Some(len);
        }
    }

    let len = content_length.ok_or_else(|| DapError::Codec("missing Content-Length header".into()))?;
    if len > MAX_FRAME_LEN {
        return Err(DapError::Codec(format!("frame too large: {len} bytes")));
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestMsg {
        command: String,
        seq: i64,
    }

    fn msg(command: &str, seq: i64) -> TestMsg {
        TestMsg {
            command: command.into(),
            seq,
        }
    }

    #[test]
    fn encodes_content_length_header() {
        let frame = frame_encode(&msg("threads", 3)).unwrap();
        let text = String::from_utf8(frame).unwrap();
        let (header, body) = text.split_once("\r\n\r\n").unwrap();
        assert_eq!(header, format!("Content-Length: {}", body.len()));
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let msgs = vec![msg("initialize", 1), msg("launch", 2), msg("disconnect", 3)];
        let mut combined = Vec::new();
        for m in &msgs {
            combined.extend(frame_encode(m).unwrap());
        }

        let mut decoder = FrameDecoder::new();
        let decoded: Vec<TestMsg> = decoder.feed(&combined).unwrap();
        assert_eq!(decoded, msgs);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn incremental_feed() {
        let frame = frame_encode(&msg("next", 99)).unwrap();
        let mut decoder = FrameDecoder::new();

        // Feed one byte at a time
        for i in 0..frame.len() - 1 {
            let decoded: Vec<TestMsg> = decoder.feed(&frame[i..i + 1]).unwrap();
            assert!(decoded.is_empty());
        }
        let decoded: Vec<TestMsg> = decoder.feed(&frame[frame.len() - 1..]).unwrap();
        assert_eq!(decoded, vec![msg("next", 99)]);
    }

    #[test]
    fn ignores_extra_headers() {
        let body = br#"{"command":"pause","seq":5}"#;
        let mut data = format!(
            "Content-Type: application/vscode-jsonrpc; charset=utf-8\r\ncontent-length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        data.extend_from_slice(body);

        let mut decoder = FrameDecoder::new();
        let decoded: Vec<TestMsg> = decoder.feed(&data).unwrap();
        assert_eq!(decoded, vec![msg("pause", 5)]);
    }

    #[test]
    fn rejects_missing_content_length() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.feed_raw(b"Content-Type: json\r\n\r\n{}").unwrap_err();
        assert!(matches!(err, DapError::Codec(_)));
    }

    #[test]
    fn rejects_oversized_frames() {
        let mut decoder = FrameDecoder::new();
        let header = format!("Content-Length: {}\r\n\r\n", MAX_FRAME_LEN + 1);
        assert!(decoder.feed_raw(header.as_bytes()).is_err());
    }

    #[test]
    fn rejects_unterminated_header_flood() {
        let mut decoder = FrameDecoder::new();
        let junk = vec![b'a'; MAX_HEADER_LEN + 1];
        assert!(decoder.feed_raw(&junk).is_err());
    }

    #[test]
    fn pending_bytes() {
        let frame = frame_encode(&msg("x", 0)).unwrap();
        let mut decoder = FrameDecoder::new();

        decoder.feed_raw(&frame[..3]).unwrap();
        assert_eq!(decoder.pending(), 3);

        decoder.reset();
        assert_eq!(decoder.pending(), 0);
    }
}
