//! Tokio codecs for the two DS connection roles.
//!
//! - [`StatusCodec`] frames inbound status traffic into
//!   [`RawStatusReport`]s (three newline-delimited lines per report).
//! - [`CommandCodec`] encodes outbound command lines and decodes the
//!   acknowledgement lines the module writes back.
//!
//! Both codecs cap their buffers so a misbehaving peer cannot grow host
//! memory by never sending a newline.
//!
//! # Usage
//!
//! ```no_run
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//! use dsbridge_protocol::CommandCodec;
//! use futures::{SinkExt, StreamExt};
//!
//! # async fn example() -> dsbridge_core::Result<()> {
//! let stream = TcpStream::connect("192.168.1.10:17123").await?;
//! let mut framed = Framed::new(stream, CommandCodec::new());
//!
//! framed.send("SR 3 ON".to_string()).await?;
//! if let Some(Ok(line)) = framed.next().await {
//!     assert_eq!(line, "Ok");
//! }
//! # Ok(())
//! # }
//! ```

use bytes::{BufMut, BytesMut};
use dsbridge_core::constants::STATUS_REPORT_LINES;
use dsbridge_core::{Error, Result};
use tokio_util::codec::{Decoder, Encoder};

use crate::status::RawStatusReport;

/// Maximum bytes buffered while waiting for a complete line or report.
///
/// Real DS traffic is tens of bytes per line; the cap only exists to
/// bound memory against a peer that never sends a newline.
const MAX_BUFFER_SIZE: usize = 16 * 1024;

/// Extract the next newline-terminated line from `src`, lossily decoded.
///
/// Returns `None` when no complete line is buffered yet.
fn take_line(src: &mut BytesMut) -> Option<String> {
    let pos = src.iter().position(|&b| b == b'\n')?;
    let line = src.split_to(pos + 1);
    Some(String::from_utf8_lossy(&line[..pos]).into_owned())
}

fn check_buffer(src: &BytesMut) -> Result<()> {
    if src.len() > MAX_BUFFER_SIZE {
        return Err(Error::MalformedStatus {
            reason: format!("line buffer exceeded {MAX_BUFFER_SIZE} bytes without a newline"),
        });
    }
    Ok(())
}

/// Decoder for the inbound status connection.
///
/// Accumulates newline-delimited lines and emits one [`RawStatusReport`]
/// per three lines (header, relay bit-string, switch bit-string).
/// Interpretation against the module's channel counts happens later, in
/// the gateway, which knows the module's configuration.
#[derive(Debug, Default)]
pub struct StatusCodec {
    /// Completed lines of the report currently being assembled.
    lines: Vec<String>,
}

impl StatusCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for StatusCodec {
    type Item = RawStatusReport;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        while self.lines.len() < STATUS_REPORT_LINES {
            match take_line(src) {
                Some(line) => self.lines.push(line),
                None => {
                    check_buffer(src)?;
                    return Ok(None);
                }
            }
        }
        let switches = self.lines.pop().unwrap_or_default();
        let relays = self.lines.pop().unwrap_or_default();
        let header = self.lines.pop().unwrap_or_default();
        Ok(Some(RawStatusReport::from_lines(
            &header, &relays, &switches,
        )))
    }
}

/// Codec for the outbound command connection.
///
/// Encoding appends the protocol's `\n` terminator to each command line.
/// Decoding yields trimmed, non-empty lines; the gateway matches them
/// against the acknowledgement token.
#[derive(Debug, Default)]
pub struct CommandCodec;

impl CommandCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for CommandCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match take_line(src) {
                Some(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        return Ok(Some(line.to_string()));
                    }
                }
                None => {
                    check_buffer(src)?;
                    return Ok(None);
                }
            }
        }
    }
}

impl Encoder<String> for CommandCodec {
    type Error = Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(codec: &mut StatusCodec, buf: &mut BytesMut, bytes: &[u8]) -> Option<RawStatusReport> {
        buf.extend_from_slice(bytes);
        codec.decode(buf).unwrap()
    }

    #[test]
    fn status_codec_frames_three_lines() {
        let mut codec = StatusCodec::new();
        let mut buf = BytesMut::new();

        assert!(feed(&mut codec, &mut buf, b"HDR\n0101\n").is_none());
        let report = feed(&mut codec, &mut buf, b"00 01\n").unwrap();
        assert_eq!(report.header, "HDR");
        assert_eq!(report.relays, "0101");
        assert_eq!(report.switches, "0001");
    }

    #[test]
    fn status_codec_handles_partial_lines_across_reads() {
        let mut codec = StatusCodec::new();
        let mut buf = BytesMut::new();

        assert!(feed(&mut codec, &mut buf, b"HD").is_none());
        assert!(feed(&mut codec, &mut buf, b"R\n01").is_none());
        assert!(feed(&mut codec, &mut buf, b"01\n00").is_none());
        let report = feed(&mut codec, &mut buf, b"\n").unwrap();
        assert_eq!(report.relays, "0101");
        assert_eq!(report.switches, "00");
    }

    #[test]
    fn status_codec_emits_consecutive_reports() {
        let mut codec = StatusCodec::new();
        let mut buf = BytesMut::from(&b"A\n1\n0\nB\n0\n1\n"[..]);

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!((first.header.as_str(), first.relays.as_str()), ("A", "1"));
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!((second.header.as_str(), second.relays.as_str()), ("B", "0"));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn status_codec_rejects_unbounded_line() {
        let mut codec = StatusCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&vec![b'x'; MAX_BUFFER_SIZE + 1]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn command_codec_appends_newline() {
        let mut codec = CommandCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("SR 3 ON".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"SR 3 ON\n");
    }

    #[test]
    fn command_codec_yields_trimmed_lines() {
        let mut codec = CommandCodec::new();
        let mut buf = BytesMut::from(&b"Ok\r\n\r\nError\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "Ok");
        // The blank line is skipped entirely.
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "Error");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn command_codec_waits_for_complete_line() {
        let mut codec = CommandCodec::new();
        let mut buf = BytesMut::from(&b"O"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"k\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "Ok");
    }
}
