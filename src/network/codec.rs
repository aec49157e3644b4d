//! Newline-delimited JSON framing for Stratum.
//!
//! Line splitting is delegated to `LinesCodec`; this layer turns each line
//! into a [`Message`]. A line that fails to parse, or one longer than
//! [`MAX_LINE_LEN`], is dropped with a warning and never ends the stream.

use crate::network::messages::{Message, Request};
use crate::utils::error::MinerError;
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

/// Longest line accepted; anything longer is discarded up to its terminator
pub const MAX_LINE_LEN: usize = 64 * 1024;

#[derive(Debug)]
pub struct StratumCodec {
    lines: LinesCodec,
}

impl StratumCodec {
    pub fn new() -> Self {
        StratumCodec {
            lines: LinesCodec::new_with_max_length(MAX_LINE_LEN),
        }
    }

    /// Pulls lines until one parses, the buffer runs dry, or I/O fails.
    fn next_message(
        &mut self,
        src: &mut BytesMut,
        eof: bool,
    ) -> Result<Option<Message>, MinerError> {
        loop {
            let line = if eof {
                self.lines.decode_eof(src)
            } else {
                self.lines.decode(src)
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(None),
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    log::warn!("Discarding line longer than {} bytes", MAX_LINE_LEN);
                    continue;
                }
                Err(LinesCodecError::Io(e)) => return Err(e.into()),
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str(line)
                .map_err(MinerError::from)
                .and_then(Message::from_value)
            {
                Ok(message) => {
                    log::trace!("<- {}", line);
                    return Ok(Some(message));
                }
                Err(e) => log::warn!("Dropping malformed line {:?}: {}", line, e),
            }
        }
    }
}

impl Default for StratumCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StratumCodec {
    type Item = Message;
    type Error = MinerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, MinerError> {
        self.next_message(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>, MinerError> {
        self.next_message(src, true)
    }
}

impl Encoder<Request> for StratumCodec {
    type Error = MinerError;

    /// Serializes a request as one `\n`-terminated line.
    fn encode(&mut self, request: Request, dst: &mut BytesMut) -> Result<(), MinerError> {
        let line = serde_json::to_string(&request)?;
        log::trace!("-> {}", line);
        self.lines.encode(line, dst).map_err(|e| match e {
            LinesCodecError::Io(e) => MinerError::IoError(e),
            LinesCodecError::MaxLineLengthExceeded => {
                MinerError::ProtocolError("request line too long".into())
            }
        })
    }
}
