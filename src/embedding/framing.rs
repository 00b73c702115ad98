//! Newline-delimited message framing for the embedding process.
//!
//! Output from the process arrives in arbitrary fragments. A
//! [`FramedRead`] over [`LinesCodec`] buffers raw bytes and hands back one
//! complete frame per `\n`, so two replies that land in the same read are
//! never merged and a reply split across reads is never parsed early.
//! Bytes already read stay in the frame buffer if a read is cancelled.

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use crate::error::EmbeddingError;

/// Largest frame accepted before the stream is declared corrupt.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

pub type FrameReader<R> = FramedRead<R, LinesCodec>;

pub fn frame_reader<R: AsyncRead>(reader: R) -> FrameReader<R> {
    FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_FRAME_BYTES))
}

/// Next non-blank frame with the line terminator stripped, or `None` at end of stream.
pub async fn next_frame<R: AsyncRead + Unpin>(
    frames: &mut FrameReader<R>,
) -> Result<Option<String>, EmbeddingError> {
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => return Ok(Some(line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                return Err(EmbeddingError::Framing(format!(
                    "frame exceeds {MAX_FRAME_BYTES} bytes"
                )))
            }
            Err(LinesCodecError::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(EmbeddingError::Framing(format!("frame is not UTF-8: {e}")))
            }
            Err(LinesCodecError::Io(e)) => return Err(EmbeddingError::Io(e)),
        }
    }
    Ok(None)
}
