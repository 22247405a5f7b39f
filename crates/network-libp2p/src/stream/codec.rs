//! Stream codec for encoding/decoding framed transfers.
//!
//! Bodies are copied verbatim between the stream and storage. The length prefix lets the reader
//! tell a complete body from a stream that closed early.

use super::protocol::{
    FrameHeader, FrameTag, BODY_LEN_SIZE, DEFAULT_MAX_BODY_SIZE, DEFAULT_MAX_HEADER_LEN,
};
use futures::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};

/// Codec for reading and writing frames on streams.
///
/// Both bounds are checked before any body bytes are read or buffered.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    /// Maximum header line length, excluding the line feed.
    max_header_len: usize,
    /// Maximum announced body length.
    max_body_size: u64,
}

impl FrameCodec {
    /// Create a new codec with the given bounds.
    pub fn new(max_header_len: usize, max_body_size: u64) -> Self {
        Self { max_header_len, max_body_size }
    }

    /// Create a codec with default settings.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_HEADER_LEN, DEFAULT_MAX_BODY_SIZE)
    }

    /// Read a frame header from the stream.
    ///
    /// The header line is read one byte at a time so nothing past the length prefix is consumed.
    pub async fn read_header<R>(&self, reader: &mut R) -> Result<FrameHeader, CodecError>
    where
        R: AsyncRead + Unpin,
    {
        let mut line = Vec::with_capacity(self.max_header_len);
        let mut byte = [0u8; 1];
        loop {
            reader.read_exact(&mut byte).await?;
            if byte[0] == b'\n' {
                break;
            }
            if line.len() == self.max_header_len {
                return Err(CodecError::HeaderTooLong { max: self.max_header_len });
            }
            line.push(byte[0]);
        }

        let literal = String::from_utf8_lossy(&line);
        let tag = FrameTag::from_literal(&literal)
            .ok_or_else(|| CodecError::UnknownHeader(literal.into_owned()))?;

        let mut len_buf = [0u8; BODY_LEN_SIZE];
        reader.read_exact(&mut len_buf).await?;
        let body_len = u64::from_le_bytes(len_buf);

        // validate body size before the caller allocates or copies anything
        if body_len > self.max_body_size {
            return Err(CodecError::BodyTooLarge { size: body_len, max: self.max_body_size });
        }

        Ok(FrameHeader::new(tag, body_len))
    }

    /// Read the body announced by `header` into memory.
    ///
    /// Only used for small bodies (assignment replies and error lines).
    pub async fn read_body<R>(
        &self,
        reader: &mut R,
        header: &FrameHeader,
    ) -> Result<Vec<u8>, CodecError>
    where
        R: AsyncRead + Unpin,
    {
        let mut body = Vec::new();
        let received = (&mut *reader).take(header.body_len).read_to_end(&mut body).await? as u64;
        if received < header.body_len {
            return Err(CodecError::Truncated { expected: header.body_len, received });
        }
        Ok(body)
    }

    /// Read a complete frame (header + body) into memory.
    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<(FrameHeader, Vec<u8>), CodecError>
    where
        R: AsyncRead + Unpin,
    {
        let header = self.read_header(reader).await?;
        let body = self.read_body(reader, &header).await?;
        Ok((header, body))
    }

    /// Copy the body announced by `header` from `reader` into `writer`.
    ///
    /// Returns the number of bytes copied. A stream that ends early is [CodecError::Truncated].
    pub async fn copy_body<R, W>(
        &self,
        reader: &mut R,
        header: &FrameHeader,
        writer: &mut W,
    ) -> Result<u64, CodecError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let received = futures::io::copy((&mut *reader).take(header.body_len), writer).await?;
        writer.flush().await?;
        if received < header.body_len {
            return Err(CodecError::Truncated { expected: header.body_len, received });
        }
        Ok(received)
    }

    /// Write a frame with an in-memory body.
    pub async fn write_frame<W>(
        &self,
        writer: &mut W,
        tag: FrameTag,
        body: &[u8],
    ) -> Result<(), CodecError>
    where
        W: AsyncWrite + Unpin,
    {
        let header = self.checked_header(tag, body.len() as u64)?;
        writer.write_all(&header.encode()).await?;
        writer.write_all(body).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Write a frame whose body of `body_len` bytes is streamed from `body`.
    ///
    /// A source that yields fewer bytes than announced is [CodecError::Truncated]. The peer will
    /// see the same truncation once the stream is closed.
    pub async fn write_frame_from<W, R>(
        &self,
        writer: &mut W,
        tag: FrameTag,
        body_len: u64,
        body: &mut R,
    ) -> Result<u64, CodecError>
    where
        W: AsyncWrite + Unpin,
        R: AsyncRead + Unpin,
    {
        let header = self.checked_header(tag, body_len)?;
        writer.write_all(&header.encode()).await?;
        let sent = futures::io::copy((&mut *body).take(body_len), writer).await?;
        writer.flush().await?;
        if sent < body_len {
            return Err(CodecError::Truncated { expected: body_len, received: sent });
        }
        Ok(sent)
    }

    /// Reject bodies this codec would refuse to read.
    fn checked_header(&self, tag: FrameTag, body_len: u64) -> Result<FrameHeader, CodecError> {
        if body_len > self.max_body_size {
            return Err(CodecError::BodyTooLarge { size: body_len, max: self.max_body_size });
        }
        Ok(FrameHeader::new(tag, body_len))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Ensure a received header carries the expected tag.
pub fn expect_tag(header: &FrameHeader, expected: FrameTag) -> Result<(), CodecError> {
    if header.tag != expected {
        return Err(CodecError::UnexpectedHeader { expected, found: header.tag });
    }
    Ok(())
}

/// Error type for codec operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// IO error during read/write.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The header line is not a known literal.
    #[error("unknown frame header: {0:?}")]
    UnknownHeader(String),

    /// The header line exceeds the bound.
    #[error("frame header longer than {max} bytes")]
    HeaderTooLong {
        /// Maximum allowed header length.
        max: usize,
    },

    /// Body too large.
    #[error("body too large: {size} > {max}")]
    BodyTooLarge {
        /// Announced body size.
        size: u64,
        /// Maximum allowed size.
        max: u64,
    },

    /// The stream ended before the announced body length.
    #[error("truncated body: expected {expected} bytes, received {received}")]
    Truncated {
        /// Announced body size.
        expected: u64,
        /// Bytes actually received.
        received: u64,
    },

    /// A valid header that this exchange does not accept.
    #[error("unexpected frame header: expected {expected}, found {found}")]
    UnexpectedHeader {
        /// The header the exchange requires.
        expected: FrameTag,
        /// The header that arrived.
        found: FrameTag,
    },

    /// The body could not be decoded.
    #[error("invalid body: {0}")]
    InvalidBody(String),
}
