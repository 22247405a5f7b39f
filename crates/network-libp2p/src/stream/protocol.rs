//! Stream protocol tags and frame header literals.
//!
//! Every exchange opens a fresh stream tagged with one of the protocols below and writes a
//! single frame:
//! ```text
//! +----------------------+--------------+-------------------+
//! | header literal + \n  | body_len     | body              |
//! | <= max_header_len    | 8 bytes (LE) | body_len bytes    |
//! +----------------------+--------------+-------------------+
//! ```

use libp2p::StreamProtocol;
use std::fmt;

/// Initiator asks the rendezvous directory for the next processor.
pub const REQUEST_PEER_PROTOCOL: StreamProtocol =
    StreamProtocol::new("/stylenet/request-peer/2.0.0");

/// Initiator ships the extracted style artifact to a processor.
pub const RECEIVE_STYLE_PROTOCOL: StreamProtocol =
    StreamProtocol::new("/stylenet/receive-style/2.0.0");

/// Initiator ships one content image to a processor.
pub const RECEIVE_IMAGE_PROTOCOL: StreamProtocol =
    StreamProtocol::new("/stylenet/receive-image/2.0.0");

/// Processor returns the outcome of a content job to the original sender.
pub const RECEIVE_RESULT_PROTOCOL: StreamProtocol =
    StreamProtocol::new("/stylenet/receive-image-result/2.0.0");

/// Size of the little-endian body length that follows the header line.
pub const BODY_LEN_SIZE: usize = 8;

/// Default bound on the header line, excluding the line feed.
pub const DEFAULT_MAX_HEADER_LEN: usize = 64;

/// Default bound on a frame body (256 MiB).
pub const DEFAULT_MAX_BODY_SIZE: u64 = 256 * 1024 * 1024;

/// Bound on an `ERROR` body. The body is one human-readable line.
pub const MAX_ERROR_LEN: u64 = 4 * 1024;

/// The header literal that identifies the body of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameTag {
    /// Raw style artifact bytes.
    Style,
    /// Raw image bytes (content or styled result).
    Image,
    /// One human-readable error line.
    Error,
    /// Assignment request (empty body).
    Request,
    /// Assignment reply with a json encoded assignment.
    Peer,
    /// Assignment reply: no eligible processor.
    NoPeer,
    /// Assignment reply: the requester may not ask for work.
    NoTokens,
}

impl FrameTag {
    /// Every known tag.
    pub const ALL: [FrameTag; 7] = [
        Self::Style,
        Self::Image,
        Self::Error,
        Self::Request,
        Self::Peer,
        Self::NoPeer,
        Self::NoTokens,
    ];

    /// The literal written on the wire.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Style => "STYLE",
            Self::Image => "IMAGE",
            Self::Error => "ERROR",
            Self::Request => "REQUEST",
            Self::Peer => "PEER",
            Self::NoPeer => "NO_PEER",
            Self::NoTokens => "NO_TOKENS",
        }
    }

    /// Parse a header literal. Matching is exact.
    pub fn from_literal(literal: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_str() == literal)
    }
}

impl fmt::Display for FrameTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// What the body holds.
    pub tag: FrameTag,
    /// The announced body length in bytes.
    pub body_len: u64,
}

impl FrameHeader {
    /// Create a new frame header.
    pub fn new(tag: FrameTag, body_len: u64) -> Self {
        Self { tag, body_len }
    }

    /// Encode the header line and length prefix.
    pub fn encode(&self) -> Vec<u8> {
        let literal = self.tag.as_str().as_bytes();
        let mut buf = Vec::with_capacity(literal.len() + 1 + BODY_LEN_SIZE);
        buf.extend_from_slice(literal);
        buf.push(b'\n');
        buf.extend_from_slice(&self.body_len.to_le_bytes());
        buf
    }
}
