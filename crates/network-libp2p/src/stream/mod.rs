//! Framed one-shot transfers over libp2p streams.
//!
//! Protocol tags and header literals live in [protocol], the wire format in [codec], and the
//! request/reply and file exchanges in [transfer].

pub mod codec;
pub mod protocol;
pub mod transfer;

pub use codec::{expect_tag, CodecError, FrameCodec};
pub use protocol::*;
pub use transfer::*;

#[cfg(test)]
#[path = "../tests/transfer_tests.rs"]
mod transfer_tests;
