//! One-shot exchanges built on the [FrameCodec].
//!
//! Each function drives one side of one exchange on an already-open stream. Opening streams and
//! deciding what to do with the outcome belongs to the caller.

use super::{
    codec::{expect_tag, CodecError, FrameCodec},
    protocol::{FrameTag, MAX_ERROR_LEN},
};
use futures::{AsyncRead, AsyncWrite, AsyncWriteExt as _};
use sn_types::{Assignment, AssignmentOutcome};
use std::path::{Path, PathBuf};
use tokio_util::compat::{TokioAsyncReadCompatExt as _, TokioAsyncWriteCompatExt as _};
use tracing::{debug, warn};

/// What a processor sent back for a content job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultPayload {
    /// The styled image, saved at this path.
    Image(PathBuf),
    /// The processor's error line.
    Error(String),
}

/// Ask the directory for the next processor.
///
/// Writes `REQUEST` and waits for `PEER`, `NO_PEER` or `NO_TOKENS` on the same stream.
pub async fn request_assignment<S>(
    codec: &FrameCodec,
    stream: &mut S,
) -> Result<AssignmentOutcome, CodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    codec.write_frame(stream, FrameTag::Request, &[]).await?;
    let (header, body) = codec.read_frame(stream).await?;
    let outcome = match header.tag {
        FrameTag::Peer => {
            let assignment: Assignment = serde_json::from_slice(&body)
                .map_err(|e| CodecError::InvalidBody(e.to_string()))?;
            AssignmentOutcome::Assigned(assignment)
        }
        FrameTag::NoPeer => AssignmentOutcome::NoPeerAvailable,
        FrameTag::NoTokens => AssignmentOutcome::NoTokens,
        found => return Err(CodecError::UnexpectedHeader { expected: FrameTag::Peer, found }),
    };

    // best-effort: the exchange is already complete
    let _ = stream.close().await;
    Ok(outcome)
}

/// Read an assignment request on the directory side.
pub async fn read_assignment_request<S>(codec: &FrameCodec, stream: &mut S) -> Result<(), CodecError>
where
    S: AsyncRead + Unpin,
{
    let header = codec.read_header(stream).await?;
    expect_tag(&header, FrameTag::Request)?;
    // the request body is empty, but drain whatever was announced
    codec.read_body(stream, &header).await?;
    Ok(())
}

/// Write the directory's answer and close the stream.
pub async fn write_assignment_reply<S>(
    codec: &FrameCodec,
    stream: &mut S,
    outcome: &AssignmentOutcome,
) -> Result<(), CodecError>
where
    S: AsyncWrite + Unpin,
{
    match outcome {
        AssignmentOutcome::Assigned(assignment) => {
            let body = serde_json::to_vec(assignment)
                .map_err(|e| CodecError::InvalidBody(e.to_string()))?;
            codec.write_frame(stream, FrameTag::Peer, &body).await?;
        }
        AssignmentOutcome::NoPeerAvailable => {
            codec.write_frame(stream, FrameTag::NoPeer, &[]).await?
        }
        AssignmentOutcome::NoTokens => codec.write_frame(stream, FrameTag::NoTokens, &[]).await?,
    }
    stream.close().await?;
    Ok(())
}

/// Send the file at `path` as one frame and close the stream.
///
/// Fails before writing anything if the file can't be opened.
pub async fn send_file<S>(
    codec: &FrameCodec,
    stream: &mut S,
    tag: FrameTag,
    path: &Path,
) -> Result<u64, CodecError>
where
    S: AsyncWrite + Unpin,
{
    let file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    let mut reader = file.compat();
    let sent = codec.write_frame_from(stream, tag, len, &mut reader).await?;
    stream.close().await?;
    debug!(target: "transfer", %tag, ?path, sent, "file sent");
    Ok(sent)
}

/// Send one error line and close the stream.
///
/// Only the first line of `message` is sent, cut to [MAX_ERROR_LEN] bytes.
pub async fn send_error<S>(codec: &FrameCodec, stream: &mut S, message: &str) -> Result<(), CodecError>
where
    S: AsyncWrite + Unpin,
{
    let mut line = message.lines().next().unwrap_or_default();
    let mut end = line.len().min(MAX_ERROR_LEN as usize);
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    line = &line[..end];
    codec.write_frame(stream, FrameTag::Error, line.as_bytes()).await?;
    stream.close().await?;
    Ok(())
}

/// Send the outcome of a content job.
///
/// An output file that can't be opened is reported to the peer as `ERROR` naming the file.
pub async fn send_result<S>(
    codec: &FrameCodec,
    stream: &mut S,
    output: &Path,
) -> Result<(), CodecError>
where
    S: AsyncWrite + Unpin,
{
    let file = match tokio::fs::File::open(output).await {
        Ok(file) => file,
        Err(e) => {
            warn!(target: "transfer", ?output, ?e, "result file unavailable");
            let message = format!("result file not found: {}", output.display());
            return send_error(codec, stream, &message).await;
        }
    };

    let len = file.metadata().await?.len();
    let mut reader = file.compat();
    codec.write_frame_from(stream, FrameTag::Image, len, &mut reader).await?;
    stream.close().await?;
    Ok(())
}

/// Receive a frame carrying `expected` and write its body to `dest`.
///
/// On any failure the partial file is removed.
pub async fn receive_file<S>(
    codec: &FrameCodec,
    stream: &mut S,
    expected: FrameTag,
    dest: &Path,
) -> Result<u64, CodecError>
where
    S: AsyncRead + Unpin,
{
    let header = codec.read_header(stream).await?;
    expect_tag(&header, expected)?;
    receive_body_to_file(codec, stream, &header, dest).await
}

/// Receive a result: either a styled image saved under `dir` or an error line.
///
/// An error body over [MAX_ERROR_LEN] is rejected before it is read.
///
/// Saved images are named `{prefix}_{timestamp}_{discriminator}.jpg`.
pub async fn receive_result<S>(
    codec: &FrameCodec,
    stream: &mut S,
    dir: &Path,
    prefix: &str,
) -> Result<ResultPayload, CodecError>
where
    S: AsyncRead + Unpin,
{
    let header = codec.read_header(stream).await?;
    match header.tag {
        FrameTag::Image => {
            let dest = dir.join(sn_types::unique_file_name(prefix, "jpg"));
            receive_body_to_file(codec, stream, &header, &dest).await?;
            Ok(ResultPayload::Image(dest))
        }
        FrameTag::Error => {
            if header.body_len > MAX_ERROR_LEN {
                return Err(CodecError::BodyTooLarge { size: header.body_len, max: MAX_ERROR_LEN });
            }
            let body = codec.read_body(stream, &header).await?;
            Ok(ResultPayload::Error(String::from_utf8_lossy(&body).trim_end().to_string()))
        }
        found => Err(CodecError::UnexpectedHeader { expected: FrameTag::Image, found }),
    }
}

/// Copy a body to a new file at `dest`, removing the file if the copy fails.
async fn receive_body_to_file<S>(
    codec: &FrameCodec,
    stream: &mut S,
    header: &super::protocol::FrameHeader,
    dest: &Path,
) -> Result<u64, CodecError>
where
    S: AsyncRead + Unpin,
{
    let file = tokio::fs::File::create(dest).await?;
    let mut writer = file.compat_write();
    match codec.copy_body(stream, header, &mut writer).await {
        Ok(received) => {
            // flush to disk before the file is handed to anyone else
            writer.into_inner().sync_all().await?;
            Ok(received)
        }
        Err(e) => {
            drop(writer);
            if let Err(remove) = tokio::fs::remove_file(dest).await {
                warn!(target: "transfer", ?dest, ?remove, "failed to remove partial file");
            }
            Err(e)
        }
    }
}
