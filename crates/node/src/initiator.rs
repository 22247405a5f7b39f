//! The initiator session.
//!
//! Extracts the style once, then hands each content image to the processor the directory
//! assigns. Results arrive asynchronously on their own streams and are never correlated with
//! the file that produced them.

use crate::{engine::StyleEngine, error::NodeResult};
use futures::StreamExt as _;
use sn_config::BootstrapDescriptor;
use sn_network_libp2p::{
    stream::{
        self, receive_result, FrameCodec, FrameTag, ResultPayload, RECEIVE_IMAGE_PROTOCOL,
        RECEIVE_RESULT_PROTOCOL, RECEIVE_STYLE_PROTOCOL, REQUEST_PEER_PROTOCOL,
    },
    TransferTransport,
};
use sn_types::{is_image_file, Assignment, AssignmentOutcome, PeerId};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

/// An outcome reported by a processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultEvent {
    /// A styled image was saved.
    Saved {
        /// The processor that sent it.
        from: PeerId,
        /// Where it was written.
        path: PathBuf,
    },
    /// The processor reported a failure.
    Failed {
        /// The processor that sent it.
        from: PeerId,
        /// The processor's error line.
        message: String,
    },
}

/// Counts for one distribution run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Image files found in the content directory.
    pub files_considered: usize,
    /// Content images delivered.
    pub content_sent: usize,
    /// Style deliveries (one per distinct processor).
    pub styles_sent: usize,
    /// Image files that were not delivered.
    pub skipped: usize,
    /// The directory refused further requests.
    pub stopped_no_tokens: bool,
}

/// The initiator role.
#[derive(Debug)]
pub struct Initiator<T, E> {
    /// The transport.
    transport: T,
    /// The style engine used for extraction.
    engine: Arc<E>,
    /// How to reach the directory.
    rendezvous: BootstrapDescriptor,
    /// Frame codec for every exchange.
    codec: FrameCodec,
    /// Where the extracted artifact is written.
    style_artifact: PathBuf,
    /// Where results are saved.
    results_dir: PathBuf,
}

impl<T, E> Initiator<T, E>
where
    T: TransferTransport,
    E: StyleEngine,
{
    /// Create a new instance of Self.
    pub fn new(
        transport: T,
        engine: Arc<E>,
        rendezvous: BootstrapDescriptor,
        codec: FrameCodec,
        style_artifact: PathBuf,
        results_dir: PathBuf,
    ) -> Self {
        Self { transport, engine, rendezvous, codec, style_artifact, results_dir }
    }

    /// Start accepting results.
    ///
    /// Must be called before [Self::run] so no result can arrive unhandled. Every result is
    /// published on the returned channel.
    pub fn spawn_result_listener(
        &self,
    ) -> NodeResult<(JoinHandle<()>, mpsc::UnboundedReceiver<ResultEvent>)> {
        let mut incoming = self.transport.accept(RECEIVE_RESULT_PROTOCOL)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let codec = self.codec;
        let results_dir = self.results_dir.clone();

        let task = tokio::spawn(async move {
            while let Some((from, mut stream)) = incoming.next().await {
                let tx = tx.clone();
                let results_dir = results_dir.clone();
                tokio::spawn(async move {
                    let prefix = format!("processed_{from}");
                    match receive_result(&codec, &mut stream, &results_dir, &prefix).await {
                        Ok(ResultPayload::Image(path)) => {
                            info!(target: "initiator", ?from, ?path, "result saved");
                            let _ = tx.send(ResultEvent::Saved { from, path });
                        }
                        Ok(ResultPayload::Error(message)) => {
                            warn!(target: "initiator", ?from, %message, "processor reported an error");
                            let _ = tx.send(ResultEvent::Failed { from, message });
                        }
                        Err(e) => {
                            error!(target: "initiator", ?from, ?e, "failed to receive result");
                        }
                    }
                });
            }
        });

        Ok((task, rx))
    }

    /// Extract the style and distribute every image in `content_dir`.
    ///
    /// Failing to extract the style or to list the directory is fatal. Anything that goes wrong
    /// for a single file skips that file. Returns once every file was handled, without waiting
    /// for results.
    pub async fn run(&self, style_image: &Path, content_dir: &Path) -> NodeResult<RunSummary> {
        info!(target: "initiator", ?style_image, "extracting style");
        self.engine.extract(style_image, &self.style_artifact).await?;
        info!(target: "initiator", artifact = ?self.style_artifact, "style extracted");

        let files = list_content(content_dir).await?;
        let mut summary = RunSummary { files_considered: files.len(), ..Default::default() };
        // processors that already have this run's style
        let mut styled: HashSet<PeerId> = HashSet::new();

        for (index, file) in files.iter().enumerate() {
            let assignment = match self.request_assignment().await {
                Ok(AssignmentOutcome::Assigned(assignment)) => assignment,
                Ok(AssignmentOutcome::NoPeerAvailable) => {
                    warn!(target: "initiator", ?file, "no processor available");
                    summary.skipped += 1;
                    continue;
                }
                Ok(AssignmentOutcome::NoTokens) => {
                    warn!(target: "initiator", "out of tokens - stopping distribution");
                    summary.skipped += files.len() - index;
                    summary.stopped_no_tokens = true;
                    break;
                }
                Err(e) => {
                    warn!(target: "initiator", ?file, ?e, "assignment request failed");
                    summary.skipped += 1;
                    continue;
                }
            };

            let processor = assignment.peer_id;
            if !styled.contains(&processor) {
                if let Err(e) =
                    self.send(&assignment, RECEIVE_STYLE_PROTOCOL, FrameTag::Style, &self.style_artifact).await
                {
                    warn!(target: "initiator", ?processor, ?e, "style delivery failed");
                    summary.skipped += 1;
                    continue;
                }
                styled.insert(processor);
                summary.styles_sent += 1;
            }

            match self.send(&assignment, RECEIVE_IMAGE_PROTOCOL, FrameTag::Image, file).await {
                Ok(()) => {
                    info!(target: "initiator", ?file, ?processor, "content sent");
                    summary.content_sent += 1;
                }
                Err(e) => {
                    warn!(target: "initiator", ?file, ?processor, ?e, "content delivery failed");
                    summary.skipped += 1;
                }
            }
        }

        info!(target: "initiator", ?summary, "all files handled - waiting for results");
        Ok(summary)
    }

    /// Ask the directory for the next processor.
    async fn request_assignment(&self) -> NodeResult<AssignmentOutcome> {
        let mut stream = self
            .transport
            .open_stream(
                self.rendezvous.peer_id,
                vec![self.rendezvous.address.clone()],
                REQUEST_PEER_PROTOCOL,
            )
            .await?;
        Ok(stream::request_assignment(&self.codec, &mut stream).await?)
    }

    /// Send one file to an assigned processor on a fresh stream.
    async fn send(
        &self,
        assignment: &Assignment,
        protocol: sn_types::StreamProtocol,
        tag: FrameTag,
        path: &Path,
    ) -> NodeResult<()> {
        let mut stream = self
            .transport
            .open_stream(assignment.peer_id, assignment.addresses.clone(), protocol)
            .await?;
        stream::send_file(&self.codec, &mut stream, tag, path).await?;
        Ok(())
    }
}

/// Image files in `dir`, sorted by file name.
///
/// Directories and non-image entries are skipped without being opened.
async fn list_content(dir: &Path) -> NodeResult<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() || !is_image_file(&path) {
            debug!(target: "initiator", ?path, "skipping non-image entry");
            continue;
        }
        files.push(path);
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
