//! The processor session.
//!
//! Stands idle until an initiator delivers a style, then stylizes every content image it
//! receives and sends the result back to the image's sender.

use crate::{
    engine::StyleEngine,
    error::{NodeError, NodeResult},
};
use futures::StreamExt as _;
use parking_lot::Mutex;
use sn_config::ProcessorConfig;
use sn_network_libp2p::{
    stream::{
        receive_file, send_error, send_result, FrameCodec, FrameTag, RECEIVE_IMAGE_PROTOCOL,
        RECEIVE_RESULT_PROTOCOL, RECEIVE_STYLE_PROTOCOL,
    },
    TransferTransport,
};
use sn_types::{unique_file_name, PeerId};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    sync::{watch, Semaphore},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

/// A received style artifact on disk.
///
/// The file is removed when the last job holding it finishes.
#[derive(Debug)]
pub struct StyleArtifact {
    path: PathBuf,
}

impl StyleArtifact {
    /// Take ownership of the artifact at `path`.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The artifact's location.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StyleArtifact {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(target: "processor", path = ?self.path, ?e, "failed to remove style artifact");
        }
    }
}

/// Counters kept by a processor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Style artifacts received.
    pub styles_received: usize,
    /// Content jobs that produced an image.
    pub jobs_succeeded: usize,
    /// Content jobs that reported an error.
    pub jobs_failed: usize,
}

/// Directories used by a processor.
#[derive(Debug, Clone)]
pub struct ProcessorDirs {
    /// Received content images.
    pub staging: PathBuf,
    /// Received style artifacts.
    pub styles: PathBuf,
    /// Engine output before it is sent back.
    pub output: PathBuf,
}

/// The processor role.
#[derive(Debug)]
pub struct Processor<T, E> {
    inner: Arc<ProcessorInner<T, E>>,
}

impl<T, E> Clone for Processor<T, E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

#[derive(Debug)]
struct ProcessorInner<T, E> {
    /// The transport.
    transport: T,
    /// The style engine.
    engine: Arc<E>,
    /// Frame codec for every exchange.
    codec: FrameCodec,
    /// Working directories.
    dirs: ProcessorDirs,
    /// The current style. Jobs clone the `Arc` when they start.
    style: watch::Sender<Option<Arc<StyleArtifact>>>,
    /// Bounds concurrent engine invocations.
    permits: Semaphore,
    /// Processor settings.
    config: ProcessorConfig,
    /// Job counters.
    stats: Mutex<ProcessorStats>,
}

impl<T, E> Processor<T, E>
where
    T: TransferTransport,
    E: StyleEngine,
{
    /// Create a new instance of Self.
    pub fn new(
        transport: T,
        engine: Arc<E>,
        codec: FrameCodec,
        dirs: ProcessorDirs,
        config: ProcessorConfig,
    ) -> Self {
        let (style, _) = watch::channel(None);
        let permits = Semaphore::new(config.max_concurrent_jobs.max(1));
        let inner = ProcessorInner {
            transport,
            engine,
            codec,
            dirs,
            style,
            permits,
            config,
            stats: Mutex::new(ProcessorStats::default()),
        };
        Self { inner: Arc::new(inner) }
    }

    /// Current counters.
    pub fn stats(&self) -> ProcessorStats {
        *self.inner.stats.lock()
    }

    /// The style artifact new jobs would use.
    pub fn current_style(&self) -> Option<Arc<StyleArtifact>> {
        self.inner.style.borrow().clone()
    }

    /// Register the style and content handlers.
    ///
    /// Every inbound stream is handled on its own task. The returned task runs until the
    /// transport stops delivering streams.
    pub fn spawn(&self) -> NodeResult<JoinHandle<()>> {
        let mut styles = self.inner.transport.accept(RECEIVE_STYLE_PROTOCOL)?;
        let mut images = self.inner.transport.accept(RECEIVE_IMAGE_PROTOCOL)?;
        let this = self.clone();

        let task = tokio::spawn(async move {
            info!(target: "processor", "ready for work");
            loop {
                tokio::select! {
                    Some((from, stream)) = styles.next() => {
                        let this = this.clone();
                        tokio::spawn(async move { this.handle_style(from, stream).await });
                    }
                    Some((from, stream)) = images.next() => {
                        let this = this.clone();
                        tokio::spawn(async move { this.handle_content(from, stream).await });
                    }
                    else => break,
                }
            }
            debug!(target: "processor", "handlers closed");
        });

        Ok(task)
    }

    /// Persist a style artifact and make it current.
    async fn handle_style(&self, from: PeerId, mut stream: T::Stream) {
        let inner = &self.inner;
        let dest = inner.dirs.styles.join(unique_file_name("received_style", "pt"));
        match receive_file(&inner.codec, &mut stream, FrameTag::Style, &dest).await {
            Ok(size) => {
                info!(target: "processor", ?from, ?dest, size, "style received");
                inner.style.send_replace(Some(Arc::new(StyleArtifact::new(dest))));
                inner.stats.lock().styles_received += 1;
            }
            Err(e) => warn!(target: "processor", ?from, ?e, "failed to receive style"),
        }
    }

    /// Receive one content image, stylize it and send the outcome back to `from`.
    async fn handle_content(&self, from: PeerId, mut stream: T::Stream) {
        let inner = &self.inner;
        let input = inner.dirs.staging.join(unique_file_name("received", "jpg"));
        if let Err(e) = receive_file(&inner.codec, &mut stream, FrameTag::Image, &input).await {
            warn!(target: "processor", ?from, ?e, "failed to receive content");
            return;
        }
        drop(stream);
        debug!(target: "processor", ?from, ?input, "content received");

        let output = inner.dirs.output.join(unique_file_name("styled", "jpg"));
        let outcome = self.stylize(&input, &output).await;

        if let Err(e) = self.deliver(from, &output, &outcome).await {
            error!(target: "processor", ?from, ?e, "failed to deliver result");
        }

        {
            let mut stats = inner.stats.lock();
            match outcome {
                Ok(()) => stats.jobs_succeeded += 1,
                Err(_) => stats.jobs_failed += 1,
            }
        }

        remove_best_effort(&input).await;
        remove_best_effort(&output).await;
    }

    /// Run the engine on `input` with this job's style snapshot.
    async fn stylize(&self, input: &Path, output: &Path) -> NodeResult<()> {
        let inner = &self.inner;
        let style = self.wait_for_style().await?;
        // the semaphore is never closed
        let _permit = inner.permits.acquire().await.ok();
        inner.engine.stylize(input, style.path(), output).await?;
        info!(target: "processor", ?output, "content stylized");
        Ok(())
    }

    /// The current style, waiting up to the configured timeout for the first one.
    async fn wait_for_style(&self) -> NodeResult<Arc<StyleArtifact>> {
        let mut rx = self.inner.style.subscribe();
        let wait = rx.wait_for(|style| style.is_some());
        let style = match tokio::time::timeout(self.inner.config.style_wait_timeout, wait).await {
            Ok(Ok(style)) => style.clone(),
            _ => None,
        };
        style.ok_or(NodeError::NoStyle)
    }

    /// Open a result stream to `to` and send the output or the failure.
    async fn deliver(&self, to: PeerId, output: &Path, outcome: &NodeResult<()>) -> NodeResult<()> {
        let inner = &self.inner;
        let addrs = inner.transport.peer_addresses(&to).await;
        let mut stream = inner.transport.open_stream(to, addrs, RECEIVE_RESULT_PROTOCOL).await?;
        match outcome {
            Ok(()) => send_result(&inner.codec, &mut stream, output).await?,
            Err(e) => {
                warn!(target: "processor", ?to, ?e, "job failed - reporting error");
                send_error(&inner.codec, &mut stream, &e.to_string()).await?;
            }
        }
        Ok(())
    }
}

/// Remove a temporary file, logging failures.
async fn remove_best_effort(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(target: "processor", ?path, ?e, "failed to remove temporary file"),
    }
}
