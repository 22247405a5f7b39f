//! Node IT tests

use assert_matches::assert_matches;
use async_trait::async_trait;
use futures::StreamExt as _;
use sn_config::{
    AccountMode, BootstrapDescriptor, DirectoryConfig, NodeConfig, ProcessorConfig, TokenAccount,
};
use sn_network_libp2p::{
    memory::{MemoryNetwork, MemoryTransport},
    peers::PeerDirectory,
    stream::{
        read_assignment_request, receive_result, send_file, write_assignment_reply, FrameCodec,
        FrameTag, ResultPayload, RECEIVE_IMAGE_PROTOCOL, RECEIVE_RESULT_PROTOCOL,
        RECEIVE_STYLE_PROTOCOL, REQUEST_PEER_PROTOCOL,
    },
    TransferTransport as _,
};
use sn_node::{
    rendezvous_directory, EngineError, Initiator, Processor, ProcessorDirs, RendezvousService,
    ResultEvent, StyleEngine,
};
use sn_types::{Assignment, AssignmentOutcome, PeerId, StreamProtocol};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tempfile::TempDir;
use tokio::{
    sync::{mpsc, Notify},
    task::JoinHandle,
    time::timeout,
};

/// Test engine.
///
/// Extraction copies the style image. Stylizing writes the content followed by the style, and
/// fails for content starting with `FAIL`.
#[derive(Debug, Default)]
struct TestEngine {
    extracts: AtomicUsize,
}

#[async_trait]
impl StyleEngine for TestEngine {
    async fn extract(&self, style_image: &Path, output: &Path) -> Result<(), EngineError> {
        self.extracts.fetch_add(1, Ordering::SeqCst);
        tokio::fs::copy(style_image, output)
            .await
            .map_err(|source| EngineError::Spawn { program: "test-engine".to_string(), source })?;
        Ok(())
    }

    async fn stylize(
        &self,
        content: &Path,
        style: &Path,
        output: &Path,
    ) -> Result<(), EngineError> {
        let to_engine_error =
            |source| EngineError::Spawn { program: "test-engine".to_string(), source };
        let mut bytes = tokio::fs::read(content).await.map_err(to_engine_error)?;
        if bytes.starts_with(b"FAIL") {
            return Err(to_engine_error(std::io::Error::other("bad content")));
        }
        bytes.extend_from_slice(b"|");
        bytes.extend(tokio::fs::read(style).await.map_err(to_engine_error)?);
        tokio::fs::write(output, bytes).await.map_err(to_engine_error)?;
        Ok(())
    }
}

/// Engine that holds every stylize call until released.
///
/// Reports the style path of each started job, then behaves like [TestEngine].
#[derive(Debug)]
struct GatedEngine {
    started: mpsc::UnboundedSender<PathBuf>,
    release: Notify,
    inner: TestEngine,
}

impl GatedEngine {
    fn new() -> (Self, mpsc::UnboundedReceiver<PathBuf>) {
        let (started, rx) = mpsc::unbounded_channel();
        (Self { started, release: Notify::new(), inner: TestEngine::default() }, rx)
    }
}

#[async_trait]
impl StyleEngine for GatedEngine {
    async fn extract(&self, style_image: &Path, output: &Path) -> Result<(), EngineError> {
        self.inner.extract(style_image, output).await
    }

    async fn stylize(
        &self,
        content: &Path,
        style: &Path,
        output: &Path,
    ) -> Result<(), EngineError> {
        let _ = self.started.send(style.to_path_buf());
        self.release.notified().await;
        self.inner.stylize(content, style, output).await
    }
}

/// A running processor on the memory network.
struct TestProcessor<E = TestEngine> {
    peer_id: PeerId,
    transport: MemoryTransport,
    processor: Processor<MemoryTransport, E>,
    dir: TempDir,
    _task: JoinHandle<()>,
}

impl<E> TestProcessor<E> {
    fn staging_dir(&self) -> PathBuf {
        self.dir.path().join("staging")
    }

    fn output_dir(&self) -> PathBuf {
        self.dir.path().join("output")
    }
}

/// A prepared initiator with its result channel.
struct TestInitiator {
    peer_id: PeerId,
    transport: MemoryTransport,
    initiator: Initiator<MemoryTransport, TestEngine>,
    engine: Arc<TestEngine>,
    results: mpsc::UnboundedReceiver<ResultEvent>,
    dir: TempDir,
    _listener: JoinHandle<()>,
}

impl TestInitiator {
    fn style_image(&self) -> PathBuf {
        self.dir.path().join("style.jpg")
    }

    fn content_dir(&self) -> PathBuf {
        self.dir.path().join("content")
    }

    fn results_dir(&self) -> PathBuf {
        self.dir.path().join("results")
    }

    /// Write `(name, body)` content files.
    fn add_content(&self, files: &[(&str, &[u8])]) {
        for (name, body) in files {
            std::fs::write(self.content_dir().join(name), body).expect("write content");
        }
    }

    /// Wait for `count` result events.
    async fn collect_results(&mut self, count: usize) -> Vec<ResultEvent> {
        let mut events = Vec::with_capacity(count);
        while events.len() < count {
            let event = timeout(Duration::from_secs(10), self.results.recv())
                .await
                .expect("result before timeout")
                .expect("result channel open");
            events.push(event);
        }
        events
    }
}

fn processor_config() -> ProcessorConfig {
    ProcessorConfig { max_concurrent_jobs: 2, style_wait_timeout: Duration::from_secs(5) }
}

/// Join a processor and start its handlers.
fn spawn_processor(network: &MemoryNetwork, config: ProcessorConfig) -> TestProcessor {
    let (transport, _events) = network.join();
    spawn_processor_on(transport, config, Arc::new(TestEngine::default()))
}

/// Start processor handlers on an already joined transport.
fn spawn_processor_on<E: StyleEngine>(
    transport: MemoryTransport,
    config: ProcessorConfig,
    engine: Arc<E>,
) -> TestProcessor<E> {
    let dir = TempDir::new().expect("tempdir");
    let dirs = ProcessorDirs {
        staging: dir.path().join("staging"),
        styles: dir.path().join("styles"),
        output: dir.path().join("output"),
    };
    for path in [&dirs.staging, &dirs.styles, &dirs.output] {
        std::fs::create_dir_all(path).expect("create processor dir");
    }
    let peer_id = transport.local_peer_id();
    let processor = Processor::new(
        transport.clone(),
        engine,
        FrameCodec::default(),
        dirs,
        config,
    );
    let task = processor.spawn().expect("processor handlers registered");
    TestProcessor { peer_id, transport, processor, dir, _task: task }
}

/// Join an initiator that asks `rendezvous` for work.
fn spawn_initiator(network: &MemoryNetwork, rendezvous: PeerId) -> TestInitiator {
    let (transport, _events) = network.join();
    let dir = TempDir::new().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("content")).expect("content dir");
    std::fs::create_dir_all(dir.path().join("results")).expect("results dir");
    std::fs::write(dir.path().join("style.jpg"), b"STYLE").expect("style image");

    let descriptor = BootstrapDescriptor::new(
        rendezvous,
        network.address_of(&rendezvous).expect("rendezvous joined"),
    );
    let engine = Arc::new(TestEngine::default());
    let peer_id = transport.local_peer_id();
    let initiator = Initiator::new(
        transport.clone(),
        engine.clone(),
        descriptor,
        FrameCodec::default(),
        dir.path().join("style.pt"),
        dir.path().join("results"),
    );
    let (listener, results) = initiator.spawn_result_listener().expect("result handler");
    TestInitiator { peer_id, transport, initiator, engine, results, dir, _listener: listener }
}

/// Serve a fixed sequence of replies on the assignment protocol.
fn spawn_scripted_rendezvous(
    network: &MemoryNetwork,
    script: Vec<AssignmentOutcome>,
) -> (PeerId, JoinHandle<()>) {
    let (transport, _events) = network.join();
    let peer_id = transport.local_peer_id();
    let mut requests = transport.accept(REQUEST_PEER_PROTOCOL).expect("accept requests");
    let task = tokio::spawn(async move {
        let codec = FrameCodec::default();
        let mut script = script.into_iter();
        while let Some((_, mut stream)) = requests.next().await {
            read_assignment_request(&codec, &mut stream).await.expect("request frame");
            let outcome = script.next().unwrap_or(AssignmentOutcome::NoPeerAvailable);
            write_assignment_reply(&codec, &mut stream, &outcome).await.expect("reply");
        }
    });
    (peer_id, task)
}

/// Start a rendezvous service whose directory is built from `config`.
fn start_rendezvous(
    network: &MemoryNetwork,
    config: &NodeConfig,
) -> (PeerId, Arc<PeerDirectory>, JoinHandle<()>) {
    let (transport, events) = network.join();
    let peer_id = transport.local_peer_id();
    let directory = Arc::new(rendezvous_directory(config));
    let task = RendezvousService::new(transport, directory.clone(), FrameCodec::default())
        .spawn(events)
        .expect("rendezvous started");
    (peer_id, directory, task)
}

/// Connect to the rendezvous node and wait for admission.
async fn join_directory(
    transport: &MemoryTransport,
    rendezvous: PeerId,
    directory: &PeerDirectory,
) {
    transport.dial(rendezvous, vec![]).await.expect("dial rendezvous");
    let peer_id = transport.local_peer_id();
    eventually(|| directory.contains(&peer_id)).await;
}

/// Open a stream to `to` and send one file.
async fn push_file(
    sender: &MemoryTransport,
    to: PeerId,
    protocol: StreamProtocol,
    tag: FrameTag,
    path: &Path,
) {
    let mut stream = sender.open_stream(to, vec![], protocol).await.expect("open stream");
    send_file(&FrameCodec::default(), &mut stream, tag, path).await.expect("send file");
}

/// Wait until the processor's current style holds `body`.
async fn wait_for_style_body<E: StyleEngine>(
    processor: &Processor<MemoryTransport, E>,
    body: &[u8],
) {
    eventually(|| {
        processor
            .current_style()
            .is_some_and(|artifact| std::fs::read(artifact.path()).ok().as_deref() == Some(body))
    })
    .await;
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).expect("read dir").next().is_none()
}

fn assigned(network: &MemoryNetwork, peer_id: PeerId) -> AssignmentOutcome {
    let address = network.address_of(&peer_id).expect("joined");
    AssignmentOutcome::Assigned(Assignment::new(peer_id, vec![address]))
}

/// Poll `condition` until it holds.
async fn eventually(condition: impl Fn() -> bool) {
    timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition met before timeout");
}

/// Results saved per sending processor.
fn saved_by_sender(events: &[ResultEvent]) -> HashMap<PeerId, usize> {
    let mut counts = HashMap::new();
    for event in events {
        if let ResultEvent::Saved { from, .. } = event {
            *counts.entry(*from).or_default() += 1;
        }
    }
    counts
}

#[tokio::test]
async fn test_end_to_end_round_robin() {
    let network = MemoryNetwork::new();
    let (rendezvous_transport, rendezvous_events) = network.join();
    let rendezvous = rendezvous_transport.local_peer_id();
    let directory = Arc::new(PeerDirectory::new(DirectoryConfig::default()));
    let _service =
        RendezvousService::new(rendezvous_transport, directory.clone(), FrameCodec::default())
            .spawn(rendezvous_events)
            .expect("rendezvous started");

    // join one at a time so the roster order is P1, P2, I
    let p1 = spawn_processor(&network, processor_config());
    let p2 = spawn_processor(&network, processor_config());
    for processor in [&p1, &p2] {
        processor.transport.dial(rendezvous, vec![]).await.expect("dial rendezvous");
        let id = processor.peer_id;
        eventually(|| directory.contains(&id)).await;
    }
    let mut initiator = spawn_initiator(&network, rendezvous);
    initiator.transport.dial(rendezvous, vec![]).await.expect("dial rendezvous");
    let initiator_id = initiator.peer_id;
    eventually(|| directory.contains(&initiator_id)).await;
    assert_eq!(directory.roster(), vec![p1.peer_id, p2.peer_id, initiator.peer_id]);

    initiator.add_content(&[("a.jpg", b"A"), ("b.jpg", b"B"), ("c.jpg", b"C")]);
    let summary = initiator
        .initiator
        .run(&initiator.style_image(), &initiator.content_dir())
        .await
        .expect("run");
    assert_eq!(summary.files_considered, 3);
    assert_eq!(summary.content_sent, 3);
    assert_eq!(summary.styles_sent, 2);
    assert_eq!(summary.skipped, 0);
    assert!(!summary.stopped_no_tokens);
    assert_eq!(initiator.engine.extracts.load(Ordering::SeqCst), 1);

    let events = initiator.collect_results(3).await;
    let counts = saved_by_sender(&events);
    assert_eq!(counts.get(&p1.peer_id), Some(&2));
    assert_eq!(counts.get(&p2.peer_id), Some(&1));

    // every result is a distinct file carrying content and style
    let mut saved = std::fs::read_dir(initiator.results_dir())
        .expect("results dir")
        .map(|entry| std::fs::read(entry.expect("entry").path()).expect("read result"))
        .collect::<Vec<_>>();
    saved.sort();
    assert_eq!(saved, vec![b"A|STYLE".to_vec(), b"B|STYLE".to_vec(), b"C|STYLE".to_vec()]);

    let p1_stats = p1.processor.clone();
    eventually(|| p1_stats.stats().jobs_succeeded == 2).await;
    assert_eq!(p1.processor.stats().styles_received, 1);
    assert_eq!(p2.processor.stats().styles_received, 1);
}

#[tokio::test]
async fn test_style_sent_once_per_processor() {
    let network = MemoryNetwork::new();
    let a = spawn_processor(&network, processor_config());
    let b = spawn_processor(&network, processor_config());
    let script = vec![
        assigned(&network, a.peer_id),
        assigned(&network, a.peer_id),
        assigned(&network, b.peer_id),
        assigned(&network, a.peer_id),
    ];
    let (rendezvous, _task) = spawn_scripted_rendezvous(&network, script);
    let mut initiator = spawn_initiator(&network, rendezvous);
    initiator.add_content(&[("1.jpg", b"1"), ("2.jpg", b"2"), ("3.jpg", b"3"), ("4.jpg", b"4")]);

    let summary = initiator
        .initiator
        .run(&initiator.style_image(), &initiator.content_dir())
        .await
        .expect("run");
    assert_eq!(summary.content_sent, 4);
    assert_eq!(summary.styles_sent, 2);

    let events = initiator.collect_results(4).await;
    let counts = saved_by_sender(&events);
    assert_eq!(counts.get(&a.peer_id), Some(&3));
    assert_eq!(counts.get(&b.peer_id), Some(&1));
    assert_eq!(a.processor.stats().styles_received, 1);
    assert_eq!(b.processor.stats().styles_received, 1);
}

#[tokio::test]
async fn test_engine_failure_reported_to_initiator() {
    let network = MemoryNetwork::new();
    let processor = spawn_processor(&network, processor_config());
    let script = vec![assigned(&network, processor.peer_id); 3];
    let (rendezvous, _task) = spawn_scripted_rendezvous(&network, script);
    let mut initiator = spawn_initiator(&network, rendezvous);
    initiator.add_content(&[("a.jpg", b"A"), ("b.jpg", b"FAIL"), ("c.jpg", b"C")]);

    let summary = initiator
        .initiator
        .run(&initiator.style_image(), &initiator.content_dir())
        .await
        .expect("run");
    assert_eq!(summary.content_sent, 3);

    let events = initiator.collect_results(3).await;
    let failures: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            ResultEvent::Failed { from, message } => Some((*from, message.clone())),
            ResultEvent::Saved { .. } => None,
        })
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, processor.peer_id);
    assert!(failures[0].1.contains("bad content"), "unexpected message: {}", failures[0].1);
    assert_eq!(std::fs::read_dir(initiator.results_dir()).expect("results").count(), 2);

    let stats = processor.processor.clone();
    eventually(|| stats.stats().jobs_failed == 1 && stats.stats().jobs_succeeded == 2).await;
}

#[tokio::test]
async fn test_non_image_entries_skipped() {
    let network = MemoryNetwork::new();
    let processor = spawn_processor(&network, processor_config());
    let script = vec![assigned(&network, processor.peer_id); 4];
    let (rendezvous, _task) = spawn_scripted_rendezvous(&network, script);
    let mut initiator = spawn_initiator(&network, rendezvous);
    initiator.add_content(&[("a.jpg", b"A"), ("d.png", b"D"), ("readme.txt", b"text")]);
    let nested = initiator.content_dir().join("notes");
    std::fs::create_dir_all(&nested).expect("nested dir");
    std::fs::write(nested.join("x.jpg"), b"X").expect("nested image");

    let summary = initiator
        .initiator
        .run(&initiator.style_image(), &initiator.content_dir())
        .await
        .expect("run");
    assert_eq!(summary.files_considered, 2);
    assert_eq!(summary.content_sent, 2);
    initiator.collect_results(2).await;
}

#[tokio::test]
async fn test_no_peer_skips_file() {
    let network = MemoryNetwork::new();
    let processor = spawn_processor(&network, processor_config());
    let script = vec![AssignmentOutcome::NoPeerAvailable, assigned(&network, processor.peer_id)];
    let (rendezvous, _task) = spawn_scripted_rendezvous(&network, script);
    let mut initiator = spawn_initiator(&network, rendezvous);
    initiator.add_content(&[("a.jpg", b"A"), ("b.jpg", b"B")]);

    let summary = initiator
        .initiator
        .run(&initiator.style_image(), &initiator.content_dir())
        .await
        .expect("run");
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.content_sent, 1);

    // b.jpg is the one delivered
    let events = initiator.collect_results(1).await;
    assert_matches!(&events[0], ResultEvent::Saved { path, .. } => {
        assert_eq!(std::fs::read(path).expect("result"), b"B|STYLE");
    });
}

#[tokio::test]
async fn test_no_tokens_stops_distribution() {
    let network = MemoryNetwork::new();
    let processor = spawn_processor(&network, processor_config());
    let script = vec![assigned(&network, processor.peer_id), AssignmentOutcome::NoTokens];
    let (rendezvous, _task) = spawn_scripted_rendezvous(&network, script);
    let initiator = spawn_initiator(&network, rendezvous);
    initiator.add_content(&[("a.jpg", b"A"), ("b.jpg", b"B"), ("c.jpg", b"C")]);

    let summary = initiator
        .initiator
        .run(&initiator.style_image(), &initiator.content_dir())
        .await
        .expect("run");
    assert!(summary.stopped_no_tokens);
    assert_eq!(summary.content_sent, 1);
    assert_eq!(summary.skipped, 2);
}

#[tokio::test]
async fn test_extraction_failure_is_fatal() {
    let network = MemoryNetwork::new();
    let (rendezvous, _task) = spawn_scripted_rendezvous(&network, vec![]);
    let initiator = spawn_initiator(&network, rendezvous);
    initiator.add_content(&[("a.jpg", b"A")]);

    let missing = initiator.dir.path().join("missing.jpg");
    let res = initiator.initiator.run(&missing, &initiator.content_dir()).await;
    assert_matches!(res, Err(sn_node::NodeError::Engine(_)));
}

#[tokio::test]
async fn test_content_without_style_reports_error() {
    let network = MemoryNetwork::new();
    let config =
        ProcessorConfig { max_concurrent_jobs: 1, style_wait_timeout: Duration::from_millis(200) };
    let processor = spawn_processor(&network, config);

    let (sender, _events) = network.join();
    let mut results = sender.accept(RECEIVE_RESULT_PROTOCOL).expect("accept results");
    let dir = TempDir::new().expect("tempdir");
    let content = dir.path().join("a.jpg");
    std::fs::write(&content, b"A").expect("content");

    let codec = FrameCodec::default();
    let mut stream = sender
        .open_stream(processor.peer_id, vec![], RECEIVE_IMAGE_PROTOCOL)
        .await
        .expect("open content stream");
    send_file(&codec, &mut stream, FrameTag::Image, &content).await.expect("send content");

    let (from, mut result) =
        timeout(Duration::from_secs(10), results.next()).await.expect("result").expect("stream");
    assert_eq!(from, processor.peer_id);
    let payload = receive_result(&codec, &mut result, dir.path(), "processed").await.expect("frame");
    assert_matches!(payload, ResultPayload::Error(message) if message == "no style artifact received");
    let stats = processor.processor.clone();
    eventually(|| stats.stats().jobs_failed == 1).await;
}

#[tokio::test]
async fn test_superseded_style_removed() {
    let network = MemoryNetwork::new();
    let processor = spawn_processor(&network, processor_config());
    let (sender, _events) = network.join();
    let dir = TempDir::new().expect("tempdir");
    let codec = FrameCodec::default();

    for body in [b"first".as_slice(), b"second".as_slice()] {
        let style = dir.path().join("style.pt");
        std::fs::write(&style, body).expect("style");
        let mut stream = sender
            .open_stream(processor.peer_id, vec![], RECEIVE_STYLE_PROTOCOL)
            .await
            .expect("open style stream");
        send_file(&codec, &mut stream, FrameTag::Style, &style).await.expect("send style");
        let handle = processor.processor.clone();
        let expected = body.to_vec();
        eventually(move || {
            handle
                .current_style()
                .is_some_and(|artifact| std::fs::read(artifact.path()).ok() == Some(expected.clone()))
        })
        .await;
    }

    // only the current artifact stays on disk
    let current = processor.processor.current_style().expect("style set");
    let styles_dir = current.path().parent().expect("styles dir").to_path_buf();
    assert_eq!(std::fs::read_dir(styles_dir).expect("styles").count(), 1);
    assert_eq!(processor.processor.stats().styles_received, 2);
}

#[tokio::test]
async fn test_running_job_keeps_its_style() {
    let network = MemoryNetwork::new();
    let (engine, mut started) = GatedEngine::new();
    let engine = Arc::new(engine);
    let (transport, _events) = network.join();
    let processor = spawn_processor_on(transport, processor_config(), engine.clone());

    let (sender, _events) = network.join();
    let mut results = sender.accept(RECEIVE_RESULT_PROTOCOL).expect("accept results");
    let dir = TempDir::new().expect("tempdir");
    let style = dir.path().join("style.pt");
    let content = dir.path().join("a.jpg");
    std::fs::write(&content, b"A").expect("content");

    std::fs::write(&style, b"first").expect("style");
    push_file(&sender, processor.peer_id, RECEIVE_STYLE_PROTOCOL, FrameTag::Style, &style).await;
    wait_for_style_body(&processor.processor, b"first").await;
    push_file(&sender, processor.peer_id, RECEIVE_IMAGE_PROTOCOL, FrameTag::Image, &content).await;
    let pinned = timeout(Duration::from_secs(10), started.recv())
        .await
        .expect("job started")
        .expect("engine open");

    // a new style arrives while the job is running
    std::fs::write(&style, b"second").expect("style");
    push_file(&sender, processor.peer_id, RECEIVE_STYLE_PROTOCOL, FrameTag::Style, &style).await;
    wait_for_style_body(&processor.processor, b"second").await;
    assert!(pinned.exists(), "running job lost its style artifact");

    engine.release.notify_one();
    let (_, mut stream) =
        timeout(Duration::from_secs(10), results.next()).await.expect("result").expect("stream");
    let payload = receive_result(&FrameCodec::default(), &mut stream, dir.path(), "processed")
        .await
        .expect("frame");
    assert_matches!(payload, ResultPayload::Image(path) => {
        assert_eq!(std::fs::read(path).expect("result"), b"A|first");
    });

    // the superseded artifact goes away with its last job
    eventually(|| !pinned.exists()).await;
    let current = processor.processor.current_style().expect("style set");
    assert_eq!(std::fs::read(current.path()).expect("current style"), b"second");
}

#[tokio::test]
async fn test_job_files_removed_after_success_and_failure() {
    let network = MemoryNetwork::new();
    let processor = spawn_processor(&network, processor_config());
    let (sender, _events) = network.join();
    let mut results = sender.accept(RECEIVE_RESULT_PROTOCOL).expect("accept results");
    let dir = TempDir::new().expect("tempdir");

    let style = dir.path().join("style.pt");
    std::fs::write(&style, b"S").expect("style");
    push_file(&sender, processor.peer_id, RECEIVE_STYLE_PROTOCOL, FrameTag::Style, &style).await;
    wait_for_style_body(&processor.processor, b"S").await;

    for (name, body) in [("ok.jpg", b"OK".as_slice()), ("bad.jpg", b"FAIL".as_slice())] {
        let content = dir.path().join(name);
        std::fs::write(&content, body).expect("content");
        push_file(&sender, processor.peer_id, RECEIVE_IMAGE_PROTOCOL, FrameTag::Image, &content)
            .await;
    }

    let codec = FrameCodec::default();
    let mut payloads = Vec::new();
    for _ in 0..2 {
        let (_, mut stream) = timeout(Duration::from_secs(10), results.next())
            .await
            .expect("result")
            .expect("stream");
        let payload =
            receive_result(&codec, &mut stream, dir.path(), "processed").await.expect("frame");
        payloads.push(payload);
    }
    assert_eq!(payloads.iter().filter(|p| matches!(p, ResultPayload::Image(_))).count(), 1);
    assert_eq!(payloads.iter().filter(|p| matches!(p, ResultPayload::Error(_))).count(), 1);

    let stats = processor.processor.clone();
    eventually(|| stats.stats().jobs_succeeded == 1 && stats.stats().jobs_failed == 1).await;
    let (staging, output) = (processor.staging_dir(), processor.output_dir());
    eventually(|| is_empty_dir(&staging) && is_empty_dir(&output)).await;
}

#[tokio::test]
async fn test_failed_style_delivery_retried_on_next_assignment() {
    let network = MemoryNetwork::new();
    // nothing accepts styles on this peer until the second request
    let (late, _late_events) = network.join();
    let late_id = late.local_peer_id();
    let outcome = assigned(&network, late_id);

    let (rendezvous_transport, _events) = network.join();
    let rendezvous = rendezvous_transport.local_peer_id();
    let mut requests = rendezvous_transport.accept(REQUEST_PEER_PROTOCOL).expect("accept requests");
    let rendezvous_task = tokio::spawn(async move {
        let codec = FrameCodec::default();
        let (_, mut stream) = requests.next().await.expect("first request");
        read_assignment_request(&codec, &mut stream).await.expect("request frame");
        write_assignment_reply(&codec, &mut stream, &outcome).await.expect("reply");

        let (_, mut stream) = requests.next().await.expect("second request");
        read_assignment_request(&codec, &mut stream).await.expect("request frame");
        let engine = Arc::new(TestEngine::default());
        let processor = spawn_processor_on(late, processor_config(), engine);
        write_assignment_reply(&codec, &mut stream, &outcome).await.expect("reply");
        processor
    });

    let mut initiator = spawn_initiator(&network, rendezvous);
    initiator.add_content(&[("a.jpg", b"A"), ("b.jpg", b"B")]);
    let summary = initiator
        .initiator
        .run(&initiator.style_image(), &initiator.content_dir())
        .await
        .expect("run");
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.styles_sent, 1);
    assert_eq!(summary.content_sent, 1);

    let events = initiator.collect_results(1).await;
    assert_matches!(&events[0], ResultEvent::Saved { from, path } => {
        assert_eq!(*from, late_id);
        assert_eq!(std::fs::read(path).expect("result"), b"B|STYLE");
    });
    let processor = rendezvous_task.await.expect("rendezvous task");
    assert_eq!(processor.processor.stats().styles_received, 1);
}

#[tokio::test]
async fn test_disabled_account_never_assigned() {
    let network = MemoryNetwork::new();
    let disabled = spawn_processor(&network, processor_config());
    let enabled = spawn_processor(&network, processor_config());
    let mut config = NodeConfig::default();
    config.tokens.enabled = true;
    config
        .tokens
        .accounts
        .insert(disabled.peer_id, TokenAccount::new(100, false, AccountMode::Processor));
    let (rendezvous, directory, _service) = start_rendezvous(&network, &config);

    join_directory(&disabled.transport, rendezvous, &directory).await;
    join_directory(&enabled.transport, rendezvous, &directory).await;
    let mut initiator = spawn_initiator(&network, rendezvous);
    join_directory(&initiator.transport, rendezvous, &directory).await;

    initiator.add_content(&[("a.jpg", b"A"), ("b.jpg", b"B"), ("c.jpg", b"C")]);
    let summary = initiator
        .initiator
        .run(&initiator.style_image(), &initiator.content_dir())
        .await
        .expect("run");
    assert_eq!(summary.content_sent, 3);
    assert_eq!(summary.styles_sent, 1);

    let events = initiator.collect_results(3).await;
    assert_eq!(saved_by_sender(&events).get(&enabled.peer_id), Some(&3));
    assert_eq!(disabled.processor.stats().styles_received, 0);
}

#[tokio::test]
async fn test_empty_balance_stops_initiator() {
    let network = MemoryNetwork::new();
    let processor = spawn_processor(&network, processor_config());
    let mut config = NodeConfig::default();
    config.tokens.enabled = true;
    config.tokens.default_account = TokenAccount::new(0, true, AccountMode::All);
    let (rendezvous, directory, _service) = start_rendezvous(&network, &config);

    join_directory(&processor.transport, rendezvous, &directory).await;
    let initiator = spawn_initiator(&network, rendezvous);
    join_directory(&initiator.transport, rendezvous, &directory).await;

    initiator.add_content(&[("a.jpg", b"A"), ("b.jpg", b"B")]);
    let summary = initiator
        .initiator
        .run(&initiator.style_image(), &initiator.content_dir())
        .await
        .expect("run");
    assert!(summary.stopped_no_tokens);
    assert_eq!(summary.content_sent, 0);
    assert_eq!(summary.skipped, 2);
    assert_eq!(processor.processor.stats().styles_received, 0);
}

#[tokio::test]
async fn test_unresolvable_peer_not_admitted() {
    let network = MemoryNetwork::new();
    let mut config = NodeConfig::default();
    config.directory = DirectoryConfig {
        address_poll_attempts: 2,
        address_poll_interval: Duration::from_millis(10),
    };
    let (rendezvous, directory, _service) = start_rendezvous(&network, &config);

    let (hidden, _hidden_events) = network.join_unadvertised();
    hidden.dial(rendezvous, vec![]).await.expect("dial rendezvous");
    let (visible, _visible_events) = network.join();
    join_directory(&visible, rendezvous, &directory).await;

    // outlast the address polls of the hidden peer
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!directory.contains(&hidden.local_peer_id()));
    assert_eq!(directory.roster(), vec![visible.local_peer_id()]);
}
