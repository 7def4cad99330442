use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};
use tower::ServiceExt;

use pdfchat::gateway::router;
use pdfchat::providers::{ChatAdapter, DocumentIndex, DocumentIndexer, IndexHandle, Passage};
use pdfchat::session::{ChatTurn, Role};
use pdfchat::store::FileStore;
use pdfchat::DocumentChat;

const BOUNDARY: &str = "pdfchat-test-boundary";

struct StubIndex {
    source: PathBuf,
}

impl DocumentIndex for StubIndex {
    fn search(&self, _query: &str, _limit: usize) -> anyhow::Result<Vec<Passage>> {
        Ok(vec![Passage {
            position: 0,
            text: "stub passage".into(),
            score: 0.0,
        }])
    }
    fn chunk_count(&self) -> usize {
        1
    }
    fn source(&self) -> &Path {
        &self.source
    }
}

#[derive(Default)]
struct StubIndexer {
    fail: AtomicBool,
    delay_ms: AtomicU64,
}

#[async_trait]
impl DocumentIndexer for StubIndexer {
    async fn build(&self, path: &Path) -> anyhow::Result<IndexHandle> {
        pause(&self.delay_ms).await;
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("no extractable text");
        }
        Ok(Arc::new(StubIndex {
            source: path.to_path_buf(),
        }))
    }
}

/// Records the history each call saw and the index source it was given.
#[derive(Default)]
struct RecordingChat {
    fail: AtomicBool,
    delay_ms: AtomicU64,
    calls: Mutex<Vec<(PathBuf, Vec<ChatTurn>)>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    started: Notify,
}

impl RecordingChat {
    fn calls(&self) -> Vec<(PathBuf, Vec<ChatTurn>)> {
        self.calls.lock().clone()
    }

    /// Make the next answers wait until a permit is added to the returned gate.
    fn hold(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(gate.clone());
        gate
    }
}

async fn pause(delay_ms: &AtomicU64) {
    let ms = delay_ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl ChatAdapter for RecordingChat {
    async fn answer(
        &self,
        index: &dyn DocumentIndex,
        question: &str,
        history: &[ChatTurn],
    ) -> anyhow::Result<String> {
        self.started.notify_one();
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await?;
        }
        pause(&self.delay_ms).await;
        self.calls
            .lock()
            .push((index.source().to_path_buf(), history.to_vec()));
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("quota exceeded");
        }
        Ok(format!("answer to: {question}"))
    }

    fn display_name(&self) -> &str {
        "recording"
    }
}

struct Harness {
    app: Router,
    chat: Arc<DocumentChat>,
    indexer: Arc<StubIndexer>,
    adapter: Arc<RecordingChat>,
    dir: TempDir,
}

impl Harness {
    fn new(max_bytes: u64) -> Self {
        Self::with_timeout(max_bytes, Duration::from_secs(5))
    }

    fn with_timeout(max_bytes: u64, adapter_timeout: Duration) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let indexer = Arc::new(StubIndexer::default());
        let adapter = Arc::new(RecordingChat::default());
        let chat = Arc::new(DocumentChat::new(
            FileStore::new(dir.path().to_str().unwrap(), max_bytes),
            indexer.clone(),
            adapter.clone(),
            adapter_timeout,
        ));
        Self {
            app: router(chat.clone()),
            chat,
            indexer,
            adapter,
            dir,
        }
    }

    fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        send_to(self.app.clone(), request).await
    }

    /// Run a request on its own task so the test can act while it is in flight.
    fn spawn(&self, request: Request<Body>) -> tokio::task::JoinHandle<(StatusCode, Value)> {
        tokio::spawn(send_to(self.app.clone(), request))
    }

    async fn upload(&self, filename: &str, data: &[u8]) -> (StatusCode, Value) {
        self.send(upload_request(filename, data)).await
    }

    async fn ask(&self, message: &str) -> (StatusCode, Value) {
        self.send(chat_request(message)).await
    }

    async fn clear(&self) -> (StatusCode, Value) {
        self.send(clear_request()).await
    }

    async fn status(&self) -> Value {
        let request = Request::builder()
            .uri("/status")
            .body(Body::empty())
            .unwrap();
        let (status, body) = self.send(request).await;
        assert_eq!(status, StatusCode::OK);
        body
    }
}

async fn send_to(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn upload_request(filename: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn chat_request(message: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "message": message }).to_string()))
        .unwrap()
}

fn clear_request() -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/clear")
        .body(Body::empty())
        .unwrap()
}

fn pdf_bytes(len: usize) -> Vec<u8> {
    let mut data = b"%PDF-1.4\n".to_vec();
    data.resize(len.max(data.len()), b'x');
    data
}

#[tokio::test]
async fn status_starts_empty() {
    let h = Harness::new(16 * 1024 * 1024);
    assert_eq!(
        h.status().await,
        json!({ "has_file": false, "ready": false, "filename": "" })
    );
}

#[tokio::test]
async fn upload_then_status_reports_ready() {
    let h = Harness::new(16 * 1024 * 1024);

    let (status, body) = h.upload("doc.pdf", &pdf_bytes(500 * 1024)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["filename"], "doc.pdf");
    assert_eq!(body["message"], "Successfully uploaded and processed doc.pdf");

    assert_eq!(
        h.status().await,
        json!({ "has_file": true, "ready": true, "filename": "doc.pdf" })
    );
    let stored = h.stored_files();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].ends_with("_doc.pdf"));
}

#[tokio::test]
async fn non_pdf_upload_is_rejected_without_side_effects() {
    let h = Harness::new(16 * 1024 * 1024);

    let (status, body) = h.upload("notes.txt", b"plain text").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "success": false, "error": "Only PDF files are allowed" }));
    assert_eq!(h.status().await["ready"], false);
    assert!(h.stored_files().is_empty());
}

#[tokio::test]
async fn oversized_upload_is_rejected_and_session_unchanged() {
    let h = Harness::new(1024);
    h.upload("first.pdf", &pdf_bytes(512)).await;

    let (status, body) = h.upload("big.pdf", &pdf_bytes(2048)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "File too large. Maximum size is 1024 bytes.");

    assert_eq!(h.status().await["filename"], "first.pdf");
    assert_eq!(h.stored_files().len(), 1);
}

#[tokio::test]
async fn twenty_megabyte_upload_hits_the_default_limit() {
    let h = Harness::new(16 * 1024 * 1024);

    let (status, body) = h.upload("huge.pdf", &pdf_bytes(20 * 1024 * 1024)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "File too large. Maximum size is 16MB.");
    assert_eq!(h.status().await["ready"], false);
    assert!(h.stored_files().is_empty());
}

#[tokio::test]
async fn upload_without_file_field_is_rejected() {
    let h = Harness::new(1024);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nvalue\r\n--{BOUNDARY}--\r\n"
        )))
        .unwrap();

    let (status, body) = h.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file selected");
}

#[tokio::test]
async fn chat_before_upload_is_not_ready_and_skips_adapter() {
    let h = Harness::new(1024);

    let (status, body) = h.ask("What is this document about?").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, json!({ "error": "Please upload a PDF file first" }));
    assert!(h.adapter.calls().is_empty());
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let h = Harness::new(1024);
    h.upload("doc.pdf", &pdf_bytes(100)).await;

    let (status, body) = h.ask("   ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Empty message");
    assert!(h.adapter.calls().is_empty());
}

#[tokio::test]
async fn conversation_upload_chat_clear() {
    let h = Harness::new(16 * 1024 * 1024);
    h.upload("doc.pdf", &pdf_bytes(500 * 1024)).await;

    let (status, body) = h.ask("What is this document about?").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "answer to: What is this document about?");
    assert_eq!(body["message"], "What is this document about?");

    let (status, _) = h.ask("Who wrote it?").await;
    assert_eq!(status, StatusCode::OK);

    let calls = h.adapter.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].1.is_empty());
    let prior = &calls[1].1;
    assert_eq!(prior.len(), 2);
    assert_eq!(prior[0].role, Role::User);
    assert_eq!(prior[0].text, "What is this document about?");
    assert_eq!(prior[1].role, Role::Assistant);
    assert_eq!(prior[1].text, "answer to: What is this document about?");
    assert_eq!(h.chat.history().len(), 4);

    let (status, body) = h.clear().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(
        h.status().await,
        json!({ "has_file": false, "ready": false, "filename": "" })
    );
    assert!(h.stored_files().is_empty());
    assert!(h.chat.history().is_empty());

    let (status, _) = h.ask("Still there?").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(h.adapter.calls().len(), 2);
}

#[tokio::test]
async fn failed_answer_leaves_history_unchanged() {
    let h = Harness::new(1024);
    h.upload("doc.pdf", &pdf_bytes(100)).await;
    h.ask("first question").await;
    assert_eq!(h.chat.history().len(), 2);

    h.adapter.fail.store(true, Ordering::SeqCst);
    let (status, body) = h.ask("second question").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("quota exceeded"));
    assert_eq!(h.chat.history().len(), 2);

    h.adapter.fail.store(false, Ordering::SeqCst);
    h.ask("third question").await;
    let history = h.chat.history();
    assert_eq!(history.len(), 4);
    assert_eq!(history[2].text, "third question");
}

#[tokio::test]
async fn greeting_is_answered_locally() {
    let h = Harness::new(1024);
    h.upload("doc.pdf", &pdf_bytes(100)).await;

    let (status, body) = h.ask("Hello").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["response"].as_str().unwrap().starts_with("Hello! I'm your PDF assistant."));
    assert!(h.adapter.calls().is_empty());
    assert_eq!(h.chat.history().len(), 2);
}

#[tokio::test]
async fn second_upload_replaces_document_and_resets_history() {
    let h = Harness::new(1024);
    h.upload("a.pdf", &pdf_bytes(100)).await;
    h.ask("about a?").await;

    let (status, _) = h.upload("b.pdf", &pdf_bytes(100)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.status().await["filename"], "b.pdf");
    assert!(h.chat.history().is_empty());

    let stored = h.stored_files();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].ends_with("_b.pdf"));

    h.ask("about b?").await;
    let calls = h.adapter.calls();
    assert!(calls[1].0.to_string_lossy().ends_with("_b.pdf"));
    assert!(calls[1].1.is_empty());
}

#[tokio::test]
async fn failed_indexing_keeps_previous_document() {
    let h = Harness::new(1024);
    h.upload("good.pdf", &pdf_bytes(100)).await;
    h.ask("question").await;

    h.indexer.fail.store(true, Ordering::SeqCst);
    let (status, body) = h.upload("broken.pdf", &pdf_bytes(100)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Error processing PDF: no extractable text");

    assert_eq!(h.status().await["filename"], "good.pdf");
    assert_eq!(h.chat.history().len(), 2);
    let stored = h.stored_files();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].ends_with("_good.pdf"));
}

#[tokio::test]
async fn clear_when_empty_succeeds() {
    let h = Harness::new(1024);
    let (status, body) = h.clear().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn malformed_chat_body_is_a_client_error() {
    let h = Harness::new(1024);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"msg\": 1}"))
        .unwrap();

    let (status, body) = h.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request"));
}

#[tokio::test]
async fn health_is_ok() {
    let h = Harness::new(1024);
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = h.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn slow_indexing_times_out_and_keeps_previous_document() {
    let h = Harness::with_timeout(16 * 1024 * 1024, Duration::from_millis(200));
    h.upload("first.pdf", &pdf_bytes(64)).await;
    h.ask("what is in here?").await;

    h.indexer.delay_ms.store(2_000, Ordering::SeqCst);
    let (status, body) = h.upload("second.pdf", &pdf_bytes(64)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Error processing PDF: timed out"), "{error}");

    assert_eq!(h.status().await["filename"], "first.pdf");
    assert_eq!(h.chat.history().len(), 2);
    let stored = h.stored_files();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].ends_with("_first.pdf"));
}

#[tokio::test]
async fn slow_answer_times_out_and_leaves_history_unchanged() {
    let h = Harness::with_timeout(16 * 1024 * 1024, Duration::from_millis(200));
    h.upload("doc.pdf", &pdf_bytes(64)).await;
    h.ask("first question").await;
    let before = h.chat.history();

    h.adapter.delay_ms.store(2_000, Ordering::SeqCst);
    let (status, body) = h.ask("second question").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("The assistant did not answer within"));

    let after = h.chat.history();
    assert_eq!(after.len(), before.len());
    assert_eq!(after[0].text, "first question");
}

#[tokio::test]
async fn dropped_upload_leaves_no_file_behind() {
    let h = Harness::new(16 * 1024 * 1024);
    h.indexer.delay_ms.store(3_000, Ordering::SeqCst);

    let abandoned =
        tokio::time::timeout(Duration::from_millis(200), h.chat.upload("doc.pdf", &pdf_bytes(64))).await;
    assert!(abandoned.is_err());

    assert_eq!(h.status().await["ready"], false);
    assert!(h.stored_files().is_empty());
}

#[tokio::test]
async fn dropped_reupload_keeps_previous_document() {
    let h = Harness::new(16 * 1024 * 1024);
    h.upload("first.pdf", &pdf_bytes(64)).await;

    h.indexer.delay_ms.store(3_000, Ordering::SeqCst);
    let abandoned =
        tokio::time::timeout(Duration::from_millis(200), h.chat.upload("second.pdf", &pdf_bytes(64))).await;
    assert!(abandoned.is_err());

    assert_eq!(h.status().await["filename"], "first.pdf");
    let stored = h.stored_files();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].ends_with("_first.pdf"));
}

#[tokio::test]
async fn status_answers_while_chat_is_in_flight_and_clear_waits() {
    let h = Harness::new(16 * 1024 * 1024);
    h.upload("doc.pdf", &pdf_bytes(64)).await;

    let gate = h.adapter.hold();
    let chatting = h.spawn(chat_request("what is in here?"));
    h.adapter.started.notified().await;

    let status = tokio::time::timeout(Duration::from_secs(1), h.status())
        .await
        .expect("status blocked behind an in-flight chat");
    assert_eq!(status["ready"], true);

    let clearing = h.spawn(clear_request());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!clearing.is_finished());
    assert_eq!(h.status().await["ready"], true);

    gate.add_permits(1);
    let (status, body) = chatting.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "answer to: what is in here?");

    let (status, _) = clearing.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.status().await["has_file"], false);
    assert!(h.chat.history().is_empty());
    assert!(h.stored_files().is_empty());
}

#[tokio::test]
async fn upload_waits_for_in_flight_chat() {
    let h = Harness::new(16 * 1024 * 1024);
    h.upload("first.pdf", &pdf_bytes(64)).await;

    let gate = h.adapter.hold();
    let chatting = h.spawn(chat_request("old question"));
    h.adapter.started.notified().await;

    let replacing = h.spawn(upload_request("second.pdf", &pdf_bytes(64)));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!replacing.is_finished());
    assert_eq!(h.status().await["filename"], "first.pdf");

    gate.add_permits(1);
    let (status, _) = chatting.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    let (status, _) = replacing.await.unwrap();
    assert_eq!(status, StatusCode::OK);

    // The chat ran against the old document; the upload then reset history.
    assert!(h.adapter.calls()[0].0.to_string_lossy().ends_with("_first.pdf"));
    assert_eq!(h.status().await["filename"], "second.pdf");
    assert!(h.chat.history().is_empty());
}
