//! End-to-end through a real child process speaking the line protocol.
#![cfg(unix)]

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::{test_config, test_service_with};
use mnemos::embedding::process::{CommandLauncher, EmbedderState, ProcessEmbedder};
use mnemos::embedding::{EmbedTask, Embedder};
use serde_json::json;

/// Replies the way the bundled Python embedding service does, with the same
/// unit vector for every text; batches hold one text.
const SCRIPT: &str = r#"
echo "E5 Embedding Service started" >&2
while IFS= read -r line; do
  case "$line" in
    *'"command":"initialize"'*) echo '{"status": "initialized"}' ;;
    *'"command":"generate_embeddings"'*) echo '{"embeddings": [[1.0, 0.0, 0.0]]}' ;;
    *'"command":"generate_embedding"'*) echo '{"embedding": [1.0, 0.0, 0.0]}' ;;
    *) echo '{"error": "Unknown command"}' ;;
  esac
done
"#;

fn shell_embedder() -> ProcessEmbedder {
    let launcher = CommandLauncher::new("sh", &["-c".to_string(), SCRIPT.to_string()]);
    ProcessEmbedder::new(
        Box::new(launcher),
        "unit-vector",
        Duration::from_secs(10),
        Duration::from_secs(10),
    )
}

#[tokio::test]
async fn child_process_starts_lazily_and_stops_on_shutdown() {
    let embedder = shell_embedder();
    assert_eq!(embedder.state(), EmbedderState::Uninitialized);

    let v = embedder.embed("hello", EmbedTask::Query).await.unwrap();
    assert_eq!(v, vec![1.0, 0.0, 0.0]);
    assert_eq!(embedder.state(), EmbedderState::Ready);

    let batch = embedder.embed_batch(&["one".to_string()], false).await.unwrap();
    assert_eq!(batch, vec![vec![1.0, 0.0, 0.0]]);

    embedder.shutdown(Duration::from_secs(2)).await;
    assert_eq!(embedder.state(), EmbedderState::Uninitialized);
}

#[tokio::test]
async fn service_indexes_and_searches_through_the_process() {
    let embedder: Arc<dyn Embedder> = Arc::new(shell_embedder());
    let svc = test_service_with(Some(embedder), test_config());

    svc.store("ns", "k", json!("short value")).await.unwrap();
    let hits = svc.semantic_search("ns", "anything", None, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].value, json!("short value"));

    svc.shutdown(Duration::from_secs(2)).await;
}
