use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

use ticket_triage::completion::{ChatMessage, CompletionApi, CompletionReply};
use ticket_triage::config::{
    CompletionConfig, Config, DbConfig, EmbeddingConfig, IndexConfig, IngestConfig,
    RetrievalConfig, ServerConfig,
};
use ticket_triage::embedding::Embedder;
use ticket_triage::error::Result as TriageResult;
use ticket_triage::ingest;
use ticket_triage::rag::RagEngine;
use ticket_triage::store::{VectorStore, TICKETS};

const DIMS: usize = 256;

// ============ Stub clients ============

/// Deterministic bag-of-words embedder standing in for the live service.
/// Texts sharing tokens land closer together, so similarity is loosely
/// semantic without any network calls.
struct StubEmbedder;

fn token_bucket(token: &str) -> usize {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % DIMS
}

#[async_trait::async_trait]
impl Embedder for StubEmbedder {
    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, texts: &[String]) -> TriageResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; DIMS];
                for token in text.to_lowercase().split_whitespace() {
                    v[token_bucket(token)] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Completion stub that always returns a fixed reply.
struct StubCompletion {
    reply: String,
}

#[async_trait::async_trait]
impl CompletionApi for StubCompletion {
    async fn complete(&self, _messages: &[ChatMessage]) -> TriageResult<String> {
        Ok(self.reply.clone())
    }

    async fn complete_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: &serde_json::Value,
    ) -> TriageResult<CompletionReply> {
        Ok(CompletionReply::Message(self.reply.clone()))
    }
}

/// Completion stub that must never be reached.
struct UnreachableCompletion;

#[async_trait::async_trait]
impl CompletionApi for UnreachableCompletion {
    async fn complete(&self, _messages: &[ChatMessage]) -> TriageResult<String> {
        panic!("completion service must not be called");
    }

    async fn complete_with_tools(
        &self,
        _messages: &[ChatMessage],
        _tools: &serde_json::Value,
    ) -> TriageResult<CompletionReply> {
        panic!("completion service must not be called");
    }
}

// ============ Helpers ============

fn test_config(dir: &Path) -> Config {
    Config {
        db: DbConfig {
            path: dir.join("data/triage.sqlite"),
        },
        embedding: EmbeddingConfig {
            dims: DIMS,
            ..Default::default()
        },
        completion: CompletionConfig::default(),
        retrieval: RetrievalConfig::default(),
        index: IndexConfig {
            nlist: 4,
            nprobe: 4,
        },
        ingest: IngestConfig::default(),
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
        log_level: "info".to_string(),
    }
}

const KB_JSON: &str = r#"
{
    "tickets": [
        {
            "ticketID": "T1",
            "machineModel": "MILL-001",
            "serialNumber": "SN-100",
            "issueDescription": "motor overheating",
            "affectedComponents": ["motor", "bearing"],
            "customer": "Acme",
            "reportedDate": "2024-03-14 09:30",
            "priority": "High",
            "status": "Resolved",
            "resolutionSolution": "replaced bearing",
            "rootCause": "bearing wear",
            "resolutionDate": "2024-03-15 14:00",
            "technician": "J. Ortiz"
        },
        {
            "ticketID": "T2",
            "machineModel": "PRESS-7",
            "serialNumber": "SN-200",
            "issueDescription": "hydraulic pressure dropping rapidly",
            "affectedComponents": ["pump"],
            "customer": "Borealis",
            "reportedDate": "2024-04-02 11:00",
            "priority": "Medium",
            "status": "Resolved",
            "resolutionSolution": "resealed pump housing",
            "rootCause": "cracked seal",
            "resolutionDate": "2024-04-03 16:30",
            "technician": "L. Webb"
        },
        {
            "ticketID": "T3",
            "machineModel": "LATHE-2",
            "serialNumber": "SN-300",
            "issueDescription": "control panel screen flickering",
            "affectedComponents": ["display"],
            "customer": "Corvid",
            "reportedDate": "2024-05-20 08:15",
            "priority": "Low",
            "status": "Open"
        }
    ]
}
"#;

async fn populated_store(dir: &Path) -> VectorStore {
    let store = VectorStore::open(&test_config(dir)).await.unwrap();
    let tickets = ingest::parse_tickets(KB_JSON).unwrap();
    ingest::ingest_tickets(&store, &StubEmbedder, &tickets, 100, false)
        .await
        .unwrap();
    store.load(TICKETS).await.unwrap();
    store
}

// ============ Binary tests ============

fn triage_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("triage");
    path
}

fn setup_binary_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/triage.sqlite"

[server]
bind = "127.0.0.1:7431"
"#,
        root.display()
    );

    let config_path = config_dir.join("triage.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_triage(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = triage_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run triage binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_binary_env();

    let (stdout, stderr, success) = run_triage(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/triage.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_binary_env();

    let (_, _, success1) = run_triage(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_triage(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let bogus = tmp.path().join("nope.toml");
    let (_, stderr, success) = run_triage(&bogus, &["init"]);
    assert!(!success);
    assert!(stderr.contains("config"));
}

// ============ Pipeline tests ============

#[tokio::test]
async fn stub_embedder_returns_configured_dimension() {
    let vectors = StubEmbedder
        .embed_batch(&["motor running hot".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors.len(), 1);
    assert_eq!(vectors[0].len(), DIMS);
}

#[tokio::test]
async fn similar_ticket_is_retrieved_in_top_results() {
    let tmp = TempDir::new().unwrap();
    let store = populated_store(tmp.path()).await;

    let query = StubEmbedder.embed("motor running hot").await.unwrap();
    let hits = store.search_tickets(&query, 3).await.unwrap();

    assert!(!hits.is_empty());
    let ids: Vec<&str> = hits.iter().map(|h| h.ticket.ticket_id.as_str()).collect();
    assert!(ids.contains(&"T1"), "expected T1 in top-3, got {:?}", ids);
    // The overlapping "motor" token makes T1 the nearest case.
    assert_eq!(hits[0].ticket.ticket_id, "T1");
    for pair in hits.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[tokio::test]
async fn list_fields_round_trip_through_the_store() {
    let tmp = TempDir::new().unwrap();
    let store = populated_store(tmp.path()).await;

    let query = StubEmbedder.embed("motor overheating").await.unwrap();
    let hits = store.search_tickets(&query, 1).await.unwrap();
    assert_eq!(
        hits[0].ticket.affected_components,
        vec!["motor".to_string(), "bearing".to_string()]
    );
}

#[tokio::test]
async fn diagnose_grounds_in_retrieved_cases() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(populated_store(tmp.path()).await);

    let reply = r#"{"summary": "Motor overheats under load", "suggested_fix": "Replace the worn bearing", "confidence": 0.8, "source_case": "T1"}"#;
    let engine = RagEngine::new(
        store.clone(),
        Arc::new(StubEmbedder),
        Arc::new(StubCompletion {
            reply: reply.to_string(),
        }),
        3,
    );

    let diagnosis = engine.diagnose("motor running hot").await.unwrap();
    assert_eq!(diagnosis.summary, "Motor overheats under load");
    assert_eq!(diagnosis.suggested_fix, "Replace the worn bearing");
    assert_eq!(diagnosis.confidence, 0.8);
    assert_eq!(diagnosis.source_case, "T1");
}

#[tokio::test]
async fn zero_hits_short_circuit_without_completion_call() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(VectorStore::open(&test_config(tmp.path())).await.unwrap());
    store.load(TICKETS).await.unwrap();

    let engine = RagEngine::new(
        store.clone(),
        Arc::new(StubEmbedder),
        Arc::new(UnreachableCompletion),
        3,
    );

    let diagnosis = engine.diagnose("motor running hot").await.unwrap();
    assert_eq!(diagnosis.confidence, 0.0);
    assert_eq!(diagnosis.source_case, "");
    assert!(!diagnosis.summary.is_empty());
}

#[tokio::test]
async fn malformed_completion_reply_degrades_to_defaults() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(populated_store(tmp.path()).await);

    let engine = RagEngine::new(
        store.clone(),
        Arc::new(StubEmbedder),
        Arc::new(StubCompletion {
            reply: "I cannot help with that.".to_string(),
        }),
        3,
    );

    let diagnosis = engine.diagnose("motor running hot").await.unwrap();
    assert_eq!(diagnosis.summary, "");
    assert_eq!(diagnosis.confidence, 0.0);
    assert_eq!(diagnosis.source_case, "");
}
