//! Retrieval-augmented diagnosis engine.
//!
//! Embeds a free-text issue, retrieves the nearest past tickets, assembles
//! a context block, and asks the completion service for a structured
//! diagnosis. The reply is requested as JSON and parsed with an explicit
//! fallback chain — strict JSON, then labeled lines, then per-field
//! defaults — so a malformed reply degrades instead of failing the caller.

use std::sync::Arc;

use crate::completion::{ChatMessage, CompletionApi, OpenAiCompletion};
use crate::config::Config;
use crate::embedding::{Embedder, OpenAiEmbedder};
use crate::error::Result;
use crate::models::{Diagnosis, TicketHit};
use crate::store::{VectorStore, TICKETS};

const SYSTEM_PROMPT: &str = "You are a helpful field service engineer assistant.";

const NO_SIMILAR_CASES: &str = "No similar past cases were found for this issue.";

/// Transforms a free-text issue description into a grounded diagnostic
/// suggestion. All collaborators are injected; there is no process-wide
/// client state.
pub struct RagEngine {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    completion: Arc<dyn CompletionApi>,
    top_k: usize,
}

impl RagEngine {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        completion: Arc<dyn CompletionApi>,
        top_k: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            completion,
            top_k,
        }
    }

    /// Produce a diagnosis for the issue, grounded in the nearest past
    /// tickets.
    ///
    /// With zero retrieval hits the engine short-circuits to a well-formed
    /// response (`confidence = 0.0`, empty `source_case`) without calling
    /// the completion service.
    pub async fn diagnose(&self, issue_text: &str) -> Result<Diagnosis> {
        let embedding = self.embedder.embed(issue_text).await?;
        let hits = self.store.search_tickets(&embedding, self.top_k).await?;

        if hits.is_empty() {
            tracing::info!("no similar tickets found; returning canned diagnosis");
            return Ok(Diagnosis {
                summary: NO_SIMILAR_CASES.to_string(),
                suggested_fix: String::new(),
                confidence: 0.0,
                source_case: String::new(),
            });
        }

        let context = build_context(&hits);
        let prompt = build_prompt(issue_text, &context);
        let content = self
            .completion
            .complete(&[
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(prompt),
            ])
            .await?;

        Ok(parse_diagnosis(&content))
    }
}

/// Concatenate retrieved tickets, in ascending-distance order, into the
/// context block inserted into the prompt.
fn build_context(hits: &[TicketHit]) -> String {
    let mut context = String::from("Similar past issues and their solutions:\n\n");
    for hit in hits {
        context.push_str(&format!("Issue: {}\n", hit.ticket.issue_description));
        context.push_str(&format!("Solution: {}\n", hit.ticket.resolution_solution));
        context.push_str(&format!("Root Cause: {}\n\n", hit.ticket.root_cause));
    }
    context
}

fn build_prompt(issue_text: &str, context: &str) -> String {
    format!(
        "Analyze the following issue and provide a solution based on similar past cases.\n\n\
         Current Issue:\n{}\n\n{}\
         Reply with a single JSON object with exactly these fields:\n\
         {{\"summary\": \"one-line summary of the issue\",\n \
         \"suggested_fix\": \"suggested solution based on similar cases\",\n \
         \"confidence\": 0.0,\n \
         \"source_case\": \"ticket ID of the most relevant past case\"}}\n\
         The confidence must be a number between 0 and 1.",
        issue_text, context
    )
}

/// Parse a completion reply into a [`Diagnosis`], degrading to defaults.
///
/// Tries strict JSON first (with markdown code fences stripped), then a
/// labeled `"field: value"` line scan. Unrecognized content yields empty
/// fields and `0.0` confidence; confidence is always clamped to `[0, 1]`.
pub fn parse_diagnosis(content: &str) -> Diagnosis {
    if let Some(diagnosis) = parse_json_diagnosis(content) {
        return diagnosis;
    }

    let diagnosis = parse_labeled_lines(content);
    if diagnosis == Diagnosis::default() {
        tracing::warn!("completion reply did not match the diagnosis schema; returning defaults");
    }
    diagnosis
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") and the closing fence.
    let rest = rest.split_once('\n').map(|(_, r)| r).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_json_diagnosis(content: &str) -> Option<Diagnosis> {
    let value: serde_json::Value = serde_json::from_str(strip_code_fence(content)).ok()?;
    let obj = value.as_object()?;

    let field = |name: &str| {
        obj.get(name)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };

    Some(Diagnosis {
        summary: field("summary"),
        suggested_fix: field("suggested_fix"),
        confidence: clamp_confidence(confidence_value(obj.get("confidence"))),
        source_case: field("source_case"),
    })
}

fn confidence_value(value: Option<&serde_json::Value>) -> f64 {
    value
        .and_then(|v| {
            v.as_f64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        })
        .unwrap_or(0.0)
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn parse_labeled_lines(content: &str) -> Diagnosis {
    let mut diagnosis = Diagnosis::default();

    for line in content.lines() {
        let line = line
            .trim()
            .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
            .trim();
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let label = label.trim().to_ascii_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        if label.contains("summary") && diagnosis.summary.is_empty() {
            diagnosis.summary = value.to_string();
        } else if (label.contains("fix") || label.contains("solution"))
            && diagnosis.suggested_fix.is_empty()
        {
            diagnosis.suggested_fix = value.to_string();
        } else if label.contains("confidence") && diagnosis.confidence == 0.0 {
            diagnosis.confidence = clamp_confidence(value.parse().unwrap_or(0.0));
        } else if (label.contains("source") || label.contains("case") || label.contains("reference"))
            && diagnosis.source_case.is_empty()
        {
            diagnosis.source_case = value.to_string();
        }
    }

    diagnosis
}

pub async fn run_diagnose(config: &Config, issue: &str, k: Option<usize>) -> anyhow::Result<()> {
    if issue.trim().is_empty() {
        anyhow::bail!("issue description must not be empty");
    }

    let store = Arc::new(VectorStore::open(config).await?);
    store.load(TICKETS).await?;

    let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(&config.embedding)?);
    let completion: Arc<dyn CompletionApi> = Arc::new(OpenAiCompletion::new(&config.completion)?);
    let engine = RagEngine::new(
        store.clone(),
        embedder,
        completion,
        k.unwrap_or(config.retrieval.top_k),
    );

    let diagnosis = engine.diagnose(issue).await?;

    println!("summary: {}", diagnosis.summary);
    println!("suggested fix: {}", diagnosis.suggested_fix);
    println!("confidence: {:.2}", diagnosis.confidence);
    println!("source case: {}", diagnosis.source_case);

    store.close().await;
    Ok(())
}
