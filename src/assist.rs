//! Single assistant turn with ticket-search capability dispatch.
//!
//! Advertises the `search_tickets` capability to the completion service.
//! The service's answer comes back as a tagged variant: a plain reply is
//! returned as-is, while an invocation request is serviced by running
//! retrieval and feeding ticket summaries back into the conversation for a
//! final grounded reply.

use std::sync::Arc;

use crate::completion::{ChatMessage, CompletionApi, CompletionReply, OpenAiCompletion};
use crate::config::Config;
use crate::embedding::{Embedder, OpenAiEmbedder};
use crate::error::{Result, TriageError};
use crate::models::TicketHit;
use crate::store::{VectorStore, TICKETS};

/// Name of the ticket-search capability.
pub const SEARCH_TICKETS: &str = "search_tickets";

const SYSTEM_PROMPT: &str = "You answer questions about equipment-repair support tickets. \
     Use the search_tickets capability to look up relevant past tickets before answering \
     questions about issues.";

const NO_TICKETS_REPLY: &str = "No relevant support tickets found. Please provide more details.";

/// Capability schema advertised to the completion service.
pub fn capability_schema() -> serde_json::Value {
    serde_json::json!([{
        "type": "function",
        "function": {
            "name": SEARCH_TICKETS,
            "description": "Search for relevant support tickets by similarity over past cases.",
            "parameters": {
                "type": "object",
                "properties": {
                    "issue_description": {
                        "type": "string",
                        "description": "Description of the issue."
                    },
                    "serial_number": {
                        "type": "string",
                        "description": "Serial number of the machine (optional)."
                    }
                },
                "required": ["issue_description"]
            }
        }
    }])
}

/// Runs one assistant turn, servicing at most one capability invocation.
pub struct Assistant {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    completion: Arc<dyn CompletionApi>,
    top_k: usize,
}

impl Assistant {
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

    /// Answer the user's question, grounding in past tickets when the
    /// completion service requests the search capability.
    pub async fn respond(&self, user_text: &str) -> Result<String> {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(user_text),
        ];

        match self
            .completion
            .complete_with_tools(&messages, &capability_schema())
            .await?
        {
            CompletionReply::Message(text) => Ok(text),
            CompletionReply::Invoke { name, arguments } if name == SEARCH_TICKETS => {
                self.answer_with_tickets(messages, &arguments).await
            }
            CompletionReply::Invoke { name, .. } => {
                tracing::warn!(capability = %name, "completion requested an unknown capability");
                Ok(format!(
                    "The assistant requested an unsupported capability ('{}').",
                    name
                ))
            }
        }
    }

    async fn answer_with_tickets(
        &self,
        mut messages: Vec<ChatMessage>,
        arguments: &serde_json::Value,
    ) -> Result<String> {
        let issue = arguments
            .get("issue_description")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                TriageError::CompletionParse(
                    "search_tickets invocation is missing issue_description".to_string(),
                )
            })?;

        let mut query = issue.to_string();
        if let Some(serial) = arguments.get("serial_number").and_then(|v| v.as_str()) {
            if !serial.is_empty() {
                query.push_str(&format!(" Serial Number: {}", serial));
            }
        }

        let embedding = self.embedder.embed(&query).await?;
        let hits = self.store.search_tickets(&embedding, self.top_k).await?;

        if hits.is_empty() {
            return Ok(NO_TICKETS_REPLY.to_string());
        }

        let summaries = format_ticket_summaries(&hits);
        messages.push(ChatMessage::assistant(format!(
            "Invoking {} for: {}",
            SEARCH_TICKETS, query
        )));
        messages.push(ChatMessage::user(format!(
            "search_tickets returned these past tickets:\n\n{}Answer the original question \
             using these past cases.",
            summaries
        )));

        self.completion.complete(&messages).await
    }
}

/// Ticket summaries fed back into the conversation after an invocation.
pub fn format_ticket_summaries(hits: &[TicketHit]) -> String {
    let mut out = String::new();
    for hit in hits {
        out.push_str(&format!(
            "Ticket {} | {}\nIssue: {}\nResolution: {}\nRoot Cause: {}\n\n",
            hit.ticket.ticket_id,
            hit.ticket.machine_model,
            hit.ticket.issue_description,
            hit.ticket.resolution_solution,
            hit.ticket.root_cause
        ));
    }
    out
}

pub async fn run_ask(config: &Config, question: &str) -> anyhow::Result<()> {
    if question.trim().is_empty() {
        anyhow::bail!("question must not be empty");
    }

    let store = Arc::new(VectorStore::open(config).await?);
    store.load(TICKETS).await?;

    let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(&config.embedding)?);
    let completion: Arc<dyn CompletionApi> = Arc::new(OpenAiCompletion::new(&config.completion)?);
    let assistant = Assistant::new(store.clone(), embedder, completion, config.retrieval.top_k);

    let reply = assistant.respond(question).await?;
    println!("{}", reply);

    store.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Ticket;
    use chrono::NaiveDateTime;

    #[test]
    fn capability_schema_names_required_parameter() {
        let schema = capability_schema();
        let function = &schema[0]["function"];
        assert_eq!(function["name"], SEARCH_TICKETS);
        assert_eq!(function["parameters"]["required"][0], "issue_description");
    }

    #[test]
    fn summaries_include_resolution_and_root_cause() {
        let hits = vec![TicketHit {
            ticket: Ticket {
                ticket_id: "T-7".to_string(),
                machine_model: "LATHE-2".to_string(),
                serial_number: String::new(),
                issue_description: "chuck slipping".to_string(),
                affected_components: Vec::new(),
                customer: String::new(),
                reported_date: NaiveDateTime::parse_from_str(
                    "2024-03-14 09:30",
                    "%Y-%m-%d %H:%M",
                )
                .unwrap(),
                priority: String::new(),
                status: String::new(),
                resolution_solution: "re-torqued jaws".to_string(),
                root_cause: "worn scroll plate".to_string(),
                resolution_date: None,
                technician: String::new(),
            },
            distance: 0.2,
        }];
        let text = format_ticket_summaries(&hits);
        assert!(text.contains("Ticket T-7 | LATHE-2"));
        assert!(text.contains("Resolution: re-torqued jaws"));
        assert!(text.contains("Root Cause: worn scroll plate"));
    }
}
