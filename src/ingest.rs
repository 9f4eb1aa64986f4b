//! Batch ingestion of ticket and team-member knowledge.
//!
//! Reads JSON arrays, normalizes the source's camelCase field names into
//! the canonical schema, validates required fields, generates one embedding
//! per record, and inserts in fixed-size batches. A record missing
//! `ticketID` or `issueDescription` aborts the whole batch with a
//! [`TriageError::Schema`] error; a resolved ticket missing its
//! `resolutionDate` is tolerated and stored with the absent value.

use chrono::NaiveDateTime;
use serde::Deserialize;
use std::path::Path;

use crate::config::Config;
use crate::embedding::{Embedder, OpenAiEmbedder};
use crate::error::{Result, TriageError};
use crate::models::{TeamMember, Ticket};
use crate::store::VectorStore;

// Timestamp format used by the ticket source files.
const SOURCE_DATE_FMT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTicket {
    #[serde(rename = "ticketID", default)]
    ticket_id: Option<String>,
    #[serde(default)]
    machine_model: Option<String>,
    #[serde(default)]
    serial_number: Option<String>,
    #[serde(default)]
    issue_description: Option<String>,
    #[serde(default)]
    affected_components: Option<Vec<String>>,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    reported_date: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    resolution_solution: Option<String>,
    #[serde(default)]
    root_cause: Option<String>,
    #[serde(default)]
    resolution_date: Option<String>,
    #[serde(default)]
    technician: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTeamMember {
    #[serde(default)]
    employee_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    skills: Option<Vec<String>>,
    #[serde(default)]
    certifications: Option<Vec<String>>,
    #[serde(default)]
    resolved_issues: Option<Vec<String>>,
    #[serde(default)]
    experience_years: Option<i64>,
    #[serde(default)]
    region: Option<String>,
}

fn parse_source_date(s: &str, field: &str, position: usize) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, SOURCE_DATE_FMT).map_err(|e| {
        TriageError::Schema(format!(
            "ticket at position {}: invalid {} '{}': {}",
            position, field, s, e
        ))
    })
}

fn normalize_ticket(raw: RawTicket, position: usize) -> Result<Ticket> {
    let ticket_id = raw
        .ticket_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            TriageError::Schema(format!("ticket at position {} is missing ticketID", position))
        })?;

    let issue_description = raw
        .issue_description
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            TriageError::Schema(format!(
                "ticket '{}' is missing issueDescription",
                ticket_id
            ))
        })?;

    let reported_raw = raw.reported_date.ok_or_else(|| {
        TriageError::Schema(format!("ticket '{}' is missing reportedDate", ticket_id))
    })?;
    let reported_date = parse_source_date(&reported_raw, "reportedDate", position)?;

    // A resolved ticket missing resolutionDate keeps the absent value.
    let resolution_date = raw
        .resolution_date
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_source_date(&s, "resolutionDate", position))
        .transpose()?;

    if let Some(resolved) = resolution_date {
        if resolved < reported_date {
            return Err(TriageError::Schema(format!(
                "ticket '{}': resolutionDate precedes reportedDate",
                ticket_id
            )));
        }
    }

    Ok(Ticket {
        ticket_id,
        machine_model: raw.machine_model.unwrap_or_default(),
        serial_number: raw.serial_number.unwrap_or_default(),
        issue_description,
        affected_components: raw.affected_components.unwrap_or_default(),
        customer: raw.customer.unwrap_or_default(),
        reported_date,
        priority: raw.priority.unwrap_or_default(),
        status: raw.status.unwrap_or_default(),
        resolution_solution: raw.resolution_solution.unwrap_or_default(),
        root_cause: raw.root_cause.unwrap_or_default(),
        resolution_date,
        technician: raw.technician.unwrap_or_default(),
    })
}

fn normalize_member(raw: RawTeamMember, position: usize) -> Result<TeamMember> {
    let employee_id = raw
        .employee_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            TriageError::Schema(format!(
                "team member at position {} is missing employee_id",
                position
            ))
        })?;

    let experience_years = raw.experience_years.unwrap_or(0);
    if experience_years < 0 {
        return Err(TriageError::Schema(format!(
            "team member '{}': experience_years must be non-negative",
            employee_id
        )));
    }

    Ok(TeamMember {
        employee_id,
        name: raw.name.unwrap_or_default(),
        role: raw.role.unwrap_or_default(),
        skills: raw.skills.unwrap_or_default(),
        certifications: raw.certifications.unwrap_or_default(),
        resolved_issues: raw.resolved_issues.unwrap_or_default(),
        experience_years,
        region: raw.region.unwrap_or_default(),
    })
}

/// Parse a tickets document: either a bare array or `{"tickets": [...]}`.
pub fn parse_tickets_json(value: &serde_json::Value) -> Result<Vec<Ticket>> {
    let list = match value.get("tickets") {
        Some(inner) => inner,
        None => value,
    };
    let raw: Vec<RawTicket> = serde_json::from_value(list.clone()).map_err(|e| {
        TriageError::Schema(format!(
            "expected an array of tickets or a {{\"tickets\": [...]}} object: {}",
            e
        ))
    })?;

    raw.into_iter()
        .enumerate()
        .map(|(i, r)| normalize_ticket(r, i))
        .collect()
}

/// Parse a team document: either a bare array or `{"team_members": [...]}`.
pub fn parse_team_json(value: &serde_json::Value) -> Result<Vec<TeamMember>> {
    let list = match value.get("team_members") {
        Some(inner) => inner,
        None => value,
    };
    let raw: Vec<RawTeamMember> = serde_json::from_value(list.clone()).map_err(|e| {
        TriageError::Schema(format!("expected an array of team members: {}", e))
    })?;

    raw.into_iter()
        .enumerate()
        .map(|(i, r)| normalize_member(r, i))
        .collect()
}

pub fn parse_tickets(content: &str) -> Result<Vec<Ticket>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    parse_tickets_json(&value)
}

pub fn parse_team(content: &str) -> Result<Vec<TeamMember>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    parse_team_json(&value)
}

pub fn load_tickets(path: &Path) -> Result<Vec<Ticket>> {
    parse_tickets(&std::fs::read_to_string(path)?)
}

pub fn load_team(path: &Path) -> Result<Vec<TeamMember>> {
    parse_team(&std::fs::read_to_string(path)?)
}

/// Embed and insert tickets in fixed-size batches, one batched embedding
/// call per batch. Batches are not transactional: a failure mid-run leaves
/// prior batches inserted, which the caller reports.
pub async fn ingest_tickets(
    store: &VectorStore,
    embedder: &dyn Embedder,
    tickets: &[Ticket],
    batch_size: usize,
    embed_resolution: bool,
) -> Result<u64> {
    let mut inserted = 0u64;
    for batch in tickets.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch
            .iter()
            .map(|t| t.embedding_text(embed_resolution))
            .collect();
        let vectors = embedder.embed_batch(&texts).await?;
        for (ticket, vector) in batch.iter().zip(vectors.iter()) {
            store.insert_ticket(ticket, vector).await?;
            inserted += 1;
        }
        tracing::debug!(batch = batch.len(), total = inserted, "ticket batch inserted");
    }
    Ok(inserted)
}

/// Embed and insert team members in fixed-size batches.
pub async fn ingest_team(
    store: &VectorStore,
    embedder: &dyn Embedder,
    members: &[TeamMember],
    batch_size: usize,
) -> Result<u64> {
    let mut inserted = 0u64;
    for batch in members.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|m| m.profile_text()).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        for (member, vector) in batch.iter().zip(vectors.iter()) {
            store.insert_team_member(member, vector).await?;
            inserted += 1;
        }
        tracing::debug!(batch = batch.len(), total = inserted, "team batch inserted");
    }
    Ok(inserted)
}

pub async fn run_ingest_tickets(config: &Config, file: &Path) -> anyhow::Result<()> {
    let tickets = load_tickets(file)?;
    let store = VectorStore::open(config).await?;
    let embedder = OpenAiEmbedder::new(&config.embedding)?;

    let inserted = ingest_tickets(
        &store,
        &embedder,
        &tickets,
        config.embedding.batch_size,
        config.ingest.embed_resolution,
    )
    .await?;

    println!("ingest tickets");
    println!("  records parsed: {}", tickets.len());
    println!("  inserted: {}", inserted);
    println!("ok");

    store.close().await;
    Ok(())
}

pub async fn run_ingest_team(config: &Config, file: &Path) -> anyhow::Result<()> {
    let members = load_team(file)?;
    let store = VectorStore::open(config).await?;
    let embedder = OpenAiEmbedder::new(&config.embedding)?;

    let inserted = ingest_team(&store, &embedder, &members, config.embedding.batch_size).await?;

    println!("ingest team");
    println!("  records parsed: {}", members.len());
    println!("  inserted: {}", inserted);
    println!("ok");

    store.close().await;
    Ok(())
}
