//! Core record types flowing through the ingestion and retrieval pipeline.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A historical equipment-repair ticket.
///
/// Immutable once stored; the embedding is derived at ingestion time and
/// never recomputed unless the record is re-ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: String,
    pub machine_model: String,
    pub serial_number: String,
    pub issue_description: String,
    pub affected_components: Vec<String>,
    pub customer: String,
    pub reported_date: NaiveDateTime,
    pub priority: String,
    pub status: String,
    /// Empty until the ticket is resolved.
    pub resolution_solution: String,
    pub root_cause: String,
    pub resolution_date: Option<NaiveDateTime>,
    pub technician: String,
}

impl Ticket {
    /// The text chunk the ticket's embedding is derived from.
    ///
    /// By default the issue description alone; with `include_resolution`,
    /// a resolved ticket also contributes its resolution text.
    pub fn embedding_text(&self, include_resolution: bool) -> String {
        if include_resolution && !self.resolution_solution.is_empty() {
            format!(
                "Issue: {}\nResolution: {}",
                self.issue_description, self.resolution_solution
            )
        } else {
            self.issue_description.clone()
        }
    }
}

/// A team member's skill profile, embedded into the same vector space as
/// tickets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub employee_id: String,
    pub name: String,
    pub role: String,
    pub skills: Vec<String>,
    pub certifications: Vec<String>,
    pub resolved_issues: Vec<String>,
    pub experience_years: i64,
    pub region: String,
}

impl TeamMember {
    /// The composed profile text the member's embedding is derived from.
    pub fn profile_text(&self) -> String {
        format!(
            "{} - {}\nSkills: {}\nCertifications: {}\nResolved Issues: {}",
            self.name,
            self.role,
            self.skills.join(", "),
            self.certifications.join(", "),
            self.resolved_issues.join(", ")
        )
    }
}

/// A ticket returned from similarity search with its squared Euclidean
/// distance to the query vector.
#[derive(Debug, Clone, Serialize)]
pub struct TicketHit {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub distance: f32,
}

/// A team member returned from similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct TeamMemberHit {
    #[serde(flatten)]
    pub member: TeamMember,
    pub distance: f32,
}

/// Structured diagnosis produced by the retrieval engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub summary: String,
    pub suggested_fix: String,
    /// In `[0.0, 1.0]`; `0.0` when no similar cases were found.
    pub confidence: f64,
    /// Ticket reference of the most relevant past case, empty when none.
    pub source_case: String,
}

/// Feedback on an AI suggestion, persisted for later review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub ticket_id: String,
    pub feedback_score: i64,
    #[serde(default)]
    pub feedback_text: Option<String>,
    #[serde(default)]
    pub suggested_improvements: Option<String>,
}
