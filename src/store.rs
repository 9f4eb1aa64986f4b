//! SQLite-backed vector store for the ticket and team-knowledge collections.
//!
//! Records live in SQLite with their embeddings as BLOB columns; similarity
//! search runs against an in-memory IVF index built per collection by
//! [`VectorStore::load`]. Searching a collection that has not been loaded is
//! a precondition violation and fails with
//! [`TriageError::CollectionNotReady`], never an empty result.

use chrono::NaiveDateTime;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{Result, TriageError};
use crate::index::IvfIndex;
use crate::migrate;
use crate::models::{Feedback, TeamMember, TeamMemberHit, Ticket, TicketHit};

/// Name of the tickets collection.
pub const TICKETS: &str = "tickets";
/// Name of the team-knowledge collection.
pub const TEAM_KNOWLEDGE: &str = "team_knowledge";

// Stored timestamp format; minute-level source precision is preserved.
const DATE_FMT: &str = "%Y-%m-%dT%H:%M:%S";

/// Owns the two collections, their schemas, and their IVF indexes.
///
/// Collections are append-only. The pool handles concurrent reads; index
/// state sits behind an async `RwLock` that is write-locked only by `load`
/// and inserts.
pub struct VectorStore {
    pool: SqlitePool,
    dim: usize,
    nlist: usize,
    nprobe: usize,
    indexes: RwLock<HashMap<&'static str, IvfIndex>>,
}

impl VectorStore {
    /// Open the store, creating collection tables if absent.
    ///
    /// Fails fast with [`TriageError::Connection`] when the database cannot
    /// be reached — callers must not partially proceed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::ensure_schema(&pool).await?;
        Ok(Self {
            pool,
            dim: config.embedding.dims,
            nlist: config.index.nlist,
            nprobe: config.index.nprobe,
            indexes: RwLock::new(HashMap::new()),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn collection_table(name: &str) -> Result<&'static str> {
        match name {
            TICKETS => Ok(TICKETS),
            TEAM_KNOWLEDGE => Ok(TEAM_KNOWLEDGE),
            other => Err(TriageError::Schema(format!(
                "unknown collection: {}",
                other
            ))),
        }
    }

    /// Build the collection's IVF index from stored vectors and mark it
    /// query-ready. Idempotent; returns the number of indexed records.
    pub async fn load(&self, collection: &str) -> Result<usize> {
        let table = Self::collection_table(collection)?;

        {
            let indexes = self.indexes.read().await;
            if let Some(index) = indexes.get(table) {
                return Ok(index.len());
            }
        }

        let rows = sqlx::query(&format!("SELECT id, embedding FROM {}", table))
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            entries.push((id, blob_to_vec(&blob)));
        }

        let count = entries.len();
        let index = IvfIndex::build(self.dim, entries, self.nlist);
        self.indexes.write().await.insert(table, index);
        tracing::debug!(collection = table, records = count, "collection loaded");
        Ok(count)
    }

    /// Load every collection into a query-ready state.
    pub async fn load_all(&self) -> Result<()> {
        self.load(TICKETS).await?;
        self.load(TEAM_KNOWLEDGE).await?;
        Ok(())
    }

    fn check_dim(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(TriageError::Schema(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dim,
                vector.len()
            )));
        }
        Ok(())
    }

    /// Append one ticket with its embedding.
    ///
    /// Duplicate `ticket_id`s surface as the store's uniqueness error. If
    /// the collection is already loaded, the vector is also assigned to its
    /// nearest partition so the record is immediately searchable.
    pub async fn insert_ticket(&self, ticket: &Ticket, embedding: &[f32]) -> Result<String> {
        self.check_dim(embedding)?;
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO tickets (id, ticket_id, machine_model, serial_number, issue_description,
                affected_components, customer, reported_date, priority, status,
                resolution_solution, root_cause, resolution_date, technician, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&ticket.ticket_id)
        .bind(&ticket.machine_model)
        .bind(&ticket.serial_number)
        .bind(&ticket.issue_description)
        .bind(serde_json::to_string(&ticket.affected_components)?)
        .bind(&ticket.customer)
        .bind(ticket.reported_date.format(DATE_FMT).to_string())
        .bind(&ticket.priority)
        .bind(&ticket.status)
        .bind(&ticket.resolution_solution)
        .bind(&ticket.root_cause)
        .bind(
            ticket
                .resolution_date
                .map(|d| d.format(DATE_FMT).to_string()),
        )
        .bind(&ticket.technician)
        .bind(vec_to_blob(embedding))
        .execute(&self.pool)
        .await?;

        let mut indexes = self.indexes.write().await;
        if let Some(index) = indexes.get_mut(TICKETS) {
            index.add(id.clone(), embedding.to_vec());
        }

        Ok(id)
    }

    /// Append one team member with their embedding.
    pub async fn insert_team_member(
        &self,
        member: &TeamMember,
        embedding: &[f32],
    ) -> Result<String> {
        self.check_dim(embedding)?;
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO team_knowledge (id, employee_id, name, role, skills, certifications,
                resolved_issues, experience_years, region, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&member.employee_id)
        .bind(&member.name)
        .bind(&member.role)
        .bind(serde_json::to_string(&member.skills)?)
        .bind(serde_json::to_string(&member.certifications)?)
        .bind(serde_json::to_string(&member.resolved_issues)?)
        .bind(member.experience_years)
        .bind(&member.region)
        .bind(vec_to_blob(embedding))
        .execute(&self.pool)
        .await?;

        let mut indexes = self.indexes.write().await;
        if let Some(index) = indexes.get_mut(TEAM_KNOWLEDGE) {
            index.add(id.clone(), embedding.to_vec());
        }

        Ok(id)
    }

    /// Up to `k` nearest tickets in ascending distance.
    pub async fn search_tickets(&self, query: &[f32], k: usize) -> Result<Vec<TicketHit>> {
        self.check_dim(query)?;

        let keyed = {
            let indexes = self.indexes.read().await;
            let index = indexes
                .get(TICKETS)
                .ok_or_else(|| TriageError::CollectionNotReady(TICKETS.to_string()))?;
            index.search(query, k, self.nprobe)
        };

        let mut hits = Vec::with_capacity(keyed.len());
        for (id, distance) in keyed {
            let row = sqlx::query("SELECT * FROM tickets WHERE id = ?")
                .bind(&id)
                .fetch_one(&self.pool)
                .await?;
            hits.push(TicketHit {
                ticket: row_to_ticket(&row)?,
                distance,
            });
        }
        Ok(hits)
    }

    /// Up to `k` nearest team members in ascending distance.
    pub async fn search_team_members(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<TeamMemberHit>> {
        self.check_dim(query)?;

        let keyed = {
            let indexes = self.indexes.read().await;
            let index = indexes
                .get(TEAM_KNOWLEDGE)
                .ok_or_else(|| TriageError::CollectionNotReady(TEAM_KNOWLEDGE.to_string()))?;
            index.search(query, k, self.nprobe)
        };

        let mut hits = Vec::with_capacity(keyed.len());
        for (id, distance) in keyed {
            let row = sqlx::query("SELECT * FROM team_knowledge WHERE id = ?")
                .bind(&id)
                .fetch_one(&self.pool)
                .await?;
            hits.push(TeamMemberHit {
                member: row_to_member(&row)?,
                distance,
            });
        }
        Ok(hits)
    }

    /// Persist feedback on an AI suggestion.
    pub async fn insert_feedback(&self, feedback: &Feedback) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO feedback (ticket_id, feedback_score, feedback_text, suggested_improvements, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&feedback.ticket_id)
        .bind(feedback.feedback_score)
        .bind(&feedback.feedback_text)
        .bind(&feedback.suggested_improvements)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Release the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn parse_date(s: &str, field: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATE_FMT).map_err(|e| {
        TriageError::Schema(format!("invalid {} timestamp '{}': {}", field, s, e))
    })
}

fn row_to_ticket(row: &SqliteRow) -> Result<Ticket> {
    let components_json: String = row.get("affected_components");
    let reported: String = row.get("reported_date");
    let resolved: Option<String> = row.get("resolution_date");

    Ok(Ticket {
        ticket_id: row.get("ticket_id"),
        machine_model: row.get("machine_model"),
        serial_number: row.get("serial_number"),
        issue_description: row.get("issue_description"),
        affected_components: serde_json::from_str(&components_json)?,
        customer: row.get("customer"),
        reported_date: parse_date(&reported, "reported_date")?,
        priority: row.get("priority"),
        status: row.get("status"),
        resolution_solution: row.get("resolution_solution"),
        root_cause: row.get("root_cause"),
        resolution_date: resolved
            .map(|s| parse_date(&s, "resolution_date"))
            .transpose()?,
        technician: row.get("technician"),
    })
}

fn row_to_member(row: &SqliteRow) -> Result<TeamMember> {
    let skills_json: String = row.get("skills");
    let certifications_json: String = row.get("certifications");
    let resolved_json: String = row.get("resolved_issues");

    Ok(TeamMember {
        employee_id: row.get("employee_id"),
        name: row.get("name"),
        role: row.get("role"),
        skills: serde_json::from_str(&skills_json)?,
        certifications: serde_json::from_str(&certifications_json)?,
        resolved_issues: serde_json::from_str(&resolved_json)?,
        experience_years: row.get("experience_years"),
        region: row.get("region"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CompletionConfig, Config, DbConfig, EmbeddingConfig, IndexConfig, IngestConfig,
        RetrievalConfig, ServerConfig,
    };

    const DIMS: usize = 4;

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            db: DbConfig {
                path: dir.join("triage.sqlite"),
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

    fn ticket(id: &str, issue: &str) -> Ticket {
        Ticket {
            ticket_id: id.to_string(),
            machine_model: "MILL-001".to_string(),
            serial_number: "SN-9".to_string(),
            issue_description: issue.to_string(),
            affected_components: vec!["spindle".to_string(), "motor".to_string()],
            customer: "Acme".to_string(),
            reported_date: NaiveDateTime::parse_from_str("2024-03-14 09:30", "%Y-%m-%d %H:%M")
                .unwrap(),
            priority: "High".to_string(),
            status: "Resolved".to_string(),
            resolution_solution: "replaced bearing".to_string(),
            root_cause: "bearing wear".to_string(),
            resolution_date: Some(
                NaiveDateTime::parse_from_str("2024-03-15 14:00", "%Y-%m-%d %H:%M").unwrap(),
            ),
            technician: "J. Ortiz".to_string(),
        }
    }

    fn member(id: &str) -> TeamMember {
        TeamMember {
            employee_id: id.to_string(),
            name: "Dana Kim".to_string(),
            role: "Field Engineer".to_string(),
            skills: vec!["hydraulics".to_string()],
            certifications: vec!["OSHA-30".to_string()],
            resolved_issues: vec!["T-1".to_string()],
            experience_years: 7,
            region: "EMEA".to_string(),
        }
    }

    #[tokio::test]
    async fn search_before_load_is_not_ready() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = VectorStore::open(&test_config(tmp.path())).await.unwrap();

        let err = store.search_tickets(&[0.0; DIMS], 3).await.unwrap_err();
        assert!(matches!(err, TriageError::CollectionNotReady(_)));
    }

    #[tokio::test]
    async fn insert_load_search_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = VectorStore::open(&test_config(tmp.path())).await.unwrap();

        store
            .insert_ticket(&ticket("T-1", "motor overheating"), &[1.0, 0.0, 0.0, 0.0])
            .await
            .unwrap();
        store
            .insert_ticket(&ticket("T-2", "coolant leak"), &[0.0, 1.0, 0.0, 0.0])
            .await
            .unwrap();

        assert_eq!(store.load(TICKETS).await.unwrap(), 2);

        // A record queried with its own embedding comes back at distance 0.
        let hits = store
            .search_tickets(&[1.0, 0.0, 0.0, 0.0], 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].ticket.ticket_id, "T-1");
        assert_eq!(hits[0].distance, 0.0);
        assert!(hits[0].distance <= hits[1].distance);

        // JSON-encoded list fields decode back to the identical order.
        assert_eq!(
            hits[0].ticket.affected_components,
            vec!["spindle".to_string(), "motor".to_string()]
        );
        // Timestamps survive the round-trip.
        assert_eq!(
            hits[0].ticket.reported_date,
            NaiveDateTime::parse_from_str("2024-03-14 09:30", "%Y-%m-%d %H:%M").unwrap()
        );
    }

    #[tokio::test]
    async fn load_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = VectorStore::open(&test_config(tmp.path())).await.unwrap();

        store
            .insert_ticket(&ticket("T-1", "motor overheating"), &[1.0, 0.0, 0.0, 0.0])
            .await
            .unwrap();
        assert_eq!(store.load(TICKETS).await.unwrap(), 1);
        assert_eq!(store.load(TICKETS).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn insert_after_load_is_immediately_searchable() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = VectorStore::open(&test_config(tmp.path())).await.unwrap();

        store.load(TICKETS).await.unwrap();
        store
            .insert_ticket(&ticket("T-9", "spindle stalls"), &[0.5, 0.5, 0.0, 0.0])
            .await
            .unwrap();

        let hits = store
            .search_tickets(&[0.5, 0.5, 0.0, 0.0], 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].ticket.ticket_id, "T-9");
        assert_eq!(hits[0].distance, 0.0);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_schema_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = VectorStore::open(&test_config(tmp.path())).await.unwrap();

        let err = store
            .insert_ticket(&ticket("T-1", "motor overheating"), &[1.0, 0.0])
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::Schema(_)));
    }

    #[tokio::test]
    async fn duplicate_ticket_id_is_store_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = VectorStore::open(&test_config(tmp.path())).await.unwrap();

        store
            .insert_ticket(&ticket("T-1", "motor overheating"), &[1.0, 0.0, 0.0, 0.0])
            .await
            .unwrap();
        let err = store
            .insert_ticket(&ticket("T-1", "motor overheating"), &[1.0, 0.0, 0.0, 0.0])
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::Database(_)));
    }

    #[tokio::test]
    async fn team_collection_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = VectorStore::open(&test_config(tmp.path())).await.unwrap();

        store
            .insert_team_member(&member("E-1"), &[0.0, 0.0, 1.0, 0.0])
            .await
            .unwrap();
        store.load(TEAM_KNOWLEDGE).await.unwrap();

        let hits = store
            .search_team_members(&[0.0, 0.0, 1.0, 0.0], 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].member.employee_id, "E-1");
        assert_eq!(hits[0].member.skills, vec!["hydraulics".to_string()]);
    }
}
