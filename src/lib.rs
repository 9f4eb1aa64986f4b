//! # Ticket Triage
//!
//! A retrieval-augmented diagnosis assistant for equipment-repair support
//! tickets.
//!
//! Ticket Triage ingests historical repair tickets and team-member skill
//! profiles, embeds them into vectors, stores records and vectors in two
//! SQLite-backed collections with an inverted-file (IVF) similarity index,
//! and grounds completion-API responses in the nearest past cases.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌────────────┐
//! │  JSON files  │──▶│   Ingestion      │──▶│   SQLite    │
//! │ tickets/team │   │ Normalize+Embed  │   │  + IVF idx  │
//! └──────────────┘   └─────────────────┘   └─────┬──────┘
//!                                                │
//!                          ┌─────────────────────┤
//!                          ▼                     ▼
//!                    ┌──────────┐         ┌───────────┐
//!                    │   CLI    │         │   HTTP    │
//!                    │ (triage) │         │ (axum v1) │
//!                    └──────────┘         └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! triage init                          # create database
//! triage ingest tickets tickets.json   # embed + store tickets
//! triage ingest team teamdata.json     # embed + store team profiles
//! triage diagnose "spindle motor overheating under load"
//! triage serve                         # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core record types |
//! | [`error`] | Typed error taxonomy |
//! | [`embedding`] | Embedding client abstraction |
//! | [`completion`] | Chat-completion client with capability dispatch |
//! | [`index`] | In-memory IVF similarity index |
//! | [`store`] | Vector store over the ticket and team collections |
//! | [`ingest`] | JSON normalization and batch ingestion |
//! | [`rag`] | Retrieval-augmented diagnosis engine |
//! | [`assist`] | Assistant turn with ticket-search capability |
//! | [`search`] | CLI similarity search |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod assist;
pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod rag;
pub mod search;
pub mod server;
pub mod store;
