//! # foldertalk
//!
//! Retrieval-augmented chat over indexed document folders.
//!
//! foldertalk points at a folder of documents, chunks and indexes their
//! text into a per-user-namespaced vector store (or uploads them to a
//! managed document-assistant service), and answers questions grounded in
//! that folder's content with source citations.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌───────────────┐
//! │  Source  │──▶│   Indexer     │──▶│ Vector store  │
//! │ (folder) │   │ chunk + embed │   │ (per-user ns) │
//! └──────────┘   │    OR batch   │──▶│  Assistant    │
//!                └───────────────┘   └──────┬────────┘
//!                                           │
//!                      ┌────────────────────┤
//!                      ▼                    ▼
//!                ┌──────────┐        ┌────────────┐
//!                │   CLI    │        │  HTTP API  │
//!                │ (ftalk)  │        │  (axum)    │
//!                └──────────┘        └────────────┘
//! ```
//!
//! Chat turns prefer the managed assistant; when the assistant signals
//! that the service terms were not accepted, the orchestrator falls back
//! to vector search plus a completion call, attaching citations. Any
//! other failure degrades to a fixed assistant reply — a conversation
//! never ends without an assistant turn.
//!
//! ## Quick Start
//!
//! ```bash
//! ftalk init                          # create database
//! ftalk index docs                    # index a folder into the vector store
//! ftalk index docs --assistant       # or via the managed assistant
//! ftalk chat docs "what changed in Q3?"
//! ftalk serve api                     # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunker`] | Separator-boundary text chunking |
//! | [`embedding`] | Embedding gateway abstraction |
//! | [`completion`] | Chat-completion gateway |
//! | [`vector_store`] | Namespace-scoped vector storage |
//! | [`vector_index`] | Chunk indexing and similarity search |
//! | [`batch`] | Size-bounded batch packing |
//! | [`assistant`] | Managed-assistant client and lifecycle |
//! | [`chat`] | Chat orchestration with fallback protocol |
//! | [`indexer`] | Folder indexing coordination |
//! | [`sources`] | Document source abstraction |
//! | [`store`] | Metadata store trait |
//! | [`sqlite_store`] | SQLite metadata store |
//! | [`server`] | JSON HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod assistant;
pub mod batch;
pub mod chat;
pub mod chunker;
pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod indexer;
pub mod migrate;
pub mod models;
pub mod server;
pub mod sources;
pub mod sqlite_store;
pub mod store;
pub mod store_memory;
pub mod vector_index;
pub mod vector_store;
