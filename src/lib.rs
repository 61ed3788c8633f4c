//! # DocForge
//!
//! A document ingestion and chunking pipeline for vector knowledge bases.
//!
//! DocForge loads documents from a local directory or an S3 bucket, extracts
//! text from binary formats (PDF, DOCX, XLSX), splits it with a configurable
//! chunking strategy, embeds every chunk through an OpenAI-compatible API,
//! and upserts the results into a Qdrant collection with deterministic IDs.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌────────────┐   ┌─────────┐
//! │  Loaders  │──▶│  Chunker  │──▶│  Embedder  │──▶│ Qdrant  │
//! │  FS / S3  │   │ + enforce │   │ (OpenAI-   │   │ (REST)  │
//! └───────────┘   └───────────┘   │  compat)   │   └────┬────┘
//!                                 └────────────┘        │
//!                                              ┌────────┴───┐
//!                                              │   search   │
//!                                              └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docforge ingest                  # load, chunk, embed, store
//! docforge ingest --force          # re-ingest even if populated
//! docforge search "refund policy"  # nearest-neighbour lookup
//! docforge status                  # collection point count
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Layered TOML configuration |
//! | [`models`] | Core data types |
//! | [`loader`] | Document source trait |
//! | [`loader_fs`] | Local filesystem loader |
//! | [`loader_s3`] | Amazon S3 loader |
//! | [`extract`] | PDF/OOXML text extraction |
//! | [`chunker`] | Chunking strategies, size enforcement, identity |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store abstraction (Qdrant REST) |
//! | [`ingest`] | The ingestion run orchestrator |
//! | [`search`] | Query-side retrieval |

pub mod chunker;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod loader;
pub mod loader_fs;
pub mod loader_s3;
pub mod models;
pub mod search;
pub mod store;
