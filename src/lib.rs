//! # assis
//!
//! A local-first retrieval-augmented assistant for Linux.
//!
//! assis indexes system configuration files, manual pages and home-directory
//! documents into a vector store, then answers questions by retrieving the
//! closest chunks and handing them, with the question, to a locally running
//! language model.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐   ┌──────────────┐
//! │  Selector   │──▶│ Load + Chunk │──▶│ Embedder │──▶│ Vector store │
//! │ /etc man ~  │   │ (rayon pool) │   │          │   │ Chroma/SQLite│
//! └─────────────┘   └──────────────┘   └──────────┘   └──────┬───────┘
//!                                                            │
//!                       ┌────────────┐   ┌─────────────┐     │
//!                       │   Model    │◀──│  Retriever  │◀────┘
//!                       │  process   │   │ + threshold │
//!                       └────────────┘   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! assis index                   # index /etc, man pages and home
//! assis index manpage           # just one source
//! assis ask how do I mount a usb drive
//! assis ask --type config --file ./my.conf what is wrong here
//! assis list --type home        # dump indexed records
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed pipeline errors |
//! | [`select`] | File selection with exclusion rules |
//! | [`load`] | Text/gzip loading and content hashing |
//! | [`chunk`] | Line-window chunking and chunk ids |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store abstraction and backends |
//! | [`index`] | Indexing pipeline |
//! | [`retrieve`] | Threshold retrieval with fallback |
//! | [`answer`] | Prompt assembly and model process |
//! | [`progress`] | Index progress reporting |
//! | [`sources`] | Source status listing |
//! | [`list`] | Indexed record dump |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | SQLite schema |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod index;
pub mod list;
pub mod load;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod retrieve;
pub mod select;
pub mod sources;
pub mod store;
