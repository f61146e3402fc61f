//! # Insurance FAQ
//!
//! Retrieval-augmented question answering over a single insurance policy
//! document.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌───────────┐   ┌──────────────┐
//! │  Loader  │──▶│ Chunker │──▶│ Embedder  │──▶│ VectorIndex  │
//! │ PDF/text │   │ 500/100 │   │  OpenAI   │   │  in-memory   │
//! └──────────┘   └─────────┘   └───────────┘   └──────┬───────┘
//!                                                     │ top-K, zh-CN
//!                                                     ▼
//!                              ┌───────────┐   ┌──────────────┐
//!                   answer ◀───│ ChatModel │◀──│    Prompt    │
//!                              └───────────┘   └──────────────┘
//! ```
//!
//! The index is built fresh for each workflow run and dropped afterwards.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and stage results |
//! | [`error`] | Failure taxonomy |
//! | [`loader`] | PDF / text page extraction |
//! | [`chunk`] | Separator-aware overlapping chunker |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory cosine-similarity index |
//! | [`prompt`] | System prompt and grounding block |
//! | [`generation`] | Chat-model abstraction |
//! | [`builder`] | Index-build stage |
//! | [`answer`] | Answer-generation stage |
//! | [`workflow`] | Two-stage pipeline and service wrapper |
//! | [`server`] | HTTP workflow trigger |

pub mod answer;
pub mod builder;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod loader;
pub mod logging;
pub mod models;
pub mod prompt;
pub mod server;
pub mod workflow;
