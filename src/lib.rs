//! # Local TA
//!
//! Local backend for a teaching assistant: document uploads, a stub RAG
//! endpoint, and a lifecycle manager that keeps a local Ollama runtime
//! running with the required models installed.
//!
//! ## Architecture
//!
//! ```text
//!  ┌────────────┐      ┌──────────────┐      ┌──────────────────────┐
//!  │  CLI (lta) │─────▶│  Coordinator │─────▶│ Probe / Catalog /    │
//!  │  ensure    │      │  (lifecycle) │      │ Puller (HTTP)        │
//!  └────────────┘      └──────┬───────┘      └──────────┬───────────┘
//!                             │ launch                  │
//!                             ▼                         ▼
//!                      ┌─────────────┐          ┌──────────────┐
//!                      │  Launcher   │─────────▶│ Ollama server│
//!                      │ ollama serve│          └──────────────┘
//!                      └─────────────┘
//!
//!  ┌────────────┐      ┌──────────────┐      ┌──────────────┐
//!  │ HTTP (axum)│─────▶│ storage / rag│─────▶│ SQLite (sqlx)│
//!  └────────────┘      └──────────────┘      └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lta init        # create database
//! lta ensure      # start ollama, pull the configured models
//! lta serve       # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`runtime`] | Endpoint, model names, the `ModelRuntime` seam |
//! | [`probe`] | Reachability check |
//! | [`launcher`] | Background `ollama serve` |
//! | [`catalog`] | Installed models |
//! | [`pull`] | Streaming model download |
//! | [`progress`] | Pull progress reporters |
//! | [`lifecycle`] | Ensure-server / ensure-models coordinator |
//! | [`config`] | Settings resolution (env, YAML, defaults) |
//! | [`logging`] | Tracing subscriber |
//! | [`storage`] | Upload storage and hashing |
//! | [`rag`] | Retrieval service (stub) |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`server`] | HTTP server |

pub mod catalog;
pub mod config;
pub mod db;
pub mod launcher;
pub mod lifecycle;
pub mod logging;
pub mod migrate;
pub mod probe;
pub mod progress;
pub mod pull;
pub mod rag;
pub mod runtime;
pub mod server;
pub mod storage;
