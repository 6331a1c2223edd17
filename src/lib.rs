//! # Problem Pal
//!
//! A local-first assistant sidecar for coding-problem sites.
//!
//! Problem Pal watches an observable stream of intercepted page responses,
//! keeps the problem currently open as a single resident context record,
//! and relays user questions and similarity searches to two companion
//! servers: one proxying a hosted generative-language API with persisted
//! per-(user, problem) conversations, one answering top-K vector
//! similarity over an indexed problem corpus.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────┐   ┌───────────────┐
//! │ Response     │──▶│ Extractor │──▶│ Context store  │
//! │ stream (pal  │   │           │   │ (single slot)  │
//! │ watch)       │   └───────────┘   └──────┬────────┘
//! └──────────────┘                          │
//!                        ┌─────────────────┼──────────────────┐
//!                        ▼                 ▼                  ▼
//!                  ┌──────────┐     ┌────────────┐     ┌────────────┐
//!                  │ Chat     │────▶│ Assist     │     │ Search     │
//!                  │ panel    │     │ server     │     │ server     │
//!                  └──────────┘     │ (LLM +     │     │ (vectors)  │
//!                                   │  history)  │     └────────────┘
//!                                   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pal init                          # create database
//! pal watch < events.ndjson         # subscribe to the response stream
//! pal context show                  # inspect the resident problem
//! pal ask "explain the constraints" # chat round-trip
//! pal similar                       # problems similar to the open one
//! pal serve assist                  # start the chat/history server
//! pal serve search                  # start the similarity server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and wire contracts |
//! | [`extractor`] | Intercepted payload → problem context |
//! | [`store`] | Single-slot context store + mirrored page storage |
//! | [`user_code`] | Per-problem saved-code lookup |
//! | [`intercept`] | Observable response stream |
//! | [`relay`] | Client relays to the companion servers |
//! | [`panel`] | Chat and search panel state machines |
//! | [`conversation`] | Per-(user, title) message history |
//! | [`llm`] | Generative-language API relay |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vectors`] | Problem vector store + top-K scan |
//! | [`indexer`] | Corpus builder (site crawl / JSON dump) |
//! | [`assist_server`] | Chat + history HTTP server |
//! | [`search_server`] | Similarity HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod assist_server;
pub mod config;
pub mod conversation;
pub mod db;
pub mod embedding;
pub mod extractor;
pub mod indexer;
pub mod intercept;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod panel;
pub mod relay;
pub mod search_server;
pub mod store;
pub mod user_code;
pub mod vectors;
