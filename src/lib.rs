//! Filing Agent
//!
//! A conversational agent over a company's annual SEC 10-K filings:
//! - Downloads and unpacks the filing corpus
//! - Converts each year's HTML filing into text documents tagged with the year
//! - Builds (or reloads) one vector index per year
//! - Exposes each index as a tool, plus a sub-question tool spanning years
//! - Runs a function-calling agent over those tools in a console loop
//!
//! PIPELINE:
//! CONFIG → ACQUIRE → INGEST → INDEX → TOOLS → AGENT → CONSOLE

pub mod acquisition;
pub mod agent;
pub mod config;
pub mod console;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod memory;
pub mod models;
pub mod query_engine;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{AgentError, Result};

// Re-export common types
pub use agent::{AgentResponse, FilingAgent};
pub use config::Settings;
pub use models::*;
