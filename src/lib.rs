//! MCP server that lets agents manage GitHub repositories, issues, and pull requests.
//!
//! Every tool call resolves its own identity, talks to the GitHub REST API
//! through a short-lived session, and reports a structured result: success,
//! partial success with per-step failures, or a classified error.

pub mod classify;
pub mod config;
pub mod credentials;
pub mod error;
pub mod ops;
pub mod outcome;
pub mod server;
pub mod transport;
