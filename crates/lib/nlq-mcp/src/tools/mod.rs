//! MCP tool modules.
//!
//! Tools are grouped by domain: query answering, catalog inspection, and
//! contextual help.

pub mod catalog;
pub mod context;
pub mod query;
