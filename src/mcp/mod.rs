//! MCP (Model Context Protocol) module
//!
//! Exposes the drone operations as MCP tools over stdio.

pub mod server;
pub mod tools;
pub mod types;
