//! ABAP ADT MCP Server
//!
//! Exposes SAP ABAP Development Tools (ADT) operations - source read/write,
//! locking, activation, syntax checks, unit tests, data queries, where-used
//! and CDS dependency navigation - to AI agents over the Model Context
//! Protocol on stdio.

pub mod adt;
pub mod auth;
pub mod config;
pub mod debug;
pub mod error;
pub mod server;
