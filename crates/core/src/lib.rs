//! Core types for Tally
//!
//! This crate defines the values every other layer shares:
//! - Identity handles (`MemoryReference`, `Sequence`) and their intern table
//! - Payloads (`Data`, `Permissions`) and decisions (`Decision`)
//! - Relationship-enriched records (`GraphData`)
//! - The error type (`TallyError`) and configuration (`TallyConfig`)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod data;
pub mod decision;
pub mod error;
pub mod graph;
pub mod intern;
pub mod types;

pub use config::{RecoveryMode, TallyConfig};
pub use data::{Data, Permissions};
pub use decision::Decision;
pub use error::{TallyError, TallyResult};
pub use graph::{GraphData, RelatedData, RelatedRecord};
pub use intern::InternTable;
pub use types::{Identity, MemoryReference, RequestType, Sequence};
