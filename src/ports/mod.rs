//! # Ports
//!
//! Inbound API traits and outbound dependency traits.

pub mod inbound;
pub mod outbound;

pub use inbound::QueryRouter;
pub use outbound::{ExecutionUnit, MetadataProvider, PageUnit, RowSink, RowStreamUnit, ShardRoute};
