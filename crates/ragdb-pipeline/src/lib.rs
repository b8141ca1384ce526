//! Ingestion and query orchestration over the core traits.
//!
//! `IngestionPipeline` turns a document directory into a persisted index;
//! `QueryService` answers similarity queries against a loaded one.
pub mod ingest;
pub mod query;

pub use ingest::{IngestOutcome, IngestReport, IngestStage, IngestionPipeline};
pub use query::{QueryContext, QueryService};
