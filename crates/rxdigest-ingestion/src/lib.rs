//! rxdigest-ingestion: Preprint acquisition and filtering pipeline.
//! - Query construction from keyword groups (arXiv syntax + client-side matcher)
//! - Bounded retry around page fetches
//! - Paginated source adapters (arXiv, bioRxiv/medRxiv, manual links)
//! - Deduplication by record id
//! - Keyword relevance filtering and scoring
//! - Orchestration of all of the above

pub mod error;
pub mod models;
pub mod query;
pub mod retry;
pub mod sources;
pub mod dedup;
pub mod filter;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::SourceError;
pub use models::{Record, RecordSource};
pub use pipeline::{run_pipeline, PipelineJob, PipelineProgress, PipelineResult};
pub use sources::{LiteratureSource, SourceReport, SourceRun};
