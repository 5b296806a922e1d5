//! Crawl orchestration and processing pipeline for Leizilla.
//!
//! This crate drives connectors through discovery ([`crawl`]) and moves
//! discovered laws through download, archival and OCR text retrieval
//! ([`pipeline`]).

pub mod crawl;
pub mod pipeline;
pub mod progress;

#[cfg(test)]
mod test_support;

pub use crawl::{CancelFlag, CrawlPhase, CrawlSummary, Orchestrator};
pub use pipeline::{Pipeline, PipelineOptions, PipelineSummary, StageSummary};
pub use progress::{ProgressReporter, SilentProgress};
