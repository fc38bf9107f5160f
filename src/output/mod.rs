//! Output module for exporting crawled data and reporting
//!
//! This module handles:
//! - Appending crawled edges, profiles and posts to the export sink
//! - Loading and printing frontier statistics

mod jsonl;
pub mod stats;
mod traits;

pub use jsonl::JsonlSink;
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use traits::{ExportRecord, ExportSink, OutputError, OutputResult};
