// src/lib.rs
//! Line and branch coverage measurement: an execution tracer, a mergeable
//! coverage data store, a cross-run combiner, and an analysis engine that
//! reconciles recorded execution against static source structure.
//!
//! Reporting, CLI handling, and rendering are external consumers of
//! [`AnalyzedFile`] results and the [`CoverageData`] query API.

pub mod analysis;
pub mod combine;
pub mod data;
pub mod disposition;
pub mod tracer;
pub mod types;

pub use analysis::{
    AnalyzedFile, Analyzer, BlockSpan, FsSourceProvider, SourceProvider, SourceStructure,
    SourceText, StructuralParser, Totals, content_hash,
};
pub use combine::{combine_directory, combine_files, combine_stores, find_store_files};
pub use data::{ContextData, CoverageData, FORMAT_VERSION, FileEntry};
pub use disposition::{ExclusionRuleSet, FileDisposition};
pub use tracer::{FastTracer, Measure, ReferenceTracer, TraceSession, Tracer};
pub use types::*;
