//! Record orchestration: one record in, canonical file + metadata + status out.
//!
//! ```text
//!   SpectraStore ──record, bytes, reference──▶ Processor::process
//!                                                 │
//!              Converting ─▶ PeakAnalysis ─┐      │  pure computation
//!                        └─▶ ThzAnalysis  ─┴─▶ MetadataMerge ─▶ Done
//!                                                 │
//!   SpectraStore ◀──processed file, metadata, status──┘
//! ```

pub mod collaborator;
pub mod metadata;
pub mod orchestrator;
pub mod record;

pub use collaborator::SpectraStore;
pub use orchestrator::{Processed, ProcessingOutcome, ProcessingReport, Processor, Stage};
pub use record::{ProcessedFile, Record, RecordId, RecordInput, ReferenceInput, Status};
