use serde::Serialize;
use serde_json::Value as JsonValue;

use super::collaborator::SpectraStore;
use super::metadata::{merge_peaks, thickness};
use super::record::{ProcessedFile, Record, RecordId, RecordInput, ReferenceInput, Status};
use crate::config::ProcessorConfig;
use crate::data::convert::{convert, output_name, Conversion};
use crate::data::registry::{Dialect, Registry};
use crate::data::table::CanonicalTable;
use crate::error::{ProcessingError, Result};
use crate::peaks::{find_peaks, PeakSet};
use crate::thz::{analyze, ThzResult};

// ---------------------------------------------------------------------------
// Stages and outcomes
// ---------------------------------------------------------------------------

/// Processing stages of one record. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetched,
    Converting,
    PeakAnalysis,
    ThzAnalysis,
    MetadataMerge,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    /// An ordinary spectrum, including a THz trace that has no reference pulse.
    Converted {
        dialect: Dialect,
        table: CanonicalTable,
        peaks: PeakSet,
    },
    ThzAnalyzed {
        reference_id: RecordId,
        result: ThzResult,
    },
    Failed(ProcessingError),
}

impl ProcessingOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ProcessingOutcome::Failed(_))
    }
}

/// Result of the pure computation for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub outcome: ProcessingOutcome,
    /// Canonical CSV to upload, absent on failure.
    pub file: Option<ProcessedFile>,
    /// Merged metadata to upload, when there is something to add.
    pub metadata: Option<JsonValue>,
    /// Last stage entered.
    pub stage: Stage,
}

/// What the caller of [`Processor::process_record`] gets back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingReport {
    pub record_id: RecordId,
    pub status: Status,
    pub message: String,
    #[serde(skip)]
    pub outcome: Option<ProcessingOutcome>,
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Sequences detection, conversion and analysis for one record at a time.
///
/// Holds no per-record state, so one processor can serve concurrent callers.
#[derive(Debug, Clone)]
pub struct Processor {
    registry: &'static Registry,
    config: ProcessorConfig,
}

struct Run {
    record_id: RecordId,
    stage: Stage,
}

impl Run {
    fn new(record_id: RecordId) -> Self {
        log::debug!("record {record_id}: {:?}", Stage::Fetched);
        Self {
            record_id,
            stage: Stage::Fetched,
        }
    }

    fn enter(&mut self, next: Stage) {
        debug_assert!(next > self.stage, "{:?} -> {next:?} is not forward", self.stage);
        log::debug!("record {}: {:?} -> {next:?}", self.record_id, self.stage);
        self.stage = next;
    }
}

impl Processor {
    pub fn new(registry: &'static Registry, config: ProcessorConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &'static Registry {
        self.registry
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Process one record whose file (and reference pulse, for THz) has
    /// already been fetched. Never fails: errors become
    /// [`ProcessingOutcome::Failed`].
    pub fn process(&self, input: &RecordInput, reference: Option<&ReferenceInput>) -> Processed {
        let mut run = Run::new(input.record.id);
        match self.run(&mut run, input, reference) {
            Ok((outcome, file, metadata)) => {
                run.enter(Stage::Done);
                Processed {
                    outcome,
                    file: Some(file),
                    metadata,
                    stage: run.stage,
                }
            }
            Err(e) => {
                log::debug!("record {}: failed during {:?}: {e}", run.record_id, run.stage);
                Processed {
                    outcome: ProcessingOutcome::Failed(e),
                    file: None,
                    metadata: None,
                    stage: Stage::Done,
                }
            }
        }
    }

    fn run(
        &self,
        run: &mut Run,
        input: &RecordInput,
        reference: Option<&ReferenceInput>,
    ) -> Result<(ProcessingOutcome, ProcessedFile, Option<JsonValue>)> {
        let record = &input.record;
        run.enter(Stage::Converting);
        let Conversion { dialect, table } = convert(self.registry, &input.bytes)?;
        check_declared_format(record, dialect);
        let file_name = output_name(&record.filename);

        // A THz trace without a reference pulse is handled as an ordinary spectrum.
        if let Some(reference) = reference.filter(|_| record.is_thz()) {
            run.enter(Stage::ThzAnalysis);
            let thickness = thickness(record.sample_thickness, record.metadata.as_ref())
                .ok_or_else(|| ProcessingError::analysis("sample thickness is missing"))?;
            let ref_table = convert(self.registry, &reference.bytes)
                .map_err(|e| ProcessingError::analysis(format!("reference {}: {e}", reference.id)))?
                .table;
            let result = analyze(&ref_table, &table, thickness)?;

            run.enter(Stage::MetadataMerge);
            let file = encode(file_name, &result.to_table()?)?;
            let outcome = ProcessingOutcome::ThzAnalyzed {
                reference_id: reference.id,
                result,
            };
            return Ok((outcome, file, None));
        }
        if record.is_thz() {
            log::info!("record {}: no reference pulse, processing as ordinary spectrum", record.id);
        }

        run.enter(Stage::PeakAnalysis);
        let peaks = find_peaks(&table, &self.config.peaks);
        log::debug!("record {}: {} peaks", record.id, peaks.len());

        run.enter(Stage::MetadataMerge);
        let metadata = merge_peaks(record.metadata.as_ref(), &peaks)?;
        let file = encode(file_name, &table)?;
        let outcome = ProcessingOutcome::Converted {
            dialect,
            table,
            peaks,
        };
        Ok((outcome, file, Some(metadata)))
    }

    /// Full lifecycle of one record against the database: fetch, mark
    /// ongoing, compute, upload, and set the terminal status.
    pub fn process_record(&self, store: &dyn SpectraStore, id: RecordId) -> ProcessingReport {
        let record = match store.record(id) {
            Ok(record) => record,
            Err(e) => {
                let err = collaborator(format!("retrieving record {id}"), e);
                return self.finish(store, id, err, None);
            }
        };
        if let Err(e) = store.update_status(id, Status::Ongoing) {
            log::warn!("record {id}: could not mark ongoing: {e:#}");
        }

        let bytes = match store.fetch(&record.file_url) {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = collaborator(format!("fetching {}", record.file_url), e);
                return self.finish(store, id, err, None);
            }
        };

        let reference = if record.is_thz() {
            match self.fetch_reference(store, &record) {
                Ok(reference) => reference,
                Err(e) => return self.finish(store, id, e, None),
            }
        } else {
            None
        };

        let input = RecordInput { record, bytes };
        let processed = self.process(&input, reference.as_ref());
        if let ProcessingOutcome::Failed(e) = &processed.outcome {
            let err = e.clone();
            return self.finish(store, id, err, Some(processed.outcome));
        }

        if let Err(e) = upload(store, id, &processed) {
            return self.finish(store, id, e, Some(processed.outcome));
        }

        let message = match &processed.outcome {
            ProcessingOutcome::ThzAnalyzed { reference_id, .. } => {
                format!("Done processing THz spectrum {id} against reference {reference_id}")
            }
            _ => format!("Done processing spectrum {id}"),
        };
        if let Err(e) = store.update_status(id, Status::Successful) {
            let err = collaborator("setting status".to_string(), e);
            return self.finish(store, id, err, Some(processed.outcome));
        }
        log::info!("record {id}: {message}");
        ProcessingReport {
            record_id: id,
            status: Status::Successful,
            message,
            outcome: Some(processed.outcome),
        }
    }

    /// Reference pulse for a THz record; `None` when the sample has none.
    fn fetch_reference(
        &self,
        store: &dyn SpectraStore,
        record: &Record,
    ) -> Result<Option<ReferenceInput>> {
        let Some(parent_id) = record.parent_id else {
            return Ok(None);
        };
        let found = store
            .find_reference(parent_id)
            .map_err(|e| collaborator(format!("looking up reference for sample {parent_id}"), e))?;
        let Some(ref_id) = found.filter(|&r| r != record.id) else {
            return Ok(None);
        };
        let ref_record = store
            .record(ref_id)
            .map_err(|e| collaborator(format!("retrieving reference {ref_id}"), e))?;
        let bytes = store
            .fetch(&ref_record.file_url)
            .map_err(|e| collaborator(format!("fetching {}", ref_record.file_url), e))?;
        Ok(Some(ReferenceInput { id: ref_id, bytes }))
    }

    fn finish(
        &self,
        store: &dyn SpectraStore,
        id: RecordId,
        error: ProcessingError,
        outcome: Option<ProcessingOutcome>,
    ) -> ProcessingReport {
        log::error!("record {id}: {error}");
        if let Err(e) = store.update_status(id, Status::Error) {
            log::warn!("record {id}: could not set error status: {e:#}");
        }
        ProcessingReport {
            record_id: id,
            status: Status::Error,
            message: error.to_string(),
            outcome: Some(outcome.unwrap_or(ProcessingOutcome::Failed(error))),
        }
    }
}

fn upload(store: &dyn SpectraStore, id: RecordId, processed: &Processed) -> Result<()> {
    if let Some(file) = &processed.file {
        store
            .upload_processed(id, file)
            .map_err(|e| collaborator(format!("uploading {}", file.name), e))?;
    }
    if let Some(metadata) = &processed.metadata {
        store
            .update_metadata(id, metadata)
            .map_err(|e| collaborator("updating metadata".to_string(), e))?;
    }
    Ok(())
}

fn encode(name: String, table: &CanonicalTable) -> Result<ProcessedFile> {
    Ok(ProcessedFile {
        name,
        bytes: table.to_csv()?.into_bytes(),
    })
}

fn collaborator(action: String, e: anyhow::Error) -> ProcessingError {
    ProcessingError::Collaborator(format!("{action}: {e:#}"))
}

fn check_declared_format(record: &Record, dialect: Dialect) {
    let declared = record.format.trim_start_matches('.');
    let id = dialect.id();
    if !declared.is_empty() && !id.ends_with(declared) && !id.starts_with(declared) {
        log::warn!(
            "record {}: declared format {:?} but detected {dialect}",
            record.id,
            record.format
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> Processor {
        Processor::new(Registry::builtin().unwrap(), ProcessorConfig::default())
    }

    fn input(category: &str, bytes: &[u8]) -> RecordInput {
        RecordInput {
            record: Record {
                id: 1,
                file_url: "/files/1".into(),
                filename: "quartz.0.dpt".into(),
                format: "dpt".into(),
                category: category.into(),
                parent_id: Some(10),
                sample_thickness: Some(1.0),
                metadata: None,
            },
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn ordinary_spectrum_is_converted_with_peaks() {
        let processed = processor().process(&input("ftir", b"100.0,0.01\n101.0,0.02\n"), None);
        assert_eq!(processed.stage, Stage::Done);
        let file = processed.file.unwrap();
        assert_eq!(file.name, "quartz.csv");
        assert_eq!(file.bytes, b"100.0,0.01\n101.0,0.02\n");
        assert_eq!(processed.metadata, Some(serde_json::json!({"peaks": []})));
        match processed.outcome {
            ProcessingOutcome::Converted { dialect, peaks, .. } => {
                assert_eq!(dialect, Dialect::FtirDpt);
                assert!(peaks.is_empty());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn unsupported_file_fails_without_output() {
        let processed = processor().process(&input("ftir", b"hello\n"), None);
        assert_eq!(
            processed.outcome,
            ProcessingOutcome::Failed(ProcessingError::UnsupportedFiletype)
        );
        assert!(processed.file.is_none());
        assert!(processed.metadata.is_none());
    }

    #[test]
    fn thz_without_reference_goes_through_peak_analysis() {
        let thz = input("thz", b"0,1\t0,5\n0,2\t0,7\n0,3\t0,2\n");
        let processed = processor().process(&thz, None);
        match processed.outcome {
            ProcessingOutcome::Converted { dialect, peaks, .. } => {
                assert_eq!(dialect, Dialect::ThzTxt);
                assert!(peaks.is_empty());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(processed.metadata, Some(serde_json::json!({"peaks": []})));
        assert_eq!(processed.file.unwrap().bytes, b"0.1,0.5\n0.2,0.7\n0.3,0.2\n");
    }

    #[test]
    fn thz_without_thickness_fails() {
        let mut sample = input("thz", b"0,1\t0,5\n0,2\t0,7\n0,3\t0,2\n");
        sample.record.sample_thickness = None;
        let reference = ReferenceInput {
            id: 2,
            bytes: b"0,1\t0,5\n0,2\t0,7\n0,3\t0,2\n".to_vec(),
        };
        let processed = processor().process(&sample, Some(&reference));
        assert!(matches!(
            processed.outcome,
            ProcessingOutcome::Failed(ProcessingError::Analysis(_))
        ));
    }

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Fetched < Stage::Converting);
        assert!(Stage::PeakAnalysis < Stage::MetadataMerge);
        assert!(Stage::ThzAnalysis < Stage::MetadataMerge);
        assert!(Stage::MetadataMerge < Stage::Done);
    }
}
