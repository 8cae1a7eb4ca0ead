use anyhow::Result;
use serde_json::Value as JsonValue;

use super::record::{ProcessedFile, Record, RecordId, Status};

/// The remote spectra database, as seen by the processor.
///
/// Implementations own transport, authentication and retries. The processor
/// calls them only before computing (record, file and reference lookup) and
/// after it (uploads and status), never in between.
pub trait SpectraStore {
    fn record(&self, id: RecordId) -> Result<Record>;

    fn fetch(&self, url: &str) -> Result<Vec<u8>>;

    /// Id of the reference pulse recorded for a physical sample, if any.
    fn find_reference(&self, parent_id: RecordId) -> Result<Option<RecordId>>;

    fn upload_processed(&self, id: RecordId, file: &ProcessedFile) -> Result<()>;

    fn update_metadata(&self, id: RecordId, metadata: &JsonValue) -> Result<()>;

    fn update_status(&self, id: RecordId, status: Status) -> Result<()>;
}
