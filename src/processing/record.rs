use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub type RecordId = u64;

/// A spectrum record as held by the remote database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub file_url: String,
    pub filename: String,
    /// Format declared by the uploader; detection does not rely on it.
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub category: String,
    /// The physical sample this spectrum was measured on.
    #[serde(default)]
    pub parent_id: Option<RecordId>,
    #[serde(default)]
    pub sample_thickness: Option<f64>,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

impl Record {
    pub fn is_thz(&self) -> bool {
        self.category.eq_ignore_ascii_case("thz")
    }
}

/// Everything the core needs about one record, file contents included.
#[derive(Debug, Clone)]
pub struct RecordInput {
    pub record: Record,
    pub bytes: Vec<u8>,
}

/// Reference pulse for a THz record.
#[derive(Debug, Clone)]
pub struct ReferenceInput {
    pub id: RecordId,
    pub bytes: Vec<u8>,
}

/// Terminal and intermediate record statuses reported to the collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ongoing,
    Successful,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Ongoing => "ongoing",
            Status::Successful => "successful",
            Status::Error => "error",
        })
    }
}

/// Canonical CSV ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}
