use serde::{Deserialize, Serialize};

/// Allowed status values for correlation runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    /// Decode the stored tag; unknown values read as `Failed`.
    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "succeeded" => RunStatus::Succeeded,
            _ => RunStatus::Failed,
        }
    }
}

/// Bookkeeping record for one correlation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorrelationRunRecord {
    /// Free-form label chosen by the user (defaults to the bundle file name).
    pub label: String,
    /// SHA-256 of the ingestion bundle.
    pub input_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_image_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recomp_image_hash: Option<String>,
    pub status: RunStatus,
    pub entities: i64,
    pub matched: i64,
    pub events: i64,
    pub started_at: String,
    pub finished_at: String,
}

/// A stored run together with its row id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredRun {
    pub id: i64,
    #[serde(flatten)]
    pub record: CorrelationRunRecord,
}
