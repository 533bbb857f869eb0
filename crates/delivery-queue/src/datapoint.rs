//! Data point model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Schema a data point body conforms to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaId {
    pub namespace: String,
    pub name: String,
    pub version: String,
}

impl SchemaId {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version: version.into(),
        }
    }
}

/// How the data was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Sensed,
    SelfReported,
}

/// Where the data came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionProvenance {
    pub source_name: String,
    pub modality: Modality,
}

/// Identity and metadata of a data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPointHeader {
    pub id: Uuid,
    pub schema: SchemaId,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquisition_provenance: Option<AcquisitionProvenance>,
}

/// A record awaiting delivery. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub header: DataPointHeader,
    pub body: serde_json::Value,
}

impl DataPoint {
    /// Create a data point with a fresh id, stamped now.
    pub fn new(schema: SchemaId, body: serde_json::Value) -> Self {
        Self {
            header: DataPointHeader {
                id: Uuid::new_v4(),
                schema,
                created_at: Utc::now(),
                acquisition_provenance: None,
            },
            body,
        }
    }

    pub fn with_provenance(mut self, source_name: impl Into<String>, modality: Modality) -> Self {
        self.header.acquisition_provenance = Some(AcquisitionProvenance {
            source_name: source_name.into(),
            modality,
        });
        self
    }

    pub fn id(&self) -> Uuid {
        self.header.id
    }
}
