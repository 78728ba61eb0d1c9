//!
//! src/samples.rs  Oct 16th, 2026
//!
//! Bundled example clips that already live in object storage, and the
//! drag payload that carries one of them into the drop area
//!

use serde::{Deserialize, Serialize};

use crate::errors::ShazoomError;
use crate::types::UploadReference;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExampleSample {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub duration: &'static str,
    pub file_key: &'static str
}

pub const EXAMPLE_SAMPLES: [ExampleSample; 2] = [
    ExampleSample {
        id: "sample1",
        title: "Brazilian Pop Sample",
        description: "Clip from song in database",
        duration: "0:10",
        file_key: "clips/Menina_10secs.mp3"
    },
    ExampleSample {
        id: "sample2",
        title: "1960s Pop Sample",
        description: "Clip from song not in database",
        duration: "0:24",
        file_key: "clips/Hey_Jude_24_secs.webm"
    }
];

pub fn find_sample(id: &str) -> Option<&'static ExampleSample> {
    EXAMPLE_SAMPLES.iter().find(|s| s.id == id)
}

/// What a dragged sample card carries, as `application/json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragPayload {
    pub id: String,
    pub title: String,
    pub file_key: String
}

impl DragPayload {
    pub fn reference(&self) -> UploadReference {
        UploadReference(self.file_key.clone())
    }
}

impl From<&ExampleSample> for DragPayload {
    fn from(s: &ExampleSample) -> Self {
        DragPayload {
            id: s.id.to_string(),
            title: s.title.to_string(),
            file_key: s.file_key.to_string()
        }
    }
}

impl ExampleSample {
    pub fn reference(&self) -> UploadReference {
        UploadReference(self.file_key.to_string())
    }

    pub fn drag_payload(&self) -> Result<String, ShazoomError> {
        Ok( serde_json::to_string(&DragPayload::from(self))? )
    }
}

/// Parse a dropped payload; malformed json or an empty key is rejected
pub fn parse_drag_payload(data: &str) -> Result<DragPayload, ShazoomError> {
    let payload: DragPayload = serde_json::from_str(data)
        .map_err(|e| ShazoomError::ExampleSampleParse(e.to_string()))?;
    if payload.file_key.trim().is_empty() {
        return Err(ShazoomError::ExampleSampleParse(
            format!("sample {} has an empty fileKey", payload.id)
        ));
    }
    Ok(payload)
}
