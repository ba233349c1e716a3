//! JSON Schemas of the queue payloads.

use schemars::schema::RootSchema;
use schemars::schema_for;
use serde_json::{json, Value};

use crate::{ProcessingResult, VideoJob};

/// Schema of an inbound job message.
pub fn job_schema() -> RootSchema {
    schema_for!(VideoJob)
}

/// Schema of an outbound result message.
pub fn result_schema() -> RootSchema {
    schema_for!(ProcessingResult)
}

/// Every payload schema keyed by the queue that carries it.
pub fn wire_schemas() -> Result<Value, serde_json::Error> {
    Ok(json!({
        "job-creation": serde_json::to_value(job_schema())?,
        "video-processing-result": serde_json::to_value(result_schema())?,
    }))
}
