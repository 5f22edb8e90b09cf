//! Trace Normaliser (C1).
//!
//! Converts heterogeneous raw agent output into the canonical
//! `NormalisedOutput` with a detected framework tag. Pure: no I/O beyond
//! reading its input, and restartable — calling it twice on the same record
//! yields the same normalised shape (modulo the `created_at` timestamp).

pub mod types;

pub use types::{FrameworkTag, NormalisedOutput, PerformanceMetrics, TraceStep, TraceStepKind};

use crate::error::{Error, Result};
use serde_json::Value;
use uuid::Uuid;

/// Detect which agent framework produced `record`, via a priority-ordered
/// predicate cascade. Order matters: LangChain and CrewAI shapes are
/// checked before the more generic OpenAI/Anthropic chat shapes since some
/// wrapper frameworks echo an inner `choices`/`content` field.
pub fn detect_framework(record: &types::RawRecord) -> FrameworkTag {
    let map = match record {
        types::RawRecord::String(_) => return FrameworkTag::Generic,
        types::RawRecord::Mapping(m) => m,
    };

    if map.contains_key("intermediate_steps") {
        return FrameworkTag::LangChain;
    }
    if map.contains_key("crew_output") || map.contains_key("tasks_output") {
        return FrameworkTag::CrewAi;
    }
    if map
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .is_some()
    {
        return FrameworkTag::OpenAi;
    }
    if map.contains_key("content") && map.contains_key("role") {
        return FrameworkTag::Anthropic;
    }
    FrameworkTag::Generic
}

/// Extract the canonical response string for `record`, given its detected
/// `framework`. Returns `Err(Error::Input)` when the framework's canonical
/// field is expected but absent — extraction never invents content.
fn extract_response(record: &types::RawRecord, framework: &FrameworkTag) -> Result<String> {
    match record {
        types::RawRecord::String(s) => Ok(s.clone()),
        types::RawRecord::Mapping(map) => match framework {
            FrameworkTag::LangChain => map
                .get("output")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::input("langchain record missing `output` field")),
            FrameworkTag::CrewAi => map
                .get("crew_output")
                .or_else(|| map.get("tasks_output"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::input("crewai record missing `crew_output`/`tasks_output`")),
            FrameworkTag::OpenAi => map
                .get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("message"))
                .and_then(|m| m.get("content"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::input("openai record missing choices[0].message.content")),
            FrameworkTag::Anthropic => map
                .get("content")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::input("anthropic record missing `content`")),
            FrameworkTag::Generic | FrameworkTag::Other(_) => map
                .get("response")
                .or_else(|| map.get("text"))
                .or_else(|| map.get("output"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::input("generic record missing a recognised response field")
                }),
        },
    }
}

fn extract_scenario_affinity(record: &types::RawRecord) -> Option<String> {
    match record {
        types::RawRecord::Mapping(map) => map
            .get("scenario_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        types::RawRecord::String(_) => None,
    }
}

/// Normalise a single raw record.
pub fn normalise_one(record: &types::RawRecord) -> Result<NormalisedOutput> {
    let framework = detect_framework(record);
    let response = extract_response(record, &framework)?;
    let mut output = NormalisedOutput::new(Uuid::new_v4().to_string(), response, framework)?;
    if let Some(affinity) = extract_scenario_affinity(record) {
        output = output.with_scenario_affinity(affinity);
    }
    Ok(output)
}

/// Normalise a batch of raw records. A single unparsable record fails the
/// whole call (the normaliser "fails loudly rather than inventing content");
/// callers wanting partial results should call `normalise_one` per record.
pub fn normalise_batch(records: &[types::RawRecord]) -> Result<Vec<NormalisedOutput>> {
    records.iter().map(normalise_one).collect()
}
