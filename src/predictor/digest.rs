//! Analysis digest construction (§4.6 step 2): framework metrics,
//! tool-usage distribution, error patterns, and aggregate performance built
//! from the outputs and judgement results a run has already produced.

use super::types::AnalysisDigest;
use crate::judge::JudgementResult;
use crate::normaliser::{NormalisedOutput, TraceStepKind};

pub fn build_digest(outputs: &[NormalisedOutput], results: &[JudgementResult]) -> AnalysisDigest {
    let mut framework_counts = std::collections::HashMap::new();
    let mut tool_call_counts = std::collections::HashMap::new();
    let mut latencies = Vec::new();

    for output in outputs {
        *framework_counts.entry(output.framework.to_string()).or_insert(0) += 1;
        if let Some(trace) = &output.trace {
            for step in trace {
                if step.kind == TraceStepKind::ToolCall {
                    if let Some(name) = step.payload.get("name").and_then(|v| v.as_str()) {
                        *tool_call_counts.entry(name.to_string()).or_insert(0) += 1;
                    }
                }
            }
        }
        if let Some(metrics) = &output.metrics {
            if let Some(latency) = metrics.latency_ms {
                latencies.push(latency as f64);
            }
        }
    }

    let error_patterns: Vec<String> = results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| r.feedback.clone())
        .collect();

    let pass_rate = if results.is_empty() {
        0.0
    } else {
        results.iter().filter(|r| r.passed).count() as f64 / results.len() as f64
    };

    let mean_latency_ms = if latencies.is_empty() {
        None
    } else {
        Some(latencies.iter().sum::<f64>() / latencies.len() as f64)
    };

    AnalysisDigest {
        framework_counts,
        tool_call_counts,
        error_patterns,
        mean_latency_ms,
        pass_rate,
        sample_size: outputs.len(),
        expanded: false,
    }
}

/// Widen the digest for the permitted low-confidence re-run (§4.6 step 6):
/// lifts the error-pattern truncation cap (see
/// `AnalysisDigest::visible_error_patterns`) and marks the digest as
/// expanded so the caller never loops more than once.
pub fn expand(mut digest: AnalysisDigest) -> AnalysisDigest {
    digest.expanded = true;
    digest
}
