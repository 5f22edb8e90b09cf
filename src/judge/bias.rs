//! Post-hoc bias diagnostics (§4.5 "Bias checks"). Computed over a full
//! result set; never mutate the judgements they describe.

use super::types::{BiasDiagnostics, JudgementResult};
use crate::normaliser::NormalisedOutput;
use std::collections::HashMap;

fn pearson_correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len();
    if n < 2 || n != ys.len() {
        return None;
    }
    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        let dy = ys[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

fn length_bucket(len: usize) -> f64 {
    // Coarse bucket index so very different response lengths don't just
    // spread the correlation thin; matches the "length buckets" language
    // of §4.5.
    (len / 200).min(20) as f64
}

/// Style clusters a response can fall into; a response may belong to more
/// than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum StyleCluster {
    HasList,
    HasCode,
    HasNumerics,
    Plain,
}

fn style_clusters(response: &str) -> Vec<StyleCluster> {
    let mut clusters = Vec::new();
    let has_list = response
        .lines()
        .any(|l| {
            let t = l.trim_start();
            t.starts_with("- ") || t.starts_with("* ") || t.starts_with(|c: char| c.is_ascii_digit())
                && t.find('.').map(|i| i < 3).unwrap_or(false)
        });
    if has_list {
        clusters.push(StyleCluster::HasList);
    }
    if response.contains("```") {
        clusters.push(StyleCluster::HasCode);
    }
    if response.chars().filter(|c| c.is_ascii_digit()).count() > 5 {
        clusters.push(StyleCluster::HasNumerics);
    }
    if clusters.is_empty() {
        clusters.push(StyleCluster::Plain);
    }
    clusters
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Compute length-bias and style-bias diagnostics over `results`, matching
/// each result's `output_id` against the corresponding `outputs` entry for
/// response text/length.
pub fn compute(
    results: &[JudgementResult],
    outputs: &[NormalisedOutput],
    length_bias_threshold: f64,
    style_bias_threshold: f64,
) -> BiasDiagnostics {
    let by_id: HashMap<&str, &NormalisedOutput> =
        outputs.iter().map(|o| (o.id.as_str(), o)).collect();

    let mut lengths = Vec::new();
    let mut scores = Vec::new();
    let mut by_cluster: HashMap<StyleCluster, Vec<f64>> = HashMap::new();

    for result in results {
        let Some(output) = by_id.get(result.output_id.as_str()) else {
            continue;
        };
        lengths.push(length_bucket(output.response.len()));
        scores.push(result.score);
        for cluster in style_clusters(&output.response) {
            by_cluster.entry(cluster).or_default().push(result.score);
        }
    }

    let length_bias_correlation = pearson_correlation(&lengths, &scores);
    let length_bias_flagged = length_bias_correlation
        .map(|rho| rho.abs() > length_bias_threshold)
        .unwrap_or(false);

    let cluster_means: Vec<f64> = by_cluster
        .values()
        .filter(|v| !v.is_empty())
        .map(|v| v.iter().sum::<f64>() / v.len() as f64)
        .collect();
    let style_bias_std = if cluster_means.len() >= 2 {
        Some(std_dev(&cluster_means))
    } else {
        None
    };
    let style_bias_flagged = style_bias_std
        .map(|std| std > style_bias_threshold)
        .unwrap_or(false);

    BiasDiagnostics {
        length_bias_correlation,
        length_bias_flagged,
        style_bias_std,
        style_bias_flagged,
    }
}
