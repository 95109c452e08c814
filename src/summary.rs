use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::{OutcomeCategory, RequestOutcome};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentionStats {
    pub distinct_resources: usize,
    /// (iteration, resource) pairs claimed by two or more VUs.
    pub contended_slots: usize,
    pub max_claimants: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_requests: usize,
    pub successful: usize,
    pub tolerated: usize,
    pub failed: usize,
    pub failure_rate: f64,
    pub categories: BTreeMap<String, usize>,
    pub total_duration_ms: i64,
    pub min_latency_ms: i64,
    pub max_latency_ms: i64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: i64,
    pub p75_latency_ms: i64,
    pub p90_latency_ms: i64,
    pub p95_latency_ms: i64,
    pub p99_latency_ms: i64,
    pub requests_per_second: f64,
    pub status_code_distribution: BTreeMap<u16, usize>,
    pub contention: ContentionStats,
}

pub struct SummaryBuilder;

impl SummaryBuilder {
    /// `primary_operation` names the operation whose targets are counted
    /// for contention (the compensating deselect is left out).
    pub fn compute(results: &[RequestOutcome], total_duration_ms: i64, primary_operation: &str) -> RunSummary {
        let total_requests = results.len();
        let successful = results.iter().filter(|r| r.category.is_success()).count();
        let failed = results.iter().filter(|r| r.category.is_failure()).count();
        let tolerated = total_requests - successful - failed;
        let failure_rate = if total_requests > 0 {
            failed as f64 / total_requests as f64 * 100.0
        } else {
            0.0
        };

        let mut categories: BTreeMap<String, usize> =
            OutcomeCategory::ALL.iter().map(|c| (c.as_str().to_string(), 0)).collect();
        for r in results {
            *categories.entry(r.category.as_str().to_string()).or_insert(0) += 1;
        }

        let mut latencies: Vec<i64> = results.iter().map(|r| r.duration_ms).collect();
        latencies.sort_unstable();

        let min_latency = *latencies.first().unwrap_or(&0);
        let max_latency = *latencies.last().unwrap_or(&0);
        let avg_latency = if !latencies.is_empty() {
            latencies.iter().sum::<i64>() as f64 / latencies.len() as f64
        } else {
            0.0
        };

        let rps = if total_duration_ms > 0 {
            total_requests as f64 / (total_duration_ms as f64 / 1000.0)
        } else {
            0.0
        };

        let mut status_dist: BTreeMap<u16, usize> = BTreeMap::new();
        for r in results {
            *status_dist.entry(r.http_status).or_insert(0) += 1;
        }

        RunSummary {
            total_requests,
            successful,
            tolerated,
            failed,
            failure_rate,
            categories,
            total_duration_ms,
            min_latency_ms: min_latency,
            max_latency_ms: max_latency,
            avg_latency_ms: avg_latency,
            p50_latency_ms: Self::percentile(&latencies, 50.0),
            p75_latency_ms: Self::percentile(&latencies, 75.0),
            p90_latency_ms: Self::percentile(&latencies, 90.0),
            p95_latency_ms: Self::percentile(&latencies, 95.0),
            p99_latency_ms: Self::percentile(&latencies, 99.0),
            requests_per_second: rps,
            status_code_distribution: status_dist,
            contention: Self::contention(results, primary_operation),
        }
    }

    pub fn contention(results: &[RequestOutcome], primary_operation: &str) -> ContentionStats {
        let mut claimants: HashMap<(u64, u64), HashSet<u64>> = HashMap::new();
        for r in results.iter().filter(|r| r.operation == primary_operation) {
            claimants
                .entry((r.iteration, r.resource_id))
                .or_default()
                .insert(r.vu_index);
        }

        let distinct_resources = claimants.keys().map(|(_, resource)| *resource).collect::<HashSet<_>>().len();
        let contended_slots = claimants.values().filter(|vus| vus.len() >= 2).count();
        let max_claimants = claimants.values().map(HashSet::len).max().unwrap_or(0);

        ContentionStats {
            distinct_resources,
            contended_slots,
            max_claimants,
        }
    }

    fn percentile(sorted: &[i64], p: f64) -> i64 {
        if sorted.is_empty() {
            return 0;
        }
        let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn render(summary: &RunSummary) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "requests: {}  ok: {}  tolerated: {}  failed: {} ({:.2}%)\n",
            summary.total_requests, summary.successful, summary.tolerated, summary.failed, summary.failure_rate
        ));
        let categories: Vec<String> = summary
            .categories
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(name, n)| format!("{}={}", name, n))
            .collect();
        out.push_str(&format!("categories: {}\n", categories.join(" ")));
        out.push_str(&format!(
            "latency ms: min {} avg {:.1} p50 {} p90 {} p95 {} p99 {} max {}\n",
            summary.min_latency_ms,
            summary.avg_latency_ms,
            summary.p50_latency_ms,
            summary.p90_latency_ms,
            summary.p95_latency_ms,
            summary.p99_latency_ms,
            summary.max_latency_ms
        ));
        out.push_str(&format!(
            "throughput: {:.1} req/s over {:.1}s\n",
            summary.requests_per_second,
            summary.total_duration_ms as f64 / 1000.0
        ));
        out.push_str(&format!(
            "contention: {} resources, {} contended slots, max {} claimants",
            summary.contention.distinct_resources, summary.contention.contended_slots, summary.contention.max_claimants
        ));
        out
    }
}
