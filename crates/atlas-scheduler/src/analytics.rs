//! In-memory placement analytics. Counters are safe under concurrent
//! scheduler calls: every table is a `dashmap::DashMap`, so an increment
//! for provider `aws` never blocks one for provider `gcp`.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::experiments::Group;

#[derive(Default)]
pub struct PlacementAnalytics {
    total_requests: AtomicU64,
    gate_rejections: AtomicU64,
    per_provider: DashMap<String, u64>,
    per_provider_region: DashMap<(String, String), u64>,
    per_tier: DashMap<String, u64>,
    per_experiment_group: DashMap<(String, Group), u64>,
    per_provider_score_sum: DashMap<String, f64>,
    per_provider_score_count: DashMap<String, u64>,
}

impl PlacementAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_gate_rejection(&self) {
        self.gate_rejections.fetch_add(1, Ordering::Relaxed);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_placement(
        &self,
        provider: &str,
        region: &str,
        tier: &str,
        score: f64,
        experiment: Option<&(String, Group)>,
    ) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        *self.per_provider.entry(provider.to_string()).or_insert(0) += 1;
        *self
            .per_provider_region
            .entry((provider.to_string(), region.to_string()))
            .or_insert(0) += 1;
        *self.per_tier.entry(tier.to_string()).or_insert(0) += 1;
        *self.per_provider_score_sum.entry(provider.to_string()).or_insert(0.0) += score;
        *self.per_provider_score_count.entry(provider.to_string()).or_insert(0) += 1;

        if let Some((experiment_id, group)) = experiment {
            *self
                .per_experiment_group
                .entry((experiment_id.clone(), *group))
                .or_insert(0) += 1;
        }
    }

    pub fn average_score(&self, provider: &str) -> Option<f64> {
        let sum = *self.per_provider_score_sum.get(provider)?;
        let count = *self.per_provider_score_count.get(provider)?;
        if count == 0 {
            return None;
        }
        Some(sum / count as f64)
    }

    pub fn summary(&self) -> AnalyticsSummary {
        AnalyticsSummary {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            gate_rejections: self.gate_rejections.load(Ordering::Relaxed),
            provider_distribution: self
                .per_provider
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            tier_distribution: self
                .per_tier
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            avg_score_by_provider: self
                .per_provider
                .iter()
                .filter_map(|e| self.average_score(e.key()).map(|avg| (e.key().clone(), avg)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub total_requests: u64,
    pub gate_rejections: u64,
    pub provider_distribution: Vec<(String, u64)>,
    pub tier_distribution: Vec<(String, u64)>,
    pub avg_score_by_provider: Vec<(String, f64)>,
}
