//! The scheduler: filter, score, rank, and pick a primary plus an
//! optional cross-cloud failover.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use atlas_policy::{Candidate, DimensionMap, PolicyModel, DIMENSIONS};

use crate::analytics::PlacementAnalytics;
use crate::circuit_breaker::BreakerTable;
use crate::decision::{
    CandidateScore, Decision, ExcludedCandidate, FailoverDecision, Reason, ScheduleError,
    ScheduleRequest,
};
use crate::experiments::ExperimentRegistry;

/// Tiers whose winner gets a cross-cloud failover candidate attached.
const CROSS_CLOUD_TIERS: [&str; 2] = ["low", "business_critical"];

/// The single value every `schedule` call reads and writes: the policy
/// model handle, the operator health map, the breaker table, the
/// experiment registry, and analytics. Held behind `Arc` with one
/// `RwLock` per mutable table rather than one lock guarding everything,
/// so an analytics increment never blocks a concurrent breaker check.
pub struct SchedulerState {
    pub policy: Arc<PolicyModel>,
    operator_health: RwLock<HashMap<String, bool>>,
    pub breakers: BreakerTable,
    pub experiments: ExperimentRegistry,
    pub analytics: PlacementAnalytics,
}

impl SchedulerState {
    pub fn new(policy: Arc<PolicyModel>, breaker_threshold: u32, breaker_cooldown_seconds: i64) -> Self {
        Self {
            policy,
            operator_health: RwLock::new(HashMap::new()),
            breakers: BreakerTable::new(breaker_threshold, breaker_cooldown_seconds),
            experiments: ExperimentRegistry::new(),
            analytics: PlacementAnalytics::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(Arc::new(PolicyModel::with_defaults()), 5, 60)
    }

    /// Operator-set health flag for a provider; defaults to healthy.
    pub fn operator_health(&self, provider: &str) -> bool {
        *self
            .operator_health
            .read()
            .expect("operator health lock poisoned")
            .get(provider)
            .unwrap_or(&true)
    }

    pub fn set_operator_health(&self, provider: &str, healthy: bool) {
        self.operator_health
            .write()
            .expect("operator health lock poisoned")
            .insert(provider.to_string(), healthy);
    }

    /// The common path: no caller-supplied provider exclusions.
    pub fn schedule(&self, request: &ScheduleRequest) -> Result<Decision, ScheduleError> {
        self.schedule_excluding(request, &HashSet::new())
    }

    /// Used by `force_failover` to keep a saga off a provider that just
    /// failed, without mutating the shared operator-health table (which
    /// would affect every other in-flight request too).
    pub fn schedule_excluding(
        &self,
        request: &ScheduleRequest,
        excluded_providers: &HashSet<String>,
    ) -> Result<Decision, ScheduleError> {
        let candidates = self.policy.candidates();
        if candidates.is_empty() {
            return Err(ScheduleError::EmptyPool);
        }
        let candidates_evaluated = candidates.len();

        let tier = self
            .policy
            .tier(&request.tier)
            .ok_or_else(|| ScheduleError::UnknownTier(request.tier.clone()))?;

        // Stage 2: health filter.
        let mut healthy: Vec<Candidate> = Vec::new();
        let mut unhealthy_skipped: Vec<ExcludedCandidate> = Vec::new();
        for candidate in candidates {
            let provider_ok = self.operator_health(&candidate.provider) && candidate.healthy;
            let circuit_ok = self.breakers.allow(&candidate.provider);
            let excluded = excluded_providers.contains(&candidate.provider);
            if provider_ok && circuit_ok && !excluded {
                healthy.push(candidate);
            } else {
                let reason = if excluded {
                    "excluded_by_caller"
                } else if !provider_ok {
                    "provider_unhealthy"
                } else {
                    "circuit_open"
                };
                unhealthy_skipped.push(ExcludedCandidate {
                    provider: candidate.provider,
                    region: candidate.region,
                    runtime_cluster: candidate.runtime_cluster,
                    reason: reason.to_string(),
                });
            }
        }
        if healthy.is_empty() {
            return Err(ScheduleError::NoHealthyCandidates(request.tier.clone()));
        }
        let candidates_healthy = healthy.len();

        // Stage 3: weight resolution.
        let assignment_and_override = self.experiments.resolve(&request.tier, &request.name);
        let (experiment_assignment, weights) = match &assignment_and_override {
            Some((assignment, Some(override_weights))) => {
                (Some(assignment.clone()), *override_weights)
            }
            Some((assignment, None)) => (Some(assignment.clone()), tier.weights),
            None => (None, tier.weights),
        };
        let effective_weights = if self.experiments.feature_flag("prefer_cost_optimization") {
            apply_cost_preference(weights)
        } else {
            weights
        };

        // Stage 4: gate + score.
        let mut effective_gates = tier.required_capabilities.clone();
        if request.ha {
            effective_gates.insert(atlas_policy::Capability::MultiAz);
        }

        let mut scored: Vec<CandidateScore> = Vec::new();
        for candidate in &healthy {
            let missing: Vec<_> = effective_gates
                .iter()
                .filter(|cap| !candidate.capabilities.contains(cap))
                .collect();
            if !missing.is_empty() {
                unhealthy_skipped.push(ExcludedCandidate {
                    provider: candidate.provider.clone(),
                    region: candidate.region.clone(),
                    runtime_cluster: candidate.runtime_cluster.clone(),
                    reason: format!("missing capabilities: {missing:?}"),
                });
                continue;
            }
            scored.push(score_candidate(candidate, &effective_weights));
        }

        if scored.is_empty() {
            self.analytics.record_gate_rejection();
            return Err(ScheduleError::NoGatePassers(request.tier.clone()));
        }
        let candidates_passed_gate = scored.len();

        // Stage 5: rank (stable, so ties keep the pool's insertion order).
        scored.sort_by(|a, b| b.total_score.partial_cmp(&a.total_score).unwrap());
        let winner = scored[0].clone();
        let top_three: Vec<CandidateScore> = scored.iter().take(3).cloned().collect();

        // Stage 6: failover selection.
        let failover = if CROSS_CLOUD_TIERS.contains(&request.tier.as_str()) {
            scored
                .iter()
                .find(|c| c.provider != winner.provider)
                .map(|c| FailoverDecision {
                    provider: c.provider.clone(),
                    region: c.region.clone(),
                    runtime_cluster: c.runtime_cluster.clone(),
                    network: c.network.clone(),
                    score: c.clone(),
                    note: format!("anti_affinity = different_cloud_from_{}", winner.provider),
                })
        } else {
            None
        };

        // Stage 7: analytics.
        let experiment_pair = experiment_assignment
            .as_ref()
            .map(|a| (a.experiment_id.clone(), a.group));
        self.analytics.record_placement(
            &winner.provider,
            &winner.region,
            &request.tier,
            winner.total_score,
            experiment_pair.as_ref(),
        );

        Ok(Decision {
            provider: winner.provider.clone(),
            region: winner.region.clone(),
            runtime_cluster: winner.runtime_cluster.clone(),
            network: winner.network.clone(),
            reason: Reason {
                tier: tier.name.clone(),
                rto_minutes: tier.rto_minutes,
                rpo_minutes: tier.rpo_minutes,
                effective_gates: effective_gates.into_iter().collect(),
                effective_weights,
                selected: winner,
                top_three,
                candidates_evaluated,
                candidates_healthy,
                candidates_passed_gate,
                unhealthy_skipped,
                experiment: experiment_assignment,
                failover,
            },
        })
    }
}

fn score_candidate(candidate: &Candidate, weights: &DimensionMap) -> CandidateScore {
    let mut total = 0.0;
    for dim in DIMENSIONS {
        total += weights.get(dim) * candidate.scores.get(dim);
    }
    CandidateScore {
        provider: candidate.provider.clone(),
        region: candidate.region.clone(),
        runtime_cluster: candidate.runtime_cluster.clone(),
        network: candidate.network.clone(),
        subscores: candidate.scores,
        total_score: total,
    }
}

/// Scale the cost weight up to `min(cost * 1.2, 0.60)` and renormalize
/// the other three dimensions proportionally so the total stays exactly
/// 1.0.
fn apply_cost_preference(weights: DimensionMap) -> DimensionMap {
    let new_cost = (weights.cost * 1.2).min(0.60);
    let remaining_target = 1.0 - new_cost;
    let remaining_old = weights.latency + weights.dr + weights.maturity;

    if remaining_old == 0.0 {
        return DimensionMap::new(
            remaining_target / 3.0,
            remaining_target / 3.0,
            remaining_target / 3.0,
            new_cost,
        );
    }

    let scale = remaining_target / remaining_old;
    DimensionMap::new(
        weights.latency * scale,
        weights.dr * scale,
        weights.maturity * scale,
        new_cost,
    )
}
