//! Deterministic A/B experiment assignment and weight overrides.

use std::sync::RwLock;

use atlas_policy::DimensionMap;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    Control,
    Variant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub description: String,
    pub variant_weights: DimensionMap,
    /// Fraction of traffic, in `[0, 1]`, assigned to `variant`.
    pub traffic_fraction: f64,
    /// A specific tier name, or `"*"` to match every tier.
    pub tier_selector: String,
    pub enabled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    #[error("experiment weights must sum to 1.0 +/- 0.01, got {0}")]
    WeightsDoNotSumToOne(f64),
    #[error("traffic_fraction must be in [0, 1], got {0}")]
    TrafficOutOfRange(f64),
}

impl Experiment {
    pub fn validate(&self) -> Result<(), ExperimentError> {
        if !self.variant_weights.sums_to_one(0.01) {
            return Err(ExperimentError::WeightsDoNotSumToOne(self.variant_weights.sum()));
        }
        if !(0.0..=1.0).contains(&self.traffic_fraction) {
            return Err(ExperimentError::TrafficOutOfRange(self.traffic_fraction));
        }
        Ok(())
    }

    fn matches_tier(&self, tier_name: &str) -> bool {
        self.tier_selector == "*" || self.tier_selector == tier_name
    }
}

/// Compute the stable digest bucket for `(experiment_id, request_name)`:
/// the first 32 bits of the MD5 digest of `"<id>:<name>"`, read as a
/// big-endian unsigned integer and divided by `0xFFFFFFFF`. A pure
/// function of the two strings — no clock, no RNG, no process identity.
pub fn digest_bucket(experiment_id: &str, request_name: &str) -> f64 {
    let input = format!("{experiment_id}:{request_name}");
    let digest = Md5::digest(input.as_bytes());
    let first_four = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    first_four as f64 / 0xFFFFFFFFu32 as f64
}

pub fn assign_group(experiment: &Experiment, request_name: &str) -> Group {
    let bucket = digest_bucket(&experiment.id, request_name);
    if bucket < experiment.traffic_fraction {
        Group::Variant
    } else {
        Group::Control
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentAssignment {
    pub experiment_id: String,
    pub group: Group,
}

/// Experiments in registration order (walk order matters: the first
/// enabled, tier-matching experiment wins) plus a name -> bool feature
/// flag table.
#[derive(Default)]
pub struct ExperimentRegistry {
    experiments: RwLock<Vec<Experiment>>,
    feature_flags: RwLock<std::collections::HashMap<String, bool>>,
}

impl ExperimentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, experiment: Experiment) -> Result<(), ExperimentError> {
        experiment.validate()?;
        self.experiments.write().expect("lock poisoned").push(experiment);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Experiment> {
        self.experiments
            .read()
            .expect("lock poisoned")
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    pub fn list(&self) -> Vec<Experiment> {
        self.experiments.read().expect("lock poisoned").clone()
    }

    pub fn delete(&self, id: &str) {
        self.experiments.write().expect("lock poisoned").retain(|e| e.id != id);
    }

    pub fn set_feature_flag(&self, name: &str, value: bool) {
        self.feature_flags
            .write()
            .expect("lock poisoned")
            .insert(name.to_string(), value);
    }

    pub fn feature_flag(&self, name: &str) -> bool {
        *self
            .feature_flags
            .read()
            .expect("lock poisoned")
            .get(name)
            .unwrap_or(&false)
    }

    /// Walk experiments in registration order; return the first enabled,
    /// tier-matching assignment plus the weight override to apply (only
    /// present when the request lands in `variant` — `control` keeps the
    /// tier's own weights).
    pub fn resolve(
        &self,
        tier_name: &str,
        request_name: &str,
    ) -> Option<(ExperimentAssignment, Option<DimensionMap>)> {
        let experiments = self.experiments.read().expect("lock poisoned");
        for experiment in experiments.iter() {
            if !experiment.enabled || !experiment.matches_tier(tier_name) {
                continue;
            }
            let group = assign_group(experiment, request_name);
            let weights = match group {
                Group::Variant => Some(experiment.variant_weights),
                Group::Control => None,
            };
            return Some((
                ExperimentAssignment {
                    experiment_id: experiment.id.clone(),
                    group,
                },
                weights,
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn experiment(id: &str, traffic_fraction: f64, tier_selector: &str) -> Experiment {
        Experiment {
            id: id.to_string(),
            description: "test".to_string(),
            variant_weights: DimensionMap::new(0.05, 0.05, 0.10, 0.80),
            traffic_fraction,
            tier_selector: tier_selector.to_string(),
            enabled: true,
        }
    }

    #[test]
    fn assignment_is_deterministic_for_same_inputs() {
        let experiment = experiment("exp-1", 0.5, "*");
        let a = assign_group(&experiment, "orders-db");
        let b = assign_group(&experiment, "orders-db");
        assert_eq!(a, b);
    }

    #[test]
    fn full_traffic_always_assigns_variant() {
        let experiment = experiment("exp-1", 1.0, "*");
        for name in ["orders-db", "billing-db", "catalog-db"] {
            assert_eq!(assign_group(&experiment, name), Group::Variant);
        }
    }

    #[test]
    fn zero_traffic_always_assigns_control() {
        let experiment = experiment("exp-1", 0.0, "*");
        for name in ["orders-db", "billing-db", "catalog-db"] {
            assert_eq!(assign_group(&experiment, name), Group::Control);
        }
    }

    #[test]
    fn validate_rejects_bad_weights() {
        let mut experiment = experiment("exp-1", 0.5, "*");
        experiment.variant_weights = DimensionMap::new(0.5, 0.5, 0.5, 0.5);
        assert!(experiment.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_traffic() {
        let experiment = experiment("exp-1", 1.5, "*");
        assert!(experiment.validate().is_err());
    }

    #[test]
    fn resolve_skips_disabled_and_non_matching_tier() {
        let registry = ExperimentRegistry::new();
        let mut disabled = experiment("exp-disabled", 1.0, "*");
        disabled.enabled = false;
        registry.register(disabled).unwrap();
        registry.register(experiment("exp-wrong-tier", 1.0, "low")).unwrap();
        registry.register(experiment("exp-match", 1.0, "critical")).unwrap();

        let (assignment, weights) = registry.resolve("critical", "orders-db").unwrap();
        assert_eq!(assignment.experiment_id, "exp-match");
        assert!(weights.is_some());
    }

    #[test]
    fn feature_flags_default_to_false() {
        let registry = ExperimentRegistry::new();
        assert!(!registry.feature_flag("prefer_cost_optimization"));
        registry.set_feature_flag("prefer_cost_optimization", true);
        assert!(registry.feature_flag("prefer_cost_optimization"));
    }
}
