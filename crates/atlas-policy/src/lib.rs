//! Tier definitions and the candidate registry.
//!
//! Tiers and candidates are loaded once at startup and treated as
//! read-only values by every other component; the only sanctioned
//! mutation is flipping a candidate's `healthy` flag through
//! [`PolicyModel::set_candidate_health`], which the scheduler's health
//! API calls on operator action or saga outcome.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// A hard-required feature a candidate either has or does not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Pitr,
    MultiAz,
    PrivateNetworking,
    CrossRegionReplication,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::Pitr => "pitr",
            Capability::MultiAz => "multi_az",
            Capability::PrivateNetworking => "private_networking",
            Capability::CrossRegionReplication => "cross_region_replication",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pitr" => Ok(Capability::Pitr),
            "multi_az" => Ok(Capability::MultiAz),
            "private_networking" => Ok(Capability::PrivateNetworking),
            "cross_region_replication" => Ok(Capability::CrossRegionReplication),
            other => Err(format!("unknown capability: {other}")),
        }
    }
}

/// One of the four scoring dimensions a candidate is ranked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Latency,
    Dr,
    Maturity,
    Cost,
}

pub const DIMENSIONS: [Dimension; 4] = [
    Dimension::Latency,
    Dimension::Dr,
    Dimension::Maturity,
    Dimension::Cost,
];

/// A weight (or score) assigned to each of the four dimensions.
///
/// Weight sets must sum to 1.0 within a tolerance of 0.01; score sets
/// are plain values in `[0, 1]` with no such constraint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionMap {
    pub latency: f64,
    pub dr: f64,
    pub maturity: f64,
    pub cost: f64,
}

impl DimensionMap {
    pub fn new(latency: f64, dr: f64, maturity: f64, cost: f64) -> Self {
        Self {
            latency,
            dr,
            maturity,
            cost,
        }
    }

    pub fn get(&self, dim: Dimension) -> f64 {
        match dim {
            Dimension::Latency => self.latency,
            Dimension::Dr => self.dr,
            Dimension::Maturity => self.maturity,
            Dimension::Cost => self.cost,
        }
    }

    pub fn set(&mut self, dim: Dimension, value: f64) {
        match dim {
            Dimension::Latency => self.latency = value,
            Dimension::Dr => self.dr = value,
            Dimension::Maturity => self.maturity = value,
            Dimension::Cost => self.cost = value,
        }
    }

    pub fn sum(&self) -> f64 {
        self.latency + self.dr + self.maturity + self.cost
    }

    /// True when the four values sum to 1.0 within `tolerance`.
    pub fn sums_to_one(&self, tolerance: f64) -> bool {
        (self.sum() - 1.0).abs() <= tolerance
    }

    /// Scale every value so the set sums to exactly 1.0.
    ///
    /// No-op (returns a copy unchanged) if the current sum is zero.
    pub fn renormalized(&self) -> Self {
        let total = self.sum();
        if total == 0.0 {
            return *self;
        }
        Self {
            latency: self.latency / total,
            dr: self.dr / total,
            maturity: self.maturity / total,
            cost: self.cost / total,
        }
    }
}

/// An immutable criticality class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tier {
    pub name: String,
    pub rto_minutes: u32,
    pub rpo_minutes: u32,
    pub required_capabilities: HashSet<Capability>,
    pub weights: DimensionMap,
}

/// The four tiers known to the control plane: `low` carries the
/// lightest default DR posture, `business_critical` the strictest gate
/// set and the most latency-weighted scoring.
pub fn default_tiers() -> HashMap<String, Tier> {
    let mut tiers = HashMap::new();

    tiers.insert(
        "low".to_string(),
        Tier {
            name: "low".to_string(),
            rto_minutes: 240,
            rpo_minutes: 30,
            required_capabilities: HashSet::from([Capability::PrivateNetworking]),
            weights: DimensionMap::new(0.20, 0.20, 0.20, 0.40),
        },
    );

    tiers.insert(
        "medium".to_string(),
        Tier {
            name: "medium".to_string(),
            rto_minutes: 120,
            rpo_minutes: 15,
            required_capabilities: HashSet::from([Capability::Pitr, Capability::PrivateNetworking]),
            weights: DimensionMap::new(0.25, 0.25, 0.25, 0.25),
        },
    );

    tiers.insert(
        "critical".to_string(),
        Tier {
            name: "critical".to_string(),
            rto_minutes: 480,
            rpo_minutes: 60,
            required_capabilities: HashSet::from([Capability::PrivateNetworking]),
            weights: DimensionMap::new(0.20, 0.15, 0.15, 0.50),
        },
    );

    tiers.insert(
        "business_critical".to_string(),
        Tier {
            name: "business_critical".to_string(),
            rto_minutes: 30,
            rpo_minutes: 5,
            required_capabilities: HashSet::from([
                Capability::Pitr,
                Capability::MultiAz,
                Capability::PrivateNetworking,
            ]),
            weights: DimensionMap::new(0.30, 0.30, 0.25, 0.15),
        },
    );

    tiers
}

/// A (provider, region, runtime_cluster) placement target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub provider: String,
    pub region: String,
    pub runtime_cluster: String,
    /// Opaque network attachment descriptor, passed through untouched.
    pub network: String,
    pub capabilities: HashSet<Capability>,
    pub scores: DimensionMap,
    pub healthy: bool,
}

impl Candidate {
    pub fn id(&self) -> String {
        format!("{}:{}:{}", self.provider, self.region, self.runtime_cluster)
    }
}

/// The default three-provider candidate pool: AWS and GCP both carry the
/// full capability set, OCI lacks `multi_az`. Scores are normalized to
/// the `[0, 1]` scale.
pub fn default_candidates() -> Vec<Candidate> {
    vec![
        Candidate {
            provider: "aws".to_string(),
            region: "us-east-1".to_string(),
            runtime_cluster: "eks-payments-use1-primary".to_string(),
            network: "vpc-aws-payments-use1".to_string(),
            capabilities: HashSet::from([
                Capability::Pitr,
                Capability::MultiAz,
                Capability::PrivateNetworking,
            ]),
            scores: DimensionMap::new(0.93, 0.91, 0.95, 0.62),
            healthy: true,
        },
        Candidate {
            provider: "gcp".to_string(),
            region: "us-central1".to_string(),
            runtime_cluster: "gke-payments-usc1-primary".to_string(),
            network: "vpc-gcp-payments-usc1".to_string(),
            capabilities: HashSet::from([
                Capability::Pitr,
                Capability::MultiAz,
                Capability::PrivateNetworking,
            ]),
            scores: DimensionMap::new(0.88, 0.90, 0.92, 0.74),
            healthy: true,
        },
        Candidate {
            provider: "oci".to_string(),
            region: "us-ashburn-1".to_string(),
            runtime_cluster: "oke-payments-iad-primary".to_string(),
            network: "vcn-oci-payments-iad".to_string(),
            capabilities: HashSet::from([Capability::Pitr, Capability::PrivateNetworking]),
            scores: DimensionMap::new(0.80, 0.70, 0.75, 0.85),
            healthy: true,
        },
    ]
}

/// Tiers plus the candidate registry. Candidates are held behind a
/// `RwLock` solely so [`set_candidate_health`](Self::set_candidate_health)
/// can flip the dynamic flag; tiers never change after construction.
pub struct PolicyModel {
    tiers: HashMap<String, Tier>,
    candidates: RwLock<Vec<Candidate>>,
}

impl PolicyModel {
    pub fn new(tiers: HashMap<String, Tier>, candidates: Vec<Candidate>) -> Self {
        Self {
            tiers,
            candidates: RwLock::new(candidates),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(default_tiers(), default_candidates())
    }

    pub fn tier(&self, name: &str) -> Option<Tier> {
        self.tiers.get(name).cloned()
    }

    pub fn candidates(&self) -> Vec<Candidate> {
        self.candidates.read().expect("candidates lock poisoned").clone()
    }

    /// Flip the dynamic `healthy` flag on every candidate matching `provider`.
    pub fn set_candidate_health(&self, provider: &str, healthy: bool) {
        let mut candidates = self.candidates.write().expect("candidates lock poisoned");
        for candidate in candidates.iter_mut() {
            if candidate.provider == provider {
                candidate.healthy = healthy;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tier_weights_sum_to_one() {
        for tier in default_tiers().values() {
            assert!(
                tier.weights.sums_to_one(0.01),
                "tier {} weights sum to {}",
                tier.name,
                tier.weights.sum()
            );
        }
    }

    #[test]
    fn oci_lacks_multi_az() {
        let candidates = default_candidates();
        let oci = candidates.iter().find(|c| c.provider == "oci").unwrap();
        assert!(!oci.capabilities.contains(&Capability::MultiAz));
    }

    #[test]
    fn aws_and_gcp_have_full_capability_set() {
        for provider in ["aws", "gcp"] {
            let candidates = default_candidates();
            let candidate = candidates.iter().find(|c| c.provider == provider).unwrap();
            assert!(candidate.capabilities.contains(&Capability::MultiAz));
            assert!(candidate.capabilities.contains(&Capability::Pitr));
            assert!(candidate.capabilities.contains(&Capability::PrivateNetworking));
        }
    }

    #[test]
    fn capability_round_trips_through_display_and_from_str() {
        for cap in [
            Capability::Pitr,
            Capability::MultiAz,
            Capability::PrivateNetworking,
            Capability::CrossRegionReplication,
        ] {
            let s = cap.to_string();
            assert_eq!(s.parse::<Capability>().unwrap(), cap);
        }
    }

    #[test]
    fn set_candidate_health_flips_only_matching_provider() {
        let model = PolicyModel::with_defaults();
        model.set_candidate_health("oci", false);
        let candidates = model.candidates();
        for candidate in candidates {
            if candidate.provider == "oci" {
                assert!(!candidate.healthy);
            } else {
                assert!(candidate.healthy);
            }
        }
    }

    #[test]
    fn renormalize_after_scaling_cost_sums_to_one() {
        let mut weights = DimensionMap::new(0.20, 0.15, 0.15, 0.50);
        let scaled_cost = (weights.cost * 1.2).min(0.60);
        weights.set(Dimension::Cost, scaled_cost);
        let renormalized = weights.renormalized();
        assert!(renormalized.sums_to_one(1e-9));
    }
}
