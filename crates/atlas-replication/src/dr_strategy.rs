//! Per-tier DR posture. Only two tiers actually get a replication pair
//! (`low`, `business_critical`); this table also records the posture
//! the other tiers would use if replication were ever turned on for
//! them, without gating anything on it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrStrategy {
    WarmStandby,
    PilotLight,
    BackupRestore,
    ActiveActive,
}

impl DrStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WarmStandby => "warm_standby",
            Self::PilotLight => "pilot_light",
            Self::BackupRestore => "backup_restore",
            Self::ActiveActive => "active_active",
        }
    }
}

/// The secondary's steady-state compute posture outside of a failover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondaryCompute {
    Full,
    Minimal,
    None,
}

#[derive(Debug, Clone, Copy)]
pub struct DrPolicy {
    pub strategy: DrStrategy,
    pub requires_replication: bool,
    pub secondary_compute: SecondaryCompute,
}

/// The DR policy for a tier name, or `None` for an unknown tier.
pub fn dr_policy(tier: &str) -> Option<DrPolicy> {
    match tier {
        "low" => Some(DrPolicy {
            strategy: DrStrategy::WarmStandby,
            requires_replication: true,
            secondary_compute: SecondaryCompute::Minimal,
        }),
        "medium" => Some(DrPolicy {
            strategy: DrStrategy::PilotLight,
            requires_replication: false,
            secondary_compute: SecondaryCompute::Minimal,
        }),
        "critical" => Some(DrPolicy {
            strategy: DrStrategy::BackupRestore,
            requires_replication: false,
            secondary_compute: SecondaryCompute::None,
        }),
        "business_critical" => Some(DrPolicy {
            strategy: DrStrategy::ActiveActive,
            requires_replication: true,
            secondary_compute: SecondaryCompute::Full,
        }),
        _ => None,
    }
}

/// Whether a tier's DR policy requires a replication pair at all.
pub fn needs_replication(tier: &str) -> bool {
    dr_policy(tier).map(|p| p.requires_replication).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_low_and_business_critical_require_replication() {
        assert!(needs_replication("low"));
        assert!(needs_replication("business_critical"));
        assert!(!needs_replication("medium"));
        assert!(!needs_replication("critical"));
        assert!(!needs_replication("nonexistent"));
    }

    #[test]
    fn pilot_light_is_the_only_strategy_that_scales_on_failover() {
        assert_eq!(dr_policy("medium").unwrap().strategy, DrStrategy::PilotLight);
        assert_eq!(dr_policy("medium").unwrap().secondary_compute, SecondaryCompute::Minimal);
    }
}
