//! Engine configuration: tenant root, tier thresholds, promotion policy.

use serde::{Deserialize, Serialize};

/// Size thresholds and availability of the three storage tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierLimits {
    /// Largest object placed in the hot tier.
    pub hot_max_size: u64,
    /// Largest object placed in the warm tier.
    pub warm_max_size: u64,
    pub warm_enabled: bool,
    pub cold_enabled: bool,
}

impl Default for TierLimits {
    fn default() -> Self {
        TierLimits {
            hot_max_size: 1024 * 1024,
            warm_max_size: 64 * 1024 * 1024,
            warm_enabled: true,
            cold_enabled: true,
        }
    }
}

/// When reads pull objects toward faster tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromotionPolicy {
    #[default]
    None,
    OnAccess,
    Aggressive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tenant root; every accepted path lies under it.
    pub root: String,
    pub tiers: TierLimits,
    pub promotion: PromotionPolicy,
    /// Access count after which `on-access` promotion fires.
    pub promotion_threshold: u64,
    /// Symlink chain length beyond which resolution fails `ELOOP`.
    pub symlink_loop_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            root: "/".to_string(),
            tiers: TierLimits::default(),
            promotion: PromotionPolicy::None,
            promotion_threshold: 3,
            symlink_loop_limit: 40,
        }
    }
}
