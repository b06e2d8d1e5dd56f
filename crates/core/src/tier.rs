//! Tiered object placement: size-driven tier selection, cross-tier read
//! fallback, explicit demotion, and policy-driven promotion.
//!
//! Objects are keyed by a stable object key (the owning inode's id), while
//! the [`MetadataIndex`] stays path-keyed and authoritative. Tier transitions
//! follow write-target → update-index → delete-source, so a concurrent reader
//! sees the bytes in at least one tier at every instant.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cas::BlobBucket;
use crate::config::{PromotionPolicy, TierLimits};
use crate::error::{FsError, FsResult};
use crate::index::{MetadataIndex, TierMetadata};
use crate::inode::now_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    Hot,
    Warm,
    Cold,
}

impl TierKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TierKind::Hot => "hot",
            TierKind::Warm => "warm",
            TierKind::Cold => "cold",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hot" => Some(TierKind::Hot),
            "warm" => Some(TierKind::Warm),
            "cold" => Some(TierKind::Cold),
            _ => None,
        }
    }

    /// Lower rank is faster.
    fn rank(self) -> u8 {
        match self {
            TierKind::Hot => 0,
            TierKind::Warm => 1,
            TierKind::Cold => 2,
        }
    }
}

/// Cache-miss probe order: warm, then cold, then hot.
const PROBE_ORDER: [TierKind; 3] = [TierKind::Warm, TierKind::Cold, TierKind::Hot];

pub struct TieredPlacement {
    hot: Arc<dyn BlobBucket>,
    warm: Option<Arc<dyn BlobBucket>>,
    cold: Option<Arc<dyn BlobBucket>>,
    limits: TierLimits,
    policy: PromotionPolicy,
    promotion_threshold: u64,
    index: Arc<MetadataIndex>,
}

impl TieredPlacement {
    pub fn new(
        hot: Arc<dyn BlobBucket>,
        warm: Option<Arc<dyn BlobBucket>>,
        cold: Option<Arc<dyn BlobBucket>>,
        limits: TierLimits,
        policy: PromotionPolicy,
        promotion_threshold: u64,
        index: Arc<MetadataIndex>,
    ) -> Self {
        TieredPlacement { hot, warm, cold, limits, policy, promotion_threshold, index }
    }

    pub fn index(&self) -> &Arc<MetadataIndex> {
        &self.index
    }

    fn bucket(&self, tier: TierKind) -> Option<&Arc<dyn BlobBucket>> {
        match tier {
            TierKind::Hot => Some(&self.hot),
            TierKind::Warm => self.warm.as_ref().filter(|_| self.limits.warm_enabled),
            TierKind::Cold => self.cold.as_ref().filter(|_| self.limits.cold_enabled),
        }
    }

    fn tier_available(&self, tier: TierKind) -> bool {
        self.bucket(tier).is_some()
    }

    /// Size-threshold tier selection with fallback toward hot when a slower
    /// tier is unavailable.
    pub fn select_tier(&self, size: u64) -> TierKind {
        if size <= self.limits.hot_max_size {
            TierKind::Hot
        } else if size <= self.limits.warm_max_size {
            if self.tier_available(TierKind::Warm) {
                TierKind::Warm
            } else {
                TierKind::Hot
            }
        } else if self.tier_available(TierKind::Cold) {
            TierKind::Cold
        } else if self.tier_available(TierKind::Warm) {
            TierKind::Warm
        } else {
            TierKind::Hot
        }
    }

    /// Place `bytes` for `path` and record the placement. Returns the tier.
    pub fn store(
        &self,
        path: &str,
        key: &str,
        bytes: &[u8],
        content_hash: Option<&str>,
    ) -> FsResult<TierKind> {
        let tier = self.select_tier(bytes.len() as u64);
        let bucket = self.bucket(tier).ok_or_else(|| {
            FsError::internal(format!("selected tier {} is unavailable", tier.as_str()))
        })?;
        bucket.put(key, bytes)?;

        // Overwrites may shrink past a threshold: drop the copy left in the
        // previously recorded tier.
        if let Some(prev) = self.index.get(path) {
            if prev.tier != tier {
                if let Some(prev_bucket) = self.bucket(prev.tier) {
                    prev_bucket.delete(key)?;
                }
            }
        }

        let mut meta =
            TierMetadata::new(tier, bytes.len() as u64, content_hash.map(str::to_string));
        meta.last_access_ms = now_millis();
        self.index.set(path, meta)?;
        debug!(path, tier = tier.as_str(), size = bytes.len(), "object placed");
        Ok(tier)
    }

    /// Read the bytes for `path`. Consults the index first; on a miss or a
    /// failed tier read, probes warm → cold → hot and backfills the index
    /// with whatever tier actually held the bytes.
    pub fn read(&self, path: &str, key: &str, content_hash: Option<&str>) -> FsResult<(Vec<u8>, TierKind)> {
        let recorded = self.index.get(path);

        if let Some(ref meta) = recorded {
            if let Some(bucket) = self.bucket(meta.tier) {
                match bucket.get(key) {
                    Ok(Some(bytes)) => {
                        let tier = meta.tier;
                        self.track_access(path)?;
                        let promoted = self.maybe_promote(path, key, &bytes, tier)?;
                        return Ok((bytes, promoted.unwrap_or(tier)));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!(path, tier = meta.tier.as_str(), error = %e, "tier read failed, probing fallbacks");
                    }
                }
            }
        }

        for tier in PROBE_ORDER {
            let Some(bucket) = self.bucket(tier) else { continue };
            match bucket.get(key) {
                Ok(Some(bytes)) => {
                    // The probe wins over whatever the index believed.
                    let mut meta = TierMetadata::new(
                        tier,
                        bytes.len() as u64,
                        content_hash
                            .map(str::to_string)
                            .or_else(|| recorded.as_ref().and_then(|m| m.content_hash.clone())),
                    );
                    meta.access_count = recorded.as_ref().map_or(0, |m| m.access_count);
                    self.index.set(path, meta)?;
                    self.track_access(path)?;
                    let promoted = self.maybe_promote(path, key, &bytes, tier)?;
                    return Ok((bytes, promoted.unwrap_or(tier)));
                }
                Ok(None) => continue,
                Err(e) => {
                    debug!(path, tier = tier.as_str(), error = %e, "tier probe failed");
                    continue;
                }
            }
        }

        Err(FsError::not_found(path))
    }

    /// Move the object to a strictly slower tier. The target must be
    /// available; bytes survive the transition byte-for-byte.
    pub fn demote(&self, path: &str, key: &str, target: TierKind) -> FsResult<TierKind> {
        if target == TierKind::Hot {
            return Err(FsError::invalid("cannot demote to the hot tier"));
        }
        let target_bucket = self
            .bucket(target)
            .ok_or_else(|| {
                FsError::invalid(format!("target tier {} is unavailable", target.as_str()))
            })?
            .clone();

        let meta = self
            .index
            .get(path)
            .ok_or_else(|| FsError::not_found(path))?;
        let source = meta.tier;
        if source == target {
            return Ok(target);
        }

        let source_bucket = self
            .bucket(source)
            .ok_or_else(|| FsError::not_found(path))?
            .clone();
        let bytes = source_bucket
            .get(key)?
            .ok_or_else(|| FsError::not_found(path))?;

        // Write target, update index, then delete source: readers racing the
        // transition find the bytes in one tier or the other.
        target_bucket.put(key, &bytes)?;
        let mut updated = meta;
        updated.tier = target;
        self.index.set(path, updated)?;
        source_bucket.delete(key)?;
        debug!(path, from = source.as_str(), to = target.as_str(), "object demoted");
        Ok(target)
    }

    /// Remove the object and its placement record.
    pub fn remove(&self, path: &str, key: &str) -> FsResult<()> {
        if let Some(meta) = self.index.get(path) {
            if let Some(bucket) = self.bucket(meta.tier) {
                bucket.delete(key)?;
            }
        } else {
            // Unknown placement: clear every tier that may hold the key.
            for tier in PROBE_ORDER {
                if let Some(bucket) = self.bucket(tier) {
                    bucket.delete(key)?;
                }
            }
        }
        self.index.delete(path)
    }

    fn track_access(&self, path: &str) -> FsResult<()> {
        self.index.set_metadata(path, |meta| {
            meta.last_access_ms = now_millis();
            meta.access_count += 1;
        })
    }

    /// Policy-driven promotion toward the tier the size thresholds prefer.
    /// Idempotent: an object already at its preferred tier is left alone.
    fn maybe_promote(
        &self,
        path: &str,
        key: &str,
        bytes: &[u8],
        current: TierKind,
    ) -> FsResult<Option<TierKind>> {
        let eligible = match self.policy {
            PromotionPolicy::None => false,
            PromotionPolicy::Aggressive => true,
            PromotionPolicy::OnAccess => self
                .index
                .get(path)
                .is_some_and(|m| m.access_count >= self.promotion_threshold),
        };
        if !eligible {
            return Ok(None);
        }

        let preferred = self.select_tier(bytes.len() as u64);
        if preferred.rank() >= current.rank() {
            return Ok(None);
        }
        let target_bucket = match self.bucket(preferred) {
            Some(b) => b.clone(),
            None => return Ok(None),
        };
        let source_bucket = match self.bucket(current) {
            Some(b) => b.clone(),
            None => return Ok(None),
        };

        target_bucket.put(key, bytes)?;
        self.index.set_metadata(path, |meta| meta.tier = preferred)?;
        source_bucket.delete(key)?;
        debug!(path, from = current.as_str(), to = preferred.as_str(), "object promoted");
        Ok(Some(preferred))
    }

    /// Object counts and byte totals per tier, for `stats`.
    pub fn tier_stats(&self) -> Vec<(TierKind, usize, u64)> {
        let mut out = Vec::new();
        for tier in [TierKind::Hot, TierKind::Warm, TierKind::Cold] {
            if let Some(bucket) = self.bucket(tier) {
                let objects = bucket.list(None).unwrap_or_default();
                let bytes = objects.iter().map(|o| o.size).sum();
                out.push((tier, objects.len(), bytes));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cas::MemoryBucket;
    use crate::error::ErrorCode;
    use crate::index::MemoryMetadataStore;

    fn placement(policy: PromotionPolicy, threshold: u64) -> TieredPlacement {
        let limits = TierLimits {
            hot_max_size: 1024,
            warm_max_size: 10240,
            warm_enabled: true,
            cold_enabled: true,
        };
        TieredPlacement::new(
            Arc::new(MemoryBucket::new()),
            Some(Arc::new(MemoryBucket::new())),
            Some(Arc::new(MemoryBucket::new())),
            limits,
            policy,
            threshold,
            Arc::new(MetadataIndex::new(Arc::new(MemoryMetadataStore::new()))),
        )
    }

    #[test]
    fn selection_follows_thresholds() {
        let p = placement(PromotionPolicy::None, 3);
        assert_eq!(p.select_tier(0), TierKind::Hot);
        assert_eq!(p.select_tier(1024), TierKind::Hot);
        assert_eq!(p.select_tier(1025), TierKind::Warm);
        assert_eq!(p.select_tier(10240), TierKind::Warm);
        assert_eq!(p.select_tier(10241), TierKind::Cold);
    }

    #[test]
    fn selection_falls_back_when_tiers_unavailable() {
        let limits = TierLimits {
            hot_max_size: 1024,
            warm_max_size: 10240,
            warm_enabled: false,
            cold_enabled: false,
        };
        let p = TieredPlacement::new(
            Arc::new(MemoryBucket::new()),
            None,
            None,
            limits,
            PromotionPolicy::None,
            3,
            Arc::new(MetadataIndex::new(Arc::new(MemoryMetadataStore::new()))),
        );
        assert_eq!(p.select_tier(5000), TierKind::Hot);
        assert_eq!(p.select_tier(50000), TierKind::Hot);
    }

    #[test]
    fn store_and_read_roundtrip_by_tier() {
        let p = placement(PromotionPolicy::None, 3);
        let payload = vec![7u8; 5120];
        let tier = p.store("/m.bin", "1", &payload, None).unwrap();
        assert_eq!(tier, TierKind::Warm);

        let (bytes, tier) = p.read("/m.bin", "1", None).unwrap();
        assert_eq!(bytes, payload);
        assert_eq!(tier, TierKind::Warm);
    }

    #[test]
    fn read_probes_and_backfills_on_index_miss() {
        let p = placement(PromotionPolicy::None, 3);
        let payload = vec![1u8; 2000];
        p.store("/f", "9", &payload, None).unwrap();
        // Simulate a lost index record.
        p.index().delete("/f").unwrap();

        let (bytes, tier) = p.read("/f", "9", None).unwrap();
        assert_eq!(bytes, payload);
        assert_eq!(tier, TierKind::Warm);
        assert_eq!(p.index().get("/f").unwrap().tier, TierKind::Warm);
    }

    #[test]
    fn demote_preserves_bytes_across_transitions() {
        let p = placement(PromotionPolicy::None, 3);
        let payload: Vec<u8> = (0..5120).map(|i| (i % 251) as u8).collect();
        p.store("/m.bin", "4", &payload, None).unwrap();

        assert_eq!(p.demote("/m.bin", "4", TierKind::Cold).unwrap(), TierKind::Cold);
        let (bytes, tier) = p.read("/m.bin", "4", None).unwrap();
        assert_eq!(tier, TierKind::Cold);
        assert_eq!(bytes, payload);
    }

    #[test]
    fn demote_to_unavailable_tier_fails() {
        let limits = TierLimits {
            hot_max_size: 1024,
            warm_max_size: 10240,
            warm_enabled: true,
            cold_enabled: false,
        };
        let p = TieredPlacement::new(
            Arc::new(MemoryBucket::new()),
            Some(Arc::new(MemoryBucket::new())),
            None,
            limits,
            PromotionPolicy::None,
            3,
            Arc::new(MetadataIndex::new(Arc::new(MemoryMetadataStore::new()))),
        );
        p.store("/f", "2", b"data", None).unwrap();
        let err = p.demote("/f", "2", TierKind::Cold).unwrap_err();
        assert_eq!(err.code, ErrorCode::Einval);
    }

    #[test]
    fn access_tracking_counts_reads() {
        let p = placement(PromotionPolicy::None, 3);
        p.store("/f", "3", b"abc", None).unwrap();
        p.read("/f", "3", None).unwrap();
        p.read("/f", "3", None).unwrap();
        let meta = p.index().get("/f").unwrap();
        assert_eq!(meta.access_count, 2);
        assert!(meta.last_access_ms > 0);
    }

    #[test]
    fn aggressive_promotion_fires_on_first_access() {
        let p = placement(PromotionPolicy::Aggressive, 3);
        p.store("/f", "5", b"small", None).unwrap();
        p.demote("/f", "5", TierKind::Cold).unwrap();

        let (_, tier) = p.read("/f", "5", None).unwrap();
        assert_eq!(tier, TierKind::Hot);
        assert_eq!(p.index().get("/f").unwrap().tier, TierKind::Hot);
    }

    #[test]
    fn on_access_promotion_waits_for_threshold() {
        let p = placement(PromotionPolicy::OnAccess, 3);
        p.store("/f", "6", b"tiny", None).unwrap();
        p.demote("/f", "6", TierKind::Warm).unwrap();

        let (_, t1) = p.read("/f", "6", None).unwrap();
        assert_eq!(t1, TierKind::Warm);
        let (_, t2) = p.read("/f", "6", None).unwrap();
        assert_eq!(t2, TierKind::Warm);
        let (_, t3) = p.read("/f", "6", None).unwrap();
        assert_eq!(t3, TierKind::Hot);

        // Idempotent: further reads stay put.
        let (_, t4) = p.read("/f", "6", None).unwrap();
        assert_eq!(t4, TierKind::Hot);
    }

    #[test]
    fn promotion_respects_size_limits() {
        // 5 KiB prefers warm; on-access promotion must not push it to hot.
        let p = placement(PromotionPolicy::OnAccess, 1);
        let payload = vec![2u8; 5120];
        p.store("/f", "7", &payload, None).unwrap();
        p.demote("/f", "7", TierKind::Cold).unwrap();

        let (_, t1) = p.read("/f", "7", None).unwrap();
        // access_count reached 1 on this read; promotion targets warm, not hot.
        let (_, t2) = p.read("/f", "7", None).unwrap();
        assert!(t1 == TierKind::Cold || t1 == TierKind::Warm);
        assert_eq!(t2, TierKind::Warm);
    }

    #[test]
    fn remove_clears_bucket_and_index() {
        let p = placement(PromotionPolicy::None, 3);
        p.store("/f", "8", b"gone", None).unwrap();
        p.remove("/f", "8").unwrap();
        assert!(p.index().get("/f").is_none());
        assert!(p.read("/f", "8", None).is_err());
    }
}
