//! Server configuration and shared application state.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use strata_core::{EngineConfig, PromotionPolicy, TierLimits, VirtualFs};

use crate::tools::ToolRegistry;
use crate::watch::WatchHub;

/// Full server configuration, loadable from `strata.toml`. CLI flags override
/// file values; every field has a default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub tiers: TierLimits,
    pub placement: PlacementSection,
    pub watch: WatchSection,
    pub auth: AuthSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub port: u16,
    /// Tenant root; all accepted paths live under it.
    pub root: String,
    pub request_timeout_ms: u64,
    pub max_body_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        ServerSection {
            bind: "127.0.0.1".to_string(),
            port: 8420,
            root: "/".to_string(),
            request_timeout_ms: 30_000,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlacementSection {
    pub promotion: PromotionPolicy,
    pub access_threshold: u64,
}

impl Default for PlacementSection {
    fn default() -> Self {
        PlacementSection { promotion: PromotionPolicy::None, access_threshold: 3 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    pub heartbeat_interval_ms: u64,
    pub connection_timeout_ms: u64,
}

impl Default for WatchSection {
    fn default() -> Self {
        WatchSection { heartbeat_interval_ms: 30_000, connection_timeout_ms: 90_000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub allow_anonymous_read: bool,
    /// HS256/384/512 shared secret. Absent disables token verification.
    pub jwt_secret: Option<String>,
    /// RS256/384/512 public key (PEM). Alternative to `jwt_secret`.
    pub jwt_public_key: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub leeway_secs: u64,
    /// Strict tool argument validation (types, not just presence).
    pub strict_tools: bool,
}

impl Default for AuthSection {
    fn default() -> Self {
        AuthSection {
            allow_anonymous_read: true,
            jwt_secret: None,
            jwt_public_key: None,
            issuer: None,
            audience: None,
            leeway_secs: 60,
            strict_tools: false,
        }
    }
}

impl ServerConfig {
    /// Parse a `strata.toml` file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        toml::from_str(&text).map_err(|e| format!("cannot parse {}: {e}", path.display()))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            root: self.server.root.clone(),
            tiers: self.tiers.clone(),
            promotion: self.placement.promotion,
            promotion_threshold: self.placement.access_threshold,
            ..EngineConfig::default()
        }
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppContext {
    pub fs: Arc<VirtualFs>,
    pub tools: Arc<ToolRegistry>,
    pub hub: Arc<WatchHub>,
    pub config: Arc<ServerConfig>,
    pub started: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server.port, 8420);
        assert_eq!(cfg.watch.heartbeat_interval_ms, 30_000);
        assert_eq!(cfg.watch.connection_timeout_ms, 90_000);
        assert_eq!(cfg.auth.leeway_secs, 60);
        assert!(cfg.auth.allow_anonymous_read);
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9000

[tiers]
hot_max_size = 1024
warm_max_size = 10240

[placement]
promotion = "on-access"
access_threshold = 5

[watch]
heartbeat_interval_ms = 1000

[auth]
allow_anonymous_read = false
"#,
        )
        .unwrap();

        let cfg = ServerConfig::from_file(&path).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.bind, "127.0.0.1");
        assert_eq!(cfg.tiers.hot_max_size, 1024);
        assert_eq!(cfg.placement.promotion, PromotionPolicy::OnAccess);
        assert_eq!(cfg.placement.access_threshold, 5);
        assert_eq!(cfg.watch.heartbeat_interval_ms, 1000);
        assert!(!cfg.auth.allow_anonymous_read);

        let engine = cfg.engine_config();
        assert_eq!(engine.tiers.warm_max_size, 10240);
        assert_eq!(engine.promotion_threshold, 5);
    }
}
