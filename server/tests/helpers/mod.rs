//! Test harness for transport-level integration tests.
//!
//! Builds an [`AppContext`] over the in-memory engine and dispatches
//! JSON-RPC values directly (no sockets, no HTTP).

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use strata_core::{EngineConfig, ErrorCode, TierLimits, VirtualFs};
use strata_server::rpc::{self, RpcReply};
use strata_server::sandbox::ExprExecutor;
use strata_server::state::{AppContext, ServerConfig};
use strata_server::tools::{ToolContext, ToolRegistry};
use strata_server::watch::{HubSink, WatchHub};

pub struct TestHarness {
    pub ctx: AppContext,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_anonymous_read(true)
    }

    /// Harness with small tier thresholds (hot ≤ 1024, warm ≤ 10240) so tier
    /// behavior is observable with small payloads.
    pub fn with_anonymous_read(allow_anonymous_read: bool) -> Self {
        let mut server_config = ServerConfig::default();
        server_config.tiers = TierLimits {
            hot_max_size: 1024,
            warm_max_size: 10240,
            warm_enabled: true,
            cold_enabled: true,
        };
        server_config.auth.allow_anonymous_read = allow_anonymous_read;

        let hub = Arc::new(WatchHub::new(Duration::from_millis(50), Duration::from_secs(5)));
        let engine_config = EngineConfig {
            tiers: server_config.tiers.clone(),
            ..EngineConfig::default()
        };
        let fs = Arc::new(VirtualFs::with_sink(engine_config, Arc::new(HubSink(hub.clone()))));
        let tools = Arc::new(ToolRegistry::new(
            allow_anonymous_read,
            false,
            Arc::new(ExprExecutor),
        ));

        TestHarness {
            ctx: AppContext {
                fs,
                tools,
                hub,
                config: Arc::new(server_config),
                started: Instant::now(),
            },
        }
    }

    /// Dispatch a raw request body, as `POST /rpc` would.
    pub fn body(&self, raw: &str) -> RpcReply {
        rpc::handle_body(&self.ctx, raw, None)
    }

    /// Dispatch one request value. `None` means the request was a notification.
    pub fn dispatch(&self, req: Value) -> Option<(Value, Option<ErrorCode>)> {
        rpc::dispatch_request(&self.ctx, &req, None)
    }

    /// Dispatch with an explicit tool-auth context.
    pub fn dispatch_as(
        &self,
        req: Value,
        tool_ctx: &ToolContext,
    ) -> Option<(Value, Option<ErrorCode>)> {
        rpc::dispatch_request(&self.ctx, &req, Some(tool_ctx))
    }

    /// Enveloped call; panics if the method failed.
    pub fn call(&self, method: &str, params: Value) -> Value {
        let (resp, err) = self
            .dispatch(json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params }))
            .expect("expected a response");
        assert!(err.is_none(), "{method} failed: {resp}");
        resp["result"].clone()
    }

    /// Enveloped call that must fail; returns the error object.
    pub fn call_err(&self, method: &str, params: Value) -> Value {
        let (resp, err) = self
            .dispatch(json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params }))
            .expect("expected a response");
        assert!(err.is_some(), "{method} unexpectedly succeeded: {resp}");
        resp["error"].clone()
    }
}
