//! Named capability dispatch for programmatic agents.
//!
//! Three built-in tools (`search`, `fetch`, `do`) plus runtime registration
//! of additional ones. Dispatch normalizes the tool name, authorizes against
//! the caller's scopes, validates arguments against the tool's schema, and
//! wraps handler output in text content blocks.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, RwLock};

use regex::Regex;
use serde_json::{json, Value};
use strata_core::{
    ErrorCode, FsCapability, FsError, FsResult, FsScope, SearchOptions, TreeOptions, TreeOutput,
};
use tracing::debug;

use crate::sandbox::CodeExecutor;

static TOOL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("tool name regex"));

pub const BUILTIN_TOOLS: &[&str] = &["search", "fetch", "do"];

/// Scope a tool requires. `write` and `admin` also satisfy `read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredScope {
    Read,
    Write,
    Admin,
}

impl RequiredScope {
    fn as_str(self) -> &'static str {
        match self {
            RequiredScope::Read => "read",
            RequiredScope::Write => "write",
            RequiredScope::Admin => "admin",
        }
    }
}

/// Per-invocation caller identity as established by the transport.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub authenticated: bool,
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub scopes: Vec<String>,
    pub anonymous_allowed: bool,
}

impl ToolContext {
    pub fn anonymous() -> Self {
        ToolContext {
            authenticated: false,
            user_id: None,
            tenant_id: None,
            scopes: Vec::new(),
            anonymous_allowed: true,
        }
    }

    fn has_scope(&self, required: RequiredScope) -> bool {
        let satisfied_by: &[&str] = match required {
            RequiredScope::Read => &["read", "write", "admin"],
            RequiredScope::Write => &["write", "admin"],
            RequiredScope::Admin => &["admin"],
        };
        self.scopes.iter().any(|token| {
            let base = token.rsplit(':').next().unwrap_or(token);
            satisfied_by.contains(&base)
        })
    }
}

#[derive(Clone)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub schema: Value,
    pub scope: RequiredScope,
}

type ToolHandler =
    Arc<dyn Fn(&Value, &FsCapability, Option<&ToolContext>) -> (Vec<String>, bool) + Send + Sync>;

struct RegisteredTool {
    def: ToolDef,
    handler: ToolHandler,
    builtin: bool,
}

type AuthFailureCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, RegisteredTool>>,
    allow_anonymous_read: bool,
    strict: bool,
    executor: Arc<dyn CodeExecutor>,
    on_auth_failure: RwLock<Option<AuthFailureCallback>>,
}

impl ToolRegistry {
    pub fn new(
        allow_anonymous_read: bool,
        strict: bool,
        executor: Arc<dyn CodeExecutor>,
    ) -> Self {
        let registry = ToolRegistry {
            tools: RwLock::new(BTreeMap::new()),
            allow_anonymous_read,
            strict,
            executor,
            on_auth_failure: RwLock::new(None),
        };
        registry.install_builtins();
        registry
    }

    pub fn set_auth_failure_callback(&self, cb: AuthFailureCallback) {
        *self.on_auth_failure.write().unwrap_or_else(|p| p.into_inner()) = Some(cb);
    }

    /// Register a tool. Names must match `[A-Za-z_][A-Za-z0-9_-]*`; duplicate
    /// registration fails until the name is unregistered.
    pub fn register(&self, def: ToolDef, handler: ToolHandler) -> FsResult<()> {
        self.register_inner(def, handler, false)
    }

    fn register_inner(&self, def: ToolDef, handler: ToolHandler, builtin: bool) -> FsResult<()> {
        if !TOOL_NAME_RE.is_match(&def.name) {
            return Err(FsError::invalid(format!("invalid tool name: {:?}", def.name)));
        }
        let mut tools = self.tools.write().unwrap_or_else(|p| p.into_inner());
        if tools.contains_key(&def.name) {
            return Err(FsError::new(
                ErrorCode::Eexist,
                format!("tool already registered: {}", def.name),
            ));
        }
        tools.insert(def.name.clone(), RegisteredTool { def, handler, builtin });
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.tools
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(name)
            .is_some()
    }

    /// Drop every registered tool except the built-ins.
    pub fn clear(&self) {
        self.tools
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .retain(|_, t| t.builtin);
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn definitions(&self) -> Value {
        let tools = self.tools.read().unwrap_or_else(|p| p.into_inner());
        Value::Array(
            tools
                .values()
                .map(|t| {
                    json!({
                        "name": t.def.name,
                        "description": t.def.description,
                        "inputSchema": t.def.schema,
                        "requiredScope": t.def.scope.as_str(),
                    })
                })
                .collect(),
        )
    }

    /// Dispatch a tool call. The result is an MCP-style content envelope:
    /// `{content: [{type: "text", text}…], isError}`.
    pub fn dispatch(
        &self,
        name: &str,
        params: &Value,
        capability: &FsCapability,
        context: Option<&ToolContext>,
    ) -> Value {
        let wanted = name.trim();
        let tools = self.tools.read().unwrap_or_else(|p| p.into_inner());
        let tool = tools
            .values()
            .find(|t| t.def.name.eq_ignore_ascii_case(wanted));
        let Some(tool) = tool else {
            return error_result(&format!("Unknown tool: {wanted}"));
        };

        if let Some(ctx) = context {
            if let Err(e) = self.authorize(&tool.def, ctx) {
                if let Some(cb) = self
                    .on_auth_failure
                    .read()
                    .unwrap_or_else(|p| p.into_inner())
                    .as_ref()
                {
                    cb(&tool.def.name, e.code.as_str());
                }
                return json!({
                    "content": [{ "type": "text", "text": e.message }],
                    "isError": true,
                    "code": e.code.as_str(),
                });
            }
        }

        if let Err(e) = self.validate_args(&tool.def, params) {
            return error_result(&e.message);
        }

        debug!(tool = tool.def.name.as_str(), "tool dispatch");
        let (blocks, is_error) = (tool.handler)(params, capability, context);
        json!({
            "content": blocks
                .into_iter()
                .map(|text| json!({ "type": "text", "text": text }))
                .collect::<Vec<_>>(),
            "isError": is_error,
        })
    }

    fn authorize(&self, def: &ToolDef, ctx: &ToolContext) -> FsResult<()> {
        if !ctx.authenticated {
            let anonymous_ok = def.scope == RequiredScope::Read
                && ctx.anonymous_allowed
                && self.allow_anonymous_read;
            if anonymous_ok {
                return Ok(());
            }
            return Err(FsError::new(
                ErrorCode::AuthRequired,
                format!("authentication required for tool '{}'", def.name),
            ));
        }
        if !ctx.has_scope(def.scope) {
            return Err(FsError::new(
                ErrorCode::PermissionDenied,
                format!("scope '{}' required for tool '{}'", def.scope.as_str(), def.name),
            ));
        }
        Ok(())
    }

    /// Check required properties; in strict mode also their JSON types.
    fn validate_args(&self, def: &ToolDef, params: &Value) -> FsResult<()> {
        let schema = &def.schema;
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if params.get(key).is_none() {
                    return Err(FsError::invalid(format!(
                        "missing required argument '{key}' for tool '{}'",
                        def.name
                    )));
                }
            }
        }
        if self.strict {
            if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                for (key, prop) in props {
                    let Some(value) = params.get(key) else { continue };
                    let Some(expected) = prop.get("type").and_then(Value::as_str) else {
                        continue;
                    };
                    let ok = match expected {
                        "string" => value.is_string(),
                        "integer" => value.is_i64() || value.is_u64(),
                        "number" => value.is_number(),
                        "boolean" => value.is_boolean(),
                        "array" => value.is_array(),
                        "object" => value.is_object(),
                        _ => true,
                    };
                    if !ok {
                        return Err(FsError::invalid(format!(
                            "argument '{key}' must be a {expected}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Built-in tools
    // -----------------------------------------------------------------------

    fn install_builtins(&self) {
        self.register_inner(
            ToolDef {
                name: "search".to_string(),
                description: "Find files by glob pattern, or by content with a 'grep:' prefix. \
                              Returns one matching path per line plus a match-count summary."
                    .to_string(),
                schema: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Glob pattern (e.g. '**/*.md') or 'grep:<substring>' for content search" },
                        "path": { "type": "string", "description": "Directory to search under (default: /)" },
                        "limit": { "type": "integer", "description": "Max results (default: 100)" }
                    },
                    "required": ["query"]
                }),
                scope: RequiredScope::Read,
            },
            Arc::new(handle_search),
            true,
        )
        .expect("builtin search registers");

        self.register_inner(
            ToolDef {
                name: "fetch".to_string(),
                description: "Fetch a resource: file content (pretty-printed when JSON) with a \
                              metadata block, or a tree view for directories."
                    .to_string(),
                schema: json!({
                    "type": "object",
                    "properties": {
                        "resource": { "type": "string", "description": "Absolute path of the file or directory" }
                    },
                    "required": ["resource"]
                }),
                scope: RequiredScope::Read,
            },
            Arc::new(handle_fetch),
            true,
        )
        .expect("builtin fetch registers");

        let executor = Arc::clone(&self.executor);
        self.register_inner(
            ToolDef {
                name: "do".to_string(),
                description: "Execute a filesystem expression (fs.read, fs.write, fs.mkdir, …) \
                              under a scoped policy. Returns {success, value|error, logs, duration}."
                    .to_string(),
                schema: json!({
                    "type": "object",
                    "properties": {
                        "code": { "type": "string", "description": "Expression, e.g. fs.write(\"/a.txt\", \"hello\")" },
                        "scope": { "type": "object", "description": "Policy override: {allowWrite, allowDelete, allowedPaths}" }
                    },
                    "required": ["code"]
                }),
                scope: RequiredScope::Write,
            },
            Arc::new(move |params, capability, _ctx| handle_do(&*executor, params, capability)),
            true,
        )
        .expect("builtin do registers");
    }
}

fn error_result(message: &str) -> Value {
    json!({
        "content": [{ "type": "text", "text": message }],
        "isError": true,
    })
}

// ---------------------------------------------------------------------------
// search
// ---------------------------------------------------------------------------

fn handle_search(
    params: &Value,
    capability: &FsCapability,
    _ctx: Option<&ToolContext>,
) -> (Vec<String>, bool) {
    let query = params["query"].as_str().unwrap_or("");
    let root = params["path"].as_str().unwrap_or("/");
    let limit = params["limit"].as_u64().unwrap_or(100) as usize;

    let (pattern, opts) = match query.strip_prefix("grep:") {
        Some(needle) => (
            "*".to_string(),
            SearchOptions {
                content_search: Some(needle.to_string()),
                limit: Some(limit),
                case_sensitive: false,
                ..SearchOptions::default()
            },
        ),
        None => (
            query.to_string(),
            SearchOptions { limit: Some(limit), ..SearchOptions::default() },
        ),
    };

    match capability.search(root, &pattern, &opts) {
        Err(e) => (vec![format!("Error: {}", e.message)], true),
        Ok(matches) => {
            let total: usize = matches
                .iter()
                .map(|m| m.match_count.unwrap_or(1))
                .sum();
            let mut lines: Vec<String> = matches
                .iter()
                .map(|m| match m.match_count {
                    Some(count) => format!("{}  ({count} matches)", m.path),
                    None => m.path.clone(),
                })
                .collect();
            lines.push(format!("found {total} matches"));
            (vec![lines.join("\n")], false)
        }
    }
}

// ---------------------------------------------------------------------------
// fetch
// ---------------------------------------------------------------------------

fn handle_fetch(
    params: &Value,
    capability: &FsCapability,
    _ctx: Option<&ToolContext>,
) -> (Vec<String>, bool) {
    let resource = params["resource"].as_str().unwrap_or("");

    let stat = match capability.stat(resource) {
        Ok(stat) => stat,
        Err(e) => return (vec![format!("Error: {}", e.message)], true),
    };

    if stat.is_directory {
        return match capability.tree(resource, &TreeOptions::default()) {
            Ok(TreeOutput::Ascii(text)) => (vec![text], false),
            Ok(TreeOutput::Json(v)) => (vec![v.to_string()], false),
            Err(e) => (vec![format!("Error: {}", e.message)], true),
        };
    }

    let bytes = match capability.read(resource) {
        Ok(bytes) => bytes,
        Err(e) => return (vec![format!("Error: {}", e.message)], true),
    };
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let content = match serde_json::from_str::<Value>(&text) {
        Ok(parsed) => serde_json::to_string_pretty(&parsed).unwrap_or(text),
        Err(_) => text,
    };

    let meta = capability
        .engine()
        .metadata(resource)
        .ok()
        .flatten();
    let metadata = json!({
        "path": resource,
        "size": stat.size,
        "mtime": stat.mtime,
        "mode": format!("{:o}", stat.mode),
        "tier": meta.as_ref().map(|m| m.tier),
        "contentHash": meta.as_ref().and_then(|m| m.content_hash.clone()),
        "accessCount": meta.as_ref().map(|m| m.access_count),
    });

    (vec![content, metadata.to_string()], false)
}

// ---------------------------------------------------------------------------
// do
// ---------------------------------------------------------------------------

fn handle_do(
    executor: &dyn CodeExecutor,
    params: &Value,
    capability: &FsCapability,
) -> (Vec<String>, bool) {
    let Some(code) = params["code"].as_str() else {
        return (vec!["Error: 'code' must be a string".to_string()], true);
    };

    let scope = match params.get("scope") {
        None => FsScope::default(),
        Some(s) => FsScope {
            allow_write: s["allowWrite"].as_bool().unwrap_or(true),
            allow_delete: s["allowDelete"].as_bool().unwrap_or(true),
            allowed_paths: s["allowedPaths"].as_array().map(|paths| {
                paths
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            }),
        },
    };
    let scoped = FsCapability::new(Arc::clone(capability.engine()), scope);

    let outcome = executor.execute(code, &scoped);
    let success = outcome.success;
    let text = serde_json::to_string(&outcome)
        .unwrap_or_else(|e| format!("{{\"success\":false,\"error\":\"{e}\"}}"));
    (vec![text], !success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::ExprExecutor;
    use strata_core::{EngineConfig, VirtualFs};

    fn registry() -> ToolRegistry {
        ToolRegistry::new(true, false, Arc::new(ExprExecutor))
    }

    fn capability() -> FsCapability {
        let fs = VirtualFs::in_memory(EngineConfig::default());
        fs.mkdir("/docs", false, None).unwrap();
        fs.write_file("/docs/a.md", b"alpha beta", None).unwrap();
        fs.write_file("/docs/b.md", b"beta beta", None).unwrap();
        fs.write_file("/config.json", b"{\"key\": \"value\"}", None).unwrap();
        FsCapability::new(Arc::new(fs), FsScope::default())
    }

    fn text_of(result: &Value) -> String {
        result["content"][0]["text"].as_str().unwrap_or("").to_string()
    }

    #[test]
    fn name_validation_rules() {
        let r = registry();
        for bad in ["", "9tool", "has space", "dot.ted", "sla/sh", "-lead"] {
            let err = r
                .register(
                    ToolDef {
                        name: bad.to_string(),
                        description: String::new(),
                        schema: json!({}),
                        scope: RequiredScope::Read,
                    },
                    Arc::new(|_, _, _| (vec![String::new()], false)),
                )
                .unwrap_err();
            assert_eq!(err.code, ErrorCode::Einval, "expected rejection for {bad:?}");
        }
        for good in ["tool", "_private", "with-dash", "with_underscore9"] {
            r.register(
                ToolDef {
                    name: good.to_string(),
                    description: String::new(),
                    schema: json!({}),
                    scope: RequiredScope::Read,
                },
                Arc::new(|_, _, _| (vec![String::new()], false)),
            )
            .unwrap_or_else(|e| panic!("expected {good:?} to register: {e}"));
        }
    }

    #[test]
    fn duplicate_registration_requires_unregister() {
        let r = registry();
        let def = || ToolDef {
            name: "custom".to_string(),
            description: String::new(),
            schema: json!({}),
            scope: RequiredScope::Read,
        };
        r.register(def(), Arc::new(|_, _, _| (vec![String::new()], false))).unwrap();
        let err = r
            .register(def(), Arc::new(|_, _, _| (vec![String::new()], false)))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Eexist);

        assert!(r.unregister("custom"));
        r.register(def(), Arc::new(|_, _, _| (vec![String::new()], false))).unwrap();
    }

    #[test]
    fn clear_preserves_builtins() {
        let r = registry();
        r.register(
            ToolDef {
                name: "extra".to_string(),
                description: String::new(),
                schema: json!({}),
                scope: RequiredScope::Read,
            },
            Arc::new(|_, _, _| (vec![String::new()], false)),
        )
        .unwrap();
        r.clear();
        let names = r.tool_names();
        assert_eq!(names, vec!["do", "fetch", "search"]);
    }

    #[test]
    fn dispatch_normalizes_names() {
        let r = registry();
        let cap = capability();
        let result = r.dispatch("  SEARCH  ", &json!({ "query": "*.md", "path": "/docs" }), &cap, None);
        assert_eq!(result["isError"], false);
        assert!(text_of(&result).contains("a.md"));
    }

    #[test]
    fn search_glob_and_grep_modes() {
        let r = registry();
        let cap = capability();

        let result = r.dispatch("search", &json!({ "query": "*.md", "path": "/docs" }), &cap, None);
        let text = text_of(&result);
        assert!(text.contains("/docs/a.md"));
        assert!(text.contains("found 2 matches"));

        let result = r.dispatch("search", &json!({ "query": "grep:beta" }), &cap, None);
        let text = text_of(&result);
        assert!(text.contains("/docs/b.md  (2 matches)"));
        assert!(text.contains("found 3 matches"));
    }

    #[test]
    fn fetch_pretty_prints_json_with_metadata_block() {
        let r = registry();
        let cap = capability();
        let result = r.dispatch("fetch", &json!({ "resource": "/config.json" }), &cap, None);
        assert_eq!(result["isError"], false);
        let content = result["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        let body = content[0]["text"].as_str().unwrap();
        assert!(body.contains("\n"), "expected pretty-printed JSON: {body}");
        let meta: Value = serde_json::from_str(content[1]["text"].as_str().unwrap()).unwrap();
        assert_eq!(meta["path"], "/config.json");
        assert!(meta["contentHash"].is_string());
    }

    #[test]
    fn fetch_directory_renders_tree() {
        let r = registry();
        let cap = capability();
        let result = r.dispatch("fetch", &json!({ "resource": "/docs" }), &cap, None);
        let text = text_of(&result);
        assert!(text.contains("└── ") || text.contains("├── "));
    }

    #[test]
    fn do_executes_and_reports_outcome() {
        let r = registry();
        let cap = capability();
        let result =
            r.dispatch("do", &json!({ "code": "fs.write(\"/out.txt\", \"done\")" }), &cap, None);
        assert_eq!(result["isError"], false);
        let outcome: Value = serde_json::from_str(&text_of(&result)).unwrap();
        assert_eq!(outcome["success"], true);
        assert!(outcome["duration"].is_u64());
        assert_eq!(cap.read("/out.txt").unwrap(), b"done");
    }

    #[test]
    fn do_scope_violation_reports_permission_denied() {
        let r = registry();
        let cap = capability();
        let result = r.dispatch(
            "do",
            &json!({
                "code": "fs.write(\"/out.txt\", \"nope\")",
                "scope": { "allowWrite": false }
            }),
            &cap,
            None,
        );
        assert_eq!(result["isError"], true);
        let outcome: Value = serde_json::from_str(&text_of(&result)).unwrap();
        assert_eq!(outcome["success"], false);
        assert!(outcome["error"].as_str().unwrap().contains("permission denied"));
    }

    #[test]
    fn missing_required_argument_is_reported() {
        let r = registry();
        let cap = capability();
        let result = r.dispatch("search", &json!({}), &cap, None);
        assert_eq!(result["isError"], true);
        assert!(text_of(&result).contains("query"));
    }

    #[test]
    fn strict_mode_checks_types() {
        let r = ToolRegistry::new(true, true, Arc::new(ExprExecutor));
        let cap = capability();
        let result = r.dispatch("search", &json!({ "query": 42 }), &cap, None);
        assert_eq!(result["isError"], true);
        assert!(text_of(&result).contains("string"));
    }

    #[test]
    fn unknown_tool_is_an_error_result() {
        let r = registry();
        let cap = capability();
        let result = r.dispatch("nope", &json!({}), &cap, None);
        assert_eq!(result["isError"], true);
        assert!(text_of(&result).contains("Unknown tool"));
    }

    #[test]
    fn anonymous_read_policy() {
        let cap = capability();
        let anon = ToolContext::anonymous();

        // Server allows anonymous read.
        let r = registry();
        let result = r.dispatch("search", &json!({ "query": "*.md" }), &cap, Some(&anon));
        assert_eq!(result["isError"], false);

        // Server forbids anonymous read.
        let r = ToolRegistry::new(false, false, Arc::new(ExprExecutor));
        let result = r.dispatch("search", &json!({ "query": "*.md" }), &cap, Some(&anon));
        assert_eq!(result["code"], "AUTH_REQUIRED");

        // Write tools always require authentication.
        let r = registry();
        let result = r.dispatch("do", &json!({ "code": "fs.read(\"/x\")" }), &cap, Some(&anon));
        assert_eq!(result["code"], "AUTH_REQUIRED");
    }

    #[test]
    fn scope_satisfaction_rules() {
        let cap = capability();
        let r = registry();
        let ctx = |scopes: &[&str]| ToolContext {
            authenticated: true,
            user_id: Some("u".to_string()),
            tenant_id: Some("t".to_string()),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            anonymous_allowed: false,
        };

        // write satisfies read.
        let result =
            r.dispatch("search", &json!({ "query": "*" }), &cap, Some(&ctx(&["write"])));
        assert_eq!(result["isError"], false);

        // Prefixed scope token satisfies its base.
        let result = r.dispatch(
            "do",
            &json!({ "code": "fs.exists(\"/docs\")" }),
            &cap,
            Some(&ctx(&["files:write"])),
        );
        assert_eq!(result["isError"], false);

        // read does not satisfy write.
        let result = r.dispatch(
            "do",
            &json!({ "code": "fs.exists(\"/docs\")" }),
            &cap,
            Some(&ctx(&["read"])),
        );
        assert_eq!(result["code"], "PERMISSION_DENIED");
    }

    #[test]
    fn auth_failure_callback_fires() {
        let r = ToolRegistry::new(false, false, Arc::new(ExprExecutor));
        let cap = capability();
        let seen = Arc::new(std::sync::Mutex::new(Vec::<(String, String)>::new()));
        let seen_cb = Arc::clone(&seen);
        r.set_auth_failure_callback(Arc::new(move |tool, code| {
            seen_cb.lock().unwrap().push((tool.to_string(), code.to_string()));
        }));

        let anon = ToolContext::anonymous();
        r.dispatch("search", &json!({ "query": "*" }), &cap, Some(&anon));
        let calls = seen.lock().unwrap();
        assert_eq!(calls.as_slice(), &[("search".to_string(), "AUTH_REQUIRED".to_string())]);
    }
}
