//! JSON-RPC 2.0 request routing.
//!
//! Accepts a single request object or a non-empty batch array. Requests that
//! declare `"jsonrpc": "2.0"` get the full response envelope; requests that
//! omit it get the bare result object (compatibility mode). Requests without
//! an `id` are notifications and produce no response body. Method names are
//! case-sensitive; names beginning with `_` are reserved and hidden.

use serde_json::{json, Value};
use strata_core::{ErrorCode, FsCapability, FsError, FsResult, FsScope, TierKind};
use std::sync::Arc;

use crate::state::AppContext;
use crate::tools::ToolContext;

/// Registered method names, kept stable.
pub const METHODS: &[&str] = &[
    "readFile", "writeFile", "mkdir", "rmdir", "readdir", "stat", "lstat", "unlink", "rename",
    "copyFile", "chmod", "chown", "utimes", "symlink", "readlink", "truncate", "access",
    "realpath", "rm", "link", "demote", "stats", "search", "fetch", "do",
];

/// Positional parameter names per method, for array-form `params`.
fn positional_names(method: &str) -> &'static [&'static str] {
    match method {
        "writeFile" => &["path", "content", "mode"],
        "rename" => &["oldPath", "newPath"],
        "copyFile" => &["src", "dest"],
        "chmod" => &["path", "mode"],
        "chown" => &["path", "uid", "gid"],
        "utimes" => &["path", "atime", "mtime"],
        "symlink" => &["target", "path"],
        "truncate" => &["path", "length"],
        "link" => &["existingPath", "newPath"],
        "demote" => &["path", "tier"],
        "mkdir" | "rmdir" | "rm" => &["path", "recursive"],
        "search" => &["query", "path", "limit"],
        "fetch" => &["resource"],
        "do" => &["code"],
        _ => &["path"],
    }
}

/// A fully-formed HTTP reply: status plus an optional JSON body.
#[derive(Debug)]
pub struct RpcReply {
    pub status: u16,
    pub body: Option<Value>,
}

/// HTTP status for a symbolic error code.
pub fn status_for(code: ErrorCode) -> u16 {
    match code {
        ErrorCode::Enoent
        | ErrorCode::Eexist
        | ErrorCode::Enotdir
        | ErrorCode::Eisdir
        | ErrorCode::Enotempty
        | ErrorCode::Einval
        | ErrorCode::Eperm
        | ErrorCode::Eloop
        | ErrorCode::ParseError
        | ErrorCode::InvalidRequest => 400,
        ErrorCode::Eacces
        | ErrorCode::AuthRequired
        | ErrorCode::PermissionDenied
        | ErrorCode::InvalidToken
        | ErrorCode::InvalidSignature
        | ErrorCode::TokenExpired
        | ErrorCode::MissingTenant => 403,
        ErrorCode::MethodNotFound => 404,
        ErrorCode::Timeout | ErrorCode::InternalError => 500,
    }
}

/// Handle a raw request body end to end.
pub fn handle_body(ctx: &AppContext, body: &str, tool_ctx: Option<&ToolContext>) -> RpcReply {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            let err = FsError::new(ErrorCode::ParseError, format!("invalid JSON: {e}"));
            return RpcReply { status: 400, body: Some(err.to_envelope()) };
        }
    };

    match parsed {
        Value::Array(requests) => {
            if requests.is_empty() {
                let err = FsError::new(ErrorCode::InvalidRequest, "empty batch");
                return RpcReply { status: 400, body: Some(err.to_envelope()) };
            }
            // Responses preserve request order; notifications produce none.
            let responses: Vec<Value> = requests
                .iter()
                .filter_map(|req| dispatch_request(ctx, req, tool_ctx).map(|(v, _)| v))
                .collect();
            if responses.is_empty() {
                RpcReply { status: 204, body: None }
            } else {
                RpcReply { status: 200, body: Some(Value::Array(responses)) }
            }
        }
        req @ Value::Object(_) => match dispatch_request(ctx, &req, tool_ctx) {
            None => RpcReply { status: 204, body: None },
            Some((value, error)) => RpcReply {
                status: error.map_or(200, status_for),
                body: Some(value),
            },
        },
        _ => {
            let err = FsError::new(ErrorCode::InvalidRequest, "request body must be an object or array");
            RpcReply { status: 400, body: Some(err.to_envelope()) }
        }
    }
}

/// Dispatch one request. Returns `None` for notifications, otherwise the
/// response value and the error code (if the call failed) for status mapping.
pub fn dispatch_request(
    ctx: &AppContext,
    req: &Value,
    tool_ctx: Option<&ToolContext>,
) -> Option<(Value, Option<ErrorCode>)> {
    let Some(obj) = req.as_object() else {
        let err = FsError::new(ErrorCode::InvalidRequest, "request must be an object");
        return Some((err.to_envelope(), Some(ErrorCode::InvalidRequest)));
    };

    let enveloped = obj.get("jsonrpc").and_then(Value::as_str) == Some("2.0");
    let id = obj.get("id").cloned().filter(|v| !v.is_null());
    let is_notification = id.is_none();

    let method = match obj.get("method") {
        Some(Value::String(m)) if !m.is_empty() => m.as_str(),
        _ => {
            if is_notification {
                return None;
            }
            let err = FsError::new(ErrorCode::InvalidRequest, "method must be a non-empty string");
            return Some(respond_err(enveloped, id, err));
        }
    };

    let outcome = if method.starts_with('_') || !METHODS.contains(&method) {
        Err(FsError::new(ErrorCode::MethodNotFound, format!("unknown method: {method}")))
    } else {
        named_params(method, obj.get("params"))
            .and_then(|params| execute_method(ctx, method, &params, tool_ctx))
    };

    if is_notification {
        return None;
    }

    Some(match outcome {
        Ok(result) => {
            let value = if enveloped {
                json!({ "jsonrpc": "2.0", "id": id, "result": result })
            } else {
                result
            };
            (value, None)
        }
        Err(err) => respond_err(enveloped, id, err),
    })
}

fn respond_err(enveloped: bool, id: Option<Value>, err: FsError) -> (Value, Option<ErrorCode>) {
    let code = err.code;
    let value = if enveloped {
        json!({ "jsonrpc": "2.0", "id": id, "error": err.to_envelope() })
    } else {
        err.to_envelope()
    };
    (value, Some(code))
}

/// Normalize `params` to keyword form. Arrays map positionally.
fn named_params(method: &str, params: Option<&Value>) -> FsResult<Value> {
    match params {
        None => Ok(json!({})),
        Some(obj @ Value::Object(_)) => Ok(obj.clone()),
        Some(Value::Array(items)) => {
            let names = positional_names(method);
            let mut obj = serde_json::Map::new();
            for (i, item) in items.iter().enumerate() {
                let Some(name) = names.get(i) else {
                    return Err(FsError::invalid(format!(
                        "too many positional parameters for {method}"
                    )));
                };
                obj.insert((*name).to_string(), item.clone());
            }
            Ok(Value::Object(obj))
        }
        Some(_) => Err(FsError::new(
            ErrorCode::InvalidRequest,
            "params must be an object or array",
        )),
    }
}

// ---------------------------------------------------------------------------
// Parameter helpers
// ---------------------------------------------------------------------------

fn require_str<'a>(params: &'a Value, key: &str) -> FsResult<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| FsError::invalid(format!("'{key}' must be a string")))
}

fn opt_bool(params: &Value, key: &str) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn opt_mode(params: &Value, key: &str) -> FsResult<Option<u32>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            n.as_u64().map(|m| Some(m as u32)).ok_or_else(|| FsError::invalid("mode must be a non-negative integer"))
        }
        // Octal string form, e.g. "755".
        Some(Value::String(s)) => u32::from_str_radix(s, 8)
            .map(Some)
            .map_err(|_| FsError::invalid(format!("invalid octal mode: {s}"))),
        Some(_) => Err(FsError::invalid("mode must be a number or octal string")),
    }
}

fn require_u64(params: &Value, key: &str) -> FsResult<u64> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| FsError::invalid(format!("'{key}' must be a non-negative integer")))
}

// ---------------------------------------------------------------------------
// Method execution
// ---------------------------------------------------------------------------

fn execute_method(
    ctx: &AppContext,
    method: &str,
    params: &Value,
    tool_ctx: Option<&ToolContext>,
) -> FsResult<Value> {
    let fs = &ctx.fs;
    match method {
        "readFile" => {
            let path = require_str(params, "path")?;
            let read = fs.read_file_detail(path)?;
            Ok(json!({
                "content": String::from_utf8_lossy(&read.data),
                "size": read.data.len(),
                "tier": read.tier,
            }))
        }
        "writeFile" => {
            let path = require_str(params, "path")?;
            let content = require_str(params, "content")?;
            let mode = opt_mode(params, "mode")?;
            let result = fs.write_file(path, content.as_bytes(), mode)?;
            Ok(json!({ "written": result.size, "tier": result.tier, "created": result.created }))
        }
        "mkdir" => {
            let path = require_str(params, "path")?;
            fs.mkdir(path, opt_bool(params, "recursive"), opt_mode(params, "mode")?)?;
            Ok(json!({}))
        }
        "rmdir" => {
            let path = require_str(params, "path")?;
            fs.rmdir(path, opt_bool(params, "recursive"))?;
            Ok(json!({}))
        }
        "readdir" => {
            let path = require_str(params, "path")?;
            let entries = fs.readdir(path)?;
            if opt_bool(params, "withFileTypes") {
                Ok(json!({
                    "entries": entries
                        .into_iter()
                        .map(|(name, t)| json!({ "name": name, "type": t }))
                        .collect::<Vec<_>>()
                }))
            } else {
                Ok(json!({
                    "entries": entries.into_iter().map(|(name, _)| name).collect::<Vec<_>>()
                }))
            }
        }
        "stat" => {
            let path = require_str(params, "path")?;
            to_value(fs.stat(path)?)
        }
        "lstat" => {
            let path = require_str(params, "path")?;
            to_value(fs.lstat(path)?)
        }
        "unlink" => {
            let path = require_str(params, "path")?;
            fs.unlink(path)?;
            Ok(json!({}))
        }
        "rename" => {
            let old = require_str(params, "oldPath")?;
            let new = require_str(params, "newPath")?;
            fs.rename(old, new)?;
            Ok(json!({}))
        }
        "copyFile" => {
            let src = require_str(params, "src")?;
            let dest = require_str(params, "dest")?;
            fs.copy_file(src, dest)?;
            Ok(json!({}))
        }
        "chmod" => {
            let path = require_str(params, "path")?;
            let mode = opt_mode(params, "mode")?
                .ok_or_else(|| FsError::invalid("'mode' is required"))?;
            fs.chmod(path, mode)?;
            Ok(json!({}))
        }
        "chown" => {
            let path = require_str(params, "path")?;
            let uid = require_u64(params, "uid")? as u32;
            let gid = require_u64(params, "gid")? as u32;
            fs.chown(path, uid, gid)?;
            Ok(json!({}))
        }
        "utimes" => {
            let path = require_str(params, "path")?;
            let atime = require_u64(params, "atime")?;
            let mtime = require_u64(params, "mtime")?;
            fs.utimes(path, atime, mtime)?;
            Ok(json!({}))
        }
        "symlink" => {
            let target = require_str(params, "target")?;
            let path = require_str(params, "path")?;
            fs.symlink(target, path)?;
            Ok(json!({}))
        }
        "readlink" => {
            let path = require_str(params, "path")?;
            Ok(json!({ "target": fs.readlink(path)? }))
        }
        "truncate" => {
            let path = require_str(params, "path")?;
            let length = params.get("length").and_then(Value::as_u64).unwrap_or(0);
            fs.truncate(path, length)?;
            Ok(json!({}))
        }
        "access" => {
            let path = require_str(params, "path")?;
            fs.access(path)?;
            Ok(json!({}))
        }
        "realpath" => {
            let path = require_str(params, "path")?;
            Ok(json!({ "path": fs.realpath(path)? }))
        }
        "rm" => {
            let path = require_str(params, "path")?;
            fs.rm(path, opt_bool(params, "recursive"), opt_bool(params, "force"))?;
            Ok(json!({}))
        }
        "link" => {
            let existing = require_str(params, "existingPath")?;
            let new = require_str(params, "newPath")?;
            fs.link(existing, new)?;
            Ok(json!({}))
        }
        "demote" => {
            let path = require_str(params, "path")?;
            let tier_name = require_str(params, "tier")?;
            let tier = TierKind::parse(tier_name)
                .filter(|t| *t != TierKind::Hot)
                .ok_or_else(|| FsError::invalid(format!("invalid demotion tier: {tier_name}")))?;
            let landed = fs.demote(path, tier)?;
            Ok(json!({ "tier": landed }))
        }
        "stats" => {
            let mut stats = serde_json::to_value(fs.stats())
                .map_err(|e| FsError::internal(format!("stats serialization failed: {e}")))?;
            stats["watchConnections"] = json!(ctx.hub.connection_count());
            Ok(stats)
        }
        "search" | "fetch" | "do" => {
            let capability = FsCapability::new(Arc::clone(fs), FsScope::default());
            Ok(ctx.tools.dispatch(method, params, &capability, tool_ctx))
        }
        _ => Err(FsError::new(ErrorCode::MethodNotFound, format!("unknown method: {method}"))),
    }
}

fn to_value<T: serde::Serialize>(value: T) -> FsResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| FsError::internal(format!("serialization failed: {e}")))
}
