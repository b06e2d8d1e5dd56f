//! Execution contract for the `do` tool.
//!
//! The real sandbox is an external collaborator; the server only fixes the
//! contract: code runs against a scoped [`FsCapability`] and produces a
//! `{success, value|error, logs, duration}` outcome. The shipped
//! [`ExprExecutor`] evaluates a single `fs.<op>(…)` call expression, which is
//! enough to drive the capability surface end to end.

use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use strata_core::{FsCapability, FsError, FsResult, ListOptions, SearchOptions, TreeOptions, TreeOutput};

#[derive(Debug, Serialize)]
pub struct ExecOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub logs: Vec<String>,
    pub duration: u64,
}

pub trait CodeExecutor: Send + Sync {
    fn execute(&self, code: &str, fs: &FsCapability) -> ExecOutcome;
}

/// Evaluates exactly one `fs.<op>(arg, …)` expression with JSON-literal
/// arguments, e.g. `fs.write("/notes.txt", "hello")`.
pub struct ExprExecutor;

impl CodeExecutor for ExprExecutor {
    fn execute(&self, code: &str, fs: &FsCapability) -> ExecOutcome {
        let start = Instant::now();
        let mut logs = Vec::new();
        let result = run_expression(code, fs, &mut logs);
        let duration = start.elapsed().as_millis() as u64;
        match result {
            Ok(value) => {
                ExecOutcome { success: true, value: Some(value), error: None, logs, duration }
            }
            Err(e) => ExecOutcome {
                success: false,
                value: None,
                error: Some(e.message),
                logs,
                duration,
            },
        }
    }
}

fn run_expression(code: &str, fs: &FsCapability, logs: &mut Vec<String>) -> FsResult<Value> {
    let code = code.trim();
    let body = code
        .strip_prefix("fs.")
        .ok_or_else(|| FsError::invalid("expression must start with 'fs.'"))?;
    let open = body
        .find('(')
        .ok_or_else(|| FsError::invalid("expression must be a call: fs.<op>(...)"))?;
    if !body.ends_with(')') {
        return Err(FsError::invalid("expression must end with ')'"));
    }
    let op = &body[..open];
    let inner = &body[open + 1..body.len() - 1];
    let args: Vec<Value> = if inner.trim().is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(&format!("[{inner}]"))
            .map_err(|e| FsError::invalid(format!("arguments must be JSON literals: {e}")))?
    };

    let arg_str = |i: usize, name: &str| -> FsResult<String> {
        args.get(i)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| FsError::invalid(format!("fs.{op} requires a string '{name}' argument")))
    };
    let arg_bool = |i: usize| args.get(i).and_then(Value::as_bool).unwrap_or(false);

    logs.push(format!("fs.{op}({inner})"));

    match op {
        "read" => {
            let path = arg_str(0, "path")?;
            let bytes = fs.read(&path)?;
            Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        }
        "write" => {
            let path = arg_str(0, "path")?;
            let content = arg_str(1, "content")?;
            let result = fs.write(&path, content.as_bytes())?;
            Ok(json!({ "written": result.size, "tier": result.tier }))
        }
        "append" => {
            let path = arg_str(0, "path")?;
            let content = arg_str(1, "content")?;
            let result = fs.append(&path, content.as_bytes())?;
            Ok(json!({ "size": result.size }))
        }
        "delete" => {
            let path = arg_str(0, "path")?;
            fs.delete(&path, arg_bool(1))?;
            Ok(json!({ "deleted": path }))
        }
        "move" => {
            let from = arg_str(0, "from")?;
            let to = arg_str(1, "to")?;
            fs.move_entry(&from, &to)?;
            Ok(json!({ "from": from, "to": to }))
        }
        "copy" => {
            let from = arg_str(0, "from")?;
            let to = arg_str(1, "to")?;
            fs.copy(&from, &to)?;
            Ok(json!({ "from": from, "to": to }))
        }
        "mkdir" => {
            let path = arg_str(0, "path")?;
            fs.mkdir(&path, arg_bool(1))?;
            Ok(json!({ "created": path }))
        }
        "stat" => {
            let path = arg_str(0, "path")?;
            serde_json::to_value(fs.stat(&path)?)
                .map_err(|e| FsError::internal(format!("stat serialization failed: {e}")))
        }
        "list" => {
            let path = arg_str(0, "path")?;
            let result = fs.list(&path, &ListOptions::default())?;
            serde_json::to_value(result)
                .map_err(|e| FsError::internal(format!("list serialization failed: {e}")))
        }
        "tree" => {
            let path = arg_str(0, "path")?;
            match fs.tree(&path, &TreeOptions::default())? {
                TreeOutput::Ascii(text) => Ok(Value::String(text)),
                TreeOutput::Json(v) => Ok(v),
            }
        }
        "search" => {
            let pattern = arg_str(0, "pattern")?;
            let root = args.get(1).and_then(Value::as_str).unwrap_or("/");
            let matches = fs.search(root, &pattern, &SearchOptions::default())?;
            serde_json::to_value(matches)
                .map_err(|e| FsError::internal(format!("search serialization failed: {e}")))
        }
        "exists" => {
            let path = arg_str(0, "path")?;
            serde_json::to_value(fs.exists(&path, None, true)?)
                .map_err(|e| FsError::internal(format!("exists serialization failed: {e}")))
        }
        other => Err(FsError::invalid(format!("unknown operation: fs.{other}"))),
    }
}
