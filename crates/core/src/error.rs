//! Error taxonomy shared by the engine and every transport.
//!
//! Each failure carries a stable symbolic code (the POSIX-shaped subset plus
//! the transport codes), a human message, and — when the failure is about a
//! concrete filesystem object — the offending path. Codes propagate unchanged
//! to clients; transports only decide how to wrap them.

use serde::Serialize;
use thiserror::Error;

/// Symbolic error codes. The `as_str` form is what goes over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Enoent,
    Eexist,
    Eisdir,
    Enotdir,
    Enotempty,
    Einval,
    Eperm,
    Eacces,
    Eloop,
    ParseError,
    InvalidRequest,
    MethodNotFound,
    AuthRequired,
    PermissionDenied,
    InvalidToken,
    InvalidSignature,
    TokenExpired,
    MissingTenant,
    Timeout,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Enoent => "ENOENT",
            ErrorCode::Eexist => "EEXIST",
            ErrorCode::Eisdir => "EISDIR",
            ErrorCode::Enotdir => "ENOTDIR",
            ErrorCode::Enotempty => "ENOTEMPTY",
            ErrorCode::Einval => "EINVAL",
            ErrorCode::Eperm => "EPERM",
            ErrorCode::Eacces => "EACCES",
            ErrorCode::Eloop => "ELOOP",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::MethodNotFound => "METHOD_NOT_FOUND",
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::MissingTenant => "MISSING_TENANT",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filesystem-service error: symbolic code, message, optional path.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{code}: {message}")]
pub struct FsError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        FsError { code, message: message.into(), path: None }
    }

    pub fn with_path(code: ErrorCode, message: impl Into<String>, path: impl Into<String>) -> Self {
        FsError { code, message: message.into(), path: Some(path.into()) }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        FsError::with_path(ErrorCode::Enoent, format!("no such file or directory: {path}"), path)
    }

    pub fn exists(path: impl Into<String>) -> Self {
        let path = path.into();
        FsError::with_path(ErrorCode::Eexist, format!("file already exists: {path}"), path)
    }

    pub fn is_dir(path: impl Into<String>) -> Self {
        let path = path.into();
        FsError::with_path(ErrorCode::Eisdir, format!("is a directory: {path}"), path)
    }

    pub fn not_dir(path: impl Into<String>) -> Self {
        let path = path.into();
        FsError::with_path(ErrorCode::Enotdir, format!("not a directory: {path}"), path)
    }

    pub fn not_empty(path: impl Into<String>) -> Self {
        let path = path.into();
        FsError::with_path(ErrorCode::Enotempty, format!("directory not empty: {path}"), path)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        FsError::new(ErrorCode::Einval, message)
    }

    pub fn access_denied(path: impl Into<String>, message: impl Into<String>) -> Self {
        FsError { code: ErrorCode::Eacces, message: message.into(), path: Some(path.into()) }
    }

    pub fn symlink_loop(path: impl Into<String>) -> Self {
        let path = path.into();
        FsError::with_path(ErrorCode::Eloop, format!("too many levels of symbolic links: {path}"), path)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        FsError::new(ErrorCode::InternalError, message)
    }

    /// Wire envelope: `{code, message, path?}`.
    pub fn to_envelope(&self) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "code": self.code.as_str(),
            "message": self.message,
        });
        if let Some(ref p) = self.path {
            obj["path"] = serde_json::Value::String(p.clone());
        }
        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_includes_path_only_when_set() {
        let err = FsError::not_found("/a/b");
        let env = err.to_envelope();
        assert_eq!(env["code"], "ENOENT");
        assert_eq!(env["path"], "/a/b");

        let err = FsError::invalid("bad argument");
        let env = err.to_envelope();
        assert_eq!(env["code"], "EINVAL");
        assert!(env.get("path").is_none());
    }

    #[test]
    fn display_carries_code_and_message() {
        let err = FsError::exists("/x");
        let text = err.to_string();
        assert!(text.starts_with("EEXIST:"), "unexpected display: {text}");
    }
}
