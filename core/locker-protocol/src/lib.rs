//! IPC protocol types and validation for stroop-lockerd.
//!
//! Shared by the daemon and its clients so request and response shapes cannot
//! drift apart. The daemon remains the authority on validation; clients reuse
//! the same types to build valid requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;
pub const MAX_PACKAGE_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    ForegroundChanged,
    StartOrGetChallenge,
    SubmitAnswer,
    IsChallengeActive,
    LockApp,
    UnlockApp,
    ListLocked,
    EndAllSessions,
    PollDirectives,
    GetStats,
    GetSettings,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(method: Method, params: Option<Value>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            method,
            id: None,
            params,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

/// `foreground_changed`: package P came to the foreground.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ForegroundParams {
    pub package: String,
    /// RFC3339. Defaults to the daemon's receive time when absent.
    #[serde(default)]
    pub observed_at: Option<String>,
}

impl ForegroundParams {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_package(&self.package)?;
        if let Some(observed_at) = self.observed_at.as_deref() {
            parse_timestamp(observed_at)?;
        }
        Ok(())
    }

    /// Parsed `observed_at`, or `fallback` when the client sent none.
    pub fn observed_at_or(&self, fallback: DateTime<Utc>) -> DateTime<Utc> {
        self.observed_at
            .as_deref()
            .and_then(|raw| parse_timestamp(raw).ok())
            .unwrap_or(fallback)
    }
}

/// `lock_app`, `unlock_app`, `start_or_get_challenge`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PackageParams {
    pub package: String,
}

impl PackageParams {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_package(&self.package)
    }
}

/// `submit_answer`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AnswerParams {
    pub selected_color: String,
    /// When present, answers for any other challenge are ignored.
    #[serde(default)]
    pub challenge_id: Option<u64>,
}

impl AnswerParams {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if self.selected_color.trim().is_empty() {
            return Err(ErrorInfo::new(
                "missing_field",
                "selected_color is required",
            ));
        }
        if self.challenge_id == Some(0) {
            return Err(ErrorInfo::new(
                "invalid_challenge_id",
                "challenge_id must be positive",
            ));
        }
        Ok(())
    }
}

/// `get_health` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthInfo {
    pub status: String,
    pub pid: u32,
    pub version: String,
    pub protocol_version: u32,
    pub challenge_active: bool,
}

/// `is_challenge_active` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChallengeActivity {
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

pub fn parse_foreground(params: Value) -> Result<ForegroundParams, ErrorInfo> {
    let parsed: ForegroundParams = parse_params(params, "foreground_changed")?;
    parsed.validate()?;
    Ok(parsed)
}

pub fn parse_package(params: Value) -> Result<PackageParams, ErrorInfo> {
    let parsed: PackageParams = parse_params(params, "package")?;
    parsed.validate()?;
    Ok(parsed)
}

pub fn parse_answer(params: Value) -> Result<AnswerParams, ErrorInfo> {
    let parsed: AnswerParams = parse_params(params, "submit_answer")?;
    parsed.validate()?;
    Ok(parsed)
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value, what: &str) -> Result<T, ErrorInfo> {
    serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("{} payload is invalid: {}", what, err),
        )
    })
}

fn require_package(package: &str) -> Result<(), ErrorInfo> {
    let trimmed = package.trim();
    if trimmed.is_empty() {
        return Err(ErrorInfo::new("missing_field", "package is required"));
    }
    if trimmed.len() > MAX_PACKAGE_LEN {
        return Err(ErrorInfo::new(
            "invalid_package",
            format!("package must be {} characters or fewer", MAX_PACKAGE_LEN),
        ));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(ErrorInfo::new(
            "invalid_package",
            "package must not contain whitespace",
        ));
    }
    Ok(())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ErrorInfo> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| ErrorInfo::new("invalid_timestamp", "observed_at must be RFC3339"))
}
