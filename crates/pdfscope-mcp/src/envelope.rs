use pdfscope_core::Error;
use serde::Serialize;

pub(crate) const SCHEMA_VERSION: u64 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    InvalidParams,
    InvalidRange,
    InvalidPattern,
    OpenFailed,
    BackendFailed,
    UnexpectedError,
}

impl ErrorCode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParams => "invalid_params",
            Self::InvalidRange => "invalid_range",
            Self::InvalidPattern => "invalid_pattern",
            Self::OpenFailed => "open_failed",
            Self::BackendFailed => "backend_failed",
            Self::UnexpectedError => "unexpected_error",
        }
    }

    pub(crate) fn retryable(self) -> bool {
        match self {
            Self::BackendFailed => true,
            // Bad input and unreadable files fail the same way on retry.
            Self::InvalidParams
            | Self::InvalidRange
            | Self::InvalidPattern
            | Self::OpenFailed
            | Self::UnexpectedError => false,
        }
    }

    pub(crate) fn of(e: &Error) -> Self {
        match e {
            Error::InvalidRange(_) => Self::InvalidRange,
            Error::InvalidPattern(_) => Self::InvalidPattern,
            Error::InvalidParams(_) => Self::InvalidParams,
            Error::Open(_) => Self::OpenFailed,
            Error::Backend(_) | Error::PageText { .. } => Self::BackendFailed,
            Error::SearchTimeout { .. } | Error::ExcessiveMatches { .. } | Error::Destination(_) => {
                Self::UnexpectedError
            }
        }
    }

    pub(crate) fn hint(self) -> &'static str {
        match self {
            Self::InvalidParams => "Check argument ranges in the tool schema and retry.",
            Self::InvalidRange => {
                "Use comma-separated pages or ranges like \"1:5,8,10:\" with 1-based page numbers."
            }
            Self::InvalidPattern => {
                "Plain text is matched literally; use /regex/flags (flags: g,i,m,s,u,x) for regular expressions."
            }
            Self::OpenFailed => {
                "Check that path points to a readable PDF within PDFSCOPE_MAX_FILE_BYTES."
            }
            Self::BackendFailed => {
                "The document parser failed; try PDFSCOPE_TEXT_ENGINE=pdf-extract or pdftotext."
            }
            Self::UnexpectedError => "Unexpected failure; see server logs (stderr).",
        }
    }
}

pub(crate) fn add_envelope_fields(payload: &mut serde_json::Value, kind: &str, elapsed_ms: u128) {
    payload["schema_version"] = serde_json::json!(SCHEMA_VERSION);
    payload["kind"] = serde_json::json!(kind);
    payload["elapsed_ms"] = serde_json::json!(elapsed_ms);
    if payload.get("request").is_none() {
        payload["request"] = serde_json::Value::Null;
    }
}

pub(crate) fn error_obj(
    code: ErrorCode,
    message: impl ToString,
    hint: impl ToString,
) -> serde_json::Value {
    #[derive(Serialize)]
    struct ErrorObject {
        code: &'static str,
        message: String,
        hint: String,
        retryable: bool,
    }

    let e = ErrorObject {
        code: code.as_str(),
        message: message.to_string(),
        hint: hint.to_string(),
        retryable: code.retryable(),
    };
    match serde_json::to_value(e) {
        Ok(v) => v,
        Err(_) => serde_json::json!({
            "code": code.as_str(),
            "message": message.to_string(),
            "hint": hint.to_string(),
            "retryable": code.retryable()
        }),
    }
}

/// `{ok:false, error, request}` for a failed operation.
pub(crate) fn error_payload(e: &Error, request: serde_json::Value) -> serde_json::Value {
    let code = ErrorCode::of(e);
    serde_json::json!({
        "ok": false,
        "error": error_obj(code, e, code.hint()),
        "request": request,
    })
}
