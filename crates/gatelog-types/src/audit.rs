use serde::{Deserialize, Serialize};

/// `reason` recorded when a request names no file at all.
pub const MISSING_FILENAME: &str = "missing_filename";

/// `reason` recorded when the named object does not exist in the bucket.
pub const OBJECT_MISSING: &str = "object_missing";

/// The outcome of one file-server request.
///
/// Serialized with an `event_type` tag so the audit pipeline can recover the
/// decision kind from the JSON event without knowing this type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AccessDecision {
    /// The request used a method other than GET.
    MethodNotImplemented { method: String },

    /// The client-declared country is on the denylist.
    ForbiddenCountry,

    /// No file name was given, or the object does not exist.
    FileNotFound {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bucket: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        object: Option<String>,
    },

    /// The object was found and its bytes returned.
    FileServed {
        bucket: String,
        object: String,
        bytes: u64,
    },

    /// The store failed while fetching. `error` never reaches the client.
    InternalError {
        error: String,
        bucket: String,
        object: String,
    },
}

impl AccessDecision {
    pub fn missing_filename() -> Self {
        Self::FileNotFound {
            reason: MISSING_FILENAME.into(),
            bucket: None,
            object: None,
        }
    }

    pub fn object_missing(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Self::FileNotFound {
            reason: OBJECT_MISSING.into(),
            bucket: Some(bucket.into()),
            object: Some(object.into()),
        }
    }

    /// The `event_type` tag this decision serializes with.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MethodNotImplemented { .. } => "method_not_implemented",
            Self::ForbiddenCountry => "forbidden_country",
            Self::FileNotFound { .. } => "file_not_found",
            Self::FileServed { .. } => "file_served",
            Self::InternalError { .. } => "internal_error",
        }
    }

    /// HTTP status the server answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MethodNotImplemented { .. } => 501,
            Self::ForbiddenCountry => 400,
            Self::FileNotFound { .. } => 404,
            Self::FileServed { .. } => 200,
            Self::InternalError { .. } => 500,
        }
    }

    /// Plain-text body for non-200 responses. `None` for a served file.
    pub fn error_body(&self) -> Option<&'static str> {
        match self {
            Self::MethodNotImplemented { .. } => Some("501 Not Implemented\n"),
            Self::ForbiddenCountry => Some("400 Permission Denied\n"),
            Self::FileNotFound { .. } => Some("404 Not Found\n"),
            Self::FileServed { .. } => None,
            Self::InternalError { .. } => Some("500 Internal Server Error\n"),
        }
    }
}

/// One access decision plus the request context it was made in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    #[serde(flatten)]
    pub decision: AccessDecision,
    pub path: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub user_agent: String,
}

impl AuditRecord {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn event_type(&self) -> &'static str {
        self.decision.event_type()
    }
}
