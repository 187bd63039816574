use std::time::Duration;

use reqwest::{StatusCode, header};
use thiserror::Error;

/// Exit status used for every failure the operator has to act on before
/// re-running the migration.
pub const FATAL_EXIT_CODE: i32 = 255;

/// Failure of a single remote call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("request returned status {} ({}): {message}", status.as_u16(), reason(*status))]
    Status {
        status: StatusCode,
        message: String,
        retry_after: Option<Duration>,
    },

    /// No usable answer at all: connection, TLS, timeout or a body we cannot decode.
    #[error("request failed: {message}")]
    Transport { message: String },
}

impl ApiError {
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError::Status {
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        ApiError::Transport {
            message: message.into(),
        }
    }

    /// Turn an error response into a classified error, keeping the body and
    /// any `Retry-After` hint.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let message = response.text().await.unwrap_or_default();

        ApiError::Status {
            status,
            message,
            retry_after,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        // reqwest attaches a status only to errors produced by error_for_status
        match error.status() {
            Some(status) => ApiError::status(status, error.to_string()),
            None => ApiError::transport(error.to_string()),
        }
    }
}

pub fn reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown")
}

/// Conditions that end a migration run.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("out of tries while running \"{operation}\"")]
    RetriesExhausted { operation: String },

    #[error("unrecoverable error in \"{operation}\": {source}")]
    Unrecoverable {
        operation: String,
        #[source]
        source: ApiError,
    },

    #[error("owner {email} of team \"{team}\" is not a member of the organization")]
    UnknownOwner { team: String, email: String },

    #[error("team \"{team}\" has no members, so it would be deleted and never recreated")]
    TeamWithoutMembers { team: String },

    #[error("export failed for channels: {}", channels.join(", "))]
    ExportIncomplete { channels: Vec<String> },

    #[error("staging directory has schema version {found}, expected {expected}")]
    StagingVersion { found: u32, expected: u32 },

    #[error("timestamp {seconds} is out of range")]
    InvalidTimestamp { seconds: i64 },
}

impl MigrationError {
    pub fn unrecoverable(operation: &str, source: ApiError) -> Self {
        MigrationError::Unrecoverable {
            operation: operation.to_string(),
            source,
        }
    }
}

/// Exit status for an error returned by the driver.
pub fn exit_code(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<MigrationError>().is_some() {
        FATAL_EXIT_CODE
    } else {
        1
    }
}
