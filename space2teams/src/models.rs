pub mod space;
pub mod teams;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version of the on-disk staging layout written by the exporter.
pub const STAGING_SCHEMA_VERSION: u32 = 1;

/// Channel metadata as staged in `channel.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Milliseconds since the epoch.
    pub created: i64,
    pub total_messages: u64,
}

impl ChannelRecord {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.created)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    User,
    Application,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorDetails {
    pub kind: PrincipalKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<AuthorDetails>,
}

/// One staged message; `messages.json` holds them oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub author: Author,
    /// Milliseconds since the epoch.
    pub created: i64,
    pub text: String,
    #[serde(default)]
    pub archived: bool,
}

impl MessageRecord {
    pub fn is_from_application(&self) -> bool {
        matches!(
            self.author.details,
            Some(AuthorDetails {
                kind: PrincipalKind::Application,
                ..
            })
        )
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub messages: Vec<MessageRecord>,
    /// Cursor to pass as the start date of the next page.
    pub next_start_from: Option<String>,
    pub org_limit_reached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingManifest {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
}

impl StagingManifest {
    pub fn current() -> Self {
        Self {
            version: STAGING_SCHEMA_VERSION,
            exported_at: Utc::now(),
        }
    }
}
