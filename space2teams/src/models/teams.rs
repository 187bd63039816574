use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";
pub const GENERAL_CHANNEL: &str = "General";

const STANDARD_TEMPLATE: &str = "https://graph.microsoft.com/v1.0/teamsTemplates('standard')";
const MIGRATION_MODE: &str = "migration";

#[derive(Debug, Deserialize)]
pub struct ODataPage<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    pub description: Option<String>,
}

impl Channel {
    pub fn is_general(&self) -> bool {
        self.display_name.eq_ignore_ascii_case(GENERAL_CHANNEL)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    pub id: String,
    pub display_name: Option<String>,
    pub mail: Option<String>,
}

impl DirectoryUser {
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewTeam {
    pub display_name: String,
    pub description: String,
    pub created_date_time: DateTime<Utc>,
    pub visibility: String,
    #[serde(rename = "@microsoft.graph.teamCreationMode")]
    pub creation_mode: String,
    #[serde(rename = "template@odata.bind")]
    pub template: String,
}

impl NewTeam {
    /// Team creation request that lets us backdate the team and its content.
    pub fn migration(display_name: &str, description: &str, created: DateTime<Utc>) -> Self {
        Self {
            display_name: display_name.to_string(),
            description: description.to_string(),
            created_date_time: created,
            visibility: "private".to_string(),
            creation_mode: MIGRATION_MODE.to_string(),
            template: STANDARD_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChannelChangeset {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<DateTime<Utc>>,

    #[serde(flatten, skip_serializing_if = "HashMap::is_empty")]
    pub extra_fields: HashMap<String, serde_json::Value>,
}

impl ChannelChangeset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard channel in migration mode, created at `created`.
    pub fn migration(created: DateTime<Utc>) -> Self {
        Self::new()
            .with_created(created)
            .with_membership_type("standard")
            .with_field("@microsoft.graph.channelCreationMode", MIGRATION_MODE)
    }

    pub fn with_display_name(mut self, display_name: String) -> Self {
        self.display_name = Some(display_name);
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.filter(|d| !d.is_empty());
        self
    }

    pub fn with_membership_type(mut self, membership_type: &str) -> Self {
        self.membership_type = Some(membership_type.to_string());
        self
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created_date_time = Some(created);
        self
    }

    pub fn with_field<T: Into<serde_json::Value>>(mut self, key: &str, value: T) -> Self {
        self.extra_fields.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewChatMessage {
    pub created_date_time: DateTime<Utc>,
    pub from: MessageFrom,
    pub body: ItemBody,
}

#[derive(Debug, Serialize, Clone)]
pub struct MessageFrom {
    pub user: MessageUser,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MessageUser {
    pub id: String,
    pub display_name: String,
    pub user_identity_type: String,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ItemBody {
    pub content_type: String,
    pub content: String,
}

impl NewChatMessage {
    pub fn new(author: &DirectoryUser, created: DateTime<Utc>, content: &str) -> Self {
        Self {
            created_date_time: created,
            from: MessageFrom {
                user: MessageUser {
                    id: author.id.clone(),
                    display_name: author.name().to_string(),
                    user_identity_type: "aadUser".to_string(),
                },
            },
            body: ItemBody {
                content_type: "html".to_string(),
                content: content.to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatMessage {
    pub id: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MemberBinding {
    #[serde(rename = "@odata.type")]
    pub odata_type: String,
    pub roles: Vec<String>,
    #[serde(rename = "user@odata.bind")]
    pub user: String,
}

impl MemberBinding {
    pub fn new(user_id: &str, owner: bool) -> Self {
        Self {
            odata_type: "microsoft.graph.aadUserConversationMember".to_string(),
            roles: if owner {
                vec!["owner".to_string()]
            } else {
                vec![]
            },
            user: format!("{GRAPH_URL}/users('{user_id}')"),
        }
    }

    pub fn is_owner(&self) -> bool {
        self.roles.iter().any(|r| r == "owner")
    }
}

#[derive(Debug, Serialize)]
pub struct AddMembersRequest<'a> {
    pub values: &'a [MemberBinding],
}
