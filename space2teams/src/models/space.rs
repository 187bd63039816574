use serde::Deserialize;

use super::{Author, AuthorDetails, ChannelRecord, MessagePage, MessageRecord, PrincipalKind};

const APPLICATION_PRINCIPAL: &str = "CApplicationPrincipalDetails";
const USER_PRINCIPAL: &str = "CUserPrincipalDetails";

#[derive(Debug, Deserialize, Clone)]
pub struct SpaceDateTime {
    pub iso: String,
    pub timestamp: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsBatch {
    #[serde(default)]
    pub next: String,
    pub total_count: Option<u64>,
    #[serde(default)]
    pub data: Vec<SpaceChannel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceChannel {
    pub channel_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created: SpaceDateTime,
    #[serde(default)]
    pub total_messages: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessagesResponse {
    pub next_start_from_date: Option<SpaceDateTime>,
    #[serde(default)]
    pub org_limit_reached: bool,
    #[serde(default)]
    pub messages: Vec<SpaceMessage>,
}

#[derive(Debug, Deserialize)]
pub struct SpaceMessage {
    #[serde(default)]
    pub archived: bool,
    pub author: SpaceAuthor,
    pub created: SpaceDateTime,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SpaceAuthor {
    pub name: String,
    pub details: Option<SpaceAuthorDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceAuthorDetails {
    pub class_name: Option<String>,
    pub user: Option<SpaceProfile>,
}

#[derive(Debug, Deserialize)]
pub struct SpaceProfile {
    pub emails: Option<Vec<SpaceEmail>>,
}

#[derive(Debug, Deserialize)]
pub struct SpaceEmail {
    pub email: String,
}

impl From<SpaceChannel> for ChannelRecord {
    fn from(channel: SpaceChannel) -> Self {
        Self {
            id: channel.channel_id,
            name: channel.name,
            description: channel.description.filter(|d| !d.trim().is_empty()),
            created: channel.created.timestamp,
            total_messages: channel.total_messages,
        }
    }
}

impl From<SpaceAuthorDetails> for AuthorDetails {
    fn from(details: SpaceAuthorDetails) -> Self {
        let kind = match details.class_name.as_deref() {
            Some(APPLICATION_PRINCIPAL) => PrincipalKind::Application,
            Some(USER_PRINCIPAL) => PrincipalKind::User,
            // a profile without a class name is still a person
            None if details.user.is_some() => PrincipalKind::User,
            _ => PrincipalKind::Other,
        };

        let emails = details
            .user
            .and_then(|u| u.emails)
            .unwrap_or_default()
            .into_iter()
            .map(|e| e.email)
            .collect();

        Self { kind, emails }
    }
}

impl From<SpaceMessage> for MessageRecord {
    fn from(message: SpaceMessage) -> Self {
        Self {
            author: Author {
                name: message.author.name,
                details: message.author.details.map(AuthorDetails::from),
            },
            created: message.created.timestamp,
            text: message.text,
            archived: message.archived,
        }
    }
}

impl From<GetMessagesResponse> for MessagePage {
    fn from(response: GetMessagesResponse) -> Self {
        Self {
            messages: response
                .messages
                .into_iter()
                .map(MessageRecord::from)
                .collect(),
            next_start_from: response.next_start_from_date.map(|d| d.iso),
            org_limit_reached: response.org_limit_reached,
        }
    }
}
